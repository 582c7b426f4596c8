pub mod run;
pub mod signals;
