//! Logging setup with indicatif integration
//!
//! wrapitup's own crates log at the chosen level while everything else stays
//! at `warn`. `RUST_LOG` is applied on top and wins.

use std::io::Write;

use indicatif::MultiProgress;

/// Crates whose records follow `--quiet`/`--debug`.
const OWN_TARGETS: [&str; 2] = ["wrapitup_core", "wrapitup"];

fn filter_spec(quiet: bool, debug: bool) -> String {
    let (own, rest) = if debug {
        ("debug", "info")
    } else if quiet {
        ("warn", "warn")
    } else {
        ("info", "warn")
    };
    let mut spec = rest.to_string();
    for target in OWN_TARGETS {
        spec.push_str(&format!(",{target}={own}"));
    }
    spec
}

fn builder(quiet: bool, debug: bool) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&filter_spec(quiet, debug));
    builder.parse_default_env();
    builder
}

fn label(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

fn ansi(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    }
}

/// One log line. Debug and trace records name their module.
fn render(record: &log::Record, color: bool) -> String {
    let level = record.level();
    let tag = if color {
        format!("{}{}\x1b[0m", ansi(level), label(level))
    } else {
        label(level).to_string()
    };
    if level >= log::Level::Debug {
        format!("[{tag}] {}: {}", record.target(), record.args())
    } else {
        format!("[{tag}] {}", record.args())
    }
}

/// Logger that prints above the countdown line instead of through it.
///
/// Printing takes indicatif's draw lock, so nothing may log through this
/// from a signal handler.
pub struct ProgressLogger {
    filter: env_logger::Logger,
    multi: MultiProgress,
}

impl ProgressLogger {
    pub fn new(filter: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { filter, multi }
    }
}

impl log::Log for ProgressLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.filter.matches(record) {
            let line = render(record, true);
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {}
}

/// Install the global logger.
///
/// With `multi` (TTY), lines are colored and printed around the progress
/// display; without it they go to stderr with plain labels. Calling this
/// twice is an error from the `log` crate and is reported, not ignored.
pub fn init_logging(
    quiet: bool,
    debug: bool,
    multi: Option<&MultiProgress>,
) -> Result<(), log::SetLoggerError> {
    let mut builder = builder(quiet, debug);
    match multi {
        Some(multi) => {
            let filter = builder.build();
            let max_level = filter.filter();
            log::set_boxed_logger(Box::new(ProgressLogger::new(filter, multi.clone())))?;
            log::set_max_level(max_level);
        }
        None => {
            builder
                .format(|buf, record| writeln!(buf, "{}", render(record, false)))
                .try_init()?;
        }
    }
    Ok(())
}
