//! `wrapitup run` - run a command under a time limit
//!
//! The command keeps running until it exits, the time limit runs out, or a
//! shutdown signal arrives. In the last two cases it gets SIGTERM, then
//! SIGKILL after the grace period.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ExitCode, ExitStatus};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, ensure};
use clap::Args;

use wrapitup_core::{Signal, SignalGuard, Timer, fmt_remaining, requested};

use crate::config::Config;

/// Exit status when the time limit ran out (same as coreutils `timeout`).
const EXIT_TIMED_OUT: u8 = 124;
/// Exit status when a shutdown was requested (128 + SIGINT).
const EXIT_REQUESTED: u8 = 130;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Time limit in seconds (default: from config, else none)
    #[arg(short, long)]
    pub limit: Option<f64>,

    /// Seconds between SIGTERM and SIGKILL when stopping the command
    #[arg(short, long)]
    pub grace: Option<f64>,

    /// Signal that requests shutdown, repeatable (default: from config, else platform defaults)
    #[arg(short, long = "signal", value_parser = parse_signal)]
    pub signals: Vec<Signal>,

    /// Command and arguments to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

fn parse_signal(s: &str) -> std::result::Result<Signal, String> {
    s.parse::<Signal>().map_err(|e| e.to_string())
}

/// Why the poll loop stopped.
#[derive(Debug)]
enum Outcome {
    Exited(ExitStatus),
    TimedOut(ExitStatus),
    Requested(ExitStatus),
}

impl Outcome {
    fn exit_code(&self) -> u8 {
        match self {
            Outcome::Exited(status) => status_code(*status),
            Outcome::TimedOut(_) => EXIT_TIMED_OUT,
            Outcome::Requested(_) => EXIT_REQUESTED,
        }
    }
}

/// Shell convention: the exit code, or 128 + signal number if killed.
fn status_code(status: ExitStatus) -> u8 {
    match (status.code(), status.signal()) {
        (Some(code), _) => (code & 0xff) as u8,
        (None, Some(signal)) => (128 + signal).min(255) as u8,
        (None, None) => 1,
    }
}

pub fn run(
    args: RunArgs,
    config: &Config,
    progress: &wrapitup_core::SharedProgress,
) -> Result<ExitCode> {
    let limit = args.limit.or(config.run.limit).unwrap_or(f64::INFINITY);
    let grace = args.grace.unwrap_or(config.run.grace_period);
    ensure!(
        grace.is_finite() && grace >= 0.0,
        "Grace period must be a non-negative number of seconds, got {grace}"
    );
    let signals = if args.signals.is_empty() {
        config.run.signals()?
    } else {
        args.signals
    };
    let poll = Duration::from_millis(config.run.poll_interval_ms.max(1));

    let guard = SignalGuard::with_signals(signals)?;
    let mut timer = Timer::new(limit)?;

    let (program, rest) = args
        .command
        .split_first()
        .context("No command given")?;

    let scope = guard.enter()?;
    let mut child = std::process::Command::new(program)
        .args(rest)
        .spawn()
        .with_context(|| format!("Failed to start {program}"))?;
    log::info!(
        "Started {program} (pid {}), limit {}",
        child.id(),
        fmt_remaining(limit)
    );

    let pb = progress.countdown_line(program);
    let outcome = supervise(&mut child, &mut timer, grace, poll, |remaining| {
        pb.set_message(format!("{} remaining", fmt_remaining(remaining)));
    });
    pb.finish_and_clear();
    let elapsed = timer.stop();

    // Stop listening before reporting: a repeated Ctrl+C now exits at once.
    scope.exit()?;
    let outcome = outcome?;

    match &outcome {
        Outcome::Exited(status) => {
            log::info!("{program} finished after {elapsed:.1}s ({status})");
        }
        Outcome::TimedOut(status) => {
            log::warn!("{program} stopped after time limit of {limit}s ({status})");
        }
        Outcome::Requested(status) => {
            log::warn!("{program} stopped on shut down request after {elapsed:.1}s ({status})");
        }
    }
    Ok(ExitCode::from(outcome.exit_code()))
}

/// Poll `child` until it exits or `timer` expires, then stop it.
fn supervise(
    child: &mut Child,
    timer: &mut Timer,
    grace: f64,
    poll: Duration,
    mut on_tick: impl FnMut(f64),
) -> Result<Outcome> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Outcome::Exited(status));
        }
        if timer.expired() {
            // Checked after expired(), which latches the request flag.
            let shutdown = requested();
            let status = stop_child(child, grace, poll)?;
            return Ok(if shutdown {
                Outcome::Requested(status)
            } else {
                Outcome::TimedOut(status)
            });
        }
        on_tick(timer.remaining());
        std::thread::sleep(poll);
    }
}

/// SIGTERM, wait up to `grace` seconds, then SIGKILL.
fn stop_child(child: &mut Child, grace: f64, poll: Duration) -> Result<ExitStatus> {
    log::debug!("Sending SIGTERM to pid {}", child.id());
    send_signal(child, Signal::TERM)?;

    let deadline = Instant::now() + Duration::from_secs_f64(grace);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(poll.min(deadline - now));
    }

    log::warn!(
        "pid {} still running after {grace}s grace period, killing",
        child.id()
    );
    child.kill().context("Failed to kill child")?;
    Ok(child.wait()?)
}

fn send_signal(child: &Child, signal: Signal) -> Result<()> {
    let pid = libc::pid_t::try_from(child.id()).context("pid out of range")?;
    // SAFETY: kill has no memory-safety preconditions.
    if unsafe { libc::kill(pid, signal.as_raw()) } != 0 {
        let err = io::Error::last_os_error();
        // Already gone; try_wait will reap it.
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err).with_context(|| format!("Failed to send {signal} to pid {pid}"));
        }
    }
    Ok(())
}
