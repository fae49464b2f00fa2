//! Stderr logging for the calibration tools.
//!
//! Lines read `[elapsed LEVEL module] message`, elapsed measured from
//! installation and `module` the record target with the leading `chesscal`
//! crate prefix stripped. Records from our own crates pass at the configured
//! level; everything else (corner detector, image codecs) is capped at `Warn`
//! so debug runs stay readable.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const OWN_PREFIX: &str = "chesscal";

struct CalibLogger {
    level: LevelFilter,
    started: Instant,
}

fn is_own_target(target: &str) -> bool {
    target.starts_with(OWN_PREFIX)
}

/// Effective filter for records from `target`.
fn filter_for(level: LevelFilter, target: &str) -> LevelFilter {
    if is_own_target(target) {
        level
    } else {
        level.min(LevelFilter::Warn)
    }
}

/// `chesscal_calib::planar` -> `calib::planar`, `chesscal::pipeline` -> `pipeline`.
fn short_target(target: &str) -> &str {
    if !is_own_target(target) {
        return target;
    }
    let rest = &target[OWN_PREFIX.len()..];
    rest.strip_prefix('_')
        .or_else(|| rest.strip_prefix("::"))
        .unwrap_or(target)
}

fn format_line(elapsed: f64, level: Level, target: &str, message: &std::fmt::Arguments) -> String {
    format!("[{elapsed:8.3}s {level:>5} {}] {message}", short_target(target))
}

impl Log for CalibLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= filter_for(self.level, metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<CalibLogger> = OnceLock::new();

/// Install the stderr logger; `level` applies to the `chesscal*` crates.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| CalibLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install a `tracing` subscriber closing spans with their durations.
///
/// `RUST_LOG` wins when set; otherwise our crates log at `info` and the rest
/// at `warn`, mirroring [`init_with_level`].
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,chesscal=info,chesscal_core=info,chesscal_chessboard=info,chesscal_calib=info")
    });
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}
