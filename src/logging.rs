//! Logging setup for the ctxbank binary.
//!
//! Index builds spend minutes inside shuffles and chromosome scans, so every
//! line carries the time elapsed since start-up instead of the wall clock;
//! that is the number worth reading when comparing runs. Output goes to
//! stderr through the `log` facade.

use std::io::Write;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Render a duration as `MM:SS`, growing to `H:MM:SS` past an hour.
fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Initialize the logger.
///
/// `verbosity` is the number of `-v` flags: 0 shows warnings and errors,
/// 1 adds progress reporting at Info, 2 and above add Debug. Lines look
/// like `[02:41] INFO ctxbank::repeats: Processing chromosome 7`.
pub fn init_logger(verbosity: u8) {
    START_TIME.set(Instant::now()).ok();

    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format(|buf, record| {
            let start = START_TIME.get().copied().unwrap_or_else(Instant::now);
            writeln!(
                buf,
                "[{}] {} {}: {}",
                format_elapsed(start.elapsed()),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}
