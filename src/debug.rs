//! Logging backend for the tools and tests.
//!
//! The library itself only talks to the `log` facade, and never from the
//! per-sample path. Hosts that already install a logger can ignore this
//! module.

use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

struct StderrLogger {
    start: OnceLock<Instant>,
}

static LOGGER: StderrLogger = StderrLogger {
    start: OnceLock::new(),
};

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let elapsed = self.start.get_or_init(Instant::now).elapsed();
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        let _ = writeln!(
            out,
            "[{:>9.3}s {:<5} {}] {}",
            elapsed.as_secs_f64(),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Install the stderr logger. Returns false if another logger was already
/// installed; the level is applied either way.
pub fn init_logger(level: LevelFilter) -> bool {
    let _ = LOGGER.start.get_or_init(Instant::now);
    let installed = log::set_logger(&LOGGER).is_ok();
    log::set_max_level(level);
    installed
}

/// Parse a level name the way `RUST_LOG`-style flags are usually given.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    name.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse() {
        assert_eq!(parse_level("debug"), Some(LevelFilter::Debug));
        assert_eq!(parse_level(" WARN "), Some(LevelFilter::Warn));
        assert_eq!(parse_level("off"), Some(LevelFilter::Off));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn second_install_is_refused() {
        init_logger(LevelFilter::Warn);
        assert!(!init_logger(LevelFilter::Warn));
        log::warn!("logger test line");
    }
}
