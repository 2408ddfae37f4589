use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::println;

struct SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        println!(
            "\u{1B}[{}m[{}] {}\u{1B}[0m",
            level_color(record.level()),
            level_tag(record.level()),
            record.args()
        );
    }

    fn flush(&self) {}
}

fn level_color(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 34,  // Blue
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERR",
        Level::Warn => "WRN",
        Level::Info => "INF",
        Level::Debug => "DBG",
        Level::Trace => "TRC",
    }
}

fn max_level(setting: Option<&str>) -> LevelFilter {
    match setting {
        Some("ERROR") => LevelFilter::Error,
        Some("WARN") => LevelFilter::Warn,
        Some("INFO") => LevelFilter::Info,
        Some("DEBUG") => LevelFilter::Debug,
        Some("TRACE") => LevelFilter::Trace,
        Some("OFF") => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Install the serial logger. Fails if a logger is already set.
pub fn init() -> Result<(), &'static str> {
    static LOGGER: SerialLogger = SerialLogger;
    log::set_logger(&LOGGER).map_err(|_| "logger already installed")?;
    log::set_max_level(max_level(option_env!("LOG")));
    Ok(())
}
