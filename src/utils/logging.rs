// Logging utilities
// Author: Gabriel Demetrios Lafis

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

use super::{AppError, AppResult, LoggingConfig};

/// Initialize logging to stderr with the given level
pub fn init_logging(level: LevelFilter) -> Result<(), SetLoggerError> {
    install(SimpleLogger { level, file: None })
}

/// Initialize logging from configuration, appending to `file` when set
pub fn init_logging_from_config(config: &LoggingConfig) -> AppResult<()> {
    let file = match config.file.as_deref() {
        Some(path) => Some(Mutex::new(open_log_file(path)?)),
        None => None,
    };

    install(SimpleLogger {
        level: config.level_filter(),
        file,
    })
    .map_err(|e| AppError::Config(format!("logger already installed: {}", e)))
}

fn install(logger: SimpleLogger) -> Result<(), SetLoggerError> {
    let level = logger.level;
    log::set_boxed_logger(Box::new(logger)).map(|()| log::set_max_level(level))
}

fn open_log_file(path: &str) -> AppResult<File> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(path))?)
}

/// Parse a level name, falling back to `Info`
pub fn parse_level(name: &str) -> LevelFilter {
    match name.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Simple logger writing timestamped lines to stderr or a file
struct SimpleLogger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

        match self.file {
            Some(ref file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = writeln!(
                        file,
                        "[{}] {} {}: {}",
                        timestamp,
                        record.level(),
                        record.target(),
                        record.args()
                    );
                }
            }
            None => {
                let level_str = match record.level() {
                    Level::Error => "\x1B[31mERROR\x1B[0m",
                    Level::Warn => "\x1B[33mWARN\x1B[0m",
                    Level::Info => "\x1B[32mINFO\x1B[0m",
                    Level::Debug => "\x1B[34mDEBUG\x1B[0m",
                    Level::Trace => "\x1B[90mTRACE\x1B[0m",
                };

                eprintln!("[{}] {}: {}", timestamp, level_str, record.args());
            }
        }
    }

    fn flush(&self) {
        if let Some(ref file) = self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}
