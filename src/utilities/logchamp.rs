//! joe: logchamp
//! joe: call it logchamp
//! joe: please

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::{error, fmt};

use colored::{Color, Colorize};
use log::{Level, LevelFilter, Log, Metadata, Record};
use time::macros;

const CRATE_TARGET: &str = "prose_translator";

#[derive(Debug)]
pub enum InitError {
    File(io::Error),
    SetLogger(log::SetLoggerError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(err) => write!(f, "failed to create the log file: {err}"),
            Self::SetLogger(err) => write!(f, "{err}"),
        }
    }
}

impl error::Error for InitError {}

struct Logger {
    file: Option<Mutex<BufWriter<File>>>,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        is_crate_target(metadata.target()) || metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = time::OffsetDateTime::now_utc()
            .format(macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
            .unwrap_or_default();
        let level = record.level();
        let args = record.args();

        eprintln!(
            "{} {} {args}",
            timestamp.color(Color::BrightBlack),
            level.as_str().color(color(level))
        );

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                writeln!(file, "{}", file_line(&timestamp, record.target(), level, args)).ok();
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                file.flush().ok();
            }
        }
    }
}

fn is_crate_target(target: &str) -> bool {
    target.split("::").next() == Some(CRATE_TARGET)
}

const fn color(level: Level) -> Color {
    match level {
        Level::Error => Color::BrightRed,
        Level::Warn => Color::BrightYellow,
        Level::Info => Color::BrightCyan,
        Level::Debug => Color::Magenta,
        Level::Trace => Color::Green,
    }
}

fn file_line(timestamp: &str, target: &str, level: Level, args: &fmt::Arguments) -> String {
    format!("{timestamp} [{target} {}] {args}", level.as_str())
}

/// Installs a colored stderr logger, optionally mirrored to `log_file`.
/// Messages from this crate are kept down to debug level, everything else down to info.
pub fn init(log_file: Option<&Path>) -> Result<(), InitError> {
    let file = log_file
        .map(|path| File::create(path).map(|file| Mutex::new(BufWriter::new(file))))
        .transpose()
        .map_err(InitError::File)?;

    log::set_boxed_logger(Box::new(Logger { file })).map_err(InitError::SetLogger)?;
    log::set_max_level(LevelFilter::Debug);

    Ok(())
}
