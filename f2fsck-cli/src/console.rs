// SPDX-License-Identifier: MIT
//! Console output
//!
//! Engine records arrive through the `log` facade and are filtered by the
//! [`LogLevel`] picked on the command line.

use std::sync::atomic::{AtomicU8, Ordering};

use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Quiet,
    Normal,
    Verbose,
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Normal as u8);

pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn log_level() -> LogLevel {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Quiet,
        1 => LogLevel::Normal,
        _ => LogLevel::Verbose,
    }
}

impl LogLevel {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (_, true) => LogLevel::Quiet,
            (true, false) => LogLevel::Verbose,
            _ => LogLevel::Normal,
        }
    }

    fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Quiet => LevelFilter::Error,
            LogLevel::Normal => LevelFilter::Warn,
            LogLevel::Verbose => LevelFilter::Debug,
        }
    }
}

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log_level().filter()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "error".red().bold(),
            Level::Warn => "warn".yellow(),
            Level::Info => "info".green(),
            Level::Debug | Level::Trace => "debug".dimmed(),
        };
        eprintln!("[f2fsck] {tag}: {}", record.args());
    }

    fn flush(&self) {}
}

/// Installs the console logger at `level`. Later calls only move the level.
pub fn init(level: LogLevel) {
    set_log_level(level);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if $crate::console::log_level() != $crate::console::LogLevel::Quiet {
            println!("[f2fsck] {}", format_args!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! log_verbose {
    ($($arg:tt)*) => {
        if $crate::console::log_level() == $crate::console::LogLevel::Verbose {
            println!("[f2fsck] {}", format_args!($($arg)*));
        }
    };
}
