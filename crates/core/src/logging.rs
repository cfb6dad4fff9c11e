//! Centralized, category-levelled logging for the rasterizer.
//!
//! Rendering code runs per vertex, per fragment and per sample, so logging
//! here is lazy: the message closure is only evaluated when the category is
//! enabled at the requested level and the category is still under its
//! per-second budget.
//!
//! # Architecture
//!
//! - **LogConfig**: Thread-safe global configuration using atomic operations
//! - **LogLevel**: Hierarchical log levels (Off < Error < Warn < Info < Debug < Trace)
//! - **LogCategory**: Pipeline stages (Codec, Vertex, Assembly, Raster, Fragment, Compare)
//! - **log()**: Common logging function for all output with async file I/O
//!
//! # Performance
//!
//! - Messages bound for a file are handed to a background writer thread
//! - Zero overhead when logging is disabled
//! - A sliding one second window caps the output of each category
//!
//! # Usage
//!
//! ```rust
//! use refrast_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Raster, LogLevel::Debug, || {
//!     format!("Triangle covers {} packets", 42)
//! });
//! ```

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Pipeline stage a message originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Float format conversions
    Codec,
    /// Vertex attribute fetch and decoding
    Vertex,
    /// Primitive assembly and vertex processing
    Assembly,
    /// Triangle, line and point rasterization
    Raster,
    /// Per-fragment tests, blending and write-back
    Fragment,
    /// Image comparison
    Compare,
}

impl LogCategory {
    pub const COUNT: usize = 6;

    pub const ALL: [LogCategory; LogCategory::COUNT] = [
        LogCategory::Codec,
        LogCategory::Vertex,
        LogCategory::Assembly,
        LogCategory::Raster,
        LogCategory::Fragment,
        LogCategory::Compare,
    ];

    fn index(self) -> usize {
        match self {
            LogCategory::Codec => 0,
            LogCategory::Vertex => 1,
            LogCategory::Assembly => 2,
            LogCategory::Raster => 3,
            LogCategory::Fragment => 4,
            LogCategory::Compare => 5,
        }
    }

    /// Parse a category name (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "codec" | "float" => Some(LogCategory::Codec),
            "vertex" => Some(LogCategory::Vertex),
            "assembly" | "assembler" => Some(LogCategory::Assembly),
            "raster" | "rasterizer" => Some(LogCategory::Raster),
            "fragment" | "fragops" => Some(LogCategory::Fragment),
            "compare" => Some(LogCategory::Compare),
            _ => None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sliding window state of one category
#[derive(Default)]
struct CategoryWindow {
    timestamps: VecDeque<Instant>,
    dropped: usize,
    last_drop_report: Option<Instant>,
}

/// Rate limiter for controlling log output frequency per category
struct RateLimiter {
    max_logs_per_second: AtomicUsize,
    window_duration: Duration,
    windows: Mutex<[CategoryWindow; LogCategory::COUNT]>,
}

impl RateLimiter {
    fn new(max_logs_per_second: usize) -> Self {
        Self {
            max_logs_per_second: AtomicUsize::new(max_logs_per_second),
            window_duration: Duration::from_secs(1),
            windows: Mutex::new(Default::default()),
        }
    }

    /// Check if a log should be allowed based on rate limits
    /// Returns (allowed, dropped_count) where dropped_count is Some(n) if drops should be reported
    fn should_allow(&self, category: LogCategory) -> (bool, Option<usize>) {
        let now = Instant::now();
        let mut windows = lock(&self.windows);
        let window = &mut windows[category.index()];

        while let Some(&front) = window.timestamps.front() {
            if now.duration_since(front) > self.window_duration {
                window.timestamps.pop_front();
            } else {
                break;
            }
        }

        let max_logs = self.max_logs_per_second.load(Ordering::Relaxed);
        if window.timestamps.len() < max_logs {
            window.timestamps.push_back(now);
            if window.dropped > 0 {
                let dropped = std::mem::take(&mut window.dropped);
                window.last_drop_report = Some(now);
                return (true, Some(dropped));
            }
            return (true, None);
        }

        window.dropped += 1;
        let should_report = match window.last_drop_report {
            None => true,
            Some(last) => now.duration_since(last) >= self.window_duration,
        };
        if should_report {
            let dropped = std::mem::take(&mut window.dropped);
            window.last_drop_report = Some(now);
            (false, Some(dropped))
        } else {
            (false, None)
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    /// Applies to every category without its own level
    global_level: AtomicU8,
    category_levels: [AtomicU8; LogCategory::COUNT],
    /// Channel to the background file writer
    log_sender: Mutex<Option<Sender<String>>>,
    file_logging_enabled: AtomicBool,
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// All logging disabled, 60 messages per second per category
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: Default::default(),
            log_sender: Mutex::new(None),
            file_logging_enabled: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(60),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category level other than Off takes precedence over the global level
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    /// Set the maximum logs per second per category
    pub fn set_rate_limit(&self, max_logs_per_second: usize) {
        self.rate_limiter
            .max_logs_per_second
            .store(max_logs_per_second, Ordering::Relaxed);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.rate_limiter.max_logs_per_second.load(Ordering::Relaxed)
    }

    /// Route messages to a file through a background writer thread.
    ///
    /// Replaces any previously configured file.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::<String>();

        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    // Write errors are ignored; logging never aborts a render
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
            })?;

        *lock(&self.log_sender) = Some(sender);
        self.file_logging_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Stop logging to file; the writer thread exits once its sender is dropped
    pub fn clear_log_file(&self) {
        *lock(&self.log_sender) = None;
        self.file_logging_enabled.store(false, Ordering::Relaxed);
    }

    fn write_message(&self, message: &str) {
        if self.file_logging_enabled.load(Ordering::Relaxed) {
            let log_sender = lock(&self.log_sender);
            match log_sender.as_ref() {
                Some(sender) if sender.send(message.to_string()).is_ok() => {}
                _ => eprintln!("{}", message),
            }
        } else {
            eprintln!("{}", message);
        }
    }
}

/// Log a message with the specified category and level
///
/// The message is lazily evaluated via a closure, so formatting only occurs
/// when logging is enabled for the category and level.
///
/// # Rate Limiting
///
/// Each category may emit at most the configured number of messages per
/// second (60 by default). Excess messages are dropped and a summary line
/// reports how many were lost.
///
/// # Examples
///
/// ```rust
/// use refrast_core::logging::{log, LogCategory, LogLevel};
///
/// log(LogCategory::Fragment, LogLevel::Trace, || {
///     format!("Depth test failed at ({}, {})", 3, 4)
/// });
/// ```
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let (allowed, dropped_count) = config.rate_limiter.should_allow(category);
    if let Some(count) = dropped_count.filter(|&count| count > 0) {
        config.write_message(&format!(
            "[{:?}] WARNING: Rate limit exceeded, {} log message(s) dropped in the last second",
            category, count
        ));
    }

    if allowed {
        let message = message_fn();
        config.write_message(&format!("[{:?}] {}", category, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("0"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("ERR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("4"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("TRACE"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("verbose"), None);
    }

    #[test]
    fn test_log_category_parsing() {
        assert_eq!(LogCategory::from_str("Raster"), Some(LogCategory::Raster));
        assert_eq!(LogCategory::from_str("fragops"), Some(LogCategory::Fragment));
        assert_eq!(LogCategory::from_str("float"), Some(LogCategory::Codec));
        assert_eq!(LogCategory::from_str("gpu"), None);
        for (i, category) in LogCategory::ALL.iter().enumerate() {
            assert_eq!(category.index(), i);
        }
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_category_level_overrides_global() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Error);
        config.set_level(LogCategory::Raster, LogLevel::Debug);

        assert!(config.should_log(LogCategory::Raster, LogLevel::Debug));
        assert!(!config.should_log(LogCategory::Raster, LogLevel::Trace));
        assert!(!config.should_log(LogCategory::Fragment, LogLevel::Warn));
        assert!(config.should_log(LogCategory::Fragment, LogLevel::Error));
    }

    #[test]
    fn test_reset() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Trace);
        config.set_level(LogCategory::Vertex, LogLevel::Debug);
        config.reset();

        assert_eq!(config.get_global_level(), LogLevel::Off);
        assert_eq!(config.get_level(LogCategory::Vertex), LogLevel::Off);
        assert!(!config.should_log(LogCategory::Vertex, LogLevel::Error));
    }

    #[test]
    fn test_rate_limiter_blocks_over_limit() {
        let limiter = RateLimiter::new(60);
        for _ in 0..60 {
            let (allowed, _) = limiter.should_allow(LogCategory::Raster);
            assert!(allowed, "Should allow logs within the rate limit");
        }
        let (allowed, _) = limiter.should_allow(LogCategory::Raster);
        assert!(!allowed, "Should block logs exceeding the rate limit");

        let (allowed, _) = limiter.should_allow(LogCategory::Compare);
        assert!(allowed, "Other categories keep their own budget");
    }

    #[test]
    fn test_rate_limiter_reports_dropped_count() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            limiter.should_allow(LogCategory::Fragment);
        }
        // The first drop reports immediately, the rest accumulate
        let (allowed, first_report) = limiter.should_allow(LogCategory::Fragment);
        assert!(!allowed);
        assert_eq!(first_report, Some(1));
        for _ in 0..9 {
            limiter.should_allow(LogCategory::Fragment);
        }

        std::thread::sleep(Duration::from_millis(1100));

        let (allowed, dropped) = limiter.should_allow(LogCategory::Fragment);
        assert!(allowed, "Should be allowed after window slides");
        assert_eq!(dropped, Some(9));
    }
}
