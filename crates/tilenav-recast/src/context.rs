//! Build context providing logging and per-stage timing
//!
//! Every entry is forwarded to the `log` facade and, when it passes the
//! context's level filter, also kept in a bounded in-memory buffer so a
//! caller can inspect what happened while a tile was built.

use std::collections::HashMap;
use std::time::Duration;
use web_time::Instant;

/// Log level for context messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Debug level messages
    Debug = 0,
    /// Informational messages
    Info = 1,
    /// Warning messages
    Warning = 2,
    /// Error messages
    Error = 3,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Timer categories, one per pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerCategory {
    /// Whole tile build
    Total,
    /// Heightfield rasterization
    Rasterization,
    /// Span filtering
    Filtering,
    /// Compact heightfield building
    CompactHeightfield,
    /// Walkable area erosion
    Erosion,
    /// Area overlay marking
    AreaMarking,
    /// Region partitioning
    Regions,
    /// Contour tracing
    Contours,
    /// Polygon mesh generation
    PolyMesh,
    /// Detail mesh generation
    DetailMesh,
    /// Tile data packing
    Packing,
}

/// Log entry containing message and metadata
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default)]
struct TimerEntry {
    total: Duration,
    count: usize,
}

/// Context for engine operations
#[derive(Debug)]
pub struct BuildContext {
    label: Option<String>,
    logs: Vec<LogEntry>,
    active_timers: HashMap<TimerCategory, Instant>,
    timers: HashMap<TimerCategory, TimerEntry>,
    min_log_level: LogLevel,
    enable_timing: bool,
    max_log_entries: usize,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildContext {
    /// Creates a context with default settings
    pub fn new() -> Self {
        Self {
            label: None,
            logs: Vec::new(),
            active_timers: HashMap::new(),
            timers: HashMap::new(),
            min_log_level: LogLevel::Info,
            enable_timing: true,
            max_log_entries: 1000,
        }
    }

    /// Creates a context whose messages are prefixed with `label`
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new()
        }
    }

    /// Sets the minimum level kept in the in-memory buffer
    pub fn set_log_level(&mut self, level: LogLevel) {
        self.min_log_level = level;
    }

    /// Enables or disables stage timing
    pub fn set_timing_enabled(&mut self, enabled: bool) {
        self.enable_timing = enabled;
    }

    /// Sets the maximum number of buffered log entries
    pub fn set_max_log_entries(&mut self, max_entries: usize) {
        self.max_log_entries = max_entries;
    }

    pub fn log_debug(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn log_warning(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        let facade_level: log::Level = level.into();
        match &self.label {
            Some(label) => log::log!(facade_level, "{}: {}", label, message),
            None => log::log!(facade_level, "{}", message),
        }

        if level >= self.min_log_level {
            self.logs.push(LogEntry { level, message });
            if self.logs.len() > self.max_log_entries {
                self.logs.remove(0);
            }
        }
    }

    /// Starts a timer for the given category
    pub fn start_timer(&mut self, category: TimerCategory) {
        if self.enable_timing {
            self.active_timers.insert(category, Instant::now());
        }
    }

    /// Stops a timer and accumulates its duration
    pub fn stop_timer(&mut self, category: TimerCategory) {
        if let Some(start) = self.active_timers.remove(&category) {
            let entry = self.timers.entry(category).or_default();
            entry.total += start.elapsed();
            entry.count += 1;
        }
    }

    /// Runs `f` between `start_timer` and `stop_timer` for `category`
    pub fn timed<T>(&mut self, category: TimerCategory, f: impl FnOnce(&mut Self) -> T) -> T {
        self.start_timer(category);
        let out = f(self);
        self.stop_timer(category);
        out
    }

    /// Gets the accumulated duration of a stopped timer
    pub fn timer_duration(&self, category: TimerCategory) -> Option<Duration> {
        self.timers.get(&category).map(|entry| entry.total)
    }

    /// How many times a timer was stopped
    pub fn timer_count(&self, category: TimerCategory) -> usize {
        self.timers.get(&category).map_or(0, |entry| entry.count)
    }

    /// Gets all buffered log entries
    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    /// Gets buffered entries of one level
    pub fn logs_by_level(&self, level: LogLevel) -> Vec<&LogEntry> {
        self.logs.iter().filter(|e| e.level == level).collect()
    }

    /// Clears logs and timers
    pub fn reset(&mut self) {
        self.logs.clear();
        self.active_timers.clear();
        self.timers.clear();
    }

    /// Writes the accumulated stage timings to the debug log, slowest first
    pub fn log_timer_summary(&self) {
        let mut sorted: Vec<_> = self.timers.iter().collect();
        sorted.sort_by(|a, b| b.1.total.cmp(&a.1.total));

        for (category, entry) in sorted {
            log::debug!(
                "{}{:?}: {:.2}ms ({} calls)",
                self.label
                    .as_deref()
                    .map(|l| format!("{}: ", l))
                    .unwrap_or_default(),
                category,
                entry.total.as_secs_f64() * 1000.0,
                entry.count
            );
        }
    }
}
