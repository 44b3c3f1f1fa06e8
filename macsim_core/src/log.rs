//! The in-memory structured log stream (§4.9 expansion). Shaped directly after the
//! teacher's `simulation/data_structs.rs` `LogItem`/`LogLevel`/`LogSource`: every
//! notable event during a run is appended as one `LogItem` rather than printed
//! directly, so a CLI front-end or a test can filter/inspect the trace after the fact.

use serde::{Deserialize, Serialize};

use crate::units::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
}

/// Which actor produced a log line: the driver itself, or a specific node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    Simulation,
    Node(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogItem {
    pub tick: Tick,
    pub source: LogSource,
    pub level: LogLevel,
    pub content: String,
}

impl LogItem {
    pub fn new(tick: Tick, source: LogSource, level: LogLevel, content: impl Into<String>) -> Self {
        LogItem {
            tick,
            source,
            level,
            content: content.into(),
        }
    }
}

/// An append-only collection of [`LogItem`]s, owned by the [`crate::simulator::Simulator`]
/// for the duration of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Log {
    items: Vec<LogItem>,
}

impl Log {
    pub fn new() -> Self {
        Log { items: Vec::new() }
    }

    pub fn push(&mut self, item: LogItem) {
        self.items.push(item);
    }

    pub fn record(&mut self, tick: Tick, source: LogSource, level: LogLevel, content: impl Into<String>) {
        self.push(LogItem::new(tick, source, level, content));
    }

    pub fn items(&self) -> &[LogItem] {
        &self.items
    }

    pub fn iter_level(&self, level: LogLevel) -> impl Iterator<Item = &LogItem> {
        self.items.iter().filter(move |item| item.level == level)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_level() {
        let mut log = Log::new();
        log.record(Tick::new(0), LogSource::Simulation, LogLevel::Info, "start");
        log.record(Tick::new(1), LogSource::Node(2), LogLevel::Warning, "collision");
        log.record(Tick::new(2), LogSource::Node(0), LogLevel::Debug, "tick");

        assert_eq!(log.len(), 3);
        assert_eq!(log.iter_level(LogLevel::Warning).count(), 1);
    }
}
