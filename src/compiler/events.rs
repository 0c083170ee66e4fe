//! Unified event logging for the instrumentation pipeline.
//!
//! Every stage records what it inserted, skipped or removed. Events can be inspected
//! for debugging or in tests, or safely ignored when not needed.
//!
//! # Architecture
//!
//! The system is built around three main types:
//!
//! - [`Event`] - A single recorded event (change, warning, info, etc.)
//! - [`EventLog`] - Collection of events with query and summary capabilities
//! - [`EventBuilder`] - Fluent API for creating events
//!
//! # Example
//!
//! ```rust
//! use unsafescope::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//!
//! log.record(EventKind::RegionMarked)
//!     .at("parse_header", 2)
//!     .message("region spans 3 instructions");
//!
//! log.info("Starting pass: region-marker");
//!
//! assert_eq!(log.summary(), "1 region marked");
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    time::Duration,
};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A begin/end sentinel pair was inserted into a block.
    RegionMarked,
    /// Source provenance was captured on an unsafe instruction.
    LineInfoCaptured,
    /// PHI nodes were moved back to the front of a block.
    PhiReordered,
    /// Source locations were attached to the preservation anchor.
    DebugInfoAnchored,
    /// A function received an identity.
    FunctionIdentified,
    /// The per-function metadata table was emitted.
    MetadataTableEmitted,
    /// A start-up routine was synthesized and registered.
    StartupRoutineCreated,
    /// An exit routine was registered.
    ExitRoutineRegistered,
    /// A function entry report was inserted.
    EntryInstrumented,
    /// A block statistics report was inserted.
    BlockReported,
    /// A line execution tracking call was inserted.
    LineTracked,
    /// A line registration call was emitted.
    LineRegistered,
    /// A region was bracketed with timing calls.
    RegionTimed,
    /// A sentinel was removed.
    MarkerRemoved,
    /// An external call was bracketed with timing calls.
    ExternalCallTimed,
    /// An external call could not be timed.
    ExternalCallSkipped,
    /// A general memory access report was inserted.
    MemoryAccessTracked,
    /// An unsafe memory access report was inserted.
    UnsafeAccessTracked,
    /// A function was skipped because a precondition was missing.
    FunctionSkipped,
    /// An instruction was removed by the optimizer.
    InstructionRemoved,
    /// A global was removed by the optimizer.
    GlobalRemoved,

    /// A pass started.
    PassStarted,
    /// A pass completed.
    PassCompleted,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            // Transformations
            Self::RegionMarked => "region marked",
            Self::LineInfoCaptured => "line info captured",
            Self::PhiReordered => "phi reordered",
            Self::DebugInfoAnchored => "debug info anchored",
            Self::FunctionIdentified => "function identified",
            Self::MetadataTableEmitted => "metadata table emitted",
            Self::StartupRoutineCreated => "startup routine created",
            Self::ExitRoutineRegistered => "exit routine registered",
            Self::EntryInstrumented => "entry instrumented",
            Self::BlockReported => "block reported",
            Self::LineTracked => "line tracked",
            Self::LineRegistered => "line registered",
            Self::RegionTimed => "region timed",
            Self::MarkerRemoved => "marker removed",
            Self::ExternalCallTimed => "external call timed",
            Self::MemoryAccessTracked => "memory access tracked",
            Self::UnsafeAccessTracked => "unsafe access tracked",
            Self::InstructionRemoved => "instruction removed",
            Self::GlobalRemoved => "global removed",
            // Skips
            Self::ExternalCallSkipped => "external call skipped",
            Self::FunctionSkipped => "function skipped",
            // Engine
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            // Diagnostic
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents an IR transformation.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::RegionMarked
                | Self::LineInfoCaptured
                | Self::PhiReordered
                | Self::DebugInfoAnchored
                | Self::FunctionIdentified
                | Self::MetadataTableEmitted
                | Self::StartupRoutineCreated
                | Self::ExitRoutineRegistered
                | Self::EntryInstrumented
                | Self::BlockReported
                | Self::LineTracked
                | Self::LineRegistered
                | Self::RegionTimed
                | Self::MarkerRemoved
                | Self::ExternalCallTimed
                | Self::MemoryAccessTracked
                | Self::UnsafeAccessTracked
                | Self::InstructionRemoved
                | Self::GlobalRemoved
        )
    }

    /// Returns true if this is a diagnostic event (info/warning/error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The function where the event occurred (if applicable).
    pub function: Option<String>,
    /// Block index within the function.
    pub location: Option<usize>,
    /// Human-readable description.
    pub message: String,
    /// Associated pass name (if from a pass).
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            function: None,
            location: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.kind)?;
        match (&self.function, self.location) {
            (Some(function), Some(block)) => write!(f, "@{function} bb{block}: ")?,
            (Some(function), None) => write!(f, "@{function}: ")?,
            _ => {}
        }
        f.write_str(&self.message)
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is automatically added
/// to the log when the builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    function: Option<String>,
    location: Option<usize>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            function: None,
            location: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the function and block where the event occurred.
    pub fn at(mut self, function: impl Into<String>, block: usize) -> Self {
        self.function = Some(function.into());
        self.location = Some(block);
        self
    }

    /// Sets only the function (for function-level events).
    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a specific pass.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        let event = Event {
            kind: self.kind,
            function: self.function.take(),
            location: self.location.take(),
            message,
            pass: self.pass.take(),
        };

        self.log.events.push(event);
    }
}

/// Collection of events from one pipeline run.
///
/// Provides methods for recording events, querying them, and generating
/// summaries. Statistics are derived from the events rather than tracked
/// separately. Appending only needs a shared reference.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        new_log.merge(self);
        new_log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    ///
    /// The event is automatically added when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of all events from another log.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(move |(_, e)| if e.kind == kind { Some(e) } else { None })
    }

    /// Returns an iterator over events for a specific function.
    pub fn filter_function<'a>(&'a self, function: &'a str) -> impl Iterator<Item = &'a Event> {
        self.events.iter().filter_map(move |(_, e)| {
            if e.function.as_deref() == Some(function) {
                Some(e)
            } else {
                None
            }
        })
    }

    /// Returns an iterator over events recorded by a specific pass.
    pub fn filter_pass<'a>(&'a self, pass: &'a str) -> impl Iterator<Item = &'a Event> {
        self.events.iter().filter_map(move |(_, e)| {
            if e.pass.as_deref() == Some(pass) {
                Some(e)
            } else {
                None
            }
        })
    }

    /// Returns an iterator over warning events.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of transformation events.
    #[must_use]
    pub fn transformation_count(&self) -> usize {
        self.events
            .iter()
            .filter(|(_, e)| e.kind.is_transformation())
            .count()
    }

    /// Returns the number of distinct functions with transformation events.
    #[must_use]
    pub fn functions_affected(&self) -> usize {
        self.events
            .iter()
            .filter(|(_, e)| e.kind.is_transformation())
            .filter_map(|(_, e)| e.function.as_deref())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Generates a human-readable summary of all events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let counts = self.count_by_kind();

        // Only show transformation counts in summary
        let mut parts: Vec<String> = counts
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

impl Extend<Event> for EventLog {
    fn extend<T: IntoIterator<Item = Event>>(&mut self, iter: T) {
        for event in iter {
            self.events.push(event);
        }
    }
}

/// Statistics derived from an EventLog.
///
/// All numbers are computed from events; nothing is tracked separately.
#[derive(Debug, Clone, Default)]
pub struct DerivedStats {
    /// Number of functions that had any transformations.
    pub functions_instrumented: usize,
    /// Number of sentinel pairs inserted.
    pub regions_marked: usize,
    /// Number of functions that received an identity.
    pub functions_identified: usize,
    /// Number of block reports inserted.
    pub blocks_reported: usize,
    /// Number of line tracking calls inserted.
    pub lines_tracked: usize,
    /// Number of line registrations emitted.
    pub lines_registered: usize,
    /// Number of regions timed.
    pub regions_timed: usize,
    /// Number of external calls timed.
    pub external_calls_timed: usize,
    /// Number of external calls that could not be timed.
    pub external_calls_skipped: usize,
    /// Number of general memory access reports.
    pub memory_accesses: usize,
    /// Number of unsafe memory access reports.
    pub unsafe_accesses: usize,
    /// Number of functions skipped for missing preconditions.
    pub functions_skipped: usize,
    /// Number of instructions removed by the optimizer.
    pub instructions_removed: usize,
    /// Number of warnings.
    pub warnings: usize,
    /// Number of errors.
    pub errors: usize,
    /// Processing time.
    pub total_time: Duration,
}

impl DerivedStats {
    /// Computes statistics from an event log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let get = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0);

        Self {
            functions_instrumented: log.functions_affected(),
            regions_marked: get(EventKind::RegionMarked),
            functions_identified: get(EventKind::FunctionIdentified),
            blocks_reported: get(EventKind::BlockReported),
            lines_tracked: get(EventKind::LineTracked),
            lines_registered: get(EventKind::LineRegistered),
            regions_timed: get(EventKind::RegionTimed),
            external_calls_timed: get(EventKind::ExternalCallTimed),
            external_calls_skipped: get(EventKind::ExternalCallSkipped),
            memory_accesses: get(EventKind::MemoryAccessTracked),
            unsafe_accesses: get(EventKind::UnsafeAccessTracked),
            functions_skipped: get(EventKind::FunctionSkipped),
            instructions_removed: get(EventKind::InstructionRemoved),
            warnings: get(EventKind::Warning),
            errors: get(EventKind::Error),
            total_time: Duration::ZERO,
        }
    }

    /// Sets the total processing time.
    #[must_use]
    pub fn with_time(mut self, time: Duration) -> Self {
        self.total_time = time;
        self
    }

    /// Generates a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let counters = [
            (self.functions_instrumented, "functions"),
            (self.regions_marked, "regions marked"),
            (self.functions_identified, "functions identified"),
            (self.blocks_reported, "blocks reported"),
            (self.lines_tracked, "lines tracked"),
            (self.lines_registered, "lines registered"),
            (self.regions_timed, "regions timed"),
            (self.external_calls_timed, "external calls timed"),
            (self.external_calls_skipped, "external calls skipped"),
            (self.memory_accesses, "memory accesses"),
            (self.unsafe_accesses, "unsafe accesses"),
            (self.functions_skipped, "functions skipped"),
            (self.instructions_removed, "instructions removed"),
            (self.errors, "errors"),
            (self.warnings, "warnings"),
        ];

        let parts: Vec<String> = counters
            .iter()
            .filter(|(count, _)| *count > 0)
            .map(|(count, label)| format!("{count} {label}"))
            .collect();

        let stats = if parts.is_empty() {
            "no transformations".to_string()
        } else {
            parts.join(", ")
        };

        if self.total_time.as_millis() > 0 {
            format!("{} in {:?}", stats, self.total_time)
        } else {
            stats
        }
    }
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_log() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert!(!log.has(EventKind::RegionMarked));
        assert_eq!(log.summary(), "no events");
    }

    #[test]
    fn test_record_event() {
        let log = EventLog::new();

        log.record(EventKind::BlockReported)
            .at("hash_bytes", 3)
            .message("total=4 unsafe=3");

        assert_eq!(log.len(), 1);
        assert!(log.has(EventKind::BlockReported));

        let event = log.iter().next().unwrap();
        assert_eq!(event.function.as_deref(), Some("hash_bytes"));
        assert_eq!(event.location, Some(3));
        assert_eq!(event.message, "total=4 unsafe=3");
        assert_eq!(event.to_string(), "[block reported] @hash_bytes bb3: total=4 unsafe=3");
    }

    #[test]
    fn test_info_warn_error() {
        let log = EventLog::new();

        log.info("informational message");
        log.warn("warning message");
        log.error("error message");

        assert_eq!(log.count_kind(EventKind::Info), 1);
        assert_eq!(log.count_kind(EventKind::Warning), 1);
        assert_eq!(log.count_kind(EventKind::Error), 1);
        assert_eq!(log.warnings().count(), 1);
        assert_eq!(log.summary(), "3 events");
    }

    #[test]
    fn test_merge() {
        let log1 = EventLog::new();
        let log2 = EventLog::new();

        log1.record(EventKind::RegionMarked).at("f", 0);
        log2.record(EventKind::RegionTimed).at("f", 0);

        log1.merge(&log2);

        assert_eq!(log1.len(), 2);
        assert!(log1.has(EventKind::RegionMarked));
        assert!(log1.has(EventKind::RegionTimed));
        assert_eq!(log2.len(), 1);
    }

    #[test]
    fn test_summary() {
        let log = EventLog::new();

        log.record(EventKind::LineTracked).at("f", 0);
        log.record(EventKind::LineTracked).at("g", 1);
        log.record(EventKind::LineRegistered);
        log.info("ignored in summary");

        let summary = log.summary();
        assert_eq!(summary, "1 line registered, 2 line tracked");
    }

    #[test]
    fn test_filters() {
        let log = EventLog::new();

        log.record(EventKind::MemoryAccessTracked)
            .at("f", 0)
            .pass("heap-tracker");
        log.record(EventKind::UnsafeAccessTracked)
            .at("g", 0)
            .pass("heap-tracker");
        log.record(EventKind::BlockReported)
            .at("f", 1)
            .pass("block-counter");

        assert_eq!(log.filter_function("f").count(), 2);
        assert_eq!(log.filter_pass("heap-tracker").count(), 2);
        assert_eq!(log.filter_kind(EventKind::BlockReported).count(), 1);
        assert_eq!(log.transformation_count(), 3);
    }

    #[test]
    fn test_default_message() {
        let log = EventLog::new();

        log.record(EventKind::ExternalCallSkipped).at("f", 2);

        let event = log.iter().next().unwrap();
        assert_eq!(event.message, "external call skipped");
        assert!(!event.kind.is_transformation());
    }

    #[test]
    fn test_derived_stats() {
        let log = EventLog::new();

        log.record(EventKind::RegionMarked).at("f", 0);
        log.record(EventKind::RegionMarked).at("g", 0);
        log.record(EventKind::BlockReported).at("f", 0);
        log.record(EventKind::FunctionSkipped).function("h");
        log.warn("unpaired marker");

        let stats = DerivedStats::from_log(&log);
        assert_eq!(stats.functions_instrumented, 2);
        assert_eq!(stats.regions_marked, 2);
        assert_eq!(stats.blocks_reported, 1);
        assert_eq!(stats.functions_skipped, 1);
        assert_eq!(stats.warnings, 1);
        assert_eq!(
            stats.summary(),
            "2 functions, 2 regions marked, 1 blocks reported, 1 functions skipped, 1 warnings"
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let log = EventLog::new();
        log.record(EventKind::RegionMarked).at("f", 0);

        let copy = log.clone();
        copy.record(EventKind::RegionTimed).at("f", 0);

        assert_eq!(log.len(), 1);
        assert_eq!(copy.len(), 2);
    }
}
