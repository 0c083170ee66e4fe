//! Per-run instrumentation context.
//!
//! The [`InstrumentContext`] is the only state that lives for one pipeline run: the
//! configuration the run was started with and the event log every pass records into.
//! Passes themselves are stateless and receive the context by shared reference.

use std::time::{Duration, Instant};

use crate::compiler::{
    config::PipelineConfig,
    events::{DerivedStats, EventLog},
};

/// Context shared by all passes during one pipeline run.
pub struct InstrumentContext {
    /// Stage selection and primary-unit flag.
    pub config: PipelineConfig,

    /// Accumulated events from all passes.
    pub events: EventLog,

    /// When the run started.
    start_time: Instant,
}

impl InstrumentContext {
    /// Creates a new context for the given configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            events: EventLog::new(),
            start_time: Instant::now(),
        }
    }

    /// Returns the elapsed time since the run started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns true if the unit being compiled is the primary one.
    #[must_use]
    pub fn is_primary_unit(&self) -> bool {
        self.config.primary_unit
    }

    /// Computes statistics over everything recorded so far.
    #[must_use]
    pub fn stats(&self) -> DerivedStats {
        DerivedStats::from_log(&self.events).with_time(self.elapsed())
    }
}

impl Default for InstrumentContext {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}
