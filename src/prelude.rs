//! # unsafescope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the unsafescope library. Import this module to get quick access to the IR model,
//! the pipeline configuration and the scheduler.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all unsafescope operations
pub use crate::Error;

/// The result type used throughout unsafescope
pub use crate::Result;

// ================================================================================================
// IR Model
// ================================================================================================

/// Translation units, functions and globals
pub use crate::ir::{Function, GlobalVariable, Linkage, Metadata, Module};

/// Blocks, instructions and their annotations
pub use crate::ir::{BasicBlock, BlockId, DebugLoc, InstId, Instruction, UnsafeLineInfo};

/// Operations, values and types
pub use crate::ir::{
    AtomicOrdering, BinaryOp, Callee, CastKind, Constant, FunctionType, InlineAsm, Op, Type,
    Value,
};

/// Instruction insertion and structural checks
pub use crate::ir::{IrBuilder, Verifier, VerifyError};

// ================================================================================================
// Pipeline
// ================================================================================================

/// Configuration and per-run state
pub use crate::compiler::{InstrumentContext, InstrumentFamily, PipelineConfig};

/// Pass trait and scheduler
pub use crate::compiler::{InstrumentPass, PassScheduler};

/// Change tracking
pub use crate::compiler::{DerivedStats, Event, EventKind, EventLog};

/// Region sentinels and unsafe categories
pub use crate::compiler::{category::UnsafeCategory, regions::MarkerKind, runtime::RuntimeFn};

// ================================================================================================
// Passes
// ================================================================================================

/// The instrumentation stages and optimizer stand-ins
pub use crate::compiler::passes::{
    BlockCounterPass, CycleTimerPass, DeadCodeEliminationPass, DeadGlobalEliminationPass,
    DebugInfoPreserverPass, ExternalCallTimerPass, FunctionTrackerPass, HeapTrackerPass,
    LineCoveragePass, RegionMarkerPass,
};
