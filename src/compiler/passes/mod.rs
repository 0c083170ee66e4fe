//! Instrumentation passes.
//!
//! Each pass implements [`InstrumentPass`](crate::compiler::InstrumentPass) and is scheduled
//! into one phase by [`PassScheduler`](crate::compiler::PassScheduler):
//!
//! | Pass | Phase | Kind |
//! |------|-------|------|
//! | [`RegionMarkerPass`] | early | function |
//! | [`DebugInfoPreserverPass`] | early | module |
//! | [`DeadCodeEliminationPass`] | optimize | function |
//! | [`DeadGlobalEliminationPass`] | optimize | module |
//! | [`FunctionTrackerPass`] | identity | module |
//! | [`BlockCounterPass`] | late | function |
//! | [`LineCoveragePass`] | late | module |
//! | [`HeapTrackerPass`] | late | function |
//! | [`ExternalCallTimerPass`] | late | module |
//! | [`CycleTimerPass`] | late | module |

mod counter;
mod coverage;
mod cycles;
mod deadcode;
mod debuginfo;
mod external;
mod functions;
mod heap;
mod marker;

pub use counter::{BlockCounterPass, BlockCounts};
pub use coverage::{collect_tracked_lines, LineCoveragePass, LineKey, UnsafeLineSet};
pub use cycles::CycleTimerPass;
pub use deadcode::{DeadCodeEliminationPass, DeadGlobalEliminationPass};
pub use debuginfo::DebugInfoPreserverPass;
pub use external::{external_functions, ExternalCallTimerPass};
pub use functions::{function_id, read_function_table, FunctionRecord, FunctionTrackerPass};
pub use heap::HeapTrackerPass;
pub use marker::RegionMarkerPass;
