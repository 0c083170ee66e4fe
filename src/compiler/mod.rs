//! Pass infrastructure and the instrumentation stages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    Instrumentation Pipeline                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  PipelineConfig               Primary-unit flag, stage switches  │
//! │    └─ from_vars / apply_flag  (families, command-line flags)     │
//! │                                                                  │
//! │  InstrumentContext            Per-run state                      │
//! │    ├─ PipelineConfig                                             │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PassScheduler                4-phase execution                  │
//! │    ├─ Phase 1: Early          (region marker, debug-info)        │
//! │    ├─ Phase 2: Optimize       (DCE, global DCE, to fixpoint)     │
//! │    ├─ Phase 3: Identity       (function ids, metadata table)     │
//! │    └─ Phase 4: Late           (counts, coverage, heap, timing)   │
//! │    Instrumentation phases run once, on the primary unit only     │
//! │                                                                  │
//! │  InstrumentPass trait         Interface for all passes           │
//! │    ├─ run_on_function()       Per-function transformation        │
//! │    ├─ run_on_module()         Whole-module transformation        │
//! │    ├─ initialize()            Runtime declarations               │
//! │    └─ finalize()              Cleanup after the pass             │
//! │                                                                  │
//! │  Shared analyses                                                 │
//! │    ├─ regions                 Sentinels, region state machine    │
//! │    ├─ category                Unsafe instruction categories      │
//! │    └─ runtime                 Runtime entry points, namespace    │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod context;
mod events;
mod pass;
mod scheduler;

pub mod category;
pub mod passes;
pub mod regions;
pub mod runtime;

pub use config::{InstrumentFamily, PipelineConfig, FAMILIES_VAR, FLAGS_VAR, PRIMARY_PACKAGE_VAR};
pub use context::InstrumentContext;
pub use events::{DerivedStats, Event, EventBuilder, EventKind, EventLog};
pub use pass::InstrumentPass;
pub use scheduler::PassScheduler;
