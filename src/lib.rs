// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # unsafescope
//!
//! An IR-level instrumentation pipeline that measures how much of a program's execution
//! time, memory traffic and source surface is attributable to code the source language
//! marked as `unsafe`.
//!
//! The pipeline runs inside an optimizing compiler. Unsafe-tagged instructions are wrapped
//! in side-effecting sentinels before optimization so the regions survive simplification.
//! After optimization, late stages read those regions and insert calls into an external
//! runtime statistics library at block exits, around regions, around external calls, and
//! before memory accesses.
//!
//! ## Features
//!
//! - **Region marking** - Per-block begin/end sentinels around unsafe spans, with source
//!   provenance captured before it can be lost
//! - **Function identity** - Dense function ids, an immutable per-function metadata table,
//!   and start-up/exit registration
//! - **Block counting** - Categorized per-block unsafe instruction counts reported at block exit
//! - **Line coverage** - Deterministic two-phase registration and execution tracking of unsafe lines
//! - **Cycle timing** - Fenced timestamp capture around regions and external calls
//! - **Heap tracking** - General and unsafe memory-access reporting
//!
//! ## Quick Start
//!
//! ```rust
//! use unsafescope::prelude::*;
//!
//! let mut module = Module::new("demo");
//! let mut func = Function::new("demo_fn", FunctionType::new(Type::Void, vec![Type::Ptr]));
//! let entry = func.add_block("entry", Op::Ret { value: None });
//! {
//!     let mut builder = IrBuilder::at_end(&mut func, entry)?;
//!     builder.set_unsafe(true);
//!     let value = builder.load(Type::I32, Value::Arg(0));
//!     builder.store(value, Value::Arg(0));
//! }
//! module.add_function(func)?;
//!
//! let config = PipelineConfig::primary().with_family(InstrumentFamily::UnsafeCounting);
//! let ctx = InstrumentContext::new(config.clone());
//! let changed = PassScheduler::from_config(&config).run_pipeline(&mut module, &ctx)?;
//! assert!(changed);
//! # Ok::<(), unsafescope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - The module / function / block / instruction model every stage works on
//! - [`compiler`] - Pass trait, scheduler, context, event log, and the instrumentation passes
//!
//! Stages are configured through [`compiler::PipelineConfig`]; resolving that configuration
//! from the process environment or command-line flags happens at the edge, never inside a pass.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use unsafescope::prelude::*;
///
/// let config = PipelineConfig::primary().with_family(InstrumentFamily::HeapTracking);
/// assert!(config.enable_heap_tracker);
/// ```
pub mod prelude;

/// The intermediate representation instrumented by the pipeline.
///
/// This module models the parts of a compiler IR the instrumentation needs: typed values,
/// instructions carrying debug locations and the unsafe tag, basic blocks with a single
/// terminator, functions with metadata and linkage, and modules with globals, the
/// constructor/destructor registration lists and the keep-alive list.
///
/// # Key Types
///
/// - [`ir::Module`] - A translation unit
/// - [`ir::Function`] - A function definition or declaration
/// - [`ir::BasicBlock`] - Straight-line body plus terminator
/// - [`ir::Instruction`] - An operation with provenance annotations
/// - [`ir::IrBuilder`] - Positioned instruction insertion
/// - [`ir::Verifier`] - Structural checks
pub mod ir;

/// Pass infrastructure and the instrumentation pipeline.
///
/// # Key Types
///
/// - [`compiler::InstrumentPass`] - The trait every stage implements
/// - [`compiler::PassScheduler`] - Phase ordering (early, optimize, identity, late)
/// - [`compiler::InstrumentContext`] - Configuration and event log for one run
/// - [`compiler::PipelineConfig`] - Primary-unit gating and per-stage enable flags
/// - [`compiler::EventLog`] - Append-only record of what every stage did
pub mod compiler;

pub use error::Error;

/// The generic Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
