//! Intermediate representation.
//!
//! The IR follows the usual compiler layering:
//!
//! - [`Module`] - functions, globals, constructor/destructor lists, keep-alive list
//! - [`Function`] - blocks, linkage, attributes, metadata
//! - [`BasicBlock`] - a body of instructions plus one terminator
//! - [`Instruction`] - an [`Op`] with debug location, unsafe tag and captured provenance
//!
//! Values are either instruction results ([`InstId`]), arguments, constants, symbol
//! addresses or `undef`. Instruction ids are stable across insertion and removal, which is
//! what lets the instrumentation passes collect targets first and mutate afterwards.
//!
//! # Building IR
//!
//! ```rust
//! use unsafescope::ir::{BinaryOp, DebugLoc, Function, FunctionType, IrBuilder, Op, Type, Value};
//!
//! let mut func = Function::new("copy", FunctionType::new(Type::Void, vec![Type::Ptr]));
//! let entry = func.add_block("entry", Op::Ret { value: None });
//!
//! let mut b = IrBuilder::at_end(&mut func, entry)?;
//! b.set_debug_loc(Some(DebugLoc::new("src/lib.rs", 12, 9)));
//! b.set_unsafe(true);
//! let v = b.load(Type::I32, Value::Arg(0));
//! b.set_unsafe(false);
//! let w = b.binary(BinaryOp::Add, v, Value::i32(1));
//! b.store(w, Value::Arg(0));
//! # Ok::<(), unsafescope::Error>(())
//! ```

mod block;
mod builder;
mod function;
mod instruction;
mod module;
mod ops;
mod types;
mod value;
mod verify;

pub use block::BasicBlock;
pub use builder::IrBuilder;
pub use function::{Function, FunctionAttributes, Linkage, Metadata};
pub use instruction::{DebugLoc, Instruction, UnsafeLineInfo};
pub use module::{GlobalVariable, Module, StructorEntry};
pub use ops::{AtomicOrdering, BinaryOp, Callee, CastKind, InlineAsm, Op};
pub use types::{FunctionType, Type};
pub use value::{BlockId, Constant, InstId, Value};
pub use verify::{Verifier, VerifyError};
