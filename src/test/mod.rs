//! IR factories shared by unit tests.

use crate::{
    compiler::{InstrumentContext, PipelineConfig},
    ir::{BinaryOp, BlockId, DebugLoc, Function, FunctionType, IrBuilder, Module, Op, Type, Value},
};

// Helper function to create a scoped debug location
pub fn loc(file: &str, line: u32) -> DebugLoc {
    DebugLoc::new(file, line, 5).with_scope("scope")
}

// Helper function to create a context for a primary unit with every stage enabled
pub fn primary_context() -> InstrumentContext {
    InstrumentContext::new(PipelineConfig {
        primary_unit: true,
        enable_region_marker: true,
        enable_debug_info_preserver: true,
        enable_function_tracker: true,
        enable_block_counter: true,
        enable_line_coverage: true,
        enable_cycle_counter: true,
        enable_external_call_tracker: true,
        enable_heap_tracker: true,
    })
}

// Helper function to create a context for a dependency unit
pub fn dependency_context() -> InstrumentContext {
    let mut config = primary_context().config;
    config.primary_unit = false;
    InstrumentContext::new(config)
}

/// `fn(ptr, i32)` with one block:
///
/// ```text
/// %a = add %arg1, 1           ; safe
/// %v = load i32, %arg0        ; unsafe, lib.rs:11
/// %b = add %v, %a             ; safe, lib.rs:12
/// store %b, %arg0             ; unsafe, lib.rs:13
/// ret
/// ```
pub fn scenario_function(name: &str) -> Function {
    let mut func = Function::new(name, FunctionType::new(Type::Void, vec![Type::Ptr, Type::I32]));
    let entry = func.add_block("entry", Op::Ret { value: None });

    {
        let mut b = IrBuilder::at_end(&mut func, entry).unwrap();
        b.set_debug_loc(Some(loc("src/lib.rs", 10)));
        let a = b.binary(BinaryOp::Add, Value::Arg(1), Value::i32(1));
        b.set_unsafe(true);
        b.set_debug_loc(Some(loc("src/lib.rs", 11)));
        let v = b.load(Type::I32, Value::Arg(0));
        b.set_unsafe(false);
        b.set_debug_loc(Some(loc("src/lib.rs", 12)));
        let sum = b.binary(BinaryOp::Add, v, a);
        b.set_unsafe(true);
        b.set_debug_loc(Some(loc("src/lib.rs", 13)));
        b.store(sum, Value::Arg(0));
    }
    func
}

/// `fn(ptr)` that loads, increments and stores without any unsafe tag.
pub fn safe_function(name: &str) -> Function {
    let mut func = Function::new(name, FunctionType::new(Type::Void, vec![Type::Ptr]));
    let entry = func.add_block("entry", Op::Ret { value: None });

    {
        let mut b = IrBuilder::at_end(&mut func, entry).unwrap();
        b.set_debug_loc(Some(loc("src/safe.rs", 3)));
        let v = b.load(Type::I32, Value::Arg(0));
        let w = b.binary(BinaryOp::Add, v, Value::i32(1));
        b.store(w, Value::Arg(0));
    }
    func
}

/// `fn(ptr)` with a single unsafe store at `file:line`.
pub fn unsafe_store_function(name: &str, file: &str, line: u32) -> Function {
    let mut func = Function::new(name, FunctionType::new(Type::Void, vec![Type::Ptr]));
    let entry = func.add_block("entry", Op::Ret { value: None });

    {
        let mut b = IrBuilder::at_end(&mut func, entry).unwrap();
        b.set_debug_loc(Some(loc(file, line)));
        b.set_unsafe(true);
        b.store(Value::i32(0), Value::Arg(0));
    }
    func
}

/// Two blocks: an unsafe load in `entry` followed by a branch to `exit`, which calls the
/// external declaration `write` inside an unsafe region.
pub fn branching_function(name: &str) -> Function {
    let mut func = Function::new(name, FunctionType::new(Type::Void, vec![Type::Ptr]));
    let entry = func.add_block(
        "entry",
        Op::Br {
            target: BlockId::new(1),
        },
    );
    let exit = func.add_block("exit", Op::Ret { value: None });

    {
        let mut b = IrBuilder::at_end(&mut func, entry).unwrap();
        b.set_debug_loc(Some(loc("src/io.rs", 20)));
        b.set_unsafe(true);
        let v = b.load(Type::I64, Value::Arg(0));
        b.store(v, Value::Arg(0));
    }
    {
        let mut b = IrBuilder::at_end(&mut func, exit).unwrap();
        b.set_debug_loc(Some(loc("src/io.rs", 21)));
        b.set_unsafe(true);
        b.call("write", vec![Value::Arg(0)], Type::I64);
    }
    func
}

/// Two blocks: `entry` branches to `body`, which opens with an unsafe-tagged PHI that
/// feeds an unsafe load and store.
///
/// ```text
/// body:
///   %p = phi ptr [%arg0, entry]   ; unsafe, src/phi.rs:30
///   %v = load i32, %p             ; unsafe, src/phi.rs:31
///   store %v, %p                  ; unsafe, src/phi.rs:31
///   ret
/// ```
pub fn phi_function(name: &str) -> Function {
    let mut func = Function::new(name, FunctionType::new(Type::Void, vec![Type::Ptr]));
    let entry = func.add_block(
        "entry",
        Op::Br {
            target: BlockId::new(1),
        },
    );
    let body = func.add_block("body", Op::Ret { value: None });

    {
        let mut b = IrBuilder::at_end(&mut func, body).unwrap();
        b.set_unsafe(true);
        b.set_debug_loc(Some(loc("src/phi.rs", 30)));
        let p = b.phi(Type::Ptr, vec![(Value::Arg(0), entry)]);
        b.set_debug_loc(Some(loc("src/phi.rs", 31)));
        let v = b.load(Type::I32, p.clone());
        b.store(v, p);
    }
    func
}

/// The external declaration called by [`branching_function`].
pub fn write_declaration() -> Function {
    Function::new("write", FunctionType::new(Type::I64, vec![Type::Ptr]))
}

// Helper function to create a module from functions
pub fn module_with(functions: Vec<Function>) -> Module {
    let mut module = Module::new("test");
    for func in functions {
        module.add_function(func).unwrap();
    }
    module
}
