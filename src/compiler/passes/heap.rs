//! Load and store reporting.
//!
//! Every load and store is preceded by `dyn_mem_access(ptr)`. Accesses inside an unsafe
//! region additionally report `dyn_unsafe_mem_access(ptr, is_load)`, placed after the
//! general report, so the runtime can relate unsafe traffic to total traffic.

use crate::{
    compiler::{
        regions, runtime::RuntimeFn, EventKind, EventLog, InstrumentContext, InstrumentPass,
    },
    ir::{BlockId, Function, InstId, IrBuilder, Module, Op, Type, Value},
    Result,
};

/// A load or store to report.
#[derive(Clone)]
struct Access {
    block: usize,
    inst: InstId,
    ptr: Value,
    is_load: bool,
}

/// Reports loads and stores to the runtime.
pub struct HeapTrackerPass;

impl Default for HeapTrackerPass {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapTrackerPass {
    /// Creates a new heap tracker pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Collects every access and the subset inside a region.
    fn collect_accesses(func: &Function) -> (Vec<Access>, Vec<Access>) {
        let mut all = Vec::new();
        let mut unsafe_accesses = Vec::new();

        for block in func.blocks() {
            for (_, inst, inside) in regions::scan_block(block) {
                let Some(ptr) = inst.op().access_pointer() else {
                    continue;
                };
                let access = Access {
                    block: block.id().index(),
                    inst: inst.id(),
                    ptr: ptr.clone(),
                    is_load: matches!(inst.op(), Op::Load { .. }),
                };
                if inside {
                    unsafe_accesses.push(access.clone());
                }
                all.push(access);
            }
        }

        (all, unsafe_accesses)
    }
}

impl InstrumentPass for HeapTrackerPass {
    fn name(&self) -> &'static str {
        "heap-tracker"
    }

    fn description(&self) -> &'static str {
        "Reports every load and store, and separately those inside unsafe regions"
    }

    fn initialize(&self, module: &mut Module, _ctx: &InstrumentContext) -> Result<()> {
        RuntimeFn::MemAccess.declare(module);
        RuntimeFn::UnsafeMemAccess.declare(module);
        Ok(())
    }

    fn run_on_function(&self, func: &mut Function, ctx: &InstrumentContext) -> Result<bool> {
        if !ctx.is_primary_unit() {
            return Ok(false);
        }

        let (all, unsafe_accesses) = Self::collect_accesses(func);
        let changes = EventLog::new();

        for access in all {
            IrBuilder::before_in(func, BlockId::new(access.block), access.inst)?.call(
                RuntimeFn::MemAccess.name(),
                vec![access.ptr],
                Type::Void,
            );
            changes
                .record(EventKind::MemoryAccessTracked)
                .at(func.name(), access.block);
        }

        // Inserted directly before the access, which places them after the general report
        for access in unsafe_accesses {
            IrBuilder::before_in(func, BlockId::new(access.block), access.inst)?.call(
                RuntimeFn::UnsafeMemAccess.name(),
                vec![access.ptr, Value::bool(access.is_load)],
                Type::Void,
            );
            changes
                .record(EventKind::UnsafeAccessTracked)
                .at(func.name(), access.block);
        }

        let changed = !changes.is_empty();
        if changed {
            ctx.events.merge(&changes);
        }
        Ok(changed)
    }
}
