//! Block-level unsafe instruction counting.
//!
//! For every block of an identified function, counts how many instructions it executes and
//! how many of those sit inside an unsafe region, broken down by [`UnsafeCategory`]. The
//! counts are static; the runtime multiplies them by how often the report call runs.
//!
//! Only the program's own instructions are counted. Terminators, debug intrinsics,
//! sentinels and calls into the runtime namespace are left out.

use strum::EnumCount;

use crate::{
    compiler::{
        category::UnsafeCategory,
        passes::function_id,
        regions::{self, MarkerKind},
        runtime::{self, RuntimeFn},
        EventKind, EventLog, InstrumentContext, InstrumentPass,
    },
    ir::{BasicBlock, Function, Instruction, IrBuilder, Module, Type, Value},
    Result,
};

/// Static instruction counts of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockCounts {
    /// Counted instructions.
    pub total: u32,
    /// Counted instructions inside a region.
    pub unsafe_total: u32,
    /// Per-category counts of instructions inside a region, indexed by
    /// [`UnsafeCategory::index`].
    pub categories: [u32; UnsafeCategory::COUNT],
}

impl BlockCounts {
    /// Counts a block, starting outside any region.
    #[must_use]
    pub fn of_block(block: &BasicBlock) -> Self {
        let mut counts = Self::default();
        for (_, inst, inside) in regions::scan_block(block) {
            if !Self::is_counted(inst) {
                continue;
            }
            counts.total += 1;
            if inside {
                counts.unsafe_total += 1;
                counts.categories[UnsafeCategory::of(inst.op()).index()] += 1;
            }
        }
        counts
    }

    /// Returns true for instructions that belong to the program itself.
    fn is_counted(inst: &Instruction) -> bool {
        if inst.op().is_debug() || MarkerKind::of(inst).is_some() {
            return false;
        }
        !inst
            .op()
            .called_function()
            .is_some_and(runtime::is_runtime_symbol)
    }

    /// Returns the count for a category.
    #[must_use]
    pub fn category(&self, category: UnsafeCategory) -> u32 {
        self.categories[category.index()]
    }

    /// The category arguments of the report call, saturated to 16 bits.
    #[must_use]
    pub fn saturated_categories(&self) -> [u16; UnsafeCategory::COUNT] {
        self.categories
            .map(|count| u16::try_from(count).unwrap_or(u16::MAX))
    }
}

/// Reports per-block instruction counts to the runtime.
pub struct BlockCounterPass;

impl Default for BlockCounterPass {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockCounterPass {
    /// Creates a new block counter pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn report_args(id: u32, counts: &BlockCounts) -> Vec<Value> {
        let mut args = vec![
            Value::i32(id),
            Value::i32(counts.total),
            Value::i32(counts.unsafe_total),
        ];
        args.extend(counts.saturated_categories().into_iter().map(Value::i16));
        args
    }
}

impl InstrumentPass for BlockCounterPass {
    fn name(&self) -> &'static str {
        "unsafe-inst-counter"
    }

    fn description(&self) -> &'static str {
        "Reports per-block total, unsafe and per-category instruction counts"
    }

    fn initialize(&self, module: &mut Module, _ctx: &InstrumentContext) -> Result<()> {
        RuntimeFn::RecordBlock.declare(module);
        Ok(())
    }

    fn run_on_function(&self, func: &mut Function, ctx: &InstrumentContext) -> Result<bool> {
        if !ctx.is_primary_unit() {
            return Ok(false);
        }
        let Some(id) = function_id(func) else {
            log::debug!("{}: no function id, skipping block counts", func.name());
            ctx.events
                .record(EventKind::FunctionSkipped)
                .function(func.name())
                .pass(self.name())
                .message("no function id");
            return Ok(false);
        };

        let reports: Vec<_> = func
            .blocks()
            .iter()
            .map(|block| (block.id(), BlockCounts::of_block(block)))
            .filter(|(_, counts)| counts.total > 0)
            .collect();

        let changes = EventLog::new();
        for (block, counts) in reports {
            IrBuilder::at_end(func, block)?.call(
                RuntimeFn::RecordBlock.name(),
                Self::report_args(id, &counts),
                Type::Void,
            );
            changes
                .record(EventKind::BlockReported)
                .at(func.name(), block.index())
                .message(format!(
                    "total={} unsafe={}",
                    counts.total, counts.unsafe_total
                ));
        }

        let changed = !changes.is_empty();
        if changed {
            ctx.events.merge(&changes);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::{passes::RegionMarkerPass, runtime::FUNCTION_ID_METADATA},
        ir::{Metadata, Op},
        test::{primary_context, safe_function, scenario_function},
    };

    fn identified(mut func: Function, id: u64) -> Function {
        func.set_metadata(FUNCTION_ID_METADATA, Metadata::Int(id));
        func
    }

    fn marked(mut func: Function) -> Function {
        RegionMarkerPass::new()
            .run_on_function(&mut func, &primary_context())
            .unwrap();
        func
    }

    fn report_args(func: &Function) -> Vec<Vec<u64>> {
        func.instructions()
            .filter_map(|i| match i.op() {
                Op::Call { args, .. }
                    if i.op().called_function() == Some("__unsafe_record_block") =>
                {
                    Some(args.iter().filter_map(Value::as_const_int).collect())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_mixed_block_counts() {
        let func = marked(scenario_function("f"));
        let counts = BlockCounts::of_block(&func.blocks()[0]);

        assert_eq!(counts.total, 4);
        assert_eq!(counts.unsafe_total, 3);
        assert_eq!(counts.category(UnsafeCategory::Load), 1);
        assert_eq!(counts.category(UnsafeCategory::Store), 1);
        assert_eq!(counts.category(UnsafeCategory::Other), 1);
        assert_eq!(counts.category(UnsafeCategory::Call), 0);
    }

    #[test]
    fn test_report_inserted_before_terminator() {
        let mut func = identified(marked(scenario_function("f")), 5);
        let ctx = primary_context();

        assert!(BlockCounterPass::new().run_on_function(&mut func, &ctx).unwrap());
        assert_eq!(report_args(&func), vec![vec![5, 4, 3, 1, 1, 0, 0, 0, 1]]);

        let body = func.blocks()[0].instructions();
        assert_eq!(
            body.last().and_then(|i| i.op().called_function()),
            Some("__unsafe_record_block")
        );
        assert_eq!(ctx.events.count_kind(EventKind::BlockReported), 1);
    }

    #[test]
    fn test_safe_block_reports_zeros() {
        let mut func = identified(safe_function("f"), 0);
        BlockCounterPass::new()
            .run_on_function(&mut func, &primary_context())
            .unwrap();
        assert_eq!(report_args(&func), vec![vec![0, 3, 0, 0, 0, 0, 0, 0, 0]]);
    }

    #[test]
    fn test_unmarked_unsafe_counts_as_safe() {
        let func = scenario_function("f");
        let counts = BlockCounts::of_block(&func.blocks()[0]);
        assert_eq!(counts.total, 4);
        assert_eq!(counts.unsafe_total, 0);
    }

    #[test]
    fn test_runtime_calls_not_counted() {
        let mut func = marked(scenario_function("f"));
        IrBuilder::at_start(&mut func, crate::ir::BlockId::new(0))
            .unwrap()
            .call("__unsafe_record_function", vec![Value::i32(0)], Type::Void);
        IrBuilder::at_start(&mut func, crate::ir::BlockId::new(0))
            .unwrap()
            .dbg_value(Value::Arg(0), "p");

        assert_eq!(BlockCounts::of_block(&func.blocks()[0]).total, 4);
    }

    #[test]
    fn test_empty_block_skipped() {
        let mut func = Function::new("f", crate::ir::FunctionType::void());
        func.add_block("entry", Op::Ret { value: None });
        let mut func = identified(func, 0);

        assert!(!BlockCounterPass::new()
            .run_on_function(&mut func, &primary_context())
            .unwrap());
        assert!(report_args(&func).is_empty());
    }

    #[test]
    fn test_missing_id_skips_function() {
        let mut func = marked(scenario_function("f"));
        let before = func.clone();
        let ctx = primary_context();

        assert!(!BlockCounterPass::new().run_on_function(&mut func, &ctx).unwrap());
        assert_eq!(func, before);
        assert_eq!(ctx.events.count_kind(EventKind::FunctionSkipped), 1);
    }

    #[test]
    fn test_categories_saturate() {
        let mut counts = BlockCounts::default();
        counts.categories[UnsafeCategory::Load.index()] = 70_000;
        assert_eq!(counts.saturated_categories()[0], u16::MAX);
    }
}
