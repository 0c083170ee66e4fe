//! Cycle timing of unsafe regions.
//!
//! Replaces each sentinel pair with a pair of timing calls:
//!
//! ```text
//! begin                 fence seq_cst
//! ...          ==>      %t = call i64 @cpu_cycle_start_measurement()
//! end                   ...
//!                       fence seq_cst
//!                       call void @cpu_cycle_end_measurement(i64 %t)
//! ```
//!
//! The fences keep the region's memory operations from drifting out of the measured span.
//! After timing, every sentinel in the function is removed, paired or not. This consumes
//! the region boundaries, so the pass runs after every other stage that reads them.

use std::collections::HashSet;

use crate::{
    compiler::{
        regions::{self, MarkerKind},
        runtime::{self, RuntimeFn},
        EventKind, EventLog, InstrumentContext, InstrumentPass,
    },
    ir::{
        AtomicOrdering, Function, FunctionType, InstId, IrBuilder, Linkage, Module, Op, Type,
        Value,
    },
    Result,
};

/// Times unsafe regions in CPU cycles.
pub struct CycleTimerPass;

impl Default for CycleTimerPass {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleTimerPass {
    /// Creates a new cycle timer pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn emit_routines(module: &mut Module, changes: &EventLog) -> Result<bool> {
        if module.has_symbol(runtime::CYCLE_CTOR) {
            return Ok(false);
        }

        let mut ctor = Function::new(runtime::CYCLE_CTOR, FunctionType::void());
        ctor.set_linkage(Linkage::Internal);
        let entry = ctor.add_block("entry", Op::Ret { value: None });
        IrBuilder::at_end(&mut ctor, entry)?.call(
            RuntimeFn::ProgramStart.name(),
            Vec::new(),
            Type::Void,
        );
        module.add_function(ctor)?;
        module.append_to_global_ctors(runtime::CYCLE_CTOR, 0);
        changes
            .record(EventKind::StartupRoutineCreated)
            .function(runtime::CYCLE_CTOR);

        module.append_to_global_dtors(RuntimeFn::PrintCycleStats.name(), 0);
        changes
            .record(EventKind::ExitRoutineRegistered)
            .function(RuntimeFn::PrintCycleStats.name());
        Ok(true)
    }

    /// Returns the paired `(begin, end)` sentinels and every sentinel of the function.
    fn collect_markers(func: &Function) -> (Vec<(usize, InstId, InstId)>, Vec<InstId>) {
        let mut pairs = Vec::new();
        let mut all = Vec::new();

        for block in func.blocks() {
            let body = block.instructions();
            for span in regions::region_spans(body) {
                if let Some(end) = span.end {
                    pairs.push((block.id().index(), body[span.begin].id(), body[end].id()));
                }
            }
            all.extend(
                body.iter()
                    .filter(|inst| MarkerKind::of(inst).is_some())
                    .map(|inst| inst.id()),
            );
        }

        (pairs, all)
    }

    fn time_function(func: &mut Function, changes: &EventLog) -> Result<()> {
        let (pairs, markers) = Self::collect_markers(func);

        for &(block, begin, end) in &pairs {
            let start = {
                let mut builder = IrBuilder::after(func, begin)?;
                builder.fence(AtomicOrdering::SeqCst);
                builder.call(RuntimeFn::StartMeasurement.name(), Vec::new(), Type::I64)
            };
            let mut builder = IrBuilder::before(func, end)?;
            builder.fence(AtomicOrdering::SeqCst);
            builder.call(RuntimeFn::EndMeasurement.name(), vec![start], Type::Void);

            changes.record(EventKind::RegionTimed).at(func.name(), block);
        }

        let paired: HashSet<InstId> = pairs
            .iter()
            .flat_map(|&(_, begin, end)| [begin, end])
            .collect();

        for id in markers {
            let block = func.position_of(id).map_or(0, |(block, _)| block.index());
            if !paired.contains(&id) {
                log::warn!("{}: removing unpaired sentinel {id} in bb{block}", func.name());
                changes.warn(format!(
                    "{}: unpaired sentinel {id} in bb{block}",
                    func.name()
                ));
            }
            func.replace_all_uses_with(id, &Value::Undef(Type::Void));
            if func.erase(id).is_some() {
                changes.record(EventKind::MarkerRemoved).at(func.name(), block);
            }
        }

        Ok(())
    }
}

impl InstrumentPass for CycleTimerPass {
    fn name(&self) -> &'static str {
        "cpu-cycle-count"
    }

    fn description(&self) -> &'static str {
        "Brackets unsafe regions with cycle counter reads and removes the sentinels"
    }

    fn is_module_pass(&self) -> bool {
        true
    }

    fn run_on_module(&self, module: &mut Module, ctx: &InstrumentContext) -> Result<bool> {
        if !ctx.is_primary_unit() {
            return Ok(false);
        }

        RuntimeFn::ProgramStart.declare(module);
        RuntimeFn::StartMeasurement.declare(module);
        RuntimeFn::EndMeasurement.declare(module);
        RuntimeFn::PrintCycleStats.declare(module);

        let changes = EventLog::new();
        let mut changed = Self::emit_routines(module, &changes)?;

        for func in module.functions_mut() {
            if runtime::is_instrumentable(func) {
                Self::time_function(func, &changes)?;
            }
        }

        changed |= changes.has(EventKind::RegionTimed) || changes.has(EventKind::MarkerRemoved);
        if !changes.is_empty() {
            ctx.events.merge(&changes);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::passes::RegionMarkerPass,
        ir::{BlockId, Verifier},
        test::{
            branching_function, dependency_context, module_with, primary_context,
            scenario_function, write_declaration,
        },
    };

    fn marked(mut module: Module) -> Module {
        let ctx = primary_context();
        let marker = RegionMarkerPass::new();
        for func in module.functions_mut() {
            if marker.should_run(func) {
                marker.run_on_function(func, &ctx).unwrap();
            }
        }
        module
    }

    fn shape(func: &Function, block: usize) -> Vec<String> {
        func.blocks()[block]
            .iter_all()
            .map(|i| {
                i.op()
                    .called_function()
                    .map_or_else(|| i.op().mnemonic().to_string(), str::to_string)
            })
            .collect()
    }

    #[test]
    fn test_region_timed_and_markers_removed() {
        let mut module = marked(module_with(vec![scenario_function("f")]));
        let ctx = primary_context();

        assert!(CycleTimerPass::new().run_on_module(&mut module, &ctx).unwrap());

        let func = module.function("f").unwrap();
        assert_eq!(
            shape(func, 0),
            vec![
                "add",
                "fence",
                "cpu_cycle_start_measurement",
                "load",
                "add",
                "store",
                "fence",
                "cpu_cycle_end_measurement",
                "ret"
            ]
        );
        assert!(func.instructions().all(|i| MarkerKind::of(i).is_none()));
        assert_eq!(ctx.events.count_kind(EventKind::RegionTimed), 1);
        assert_eq!(ctx.events.count_kind(EventKind::MarkerRemoved), 2);
    }

    #[test]
    fn test_end_consumes_start_value() {
        let mut module = marked(module_with(vec![scenario_function("f")]));
        CycleTimerPass::new()
            .run_on_module(&mut module, &primary_context())
            .unwrap();

        let func = module.function("f").unwrap();
        let start = func
            .instructions()
            .find(|i| i.op().called_function() == Some("cpu_cycle_start_measurement"))
            .unwrap()
            .id();
        let end = func
            .instructions()
            .find(|i| i.op().called_function() == Some("cpu_cycle_end_measurement"))
            .unwrap();
        assert_eq!(end.op().operands(), vec![&Value::Inst(start)]);
        assert!(Verifier::verify_module(&module).is_ok());
    }

    #[test]
    fn test_routines_always_emitted() {
        let mut module = module_with(vec![]);
        assert!(CycleTimerPass::new()
            .run_on_module(&mut module, &primary_context())
            .unwrap());

        assert_eq!(module.global_ctors()[0].function, runtime::CYCLE_CTOR);
        assert_eq!(module.global_dtors()[0].function, "print_cpu_cycle_stats");
        let ctor = module.function(runtime::CYCLE_CTOR).unwrap();
        assert_eq!(ctor.linkage(), Linkage::Internal);
        assert_eq!(shape(ctor, 0), vec!["record_program_start", "ret"]);
    }

    #[test]
    fn test_unpaired_sentinel_removed_with_warning() {
        let mut module = module_with(vec![scenario_function("f")]);
        let func = module.function_mut("f").unwrap();
        IrBuilder::at_start(func, BlockId::new(0))
            .unwrap()
            .call_asm(MarkerKind::Begin.inline_asm());
        let ctx = primary_context();

        CycleTimerPass::new().run_on_module(&mut module, &ctx).unwrap();

        let func = module.function("f").unwrap();
        assert!(func.instructions().all(|i| MarkerKind::of(i).is_none()));
        assert!(!ctx.events.has(EventKind::RegionTimed));
        assert_eq!(ctx.events.warnings().count(), 1);
    }

    #[test]
    fn test_each_block_timed() {
        let mut module = marked(module_with(vec![
            write_declaration(),
            branching_function("g"),
        ]));
        let ctx = primary_context();
        CycleTimerPass::new().run_on_module(&mut module, &ctx).unwrap();

        assert_eq!(ctx.events.count_kind(EventKind::RegionTimed), 2);
        assert!(Verifier::verify_module(&module).is_ok());
    }

    #[test]
    fn test_dependency_unit_skipped() {
        let mut module = marked(module_with(vec![scenario_function("f")]));
        let before = module.clone();
        assert!(!CycleTimerPass::new()
            .run_on_module(&mut module, &dependency_context())
            .unwrap());
        assert_eq!(module, before);
    }
}
