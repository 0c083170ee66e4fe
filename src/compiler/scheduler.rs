//! Pass scheduler for orchestrating the instrumentation pipeline.
//!
//! The `PassScheduler` runs passes in four fixed phases. The order is part of the contract:
//! regions must be marked before the optimizer runs, functions must be identified before the
//! late stages report against their ids, and the cycle timer must run last because it
//! consumes the sentinels the other late stages read.

use crate::{
    compiler::{
        context::InstrumentContext,
        pass::InstrumentPass,
        passes::{
            BlockCounterPass, CycleTimerPass, DeadCodeEliminationPass, DeadGlobalEliminationPass,
            DebugInfoPreserverPass, ExternalCallTimerPass, FunctionTrackerPass, HeapTrackerPass,
            LineCoveragePass, RegionMarkerPass,
        },
        EventKind, PipelineConfig,
    },
    ir::Module,
    Result,
};

/// Default round limit for the optimize phase.
const DEFAULT_MAX_OPTIMIZE_ITERATIONS: usize = 15;

/// Orchestrates pass execution in a phased pipeline.
///
/// The scheduler runs passes in four phases:
///
/// 1. **Early**: Region marking and debug-info preservation
/// 2. **Optimize**: Host optimizer stand-ins, run to fixpoint
/// 3. **Identity**: Function identification and the metadata table
/// 4. **Late**: Counting, coverage, heap tracking, external-call and cycle timing
///
/// Early, identity and late passes are instrumentation: they only run on the primary unit
/// and each runs at most once per module, tracked through [`Module::has_applied`].
/// Optimize passes run on every unit and are never recorded.
pub struct PassScheduler {
    /// Maximum rounds of the optimize phase.
    max_optimize_iterations: usize,
    /// Phase 1: Passes that must see the IR before optimization.
    pub early: Vec<Box<dyn InstrumentPass>>,
    /// Phase 2: Optimization passes the instrumentation has to survive.
    pub optimize: Vec<Box<dyn InstrumentPass>>,
    /// Phase 3: Function identification.
    pub identity: Vec<Box<dyn InstrumentPass>>,
    /// Phase 4: Passes that read regions and ids after optimization.
    pub late: Vec<Box<dyn InstrumentPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OPTIMIZE_ITERATIONS)
    }
}

impl PassScheduler {
    /// Creates an empty scheduler.
    ///
    /// # Arguments
    ///
    /// * `max_optimize_iterations` - Maximum rounds of the optimize phase before moving on.
    #[must_use]
    pub fn new(max_optimize_iterations: usize) -> Self {
        Self {
            max_optimize_iterations,
            early: Vec::new(),
            optimize: Vec::new(),
            identity: Vec::new(),
            late: Vec::new(),
        }
    }

    /// Builds the pipeline from the enabled stages of a configuration.
    ///
    /// The optimize phase is always populated.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut scheduler = Self::default();

        if config.enable_region_marker {
            scheduler.early.push(Box::new(RegionMarkerPass::new()));
        }
        if config.enable_debug_info_preserver {
            scheduler.early.push(Box::new(DebugInfoPreserverPass::new()));
        }

        scheduler.optimize.push(Box::new(DeadCodeEliminationPass::new()));
        scheduler
            .optimize
            .push(Box::new(DeadGlobalEliminationPass::new()));

        if config.enable_function_tracker {
            scheduler.identity.push(Box::new(FunctionTrackerPass::new()));
        }

        if config.enable_block_counter {
            scheduler.late.push(Box::new(BlockCounterPass::new()));
        }
        if config.enable_line_coverage {
            scheduler.late.push(Box::new(LineCoveragePass::new()));
        }
        if config.enable_heap_tracker {
            scheduler.late.push(Box::new(HeapTrackerPass::new()));
        }
        if config.enable_external_call_tracker {
            scheduler.late.push(Box::new(ExternalCallTimerPass::new()));
        }
        if config.enable_cycle_counter {
            scheduler.late.push(Box::new(CycleTimerPass::new()));
        }

        scheduler
    }

    /// Returns the number of scheduled passes across all phases.
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.early.len() + self.optimize.len() + self.identity.len() + self.late.len()
    }

    /// Returns the scheduled pass names in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.early
            .iter()
            .chain(&self.optimize)
            .chain(&self.identity)
            .chain(&self.late)
            .map(|pass| pass.name())
            .collect()
    }

    /// Runs one pass over the module.
    ///
    /// Returns `true` if the pass made changes, `false` otherwise.
    fn run_pass(
        pass: &dyn InstrumentPass,
        module: &mut Module,
        ctx: &InstrumentContext,
    ) -> Result<bool> {
        log::debug!("running pass {}", pass.name());
        ctx.events
            .record(EventKind::PassStarted)
            .pass(pass.name())
            .message(pass.description());

        pass.initialize(module, ctx)?;

        let changed = if pass.is_module_pass() {
            pass.run_on_module(module, ctx)?
        } else {
            // Indexed so functions added by `initialize` are visited too
            let mut any_changed = false;
            for index in 0..module.functions().len() {
                let Some(func) = module.functions_mut().get_mut(index) else {
                    continue;
                };
                if pass.should_run(func) && pass.run_on_function(func, ctx)? {
                    any_changed = true;
                }
            }
            any_changed
        };

        pass.finalize(module, ctx)?;

        log::debug!("finished pass {} (changed: {changed})", pass.name());
        ctx.events
            .record(EventKind::PassCompleted)
            .pass(pass.name())
            .message(if changed { "changed" } else { "unchanged" });
        Ok(changed)
    }

    /// Runs an instrumentation phase. Each pass runs at most once per module.
    fn run_instrumentation_phase(
        passes: &[Box<dyn InstrumentPass>],
        module: &mut Module,
        ctx: &InstrumentContext,
    ) -> Result<bool> {
        let mut any_changed = false;
        for pass in passes {
            if module.has_applied(pass.name()) {
                log::debug!("skipping pass {}: already applied", pass.name());
                continue;
            }
            if Self::run_pass(pass.as_ref(), module, ctx)? {
                any_changed = true;
            }
            module.mark_applied(pass.name());
        }
        Ok(any_changed)
    }

    /// Runs optimization passes until no more changes occur.
    fn optimize_to_fixpoint(
        passes: &[Box<dyn InstrumentPass>],
        module: &mut Module,
        ctx: &InstrumentContext,
        max_iterations: usize,
    ) -> Result<bool> {
        let mut any_changed = false;

        for _ in 0..max_iterations {
            let mut changed = false;
            for pass in passes {
                if Self::run_pass(pass.as_ref(), module, ctx)? {
                    changed = true;
                }
            }

            if !changed {
                break;
            }
            any_changed = true;
        }

        Ok(any_changed)
    }

    /// Runs the complete pipeline over a module.
    ///
    /// Executes the four phases in order. On a unit that is not primary only the optimize
    /// phase runs, which leaves a module without dead code untouched.
    ///
    /// # Arguments
    ///
    /// * `module` - The module to instrument in place.
    /// * `ctx` - The run context. Events are accumulated in `ctx.events`.
    ///
    /// # Returns
    ///
    /// `true` if any pass changed the module, `false` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if any pass fails during execution.
    pub fn run_pipeline(&self, module: &mut Module, ctx: &InstrumentContext) -> Result<bool> {
        let primary = ctx.is_primary_unit();
        if !primary {
            log::debug!("{}: not the primary unit, instrumentation skipped", module.name());
        }

        let mut changed = false;

        if primary {
            changed |= Self::run_instrumentation_phase(&self.early, module, ctx)?;
        }

        changed |=
            Self::optimize_to_fixpoint(&self.optimize, module, ctx, self.max_optimize_iterations)?;

        if primary {
            changed |= Self::run_instrumentation_phase(&self.identity, module, ctx)?;
            changed |= Self::run_instrumentation_phase(&self.late, module, ctx)?;
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{
        compiler::{
            EventKind, InstrumentContext, InstrumentFamily, InstrumentPass, PassScheduler,
            PipelineConfig,
        },
        ir::{Function, Module},
        test::{dependency_context, module_with, primary_context, scenario_function},
        Result,
    };

    struct TestPass {
        name: &'static str,
        changes_to_make: usize,
        runs: AtomicUsize,
    }

    impl TestPass {
        fn new(name: &'static str, changes: usize) -> Self {
            Self {
                name,
                changes_to_make: changes,
                runs: AtomicUsize::new(0),
            }
        }
    }

    impl InstrumentPass for TestPass {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run_on_function(&self, func: &mut Function, ctx: &InstrumentContext) -> Result<bool> {
            self.runs.fetch_add(1, Ordering::Relaxed);
            for i in 0..self.changes_to_make {
                ctx.events
                    .record(EventKind::Info)
                    .at(func.name(), i)
                    .message("test");
            }
            Ok(self.changes_to_make > 0)
        }
    }

    #[test]
    fn test_default_scheduler() {
        let scheduler = PassScheduler::default();
        assert_eq!(scheduler.max_optimize_iterations, 15);
        assert_eq!(scheduler.pass_count(), 0);
    }

    #[test]
    fn test_from_config_order() {
        let scheduler = PassScheduler::from_config(&primary_context().config);
        assert_eq!(
            scheduler.pass_names(),
            vec![
                "region-marker",
                "debuginfo-preserver",
                "dead-code-elimination",
                "dead-global-elimination",
                "unsafe-function-tracker",
                "unsafe-inst-counter",
                "dynamic-line-count",
                "heap-tracker",
                "external-call-tracker",
                "cpu-cycle-count",
            ]
        );
    }

    #[test]
    fn test_from_config_family() {
        let config = PipelineConfig::primary().with_family(InstrumentFamily::HeapTracking);
        let scheduler = PassScheduler::from_config(&config);
        assert_eq!(
            scheduler.pass_names(),
            vec![
                "region-marker",
                "dead-code-elimination",
                "dead-global-elimination",
                "heap-tracker",
            ]
        );
    }

    #[test]
    fn test_instrumentation_runs_once() {
        let mut scheduler = PassScheduler::default();
        scheduler.late.push(Box::new(TestPass::new("sample", 1)));
        let mut module = module_with(vec![scenario_function("f")]);
        let ctx = primary_context();

        assert!(scheduler.run_pipeline(&mut module, &ctx).unwrap());
        assert!(module.has_applied("sample"));
        assert!(!scheduler.run_pipeline(&mut module, &ctx).unwrap());
        assert_eq!(ctx.events.count_kind(EventKind::Info), 1);
    }

    #[test]
    fn test_declarations_not_visited() {
        let pass = TestPass::new("sample", 0);
        let mut module = module_with(vec![scenario_function("f")]);
        module.get_or_insert_function("write", crate::ir::FunctionType::void());

        PassScheduler::run_pass(&pass, &mut module, &primary_context()).unwrap();
        assert_eq!(pass.runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_pass_events_recorded() {
        let mut scheduler = PassScheduler::default();
        scheduler.early.push(Box::new(TestPass::new("sample", 0)));
        let mut module = module_with(vec![scenario_function("f")]);
        let ctx = primary_context();

        assert!(!scheduler.run_pipeline(&mut module, &ctx).unwrap());
        assert_eq!(ctx.events.filter_pass("sample").count(), 2);
        assert!(ctx.events.has(EventKind::PassStarted));
        assert!(ctx.events.has(EventKind::PassCompleted));
    }

    #[test]
    fn test_dependency_unit_untouched() {
        let scheduler = PassScheduler::from_config(&primary_context().config);
        let mut module = module_with(vec![scenario_function("f")]);
        let before = module.clone();

        assert!(!scheduler
            .run_pipeline(&mut module, &dependency_context())
            .unwrap());
        assert_eq!(module, before);
    }

    #[test]
    fn test_empty_module() {
        let scheduler = PassScheduler::from_config(&PipelineConfig::primary());
        let mut module = Module::new("empty");
        assert!(!scheduler
            .run_pipeline(&mut module, &primary_context())
            .unwrap());
    }
}
