//! Timing of calls into external code.
//!
//! A call is external when its callee is declared in the module without a body and is
//! neither an intrinsic nor part of the runtime namespace. Each such call is bracketed:
//!
//! ```text
//!                       fence seq_cst
//!                       %t = call i64 @external_call_start()
//! call @write(..)  ==>  call @write(..)
//!                       fence seq_cst
//!                       call void @external_call_end(i64 %t)
//! ```
//!
//! The closing pair goes before the next non-debug instruction, so debug intrinsics that
//! describe the call's result stay attached to it. Calls in terminator position (`invoke`)
//! have no fallthrough point in their block and are skipped.

use std::collections::HashSet;

use crate::{
    compiler::{
        runtime::{self, RuntimeFn},
        EventKind, EventLog, InstrumentContext, InstrumentPass,
    },
    ir::{AtomicOrdering, BlockId, Callee, Function, InstId, IrBuilder, Module, Op, Type},
    Result,
};

/// Returns the names of external callees in the module.
#[must_use]
pub fn external_functions(module: &Module) -> HashSet<String> {
    module
        .functions()
        .iter()
        .filter(|f| {
            f.is_declaration() && !f.is_intrinsic() && !runtime::is_runtime_symbol(f.name())
        })
        .map(|f| f.name().to_string())
        .collect()
}

/// Times calls into external code.
pub struct ExternalCallTimerPass;

impl Default for ExternalCallTimerPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalCallTimerPass {
    /// Creates a new external call timer pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn is_external_call(op: &Op, externals: &HashSet<String>) -> bool {
        matches!(op.callee(), Some(Callee::Direct(name)) if externals.contains(name))
    }

    /// Returns the body calls to time, and records skipped terminator calls.
    fn collect_calls(
        func: &Function,
        externals: &HashSet<String>,
        changes: &EventLog,
    ) -> Vec<(usize, InstId)> {
        let mut calls = Vec::new();
        for block in func.blocks() {
            let index = block.id().index();
            calls.extend(
                block
                    .instructions()
                    .iter()
                    .filter(|inst| Self::is_external_call(inst.op(), externals))
                    .map(|inst| (index, inst.id())),
            );

            let terminator = block.terminator();
            if Self::is_external_call(terminator.op(), externals) {
                log::debug!(
                    "{}: cannot time terminator call {} in bb{index}",
                    func.name(),
                    terminator.id()
                );
                changes
                    .record(EventKind::ExternalCallSkipped)
                    .at(func.name(), index)
                    .message(format!(
                        "{} to @{} is a terminator",
                        terminator.id(),
                        terminator.op().called_function().unwrap_or_default()
                    ));
            }
        }
        calls
    }

    /// Returns the first non-debug instruction after `call`, which may be the terminator.
    fn resume_point(func: &Function, block: BlockId, call: InstId) -> Option<InstId> {
        let block = func.block(block)?;
        let index = block.position_of(call)?;
        block
            .iter_all()
            .skip(index + 1)
            .find(|inst| !inst.op().is_debug())
            .map(|inst| inst.id())
    }

    fn time_call(func: &mut Function, block: BlockId, call: InstId) -> Result<()> {
        let start = {
            let mut builder = IrBuilder::before_in(func, block, call)?;
            builder.fence(AtomicOrdering::SeqCst);
            builder.call(RuntimeFn::ExternalCallStart.name(), Vec::new(), Type::I64)
        };

        let resume = Self::resume_point(func, block, call)
            .ok_or_else(|| malformed_error!("no instruction after {} in {}", call, func.name()))?;
        let mut builder = IrBuilder::before_in(func, block, resume)?;
        builder.fence(AtomicOrdering::SeqCst);
        builder.call(RuntimeFn::ExternalCallEnd.name(), vec![start], Type::Void);
        Ok(())
    }
}

impl InstrumentPass for ExternalCallTimerPass {
    fn name(&self) -> &'static str {
        "external-call-tracker"
    }

    fn description(&self) -> &'static str {
        "Brackets calls into external code with timing calls"
    }

    fn is_module_pass(&self) -> bool {
        true
    }

    fn run_on_module(&self, module: &mut Module, ctx: &InstrumentContext) -> Result<bool> {
        if !ctx.is_primary_unit() {
            return Ok(false);
        }

        let externals = external_functions(module);
        if externals.is_empty() {
            return Ok(false);
        }

        let changes = EventLog::new();
        let targets: Vec<(usize, Vec<(usize, InstId)>)> = module
            .functions()
            .iter()
            .enumerate()
            .filter(|(_, func)| runtime::is_instrumentable(func))
            .map(|(index, func)| (index, Self::collect_calls(func, &externals, &changes)))
            .filter(|(_, calls)| !calls.is_empty())
            .collect();

        if !targets.is_empty() {
            RuntimeFn::ExternalCallStart.declare(module);
            RuntimeFn::ExternalCallEnd.declare(module);
        }

        for (index, calls) in targets {
            let Some(func) = module.functions_mut().get_mut(index) else {
                continue;
            };
            for (block, call) in calls {
                Self::time_call(func, BlockId::new(block), call)?;
                changes
                    .record(EventKind::ExternalCallTimed)
                    .at(func.name(), block);
            }
        }

        let changed = changes.has(EventKind::ExternalCallTimed);
        if !changes.is_empty() {
            ctx.events.merge(&changes);
        }
        Ok(changed)
    }
}
