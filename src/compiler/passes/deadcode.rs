//! Dead code and dead global elimination.
//!
//! These are the optimizer stages the instrumentation has to survive. Dead code elimination
//! removes value-producing instructions whose results nobody uses and whose removal cannot
//! change behavior; it runs to a fixed point so chains of dead values disappear together.
//! Dead global elimination drops module-local globals nothing references.
//!
//! Region sentinels are side-effecting calls and therefore never removed here. The same
//! holds for every runtime call the late stages insert.
//!
//! # Example
//!
//! Before:
//! ```text
//! %1 = add i32 %arg0, 1
//! %2 = mul i32 %1, 2      // unused
//! ret void
//! ```
//!
//! After (`%2` removed, which makes `%1` dead in the next round):
//! ```text
//! ret void
//! ```

use std::collections::HashSet;

use crate::{
    compiler::{EventKind, EventLog, InstrumentContext, InstrumentPass},
    ir::{Function, InstId, Module},
    Result,
};

/// Maximum rounds of the fixed-point loop.
const MAX_ITERATIONS: usize = 100;

/// Removes unused, side-effect free instructions.
pub struct DeadCodeEliminationPass;

impl Default for DeadCodeEliminationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadCodeEliminationPass {
    /// Creates a new dead code elimination pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns body instructions whose results are never used.
    fn find_dead(func: &Function) -> Vec<(usize, InstId)> {
        let used: HashSet<InstId> = func
            .instructions()
            .flat_map(|inst| inst.op().operands())
            .filter_map(|value| value.as_inst())
            .collect();

        func.blocks()
            .iter()
            .flat_map(|block| {
                block
                    .instructions()
                    .iter()
                    .map(move |inst| (block.id().index(), inst))
            })
            .filter(|(_, inst)| {
                let op = inst.op();
                op.produces_value() && !op.has_side_effects() && !used.contains(&inst.id())
            })
            .map(|(block, inst)| (block, inst.id()))
            .collect()
    }
}

impl InstrumentPass for DeadCodeEliminationPass {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn description(&self) -> &'static str {
        "Removes unused instructions without side effects"
    }

    fn should_run(&self, func: &Function) -> bool {
        !func.is_declaration()
    }

    fn run_on_function(&self, func: &mut Function, ctx: &InstrumentContext) -> Result<bool> {
        let changes = EventLog::new();

        for _ in 0..MAX_ITERATIONS {
            let dead = Self::find_dead(func);
            if dead.is_empty() {
                break;
            }
            for (block, id) in dead {
                if let Some(inst) = func.erase(id) {
                    changes
                        .record(EventKind::InstructionRemoved)
                        .at(func.name(), block)
                        .message(format!("{id} = {}", inst.op().mnemonic()));
                }
            }
        }

        let changed = !changes.is_empty();
        if changed {
            log::debug!("{}: removed {} dead instructions", func.name(), changes.len());
            ctx.events.merge(&changes);
        }
        Ok(changed)
    }
}

/// Removes module-local globals that nothing references.
///
/// A global is referenced when an instruction operand names it, when it is registered as a
/// constructor or destructor, or when it is on the keep-alive list.
pub struct DeadGlobalEliminationPass;

impl Default for DeadGlobalEliminationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadGlobalEliminationPass {
    /// Creates a new dead global elimination pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn referenced_symbols(module: &Module) -> HashSet<String> {
        let mut referenced: HashSet<String> = module
            .functions()
            .iter()
            .flat_map(Function::instructions)
            .flat_map(|inst| inst.op().operands())
            .filter_map(|value| value.as_global().map(str::to_string))
            .collect();

        referenced.extend(
            module
                .global_ctors()
                .iter()
                .chain(module.global_dtors())
                .map(|entry| entry.function.clone()),
        );
        referenced.extend(module.compiler_used().iter().cloned());
        referenced
    }
}

impl InstrumentPass for DeadGlobalEliminationPass {
    fn name(&self) -> &'static str {
        "dead-global-elimination"
    }

    fn description(&self) -> &'static str {
        "Removes unreferenced internal and private globals"
    }

    fn is_module_pass(&self) -> bool {
        true
    }

    fn run_on_module(&self, module: &mut Module, ctx: &InstrumentContext) -> Result<bool> {
        let referenced = Self::referenced_symbols(module);
        let dead: Vec<String> = module
            .globals()
            .iter()
            .filter(|global| global.linkage.is_local() && !referenced.contains(&global.name))
            .map(|global| global.name.clone())
            .collect();

        let changes = EventLog::new();
        for name in dead {
            if module.remove_global(&name).is_some() {
                changes
                    .record(EventKind::GlobalRemoved)
                    .message(format!("@{name}"));
            }
        }

        let changed = !changes.is_empty();
        if changed {
            ctx.events.merge(&changes);
        }
        Ok(changed)
    }
}
