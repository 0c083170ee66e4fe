//! Debug-info preservation pass.
//!
//! Optimization drops debug locations it considers unreachable or redundant. This pass
//! copies every valid location in the module onto a dedicated anchor global that is listed
//! in `compiler_used`, so the locations outlive any instruction they were attached to.
//!
//! It also restores the PHI-first block layout, which earlier instrumentation may have
//! disturbed.

use std::collections::HashSet;

use crate::{
    compiler::{runtime, EventKind, EventLog, InstrumentContext, InstrumentPass},
    ir::{Constant, DebugLoc, GlobalVariable, Metadata, Module, Type},
    Result,
};

/// Keeps source locations alive through optimization.
pub struct DebugInfoPreserverPass;

impl Default for DebugInfoPreserverPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugInfoPreserverPass {
    /// Creates a new debug-info preserver pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn reorder_phis(module: &mut Module, changes: &EventLog) -> bool {
        let mut moved = false;
        for func in module.functions_mut() {
            let name = func.name().to_string();
            for block in func.blocks_mut() {
                if block.hoist_phis() {
                    changes
                        .record(EventKind::PhiReordered)
                        .at(name.as_str(), block.id().index());
                    moved = true;
                }
            }
        }
        moved
    }

    /// Returns every valid location in the module, deduplicated, in first-seen order.
    fn collect_locations(module: &Module) -> Vec<DebugLoc> {
        let mut seen = HashSet::new();
        module
            .functions()
            .iter()
            .flat_map(|func| func.instructions())
            .filter_map(|inst| inst.debug_loc())
            .filter(|loc| loc.is_valid())
            .filter(|loc| seen.insert((*loc).clone()))
            .cloned()
            .collect()
    }
}

impl InstrumentPass for DebugInfoPreserverPass {
    fn name(&self) -> &'static str {
        "debuginfo-preserver"
    }

    fn description(&self) -> &'static str {
        "Anchors debug locations to a keep-alive global"
    }

    fn is_module_pass(&self) -> bool {
        true
    }

    fn run_on_module(&self, module: &mut Module, ctx: &InstrumentContext) -> Result<bool> {
        if !ctx.is_primary_unit() {
            return Ok(false);
        }

        let changes = EventLog::new();
        let mut changed = Self::reorder_phis(module, &changes);

        if module.global(runtime::ANCHOR).is_none() {
            module.add_global(GlobalVariable::new(
                runtime::ANCHOR,
                Constant::int(Type::I8, 0),
            ))?;
            changed = true;
        }

        let locations = Self::collect_locations(module);
        if locations.is_empty() {
            log::debug!("{}: no valid debug locations to preserve", module.name());
        } else if let Some(anchor) = module.global_mut(runtime::ANCHOR) {
            changes
                .record(EventKind::DebugInfoAnchored)
                .message(format!("preserved {} location(s)", locations.len()));
            anchor.set_metadata(
                runtime::PRESERVED_DEBUGINFO,
                Metadata::Tuple(locations.into_iter().map(Metadata::Loc).collect()),
            );
        }

        module.append_to_compiler_used(runtime::ANCHOR);

        if !changes.is_empty() {
            ctx.events.merge(&changes);
        }
        Ok(changed)
    }
}
