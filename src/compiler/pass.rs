//! The pass trait shared by every pipeline stage.

use crate::{
    compiler::{context::InstrumentContext, runtime},
    ir::{Function, Module},
    Result,
};

/// A pipeline stage that operates on IR.
///
/// Passes are stateless and must be thread-safe (Send + Sync). They receive mutable access
/// to the IR and shared access to the [`InstrumentContext`], recording what they do into
/// `ctx.events`.
///
/// A pass is either a function pass, driven once per function by the scheduler through
/// [`InstrumentPass::run_on_function`], or a module pass that sees the whole module at once
/// through [`InstrumentPass::run_on_module`].
///
/// # Runtime Declarations
///
/// Function passes cannot reach the module, so any runtime entry points they call are
/// declared in [`InstrumentPass::initialize`], which the scheduler runs before the pass.
pub trait InstrumentPass: Send + Sync {
    /// Unique name for logging and the applied-pass record.
    fn name(&self) -> &'static str;

    /// Should this pass run on a specific function?
    ///
    /// Called before `run_on_function`. The default skips declarations, intrinsics and the
    /// runtime namespace.
    fn should_run(&self, func: &Function) -> bool {
        runtime::is_instrumentable(func)
    }

    /// Run the pass on a single function.
    ///
    /// Returns `true` if any changes were made, `false` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails to process the function.
    fn run_on_function(&self, _func: &mut Function, _ctx: &InstrumentContext) -> Result<bool> {
        Ok(false)
    }

    /// Does this pass operate on the whole module?
    ///
    /// Module passes have their `run_on_module` called instead of iterating over functions
    /// with `run_on_function`.
    fn is_module_pass(&self) -> bool {
        false
    }

    /// Run on the entire module.
    ///
    /// Returns `true` if any changes were made, `false` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails to process the module.
    fn run_on_module(&self, _module: &mut Module, _ctx: &InstrumentContext) -> Result<bool> {
        Ok(false)
    }

    /// Called once before the pass runs.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    fn initialize(&self, _module: &mut Module, _ctx: &InstrumentContext) -> Result<()> {
        Ok(())
    }

    /// Called once after the pass completes.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails.
    fn finalize(&self, _module: &mut Module, _ctx: &InstrumentContext) -> Result<()> {
        Ok(())
    }

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
