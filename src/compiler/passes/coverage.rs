//! Unsafe source-line coverage.
//!
//! Makes every unsafe source line known to the runtime at start-up and reports each time
//! one executes, so the runtime can print which unsafe lines ran and how often.
//!
//! # Phases
//!
//! 1. Insert `track_unsafe_line_execution(line, file)` before every unsafe-tagged
//!    instruction inside a region that carries captured provenance, collecting the keys
//!    into an [`UnsafeLineSet`].
//! 2. If any key was collected, synthesize `unsafe_lines_module_ctor`, which calls
//!    `register_unsafe_line` once per key in sorted order.
//! 3. If anything was instrumented, synthesize `unsafe_lines_module_dtor`, which prints
//!    the coverage statistics at exit.
//!
//! File names are pooled string constants, so each file is emitted once per module.

use std::collections::{HashMap, HashSet};

use crate::{
    compiler::{
        regions,
        runtime::{self, RuntimeFn},
        EventKind, EventLog, InstrumentContext, InstrumentPass,
    },
    ir::{BlockId, Function, FunctionType, InstId, IrBuilder, Linkage, Module, Op, Type, Value},
    Result,
};

/// A source line in a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineKey {
    /// Source file.
    pub file: String,
    /// 1-based line.
    pub line: u32,
}

impl LineKey {
    /// Creates a key.
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// Every unsafe source line seen in the module.
#[derive(Debug, Clone, Default)]
pub struct UnsafeLineSet {
    lines: HashSet<LineKey>,
}

impl UnsafeLineSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key. Returns true if it was not present.
    pub fn insert(&mut self, key: LineKey) -> bool {
        self.lines.insert(key)
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains(&self, key: &LineKey) -> bool {
        self.lines.contains(key)
    }

    /// Returns the number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if no line was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the keys ordered by file, then line.
    #[must_use]
    pub fn sorted(&self) -> Vec<LineKey> {
        let mut keys: Vec<LineKey> = self.lines.iter().cloned().collect();
        keys.sort();
        keys
    }
}

/// Returns the instructions of a function that get a tracking call, with their blocks and
/// keys, and adds each key to `lines`.
pub fn collect_tracked_lines(
    func: &Function,
    lines: &mut UnsafeLineSet,
) -> Vec<(BlockId, InstId, LineKey)> {
    let mut targets = Vec::new();
    for block in func.blocks() {
        for (_, inst, inside) in regions::scan_block(block) {
            if !inside || !inst.is_unsafe() {
                continue;
            }
            let Some(info) = inst.line_info() else {
                continue;
            };
            let key = LineKey::new(info.file.clone(), info.line);
            lines.insert(key.clone());
            targets.push((block.id(), inst.id(), key));
        }
    }
    targets
}

/// Tracks execution of unsafe source lines.
pub struct LineCoveragePass;

impl Default for LineCoveragePass {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCoveragePass {
    /// Creates a new line coverage pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn internal_routine(name: &str) -> Function {
        let mut func = Function::new(name, FunctionType::void());
        func.set_linkage(Linkage::Internal);
        func.add_block("entry", Op::Ret { value: None });
        func
    }

    fn emit_ctor(
        module: &mut Module,
        lines: &UnsafeLineSet,
        files: &HashMap<String, Value>,
        changes: &EventLog,
    ) -> Result<()> {
        let mut ctor = Self::internal_routine(runtime::LINES_CTOR);
        let entry = ctor.blocks()[0].id();
        {
            let mut builder = IrBuilder::at_end(&mut ctor, entry)?;
            for key in lines.sorted() {
                let file = files
                    .get(&key.file)
                    .cloned()
                    .ok_or_else(|| malformed_error!("no string constant for {}", key.file))?;
                builder.call(
                    RuntimeFn::RegisterLine.name(),
                    vec![Value::i64(u64::from(key.line)), file],
                    Type::Void,
                );
                changes
                    .record(EventKind::LineRegistered)
                    .function(runtime::LINES_CTOR)
                    .message(format!("{}:{}", key.file, key.line));
            }
        }
        module.add_function(ctor)?;
        module.append_to_global_ctors(runtime::LINES_CTOR, 0);
        changes
            .record(EventKind::StartupRoutineCreated)
            .function(runtime::LINES_CTOR);
        Ok(())
    }

    fn emit_dtor(module: &mut Module, changes: &EventLog) -> Result<()> {
        let mut dtor = Self::internal_routine(runtime::LINES_DTOR);
        let entry = dtor.blocks()[0].id();
        IrBuilder::at_end(&mut dtor, entry)?.call(
            RuntimeFn::PrintCoverage.name(),
            Vec::new(),
            Type::Void,
        );
        module.add_function(dtor)?;
        module.append_to_global_dtors(runtime::LINES_DTOR, 0);
        changes
            .record(EventKind::ExitRoutineRegistered)
            .function(runtime::LINES_DTOR);
        Ok(())
    }
}

impl InstrumentPass for LineCoveragePass {
    fn name(&self) -> &'static str {
        "dynamic-line-count"
    }

    fn description(&self) -> &'static str {
        "Registers unsafe source lines and tracks their execution"
    }

    fn is_module_pass(&self) -> bool {
        true
    }

    fn run_on_module(&self, module: &mut Module, ctx: &InstrumentContext) -> Result<bool> {
        if !ctx.is_primary_unit() {
            return Ok(false);
        }
        if module.has_symbol(runtime::LINES_CTOR) || module.has_symbol(runtime::LINES_DTOR) {
            log::debug!("{}: line coverage routines already present", module.name());
            return Ok(false);
        }

        let mut lines = UnsafeLineSet::new();
        let targets: Vec<(usize, Vec<(BlockId, InstId, LineKey)>)> = module
            .functions()
            .iter()
            .enumerate()
            .filter(|(_, func)| runtime::is_instrumentable(func))
            .map(|(index, func)| (index, collect_tracked_lines(func, &mut lines)))
            .filter(|(_, found)| !found.is_empty())
            .collect();

        if targets.is_empty() {
            log::debug!("{}: no unsafe lines with provenance", module.name());
            return Ok(false);
        }

        // String constants first, in the order files were encountered
        let mut files: HashMap<String, Value> = HashMap::new();
        for (_, _, key) in targets.iter().flat_map(|(_, found)| found) {
            if !files.contains_key(&key.file) {
                let value = module.create_global_string(&key.file);
                files.insert(key.file.clone(), value);
            }
        }

        RuntimeFn::RegisterLine.declare(module);
        RuntimeFn::TrackLine.declare(module);
        RuntimeFn::PrintCoverage.declare(module);

        let changes = EventLog::new();
        for (index, found) in targets {
            let Some(func) = module.functions_mut().get_mut(index) else {
                continue;
            };
            for (block, id, key) in found {
                let file = files
                    .get(&key.file)
                    .cloned()
                    .ok_or_else(|| malformed_error!("no string constant for {}", key.file))?;
                IrBuilder::before_in(func, block, id)?.call(
                    RuntimeFn::TrackLine.name(),
                    vec![Value::i64(u64::from(key.line)), file],
                    Type::Void,
                );
                changes
                    .record(EventKind::LineTracked)
                    .at(func.name(), block.index())
                    .message(format!("{}:{}", key.file, key.line));
            }
        }

        if !lines.is_empty() {
            Self::emit_ctor(module, &lines, &files, &changes)?;
        }
        Self::emit_dtor(module, &changes)?;

        log::debug!(
            "{}: tracking {} unsafe line(s)",
            module.name(),
            lines.len()
        );
        ctx.events.merge(&changes);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::passes::RegionMarkerPass,
        ir::{Constant, Verifier},
        test::{
            dependency_context, module_with, primary_context, safe_function, scenario_function,
            unsafe_store_function,
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

    /// Returns `(file, line)` arguments of every call to `callee`, resolving file strings.
    fn call_keys(module: &Module, callee: &str) -> Vec<LineKey> {
        module
            .functions()
            .iter()
            .flat_map(|f| f.instructions())
            .filter(|i| i.op().called_function() == Some(callee))
            .filter_map(|i| match i.op() {
                Op::Call { args, .. } => {
                    let line = u32::try_from(args[0].as_const_int()?).ok()?;
                    let global = module.global(args[1].as_global()?)?;
                    match &global.initializer {
                        Some(Constant::Str(file)) => Some(LineKey::new(file.clone(), line)),
                        _ => None,
                    }
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_tracks_and_registers() {
        let mut module = marked(module_with(vec![scenario_function("f")]));
        let ctx = primary_context();

        assert!(LineCoveragePass::new().run_on_module(&mut module, &ctx).unwrap());

        let tracked = call_keys(&module, "track_unsafe_line_execution");
        assert_eq!(
            tracked,
            vec![
                LineKey::new("src/lib.rs", 11),
                LineKey::new("src/lib.rs", 13),
            ]
        );
        assert_eq!(call_keys(&module, "register_unsafe_line"), tracked);

        assert_eq!(module.global_ctors()[0].function, runtime::LINES_CTOR);
        assert_eq!(module.global_dtors()[0].function, runtime::LINES_DTOR);
        assert_eq!(ctx.events.count_kind(EventKind::LineTracked), 2);
        assert!(Verifier::verify_module(&module).is_ok());
    }

    #[test]
    fn test_track_precedes_instruction() {
        let mut module = marked(module_with(vec![scenario_function("f")]));
        LineCoveragePass::new()
            .run_on_module(&mut module, &primary_context())
            .unwrap();

        let body = module.function("f").unwrap().blocks()[0].instructions();
        for (index, inst) in body.iter().enumerate() {
            if inst.is_unsafe() {
                assert_eq!(
                    body[index - 1].op().called_function(),
                    Some("track_unsafe_line_execution")
                );
            }
        }
    }

    #[test]
    fn test_same_line_in_two_files() {
        let mut module = marked(module_with(vec![
            unsafe_store_function("a", "src/b.rs", 7),
            unsafe_store_function("b", "src/a.rs", 7),
            unsafe_store_function("c", "src/a.rs", 7),
        ]));
        LineCoveragePass::new()
            .run_on_module(&mut module, &primary_context())
            .unwrap();

        // Registered once per key, sorted by file
        assert_eq!(
            call_keys(&module, "register_unsafe_line"),
            vec![LineKey::new("src/a.rs", 7), LineKey::new("src/b.rs", 7)]
        );
        assert_eq!(call_keys(&module, "track_unsafe_line_execution").len(), 3);

        let strings = module
            .globals()
            .iter()
            .filter(|g| matches!(g.initializer, Some(Constant::Str(_))))
            .count();
        assert_eq!(strings, 2);
    }

    #[test]
    fn test_lines_sort_numerically() {
        let mut set = UnsafeLineSet::new();
        set.insert(LineKey::new("a.rs", 10));
        set.insert(LineKey::new("a.rs", 9));
        assert!(!set.insert(LineKey::new("a.rs", 9)));
        assert_eq!(
            set.sorted(),
            vec![LineKey::new("a.rs", 9), LineKey::new("a.rs", 10)]
        );
    }

    #[test]
    fn test_nothing_to_track() {
        let mut module = marked(module_with(vec![safe_function("f")]));
        let before = module.clone();
        assert!(!LineCoveragePass::new()
            .run_on_module(&mut module, &primary_context())
            .unwrap());
        assert_eq!(module, before);
    }

    #[test]
    fn test_unmarked_lines_ignored() {
        let mut module = module_with(vec![scenario_function("f")]);
        assert!(!LineCoveragePass::new()
            .run_on_module(&mut module, &primary_context())
            .unwrap());
    }

    #[test]
    fn test_dependency_unit_skipped() {
        let mut module = marked(module_with(vec![scenario_function("f")]));
        let before = module.clone();
        assert!(!LineCoveragePass::new()
            .run_on_module(&mut module, &dependency_context())
            .unwrap());
        assert_eq!(module, before);
    }
}
