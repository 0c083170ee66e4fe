//! Function identity and classification pass.
//!
//! Gives every instrumentable function a dense id, classifies whether it executes any
//! unsafe-tagged instruction inside a region, and publishes the result to the runtime:
//!
//! 1. `unsafe_count.func_id` metadata on each function,
//! 2. the constant table `__unsafe_metadata_table` with one row per function,
//! 3. a start-up routine that hands the table to `__unsafe_init_metadata`,
//! 4. `__unsafe_dump_stats` registered to run at exit,
//! 5. a `__unsafe_record_function(id)` call at every function entry.
//!
//! The id is what the block counter reports against, so this pass must run before it.

use crate::{
    compiler::{
        regions,
        runtime::{self, RuntimeFn},
        EventKind, EventLog, InstrumentContext, InstrumentPass,
    },
    ir::{
        BlockId, Constant, Function, FunctionType, GlobalVariable, IrBuilder, Linkage, Metadata,
        Module, Op, Type, Value,
    },
    Result,
};

/// One row of the per-function metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionRecord {
    /// Dense function id.
    pub id: u32,
    /// Whether the function contains unsafe code inside a region.
    pub has_unsafe: bool,
    /// Always zero.
    pub reserved: u8,
}

impl FunctionRecord {
    /// The row layout: `{ i32 id, i8 has_unsafe, i8 reserved, i16 padding }`.
    #[must_use]
    pub fn record_type() -> Type {
        Type::Struct(vec![Type::I32, Type::I8, Type::I8, Type::I16])
    }

    /// Encodes the record as a table row.
    #[must_use]
    pub fn to_constant(&self) -> Constant {
        Constant::Struct(vec![
            Constant::int(Type::I32, u64::from(self.id)),
            Constant::int(Type::I8, u64::from(self.has_unsafe)),
            Constant::int(Type::I8, u64::from(self.reserved)),
            Constant::int(Type::I16, 0),
        ])
    }

    /// Decodes a table row.
    #[must_use]
    pub fn from_constant(constant: &Constant) -> Option<Self> {
        let Constant::Struct(fields) = constant else {
            return None;
        };
        let [id, has_unsafe, reserved, _padding] = fields.as_slice() else {
            return None;
        };
        Some(Self {
            id: u32::try_from(id.as_int()?).ok()?,
            has_unsafe: has_unsafe.as_int()? != 0,
            reserved: u8::try_from(reserved.as_int()?).ok()?,
        })
    }
}

/// Returns the id assigned to a function, if any.
#[must_use]
pub fn function_id(func: &Function) -> Option<u32> {
    func.metadata(runtime::FUNCTION_ID_METADATA)
        .and_then(Metadata::as_int)
        .and_then(|id| u32::try_from(id).ok())
}

/// Decodes the metadata table emitted into a module.
///
/// Returns `None` if the module has no table or the table is not in the expected shape.
#[must_use]
pub fn read_function_table(module: &Module) -> Option<Vec<FunctionRecord>> {
    let table = module.global(runtime::METADATA_TABLE)?;
    let Some(Constant::Array { elements, .. }) = &table.initializer else {
        return None;
    };
    elements.iter().map(FunctionRecord::from_constant).collect()
}

/// Assigns function ids and emits the per-function metadata table.
pub struct FunctionTrackerPass;

impl Default for FunctionTrackerPass {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionTrackerPass {
    /// Creates a new function tracker pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Assigns ids in module order and returns the table rows.
    fn identify(module: &mut Module, changes: &EventLog) -> Result<Vec<FunctionRecord>> {
        let mut records = Vec::new();

        for func in module.functions_mut() {
            if !runtime::is_instrumentable(func) {
                continue;
            }
            let id = u32::try_from(records.len())
                .map_err(|_| malformed_error!("too many functions in {}", func.name()))?;
            let has_unsafe = regions::function_has_unsafe_in_region(func);

            func.set_metadata(runtime::FUNCTION_ID_METADATA, Metadata::Int(u64::from(id)));
            changes
                .record(EventKind::FunctionIdentified)
                .function(func.name())
                .message(format!("id={id} has_unsafe={has_unsafe}"));

            records.push(FunctionRecord {
                id,
                has_unsafe,
                reserved: 0,
            });
        }

        Ok(records)
    }

    fn emit_table(module: &mut Module, records: &[FunctionRecord]) -> Result<()> {
        let table = Constant::Array {
            elem: FunctionRecord::record_type(),
            elements: records.iter().map(FunctionRecord::to_constant).collect(),
        };
        module.add_global(
            GlobalVariable::new(runtime::METADATA_TABLE, table)
                .constant()
                .with_alignment(8),
        )
    }

    fn emit_init_routine(module: &mut Module, rows: u32) -> Result<()> {
        let mut init = Function::new(runtime::MODULE_INIT, FunctionType::void());
        init.set_linkage(Linkage::Internal);
        let entry = init.add_block("entry", Op::Ret { value: None });
        IrBuilder::at_end(&mut init, entry)?.call(
            RuntimeFn::InitMetadata.name(),
            vec![Value::global(runtime::METADATA_TABLE), Value::i32(rows)],
            Type::Void,
        );
        module.add_function(init)?;
        module.append_to_global_ctors(runtime::MODULE_INIT, 0);
        Ok(())
    }

    fn instrument_entries(module: &mut Module, changes: &EventLog) -> Result<()> {
        for func in module.functions_mut() {
            if !runtime::is_instrumentable(func) {
                continue;
            }
            let Some(id) = function_id(func) else {
                continue;
            };
            IrBuilder::at_first_non_phi(func, BlockId::new(0))?.call(
                RuntimeFn::RecordFunction.name(),
                vec![Value::i32(id)],
                Type::Void,
            );
            changes
                .record(EventKind::EntryInstrumented)
                .at(func.name(), 0);
        }
        Ok(())
    }
}

impl InstrumentPass for FunctionTrackerPass {
    fn name(&self) -> &'static str {
        "unsafe-function-tracker"
    }

    fn description(&self) -> &'static str {
        "Assigns function ids and emits the per-function metadata table"
    }

    fn is_module_pass(&self) -> bool {
        true
    }

    fn run_on_module(&self, module: &mut Module, ctx: &InstrumentContext) -> Result<bool> {
        if !ctx.is_primary_unit() {
            return Ok(false);
        }
        if module.has_symbol(runtime::METADATA_TABLE) {
            log::debug!("{}: metadata table already present", module.name());
            return Ok(false);
        }
        if !module.functions().iter().any(runtime::is_instrumentable) {
            log::debug!("{}: no functions to identify", module.name());
            return Ok(false);
        }

        let changes = EventLog::new();
        let records = Self::identify(module, &changes)?;

        RuntimeFn::InitMetadata.declare(module);
        RuntimeFn::RecordFunction.declare(module);
        RuntimeFn::DumpStats.declare(module);

        Self::emit_table(module, &records)?;
        changes
            .record(EventKind::MetadataTableEmitted)
            .message(format!("{} row(s)", records.len()));

        let rows = u32::try_from(records.len())
            .map_err(|_| malformed_error!("metadata table too large"))?;
        Self::emit_init_routine(module, rows)?;
        changes
            .record(EventKind::StartupRoutineCreated)
            .function(runtime::MODULE_INIT);

        module.append_to_global_dtors(RuntimeFn::DumpStats.name(), 0);
        changes
            .record(EventKind::ExitRoutineRegistered)
            .function(RuntimeFn::DumpStats.name());

        Self::instrument_entries(module, &changes)?;

        log::debug!("{}: identified {} function(s)", module.name(), records.len());
        ctx.events.merge(&changes);
        Ok(true)
    }
}
