//! The runtime statistics library's entry points.
//!
//! Every call the pipeline inserts targets one of the [`RuntimeFn`] symbols, or one of the
//! routines the pipeline synthesizes itself. Together they form the runtime namespace: the
//! set of functions that are never instrumented, never counted and never timed.

use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::ir::{Function, FunctionAttributes, FunctionType, Linkage, Module, Type};

/// Start-up routine that registers the function metadata table.
pub const MODULE_INIT: &str = "__unsafe_module_init";
/// Start-up routine that registers unsafe source lines.
pub const LINES_CTOR: &str = "unsafe_lines_module_ctor";
/// Exit routine that prints line coverage.
pub const LINES_DTOR: &str = "unsafe_lines_module_dtor";
/// Start-up routine that records the program start timestamp.
pub const CYCLE_CTOR: &str = "cpu_cycle_ctor";

/// The per-function metadata table.
pub const METADATA_TABLE: &str = "__unsafe_metadata_table";
/// Global that keeps preserved debug locations alive.
pub const ANCHOR: &str = "__unsafe_coverage_anchor";
/// Metadata key for the preserved locations on the anchor.
pub const PRESERVED_DEBUGINFO: &str = "preserved.debuginfo";
/// Function metadata key holding the function id.
pub const FUNCTION_ID_METADATA: &str = "unsafe_count.func_id";

const RESERVED_PREFIX: &str = "__unsafe_";

const SYNTHESIZED: [&str; 4] = [MODULE_INIT, LINES_CTOR, LINES_DTOR, CYCLE_CTOR];

/// A runtime library entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
pub enum RuntimeFn {
    /// Reports any load or store.
    #[strum(serialize = "dyn_mem_access")]
    MemAccess,
    /// Reports a load or store inside an unsafe region.
    #[strum(serialize = "dyn_unsafe_mem_access")]
    UnsafeMemAccess,
    /// Registers the function metadata table.
    #[strum(serialize = "__unsafe_init_metadata")]
    InitMetadata,
    /// Reports entry into a function.
    #[strum(serialize = "__unsafe_record_function")]
    RecordFunction,
    /// Prints collected function and block statistics.
    #[strum(serialize = "__unsafe_dump_stats")]
    DumpStats,
    /// Reports per-block instruction counts.
    #[strum(serialize = "__unsafe_record_block")]
    RecordBlock,
    /// Registers an unsafe source line.
    #[strum(serialize = "register_unsafe_line")]
    RegisterLine,
    /// Reports execution of an unsafe source line.
    #[strum(serialize = "track_unsafe_line_execution")]
    TrackLine,
    /// Prints line coverage.
    #[strum(serialize = "print_unsafe_coverage_stats")]
    PrintCoverage,
    /// Records the program start timestamp.
    #[strum(serialize = "record_program_start")]
    ProgramStart,
    /// Starts timing an unsafe region.
    #[strum(serialize = "cpu_cycle_start_measurement")]
    StartMeasurement,
    /// Stops timing an unsafe region.
    #[strum(serialize = "cpu_cycle_end_measurement")]
    EndMeasurement,
    /// Prints cycle statistics.
    #[strum(serialize = "print_cpu_cycle_stats")]
    PrintCycleStats,
    /// Starts timing an external call.
    #[strum(serialize = "external_call_start")]
    ExternalCallStart,
    /// Stops timing an external call.
    #[strum(serialize = "external_call_end")]
    ExternalCallEnd,
}

impl RuntimeFn {
    /// Returns the symbol name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Returns the IR signature.
    #[must_use]
    pub fn signature(self) -> FunctionType {
        match self {
            RuntimeFn::MemAccess => FunctionType::new(Type::Void, vec![Type::Ptr]),
            RuntimeFn::UnsafeMemAccess => FunctionType::new(Type::Void, vec![Type::Ptr, Type::I1]),
            RuntimeFn::InitMetadata => FunctionType::new(Type::Void, vec![Type::Ptr, Type::I32]),
            RuntimeFn::RecordFunction => FunctionType::new(Type::Void, vec![Type::I32]),
            RuntimeFn::RecordBlock => {
                let mut params = vec![Type::I32; 3];
                params.extend(std::iter::repeat(Type::I16).take(6));
                FunctionType::new(Type::Void, params)
            }
            RuntimeFn::RegisterLine | RuntimeFn::TrackLine => {
                FunctionType::new(Type::Void, vec![Type::I64, Type::Ptr])
            }
            RuntimeFn::StartMeasurement | RuntimeFn::ExternalCallStart => {
                FunctionType::new(Type::I64, vec![])
            }
            RuntimeFn::EndMeasurement | RuntimeFn::ExternalCallEnd => {
                FunctionType::new(Type::Void, vec![Type::I64])
            }
            RuntimeFn::DumpStats
            | RuntimeFn::PrintCoverage
            | RuntimeFn::ProgramStart
            | RuntimeFn::PrintCycleStats => FunctionType::void(),
        }
    }

    /// Returns the return type.
    #[must_use]
    pub fn ret(self) -> Type {
        self.signature().ret
    }

    /// Looks up an entry point by symbol name.
    #[must_use]
    pub fn from_symbol(name: &str) -> Option<Self> {
        Self::iter().find(|f| f.name() == name)
    }

    /// Declares this entry point in the module and returns the declaration.
    ///
    /// An existing function with the same name is reused as is. Declarations get external
    /// linkage and are never inlined.
    pub fn declare(self, module: &mut Module) -> &mut Function {
        let func = module.get_or_insert_function(self.name(), self.signature());
        if func.is_declaration() {
            func.set_linkage(Linkage::External);
            func.add_attributes(FunctionAttributes::NO_INLINE);
        }
        func
    }
}

/// Returns true if the name belongs to the runtime namespace.
#[must_use]
pub fn is_runtime_symbol(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
        || SYNTHESIZED.contains(&name)
        || RuntimeFn::from_symbol(name).is_some()
}

/// Returns true if the function may be instrumented: it has a body, is not an intrinsic and
/// is not part of the runtime namespace.
#[must_use]
pub fn is_instrumentable(func: &Function) -> bool {
    !func.is_declaration() && !func.is_intrinsic() && !is_runtime_symbol(func.name())
}
