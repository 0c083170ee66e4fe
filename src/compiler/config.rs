//! Pipeline configuration.
//!
//! A [`PipelineConfig`] decides which stages run and whether the current translation unit is
//! the primary one. Configurations are built from an [`InstrumentFamily`] preset, from
//! individual `-enable-*` flags, or from the process environment:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `CARGO_PRIMARY_PACKAGE` | `1` marks the unit as primary |
//! | `UNSAFESCOPE_FAMILIES` | comma-separated family names |
//! | `UNSAFESCOPE_FLAGS` | whitespace-separated `-enable-*` flags |
//!
//! # Examples
//!
//! ```rust
//! use unsafescope::compiler::{InstrumentFamily, PipelineConfig};
//!
//! let config = PipelineConfig::from_vars([
//!     ("CARGO_PRIMARY_PACKAGE", "1"),
//!     ("UNSAFESCOPE_FAMILIES", "cpu-cycles"),
//!     ("UNSAFESCOPE_FLAGS", "-enable-heap-tracker"),
//! ])?;
//!
//! assert!(config.primary_unit);
//! assert!(config.enable_cycle_counter);
//! assert!(config.enable_heap_tracker);
//! assert!(!config.enable_block_counter);
//! # Ok::<(), unsafescope::Error>(())
//! ```

use std::str::FromStr;

use strum::{Display, EnumIter, EnumString};

use crate::{Error, Result};

/// Environment variable marking the primary translation unit.
pub const PRIMARY_PACKAGE_VAR: &str = "CARGO_PRIMARY_PACKAGE";
/// Environment variable listing instrumentation families.
pub const FAMILIES_VAR: &str = "UNSAFESCOPE_FAMILIES";
/// Environment variable listing individual stage flags.
pub const FLAGS_VAR: &str = "UNSAFESCOPE_FLAGS";

/// A preset group of stages that are enabled together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum InstrumentFamily {
    /// Region timing and external-call timing.
    CpuCycles,
    /// Load/store reporting.
    HeapTracking,
    /// Function identity and per-block instruction counts.
    UnsafeCounting,
    /// Unsafe source-line coverage.
    LineCoverage,
}

/// Which stages run, and whether the unit is the primary one.
///
/// The default configuration enables nothing and treats the unit as a dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct PipelineConfig {
    /// The unit being compiled belongs to the target program, not a dependency.
    pub primary_unit: bool,
    /// Bracket unsafe regions with sentinels.
    pub enable_region_marker: bool,
    /// Keep source locations alive through optimization.
    pub enable_debug_info_preserver: bool,
    /// Assign function ids and emit the metadata table.
    pub enable_function_tracker: bool,
    /// Report per-block instruction counts.
    pub enable_block_counter: bool,
    /// Track unsafe source-line execution.
    pub enable_line_coverage: bool,
    /// Time unsafe regions in cycles.
    pub enable_cycle_counter: bool,
    /// Time calls into external code.
    pub enable_external_call_tracker: bool,
    /// Report loads and stores.
    pub enable_heap_tracker: bool,
}

impl PipelineConfig {
    /// A primary-unit configuration with every stage disabled.
    #[must_use]
    pub fn primary() -> Self {
        Self {
            primary_unit: true,
            ..Self::default()
        }
    }

    /// Enables every stage of a family.
    #[must_use]
    pub fn with_family(mut self, family: InstrumentFamily) -> Self {
        self.enable_family(family);
        self
    }

    /// Enables every stage of a family in place.
    pub fn enable_family(&mut self, family: InstrumentFamily) {
        self.enable_region_marker = true;
        match family {
            InstrumentFamily::CpuCycles => {
                self.enable_cycle_counter = true;
                self.enable_external_call_tracker = true;
            }
            InstrumentFamily::HeapTracking => {
                self.enable_heap_tracker = true;
            }
            InstrumentFamily::UnsafeCounting => {
                self.enable_function_tracker = true;
                self.enable_block_counter = true;
            }
            InstrumentFamily::LineCoverage => {
                self.enable_debug_info_preserver = true;
                self.enable_line_coverage = true;
            }
        }
    }

    /// Enables the stage named by a command-line flag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFlag`] if the flag names no stage.
    pub fn apply_flag(&mut self, flag: &str) -> Result<()> {
        let slot = match flag {
            "-enable-instmarker" => &mut self.enable_region_marker,
            "-enable-debuginfo-preserver" => &mut self.enable_debug_info_preserver,
            "-enable-unsafe-function-tracker" => &mut self.enable_function_tracker,
            "-enable-unsafe-inst-counter" => &mut self.enable_block_counter,
            "-enable-dynamic-line-count" => &mut self.enable_line_coverage,
            "-enable-cpu-cycle-count" => &mut self.enable_cycle_counter,
            "-enable-external-call-tracker" => &mut self.enable_external_call_tracker,
            "-enable-heap-tracker" => &mut self.enable_heap_tracker,
            _ => return Err(Error::UnknownFlag(flag.to_string())),
        };
        *slot = true;
        Ok(())
    }

    /// Builds a configuration from `(name, value)` pairs.
    ///
    /// Unrelated variables are ignored. Empty entries in the family and flag lists are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFamily`] or [`Error::UnknownFlag`] for unrecognised entries.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                PRIMARY_PACKAGE_VAR => config.primary_unit = value.trim() == "1",
                FAMILIES_VAR => {
                    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                        let family = InstrumentFamily::from_str(name)
                            .map_err(|_| Error::UnknownFamily(name.to_string()))?;
                        config.enable_family(family);
                    }
                }
                FLAGS_VAR => {
                    for flag in value.split_whitespace() {
                        config.apply_flag(flag)?;
                    }
                }
                _ => {}
            }
        }

        Ok(config)
    }

    /// Builds a configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFamily`] or [`Error::UnknownFlag`] for unrecognised entries.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Returns true if any instrumentation stage is enabled.
    #[must_use]
    pub fn any_enabled(&self) -> bool {
        self.enable_region_marker
            || self.enable_debug_info_preserver
            || self.enable_function_tracker
            || self.enable_block_counter
            || self.enable_line_coverage
            || self.enable_cycle_counter
            || self.enable_external_call_tracker
            || self.enable_heap_tracker
    }
}
