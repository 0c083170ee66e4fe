//! Instructions and their provenance annotations.
//!
//! Besides its operation, an instruction carries three annotations the pipeline relies on:
//!
//! - an optional [`DebugLoc`] produced by the frontend,
//! - the unsafe tag, set once by the frontend for instructions that originate from a
//!   source-level unsafe construct,
//! - an optional [`UnsafeLineInfo`], captured from the debug location while it is still
//!   trustworthy and read back by line coverage after optimization.

use std::fmt;

use crate::ir::{InstId, Op};

/// A source location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebugLoc {
    /// 1-based line, 0 when unknown.
    pub line: u32,
    /// 1-based column, 0 when unknown.
    pub column: u32,
    /// Source file path.
    pub file: String,
    /// Enclosing lexical scope, if known.
    pub scope: Option<String>,
}

impl DebugLoc {
    /// Creates a location without a scope.
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            line,
            column,
            file: file.into(),
            scope: None,
        }
    }

    /// Attaches a lexical scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Returns true if the location is complete enough to be preserved.
    ///
    /// Requires a scope, a file, and non-zero line and column.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.scope.is_some() && !self.file.is_empty() && self.line > 0 && self.column > 0
    }
}

impl fmt::Display for DebugLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Source provenance of an unsafe-tagged instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnsafeLineInfo {
    /// Source line, never 0.
    pub line: u32,
    /// Source file, never empty.
    pub file: String,
}

impl UnsafeLineInfo {
    /// Captures provenance from a debug location.
    ///
    /// Returns `None` for degenerate locations (line 0 or an empty file).
    #[must_use]
    pub fn from_debug_loc(loc: &DebugLoc) -> Option<Self> {
        if loc.line == 0 || loc.file.is_empty() {
            return None;
        }
        Some(Self {
            line: loc.line,
            file: loc.file.clone(),
        })
    }
}

impl fmt::Display for UnsafeLineInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A single IR instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    id: InstId,
    op: Op,
    debug_loc: Option<DebugLoc>,
    unsafe_tag: bool,
    line_info: Option<UnsafeLineInfo>,
}

impl Instruction {
    /// Creates an untagged instruction without location.
    #[must_use]
    pub fn new(id: InstId, op: Op) -> Self {
        Self {
            id,
            op,
            debug_loc: None,
            unsafe_tag: false,
            line_info: None,
        }
    }

    /// Attaches a debug location.
    #[must_use]
    pub fn with_debug_loc(mut self, loc: DebugLoc) -> Self {
        self.debug_loc = Some(loc);
        self
    }

    /// Sets the unsafe tag. The tag cannot be cleared afterwards.
    #[must_use]
    pub fn with_unsafe_tag(mut self) -> Self {
        self.unsafe_tag = true;
        self
    }

    /// Returns the instruction id.
    #[must_use]
    pub const fn id(&self) -> InstId {
        self.id
    }

    /// Returns the operation.
    #[must_use]
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Returns the operation mutably.
    pub fn op_mut(&mut self) -> &mut Op {
        &mut self.op
    }

    /// Returns the debug location, if any.
    #[must_use]
    pub fn debug_loc(&self) -> Option<&DebugLoc> {
        self.debug_loc.as_ref()
    }

    /// Replaces the debug location.
    pub fn set_debug_loc(&mut self, loc: Option<DebugLoc>) {
        self.debug_loc = loc;
    }

    /// Returns true if the frontend tagged this instruction as unsafe.
    #[must_use]
    pub const fn is_unsafe(&self) -> bool {
        self.unsafe_tag
    }

    /// Returns the captured unsafe provenance, if any.
    #[must_use]
    pub fn line_info(&self) -> Option<&UnsafeLineInfo> {
        self.line_info.as_ref()
    }

    /// Attaches captured unsafe provenance.
    pub fn set_line_info(&mut self, info: UnsafeLineInfo) {
        self.line_info = Some(info);
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op.produces_value() {
            write!(f, "{} = ", self.id)?;
        }
        write!(f, "{}", self.op)?;
        if self.unsafe_tag {
            f.write_str(" !unsafe")?;
        }
        if let Some(info) = &self.line_info {
            write!(f, " !unsafe_line({info})")?;
        }
        if let Some(loc) = &self.debug_loc {
            write!(f, " !dbg({loc})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Type, Value};

    #[test]
    fn test_debug_loc_validity() {
        assert!(DebugLoc::new("a.rs", 1, 1).with_scope("f").is_valid());
        assert!(!DebugLoc::new("a.rs", 1, 1).is_valid());
        assert!(!DebugLoc::new("a.rs", 0, 1).with_scope("f").is_valid());
        assert!(!DebugLoc::new("a.rs", 3, 0).with_scope("f").is_valid());
        assert!(!DebugLoc::new("", 3, 4).with_scope("f").is_valid());
    }

    #[test]
    fn test_line_info_rejects_degenerate() {
        assert!(UnsafeLineInfo::from_debug_loc(&DebugLoc::new("a.rs", 0, 2)).is_none());
        assert!(UnsafeLineInfo::from_debug_loc(&DebugLoc::new("", 5, 2)).is_none());

        // Column and scope are irrelevant for provenance
        let info = UnsafeLineInfo::from_debug_loc(&DebugLoc::new("a.rs", 5, 0)).unwrap();
        assert_eq!(info.line, 5);
        assert_eq!(info.file, "a.rs");
    }

    #[test]
    fn test_display() {
        let inst = Instruction::new(
            InstId::new(4),
            Op::Load {
                ty: Type::I32,
                ptr: Value::Arg(0),
            },
        )
        .with_unsafe_tag()
        .with_debug_loc(DebugLoc::new("lib.rs", 10, 5));
        assert_eq!(
            inst.to_string(),
            "%4 = load i32, %arg0 !unsafe !dbg(lib.rs:10:5)"
        );
    }
}
