//! Values, identifiers and constants.
//!
//! Instructions are referenced by [`InstId`], which is unique within a function and stable
//! across insertions and removals. Block ids are indices into the owning function's block
//! list; blocks are never removed, so those stay stable as well.

use std::fmt;

use crate::ir::Type;

/// Identifies an instruction within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(u32);

impl InstId {
    /// Creates an instruction id from its raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Identifies a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    /// Creates a block id from its index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the block index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// An integer of the given type. Only the low `ty` bits are meaningful.
    Int {
        /// Integer type.
        ty: Type,
        /// Raw value.
        value: u64,
    },
    /// The null pointer.
    Null,
    /// A NUL-terminated byte string.
    Str(String),
    /// A literal struct.
    Struct(Vec<Constant>),
    /// An array of constants of a single element type.
    Array {
        /// Element type.
        elem: Type,
        /// Elements in order.
        elements: Vec<Constant>,
    },
    /// The all-zero value of a type.
    Zero(Type),
}

impl Constant {
    /// An integer constant of the given type.
    #[must_use]
    pub fn int(ty: Type, value: u64) -> Self {
        Constant::Int { ty, value }
    }

    /// Returns the type of this constant.
    #[must_use]
    pub fn ty(&self) -> Type {
        match self {
            Constant::Int { ty, .. } | Constant::Zero(ty) => ty.clone(),
            Constant::Null => Type::Ptr,
            Constant::Str(s) => Type::array(Type::I8, s.len() + 1),
            Constant::Struct(fields) => Type::Struct(fields.iter().map(Constant::ty).collect()),
            Constant::Array { elem, elements } => Type::array(elem.clone(), elements.len()),
        }
    }

    /// Returns the integer payload, if this is an integer constant.
    #[must_use]
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Constant::Int { value, .. } => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int { ty, value } => write!(f, "{ty} {value}"),
            Constant::Null => f.write_str("ptr null"),
            Constant::Str(s) => write!(f, "c\"{}\\00\"", s.escape_default()),
            Constant::Struct(fields) => {
                f.write_str("{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(" }")
            }
            Constant::Array { elements, .. } => {
                f.write_str("[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str("]")
            }
            Constant::Zero(ty) => write!(f, "{ty} zeroinitializer"),
        }
    }
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// The result of an instruction in the same function.
    Inst(InstId),
    /// A function argument.
    Arg(u32),
    /// A constant.
    Const(Constant),
    /// The address of a global variable or function.
    Global(String),
    /// An undefined value of the given type.
    Undef(Type),
}

impl Value {
    /// An `i1` constant.
    #[must_use]
    pub fn bool(value: bool) -> Self {
        Value::Const(Constant::int(Type::I1, u64::from(value)))
    }

    /// An `i16` constant.
    #[must_use]
    pub fn i16(value: u16) -> Self {
        Value::Const(Constant::int(Type::I16, u64::from(value)))
    }

    /// An `i32` constant.
    #[must_use]
    pub fn i32(value: u32) -> Self {
        Value::Const(Constant::int(Type::I32, u64::from(value)))
    }

    /// An `i64` constant.
    #[must_use]
    pub fn i64(value: u64) -> Self {
        Value::Const(Constant::int(Type::I64, value))
    }

    /// A reference to a global symbol.
    #[must_use]
    pub fn global(name: impl Into<String>) -> Self {
        Value::Global(name.into())
    }

    /// Returns the instruction this value refers to, if any.
    #[must_use]
    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the global symbol name this value refers to, if any.
    #[must_use]
    pub fn as_global(&self) -> Option<&str> {
        match self {
            Value::Global(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the integer payload for integer constants.
    #[must_use]
    pub fn as_const_int(&self) -> Option<u64> {
        match self {
            Value::Const(c) => c.as_int(),
            _ => None,
        }
    }

    /// Returns true if this value is undefined.
    #[must_use]
    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef(_))
    }
}

impl From<InstId> for Value {
    fn from(id: InstId) -> Self {
        Value::Inst(id)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Inst(id) => write!(f, "{id}"),
            Value::Arg(n) => write!(f, "%arg{n}"),
            Value::Const(c) => write!(f, "{c}"),
            Value::Global(name) => write!(f, "@{name}"),
            Value::Undef(ty) => write!(f, "{ty} undef"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_types() {
        assert_eq!(Constant::Str("a.rs".into()).ty(), Type::array(Type::I8, 5));
        let row = Constant::Struct(vec![
            Constant::int(Type::I32, 0),
            Constant::int(Type::I8, 1),
        ]);
        assert_eq!(row.ty(), Type::Struct(vec![Type::I32, Type::I8]));
    }

    #[test]
    fn test_value_accessors() {
        let id = InstId::new(7);
        assert_eq!(Value::from(id).as_inst(), Some(id));
        assert_eq!(Value::i32(42).as_const_int(), Some(42));
        assert_eq!(Value::bool(true).as_const_int(), Some(1));
        assert_eq!(Value::global("anchor").as_global(), Some("anchor"));
        assert!(Value::Undef(Type::Void).is_undef());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Inst(InstId::new(3)).to_string(), "%3");
        assert_eq!(Value::i64(10).to_string(), "i64 10");
        assert_eq!(Value::global(".str").to_string(), "@.str");
        assert_eq!(BlockId::new(2).to_string(), "bb2");
    }
}
