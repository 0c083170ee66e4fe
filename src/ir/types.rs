//! IR type system.
//!
//! Only the shapes the instrumentation reads or emits are modeled: integers of the widths
//! used in runtime signatures, an opaque pointer, and the aggregate types needed for the
//! per-function metadata table.

use std::fmt;

/// A first-class IR type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// No value.
    Void,
    /// Boolean.
    I1,
    /// 8-bit integer.
    I8,
    /// 16-bit integer.
    I16,
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// Opaque pointer.
    Ptr,
    /// Literal struct with the given field types.
    Struct(Vec<Type>),
    /// Fixed-length array of `len` elements.
    Array(Box<Type>, usize),
}

impl Type {
    /// Returns true for [`Type::Void`].
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Returns the bit width for integer types.
    #[must_use]
    pub fn int_width(&self) -> Option<u32> {
        match self {
            Type::I1 => Some(1),
            Type::I8 => Some(8),
            Type::I16 => Some(16),
            Type::I32 => Some(32),
            Type::I64 => Some(64),
            _ => None,
        }
    }

    /// Builds an array type.
    #[must_use]
    pub fn array(element: Type, len: usize) -> Self {
        Type::Array(Box::new(element), len)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::I1 => f.write_str("i1"),
            Type::I8 => f.write_str("i8"),
            Type::I16 => f.write_str("i16"),
            Type::I32 => f.write_str("i32"),
            Type::I64 => f.write_str("i64"),
            Type::Ptr => f.write_str("ptr"),
            Type::Struct(fields) => {
                f.write_str("{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(" }")
            }
            Type::Array(element, len) => write!(f, "[{len} x {element}]"),
        }
    }
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    /// Return type.
    pub ret: Type,
    /// Parameter types in order.
    pub params: Vec<Type>,
}

impl FunctionType {
    /// Creates a new function type.
    #[must_use]
    pub fn new(ret: Type, params: Vec<Type>) -> Self {
        Self { ret, params }
    }

    /// A `void ()` signature.
    #[must_use]
    pub fn void() -> Self {
        Self::new(Type::Void, Vec::new())
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}
