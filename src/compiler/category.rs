//! Unsafe instruction categories.

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

use crate::ir::Op;

/// Coarse classification of an instruction inside an unsafe region.
///
/// The declaration order is the order of the category arguments of the block report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumCount, EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum UnsafeCategory {
    /// Memory reads.
    Load,
    /// Memory writes, including atomic read-modify-write and compare-exchange.
    Store,
    /// Calls and invokes.
    Call,
    /// Pointer reinterpretation and pointer/integer conversion.
    Cast,
    /// Address computation.
    AddressCalc,
    /// Anything else.
    Other,
}

impl UnsafeCategory {
    /// Classifies an operation.
    #[must_use]
    pub fn of(op: &Op) -> Self {
        match op {
            Op::Load { .. } => UnsafeCategory::Load,
            Op::Store { .. } | Op::AtomicRmw { .. } | Op::CmpXchg { .. } => UnsafeCategory::Store,
            Op::Call { .. } | Op::Invoke { .. } => UnsafeCategory::Call,
            Op::Cast { kind, .. } if kind.is_pointer_cast() => UnsafeCategory::Cast,
            Op::Gep { .. } => UnsafeCategory::AddressCalc,
            _ => UnsafeCategory::Other,
        }
    }

    /// Position of this category's counter.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AtomicOrdering, BinaryOp, Callee, CastKind, Type, Value};
    use strum::IntoEnumIterator;

    #[test]
    fn test_mapping() {
        let ptr = Value::Arg(0);
        assert_eq!(
            UnsafeCategory::of(&Op::Load {
                ty: Type::I32,
                ptr: ptr.clone()
            }),
            UnsafeCategory::Load
        );
        assert_eq!(
            UnsafeCategory::of(&Op::AtomicRmw {
                ptr: ptr.clone(),
                value: Value::i32(1),
                ordering: AtomicOrdering::SeqCst
            }),
            UnsafeCategory::Store
        );
        assert_eq!(
            UnsafeCategory::of(&Op::Call {
                callee: Callee::Direct("free".into()),
                args: vec![ptr.clone()],
                ret: Type::Void
            }),
            UnsafeCategory::Call
        );
        assert_eq!(
            UnsafeCategory::of(&Op::Cast {
                kind: CastKind::IntToPtr,
                value: Value::i64(0),
                to: Type::Ptr
            }),
            UnsafeCategory::Cast
        );
        assert_eq!(
            UnsafeCategory::of(&Op::Gep {
                base: ptr,
                indices: vec![Value::i64(4)]
            }),
            UnsafeCategory::AddressCalc
        );
        assert_eq!(
            UnsafeCategory::of(&Op::Binary {
                op: BinaryOp::Add,
                lhs: Value::i32(1),
                rhs: Value::i32(2)
            }),
            UnsafeCategory::Other
        );
    }

    #[test]
    fn test_integer_casts_are_other() {
        let op = Op::Cast {
            kind: CastKind::ZExt,
            value: Value::i32(1),
            to: Type::I64,
        };
        assert_eq!(UnsafeCategory::of(&op), UnsafeCategory::Other);
    }

    #[test]
    fn test_indices_follow_declaration_order() {
        assert_eq!(UnsafeCategory::COUNT, 6);
        for (expected, category) in UnsafeCategory::iter().enumerate() {
            assert_eq!(category.index(), expected);
        }
        assert_eq!(UnsafeCategory::AddressCalc.to_string(), "address_calc");
    }
}
