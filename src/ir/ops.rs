//! IR operations.
//!
//! [`Op`] is the payload of every instruction. Helper predicates on it (terminator,
//! memory access, side effects) are what the instrumentation stages and the optimizer
//! stand-in dispatch on, so they live here rather than in the passes.

use std::fmt;

use strum::{Display, IntoStaticStr};

use crate::ir::{BlockId, Type, Value};

/// Binary arithmetic and comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    /// Integer addition.
    Add,
    /// Integer subtraction.
    Sub,
    /// Integer multiplication.
    Mul,
    /// Unsigned division.
    UDiv,
    /// Signed division.
    SDiv,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    /// Shift left.
    Shl,
    /// Logical shift right.
    LShr,
    /// Equality comparison.
    #[strum(serialize = "icmp eq")]
    CmpEq,
    /// Inequality comparison.
    #[strum(serialize = "icmp ne")]
    CmpNe,
    /// Unsigned less-than comparison.
    #[strum(serialize = "icmp ult")]
    CmpLt,
}

/// Conversion operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum CastKind {
    /// Reinterpreting cast.
    BitCast,
    /// Integer to pointer.
    IntToPtr,
    /// Pointer to integer.
    PtrToInt,
    /// Pointer address-space change.
    AddrSpaceCast,
    /// Integer truncation.
    Trunc,
    /// Zero extension.
    ZExt,
    /// Sign extension.
    SExt,
}

impl CastKind {
    /// Returns true for casts that reinterpret or convert between pointers and integers.
    #[must_use]
    pub fn is_pointer_cast(self) -> bool {
        matches!(
            self,
            CastKind::BitCast | CastKind::IntToPtr | CastKind::PtrToInt | CastKind::AddrSpaceCast
        )
    }
}

/// Memory ordering for fences and atomics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AtomicOrdering {
    /// Monotonic ordering.
    Monotonic,
    /// Acquire ordering.
    Acquire,
    /// Release ordering.
    Release,
    /// Acquire-release ordering.
    AcqRel,
    /// Sequentially consistent ordering.
    SeqCst,
}

/// An inline assembly blob used as a call target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InlineAsm {
    /// Assembly template.
    pub template: String,
    /// Operand constraint string.
    pub constraints: String,
    /// Whether the assembly has side effects the optimizer must preserve.
    pub has_side_effects: bool,
}

impl InlineAsm {
    /// Creates an inline assembly blob with no operands.
    #[must_use]
    pub fn new(template: impl Into<String>, has_side_effects: bool) -> Self {
        Self {
            template: template.into(),
            constraints: String::new(),
            has_side_effects,
        }
    }
}

/// The target of a call or invoke.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Callee {
    /// A named function in the module.
    Direct(String),
    /// A function pointer.
    Indirect(Value),
    /// Inline assembly.
    Asm(InlineAsm),
}

impl Callee {
    /// Returns the called function's name for direct calls.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Callee::Direct(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the inline assembly for asm calls.
    #[must_use]
    pub fn as_asm(&self) -> Option<&InlineAsm> {
        match self {
            Callee::Asm(asm) => Some(asm),
            _ => None,
        }
    }
}

impl fmt::Display for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Direct(name) => write!(f, "@{name}"),
            Callee::Indirect(value) => write!(f, "{value}"),
            Callee::Asm(asm) => {
                f.write_str("asm ")?;
                if asm.has_side_effects {
                    f.write_str("sideeffect ")?;
                }
                write!(f, "\"{}\", \"{}\"", asm.template, asm.constraints)
            }
        }
    }
}

/// An IR operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Merge of values from predecessor blocks. Must lead its block.
    Phi {
        /// Result type.
        ty: Type,
        /// `(value, predecessor)` pairs.
        incoming: Vec<(Value, BlockId)>,
    },
    /// Stack allocation.
    Alloca {
        /// Allocated type.
        ty: Type,
    },
    /// Memory read.
    Load {
        /// Loaded type.
        ty: Type,
        /// Address read from.
        ptr: Value,
    },
    /// Memory write.
    Store {
        /// Stored value.
        value: Value,
        /// Address written to.
        ptr: Value,
    },
    /// Atomic read-modify-write.
    AtomicRmw {
        /// Address operated on.
        ptr: Value,
        /// Operand value.
        value: Value,
        /// Memory ordering.
        ordering: AtomicOrdering,
    },
    /// Atomic compare-and-exchange.
    CmpXchg {
        /// Address operated on.
        ptr: Value,
        /// Expected current value.
        expected: Value,
        /// Replacement value.
        new: Value,
        /// Memory ordering.
        ordering: AtomicOrdering,
    },
    /// Binary arithmetic or comparison.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Value,
        /// Right operand.
        rhs: Value,
    },
    /// Type conversion.
    Cast {
        /// Conversion kind.
        kind: CastKind,
        /// Converted value.
        value: Value,
        /// Destination type.
        to: Type,
    },
    /// Address computation.
    Gep {
        /// Base pointer.
        base: Value,
        /// Index operands.
        indices: Vec<Value>,
    },
    /// Conditional value selection.
    Select {
        /// Condition.
        cond: Value,
        /// Value when true.
        then_value: Value,
        /// Value when false.
        else_value: Value,
    },
    /// Function call.
    Call {
        /// Call target.
        callee: Callee,
        /// Arguments.
        args: Vec<Value>,
        /// Return type.
        ret: Type,
    },
    /// Memory fence.
    Fence {
        /// Memory ordering.
        ordering: AtomicOrdering,
    },
    /// Debug-info intrinsic describing a source variable.
    DbgValue {
        /// Described value.
        value: Value,
        /// Source variable name.
        variable: String,
    },
    /// Return from the function.
    Ret {
        /// Returned value, if any.
        value: Option<Value>,
    },
    /// Unconditional branch.
    Br {
        /// Target block.
        target: BlockId,
    },
    /// Two-way conditional branch.
    CondBr {
        /// Branch condition.
        cond: Value,
        /// Target when true.
        then_block: BlockId,
        /// Target when false.
        else_block: BlockId,
    },
    /// Multi-way branch.
    Switch {
        /// Scrutinee.
        value: Value,
        /// Target when no case matches.
        default: BlockId,
        /// `(case value, target)` pairs.
        cases: Vec<(u64, BlockId)>,
    },
    /// Call with an exceptional successor.
    Invoke {
        /// Call target.
        callee: Callee,
        /// Arguments.
        args: Vec<Value>,
        /// Return type.
        ret: Type,
        /// Successor on normal return.
        normal: BlockId,
        /// Successor on unwind.
        unwind: BlockId,
    },
    /// Unreachable point.
    Unreachable,
}

impl Op {
    /// Returns true for block terminators.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::Ret { .. }
                | Op::Br { .. }
                | Op::CondBr { .. }
                | Op::Switch { .. }
                | Op::Invoke { .. }
                | Op::Unreachable
        )
    }

    /// Returns true for PHI nodes.
    #[must_use]
    pub fn is_phi(&self) -> bool {
        matches!(self, Op::Phi { .. })
    }

    /// Returns true for debug-info intrinsics.
    #[must_use]
    pub fn is_debug(&self) -> bool {
        matches!(self, Op::DbgValue { .. })
    }

    /// Returns true for plain loads and stores.
    #[must_use]
    pub fn is_memory_access(&self) -> bool {
        matches!(self, Op::Load { .. } | Op::Store { .. })
    }

    /// Returns the accessed address for loads and stores.
    #[must_use]
    pub fn access_pointer(&self) -> Option<&Value> {
        match self {
            Op::Load { ptr, .. } | Op::Store { ptr, .. } => Some(ptr),
            _ => None,
        }
    }

    /// Returns the callee for calls and invokes.
    #[must_use]
    pub fn callee(&self) -> Option<&Callee> {
        match self {
            Op::Call { callee, .. } | Op::Invoke { callee, .. } => Some(callee),
            _ => None,
        }
    }

    /// Returns the directly called function's name for calls and invokes.
    #[must_use]
    pub fn called_function(&self) -> Option<&str> {
        self.callee().and_then(Callee::name)
    }

    /// Returns true if this operation defines a value other instructions can use.
    #[must_use]
    pub fn produces_value(&self) -> bool {
        match self {
            Op::Phi { .. }
            | Op::Alloca { .. }
            | Op::Load { .. }
            | Op::AtomicRmw { .. }
            | Op::CmpXchg { .. }
            | Op::Binary { .. }
            | Op::Cast { .. }
            | Op::Gep { .. }
            | Op::Select { .. } => true,
            Op::Call { ret, .. } | Op::Invoke { ret, .. } => !ret.is_void(),
            _ => false,
        }
    }

    /// Returns true if removing this operation could change observable behavior.
    ///
    /// Loads are treated as removable, matching how an optimizer treats non-volatile loads.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        match self {
            Op::Store { .. }
            | Op::AtomicRmw { .. }
            | Op::CmpXchg { .. }
            | Op::Fence { .. }
            | Op::DbgValue { .. } => true,
            Op::Call { callee, .. } => match callee {
                Callee::Asm(asm) => asm.has_side_effects,
                _ => true,
            },
            op => op.is_terminator(),
        }
    }

    /// Returns all value operands.
    #[must_use]
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Op::Phi { incoming, .. } => incoming.iter().map(|(v, _)| v).collect(),
            Op::Alloca { .. } | Op::Fence { .. } | Op::Br { .. } | Op::Unreachable => Vec::new(),
            Op::Load { ptr, .. } => vec![ptr],
            Op::Store { value, ptr } | Op::AtomicRmw { ptr, value, .. } => vec![value, ptr],
            Op::CmpXchg {
                ptr, expected, new, ..
            } => vec![ptr, expected, new],
            Op::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Op::Cast { value, .. } | Op::DbgValue { value, .. } | Op::Switch { value, .. } => {
                vec![value]
            }
            Op::Gep { base, indices } => std::iter::once(base).chain(indices.iter()).collect(),
            Op::Select {
                cond,
                then_value,
                else_value,
            } => vec![cond, then_value, else_value],
            Op::Call { callee, args, .. } | Op::Invoke { callee, args, .. } => {
                let mut operands: Vec<&Value> = args.iter().collect();
                if let Callee::Indirect(target) = callee {
                    operands.push(target);
                }
                operands
            }
            Op::Ret { value } => value.iter().collect(),
            Op::CondBr { cond, .. } => vec![cond],
        }
    }

    /// Returns mutable references to all value operands.
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Op::Phi { incoming, .. } => incoming.iter_mut().map(|(v, _)| v).collect(),
            Op::Alloca { .. } | Op::Fence { .. } | Op::Br { .. } | Op::Unreachable => Vec::new(),
            Op::Load { ptr, .. } => vec![ptr],
            Op::Store { value, ptr } | Op::AtomicRmw { ptr, value, .. } => vec![value, ptr],
            Op::CmpXchg {
                ptr, expected, new, ..
            } => vec![ptr, expected, new],
            Op::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Op::Cast { value, .. } | Op::DbgValue { value, .. } | Op::Switch { value, .. } => {
                vec![value]
            }
            Op::Gep { base, indices } => std::iter::once(base).chain(indices.iter_mut()).collect(),
            Op::Select {
                cond,
                then_value,
                else_value,
            } => vec![cond, then_value, else_value],
            Op::Call { callee, args, .. } | Op::Invoke { callee, args, .. } => {
                let mut operands: Vec<&mut Value> = args.iter_mut().collect();
                if let Callee::Indirect(target) = callee {
                    operands.push(target);
                }
                operands
            }
            Op::Ret { value } => value.iter_mut().collect(),
            Op::CondBr { cond, .. } => vec![cond],
        }
    }

    /// Returns the successor blocks of a terminator.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Op::Br { target } => vec![*target],
            Op::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Op::Switch { default, cases, .. } => std::iter::once(*default)
                .chain(cases.iter().map(|(_, b)| *b))
                .collect(),
            Op::Invoke { normal, unwind, .. } => vec![*normal, *unwind],
            _ => Vec::new(),
        }
    }

    /// Returns the short opcode name.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Phi { .. } => "phi",
            Op::Alloca { .. } => "alloca",
            Op::Load { .. } => "load",
            Op::Store { .. } => "store",
            Op::AtomicRmw { .. } => "atomicrmw",
            Op::CmpXchg { .. } => "cmpxchg",
            Op::Binary { op, .. } => op.into(),
            Op::Cast { kind, .. } => kind.into(),
            Op::Gep { .. } => "getelementptr",
            Op::Select { .. } => "select",
            Op::Call { .. } => "call",
            Op::Fence { .. } => "fence",
            Op::DbgValue { .. } => "dbg.value",
            Op::Ret { .. } => "ret",
            Op::Br { .. } | Op::CondBr { .. } => "br",
            Op::Switch { .. } => "switch",
            Op::Invoke { .. } => "invoke",
            Op::Unreachable => "unreachable",
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Phi { ty, incoming } => {
                write!(f, "phi {ty} ")?;
                for (i, (value, block)) in incoming.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "[{value}, {block}]")?;
                }
                Ok(())
            }
            Op::Alloca { ty } => write!(f, "alloca {ty}"),
            Op::Load { ty, ptr } => write!(f, "load {ty}, {ptr}"),
            Op::Store { value, ptr } => write!(f, "store {value}, {ptr}"),
            Op::AtomicRmw {
                ptr,
                value,
                ordering,
            } => write!(f, "atomicrmw {ptr}, {value} {ordering}"),
            Op::CmpXchg {
                ptr,
                expected,
                new,
                ordering,
            } => write!(f, "cmpxchg {ptr}, {expected}, {new} {ordering}"),
            Op::Binary { op, lhs, rhs } => write!(f, "{op} {lhs}, {rhs}"),
            Op::Cast { kind, value, to } => write!(f, "{kind} {value} to {to}"),
            Op::Gep { base, indices } => {
                write!(f, "getelementptr {base}")?;
                for index in indices {
                    write!(f, ", {index}")?;
                }
                Ok(())
            }
            Op::Select {
                cond,
                then_value,
                else_value,
            } => write!(f, "select {cond}, {then_value}, {else_value}"),
            Op::Call { callee, args, ret } => {
                write!(f, "call {ret} {callee}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Op::Fence { ordering } => write!(f, "fence {ordering}"),
            Op::DbgValue { value, variable } => write!(f, "dbg.value {value}, !{variable}"),
            Op::Ret { value: Some(value) } => write!(f, "ret {value}"),
            Op::Ret { value: None } => f.write_str("ret void"),
            Op::Br { target } => write!(f, "br {target}"),
            Op::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(f, "br {cond}, {then_block}, {else_block}"),
            Op::Switch {
                value,
                default,
                cases,
            } => {
                write!(f, "switch {value}, {default} [")?;
                for (i, (case, block)) in cases.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{case}: {block}")?;
                }
                f.write_str("]")
            }
            Op::Invoke {
                callee,
                args,
                ret,
                normal,
                unwind,
            } => {
                write!(f, "invoke {ret} {callee}(")?;
                write_list(f, args)?;
                write!(f, ") to {normal} unwind {unwind}")
            }
            Op::Unreachable => f.write_str("unreachable"),
        }
    }
}
