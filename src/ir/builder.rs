//! Positioned instruction insertion.
//!
//! [`IrBuilder`] inserts new instructions at a fixed point in a block and advances past
//! each one, so a sequence of calls appears in program order. Positions are resolved from
//! instruction ids at construction time, which lets passes collect targets by id first and
//! insert afterwards without tracking shifting indices.
//!
//! [`IrBuilder::before`] and [`IrBuilder::after`] search every block for the id. Passes
//! that insert once per target and already know the target's block use
//! [`IrBuilder::before_in`] and [`IrBuilder::after_in`], which search that block only.
//!
//! The builder also models the frontend's annotations: a sticky debug location and a sticky
//! unsafe tag applied to every instruction it creates.

use crate::{
    ir::{
        AtomicOrdering, BinaryOp, BlockId, Callee, CastKind, DebugLoc, Function, InlineAsm,
        InstId, Op, Type, Value,
    },
    Error, Result,
};

/// Inserts instructions at a position inside a function.
///
/// # Examples
///
/// ```rust
/// use unsafescope::ir::{Function, FunctionType, IrBuilder, Op, Type, Value};
///
/// let mut func = Function::new("f", FunctionType::new(Type::Void, vec![Type::Ptr]));
/// let entry = func.add_block("entry", Op::Ret { value: None });
///
/// let mut builder = IrBuilder::at_end(&mut func, entry)?;
/// let loaded = builder.load(Type::I32, Value::Arg(0));
/// builder.store(loaded, Value::Arg(0));
///
/// assert_eq!(func.blocks()[0].instruction_count(), 2);
/// # Ok::<(), unsafescope::Error>(())
/// ```
pub struct IrBuilder<'f> {
    func: &'f mut Function,
    block: BlockId,
    index: usize,
    debug_loc: Option<DebugLoc>,
    unsafe_tag: bool,
}

impl<'f> IrBuilder<'f> {
    fn positioned(func: &'f mut Function, block: BlockId, index: usize) -> Self {
        Self {
            func,
            block,
            index,
            debug_loc: None,
            unsafe_tag: false,
        }
    }

    fn body_len(func: &Function, block: BlockId) -> Result<usize> {
        func.block(block)
            .map(|b| b.instruction_count())
            .ok_or_else(|| Error::UnknownBlock {
                function: func.name().to_string(),
                block: block.index(),
            })
    }

    /// Positions the builder immediately before the block's terminator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBlock`] if the block does not exist.
    pub fn at_end(func: &'f mut Function, block: BlockId) -> Result<Self> {
        let index = Self::body_len(func, block)?;
        Ok(Self::positioned(func, block, index))
    }

    /// Positions the builder at the very start of the block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBlock`] if the block does not exist.
    pub fn at_start(func: &'f mut Function, block: BlockId) -> Result<Self> {
        Self::body_len(func, block)?;
        Ok(Self::positioned(func, block, 0))
    }

    /// Positions the builder after the block's leading PHI nodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBlock`] if the block does not exist.
    pub fn at_first_non_phi(func: &'f mut Function, block: BlockId) -> Result<Self> {
        Self::body_len(func, block)?;
        let index = func
            .block(block)
            .map(|b| b.leading_phi_count())
            .unwrap_or_default();
        Ok(Self::positioned(func, block, index))
    }

    /// Positions the builder immediately before an instruction, which may be a terminator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the instruction does not exist.
    pub fn before(func: &'f mut Function, id: InstId) -> Result<Self> {
        let (block, index) = func
            .position_of(id)
            .ok_or_else(|| malformed_error!("instruction {} not found in {}", id, func.name()))?;
        Ok(Self::positioned(func, block, index))
    }

    /// Positions the builder immediately after a body instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the instruction does not exist or is a terminator,
    /// since nothing can follow a terminator within its block.
    pub fn after(func: &'f mut Function, id: InstId) -> Result<Self> {
        let (block, index) = func
            .position_of(id)
            .ok_or_else(|| malformed_error!("instruction {} not found in {}", id, func.name()))?;
        if index >= Self::body_len(func, block)? {
            return Err(malformed_error!(
                "cannot insert after terminator {} in {}",
                id,
                func.name()
            ));
        }
        Ok(Self::positioned(func, block, index + 1))
    }

    /// Positions the builder immediately before an instruction of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBlock`] if the block does not exist, or [`Error::Malformed`]
    /// if the instruction is not in it.
    pub fn before_in(func: &'f mut Function, block: BlockId, id: InstId) -> Result<Self> {
        let index = Self::index_in(func, block, id)?;
        Ok(Self::positioned(func, block, index))
    }

    /// Positions the builder immediately after a body instruction of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBlock`] if the block does not exist, or [`Error::Malformed`]
    /// if the instruction is not in its body.
    pub fn after_in(func: &'f mut Function, block: BlockId, id: InstId) -> Result<Self> {
        let index = Self::index_in(func, block, id)?;
        if index >= Self::body_len(func, block)? {
            return Err(malformed_error!(
                "cannot insert after terminator {} in {}",
                id,
                func.name()
            ));
        }
        Ok(Self::positioned(func, block, index + 1))
    }

    fn index_in(func: &Function, block: BlockId, id: InstId) -> Result<usize> {
        Self::body_len(func, block)?;
        func.block(block)
            .and_then(|b| b.position_of(id))
            .ok_or_else(|| {
                malformed_error!("instruction {} not found in {} of {}", id, block, func.name())
            })
    }

    /// Returns the current position as `(block, body index)`.
    #[must_use]
    pub fn position(&self) -> (BlockId, usize) {
        (self.block, self.index)
    }

    /// Sets the debug location attached to subsequently created instructions.
    pub fn set_debug_loc(&mut self, loc: Option<DebugLoc>) {
        self.debug_loc = loc;
    }

    /// Sets whether subsequently created instructions carry the unsafe tag.
    pub fn set_unsafe(&mut self, tagged: bool) {
        self.unsafe_tag = tagged;
    }

    /// Inserts an operation at the current position and advances past it.
    pub fn insert(&mut self, op: Op) -> InstId {
        let mut instruction = self.func.make_instruction(op);
        if let Some(loc) = &self.debug_loc {
            instruction = instruction.with_debug_loc(loc.clone());
        }
        if self.unsafe_tag {
            instruction = instruction.with_unsafe_tag();
        }
        let id = instruction.id();
        if let Some(block) = self.func.block_mut(self.block) {
            block.insert(self.index, instruction);
            self.index += 1;
        }
        id
    }

    /// Inserts a direct call and returns its result.
    pub fn call(&mut self, callee: &str, args: Vec<Value>, ret: Type) -> Value {
        Value::Inst(self.insert(Op::Call {
            callee: Callee::Direct(callee.to_string()),
            args,
            ret,
        }))
    }

    /// Inserts a call to inline assembly without operands.
    pub fn call_asm(&mut self, asm: InlineAsm) -> InstId {
        self.insert(Op::Call {
            callee: Callee::Asm(asm),
            args: Vec::new(),
            ret: Type::Void,
        })
    }

    /// Inserts a memory fence.
    pub fn fence(&mut self, ordering: AtomicOrdering) -> InstId {
        self.insert(Op::Fence { ordering })
    }

    /// Inserts a load.
    pub fn load(&mut self, ty: Type, ptr: Value) -> Value {
        Value::Inst(self.insert(Op::Load { ty, ptr }))
    }

    /// Inserts a store.
    pub fn store(&mut self, value: Value, ptr: Value) -> InstId {
        self.insert(Op::Store { value, ptr })
    }

    /// Inserts a binary operation.
    pub fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        Value::Inst(self.insert(Op::Binary { op, lhs, rhs }))
    }

    /// Inserts a cast.
    pub fn cast(&mut self, kind: CastKind, value: Value, to: Type) -> Value {
        Value::Inst(self.insert(Op::Cast { kind, value, to }))
    }

    /// Inserts an address computation.
    pub fn gep(&mut self, base: Value, indices: Vec<Value>) -> Value {
        Value::Inst(self.insert(Op::Gep { base, indices }))
    }

    /// Inserts a stack allocation.
    pub fn alloca(&mut self, ty: Type) -> Value {
        Value::Inst(self.insert(Op::Alloca { ty }))
    }

    /// Inserts a PHI node at the current position.
    pub fn phi(&mut self, ty: Type, incoming: Vec<(Value, BlockId)>) -> Value {
        Value::Inst(self.insert(Op::Phi { ty, incoming }))
    }

    /// Inserts a debug-value intrinsic.
    pub fn dbg_value(&mut self, value: Value, variable: impl Into<String>) -> InstId {
        self.insert(Op::DbgValue {
            value,
            variable: variable.into(),
        })
    }
}
