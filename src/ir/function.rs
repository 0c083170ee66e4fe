//! Functions, linkage, attributes and metadata.

use std::{collections::BTreeMap, fmt};

use bitflags::bitflags;
use strum::Display;

use crate::ir::{BasicBlock, BlockId, DebugLoc, FunctionType, InstId, Instruction, Op, Value};

/// Symbol visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Linkage {
    /// Visible outside the translation unit.
    #[default]
    External,
    /// Local to the translation unit.
    Internal,
    /// Local to the translation unit and absent from the symbol table.
    Private,
}

impl Linkage {
    /// Returns true if the symbol cannot be referenced from outside the translation unit.
    #[must_use]
    pub fn is_local(self) -> bool {
        matches!(self, Linkage::Internal | Linkage::Private)
    }
}

bitflags! {
    /// Function attributes relevant to instrumentation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FunctionAttributes: u32 {
        /// Never inline this function.
        const NO_INLINE = 0x0001;
        /// Always inline this function.
        const ALWAYS_INLINE = 0x0002;
        /// The function never unwinds.
        const NO_UNWIND = 0x0004;
        /// The function is rarely called.
        const COLD = 0x0008;
    }
}

/// A metadata node attached to a function or global.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Metadata {
    /// An integer.
    Int(u64),
    /// A string.
    Str(String),
    /// A source location.
    Loc(DebugLoc),
    /// A list of nodes.
    Tuple(Vec<Metadata>),
}

impl Metadata {
    /// Returns the integer payload, if any.
    #[must_use]
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Metadata::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the tuple elements, if this is a tuple.
    #[must_use]
    pub fn as_tuple(&self) -> Option<&[Metadata]> {
        match self {
            Metadata::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

/// A function definition or declaration.
///
/// A function without blocks is a declaration. Block 0 is the entry block.
///
/// # Examples
///
/// ```rust
/// use unsafescope::ir::{Function, FunctionType, Op, Type};
///
/// let mut func = Function::new("main", FunctionType::void());
/// assert!(func.is_declaration());
///
/// func.add_block("entry", Op::Ret { value: None });
/// assert!(!func.is_declaration());
/// assert_eq!(func.instruction_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    name: String,
    ty: FunctionType,
    linkage: Linkage,
    attributes: FunctionAttributes,
    blocks: Vec<BasicBlock>,
    metadata: BTreeMap<String, Metadata>,
    next_inst: u32,
}

impl Function {
    /// Creates a declaration with external linkage.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FunctionType) -> Self {
        Self {
            name: name.into(),
            ty,
            linkage: Linkage::External,
            attributes: FunctionAttributes::empty(),
            blocks: Vec::new(),
            metadata: BTreeMap::new(),
            next_inst: 0,
        }
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the signature.
    #[must_use]
    pub fn ty(&self) -> &FunctionType {
        &self.ty
    }

    /// Returns the linkage.
    #[must_use]
    pub const fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// Sets the linkage.
    pub fn set_linkage(&mut self, linkage: Linkage) {
        self.linkage = linkage;
    }

    /// Returns the attributes.
    #[must_use]
    pub const fn attributes(&self) -> FunctionAttributes {
        self.attributes
    }

    /// Adds attributes.
    pub fn add_attributes(&mut self, attributes: FunctionAttributes) {
        self.attributes |= attributes;
    }

    /// Returns true if this function has no body.
    #[must_use]
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns true for compiler intrinsics.
    #[must_use]
    pub fn is_intrinsic(&self) -> bool {
        self.name.starts_with("llvm.")
    }

    /// Returns the blocks.
    #[must_use]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Returns the blocks mutably.
    pub fn blocks_mut(&mut self) -> &mut [BasicBlock] {
        &mut self.blocks
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns a block by id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    /// Returns a block by id, mutably.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.index())
    }

    /// Returns the entry block.
    #[must_use]
    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    /// Appends a new block with the given terminator and returns its id.
    pub fn add_block(&mut self, label: impl Into<String>, terminator: Op) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        let terminator = self.make_instruction(terminator);
        self.blocks.push(BasicBlock::new(id, label, terminator));
        id
    }

    /// Allocates a fresh instruction id.
    pub fn fresh_inst_id(&mut self) -> InstId {
        let id = InstId::new(self.next_inst);
        self.next_inst += 1;
        id
    }

    /// Creates an instruction with a fresh id. It is not inserted anywhere.
    pub fn make_instruction(&mut self, op: Op) -> Instruction {
        let id = self.fresh_inst_id();
        Instruction::new(id, op)
    }

    /// Returns a metadata node by key.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&Metadata> {
        self.metadata.get(key)
    }

    /// Sets a metadata node, replacing any previous value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Metadata) {
        self.metadata.insert(key.into(), value);
    }

    /// Iterates over every instruction, terminators included, in block order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(BasicBlock::iter_all)
    }

    /// Returns the total number of instructions, terminators included.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instruction_count() + 1).sum()
    }

    /// Locates an instruction.
    ///
    /// The index is a body index; an index equal to the body length denotes the terminator.
    #[must_use]
    pub fn position_of(&self, id: InstId) -> Option<(BlockId, usize)> {
        self.blocks
            .iter()
            .find_map(|b| b.position_of(id).map(|idx| (b.id(), idx)))
    }

    /// Returns an instruction by id.
    #[must_use]
    pub fn instruction(&self, id: InstId) -> Option<&Instruction> {
        self.instructions().find(|i| i.id() == id)
    }

    /// Returns the ids of instructions that use `id` as an operand.
    #[must_use]
    pub fn users_of(&self, id: InstId) -> Vec<InstId> {
        self.instructions()
            .filter(|i| {
                i.op()
                    .operands()
                    .into_iter()
                    .any(|v| v.as_inst() == Some(id))
            })
            .map(Instruction::id)
            .collect()
    }

    /// Rewrites every use of `id` to `replacement`. Returns the number of rewritten operands.
    pub fn replace_all_uses_with(&mut self, id: InstId, replacement: &Value) -> usize {
        let mut replaced = 0;
        for block in &mut self.blocks {
            for instruction in block.iter_all_mut() {
                for operand in instruction.op_mut().operands_mut() {
                    if operand.as_inst() == Some(id) {
                        *operand = replacement.clone();
                        replaced += 1;
                    }
                }
            }
        }
        replaced
    }

    /// Removes a body instruction and returns it.
    ///
    /// Terminators cannot be erased. Uses of the erased value are left untouched; callers
    /// rewrite them first with [`Function::replace_all_uses_with`].
    pub fn erase(&mut self, id: InstId) -> Option<Instruction> {
        let (block, index) = self.position_of(id)?;
        self.blocks.get_mut(block.index())?.remove(index)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.is_declaration() {
            "declare"
        } else {
            "define"
        };
        write!(f, "{keyword} {} {} @{}(", self.linkage, self.ty.ret, self.name)?;
        for (i, param) in self.ty.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")?;
        for (key, value) in &self.metadata {
            write!(f, " !{key} {value:?}")?;
        }
        if self.is_declaration() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        writeln!(f, "}}")
    }
}
