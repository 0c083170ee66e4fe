//! Basic blocks.
//!
//! A block is a straight-line body followed by exactly one terminator. The terminator is
//! stored separately from the body, so "insert before the terminator" is always
//! `body.len()` and no body edit can displace it.
//!
//! ```text
//! bb0 (entry):
//!   %1 = phi i32 [%arg0, bb1], [i32 0, bb2]   ; PHIs lead the body
//!   %2 = load i32, %arg1 !unsafe
//!   ret void                                  ; terminator
//! ```

use std::fmt;

use crate::ir::{BlockId, InstId, Instruction};

/// A basic block.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    id: BlockId,
    label: String,
    instructions: Vec<Instruction>,
    terminator: Instruction,
}

impl BasicBlock {
    /// Creates a block with an empty body.
    #[must_use]
    pub fn new(id: BlockId, label: impl Into<String>, terminator: Instruction) -> Self {
        Self {
            id,
            label: label.into(),
            instructions: Vec::new(),
            terminator,
        }
    }

    /// Returns the block id.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the block label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the body instructions, excluding the terminator.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Returns a mutable reference to the body.
    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Returns the number of body instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns the terminator.
    #[must_use]
    pub fn terminator(&self) -> &Instruction {
        &self.terminator
    }

    /// Returns the terminator mutably.
    pub fn terminator_mut(&mut self) -> &mut Instruction {
        &mut self.terminator
    }

    /// Iterates over the body followed by the terminator.
    pub fn iter_all(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions
            .iter()
            .chain(std::iter::once(&self.terminator))
    }

    /// Iterates mutably over the body followed by the terminator.
    pub fn iter_all_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.instructions
            .iter_mut()
            .chain(std::iter::once(&mut self.terminator))
    }

    /// Returns the number of leading PHI nodes.
    #[must_use]
    pub fn leading_phi_count(&self) -> usize {
        self.instructions
            .iter()
            .take_while(|i| i.op().is_phi())
            .count()
    }

    /// Returns the body index of an instruction, or `body.len()` for the terminator.
    #[must_use]
    pub fn position_of(&self, id: InstId) -> Option<usize> {
        if self.terminator.id() == id {
            return Some(self.instructions.len());
        }
        self.instructions.iter().position(|i| i.id() == id)
    }

    /// Inserts an instruction into the body. `index` may equal the body length.
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than the body length.
    pub fn insert(&mut self, index: usize, instruction: Instruction) {
        self.instructions.insert(index, instruction);
    }

    /// Appends an instruction to the body, before the terminator.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Removes and returns the body instruction at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Instruction> {
        if index < self.instructions.len() {
            Some(self.instructions.remove(index))
        } else {
            None
        }
    }

    /// Moves all PHI nodes to the front of the body, keeping their relative order.
    ///
    /// Returns true if any instruction moved.
    pub fn hoist_phis(&mut self) -> bool {
        let phi_count = self.instructions.iter().filter(|i| i.op().is_phi()).count();
        if self.leading_phi_count() == phi_count {
            return false;
        }

        let (phis, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.instructions)
            .into_iter()
            .partition(|i| i.op().is_phi());
        self.instructions = phis;
        self.instructions.extend(rest);
        true
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}):", self.id, self.label)?;
        for instruction in self.iter_all() {
            writeln!(f, "  {instruction}")?;
        }
        Ok(())
    }
}
