//! Structural verification.
//!
//! Instrumentation must never leave the IR in a shape the host compiler would reject. The
//! verifier checks the invariants the passes are most likely to break: PHI placement,
//! terminator placement, operands pointing at erased instructions, branch targets, and
//! references to symbols that were never declared.

use std::collections::HashSet;

use thiserror::Error;

use crate::{
    ir::{BlockId, Callee, Function, InstId, Module},
    Error, Result,
};

/// A single structural problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// A PHI node follows a non-PHI instruction.
    #[error("{function}: PHI {inst} in {block} does not lead its block")]
    PhiNotLeading {
        /// Function name.
        function: String,
        /// Offending block.
        block: BlockId,
        /// Offending PHI.
        inst: InstId,
    },

    /// A terminator appears inside a block body.
    #[error("{function}: terminator {inst} in the body of {block}")]
    TerminatorInBody {
        /// Function name.
        function: String,
        /// Offending block.
        block: BlockId,
        /// Offending instruction.
        inst: InstId,
    },

    /// The terminator slot holds a non-terminator.
    #[error("{function}: {block} does not end in a terminator")]
    MissingTerminator {
        /// Function name.
        function: String,
        /// Offending block.
        block: BlockId,
    },

    /// An operand refers to an instruction that does not exist.
    #[error("{function}: {user} uses {operand}, which does not exist")]
    DanglingOperand {
        /// Function name.
        function: String,
        /// The using instruction.
        user: InstId,
        /// The missing definition.
        operand: InstId,
    },

    /// A branch targets a block that does not exist.
    #[error("{function}: {block} branches to missing {target}")]
    InvalidBranchTarget {
        /// Function name.
        function: String,
        /// Branching block.
        block: BlockId,
        /// Missing target.
        target: BlockId,
    },

    /// A direct call names a function the module does not declare.
    #[error("{function}: call to undeclared function @{callee}")]
    UnknownCallee {
        /// Function name.
        function: String,
        /// Missing callee.
        callee: String,
    },

    /// A symbol operand names a global the module does not define.
    #[error("{function}: reference to undefined symbol @{symbol}")]
    UnknownSymbol {
        /// Function name.
        function: String,
        /// Missing symbol.
        symbol: String,
    },
}

/// Checks functions and modules for structural problems.
pub struct Verifier;

impl Verifier {
    /// Checks a single function in isolation.
    ///
    /// Symbol references are not resolved here; use [`Verifier::verify_module`] for that.
    #[must_use]
    pub fn verify_function(func: &Function) -> Vec<VerifyError> {
        let mut errors = Vec::new();
        let name = func.name();
        let defined: HashSet<InstId> = func.instructions().map(|i| i.id()).collect();

        for block in func.blocks() {
            let mut seen_non_phi = false;
            for inst in block.instructions() {
                if inst.op().is_phi() {
                    if seen_non_phi {
                        errors.push(VerifyError::PhiNotLeading {
                            function: name.to_string(),
                            block: block.id(),
                            inst: inst.id(),
                        });
                    }
                } else {
                    seen_non_phi = true;
                }

                if inst.op().is_terminator() {
                    errors.push(VerifyError::TerminatorInBody {
                        function: name.to_string(),
                        block: block.id(),
                        inst: inst.id(),
                    });
                }
            }

            let terminator = block.terminator();
            if !terminator.op().is_terminator() {
                errors.push(VerifyError::MissingTerminator {
                    function: name.to_string(),
                    block: block.id(),
                });
            }
            for target in terminator.op().successors() {
                if func.block(target).is_none() {
                    errors.push(VerifyError::InvalidBranchTarget {
                        function: name.to_string(),
                        block: block.id(),
                        target,
                    });
                }
            }

            for inst in block.iter_all() {
                for operand in inst.op().operands() {
                    if let Some(used) = operand.as_inst() {
                        if !defined.contains(&used) {
                            errors.push(VerifyError::DanglingOperand {
                                function: name.to_string(),
                                user: inst.id(),
                                operand: used,
                            });
                        }
                    }
                }
            }
        }

        errors
    }

    /// Checks every function and resolves symbol references against the module.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Verification`] carrying every problem found.
    pub fn verify_module(module: &Module) -> Result<()> {
        let mut errors = Vec::new();

        for func in module.functions() {
            errors.extend(Self::verify_function(func));

            for inst in func.instructions() {
                if let Some(Callee::Direct(callee)) = inst.op().callee() {
                    if module.function(callee).is_none() {
                        errors.push(VerifyError::UnknownCallee {
                            function: func.name().to_string(),
                            callee: callee.clone(),
                        });
                    }
                }
                for operand in inst.op().operands() {
                    if let Some(symbol) = operand.as_global() {
                        if !module.has_symbol(symbol) {
                            errors.push(VerifyError::UnknownSymbol {
                                function: func.name().to_string(),
                                symbol: symbol.to_string(),
                            });
                        }
                    }
                }
            }
        }

        for entry in module.global_ctors().iter().chain(module.global_dtors()) {
            if module.function(&entry.function).is_none() {
                errors.push(VerifyError::UnknownCallee {
                    function: "<structors>".to_string(),
                    callee: entry.function.clone(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Verification(errors))
        }
    }
}
