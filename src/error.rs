use thiserror::Error;

use crate::ir::VerifyError;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Instrumentation stages themselves never fail on unusual input: a missing precondition,
/// missing source locations or a missing insertion point all cause the affected
/// instrumentation to be skipped. Errors therefore come from misuse of the construction
/// APIs (duplicate symbols, positions that do not exist) and from invalid configuration input.
///
/// # Error Categories
///
/// ## IR Construction Errors
/// - [`Error::Malformed`] - An IR position or reference that does not exist
/// - [`Error::DuplicateSymbol`] - A function or global name is already taken
/// - [`Error::UnknownBlock`] - A block id was not found in the function
/// - [`Error::Verification`] - The verifier rejected a function or module
///
/// ## Configuration Errors
/// - [`Error::UnknownFlag`] - An unrecognized pipeline flag
/// - [`Error::UnknownFamily`] - An unrecognized instrumentation family name
///
/// # Examples
///
/// ```rust
/// use unsafescope::{Error, compiler::PipelineConfig};
///
/// let mut config = PipelineConfig::default();
/// match config.apply_flag("-enable-everything") {
///     Err(Error::UnknownFlag(flag)) => assert_eq!(flag, "-enable-everything"),
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The IR is not in the shape an operation expected.
    ///
    /// This error includes the source location where the problem was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A symbol with this name already exists in the module.
    #[error("Duplicate symbol: {0}")]
    DuplicateSymbol(String),

    /// The block does not exist in the named function.
    #[error("Unknown block bb{block} in function {function}")]
    UnknownBlock {
        /// Name of the function that was searched
        function: String,
        /// The block index that was requested
        block: usize,
    },

    /// A pipeline flag was not recognized.
    ///
    /// Flags follow the `-enable-<stage>` naming used on the compiler command line.
    #[error("Unknown pipeline flag: {0}")]
    UnknownFlag(String),

    /// An instrumentation family name was not recognized.
    #[error("Unknown instrumentation family: {0}")]
    UnknownFamily(String),

    /// The verifier found structural problems.
    ///
    /// Carries every problem found, not just the first one.
    #[error("Verification failed with {} error(s)", .0.len())]
    Verification(Vec<VerifyError>),
}
