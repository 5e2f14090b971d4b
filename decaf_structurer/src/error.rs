//! Error handling for the decaf structural reconstruction core.
//!
//! Every error is confined to the method being analyzed: the driver catches it at the method
//! boundary, marks the method, and moves on. Rewrite passes are deterministic, so failures are
//! reproducible.

/// decaf structurer result type
///
/// This is a type alias for the standard library's [`Result`](core::result::Result) type with the
/// error type defaulting to [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors that can occur during structural reconstruction.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// An error occurred while resolving class file entities
    #[error(transparent)]
    ClassFileError(#[from] decaf_classfile::Error),
    /// An error occurred while reading bytecode from the cursor
    #[error("I/O error: {0}")]
    IoError(String),
    /// An index or count could not be converted between integer types
    #[error(transparent)]
    IntConversionError(#[from] std::num::TryFromIntError),
    /// A catch handler contains no instructions
    #[error("Empty catch block at offset {0}")]
    EmptyCatchBlock(i32),
    /// An extraction range does not fit the instruction list
    #[error("Invalid instruction list bounds: {from}..{to} of {length}")]
    InvalidListBounds {
        from: i32,
        to: i32,
        length: usize,
    },
    /// A branch target cannot be resolved to an instruction
    #[error("Invalid branch target: {0}")]
    InvalidBranchTarget(i32),
    /// An opcode that is not a valid JVM instruction
    #[error("Invalid opcode {opcode} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: i32 },
    /// The operand stack of the simulated evaluation is out of balance
    #[error("Operand stack underflow at offset {0}")]
    OperandStackUnderflow(i32),
    /// An instruction does not have the shape the surrounding pattern requires
    #[error("Unexpected instruction {name} at offset {offset}")]
    UnexpectedInstruction { name: &'static str, offset: i32 },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}
