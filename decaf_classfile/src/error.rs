//! Error types for the decaf class file model.
//!
//! The main type exported is the [`Error`] enum, which represents all possible errors that can
//! occur while resolving constants, descriptors and local variables. The module also provides a
//! [`Result`] type alias for convenience.

use std::num::TryFromIntError;

/// A specialized Result type for decaf class file operations.
///
/// This is a type alias for the standard library's [`Result`](core::result::Result) type with the
/// error type defaulting to [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors that can occur when working with decoded class file entities.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The constant pool is full
    #[error("Constant pool overflow")]
    ConstantPoolOverflow,
    /// Invalid constant pool index
    #[error("Invalid constant pool index {0}")]
    InvalidConstantPoolIndex(u16),
    /// Invalid constant pool index type
    #[error("Invalid constant pool index type {0}")]
    InvalidConstantPoolIndexType(u16),
    /// Invalid local variable reference
    #[error("Invalid local variable index {index} at offset {offset}")]
    InvalidLocalVariable { index: u16, offset: i32 },
    /// An error occurred while parsing a method descriptor
    #[error("Invalid method descriptor: {0}")]
    InvalidMethodDescriptor(String),
    /// Error when attempting to convert a numeric value to a different type
    #[error(transparent)]
    TryFromIntError(#[from] TryFromIntError),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_invalid_constant_pool_index() {
        let error = Error::InvalidConstantPoolIndex(42);
        assert_eq!(error.to_string(), "Invalid constant pool index 42");
    }

    #[test]
    fn test_invalid_local_variable() {
        let error = Error::InvalidLocalVariable {
            index: 3,
            offset: 17,
        };
        assert_eq!(
            error.to_string(),
            "Invalid local variable index 3 at offset 17"
        );
    }
}
