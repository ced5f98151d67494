//! Error handling utilities for the Garnet decompiler

use thiserror::Error;

/// The main error type for the Garnet decompiler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GarnetError {
    #[error("Unexpected end of file: {message}")]
    UnexpectedEndOfFile { message: String },

    #[error("Invalid magic number: expected 0xCAFEBABE, found {found:#010x}")]
    InvalidMagic { found: u32 },

    #[error("Unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Corrupted attribute '{name}': {message}")]
    CorruptedAttribute { name: String, message: String },

    #[error("Invalid constant pool index {index} (pool size {size})")]
    InvalidConstantPoolIndex { index: u16, size: u16 },

    #[error("Constant pool entry {index} has tag {found}, expected {expected}")]
    UnexpectedConstantTag {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid field reference at pool index {index}: {message}")]
    InvalidFieldReference { index: u16, message: String },

    #[error("Invalid method reference at pool index {index}: {message}")]
    InvalidMethodReference { index: u16, message: String },

    #[error("Unknown opcode {opcode:#04x} at pc {pc}")]
    UnknownOpcode { opcode: u8, pc: u32 },

    #[error("Truncated instruction at pc {pc}: {message}")]
    TruncatedInstruction { pc: u32, message: String },

    #[error("Invalid branch target {target} from pc {pc}")]
    InvalidBranchTarget { pc: u32, target: i64 },

    #[error("Malformed switch at pc {pc}: {message}")]
    UnalignedSwitchPadding { pc: u32, message: String },

    #[error("Invalid descriptor '{descriptor}': {message}")]
    InvalidDescriptor { descriptor: String, message: String },

    #[error("Operand stack underflow at pc {pc}")]
    StackUnderflow { pc: u32 },

    #[error("Stack height mismatch at block {block}: {message}")]
    StackHeightMismatch { block: u32, message: String },

    #[error("Type conflict: {message}")]
    TypeConflict { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },

    #[error("Not implemented: {message}")]
    Unimplemented { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type alias for Garnet decompiler operations
pub type GarnetResult<T> = Result<T, GarnetError>;

impl GarnetError {
    pub fn eof(message: impl Into<String>) -> Self {
        Self::UnexpectedEndOfFile { message: message.into() }
    }

    pub fn corrupted_attribute(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptedAttribute { name: name.into(), message: message.into() }
    }

    pub fn invalid_descriptor(descriptor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDescriptor { descriptor: descriptor.into(), message: message.into() }
    }

    pub fn truncated(pc: u32, message: impl Into<String>) -> Self {
        Self::TruncatedInstruction { pc, message: message.into() }
    }

    pub fn malformed_switch(pc: u32, message: impl Into<String>) -> Self {
        Self::UnalignedSwitchPadding { pc, message: message.into() }
    }

    pub fn type_conflict(message: impl Into<String>) -> Self {
        Self::TypeConflict { message: message.into() }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::IoError { message: message.into() }
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::Unimplemented { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// True for errors that abort decompilation of the whole class, as
    /// opposed to per-method errors that degrade a single method body.
    pub fn is_container_error(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedEndOfFile { .. }
                | Self::InvalidMagic { .. }
                | Self::UnsupportedVersion { .. }
                | Self::InvalidConstantPoolIndex { .. }
                | Self::UnexpectedConstantTag { .. }
                | Self::IoError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GarnetError::InvalidMagic { found: 0xDEADBEEF };
        assert_eq!(
            err.to_string(),
            "Invalid magic number: expected 0xCAFEBABE, found 0xdeadbeef"
        );
    }

    #[test]
    fn test_container_error_classification() {
        assert!(GarnetError::InvalidMagic { found: 0 }.is_container_error());
        assert!(GarnetError::eof("truncated header").is_container_error());
        assert!(!GarnetError::StackUnderflow { pc: 4 }.is_container_error());
        assert!(!GarnetError::UnknownOpcode { opcode: 0xcb, pc: 0 }.is_container_error());
    }
}
