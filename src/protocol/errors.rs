//! Wayland protocol error codes and error handling

use super::types::*;
use std::fmt;
use thiserror::Error;

/// wl_display error codes as defined in the core protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DisplayErrorCode {
    InvalidObject = 0,
    InvalidMethod = 1,
    NoMemory = 2,
    Implementation = 3,
}

impl DisplayErrorCode {
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0 => Some(DisplayErrorCode::InvalidObject),
            1 => Some(DisplayErrorCode::InvalidMethod),
            2 => Some(DisplayErrorCode::NoMemory),
            3 => Some(DisplayErrorCode::Implementation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayErrorCode::InvalidObject => "invalid_object: server couldn't find object",
            DisplayErrorCode::InvalidMethod => "invalid_method: method doesn't exist on the specified interface",
            DisplayErrorCode::NoMemory => "no_memory: server is out of memory",
            DisplayErrorCode::Implementation => "implementation: implementation error in compositor",
        }
    }
}

impl fmt::Display for DisplayErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Interface-specific error codes, as listed in the protocol XML
pub mod codes {
    pub mod shm {
        pub const INVALID_FORMAT: u32 = 0;
        pub const INVALID_STRIDE: u32 = 1;
        pub const INVALID_FD: u32 = 2;
    }

    pub mod surface {
        pub const INVALID_SCALE: u32 = 0;
        pub const INVALID_TRANSFORM: u32 = 1;
        pub const INVALID_SIZE: u32 = 2;
        pub const INVALID_OFFSET: u32 = 3;
        pub const DEFUNCT_ROLE_OBJECT: u32 = 4;
    }

    pub mod subcompositor {
        pub const BAD_SURFACE: u32 = 0;
        pub const BAD_PARENT: u32 = 1;
    }

    pub mod subsurface {
        pub const BAD_SURFACE: u32 = 0;
    }

    pub mod pointer {
        pub const ROLE: u32 = 0;
    }

    pub mod seat {
        pub const MISSING_CAPABILITY: u32 = 0;
    }

    pub mod xdg_wm_base {
        pub const ROLE: u32 = 0;
        pub const DEFUNCT_SURFACES: u32 = 1;
        pub const NOT_THE_TOPMOST_POPUP: u32 = 2;
        pub const INVALID_POPUP_PARENT: u32 = 3;
        pub const INVALID_SURFACE_STATE: u32 = 4;
        pub const INVALID_POSITIONER: u32 = 5;
        pub const UNRESPONSIVE: u32 = 6;
    }

    pub mod xdg_positioner {
        pub const INVALID_INPUT: u32 = 0;
    }

    pub mod xdg_surface {
        pub const NOT_CONSTRUCTED: u32 = 1;
        pub const ALREADY_CONSTRUCTED: u32 = 2;
        pub const UNCONFIGURED_BUFFER: u32 = 3;
        pub const INVALID_SERIAL: u32 = 4;
        pub const INVALID_SIZE: u32 = 5;
        pub const DEFUNCT_ROLE_OBJECT: u32 = 6;
    }

    pub mod xdg_toplevel {
        pub const INVALID_RESIZE_EDGE: u32 = 0;
        pub const INVALID_PARENT: u32 = 1;
        pub const INVALID_SIZE: u32 = 2;
    }

    pub mod xdg_popup {
        pub const INVALID_GRAB: u32 = 0;
    }
}

/// Transport-level failure: the byte stream cannot be framed or decoded.
///
/// These are always fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("declared message size {size} is smaller than the header")]
    SizeTooSmall { size: usize },

    #[error("declared message size {size} exceeds the limit of {limit} bytes")]
    SizeTooLarge { size: usize, limit: usize },

    #[error("declared message size {size} is not 4-byte aligned")]
    Misaligned { size: usize },

    #[error("argument at offset {offset} runs past the end of the message")]
    Truncated { offset: usize },

    #[error("string argument is not NUL-terminated")]
    UnterminatedString,

    #[error("string argument is not valid UTF-8")]
    InvalidUtf8,

    #[error("non-nullable {kind} argument is null")]
    UnexpectedNull { kind: &'static str },

    #[error("message expects a file descriptor but none was received")]
    MissingFd,

    #[error("{extra} unexpected bytes after the last argument")]
    TrailingBytes { extra: usize },

    #[error("too many file descriptors pending ({count})")]
    TooManyFds { count: usize },

    #[error("expected {expected} argument, found {found}")]
    ArgumentMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Semantic violation, reported to the client through wl_display.error
/// before the connection is closed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{interface}@{object}: error {code}: {message}")]
pub struct ProtocolError {
    /// Object the error is posted on
    pub object: ObjectId,
    /// Interface name of that object, for logs
    pub interface: &'static str,
    /// Interface-specific error code
    pub code: u32,
    pub message: String,
}

impl ProtocolError {
    pub fn new(
        object: ObjectId,
        interface: &'static str,
        code: u32,
        message: impl Into<String>,
    ) -> Self {
        ProtocolError {
            object,
            interface,
            code,
            message: message.into(),
        }
    }

    fn display(code: DisplayErrorCode, message: String) -> Self {
        ProtocolError::new(ObjectId::DISPLAY, "wl_display", code as u32, message)
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Helper functions to create common errors
impl ProtocolError {
    pub fn invalid_object(id: ObjectId) -> Self {
        ProtocolError::display(
            DisplayErrorCode::InvalidObject,
            format!("invalid object {}", id),
        )
    }

    pub fn object_gone(id: ObjectId) -> Self {
        ProtocolError::display(
            DisplayErrorCode::InvalidObject,
            format!("object {} was already destroyed", id),
        )
    }

    pub fn invalid_method(
        object: ObjectId,
        interface: &'static str,
        opcode: u16,
        version: u32,
    ) -> Self {
        ProtocolError::new(
            object,
            interface,
            DisplayErrorCode::InvalidMethod as u32,
            format!("invalid method {}, object {}@{} version {}", opcode, interface, object, version),
        )
    }

    pub fn bad_new_id(id: ObjectId, reason: &str) -> Self {
        ProtocolError::display(
            DisplayErrorCode::InvalidObject,
            format!("invalid new id {}: {}", id, reason),
        )
    }

    pub fn no_memory(reason: impl Into<String>) -> Self {
        ProtocolError::display(DisplayErrorCode::NoMemory, reason.into())
    }

    pub fn implementation(reason: impl Into<String>) -> Self {
        ProtocolError::display(DisplayErrorCode::Implementation, reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_error_codes() {
        assert_eq!(DisplayErrorCode::from_u32(1), Some(DisplayErrorCode::InvalidMethod));
        assert_eq!(DisplayErrorCode::from_u32(9), None);
    }

    #[test]
    fn test_invalid_object_targets_display() {
        let err = ProtocolError::invalid_object(ObjectId::new(42));
        assert_eq!(err.object, ObjectId::DISPLAY);
        assert_eq!(err.code, DisplayErrorCode::InvalidObject as u32);
        assert!(err.message.contains("42"));
    }
}
