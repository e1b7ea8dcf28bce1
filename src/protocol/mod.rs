/// Wayland protocol implementation
///
/// This module implements the Wayland wire protocol: core types, the interface
/// tables, request decoding, event encoding and protocol errors.

pub mod types;
pub mod errors;
pub mod interfaces;
pub mod events;
pub mod requests;
pub mod parser;
pub mod encoder;

pub use types::*;
pub use errors::*;
pub use interfaces::*;
pub use events::*;
pub use requests::*;
pub use parser::*;
pub use encoder::*;

/// Size of the fixed message header (object id, size, opcode)
pub const HEADER_SIZE: usize = 8;

/// Default per-message ceiling, matching libwayland's connection buffer
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

/// Maximum number of file descriptors carried by a single sendmsg call
pub const MAX_FDS_PER_MESSAGE: usize = 28;

/// Padding helper - Wayland requires data to be padded to 4-byte boundaries
pub fn pad(n: usize) -> usize {
    (4 - (n % 4)) % 4
}

/// Calculate padded length
pub fn padded_len(n: usize) -> usize {
    n + pad(n)
}
