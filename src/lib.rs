//! waycore - A Wayland display-server protocol core
//!
//! This library implements the server side of the Wayland wire protocol:
//! message framing and file-descriptor passing, per-client object tables,
//! surface and shared-memory buffer state, seat input routing and client
//! session management. Rendering and window placement are delegated to
//! pluggable backends.

#[cfg(not(unix))]
compile_error!("waycore needs Unix domain sockets and file-descriptor passing");

pub mod protocol;
pub mod resources;
pub mod compositor;
pub mod input;
pub mod backend;
pub mod security;
pub mod connection;
pub mod server;

pub use backend::{NullBackend, PlacementPolicy, RenderBackend};
pub use connection::{Connection, Listener};
pub use security::SecurityPolicy;
pub use server::{Server, ServerConfig, ServerError};

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
