/// Backend implementations
///
/// This module contains the render backend and placement traits consumed by
/// the protocol core, and the null backend used for headless operation.

mod r#trait;
pub use r#trait::*;

pub mod null;
pub use null::*;

/// Get available backend names
pub fn available_backends() -> Vec<&'static str> {
    vec!["null"]
}
