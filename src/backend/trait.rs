//! Backend trait definitions
//!
//! The protocol core never draws anything itself. Committed surface contents
//! are handed to a [`RenderBackend`], and the first position of a new window
//! is asked from a [`PlacementPolicy`].

use crate::compositor::{BufferHandle, RoleKind};
use crate::input::{KeyboardEvent, PointerEvent, TouchEvent};
use crate::protocol::*;
use std::error::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Outcome of a successful submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// The backend is busy; submit again later
    Backpressure,
}

/// Description of the output surfaces are composed onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    pub width: i32,
    pub height: i32,
    /// Refresh rate in mHz, 0 if unknown
    pub refresh: u32,
}

impl OutputInfo {
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }
}

/// What the placement policy gets to know about a surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceAttributes {
    pub surface: SurfaceId,
    pub role: Option<RoleKind>,
    pub title: Option<String>,
    pub app_id: Option<String>,
    /// Parent toplevel, for dialogs
    pub parent: Option<SurfaceId>,
    /// Size of the current buffer, (0, 0) before the first buffer
    pub buffer_size: (i32, i32),
    pub min_size: (i32, i32),
    pub max_size: (i32, i32),
}

/// Events coming from the host
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Keyboard(KeyboardEvent),
    Pointer(PointerEvent),
    Touch(TouchEvent),
    /// Host window manager asked for a toplevel to close
    CloseRequested(SurfaceId),
    /// Host focus moved to a surface (or away from all of them)
    FocusRequested(Option<SurfaceId>),
    OutputResized { width: i32, height: i32 },
}

/// The render backend
///
/// Submissions carry the buffer handle and the damage of the commit that made
/// it current. Errors are treated as transient and retried by the server.
pub trait RenderBackend {
    /// Initialize the backend
    fn init(&mut self) -> BackendResult<()>;

    /// Get output information
    fn output_info(&self) -> BackendResult<OutputInfo>;

    /// Pixel formats the backend can sample from; advertised through wl_shm
    fn supported_formats(&self) -> Vec<PixelFormat> {
        vec![PixelFormat::Argb8888, PixelFormat::Xrgb8888]
    }

    /// Submit surface contents for composition
    fn submit(
        &mut self,
        surface: SurfaceId,
        buffer: &BufferHandle,
        damage: &[Rect],
    ) -> BackendResult<Submission>;

    /// A surface is gone; drop any state kept for it
    fn surface_destroyed(&mut self, _surface: SurfaceId) -> BackendResult<()> {
        Ok(())
    }

    /// A buffer is gone; drop any imported copy of it
    fn buffer_destroyed(&mut self, _buffer: BufferId) -> BackendResult<()> {
        Ok(())
    }

    /// Poll for events from the host
    /// This should not block - return empty vec if no events
    fn poll_events(&mut self) -> BackendResult<Vec<BackendEvent>>;

    /// Flush any pending operations to the display
    fn flush(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

/// Decides where new windows appear
pub trait PlacementPolicy {
    /// Initial geometry of a surface mapping for the first time. For
    /// toplevels a zero width or height lets the client choose that size.
    fn resolve_initial_geometry(&mut self, attributes: &SurfaceAttributes) -> Rect;

    /// Area windows are placed in
    fn output_bounds(&self) -> Rect;
}
