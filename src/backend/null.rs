//! Null Backend - Minimal backend for testing
//!
//! This backend accepts all submissions but doesn't perform any actual
//! rendering. It records what it was given and can be scripted to push back
//! or fail, which is all the protocol core needs to be exercised without a
//! real display system.

use super::*;
use crate::compositor::{BufferHandle, RoleKind};
use crate::protocol::*;
use std::collections::VecDeque;

/// One recorded submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedFrame {
    pub surface: SurfaceId,
    pub buffer: BufferId,
    pub size: (i32, i32),
    pub damage: Vec<Rect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scripted {
    Backpressure,
    Fail,
}

#[derive(Debug)]
pub struct NullBackend {
    output: OutputInfo,
    formats: Vec<PixelFormat>,
    frames: Vec<SubmittedFrame>,
    script: VecDeque<Scripted>,
    events: VecDeque<BackendEvent>,
    destroyed_surfaces: Vec<SurfaceId>,
    destroyed_buffers: Vec<BufferId>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            output: OutputInfo {
                width: 1920,
                height: 1080,
                refresh: 60_000,
            },
            formats: vec![PixelFormat::Argb8888, PixelFormat::Xrgb8888],
            frames: Vec::new(),
            script: VecDeque::new(),
            events: VecDeque::new(),
            destroyed_surfaces: Vec::new(),
            destroyed_buffers: Vec::new(),
        }
    }

    pub fn with_output(width: i32, height: i32) -> Self {
        let mut backend = Self::new();
        backend.output.width = width;
        backend.output.height = height;
        backend
    }

    pub fn with_formats(mut self, formats: Vec<PixelFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Answer the next `count` submissions with backpressure
    pub fn push_back(&mut self, count: usize) {
        self.script
            .extend(std::iter::repeat(Scripted::Backpressure).take(count));
    }

    /// Fail the next `count` submissions
    pub fn fail(&mut self, count: usize) {
        self.script.extend(std::iter::repeat(Scripted::Fail).take(count));
    }

    /// Queue a host event for the next poll
    pub fn inject(&mut self, event: BackendEvent) {
        self.events.push_back(event);
    }

    pub fn frames(&self) -> &[SubmittedFrame] {
        &self.frames
    }

    pub fn take_frames(&mut self) -> Vec<SubmittedFrame> {
        std::mem::take(&mut self.frames)
    }

    pub fn destroyed_surfaces(&self) -> &[SurfaceId] {
        &self.destroyed_surfaces
    }

    pub fn destroyed_buffers(&self) -> &[BufferId] {
        &self.destroyed_buffers
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for NullBackend {
    fn init(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn output_info(&self) -> BackendResult<OutputInfo> {
        Ok(self.output)
    }

    fn supported_formats(&self) -> Vec<PixelFormat> {
        self.formats.clone()
    }

    fn submit(
        &mut self,
        surface: SurfaceId,
        buffer: &BufferHandle,
        damage: &[Rect],
    ) -> BackendResult<Submission> {
        match self.script.pop_front() {
            Some(Scripted::Backpressure) => return Ok(Submission::Backpressure),
            Some(Scripted::Fail) => return Err(format!("scripted failure for {}", surface).into()),
            None => {}
        }
        self.frames.push(SubmittedFrame {
            surface,
            buffer: buffer.id,
            size: (buffer.width(), buffer.height()),
            damage: damage.to_vec(),
        });
        Ok(Submission::Accepted)
    }

    fn surface_destroyed(&mut self, surface: SurfaceId) -> BackendResult<()> {
        self.destroyed_surfaces.push(surface);
        Ok(())
    }

    fn buffer_destroyed(&mut self, buffer: BufferId) -> BackendResult<()> {
        self.destroyed_buffers.push(buffer);
        Ok(())
    }

    fn poll_events(&mut self) -> BackendResult<Vec<BackendEvent>> {
        Ok(self.events.drain(..).collect())
    }
}

/// Places each new window a fixed step down and right of the previous one,
/// starting over at the top-left corner when a window would leave the output
#[derive(Debug, Clone)]
pub struct CascadePlacement {
    bounds: Rect,
    step: i32,
    next: i32,
}

impl CascadePlacement {
    pub const STEP: i32 = 32;

    pub fn new(bounds: Rect) -> Self {
        CascadePlacement {
            bounds,
            step: Self::STEP,
            next: 1,
        }
    }

    pub fn set_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }
}

impl PlacementPolicy for CascadePlacement {
    fn resolve_initial_geometry(&mut self, attributes: &SurfaceAttributes) -> Rect {
        let (width, height) = match attributes.role {
            // Let the client pick its size in the first configure
            Some(RoleKind::Toplevel) => (0, 0),
            _ => attributes.buffer_size,
        };
        let (min_w, min_h) = attributes.min_size;
        let (width, height) = (width.max(min_w), height.max(min_h));

        let mut offset = self.step * self.next;
        let fits = |offset: i32| {
            let x = self.bounds.x as i64 + offset as i64;
            let y = self.bounds.y as i64 + offset as i64;
            x + width.max(1) as i64 <= self.bounds.right()
                && y + height.max(1) as i64 <= self.bounds.bottom()
        };
        if !fits(offset) {
            self.next = 0;
            offset = 0;
        }
        self.next += 1;
        Rect::new(self.bounds.x + offset, self.bounds.y + offset, width, height)
    }

    fn output_bounds(&self) -> Rect {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes(role: Option<RoleKind>, size: (i32, i32)) -> SurfaceAttributes {
        SurfaceAttributes {
            surface: SurfaceId::new(ClientId(1), ObjectId(3)),
            role,
            title: None,
            app_id: None,
            parent: None,
            buffer_size: size,
            min_size: (0, 0),
            max_size: (0, 0),
        }
    }

    #[test]
    fn test_cascade_steps_and_wraps() {
        let mut placement = CascadePlacement::new(Rect::from_size(200, 200));
        let first = placement.resolve_initial_geometry(&attributes(None, (120, 120)));
        let second = placement.resolve_initial_geometry(&attributes(None, (120, 120)));
        assert_eq!(first, Rect::new(32, 32, 120, 120));
        assert_eq!(second, Rect::new(64, 64, 120, 120));
        // 96 + 120 > 200: back to the corner
        let third = placement.resolve_initial_geometry(&attributes(None, (120, 120)));
        assert_eq!(third, Rect::new(0, 0, 120, 120));
    }

    #[test]
    fn test_toplevel_size_left_to_client() {
        let mut placement = CascadePlacement::new(Rect::from_size(640, 480));
        let geometry = placement.resolve_initial_geometry(&attributes(Some(RoleKind::Toplevel), (300, 200)));
        assert_eq!((geometry.width, geometry.height), (0, 0));
    }

    #[test]
    fn test_scripted_backpressure_and_failure() {
        let mut backend = NullBackend::new();
        backend.push_back(1);
        backend.fail(1);
        let file = tempfile::tempfile().unwrap();
        file.set_len(64).unwrap();
        let pool = std::sync::Arc::new(crate::compositor::ShmPool::new(file.into(), 64).unwrap());
        let layout = crate::compositor::BufferLayout {
            offset: 0,
            width: 4,
            height: 4,
            stride: 16,
            format: PixelFormat::Argb8888,
        };
        let buffer = crate::compositor::Buffer::new(BufferId::new(ClientId(1), ObjectId(9)), layout, pool);
        let handle = buffer.handle();
        let surface = SurfaceId::new(ClientId(1), ObjectId(3));

        assert_eq!(backend.submit(surface, &handle, &[]).unwrap(), Submission::Backpressure);
        assert!(backend.submit(surface, &handle, &[]).is_err());
        assert_eq!(backend.submit(surface, &handle, &[]).unwrap(), Submission::Accepted);
        assert_eq!(backend.frames().len(), 1);
    }
}
