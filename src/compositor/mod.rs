//! Surface and buffer management
//!
//! The [`SurfaceManager`] owns every wl_surface, wl_buffer, wl_shm_pool,
//! wl_region and xdg_positioner of every client, keyed by (client, object).
//! Requests only touch pending state; commit is the one operation that makes
//! it current. Events produced along the way (buffer releases, configures,
//! frame callbacks) are queued and drained by the server.

pub mod buffer;
pub mod positioner;
pub mod region;
mod subsurface;
pub mod surface;
mod xdg;

pub use buffer::*;
pub use positioner::*;
pub use region::*;
pub use surface::*;

use crate::backend::{PlacementPolicy, SurfaceAttributes};
use crate::protocol::*;
use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use thiserror::Error;

/// Failures of object-creating operations
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Resource exhaustion; the caller keeps the id as a placeholder
    #[error("per-client {kind} limit of {limit} reached")]
    LimitExceeded { kind: &'static str, limit: usize },
}

/// Per-client ceilings; 0 disables a limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceLimits {
    pub max_surfaces_per_client: usize,
    pub max_buffers_per_client: usize,
    pub max_buffer_dimension: i32,
}

impl Default for SurfaceLimits {
    fn default() -> Self {
        SurfaceLimits {
            max_surfaces_per_client: 0,
            max_buffers_per_client: 0,
            max_buffer_dimension: 16384,
        }
    }
}

/// Lifecycle changes other components subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorNotice {
    SurfaceCreated(SurfaceId),
    SurfaceDestroyed(SurfaceId),
    RoleAssigned(SurfaceId, RoleKind),
    Mapped(SurfaceId),
    Unmapped(SurfaceId),
}

/// Result of a wl_surface.commit
#[derive(Debug, Default)]
pub struct CommitOutcome {
    /// Surfaces whose state became current, the committed one first
    pub applied: Vec<SurfaceId>,
}

/// One entry of the composition list
#[derive(Debug, Clone)]
pub struct SurfaceSnapshot {
    pub id: SurfaceId,
    pub role: Option<RoleKind>,
    /// Global position and surface-local size
    pub geometry: Rect,
    pub buffer: Option<BufferHandle>,
    /// Damage of the last applied commit, surface-local
    pub damage: Vec<Rect>,
    /// 0 is the bottom-most surface
    pub stacking_index: usize,
    pub presentable: bool,
}

/// What a client teardown removed
#[derive(Debug, Default)]
pub struct ClientTeardown {
    pub surfaces: Vec<SurfaceId>,
    pub buffers: Vec<BufferId>,
}

fn error(object: ObjectId, interface: Interface, code: u32, message: impl Into<String>) -> ProtocolError {
    ProtocolError::new(object, interface.name(), code, message)
}

type ObjectKey = (ClientId, ObjectId);

/// Surface & buffer manager
#[derive(Debug)]
pub struct SurfaceManager {
    surfaces: HashMap<SurfaceId, Surface>,
    buffers: HashMap<BufferId, Buffer>,
    pools: HashMap<ObjectKey, Arc<ShmPool>>,
    regions: HashMap<ObjectKey, Region>,
    positioners: HashMap<ObjectKey, Positioner>,
    /// Role objects (xdg_surface, xdg_toplevel, xdg_popup, wl_subsurface)
    /// to the wl_surface they belong to
    role_objects: HashMap<ObjectKey, ObjectId>,
    /// Root surfaces, bottom to top
    stacking: Vec<SurfaceId>,
    serials: SerialCounter,
    limits: SurfaceLimits,
    formats: Vec<PixelFormat>,
    output: Rect,
    outbox: Vec<Outgoing>,
    notices: Vec<CompositorNotice>,
}

impl SurfaceManager {
    pub fn new(limits: SurfaceLimits, formats: Vec<PixelFormat>, output: Rect) -> Self {
        SurfaceManager {
            surfaces: HashMap::new(),
            buffers: HashMap::new(),
            pools: HashMap::new(),
            regions: HashMap::new(),
            positioners: HashMap::new(),
            role_objects: HashMap::new(),
            stacking: Vec::new(),
            serials: SerialCounter::new(),
            limits,
            formats,
            output,
            outbox: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn supported_formats(&self) -> &[PixelFormat] {
        &self.formats
    }

    pub fn output_bounds(&self) -> Rect {
        self.output
    }

    pub fn set_output_bounds(&mut self, output: Rect) {
        self.output = output;
    }

    /// Events produced since the last call
    pub fn drain_events(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    pub fn drain_notices(&mut self) -> Vec<CompositorNotice> {
        std::mem::take(&mut self.notices)
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    pub fn surface_count(&self, client: ClientId) -> usize {
        self.surfaces.keys().filter(|id| id.client == client).count()
    }

    pub fn buffer_count(&self, client: ClientId) -> usize {
        self.buffers.keys().filter(|id| id.client == client).count()
    }

    fn surface_ref(&self, id: SurfaceId) -> ProtocolResult<&Surface> {
        self.surfaces
            .get(&id)
            .ok_or_else(|| ProtocolError::invalid_object(id.object))
    }

    fn surface_mut(&mut self, id: SurfaceId) -> ProtocolResult<&mut Surface> {
        self.surfaces
            .get_mut(&id)
            .ok_or_else(|| ProtocolError::invalid_object(id.object))
    }

    /// Surface a live role object belongs to
    fn surface_for_role(&self, client: ClientId, role_object: ObjectId) -> ProtocolResult<SurfaceId> {
        self.role_objects
            .get(&(client, role_object))
            .map(|object| SurfaceId::new(client, *object))
            .ok_or_else(|| ProtocolError::invalid_object(role_object))
    }

    // ----------------------------------------------------------------------
    // Surfaces
    // ----------------------------------------------------------------------

    pub fn create_surface(
        &mut self,
        client: ClientId,
        object: ObjectId,
        version: u32,
    ) -> Result<SurfaceId, CompositorError> {
        let limit = self.limits.max_surfaces_per_client;
        if limit > 0 && self.surface_count(client) >= limit {
            return Err(CompositorError::LimitExceeded {
                kind: "surface",
                limit,
            });
        }
        let id = SurfaceId::new(client, object);
        self.surfaces.insert(id, Surface::new(id, version));
        self.stacking.push(id);
        self.notices.push(CompositorNotice::SurfaceCreated(id));
        log::debug!("Created {}", id);
        Ok(id)
    }

    /// Destroy a surface. Role objects stay alive but inert, child
    /// subsurfaces lose their parent and popups on it are dismissed.
    pub fn destroy_surface(&mut self, client: ClientId, object: ObjectId) -> ProtocolResult<SurfaceId> {
        let id = SurfaceId::new(client, object);
        self.surface_ref(id)?;

        for popup in self.child_popups(id) {
            self.dismiss_popup(popup);
        }
        self.set_mapped(id, false);

        let Some(surface) = self.surfaces.remove(&id) else {
            return Ok(id);
        };
        for buffer in surface.referenced_buffers() {
            self.drop_holder(id, buffer);
        }
        for child in surface.children() {
            let child_id = SurfaceId::new(client, child);
            if let Some(sub) = self.surfaces.get_mut(&child_id).and_then(Surface::subsurface_mut) {
                sub.parent = None;
            }
            self.set_mapped(child_id, false);
        }
        if let Some(parent) = surface.subsurface().and_then(|sub| sub.parent) {
            self.remove_from_parent_stack(SurfaceId::new(client, parent), object);
        }
        for other in self.surfaces.values_mut().filter(|s| s.id.client == client) {
            match &mut other.role {
                Some(Role::Toplevel(toplevel)) if toplevel.parent == Some(object) => {
                    toplevel.parent = None
                }
                Some(Role::Popup(popup)) if popup.parent == Some(object) => popup.parent = None,
                _ => {}
            }
        }
        self.role_objects
            .retain(|(owner, _), target| !(*owner == client && *target == object));
        self.stacking.retain(|entry| *entry != id);
        self.notices.push(CompositorNotice::SurfaceDestroyed(id));
        log::debug!("Destroyed {}", id);
        Ok(id)
    }

    pub fn attach(
        &mut self,
        client: ClientId,
        object: ObjectId,
        buffer: Option<ObjectId>,
        x: i32,
        y: i32,
    ) -> ProtocolResult<()> {
        let id = SurfaceId::new(client, object);
        if let Some(buffer) = buffer {
            self.validate_attach(BufferId::new(client, buffer))?;
        }
        let surface = self.surface_mut(id)?;
        if surface.version >= 5 && (x != 0 || y != 0) {
            return Err(error(
                object,
                Interface::Surface,
                codes::surface::INVALID_OFFSET,
                "attach offset must be 0 since version 5",
            ));
        }
        let before = surface.referenced_buffers();
        surface.pending.buffer = Some(match buffer {
            Some(buffer) => BufferAssignment::New(buffer),
            None => BufferAssignment::Removed,
        });
        if surface.version < 5 {
            surface.pending.offset = (x, y);
        }
        self.update_holders(id, &before);
        Ok(())
    }

    fn validate_attach(&self, id: BufferId) -> ProtocolResult<()> {
        let buffer = self
            .buffers
            .get(&id)
            .ok_or_else(|| ProtocolError::invalid_object(id.object))?;
        let layout = buffer.layout;
        if !self.formats.contains(&layout.format) {
            return Err(error(
                id.object,
                Interface::Buffer,
                codes::shm::INVALID_FORMAT,
                format!("format {} is not supported by the renderer", layout.format),
            ));
        }
        let max = self.limits.max_buffer_dimension;
        if max > 0 && (layout.width > max || layout.height > max) {
            return Err(error(
                id.object,
                Interface::Buffer,
                codes::surface::INVALID_SIZE,
                format!(
                    "buffer size {}x{} exceeds the limit of {}",
                    layout.width, layout.height, max
                ),
            ));
        }
        Ok(())
    }

    pub fn damage(&mut self, client: ClientId, object: ObjectId, rect: Rect) -> ProtocolResult<()> {
        self.surface_mut(SurfaceId::new(client, object))?
            .pending
            .damage
            .add(rect);
        Ok(())
    }

    pub fn damage_buffer(&mut self, client: ClientId, object: ObjectId, rect: Rect) -> ProtocolResult<()> {
        self.surface_mut(SurfaceId::new(client, object))?
            .pending
            .buffer_damage
            .add(rect);
        Ok(())
    }

    pub fn frame(&mut self, client: ClientId, object: ObjectId, callback: ObjectId) -> ProtocolResult<()> {
        self.surface_mut(SurfaceId::new(client, object))?
            .pending
            .frame_callbacks
            .push(callback);
        Ok(())
    }

    pub fn set_input_region(
        &mut self,
        client: ClientId,
        object: ObjectId,
        region: Option<ObjectId>,
    ) -> ProtocolResult<()> {
        let region = self.region_snapshot(client, region)?;
        self.surface_mut(SurfaceId::new(client, object))?.pending.input_region = Some(region);
        Ok(())
    }

    pub fn set_opaque_region(
        &mut self,
        client: ClientId,
        object: ObjectId,
        region: Option<ObjectId>,
    ) -> ProtocolResult<()> {
        let region = self.region_snapshot(client, region)?;
        self.surface_mut(SurfaceId::new(client, object))?.pending.opaque_region = Some(region);
        Ok(())
    }

    /// Regions are copied at the time of the request
    fn region_snapshot(&self, client: ClientId, region: Option<ObjectId>) -> ProtocolResult<Option<Region>> {
        match region {
            None => Ok(None),
            Some(id) => self
                .regions
                .get(&(client, id))
                .cloned()
                .map(Some)
                .ok_or_else(|| ProtocolError::invalid_object(id)),
        }
    }

    pub fn set_buffer_transform(&mut self, client: ClientId, object: ObjectId, value: i32) -> ProtocolResult<()> {
        let transform = Transform::from_i32(value).ok_or_else(|| {
            error(
                object,
                Interface::Surface,
                codes::surface::INVALID_TRANSFORM,
                format!("invalid transform {}", value),
            )
        })?;
        self.surface_mut(SurfaceId::new(client, object))?.pending.transform = Some(transform);
        Ok(())
    }

    pub fn set_buffer_scale(&mut self, client: ClientId, object: ObjectId, scale: i32) -> ProtocolResult<()> {
        if scale < 1 {
            return Err(error(
                object,
                Interface::Surface,
                codes::surface::INVALID_SCALE,
                format!("invalid scale {}", scale),
            ));
        }
        self.surface_mut(SurfaceId::new(client, object))?.pending.scale = Some(scale);
        Ok(())
    }

    pub fn offset(&mut self, client: ClientId, object: ObjectId, x: i32, y: i32) -> ProtocolResult<()> {
        self.surface_mut(SurfaceId::new(client, object))?.pending.offset = (x, y);
        Ok(())
    }

    /// wl_surface.commit
    pub fn commit(
        &mut self,
        client: ClientId,
        object: ObjectId,
        placement: &mut dyn PlacementPolicy,
    ) -> ProtocolResult<CommitOutcome> {
        let id = SurfaceId::new(client, object);
        let surface = self.surface_ref(id)?;

        let mut initial = false;
        if let Some(xdg) = &surface.xdg {
            if let Some(xdg_object) = xdg.object {
                if surface.role.is_none() {
                    return Err(error(
                        xdg_object,
                        Interface::XdgSurface,
                        codes::xdg_surface::NOT_CONSTRUCTED,
                        "commit before a toplevel or popup was created",
                    ));
                }
            }
            let live_role = surface.role.as_ref().and_then(Role::object).is_some();
            let attaches = surface.pending.attached_buffer().is_some();
            if live_role && attaches && (!xdg.initial_commit || !xdg.is_configured()) {
                return Err(error(
                    xdg.object.unwrap_or(object),
                    Interface::XdgSurface,
                    codes::xdg_surface::UNCONFIGURED_BUFFER,
                    "buffer committed before the first configure was acknowledged",
                ));
            }
            initial = live_role && !xdg.initial_commit;
        }

        let mut outcome = CommitOutcome::default();
        if self.is_effectively_sync(id) {
            self.cache_pending(id);
            return Ok(outcome);
        }
        self.apply_tree(id, placement, &mut outcome.applied);
        if initial {
            self.initial_configure(id, placement);
        }
        Ok(outcome)
    }

    fn cache_pending(&mut self, id: SurfaceId) {
        let Some(surface) = self.surfaces.get_mut(&id) else {
            return;
        };
        let before = surface.referenced_buffers();
        let pending = std::mem::take(&mut surface.pending);
        match surface.cached.as_mut() {
            Some(cached) => cached.merge(pending),
            None => surface.cached = Some(pending),
        }
        self.update_holders(id, &before);
    }

    /// Apply cached + pending state of `id`, then everything its children
    /// cached while waiting for it
    fn apply_tree(&mut self, id: SurfaceId, placement: &mut dyn PlacementPolicy, applied: &mut Vec<SurfaceId>) {
        let Some(surface) = self.surfaces.get_mut(&id) else {
            return;
        };
        let before = surface.referenced_buffers();
        let mut state = surface.cached.take().unwrap_or_default();
        state.merge(std::mem::take(&mut surface.pending));
        if let Some(stack) = surface.pending_stack.take() {
            surface.stack = stack;
        }
        let children: Vec<ObjectId> = surface.children().collect();

        self.apply_state(id, state);
        self.update_holders(id, &before);
        applied.push(id);

        for child in children {
            let child_id = SurfaceId::new(id.client, child);
            let Some(child_surface) = self.surfaces.get_mut(&child_id) else {
                continue;
            };
            let has_cache = child_surface.cached.is_some();
            if let Some(sub) = child_surface.subsurface_mut() {
                if let Some(position) = sub.pending_position.take() {
                    sub.position = position;
                }
            }
            if has_cache {
                self.apply_tree(child_id, placement, applied);
            }
        }
        self.update_mapped(id, placement);
    }

    fn apply_state(&mut self, id: SurfaceId, state: SurfaceState) {
        let buffer_size = state
            .attached_buffer()
            .and_then(|object| self.buffers.get(&BufferId::new(id.client, object)))
            .map(Buffer::size);
        let Some(surface) = self.surfaces.get_mut(&id) else {
            return;
        };
        let current = &mut surface.current;

        let mut full_damage = false;
        match state.buffer {
            Some(BufferAssignment::New(object)) => {
                match buffer_size {
                    Some(size) => {
                        current.buffer = Some(object);
                        current.buffer_size = size;
                    }
                    None => {
                        current.buffer = None;
                        current.buffer_size = (0, 0);
                    }
                }
                full_damage = state.damage.is_empty() && state.buffer_damage.is_empty();
            }
            Some(BufferAssignment::Removed) => {
                current.buffer = None;
                current.buffer_size = (0, 0);
            }
            None => {}
        }
        if let Some(transform) = state.transform {
            full_damage |= transform != current.transform;
            current.transform = transform;
        }
        if let Some(scale) = state.scale {
            full_damage |= scale != current.scale;
            current.scale = scale;
        }
        current.size = if current.buffer.is_some() {
            surface_size(current.buffer_size, current.transform, current.scale)
        } else {
            (0, 0)
        };
        if let Some(region) = state.input_region {
            current.input_region = region;
        }
        if let Some(region) = state.opaque_region {
            current.opaque_region = region;
        }
        if let Some(geometry) = state.window_geometry {
            current.window_geometry = Some(geometry);
        }
        current.frame_callbacks.extend(state.frame_callbacks);

        let bounds = current.bounds();
        let mut damage = state.damage;
        for rect in state.buffer_damage.rects() {
            damage.add(buffer_to_surface(
                *rect,
                current.transform,
                current.scale,
                current.buffer_size,
            ));
        }
        if full_damage {
            damage.add(bounds);
        }
        damage.clip(bounds);
        current.damage = damage.take();

        if matches!(surface.role, None | Some(Role::Toplevel(_))) {
            surface.position.0 += state.offset.0;
            surface.position.1 += state.offset.1;
        }
        surface.commits += 1;
    }

    fn can_map(&self, surface: &Surface) -> bool {
        let configured = surface.xdg.as_ref().map_or(false, XdgState::is_configured);
        match &surface.role {
            None | Some(Role::Cursor) => true,
            Some(Role::Subsurface(sub)) => sub.object.is_some() && sub.parent.is_some(),
            Some(Role::Toplevel(toplevel)) => toplevel.object.is_some() && configured,
            Some(Role::Popup(popup)) => popup.object.is_some() && !popup.dismissed && configured,
        }
    }

    fn update_mapped(&mut self, id: SurfaceId, placement: &mut dyn PlacementPolicy) {
        let Some(surface) = self.surfaces.get(&id) else {
            return;
        };
        let mapped = surface.current.buffer.is_some() && self.can_map(surface);
        if mapped && !surface.placed && surface.role.is_none() {
            let attributes = self.attributes(surface);
            let geometry = placement.resolve_initial_geometry(&attributes);
            if let Some(surface) = self.surfaces.get_mut(&id) {
                surface.position = (geometry.x, geometry.y);
                surface.placed = true;
            }
        }
        self.set_mapped(id, mapped);
    }

    fn set_mapped(&mut self, id: SurfaceId, mapped: bool) {
        let Some(surface) = self.surfaces.get_mut(&id) else {
            return;
        };
        if surface.mapped == mapped {
            return;
        }
        surface.mapped = mapped;
        if mapped {
            self.notices.push(CompositorNotice::Mapped(id));
        } else {
            self.notices.push(CompositorNotice::Unmapped(id));
            for popup in self.child_popups(id) {
                self.dismiss_popup(popup);
            }
        }
    }

    fn attributes(&self, surface: &Surface) -> SurfaceAttributes {
        let toplevel = surface.toplevel();
        SurfaceAttributes {
            surface: surface.id,
            role: surface.role_kind(),
            title: toplevel.and_then(|t| t.title.clone()),
            app_id: toplevel.and_then(|t| t.app_id.clone()),
            parent: toplevel
                .and_then(|t| t.parent)
                .map(|parent| SurfaceId::new(surface.id.client, parent)),
            buffer_size: surface.current.buffer_size,
            min_size: toplevel.map_or((0, 0), |t| t.min_size),
            max_size: toplevel.map_or((0, 0), |t| t.max_size),
        }
    }

    /// A subsurface whose commits are held until an ancestor applies
    pub fn is_effectively_sync(&self, id: SurfaceId) -> bool {
        let mut current = id;
        // Parent chains are acyclic; the bound only guards corrupted state
        for _ in 0..=self.surfaces.len() {
            let Some(sub) = self.surfaces.get(&current).and_then(Surface::subsurface) else {
                return false;
            };
            let (Some(_), Some(parent)) = (sub.object, sub.parent) else {
                return false;
            };
            if sub.sync {
                return true;
            }
            current = SurfaceId::new(id.client, parent);
        }
        false
    }

    // ----------------------------------------------------------------------
    // Buffer references
    // ----------------------------------------------------------------------

    /// Bring the holder sets of the buffers `id` referenced before a change
    /// and references now in line with its state
    fn update_holders(&mut self, id: SurfaceId, before: &[ObjectId]) {
        let after = self
            .surfaces
            .get(&id)
            .map(Surface::referenced_buffers)
            .unwrap_or_default();
        for object in &after {
            if let Some(buffer) = self.buffers.get_mut(&BufferId::new(id.client, *object)) {
                buffer.retain(id.object);
            }
        }
        for object in before.iter().filter(|object| !after.contains(object)) {
            self.drop_holder(id, *object);
        }
    }

    fn drop_holder(&mut self, surface: SurfaceId, object: ObjectId) {
        let id = BufferId::new(surface.client, object);
        if let Some(buffer) = self.buffers.get_mut(&id) {
            if buffer.release(surface.object) {
                log::trace!("Releasing {}", id);
                self.outbox
                    .push(Outgoing::new(surface.client, object, Event::BufferRelease));
            }
        }
    }

    // ----------------------------------------------------------------------
    // Regions
    // ----------------------------------------------------------------------

    pub fn create_region(&mut self, client: ClientId, id: ObjectId) {
        self.regions.insert((client, id), Region::new());
    }

    pub fn region_add(&mut self, client: ClientId, id: ObjectId, rect: Rect) -> ProtocolResult<()> {
        self.regions
            .get_mut(&(client, id))
            .ok_or_else(|| ProtocolError::invalid_object(id))?
            .add(rect);
        Ok(())
    }

    pub fn region_subtract(&mut self, client: ClientId, id: ObjectId, rect: Rect) -> ProtocolResult<()> {
        self.regions
            .get_mut(&(client, id))
            .ok_or_else(|| ProtocolError::invalid_object(id))?
            .subtract(rect);
        Ok(())
    }

    pub fn destroy_region(&mut self, client: ClientId, id: ObjectId) {
        self.regions.remove(&(client, id));
    }

    // ----------------------------------------------------------------------
    // Shared memory
    // ----------------------------------------------------------------------

    pub fn create_pool(&mut self, client: ClientId, id: ObjectId, fd: OwnedFd, size: i32) -> ProtocolResult<()> {
        if size <= 0 {
            return Err(error(
                id,
                Interface::ShmPool,
                codes::shm::INVALID_STRIDE,
                format!("invalid pool size {}", size),
            ));
        }
        let pool = ShmPool::new(fd, size as usize).map_err(|err| {
            error(
                id,
                Interface::ShmPool,
                codes::shm::INVALID_FD,
                format!("failed to map shm pool: {}", err),
            )
        })?;
        self.pools.insert((client, id), Arc::new(pool));
        Ok(())
    }

    pub fn resize_pool(&mut self, client: ClientId, id: ObjectId, size: i32) -> ProtocolResult<()> {
        let pool = self
            .pools
            .get(&(client, id))
            .ok_or_else(|| ProtocolError::invalid_object(id))?;
        if size <= 0 || (size as usize) < pool.size() {
            return Err(error(
                id,
                Interface::ShmPool,
                codes::shm::INVALID_STRIDE,
                format!("pools can only grow ({} -> {})", pool.size(), size),
            ));
        }
        pool.resize(size as usize).map_err(|err| {
            error(
                id,
                Interface::ShmPool,
                codes::shm::INVALID_FD,
                format!("failed to remap shm pool: {}", err),
            )
        })
    }

    /// Buffers created from the pool keep its memory mapped
    pub fn destroy_pool(&mut self, client: ClientId, id: ObjectId) {
        self.pools.remove(&(client, id));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_buffer(
        &mut self,
        client: ClientId,
        pool: ObjectId,
        id: ObjectId,
        offset: i32,
        width: i32,
        height: i32,
        stride: i32,
        format: u32,
    ) -> Result<BufferId, CompositorError> {
        let shm_pool = self
            .pools
            .get(&(client, pool))
            .ok_or_else(|| ProtocolError::invalid_object(pool))?
            .clone();
        let format = PixelFormat::from_code(format)
            .filter(|format| self.formats.contains(format))
            .ok_or_else(|| {
                error(
                    pool,
                    Interface::ShmPool,
                    codes::shm::INVALID_FORMAT,
                    format!("unsupported format {:#x}", format),
                )
            })?;
        let layout = BufferLayout {
            offset,
            width,
            height,
            stride,
            format,
        };
        validate_layout(&layout, shm_pool.size())
            .map_err(|reason| error(pool, Interface::ShmPool, codes::shm::INVALID_STRIDE, reason))?;

        let limit = self.limits.max_buffers_per_client;
        if limit > 0 && self.buffer_count(client) >= limit {
            return Err(CompositorError::LimitExceeded {
                kind: "buffer",
                limit,
            });
        }
        let buffer_id = BufferId::new(client, id);
        self.buffers
            .insert(buffer_id, Buffer::new(buffer_id, layout, shm_pool));
        Ok(buffer_id)
    }

    /// wl_buffer.destroy. Surfaces still referencing the buffer lose it; no
    /// release is sent for a buffer the client destroyed itself.
    pub fn destroy_buffer(&mut self, client: ClientId, id: ObjectId) -> Vec<SurfaceId> {
        let Some(buffer) = self.buffers.remove(&BufferId::new(client, id)) else {
            return Vec::new();
        };
        let holders: Vec<SurfaceId> = buffer
            .holders()
            .map(|object| SurfaceId::new(client, object))
            .collect();
        for holder in &holders {
            let Some(surface) = self.surfaces.get_mut(holder) else {
                continue;
            };
            if surface.pending.attached_buffer() == Some(id) {
                surface.pending.buffer = None;
            }
            if let Some(cached) = surface.cached.as_mut() {
                if cached.attached_buffer() == Some(id) {
                    cached.buffer = None;
                }
            }
            if surface.current.buffer == Some(id) {
                surface.current.buffer = None;
                surface.current.buffer_size = (0, 0);
                surface.current.size = (0, 0);
                surface.current.damage.clear();
                self.set_mapped(*holder, false);
            }
        }
        holders
    }

    // ----------------------------------------------------------------------
    // Cursor role
    // ----------------------------------------------------------------------

    /// Give `object` the cursor role (wl_pointer.set_cursor)
    pub fn set_cursor_role(&mut self, client: ClientId, pointer: ObjectId, object: ObjectId) -> ProtocolResult<SurfaceId> {
        let id = SurfaceId::new(client, object);
        let surface = self.surface_mut(id)?;
        match surface.role_kind() {
            None => {
                surface.role = Some(Role::Cursor);
                self.stacking.retain(|entry| *entry != id);
                self.notices
                    .push(CompositorNotice::RoleAssigned(id, RoleKind::Cursor));
            }
            Some(RoleKind::Cursor) => {}
            Some(kind) => {
                return Err(error(
                    pointer,
                    Interface::Pointer,
                    codes::pointer::ROLE,
                    format!("{} already has the {} role", id, kind),
                ))
            }
        }
        Ok(id)
    }

    // ----------------------------------------------------------------------
    // Composition
    // ----------------------------------------------------------------------

    fn window_origin(&self, id: SurfaceId) -> (i32, i32) {
        let (x, y) = self.global_position(id);
        let (gx, gy) = self
            .surfaces
            .get(&id)
            .and_then(|s| s.current.window_geometry)
            .map_or((0, 0), |g| (g.x, g.y));
        (x.saturating_add(gx), y.saturating_add(gy))
    }

    /// Global position of a surface's origin
    pub fn global_position(&self, id: SurfaceId) -> (i32, i32) {
        let Some(surface) = self.surfaces.get(&id) else {
            return (0, 0);
        };
        match &surface.role {
            Some(Role::Subsurface(sub)) => match sub.parent {
                Some(parent) => {
                    let (x, y) = self.global_position(SurfaceId::new(id.client, parent));
                    (x.saturating_add(sub.position.0), y.saturating_add(sub.position.1))
                }
                None => surface.position,
            },
            Some(Role::Popup(popup)) => match popup.parent {
                Some(parent) => {
                    let (x, y) = self.window_origin(SurfaceId::new(id.client, parent));
                    let (gx, gy) = surface
                        .current
                        .window_geometry
                        .map_or((0, 0), |g| (g.x, g.y));
                    (
                        x.saturating_add(popup.geometry.x).saturating_sub(gx),
                        y.saturating_add(popup.geometry.y).saturating_sub(gy),
                    )
                }
                None => surface.position,
            },
            _ => surface.position,
        }
    }

    /// Move a root surface and the popups stacked on it to the top
    pub fn raise(&mut self, id: SurfaceId) {
        if self.stacking.iter().any(|entry| *entry == id) {
            self.stacking.retain(|entry| *entry != id);
        }
        if matches!(
            self.surfaces.get(&id).and_then(Surface::role_kind),
            Some(RoleKind::Subsurface | RoleKind::Cursor)
        ) {
            return;
        }
        self.stacking.push(id);
        let popups: Vec<SurfaceId> = self
            .stacking
            .iter()
            .copied()
            .filter(|entry| *entry != id && self.popup_root(*entry) == Some(id))
            .collect();
        self.stacking.retain(|entry| !popups.contains(entry));
        self.stacking.extend(popups);
    }

    /// Toplevel at the bottom of a popup chain
    fn popup_root(&self, id: SurfaceId) -> Option<SurfaceId> {
        let mut current = id;
        for _ in 0..=self.surfaces.len() {
            match self.surfaces.get(&current)?.popup() {
                Some(popup) => current = SurfaceId::new(id.client, popup.parent?),
                None => return Some(current),
            }
        }
        None
    }

    pub fn set_presentable(&mut self, id: SurfaceId, presentable: bool) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.presentable = presentable;
        }
    }

    /// Visible surfaces bottom to top, with their global origin
    fn composition_order(&self) -> Vec<(SurfaceId, (i32, i32))> {
        let mut order = Vec::new();
        for root in &self.stacking {
            if self.surfaces.get(root).map_or(false, |s| s.mapped) {
                self.walk_tree(*root, self.global_position(*root), &mut order);
            }
        }
        order
    }

    fn walk_tree(&self, id: SurfaceId, origin: (i32, i32), out: &mut Vec<(SurfaceId, (i32, i32))>) {
        let Some(surface) = self.surfaces.get(&id) else {
            return;
        };
        for member in &surface.stack {
            if *member == id.object {
                out.push((id, origin));
                continue;
            }
            let child = SurfaceId::new(id.client, *member);
            let Some(child_surface) = self.surfaces.get(&child) else {
                continue;
            };
            if let (true, Some(sub)) = (child_surface.mapped, child_surface.subsurface()) {
                let child_origin = (
                    origin.0.saturating_add(sub.position.0),
                    origin.1.saturating_add(sub.position.1),
                );
                self.walk_tree(child, child_origin, out);
            }
        }
    }

    /// Surfaces to composite, bottom to top
    pub fn composition_list(&self) -> Vec<SurfaceSnapshot> {
        self.composition_order()
            .into_iter()
            .enumerate()
            .filter_map(|(stacking_index, (id, (x, y)))| {
                let surface = self.surfaces.get(&id)?;
                let current = &surface.current;
                Some(SurfaceSnapshot {
                    id,
                    role: surface.role_kind(),
                    geometry: Rect::new(x, y, current.size.0, current.size.1),
                    buffer: current
                        .buffer
                        .and_then(|object| self.buffers.get(&BufferId::new(id.client, object)))
                        .map(Buffer::handle),
                    damage: current.damage.clone(),
                    stacking_index,
                    presentable: surface.presentable,
                })
            })
            .collect()
    }

    /// Topmost mapped surface accepting input at a global point, with the
    /// surface-local coordinates of the point
    pub fn hit_test(&self, point: Point) -> Option<(SurfaceId, Point)> {
        self.composition_order()
            .into_iter()
            .rev()
            .find_map(|(id, (x, y))| {
                let local = Point::new(point.x - x as f64, point.y - y as f64);
                let surface = self.surfaces.get(&id)?;
                surface.current.accepts_input(local).then_some((id, local))
            })
    }

    /// Global position of a surface-local point, if the surface is visible
    pub fn to_global(&self, id: SurfaceId, local: Point) -> Option<Point> {
        self.composition_order()
            .into_iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, (x, y))| Point::new(local.x + x as f64, local.y + y as f64))
    }

    pub fn is_mapped(&self, id: SurfaceId) -> bool {
        self.surfaces.get(&id).map_or(false, |s| s.mapped)
    }

    /// Fire every committed frame callback. Returns the callback objects,
    /// which the caller destroys.
    pub fn frame_tick(&mut self, time: Timestamp) -> Vec<(ClientId, ObjectId)> {
        let mut fired = Vec::new();
        for surface in self.surfaces.values_mut() {
            for callback in surface.current.frame_callbacks.drain(..) {
                fired.push((surface.id.client, callback));
                self.outbox.push(Outgoing::new(
                    surface.id.client,
                    callback,
                    Event::CallbackDone { data: time.get() },
                ));
            }
        }
        fired
    }

    /// Forget a frame callback whose object went away
    pub fn drop_frame_callback(&mut self, client: ClientId, callback: ObjectId) {
        for surface in self.surfaces.values_mut().filter(|s| s.id.client == client) {
            surface.pending.frame_callbacks.retain(|id| *id != callback);
            if let Some(cached) = surface.cached.as_mut() {
                cached.frame_callbacks.retain(|id| *id != callback);
            }
            surface.current.frame_callbacks.retain(|id| *id != callback);
        }
    }

    /// Remove everything a disconnected client owned. No events are produced
    /// for the client itself.
    pub fn teardown_client(&mut self, client: ClientId) -> ClientTeardown {
        let mut report = ClientTeardown::default();
        let surfaces: Vec<SurfaceId> = self
            .surfaces
            .keys()
            .copied()
            .filter(|id| id.client == client)
            .collect();
        for id in &surfaces {
            if self.surfaces.get(id).map_or(false, |s| s.mapped) {
                self.notices.push(CompositorNotice::Unmapped(*id));
            }
            self.surfaces.remove(id);
            self.notices.push(CompositorNotice::SurfaceDestroyed(*id));
        }
        report.surfaces = surfaces;
        report.buffers = self
            .buffers
            .keys()
            .copied()
            .filter(|id| id.client == client)
            .collect();
        self.buffers.retain(|id, _| id.client != client);
        self.pools.retain(|(owner, _), _| *owner != client);
        self.regions.retain(|(owner, _), _| *owner != client);
        self.positioners.retain(|(owner, _), _| *owner != client);
        self.role_objects.retain(|(owner, _), _| *owner != client);
        self.stacking.retain(|id| id.client != client);
        self.outbox.retain(|event| event.client != client);
        report
    }
}
