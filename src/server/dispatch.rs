//! Request dispatch
//!
//! Resolves the target object, checks the opcode against the object's
//! version, decodes the arguments and hands the typed request to the owning
//! component. Any [`ProtocolError`] returned here ends the client.

use super::*;
use crate::compositor::CompositorError;
use crate::resources::{ChildBinding, RegistryError};

fn registry_error(err: RegistryError) -> ProtocolError {
    err.to_protocol_error()
        .unwrap_or_else(|| ProtocolError::no_memory(err.to_string()))
}

fn malformed(object: ObjectId, interface: Interface, desc: &MessageDesc, err: WireError) -> ProtocolError {
    ProtocolError::new(
        object,
        interface.name(),
        DisplayErrorCode::InvalidMethod as u32,
        format!("invalid arguments for {}@{}.{}: {}", interface, object, desc.name, err),
    )
}

/// Objects created by a request inherit the version of the object the
/// request was sent on, within what their own interface supports
fn child_version(interface: Interface, version: u32) -> u32 {
    version.min(interface.max_version()).max(1)
}

/// The new object a request creates, if any
fn created_object(request: &Request, version: u32) -> Option<(ObjectId, Interface, u32)> {
    let (id, interface) = match request {
        Request::Display(DisplayRequest::Sync { callback }) => (*callback, Interface::Callback),
        Request::Display(DisplayRequest::GetRegistry { registry }) => {
            (*registry, Interface::Registry)
        }
        Request::Registry(RegistryRequest::Bind {
            interface,
            version: requested,
            id,
            ..
        }) => {
            let interface = Interface::from_name(interface)?;
            return Some((*id, interface, child_version(interface, *requested)));
        }
        Request::Compositor(CompositorRequest::CreateSurface { id }) => (*id, Interface::Surface),
        Request::Compositor(CompositorRequest::CreateRegion { id }) => (*id, Interface::Region),
        Request::Surface(SurfaceRequest::Frame { callback }) => (*callback, Interface::Callback),
        Request::Shm(ShmRequest::CreatePool { id, .. }) => (*id, Interface::ShmPool),
        Request::ShmPool(ShmPoolRequest::CreateBuffer { id, .. }) => (*id, Interface::Buffer),
        Request::Subcompositor(SubcompositorRequest::GetSubsurface { id, .. }) => {
            (*id, Interface::Subsurface)
        }
        Request::Seat(SeatRequest::GetPointer { id }) => (*id, Interface::Pointer),
        Request::Seat(SeatRequest::GetKeyboard { id }) => (*id, Interface::Keyboard),
        Request::Seat(SeatRequest::GetTouch { id }) => (*id, Interface::Touch),
        Request::XdgWmBase(WmBaseRequest::CreatePositioner { id }) => {
            (*id, Interface::XdgPositioner)
        }
        Request::XdgWmBase(WmBaseRequest::GetXdgSurface { id, .. }) => {
            (*id, Interface::XdgSurface)
        }
        Request::XdgSurface(XdgSurfaceRequest::GetToplevel { id }) => {
            (*id, Interface::XdgToplevel)
        }
        Request::XdgSurface(XdgSurfaceRequest::GetPopup { id, .. }) => (*id, Interface::XdgPopup),
        _ => return None,
    };
    Some((id, interface, child_version(interface, version)))
}

/// xdg_toplevel.resize_edge values
fn valid_resize_edge(edges: u32) -> bool {
    matches!(edges, 0 | 1 | 2 | 4 | 5 | 6 | 8 | 9 | 10)
}

impl Server {
    /// Dispatch one framed request. A protocol violation is reported to the
    /// client, which is then disconnected.
    pub fn dispatch(&mut self, client: ClientId, message: RawMessage) {
        if !self.clients.contains_key(&client) {
            return;
        }
        if let Err(error) = self.handle_message(client, message) {
            self.post_error(client, error);
        }
        self.pump();
        self.reap();
    }

    fn handle_message(&mut self, client: ClientId, message: RawMessage) -> ProtocolResult<()> {
        let object = message.header.object_id;
        let opcode = message.header.opcode;
        let entry = self
            .registry
            .lookup(client, object)
            .map_err(|err| err.to_protocol_error())?;
        let (interface, version, inert) = (entry.interface, entry.version, entry.inert);
        let desc = interface
            .request(opcode, version)
            .ok_or_else(|| ProtocolError::invalid_method(object, interface.name(), opcode, version))?;

        let Some(state) = self.clients.get_mut(&client) else {
            return Ok(());
        };
        let args = self
            .parser
            .decode_arguments(&message.body, desc.signature, state.fds_mut())
            .map_err(|err| malformed(object, interface, desc, err))?;
        for arg in &args {
            if let Argument::Object(Some(id)) = arg {
                self.registry
                    .lookup(client, *id)
                    .map_err(|err| err.to_protocol_error())?;
            }
        }
        let request = Request::from_message(interface, opcode, args)
            .map_err(|err| malformed(object, interface, desc, err))?;
        log::trace!("{} -> {}@{}.{}", client, interface, object, desc.name);

        if inert {
            // Only the destructor means anything; new ids still have to be
            // accounted for so the client's id space stays in step
            if desc.destructor {
                self.retire(client, object);
            } else if let Some((id, interface, version)) = created_object(&request, version) {
                self.placeholder(client, id, interface, version)?;
            }
            return Ok(());
        }

        match request {
            Request::Display(request) => self.display_request(client, request),
            Request::Registry(request) => self.registry_request(client, object, request),
            Request::Compositor(request) => self.compositor_request(client, version, request),
            Request::Region(request) => self.region_request(client, object, request),
            Request::Surface(request) => self.surface_request(client, object, request),
            Request::Shm(request) => self.shm_request(client, object, version, request),
            Request::ShmPool(request) => self.shm_pool_request(client, object, version, request),
            Request::Buffer(BufferRequest::Destroy) => {
                self.surfaces.destroy_buffer(client, object);
                if let Err(e) = self.backend.buffer_destroyed(BufferId::new(client, object)) {
                    log::warn!("Backend failed to drop wl_buffer@{}: {}", object, e);
                }
                self.retire(client, object);
                Ok(())
            }
            Request::Subcompositor(request) => {
                self.subcompositor_request(client, object, version, request)
            }
            Request::Subsurface(request) => self.subsurface_request(client, object, request),
            Request::Seat(request) => self.seat_request(client, object, version, request),
            Request::Pointer(request) => self.pointer_request(client, object, request),
            Request::Keyboard(KeyboardRequest::Release) | Request::Touch(TouchRequest::Release) => {
                self.input.release_device(client, object);
                self.retire(client, object);
                Ok(())
            }
            Request::XdgWmBase(request) => self.wm_base_request(client, object, version, request),
            Request::XdgPositioner(PositionerRequest::Destroy) => {
                self.surfaces.destroy_positioner(client, object);
                self.retire(client, object);
                Ok(())
            }
            Request::XdgPositioner(request) => {
                self.surfaces.update_positioner(client, object, &request)
            }
            Request::XdgSurface(request) => self.xdg_surface_request(client, object, version, request),
            Request::XdgToplevel(request) => self.toplevel_request(client, object, request),
            Request::XdgPopup(request) => self.popup_request(client, object, request),
        }
    }

    // ----------------------------------------------------------------------
    // Object creation and destruction
    // ----------------------------------------------------------------------

    /// Create a client-requested object. `create` builds the component
    /// state; the registry entry is added once it succeeds. When the client
    /// is over a resource ceiling the id is kept as an inert placeholder and
    /// `Ok(false)` is returned.
    fn admit<F>(
        &mut self,
        client: ClientId,
        id: ObjectId,
        interface: Interface,
        version: u32,
        parent: Option<(ObjectId, ChildBinding)>,
        create: F,
    ) -> ProtocolResult<bool>
    where
        F: FnOnce(&mut Self) -> Result<(), CompositorError>,
    {
        self.registry
            .check_client_id(client, id)
            .map_err(registry_error)?;
        if self.registry.at_limit(client) {
            self.placeholder(client, id, interface, version)?;
            return Ok(false);
        }
        match create(self) {
            Ok(()) => {}
            Err(CompositorError::Protocol(error)) => return Err(error),
            Err(CompositorError::LimitExceeded { kind, limit }) => {
                log::warn!("{} reached its {} limit of {}", client, kind, limit);
                self.placeholder(client, id, interface, version)?;
                return Ok(false);
            }
        }
        self.registry
            .register(client, id, interface, version, parent)
            .map_err(registry_error)?;
        self.notifier.publish(Notification::ObjectCreated {
            client,
            object: id,
            interface,
        });
        Ok(true)
    }

    fn placeholder(
        &mut self,
        client: ClientId,
        id: ObjectId,
        interface: Interface,
        version: u32,
    ) -> ProtocolResult<()> {
        log::warn!("{}: holding {}@{} as an inert placeholder", client, interface, id);
        self.registry
            .register_placeholder(client, id, interface, version)
            .map_err(registry_error)
    }

    /// Destroy an object on request, after the events its component
    /// produced while tearing it down
    fn retire(&mut self, client: ClientId, object: ObjectId) {
        self.pump();
        self.destroy_object(client, object);
    }

    /// Submit surfaces whose committed state became current
    fn schedule(&mut self, applied: Vec<SurfaceId>) {
        let now = Instant::now();
        for id in applied {
            let Some(surface) = self.surfaces.surface(id) else {
                continue;
            };
            let cursor = surface
                .role
                .as_ref()
                .map_or(false, |role| role.kind() == RoleKind::Cursor);
            if !cursor {
                self.render.schedule(id, &surface.current.damage, now);
            }
        }
    }

    // ----------------------------------------------------------------------
    // Core protocol
    // ----------------------------------------------------------------------

    fn display_request(&mut self, client: ClientId, request: DisplayRequest) -> ProtocolResult<()> {
        match request {
            DisplayRequest::Sync { callback } => {
                if self.admit(client, callback, Interface::Callback, 1, None, |_| Ok(()))? {
                    let serial = self.serials.next_serial();
                    self.send(client, callback, Event::CallbackDone { data: serial });
                }
            }
            DisplayRequest::GetRegistry { registry } => {
                if self.admit(client, registry, Interface::Registry, 1, None, |_| Ok(()))? {
                    for global in self.globals.clone() {
                        self.send(
                            client,
                            registry,
                            Event::Global {
                                name: global.name,
                                interface: global.interface,
                                version: global.version,
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn registry_request(
        &mut self,
        client: ClientId,
        object: ObjectId,
        request: RegistryRequest,
    ) -> ProtocolResult<()> {
        let RegistryRequest::Bind {
            name,
            interface,
            version,
            id,
        } = request;
        let invalid = |message: String| {
            ProtocolError::new(
                object,
                Interface::Registry.name(),
                DisplayErrorCode::InvalidObject as u32,
                message,
            )
        };
        let global = self
            .globals
            .iter()
            .find(|global| global.name == name)
            .copied()
            .ok_or_else(|| invalid(format!("invalid global {} ({})", interface, name)))?;
        if global.interface.name() != interface {
            return Err(invalid(format!(
                "invalid interface for global {}: have {}, wanted {}",
                name, interface, global.interface
            )));
        }
        if version == 0 || version > global.version {
            return Err(invalid(format!(
                "invalid version for global {} ({}): have {}, wanted {}",
                interface, name, global.version, version
            )));
        }
        if !self.admit(client, id, global.interface, version, None, |_| Ok(()))? {
            return Ok(());
        }
        log::debug!("{} bound {} v{} as {}", client, global.interface, version, id);

        match global.interface {
            Interface::Shm => {
                for format in self.surfaces.supported_formats().to_vec() {
                    self.send(client, id, Event::ShmFormat { format });
                }
            }
            Interface::Seat => self.input.bind_seat(client, id, self.seat),
            Interface::XdgWmBase => {
                if let Some(state) = self.clients.get_mut(&client) {
                    state.wm_bases.push(id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn compositor_request(
        &mut self,
        client: ClientId,
        version: u32,
        request: CompositorRequest,
    ) -> ProtocolResult<()> {
        match request {
            CompositorRequest::CreateSurface { id } => {
                let version = child_version(Interface::Surface, version);
                self.admit(client, id, Interface::Surface, version, None, move |s| {
                    s.surfaces.create_surface(client, id, version).map(|_| ())
                })?;
            }
            CompositorRequest::CreateRegion { id } => {
                let version = child_version(Interface::Region, version);
                self.admit(client, id, Interface::Region, version, None, move |s| {
                    s.surfaces.create_region(client, id);
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    fn region_request(&mut self, client: ClientId, object: ObjectId, request: RegionRequest) -> ProtocolResult<()> {
        match request {
            RegionRequest::Destroy => {
                self.surfaces.destroy_region(client, object);
                self.retire(client, object);
                Ok(())
            }
            RegionRequest::Add(rect) => self.surfaces.region_add(client, object, rect),
            RegionRequest::Subtract(rect) => self.surfaces.region_subtract(client, object, rect),
        }
    }

    fn surface_request(&mut self, client: ClientId, object: ObjectId, request: SurfaceRequest) -> ProtocolResult<()> {
        match request {
            SurfaceRequest::Destroy => {
                self.surfaces.destroy_surface(client, object)?;
                self.retire(client, object);
            }
            SurfaceRequest::Attach { buffer, x, y } => {
                self.surfaces.attach(client, object, buffer, x, y)?
            }
            SurfaceRequest::Damage(rect) => self.surfaces.damage(client, object, rect)?,
            SurfaceRequest::DamageBuffer(rect) => self.surfaces.damage_buffer(client, object, rect)?,
            SurfaceRequest::Frame { callback } => {
                let parent = Some((object, ChildBinding::Destroy));
                self.admit(client, callback, Interface::Callback, 1, parent, move |s| {
                    s.surfaces
                        .frame(client, object, callback)
                        .map_err(CompositorError::from)
                })?;
            }
            SurfaceRequest::SetOpaqueRegion { region } => {
                self.surfaces.set_opaque_region(client, object, region)?
            }
            SurfaceRequest::SetInputRegion { region } => {
                self.surfaces.set_input_region(client, object, region)?
            }
            SurfaceRequest::Commit => {
                let outcome = self
                    .surfaces
                    .commit(client, object, self.placement.as_mut())?;
                self.schedule(outcome.applied);
            }
            SurfaceRequest::SetBufferTransform { transform } => {
                self.surfaces.set_buffer_transform(client, object, transform)?
            }
            SurfaceRequest::SetBufferScale { scale } => {
                self.surfaces.set_buffer_scale(client, object, scale)?
            }
            SurfaceRequest::Offset { x, y } => self.surfaces.offset(client, object, x, y)?,
        }
        Ok(())
    }

    fn shm_request(
        &mut self,
        client: ClientId,
        object: ObjectId,
        version: u32,
        request: ShmRequest,
    ) -> ProtocolResult<()> {
        match request {
            ShmRequest::CreatePool { id, fd, size } => {
                let version = child_version(Interface::ShmPool, version);
                self.admit(client, id, Interface::ShmPool, version, None, move |s| {
                    s.surfaces
                        .create_pool(client, id, fd, size)
                        .map_err(CompositorError::from)
                })?;
            }
            ShmRequest::Release => self.retire(client, object),
        }
        Ok(())
    }

    fn shm_pool_request(
        &mut self,
        client: ClientId,
        object: ObjectId,
        version: u32,
        request: ShmPoolRequest,
    ) -> ProtocolResult<()> {
        match request {
            ShmPoolRequest::CreateBuffer {
                id,
                offset,
                width,
                height,
                stride,
                format,
            } => {
                let version = child_version(Interface::Buffer, version);
                self.admit(client, id, Interface::Buffer, version, None, move |s| {
                    s.surfaces
                        .create_buffer(client, object, id, offset, width, height, stride, format)
                        .map(|_| ())
                })?;
            }
            ShmPoolRequest::Destroy => {
                // Buffers keep their own reference to the mapping
                self.surfaces.destroy_pool(client, object);
                self.retire(client, object);
            }
            ShmPoolRequest::Resize { size } => self.surfaces.resize_pool(client, object, size)?,
        }
        Ok(())
    }

    fn subcompositor_request(
        &mut self,
        client: ClientId,
        object: ObjectId,
        version: u32,
        request: SubcompositorRequest,
    ) -> ProtocolResult<()> {
        match request {
            SubcompositorRequest::Destroy => self.retire(client, object),
            SubcompositorRequest::GetSubsurface { id, surface, parent } => {
                self.registry.lookup_as(client, surface, Interface::Surface)?;
                self.registry.lookup_as(client, parent, Interface::Surface)?;
                let version = child_version(Interface::Subsurface, version);
                let binding = Some((surface, ChildBinding::Invalidate));
                self.admit(client, id, Interface::Subsurface, version, binding, move |s| {
                    s.surfaces
                        .get_subsurface(client, object, id, surface, parent)
                        .map_err(CompositorError::from)
                })?;
            }
        }
        Ok(())
    }

    fn subsurface_request(
        &mut self,
        client: ClientId,
        object: ObjectId,
        request: SubsurfaceRequest,
    ) -> ProtocolResult<()> {
        match request {
            SubsurfaceRequest::Destroy => {
                self.surfaces.destroy_subsurface(client, object);
                self.retire(client, object);
            }
            SubsurfaceRequest::SetPosition { x, y } => {
                self.surfaces.subsurface_set_position(client, object, x, y)?
            }
            SubsurfaceRequest::PlaceAbove { sibling } => {
                self.surfaces.subsurface_restack(client, object, sibling, true)?
            }
            SubsurfaceRequest::PlaceBelow { sibling } => {
                self.surfaces.subsurface_restack(client, object, sibling, false)?
            }
            request @ (SubsurfaceRequest::SetSync | SubsurfaceRequest::SetDesync) => {
                let sync = matches!(request, SubsurfaceRequest::SetSync);
                let applied = self.surfaces.subsurface_set_sync(
                    client,
                    object,
                    sync,
                    self.placement.as_mut(),
                )?;
                self.schedule(applied);
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Input
    // ----------------------------------------------------------------------

    fn seat_request(
        &mut self,
        client: ClientId,
        object: ObjectId,
        version: u32,
        request: SeatRequest,
    ) -> ProtocolResult<()> {
        let (id, interface) = match request {
            SeatRequest::Release => {
                self.input.release_seat(client, object);
                self.retire(client, object);
                return Ok(());
            }
            SeatRequest::GetPointer { id } => (id, Interface::Pointer),
            SeatRequest::GetKeyboard { id } => (id, Interface::Keyboard),
            SeatRequest::GetTouch { id } => (id, Interface::Touch),
        };
        let version = child_version(interface, version);
        self.admit(client, id, interface, version, None, move |s| {
            let created = match interface {
                Interface::Pointer => s.input.get_pointer(client, object, id),
                Interface::Keyboard => s.input.get_keyboard(client, object, id),
                _ => s.input.get_touch(client, object, id),
            };
            created.map_err(CompositorError::from)
        })?;
        Ok(())
    }

    fn pointer_request(&mut self, client: ClientId, object: ObjectId, request: PointerRequest) -> ProtocolResult<()> {
        match request {
            PointerRequest::SetCursor {
                serial,
                surface,
                hotspot_x,
                hotspot_y,
            } => {
                let target = match surface {
                    Some(surface) => {
                        self.registry.lookup_as(client, surface, Interface::Surface)?;
                        Some(self.surfaces.set_cursor_role(client, object, surface)?)
                    }
                    None => None,
                };
                if !self
                    .input
                    .set_cursor(client, object, target, (hotspot_x, hotspot_y))
                {
                    log::trace!("set_cursor (serial {}) from {} ignored", serial, client);
                }
            }
            PointerRequest::Release => {
                self.input.release_device(client, object);
                self.retire(client, object);
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // xdg-shell
    // ----------------------------------------------------------------------

    fn wm_base_request(
        &mut self,
        client: ClientId,
        object: ObjectId,
        version: u32,
        request: WmBaseRequest,
    ) -> ProtocolResult<()> {
        match request {
            WmBaseRequest::Destroy => {
                if self.surfaces.has_xdg_surfaces(client, object) {
                    return Err(ProtocolError::new(
                        object,
                        Interface::XdgWmBase.name(),
                        codes::xdg_wm_base::DEFUNCT_SURFACES,
                        "xdg_wm_base destroyed before its xdg_surfaces",
                    ));
                }
                if let Some(state) = self.clients.get_mut(&client) {
                    state.wm_bases.retain(|id| *id != object);
                    if state.wm_bases.is_empty() {
                        state.pending_ping = None;
                    }
                }
                self.retire(client, object);
            }
            WmBaseRequest::CreatePositioner { id } => {
                let version = child_version(Interface::XdgPositioner, version);
                self.admit(client, id, Interface::XdgPositioner, version, None, move |s| {
                    s.surfaces.create_positioner(client, id);
                    Ok(())
                })?;
            }
            WmBaseRequest::GetXdgSurface { id, surface } => {
                self.registry.lookup_as(client, surface, Interface::Surface)?;
                let version = child_version(Interface::XdgSurface, version);
                let binding = Some((surface, ChildBinding::Invalidate));
                self.admit(client, id, Interface::XdgSurface, version, binding, move |s| {
                    s.surfaces
                        .get_xdg_surface(client, object, id, surface)
                        .map_err(CompositorError::from)
                })?;
            }
            WmBaseRequest::Pong { serial } => self.pong(client, serial),
        }
        Ok(())
    }

    fn xdg_surface_request(
        &mut self,
        client: ClientId,
        object: ObjectId,
        version: u32,
        request: XdgSurfaceRequest,
    ) -> ProtocolResult<()> {
        // Role objects live and die with the wl_surface, not the xdg_surface
        let binding = self
            .registry
            .lookup(client, object)
            .ok()
            .and_then(|entry| entry.parent)
            .map(|surface| (surface, ChildBinding::Invalidate));
        match request {
            XdgSurfaceRequest::Destroy => {
                self.surfaces.destroy_xdg_surface(client, object)?;
                self.retire(client, object);
            }
            XdgSurfaceRequest::GetToplevel { id } => {
                let version = child_version(Interface::XdgToplevel, version);
                self.admit(client, id, Interface::XdgToplevel, version, binding, move |s| {
                    s.surfaces
                        .get_toplevel(client, object, id)
                        .map(|_| ())
                        .map_err(CompositorError::from)
                })?;
            }
            XdgSurfaceRequest::GetPopup {
                id,
                parent,
                positioner,
            } => {
                self.registry
                    .lookup_as(client, positioner, Interface::XdgPositioner)?;
                if let Some(parent) = parent {
                    self.registry.lookup_as(client, parent, Interface::XdgSurface)?;
                }
                let version = child_version(Interface::XdgPopup, version);
                self.admit(client, id, Interface::XdgPopup, version, binding, move |s| {
                    s.surfaces
                        .get_popup(client, object, id, parent, positioner)
                        .map(|_| ())
                        .map_err(CompositorError::from)
                })?;
            }
            XdgSurfaceRequest::SetWindowGeometry(rect) => {
                self.surfaces.set_window_geometry(client, object, rect)?
            }
            XdgSurfaceRequest::AckConfigure { serial } => {
                self.surfaces.ack_configure(client, object, serial)?
            }
        }
        Ok(())
    }

    fn toplevel_request(&mut self, client: ClientId, object: ObjectId, request: ToplevelRequest) -> ProtocolResult<()> {
        match request {
            ToplevelRequest::Destroy => {
                self.surfaces.destroy_toplevel(client, object);
                self.retire(client, object);
            }
            ToplevelRequest::SetParent { parent } => {
                if let Some(parent) = parent {
                    self.registry.lookup_as(client, parent, Interface::XdgToplevel)?;
                }
                self.surfaces.set_toplevel_parent(client, object, parent)?;
            }
            ToplevelRequest::SetTitle { title } => self.surfaces.set_title(client, object, title)?,
            ToplevelRequest::SetAppId { app_id } => {
                self.surfaces.set_app_id(client, object, app_id)?
            }
            ToplevelRequest::ShowWindowMenu { seat, serial, x, y } => {
                self.registry.lookup_as(client, seat, Interface::Seat)?;
                log::debug!("{}: window menu at {},{} (serial {})", client, x, y, serial);
            }
            ToplevelRequest::Move { seat, serial } => {
                self.registry.lookup_as(client, seat, Interface::Seat)?;
                log::debug!("{}: interactive move of {} (serial {})", client, object, serial);
            }
            ToplevelRequest::Resize {
                seat,
                serial,
                edges,
            } => {
                self.registry.lookup_as(client, seat, Interface::Seat)?;
                if !valid_resize_edge(edges) {
                    return Err(ProtocolError::new(
                        object,
                        Interface::XdgToplevel.name(),
                        codes::xdg_toplevel::INVALID_RESIZE_EDGE,
                        format!("invalid resize edge {}", edges),
                    ));
                }
                log::debug!(
                    "{}: interactive resize of {} edges {} (serial {})",
                    client,
                    object,
                    edges,
                    serial
                );
            }
            ToplevelRequest::SetMaxSize { width, height } => {
                self.surfaces
                    .set_size_bounds(client, object, width, height, true)?
            }
            ToplevelRequest::SetMinSize { width, height } => {
                self.surfaces
                    .set_size_bounds(client, object, width, height, false)?
            }
            ToplevelRequest::SetMaximized => self.surfaces.set_maximized(client, object, true)?,
            ToplevelRequest::UnsetMaximized => self.surfaces.set_maximized(client, object, false)?,
            // No wl_output global is advertised, so the output hint is moot
            ToplevelRequest::SetFullscreen { .. } => {
                self.surfaces.set_fullscreen(client, object, true)?
            }
            ToplevelRequest::UnsetFullscreen => {
                self.surfaces.set_fullscreen(client, object, false)?
            }
            ToplevelRequest::SetMinimized => self.surfaces.set_minimized(client, object)?,
        }
        Ok(())
    }

    fn popup_request(&mut self, client: ClientId, object: ObjectId, request: PopupRequest) -> ProtocolResult<()> {
        match request {
            PopupRequest::Destroy => {
                self.surfaces.destroy_popup(client, object)?;
                self.retire(client, object);
            }
            PopupRequest::Grab { seat, serial } => {
                self.registry.lookup_as(client, seat, Interface::Seat)?;
                let popup = self.surfaces.popup_grab(client, object)?;
                if let Some(seat) = self.input.seat_of(client, seat) {
                    log::debug!("{}: popup grab on {} (serial {})", client, popup, serial);
                    self.input.start_popup_grab(seat, popup);
                }
            }
            PopupRequest::Reposition { positioner, token } => {
                self.registry
                    .lookup_as(client, positioner, Interface::XdgPositioner)?;
                self.surfaces
                    .popup_reposition(client, object, positioner, token)?
            }
        }
        Ok(())
    }
}
