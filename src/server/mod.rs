//! Server core
//!
//! The [`Server`] owns every component (object registry, surface manager,
//! input dispatcher, render backend) and all client sessions. It runs a single
//! protocol-processing loop: poll the sockets, frame and dispatch requests in
//! per-client order, route the resulting events back, and drive the frame,
//! ping and render timers.

pub mod client;
mod dispatch;
pub mod notify;
pub mod render;
mod session;

pub use client::*;
pub use notify::*;
pub use render::*;
pub use session::PollEvents;

use crate::backend::{BackendEvent, CascadePlacement, PlacementPolicy, RenderBackend};
use crate::compositor::{CompositorNotice, RoleKind, SurfaceManager, SurfaceSnapshot};
use crate::connection::Listener;
use crate::input::{InputDispatcher, Keymap, RepeatInfo};
use crate::protocol::*;
use crate::resources::{DestroyedObject, ObjectRegistry};
use crate::security::{RejectReason, SecurityPolicy};
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Runtime tunables of the server loop
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How often committed frame callbacks fire
    pub frame_interval: Duration,
    /// How often bound xdg_wm_base objects are pinged
    pub ping_interval: Duration,
    /// Unanswered pings older than this mark the client unresponsive
    pub ping_timeout: Duration,
    /// Failed submissions retried before a surface is non-presentable
    pub render_retries: u32,
    /// First retry delay; doubles with every failure
    pub render_backoff: Duration,
    /// Queued output a client may accumulate before it is disconnected
    pub max_output_buffer: usize,
    pub seat_name: String,
    /// xkb keymap handed to keyboards; `None` sends no_keymap
    pub keymap: Option<PathBuf>,
    pub repeat: RepeatInfo,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            frame_interval: Duration::from_millis(16),
            ping_interval: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(10),
            render_retries: 5,
            render_backoff: Duration::from_millis(10),
            max_output_buffer: 1024 * 1024,
            seat_name: "seat0".to_string(),
            keymap: None,
            repeat: RepeatInfo::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("connection rejected: {0}")]
    Rejected(#[from] RejectReason),
}

/// Why a client was disconnected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisconnectReason {
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),
    #[error("client stopped reading its events")]
    OutputOverflow,
    #[error("disconnected by the server")]
    Requested,
}

/// A global advertised through wl_registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Global {
    pub name: u32,
    pub interface: Interface,
    pub version: u32,
}

/// The Wayland server
pub struct Server {
    config: ServerConfig,
    policy: SecurityPolicy,
    /// Uid of the server process; the implicit allow-list entry
    server_uid: u32,

    registry: ObjectRegistry,
    surfaces: SurfaceManager,
    input: InputDispatcher,
    /// Seat fed by the backend's host input
    seat: SeatId,

    /// The render backend
    backend: Box<dyn RenderBackend>,
    placement: Box<dyn PlacementPolicy>,
    render: RenderQueue,
    notifier: Notifier,

    listener: Option<Listener>,
    clients: BTreeMap<ClientId, Client>,
    /// Clients with input to frame this poll cycle, in round-robin order
    ready: VecDeque<ClientId>,
    /// Clients to tear down at the next safe point
    doomed: Vec<(ClientId, DisconnectReason)>,

    globals: Vec<Global>,
    parser: MessageParser,
    encoder: MessageEncoder,
    serials: SerialCounter,
    epoch: Instant,
    last_frame: Instant,
}

impl Server {
    /// Create a new server with the given backend
    pub fn new(
        mut backend: Box<dyn RenderBackend>,
        policy: SecurityPolicy,
        config: ServerConfig,
    ) -> Result<Self, ServerError> {
        backend
            .init()
            .map_err(|e| ServerError::Backend(e.to_string()))?;
        let output = backend
            .output_info()
            .map_err(|e| ServerError::Backend(e.to_string()))?;
        let formats = backend.supported_formats();

        let keymap = match &config.keymap {
            Some(path) => Keymap::from_file(path)?,
            None => Keymap::none(),
        };
        let mut input = InputDispatcher::new(keymap, config.repeat);
        let seat = input.add_seat(
            config.seat_name.clone(),
            capability::POINTER | capability::KEYBOARD | capability::TOUCH,
        );

        let globals = [
            Interface::Compositor,
            Interface::Shm,
            Interface::Subcompositor,
            Interface::Seat,
            Interface::XdgWmBase,
        ]
        .into_iter()
        .zip(1..)
        .map(|(interface, name)| Global {
            name,
            interface,
            version: interface.max_version(),
        })
        .collect();

        let now = Instant::now();
        log::info!(
            "Output {}x{} @ {} mHz, formats {:?}",
            output.width,
            output.height,
            output.refresh,
            formats
        );
        Ok(Server {
            registry: ObjectRegistry::new(policy.max_objects_per_client),
            surfaces: SurfaceManager::new(policy.surface_limits(), formats, output.bounds()),
            input,
            seat,
            backend,
            placement: Box::new(CascadePlacement::new(output.bounds())),
            render: RenderQueue::new(config.render_retries, config.render_backoff),
            notifier: Notifier::new(),
            listener: None,
            clients: BTreeMap::new(),
            ready: VecDeque::new(),
            doomed: Vec::new(),
            globals,
            parser: MessageParser::new(policy.max_message_size),
            encoder: MessageEncoder::new(policy.max_message_size),
            serials: SerialCounter::new(),
            epoch: now,
            last_frame: now,
            server_uid: nix::unistd::getuid().as_raw(),
            policy,
            config,
        })
    }

    /// Replace the placement policy used for newly mapped surfaces
    pub fn with_placement(mut self, placement: Box<dyn PlacementPolicy>) -> Self {
        self.placement = placement;
        self
    }

    /// Accept connections from `listener` in the poll loop
    pub fn attach_listener(&mut self, listener: Listener) {
        log::info!("Listening on {}", listener.path().display());
        self.listener = Some(listener);
    }

    pub fn listener(&self) -> Option<&Listener> {
        self.listener.as_ref()
    }

    /// Subscribe to the object, surface and focus notification feed
    pub fn subscribe(&mut self) -> Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn security_policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn surfaces(&self) -> &SurfaceManager {
        &self.surfaces
    }

    pub fn input(&self) -> &InputDispatcher {
        &self.input
    }

    /// Seat that receives host input
    pub fn default_seat(&self) -> SeatId {
        self.seat
    }

    pub fn backend(&self) -> &dyn RenderBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn RenderBackend {
        self.backend.as_mut()
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// Visible surfaces, bottom to top
    pub fn composition_list(&self) -> Vec<SurfaceSnapshot> {
        self.surfaces.composition_list()
    }

    /// Milliseconds since the server started, as carried by input and
    /// frame events
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::new(self.epoch.elapsed().as_millis() as u32)
    }

    // ----------------------------------------------------------------------
    // Event routing
    // ----------------------------------------------------------------------

    /// Queue an event for a client after everything the components queued
    /// before it
    fn send(&mut self, client: ClientId, object: ObjectId, event: Event) {
        self.pump();
        self.deliver(Outgoing::new(client, object, event));
    }

    /// Queue an event for a client. Events for objects that are gone, are
    /// placeholders or predate the event's version are dropped. A delivered
    /// destructor event destroys its object.
    fn deliver(&mut self, outgoing: Outgoing) {
        let Outgoing {
            client,
            object,
            event,
        } = outgoing;
        if !self.clients.contains_key(&client) {
            return;
        }
        let entry = match self.registry.lookup(client, object) {
            Ok(entry) => entry,
            Err(err) => {
                log::trace!("Dropping {:?} for {}: {}", event, client, err);
                return;
            }
        };
        if entry.placeholder {
            return;
        }
        if event.since() > entry.version {
            log::trace!(
                "Dropping {:?}: {}@{} is version {}",
                event,
                entry.interface,
                object,
                entry.version
            );
            return;
        }
        let destructor = event.is_destructor();

        let Some(state) = self.clients.get_mut(&client) else {
            return;
        };
        if let Err(err) = state.queue(&self.encoder, object, event) {
            log::warn!("Cannot queue event for {}: {}", client, err);
            let reason = match err {
                SendError::Overflow { .. } => DisconnectReason::OutputOverflow,
                SendError::Wire(wire) => DisconnectReason::Transport(wire.to_string()),
            };
            self.doomed.push((client, reason));
            return;
        }
        if destructor {
            self.destroy_object(client, object);
        }
    }

    /// Deliver everything the components queued and react to their
    /// lifecycle notices, until both are quiet
    fn pump(&mut self) {
        loop {
            let mut events = self.surfaces.drain_events();
            events.extend(self.input.drain_events());
            let surface_notices = self.surfaces.drain_notices();
            let input_notices = self.input.drain_notices();
            if events.is_empty() && surface_notices.is_empty() && input_notices.is_empty() {
                break;
            }
            for outgoing in events {
                self.deliver(outgoing);
            }
            for notice in surface_notices {
                self.handle_surface_notice(notice);
            }
            for notice in input_notices {
                self.notifier.publish(Notification::Input(notice));
            }
        }
    }

    fn handle_surface_notice(&mut self, notice: CompositorNotice) {
        match notice {
            CompositorNotice::SurfaceDestroyed(id) => {
                self.input.surface_destroyed(id, &self.surfaces);
                self.render.forget(id);
                if let Err(e) = self.backend.surface_destroyed(id) {
                    log::warn!("Backend failed to drop {}: {}", id, e);
                }
            }
            CompositorNotice::Unmapped(id) => {
                self.input.surface_unmapped(id, &self.surfaces);
            }
            CompositorNotice::Mapped(id) => {
                let toplevel = self
                    .surfaces
                    .surface(id)
                    .and_then(|surface| surface.role.as_ref())
                    .map_or(false, |role| role.kind() == RoleKind::Toplevel);
                let unfocused = self
                    .input
                    .seat(self.seat)
                    .map_or(false, |seat| seat.keyboard_focus.is_none());
                if toplevel && unfocused {
                    self.input.set_keyboard_focus(self.seat, Some(id));
                }
            }
            CompositorNotice::SurfaceCreated(_) | CompositorNotice::RoleAssigned(..) => {}
        }
        self.notifier.publish(Notification::Surface(notice));
    }

    /// Remove an object from the registry along with what is bound to it,
    /// telling the client which of its ids are free again
    fn destroy_object(&mut self, client: ClientId, object: ObjectId) {
        let destroyed = match self.registry.destroy(client, object) {
            Ok(destroyed) => destroyed,
            Err(err) => {
                log::debug!("Destroy of {} for {}: {}", object, client, err);
                return;
            }
        };
        for DestroyedObject {
            id,
            interface,
            placeholder,
        } in destroyed
        {
            if interface == Interface::Callback {
                self.surfaces.drop_frame_callback(client, id);
            }
            if !placeholder {
                self.notifier.publish(Notification::ObjectDestroyed {
                    client,
                    object: id,
                    interface,
                });
            }
            if !id.is_server_side() {
                self.deliver(Outgoing::new(client, ObjectId::DISPLAY, Event::DeleteId { id }));
            }
        }
    }

    /// Report a protocol violation and disconnect the client
    fn post_error(&mut self, client: ClientId, error: ProtocolError) {
        log::warn!("Protocol error from {}: {}", client, error);
        self.send(
            client,
            ObjectId::DISPLAY,
            Event::DisplayError {
                object: error.object,
                code: error.code,
                message: error.message.clone(),
            },
        );
        self.disconnect(client, DisconnectReason::Protocol(error));
    }

    /// Disconnect every client that failed since the last safe point
    fn reap(&mut self) {
        while let Some((client, reason)) = self.doomed.pop() {
            self.disconnect(client, reason);
        }
    }

    // ----------------------------------------------------------------------
    // Host input and embedder operations
    // ----------------------------------------------------------------------

    /// Feed one host event into the server
    pub fn handle_backend_event(&mut self, event: BackendEvent) {
        let seat = self.seat;
        match event {
            BackendEvent::Keyboard(ev) => {
                let result = self.input.route_keyboard_event(seat, ev);
                log::trace!("Keyboard {:?}: {:?}", ev, result);
            }
            BackendEvent::Pointer(ev) => {
                let result = self.input.route_pointer_event(seat, ev, &mut self.surfaces);
                log::trace!("Pointer {:?}: {:?}", ev, result);
            }
            BackendEvent::Touch(ev) => {
                let result = self.input.route_touch_event(seat, ev, &self.surfaces);
                log::trace!("Touch {:?}: {:?}", ev, result);
            }
            BackendEvent::CloseRequested(id) => self.surfaces.request_close(id),
            BackendEvent::FocusRequested(target) => {
                let target = target.filter(|id| self.surfaces.is_mapped(*id));
                if let Some(id) = target {
                    self.surfaces.raise(id);
                }
                self.input.set_keyboard_focus(seat, target);
            }
            BackendEvent::OutputResized { width, height } => {
                log::info!("Output resized to {}x{}", width, height);
                self.surfaces.set_output_bounds(Rect::from_size(width, height));
            }
        }
        self.pump();
    }

    /// Move keyboard focus on the default seat
    pub fn focus(&mut self, surface: Option<SurfaceId>) -> bool {
        let changed = self.input.set_keyboard_focus(self.seat, surface);
        self.pump();
        changed
    }

    /// Start an explicit grab on the default seat
    pub fn grab(&mut self, surface: SurfaceId) -> bool {
        let started = self.input.start_grab(self.seat, surface, &self.surfaces);
        self.pump();
        started
    }

    pub fn ungrab(&mut self) {
        self.input.end_grab(self.seat, &self.surfaces);
        self.pump();
    }

    /// Ask a toplevel to close
    pub fn request_close(&mut self, surface: SurfaceId) {
        self.surfaces.request_close(surface);
        self.pump();
    }

    // ----------------------------------------------------------------------
    // Timers
    // ----------------------------------------------------------------------

    /// Fire frame callbacks once the frame interval has passed
    fn frame_tick(&mut self, now: Instant) {
        if now.duration_since(self.last_frame) < self.config.frame_interval {
            return;
        }
        self.last_frame = now;
        let fired = self.surfaces.frame_tick(self.timestamp());
        if !fired.is_empty() {
            log::trace!("Frame tick fired {} callbacks", fired.len());
        }
        // Delivering wl_callback.done destroys each callback
        self.pump();
    }

    /// Ping clients with a bound xdg_wm_base and report those that stop
    /// answering. Unresponsive clients are not disconnected.
    fn ping_tick(&mut self, now: Instant) {
        let mut pings = Vec::new();
        let mut unresponsive = Vec::new();
        for (id, client) in self.clients.iter_mut() {
            let Some(wm_base) = client.wm_bases.first().copied() else {
                continue;
            };
            match client.pending_ping.as_mut() {
                None if now.duration_since(client.last_pong) >= self.config.ping_interval => {
                    let serial = self.serials.next_serial();
                    client.pending_ping = Some(PendingPing {
                        serial,
                        sent: now,
                        reported: false,
                    });
                    pings.push((*id, wm_base, serial));
                }
                Some(ping)
                    if !ping.reported
                        && now.duration_since(ping.sent) >= self.config.ping_timeout =>
                {
                    ping.reported = true;
                    unresponsive.push(*id);
                }
                _ => {}
            }
        }
        for (client, wm_base, serial) in pings {
            self.send(client, wm_base, Event::Ping { serial });
        }
        for client in unresponsive {
            log::warn!("{} did not answer ping", client);
            self.notifier.publish(Notification::ClientUnresponsive(client));
        }
    }

    fn pong(&mut self, client: ClientId, serial: u32) {
        let Some(state) = self.clients.get_mut(&client) else {
            return;
        };
        match state.pending_ping {
            Some(ping) if ping.serial == serial => {
                if ping.reported {
                    log::info!("{} is responsive again", client);
                }
                state.pending_ping = None;
                state.last_pong = Instant::now();
            }
            _ => log::debug!("Unexpected pong {} from {}", serial, client),
        }
    }

    /// Everything that happens once per loop iteration besides requests
    pub fn tick(&mut self) {
        match self.backend.poll_events() {
            Ok(events) => {
                for event in events {
                    self.handle_backend_event(event);
                }
            }
            Err(e) => log::error!("Failed to poll backend events: {}", e),
        }

        let now = Instant::now();
        self.frame_tick(now);
        self.ping_tick(now);

        let report = self
            .render
            .flush(self.backend.as_mut(), &mut self.surfaces, now);
        if !report.accepted.is_empty() {
            log::trace!("Submitted {} surfaces", report.accepted.len());
        }
        if let Err(e) = self.backend.flush() {
            log::warn!("Backend flush failed: {}", e);
        }

        self.pump();
        self.flush_clients();
        self.reap();
    }

    /// Write queued output of every client
    pub fn flush_clients(&mut self) {
        for (id, client) in self.clients.iter_mut() {
            if !client.has_pending_output() {
                continue;
            }
            if let Err(e) = client.flush() {
                log::debug!("Write to {} failed: {}", id, e);
                self.doomed
                    .push((*id, DisconnectReason::Transport(e.to_string())));
            }
        }
    }

    /// How long the loop may sleep before a timer is due
    fn next_timeout(&self, limit: Duration) -> Duration {
        let now = Instant::now();
        let frame = (self.last_frame + self.config.frame_interval).saturating_duration_since(now);
        let render = self
            .render
            .next_deadline()
            .map_or(limit, |deadline| deadline.saturating_duration_since(now));
        limit.min(frame).min(render)
    }

    // ----------------------------------------------------------------------
    // Main loop
    // ----------------------------------------------------------------------

    /// One loop iteration: wait up to `timeout` for socket activity,
    /// dispatch every complete request, then run the timers
    pub fn run_once(&mut self, timeout: Duration) -> Result<(), ServerError> {
        let timeout = self.next_timeout(timeout);
        let mut events = self.poll_events(timeout)?;
        while let Some((client, message)) = events.next() {
            events.dispatch(client, message);
        }
        self.tick();
        Ok(())
    }

    /// Run until an I/O error on the listening socket
    pub fn run(&mut self) -> Result<(), ServerError> {
        log::info!("Server loop started");
        loop {
            self.run_once(self.config.ping_interval)?;
        }
    }
}
