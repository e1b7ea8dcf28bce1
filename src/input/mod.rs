//! Input dispatching
//!
//! Routes keyboard, pointer and touch input from the host to the client that
//! owns the focused surface, keeping focus, grabs and touch points valid as
//! surfaces come and go.

pub mod seat;

pub use seat::*;

use crate::compositor::SurfaceManager;
use crate::protocol::*;
use std::collections::{BTreeMap, HashMap};

/// Which focus changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusKind {
    Keyboard,
    Pointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputNotice {
    FocusChanged {
        seat: SeatId,
        kind: FocusKind,
        surface: Option<SurfaceId>,
    },
}

/// Key repeat parameters sent with wl_keyboard.repeat_info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatInfo {
    /// Characters per second
    pub rate: i32,
    /// Milliseconds before repeating starts
    pub delay: i32,
}

impl Default for RepeatInfo {
    fn default() -> Self {
        RepeatInfo {
            rate: 25,
            delay: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceKind {
    Pointer,
    Keyboard,
    Touch,
}

#[derive(Debug, Clone, Copy)]
struct Device {
    object: ObjectId,
    kind: DeviceKind,
}

/// Routes host input to clients
#[derive(Debug)]
pub struct InputDispatcher {
    seats: BTreeMap<SeatId, Seat>,
    next_seat: u32,
    /// wl_seat resources
    seat_objects: HashMap<(ClientId, ObjectId), SeatId>,
    /// wl_pointer / wl_keyboard / wl_touch resources per client and seat
    devices: HashMap<(ClientId, SeatId), Vec<Device>>,
    serials: SerialCounter,
    keymap: Keymap,
    repeat: RepeatInfo,
    outbox: Vec<Outgoing>,
    notices: Vec<InputNotice>,
}

impl InputDispatcher {
    pub fn new(keymap: Keymap, repeat: RepeatInfo) -> Self {
        InputDispatcher {
            seats: BTreeMap::new(),
            next_seat: 0,
            seat_objects: HashMap::new(),
            devices: HashMap::new(),
            serials: SerialCounter::new(),
            keymap,
            repeat,
            outbox: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn add_seat(&mut self, name: impl Into<String>, capabilities: u32) -> SeatId {
        let id = SeatId::new(self.next_seat);
        self.next_seat += 1;
        self.seats.insert(id, Seat::new(id, name, capabilities));
        id
    }

    pub fn seat(&self, id: SeatId) -> Option<&Seat> {
        self.seats.get(&id)
    }

    pub fn seats(&self) -> impl Iterator<Item = &Seat> {
        self.seats.values()
    }

    pub fn drain_events(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    pub fn drain_notices(&mut self) -> Vec<InputNotice> {
        std::mem::take(&mut self.notices)
    }

    fn send(&mut self, client: ClientId, object: ObjectId, event: Event) {
        self.outbox.push(Outgoing::new(client, object, event));
    }

    // ----------------------------------------------------------------------
    // Resources
    // ----------------------------------------------------------------------

    /// A client bound a wl_seat global
    pub fn bind_seat(&mut self, client: ClientId, object: ObjectId, seat: SeatId) {
        let Some(state) = self.seats.get(&seat) else {
            return;
        };
        let capabilities = state.capabilities;
        let name = state.name.clone();
        self.seat_objects.insert((client, object), seat);
        self.send(client, object, Event::SeatCapabilities { capabilities });
        self.send(client, object, Event::SeatName { name });
    }

    pub fn release_seat(&mut self, client: ClientId, object: ObjectId) {
        self.seat_objects.remove(&(client, object));
    }

    /// Seat behind a client's wl_seat object
    pub fn seat_of(&self, client: ClientId, seat_object: ObjectId) -> Option<SeatId> {
        self.seat_objects.get(&(client, seat_object)).copied()
    }

    fn seat_for(&self, client: ClientId, seat_object: ObjectId, capability: u32) -> ProtocolResult<SeatId> {
        let seat = self
            .seat_objects
            .get(&(client, seat_object))
            .copied()
            .ok_or_else(|| ProtocolError::invalid_object(seat_object))?;
        let has = self
            .seats
            .get(&seat)
            .map_or(false, |state| state.has_capability(capability));
        if !has {
            return Err(ProtocolError::new(
                seat_object,
                Interface::Seat.name(),
                codes::seat::MISSING_CAPABILITY,
                format!("seat lacks capability {}", capability),
            ));
        }
        Ok(seat)
    }

    fn add_device(&mut self, client: ClientId, seat: SeatId, object: ObjectId, kind: DeviceKind) {
        self.devices
            .entry((client, seat))
            .or_default()
            .push(Device { object, kind });
    }

    fn devices_of(&self, client: ClientId, seat: SeatId, kind: DeviceKind) -> Vec<ObjectId> {
        self.devices
            .get(&(client, seat))
            .map(|devices| {
                devices
                    .iter()
                    .filter(|device| device.kind == kind)
                    .map(|device| device.object)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_pointer(&mut self, client: ClientId, seat_object: ObjectId, id: ObjectId) -> ProtocolResult<()> {
        let seat = self.seat_for(client, seat_object, capability::POINTER)?;
        self.add_device(client, seat, id, DeviceKind::Pointer);
        let focus = self.seats.get(&seat).and_then(|s| s.pointer_focus.zip(Some(s.pointer_local)));
        if let Some((surface, local)) = focus.filter(|(surface, _)| surface.client == client) {
            let serial = self.serials.next_serial();
            self.send(client, id, pointer_enter(serial, surface, local));
            self.send(client, id, Event::PointerFrame);
        }
        Ok(())
    }

    pub fn get_keyboard(&mut self, client: ClientId, seat_object: ObjectId, id: ObjectId) -> ProtocolResult<()> {
        let seat = self.seat_for(client, seat_object, capability::KEYBOARD)?;
        self.add_device(client, seat, id, DeviceKind::Keyboard);
        match self.keymap.event() {
            Ok(event) => self.send(client, id, event),
            Err(err) => log::warn!("Failed to share keymap with {}: {}", client, err),
        }
        let RepeatInfo { rate, delay } = self.repeat;
        self.send(client, id, Event::KeyboardRepeatInfo { rate, delay });
        let focus = self.seats.get(&seat).and_then(|s| s.keyboard_focus);
        if let Some(surface) = focus.filter(|surface| surface.client == client) {
            self.keyboard_enter(seat, surface, &[id]);
        }
        Ok(())
    }

    pub fn get_touch(&mut self, client: ClientId, seat_object: ObjectId, id: ObjectId) -> ProtocolResult<()> {
        let seat = self.seat_for(client, seat_object, capability::TOUCH)?;
        self.add_device(client, seat, id, DeviceKind::Touch);
        Ok(())
    }

    /// wl_pointer/wl_keyboard/wl_touch release or destruction
    pub fn release_device(&mut self, client: ClientId, object: ObjectId) {
        for ((owner, _), devices) in self.devices.iter_mut() {
            if *owner == client {
                devices.retain(|device| device.object != object);
            }
        }
    }

    /// Seat a wl_pointer belongs to
    pub fn pointer_seat(&self, client: ClientId, pointer: ObjectId) -> Option<SeatId> {
        self.devices.iter().find_map(|((owner, seat), devices)| {
            (*owner == client
                && devices
                    .iter()
                    .any(|d| d.object == pointer && d.kind == DeviceKind::Pointer))
            .then_some(*seat)
        })
    }

    /// wl_pointer.set_cursor; honoured only while the client has pointer focus
    pub fn set_cursor(
        &mut self,
        client: ClientId,
        pointer: ObjectId,
        surface: Option<SurfaceId>,
        hotspot: (i32, i32),
    ) -> bool {
        let Some(seat) = self.pointer_seat(client, pointer) else {
            return false;
        };
        let Some(state) = self.seats.get_mut(&seat) else {
            return false;
        };
        if state.pointer_focus.map(|focus| focus.client) != Some(client) {
            log::debug!("Ignoring set_cursor from {} without pointer focus", client);
            return false;
        }
        state.cursor = Some(CursorImage { surface, hotspot });
        true
    }

    // ----------------------------------------------------------------------
    // Focus
    // ----------------------------------------------------------------------

    fn keyboard_enter(&mut self, seat: SeatId, surface: SurfaceId, keyboards: &[ObjectId]) {
        let Some(state) = self.seats.get(&seat) else {
            return;
        };
        let keys = state.pressed_keys.clone();
        let modifiers = state.modifiers;
        for keyboard in keyboards {
            let serial = self.serials.next_serial();
            self.send(
                surface.client,
                *keyboard,
                Event::KeyboardEnter {
                    serial,
                    surface: surface.object,
                    keys: keys.clone(),
                },
            );
            let serial = self.serials.next_serial();
            self.send(surface.client, *keyboard, modifiers_event(serial, modifiers));
        }
    }

    /// Move keyboard focus. Leave is sent before enter; focusing the
    /// already focused surface does nothing. Returns whether focus changed.
    ///
    /// While an explicit or popup grab holds the keyboard, the request is
    /// kept and applied when the grab ends.
    pub fn set_keyboard_focus(&mut self, seat: SeatId, surface: Option<SurfaceId>) -> bool {
        let Some(state) = self.seats.get_mut(&seat) else {
            return false;
        };
        if let Some(grab) = state.grab.as_mut().filter(|grab| grab.holds_keyboard()) {
            log::debug!("Keyboard held by a grab on {}, focus change deferred", grab.surface);
            grab.focus_after = Some(surface);
            return false;
        }
        self.move_keyboard_focus(seat, surface)
    }

    fn move_keyboard_focus(&mut self, seat: SeatId, surface: Option<SurfaceId>) -> bool {
        let Some(state) = self.seats.get_mut(&seat) else {
            return false;
        };
        if state.keyboard_focus == surface {
            return false;
        }
        let old = std::mem::replace(&mut state.keyboard_focus, surface);
        if let Some(old) = old {
            for keyboard in self.devices_of(old.client, seat, DeviceKind::Keyboard) {
                let serial = self.serials.next_serial();
                self.send(
                    old.client,
                    keyboard,
                    Event::KeyboardLeave {
                        serial,
                        surface: old.object,
                    },
                );
            }
        }
        if let Some(new) = surface {
            let keyboards = self.devices_of(new.client, seat, DeviceKind::Keyboard);
            self.keyboard_enter(seat, new, &keyboards);
        }
        self.notices.push(InputNotice::FocusChanged {
            seat,
            kind: FocusKind::Keyboard,
            surface,
        });
        true
    }

    /// Move pointer focus, `local` being the surface-local position. Same
    /// rules as keyboard focus.
    pub fn set_pointer_focus(&mut self, seat: SeatId, surface: Option<SurfaceId>, local: Point) -> bool {
        let Some(state) = self.seats.get_mut(&seat) else {
            return false;
        };
        state.pointer_local = local;
        if state.pointer_focus == surface {
            return false;
        }
        let old = std::mem::replace(&mut state.pointer_focus, surface);
        if let Some(old) = old {
            for pointer in self.devices_of(old.client, seat, DeviceKind::Pointer) {
                let serial = self.serials.next_serial();
                self.send(
                    old.client,
                    pointer,
                    Event::PointerLeave {
                        serial,
                        surface: old.object,
                    },
                );
                self.send(old.client, pointer, Event::PointerFrame);
            }
        }
        if let Some(new) = surface {
            for pointer in self.devices_of(new.client, seat, DeviceKind::Pointer) {
                let serial = self.serials.next_serial();
                self.send(new.client, pointer, pointer_enter(serial, new, local));
                self.send(new.client, pointer, Event::PointerFrame);
            }
        }
        self.notices.push(InputNotice::FocusChanged {
            seat,
            kind: FocusKind::Pointer,
            surface,
        });
        true
    }

    /// Drop focus without telling the (gone) surface
    fn forget_focus(&mut self, seat: SeatId, kind: FocusKind) {
        let Some(state) = self.seats.get_mut(&seat) else {
            return;
        };
        let slot = match kind {
            FocusKind::Keyboard => &mut state.keyboard_focus,
            FocusKind::Pointer => &mut state.pointer_focus,
        };
        if slot.take().is_some() {
            self.notices.push(InputNotice::FocusChanged {
                seat,
                kind,
                surface: None,
            });
        }
    }

    // ----------------------------------------------------------------------
    // Grabs
    // ----------------------------------------------------------------------

    /// Route all pointer, keyboard and touch input of `seat` to `surface`
    /// until [`end_grab`](Self::end_grab) or the surface goes away
    pub fn start_grab(&mut self, seat: SeatId, surface: SurfaceId, surfaces: &SurfaceManager) -> bool {
        if !self.seats.contains_key(&seat) || surfaces.surface(surface).is_none() {
            return false;
        }
        if let Some(state) = self.seats.get_mut(&seat) {
            state.grab = Some(Grab::new(surface, GrabKind::Explicit));
        }
        self.move_keyboard_focus(seat, Some(surface));
        self.refocus_pointer(seat, surfaces);
        true
    }

    /// End the grab on `seat`, applying any focus change it held back
    pub fn end_grab(&mut self, seat: SeatId, surfaces: &SurfaceManager) {
        let grab = self.seats.get_mut(&seat).and_then(|state| state.grab.take());
        if let Some(focus) = grab.and_then(|grab| grab.focus_after) {
            let focus = focus.filter(|id| surfaces.surface(*id).is_some());
            self.move_keyboard_focus(seat, focus);
        }
        self.refocus_pointer(seat, surfaces);
    }

    /// xdg_popup.grab on a popup that was just created
    pub fn start_popup_grab(&mut self, seat: SeatId, popup: SurfaceId) {
        let Some(state) = self.seats.get_mut(&seat) else {
            return;
        };
        let nested = matches!(
            &state.grab,
            Some(Grab { surface, kind: GrabKind::Popup { .. }, .. }) if surface.client == popup.client
        );
        if nested {
            if let Some(Grab {
                surface,
                kind: GrabKind::Popup { popups },
                ..
            }) = &mut state.grab
            {
                popups.push(popup);
                *surface = popup;
            }
        } else {
            state.grab = Some(Grab {
                focus_after: Some(state.keyboard_focus),
                ..Grab::new(popup, GrabKind::Popup { popups: vec![popup] })
            });
        }
        self.move_keyboard_focus(seat, Some(popup));
    }

    /// Popups went away; shrink or end popup grabs accordingly
    pub fn popups_dismissed(&mut self, dismissed: &[SurfaceId], surfaces: &SurfaceManager) {
        let seats: Vec<SeatId> = self.seats.keys().copied().collect();
        for seat in seats {
            let Some(state) = self.seats.get_mut(&seat) else {
                continue;
            };
            let Some(Grab {
                surface,
                kind: GrabKind::Popup { popups },
                ..
            }) = state.grab.as_mut()
            else {
                continue;
            };
            popups.retain(|popup| !dismissed.contains(popup));
            match popups.last() {
                Some(top) => {
                    let top = *top;
                    *surface = top;
                    self.move_keyboard_focus(seat, Some(top));
                }
                None => self.end_grab(seat, surfaces),
            }
        }
    }

    fn grab_surface(&self, seat: SeatId) -> Option<&Grab> {
        self.seats.get(&seat).and_then(|state| state.grab.as_ref())
    }

    /// Re-run hit-testing for the pointer at its current position
    fn refocus_pointer(&mut self, seat: SeatId, surfaces: &SurfaceManager) {
        let Some(position) = self.seats.get(&seat).map(|s| s.pointer_position) else {
            return;
        };
        let target = self.pointer_target(seat, position, surfaces);
        let (surface, local) = match target {
            Some((surface, local)) => (Some(surface), local),
            None => (None, Point::default()),
        };
        self.set_pointer_focus(seat, surface, local);
    }

    /// Surface that receives pointer input at `position`
    fn pointer_target(&self, seat: SeatId, position: Point, surfaces: &SurfaceManager) -> Option<(SurfaceId, Point)> {
        match self.grab_surface(seat) {
            Some(Grab {
                kind: GrabKind::Popup { .. },
                surface,
                ..
            }) => surfaces
                .hit_test(position)
                .filter(|(hit, _)| hit.client == surface.client),
            Some(grab) => {
                let (x, y) = surfaces.global_position(grab.surface);
                Some((grab.surface, Point::new(position.x - x as f64, position.y - y as f64)))
            }
            None => surfaces.hit_test(position),
        }
    }

    // ----------------------------------------------------------------------
    // Routing
    // ----------------------------------------------------------------------

    pub fn route_keyboard_event(&mut self, seat: SeatId, event: KeyboardEvent) -> RouteResult {
        let Some(state) = self.seats.get_mut(&seat) else {
            return RouteResult::Dropped(DropReason::UnknownSeat);
        };
        match event {
            KeyboardEvent::Key { key, state: key_state, .. } => match key_state {
                ButtonState::Pressed => {
                    if !state.pressed_keys.contains(&key) {
                        state.pressed_keys.push(key);
                    }
                }
                ButtonState::Released => state.pressed_keys.retain(|k| *k != key),
            },
            KeyboardEvent::Modifiers(modifiers) => state.modifiers = modifiers,
        }
        let grabbed = state
            .grab
            .as_ref()
            .filter(|grab| grab.holds_keyboard())
            .map(|grab| grab.surface);
        let Some(focus) = grabbed.or(state.keyboard_focus) else {
            return RouteResult::Dropped(DropReason::NoFocus);
        };
        let keyboards = self.devices_of(focus.client, seat, DeviceKind::Keyboard);
        if keyboards.is_empty() {
            return RouteResult::Dropped(DropReason::NoDevice);
        }
        let serial = self.serials.next_serial();
        for keyboard in keyboards {
            let event = match event {
                KeyboardEvent::Key { time, key, state } => Event::KeyboardKey {
                    serial,
                    time,
                    key,
                    state,
                },
                KeyboardEvent::Modifiers(modifiers) => modifiers_event(serial, modifiers),
            };
            self.send(focus.client, keyboard, event);
        }
        RouteResult::Delivered
    }

    /// Route pointer input. Motion re-targets focus by hit-testing unless a
    /// grab is active; a press outside the popup-grabbing client dismisses
    /// its popups.
    pub fn route_pointer_event(&mut self, seat: SeatId, event: PointerEvent, surfaces: &mut SurfaceManager) -> RouteResult {
        if !self.seats.contains_key(&seat) {
            return RouteResult::Dropped(DropReason::UnknownSeat);
        }
        match event {
            PointerEvent::Motion { time, position } => {
                if let Some(state) = self.seats.get_mut(&seat) {
                    state.pointer_position = position;
                }
                match self.pointer_target(seat, position, surfaces) {
                    Some((surface, local)) => {
                        self.set_pointer_focus(seat, Some(surface), local);
                        self.deliver_pointer(seat, |_| Event::PointerMotion {
                            time,
                            x: Fixed::from_f64(local.x),
                            y: Fixed::from_f64(local.y),
                        })
                    }
                    None => {
                        self.set_pointer_focus(seat, None, Point::default());
                        RouteResult::Dropped(DropReason::NoFocus)
                    }
                }
            }
            PointerEvent::Button { time, button, state } => {
                if state == ButtonState::Pressed {
                    if let Some(result) = self.check_popup_dismissal(seat, surfaces) {
                        return result;
                    }
                }
                let Some(seat_state) = self.seats.get_mut(&seat) else {
                    return RouteResult::Dropped(DropReason::UnknownSeat);
                };
                let focus = seat_state.pointer_focus;
                match state {
                    ButtonState::Pressed => {
                        if !seat_state.pressed_buttons.contains(&button) {
                            seat_state.pressed_buttons.push(button);
                        }
                        if seat_state.grab.is_none() {
                            seat_state.grab = focus.map(|surface| Grab::new(surface, GrabKind::Implicit));
                        }
                    }
                    ButtonState::Released => {
                        seat_state.pressed_buttons.retain(|b| *b != button);
                    }
                }
                let release_implicit = seat_state.pressed_buttons.is_empty()
                    && matches!(
                        seat_state.grab,
                        Some(Grab {
                            kind: GrabKind::Implicit,
                            ..
                        })
                    );
                let serial = self.serials.next_serial();
                let result = self.deliver_pointer(seat, |_| Event::PointerButton {
                    serial,
                    time,
                    button,
                    state,
                });
                if release_implicit {
                    if let Some(state) = self.seats.get_mut(&seat) {
                        state.grab = None;
                    }
                    self.refocus_pointer(seat, surfaces);
                }
                result
            }
            PointerEvent::Axis { time, axis, value } => self.deliver_pointer(seat, |_| Event::PointerAxis {
                time,
                axis,
                value: Fixed::from_f64(value),
            }),
        }
    }

    /// With a popup grab active, a press that does not land on the grabbing
    /// client dismisses its popups and is swallowed
    fn check_popup_dismissal(&mut self, seat: SeatId, surfaces: &mut SurfaceManager) -> Option<RouteResult> {
        let state = self.seats.get(&seat)?;
        let Some(Grab {
            kind: GrabKind::Popup { popups },
            surface,
            ..
        }) = &state.grab
        else {
            return None;
        };
        let inside = state
            .pointer_focus
            .map_or(false, |focus| focus.client == surface.client);
        if inside {
            return None;
        }
        let root = popups.first().copied()?;
        let dismissed = surfaces.dismiss_popup(root);
        self.popups_dismissed(&dismissed, surfaces);
        if let Some(state) = self.seats.get_mut(&seat) {
            if matches!(state.grab, Some(Grab { kind: GrabKind::Popup { .. }, .. })) {
                state.grab = None;
            }
        }
        Some(RouteResult::Dropped(DropReason::PopupDismissed))
    }

    fn deliver_pointer(&mut self, seat: SeatId, event: impl Fn(ObjectId) -> Event) -> RouteResult {
        let Some(focus) = self.seats.get(&seat).and_then(|s| s.pointer_focus) else {
            return RouteResult::Dropped(DropReason::NoFocus);
        };
        let pointers = self.devices_of(focus.client, seat, DeviceKind::Pointer);
        if pointers.is_empty() {
            return RouteResult::Dropped(DropReason::NoDevice);
        }
        for pointer in pointers {
            self.send(focus.client, pointer, event(pointer));
            self.send(focus.client, pointer, Event::PointerFrame);
        }
        RouteResult::Delivered
    }

    /// Route touch input. Points stay bound to the surface they went down on.
    pub fn route_touch_event(&mut self, seat: SeatId, event: TouchEvent, surfaces: &SurfaceManager) -> RouteResult {
        if !self.seats.contains_key(&seat) {
            return RouteResult::Dropped(DropReason::UnknownSeat);
        }
        match event {
            TouchEvent::Down { time, id, position } => {
                let target = match self.grab_surface(seat) {
                    Some(Grab {
                        kind: GrabKind::Explicit,
                        surface,
                        ..
                    }) => {
                        let (x, y) = surfaces.global_position(*surface);
                        Some((*surface, Point::new(position.x - x as f64, position.y - y as f64)))
                    }
                    _ => surfaces.hit_test(position),
                };
                let Some((surface, local)) = target else {
                    return RouteResult::Dropped(DropReason::NoFocus);
                };
                let touches = self.devices_of(surface.client, seat, DeviceKind::Touch);
                if touches.is_empty() {
                    return RouteResult::Dropped(DropReason::NoDevice);
                }
                let origin = Point::new(position.x - local.x, position.y - local.y);
                if let Some(state) = self.seats.get_mut(&seat) {
                    state.touch_points.insert(id, TouchPoint { surface, origin });
                }
                let serial = self.serials.next_serial();
                for touch in touches {
                    self.send(
                        surface.client,
                        touch,
                        Event::TouchDown {
                            serial,
                            time,
                            surface: surface.object,
                            id,
                            x: Fixed::from_f64(local.x),
                            y: Fixed::from_f64(local.y),
                        },
                    );
                }
                RouteResult::Delivered
            }
            TouchEvent::Motion { time, id, position } => {
                let Some(point) = self.seats.get(&seat).and_then(|s| s.touch_points.get(&id).copied()) else {
                    return RouteResult::Dropped(DropReason::UnknownTouchPoint);
                };
                let x = Fixed::from_f64(position.x - point.origin.x);
                let y = Fixed::from_f64(position.y - point.origin.y);
                self.deliver_touch(seat, point.surface.client, |_| Event::TouchMotion { time, id, x, y })
            }
            TouchEvent::Up { time, id } => {
                let Some(point) = self.seats.get_mut(&seat).and_then(|s| s.touch_points.remove(&id)) else {
                    return RouteResult::Dropped(DropReason::UnknownTouchPoint);
                };
                let serial = self.serials.next_serial();
                self.deliver_touch(seat, point.surface.client, |_| Event::TouchUp { serial, time, id })
            }
            TouchEvent::Frame => {
                let clients = self.touch_clients(seat);
                if clients.is_empty() {
                    return RouteResult::Dropped(DropReason::NoFocus);
                }
                for client in clients {
                    self.deliver_touch(seat, client, |_| Event::TouchFrame);
                }
                RouteResult::Delivered
            }
            TouchEvent::Cancel => {
                let clients = self.touch_clients(seat);
                if let Some(state) = self.seats.get_mut(&seat) {
                    state.touch_points.clear();
                }
                if clients.is_empty() {
                    return RouteResult::Dropped(DropReason::NoFocus);
                }
                for client in clients {
                    self.deliver_touch(seat, client, |_| Event::TouchCancel);
                }
                RouteResult::Delivered
            }
        }
    }

    fn touch_clients(&self, seat: SeatId) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = self
            .seats
            .get(&seat)
            .map(|s| s.touch_points.values().map(|p| p.surface.client).collect())
            .unwrap_or_default();
        clients.sort();
        clients.dedup();
        clients
    }

    fn deliver_touch(&mut self, seat: SeatId, client: ClientId, event: impl Fn(ObjectId) -> Event) -> RouteResult {
        let touches = self.devices_of(client, seat, DeviceKind::Touch);
        if touches.is_empty() {
            return RouteResult::Dropped(DropReason::NoDevice);
        }
        for touch in touches {
            self.send(client, touch, event(touch));
        }
        RouteResult::Delivered
    }

    // ----------------------------------------------------------------------
    // Surface and client lifecycle
    // ----------------------------------------------------------------------

    /// A surface was destroyed. Focus is cleared without a leave event (the
    /// object is gone), the pointer is re-targeted, touch points on the
    /// surface are cancelled and grabs on it end.
    pub fn surface_destroyed(&mut self, surface: SurfaceId, surfaces: &SurfaceManager) {
        let seats: Vec<SeatId> = self.seats.keys().copied().collect();
        for seat in seats {
            let Some(state) = self.seats.get(&seat) else {
                continue;
            };
            let keyboard = state.keyboard_focus == Some(surface);
            let pointer = state.pointer_focus == Some(surface);
            let grab = state.grab.as_ref().map_or(false, |grab| match &grab.kind {
                GrabKind::Popup { popups, .. } => popups.contains(&surface),
                _ => grab.surface == surface,
            });
            let touching = state.touch_points.values().any(|p| p.surface == surface);

            if keyboard {
                self.forget_focus(seat, FocusKind::Keyboard);
            }
            if pointer {
                self.forget_focus(seat, FocusKind::Pointer);
            }
            if touching {
                if let Some(state) = self.seats.get_mut(&seat) {
                    state.touch_points.retain(|_, p| p.surface != surface);
                }
                self.deliver_touch(seat, surface.client, |_| Event::TouchCancel);
            }
            if let Some(state) = self.seats.get_mut(&seat) {
                if state.cursor.map_or(false, |c| c.surface == Some(surface)) {
                    state.cursor = None;
                }
            }
            if grab {
                self.popups_dismissed(&[surface], surfaces);
                let still_grabbed = self
                    .grab_surface(seat)
                    .map_or(false, |g| g.surface == surface);
                if still_grabbed {
                    if let Some(state) = self.seats.get_mut(&seat) {
                        state.grab = None;
                    }
                }
            }
            if pointer || grab {
                self.refocus_pointer(seat, surfaces);
            }
        }
    }

    /// A surface was unmapped but still exists: focus leaves it normally
    pub fn surface_unmapped(&mut self, surface: SurfaceId, surfaces: &SurfaceManager) {
        if surfaces.surface(surface).is_none() {
            self.surface_destroyed(surface, surfaces);
            return;
        }
        let seats: Vec<SeatId> = self.seats.keys().copied().collect();
        for seat in seats {
            let Some(state) = self.seats.get(&seat) else {
                continue;
            };
            let keyboard = state.keyboard_focus == Some(surface);
            let pointer = state.pointer_focus == Some(surface);
            let grabbed = state.grab.as_ref().map_or(false, |g| g.surface == surface);
            if grabbed {
                self.popups_dismissed(&[surface], surfaces);
                if self.grab_surface(seat).map_or(false, |g| g.surface == surface) {
                    if let Some(state) = self.seats.get_mut(&seat) {
                        state.grab = None;
                    }
                }
            }
            if keyboard && self.seats.get(&seat).and_then(|s| s.keyboard_focus) == Some(surface) {
                self.move_keyboard_focus(seat, None);
            }
            if pointer || grabbed {
                self.refocus_pointer(seat, surfaces);
            }
        }
    }

    /// Forget everything about a disconnected client. Nothing is sent to it.
    pub fn client_disconnected(&mut self, client: ClientId) {
        self.seat_objects.retain(|(owner, _), _| *owner != client);
        self.devices.retain(|(owner, _), _| *owner != client);
        self.outbox.retain(|event| event.client != client);
        let seats: Vec<SeatId> = self.seats.keys().copied().collect();
        for seat in seats {
            let Some(state) = self.seats.get_mut(&seat) else {
                continue;
            };
            state.touch_points.retain(|_, p| p.surface.client != client);
            if state.grab.as_ref().map_or(false, |g| g.surface.client == client) {
                state.grab = None;
            }
            if state.cursor.and_then(|c| c.surface).map_or(false, |s| s.client == client) {
                state.cursor = None;
            }
            if state.keyboard_focus.map_or(false, |s| s.client == client) {
                self.forget_focus(seat, FocusKind::Keyboard);
            }
            if self.seats.get(&seat).and_then(|s| s.pointer_focus).map_or(false, |s| s.client == client) {
                self.forget_focus(seat, FocusKind::Pointer);
            }
        }
    }
}

fn pointer_enter(serial: u32, surface: SurfaceId, local: Point) -> Event {
    Event::PointerEnter {
        serial,
        surface: surface.object,
        x: Fixed::from_f64(local.x),
        y: Fixed::from_f64(local.y),
    }
}

fn modifiers_event(serial: u32, modifiers: Modifiers) -> Event {
    Event::KeyboardModifiers {
        serial,
        depressed: modifiers.depressed,
        latched: modifiers.latched,
        locked: modifiers.locked,
        group: modifiers.group,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CascadePlacement;
    use crate::compositor::SurfaceLimits;
    use std::os::fd::OwnedFd;

    const CLIENT: ClientId = ClientId(1);
    const SEAT_OBJECT: ObjectId = ObjectId(2);
    const KEYBOARD: ObjectId = ObjectId(3);
    const POINTER: ObjectId = ObjectId(4);

    fn dispatcher() -> (InputDispatcher, SeatId) {
        let mut input = InputDispatcher::new(Keymap::none(), RepeatInfo::default());
        let seat = input.add_seat(
            "seat0",
            capability::POINTER | capability::KEYBOARD | capability::TOUCH,
        );
        input.bind_seat(CLIENT, SEAT_OBJECT, seat);
        input.get_keyboard(CLIENT, SEAT_OBJECT, KEYBOARD).unwrap();
        input.get_pointer(CLIENT, SEAT_OBJECT, POINTER).unwrap();
        input.drain_events();
        (input, seat)
    }

    /// Two mapped 100x100 surfaces (objects 10 and 11) of CLIENT
    fn surfaces() -> SurfaceManager {
        let mut manager = SurfaceManager::new(
            SurfaceLimits::default(),
            vec![PixelFormat::Argb8888],
            Rect::from_size(1920, 1080),
        );
        let mut placement = CascadePlacement::new(Rect::from_size(1920, 1080));
        let file = tempfile::tempfile().unwrap();
        file.set_len(40_000).unwrap();
        manager
            .create_pool(CLIENT, ObjectId::new(20), OwnedFd::from(file), 40_000)
            .unwrap();
        manager
            .create_buffer(CLIENT, ObjectId::new(20), ObjectId::new(21), 0, 100, 100, 400, 0)
            .unwrap();
        for object in [10, 11] {
            let object = ObjectId::new(object);
            manager.create_surface(CLIENT, object, 6).unwrap();
            manager
                .attach(CLIENT, object, Some(ObjectId::new(21)), 0, 0)
                .unwrap();
            manager.commit(CLIENT, object, &mut placement).unwrap();
        }
        manager
    }

    fn names(events: &[Outgoing]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| e.event.interface().event(e.event.opcode()).map_or("?", |d| d.name))
            .collect()
    }

    #[test]
    fn test_leave_before_enter() {
        let (mut input, seat) = dispatcher();
        let a = SurfaceId::new(CLIENT, ObjectId::new(10));
        let b = SurfaceId::new(CLIENT, ObjectId::new(11));
        assert!(input.set_keyboard_focus(seat, Some(a)));
        input.drain_events();

        assert!(input.set_keyboard_focus(seat, Some(b)));
        let events = input.drain_events();
        assert_eq!(names(&events), vec!["leave", "enter", "modifiers"]);
        match &events[0].event {
            Event::KeyboardLeave { surface, .. } => assert_eq!(*surface, a.object),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_same_focus_is_a_no_op() {
        let (mut input, seat) = dispatcher();
        let a = SurfaceId::new(CLIENT, ObjectId::new(10));
        input.set_keyboard_focus(seat, Some(a));
        input.drain_events();
        input.drain_notices();
        assert!(!input.set_keyboard_focus(seat, Some(a)));
        assert!(input.drain_events().is_empty());
        assert!(input.drain_notices().is_empty());
    }

    #[test]
    fn test_keyboard_without_focus_is_dropped() {
        let (mut input, seat) = dispatcher();
        let result = input.route_keyboard_event(
            seat,
            KeyboardEvent::Key {
                time: Timestamp::new(1),
                key: 30,
                state: ButtonState::Pressed,
            },
        );
        assert_eq!(result, RouteResult::Dropped(DropReason::NoFocus));
        assert_eq!(input.seat(seat).unwrap().pressed_keys, vec![30]);
    }

    #[test]
    fn test_pointer_motion_follows_hit_test() {
        let (mut input, seat) = dispatcher();
        let mut manager = surfaces();
        let top = SurfaceId::new(CLIENT, ObjectId::new(11));
        let (x, y) = manager.global_position(top);
        let result = input.route_pointer_event(
            seat,
            PointerEvent::Motion {
                time: Timestamp::new(1),
                position: Point::new(x as f64 + 5.0, y as f64 + 5.0),
            },
            &mut manager,
        );
        assert_eq!(result, RouteResult::Delivered);
        assert_eq!(input.seat(seat).unwrap().pointer_focus, Some(top));
        let events = input.drain_events();
        assert_eq!(names(&events), vec!["enter", "frame", "motion", "frame"]);
    }

    #[test]
    fn test_destroyed_surface_loses_focus_silently() {
        let (mut input, seat) = dispatcher();
        let mut manager = surfaces();
        let surface = SurfaceId::new(CLIENT, ObjectId::new(10));
        input.set_keyboard_focus(seat, Some(surface));
        input.drain_events();

        manager.destroy_surface(CLIENT, surface.object).unwrap();
        input.surface_destroyed(surface, &manager);
        assert_eq!(input.seat(seat).unwrap().keyboard_focus, None);
        assert!(input
            .drain_events()
            .iter()
            .all(|e| !matches!(e.event, Event::KeyboardLeave { .. })));
    }

    #[test]
    fn test_touch_point_keeps_its_surface() {
        let (mut input, seat) = dispatcher();
        input.get_touch(CLIENT, SEAT_OBJECT, ObjectId::new(5)).unwrap();
        let manager = surfaces();
        let top = SurfaceId::new(CLIENT, ObjectId::new(11));
        let (x, y) = manager.global_position(top);
        let down = Point::new(x as f64 + 10.0, y as f64 + 10.0);
        assert_eq!(
            input.route_touch_event(
                seat,
                TouchEvent::Down {
                    time: Timestamp::new(1),
                    id: 0,
                    position: down
                },
                &manager
            ),
            RouteResult::Delivered
        );
        input.drain_events();
        // Far outside the surface: still delivered to it, in its coordinates
        input.route_touch_event(
            seat,
            TouchEvent::Motion {
                time: Timestamp::new(2),
                id: 0,
                position: Point::new(x as f64 + 500.0, y as f64 + 10.0),
            },
            &manager,
        );
        let events = input.drain_events();
        match &events[0].event {
            Event::TouchMotion { x, .. } => assert_eq!(x.to_int(), 500),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            input.route_touch_event(
                seat,
                TouchEvent::Up {
                    time: Timestamp::new(3),
                    id: 7
                },
                &manager
            ),
            RouteResult::Dropped(DropReason::UnknownTouchPoint)
        );
    }

    #[test]
    fn test_focus_change_waits_for_explicit_grab() {
        let (mut input, seat) = dispatcher();
        let manager = surfaces();
        let a = SurfaceId::new(CLIENT, ObjectId::new(10));
        let b = SurfaceId::new(CLIENT, ObjectId::new(11));
        assert!(input.start_grab(seat, a, &manager));
        input.drain_events();

        assert!(!input.set_keyboard_focus(seat, Some(b)));
        assert_eq!(input.seat(seat).unwrap().keyboard_focus, Some(a));
        assert!(input.drain_events().is_empty());
        let key = KeyboardEvent::Key {
            time: Timestamp::new(1),
            key: 30,
            state: ButtonState::Pressed,
        };
        assert_eq!(input.route_keyboard_event(seat, key), RouteResult::Delivered);
        assert_eq!(input.seat(seat).unwrap().keyboard_focus, Some(a));

        input.end_grab(seat, &manager);
        assert_eq!(input.seat(seat).unwrap().keyboard_focus, Some(b));
        let events = input.drain_events();
        let keyboard: Vec<&Outgoing> = events.iter().filter(|e| e.object == KEYBOARD).collect();
        match (&keyboard[0].event, &keyboard[1].event) {
            (Event::KeyboardKey { .. }, Event::KeyboardLeave { surface, .. }) => assert_eq!(*surface, a.object),
            other => panic!("unexpected {:?}", other),
        }
        assert!(keyboard
            .iter()
            .any(|e| matches!(e.event, Event::KeyboardEnter { surface, .. } if surface == b.object)));
    }

    #[test]
    fn test_explicit_grab_overrides_hit_test() {
        let (mut input, seat) = dispatcher();
        let mut manager = surfaces();
        let bottom = SurfaceId::new(CLIENT, ObjectId::new(10));
        let top = SurfaceId::new(CLIENT, ObjectId::new(11));
        assert!(input.start_grab(seat, bottom, &manager));
        let (x, y) = manager.global_position(top);
        input.route_pointer_event(
            seat,
            PointerEvent::Motion {
                time: Timestamp::new(1),
                position: Point::new(x as f64 + 50.0, y as f64 + 50.0),
            },
            &mut manager,
        );
        assert_eq!(input.seat(seat).unwrap().pointer_focus, Some(bottom));
        input.end_grab(seat, &manager);
        assert_eq!(input.seat(seat).unwrap().pointer_focus, Some(top));
    }

    #[test]
    fn test_missing_capability() {
        let mut input = InputDispatcher::new(Keymap::none(), RepeatInfo::default());
        let seat = input.add_seat("seat0", capability::KEYBOARD);
        input.bind_seat(CLIENT, SEAT_OBJECT, seat);
        let err = input.get_touch(CLIENT, SEAT_OBJECT, ObjectId::new(9)).unwrap_err();
        assert_eq!(err.code, codes::seat::MISSING_CAPABILITY);
    }
}
