//! Wayland protocol events
//!
//! Events are sent from the server to clients to notify them of state changes,
//! user input, and other interesting occurrences.

use super::*;
use std::os::fd::OwnedFd;

/// wl_seat capability bits
pub mod capability {
    pub const POINTER: u32 = 1;
    pub const KEYBOARD: u32 = 2;
    pub const TOUCH: u32 = 4;
}

/// wl_pointer.button_state / wl_keyboard.key_state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ButtonState {
    Released = 0,
    Pressed = 1,
}

/// wl_pointer.axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Axis {
    VerticalScroll = 0,
    HorizontalScroll = 1,
}

/// wl_keyboard.keymap_format
pub mod keymap_format {
    pub const NO_KEYMAP: u32 = 0;
    pub const XKB_V1: u32 = 1;
}

/// xdg_toplevel.state values carried in configure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ToplevelState {
    Maximized = 1,
    Fullscreen = 2,
    Resizing = 3,
    Activated = 4,
}

/// Event payloads
#[derive(Debug)]
pub enum Event {
    DisplayError {
        object: ObjectId,
        code: u32,
        message: String,
    },
    DeleteId {
        id: ObjectId,
    },
    Global {
        name: u32,
        interface: Interface,
        version: u32,
    },
    GlobalRemove {
        name: u32,
    },
    CallbackDone {
        data: u32,
    },
    ShmFormat {
        format: PixelFormat,
    },
    BufferRelease,
    SeatCapabilities {
        capabilities: u32,
    },
    SeatName {
        name: String,
    },
    PointerEnter {
        serial: u32,
        surface: ObjectId,
        x: Fixed,
        y: Fixed,
    },
    PointerLeave {
        serial: u32,
        surface: ObjectId,
    },
    PointerMotion {
        time: Timestamp,
        x: Fixed,
        y: Fixed,
    },
    PointerButton {
        serial: u32,
        time: Timestamp,
        button: u32,
        state: ButtonState,
    },
    PointerAxis {
        time: Timestamp,
        axis: Axis,
        value: Fixed,
    },
    PointerFrame,
    KeyboardKeymap {
        format: u32,
        fd: OwnedFd,
        size: u32,
    },
    KeyboardEnter {
        serial: u32,
        surface: ObjectId,
        keys: Vec<u32>,
    },
    KeyboardLeave {
        serial: u32,
        surface: ObjectId,
    },
    KeyboardKey {
        serial: u32,
        time: Timestamp,
        key: u32,
        state: ButtonState,
    },
    KeyboardModifiers {
        serial: u32,
        depressed: u32,
        latched: u32,
        locked: u32,
        group: u32,
    },
    KeyboardRepeatInfo {
        rate: i32,
        delay: i32,
    },
    TouchDown {
        serial: u32,
        time: Timestamp,
        surface: ObjectId,
        id: i32,
        x: Fixed,
        y: Fixed,
    },
    TouchUp {
        serial: u32,
        time: Timestamp,
        id: i32,
    },
    TouchMotion {
        time: Timestamp,
        id: i32,
        x: Fixed,
        y: Fixed,
    },
    TouchFrame,
    TouchCancel,
    Ping {
        serial: u32,
    },
    XdgSurfaceConfigure {
        serial: u32,
    },
    ToplevelConfigure {
        width: i32,
        height: i32,
        states: Vec<ToplevelState>,
    },
    ToplevelClose,
    PopupConfigure {
        geometry: Rect,
    },
    PopupDone,
    PopupRepositioned {
        token: u32,
    },
}

impl Event {
    /// Interface of the object this event is sent on
    pub fn interface(&self) -> Interface {
        match self {
            Event::DisplayError { .. } | Event::DeleteId { .. } => Interface::Display,
            Event::Global { .. } | Event::GlobalRemove { .. } => Interface::Registry,
            Event::CallbackDone { .. } => Interface::Callback,
            Event::ShmFormat { .. } => Interface::Shm,
            Event::BufferRelease => Interface::Buffer,
            Event::SeatCapabilities { .. } | Event::SeatName { .. } => Interface::Seat,
            Event::PointerEnter { .. }
            | Event::PointerLeave { .. }
            | Event::PointerMotion { .. }
            | Event::PointerButton { .. }
            | Event::PointerAxis { .. }
            | Event::PointerFrame => Interface::Pointer,
            Event::KeyboardKeymap { .. }
            | Event::KeyboardEnter { .. }
            | Event::KeyboardLeave { .. }
            | Event::KeyboardKey { .. }
            | Event::KeyboardModifiers { .. }
            | Event::KeyboardRepeatInfo { .. } => Interface::Keyboard,
            Event::TouchDown { .. }
            | Event::TouchUp { .. }
            | Event::TouchMotion { .. }
            | Event::TouchFrame
            | Event::TouchCancel => Interface::Touch,
            Event::Ping { .. } => Interface::XdgWmBase,
            Event::XdgSurfaceConfigure { .. } => Interface::XdgSurface,
            Event::ToplevelConfigure { .. } | Event::ToplevelClose => Interface::XdgToplevel,
            Event::PopupConfigure { .. } | Event::PopupDone | Event::PopupRepositioned { .. } => {
                Interface::XdgPopup
            }
        }
    }

    pub fn opcode(&self) -> u16 {
        match self {
            Event::DisplayError { .. } => 0,
            Event::DeleteId { .. } => 1,
            Event::Global { .. } => 0,
            Event::GlobalRemove { .. } => 1,
            Event::CallbackDone { .. } => 0,
            Event::ShmFormat { .. } => 0,
            Event::BufferRelease => 0,
            Event::SeatCapabilities { .. } => 0,
            Event::SeatName { .. } => 1,
            Event::PointerEnter { .. } => 0,
            Event::PointerLeave { .. } => 1,
            Event::PointerMotion { .. } => 2,
            Event::PointerButton { .. } => 3,
            Event::PointerAxis { .. } => 4,
            Event::PointerFrame => 5,
            Event::KeyboardKeymap { .. } => 0,
            Event::KeyboardEnter { .. } => 1,
            Event::KeyboardLeave { .. } => 2,
            Event::KeyboardKey { .. } => 3,
            Event::KeyboardModifiers { .. } => 4,
            Event::KeyboardRepeatInfo { .. } => 5,
            Event::TouchDown { .. } => 0,
            Event::TouchUp { .. } => 1,
            Event::TouchMotion { .. } => 2,
            Event::TouchFrame => 3,
            Event::TouchCancel => 4,
            Event::Ping { .. } => 0,
            Event::XdgSurfaceConfigure { .. } => 0,
            Event::ToplevelConfigure { .. } => 0,
            Event::ToplevelClose => 1,
            Event::PopupConfigure { .. } => 0,
            Event::PopupDone => 1,
            Event::PopupRepositioned { .. } => 2,
        }
    }

    /// First interface version that carries this event
    pub fn since(&self) -> u32 {
        self.interface()
            .event(self.opcode())
            .map(|desc| desc.since)
            .unwrap_or(1)
    }

    /// Whether delivering this event destroys the receiving object
    pub fn is_destructor(&self) -> bool {
        matches!(self, Event::CallbackDone { .. })
    }

    pub fn into_arguments(self) -> Vec<Argument> {
        use Argument::*;
        match self {
            Event::DisplayError {
                object,
                code,
                message,
            } => vec![Object(Some(object)), Uint(code), Str(Some(message))],
            Event::DeleteId { id } => vec![Uint(id.get())],
            Event::Global {
                name,
                interface,
                version,
            } => vec![
                Uint(name),
                Str(Some(interface.name().to_string())),
                Uint(version),
            ],
            Event::GlobalRemove { name } => vec![Uint(name)],
            Event::CallbackDone { data } => vec![Uint(data)],
            Event::ShmFormat { format } => vec![Uint(format.code())],
            Event::BufferRelease => vec![],
            Event::SeatCapabilities { capabilities } => vec![Uint(capabilities)],
            Event::SeatName { name } => vec![Str(Some(name))],
            Event::PointerEnter {
                serial,
                surface,
                x,
                y,
            } => vec![Uint(serial), Object(Some(surface)), Fixed(x), Fixed(y)],
            Event::PointerLeave { serial, surface } => vec![Uint(serial), Object(Some(surface))],
            Event::PointerMotion { time, x, y } => vec![Uint(time.get()), Fixed(x), Fixed(y)],
            Event::PointerButton {
                serial,
                time,
                button,
                state,
            } => vec![Uint(serial), Uint(time.get()), Uint(button), Uint(state as u32)],
            Event::PointerAxis { time, axis, value } => {
                vec![Uint(time.get()), Uint(axis as u32), Fixed(value)]
            }
            Event::PointerFrame => vec![],
            Event::KeyboardKeymap { format, fd, size } => vec![Uint(format), Fd(fd), Uint(size)],
            Event::KeyboardEnter {
                serial,
                surface,
                keys,
            } => {
                let bytes = keys.iter().flat_map(|key| key.to_ne_bytes()).collect();
                vec![Uint(serial), Object(Some(surface)), Array(bytes)]
            }
            Event::KeyboardLeave { serial, surface } => vec![Uint(serial), Object(Some(surface))],
            Event::KeyboardKey {
                serial,
                time,
                key,
                state,
            } => vec![Uint(serial), Uint(time.get()), Uint(key), Uint(state as u32)],
            Event::KeyboardModifiers {
                serial,
                depressed,
                latched,
                locked,
                group,
            } => vec![
                Uint(serial),
                Uint(depressed),
                Uint(latched),
                Uint(locked),
                Uint(group),
            ],
            Event::KeyboardRepeatInfo { rate, delay } => vec![Int(rate), Int(delay)],
            Event::TouchDown {
                serial,
                time,
                surface,
                id,
                x,
                y,
            } => vec![
                Uint(serial),
                Uint(time.get()),
                Object(Some(surface)),
                Int(id),
                Fixed(x),
                Fixed(y),
            ],
            Event::TouchUp { serial, time, id } => vec![Uint(serial), Uint(time.get()), Int(id)],
            Event::TouchMotion { time, id, x, y } => {
                vec![Uint(time.get()), Int(id), Fixed(x), Fixed(y)]
            }
            Event::TouchFrame | Event::TouchCancel => vec![],
            Event::Ping { serial } => vec![Uint(serial)],
            Event::XdgSurfaceConfigure { serial } => vec![Uint(serial)],
            Event::ToplevelConfigure {
                width,
                height,
                states,
            } => {
                let bytes = states
                    .iter()
                    .flat_map(|state| (*state as u32).to_ne_bytes())
                    .collect();
                vec![Int(width), Int(height), Array(bytes)]
            }
            Event::ToplevelClose => vec![],
            Event::PopupConfigure { geometry } => vec![
                Int(geometry.x),
                Int(geometry.y),
                Int(geometry.width),
                Int(geometry.height),
            ],
            Event::PopupDone => vec![],
            Event::PopupRepositioned { token } => vec![Uint(token)],
        }
    }
}

/// An event addressed to an object of a particular client
#[derive(Debug)]
pub struct Outgoing {
    pub client: ClientId,
    pub object: ObjectId,
    pub event: Event,
}

impl Outgoing {
    pub fn new(client: ClientId, object: ObjectId, event: Event) -> Self {
        Outgoing {
            client,
            object,
            event,
        }
    }
}
