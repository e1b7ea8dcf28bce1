//! Seat state and the input events fed into the dispatcher

use crate::protocol::*;
use std::collections::HashMap;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::path::Path;

/// Keyboard modifier state as carried by wl_keyboard.modifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub group: u32,
}

/// Keyboard input from the host
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyboardEvent {
    Key {
        time: Timestamp,
        key: u32,
        state: ButtonState,
    },
    Modifiers(Modifiers),
}

/// Pointer input from the host; positions are global
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Motion {
        time: Timestamp,
        position: Point,
    },
    Button {
        time: Timestamp,
        button: u32,
        state: ButtonState,
    },
    Axis {
        time: Timestamp,
        axis: Axis,
        value: f64,
    },
}

/// Touch input from the host; positions are global
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TouchEvent {
    Down {
        time: Timestamp,
        id: i32,
        position: Point,
    },
    Motion {
        time: Timestamp,
        id: i32,
        position: Point,
    },
    Up {
        time: Timestamp,
        id: i32,
    },
    Frame,
    Cancel,
}

/// Why an input event reached no client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnknownSeat,
    /// No surface has focus (or is under the pointer / touch point)
    NoFocus,
    /// The focused client has no wl_pointer / wl_keyboard / wl_touch
    NoDevice,
    UnknownTouchPoint,
    /// A press outside the grabbing client dismissed its popups
    PopupDismissed,
}

/// Outcome of routing one input event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteResult {
    Delivered,
    Dropped(DropReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabKind {
    /// Requested by the embedder
    Explicit,
    /// Pointer button held down over a surface
    Implicit,
    /// xdg_popup.grab; popups of the grabbing client, bottom to top
    Popup { popups: Vec<SurfaceId> },
}

/// An active grab: events go to `surface` regardless of hit-testing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grab {
    pub surface: SurfaceId,
    pub kind: GrabKind,
    /// Keyboard focus to apply once the grab ends. `None` leaves focus on
    /// the grab surface.
    pub focus_after: Option<Option<SurfaceId>>,
}

impl Grab {
    pub fn new(surface: SurfaceId, kind: GrabKind) -> Self {
        Grab {
            surface,
            kind,
            focus_after: None,
        }
    }

    /// Whether keyboard input follows the grab instead of focus
    pub fn holds_keyboard(&self) -> bool {
        !matches!(self.kind, GrabKind::Implicit)
    }
}

/// Touch point bound to the surface it went down on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub surface: SurfaceId,
    /// Global position of the surface origin at touch-down
    pub origin: Point,
}

/// Cursor image set with wl_pointer.set_cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorImage {
    /// `None` hides the cursor
    pub surface: Option<SurfaceId>,
    pub hotspot: (i32, i32),
}

/// One seat: a group of input devices with shared focus
#[derive(Debug, Clone)]
pub struct Seat {
    pub id: SeatId,
    pub name: String,
    /// wl_seat.capability bits
    pub capabilities: u32,
    pub keyboard_focus: Option<SurfaceId>,
    pub pointer_focus: Option<SurfaceId>,
    /// Global pointer position
    pub pointer_position: Point,
    /// Pointer position relative to the focused surface
    pub pointer_local: Point,
    pub pressed_buttons: Vec<u32>,
    pub pressed_keys: Vec<u32>,
    pub modifiers: Modifiers,
    pub touch_points: HashMap<i32, TouchPoint>,
    pub grab: Option<Grab>,
    pub cursor: Option<CursorImage>,
}

impl Seat {
    pub fn new(id: SeatId, name: impl Into<String>, capabilities: u32) -> Self {
        Seat {
            id,
            name: name.into(),
            capabilities,
            keyboard_focus: None,
            pointer_focus: None,
            pointer_position: Point::default(),
            pointer_local: Point::default(),
            pressed_buttons: Vec::new(),
            pressed_keys: Vec::new(),
            modifiers: Modifiers::default(),
            touch_points: HashMap::new(),
            grab: None,
            cursor: None,
        }
    }

    pub fn has_capability(&self, capability: u32) -> bool {
        self.capabilities & capability != 0
    }
}

/// Keymap handed to every new wl_keyboard
#[derive(Debug, Default)]
pub struct Keymap {
    file: Option<File>,
    size: u32,
}

impl Keymap {
    /// No keymap: clients fall back to their own defaults
    pub fn none() -> Self {
        Keymap::default()
    }

    /// Load an XKB keymap file. The file must end with a NUL byte as
    /// clients map `size` bytes and parse a C string.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let size = u32::try_from(size)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "keymap too large"))?;
        Ok(Keymap {
            file: Some(file),
            size,
        })
    }

    pub fn is_set(&self) -> bool {
        self.file.is_some()
    }

    /// wl_keyboard.keymap event with a fresh descriptor
    pub fn event(&self) -> std::io::Result<Event> {
        match &self.file {
            Some(file) => Ok(Event::KeyboardKeymap {
                format: keymap_format::XKB_V1,
                fd: OwnedFd::from(file.try_clone()?),
                size: self.size,
            }),
            None => Ok(Event::KeyboardKeymap {
                format: keymap_format::NO_KEYMAP,
                fd: OwnedFd::from(File::open("/dev/null")?),
                size: 0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_capabilities() {
        let seat = Seat::new(SeatId::new(0), "seat0", capability::POINTER | capability::KEYBOARD);
        assert!(seat.has_capability(capability::KEYBOARD));
        assert!(!seat.has_capability(capability::TOUCH));
    }

    #[test]
    fn test_keymap_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"xkb_keymap {};\0").unwrap();
        let keymap = Keymap::from_file(file.path()).unwrap();
        match keymap.event().unwrap() {
            Event::KeyboardKeymap { format, size, .. } => {
                assert_eq!(format, keymap_format::XKB_V1);
                assert_eq!(size, 15);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_no_keymap() {
        match Keymap::none().event().unwrap() {
            Event::KeyboardKeymap { format, size, .. } => {
                assert_eq!(format, keymap_format::NO_KEYMAP);
                assert_eq!(size, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
