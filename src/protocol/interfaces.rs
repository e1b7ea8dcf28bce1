//! Interface tables
//!
//! Every interface the server speaks is a variant of [`Interface`]. Each one
//! carries its wire name, the highest version the server advertises, and the
//! ordered request/event descriptors that drive argument decoding.

use std::fmt;

/// Primitive argument kinds of the wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Int,
    Uint,
    Fixed,
    Str,
    /// Nullable string (length 0 on the wire)
    OptStr,
    Object,
    /// Nullable object reference (id 0 on the wire)
    OptObject,
    NewId,
    Array,
    /// File descriptor, carried out of band
    Fd,
}

impl ArgKind {
    pub fn name(&self) -> &'static str {
        match self {
            ArgKind::Int => "int",
            ArgKind::Uint => "uint",
            ArgKind::Fixed => "fixed",
            ArgKind::Str | ArgKind::OptStr => "string",
            ArgKind::Object | ArgKind::OptObject => "object",
            ArgKind::NewId => "new_id",
            ArgKind::Array => "array",
            ArgKind::Fd => "fd",
        }
    }
}

/// Request or event descriptor
#[derive(Debug, Clone, Copy)]
pub struct MessageDesc {
    pub name: &'static str,
    /// First interface version carrying this message
    pub since: u32,
    pub signature: &'static [ArgKind],
    /// Whether the message destroys the object it is sent on
    pub destructor: bool,
}

const fn msg(name: &'static str, since: u32, signature: &'static [ArgKind]) -> MessageDesc {
    MessageDesc {
        name,
        since,
        signature,
        destructor: false,
    }
}

const fn destructor(name: &'static str, since: u32) -> MessageDesc {
    MessageDesc {
        name,
        since,
        signature: &[],
        destructor: true,
    }
}

use ArgKind::*;

const RECT: &[ArgKind] = &[Int, Int, Int, Int];
const SIZE: &[ArgKind] = &[Int, Int];

const DISPLAY_REQUESTS: &[MessageDesc] = &[msg("sync", 1, &[NewId]), msg("get_registry", 1, &[NewId])];
const DISPLAY_EVENTS: &[MessageDesc] = &[
    msg("error", 1, &[Object, Uint, Str]),
    msg("delete_id", 1, &[Uint]),
];

const REGISTRY_REQUESTS: &[MessageDesc] = &[msg("bind", 1, &[Uint, Str, Uint, NewId])];
const REGISTRY_EVENTS: &[MessageDesc] = &[
    msg("global", 1, &[Uint, Str, Uint]),
    msg("global_remove", 1, &[Uint]),
];

const CALLBACK_EVENTS: &[MessageDesc] = &[msg("done", 1, &[Uint])];

const COMPOSITOR_REQUESTS: &[MessageDesc] = &[
    msg("create_surface", 1, &[NewId]),
    msg("create_region", 1, &[NewId]),
];

const SHM_POOL_REQUESTS: &[MessageDesc] = &[
    msg("create_buffer", 1, &[NewId, Int, Int, Int, Int, Uint]),
    destructor("destroy", 1),
    msg("resize", 1, &[Int]),
];

const SHM_REQUESTS: &[MessageDesc] = &[
    msg("create_pool", 1, &[NewId, Fd, Int]),
    destructor("release", 2),
];
const SHM_EVENTS: &[MessageDesc] = &[msg("format", 1, &[Uint])];

const BUFFER_REQUESTS: &[MessageDesc] = &[destructor("destroy", 1)];
const BUFFER_EVENTS: &[MessageDesc] = &[msg("release", 1, &[])];

const SURFACE_REQUESTS: &[MessageDesc] = &[
    destructor("destroy", 1),
    msg("attach", 1, &[OptObject, Int, Int]),
    msg("damage", 1, RECT),
    msg("frame", 1, &[NewId]),
    msg("set_opaque_region", 1, &[OptObject]),
    msg("set_input_region", 1, &[OptObject]),
    msg("commit", 1, &[]),
    msg("set_buffer_transform", 2, &[Int]),
    msg("set_buffer_scale", 3, &[Int]),
    msg("damage_buffer", 4, RECT),
    msg("offset", 5, &[Int, Int]),
];
const SURFACE_EVENTS: &[MessageDesc] = &[
    msg("enter", 1, &[Object]),
    msg("leave", 1, &[Object]),
    msg("preferred_buffer_scale", 6, &[Int]),
    msg("preferred_buffer_transform", 6, &[Uint]),
];

const REGION_REQUESTS: &[MessageDesc] = &[
    destructor("destroy", 1),
    msg("add", 1, RECT),
    msg("subtract", 1, RECT),
];

const SUBCOMPOSITOR_REQUESTS: &[MessageDesc] = &[
    destructor("destroy", 1),
    msg("get_subsurface", 1, &[NewId, Object, Object]),
];

const SUBSURFACE_REQUESTS: &[MessageDesc] = &[
    destructor("destroy", 1),
    msg("set_position", 1, &[Int, Int]),
    msg("place_above", 1, &[Object]),
    msg("place_below", 1, &[Object]),
    msg("set_sync", 1, &[]),
    msg("set_desync", 1, &[]),
];

const SEAT_REQUESTS: &[MessageDesc] = &[
    msg("get_pointer", 1, &[NewId]),
    msg("get_keyboard", 1, &[NewId]),
    msg("get_touch", 1, &[NewId]),
    destructor("release", 5),
];
const SEAT_EVENTS: &[MessageDesc] = &[msg("capabilities", 1, &[Uint]), msg("name", 2, &[Str])];

const POINTER_REQUESTS: &[MessageDesc] = &[
    msg("set_cursor", 1, &[Uint, OptObject, Int, Int]),
    destructor("release", 3),
];
const POINTER_EVENTS: &[MessageDesc] = &[
    msg("enter", 1, &[Uint, Object, Fixed, Fixed]),
    msg("leave", 1, &[Uint, Object]),
    msg("motion", 1, &[Uint, Fixed, Fixed]),
    msg("button", 1, &[Uint, Uint, Uint, Uint]),
    msg("axis", 1, &[Uint, Uint, Fixed]),
    msg("frame", 5, &[]),
    msg("axis_source", 5, &[Uint]),
    msg("axis_stop", 5, &[Uint, Uint]),
    msg("axis_discrete", 5, &[Uint, Int]),
];

const KEYBOARD_REQUESTS: &[MessageDesc] = &[destructor("release", 3)];
const KEYBOARD_EVENTS: &[MessageDesc] = &[
    msg("keymap", 1, &[Uint, Fd, Uint]),
    msg("enter", 1, &[Uint, Object, Array]),
    msg("leave", 1, &[Uint, Object]),
    msg("key", 1, &[Uint, Uint, Uint, Uint]),
    msg("modifiers", 1, &[Uint, Uint, Uint, Uint, Uint]),
    msg("repeat_info", 4, &[Int, Int]),
];

const TOUCH_REQUESTS: &[MessageDesc] = &[destructor("release", 3)];
const TOUCH_EVENTS: &[MessageDesc] = &[
    msg("down", 1, &[Uint, Uint, Object, Int, Fixed, Fixed]),
    msg("up", 1, &[Uint, Uint, Int]),
    msg("motion", 1, &[Uint, Int, Fixed, Fixed]),
    msg("frame", 1, &[]),
    msg("cancel", 1, &[]),
];

const WM_BASE_REQUESTS: &[MessageDesc] = &[
    destructor("destroy", 1),
    msg("create_positioner", 1, &[NewId]),
    msg("get_xdg_surface", 1, &[NewId, Object]),
    msg("pong", 1, &[Uint]),
];
const WM_BASE_EVENTS: &[MessageDesc] = &[msg("ping", 1, &[Uint])];

const POSITIONER_REQUESTS: &[MessageDesc] = &[
    destructor("destroy", 1),
    msg("set_size", 1, SIZE),
    msg("set_anchor_rect", 1, RECT),
    msg("set_anchor", 1, &[Uint]),
    msg("set_gravity", 1, &[Uint]),
    msg("set_constraint_adjustment", 1, &[Uint]),
    msg("set_offset", 1, &[Int, Int]),
    msg("set_reactive", 3, &[]),
    msg("set_parent_size", 3, SIZE),
    msg("set_parent_configure", 3, &[Uint]),
];

const XDG_SURFACE_REQUESTS: &[MessageDesc] = &[
    destructor("destroy", 1),
    msg("get_toplevel", 1, &[NewId]),
    msg("get_popup", 1, &[NewId, OptObject, Object]),
    msg("set_window_geometry", 1, RECT),
    msg("ack_configure", 1, &[Uint]),
];
const XDG_SURFACE_EVENTS: &[MessageDesc] = &[msg("configure", 1, &[Uint])];

const TOPLEVEL_REQUESTS: &[MessageDesc] = &[
    destructor("destroy", 1),
    msg("set_parent", 1, &[OptObject]),
    msg("set_title", 1, &[Str]),
    msg("set_app_id", 1, &[Str]),
    msg("show_window_menu", 1, &[Object, Uint, Int, Int]),
    msg("move", 1, &[Object, Uint]),
    msg("resize", 1, &[Object, Uint, Uint]),
    msg("set_max_size", 1, SIZE),
    msg("set_min_size", 1, SIZE),
    msg("set_maximized", 1, &[]),
    msg("unset_maximized", 1, &[]),
    msg("set_fullscreen", 1, &[OptObject]),
    msg("unset_fullscreen", 1, &[]),
    msg("set_minimized", 1, &[]),
];
const TOPLEVEL_EVENTS: &[MessageDesc] = &[msg("configure", 1, &[Int, Int, Array]), msg("close", 1, &[])];

const POPUP_REQUESTS: &[MessageDesc] = &[
    destructor("destroy", 1),
    msg("grab", 1, &[Object, Uint]),
    msg("reposition", 3, &[Object, Uint]),
];
const POPUP_EVENTS: &[MessageDesc] = &[
    msg("configure", 1, RECT),
    msg("popup_done", 1, &[]),
    msg("repositioned", 3, &[Uint]),
];

/// Every interface implemented by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    Display,
    Registry,
    Callback,
    Compositor,
    Region,
    Surface,
    Shm,
    ShmPool,
    Buffer,
    Subcompositor,
    Subsurface,
    Seat,
    Pointer,
    Keyboard,
    Touch,
    XdgWmBase,
    XdgPositioner,
    XdgSurface,
    XdgToplevel,
    XdgPopup,
}

impl Interface {
    pub const ALL: [Interface; 20] = [
        Interface::Display,
        Interface::Registry,
        Interface::Callback,
        Interface::Compositor,
        Interface::Region,
        Interface::Surface,
        Interface::Shm,
        Interface::ShmPool,
        Interface::Buffer,
        Interface::Subcompositor,
        Interface::Subsurface,
        Interface::Seat,
        Interface::Pointer,
        Interface::Keyboard,
        Interface::Touch,
        Interface::XdgWmBase,
        Interface::XdgPositioner,
        Interface::XdgSurface,
        Interface::XdgToplevel,
        Interface::XdgPopup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Interface::Display => "wl_display",
            Interface::Registry => "wl_registry",
            Interface::Callback => "wl_callback",
            Interface::Compositor => "wl_compositor",
            Interface::Region => "wl_region",
            Interface::Surface => "wl_surface",
            Interface::Shm => "wl_shm",
            Interface::ShmPool => "wl_shm_pool",
            Interface::Buffer => "wl_buffer",
            Interface::Subcompositor => "wl_subcompositor",
            Interface::Subsurface => "wl_subsurface",
            Interface::Seat => "wl_seat",
            Interface::Pointer => "wl_pointer",
            Interface::Keyboard => "wl_keyboard",
            Interface::Touch => "wl_touch",
            Interface::XdgWmBase => "xdg_wm_base",
            Interface::XdgPositioner => "xdg_positioner",
            Interface::XdgSurface => "xdg_surface",
            Interface::XdgToplevel => "xdg_toplevel",
            Interface::XdgPopup => "xdg_popup",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Interface::ALL.into_iter().find(|iface| iface.name() == name)
    }

    /// Highest version the server implements
    pub fn max_version(&self) -> u32 {
        match self {
            Interface::Compositor | Interface::Surface => 6,
            Interface::Shm | Interface::ShmPool => 2,
            Interface::Seat | Interface::Pointer | Interface::Keyboard | Interface::Touch => 5,
            Interface::XdgWmBase
            | Interface::XdgPositioner
            | Interface::XdgSurface
            | Interface::XdgToplevel
            | Interface::XdgPopup => 3,
            _ => 1,
        }
    }

    pub fn requests(&self) -> &'static [MessageDesc] {
        match self {
            Interface::Display => DISPLAY_REQUESTS,
            Interface::Registry => REGISTRY_REQUESTS,
            Interface::Callback => &[],
            Interface::Compositor => COMPOSITOR_REQUESTS,
            Interface::Region => REGION_REQUESTS,
            Interface::Surface => SURFACE_REQUESTS,
            Interface::Shm => SHM_REQUESTS,
            Interface::ShmPool => SHM_POOL_REQUESTS,
            Interface::Buffer => BUFFER_REQUESTS,
            Interface::Subcompositor => SUBCOMPOSITOR_REQUESTS,
            Interface::Subsurface => SUBSURFACE_REQUESTS,
            Interface::Seat => SEAT_REQUESTS,
            Interface::Pointer => POINTER_REQUESTS,
            Interface::Keyboard => KEYBOARD_REQUESTS,
            Interface::Touch => TOUCH_REQUESTS,
            Interface::XdgWmBase => WM_BASE_REQUESTS,
            Interface::XdgPositioner => POSITIONER_REQUESTS,
            Interface::XdgSurface => XDG_SURFACE_REQUESTS,
            Interface::XdgToplevel => TOPLEVEL_REQUESTS,
            Interface::XdgPopup => POPUP_REQUESTS,
        }
    }

    pub fn events(&self) -> &'static [MessageDesc] {
        match self {
            Interface::Display => DISPLAY_EVENTS,
            Interface::Registry => REGISTRY_EVENTS,
            Interface::Callback => CALLBACK_EVENTS,
            Interface::Shm => SHM_EVENTS,
            Interface::Buffer => BUFFER_EVENTS,
            Interface::Surface => SURFACE_EVENTS,
            Interface::Seat => SEAT_EVENTS,
            Interface::Pointer => POINTER_EVENTS,
            Interface::Keyboard => KEYBOARD_EVENTS,
            Interface::Touch => TOUCH_EVENTS,
            Interface::XdgWmBase => WM_BASE_EVENTS,
            Interface::XdgSurface => XDG_SURFACE_EVENTS,
            Interface::XdgToplevel => TOPLEVEL_EVENTS,
            Interface::XdgPopup => POPUP_EVENTS,
            _ => &[],
        }
    }

    /// Request descriptor for `opcode`, if it exists at `version`
    pub fn request(&self, opcode: u16, version: u32) -> Option<&'static MessageDesc> {
        self.requests()
            .get(opcode as usize)
            .filter(|desc| desc.since <= version)
    }

    pub fn event(&self, opcode: u16) -> Option<&'static MessageDesc> {
        self.events().get(opcode as usize)
    }

    /// Interfaces advertised through wl_registry
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            Interface::Compositor
                | Interface::Shm
                | Interface::Subcompositor
                | Interface::Seat
                | Interface::XdgWmBase
        )
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for iface in Interface::ALL {
            assert_eq!(Interface::from_name(iface.name()), Some(iface));
        }
        assert_eq!(Interface::from_name("wl_output"), None);
    }

    #[test]
    fn test_request_respects_version() {
        // damage_buffer appeared in wl_surface version 4
        assert!(Interface::Surface.request(9, 3).is_none());
        assert_eq!(Interface::Surface.request(9, 4).map(|d| d.name), Some("damage_buffer"));
        assert!(Interface::Surface.request(11, 6).is_none());
    }

    #[test]
    fn test_message_since_never_exceeds_max_version() {
        for iface in Interface::ALL {
            for desc in iface.requests() {
                assert!(desc.since <= iface.max_version(), "{}.{}", iface, desc.name);
            }
        }
    }
}
