//! Typed Wayland requests
//!
//! Decoded argument lists are turned into one enum per interface so the
//! dispatcher can match exhaustively on what a client asked for.

use super::*;
use std::os::fd::OwnedFd;

/// A decoded request, tagged by interface
#[derive(Debug)]
pub enum Request {
    Display(DisplayRequest),
    Registry(RegistryRequest),
    Compositor(CompositorRequest),
    Region(RegionRequest),
    Surface(SurfaceRequest),
    Shm(ShmRequest),
    ShmPool(ShmPoolRequest),
    Buffer(BufferRequest),
    Subcompositor(SubcompositorRequest),
    Subsurface(SubsurfaceRequest),
    Seat(SeatRequest),
    Pointer(PointerRequest),
    Keyboard(KeyboardRequest),
    Touch(TouchRequest),
    XdgWmBase(WmBaseRequest),
    XdgPositioner(PositionerRequest),
    XdgSurface(XdgSurfaceRequest),
    XdgToplevel(ToplevelRequest),
    XdgPopup(PopupRequest),
}

#[derive(Debug)]
pub enum DisplayRequest {
    Sync { callback: ObjectId },
    GetRegistry { registry: ObjectId },
}

#[derive(Debug)]
pub enum RegistryRequest {
    Bind {
        name: u32,
        interface: String,
        version: u32,
        id: ObjectId,
    },
}

#[derive(Debug)]
pub enum CompositorRequest {
    CreateSurface { id: ObjectId },
    CreateRegion { id: ObjectId },
}

#[derive(Debug)]
pub enum RegionRequest {
    Destroy,
    Add(Rect),
    Subtract(Rect),
}

#[derive(Debug)]
pub enum SurfaceRequest {
    Destroy,
    Attach {
        buffer: Option<ObjectId>,
        x: i32,
        y: i32,
    },
    Damage(Rect),
    Frame { callback: ObjectId },
    SetOpaqueRegion { region: Option<ObjectId> },
    SetInputRegion { region: Option<ObjectId> },
    Commit,
    SetBufferTransform { transform: i32 },
    SetBufferScale { scale: i32 },
    DamageBuffer(Rect),
    Offset { x: i32, y: i32 },
}

#[derive(Debug)]
pub enum ShmRequest {
    CreatePool { id: ObjectId, fd: OwnedFd, size: i32 },
    Release,
}

#[derive(Debug)]
pub enum ShmPoolRequest {
    CreateBuffer {
        id: ObjectId,
        offset: i32,
        width: i32,
        height: i32,
        stride: i32,
        format: u32,
    },
    Destroy,
    Resize { size: i32 },
}

#[derive(Debug)]
pub enum BufferRequest {
    Destroy,
}

#[derive(Debug)]
pub enum SubcompositorRequest {
    Destroy,
    GetSubsurface {
        id: ObjectId,
        surface: ObjectId,
        parent: ObjectId,
    },
}

#[derive(Debug)]
pub enum SubsurfaceRequest {
    Destroy,
    SetPosition { x: i32, y: i32 },
    PlaceAbove { sibling: ObjectId },
    PlaceBelow { sibling: ObjectId },
    SetSync,
    SetDesync,
}

#[derive(Debug)]
pub enum SeatRequest {
    GetPointer { id: ObjectId },
    GetKeyboard { id: ObjectId },
    GetTouch { id: ObjectId },
    Release,
}

#[derive(Debug)]
pub enum PointerRequest {
    SetCursor {
        serial: u32,
        surface: Option<ObjectId>,
        hotspot_x: i32,
        hotspot_y: i32,
    },
    Release,
}

#[derive(Debug)]
pub enum KeyboardRequest {
    Release,
}

#[derive(Debug)]
pub enum TouchRequest {
    Release,
}

#[derive(Debug)]
pub enum WmBaseRequest {
    Destroy,
    CreatePositioner { id: ObjectId },
    GetXdgSurface { id: ObjectId, surface: ObjectId },
    Pong { serial: u32 },
}

#[derive(Debug)]
pub enum PositionerRequest {
    Destroy,
    SetSize { width: i32, height: i32 },
    SetAnchorRect(Rect),
    SetAnchor(u32),
    SetGravity(u32),
    SetConstraintAdjustment(u32),
    SetOffset { x: i32, y: i32 },
    SetReactive,
    SetParentSize { width: i32, height: i32 },
    SetParentConfigure { serial: u32 },
}

#[derive(Debug)]
pub enum XdgSurfaceRequest {
    Destroy,
    GetToplevel { id: ObjectId },
    GetPopup {
        id: ObjectId,
        parent: Option<ObjectId>,
        positioner: ObjectId,
    },
    SetWindowGeometry(Rect),
    AckConfigure { serial: u32 },
}

#[derive(Debug)]
pub enum ToplevelRequest {
    Destroy,
    SetParent { parent: Option<ObjectId> },
    SetTitle { title: String },
    SetAppId { app_id: String },
    ShowWindowMenu {
        seat: ObjectId,
        serial: u32,
        x: i32,
        y: i32,
    },
    Move { seat: ObjectId, serial: u32 },
    Resize {
        seat: ObjectId,
        serial: u32,
        edges: u32,
    },
    SetMaxSize { width: i32, height: i32 },
    SetMinSize { width: i32, height: i32 },
    SetMaximized,
    UnsetMaximized,
    SetFullscreen { output: Option<ObjectId> },
    UnsetFullscreen,
    SetMinimized,
}

#[derive(Debug)]
pub enum PopupRequest {
    Destroy,
    Grab { seat: ObjectId, serial: u32 },
    Reposition { positioner: ObjectId, token: u32 },
}

impl Request {
    /// Build a typed request from arguments decoded with the signature of
    /// `interface.request(opcode, _)`.
    pub fn from_message(
        interface: Interface,
        opcode: u16,
        args: Vec<Argument>,
    ) -> Result<Request, WireError> {
        let mut r = ArgReader::new(args);
        let request = match interface {
            Interface::Display => Request::Display(match opcode {
                0 => DisplayRequest::Sync {
                    callback: r.new_id()?,
                },
                _ => DisplayRequest::GetRegistry {
                    registry: r.new_id()?,
                },
            }),
            Interface::Registry => Request::Registry(RegistryRequest::Bind {
                name: r.uint()?,
                interface: r.string()?,
                version: r.uint()?,
                id: r.new_id()?,
            }),
            Interface::Callback => {
                return Err(WireError::ArgumentMismatch {
                    expected: "request",
                    found: "wl_callback",
                })
            }
            Interface::Compositor => Request::Compositor(match opcode {
                0 => CompositorRequest::CreateSurface { id: r.new_id()? },
                _ => CompositorRequest::CreateRegion { id: r.new_id()? },
            }),
            Interface::Region => Request::Region(match opcode {
                0 => RegionRequest::Destroy,
                1 => RegionRequest::Add(r.rect()?),
                _ => RegionRequest::Subtract(r.rect()?),
            }),
            Interface::Surface => Request::Surface(match opcode {
                0 => SurfaceRequest::Destroy,
                1 => SurfaceRequest::Attach {
                    buffer: r.opt_object()?,
                    x: r.int()?,
                    y: r.int()?,
                },
                2 => SurfaceRequest::Damage(r.rect()?),
                3 => SurfaceRequest::Frame {
                    callback: r.new_id()?,
                },
                4 => SurfaceRequest::SetOpaqueRegion {
                    region: r.opt_object()?,
                },
                5 => SurfaceRequest::SetInputRegion {
                    region: r.opt_object()?,
                },
                6 => SurfaceRequest::Commit,
                7 => SurfaceRequest::SetBufferTransform { transform: r.int()? },
                8 => SurfaceRequest::SetBufferScale { scale: r.int()? },
                9 => SurfaceRequest::DamageBuffer(r.rect()?),
                _ => SurfaceRequest::Offset {
                    x: r.int()?,
                    y: r.int()?,
                },
            }),
            Interface::Shm => Request::Shm(match opcode {
                0 => ShmRequest::CreatePool {
                    id: r.new_id()?,
                    fd: r.fd()?,
                    size: r.int()?,
                },
                _ => ShmRequest::Release,
            }),
            Interface::ShmPool => Request::ShmPool(match opcode {
                0 => ShmPoolRequest::CreateBuffer {
                    id: r.new_id()?,
                    offset: r.int()?,
                    width: r.int()?,
                    height: r.int()?,
                    stride: r.int()?,
                    format: r.uint()?,
                },
                1 => ShmPoolRequest::Destroy,
                _ => ShmPoolRequest::Resize { size: r.int()? },
            }),
            Interface::Buffer => Request::Buffer(BufferRequest::Destroy),
            Interface::Subcompositor => Request::Subcompositor(match opcode {
                0 => SubcompositorRequest::Destroy,
                _ => SubcompositorRequest::GetSubsurface {
                    id: r.new_id()?,
                    surface: r.object()?,
                    parent: r.object()?,
                },
            }),
            Interface::Subsurface => Request::Subsurface(match opcode {
                0 => SubsurfaceRequest::Destroy,
                1 => SubsurfaceRequest::SetPosition {
                    x: r.int()?,
                    y: r.int()?,
                },
                2 => SubsurfaceRequest::PlaceAbove {
                    sibling: r.object()?,
                },
                3 => SubsurfaceRequest::PlaceBelow {
                    sibling: r.object()?,
                },
                4 => SubsurfaceRequest::SetSync,
                _ => SubsurfaceRequest::SetDesync,
            }),
            Interface::Seat => Request::Seat(match opcode {
                0 => SeatRequest::GetPointer { id: r.new_id()? },
                1 => SeatRequest::GetKeyboard { id: r.new_id()? },
                2 => SeatRequest::GetTouch { id: r.new_id()? },
                _ => SeatRequest::Release,
            }),
            Interface::Pointer => Request::Pointer(match opcode {
                0 => PointerRequest::SetCursor {
                    serial: r.uint()?,
                    surface: r.opt_object()?,
                    hotspot_x: r.int()?,
                    hotspot_y: r.int()?,
                },
                _ => PointerRequest::Release,
            }),
            Interface::Keyboard => Request::Keyboard(KeyboardRequest::Release),
            Interface::Touch => Request::Touch(TouchRequest::Release),
            Interface::XdgWmBase => Request::XdgWmBase(match opcode {
                0 => WmBaseRequest::Destroy,
                1 => WmBaseRequest::CreatePositioner { id: r.new_id()? },
                2 => WmBaseRequest::GetXdgSurface {
                    id: r.new_id()?,
                    surface: r.object()?,
                },
                _ => WmBaseRequest::Pong { serial: r.uint()? },
            }),
            Interface::XdgPositioner => Request::XdgPositioner(match opcode {
                0 => PositionerRequest::Destroy,
                1 => PositionerRequest::SetSize {
                    width: r.int()?,
                    height: r.int()?,
                },
                2 => PositionerRequest::SetAnchorRect(r.rect()?),
                3 => PositionerRequest::SetAnchor(r.uint()?),
                4 => PositionerRequest::SetGravity(r.uint()?),
                5 => PositionerRequest::SetConstraintAdjustment(r.uint()?),
                6 => PositionerRequest::SetOffset {
                    x: r.int()?,
                    y: r.int()?,
                },
                7 => PositionerRequest::SetReactive,
                8 => PositionerRequest::SetParentSize {
                    width: r.int()?,
                    height: r.int()?,
                },
                _ => PositionerRequest::SetParentConfigure { serial: r.uint()? },
            }),
            Interface::XdgSurface => Request::XdgSurface(match opcode {
                0 => XdgSurfaceRequest::Destroy,
                1 => XdgSurfaceRequest::GetToplevel { id: r.new_id()? },
                2 => XdgSurfaceRequest::GetPopup {
                    id: r.new_id()?,
                    parent: r.opt_object()?,
                    positioner: r.object()?,
                },
                3 => XdgSurfaceRequest::SetWindowGeometry(r.rect()?),
                _ => XdgSurfaceRequest::AckConfigure { serial: r.uint()? },
            }),
            Interface::XdgToplevel => Request::XdgToplevel(match opcode {
                0 => ToplevelRequest::Destroy,
                1 => ToplevelRequest::SetParent {
                    parent: r.opt_object()?,
                },
                2 => ToplevelRequest::SetTitle { title: r.string()? },
                3 => ToplevelRequest::SetAppId { app_id: r.string()? },
                4 => ToplevelRequest::ShowWindowMenu {
                    seat: r.object()?,
                    serial: r.uint()?,
                    x: r.int()?,
                    y: r.int()?,
                },
                5 => ToplevelRequest::Move {
                    seat: r.object()?,
                    serial: r.uint()?,
                },
                6 => ToplevelRequest::Resize {
                    seat: r.object()?,
                    serial: r.uint()?,
                    edges: r.uint()?,
                },
                7 => ToplevelRequest::SetMaxSize {
                    width: r.int()?,
                    height: r.int()?,
                },
                8 => ToplevelRequest::SetMinSize {
                    width: r.int()?,
                    height: r.int()?,
                },
                9 => ToplevelRequest::SetMaximized,
                10 => ToplevelRequest::UnsetMaximized,
                11 => ToplevelRequest::SetFullscreen {
                    output: r.opt_object()?,
                },
                12 => ToplevelRequest::UnsetFullscreen,
                _ => ToplevelRequest::SetMinimized,
            }),
            Interface::XdgPopup => Request::XdgPopup(match opcode {
                0 => PopupRequest::Destroy,
                1 => PopupRequest::Grab {
                    seat: r.object()?,
                    serial: r.uint()?,
                },
                _ => PopupRequest::Reposition {
                    positioner: r.object()?,
                    token: r.uint()?,
                },
            }),
        };
        Ok(request)
    }
}

/// Helper to pull typed values out of a decoded argument list
struct ArgReader {
    args: std::vec::IntoIter<Argument>,
}

impl ArgReader {
    fn new(args: Vec<Argument>) -> Self {
        ArgReader {
            args: args.into_iter(),
        }
    }

    fn next(&mut self, expected: &'static str) -> Result<Argument, WireError> {
        self.args.next().ok_or(WireError::ArgumentMismatch {
            expected,
            found: "nothing",
        })
    }

    fn int(&mut self) -> Result<i32, WireError> {
        match self.next("int")? {
            Argument::Int(value) => Ok(value),
            other => Err(mismatch("int", &other)),
        }
    }

    fn uint(&mut self) -> Result<u32, WireError> {
        match self.next("uint")? {
            Argument::Uint(value) => Ok(value),
            other => Err(mismatch("uint", &other)),
        }
    }

    fn rect(&mut self) -> Result<Rect, WireError> {
        Ok(Rect::new(self.int()?, self.int()?, self.int()?, self.int()?))
    }

    fn string(&mut self) -> Result<String, WireError> {
        match self.next("string")? {
            Argument::Str(Some(value)) => Ok(value),
            Argument::Str(None) => Err(WireError::UnexpectedNull { kind: "string" }),
            other => Err(mismatch("string", &other)),
        }
    }

    fn object(&mut self) -> Result<ObjectId, WireError> {
        self.opt_object()?
            .ok_or(WireError::UnexpectedNull { kind: "object" })
    }

    fn opt_object(&mut self) -> Result<Option<ObjectId>, WireError> {
        match self.next("object")? {
            Argument::Object(value) => Ok(value),
            other => Err(mismatch("object", &other)),
        }
    }

    fn new_id(&mut self) -> Result<ObjectId, WireError> {
        match self.next("new_id")? {
            Argument::NewId(value) => Ok(value),
            other => Err(mismatch("new_id", &other)),
        }
    }

    fn fd(&mut self) -> Result<OwnedFd, WireError> {
        match self.next("fd")? {
            Argument::Fd(fd) => Ok(fd),
            other => Err(mismatch("fd", &other)),
        }
    }
}

fn mismatch(expected: &'static str, found: &Argument) -> WireError {
    WireError::ArgumentMismatch {
        expected,
        found: found.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_attach() {
        let request = Request::from_message(
            Interface::Surface,
            1,
            vec![
                Argument::Object(Some(ObjectId::new(7))),
                Argument::Int(0),
                Argument::Int(0),
            ],
        )
        .unwrap();
        match request {
            Request::Surface(SurfaceRequest::Attach { buffer, x, y }) => {
                assert_eq!(buffer, Some(ObjectId::new(7)));
                assert_eq!((x, y), (0, 0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_registry_bind() {
        let request = Request::from_message(
            Interface::Registry,
            0,
            vec![
                Argument::Uint(3),
                Argument::Str(Some("wl_seat".to_string())),
                Argument::Uint(5),
                Argument::NewId(ObjectId::new(4)),
            ],
        )
        .unwrap();
        assert!(matches!(
            request,
            Request::Registry(RegistryRequest::Bind { name: 3, version: 5, ref interface, .. })
                if interface == "wl_seat"
        ));
    }

    #[test]
    fn test_argument_mismatch_is_reported() {
        let err = Request::from_message(Interface::Surface, 2, vec![Argument::Uint(1)]).unwrap_err();
        assert_eq!(
            err,
            WireError::ArgumentMismatch {
                expected: "int",
                found: "uint"
            }
        );
    }
}
