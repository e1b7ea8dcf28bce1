//! Core Wayland protocol types
//!
//! These types represent the fundamental data types used in the Wayland protocol.
//! They are kept minimal and close to the wire protocol for efficiency.

use std::fmt;

/// Wayland object ID. IDs are scoped to a single client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub const NULL: ObjectId = ObjectId(0);

    /// wl_display is always object 1
    pub const DISPLAY: ObjectId = ObjectId(1);

    /// First ID of the range reserved for server-created objects
    pub const SERVER_ID_BASE: u32 = 0xff00_0000;

    pub fn new(id: u32) -> Self {
        ObjectId(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Whether this ID lies in the server-allocated range
    pub fn is_server_side(&self) -> bool {
        self.0 >= Self::SERVER_ID_BASE
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client connection ID, assigned by the object registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl ClientId {
    pub fn new(id: u32) -> Self {
        ClientId(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Server-wide surface reference (owning client plus wl_surface object)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId {
    pub client: ClientId,
    pub object: ObjectId,
}

impl SurfaceId {
    pub fn new(client: ClientId, object: ObjectId) -> Self {
        SurfaceId { client, object }
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wl_surface@{}/{}", self.object, self.client)
    }
}

/// Server-wide buffer reference (owning client plus wl_buffer object)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId {
    pub client: ClientId,
    pub object: ObjectId,
}

impl BufferId {
    pub fn new(client: ClientId, object: ObjectId) -> Self {
        BufferId { client, object }
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wl_buffer@{}/{}", self.object, self.client)
    }
}

/// Seat ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeatId(pub u32);

impl SeatId {
    pub fn new(id: u32) -> Self {
        SeatId(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// Signed 24.8 fixed-point number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fixed(pub i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);

    pub fn from_raw(raw: i32) -> Self {
        Fixed(raw)
    }

    pub fn from_int(value: i32) -> Self {
        Fixed(value.saturating_mul(256))
    }

    pub fn from_f64(value: f64) -> Self {
        Fixed((value * 256.0).round() as i32)
    }

    pub fn raw(&self) -> i32 {
        self.0
    }

    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / 256.0
    }

    /// Integer part, rounded toward negative infinity
    pub fn to_int(&self) -> i32 {
        self.0 >> 8
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

/// Point in a floating coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// Smallest coordinate a rectangle edge is kept at
pub const COORD_MIN: i32 = i32::MIN / 2;
/// Largest coordinate a rectangle edge is kept at. Any rectangle with both
/// edges in `COORD_MIN..=COORD_MAX` has a width and height that fit an i32.
pub const COORD_MAX: i32 = i32::MAX / 2;

/// Clamp a coordinate into `COORD_MIN..=COORD_MAX`
pub fn clamp_coord(value: i64) -> i32 {
    value.clamp(COORD_MIN as i64, COORD_MAX as i64) as i32
}

/// Rectangle in integer coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(width: i32, height: i32) -> Self {
        Rect::new(0, 0, width, height)
    }

    /// Rectangle spanning `[x1, x2) x [y1, y2)`, with every edge clamped to
    /// the coordinate range
    pub fn from_edges(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        let (x1, y1) = (clamp_coord(x1), clamp_coord(y1));
        let (x2, y2) = (clamp_coord(x2), clamp_coord(y2));
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// The part of this rectangle inside the coordinate range
    pub fn clamped(&self) -> Rect {
        Rect::from_edges(self.x as i64, self.y as i64, self.right(), self.bottom())
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn contains_point(&self, point: Point) -> bool {
        !self.is_empty()
            && point.x >= self.x as f64
            && point.y >= self.y as f64
            && point.x < self.right() as f64
            && point.y < self.bottom() as f64
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.x >= self.x
                && other.y >= self.y
                && other.right() <= self.right()
                && other.bottom() <= self.bottom())
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x) as i64;
        let y1 = self.y.max(other.y) as i64;
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Rect::new(
            x1 as i32,
            y1 as i32,
            clamp_i32(x2 - x1),
            clamp_i32(y2 - y1),
        ))
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    /// True when the rectangles overlap or share an edge
    pub fn touches(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && (self.x as i64) <= other.right()
            && (other.x as i64) <= self.right()
            && (self.y as i64) <= other.bottom()
            && (other.y as i64) <= self.bottom()
    }

    /// Smallest rectangle covering both
    pub fn bounding_box(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());
        Rect::new(
            x1,
            y1,
            clamp_i32(x2 - x1 as i64),
            clamp_i32(y2 - y1 as i64),
        )
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Buffer transform (wl_output.transform)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Transform {
    #[default]
    Normal = 0,
    Rotate90 = 1,
    Rotate180 = 2,
    Rotate270 = 3,
    Flipped = 4,
    Flipped90 = 5,
    Flipped180 = 6,
    Flipped270 = 7,
}

impl Transform {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Transform::Normal),
            1 => Some(Transform::Rotate90),
            2 => Some(Transform::Rotate180),
            3 => Some(Transform::Rotate270),
            4 => Some(Transform::Flipped),
            5 => Some(Transform::Flipped90),
            6 => Some(Transform::Flipped180),
            7 => Some(Transform::Flipped270),
            _ => None,
        }
    }

    /// Whether width and height trade places under this transform
    pub fn swaps_axes(&self) -> bool {
        matches!(
            self,
            Transform::Rotate90 | Transform::Rotate270 | Transform::Flipped90 | Transform::Flipped270
        )
    }
}

/// Pixel formats understood by the shm implementation (wl_shm.format)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Argb8888,
    Xrgb8888,
    Abgr8888,
    Xbgr8888,
    Rgb565,
}

const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | (b as u32) << 8 | (c as u32) << 16 | (d as u32) << 24
}

impl PixelFormat {
    /// Wire code. ARGB/XRGB use the legacy values 0 and 1, the rest are DRM fourcc codes.
    pub fn code(&self) -> u32 {
        match self {
            PixelFormat::Argb8888 => 0,
            PixelFormat::Xrgb8888 => 1,
            PixelFormat::Abgr8888 => fourcc(b'A', b'B', b'2', b'4'),
            PixelFormat::Xbgr8888 => fourcc(b'X', b'B', b'2', b'4'),
            PixelFormat::Rgb565 => fourcc(b'R', b'G', b'1', b'6'),
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        [
            PixelFormat::Argb8888,
            PixelFormat::Xrgb8888,
            PixelFormat::Abgr8888,
            PixelFormat::Xbgr8888,
            PixelFormat::Rgb565,
        ]
        .into_iter()
        .find(|format| format.code() == code)
    }

    pub fn bytes_per_pixel(&self) -> i32 {
        match self {
            PixelFormat::Rgb565 => 2,
            _ => 4,
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, PixelFormat::Argb8888 | PixelFormat::Abgr8888)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Argb8888 => "ARGB8888",
            PixelFormat::Xrgb8888 => "XRGB8888",
            PixelFormat::Abgr8888 => "ABGR8888",
            PixelFormat::Xbgr8888 => "XBGR8888",
            PixelFormat::Rgb565 => "RGB565",
        };
        f.write_str(name)
    }
}

/// Timestamp in milliseconds, as carried by input events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp(pub u32);

impl Timestamp {
    pub fn new(ms: u32) -> Self {
        Timestamp(ms)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// Monotonic serial generator shared by input and shell events
#[derive(Debug, Default)]
pub struct SerialCounter {
    next: u32,
}

impl SerialCounter {
    pub fn new() -> Self {
        SerialCounter { next: 1 }
    }

    pub fn next_serial(&mut self) -> u32 {
        let serial = self.next;
        self.next = self.next.wrapping_add(1).max(1);
        serial
    }
}
