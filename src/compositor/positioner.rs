//! xdg_positioner state and popup placement

use crate::protocol::{clamp_coord, Rect};

/// xdg_positioner.anchor and xdg_positioner.gravity share these values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum Edge {
    #[default]
    None = 0,
    Top = 1,
    Bottom = 2,
    Left = 3,
    Right = 4,
    TopLeft = 5,
    BottomLeft = 6,
    TopRight = 7,
    BottomRight = 8,
}

impl Edge {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Edge::None),
            1 => Some(Edge::Top),
            2 => Some(Edge::Bottom),
            3 => Some(Edge::Left),
            4 => Some(Edge::Right),
            5 => Some(Edge::TopLeft),
            6 => Some(Edge::BottomLeft),
            7 => Some(Edge::TopRight),
            8 => Some(Edge::BottomRight),
            _ => None,
        }
    }

    fn has_left(&self) -> bool {
        matches!(self, Edge::Left | Edge::TopLeft | Edge::BottomLeft)
    }

    fn has_right(&self) -> bool {
        matches!(self, Edge::Right | Edge::TopRight | Edge::BottomRight)
    }

    fn has_top(&self) -> bool {
        matches!(self, Edge::Top | Edge::TopLeft | Edge::TopRight)
    }

    fn has_bottom(&self) -> bool {
        matches!(self, Edge::Bottom | Edge::BottomLeft | Edge::BottomRight)
    }

    fn flip_x(&self) -> Edge {
        match self {
            Edge::Left => Edge::Right,
            Edge::Right => Edge::Left,
            Edge::TopLeft => Edge::TopRight,
            Edge::TopRight => Edge::TopLeft,
            Edge::BottomLeft => Edge::BottomRight,
            Edge::BottomRight => Edge::BottomLeft,
            other => *other,
        }
    }

    fn flip_y(&self) -> Edge {
        match self {
            Edge::Top => Edge::Bottom,
            Edge::Bottom => Edge::Top,
            Edge::TopLeft => Edge::BottomLeft,
            Edge::BottomLeft => Edge::TopLeft,
            Edge::TopRight => Edge::BottomRight,
            Edge::BottomRight => Edge::TopRight,
            other => *other,
        }
    }
}

/// xdg_positioner.constraint_adjustment bits
pub mod adjustment {
    pub const SLIDE_X: u32 = 1;
    pub const SLIDE_Y: u32 = 2;
    pub const FLIP_X: u32 = 4;
    pub const FLIP_Y: u32 = 8;
    pub const RESIZE_X: u32 = 16;
    pub const RESIZE_Y: u32 = 32;
    pub const ALL: u32 = 63;
}

/// Accumulated xdg_positioner state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Positioner {
    pub size: (i32, i32),
    pub anchor_rect: Option<Rect>,
    pub anchor: Edge,
    pub gravity: Edge,
    pub constraint_adjustment: u32,
    pub offset: (i32, i32),
    pub reactive: bool,
    pub parent_size: Option<(i32, i32)>,
    pub parent_configure: Option<u32>,
}

impl Positioner {
    /// Size and anchor rectangle are mandatory before use
    pub fn is_complete(&self) -> bool {
        self.size.0 > 0 && self.size.1 > 0 && self.anchor_rect.is_some()
    }

    /// Popup geometry relative to the parent's window geometry, ignoring
    /// constraints
    pub fn geometry(&self) -> Rect {
        self.place(self.anchor, self.gravity)
    }

    fn place(&self, anchor: Edge, gravity: Edge) -> Rect {
        let rect = self.anchor_rect.unwrap_or_default();
        let (width, height) = (self.size.0 as i64, self.size.1 as i64);

        let anchor_x = if anchor.has_left() {
            rect.x as i64
        } else if anchor.has_right() {
            rect.right()
        } else {
            rect.x as i64 + rect.width as i64 / 2
        };
        let anchor_y = if anchor.has_top() {
            rect.y as i64
        } else if anchor.has_bottom() {
            rect.bottom()
        } else {
            rect.y as i64 + rect.height as i64 / 2
        };

        let x = if gravity.has_left() {
            anchor_x - width
        } else if gravity.has_right() {
            anchor_x
        } else {
            anchor_x - width / 2
        };
        let y = if gravity.has_top() {
            anchor_y - height
        } else if gravity.has_bottom() {
            anchor_y
        } else {
            anchor_y - height / 2
        };

        Rect::new(
            clamp_coord(x + self.offset.0 as i64),
            clamp_coord(y + self.offset.1 as i64),
            self.size.0,
            self.size.1,
        )
    }

    /// Geometry after applying the allowed constraint adjustments so that the
    /// popup stays inside `bounds` (same coordinate space as the result)
    pub fn constrained_geometry(&self, bounds: Rect) -> Rect {
        let mut geometry = self.geometry();
        if bounds.is_empty() || bounds.contains_rect(&geometry) {
            return geometry;
        }
        let adjust = self.constraint_adjustment;

        // Horizontal axis
        if !fits_x(&geometry, &bounds) && adjust & adjustment::FLIP_X != 0 {
            let flipped = self.place(self.anchor.flip_x(), self.gravity.flip_x());
            if fits_x(&flipped, &bounds) {
                geometry.x = flipped.x;
            }
        }
        if !fits_x(&geometry, &bounds) && adjust & adjustment::SLIDE_X != 0 {
            if geometry.right() > bounds.right() {
                geometry.x = (bounds.right() - geometry.width as i64) as i32;
            }
            if geometry.x < bounds.x {
                geometry.x = bounds.x;
            }
        }
        if !fits_x(&geometry, &bounds) && adjust & adjustment::RESIZE_X != 0 {
            if let Some(visible) = geometry.intersection(&bounds) {
                geometry.x = visible.x;
                geometry.width = visible.width;
            }
        }

        // Vertical axis
        if !fits_y(&geometry, &bounds) && adjust & adjustment::FLIP_Y != 0 {
            let flipped = self.place(self.anchor.flip_y(), self.gravity.flip_y());
            if fits_y(&flipped, &bounds) {
                geometry.y = flipped.y;
            }
        }
        if !fits_y(&geometry, &bounds) && adjust & adjustment::SLIDE_Y != 0 {
            if geometry.bottom() > bounds.bottom() {
                geometry.y = (bounds.bottom() - geometry.height as i64) as i32;
            }
            if geometry.y < bounds.y {
                geometry.y = bounds.y;
            }
        }
        if !fits_y(&geometry, &bounds) && adjust & adjustment::RESIZE_Y != 0 {
            if let Some(visible) = geometry.intersection(&bounds) {
                geometry.y = visible.y;
                geometry.height = visible.height;
            }
        }

        geometry
    }
}

fn fits_x(geometry: &Rect, bounds: &Rect) -> bool {
    geometry.x >= bounds.x && geometry.right() <= bounds.right()
}

fn fits_y(geometry: &Rect, bounds: &Rect) -> bool {
    geometry.y >= bounds.y && geometry.bottom() <= bounds.bottom()
}
