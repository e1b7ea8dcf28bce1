//! Surface state
//!
//! A surface accumulates requests in its pending state; commit moves them to
//! the current state (or, for synchronized subsurfaces, to a cached state that
//! is applied together with the parent).

use super::positioner::Positioner;
use super::region::{DamageSet, Region};
use crate::protocol::*;

/// Pending buffer change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAssignment {
    /// wl_surface.attach with a null buffer
    Removed,
    New(ObjectId),
}

/// Double-buffered state accumulated between commits
#[derive(Debug, Clone, Default)]
pub struct SurfaceState {
    /// `None` leaves the current buffer untouched
    pub buffer: Option<BufferAssignment>,
    pub offset: (i32, i32),
    /// Damage in surface-local coordinates
    pub damage: DamageSet,
    /// Damage in buffer coordinates
    pub buffer_damage: DamageSet,
    pub transform: Option<Transform>,
    pub scale: Option<i32>,
    /// `Some(None)` resets the input region to infinite
    pub input_region: Option<Option<Region>>,
    pub opaque_region: Option<Option<Region>>,
    pub frame_callbacks: Vec<ObjectId>,
    pub window_geometry: Option<Rect>,
}

impl SurfaceState {
    pub fn attached_buffer(&self) -> Option<ObjectId> {
        match self.buffer {
            Some(BufferAssignment::New(id)) => Some(id),
            _ => None,
        }
    }

    /// Fold a newer state on top of this one
    pub fn merge(&mut self, newer: SurfaceState) {
        if newer.buffer.is_some() {
            self.buffer = newer.buffer;
        }
        self.offset.0 += newer.offset.0;
        self.offset.1 += newer.offset.1;
        self.damage.extend(&newer.damage);
        self.buffer_damage.extend(&newer.buffer_damage);
        if newer.transform.is_some() {
            self.transform = newer.transform;
        }
        if newer.scale.is_some() {
            self.scale = newer.scale;
        }
        if newer.input_region.is_some() {
            self.input_region = newer.input_region;
        }
        if newer.opaque_region.is_some() {
            self.opaque_region = newer.opaque_region;
        }
        if newer.window_geometry.is_some() {
            self.window_geometry = newer.window_geometry;
        }
        self.frame_callbacks.extend(newer.frame_callbacks);
    }
}

/// Committed state used for composition
#[derive(Debug, Clone)]
pub struct CurrentState {
    pub buffer: Option<ObjectId>,
    pub buffer_size: (i32, i32),
    pub transform: Transform,
    pub scale: i32,
    /// Surface-local size derived from buffer size, scale and transform
    pub size: (i32, i32),
    /// Damage of the last commit, surface-local, clipped to the surface
    pub damage: Vec<Rect>,
    /// `None` means infinite
    pub input_region: Option<Region>,
    pub opaque_region: Option<Region>,
    pub frame_callbacks: Vec<ObjectId>,
    pub window_geometry: Option<Rect>,
}

impl Default for CurrentState {
    fn default() -> Self {
        CurrentState {
            buffer: None,
            buffer_size: (0, 0),
            transform: Transform::Normal,
            scale: 1,
            size: (0, 0),
            damage: Vec::new(),
            input_region: None,
            opaque_region: None,
            frame_callbacks: Vec::new(),
            window_geometry: None,
        }
    }
}

impl CurrentState {
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.size.0, self.size.1)
    }

    /// Whether a surface-local point accepts input
    pub fn accepts_input(&self, local: Point) -> bool {
        if !self.bounds().contains_point(local) {
            return false;
        }
        match &self.input_region {
            None => true,
            Some(region) => region.contains_point(local),
        }
    }
}

/// Roles a surface can take; a surface keeps its role for life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Toplevel,
    Popup,
    Cursor,
    Subsurface,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Toplevel => "xdg_toplevel",
            RoleKind::Popup => "xdg_popup",
            RoleKind::Cursor => "cursor",
            RoleKind::Subsurface => "wl_subsurface",
        }
    }
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subsurface role data
#[derive(Debug, Clone)]
pub struct SubsurfaceRole {
    /// wl_subsurface object; `None` once it was destroyed
    pub object: Option<ObjectId>,
    /// `None` once the parent surface was destroyed
    pub parent: Option<ObjectId>,
    pub sync: bool,
    pub position: (i32, i32),
    /// Applied on the parent's next commit
    pub pending_position: Option<(i32, i32)>,
}

/// Toplevel role data
#[derive(Debug, Clone, Default)]
pub struct ToplevelRole {
    pub object: Option<ObjectId>,
    pub title: Option<String>,
    pub app_id: Option<String>,
    pub parent: Option<ObjectId>,
    /// Size sent with the last configure; 0 lets the client decide
    pub size: (i32, i32),
    pub min_size: (i32, i32),
    pub max_size: (i32, i32),
    pub maximized: bool,
    pub fullscreen: bool,
    pub minimized: bool,
}

/// Popup role data
#[derive(Debug, Clone)]
pub struct PopupRole {
    pub object: Option<ObjectId>,
    /// Parent wl_surface
    pub parent: Option<ObjectId>,
    pub positioner: Positioner,
    /// Position relative to the parent surface
    pub geometry: Rect,
    pub grabbed: bool,
    pub dismissed: bool,
}

/// Role data, one variant per role
#[derive(Debug, Clone)]
pub enum Role {
    Toplevel(ToplevelRole),
    Popup(PopupRole),
    Cursor,
    Subsurface(SubsurfaceRole),
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Toplevel(_) => RoleKind::Toplevel,
            Role::Popup(_) => RoleKind::Popup,
            Role::Cursor => RoleKind::Cursor,
            Role::Subsurface(_) => RoleKind::Subsurface,
        }
    }

    /// The role object currently backing the role, if any
    pub fn object(&self) -> Option<ObjectId> {
        match self {
            Role::Toplevel(toplevel) => toplevel.object,
            Role::Popup(popup) => popup.object,
            Role::Cursor => None,
            Role::Subsurface(sub) => sub.object,
        }
    }
}

/// xdg_surface state attached to a wl_surface
#[derive(Debug, Clone)]
pub struct XdgState {
    /// xdg_wm_base the xdg_surface was created from
    pub wm_base: ObjectId,
    /// xdg_surface object; `None` once destroyed
    pub object: Option<ObjectId>,
    /// Configure serials sent and not yet acknowledged, oldest first
    pub pending_serials: Vec<u32>,
    pub last_acked: Option<u32>,
    /// Whether the initial (buffer-less) commit happened
    pub initial_commit: bool,
}

impl XdgState {
    pub fn new(wm_base: ObjectId, object: ObjectId) -> Self {
        XdgState {
            wm_base,
            object: Some(object),
            pending_serials: Vec::new(),
            last_acked: None,
            initial_commit: false,
        }
    }

    /// Forget the configure sequence, as when the role object goes away
    pub fn reset(&mut self) {
        self.pending_serials.clear();
        self.last_acked = None;
        self.initial_commit = false;
    }

    pub fn is_configured(&self) -> bool {
        self.last_acked.is_some()
    }
}

/// A wl_surface
#[derive(Debug)]
pub struct Surface {
    pub id: SurfaceId,
    pub version: u32,
    pub pending: SurfaceState,
    /// Commit held back by a synchronized subsurface
    pub cached: Option<SurfaceState>,
    pub current: CurrentState,
    pub role: Option<Role>,
    pub xdg: Option<XdgState>,
    /// Own id plus child subsurfaces, bottom to top
    pub stack: Vec<ObjectId>,
    /// Reordering requested with place_above/place_below
    pub pending_stack: Option<Vec<ObjectId>>,
    /// Position for root surfaces, in global coordinates
    pub position: (i32, i32),
    /// Whether the placement policy positioned the surface already
    pub placed: bool,
    pub mapped: bool,
    pub presentable: bool,
    pub commits: u64,
}

impl Surface {
    pub fn new(id: SurfaceId, version: u32) -> Self {
        Surface {
            id,
            version,
            pending: SurfaceState::default(),
            cached: None,
            current: CurrentState::default(),
            role: None,
            xdg: None,
            stack: vec![id.object],
            pending_stack: None,
            position: (0, 0),
            placed: false,
            mapped: false,
            presentable: true,
            commits: 0,
        }
    }

    pub fn role_kind(&self) -> Option<RoleKind> {
        self.role.as_ref().map(|role| role.kind())
    }

    pub fn subsurface(&self) -> Option<&SubsurfaceRole> {
        match &self.role {
            Some(Role::Subsurface(sub)) => Some(sub),
            _ => None,
        }
    }

    pub fn subsurface_mut(&mut self) -> Option<&mut SubsurfaceRole> {
        match &mut self.role {
            Some(Role::Subsurface(sub)) => Some(sub),
            _ => None,
        }
    }

    pub fn toplevel(&self) -> Option<&ToplevelRole> {
        match &self.role {
            Some(Role::Toplevel(toplevel)) => Some(toplevel),
            _ => None,
        }
    }

    pub fn toplevel_mut(&mut self) -> Option<&mut ToplevelRole> {
        match &mut self.role {
            Some(Role::Toplevel(toplevel)) => Some(toplevel),
            _ => None,
        }
    }

    pub fn popup(&self) -> Option<&PopupRole> {
        match &self.role {
            Some(Role::Popup(popup)) => Some(popup),
            _ => None,
        }
    }

    pub fn popup_mut(&mut self) -> Option<&mut PopupRole> {
        match &mut self.role {
            Some(Role::Popup(popup)) => Some(popup),
            _ => None,
        }
    }

    /// Parent surface for subsurfaces and popups
    pub fn parent(&self) -> Option<ObjectId> {
        match &self.role {
            Some(Role::Subsurface(sub)) => sub.parent,
            Some(Role::Popup(popup)) => popup.parent,
            _ => None,
        }
    }

    /// Children subsurfaces (the stack without the surface itself)
    pub fn children(&self) -> impl Iterator<Item = ObjectId> + '_ {
        let own = self.id.object;
        self.stack.iter().copied().filter(move |id| *id != own)
    }

    /// Every buffer this surface references in any of its states
    pub fn referenced_buffers(&self) -> Vec<ObjectId> {
        let mut buffers = Vec::with_capacity(3);
        buffers.extend(self.pending.attached_buffer());
        buffers.extend(self.cached.as_ref().and_then(|c| c.attached_buffer()));
        buffers.extend(self.current.buffer);
        buffers.sort();
        buffers.dedup();
        buffers
    }

    pub fn references_buffer(&self, buffer: ObjectId) -> bool {
        self.pending.attached_buffer() == Some(buffer)
            || self.cached.as_ref().and_then(|c| c.attached_buffer()) == Some(buffer)
            || self.current.buffer == Some(buffer)
    }
}

/// Convert a buffer-space rectangle to surface-local coordinates.
///
/// Exact for the normal transform; flips and 180° rotations mirror the
/// rectangle; the remaining transforms conservatively damage the whole
/// surface.
pub fn buffer_to_surface(rect: Rect, transform: Transform, scale: i32, buffer_size: (i32, i32)) -> Rect {
    let scale = scale.max(1) as i64;
    let (bw, bh) = (buffer_size.0 as i64, buffer_size.1 as i64);
    let (x1, y1, x2, y2) = (rect.x as i64, rect.y as i64, rect.right(), rect.bottom());
    let (x1, y1, x2, y2) = match transform {
        Transform::Normal => (x1, y1, x2, y2),
        Transform::Flipped => (bw - x2, y1, bw - x1, y2),
        Transform::Rotate180 => (bw - x2, bh - y2, bw - x1, bh - y1),
        Transform::Flipped180 => (x1, bh - y2, x2, bh - y1),
        _ => {
            let (w, h) = surface_size(buffer_size, transform, scale as i32);
            return Rect::from_size(w, h);
        }
    };
    // Round outwards so the result never under-reports
    Rect::from_edges(
        x1.div_euclid(scale),
        y1.div_euclid(scale),
        (x2 + scale - 1).div_euclid(scale),
        (y2 + scale - 1).div_euclid(scale),
    )
}

/// Surface-local size for a buffer of `buffer_size`
pub fn surface_size(buffer_size: (i32, i32), transform: Transform, scale: i32) -> (i32, i32) {
    let scale = scale.max(1);
    let (w, h) = if transform.swaps_axes() {
        (buffer_size.1, buffer_size.0)
    } else {
        buffer_size
    };
    (w / scale, h / scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_latest_buffer_and_all_damage() {
        let mut older = SurfaceState::default();
        older.buffer = Some(BufferAssignment::New(ObjectId::new(7)));
        older.damage.add(Rect::new(0, 0, 10, 10));
        older.frame_callbacks.push(ObjectId::new(9));

        let mut newer = SurfaceState::default();
        newer.damage.add(Rect::new(50, 50, 10, 10));
        newer.frame_callbacks.push(ObjectId::new(10));
        older.merge(newer);

        assert_eq!(older.attached_buffer(), Some(ObjectId::new(7)));
        assert_eq!(older.damage.rects().len(), 2);
        assert_eq!(older.frame_callbacks, vec![ObjectId::new(9), ObjectId::new(10)]);
    }

    #[test]
    fn test_buffer_damage_conversion() {
        let rect = Rect::new(3, 3, 5, 5);
        assert_eq!(buffer_to_surface(rect, Transform::Normal, 1, (100, 100)), rect);
        // Scale 2 rounds outward
        assert_eq!(
            buffer_to_surface(rect, Transform::Normal, 2, (100, 100)),
            Rect::new(1, 1, 3, 3)
        );
        assert_eq!(
            buffer_to_surface(Rect::new(0, 0, 10, 10), Transform::Flipped, 1, (100, 50)),
            Rect::new(90, 0, 10, 10)
        );
        assert_eq!(
            buffer_to_surface(rect, Transform::Rotate90, 1, (100, 50)),
            Rect::new(0, 0, 50, 100)
        );
    }

    #[test]
    fn test_huge_buffer_damage_covers_the_surface() {
        let everything = Rect::new(0, 0, i32::MAX, i32::MAX);
        for (transform, scale) in [
            (Transform::Normal, 1),
            (Transform::Normal, 2),
            (Transform::Flipped, 1),
            (Transform::Flipped, 2),
            (Transform::Rotate180, 2),
        ] {
            let size = surface_size((100, 100), transform, scale);
            let damage = buffer_to_surface(everything, transform, scale, (100, 100));
            assert!(
                damage.contains_rect(&Rect::from_size(size.0, size.1)),
                "{:?} at scale {} gave {}",
                transform,
                scale,
                damage
            );
        }

        let negative = Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        let damage = buffer_to_surface(negative, Transform::Flipped, 2, (100, 100));
        assert!(!damage.is_empty());
    }

    #[test]
    fn test_surface_size() {
        assert_eq!(surface_size((200, 100), Transform::Normal, 2), (100, 50));
        assert_eq!(surface_size((200, 100), Transform::Rotate270, 1), (100, 200));
    }

    #[test]
    fn test_input_region_defaults_to_whole_surface() {
        let mut current = CurrentState {
            size: (10, 10),
            ..Default::default()
        };
        assert!(current.accepts_input(Point::new(5.0, 5.0)));
        assert!(!current.accepts_input(Point::new(15.0, 5.0)));
        current.input_region = Some(Region::new());
        assert!(!current.accepts_input(Point::new(5.0, 5.0)));
    }
}
