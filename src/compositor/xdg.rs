//! xdg-shell roles: positioners, xdg_surface, toplevels and popups, and the
//! configure/ack handshake that gates mapping

use super::*;

impl SurfaceManager {
    pub fn create_positioner(&mut self, client: ClientId, id: ObjectId) {
        self.positioners.insert((client, id), Positioner::default());
    }

    pub fn destroy_positioner(&mut self, client: ClientId, id: ObjectId) {
        self.positioners.remove(&(client, id));
    }

    pub fn positioner(&self, client: ClientId, id: ObjectId) -> Option<&Positioner> {
        self.positioners.get(&(client, id))
    }

    pub fn update_positioner(&mut self, client: ClientId, id: ObjectId, request: &PositionerRequest) -> ProtocolResult<()> {
        let invalid = |message: String| {
            error(id, Interface::XdgPositioner, codes::xdg_positioner::INVALID_INPUT, message)
        };
        let positioner = self
            .positioners
            .get_mut(&(client, id))
            .ok_or_else(|| ProtocolError::invalid_object(id))?;
        match *request {
            PositionerRequest::Destroy => {}
            PositionerRequest::SetSize { width, height } => {
                if width <= 0 || height <= 0 {
                    return Err(invalid(format!("invalid size {}x{}", width, height)));
                }
                positioner.size = (width, height);
            }
            PositionerRequest::SetAnchorRect(rect) => {
                if rect.width < 0 || rect.height < 0 {
                    return Err(invalid(format!("invalid anchor rect {}", rect)));
                }
                positioner.anchor_rect = Some(rect);
            }
            PositionerRequest::SetAnchor(value) => {
                positioner.anchor =
                    Edge::from_u32(value).ok_or_else(|| invalid(format!("invalid anchor {}", value)))?;
            }
            PositionerRequest::SetGravity(value) => {
                positioner.gravity =
                    Edge::from_u32(value).ok_or_else(|| invalid(format!("invalid gravity {}", value)))?;
            }
            PositionerRequest::SetConstraintAdjustment(value) => {
                positioner.constraint_adjustment = value & adjustment::ALL;
            }
            PositionerRequest::SetOffset { x, y } => positioner.offset = (x, y),
            PositionerRequest::SetReactive => positioner.reactive = true,
            PositionerRequest::SetParentSize { width, height } => {
                positioner.parent_size = Some((width, height))
            }
            PositionerRequest::SetParentConfigure { serial } => {
                positioner.parent_configure = Some(serial)
            }
        }
        Ok(())
    }

    /// Whether xdg_surfaces created from `wm_base` are still alive
    pub fn has_xdg_surfaces(&self, client: ClientId, wm_base: ObjectId) -> bool {
        self.surfaces.values().any(|surface| {
            surface.id.client == client
                && surface
                    .xdg
                    .as_ref()
                    .map_or(false, |xdg| xdg.wm_base == wm_base && xdg.object.is_some())
        })
    }

    pub fn get_xdg_surface(&mut self, client: ClientId, wm_base: ObjectId, id: ObjectId, object: ObjectId) -> ProtocolResult<()> {
        let surface_id = SurfaceId::new(client, object);
        let surface = self.surface_mut(surface_id)?;
        match surface.role_kind() {
            None | Some(RoleKind::Toplevel) | Some(RoleKind::Popup) => {}
            Some(kind) => {
                return Err(error(
                    wm_base,
                    Interface::XdgWmBase,
                    codes::xdg_wm_base::ROLE,
                    format!("{} already has the {} role", surface_id, kind),
                ))
            }
        }
        if surface.xdg.as_ref().map_or(false, |xdg| xdg.object.is_some()) {
            return Err(error(
                wm_base,
                Interface::XdgWmBase,
                codes::xdg_wm_base::ROLE,
                format!("{} already has an xdg_surface", surface_id),
            ));
        }
        if surface.current.buffer.is_some() || surface.pending.attached_buffer().is_some() {
            return Err(error(
                id,
                Interface::XdgSurface,
                codes::xdg_surface::UNCONFIGURED_BUFFER,
                "surface already has a buffer",
            ));
        }
        surface.xdg = Some(XdgState::new(wm_base, id));
        self.role_objects.insert((client, id), object);
        Ok(())
    }

    /// xdg_surface.destroy; the role object must go first
    pub fn destroy_xdg_surface(&mut self, client: ClientId, role_object: ObjectId) -> ProtocolResult<()> {
        let Some(object) = self.role_objects.get(&(client, role_object)).copied() else {
            return Ok(());
        };
        let id = SurfaceId::new(client, object);
        if let Some(surface) = self.surfaces.get_mut(&id) {
            if surface.role.as_ref().and_then(Role::object).is_some() {
                return Err(error(
                    role_object,
                    Interface::XdgSurface,
                    codes::xdg_surface::DEFUNCT_ROLE_OBJECT,
                    "xdg_surface destroyed before its role object",
                ));
            }
            if let Some(xdg) = surface.xdg.as_mut() {
                xdg.object = None;
                xdg.reset();
            }
        }
        self.role_objects.remove(&(client, role_object));
        Ok(())
    }

    fn xdg_target(&self, client: ClientId, xdg_object: ObjectId) -> ProtocolResult<(SurfaceId, ObjectId)> {
        let id = self.surface_for_role(client, xdg_object)?;
        let surface = self.surface_ref(id)?;
        let wm_base = surface
            .xdg
            .as_ref()
            .map(|xdg| xdg.wm_base)
            .ok_or_else(|| ProtocolError::invalid_object(xdg_object))?;
        if surface.role.as_ref().and_then(Role::object).is_some() {
            return Err(error(
                xdg_object,
                Interface::XdgSurface,
                codes::xdg_surface::ALREADY_CONSTRUCTED,
                "xdg_surface already has a role object",
            ));
        }
        Ok((id, wm_base))
    }

    fn role_conflict(&self, id: SurfaceId, wm_base: ObjectId, wanted: RoleKind) -> ProtocolResult<()> {
        match self.surface_ref(id)?.role_kind() {
            Some(kind) if kind != wanted => Err(error(
                wm_base,
                Interface::XdgWmBase,
                codes::xdg_wm_base::ROLE,
                format!("{} already has the {} role", id, kind),
            )),
            _ => Ok(()),
        }
    }

    pub fn get_toplevel(&mut self, client: ClientId, xdg_object: ObjectId, id: ObjectId) -> ProtocolResult<SurfaceId> {
        let (surface_id, wm_base) = self.xdg_target(client, xdg_object)?;
        self.role_conflict(surface_id, wm_base, RoleKind::Toplevel)?;
        let surface = self.surface_mut(surface_id)?;
        surface.role = Some(Role::Toplevel(ToplevelRole {
            object: Some(id),
            ..Default::default()
        }));
        if let Some(xdg) = surface.xdg.as_mut() {
            xdg.reset();
        }
        self.role_objects.insert((client, id), surface_id.object);
        self.raise(surface_id);
        self.notices
            .push(CompositorNotice::RoleAssigned(surface_id, RoleKind::Toplevel));
        Ok(surface_id)
    }

    pub fn get_popup(
        &mut self,
        client: ClientId,
        xdg_object: ObjectId,
        id: ObjectId,
        parent: Option<ObjectId>,
        positioner: ObjectId,
    ) -> ProtocolResult<SurfaceId> {
        let (surface_id, wm_base) = self.xdg_target(client, xdg_object)?;
        self.role_conflict(surface_id, wm_base, RoleKind::Popup)?;
        let positioner = self.complete_positioner(client, positioner, wm_base)?;
        let parent_surface = parent
            .and_then(|parent| self.surface_for_role(client, parent).ok())
            .filter(|parent| {
                self.surfaces.get(parent).map_or(false, |s| {
                    matches!(s.role_kind(), Some(RoleKind::Toplevel | RoleKind::Popup))
                        && s.role.as_ref().and_then(Role::object).is_some()
                })
            })
            .ok_or_else(|| {
                error(
                    wm_base,
                    Interface::XdgWmBase,
                    codes::xdg_wm_base::INVALID_POPUP_PARENT,
                    "popups need a live toplevel or popup parent",
                )
            })?;
        let geometry = self.popup_geometry(parent_surface, &positioner);

        let surface = self.surface_mut(surface_id)?;
        surface.role = Some(Role::Popup(PopupRole {
            object: Some(id),
            parent: Some(parent_surface.object),
            positioner,
            geometry,
            grabbed: false,
            dismissed: false,
        }));
        if let Some(xdg) = surface.xdg.as_mut() {
            xdg.reset();
        }
        self.role_objects.insert((client, id), surface_id.object);
        self.stacking.retain(|entry| *entry != surface_id);
        self.stacking.push(surface_id);
        self.notices
            .push(CompositorNotice::RoleAssigned(surface_id, RoleKind::Popup));
        Ok(surface_id)
    }

    fn complete_positioner(&self, client: ClientId, id: ObjectId, wm_base: ObjectId) -> ProtocolResult<Positioner> {
        let positioner = self
            .positioners
            .get(&(client, id))
            .copied()
            .ok_or_else(|| ProtocolError::invalid_object(id))?;
        if !positioner.is_complete() {
            return Err(error(
                wm_base,
                Interface::XdgWmBase,
                codes::xdg_wm_base::INVALID_POSITIONER,
                "positioner needs a size and an anchor rectangle",
            ));
        }
        Ok(positioner)
    }

    /// Popup geometry relative to the parent's window geometry, constrained
    /// to the output
    fn popup_geometry(&self, parent: SurfaceId, positioner: &Positioner) -> Rect {
        let (x, y) = self.window_origin(parent);
        positioner.constrained_geometry(self.output.translate(-x, -y))
    }

    pub fn destroy_toplevel(&mut self, client: ClientId, role_object: ObjectId) {
        let Some(object) = self.role_objects.remove(&(client, role_object)) else {
            return;
        };
        let id = SurfaceId::new(client, object);
        if let Some(surface) = self.surfaces.get_mut(&id) {
            if let Some(toplevel) = surface.toplevel_mut() {
                toplevel.object = None;
            }
            if let Some(xdg) = surface.xdg.as_mut() {
                xdg.reset();
            }
        }
        self.set_mapped(id, false);
    }

    pub fn destroy_popup(&mut self, client: ClientId, role_object: ObjectId) -> ProtocolResult<()> {
        let Some(object) = self.role_objects.get(&(client, role_object)).copied() else {
            return Ok(());
        };
        let id = SurfaceId::new(client, object);
        if !self.child_popups(id).is_empty() {
            let wm_base = self
                .surfaces
                .get(&id)
                .and_then(|s| s.xdg.as_ref())
                .map_or(ObjectId::DISPLAY, |xdg| xdg.wm_base);
            return Err(error(
                wm_base,
                Interface::XdgWmBase,
                codes::xdg_wm_base::NOT_THE_TOPMOST_POPUP,
                format!("{} still has child popups", id),
            ));
        }
        self.role_objects.remove(&(client, role_object));
        if let Some(surface) = self.surfaces.get_mut(&id) {
            if let Some(popup) = surface.popup_mut() {
                popup.object = None;
            }
            if let Some(xdg) = surface.xdg.as_mut() {
                xdg.reset();
            }
        }
        self.set_mapped(id, false);
        Ok(())
    }

    /// Live, undismissed popups whose parent is `id`, topmost first
    pub(super) fn child_popups(&self, id: SurfaceId) -> Vec<SurfaceId> {
        let mut popups: Vec<SurfaceId> = self
            .surfaces
            .values()
            .filter(|s| s.id.client == id.client)
            .filter(|s| {
                s.popup().map_or(false, |popup| {
                    popup.parent == Some(id.object) && popup.object.is_some() && !popup.dismissed
                })
            })
            .map(|s| s.id)
            .collect();
        popups.sort_by_key(|popup| {
            std::cmp::Reverse(self.stacking.iter().position(|entry| entry == popup))
        });
        popups
    }

    /// Dismiss a popup and the popups stacked on it, sending popup_done to
    /// each, topmost first. Returns the dismissed surfaces.
    pub fn dismiss_popup(&mut self, id: SurfaceId) -> Vec<SurfaceId> {
        let mut dismissed = Vec::new();
        self.dismiss_popup_into(id, &mut dismissed);
        dismissed
    }

    fn dismiss_popup_into(&mut self, id: SurfaceId, dismissed: &mut Vec<SurfaceId>) {
        for child in self.child_popups(id) {
            self.dismiss_popup_into(child, dismissed);
        }
        let Some(popup) = self.surfaces.get_mut(&id).and_then(Surface::popup_mut) else {
            return;
        };
        if popup.dismissed {
            return;
        }
        popup.dismissed = true;
        if let Some(object) = popup.object {
            self.outbox
                .push(Outgoing::new(id.client, object, Event::PopupDone));
        }
        dismissed.push(id);
        self.set_mapped(id, false);
    }

    /// xdg_popup.grab; only allowed before the popup is mapped
    pub fn popup_grab(&mut self, client: ClientId, role_object: ObjectId) -> ProtocolResult<SurfaceId> {
        let id = self.surface_for_role(client, role_object)?;
        let surface = self.surface_mut(id)?;
        let committed = surface.xdg.as_ref().map_or(false, |xdg| xdg.initial_commit);
        if surface.mapped || committed {
            return Err(error(
                role_object,
                Interface::XdgPopup,
                codes::xdg_popup::INVALID_GRAB,
                "grab requested after the popup was committed",
            ));
        }
        if let Some(popup) = surface.popup_mut() {
            popup.grabbed = true;
        }
        Ok(id)
    }

    pub fn popup_reposition(&mut self, client: ClientId, role_object: ObjectId, positioner: ObjectId, token: u32) -> ProtocolResult<()> {
        let id = self.surface_for_role(client, role_object)?;
        let wm_base = self
            .surface_ref(id)?
            .xdg
            .as_ref()
            .map_or(ObjectId::DISPLAY, |xdg| xdg.wm_base);
        let positioner = self.complete_positioner(client, positioner, wm_base)?;
        let parent = self
            .surface_ref(id)?
            .popup()
            .and_then(|popup| popup.parent)
            .map(|parent| SurfaceId::new(client, parent));
        let geometry = match parent {
            Some(parent) => self.popup_geometry(parent, &positioner),
            None => positioner.geometry(),
        };
        if let Some(popup) = self.surface_mut(id)?.popup_mut() {
            popup.positioner = positioner;
            popup.geometry = geometry;
        }
        self.outbox.push(Outgoing::new(
            client,
            role_object,
            Event::PopupRepositioned { token },
        ));
        self.send_configure(id);
        Ok(())
    }

    pub fn ack_configure(&mut self, client: ClientId, xdg_object: ObjectId, serial: u32) -> ProtocolResult<()> {
        let id = self.surface_for_role(client, xdg_object)?;
        let xdg = self
            .surface_mut(id)?
            .xdg
            .as_mut()
            .ok_or_else(|| ProtocolError::invalid_object(xdg_object))?;
        let index = xdg
            .pending_serials
            .iter()
            .position(|pending| *pending == serial)
            .ok_or_else(|| {
                error(
                    xdg_object,
                    Interface::XdgSurface,
                    codes::xdg_surface::INVALID_SERIAL,
                    format!("serial {} was never sent or already acknowledged", serial),
                )
            })?;
        xdg.pending_serials.drain(..=index);
        xdg.last_acked = Some(serial);
        Ok(())
    }

    pub fn set_window_geometry(&mut self, client: ClientId, xdg_object: ObjectId, rect: Rect) -> ProtocolResult<()> {
        if rect.width <= 0 || rect.height <= 0 {
            return Err(error(
                xdg_object,
                Interface::XdgSurface,
                codes::xdg_surface::INVALID_SIZE,
                format!("invalid window geometry {}", rect),
            ));
        }
        let id = self.surface_for_role(client, xdg_object)?;
        self.surface_mut(id)?.pending.window_geometry = Some(rect);
        Ok(())
    }

    fn toplevel_target(&mut self, client: ClientId, role_object: ObjectId) -> ProtocolResult<(SurfaceId, &mut ToplevelRole)> {
        let id = self.surface_for_role(client, role_object)?;
        let toplevel = self
            .surfaces
            .get_mut(&id)
            .and_then(Surface::toplevel_mut)
            .ok_or_else(|| ProtocolError::invalid_object(role_object))?;
        Ok((id, toplevel))
    }

    pub fn set_title(&mut self, client: ClientId, role_object: ObjectId, title: String) -> ProtocolResult<()> {
        self.toplevel_target(client, role_object)?.1.title = Some(title);
        Ok(())
    }

    pub fn set_app_id(&mut self, client: ClientId, role_object: ObjectId, app_id: String) -> ProtocolResult<()> {
        self.toplevel_target(client, role_object)?.1.app_id = Some(app_id);
        Ok(())
    }

    pub fn set_toplevel_parent(&mut self, client: ClientId, role_object: ObjectId, parent: Option<ObjectId>) -> ProtocolResult<()> {
        let id = self.surface_for_role(client, role_object)?;
        let parent = match parent {
            Some(parent) => Some(self.surface_for_role(client, parent)?),
            None => None,
        };
        if let Some(parent) = parent {
            let mut current = Some(parent);
            let mut steps = 0;
            while let Some(candidate) = current {
                if candidate == id || steps > self.surfaces.len() {
                    return Err(error(
                        role_object,
                        Interface::XdgToplevel,
                        codes::xdg_toplevel::INVALID_PARENT,
                        "toplevel parent would form a loop",
                    ));
                }
                steps += 1;
                current = self
                    .surfaces
                    .get(&candidate)
                    .and_then(Surface::toplevel)
                    .and_then(|t| t.parent)
                    .map(|p| SurfaceId::new(client, p));
            }
        }
        self.toplevel_target(client, role_object)?.1.parent = parent.map(|p| p.object);
        Ok(())
    }

    pub fn set_size_bounds(&mut self, client: ClientId, role_object: ObjectId, width: i32, height: i32, max: bool) -> ProtocolResult<()> {
        if width < 0 || height < 0 {
            return Err(error(
                role_object,
                Interface::XdgToplevel,
                codes::xdg_toplevel::INVALID_SIZE,
                format!("negative size {}x{}", width, height),
            ));
        }
        let (_, toplevel) = self.toplevel_target(client, role_object)?;
        if max {
            toplevel.max_size = (width, height);
        } else {
            toplevel.min_size = (width, height);
        }
        Ok(())
    }

    pub fn set_maximized(&mut self, client: ClientId, role_object: ObjectId, maximized: bool) -> ProtocolResult<()> {
        let (id, toplevel) = self.toplevel_target(client, role_object)?;
        if toplevel.maximized != maximized {
            toplevel.maximized = maximized;
            self.reconfigure(id);
        }
        Ok(())
    }

    pub fn set_fullscreen(&mut self, client: ClientId, role_object: ObjectId, fullscreen: bool) -> ProtocolResult<()> {
        let (id, toplevel) = self.toplevel_target(client, role_object)?;
        if toplevel.fullscreen != fullscreen {
            toplevel.fullscreen = fullscreen;
            self.reconfigure(id);
        }
        Ok(())
    }

    pub fn set_minimized(&mut self, client: ClientId, role_object: ObjectId) -> ProtocolResult<()> {
        self.toplevel_target(client, role_object)?.1.minimized = true;
        Ok(())
    }

    /// Configure again if the initial configure went out already
    fn reconfigure(&mut self, id: SurfaceId) {
        let initial_done = self
            .surfaces
            .get(&id)
            .and_then(|s| s.xdg.as_ref())
            .map_or(false, |xdg| xdg.initial_commit);
        if initial_done {
            self.send_configure(id);
        }
    }

    pub(super) fn initial_configure(&mut self, id: SurfaceId, placement: &mut dyn PlacementPolicy) {
        let Some(surface) = self.surfaces.get(&id) else {
            return;
        };
        if surface.toplevel().is_some() {
            let attributes = self.attributes(surface);
            let geometry = placement.resolve_initial_geometry(&attributes);
            if let Some(surface) = self.surfaces.get_mut(&id) {
                surface.position = (geometry.x, geometry.y);
                surface.placed = true;
                if let Some(toplevel) = surface.toplevel_mut() {
                    toplevel.size = (geometry.width.max(0), geometry.height.max(0));
                }
            }
        }
        if let Some(xdg) = self.surfaces.get_mut(&id).and_then(|s| s.xdg.as_mut()) {
            xdg.initial_commit = true;
        }
        self.send_configure(id);
    }

    /// Send the role configure followed by xdg_surface.configure
    fn send_configure(&mut self, id: SurfaceId) {
        let serial = self.serials.next_serial();
        let output = self.output;
        let Some(surface) = self.surfaces.get_mut(&id) else {
            return;
        };
        let Some(xdg_object) = surface.xdg.as_ref().and_then(|xdg| xdg.object) else {
            return;
        };
        match &surface.role {
            Some(Role::Toplevel(toplevel)) => {
                let Some(object) = toplevel.object else {
                    return;
                };
                let mut states = Vec::new();
                if toplevel.maximized {
                    states.push(ToplevelState::Maximized);
                }
                if toplevel.fullscreen {
                    states.push(ToplevelState::Fullscreen);
                }
                let (width, height) = if toplevel.maximized || toplevel.fullscreen {
                    (output.width, output.height)
                } else {
                    toplevel.size
                };
                self.outbox.push(Outgoing::new(
                    id.client,
                    object,
                    Event::ToplevelConfigure {
                        width,
                        height,
                        states,
                    },
                ));
            }
            Some(Role::Popup(popup)) => {
                let Some(object) = popup.object else {
                    return;
                };
                self.outbox.push(Outgoing::new(
                    id.client,
                    object,
                    Event::PopupConfigure {
                        geometry: popup.geometry,
                    },
                ));
            }
            _ => return,
        }
        if let Some(xdg) = surface.xdg.as_mut() {
            xdg.pending_serials.push(serial);
        }
        self.outbox.push(Outgoing::new(
            id.client,
            xdg_object,
            Event::XdgSurfaceConfigure { serial },
        ));
    }

    /// Ask a toplevel to close
    pub fn request_close(&mut self, id: SurfaceId) {
        if let Some(object) = self.surfaces.get(&id).and_then(Surface::toplevel).and_then(|t| t.object) {
            self.outbox
                .push(Outgoing::new(id.client, object, Event::ToplevelClose));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{manager, with_buffer, CLIENT};
    use super::*;
    use crate::backend::CascadePlacement;

    #[test]
    fn test_role_is_exclusive() {
        let mut manager = manager();
        let surface = ObjectId::new(3);
        manager.create_surface(CLIENT, surface, 6).unwrap();
        manager
            .set_cursor_role(CLIENT, ObjectId::new(4), surface)
            .unwrap();
        let err = manager
            .get_xdg_surface(CLIENT, ObjectId::new(2), ObjectId::new(5), surface)
            .unwrap_err();
        assert_eq!(err.code, codes::xdg_wm_base::ROLE);
    }

    #[test]
    fn test_xdg_configure_cycle() {
        let mut manager = manager();
        let mut placement = CascadePlacement::new(Rect::from_size(1920, 1080));
        let wm_base = ObjectId::new(2);
        let surface = ObjectId::new(3);
        let xdg = ObjectId::new(4);
        let toplevel = ObjectId::new(5);
        manager.create_surface(CLIENT, surface, 6).unwrap();
        manager.get_xdg_surface(CLIENT, wm_base, xdg, surface).unwrap();

        let err = manager.commit(CLIENT, surface, &mut placement).unwrap_err();
        assert_eq!(err.code, codes::xdg_surface::NOT_CONSTRUCTED);

        manager.get_toplevel(CLIENT, xdg, toplevel).unwrap();
        let buffer = with_buffer(&mut manager, 11);
        manager.attach(CLIENT, surface, Some(buffer), 0, 0).unwrap();
        let err = manager.commit(CLIENT, surface, &mut placement).unwrap_err();
        assert_eq!(err.code, codes::xdg_surface::UNCONFIGURED_BUFFER);

        manager.attach(CLIENT, surface, None, 0, 0).unwrap();
        manager.commit(CLIENT, surface, &mut placement).unwrap();
        let events = manager.drain_events();
        let serial = events
            .iter()
            .find_map(|e| match e.event {
                Event::XdgSurfaceConfigure { serial } => Some(serial),
                _ => None,
            })
            .unwrap();
        assert!(events
            .iter()
            .any(|e| e.object == toplevel && matches!(e.event, Event::ToplevelConfigure { .. })));

        let err = manager.ack_configure(CLIENT, xdg, serial + 100).unwrap_err();
        assert_eq!(err.code, codes::xdg_surface::INVALID_SERIAL);
        manager.ack_configure(CLIENT, xdg, serial).unwrap();
        manager.attach(CLIENT, surface, Some(buffer), 0, 0).unwrap();
        manager.commit(CLIENT, surface, &mut placement).unwrap();
        assert!(manager.is_mapped(SurfaceId::new(CLIENT, surface)));
    }
}
