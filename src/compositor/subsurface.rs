//! wl_subsurface: parent links, stacking among siblings and the
//! synchronized commit mode

use super::*;

impl SurfaceManager {
    pub fn get_subsurface(
        &mut self,
        client: ClientId,
        subcompositor: ObjectId,
        id: ObjectId,
        object: ObjectId,
        parent: ObjectId,
    ) -> ProtocolResult<()> {
        let surface_id = SurfaceId::new(client, object);
        let parent_id = SurfaceId::new(client, parent);
        if object == parent {
            return Err(error(
                subcompositor,
                Interface::Subcompositor,
                codes::subcompositor::BAD_SURFACE,
                "a surface cannot be its own parent",
            ));
        }
        let surface = self.surface_ref(surface_id)?;
        self.surface_ref(parent_id)?;
        match &surface.role {
            None => {}
            Some(Role::Subsurface(sub)) if sub.object.is_none() => {}
            Some(role) => {
                return Err(error(
                    subcompositor,
                    Interface::Subcompositor,
                    codes::subcompositor::BAD_SURFACE,
                    format!("{} already has the {} role", surface_id, role.kind()),
                ))
            }
        }
        if self.is_ancestor(surface_id, parent_id) {
            return Err(error(
                subcompositor,
                Interface::Subcompositor,
                codes::subcompositor::BAD_PARENT,
                format!("{} is a descendant of {}", parent_id, surface_id),
            ));
        }

        if let Some(surface) = self.surfaces.get_mut(&surface_id) {
            surface.role = Some(Role::Subsurface(SubsurfaceRole {
                object: Some(id),
                parent: Some(parent),
                sync: true,
                position: (0, 0),
                pending_position: None,
            }));
        }
        if let Some(parent_surface) = self.surfaces.get_mut(&parent_id) {
            parent_surface.stack.push(object);
            if let Some(stack) = parent_surface.pending_stack.as_mut() {
                stack.push(object);
            }
        }
        self.stacking.retain(|entry| *entry != surface_id);
        self.role_objects.insert((client, id), object);
        self.notices
            .push(CompositorNotice::RoleAssigned(surface_id, RoleKind::Subsurface));
        Ok(())
    }

    /// Whether `ancestor` appears on the parent chain of `id` (or is `id`)
    fn is_ancestor(&self, ancestor: SurfaceId, id: SurfaceId) -> bool {
        let mut current = Some(id);
        let mut steps = 0;
        while let Some(candidate) = current {
            if candidate == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.surfaces.len() {
                return false;
            }
            current = self
                .surfaces
                .get(&candidate)
                .and_then(Surface::parent)
                .map(|parent| SurfaceId::new(id.client, parent));
        }
        false
    }

    pub(super) fn remove_from_parent_stack(&mut self, parent: SurfaceId, child: ObjectId) {
        if let Some(parent_surface) = self.surfaces.get_mut(&parent) {
            parent_surface.stack.retain(|entry| *entry != child);
            if let Some(stack) = parent_surface.pending_stack.as_mut() {
                stack.retain(|entry| *entry != child);
            }
        }
    }

    pub fn destroy_subsurface(&mut self, client: ClientId, role_object: ObjectId) {
        let Some(object) = self.role_objects.remove(&(client, role_object)) else {
            return;
        };
        let id = SurfaceId::new(client, object);
        let Some(surface) = self.surfaces.get_mut(&id) else {
            return;
        };
        let before = surface.referenced_buffers();
        surface.cached = None;
        let parent = surface.subsurface_mut().and_then(|sub| {
            sub.object = None;
            sub.pending_position = None;
            sub.parent.take()
        });
        if let Some(parent) = parent {
            self.remove_from_parent_stack(SurfaceId::new(client, parent), object);
        }
        self.update_holders(id, &before);
        self.set_mapped(id, false);
    }

    pub fn subsurface_set_position(&mut self, client: ClientId, role_object: ObjectId, x: i32, y: i32) -> ProtocolResult<()> {
        let id = self.surface_for_role(client, role_object)?;
        if let Some(sub) = self.surfaces.get_mut(&id).and_then(Surface::subsurface_mut) {
            sub.pending_position = Some((x, y));
        }
        Ok(())
    }

    /// place_above (`above` = true) or place_below relative to a sibling or
    /// the parent itself
    pub fn subsurface_restack(
        &mut self,
        client: ClientId,
        role_object: ObjectId,
        sibling: ObjectId,
        above: bool,
    ) -> ProtocolResult<()> {
        let id = self.surface_for_role(client, role_object)?;
        let Some(parent) = self.surfaces.get(&id).and_then(Surface::subsurface).and_then(|s| s.parent) else {
            return Ok(());
        };
        let parent_id = SurfaceId::new(client, parent);
        let bad_sibling = || {
            error(
                role_object,
                Interface::Subsurface,
                codes::subsurface::BAD_SURFACE,
                format!("{} is neither the parent nor a sibling", sibling),
            )
        };
        if sibling == id.object {
            return Err(bad_sibling());
        }
        let parent_surface = self.surface_mut(parent_id)?;
        if parent_surface.pending_stack.is_none() {
            parent_surface.pending_stack = Some(parent_surface.stack.clone());
        }
        let Some(stack) = parent_surface.pending_stack.as_mut() else {
            return Ok(());
        };
        if !stack.contains(&sibling) {
            return Err(bad_sibling());
        }
        stack.retain(|entry| *entry != id.object);
        let index = stack
            .iter()
            .position(|entry| *entry == sibling)
            .ok_or_else(bad_sibling)?;
        stack.insert(if above { index + 1 } else { index }, id.object);
        Ok(())
    }

    pub fn subsurface_set_sync(&mut self, client: ClientId, role_object: ObjectId, sync: bool, placement: &mut dyn PlacementPolicy) -> ProtocolResult<Vec<SurfaceId>> {
        let id = self.surface_for_role(client, role_object)?;
        if let Some(sub) = self.surfaces.get_mut(&id).and_then(Surface::subsurface_mut) {
            sub.sync = sync;
        }
        let mut applied = Vec::new();
        // Switching to desync applies whatever was cached
        let has_cache = self.surfaces.get(&id).map_or(false, |s| s.cached.is_some());
        if !sync && has_cache && !self.is_effectively_sync(id) {
            self.apply_tree(id, placement, &mut applied);
        }
        Ok(applied)
    }
}
