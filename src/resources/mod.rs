//! Object registry for Wayland clients
//!
//! This module tracks every protocol object created by a client: its interface,
//! negotiated version and lifetime relations. Destroying an object cascades to
//! the objects bound to it, and unregistering a client yields the full list of
//! objects that must be torn down.

use crate::protocol::*;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// How a child object's lifetime is tied to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildBinding {
    /// Destroyed together with the parent (frame callbacks)
    Destroy,
    /// Left alive but inert: only its destructor is accepted (role objects)
    Invalidate,
}

/// Registry entry for one live object
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub interface: Interface,
    pub version: u32,
    pub parent: Option<ObjectId>,
    children: Vec<(ObjectId, ChildBinding)>,
    /// Object whose backing state is gone; requests other than its
    /// destructor are ignored
    pub inert: bool,
    /// Created while the client was over its object ceiling
    pub placeholder: bool,
}

impl ObjectEntry {
    fn new(interface: Interface, version: u32) -> Self {
        ObjectEntry {
            interface,
            version,
            parent: None,
            children: Vec::new(),
            inert: false,
            placeholder: false,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.children.iter().map(|(id, _)| *id)
    }
}

/// An object removed from the registry by a destroy or teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyedObject {
    pub id: ObjectId,
    pub interface: Interface,
    /// Whether the object was a resource-exhaustion placeholder
    pub placeholder: bool,
}

/// Why a lookup failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("unknown client {0}")]
    NoSuchClient(ClientId),
    #[error("object {0} was never created")]
    Unknown(ObjectId),
    #[error("object {0} was destroyed")]
    Gone(ObjectId),
}

impl LookupError {
    pub fn to_protocol_error(&self) -> ProtocolError {
        match self {
            LookupError::NoSuchClient(client) => {
                ProtocolError::implementation(format!("lookup on unknown {}", client))
            }
            LookupError::Unknown(id) => ProtocolError::invalid_object(*id),
            LookupError::Gone(id) => ProtocolError::object_gone(*id),
        }
    }
}

/// Registration failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown client {0}")]
    NoSuchClient(ClientId),
    #[error("new object id may not be null")]
    NullId,
    #[error("object id {0} is already in use")]
    IdInUse(ObjectId),
    #[error("object id {id} is not above the last id {highest} created by the client")]
    IdNotIncreasing { id: ObjectId, highest: u32 },
    #[error("object id {0} lies in the server-reserved range")]
    ServerRangeId(ObjectId),
    #[error("server id range exhausted")]
    ServerRangeExhausted,
    #[error("server id {0} was never allocated")]
    UnallocatedServerId(ObjectId),
    #[error("{interface} version {version} is not supported")]
    UnsupportedVersion { interface: Interface, version: u32 },
    #[error("per-client object limit of {limit} reached")]
    LimitExceeded { limit: usize },
    #[error("too many refused objects ({count})")]
    TooManyPlaceholders { count: usize },
}

impl RegistryError {
    /// Protocol error for failures caused by the client's message. Resource
    /// limits are not protocol errors and map to `None`.
    pub fn to_protocol_error(&self) -> Option<ProtocolError> {
        match self {
            RegistryError::LimitExceeded { .. } => None,
            RegistryError::TooManyPlaceholders { count } => Some(ProtocolError::no_memory(
                format!("{} objects refused, giving up on client", count),
            )),
            RegistryError::NoSuchClient(_) | RegistryError::ServerRangeExhausted => {
                Some(ProtocolError::implementation(self.to_string()))
            }
            RegistryError::IdInUse(id)
            | RegistryError::IdNotIncreasing { id, .. }
            | RegistryError::ServerRangeId(id)
            | RegistryError::UnallocatedServerId(id) => {
                Some(ProtocolError::bad_new_id(*id, &self.to_string()))
            }
            RegistryError::NullId => Some(ProtocolError::bad_new_id(ObjectId::NULL, "null id")),
            RegistryError::UnsupportedVersion { .. } => {
                Some(ProtocolError::invalid_object(ObjectId::DISPLAY))
            }
        }
    }
}

/// Per-client object table
#[derive(Debug)]
struct ClientObjects {
    objects: BTreeMap<ObjectId, ObjectEntry>,
    /// Highest client-side id ever registered
    highest_client_id: u32,
    /// Next id handed out from the server range
    next_server_id: u32,
    placeholders: usize,
}

impl ClientObjects {
    fn new() -> Self {
        let mut objects = BTreeMap::new();
        objects.insert(ObjectId::DISPLAY, ObjectEntry::new(Interface::Display, 1));
        ClientObjects {
            objects,
            highest_client_id: ObjectId::DISPLAY.get(),
            next_server_id: ObjectId::SERVER_ID_BASE,
            placeholders: 0,
        }
    }

    fn was_created(&self, id: ObjectId) -> bool {
        if id.is_null() {
            false
        } else if id.is_server_side() {
            id.get() < self.next_server_id
        } else {
            id.get() <= self.highest_client_id
        }
    }

    fn live_count(&self) -> usize {
        self.objects.len() - self.placeholders
    }
}

/// Object counts for a client (for security limits)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectCounts {
    pub objects: usize,
    pub placeholders: usize,
    pub surfaces: usize,
    pub buffers: usize,
}

/// Tracks all protocol objects of all connected clients
#[derive(Debug)]
pub struct ObjectRegistry {
    clients: HashMap<ClientId, ClientObjects>,
    next_client_id: u32,
    /// Ceiling on live objects per client; 0 = unlimited
    max_objects_per_client: usize,
}

impl ObjectRegistry {
    pub fn new(max_objects_per_client: usize) -> Self {
        ObjectRegistry {
            clients: HashMap::new(),
            next_client_id: 1,
            max_objects_per_client,
        }
    }

    /// Register a new client and return its ID. The client starts with its
    /// wl_display object.
    pub fn register_client(&mut self) -> ClientId {
        let client = ClientId::new(self.next_client_id);
        self.next_client_id += 1;
        self.clients.insert(client, ClientObjects::new());
        client
    }

    /// Unregister a client (called on disconnect). Every object is returned,
    /// children before their parents.
    pub fn unregister_client(&mut self, client: ClientId) -> Vec<DestroyedObject> {
        let mut table = match self.clients.remove(&client) {
            Some(table) => table,
            None => return Vec::new(),
        };

        let mut destroyed = Vec::with_capacity(table.objects.len());
        let roots: Vec<ObjectId> = table
            .objects
            .iter()
            .filter(|(_, entry)| entry.parent.is_none())
            .map(|(id, _)| *id)
            .collect();
        // Newest first, so that objects created later (which may refer to
        // older ones) are torn down before what they refer to.
        for root in roots.into_iter().rev() {
            collect_post_order(&mut table, root, true, &mut destroyed);
        }
        destroyed
    }

    pub fn has_client(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    pub fn clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.keys().copied()
    }

    /// Allocate an ID from the server range for a server-created object
    pub fn allocate_id(&mut self, client: ClientId) -> Result<ObjectId, RegistryError> {
        let table = self
            .clients
            .get_mut(&client)
            .ok_or(RegistryError::NoSuchClient(client))?;
        if table.next_server_id == u32::MAX {
            return Err(RegistryError::ServerRangeExhausted);
        }
        let id = ObjectId::new(table.next_server_id);
        table.next_server_id += 1;
        Ok(id)
    }

    /// Register an object at `id`. Client-created IDs must be strictly above
    /// every ID the client used before; server IDs must come from
    /// [`allocate_id`](Self::allocate_id).
    pub fn register(
        &mut self,
        client: ClientId,
        id: ObjectId,
        interface: Interface,
        version: u32,
        parent: Option<(ObjectId, ChildBinding)>,
    ) -> Result<(), RegistryError> {
        let limit = self.max_objects_per_client;
        let table = self.check_new_id(client, id, interface, version)?;
        if limit > 0 && table.live_count() >= limit {
            return Err(RegistryError::LimitExceeded { limit });
        }
        insert_entry(table, id, ObjectEntry::new(interface, version), parent);
        Ok(())
    }

    /// Whether the next [`register`](Self::register) for this client would
    /// be refused for exceeding the object ceiling
    pub fn at_limit(&self, client: ClientId) -> bool {
        let limit = self.max_objects_per_client;
        limit > 0
            && self
                .clients
                .get(&client)
                .map_or(false, |table| table.live_count() >= limit)
    }

    /// Register `id` as an inert placeholder for an object whose creation was
    /// refused, so the client's ID space stays in step with ours.
    pub fn register_placeholder(
        &mut self,
        client: ClientId,
        id: ObjectId,
        interface: Interface,
        version: u32,
    ) -> Result<(), RegistryError> {
        let cap = self.max_objects_per_client.saturating_mul(2).max(1);
        let table = self.check_new_id(client, id, interface, version)?;
        if table.placeholders >= cap {
            return Err(RegistryError::TooManyPlaceholders {
                count: table.placeholders,
            });
        }
        let mut entry = ObjectEntry::new(interface, version);
        entry.inert = true;
        entry.placeholder = true;
        insert_entry(table, id, entry, None);
        table.placeholders += 1;
        Ok(())
    }

    fn check_new_id(
        &mut self,
        client: ClientId,
        id: ObjectId,
        interface: Interface,
        version: u32,
    ) -> Result<&mut ClientObjects, RegistryError> {
        if version == 0 || version > interface.max_version() {
            return Err(RegistryError::UnsupportedVersion { interface, version });
        }
        let table = self
            .clients
            .get_mut(&client)
            .ok_or(RegistryError::NoSuchClient(client))?;
        if id.is_null() {
            return Err(RegistryError::NullId);
        }
        if table.objects.contains_key(&id) {
            return Err(RegistryError::IdInUse(id));
        }
        if id.is_server_side() {
            if id.get() >= table.next_server_id {
                return Err(RegistryError::UnallocatedServerId(id));
            }
        } else if id.get() <= table.highest_client_id {
            return Err(RegistryError::IdNotIncreasing {
                id,
                highest: table.highest_client_id,
            });
        }
        Ok(table)
    }

    /// Validate that a client-supplied new_id could be registered, without
    /// registering it
    pub fn check_client_id(&self, client: ClientId, id: ObjectId) -> Result<(), RegistryError> {
        let table = self
            .clients
            .get(&client)
            .ok_or(RegistryError::NoSuchClient(client))?;
        if id.is_null() {
            return Err(RegistryError::NullId);
        }
        if id.is_server_side() {
            return Err(RegistryError::ServerRangeId(id));
        }
        if id.get() <= table.highest_client_id {
            return Err(RegistryError::IdNotIncreasing {
                id,
                highest: table.highest_client_id,
            });
        }
        Ok(())
    }

    pub fn lookup(&self, client: ClientId, id: ObjectId) -> Result<&ObjectEntry, LookupError> {
        let table = self
            .clients
            .get(&client)
            .ok_or(LookupError::NoSuchClient(client))?;
        match table.objects.get(&id) {
            Some(entry) => Ok(entry),
            None if table.was_created(id) => Err(LookupError::Gone(id)),
            None => Err(LookupError::Unknown(id)),
        }
    }

    /// Look up an object and require a particular interface
    pub fn lookup_as(
        &self,
        client: ClientId,
        id: ObjectId,
        interface: Interface,
    ) -> Result<&ObjectEntry, ProtocolError> {
        let entry = self
            .lookup(client, id)
            .map_err(|err| err.to_protocol_error())?;
        if entry.interface != interface {
            return Err(ProtocolError::invalid_object(id));
        }
        Ok(entry)
    }

    pub fn version(&self, client: ClientId, id: ObjectId) -> Option<u32> {
        self.lookup(client, id).ok().map(|entry| entry.version)
    }

    /// Destroy an object. Children bound with [`ChildBinding::Destroy`] go
    /// with it (recursively); children bound with
    /// [`ChildBinding::Invalidate`] become inert. Returns every removed
    /// object, children first.
    pub fn destroy(
        &mut self,
        client: ClientId,
        id: ObjectId,
    ) -> Result<Vec<DestroyedObject>, LookupError> {
        let table = self
            .clients
            .get_mut(&client)
            .ok_or(LookupError::NoSuchClient(client))?;
        let parent = match table.objects.get(&id) {
            Some(entry) => entry.parent,
            None if table.was_created(id) => return Err(LookupError::Gone(id)),
            None => return Err(LookupError::Unknown(id)),
        };
        if let Some(parent) = parent.and_then(|p| table.objects.get_mut(&p)) {
            parent.children.retain(|(child, _)| *child != id);
        }

        let mut destroyed = Vec::new();
        collect_post_order(table, id, false, &mut destroyed);
        Ok(destroyed)
    }

    /// Mark an object inert without destroying it
    pub fn make_inert(&mut self, client: ClientId, id: ObjectId) {
        if let Some(entry) = self
            .clients
            .get_mut(&client)
            .and_then(|table| table.objects.get_mut(&id))
        {
            entry.inert = true;
        }
    }

    /// Tie an existing object's lifetime to `parent`
    pub fn bind_child(
        &mut self,
        client: ClientId,
        parent: ObjectId,
        child: ObjectId,
        binding: ChildBinding,
    ) {
        let Some(table) = self.clients.get_mut(&client) else {
            return;
        };
        if !table.objects.contains_key(&parent) {
            return;
        }
        let old_parent = match table.objects.get_mut(&child) {
            Some(entry) => entry.parent.replace(parent),
            None => return,
        };
        if let Some(old) = old_parent.and_then(|p| table.objects.get_mut(&p)) {
            old.children.retain(|(id, _)| *id != child);
        }
        if let Some(entry) = table.objects.get_mut(&parent) {
            entry.children.push((child, binding));
        }
    }

    /// Objects of a client, in ID order
    pub fn objects(&self, client: ClientId) -> impl Iterator<Item = (ObjectId, &ObjectEntry)> {
        self.clients
            .get(&client)
            .into_iter()
            .flat_map(|table| table.objects.iter().map(|(id, entry)| (*id, entry)))
    }

    /// Get object counts for a client (for security limits)
    pub fn counts(&self, client: ClientId) -> ObjectCounts {
        let Some(table) = self.clients.get(&client) else {
            return ObjectCounts::default();
        };
        let live = || table.objects.values().filter(|entry| !entry.placeholder);
        ObjectCounts {
            objects: table.live_count(),
            placeholders: table.placeholders,
            surfaces: live()
                .filter(|entry| entry.interface == Interface::Surface)
                .count(),
            buffers: live()
                .filter(|entry| entry.interface == Interface::Buffer)
                .count(),
        }
    }
}

fn insert_entry(
    table: &mut ClientObjects,
    id: ObjectId,
    mut entry: ObjectEntry,
    parent: Option<(ObjectId, ChildBinding)>,
) {
    if !id.is_server_side() {
        table.highest_client_id = table.highest_client_id.max(id.get());
    }
    if let Some((parent_id, binding)) = parent {
        if let Some(parent_entry) = table.objects.get_mut(&parent_id) {
            parent_entry.children.push((id, binding));
            entry.parent = Some(parent_id);
        }
    }
    table.objects.insert(id, entry);
}

/// Remove `id` and its destroy-bound descendants, children first.
/// Invalidate-bound children are detached and made inert, unless
/// `everything` is set (client teardown), in which case they are removed too.
fn collect_post_order(
    table: &mut ClientObjects,
    id: ObjectId,
    everything: bool,
    out: &mut Vec<DestroyedObject>,
) {
    let children = match table.objects.get_mut(&id) {
        Some(entry) => std::mem::take(&mut entry.children),
        None => return,
    };
    for (child, binding) in children {
        match binding {
            ChildBinding::Destroy => collect_post_order(table, child, everything, out),
            ChildBinding::Invalidate if everything => {
                collect_post_order(table, child, everything, out)
            }
            ChildBinding::Invalidate => {
                if let Some(entry) = table.objects.get_mut(&child) {
                    entry.parent = None;
                    entry.inert = true;
                }
            }
        }
    }
    if let Some(entry) = table.objects.remove(&id) {
        if entry.placeholder {
            table.placeholders -= 1;
        }
        out.push(DestroyedObject {
            id,
            interface: entry.interface,
            placeholder: entry.placeholder,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_registration() {
        let mut registry = ObjectRegistry::new(0);
        let client1 = registry.register_client();
        let client2 = registry.register_client();

        assert_eq!(client1, ClientId::new(1));
        assert_eq!(client2, ClientId::new(2));
        assert_eq!(
            registry.lookup(client1, ObjectId::DISPLAY).unwrap().interface,
            Interface::Display
        );
    }

    #[test]
    fn test_lookup_after_destroy_is_gone() {
        let mut registry = ObjectRegistry::new(0);
        let client = registry.register_client();
        let id = ObjectId::new(3);
        registry
            .register(client, id, Interface::Surface, 6, None)
            .unwrap();
        registry.destroy(client, id).unwrap();

        assert_eq!(registry.lookup(client, id).unwrap_err(), LookupError::Gone(id));
        assert_eq!(
            registry.lookup(client, ObjectId::new(4)).unwrap_err(),
            LookupError::Unknown(ObjectId::new(4))
        );
        assert_eq!(registry.destroy(client, id).unwrap_err(), LookupError::Gone(id));
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut registry = ObjectRegistry::new(0);
        let client = registry.register_client();
        registry
            .register(client, ObjectId::new(5), Interface::Region, 1, None)
            .unwrap();
        registry.destroy(client, ObjectId::new(5)).unwrap();

        let err = registry
            .register(client, ObjectId::new(5), Interface::Region, 1, None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::IdNotIncreasing { .. }));
        let err = registry
            .register(client, ObjectId::new(4), Interface::Region, 1, None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::IdNotIncreasing { .. }));
    }

    #[test]
    fn test_server_ids_are_monotonic() {
        let mut registry = ObjectRegistry::new(0);
        let client = registry.register_client();
        let a = registry.allocate_id(client).unwrap();
        let b = registry.allocate_id(client).unwrap();
        assert_eq!(a.get(), ObjectId::SERVER_ID_BASE);
        assert!(b.get() > a.get());
        assert!(matches!(
            registry.register(client, ObjectId::new(b.get() + 1), Interface::Callback, 1, None),
            Err(RegistryError::UnallocatedServerId(_))
        ));
        registry
            .register(client, a, Interface::Callback, 1, None)
            .unwrap();
    }

    #[test]
    fn test_version_ceiling() {
        let mut registry = ObjectRegistry::new(0);
        let client = registry.register_client();
        let err = registry
            .register(client, ObjectId::new(2), Interface::Seat, 9, None)
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnsupportedVersion {
                interface: Interface::Seat,
                version: 9
            }
        );
    }

    #[test]
    fn test_destroy_cascades() {
        let mut registry = ObjectRegistry::new(0);
        let client = registry.register_client();
        let surface = ObjectId::new(3);
        let callback = ObjectId::new(4);
        let role = ObjectId::new(5);
        registry
            .register(client, surface, Interface::Surface, 6, None)
            .unwrap();
        registry
            .register(
                client,
                callback,
                Interface::Callback,
                1,
                Some((surface, ChildBinding::Destroy)),
            )
            .unwrap();
        registry
            .register(
                client,
                role,
                Interface::XdgSurface,
                3,
                Some((surface, ChildBinding::Invalidate)),
            )
            .unwrap();

        let destroyed = registry.destroy(client, surface).unwrap();
        let ids: Vec<ObjectId> = destroyed.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![callback, surface]);
        assert_eq!(
            registry.lookup(client, callback).unwrap_err(),
            LookupError::Gone(callback)
        );
        let role_entry = registry.lookup(client, role).unwrap();
        assert!(role_entry.inert);
        assert_eq!(role_entry.parent, None);
    }

    #[test]
    fn test_limit_and_placeholders() {
        let mut registry = ObjectRegistry::new(2);
        let client = registry.register_client();
        // wl_display already counts as one object
        registry
            .register(client, ObjectId::new(2), Interface::Registry, 1, None)
            .unwrap();
        let err = registry
            .register(client, ObjectId::new(3), Interface::Surface, 6, None)
            .unwrap_err();
        assert_eq!(err, RegistryError::LimitExceeded { limit: 2 });
        assert!(err.to_protocol_error().is_none());

        for id in 3..7 {
            registry
                .register_placeholder(client, ObjectId::new(id), Interface::Surface, 6)
                .unwrap();
        }
        let err = registry
            .register_placeholder(client, ObjectId::new(7), Interface::Surface, 6)
            .unwrap_err();
        assert_eq!(err, RegistryError::TooManyPlaceholders { count: 4 });

        let counts = registry.counts(client);
        assert_eq!(counts.objects, 2);
        assert_eq!(counts.placeholders, 4);
        assert_eq!(counts.surfaces, 0);
    }

    #[test]
    fn test_unregister_children_first() {
        let mut registry = ObjectRegistry::new(0);
        let client = registry.register_client();
        registry
            .register(client, ObjectId::new(3), Interface::Surface, 6, None)
            .unwrap();
        registry
            .register(
                client,
                ObjectId::new(4),
                Interface::Callback,
                1,
                Some((ObjectId::new(3), ChildBinding::Destroy)),
            )
            .unwrap();

        let destroyed = registry.unregister_client(client);
        assert_eq!(destroyed.len(), 3);
        let pos = |id: u32| destroyed.iter().position(|d| d.id == ObjectId::new(id));
        assert!(pos(4) < pos(3));
        assert!(!registry.has_client(client));
        assert_eq!(registry.objects(client).count(), 0);
    }
}
