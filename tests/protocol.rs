//! End-to-end tests of the core protocol: registry, callbacks, shared memory
//! buffers, error handling and resource ceilings, driven over a real socket.

mod common;

use common::*;
use std::os::unix::net::UnixStream;
use waycore::connection::Connection;
use waycore::protocol::*;
use waycore::security::{RejectReason, SecurityPolicy};
use waycore::server::Notification;

#[test]
fn test_registry_advertises_globals() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    let events = client.roundtrip(&mut server);

    let globals: Vec<(u32, String, u32)> = events
        .iter()
        .filter(|m| m.is(registry, 0))
        .map(|m| match &m.args(&[ArgKind::Uint, ArgKind::Str, ArgKind::Uint])[..] {
            [Argument::Uint(name), Argument::Str(Some(interface)), Argument::Uint(version)] => {
                (*name, interface.clone(), *version)
            }
            other => panic!("malformed global: {:?}", other),
        })
        .collect();
    assert_eq!(
        globals,
        vec![
            (1, "wl_compositor".to_string(), 6),
            (2, "wl_shm".to_string(), 2),
            (3, "wl_subcompositor".to_string(), 1),
            (4, "wl_seat".to_string(), 5),
            (5, "xdg_wm_base".to_string(), 3),
        ]
    );
}

#[test]
fn test_sync_callback_then_delete_id() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let callback = client.new_id();
    client.request(ObjectId::DISPLAY, 0, vec![Argument::NewId(callback)]);
    let events = client.roundtrip(&mut server);

    let done = events.iter().position(|m| m.is(callback, 0)).unwrap();
    let deleted = events.iter().position(|m| m.is(ObjectId::DISPLAY, 1)).unwrap();
    assert!(done < deleted);
    assert_eq!(deleted_ids(&events), vec![callback]);
    assert!(server.registry().lookup(client.id, callback).is_err());
}

#[test]
fn test_bind_rejects_unsupported_version() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    client.bind(registry, 1, "wl_compositor", 7);
    let events = client.roundtrip(&mut server);

    let (object, code, message) = display_error(&events).unwrap();
    assert_eq!(object, registry);
    assert_eq!(code, DisplayErrorCode::InvalidObject as u32);
    assert!(message.contains("wl_compositor"));
    assert!(server.client_ids().is_empty());
}

#[test]
fn test_bind_rejects_interface_mismatch() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    client.bind(registry, 2, "wl_compositor", 1);
    let events = client.roundtrip(&mut server);

    let (object, _, _) = display_error(&events).unwrap();
    assert_eq!(object, registry);
    assert!(server.client_ids().is_empty());
}

#[test]
fn test_unknown_object_is_fatal() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let subscriber = server.subscribe();
    let mut client = TestClient::connect(&mut server);
    let id = client.id;
    client.request(ObjectId(42), 0, vec![]);
    let events = client.roundtrip(&mut server);

    let (object, code, _) = display_error(&events).unwrap();
    assert_eq!(object, ObjectId::DISPLAY);
    assert_eq!(code, DisplayErrorCode::InvalidObject as u32);
    assert!(server.client_ids().is_empty());
    assert!(subscriber.try_iter().any(|n| matches!(
        n,
        Notification::ClientDisconnected { client, .. } if client == id
    )));

    // The connection is closed after the error
    client.events();
    assert!(client.closed);
}

#[test]
fn test_reused_id_is_fatal() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, "wl_compositor", 4);
    let surface = client.create_surface(compositor);
    client.request(compositor, 0, vec![Argument::NewId(surface)]);
    let events = client.roundtrip(&mut server);

    let (_, code, _) = display_error(&events).unwrap();
    assert_eq!(code, DisplayErrorCode::InvalidObject as u32);
    assert!(server.client_ids().is_empty());
}

#[test]
fn test_unknown_opcode_is_invalid_method() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, "wl_compositor", 4);
    let surface = client.create_surface(compositor);
    // wl_surface.offset only exists from version 5
    client.request(surface, 10, vec![Argument::Int(1), Argument::Int(1)]);
    let events = client.roundtrip(&mut server);

    let (object, code, _) = display_error(&events).unwrap();
    assert_eq!(object, surface);
    assert_eq!(code, DisplayErrorCode::InvalidMethod as u32);
}

#[test]
fn test_shm_buffer_commit_and_release() {
    let (mut server, record) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, "wl_compositor", 4);
    let shm = client.bind(registry, 2, "wl_shm", 1);
    let events = client.roundtrip(&mut server);
    let formats: Vec<u32> = events.iter().filter(|m| m.is(shm, 0)).map(|m| m.uint(0)).collect();
    assert_eq!(formats, vec![0, 1]);

    let pool = client.create_pool(shm, 2 * 20 * 20 * 4);
    let first = client.create_buffer(pool, 0, 20, 20);
    let second = client.create_buffer(pool, 20 * 20 * 4, 20, 20);
    let surface = client.create_surface(compositor);
    client.attach(surface, Some(first));
    client.damage(surface, Rect::new(0, 0, 20, 20));
    client.commit(surface);
    let events = client.roundtrip(&mut server);
    assert!(display_error(&events).is_none());

    let id = SurfaceId::new(client.id, surface);
    let state = server.surfaces().surface(id).unwrap();
    assert_eq!(state.current.buffer, Some(first));
    assert_eq!(record.borrow().submitted.len(), 1);
    assert_eq!(record.borrow().submitted[0].0, id);

    // Replacing the content releases the first buffer
    client.attach(surface, Some(second));
    client.damage(surface, Rect::new(0, 0, 5, 5));
    client.commit(surface);
    let events = client.roundtrip(&mut server);
    assert!(events.iter().any(|m| m.is(first, 0)));
    assert!(!events.iter().any(|m| m.is(second, 0)));
    assert_eq!(record.borrow().submitted.len(), 2);
}

#[test]
fn test_buffer_outside_pool_is_rejected() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    let shm = client.bind(registry, 2, "wl_shm", 1);
    let pool = client.create_pool(shm, 1024);
    client.create_buffer(pool, 0, 20, 20);
    let events = client.roundtrip(&mut server);

    let (object, code, _) = display_error(&events).unwrap();
    assert_eq!(object, pool);
    assert_eq!(code, codes::shm::INVALID_STRIDE);
}

#[test]
fn test_object_ceiling_yields_placeholders() {
    let policy = SecurityPolicy {
        max_objects_per_client: 4,
        ..SecurityPolicy::permissive()
    };
    let (mut server, _) = server(policy);
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, "wl_compositor", 4);
    let kept = client.create_surface(compositor);
    let refused = client.create_surface(compositor);
    client.roundtrip(&mut server);

    let entry = server.registry().lookup(client.id, refused).unwrap();
    assert!(entry.placeholder);
    assert!(server
        .surfaces()
        .surface(SurfaceId::new(client.id, refused))
        .is_none());

    // Requests on the placeholder are ignored, its destructor frees the id
    client.commit(refused);
    client.request(refused, 0, vec![]);
    let events = client.roundtrip(&mut server);
    assert!(display_error(&events).is_none());
    assert_eq!(deleted_ids(&events), vec![refused]);
    assert_eq!(server.client_ids(), vec![client.id]);

    // Freeing a real object makes room again
    client.request(kept, 0, vec![]);
    let surface = client.create_surface(compositor);
    let events = client.roundtrip(&mut server);
    assert_eq!(deleted_ids(&events), vec![kept]);
    assert!(!server.registry().lookup(client.id, surface).unwrap().placeholder);
}

#[test]
fn test_surface_ceiling_yields_placeholders() {
    let policy = SecurityPolicy {
        max_surfaces_per_client: 1,
        ..SecurityPolicy::permissive()
    };
    let (mut server, _) = server(policy);
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, "wl_compositor", 4);
    client.create_surface(compositor);
    let refused = client.create_surface(compositor);
    let events = client.roundtrip(&mut server);

    assert!(display_error(&events).is_none());
    assert!(server.registry().lookup(client.id, refused).unwrap().placeholder);
}

#[test]
fn test_disconnect_tears_down_client_state() {
    let (mut server, record) = server(SecurityPolicy::permissive());
    let subscriber = server.subscribe();
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, "wl_compositor", 4);
    let shm = client.bind(registry, 2, "wl_shm", 1);
    let pool = client.create_pool(shm, 16 * 16 * 4);
    let buffer = client.create_buffer(pool, 0, 16, 16);
    let surface = client.create_surface(compositor);
    client.attach(surface, Some(buffer));
    client.commit(surface);
    client.roundtrip(&mut server);

    let id = client.id;
    drop(client);
    server
        .run_once(std::time::Duration::from_millis(20))
        .unwrap();

    assert!(server.client_ids().is_empty());
    assert!(server.surfaces().surface(SurfaceId::new(id, surface)).is_none());
    assert!(server.registry().lookup(id, surface).is_err());
    assert!(!server.registry().has_client(id));
    let record = record.borrow();
    assert_eq!(record.destroyed_surfaces, vec![SurfaceId::new(id, surface)]);
    assert_eq!(record.destroyed_buffers, vec![BufferId::new(id, buffer)]);
    assert!(subscriber.try_iter().any(|n| matches!(
        n,
        Notification::ClientDisconnected { client, .. } if client == id
    )));
}

#[test]
fn test_frame_callback_fires_after_commit() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, "wl_compositor", 4);
    let shm = client.bind(registry, 2, "wl_shm", 1);
    let pool = client.create_pool(shm, 8 * 8 * 4);
    let buffer = client.create_buffer(pool, 0, 8, 8);
    let surface = client.create_surface(compositor);
    let callback = client.new_id();
    client.request(surface, 3, vec![Argument::NewId(callback)]);
    client.attach(surface, Some(buffer));
    client.commit(surface);

    let mut events = client.roundtrip(&mut server);
    for _ in 0..10 {
        if events.iter().any(|m| m.is(callback, 0)) {
            break;
        }
        std::thread::sleep(server.config().frame_interval);
        events.extend(client.roundtrip(&mut server));
    }
    assert!(events.iter().any(|m| m.is(callback, 0)));
    assert!(deleted_ids(&events).contains(&callback));
}

#[test]
fn test_request_on_destroyed_object_is_fatal() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, "wl_compositor", 4);
    let surface = client.create_surface(compositor);
    client.request(surface, 0, vec![]);
    let events = client.roundtrip(&mut server);
    assert_eq!(deleted_ids(&events), vec![surface]);

    client.commit(surface);
    let events = client.roundtrip(&mut server);
    let (_, code, message) = display_error(&events).unwrap();
    assert_eq!(code, DisplayErrorCode::InvalidObject as u32);
    assert!(message.contains("destroyed"));
    assert!(server.client_ids().is_empty());
}

#[test]
fn test_disconnect_leaves_other_clients_untouched() {
    let (mut server, record) = server(SecurityPolicy::permissive());
    let mut first = TestClient::connect(&mut server);
    let mut second = TestClient::connect(&mut server);
    let mut surfaces = Vec::new();
    for client in [&mut first, &mut second] {
        let registry = client.get_registry();
        let compositor = client.bind(registry, 1, "wl_compositor", 4);
        let seat = client.bind(registry, 4, "wl_seat", 5);
        let keyboard = client.new_id();
        client.request(seat, 1, vec![Argument::NewId(keyboard)]);
        let shm = client.bind(registry, 2, "wl_shm", 1);
        let pool = client.create_pool(shm, 10 * 10 * 4);
        let buffer = client.create_buffer(pool, 0, 10, 10);
        let surface = client.create_surface(compositor);
        client.attach(surface, Some(buffer));
        client.commit(surface);
        client.roundtrip(&mut server);
        surfaces.push((SurfaceId::new(client.id, surface), BufferId::new(client.id, buffer)));
    }
    let (gone, gone_buffer) = surfaces[0];
    let (kept, kept_buffer) = surfaces[1];
    assert!(server.focus(Some(kept)));
    server.flush_clients();
    second.events();

    let first_id = first.id;
    drop(first);
    let events = second.roundtrip(&mut server);

    assert_eq!(server.client_ids(), vec![second.id]);
    assert!(!server.registry().has_client(first_id));
    assert!(server.surfaces().surface(kept).is_some());
    assert!(server.surfaces().buffer(kept_buffer).is_some());
    let seat = server.input().seat(server.default_seat()).unwrap();
    assert_eq!(seat.keyboard_focus, Some(kept));
    assert!(events.is_empty());

    let record = record.borrow();
    assert_eq!(record.destroyed_surfaces, vec![gone]);
    assert_eq!(record.destroyed_buffers, vec![gone_buffer]);
}

#[test]
fn test_peer_outside_allow_list_is_rejected() {
    let uid = nix::unistd::getuid().as_raw();
    let policy = SecurityPolicy {
        allowed_uids: vec![uid.wrapping_add(1)],
        ..SecurityPolicy::default()
    };
    let (mut server, _) = server(policy);
    let subscriber = server.subscribe();

    let (_ours, theirs) = UnixStream::pair().unwrap();
    let result = server.accept(Connection::new(theirs).unwrap());

    assert!(matches!(result, Err(RejectReason::NotAllowed { uid: peer, .. }) if peer == uid));
    assert!(server.client_ids().is_empty());
    assert_eq!(server.registry().clients().count(), 0);
    assert!(!subscriber
        .try_iter()
        .any(|n| matches!(n, Notification::ClientConnected { .. })));
}

#[test]
fn test_client_limit_rejects_extra_peers() {
    let policy = SecurityPolicy {
        max_clients: 1,
        ..SecurityPolicy::permissive()
    };
    let (mut server, _) = server(policy);
    let first = TestClient::connect(&mut server);

    let (_ours, theirs) = UnixStream::pair().unwrap();
    let result = server.accept(Connection::new(theirs).unwrap());
    assert_eq!(result, Err(RejectReason::TooManyClients(1)));
    assert_eq!(server.client_ids(), vec![first.id]);
}
