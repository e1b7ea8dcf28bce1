//! End-to-end tests of the xdg-shell flow: configure handshake, mapping,
//! keyboard focus and liveness pings.

mod common;

use common::*;
use std::time::Duration;
use waycore::protocol::*;
use waycore::security::SecurityPolicy;
use waycore::server::{Server, ServerConfig};

struct Window {
    keyboard: ObjectId,
    buffer: ObjectId,
    surface: ObjectId,
    xdg_surface: ObjectId,
    toplevel: ObjectId,
    wm_base: ObjectId,
    seat: ObjectId,
}

/// Bind everything a toplevel needs and send the initial commit
fn create_window(client: &mut TestClient) -> Window {
    let registry = client.get_registry();
    let compositor = client.bind(registry, 1, "wl_compositor", 4);
    let shm = client.bind(registry, 2, "wl_shm", 1);
    let seat = client.bind(registry, 4, "wl_seat", 5);
    let wm_base = client.bind(registry, 5, "xdg_wm_base", 3);
    let keyboard = client.new_id();
    client.request(seat, 1, vec![Argument::NewId(keyboard)]);

    let pool = client.create_pool(shm, 32 * 32 * 4);
    let buffer = client.create_buffer(pool, 0, 32, 32);
    let surface = client.create_surface(compositor);
    let xdg_surface = client.new_id();
    client.request(
        wm_base,
        2,
        vec![Argument::NewId(xdg_surface), Argument::Object(Some(surface))],
    );
    let toplevel = client.new_id();
    client.request(xdg_surface, 1, vec![Argument::NewId(toplevel)]);
    client.request(toplevel, 2, vec![Argument::Str(Some("hello".to_string()))]);
    client.commit(surface);

    Window {
        keyboard,
        buffer,
        surface,
        xdg_surface,
        toplevel,
        wm_base,
        seat,
    }
}

/// Serial of the xdg_surface.configure in `events`
fn configure_serial(events: &[Message], xdg_surface: ObjectId) -> u32 {
    events
        .iter()
        .find(|m| m.is(xdg_surface, 0))
        .map(|m| m.uint(0))
        .expect("no xdg_surface.configure")
}

#[test]
fn test_toplevel_maps_after_configure_handshake() {
    let (mut server, record) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let window = create_window(&mut client);
    let events = client.roundtrip(&mut server);
    assert!(display_error(&events).is_none());

    // The role configure comes first, then xdg_surface.configure
    let role = events.iter().position(|m| m.is(window.toplevel, 0)).unwrap();
    let xdg = events.iter().position(|m| m.is(window.xdg_surface, 0)).unwrap();
    assert!(role < xdg);
    let serial = configure_serial(&events, window.xdg_surface);

    let id = SurfaceId::new(client.id, window.surface);
    assert!(!server.surfaces().is_mapped(id));

    client.request(window.xdg_surface, 4, vec![Argument::Uint(serial)]);
    client.attach(window.surface, Some(window.buffer));
    client.commit(window.surface);
    let events = client.roundtrip(&mut server);
    assert!(display_error(&events).is_none());

    assert!(server.surfaces().is_mapped(id));
    let seat = server.input().seat(server.default_seat()).unwrap();
    assert_eq!(seat.keyboard_focus, Some(id));
    assert!(events.iter().any(|m| m.is(window.keyboard, 1)));
    assert!(record.borrow().submitted.iter().any(|(surface, _)| *surface == id));
    assert!(server
        .composition_list()
        .iter()
        .any(|snapshot| snapshot.id == id));
}

#[test]
fn test_buffer_before_configure_is_rejected() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let window = create_window(&mut client);
    client.roundtrip(&mut server);

    client.attach(window.surface, Some(window.buffer));
    client.commit(window.surface);
    let events = client.roundtrip(&mut server);

    let (object, code, _) = display_error(&events).unwrap();
    assert_eq!(object, window.xdg_surface);
    assert_eq!(code, codes::xdg_surface::UNCONFIGURED_BUFFER);
    assert!(server.client_ids().is_empty());
}

#[test]
fn test_wm_base_outliving_surfaces() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let window = create_window(&mut client);
    client.roundtrip(&mut server);

    client.request(window.wm_base, 0, vec![]);
    let events = client.roundtrip(&mut server);

    let (object, code, _) = display_error(&events).unwrap();
    assert_eq!(object, window.wm_base);
    assert_eq!(code, codes::xdg_wm_base::DEFUNCT_SURFACES);
}

#[test]
fn test_invalid_resize_edge() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let window = create_window(&mut client);
    client.roundtrip(&mut server);

    client.request(
        window.toplevel,
        6,
        vec![
            Argument::Object(Some(window.seat)),
            Argument::Uint(0),
            Argument::Uint(3),
        ],
    );
    let events = client.roundtrip(&mut server);

    let (object, code, _) = display_error(&events).unwrap();
    assert_eq!(object, window.toplevel);
    assert_eq!(code, codes::xdg_toplevel::INVALID_RESIZE_EDGE);
}

#[test]
fn test_close_request_reaches_toplevel() {
    let (mut server, _) = server(SecurityPolicy::permissive());
    let mut client = TestClient::connect(&mut server);
    let window = create_window(&mut client);
    client.roundtrip(&mut server);

    server.request_close(SurfaceId::new(client.id, window.surface));
    server.flush_clients();
    let events = client.events();
    assert!(events.iter().any(|m| m.is(window.toplevel, 1)));
}

fn pinging_server() -> Server {
    let config = ServerConfig {
        ping_interval: Duration::ZERO,
        ping_timeout: Duration::from_secs(60),
        ..ServerConfig::default()
    };
    server_with(SecurityPolicy::permissive(), config).0
}

#[test]
fn test_ping_answered_with_pong() {
    let mut server = pinging_server();
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    let wm_base = client.bind(registry, 5, "xdg_wm_base", 3);
    let events = client.roundtrip(&mut server);

    let ping = events.iter().find(|m| m.is(wm_base, 0)).expect("no ping");
    let serial = ping.uint(0);
    let pending = server.client(client.id).unwrap().pending_ping.unwrap();
    assert_eq!(pending.serial, serial);

    client.request(wm_base, 3, vec![Argument::Uint(serial)]);
    server.run_once(Duration::from_millis(20)).unwrap();
    let state = server.client(client.id).unwrap();
    // A fresh ping may already be out, but not the one just answered
    assert!(state.pending_ping.map_or(true, |ping| ping.serial != serial));
}

#[test]
fn test_unanswered_ping_reported_once() {
    let config = ServerConfig {
        ping_interval: Duration::ZERO,
        ping_timeout: Duration::ZERO,
        ..ServerConfig::default()
    };
    let (mut server, _) = server_with(SecurityPolicy::permissive(), config);
    let subscriber = server.subscribe();
    let mut client = TestClient::connect(&mut server);
    let registry = client.get_registry();
    client.bind(registry, 5, "xdg_wm_base", 3);
    for _ in 0..3 {
        client.roundtrip(&mut server);
    }

    let reports = subscriber
        .try_iter()
        .filter(|n| matches!(n, waycore::server::Notification::ClientUnresponsive(id) if *id == client.id))
        .count();
    assert_eq!(reports, 1);
    // Unresponsive clients stay connected
    assert_eq!(server.client_ids(), vec![client.id]);
}
