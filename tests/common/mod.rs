//! Shared helpers for the end-to-end tests: a minimal wire client speaking
//! to the server over a socket pair, and a backend that records what it was
//! handed.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::Duration;

use waycore::backend::{BackendEvent, BackendResult, OutputInfo, RenderBackend, Submission};
use waycore::compositor::BufferHandle;
use waycore::connection::Connection;
use waycore::protocol::*;
use waycore::security::SecurityPolicy;
use waycore::server::{Server, ServerConfig};

/// What the recording backend saw
#[derive(Debug, Default)]
pub struct Record {
    pub submitted: Vec<(SurfaceId, Vec<Rect>)>,
    pub destroyed_surfaces: Vec<SurfaceId>,
    pub destroyed_buffers: Vec<BufferId>,
}

pub struct RecordingBackend {
    record: Rc<RefCell<Record>>,
}

impl RenderBackend for RecordingBackend {
    fn init(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn output_info(&self) -> BackendResult<OutputInfo> {
        Ok(OutputInfo {
            width: 1280,
            height: 720,
            refresh: 60_000,
        })
    }

    fn submit(
        &mut self,
        surface: SurfaceId,
        _buffer: &BufferHandle,
        damage: &[Rect],
    ) -> BackendResult<Submission> {
        self.record
            .borrow_mut()
            .submitted
            .push((surface, damage.to_vec()));
        Ok(Submission::Accepted)
    }

    fn surface_destroyed(&mut self, surface: SurfaceId) -> BackendResult<()> {
        self.record.borrow_mut().destroyed_surfaces.push(surface);
        Ok(())
    }

    fn buffer_destroyed(&mut self, buffer: BufferId) -> BackendResult<()> {
        self.record.borrow_mut().destroyed_buffers.push(buffer);
        Ok(())
    }

    fn poll_events(&mut self) -> BackendResult<Vec<BackendEvent>> {
        Ok(Vec::new())
    }
}

pub fn server(policy: SecurityPolicy) -> (Server, Rc<RefCell<Record>>) {
    server_with(policy, ServerConfig::default())
}

pub fn server_with(policy: SecurityPolicy, config: ServerConfig) -> (Server, Rc<RefCell<Record>>) {
    let record = Rc::new(RefCell::new(Record::default()));
    let backend = Box::new(RecordingBackend {
        record: Rc::clone(&record),
    });
    let server = Server::new(backend, policy, config).unwrap();
    (server, record)
}

/// One event as received by the test client
#[derive(Debug)]
pub struct Message {
    pub object: ObjectId,
    pub opcode: u16,
    pub body: Vec<u8>,
}

impl Message {
    pub fn is(&self, object: ObjectId, opcode: u16) -> bool {
        self.object == object && self.opcode == opcode
    }

    /// Decode a body without file descriptors
    pub fn args(&self, signature: &[ArgKind]) -> Vec<Argument> {
        MessageParser::default()
            .decode_arguments(&self.body, signature, &mut VecDeque::new())
            .unwrap()
    }

    pub fn uint(&self, index: usize) -> u32 {
        let bytes = &self.body[index * 4..index * 4 + 4];
        u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

pub struct TestClient {
    pub id: ClientId,
    conn: Connection,
    encoder: MessageEncoder,
    parser: MessageParser,
    next_id: u32,
    inbox: Vec<u8>,
    fds: VecDeque<OwnedFd>,
    pub closed: bool,
}

impl TestClient {
    pub fn connect(server: &mut Server) -> TestClient {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let id = server.accept(Connection::new(theirs).unwrap()).unwrap();
        TestClient {
            id,
            conn: Connection::new(ours).unwrap(),
            encoder: MessageEncoder::default(),
            parser: MessageParser::default(),
            next_id: 2,
            inbox: Vec::new(),
            fds: VecDeque::new(),
            closed: false,
        }
    }

    pub fn new_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn request(&mut self, object: ObjectId, opcode: u16, args: Vec<Argument>) {
        let message = self.encoder.encode(object, opcode, args).unwrap();
        let fds: Vec<BorrowedFd<'_>> = message.fds.iter().map(|fd| fd.as_fd()).collect();
        let written = self.conn.send(&message.bytes, &fds).unwrap();
        assert_eq!(written, message.bytes.len());
    }

    /// Everything the server has written so far
    pub fn events(&mut self) -> Vec<Message> {
        loop {
            match self.conn.recv(&mut self.inbox, &mut self.fds) {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    self.closed = true;
                    break;
                }
                Err(e) => panic!("recv failed: {}", e),
            }
        }
        let mut messages = Vec::new();
        while let Some((raw, consumed)) = self.parser.split(&self.inbox).unwrap() {
            self.inbox.drain(..consumed);
            messages.push(Message {
                object: raw.header.object_id,
                opcode: raw.header.opcode,
                body: raw.body,
            });
        }
        messages
    }

    /// Let the server process what was sent, then collect its answer
    pub fn roundtrip(&mut self, server: &mut Server) -> Vec<Message> {
        server.run_once(Duration::from_millis(20)).unwrap();
        self.events()
    }

    pub fn get_registry(&mut self) -> ObjectId {
        let registry = self.new_id();
        self.request(ObjectId::DISPLAY, 1, vec![Argument::NewId(registry)]);
        registry
    }

    pub fn bind(&mut self, registry: ObjectId, name: u32, interface: &str, version: u32) -> ObjectId {
        let id = self.new_id();
        self.request(
            registry,
            0,
            vec![
                Argument::Uint(name),
                Argument::Str(Some(interface.to_string())),
                Argument::Uint(version),
                Argument::NewId(id),
            ],
        );
        id
    }

    /// Create a pool backed by a fresh file of `size` bytes
    pub fn create_pool(&mut self, shm: ObjectId, size: i32) -> ObjectId {
        let file = tempfile::tempfile().unwrap();
        file.set_len(size as u64).unwrap();
        let pool = self.new_id();
        self.request(
            shm,
            0,
            vec![
                Argument::NewId(pool),
                Argument::Fd(OwnedFd::from(file)),
                Argument::Int(size),
            ],
        );
        pool
    }

    /// XRGB8888 buffer of `width` x `height` at `offset` in the pool
    pub fn create_buffer(&mut self, pool: ObjectId, offset: i32, width: i32, height: i32) -> ObjectId {
        let buffer = self.new_id();
        self.request(
            pool,
            0,
            vec![
                Argument::NewId(buffer),
                Argument::Int(offset),
                Argument::Int(width),
                Argument::Int(height),
                Argument::Int(width * 4),
                Argument::Uint(PixelFormat::Xrgb8888.code()),
            ],
        );
        buffer
    }

    pub fn create_surface(&mut self, compositor: ObjectId) -> ObjectId {
        let surface = self.new_id();
        self.request(compositor, 0, vec![Argument::NewId(surface)]);
        surface
    }

    pub fn attach(&mut self, surface: ObjectId, buffer: Option<ObjectId>) {
        self.request(
            surface,
            1,
            vec![Argument::Object(buffer), Argument::Int(0), Argument::Int(0)],
        );
    }

    pub fn damage(&mut self, surface: ObjectId, rect: Rect) {
        self.request(
            surface,
            2,
            vec![
                Argument::Int(rect.x),
                Argument::Int(rect.y),
                Argument::Int(rect.width),
                Argument::Int(rect.height),
            ],
        );
    }

    pub fn commit(&mut self, surface: ObjectId) {
        self.request(surface, 6, vec![]);
    }
}

/// The wl_display.error in `events`, as (object, code, message)
pub fn display_error(events: &[Message]) -> Option<(ObjectId, u32, String)> {
    let error = events.iter().find(|m| m.is(ObjectId::DISPLAY, 0))?;
    match &error.args(&[ArgKind::Object, ArgKind::Uint, ArgKind::Str])[..] {
        [Argument::Object(Some(object)), Argument::Uint(code), Argument::Str(Some(message))] => {
            Some((*object, *code, message.clone()))
        }
        other => panic!("malformed error event: {:?}", other),
    }
}

/// Ids released through wl_display.delete_id, in order
pub fn deleted_ids(events: &[Message]) -> Vec<ObjectId> {
    events
        .iter()
        .filter(|m| m.is(ObjectId::DISPLAY, 1))
        .map(|m| ObjectId(m.uint(0)))
        .collect()
}
