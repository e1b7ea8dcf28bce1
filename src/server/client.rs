//! Client session management
//!
//! This module provides the Client struct which represents an individual
//! client connection: its socket, the bytes and file descriptors received but
//! not yet dispatched, and the events queued but not yet written.

use crate::connection::Connection;
use crate::protocol::*;
use crate::security::Credentials;
use std::collections::VecDeque;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::time::Instant;
use thiserror::Error;

/// Stop reading from a client once this much undispatched input is buffered
const MAX_BUFFERED_INPUT: usize = 64 * 1024;

/// File descriptors a client may have in flight before it is cut off
const MAX_PENDING_FDS: usize = 4 * MAX_FDS_PER_MESSAGE;

/// Failure to queue an event for a client
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("client is not reading; {queued} bytes queued, limit {limit}")]
    Overflow { queued: usize, limit: usize },
}

/// An outstanding xdg_wm_base.ping
#[derive(Debug, Clone, Copy)]
pub struct PendingPing {
    pub serial: u32,
    pub sent: Instant,
    /// Unresponsiveness was already reported for this ping
    pub reported: bool,
}

/// Represents a connected Wayland client
pub struct Client {
    /// Unique client ID assigned by the object registry
    pub id: ClientId,

    pub credentials: Credentials,

    /// The socket to this client
    connection: Connection,

    incoming: Vec<u8>,
    incoming_fds: VecDeque<OwnedFd>,

    outgoing: Vec<u8>,
    /// File descriptors to send, with the offset in `outgoing` of the
    /// message carrying them
    outgoing_fds: VecDeque<(usize, OwnedFd)>,
    /// Ceiling on queued output (0 = unlimited)
    max_output: usize,

    /// The peer closed its end; remaining input is still dispatched
    closed: bool,

    /// Bound xdg_wm_base objects, pinged through the first one
    pub wm_bases: Vec<ObjectId>,
    pub pending_ping: Option<PendingPing>,
    pub last_pong: Instant,
}

impl Client {
    /// Create a new client session
    pub fn new(
        id: ClientId,
        credentials: Credentials,
        connection: Connection,
        max_output: usize,
    ) -> Self {
        Client {
            id,
            credentials,
            connection,
            incoming: Vec::new(),
            incoming_fds: VecDeque::new(),
            outgoing: Vec::new(),
            outgoing_fds: VecDeque::new(),
            max_output,
            closed: false,
            wm_bases: Vec::new(),
            pending_ping: None,
            last_pong: Instant::now(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read everything the socket has for us. Returns false once the peer
    /// has closed the connection.
    pub fn read_available(&mut self) -> io::Result<bool> {
        while self.incoming.len() < MAX_BUFFERED_INPUT {
            match self
                .connection
                .recv(&mut self.incoming, &mut self.incoming_fds)
            {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(!self.closed)
    }

    /// Frame the next complete message out of the input buffer
    pub fn next_message(&mut self, parser: &MessageParser) -> Result<Option<RawMessage>, WireError> {
        if self.incoming_fds.len() > MAX_PENDING_FDS {
            return Err(WireError::TooManyFds {
                count: self.incoming_fds.len(),
            });
        }
        match parser.split(&self.incoming)? {
            Some((message, consumed)) => {
                self.incoming.drain(..consumed);
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    /// Received file descriptors not yet claimed by a message
    pub fn fds_mut(&mut self) -> &mut VecDeque<OwnedFd> {
        &mut self.incoming_fds
    }

    /// Encode an event into the output buffer
    pub fn queue(
        &mut self,
        encoder: &MessageEncoder,
        object: ObjectId,
        event: Event,
    ) -> Result<(), SendError> {
        let start = self.outgoing.len();
        let opcode = event.opcode();
        let mut fds = Vec::new();
        encoder.encode_into(object, opcode, event.into_arguments(), &mut self.outgoing, &mut fds)?;
        self.outgoing_fds.extend(fds.into_iter().map(|fd| (start, fd)));

        if self.max_output > 0 && self.outgoing.len() > self.max_output {
            return Err(SendError::Overflow {
                queued: self.outgoing.len(),
                limit: self.max_output,
            });
        }
        Ok(())
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Write as much queued output as the socket takes without blocking.
    ///
    /// File descriptors go out with the first byte of their message, so a
    /// single write never crosses into a message that carries descriptors.
    pub fn flush(&mut self) -> io::Result<()> {
        while !self.outgoing.is_empty() {
            let limit = self
                .outgoing_fds
                .iter()
                .map(|(offset, _)| *offset)
                .find(|offset| *offset > 0)
                .unwrap_or(self.outgoing.len());

            let result = {
                let fds: Vec<BorrowedFd<'_>> = self
                    .outgoing_fds
                    .iter()
                    .take_while(|(offset, _)| *offset == 0)
                    .take(MAX_FDS_PER_MESSAGE)
                    .map(|(_, fd)| fd.as_fd())
                    .collect();
                self.connection
                    .send(&self.outgoing[..limit], &fds)
                    .map(|written| (written, fds.len()))
            };

            match result {
                Ok((0, _)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write queued events",
                    ))
                }
                Ok((written, sent_fds)) => {
                    self.outgoing_fds.drain(..sent_fds);
                    self.outgoing.drain(..written);
                    for (offset, _) in self.outgoing_fds.iter_mut() {
                        *offset = offset.saturating_sub(written);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.connection.shutdown();
    }
}

impl AsFd for Client {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.connection.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    fn client_pair(max_output: usize) -> (Client, Connection) {
        let (a, b) = UnixStream::pair().unwrap();
        let credentials = Credentials {
            pid: 1,
            uid: 0,
            gid: 0,
        };
        let client = Client::new(ClientId(1), credentials, Connection::new(a).unwrap(), max_output);
        (client, Connection::new(b).unwrap())
    }

    #[test]
    fn test_messages_framed_across_reads() {
        let (mut client, peer) = client_pair(0);
        let parser = MessageParser::default();
        let encoder = MessageEncoder::default();
        let message = encoder
            .encode(ObjectId(1), 0, vec![Argument::NewId(ObjectId(2))])
            .unwrap();

        peer.send(&message.bytes[..6], &[]).unwrap();
        assert!(client.read_available().unwrap());
        assert!(client.next_message(&parser).unwrap().is_none());

        peer.send(&message.bytes[6..], &[]).unwrap();
        client.read_available().unwrap();
        let raw = client.next_message(&parser).unwrap().unwrap();
        assert_eq!(raw.header.object_id, ObjectId(1));
        assert_eq!(raw.body.len(), 4);
    }

    #[test]
    fn test_eof_reported_after_input() {
        let (mut client, peer) = client_pair(0);
        drop(peer);
        assert!(!client.read_available().unwrap());
        assert!(client.is_closed());
    }

    #[test]
    fn test_queued_fd_arrives_with_its_message() {
        let (mut client, peer) = client_pair(0);
        let encoder = MessageEncoder::default();
        client
            .queue(&encoder, ObjectId(3), Event::CallbackDone { data: 1 })
            .unwrap();
        let file = tempfile::tempfile().unwrap();
        client
            .queue(
                &encoder,
                ObjectId(4),
                Event::KeyboardKeymap {
                    format: keymap_format::XKB_V1,
                    fd: OwnedFd::from(file),
                    size: 16,
                },
            )
            .unwrap();
        client.flush().unwrap();
        assert!(!client.has_pending_output());

        let mut bytes = Vec::new();
        let mut fds = VecDeque::new();
        while bytes.len() < 28 {
            peer.recv(&mut bytes, &mut fds).unwrap();
        }
        assert_eq!(bytes.len(), 28);
        assert_eq!(fds.len(), 1);
        let header = MessageHeader::read(&bytes[12..]);
        assert_eq!(header.object_id, ObjectId(4));
    }

    #[test]
    fn test_output_ceiling() {
        let (mut client, _peer) = client_pair(16);
        let encoder = MessageEncoder::default();
        client
            .queue(&encoder, ObjectId(3), Event::CallbackDone { data: 1 })
            .unwrap();
        let err = client
            .queue(&encoder, ObjectId(3), Event::CallbackDone { data: 2 })
            .unwrap_err();
        assert!(matches!(err, SendError::Overflow { queued: 24, limit: 16 }));
    }
}
