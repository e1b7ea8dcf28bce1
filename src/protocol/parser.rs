//! Wayland message parser
//!
//! This module frames messages out of a byte stream and decodes their
//! arguments against a signature. It has no knowledge of protocol semantics.

use super::*;
use byteorder::{ByteOrder, NativeEndian};
use std::collections::VecDeque;
use std::os::fd::OwnedFd;

/// Fixed 8-byte message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub object_id: ObjectId,
    /// Total message size in bytes, header included
    pub size: u16,
    pub opcode: u16,
}

impl MessageHeader {
    /// Read a header from the first 8 bytes of `bytes`
    pub fn read(bytes: &[u8]) -> Self {
        let object_id = ObjectId::new(NativeEndian::read_u32(&bytes[0..4]));
        let word = NativeEndian::read_u32(&bytes[4..8]);
        MessageHeader {
            object_id,
            size: (word >> 16) as u16,
            opcode: (word & 0xffff) as u16,
        }
    }

    pub fn write(&self, buffer: &mut Vec<u8>) {
        let mut bytes = [0u8; HEADER_SIZE];
        NativeEndian::write_u32(&mut bytes[0..4], self.object_id.get());
        NativeEndian::write_u32(&mut bytes[4..8], (self.size as u32) << 16 | self.opcode as u32);
        buffer.extend_from_slice(&bytes);
    }
}

/// Decoded argument value
#[derive(Debug)]
pub enum Argument {
    Int(i32),
    Uint(u32),
    Fixed(Fixed),
    Str(Option<String>),
    Object(Option<ObjectId>),
    NewId(ObjectId),
    Array(Vec<u8>),
    Fd(OwnedFd),
}

impl Argument {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Argument::Int(_) => "int",
            Argument::Uint(_) => "uint",
            Argument::Fixed(_) => "fixed",
            Argument::Str(_) => "string",
            Argument::Object(_) => "object",
            Argument::NewId(_) => "new_id",
            Argument::Array(_) => "array",
            Argument::Fd(_) => "fd",
        }
    }
}

/// A framed message whose body has not been decoded yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub header: MessageHeader,
    pub body: Vec<u8>,
}

/// Outcome of a decode attempt
#[derive(Debug)]
pub enum Decoded {
    Message {
        header: MessageHeader,
        args: Vec<Argument>,
        consumed: usize,
    },
    /// Not enough bytes buffered for a full message yet
    Incomplete,
}

/// Message parser
pub struct MessageParser {
    max_message_size: usize,
}

impl MessageParser {
    pub fn new(max_message_size: usize) -> Self {
        MessageParser {
            max_message_size: max_message_size.clamp(HEADER_SIZE, u16::MAX as usize),
        }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Read and validate the header at the front of `buffer`.
    ///
    /// Size limits are enforced as soon as the header is visible, before the
    /// body has arrived.
    pub fn peek_header(&self, buffer: &[u8]) -> Result<Option<MessageHeader>, WireError> {
        if buffer.len() < HEADER_SIZE {
            return Ok(None);
        }
        let header = MessageHeader::read(buffer);
        let size = header.size as usize;
        if size < HEADER_SIZE {
            return Err(WireError::SizeTooSmall { size });
        }
        if size % 4 != 0 {
            return Err(WireError::Misaligned { size });
        }
        if size > self.max_message_size {
            return Err(WireError::SizeTooLarge {
                size,
                limit: self.max_message_size,
            });
        }
        Ok(Some(header))
    }

    /// Frame one complete message. Returns the message and the number of
    /// bytes it occupied, or `None` when more bytes are needed.
    pub fn split(&self, buffer: &[u8]) -> Result<Option<(RawMessage, usize)>, WireError> {
        let header = match self.peek_header(buffer)? {
            Some(header) => header,
            None => return Ok(None),
        };
        let size = header.size as usize;
        if buffer.len() < size {
            return Ok(None);
        }
        let body = buffer[HEADER_SIZE..size].to_vec();
        Ok(Some((RawMessage { header, body }, size)))
    }

    /// Frame and decode one message in a single step
    pub fn decode(
        &self,
        buffer: &[u8],
        signature: &[ArgKind],
        fds: &mut VecDeque<OwnedFd>,
    ) -> Result<Decoded, WireError> {
        let header = match self.peek_header(buffer)? {
            Some(header) => header,
            None => return Ok(Decoded::Incomplete),
        };
        let size = header.size as usize;
        if buffer.len() < size {
            return Ok(Decoded::Incomplete);
        }
        let args = self.decode_arguments(&buffer[HEADER_SIZE..size], signature, fds)?;
        Ok(Decoded::Message {
            header,
            args,
            consumed: size,
        })
    }

    /// Decode a message body against `signature`, taking file descriptors
    /// from the front of `fds` in order
    pub fn decode_arguments(
        &self,
        body: &[u8],
        signature: &[ArgKind],
        fds: &mut VecDeque<OwnedFd>,
    ) -> Result<Vec<Argument>, WireError> {
        let mut reader = BodyReader::new(body);
        let mut args = Vec::with_capacity(signature.len());

        for kind in signature {
            let arg = match kind {
                ArgKind::Int => Argument::Int(reader.read_u32()? as i32),
                ArgKind::Uint => Argument::Uint(reader.read_u32()?),
                ArgKind::Fixed => Argument::Fixed(Fixed::from_raw(reader.read_u32()? as i32)),
                ArgKind::Str | ArgKind::OptStr => {
                    let value = reader.read_string()?;
                    if value.is_none() && *kind == ArgKind::Str {
                        return Err(WireError::UnexpectedNull { kind: "string" });
                    }
                    Argument::Str(value)
                }
                ArgKind::Object | ArgKind::OptObject => {
                    let id = reader.read_u32()?;
                    if id == 0 {
                        if *kind == ArgKind::Object {
                            return Err(WireError::UnexpectedNull { kind: "object" });
                        }
                        Argument::Object(None)
                    } else {
                        Argument::Object(Some(ObjectId::new(id)))
                    }
                }
                ArgKind::NewId => {
                    let id = reader.read_u32()?;
                    if id == 0 {
                        return Err(WireError::UnexpectedNull { kind: "new_id" });
                    }
                    Argument::NewId(ObjectId::new(id))
                }
                ArgKind::Array => Argument::Array(reader.read_array()?.to_vec()),
                ArgKind::Fd => Argument::Fd(fds.pop_front().ok_or(WireError::MissingFd)?),
            };
            args.push(arg);
        }

        if reader.remaining() != 0 {
            return Err(WireError::TrailingBytes {
                extra: reader.remaining(),
            });
        }
        Ok(args)
    }
}

impl Default for MessageParser {
    fn default() -> Self {
        MessageParser::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

/// Bounds-checked cursor over a message body
struct BodyReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> BodyReader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        BodyReader { buffer, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            return Err(WireError::Truncated {
                offset: self.offset + HEADER_SIZE,
            });
        }
        let bytes = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(NativeEndian::read_u32(self.take(4)?))
    }

    /// Length-prefixed, padded byte run
    fn read_array(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_u32()? as usize;
        // The length is client-controlled; check it against what is left
        // before computing the padded size.
        if len > self.remaining() {
            return Err(WireError::Truncated {
                offset: self.offset + HEADER_SIZE,
            });
        }
        let padded = self.take(padded_len(len))?;
        Ok(&padded[..len])
    }

    fn read_string(&mut self) -> Result<Option<String>, WireError> {
        let bytes = self.read_array()?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let (last, text) = bytes.split_last().ok_or(WireError::UnterminatedString)?;
        if *last != 0 {
            return Err(WireError::UnterminatedString);
        }
        let text = std::str::from_utf8(text).map_err(|_| WireError::InvalidUtf8)?;
        Ok(Some(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(object: u32, opcode: u16, words: &[u32]) -> Vec<u8> {
        let mut buf = Vec::new();
        MessageHeader {
            object_id: ObjectId::new(object),
            size: (HEADER_SIZE + words.len() * 4) as u16,
            opcode,
        }
        .write(&mut buf);
        for word in words {
            buf.extend_from_slice(&word.to_ne_bytes());
        }
        buf
    }

    #[test]
    fn test_header_layout() {
        let buf = message(3, 2, &[7]);
        assert_eq!(buf.len(), 12);
        let header = MessageHeader::read(&buf);
        assert_eq!(header.object_id, ObjectId::new(3));
        assert_eq!(header.size, 12);
        assert_eq!(header.opcode, 2);
    }

    #[test]
    fn test_incomplete_vs_malformed() {
        let parser = MessageParser::default();
        let mut fds = VecDeque::new();
        let buf = message(3, 0, &[1, 2]);

        for cut in 0..buf.len() {
            match parser.decode(&buf[..cut], &[ArgKind::Uint, ArgKind::Int], &mut fds) {
                Ok(Decoded::Incomplete) => {}
                other => panic!("expected incomplete at {}, got {:?}", cut, other),
            }
        }

        let mut bad = Vec::new();
        MessageHeader {
            object_id: ObjectId::new(3),
            size: 4,
            opcode: 0,
        }
        .write(&mut bad);
        assert_eq!(
            parser.decode(&bad, &[], &mut fds).unwrap_err(),
            WireError::SizeTooSmall { size: 4 }
        );
    }

    #[test]
    fn test_rejects_oversized_before_body_arrives() {
        let parser = MessageParser::new(64);
        let mut buf = Vec::new();
        MessageHeader {
            object_id: ObjectId::new(1),
            size: 128,
            opcode: 0,
        }
        .write(&mut buf);
        assert_eq!(
            parser.split(&buf).unwrap_err(),
            WireError::SizeTooLarge { size: 128, limit: 64 }
        );
    }

    #[test]
    fn test_string_decoding() {
        let parser = MessageParser::default();
        let mut fds = VecDeque::new();
        // "wl_shm" + NUL = 7 bytes, padded to 8
        let mut body = 7u32.to_ne_bytes().to_vec();
        body.extend_from_slice(b"wl_shm\0\0");
        let args = parser
            .decode_arguments(&body, &[ArgKind::Str], &mut fds)
            .unwrap();
        match &args[0] {
            Argument::Str(Some(s)) => assert_eq!(s, "wl_shm"),
            other => panic!("unexpected {:?}", other),
        }

        let mut unterminated = 4u32.to_ne_bytes().to_vec();
        unterminated.extend_from_slice(b"abcd");
        assert_eq!(
            parser
                .decode_arguments(&unterminated, &[ArgKind::Str], &mut fds)
                .unwrap_err(),
            WireError::UnterminatedString
        );

        let null = 0u32.to_ne_bytes().to_vec();
        assert_eq!(
            parser
                .decode_arguments(&null, &[ArgKind::Str], &mut fds)
                .unwrap_err(),
            WireError::UnexpectedNull { kind: "string" }
        );
    }

    #[test]
    fn test_array_length_cannot_overrun_body() {
        let parser = MessageParser::default();
        let mut fds = VecDeque::new();
        let mut body = u32::MAX.to_ne_bytes().to_vec();
        body.extend_from_slice(&[0; 4]);
        assert!(matches!(
            parser.decode_arguments(&body, &[ArgKind::Array], &mut fds),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_missing_fd_and_trailing_bytes() {
        let parser = MessageParser::default();
        let mut fds = VecDeque::new();
        assert_eq!(
            parser
                .decode_arguments(&[], &[ArgKind::Fd], &mut fds)
                .unwrap_err(),
            WireError::MissingFd
        );
        assert_eq!(
            parser
                .decode_arguments(&[0; 8], &[ArgKind::Int], &mut fds)
                .unwrap_err(),
            WireError::TrailingBytes { extra: 4 }
        );
    }

    #[test]
    fn test_split_consumes_exactly_one_message() {
        let parser = MessageParser::default();
        let mut buf = message(1, 1, &[2]);
        buf.extend(message(2, 0, &[]));
        let (first, used) = parser.split(&buf).unwrap().unwrap();
        assert_eq!(used, 12);
        assert_eq!(first.header.opcode, 1);
        assert_eq!(first.body, 2u32.to_ne_bytes().to_vec());
        let (second, used) = parser.split(&buf[12..]).unwrap().unwrap();
        assert_eq!(used, 8);
        assert_eq!(second.header.object_id, ObjectId::new(2));
    }
}
