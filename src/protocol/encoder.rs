//! Wayland message encoder
//!
//! This module serializes events to the wire format. File descriptors are
//! split off and returned separately so the transport can send them as
//! ancillary data.

use super::*;
use byteorder::{ByteOrder, NativeEndian};
use std::os::fd::OwnedFd;

/// Encoded message ready for the transport
#[derive(Debug)]
pub struct EncodedMessage {
    pub bytes: Vec<u8>,
    pub fds: Vec<OwnedFd>,
}

/// Event encoder
pub struct MessageEncoder {
    max_message_size: usize,
}

impl MessageEncoder {
    pub fn new(max_message_size: usize) -> Self {
        MessageEncoder {
            max_message_size: max_message_size.clamp(HEADER_SIZE, u16::MAX as usize),
        }
    }

    /// Encode one message into a fresh buffer
    pub fn encode(
        &self,
        object_id: ObjectId,
        opcode: u16,
        args: Vec<Argument>,
    ) -> Result<EncodedMessage, WireError> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + args.len() * 4);
        let mut fds = Vec::new();
        self.encode_into(object_id, opcode, args, &mut bytes, &mut fds)?;
        Ok(EncodedMessage { bytes, fds })
    }

    /// Append one message to `bytes`, pushing its fds onto `fds`.
    ///
    /// On error nothing is appended.
    pub fn encode_into(
        &self,
        object_id: ObjectId,
        opcode: u16,
        args: Vec<Argument>,
        bytes: &mut Vec<u8>,
        fds: &mut Vec<OwnedFd>,
    ) -> Result<(), WireError> {
        let start = bytes.len();
        // Header placeholder, patched once the size is known
        bytes.extend_from_slice(&[0u8; HEADER_SIZE]);

        let mut new_fds = Vec::new();
        for arg in args {
            match arg {
                Argument::Int(value) => write_u32(bytes, value as u32),
                Argument::Uint(value) => write_u32(bytes, value),
                Argument::Fixed(value) => write_u32(bytes, value.raw() as u32),
                Argument::Str(None) => write_u32(bytes, 0),
                Argument::Str(Some(text)) => {
                    let mut data = text.into_bytes();
                    data.push(0);
                    write_array(bytes, &data);
                }
                Argument::Object(id) => write_u32(bytes, id.map(|id| id.get()).unwrap_or(0)),
                Argument::NewId(id) => write_u32(bytes, id.get()),
                Argument::Array(data) => write_array(bytes, &data),
                Argument::Fd(fd) => new_fds.push(fd),
            }
        }

        let size = bytes.len() - start;
        if size > self.max_message_size {
            bytes.truncate(start);
            return Err(WireError::SizeTooLarge {
                size,
                limit: self.max_message_size,
            });
        }

        NativeEndian::write_u32(&mut bytes[start..start + 4], object_id.get());
        NativeEndian::write_u32(
            &mut bytes[start + 4..start + 8],
            (size as u32) << 16 | opcode as u32,
        );
        fds.extend(new_fds);
        Ok(())
    }
}

impl Default for MessageEncoder {
    fn default() -> Self {
        MessageEncoder::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

fn write_u32(buffer: &mut Vec<u8>, value: u32) {
    let mut word = [0u8; 4];
    NativeEndian::write_u32(&mut word, value);
    buffer.extend_from_slice(&word);
}

fn write_array(buffer: &mut Vec<u8>, data: &[u8]) {
    write_u32(buffer, data.len() as u32);
    buffer.extend_from_slice(data);
    buffer.extend(std::iter::repeat(0u8).take(pad(data.len())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn test_encode_global_event() {
        let encoder = MessageEncoder::default();
        let msg = encoder
            .encode(
                ObjectId::new(2),
                0,
                vec![
                    Argument::Uint(1),
                    Argument::Str(Some("wl_compositor".to_string())),
                    Argument::Uint(6),
                ],
            )
            .unwrap();
        // header + name + (len + 14 bytes padded to 16) + version
        assert_eq!(msg.bytes.len(), 8 + 4 + 4 + 16 + 4);
        assert!(msg.fds.is_empty());

        let parser = MessageParser::default();
        let mut fds = VecDeque::new();
        match parser
            .decode(&msg.bytes, &[ArgKind::Uint, ArgKind::Str, ArgKind::Uint], &mut fds)
            .unwrap()
        {
            Decoded::Message {
                header,
                args,
                consumed,
            } => {
                assert_eq!(header.object_id, ObjectId::new(2));
                assert_eq!(consumed, msg.bytes.len());
                assert!(matches!(&args[1], Argument::Str(Some(name)) if name == "wl_compositor"));
            }
            Decoded::Incomplete => panic!("message should be complete"),
        }
    }

    #[test]
    fn test_oversized_message_leaves_buffer_untouched() {
        let encoder = MessageEncoder::new(32);
        let mut bytes = vec![1, 2, 3, 4];
        let mut fds = Vec::new();
        let err = encoder
            .encode_into(
                ObjectId::new(5),
                0,
                vec![Argument::Array(vec![0u8; 64])],
                &mut bytes,
                &mut fds,
            )
            .unwrap_err();
        assert!(matches!(err, WireError::SizeTooLarge { .. }));
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_fds_are_out_of_band() {
        let file = tempfile::tempfile().unwrap();
        let encoder = MessageEncoder::default();
        let msg = encoder
            .encode(
                ObjectId::new(9),
                0,
                vec![
                    Argument::Uint(1),
                    Argument::Fd(OwnedFd::from(file)),
                    Argument::Uint(4096),
                ],
            )
            .unwrap();
        assert_eq!(msg.bytes.len(), 16);
        assert_eq!(msg.fds.len(), 1);
    }
}
