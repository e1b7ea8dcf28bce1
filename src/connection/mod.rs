//! Connection layer
//!
//! This module handles Unix socket connections from Wayland clients: the
//! listening socket under `$XDG_RUNTIME_DIR`, and per-client streams carrying
//! bytes plus file descriptors (SCM_RIGHTS) in both directions.

use crate::protocol::MAX_FDS_PER_MESSAGE;
use crate::security::Credentials;
use nix::sys::socket::{
    getsockopt, recvmsg, sendmsg, sockopt::PeerCredentials, ControlMessage, ControlMessageOwned,
    MsgFlags,
};
use std::collections::VecDeque;
use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

/// Size of a single read from the socket
const READ_CHUNK: usize = 4096;

fn nix_to_io(err: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(err as i32)
}

/// A client connection
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
}

impl Connection {
    pub fn new(stream: UnixStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Connection { stream })
    }

    /// Credentials of the peer process
    pub fn credentials(&self) -> io::Result<Credentials> {
        let creds = getsockopt(&self.stream, PeerCredentials).map_err(nix_to_io)?;
        Ok(Credentials {
            pid: creds.pid(),
            uid: creds.uid(),
            gid: creds.gid(),
        })
    }

    /// Read available data, appending bytes to `buf` and received file
    /// descriptors to `fds`. Returns the number of bytes read; 0 means the
    /// peer closed the connection.
    pub fn recv(&self, buf: &mut Vec<u8>, fds: &mut VecDeque<OwnedFd>) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut cmsg_buf = nix::cmsg_space!([RawFd; MAX_FDS_PER_MESSAGE]);
        let (bytes, received) = {
            let mut iov = [IoSliceMut::new(&mut chunk)];
            let msg = recvmsg::<()>(
                self.stream.as_raw_fd(),
                &mut iov,
                Some(&mut cmsg_buf),
                MsgFlags::MSG_CMSG_CLOEXEC | MsgFlags::MSG_DONTWAIT,
            )
            .map_err(nix_to_io)?;
            let mut received = Vec::new();
            for cmsg in msg.cmsgs().map_err(nix_to_io)? {
                if let ControlMessageOwned::ScmRights(raw) = cmsg {
                    received.extend(raw);
                } else {
                    log::warn!("Ignoring unexpected control message: {:?}", cmsg);
                }
            }
            (msg.bytes, received)
        };
        for raw in received {
            // SAFETY: the kernel just installed this descriptor for us
            fds.push_back(unsafe { OwnedFd::from_raw_fd(raw) });
        }
        buf.extend_from_slice(&chunk[..bytes]);
        Ok(bytes)
    }

    /// Write `bytes`, passing `fds` along with the first byte. Returns the
    /// number of bytes written.
    pub fn send(&self, bytes: &[u8], fds: &[BorrowedFd<'_>]) -> io::Result<usize> {
        let raw: Vec<RawFd> = fds.iter().map(|fd| fd.as_raw_fd()).collect();
        let iov = [IoSlice::new(bytes)];
        let rights = [ControlMessage::ScmRights(&raw)];
        let cmsgs: &[ControlMessage] = if raw.is_empty() { &[] } else { &rights };
        sendmsg::<()>(
            self.stream.as_raw_fd(),
            &iov,
            cmsgs,
            MsgFlags::MSG_NOSIGNAL | MsgFlags::MSG_DONTWAIT,
            None,
        )
        .map_err(nix_to_io)
    }

    /// Shut down both directions
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

/// Listening socket
///
/// The socket file is removed again when the listener is dropped.
#[derive(Debug)]
pub struct Listener {
    listener: UnixListener,
    path: PathBuf,
}

impl Listener {
    /// Bind `name` inside `$XDG_RUNTIME_DIR`
    pub fn bind(name: &str) -> io::Result<Self> {
        let dir = std::env::var_os("XDG_RUNTIME_DIR").ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "XDG_RUNTIME_DIR is not set")
        })?;
        Self::bind_path(Path::new(&dir).join(name))
    }

    /// Bind the first free `wayland-N` socket name
    pub fn bind_auto() -> io::Result<Self> {
        let mut last = io::Error::new(io::ErrorKind::AddrInUse, "no free socket name");
        for n in 0..33 {
            match Self::bind(&format!("wayland-{}", n)) {
                Ok(listener) => return Ok(listener),
                Err(err) if err.kind() == io::ErrorKind::AddrInUse => last = err,
                Err(err) => return Err(err),
            }
        }
        Err(last)
    }

    /// Bind at an explicit path. A socket file nobody listens on any more is
    /// replaced; a live one is left alone.
    pub fn bind_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if path.exists() {
            if UnixStream::connect(&path).is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("{} is in use", path.display()),
                ));
            }
            log::debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;
        listener.set_nonblocking(true)?;
        Ok(Listener { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Socket name as clients put it in `WAYLAND_DISPLAY`
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Accept a pending connection, if any
    pub fn accept(&self) -> io::Result<Option<Connection>> {
        match self.listener.accept() {
            Ok((stream, _)) => Ok(Some(Connection::new(stream)?)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl AsFd for Listener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_fd()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to remove socket {}: {}", self.path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, Write};

    #[test]
    fn test_fds_travel_with_bytes() {
        let (a, b) = UnixStream::pair().unwrap();
        let sender = Connection::new(a).unwrap();
        let receiver = Connection::new(b).unwrap();

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"shared").unwrap();
        let sent = sender.send(b"12345678", &[file.as_fd()]).unwrap();
        assert_eq!(sent, 8);

        let mut buf = Vec::new();
        let mut fds = VecDeque::new();
        assert_eq!(receiver.recv(&mut buf, &mut fds).unwrap(), 8);
        assert_eq!(buf, b"12345678");
        assert_eq!(fds.len(), 1);

        let mut received = std::fs::File::from(fds.pop_front().unwrap());
        received.rewind().unwrap();
        let mut contents = String::new();
        received.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "shared");
    }

    #[test]
    fn test_recv_would_block_when_empty() {
        let (a, _b) = UnixStream::pair().unwrap();
        let conn = Connection::new(a).unwrap();
        let err = conn.recv(&mut Vec::new(), &mut VecDeque::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_peer_credentials_are_our_own() {
        let (a, _b) = UnixStream::pair().unwrap();
        let conn = Connection::new(a).unwrap();
        let creds = conn.credentials().unwrap();
        assert_eq!(creds.uid, nix::unistd::getuid().as_raw());
    }

    #[test]
    fn test_listener_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wayland-test");
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let listener = Listener::bind_path(&path).unwrap();
        assert_eq!(listener.name(), "wayland-test");
        assert!(listener.accept().unwrap().is_none());
        let _client = UnixStream::connect(&path).unwrap();
        assert!(listener.accept().unwrap().is_some());

        drop(listener);
        assert!(!path.exists());
    }
}
