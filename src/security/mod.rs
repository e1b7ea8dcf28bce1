//! Security and isolation
//!
//! This module decides which peers may connect and how many resources a single
//! client may hold, so one misbehaving client cannot starve the others.

use crate::compositor::SurfaceLimits;
use crate::protocol::DEFAULT_MAX_MESSAGE_SIZE;
use thiserror::Error;

/// Peer credentials read from the socket (SO_PEERCRED)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub pid: i32,
    pub uid: u32,
    pub gid: u32,
}

/// Why a connection was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("peer credentials unavailable: {0}")]
    NoCredentials(String),
    #[error("uid {uid} / gid {gid} is not allowed to connect")]
    NotAllowed { uid: u32, gid: u32 },
    #[error("client limit of {0} reached")]
    TooManyClients(usize),
}

/// Security policy configuration
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    /// Peers whose uid is listed may connect. Empty means the server's own
    /// uid only.
    pub allowed_uids: Vec<u32>,

    /// Peers whose primary gid is listed may connect as well
    pub allowed_gids: Vec<u32>,

    /// Skip the credential check entirely
    pub allow_any_peer: bool,

    /// Maximum simultaneous clients (0 = unlimited)
    pub max_clients: usize,

    /// Maximum live protocol objects per client (0 = unlimited)
    pub max_objects_per_client: usize,

    /// Maximum surfaces per client (0 = unlimited)
    pub max_surfaces_per_client: usize,

    /// Maximum buffers per client (0 = unlimited)
    pub max_buffers_per_client: usize,

    /// Largest accepted message, header included
    pub max_message_size: usize,

    /// Largest accepted buffer width or height
    pub max_buffer_dimension: i32,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        SecurityPolicy {
            allowed_uids: Vec::new(),
            allowed_gids: Vec::new(),
            allow_any_peer: false,
            max_clients: 64,
            max_objects_per_client: 10_000,
            max_surfaces_per_client: 1000,
            max_buffers_per_client: 1000,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_buffer_dimension: 16384,
        }
    }
}

impl SecurityPolicy {
    /// Create a permissive policy (for testing) - allows everything
    pub fn permissive() -> Self {
        SecurityPolicy {
            allow_any_peer: true,
            max_clients: 0,
            max_objects_per_client: 0,
            max_surfaces_per_client: 0,
            max_buffers_per_client: 0,
            ..Default::default()
        }
    }

    /// Create a strict policy (maximum security) - tight per-client ceilings
    pub fn strict() -> Self {
        SecurityPolicy {
            max_clients: 16,
            max_objects_per_client: 1000,
            max_surfaces_per_client: 100,
            max_buffers_per_client: 100,
            max_message_size: 1024,
            max_buffer_dimension: 8192,
            ..Default::default()
        }
    }

    /// Build a policy from a level name as given on the command line
    pub fn from_level(level: &str) -> Option<Self> {
        match level {
            "permissive" => Some(Self::permissive()),
            "default" => Some(Self::default()),
            "strict" => Some(Self::strict()),
            _ => None,
        }
    }

    /// Check a peer against the allow-lists. `server_uid` stands in for an
    /// empty uid list.
    pub fn admits(&self, peer: &Credentials, server_uid: u32) -> Result<(), RejectReason> {
        if self.allow_any_peer {
            return Ok(());
        }
        let uid_ok = if self.allowed_uids.is_empty() {
            peer.uid == server_uid
        } else {
            self.allowed_uids.contains(&peer.uid)
        };
        if uid_ok || self.allowed_gids.contains(&peer.gid) {
            Ok(())
        } else {
            Err(RejectReason::NotAllowed {
                uid: peer.uid,
                gid: peer.gid,
            })
        }
    }

    pub fn surface_limits(&self) -> SurfaceLimits {
        SurfaceLimits {
            max_surfaces_per_client: self.max_surfaces_per_client,
            max_buffers_per_client: self.max_buffers_per_client,
            max_buffer_dimension: self.max_buffer_dimension,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(uid: u32, gid: u32) -> Credentials {
        Credentials { pid: 100, uid, gid }
    }

    #[test]
    fn test_default_admits_own_uid_only() {
        let policy = SecurityPolicy::default();
        assert!(policy.admits(&peer(1000, 1000), 1000).is_ok());
        assert_eq!(
            policy.admits(&peer(1001, 1001), 1000),
            Err(RejectReason::NotAllowed {
                uid: 1001,
                gid: 1001
            })
        );
    }

    #[test]
    fn test_allow_lists() {
        let policy = SecurityPolicy {
            allowed_uids: vec![0],
            allowed_gids: vec![50],
            ..Default::default()
        };
        assert!(policy.admits(&peer(0, 0), 1000).is_ok());
        assert!(policy.admits(&peer(1234, 50), 1000).is_ok());
        // An explicit list replaces the implicit server uid
        assert!(policy.admits(&peer(1000, 1000), 1000).is_err());
    }

    #[test]
    fn test_presets() {
        assert!(SecurityPolicy::permissive().admits(&peer(5, 5), 1000).is_ok());
        let strict = SecurityPolicy::from_level("strict").unwrap();
        assert!(strict.max_surfaces_per_client < SecurityPolicy::default().max_surfaces_per_client);
        assert!(SecurityPolicy::from_level("lax").is_none());
    }
}
