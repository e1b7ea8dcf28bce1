//! Connection lifecycle: admission, readiness polling and teardown

use super::*;
use crate::connection::Connection;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::os::fd::AsFd;

/// Requests framed during one poll cycle.
///
/// Messages are framed lazily, one per client in turn, so a request
/// dispatched through [`PollEvents::dispatch`] takes effect before the next
/// message is framed.
pub struct PollEvents<'a> {
    server: &'a mut Server,
}

impl PollEvents<'_> {
    pub fn dispatch(&mut self, client: ClientId, message: RawMessage) {
        self.server.dispatch(client, message);
    }
}

impl Iterator for PollEvents<'_> {
    type Item = (ClientId, RawMessage);

    fn next(&mut self) -> Option<Self::Item> {
        self.server.next_message()
    }
}

impl Server {
    /// Admit a new connection. Peer credentials are checked against the
    /// security policy before any object exists for the client.
    pub fn accept(&mut self, connection: Connection) -> Result<ClientId, RejectReason> {
        let credentials = connection
            .credentials()
            .map_err(|e| RejectReason::NoCredentials(e.to_string()))?;
        if let Err(reason) = self.policy.admits(&credentials, self.server_uid) {
            log::warn!("Rejecting pid {}: {}", credentials.pid, reason);
            return Err(reason);
        }
        let max = self.policy.max_clients;
        if max > 0 && self.clients.len() >= max {
            log::warn!("Rejecting pid {}: client limit reached", credentials.pid);
            return Err(RejectReason::TooManyClients(max));
        }

        let id = self.registry.register_client();
        self.clients.insert(
            id,
            Client::new(id, credentials, connection, self.config.max_output_buffer),
        );
        log::info!(
            "{} connected (pid {}, uid {}, gid {})",
            id,
            credentials.pid,
            credentials.uid,
            credentials.gid
        );
        self.notifier.publish(Notification::ClientConnected {
            client: id,
            credentials,
        });
        Ok(id)
    }

    /// Accept every connection pending on the listener
    fn accept_pending(&mut self) -> io::Result<()> {
        loop {
            let connection = match &self.listener {
                Some(listener) => listener.accept()?,
                None => return Ok(()),
            };
            let Some(connection) = connection else {
                return Ok(());
            };
            // Rejected connections are closed by dropping them
            let _ = self.accept(connection);
        }
    }

    /// Wait up to `timeout` for socket activity, read what arrived and
    /// return an iterator over the complete requests
    pub fn poll_events(&mut self, timeout: Duration) -> io::Result<PollEvents<'_>> {
        self.ready.clear();
        let ids: Vec<ClientId> = self.clients.keys().copied().collect();
        let ms = timeout.as_millis().min(u16::MAX as u128) as u16;

        let revents: Vec<PollFlags> = {
            let mut fds = Vec::with_capacity(ids.len() + 1);
            if let Some(listener) = &self.listener {
                fds.push(PollFd::new(listener.as_fd(), PollFlags::POLLIN));
            }
            for client in self.clients.values() {
                let mut flags = PollFlags::POLLIN;
                if client.has_pending_output() {
                    flags |= PollFlags::POLLOUT;
                }
                fds.push(PollFd::new(client.as_fd(), flags));
            }
            match poll(&mut fds, PollTimeout::from(ms)) {
                Ok(_) => fds
                    .iter()
                    .map(|fd| fd.revents().unwrap_or(PollFlags::empty()))
                    .collect(),
                Err(Errno::EINTR) => Vec::new(),
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        };
        if revents.is_empty() {
            return Ok(PollEvents { server: self });
        }

        let mut revents = revents.into_iter();
        if self.listener.is_some() {
            let listener_events = revents.next().unwrap_or(PollFlags::empty());
            if listener_events.contains(PollFlags::POLLIN) {
                self.accept_pending()?;
            }
        }

        let readable = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
        for (id, events) in ids.into_iter().zip(revents) {
            let Some(client) = self.clients.get_mut(&id) else {
                continue;
            };
            if events.contains(PollFlags::POLLOUT) {
                if let Err(e) = client.flush() {
                    self.doomed
                        .push((id, DisconnectReason::Transport(e.to_string())));
                    continue;
                }
            }
            if events.intersects(readable) {
                match client.read_available() {
                    Ok(_) => self.ready.push_back(id),
                    Err(e) => {
                        log::debug!("Read from {} failed: {}", id, e);
                        self.doomed
                            .push((id, DisconnectReason::Transport(e.to_string())));
                    }
                }
            }
        }
        self.reap();
        Ok(PollEvents { server: self })
    }

    /// Frame the next request, taking clients in turn so that one busy
    /// client cannot starve the others
    fn next_message(&mut self) -> Option<(ClientId, RawMessage)> {
        while let Some(id) = self.ready.pop_front() {
            let Some(client) = self.clients.get_mut(&id) else {
                continue;
            };
            match client.next_message(&self.parser) {
                Ok(Some(message)) => {
                    self.ready.push_back(id);
                    return Some((id, message));
                }
                Ok(None) => {
                    if client.is_closed() {
                        self.disconnect(id, DisconnectReason::PeerClosed);
                    }
                }
                Err(err) => {
                    log::warn!("Malformed input from {}: {}", id, err);
                    self.disconnect(id, DisconnectReason::Transport(err.to_string()));
                }
            }
        }
        None
    }

    /// Tear a client down: registry, input state, surfaces and buffers,
    /// backend state, then the connection itself
    pub fn disconnect(&mut self, client: ClientId, reason: DisconnectReason) {
        let Some(mut state) = self.clients.remove(&client) else {
            return;
        };
        match &reason {
            DisconnectReason::PeerClosed | DisconnectReason::Requested => {
                log::info!("{} disconnected: {}", client, reason)
            }
            _ => log::warn!("{} disconnected: {}", client, reason),
        }
        self.ready.retain(|id| *id != client);
        self.doomed.retain(|(id, _)| *id != client);

        for object in self.registry.unregister_client(client) {
            if !object.placeholder {
                self.notifier.publish(Notification::ObjectDestroyed {
                    client,
                    object: object.id,
                    interface: object.interface,
                });
            }
        }
        self.input.client_disconnected(client);
        let teardown = self.surfaces.teardown_client(client);
        for buffer in teardown.buffers {
            if let Err(e) = self.backend.buffer_destroyed(buffer) {
                log::warn!("Backend failed to drop {}: {}", buffer, e);
            }
        }
        self.render.forget_client(client);
        // Surface notices reach the backend and move other clients' focus
        self.pump();

        if let Err(e) = state.flush() {
            log::debug!("Final write to {} failed: {}", client, e);
        }
        state.shutdown();
        self.notifier.publish(Notification::ClientDisconnected {
            client,
            reason: reason.to_string(),
        });
    }
}
