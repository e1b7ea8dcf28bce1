//! Notification feed
//!
//! Embedders (window management, accessibility, tests) subscribe to object
//! lifecycle and focus changes through plain channels.

use crate::compositor::CompositorNotice;
use crate::input::InputNotice;
use crate::protocol::*;
use crate::security::Credentials;
use std::sync::mpsc::{channel, Receiver, Sender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ClientConnected {
        client: ClientId,
        credentials: Credentials,
    },
    ClientDisconnected {
        client: ClientId,
        reason: String,
    },
    ObjectCreated {
        client: ClientId,
        object: ObjectId,
        interface: Interface,
    },
    ObjectDestroyed {
        client: ClientId,
        object: ObjectId,
        interface: Interface,
    },
    Surface(CompositorNotice),
    Input(InputNotice),
    /// A client did not answer xdg_wm_base.ping in time
    ClientUnresponsive(ClientId),
}

/// Fan-out of notifications to every live subscriber
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Vec<Sender<Notification>>,
}

impl Notifier {
    pub fn new() -> Self {
        Notifier::default()
    }

    pub fn subscribe(&mut self) -> Receiver<Notification> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    /// Deliver to every subscriber, forgetting those that hung up
    pub fn publish(&mut self, notification: Notification) {
        if self.subscribers.is_empty() {
            return;
        }
        log::trace!("Notify {:?}", notification);
        self.subscribers
            .retain(|subscriber| subscriber.send(notification.clone()).is_ok());
    }
}
