//! Push channel to a connected client.

use std::sync::atomic::{AtomicU64, Ordering};

use tether_proto::ServerMessage;
use tokio::sync::mpsc;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Sending half of a client connection.
///
/// The transport owns the receiving half and writes whatever arrives to the
/// socket. Sends never block; a send fails only once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnectionHandle {
    /// Create a connected handle/receiver pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    /// Wrap an existing sender.
    pub fn new(sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            sender,
        }
    }

    /// Process-unique connection id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Push a message. Returns false if the connection is closed.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.sender.send(message).is_ok()
    }

    /// Whether the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
