//! Outbound message routing.
//!
//! Multi-target operations snapshot the target set under the registry lock,
//! release it, then iterate the snapshot invoking each record's `send`.
//! Connections that die mid-iteration are closed in-line and simply not
//! counted; the operations always return a delivery count.

use bytes::Bytes;
use tracing::debug;

use crate::connection::SendError;
use crate::registry::ConnectionRegistry;

impl ConnectionRegistry {
    /// Sends one frame to one connection.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::UnknownConnection`] when the id is not
    /// registered, [`SendError::Closed`] when the record was removed before
    /// the write, or [`SendError::Transport`] when the write failed (the
    /// connection is closed as a side effect).
    pub async fn send_to_connection(&self, id: &str, frame: Bytes) -> Result<(), SendError> {
        let record = self
            .get_connection(id)
            .ok_or_else(|| SendError::UnknownConnection { id: id.to_string() })?;
        record.send(frame).await
    }

    /// Sends one frame to every connection of a user.
    ///
    /// Returns the number of connections the frame was successfully handed
    /// to. Unknown users yield 0.
    pub async fn send_to_user(&self, user_id: &str, frame: Bytes) -> usize {
        self.deliver(self.snapshot_user(user_id), frame).await
    }

    /// Sends one frame to every connection subscribed to a channel.
    ///
    /// Returns the number of connections the frame was successfully handed
    /// to. Unknown channels yield 0.
    pub async fn send_to_channel(&self, channel: &str, frame: Bytes) -> usize {
        self.deliver(self.snapshot_channel(channel), frame).await
    }

    /// Sends one frame to every active connection.
    ///
    /// Returns the number of connections the frame was successfully handed
    /// to.
    pub async fn broadcast(&self, frame: Bytes) -> usize {
        self.deliver(self.snapshot_all(), frame).await
    }

    async fn deliver(
        &self,
        targets: Vec<std::sync::Arc<crate::connection::ConnectionRecord>>,
        frame: Bytes,
    ) -> usize {
        let mut delivered = 0;
        for record in targets {
            match record.send(frame.clone()).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    // Dead targets were already closed by `send`; the frame
                    // just doesn't count.
                    debug!(id = %record.id(), error = %err, "delivery failed, target skipped");
                }
            }
        }
        delivered
    }
}
