//! Connection registry: admission, lookup, removal, and the three indices.
//!
//! The registry maintains one map per lookup dimension -- by connection id,
//! by user id, and by channel -- and mutates all three inside a single
//! critical section so observers never see a partially-indexed connection.
//! The lock is held only for structural mutation and snapshot creation;
//! no I/O happens under it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::connection::{ConnectionRecord, TransportKind};
use crate::traits::Transport;

/// Error returned when a connection is refused admission.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The user already holds the maximum allowed connections.
    #[error("connection limit reached for user {user_id} (max {limit})")]
    QuotaExceeded {
        /// The user that hit the quota.
        user_id: String,
        /// The configured per-user limit.
        limit: usize,
    },
    /// A connection with this id is already registered.
    #[error("connection id {id} is already registered")]
    DuplicateId {
        /// The conflicting id.
        id: String,
    },
}

#[derive(Default)]
struct Indexes {
    connections: HashMap<String, Arc<ConnectionRecord>>,
    by_user: HashMap<String, HashSet<String>>,
    by_channel: HashMap<String, HashSet<String>>,
}

/// Thread-safe registry of all active connections for one broker.
///
/// Always used behind an `Arc`: records hold a `Weak` back-link for
/// deregistration, and the heartbeat task holds its own reference.
pub struct ConnectionRegistry {
    indexes: RwLock<Indexes>,
    kind: TransportKind,
    max_connections_per_user: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry for connections of the given kind.
    #[must_use]
    pub fn new(kind: TransportKind, max_connections_per_user: usize) -> Self {
        Self {
            indexes: RwLock::new(Indexes::default()),
            kind,
            max_connections_per_user,
        }
    }

    /// Admits and registers a new connection.
    ///
    /// Empty `user_id`/`channel` strings are treated as absent: anonymous
    /// connections never count against any quota.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if the id is taken, or
    /// [`RegistryError::QuotaExceeded`] if the user is at the per-user
    /// limit. Neither failure mutates any index.
    pub fn add_connection(
        self: &Arc<Self>,
        id: impl Into<String>,
        transport: Arc<dyn Transport>,
        user_id: Option<String>,
        channel: Option<String>,
    ) -> Result<Arc<ConnectionRecord>, RegistryError> {
        let id = id.into();
        let user_id = user_id.filter(|u| !u.is_empty());
        let channel = channel.filter(|c| !c.is_empty());

        let mut idx = self.indexes.write();
        if idx.connections.contains_key(&id) {
            return Err(RegistryError::DuplicateId { id });
        }
        if let Some(user) = &user_id {
            let current = idx.by_user.get(user).map_or(0, HashSet::len);
            if current >= self.max_connections_per_user {
                return Err(RegistryError::QuotaExceeded {
                    user_id: user.clone(),
                    limit: self.max_connections_per_user,
                });
            }
        }

        let record = Arc::new(ConnectionRecord::new(
            id.clone(),
            user_id.clone(),
            channel.clone(),
            self.kind,
            transport,
            Arc::downgrade(self),
        ));
        idx.connections.insert(id.clone(), Arc::clone(&record));
        if let Some(user) = user_id {
            idx.by_user.entry(user).or_default().insert(id.clone());
        }
        if let Some(channel) = channel {
            idx.by_channel.entry(channel).or_default().insert(id.clone());
        }
        drop(idx);

        debug!(id = %id, kind = ?self.kind, "connection registered");
        Ok(record)
    }

    /// Removes a connection from all three indices, returning its record.
    ///
    /// Idempotent: removing an unknown id returns `None` and changes
    /// nothing. Index sets left empty by the removal are deleted.
    pub fn remove_connection(&self, id: &str) -> Option<Arc<ConnectionRecord>> {
        let mut idx = self.indexes.write();
        let record = idx.connections.remove(id)?;
        if let Some(user) = record.user_id() {
            if let Some(set) = idx.by_user.get_mut(user) {
                set.remove(id);
                if set.is_empty() {
                    idx.by_user.remove(user);
                }
            }
        }
        if let Some(channel) = record.channel() {
            if let Some(set) = idx.by_channel.get_mut(channel) {
                set.remove(id);
                if set.is_empty() {
                    idx.by_channel.remove(channel);
                }
            }
        }
        record.mark_dead();
        drop(idx);

        debug!(id = %id, "connection removed");
        Some(record)
    }

    /// Looks up a connection by id.
    #[must_use]
    pub fn get_connection(&self, id: &str) -> Option<Arc<ConnectionRecord>> {
        self.indexes.read().connections.get(id).cloned()
    }

    /// Total number of active connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.indexes.read().connections.len()
    }

    /// Number of active connections held by one user.
    #[must_use]
    pub fn user_connection_count(&self, user_id: &str) -> usize {
        self.indexes.read().by_user.get(user_id).map_or(0, HashSet::len)
    }

    /// Number of active connections subscribed to one channel.
    #[must_use]
    pub fn channel_connection_count(&self, channel: &str) -> usize {
        self.indexes
            .read()
            .by_channel
            .get(channel)
            .map_or(0, HashSet::len)
    }

    /// Point-in-time copy of every active connection.
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<Arc<ConnectionRecord>> {
        self.indexes.read().connections.values().cloned().collect()
    }

    /// Point-in-time copy of one user's connections.
    #[must_use]
    pub fn snapshot_user(&self, user_id: &str) -> Vec<Arc<ConnectionRecord>> {
        let idx = self.indexes.read();
        idx.by_user.get(user_id).map_or_else(Vec::new, |ids| {
            ids.iter()
                .filter_map(|id| idx.connections.get(id).cloned())
                .collect()
        })
    }

    /// Point-in-time copy of one channel's connections.
    #[must_use]
    pub fn snapshot_channel(&self, channel: &str) -> Vec<Arc<ConnectionRecord>> {
        let idx = self.indexes.read();
        idx.by_channel.get(channel).map_or_else(Vec::new, |ids| {
            ids.iter()
                .filter_map(|id| idx.connections.get(id).cloned())
                .collect()
        })
    }

    /// Empties all three indices and returns the removed records.
    ///
    /// Used during broker shutdown; the caller closes each record after
    /// the lock is released.
    pub fn drain_all(&self) -> Vec<Arc<ConnectionRecord>> {
        let mut idx = self.indexes.write();
        idx.by_user.clear();
        idx.by_channel.clear();
        let records: Vec<_> = idx.connections.drain().map(|(_, record)| record).collect();
        for record in &records {
            record.mark_dead();
        }
        records
    }
}
