use std::any::TypeId;

use tracing::trace;

use crate::index::IndexHandle;
use crate::registry::Registry;
use crate::signal::{ApplyFn, ConnectionId, Topic};

/// One live (component type, topic) connection owned by a reactive index.
struct Record {
    type_id: TypeId,
    topic: Topic,
    id: ConnectionId,
}

/// The set of registry subscriptions owned by one reactive index.
///
/// Subscriptions are explicit handles, never raw address aliasing: the
/// registry owns its listener lists, this set owns the connection handles,
/// and the two only meet through `ConnectionId`.
#[derive(Default)]
pub(crate) struct Subscriptions {
    records: Vec<Record>,
}

impl Subscriptions {
    /// Connect `target` to the (`type_id`, `topic`) signal on `registry`.
    ///
    /// One owner keeps at most one connection per (type, topic): a duplicate
    /// request reuses the live connection, so the callback can never fire
    /// twice for a single event.
    pub fn subscribe(
        &mut self,
        registry: &Registry,
        type_id: TypeId,
        topic: Topic,
        target: &IndexHandle,
        apply: ApplyFn,
    ) -> ConnectionId {
        if let Some(record) = self
            .records
            .iter()
            .find(|r| r.type_id == type_id && r.topic == topic)
        {
            return record.id;
        }
        let id = registry.connect((type_id, topic), target, apply);
        self.records.push(Record { type_id, topic, id });
        id
    }

    /// Cancel exactly the subscription identified by `id`. No-op if it is
    /// not (or no longer) owned here.
    pub fn unsubscribe(&mut self, registry: &Registry, id: ConnectionId) {
        if let Some(pos) = self.records.iter().position(|r| r.id == id) {
            let record = self.records.remove(pos);
            registry.disconnect((record.type_id, record.topic), record.id);
        }
    }

    /// Cancel every owned subscription.
    pub fn unsubscribe_all(&mut self, registry: &Registry) {
        for record in self.records.drain(..) {
            registry.disconnect((record.type_id, record.topic), record.id);
        }
    }

    /// Forget every record without touching the registry. Teardown path for
    /// when the registry itself is already gone.
    pub fn forget_all(&mut self) {
        if !self.records.is_empty() {
            trace!(count = self.records.len(), "forgetting subscriptions of dropped registry");
        }
        self.records.clear();
    }

    /// Re-point every owned connection whose target is `old` at `new`, in
    /// place. Each listener keeps its position in its topic list, so
    /// in-flight dispatch coverage and ordering are preserved; there is no
    /// disconnect/reconnect round trip.
    pub fn rebind_owner(&self, registry: &Registry, old: &IndexHandle, new: &IndexHandle) {
        for record in &self.records {
            registry.rebind((record.type_id, record.topic), old, new);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }
}
