use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::entity::Entity;
use crate::index::{DenseIndex, IndexHandle};

/// The notification channels a registry raises per component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A component was attached to an entity.
    Construct,
    /// An existing component was replaced.
    Update,
    /// A component was removed, or its entity destroyed.
    Destroy,
}

/// Opaque token identifying one live listener, required to cancel it.
/// Minted registry-wide, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub(crate) u64);

/// What a listener does to its target index when its topic fires.
pub type ApplyFn = fn(&mut DenseIndex, Entity);

struct Listener {
    id: ConnectionId,
    // weak: the listener list must never keep an index alive, and a dropped
    // index must never be reachable from a dispatch
    target: Weak<RwLock<DenseIndex>>,
    apply: ApplyFn,
}

/// The ordered listener list for one (component type, topic) pair.
///
/// Listeners fire in connection order. Re-pointing a listener at a new
/// target goes through [`Signal::rebind`], in place, so the order is never
/// disturbed by a disconnect/reconnect round trip.
pub(crate) struct Signal {
    listeners: Vec<Listener>,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn connect(&mut self, id: ConnectionId, target: Weak<RwLock<DenseIndex>>, apply: ApplyFn) {
        self.listeners.push(Listener { id, target, apply });
    }

    /// Remove the listener identified by `id`. No-op if already gone.
    pub fn disconnect(&mut self, id: ConnectionId) {
        self.listeners.retain(|listener| listener.id != id);
    }

    /// Re-point every listener currently targeting `old` at `new`, keeping
    /// each listener's position in the list.
    pub fn rebind(&mut self, old: &IndexHandle, new: &IndexHandle) {
        let old = Arc::downgrade(old);
        for listener in &mut self.listeners {
            if listener.target.ptr_eq(&old) {
                listener.target = Arc::downgrade(new);
            }
        }
    }

    /// Upgrade the listener list for dispatch, pruning listeners whose
    /// target has been dropped. The returned batch preserves connection
    /// order and is invoked after the registry lock is released.
    pub fn snapshot(&mut self) -> Vec<(IndexHandle, ApplyFn)> {
        let mut batch = Vec::with_capacity(self.listeners.len());
        self.listeners.retain(|listener| match listener.target.upgrade() {
            Some(target) => {
                batch.push((target, listener.apply));
                true
            }
            None => false,
        });
        batch
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}
