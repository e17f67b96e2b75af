use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use crate::component::{Component, ComponentStorage, SparseSet};
use crate::entity::{Entity, EntityAllocator};
use crate::index::IndexHandle;
use crate::signal::{ApplyFn, ConnectionId, Signal, Topic};

pub(crate) struct RegistryInner {
    entities: EntityAllocator,
    components: HashMap<TypeId, Box<dyn ComponentStorage>>,
    signals: HashMap<(TypeId, Topic), Signal>,
    next_connection: u64,
}

impl RegistryInner {
    fn storage_mut<T: Component>(&mut self) -> &mut SparseSet<T> {
        self.components
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(SparseSet::<T>::new()))
            .as_any_mut()
            .downcast_mut::<SparseSet<T>>()
            .expect("component type mismatch")
    }

    fn storage<T: Component>(&self) -> Option<&SparseSet<T>> {
        self.components
            .get(&TypeId::of::<T>())
            .and_then(|s| s.as_any().downcast_ref::<SparseSet<T>>())
    }

    fn snapshot(&mut self, type_id: TypeId, topic: Topic) -> Vec<(IndexHandle, ApplyFn)> {
        self.signals
            .get_mut(&(type_id, topic))
            .map(Signal::snapshot)
            .unwrap_or_default()
    }
}

/// Shared handle to an entity registry: entity allocation, component payload
/// storage, and per-(component type, topic) notification signals.
///
/// Clones share one underlying registry. Mutators dispatch their topic
/// synchronously, in connection order, before returning; the listener batch
/// is snapshotted first so callbacks never run under the registry lock.
/// Access to any one registry is expected to be single-threaded; the lock
/// serializes but makes no cross-thread dispatch-ordering promise.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                entities: EntityAllocator::new(),
                components: HashMap::new(),
                signals: HashMap::new(),
                next_connection: 0,
            })),
        }
    }

    /// Whether two handles refer to the same underlying registry.
    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---- Entities ----

    /// Create a new entity with no components.
    pub fn create(&self) -> Entity {
        self.inner.write().entities.allocate()
    }

    /// Destroy an entity, dropping all its components. Fires the destroy
    /// topic of every component the entity held. Returns `false` if the
    /// entity was already dead.
    pub fn destroy(&self, entity: Entity) -> bool {
        let batch;
        {
            let mut inner = self.inner.write();
            if !inner.entities.is_alive(entity) {
                return false;
            }
            let held: Vec<TypeId> = inner
                .components
                .iter()
                .filter(|(_, storage)| storage.has(entity.index))
                .map(|(type_id, _)| *type_id)
                .collect();
            let mut fired = Vec::new();
            for type_id in &held {
                fired.extend(inner.snapshot(*type_id, Topic::Destroy));
            }
            for type_id in &held {
                if let Some(storage) = inner.components.get_mut(type_id) {
                    storage.remove(entity.index);
                }
            }
            inner.entities.deallocate(entity);
            batch = fired;
        }
        dispatch(batch, entity);
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.inner.read().entities.is_alive(entity)
    }

    /// Number of alive entities.
    pub fn entity_count(&self) -> usize {
        self.inner.read().entities.len()
    }

    // ---- Components ----

    /// Attach a component to an entity and fire `T`'s construct topic.
    ///
    /// # Panics
    /// Panics if the entity is dead or already has a `T` component.
    pub fn emplace<T: Component>(&self, entity: Entity, value: T) {
        let batch;
        {
            let mut inner = self.inner.write();
            assert!(
                inner.entities.is_alive(entity),
                "cannot emplace component on dead entity {entity:?}"
            );
            let storage = inner.storage_mut::<T>();
            assert!(
                !storage.has(entity.index),
                "{entity:?} already has a {} component",
                std::any::type_name::<T>()
            );
            storage.insert(entity.index, value);
            batch = inner.snapshot(TypeId::of::<T>(), Topic::Construct);
        }
        dispatch(batch, entity);
    }

    /// Replace an entity's existing component and fire `T`'s update topic.
    ///
    /// # Panics
    /// Panics if the entity is dead or has no `T` component.
    pub fn replace<T: Component>(&self, entity: Entity, value: T) {
        let batch;
        {
            let mut inner = self.inner.write();
            assert!(
                inner.entities.is_alive(entity),
                "cannot replace component on dead entity {entity:?}"
            );
            let storage = inner.storage_mut::<T>();
            assert!(
                storage.has(entity.index),
                "{entity:?} has no {} component to replace",
                std::any::type_name::<T>()
            );
            storage.insert(entity.index, value);
            batch = inner.snapshot(TypeId::of::<T>(), Topic::Update);
        }
        dispatch(batch, entity);
    }

    /// Remove a component from an entity, firing `T`'s destroy topic if it
    /// was present. Returns `true` if it was.
    pub fn remove<T: Component>(&self, entity: Entity) -> bool {
        let batch;
        {
            let mut inner = self.inner.write();
            if !inner.entities.is_alive(entity) {
                return false;
            }
            let Some(storage) = inner.components.get_mut(&TypeId::of::<T>()) else {
                return false;
            };
            if !storage.remove(entity.index) {
                return false;
            }
            batch = inner.snapshot(TypeId::of::<T>(), Topic::Destroy);
        }
        dispatch(batch, entity);
        true
    }

    /// A clone of an entity's component, if alive and present.
    pub fn get<T: Component + Clone>(&self, entity: Entity) -> Option<T> {
        let inner = self.inner.read();
        if !inner.entities.is_alive(entity) {
            return None;
        }
        inner.storage::<T>()?.get(entity.index).cloned()
    }

    /// Whether an entity is alive and has a `T` component.
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        let inner = self.inner.read();
        inner.entities.is_alive(entity)
            && inner.storage::<T>().is_some_and(|s| s.has(entity.index))
    }

    // ---- Topics ----

    /// The sink of `T`'s construct topic.
    pub fn construct_topic<T: Component>(&self) -> Sink {
        self.topic::<T>(Topic::Construct)
    }

    /// The sink of `T`'s update topic.
    pub fn update_topic<T: Component>(&self) -> Sink {
        self.topic::<T>(Topic::Update)
    }

    /// The sink of `T`'s destroy topic.
    pub fn destroy_topic<T: Component>(&self) -> Sink {
        self.topic::<T>(Topic::Destroy)
    }

    fn topic<T: Component>(&self, topic: Topic) -> Sink {
        Sink {
            registry: self.clone(),
            key: (TypeId::of::<T>(), topic),
        }
    }

    pub(crate) fn connect(
        &self,
        key: (TypeId, Topic),
        target: &IndexHandle,
        apply: ApplyFn,
    ) -> ConnectionId {
        let mut inner = self.inner.write();
        let id = ConnectionId(inner.next_connection);
        inner.next_connection += 1;
        inner
            .signals
            .entry(key)
            .or_insert_with(Signal::new)
            .connect(id, Arc::downgrade(target), apply);
        trace!(?key, ?id, "topic listener connected");
        id
    }

    pub(crate) fn disconnect(&self, key: (TypeId, Topic), id: ConnectionId) {
        if let Some(signal) = self.inner.write().signals.get_mut(&key) {
            signal.disconnect(id);
            trace!(?key, ?id, "topic listener disconnected");
        }
    }

    pub(crate) fn rebind(&self, key: (TypeId, Topic), old: &IndexHandle, new: &IndexHandle) {
        if let Some(signal) = self.inner.write().signals.get_mut(&key) {
            signal.rebind(old, new);
        }
    }

    pub(crate) fn downgrade(&self) -> RegistryRef {
        RegistryRef {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch(batch: Vec<(IndexHandle, ApplyFn)>, entity: Entity) {
    for (target, apply) in batch {
        apply(&mut target.write(), entity);
    }
}

/// Non-owning reference to a registry, held by a bound reactive index.
#[derive(Clone)]
pub(crate) struct RegistryRef {
    inner: Weak<RwLock<RegistryInner>>,
}

impl RegistryRef {
    /// An unbound reference.
    pub fn empty() -> Self {
        Self { inner: Weak::new() }
    }

    pub fn upgrade(&self) -> Option<Registry> {
        self.inner.upgrade().map(|inner| Registry { inner })
    }

    /// Whether this reference points at `registry`.
    pub fn is(&self, registry: &Registry) -> bool {
        self.inner.ptr_eq(&Arc::downgrade(&registry.inner))
    }
}

impl Default for RegistryRef {
    fn default() -> Self {
        Self::empty()
    }
}

/// Connection surface of one (component type, topic) channel, per the
/// registry boundary: `connect` registers a listener, `disconnect` cancels
/// exactly one by its handle.
pub struct Sink {
    registry: Registry,
    key: (TypeId, Topic),
}

impl Sink {
    pub fn connect(&self, target: &IndexHandle, apply: ApplyFn) -> ConnectionId {
        self.registry.connect(self.key, target, apply)
    }

    pub fn disconnect(&self, id: ConnectionId) {
        self.registry.disconnect(self.key, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DeletionPolicy, DenseIndex};

    #[derive(Clone, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Label(String);

    fn cell() -> IndexHandle {
        Arc::new(RwLock::new(DenseIndex::new(DeletionPolicy::Swap)))
    }

    #[test]
    fn create_and_destroy() {
        let registry = Registry::new();
        let e = registry.create();
        assert!(registry.is_alive(e));
        assert_eq!(registry.entity_count(), 1);
        assert!(registry.destroy(e));
        assert!(!registry.destroy(e));
        assert!(!registry.is_alive(e));
        assert_eq!(registry.entity_count(), 0);
    }

    #[test]
    fn emplace_replace_remove_payload() {
        let registry = Registry::new();
        let e = registry.create();
        registry.emplace(e, Position { x: 1.0, y: 2.0 });
        assert!(registry.has::<Position>(e));
        assert_eq!(registry.get::<Position>(e), Some(Position { x: 1.0, y: 2.0 }));
        registry.replace(e, Position { x: 3.0, y: 4.0 });
        assert_eq!(registry.get::<Position>(e), Some(Position { x: 3.0, y: 4.0 }));
        assert!(registry.remove::<Position>(e));
        assert!(!registry.remove::<Position>(e));
        assert!(!registry.has::<Position>(e));
    }

    #[test]
    #[should_panic(expected = "dead entity")]
    fn emplace_on_dead_entity_panics() {
        let registry = Registry::new();
        let e = registry.create();
        registry.destroy(e);
        registry.emplace(e, Label("x".into()));
    }

    #[test]
    #[should_panic(expected = "already has")]
    fn double_emplace_panics() {
        let registry = Registry::new();
        let e = registry.create();
        registry.emplace(e, Label("a".into()));
        registry.emplace(e, Label("b".into()));
    }

    #[test]
    fn construct_topic_fires_on_emplace_only() {
        let registry = Registry::new();
        let target = cell();
        registry.construct_topic::<Position>().connect(&target, DenseIndex::emplace);

        let e = registry.create();
        registry.emplace(e, Position { x: 0.0, y: 0.0 });
        assert!(target.read().contains(e));

        let other = registry.create();
        registry.emplace(other, Label("no position".into()));
        assert!(!target.read().contains(other));
    }

    #[test]
    fn update_topic_fires_on_replace() {
        let registry = Registry::new();
        let target = cell();
        registry.update_topic::<Position>().connect(&target, DenseIndex::emplace);

        let e = registry.create();
        registry.emplace(e, Position { x: 0.0, y: 0.0 });
        assert!(target.read().is_empty());
        registry.replace(e, Position { x: 1.0, y: 1.0 });
        assert!(target.read().contains(e));
    }

    #[test]
    fn destroy_topic_fires_on_remove_and_destroy() {
        let registry = Registry::new();
        let target = cell();
        registry.destroy_topic::<Position>().connect(&target, DenseIndex::emplace);

        let e = registry.create();
        registry.emplace(e, Position { x: 0.0, y: 0.0 });
        registry.remove::<Position>(e);
        assert!(target.read().contains(e));

        let other = registry.create();
        registry.emplace(other, Position { x: 1.0, y: 0.0 });
        registry.destroy(other);
        assert!(target.read().contains(other));
    }

    #[test]
    fn sink_disconnect_stops_events() {
        let registry = Registry::new();
        let target = cell();
        let sink = registry.construct_topic::<Position>();
        let id = sink.connect(&target, DenseIndex::emplace);
        sink.disconnect(id);
        sink.disconnect(id);

        let e = registry.create();
        registry.emplace(e, Position { x: 0.0, y: 0.0 });
        assert!(target.read().is_empty());
    }

    #[test]
    fn generation_reuse_isolation() {
        let registry = Registry::new();
        let e1 = registry.create();
        registry.emplace(e1, Label("old".into()));
        registry.destroy(e1);

        let e2 = registry.create();
        assert_ne!(e1, e2);
        assert_eq!(registry.get::<Label>(e1), None);
        assert_eq!(registry.get::<Label>(e2), None);
    }
}
