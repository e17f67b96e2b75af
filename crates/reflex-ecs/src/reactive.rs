use std::any::TypeId;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::component::{Component, TypeDescriptor};
use crate::entity::Entity;
use crate::error::ReactiveError;
use crate::index::{DeletionPolicy, DenseIndex, IndexHandle};
use crate::registry::{Registry, RegistryRef};
use crate::signal::{ApplyFn, ConnectionId, Topic};
use crate::subscription::Subscriptions;

/// Compile-time traits of the component type a [`ReactiveIndex`] is
/// specialized for. The index's deletion policy is derived from this at
/// construction and never changes afterwards.
pub trait ReactivePolicy: Component {
    /// When `true`, erasing tombstones dense slots in place instead of
    /// compacting, keeping unrelated slot indices stable.
    const IN_PLACE_DELETE: bool = false;
}

impl ReactivePolicy for () {}

/// A reactive index: subscribes to structural-change topics on a bound
/// [`Registry`] and keeps a dense set of every entity that matched since the
/// last [`clear`](Self::clear).
///
/// The index stores no payload. Its two lifecycles, dense contents and live
/// subscriptions, stay coupled across move, [`swap`](Self::swap), rebinding
/// and drop: a connection is always either owned by exactly one surviving
/// index or released, never left pointing at a dead owner. Registry-side
/// listeners target the index's heap state cell, so a plain Rust move of the
/// `ReactiveIndex` value transfers everything; `mem::take` leaves behind a
/// freshly default-constructed index with no subscriptions.
///
/// There is no default removal subscription: without
/// [`on_destroy`](Self::on_destroy), an index only grows (modulo `clear`),
/// and entries for entities the registry has since destroyed are the
/// caller's responsibility.
pub struct ReactiveIndex<T: ReactivePolicy = ()> {
    state: IndexHandle,
    registry: RegistryRef,
    subscriptions: Subscriptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ReactivePolicy> ReactiveIndex<T> {
    /// An unbound index: empty, no subscriptions.
    pub fn new() -> Self {
        let policy = if T::IN_PLACE_DELETE {
            DeletionPolicy::InPlace
        } else {
            DeletionPolicy::Swap
        };
        Self {
            state: Arc::new(RwLock::new(DenseIndex::new(policy))),
            registry: RegistryRef::empty(),
            subscriptions: Subscriptions::default(),
            _marker: PhantomData,
        }
    }

    // ---- Binding ----

    /// Attach this index to `registry` as its event source.
    ///
    /// Binding to a different registry first releases every subscription and
    /// clears the index, so stale contents from the old registry can never
    /// survive the switch. Binding to the already-bound registry is a no-op
    /// that keeps both contents and subscriptions.
    pub fn bind(&mut self, registry: &Registry) {
        if self.registry.is(registry) {
            return;
        }
        self.release();
        self.state.write().clear();
        self.registry = registry.downgrade();
        debug!(index = TypeDescriptor::of::<T>().name(), "reactive index bound");
    }

    /// The bound registry.
    ///
    /// # Panics
    /// Panics if the index is unbound or the registry has been dropped.
    pub fn registry(&self) -> Registry {
        match self.try_registry() {
            Ok(registry) => registry,
            Err(_) => panic!("reactive index is not bound to a registry"),
        }
    }

    /// The bound registry, or [`ReactiveError::Unbound`].
    pub fn try_registry(&self) -> Result<Registry, ReactiveError> {
        self.registry.upgrade().ok_or(ReactiveError::Unbound)
    }

    pub fn is_bound(&self) -> bool {
        self.registry.upgrade().is_some()
    }

    // ---- Subscriptions ----

    /// Index every entity that gets a `C` component attached from now on.
    /// Subscribing again for the same topic reuses the live connection.
    ///
    /// # Panics
    /// Panics if the index is unbound.
    pub fn on_construct<C: Component>(&mut self) -> ConnectionId {
        self.subscribe::<C>(Topic::Construct, DenseIndex::emplace)
    }

    /// Index every entity whose `C` component gets replaced from now on.
    /// Subscribing again for the same topic reuses the live connection.
    ///
    /// # Panics
    /// Panics if the index is unbound.
    pub fn on_update<C: Component>(&mut self) -> ConnectionId {
        self.subscribe::<C>(Topic::Update, DenseIndex::emplace)
    }

    /// Erase an entity from the index when its `C` component is removed or
    /// its entity destroyed. Explicit extension point; nothing is wired by
    /// default.
    ///
    /// # Panics
    /// Panics if the index is unbound.
    pub fn on_destroy<C: Component>(&mut self) -> ConnectionId {
        self.subscribe::<C>(Topic::Destroy, DenseIndex::erase)
    }

    fn subscribe<C: Component>(&mut self, topic: Topic, apply: ApplyFn) -> ConnectionId {
        let registry = self.registry();
        self.subscriptions
            .subscribe(&registry, TypeId::of::<C>(), topic, &self.state, apply)
    }

    /// Cancel exactly the subscription identified by `id`. No-op if it has
    /// already been cancelled or belongs to another index.
    pub fn unsubscribe(&mut self, id: ConnectionId) {
        if let Some(registry) = self.registry.upgrade() {
            self.subscriptions.unsubscribe(&registry, id);
        }
    }

    /// Drop every live subscription, keeping the binding and the contents.
    /// Later registry events no longer reach this index.
    pub fn unsubscribe_all(&mut self) {
        self.release();
    }

    // ---- Queries ----

    /// Whether `entity` has matched a subscribed topic since the last clear.
    pub fn contains(&self, entity: Entity) -> bool {
        self.state.read().contains(entity)
    }

    /// The dense slot of `entity`.
    ///
    /// # Panics
    /// Panics if the entity is not in the index.
    pub fn index(&self, entity: Entity) -> usize {
        self.state.read().index(entity)
    }

    /// Number of entities currently indexed.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    /// Remove every indexed entity. Subscriptions stay live, so later
    /// matching events repopulate the index.
    pub fn clear(&mut self) {
        self.state.write().clear();
    }

    /// Snapshot of the indexed entities, in dense-slot order.
    pub fn entities(&self) -> Vec<Entity> {
        self.state.read().iter().collect()
    }

    /// The component-type descriptor this index is specialized for.
    pub fn type_info(&self) -> TypeDescriptor {
        TypeDescriptor::of::<T>()
    }

    /// The deletion policy fixed at construction.
    pub fn policy(&self) -> DeletionPolicy {
        self.state.read().policy()
    }

    pub fn capacity(&self) -> usize {
        self.state.read().capacity()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.state.write().reserve(additional);
    }

    // ---- Exchange ----

    /// Exchange contents, registry bindings, and subscription ownership with
    /// `other`.
    ///
    /// Connections are re-pointed in place through a temporary identity
    /// (`self -> temp`, `other -> self`, `temp -> other`), so every listener
    /// keeps its position in its topic list and no connection ever targets a
    /// dropped state, even mid-exchange. Two consecutive swaps restore the
    /// original observable state of both operands.
    pub fn swap(&mut self, other: &mut Self) {
        let temp: IndexHandle = Arc::new(RwLock::new(DenseIndex::new(DeletionPolicy::Swap)));
        if let Some(registry) = self.registry.upgrade() {
            self.subscriptions.rebind_owner(&registry, &self.state, &temp);
        }
        if let Some(registry) = other.registry.upgrade() {
            other
                .subscriptions
                .rebind_owner(&registry, &other.state, &self.state);
        }
        if let Some(registry) = self.registry.upgrade() {
            self.subscriptions.rebind_owner(&registry, &temp, &other.state);
        }
        mem::swap(&mut *self.state.write(), &mut *other.state.write());
        mem::swap(&mut self.registry, &mut other.registry);
        mem::swap(&mut self.subscriptions, &mut other.subscriptions);
    }

    fn release(&mut self) {
        match self.registry.upgrade() {
            Some(registry) => self.subscriptions.unsubscribe_all(&registry),
            None => self.subscriptions.forget_all(),
        }
    }
}

impl<T: ReactivePolicy> Default for ReactiveIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ReactivePolicy> Drop for ReactiveIndex<T> {
    fn drop(&mut self) {
        self.release();
    }
}
