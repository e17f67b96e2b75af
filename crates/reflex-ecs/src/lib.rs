//! Reflex ECS - reactive entity indexing
//!
//! A small registry with per-component notification topics, plus reactive
//! indexes that subscribe to those topics and keep a dense, queryable set of
//! every entity that matched since they were last cleared.
//!
//! The registry uses generational indices for entities and sparse-set storage
//! for component payloads. A [`ReactiveIndex`] holds no payload at all: it is
//! a pure presence index fed synchronously by registry mutations.

mod component;
mod entity;
mod error;
mod index;
mod reactive;
mod registry;
mod signal;
mod subscription;

pub use component::{Component, TypeDescriptor};
pub use entity::Entity;
pub use error::ReactiveError;
pub use index::{DeletionPolicy, DenseIndex, IndexHandle};
pub use reactive::{ReactiveIndex, ReactivePolicy};
pub use registry::{Registry, Sink};
pub use signal::{ApplyFn, ConnectionId, Topic};
