use thiserror::Error;

/// Errors surfaced by the fallible reactive-index accessors.
///
/// Everything else in this layer is either total or a contract violation
/// that panics; see the crate docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// The index is not bound to a live registry.
    #[error("reactive index is not bound to a registry")]
    Unbound,
}
