use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Marker trait for types that can be stored as components.
pub trait Component: 'static + Send + Sync {}

/// Blanket implementation: any `'static + Send + Sync` type is a valid component.
impl<T: 'static + Send + Sync> Component for T {}

/// Process-stable identity of a component type, usable across a type-erased
/// boundary. Equality and hashing consider only the [`TypeId`]; the name is
/// carried for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
}

impl TypeDescriptor {
    /// The descriptor of component type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({})", self.name)
    }
}

/// Type-erased payload storage interface, one per component type.
pub(crate) trait ComponentStorage: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn remove(&mut self, index: u32) -> bool;
    fn has(&self, index: u32) -> bool;
}

struct Entry<T> {
    index: u32,
    value: T,
}

/// Sparse-set payload storage for a single component type. O(1)
/// insert/remove/lookup; removal back-swaps, so dense order is unstable.
pub(crate) struct SparseSet<T> {
    // entity index -> dense position; None means no component
    sparse: Vec<Option<u32>>,
    dense: Vec<Entry<T>>,
}

impl<T: Component> SparseSet<T> {
    pub fn new() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
        }
    }

    /// Insert or replace the component for the given entity index.
    pub fn insert(&mut self, index: u32, value: T) {
        let idx = index as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, None);
        }
        match self.sparse[idx] {
            Some(pos) => self.dense[pos as usize].value = value,
            None => {
                self.sparse[idx] = Some(self.dense.len() as u32);
                self.dense.push(Entry { index, value });
            }
        }
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        let pos = (*self.sparse.get(index as usize)?)?;
        Some(&self.dense[pos as usize].value)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.dense.len()
    }
}

impl<T: Component> ComponentStorage for SparseSet<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove(&mut self, index: u32) -> bool {
        let idx = index as usize;
        let Some(Some(pos)) = self.sparse.get(idx).copied() else {
            return false;
        };
        self.sparse[idx] = None;
        let pos = pos as usize;
        let last = self.dense.len() - 1;
        if pos != last {
            self.dense.swap(pos, last);
            let moved = self.dense[pos].index;
            self.sparse[moved as usize] = Some(pos as u32);
        }
        self.dense.pop();
        true
    }

    fn has(&self, index: u32) -> bool {
        matches!(self.sparse.get(index as usize), Some(Some(_)))
    }
}
