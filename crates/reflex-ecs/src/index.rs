use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::Entity;

/// How [`DenseIndex::erase`] reclaims a dense slot. Fixed at construction;
/// downstream slot-stability guarantees depend on it never changing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeletionPolicy {
    /// Erase moves the last live entry into the freed slot and shrinks the
    /// dense length; slot indices of unrelated entities may change.
    Swap,
    /// Erase leaves a tombstone; every other slot index stays stable.
    /// Tombstoned slots are reused by later inserts, most recently freed
    /// first.
    InPlace,
}

/// Shared handle to a [`DenseIndex`]; registry listeners deliver into one of
/// these, and a reactive index owns one.
pub type IndexHandle = Arc<RwLock<DenseIndex>>;

/// A presence-only sparse-set index over entities: O(1) membership test and
/// slot lookup, no payload.
///
/// Insert and erase are idempotent. Membership is generation-exact: a stale
/// handle for a recycled slot is not contained, and inserting the newer
/// generation takes over the stale entry's dense slot.
#[derive(Debug)]
pub struct DenseIndex {
    // entity index -> dense slot
    sparse: Vec<Option<u32>>,
    // None is a tombstone, only ever present under InPlace
    dense: Vec<Option<Entity>>,
    free: Vec<u32>,
    live: usize,
    policy: DeletionPolicy,
}

impl DenseIndex {
    pub fn new(policy: DeletionPolicy) -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            free: Vec::new(),
            live: 0,
            policy,
        }
    }

    pub fn policy(&self) -> DeletionPolicy {
        self.policy
    }

    /// Insert `entity` at the next free dense slot. No-op if already present.
    pub fn emplace(&mut self, entity: Entity) {
        let idx = entity.index as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, None);
        }
        if let Some(slot) = self.sparse[idx] {
            // Same slot index: either the entity itself (no-op) or a stale
            // generation whose dense entry the newer one takes over.
            self.dense[slot as usize] = Some(entity);
            return;
        }
        let slot = match self.free.pop() {
            Some(slot) => {
                self.dense[slot as usize] = Some(entity);
                slot
            }
            None => {
                self.dense.push(Some(entity));
                (self.dense.len() - 1) as u32
            }
        };
        self.sparse[idx] = Some(slot);
        self.live += 1;
    }

    /// Remove `entity` from the index. No-op if absent.
    pub fn erase(&mut self, entity: Entity) {
        if !self.contains(entity) {
            return;
        }
        let idx = entity.index as usize;
        let Some(slot) = self.sparse[idx].take() else {
            return;
        };
        let slot = slot as usize;
        match self.policy {
            DeletionPolicy::InPlace => {
                self.dense[slot] = None;
                self.free.push(slot as u32);
            }
            DeletionPolicy::Swap => {
                let last = self.dense.len() - 1;
                if slot != last {
                    self.dense.swap(slot, last);
                    if let Some(moved) = self.dense[slot] {
                        self.sparse[moved.index as usize] = Some(slot as u32);
                    }
                }
                self.dense.pop();
            }
        }
        self.live -= 1;
    }

    /// Whether `entity` is in the index. Total; stale generations are not
    /// contained.
    pub fn contains(&self, entity: Entity) -> bool {
        match self.sparse.get(entity.index as usize) {
            Some(Some(slot)) => self.dense[*slot as usize] == Some(entity),
            _ => false,
        }
    }

    /// The dense slot of `entity`.
    ///
    /// # Panics
    /// Panics if the entity is not in the index.
    pub fn index(&self, entity: Entity) -> usize {
        match self.sparse.get(entity.index as usize) {
            Some(Some(slot)) if self.dense[*slot as usize] == Some(entity) => *slot as usize,
            _ => panic!("{entity:?} is not in the index"),
        }
    }

    /// Number of entities currently in the index (tombstones excluded).
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Remove every entity. Policy and capacity are untouched.
    pub fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
        self.free.clear();
        self.live = 0;
    }

    pub fn capacity(&self) -> usize {
        self.dense.capacity()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.dense.reserve(additional);
    }

    /// Entities currently in the index, in dense-slot order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.dense.iter().flatten().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(index: u32) -> Entity {
        Entity::from_raw(index, 0)
    }

    #[test]
    fn emplace_is_idempotent() {
        let mut set = DenseIndex::new(DeletionPolicy::Swap);
        set.emplace(entity(3));
        set.emplace(entity(3));
        assert_eq!(set.len(), 1);
        assert!(set.contains(entity(3)));
        assert_eq!(set.index(entity(3)), 0);
    }

    #[test]
    fn erase_is_idempotent() {
        let mut set = DenseIndex::new(DeletionPolicy::Swap);
        set.emplace(entity(0));
        set.erase(entity(0));
        set.erase(entity(0));
        set.erase(entity(7));
        assert!(set.is_empty());
        assert!(!set.contains(entity(0)));
    }

    #[test]
    fn swap_policy_backfills() {
        let mut set = DenseIndex::new(DeletionPolicy::Swap);
        set.emplace(entity(10));
        set.emplace(entity(11));
        set.emplace(entity(12));
        set.erase(entity(10));
        assert_eq!(set.len(), 2);
        // last live entry moved into the freed slot
        assert_eq!(set.index(entity(12)), 0);
        assert_eq!(set.index(entity(11)), 1);
    }

    #[test]
    fn in_place_policy_keeps_slots_stable() {
        let mut set = DenseIndex::new(DeletionPolicy::InPlace);
        set.emplace(entity(0));
        set.emplace(entity(1));
        set.emplace(entity(2));
        set.erase(entity(1));
        assert_eq!(set.len(), 2);
        assert_eq!(set.index(entity(0)), 0);
        assert_eq!(set.index(entity(2)), 2);
        // the tombstone is reused before the dense array grows
        set.emplace(entity(5));
        assert_eq!(set.index(entity(5)), 1);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn tombstones_are_reused_most_recent_first() {
        let mut set = DenseIndex::new(DeletionPolicy::InPlace);
        set.emplace(entity(0));
        set.emplace(entity(1));
        set.emplace(entity(2));
        set.erase(entity(1));
        set.erase(entity(2));
        // slot 2 was freed last, so it is handed out first
        set.emplace(entity(8));
        assert_eq!(set.index(entity(8)), 2);
        set.emplace(entity(9));
        assert_eq!(set.index(entity(9)), 1);
        // free list exhausted, the dense array grows again
        set.emplace(entity(10));
        assert_eq!(set.index(entity(10)), 3);
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn stale_generation_not_contained() {
        let mut set = DenseIndex::new(DeletionPolicy::Swap);
        let old = Entity::from_raw(4, 0);
        let new = Entity::from_raw(4, 1);
        set.emplace(old);
        assert!(!set.contains(new));
        // the newer generation takes over the stale slot
        set.emplace(new);
        assert!(set.contains(new));
        assert!(!set.contains(old));
        assert_eq!(set.len(), 1);
    }

    #[test]
    #[should_panic(expected = "not in the index")]
    fn index_of_absent_entity_panics() {
        let set = DenseIndex::new(DeletionPolicy::Swap);
        set.index(entity(0));
    }

    #[test]
    fn clear_resets_but_keeps_policy() {
        let mut set = DenseIndex::new(DeletionPolicy::InPlace);
        set.emplace(entity(0));
        set.emplace(entity(1));
        set.erase(entity(0));
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.policy(), DeletionPolicy::InPlace);
        set.emplace(entity(2));
        assert_eq!(set.index(entity(2)), 0);
    }

    #[test]
    fn iter_skips_tombstones() {
        let mut set = DenseIndex::new(DeletionPolicy::InPlace);
        set.emplace(entity(0));
        set.emplace(entity(1));
        set.emplace(entity(2));
        set.erase(entity(1));
        let seen: Vec<_> = set.iter().collect();
        assert_eq!(seen, vec![entity(0), entity(2)]);
    }
}
