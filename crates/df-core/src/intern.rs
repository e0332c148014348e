use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};

/// Token handed out by an [`Interner`]; equal inputs always map to the same token.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Shared interning table. One instance may outlive many flow builds so that the
/// same place receives the same token every time it is seen.
pub struct Interner<T>
where
    T: Eq + Hash + Clone,
{
    by_value: DashMap<T, ValueId>,
    by_id: DashMap<ValueId, T>,
    next: AtomicU32,
}

impl<T> Interner<T>
where
    T: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            by_value: DashMap::new(),
            by_id: DashMap::new(),
            next: AtomicU32::new(0),
        }
    }

    pub fn intern(&self, value: &T) -> ValueId {
        if let Some(id) = self.by_value.get(value) {
            return *id;
        }
        let id = *self.by_value.entry(value.clone()).or_insert_with(|| {
            let id = ValueId(self.next.fetch_add(1, Ordering::Relaxed));
            self.by_id.insert(id, value.clone());
            id
        });
        id
    }

    pub fn lookup(&self, value: &T) -> Option<ValueId> {
        self.by_value.get(value).map(|id| *id)
    }

    pub fn resolve(&self, id: ValueId) -> Option<T> {
        self.by_id.get(&id).map(|value| value.clone())
    }

    pub fn len(&self) -> usize {
        self.by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_value.is_empty()
    }
}

impl<T> Default for Interner<T>
where
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
