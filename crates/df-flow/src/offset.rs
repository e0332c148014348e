use df_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeferredId(pub usize);

/// Branch target: a known instruction index or a placeholder patched later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlFlowOffset {
    Resolved(usize),
    Deferred(DeferredId),
}

impl ControlFlowOffset {
    /// Index of a resolved offset. Every offset of a finished flow is resolved.
    pub fn index(&self) -> Option<usize> {
        match self {
            ControlFlowOffset::Resolved(index) => Some(*index),
            ControlFlowOffset::Deferred(_) => None,
        }
    }

    pub(crate) fn finalize(&mut self, table: &OffsetTable) -> Result<()> {
        if let ControlFlowOffset::Deferred(id) = *self {
            let index = table
                .get(id)
                .ok_or(Error::UnresolvedOffset { placeholder: id.0 })?;
            *self = ControlFlowOffset::Resolved(index);
        }
        Ok(())
    }
}

impl fmt::Display for ControlFlowOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlFlowOffset::Resolved(index) => write!(f, "{index}"),
            ControlFlowOffset::Deferred(id) => write!(f, "?{}", id.0),
        }
    }
}

/// Side table backing deferred offsets. Each placeholder is bound exactly once.
#[derive(Debug, Default)]
pub struct OffsetTable {
    slots: Vec<Option<usize>>,
}

impl OffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&mut self) -> ControlFlowOffset {
        self.slots.push(None);
        ControlFlowOffset::Deferred(DeferredId(self.slots.len() - 1))
    }

    pub fn bind(&mut self, offset: ControlFlowOffset, index: usize) {
        match offset {
            ControlFlowOffset::Deferred(id) => {
                let slot = &mut self.slots[id.0];
                assert_expr!(slot.is_none(), "deferred offset #{} bound twice", id.0);
                *slot = Some(index);
            }
            ControlFlowOffset::Resolved(_) => {
                assert_expr!(false, "cannot bind an already resolved offset")
            }
        }
    }

    pub fn get(&self, id: DeferredId) -> Option<usize> {
        self.slots.get(id.0).copied().flatten()
    }

    /// Current value of an offset, if known.
    pub fn lookup(&self, offset: ControlFlowOffset) -> Option<usize> {
        match offset {
            ControlFlowOffset::Resolved(index) => Some(index),
            ControlFlowOffset::Deferred(id) => self.get(id),
        }
    }

    pub fn unresolved(&self) -> impl Iterator<Item = DeferredId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| DeferredId(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn deferred_offsets_finalize_after_binding() {
        let mut table = OffsetTable::new();
        let mut offset = table.defer();
        assert_eq!(offset.index(), None);
        table.bind(offset, 7);
        offset.finalize(&table).expect("bound offset");
        assert_eq!(offset, ControlFlowOffset::Resolved(7));
    }

    #[test]
    fn unbound_offset_fails_finalization() {
        let mut table = OffsetTable::new();
        let mut offset = table.defer();
        assert_eq!(table.unresolved().count(), 1);
        let err = offset.finalize(&table).unwrap_err();
        assert!(matches!(err, Error::UnresolvedOffset { placeholder: 0 }));
    }

    #[test]
    #[should_panic(expected = "bound twice")]
    fn binding_twice_is_a_defect() {
        let mut table = OffsetTable::new();
        let offset = table.defer();
        table.bind(offset, 1);
        table.bind(offset, 2);
    }
}
