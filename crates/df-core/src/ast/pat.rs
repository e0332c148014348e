use super::{NodeId, Ty, VarId};
use crate::span::Span;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: NodeId,
    pub kind: PatternKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternKind {
    /// `Type name`; the type may be primitive.
    Type { ty: Ty, binding: Option<VarId> },
    /// `Point(int x, var y)`; components match record components in order.
    Record {
        ty: Ty,
        components: Vec<Pattern>,
        binding: Option<VarId>,
    },
    /// `_`, matches anything of the given type.
    Unnamed(Ty),
}

impl Pattern {
    pub fn ty(&self) -> &Ty {
        match &self.kind {
            PatternKind::Type { ty, .. } | PatternKind::Record { ty, .. } => ty,
            PatternKind::Unnamed(ty) => ty,
        }
    }

    pub fn binding(&self) -> Option<VarId> {
        match &self.kind {
            PatternKind::Type { binding, .. } | PatternKind::Record { binding, .. } => *binding,
            PatternKind::Unnamed(_) => None,
        }
    }
}
