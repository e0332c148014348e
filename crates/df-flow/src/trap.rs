//! Trap records and the persistent trap stack.

use crate::offset::{ControlFlowOffset, OffsetTable};
use crate::place::StablePlace;
use df_core::ast::{Declarations, NodeId, VarId, ERROR, RUNTIME_EXCEPTION, THROWABLE};
use df_core::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub param: VarId,
    pub types: Vec<String>,
    pub target: ControlFlowOffset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrapKind {
    /// Protected region of a `try` with catch sections.
    TryCatch { clauses: Vec<CatchClause> },
    /// Region opened by the builder's `do_try`: any exception lands at `target`.
    TryCatchAll { target: ControlFlowOffset },
    /// Inside a `try` that has a `finally` block starting at `finally_start`.
    EnterFinally { finally_start: ControlFlowOffset },
    /// Inside the body of a try-with-resources; resources are closed at `cleanup_start`.
    TwrFinally { cleanup_start: ControlFlowOffset },
    /// Inside a finally block or resource cleanup.
    InsideFinally,
    /// Inside an inlined computation whose result lands in a place.
    InsideInlinedBlock,
}

/// One enclosing exception, finally, resource or inlined-block region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trap {
    pub anchor: NodeId,
    pub kind: TrapKind,
}

impl Trap {
    pub fn new(anchor: NodeId, kind: TrapKind) -> Self {
        Self { anchor, kind }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            TrapKind::TryCatch { .. } => "try-catch",
            TrapKind::TryCatchAll { .. } => "try-catch-all",
            TrapKind::EnterFinally { .. } => "enter-finally",
            TrapKind::TwrFinally { .. } => "twr-finally",
            TrapKind::InsideFinally => "inside-finally",
            TrapKind::InsideInlinedBlock => "inlined-block",
        }
    }

    /// Finally-like traps intercept every transfer, not only exceptions.
    pub fn intercepts_all(&self) -> bool {
        matches!(
            self.kind,
            TrapKind::EnterFinally { .. } | TrapKind::TwrFinally { .. } | TrapKind::TryCatchAll { .. }
        )
    }

    pub(crate) fn finalize(&mut self, table: &OffsetTable) -> Result<()> {
        match &mut self.kind {
            TrapKind::TryCatch { clauses } => {
                for clause in clauses {
                    clause.target.finalize(table)?;
                }
                Ok(())
            }
            TrapKind::TryCatchAll { target } => target.finalize(table),
            TrapKind::EnterFinally { finally_start } => finally_start.finalize(table),
            TrapKind::TwrFinally { cleanup_start } => cleanup_start.finalize(table),
            TrapKind::InsideFinally | TrapKind::InsideInlinedBlock => Ok(()),
        }
    }

    pub(crate) fn offsets(&self) -> Vec<ControlFlowOffset> {
        match &self.kind {
            TrapKind::TryCatch { clauses } => clauses.iter().map(|c| c.target).collect(),
            TrapKind::TryCatchAll { target } => vec![*target],
            TrapKind::EnterFinally { finally_start } => vec![*finally_start],
            TrapKind::TwrFinally { cleanup_start } => vec![*cleanup_start],
            TrapKind::InsideFinally | TrapKind::InsideInlinedBlock => Vec::new(),
        }
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name(), self.anchor)?;
        match &self.kind {
            TrapKind::TryCatch { clauses } => {
                for clause in clauses {
                    write!(f, " [{}->{}]", clause.types.join("|"), clause.target)?;
                }
                Ok(())
            }
            TrapKind::TryCatchAll { target } => write!(f, "->{target}"),
            TrapKind::EnterFinally { finally_start } => write!(f, "->{finally_start}"),
            TrapKind::TwrFinally { cleanup_start } => write!(f, "->{cleanup_start}"),
            TrapKind::InsideFinally | TrapKind::InsideInlinedBlock => Ok(()),
        }
    }
}

#[derive(Debug)]
struct TrapNode {
    trap: Trap,
    parent: Option<Rc<TrapNode>>,
    depth: usize,
}

/// Immutable parent-linked trap stack; pushing returns a new stack sharing the tail.
#[derive(Debug, Clone, Default)]
pub struct TrapStack {
    head: Option<Rc<TrapNode>>,
}

impl TrapStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, trap: Trap) -> TrapStack {
        let depth = self.depth() + 1;
        TrapStack {
            head: Some(Rc::new(TrapNode {
                trap,
                parent: self.head.clone(),
                depth,
            })),
        }
    }

    /// The stack without its top trap.
    pub fn parent(&self) -> TrapStack {
        TrapStack {
            head: self.head.as_ref().and_then(|node| node.parent.clone()),
        }
    }

    pub fn peek(&self) -> Option<&Trap> {
        self.head.as_ref().map(|node| &node.trap)
    }

    pub fn depth(&self) -> usize {
        self.head.as_ref().map_or(0, |node| node.depth)
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Innermost trap first.
    pub fn iter(&self) -> TrapIter<'_> {
        TrapIter {
            node: self.head.as_deref(),
        }
    }

    pub fn same(&self, other: &TrapStack) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Traps pushed on top of `base`, innermost first. `base` must be a snapshot
    /// this stack grew from.
    pub fn slice_above(&self, base: &TrapStack) -> Vec<Trap> {
        let count = self.depth().saturating_sub(base.depth());
        let traps: Vec<Trap> = self.iter().take(count).cloned().collect();
        debug_assert!(
            {
                let mut rest = self.clone();
                for _ in 0..count {
                    rest = rest.parent();
                }
                rest.same(base)
            },
            "trap snapshot is not an ancestor of the current stack"
        );
        traps
    }
}

pub struct TrapIter<'s> {
    node: Option<&'s TrapNode>,
}

impl<'s> Iterator for TrapIter<'s> {
    type Item = &'s Trap;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = node.parent.as_deref();
        Some(&node.trap)
    }
}

/// Owns the current trap stack of one build and answers exception routing questions.
#[derive(Debug, Default)]
pub struct TrapTracker {
    stack: TrapStack,
}

impl TrapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stack(&self) -> &TrapStack {
        &self.stack
    }

    pub fn push(&mut self, trap: Trap) {
        self.stack = self.stack.push(trap);
    }

    /// Pops the top trap, which must have been opened by `anchor`.
    pub fn pop(&mut self, anchor: NodeId) -> Trap {
        let top = self.stack.peek().cloned();
        match top {
            Some(trap) if trap.anchor == anchor => {
                self.stack = self.stack.parent();
                trap
            }
            other => panic!(
                "assertion failed: trap stack mismatch, expected a trap for {anchor}, found {:?}",
                other.map(|t| t.name())
            ),
        }
    }

    /// Whether any enclosing region can observe an exception.
    pub fn should_handle_exceptions(&self) -> bool {
        self.stack.iter().any(|trap| {
            matches!(
                trap.kind,
                TrapKind::TryCatch { .. }
                    | TrapKind::TryCatchAll { .. }
                    | TrapKind::EnterFinally { .. }
                    | TrapKind::TwrFinally { .. }
            )
        })
    }

    /// Traps an exception of type `exception` passes through, innermost first.
    /// Traps beyond a catch clause that surely catches it are unreachable and dropped.
    pub fn exception_traps(&self, exception: &str, decls: &Declarations) -> Vec<Trap> {
        let mut traps = Vec::new();
        for trap in self.stack.iter() {
            traps.push(trap.clone());
            if let TrapKind::TryCatch { clauses } = &trap.kind {
                let caught = clauses.iter().any(|clause| {
                    clause
                        .types
                        .iter()
                        .any(|ty| decls.is_subtype(exception, ty))
                });
                if caught {
                    break;
                }
            }
        }
        traps
    }

    /// Reduces `candidates` to the exception types an enclosing region can tell apart:
    /// subsumed types are merged into their supertypes, types no trap can observe are dropped.
    pub fn observable_exceptions(&self, candidates: &[String], decls: &Declarations) -> Vec<String> {
        if !self.should_handle_exceptions() {
            return Vec::new();
        }
        let mut maximal: Vec<String> = Vec::new();
        for candidate in candidates {
            if candidates
                .iter()
                .any(|other| other != candidate && decls.is_subtype(candidate, other))
            {
                continue;
            }
            if !maximal.contains(candidate) {
                maximal.push(candidate.clone());
            }
        }
        if self.stack.iter().any(Trap::intercepts_all) {
            return maximal;
        }
        maximal
            .into_iter()
            .filter(|exception| {
                self.stack.iter().any(|trap| match &trap.kind {
                    TrapKind::TryCatch { clauses } => clauses.iter().any(|clause| {
                        clause
                            .types
                            .iter()
                            .any(|ty| decls.are_related(exception, ty))
                    }),
                    _ => false,
                })
            })
            .collect()
    }
}

/// Exceptions any call may raise.
pub fn unchecked_exceptions() -> Vec<String> {
    vec![ERROR.to_string(), RUNTIME_EXCEPTION.to_string()]
}

/// Where a control transfer lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferTarget {
    /// A position in this flow; `flush` lists places going out of scope on the way.
    Instruction {
        offset: ControlFlowOffset,
        flush: Vec<StablePlace>,
    },
    /// Leaves the analyzed fragment (return, or a jump to a statement outside it).
    Exit,
    /// Exceptional completion with an exception of the given type.
    Exception { ty: String },
    /// Resumes whatever transfer entered the finally block.
    ExitFinally,
}

/// A jump that may cross trap regions; `traps` lists the crossed regions, innermost first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlTransfer {
    pub target: TransferTarget,
    pub traps: Vec<Trap>,
}

impl ControlTransfer {
    pub fn new(target: TransferTarget, traps: Vec<Trap>) -> Self {
        Self { target, traps }
    }

    pub fn exit(traps: Vec<Trap>) -> Self {
        Self::new(TransferTarget::Exit, traps)
    }

    pub fn exception(ty: impl Into<String>, traps: Vec<Trap>) -> Self {
        Self::new(TransferTarget::Exception { ty: ty.into() }, traps)
    }

    pub fn is_throwable(&self) -> bool {
        matches!(&self.target, TransferTarget::Exception { ty } if ty == THROWABLE)
    }

    pub(crate) fn finalize(&mut self, table: &OffsetTable) -> Result<()> {
        if let TransferTarget::Instruction { offset, .. } = &mut self.target {
            offset.finalize(table)?;
        }
        for trap in &mut self.traps {
            trap.finalize(table)?;
        }
        Ok(())
    }

    pub(crate) fn offsets(&self) -> Vec<ControlFlowOffset> {
        let mut offsets: Vec<ControlFlowOffset> = self.traps.iter().flat_map(Trap::offsets).collect();
        if let TransferTarget::Instruction { offset, .. } = &self.target {
            offsets.push(*offset);
        }
        offsets
    }
}

impl fmt::Display for ControlTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            TransferTarget::Instruction { offset, flush } => {
                write!(f, "goto {offset}")?;
                if !flush.is_empty() {
                    let names: Vec<String> = flush.iter().map(|p| p.to_string()).collect();
                    write!(f, " flushing {}", names.join(", "))?;
                }
            }
            TransferTarget::Exit => f.write_str("exit")?,
            TransferTarget::Exception { ty } => write!(f, "throw {ty}")?,
            TransferTarget::ExitFinally => f.write_str("exit finally")?,
        }
        if !self.traps.is_empty() {
            let traps: Vec<String> = self.traps.iter().map(|t| t.to_string()).collect();
            write!(f, " via [{}]", traps.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use df_core::ast::{ARITHMETIC_EXCEPTION, EXCEPTION, NULL_POINTER_EXCEPTION};
    use pretty_assertions::assert_eq;

    fn finally_trap(anchor: u32) -> Trap {
        Trap::new(
            NodeId(anchor),
            TrapKind::EnterFinally {
                finally_start: ControlFlowOffset::Resolved(0),
            },
        )
    }

    fn catch_trap(anchor: u32, ty: &str) -> Trap {
        Trap::new(
            NodeId(anchor),
            TrapKind::TryCatch {
                clauses: vec![CatchClause {
                    param: VarId(0),
                    types: vec![ty.to_string()],
                    target: ControlFlowOffset::Resolved(0),
                }],
            },
        )
    }

    #[test]
    fn slice_above_snapshot_is_innermost_first() {
        let base = TrapStack::new().push(finally_trap(1));
        let inner = base.push(catch_trap(2, EXCEPTION)).push(finally_trap(3));
        let anchors: Vec<NodeId> = inner.slice_above(&base).iter().map(|t| t.anchor).collect();
        assert_eq!(anchors, vec![NodeId(3), NodeId(2)]);
        assert_eq!(inner.depth(), 3);
        assert_eq!(base.depth(), 1);
    }

    #[test]
    fn push_does_not_disturb_snapshot() {
        let base = TrapStack::new().push(finally_trap(1));
        let _grown = base.push(finally_trap(2));
        assert_eq!(base.depth(), 1);
        assert_eq!(base.peek().map(|t| t.anchor), Some(NodeId(1)));
    }

    #[test]
    fn exception_traps_stop_at_catching_clause() {
        let decls = Declarations::new();
        let mut tracker = TrapTracker::new();
        tracker.push(finally_trap(1));
        tracker.push(catch_trap(2, RUNTIME_EXCEPTION));
        let traps = tracker.exception_traps(NULL_POINTER_EXCEPTION, &decls);
        assert_eq!(traps.len(), 1);
        let traps = tracker.exception_traps(ERROR, &decls);
        assert_eq!(traps.len(), 2);
    }

    #[test]
    fn observable_exceptions_prunes_unrelated_types() {
        let decls = Declarations::new();
        let mut tracker = TrapTracker::new();
        assert!(tracker
            .observable_exceptions(&unchecked_exceptions(), &decls)
            .is_empty());
        tracker.push(catch_trap(1, ARITHMETIC_EXCEPTION));
        let observed = tracker.observable_exceptions(&unchecked_exceptions(), &decls);
        assert_eq!(observed, vec![RUNTIME_EXCEPTION.to_string()]);
    }

    #[test]
    #[should_panic(expected = "trap stack mismatch")]
    fn popping_foreign_trap_fails_fast() {
        let mut tracker = TrapTracker::new();
        tracker.push(finally_trap(1));
        tracker.pop(NodeId(2));
    }
}
