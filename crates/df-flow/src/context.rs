use crate::builder::PendingBranch;
use crate::flow::{Flow, FlowBuffer};
use crate::inst::{Anchor, InstructionKind, NullabilityProblem};
use crate::listener::FlowListener;
use crate::place::{PlaceValue, StablePlace, ValueFactory};
use crate::resolver::InitScope;
use crate::trap::{ControlTransfer, TransferTarget, Trap, TrapStack, TrapTracker};
use df_core::ast::visit::{declared_vars, NodeRef};
use df_core::ast::{Declarations, NodeId, Ty};
use df_core::diagnostics::{Diagnostic, DiagnosticSink};
use df_core::Result;
use std::collections::HashMap;

/// An inlined computation whose result lands in `target`.
#[derive(Debug, Clone)]
pub(crate) struct ExpressionBlockContext {
    /// Lambda or switch expression being inlined.
    pub owner: NodeId,
    /// Region whose end receives the jumps out of the computation.
    pub block: NodeId,
    pub target: PlaceValue,
    pub target_ty: Ty,
    /// Returned values must not be null.
    pub force_non_null: bool,
    /// `return` statements belong to this context (lambdas, not switch expressions).
    pub accepts_return: bool,
}

/// Mutable state of one build, threaded by exclusive reference through the analyzer.
pub struct FlowContext<'a> {
    pub(crate) flow: FlowBuffer,
    pub(crate) traps: TrapTracker,
    pub(crate) branches: Vec<PendingBranch>,
    pub(crate) blocks: Vec<ExpressionBlockContext>,
    pub(crate) nullability: HashMap<NodeId, NullabilityProblem>,
    pub(crate) init_scope: Option<InitScope>,
    /// Trap stack at the start of every visited statement and block.
    snapshots: HashMap<NodeId, TrapStack>,
    /// Regions that jumps can leave, for their flush lists.
    targets: HashMap<NodeId, NodeRef<'a>>,
    pub(crate) loop_bodies: HashMap<NodeId, NodeId>,
    pub(crate) method_ref_qualifiers: HashMap<NodeId, PlaceValue>,
    pub(crate) diagnostics: DiagnosticSink,
    values: &'a ValueFactory,
    listener: Option<&'a mut dyn FlowListener>,
}

impl<'a> FlowContext<'a> {
    pub fn new(values: &'a ValueFactory, listener: Option<&'a mut dyn FlowListener>) -> Self {
        Self {
            flow: FlowBuffer::new(),
            traps: TrapTracker::new(),
            branches: Vec::new(),
            blocks: Vec::new(),
            nullability: HashMap::new(),
            init_scope: None,
            snapshots: HashMap::new(),
            targets: HashMap::new(),
            loop_bodies: HashMap::new(),
            method_ref_qualifiers: HashMap::new(),
            diagnostics: DiagnosticSink::new(),
            values,
            listener,
        }
    }

    /// Append an instruction, notifying the listener first when it pushes an anchored value.
    pub fn add(&mut self, kind: InstructionKind, anchor: Option<Anchor>) -> Result<usize> {
        if let (Some(anchor), Some(listener)) = (anchor.as_ref(), self.listener.as_deref_mut()) {
            if kind.stack_effect().pushes > 0 {
                listener.before_push(anchor, &kind)?;
            }
        }
        Ok(self.flow.push(kind, anchor))
    }

    pub fn notify_return(&mut self, scope: NodeId) -> Result<()> {
        match self.listener.as_deref_mut() {
            Some(listener) => listener.before_return(scope),
            None => Ok(()),
        }
    }

    pub fn place(&self, place: StablePlace) -> PlaceValue {
        self.values.place_value(place)
    }

    pub fn create_temp(&mut self, ty: Ty) -> PlaceValue {
        let id = self.flow.create_temp(ty);
        self.place(StablePlace::Temp(id))
    }

    pub fn start(&mut self, node: NodeId) {
        self.flow.start_element(node);
        self.snapshots.insert(node, self.traps.stack().clone());
    }

    pub fn finish(&mut self, node: NodeId) {
        self.flow.finish_element(node);
    }

    /// Close a statement and append its completion marker, flushing the temps it created.
    pub fn finish_statement(&mut self, node: NodeId) -> Result<()> {
        let start = self
            .flow
            .latest_start(node)
            .unwrap_or_else(|| self.flow.instruction_count());
        self.flow.finish_element(node);
        let flush = self
            .flow
            .temps_since(start)
            .into_iter()
            .map(|temp| self.place(StablePlace::Temp(temp)))
            .collect();
        self.add(
            InstructionKind::FinishElement {
                node: Some(node),
                flush,
            },
            None,
        )?;
        Ok(())
    }

    /// Remember a region that `break`, `continue`, `yield` or an inlined `return` can leave.
    pub fn register_target(&mut self, node: NodeId, region: NodeRef<'a>) {
        self.targets.insert(node, region);
    }

    /// Traps entered since `node` started, innermost first.
    pub fn traps_inside(&self, node: NodeId) -> Vec<Trap> {
        match self.snapshots.get(&node) {
            Some(base) => self.traps.stack().slice_above(base),
            None => self.traps.stack().iter().cloned().collect(),
        }
    }

    /// Jump to the end of `exited`, flushing the variables declared in `flush_scope`.
    pub fn transfer_to(&mut self, exited: NodeId, flush_scope: NodeId) -> ControlTransfer {
        let offset = self.flow.end_offset(exited);
        let flush = self
            .targets
            .get(&flush_scope)
            .map(|region| {
                declared_vars(*region)
                    .into_iter()
                    .map(StablePlace::Var)
                    .collect()
            })
            .unwrap_or_default();
        ControlTransfer::new(
            TransferTarget::Instruction { offset, flush },
            self.traps_inside(exited),
        )
    }

    /// Leave the fragment through every enclosing trap.
    pub fn exit_transfer(&self) -> ControlTransfer {
        ControlTransfer::exit(self.traps.stack().iter().cloned().collect())
    }

    pub fn exception_transfer(&self, exception: &str, decls: &Declarations) -> ControlTransfer {
        ControlTransfer::exception(exception, self.traps.exception_traps(exception, decls))
    }

    /// Exception transfer for an implicit runtime check, or `None` when nothing in the
    /// fragment can observe the exception.
    pub fn check_transfer(&self, exception: &str, decls: &Declarations) -> Option<ControlTransfer> {
        self.traps
            .should_handle_exceptions()
            .then(|| self.exception_transfer(exception, decls))
    }

    pub fn control_transfer(&mut self, transfer: ControlTransfer) -> Result<()> {
        let trap_depth = self.traps.stack().depth();
        self.add(
            InstructionKind::ControlTransfer {
                transfer,
                trap_depth,
            },
            None,
        )?;
        Ok(())
    }

    pub fn nullability_problem(
        &self,
        node: NodeId,
        default: NullabilityProblem,
    ) -> NullabilityProblem {
        self.nullability.get(&node).copied().unwrap_or(default)
    }

    /// Record a locally absorbed anomaly.
    pub fn anomaly(&mut self, node: NodeId, code: &str, message: impl Into<String>) {
        self.diagnostics.push(
            Diagnostic::warning(message)
                .with_node(node)
                .with_code(code),
        );
    }

    pub fn into_flow(self) -> Result<Flow> {
        self.flow.finalize(self.diagnostics.into_vec())
    }
}
