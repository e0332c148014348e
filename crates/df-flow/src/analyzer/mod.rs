//! Single-pass translation of a fragment into a flat instruction sequence.
//!
//! Every visit takes the shared [`FlowContext`] by exclusive reference; the
//! analyzer itself only holds read-only configuration.

mod class_init;
mod closure;
mod expr;
mod loops;
mod pattern;
mod promote;
mod stmt;
mod switch;
mod try_stmt;

use crate::context::FlowContext;
use crate::flow::Flow;
use crate::inliner::{default_inliners, CallInliner};
use crate::inst::{Anchor, InstructionKind, NullabilityProblem, PushValue};
use crate::listener::FlowListener;
use crate::place::{PlaceValue, StablePlace, ValueFactory};
use crate::resolver::ExpressionResolver;
use crate::trap::{unchecked_exceptions, ControlTransfer};
use df_core::ast::{
    Block, ClassDecl, Declarations, Expr, MethodId, NodeId, Stmt, Ty, NULL_POINTER_EXCEPTION,
};
use df_core::config::{self, FlowOptions};
use df_core::types::{Constant, DfType};
use df_core::{Error, Result};

/// What a build translates.
#[derive(Debug, Clone, Copy)]
pub enum FragmentRoot<'a> {
    /// Body of a method or lambda; `return_ty` drives the promotion of returned values.
    Body { block: &'a Block, return_ty: &'a Ty },
    Expression(&'a Expr),
    /// One iteration of a loop statement, without its back edge.
    Loop(&'a Stmt),
    /// Static and instance initializers of a class.
    Class(&'a ClassDecl),
}

impl<'a> FragmentRoot<'a> {
    pub fn node(&self) -> NodeId {
        match self {
            FragmentRoot::Body { block, .. } => block.id,
            FragmentRoot::Expression(expr) => expr.id,
            FragmentRoot::Loop(stmt) => stmt.id,
            FragmentRoot::Class(class) => class.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FragmentRoot::Body { .. } => "body",
            FragmentRoot::Expression(_) => "expression",
            FragmentRoot::Loop(_) => "loop",
            FragmentRoot::Class(_) => "class",
        }
    }
}

/// Build the flow of `root` with the default inliners.
///
/// Returns `Ok(None)` when the fragment contains a construct that has no
/// translation; callers skip the analysis of such fragments.
pub fn build_flow<'a>(
    root: FragmentRoot<'a>,
    decls: &'a Declarations,
    values: &'a ValueFactory,
    options: &FlowOptions,
    listener: Option<&'a mut dyn FlowListener>,
) -> Result<Option<Flow>> {
    build_flow_with(root, decls, values, options, default_inliners(), listener)
}

/// Build the flow of `root`, trying `inliners` in order on every call.
pub fn build_flow_with<'a>(
    root: FragmentRoot<'a>,
    decls: &'a Declarations,
    values: &'a ValueFactory,
    options: &FlowOptions,
    inliners: &'a [Box<dyn CallInliner>],
    listener: Option<&'a mut dyn FlowListener>,
) -> Result<Option<Flow>> {
    let _span = tracing::debug_span!("build_flow", kind = root.kind(), node = %root.node()).entered();
    let analyzer = ControlFlowAnalyzer::new(root, decls, options.clone(), inliners);
    let mut cx = FlowContext::new(values, listener);
    debug!(kind = root.kind(), node = %root.node(), "building flow");
    match analyzer.build(&mut cx) {
        Ok(()) => {}
        Err(Error::Unsupported { node, reason }) => {
            debug!(%node, %reason, "flow build aborted");
            return Ok(None);
        }
        Err(err) => return Err(err),
    }
    assert_expr!(
        cx.branches.is_empty(),
        "{} region(s) left open at the end of the build",
        cx.branches.len()
    );
    let flow = cx.into_flow()?;
    debug!(
        kind = root.kind(),
        instructions = flow.instruction_count(),
        "flow built"
    );
    if config::trace_flows() {
        trace!("{}", crate::dump::dump_flow(&flow));
    }
    Ok(Some(flow))
}

pub struct ControlFlowAnalyzer<'a> {
    root: FragmentRoot<'a>,
    decls: &'a Declarations,
    resolver: ExpressionResolver<'a>,
    options: FlowOptions,
    inliners: &'a [Box<dyn CallInliner>],
}

impl<'a> ControlFlowAnalyzer<'a> {
    pub fn new(
        root: FragmentRoot<'a>,
        decls: &'a Declarations,
        options: FlowOptions,
        inliners: &'a [Box<dyn CallInliner>],
    ) -> Self {
        Self {
            root,
            decls,
            resolver: ExpressionResolver::new(decls),
            options,
            inliners,
        }
    }

    pub fn decls(&self) -> &'a Declarations {
        self.decls
    }

    pub fn options(&self) -> &FlowOptions {
        &self.options
    }

    fn root_node(&self) -> NodeId {
        self.root.node()
    }

    fn return_ty(&self) -> Ty {
        match self.root {
            FragmentRoot::Body { return_ty, .. } => return_ty.clone(),
            _ => Ty::Unknown,
        }
    }

    /// The loop statement analyzed as a single iteration, if any.
    fn is_root_loop(&self, stmt: NodeId) -> bool {
        matches!(self.root, FragmentRoot::Loop(root) if root.id == stmt)
    }

    fn build(&self, cx: &mut FlowContext<'a>) -> Result<()> {
        cx.add(
            InstructionKind::FinishElement {
                node: None,
                flush: Vec::new(),
            },
            None,
        )?;
        match self.root {
            FragmentRoot::Body { block, .. } => self.visit_block(cx, block, &[])?,
            FragmentRoot::Expression(expr) => self.visit_expr(cx, expr)?,
            FragmentRoot::Loop(stmt) => self.visit_stmt(cx, stmt)?,
            FragmentRoot::Class(class) => self.visit_class_initializers(cx, class)?,
        }
        let transfer = cx.exit_transfer();
        cx.add(InstructionKind::Return { transfer }, None)?;
        Ok(())
    }

    fn resolve(&self, cx: &FlowContext<'a>, expr: &Expr) -> Option<StablePlace> {
        self.resolver.resolve(expr, cx.init_scope)
    }

    pub(crate) fn fold_constant(&self, cx: &FlowContext<'a>, expr: &Expr) -> Option<Constant> {
        self.resolver.fold(expr, cx.init_scope)
    }

    fn push_value(
        &self,
        cx: &mut FlowContext<'a>,
        value: PushValue,
        anchor: Option<&Expr>,
    ) -> Result<()> {
        cx.add(
            InstructionKind::Push {
                value,
                for_write: false,
            },
            anchor.map(|e| Anchor::Expr(e.id)),
        )?;
        Ok(())
    }

    fn push_place(
        &self,
        cx: &mut FlowContext<'a>,
        place: StablePlace,
        anchor: Option<&Expr>,
    ) -> Result<()> {
        let value = cx.place(place);
        self.push_value(cx, PushValue::Place(value), anchor)
    }

    fn push_for_write(&self, cx: &mut FlowContext<'a>, place: &PlaceValue) -> Result<()> {
        cx.add(
            InstructionKind::Push {
                value: PushValue::Place(place.clone()),
                for_write: true,
            },
            None,
        )?;
        Ok(())
    }

    fn pop(&self, cx: &mut FlowContext<'a>) -> Result<()> {
        cx.add(InstructionKind::Pop, None)?;
        Ok(())
    }

    /// Null check of the top value, unless the node has an override that suppresses it.
    pub(crate) fn add_null_check(
        &self,
        cx: &mut FlowContext<'a>,
        node: NodeId,
        default: NullabilityProblem,
    ) -> Result<()> {
        let problem = cx.nullability_problem(node, default);
        if problem == NullabilityProblem::NoProblem {
            return Ok(());
        }
        let transfer = cx.check_transfer(NULL_POINTER_EXCEPTION, self.decls);
        cx.add(InstructionKind::CheckNotNull { problem, transfer }, None)?;
        Ok(())
    }

    /// Any call may raise an `Error`, when something in the fragment can observe it.
    fn add_conditional_error_throw(&self, cx: &mut FlowContext<'a>) -> Result<()> {
        if !cx.traps.should_handle_exceptions() {
            return Ok(());
        }
        let transfer = cx.exception_transfer(df_core::ast::ERROR, self.decls);
        cx.add(InstructionKind::MayThrow { transfer }, None)?;
        Ok(())
    }

    /// Exception checks after a call: unchecked exceptions plus what the method declares,
    /// reduced to the types an enclosing trap can observe.
    pub(crate) fn add_method_throws(
        &self,
        cx: &mut FlowContext<'a>,
        method: Option<MethodId>,
    ) -> Result<()> {
        let mut candidates = unchecked_exceptions();
        if let Some(method) = method {
            candidates.extend(self.decls.method(method).throws.iter().cloned());
        }
        self.add_throws(cx, &candidates)
    }

    fn add_throws(&self, cx: &mut FlowContext<'a>, candidates: &[String]) -> Result<()> {
        for exception in cx.traps.observable_exceptions(candidates, self.decls) {
            let transfer = cx.exception_transfer(&exception, self.decls);
            cx.add(InstructionKind::MayThrow { transfer }, None)?;
        }
        Ok(())
    }

    /// Leave `exited` if it encloses the current point, otherwise leave the fragment.
    fn jump_out(&self, cx: &mut FlowContext<'a>, exited: Option<NodeId>) -> Result<()> {
        let transfer = match exited {
            Some(node) if cx.flow.is_open(node) => cx.transfer_to(node, node),
            _ => cx.exit_transfer(),
        };
        cx.control_transfer(transfer)
    }

    fn throw_exception(&self, cx: &mut FlowContext<'a>, exception: &str) -> Result<()> {
        let transfer: ControlTransfer = cx.exception_transfer(exception, self.decls);
        cx.add(InstructionKind::Throw { transfer }, None)?;
        Ok(())
    }

    fn push_unknown(&self, cx: &mut FlowContext<'a>) -> Result<()> {
        self.push_value(cx, PushValue::Value(DfType::Top), None)
    }
}
