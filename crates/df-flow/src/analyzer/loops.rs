//! `while`, `do`, `for` and enhanced `for` loops.
//!
//! Counted `for` loops whose trip count is known and small are unrolled; longer
//! counted loops replace the counter update with a range fact about the counter.

use super::ControlFlowAnalyzer;
use crate::builder::CfgBuilder;
use crate::context::FlowContext;
use crate::inst::{InstructionKind, NullabilityProblem};
use crate::offset::ControlFlowOffset;
use crate::place::{PlaceValue, SpecialField, StablePlace};
use df_core::ast::visit::{is_assigned, NodeRef};
use df_core::ast::{
    BinaryOp, Expr, ExprKind, PrimitiveTy, Stmt, StmtKind, Ty, UnaryOp, VarId,
    JAVA_UTIL_COLLECTION,
};
use df_core::types::{Constant, DfType, RelationType};
use df_core::Result;

/// Factories whose arguments are exactly the iterated elements.
const FIXED_LIST_FACTORIES: &[(&str, &str)] = &[
    ("java.util.List", "of"),
    ("java.util.Set", "of"),
    ("java.util.stream.Stream", "of"),
    ("java.util.Arrays", "asList"),
];

/// `for (T i = origin; i < bound; i++)` with an `int` or `long` counter the body never writes.
struct CountedLoop<'a> {
    counter: VarId,
    ty: PrimitiveTy,
    origin: &'a Expr,
    start: Option<i64>,
    bound: Option<i64>,
    including: bool,
}

impl<'a> CountedLoop<'a> {
    fn trip_count(&self) -> Option<i64> {
        let (start, bound) = (self.start?, self.bound?);
        let end = bound.checked_add(i64::from(self.including))?;
        Some(end.saturating_sub(start).max(0))
    }

    fn max_value(&self) -> i64 {
        let type_max = self.ty.integral_bounds().map_or(i64::MAX, |(_, hi)| hi);
        match self.bound {
            Some(bound) => bound.saturating_add(i64::from(self.including)).min(type_max),
            None => type_max,
        }
    }
}

impl<'a> ControlFlowAnalyzer<'a> {
    fn enter_loop(&self, cx: &mut FlowContext<'a>, stmt: &'a Stmt, body: &'a Stmt) {
        cx.register_target(stmt.id, NodeRef::Stmt(stmt));
        cx.register_target(body.id, NodeRef::Stmt(body));
        cx.loop_bodies.insert(stmt.id, body.id);
    }

    fn goto(&self, cx: &mut FlowContext<'a>, target: ControlFlowOffset) -> Result<()> {
        cx.add(InstructionKind::Goto { target }, None)?;
        Ok(())
    }

    /// Pop the top boolean and leave `stmt` when it equals `exit_on`.
    fn exit_if(&self, cx: &mut FlowContext<'a>, stmt: &Stmt, exit_on: bool) -> Result<()> {
        let target = cx.flow.end_offset(stmt.id);
        cx.add(
            InstructionKind::ConditionalGoto {
                target,
                compare: DfType::boolean(exit_on),
            },
            None,
        )?;
        Ok(())
    }

    fn loop_condition(
        &self,
        cx: &mut FlowContext<'a>,
        stmt: &'a Stmt,
        cond: Option<&'a Expr>,
    ) -> Result<()> {
        let Some(cond) = cond else {
            return Ok(());
        };
        if self.fold_constant(cx, cond).and_then(|c| c.as_bool()) == Some(true) {
            return Ok(());
        }
        self.visit_condition(cx, cond)?;
        self.exit_if(cx, stmt, false)
    }

    pub(crate) fn visit_while(
        &self,
        cx: &mut FlowContext<'a>,
        stmt: &'a Stmt,
        cond: Option<&'a Expr>,
        body: &'a Stmt,
    ) -> Result<()> {
        self.enter_loop(cx, stmt, body);
        let head = cx.flow.here();
        self.loop_condition(cx, stmt, cond)?;
        self.visit_stmt(cx, body)?;
        if !self.is_root_loop(stmt.id) {
            self.goto(cx, head)?;
        }
        Ok(())
    }

    pub(crate) fn visit_do_while(
        &self,
        cx: &mut FlowContext<'a>,
        stmt: &'a Stmt,
        body: &'a Stmt,
        cond: Option<&'a Expr>,
    ) -> Result<()> {
        self.enter_loop(cx, stmt, body);
        self.visit_stmt(cx, body)?;
        let Some(cond) = cond else {
            if self.is_root_loop(stmt.id) {
                return Ok(());
            }
            let start = cx.flow.start_offset(stmt.id);
            return self.goto(cx, start);
        };
        self.visit_condition(cx, cond)?;
        if self.is_root_loop(stmt.id) {
            return self.pop(cx);
        }
        let start = cx.flow.start_offset(stmt.id);
        cx.add(
            InstructionKind::ConditionalGoto {
                target: start,
                compare: DfType::boolean(true),
            },
            None,
        )?;
        Ok(())
    }

    pub(crate) fn visit_for(&self, cx: &mut FlowContext<'a>, stmt: &'a Stmt) -> Result<()> {
        let StmtKind::For {
            init,
            cond,
            update,
            body,
        } = &stmt.kind
        else {
            return Ok(());
        };
        self.enter_loop(cx, stmt, body);
        if let Some(init) = init {
            self.visit_stmt(cx, init)?;
        }
        let loop_start = cx.flow.here();
        let counted = if self.is_root_loop(stmt.id) {
            None
        } else {
            self.counted_loop(cx, init.as_deref(), cond.as_ref(), update.as_deref(), body)
        };
        let Some(counted) = counted else {
            self.loop_condition(cx, stmt, cond.as_ref())?;
            self.visit_stmt(cx, body)?;
            if let Some(update) = update {
                self.visit_stmt(cx, update)?;
            }
            if !self.is_root_loop(stmt.id) {
                self.goto(cx, loop_start)?;
            }
            return Ok(());
        };

        let trip = counted.trip_count();
        debug!(counter = %counted.counter, trip = ?trip, "counted loop");
        let counter = cx.place(StablePlace::Var(counted.counter));
        match trip {
            Some(0) => {
                self.loop_condition(cx, stmt, cond.as_ref())?;
                self.visit_stmt(cx, body)?;
                let end = cx.flow.end_offset(stmt.id);
                self.goto(cx, end)
            }
            Some(trip) if trip as usize <= self.options.max_unroll => {
                for _ in 0..trip {
                    self.loop_condition(cx, stmt, cond.as_ref())?;
                    self.visit_stmt(cx, body)?;
                    if let Some(update) = update {
                        self.visit_stmt(cx, update)?;
                    }
                }
                let last = counted.start.unwrap_or_default() + trip;
                CfgBuilder::new(self, cx)
                    .assign_and_pop(&counter, DfType::range(counted.ty, last, last))?;
                Ok(())
            }
            _ => {
                self.loop_condition(cx, stmt, cond.as_ref())?;
                self.visit_stmt(cx, body)?;
                if let Some(start) = counted.start {
                    let fact = DfType::range(counted.ty, start.saturating_add(1), counted.max_value());
                    CfgBuilder::new(self, cx).assign_and_pop(&counter, fact)?;
                } else if let Some(origin) = counted.origin.as_local() {
                    let origin = cx.place(StablePlace::Var(origin));
                    let mut builder = CfgBuilder::new(self, cx);
                    builder
                        .assign_and_pop(&counter, DfType::Top)?
                        .push_place(&counter)?
                        .push_place(&origin)?
                        .compare(RelationType::Le)?;
                    self.exit_if(cx, stmt, true)?;
                } else if let Some(update) = update {
                    self.visit_stmt(cx, update)?;
                }
                self.goto(cx, loop_start)
            }
        }
    }

    fn counted_loop(
        &self,
        cx: &FlowContext<'a>,
        init: Option<&'a Stmt>,
        cond: Option<&'a Expr>,
        update: Option<&'a Stmt>,
        body: &'a Stmt,
    ) -> Option<CountedLoop<'a>> {
        let (counter, origin) = match &init?.kind {
            StmtKind::Decl(locals) if locals.len() == 1 => (locals[0].var, locals[0].init.as_ref()?),
            StmtKind::Expr(Expr {
                kind:
                    ExprKind::Assign {
                        op: None,
                        target,
                        value,
                    },
                ..
            }) => (target.as_local()?, value.as_ref()),
            _ => return None,
        };
        let ty = self.decls.var(counter).ty.primitive()?;
        if !matches!(ty, PrimitiveTy::Int | PrimitiveTy::Long) {
            return None;
        }
        let (bound, including) = counted_bound(cond?, counter)?;
        if !is_unit_increment(update?, counter) || is_assigned(counter, NodeRef::Stmt(body)) {
            return None;
        }
        let bound_value = self.fold_constant(cx, bound).and_then(|c| c.as_long());
        if including {
            let type_max = ty.integral_bounds().map_or(i64::MAX, |(_, hi)| hi);
            if bound_value.map_or(true, |b| b >= type_max) {
                return None;
            }
        }
        Some(CountedLoop {
            counter,
            ty,
            origin,
            start: self.fold_constant(cx, origin).and_then(|c| c.as_long()),
            bound: bound_value,
            including,
        })
    }

    pub(crate) fn visit_foreach(
        &self,
        cx: &mut FlowContext<'a>,
        stmt: &'a Stmt,
        param: VarId,
        iterable: &'a Expr,
        body: &'a Stmt,
    ) -> Result<()> {
        self.enter_loop(cx, stmt, body);
        let param_ty = self.decls.var(param).ty.clone();
        let param_place = cx.place(StablePlace::Var(param));
        if let Some(elements) = self.fixed_elements(iterable) {
            if self.is_root_loop(stmt.id) {
                CfgBuilder::new(self, cx).assign_any_of(elements, &param_place, &param_ty)?;
                return self.visit_stmt(cx, body);
            }
            if elements.len() <= self.options.max_unroll {
                return self.unroll_elements(cx, body, elements, &param_place, &param_ty);
            }
            CfgBuilder::new(self, cx).loop_over(elements, &param_place, &param_ty)?;
            self.visit_stmt(cx, body)?;
            CfgBuilder::new(self, cx).end()?;
            return Ok(());
        }

        self.visit_expr(cx, iterable)?;
        self.add_null_check(cx, iterable.id, NullabilityProblem::IteratedValue)?;
        let size = if iterable.ty.is_array() {
            Some(SpecialField::ArrayLength)
        } else if iterable
            .ty
            .class_name()
            .is_some_and(|name| self.decls.is_subtype(name, JAVA_UTIL_COLLECTION))
        {
            Some(SpecialField::CollectionSize)
        } else {
            None
        };
        match size {
            Some(field) => {
                cx.add(InstructionKind::Unwrap { field }, None)?;
                CfgBuilder::new(self, cx)
                    .push(DfType::int(0))?
                    .compare(RelationType::Eq)?;
                self.exit_if(cx, stmt, true)?;
            }
            None => self.pop(cx)?,
        }

        let head = cx.flow.here();
        if size.is_none() {
            self.push_unknown(cx)?;
            self.exit_if(cx, stmt, true)?;
        }
        cx.add(
            InstructionKind::Flush {
                place: param_place,
            },
            None,
        )?;
        self.visit_stmt(cx, body)?;
        if size.is_some() {
            self.push_unknown(cx)?;
            self.exit_if(cx, stmt, true)?;
        }
        if !self.is_root_loop(stmt.id) {
            self.goto(cx, head)?;
        }
        Ok(())
    }

    /// Run `body` once per element, with nothing left on the stack while it runs.
    ///
    /// Elements are evaluated up front, as the array or list holding them would be;
    /// non-constant ones are kept in temps until their iteration.
    fn unroll_elements(
        &self,
        cx: &mut FlowContext<'a>,
        body: &'a Stmt,
        elements: &'a [Expr],
        param: &PlaceValue,
        param_ty: &Ty,
    ) -> Result<()> {
        let mut stored = Vec::with_capacity(elements.len());
        for element in elements {
            if self.fold_constant(cx, element).is_some() {
                stored.push(None);
                continue;
            }
            let mut builder = CfgBuilder::new(self, cx);
            let temp = builder.create_temp(param_ty.clone());
            builder.assign_expression(&temp, element, param_ty)?;
            stored.push(Some(temp));
        }
        for (element, temp) in elements.iter().zip(&stored) {
            let mut builder = CfgBuilder::new(self, cx);
            match temp {
                Some(temp) => builder.assign_place(param, temp)?,
                None => builder.assign_expression(param, element, param_ty)?,
            };
            self.visit_stmt(cx, body)?;
        }
        Ok(())
    }

    /// Elements of an iterable spelled out in the source.
    fn fixed_elements(&self, iterable: &'a Expr) -> Option<&'a [Expr]> {
        match &iterable.strip_parens().kind {
            ExprKind::ArrayInit { elements, .. } => Some(elements),
            ExprKind::NewArray {
                init: Some(init), ..
            } => match &init.strip_parens().kind {
                ExprKind::ArrayInit { elements, .. } => Some(elements),
                _ => None,
            },
            ExprKind::Call(call) => {
                let method = self.decls.method(call.method?);
                let known = FIXED_LIST_FACTORIES
                    .iter()
                    .any(|(class, name)| method.class_name == *class && method.name == *name);
                let spread_array = call.args.len() == 1 && call.args[0].ty.is_array();
                (known && !spread_array).then_some(call.args.as_slice())
            }
            _ => None,
        }
    }
}

/// Bound expression of `counter < bound` (or the mirrored form) and whether it is inclusive.
fn counted_bound(cond: &Expr, counter: VarId) -> Option<(&Expr, bool)> {
    let ExprKind::Binary { op, operands } = &cond.strip_parens().kind else {
        return None;
    };
    let [left, right] = operands.as_slice() else {
        return None;
    };
    match op {
        BinaryOp::Lt | BinaryOp::Le if left.as_local() == Some(counter) => {
            Some((right, *op == BinaryOp::Le))
        }
        BinaryOp::Gt | BinaryOp::Ge if right.as_local() == Some(counter) => {
            Some((left, *op == BinaryOp::Ge))
        }
        _ => None,
    }
}

fn is_unit_increment(update: &Stmt, counter: VarId) -> bool {
    let expr = match &update.kind {
        StmtKind::Expr(expr) => expr,
        StmtKind::ExprList(exprs) if exprs.len() == 1 => &exprs[0],
        _ => return false,
    };
    match &expr.strip_parens().kind {
        ExprKind::Unary { op, operand } => {
            matches!(op, UnaryOp::PostInc | UnaryOp::PreInc) && operand.as_local() == Some(counter)
        }
        ExprKind::Assign {
            op: Some(BinaryOp::Add),
            target,
            value,
        } => {
            target.as_local() == Some(counter)
                && value
                    .as_constant()
                    .and_then(Constant::as_long)
                    .is_some_and(|step| step == 1)
        }
        _ => false,
    }
}

