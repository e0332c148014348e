use super::ControlFlowAnalyzer;
use crate::context::FlowContext;
use crate::inst::{Anchor, InstructionKind, NullabilityProblem, PushValue};
use crate::offset::ControlFlowOffset;
use crate::place::PlaceValue;
use df_core::ast::visit::can_complete_normally;
use df_core::ast::{
    CaseBody, CaseLabel, Expr, NodeId, SwitchBlock, SwitchCase, Ty,
    INCOMPATIBLE_CLASS_CHANGE_ERROR,
};
use df_core::types::{Constant, DfType, RelationType};
use df_core::Result;

impl<'a> ControlFlowAnalyzer<'a> {
    /// Label tests followed by the case bodies. `owner` is the switch statement or
    /// expression; an expression switch delivers its value through the enclosing
    /// expression block.
    pub(crate) fn visit_switch(
        &self,
        cx: &mut FlowContext<'a>,
        switch: &'a SwitchBlock,
        owner: NodeId,
        is_expression: bool,
    ) -> Result<()> {
        let selector = &switch.selector;
        let has_null_label = switch.cases.iter().any(|case| {
            case.labels.iter().any(|label| {
                matches!(label, CaseLabel::Expr(e) if e.as_constant() == Some(&Constant::Null))
            })
        });
        if has_null_label {
            cx.nullability.insert(selector.id, NullabilityProblem::NoProblem);
        }
        let (value, temp) = self.bind_selector(cx, selector)?;

        cx.start(switch.body_id);
        let mut default_case = None;
        for case in &switch.cases {
            let guard_start = case.guard.as_ref().map(|_| cx.flow.defer());
            for label in &case.labels {
                let target = match guard_start {
                    Some(guard) => guard,
                    None => cx.flow.start_offset(case.id),
                };
                match label {
                    CaseLabel::Default => {
                        default_case = Some(case.id);
                        continue;
                    }
                    CaseLabel::Expr(label) => {
                        self.push_value(cx, PushValue::Place(value.clone()), None)?;
                        let compared = comparison_ty(&selector.ty, &label.ty);
                        self.box_unbox(cx, &selector.ty, &compared)?;
                        self.visit_expr(cx, label)?;
                        self.box_unbox(cx, &label.ty, &compared)?;
                        cx.add(
                            InstructionKind::BooleanBinary {
                                relation: RelationType::Eq,
                            },
                            Some(Anchor::SwitchLabel(label.id)),
                        )?;
                    }
                    CaseLabel::Pattern(pattern) => {
                        self.visit_pattern_test(cx, &value, &selector.ty, pattern)?;
                    }
                }
                cx.add(
                    InstructionKind::ConditionalGoto {
                        target,
                        compare: DfType::boolean(true),
                    },
                    None,
                )?;
            }
            if let (Some(guard_start), Some(guard)) = (guard_start, case.guard.as_ref()) {
                self.visit_guard(cx, case, guard_start, guard)?;
            }
        }

        match default_case {
            Some(default) => {
                let target = cx.flow.start_offset(default);
                cx.add(InstructionKind::Goto { target }, None)?;
            }
            None if is_expression => self.throw_exception(cx, INCOMPATIBLE_CLASS_CHANGE_ERROR)?,
            None => {
                let target = cx.flow.end_offset(switch.body_id);
                cx.add(InstructionKind::Goto { target }, None)?;
            }
        }

        for case in &switch.cases {
            cx.start(case.id);
            match &case.body {
                CaseBody::Group(stmts) => {
                    for stmt in stmts {
                        self.visit_stmt(cx, stmt)?;
                    }
                }
                CaseBody::Expr(expr) => {
                    let block = cx.blocks.iter().rev().find(|b| b.owner == owner).cloned();
                    match block {
                        Some(block) if is_expression => self.generate_return(cx, &block, expr)?,
                        _ => {
                            self.visit_expr(cx, expr)?;
                            self.pop(cx)?;
                            self.leave_switch(cx, switch.body_id)?;
                        }
                    }
                }
                CaseBody::Stmt(stmt) => {
                    self.visit_stmt(cx, stmt)?;
                    if can_complete_normally(stmt) {
                        self.leave_switch(cx, switch.body_id)?;
                    }
                }
            }
            cx.finish(case.id);
        }
        cx.finish(switch.body_id);
        if let Some(temp) = temp {
            cx.add(InstructionKind::Flush { place: temp }, None)?;
        }
        Ok(())
    }

    /// Jump past the remaining case bodies.
    fn leave_switch(&self, cx: &mut FlowContext<'a>, body: NodeId) -> Result<()> {
        let target = cx.flow.end_offset(body);
        cx.add(InstructionKind::Goto { target }, None)?;
        Ok(())
    }

    /// Labels of a guarded case land here; a passing guard enters the case body,
    /// a failing one falls through to the next case's tests.
    fn visit_guard(
        &self,
        cx: &mut FlowContext<'a>,
        case: &'a SwitchCase,
        guard_start: ControlFlowOffset,
        guard: &'a Expr,
    ) -> Result<()> {
        let next = cx.flow.defer();
        cx.add(InstructionKind::Goto { target: next }, None)?;
        cx.flow.bind_here(guard_start);
        self.visit_condition(cx, guard)?;
        let body = cx.flow.start_offset(case.id);
        cx.add(
            InstructionKind::ConditionalGoto {
                target: body,
                compare: DfType::boolean(true),
            },
            None,
        )?;
        cx.flow.bind_here(next);
        Ok(())
    }

    /// The selector as a place the label tests can read repeatedly. A selector
    /// that is not a stable place, or that calls may change, is copied into a temp.
    fn bind_selector(
        &self,
        cx: &mut FlowContext<'a>,
        selector: &'a Expr,
    ) -> Result<(PlaceValue, Option<PlaceValue>)> {
        let stable = self
            .resolve(cx, selector)
            .filter(|place| !self.resolver.is_flushable_by_calls(place));
        match stable {
            Some(place) => {
                let value = cx.place(place);
                if selector.ty.is_reference() {
                    self.push_value(cx, PushValue::Place(value.clone()), Some(selector))?;
                    self.add_null_check(cx, selector.id, NullabilityProblem::SwitchSelector)?;
                    self.pop(cx)?;
                }
                Ok((value, None))
            }
            None => {
                self.visit_expr(cx, selector)?;
                if selector.ty.is_reference() {
                    self.add_null_check(cx, selector.id, NullabilityProblem::SwitchSelector)?;
                }
                let temp = cx.create_temp(selector.ty.clone());
                cx.add(
                    InstructionKind::SimpleAssign {
                        target: temp.clone(),
                    },
                    None,
                )?;
                self.pop(cx)?;
                Ok((temp.clone(), Some(temp)))
            }
        }
    }

    pub(crate) fn visit_switch_expression(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        switch: &'a SwitchBlock,
    ) -> Result<()> {
        let result = cx.create_temp(expr.ty.clone());
        self.enter_expression_block(cx, expr.id, switch.body_id, &result, &expr.ty, false, false)?;
        self.visit_switch(cx, switch, expr.id, true)?;
        self.exit_expression_block(cx, expr.id)?;
        self.push_value(cx, PushValue::Place(result), Some(expr))
    }
}

/// Type both sides of a label comparison are converted to.
fn comparison_ty(selector: &Ty, label: &Ty) -> Ty {
    match (selector.unboxed(), label.unboxed()) {
        (Some(s), Some(l)) if s.is_numeric() && l.is_numeric() => {
            Ty::Primitive(s.binary_promotion(l))
        }
        (Some(s), Some(l)) if s == l => Ty::Primitive(s),
        _ => selector.clone(),
    }
}
