//! Lambdas, method references, anonymous and local classes, and the inlining
//! of lambdas passed straight to a call.

use super::ControlFlowAnalyzer;
use crate::context::{ExpressionBlockContext, FlowContext};
use crate::inst::{Anchor, InstructionKind, NullabilityProblem, PushValue};
use crate::place::{PlaceValue, StablePlace};
use crate::trap::{ControlTransfer, Trap, TrapKind};
use df_core::ast::visit::{captures, returns_of, NodeRef};
use df_core::ast::{
    ClassDecl, Expr, Lambda, LambdaBody, MemberKind, MethodRefExpr, MethodRefKind, NodeId, Ty,
};
use df_core::types::DfType;
use df_core::Result;

impl<'a> ControlFlowAnalyzer<'a> {
    pub(crate) fn visit_lambda(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        lambda: &'a Lambda,
    ) -> Result<()> {
        self.push_value(cx, PushValue::Value(DfType::not_null(expr.ty.clone())), Some(expr))?;
        self.escape_captures(cx, NodeRef::Expr(expr))?;
        let body = match &lambda.body {
            LambdaBody::Expr(body) => body.id,
            LambdaBody::Block(block) => block.id,
        };
        cx.add(InstructionKind::Closure { bodies: vec![body] }, None)?;
        Ok(())
    }

    pub(crate) fn visit_method_ref(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        method_ref: &'a MethodRefExpr,
    ) -> Result<()> {
        match (method_ref.kind, method_ref.qualifier.as_deref()) {
            (MethodRefKind::Bound, Some(qualifier)) => {
                self.visit_expr(cx, qualifier)?;
                self.add_null_check(cx, qualifier.id, NullabilityProblem::CallReceiver)?;
                cx.add(
                    InstructionKind::MethodReference {
                        method: method_ref.method,
                    },
                    Some(Anchor::Expr(expr.id)),
                )?;
                Ok(())
            }
            _ => self.push_value(cx, PushValue::Value(DfType::not_null(expr.ty.clone())), Some(expr)),
        }
    }

    /// Anonymous or local class: its initializers and method bodies are analyzed separately.
    pub(crate) fn visit_class_closure(&self, cx: &mut FlowContext<'a>, class: &'a ClassDecl) -> Result<()> {
        self.escape_captures(cx, NodeRef::Class(class))?;
        let mut bodies = vec![class.id];
        for member in &class.members {
            if let MemberKind::Method {
                body: Some(body), ..
            } = &member.kind
            {
                bodies.push(body.id);
            }
        }
        cx.add(InstructionKind::Closure { bodies }, None)?;
        Ok(())
    }

    fn escape_captures(&self, cx: &mut FlowContext<'a>, node: NodeRef<'a>) -> Result<()> {
        let captured = captures(node, self.decls);
        let mut places: Vec<StablePlace> = captured.locals.into_iter().map(StablePlace::Var).collect();
        if captured.uses_this {
            places.push(StablePlace::This);
        }
        if !places.is_empty() {
            cx.add(InstructionKind::Escape { places }, None)?;
        }
        Ok(())
    }

    /// Open an inlined computation whose `return`/`yield` statements store into
    /// `target` and jump to the end of `block`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn enter_expression_block(
        &self,
        cx: &mut FlowContext<'a>,
        owner: NodeId,
        block: NodeId,
        target: &PlaceValue,
        target_ty: &Ty,
        force_non_null: bool,
        accepts_return: bool,
    ) -> Result<()> {
        cx.traps.push(Trap::new(owner, TrapKind::InsideInlinedBlock));
        // keeps the stack non-empty while the block runs
        self.push_value(cx, PushValue::Transfer(ControlTransfer::exit(Vec::new())), None)?;
        cx.blocks.push(ExpressionBlockContext {
            owner,
            block,
            target: target.clone(),
            target_ty: target_ty.clone(),
            force_non_null,
            accepts_return,
        });
        Ok(())
    }

    pub(crate) fn exit_expression_block(&self, cx: &mut FlowContext<'a>, owner: NodeId) -> Result<()> {
        let block = cx.blocks.pop();
        assert_expr!(
            block.as_ref().is_some_and(|b| b.owner == owner),
            "expression block mismatch: expected {owner}, found {:?}",
            block.map(|b| b.owner)
        );
        cx.traps.pop(owner);
        self.pop(cx)
    }

    /// Inline a lambda invoked with `arg_count` arguments already on the stack.
    /// Returns `false`, emitting nothing, when the lambda cannot be inlined.
    pub(crate) fn inline_lambda(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        lambda: &'a Lambda,
        arg_count: usize,
        force_non_null: bool,
    ) -> Result<bool> {
        if !self.options.inline_closures || lambda.params.len() != arg_count {
            return Ok(false);
        }
        if let LambdaBody::Block(block) = &lambda.body {
            let valueless = returns_of(block).iter().any(Option::is_none);
            if valueless && !lambda.return_ty.is_void() {
                return Ok(false);
            }
        }
        trace!(node = %expr.id, arg_count, "inlining lambda");
        for param in lambda.params.iter().rev() {
            let target = cx.place(StablePlace::Var(*param));
            cx.add(InstructionKind::SimpleAssign { target }, None)?;
            self.pop(cx)?;
        }
        match &lambda.body {
            LambdaBody::Expr(body) => {
                self.visit_expr(cx, body)?;
                self.box_unbox(cx, &body.ty, &lambda.return_ty)?;
                if force_non_null {
                    self.add_null_check(cx, body.id, NullabilityProblem::NullableFunctionReturn)?;
                }
            }
            LambdaBody::Block(block) => {
                let result = cx.create_temp(lambda.return_ty.clone());
                self.enter_expression_block(
                    cx,
                    expr.id,
                    block.id,
                    &result,
                    &lambda.return_ty,
                    force_non_null,
                    true,
                )?;
                self.visit_block(cx, block, &[])?;
                self.exit_expression_block(cx, expr.id)?;
                self.push_value(cx, PushValue::Place(result), None)?;
            }
        }
        for param in &lambda.params {
            let place = cx.place(StablePlace::Var(*param));
            cx.add(InstructionKind::Flush { place }, None)?;
        }
        Ok(true)
    }
}
