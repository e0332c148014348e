use super::{call_of, CallInliner};
use crate::builder::CfgBuilder;
use df_core::ast::{CallExpr, Declarations, Expr, ExprKind};
use df_core::types::Nullability;
use df_core::Result;

/// `((x) -> x + 1).apply(5)`: the lambda body runs in place of the call.
pub struct LambdaInliner;

impl CallInliner for LambdaInliner {
    fn name(&self) -> &'static str {
        "lambda"
    }

    fn may_inline(&self, call: &CallExpr, decls: &Declarations) -> bool {
        let Some(method) = call.method else {
            return false;
        };
        let invoked = call
            .qualifier
            .as_deref()
            .map(Expr::strip_parens)
            .is_some_and(|q| matches!(q.kind, ExprKind::Lambda(_)));
        invoked && decls.method(method).functional
    }

    fn try_inline<'a>(&self, builder: &mut CfgBuilder<'_, 'a>, expr: &'a Expr) -> Result<bool> {
        let Some(call) = call_of(expr) else {
            return Ok(false);
        };
        let Some(function) = call.qualifier.as_deref() else {
            return Ok(false);
        };
        let ExprKind::Lambda(lambda) = &function.strip_parens().kind else {
            return Ok(false);
        };
        if !builder.options().inline_closures || lambda.params.len() != call.args.len() {
            return Ok(false);
        }
        builder.evaluate_function(function)?;
        for arg in &call.args {
            builder.push_expression(arg)?;
        }
        builder.invoke_function(call.args.len(), function, Nullability::Unknown)?;
        Ok(true)
    }
}
