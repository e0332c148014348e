use super::{call_of, method_named, CallInliner};
use crate::builder::CfgBuilder;
use crate::inst::NullabilityProblem;
use df_core::ast::{CallExpr, Declarations, Expr, JAVA_LANG_STRING};
use df_core::types::Nullability;
use df_core::Result;

/// `s.transform(f)` is `f.apply(s)`.
pub struct TransformInliner;

impl CallInliner for TransformInliner {
    fn name(&self) -> &'static str {
        "transform"
    }

    fn may_inline(&self, call: &CallExpr, decls: &Declarations) -> bool {
        call.qualifier.is_some()
            && call.args.len() == 1
            && method_named(call, decls, JAVA_LANG_STRING, &["transform"]).is_some()
    }

    fn try_inline<'a>(&self, builder: &mut CfgBuilder<'_, 'a>, expr: &'a Expr) -> Result<bool> {
        let Some(call) = call_of(expr) else {
            return Ok(false);
        };
        let (Some(receiver), [function]) = (call.qualifier.as_deref(), call.args.as_slice()) else {
            return Ok(false);
        };
        builder
            .push_expression_checked(receiver, NullabilityProblem::CallReceiver)?
            .evaluate_function(function)?
            .invoke_function(1, function, Nullability::Unknown)?;
        Ok(true)
    }
}
