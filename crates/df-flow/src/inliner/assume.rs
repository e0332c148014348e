use super::{call_of, method_named, CallInliner};
use crate::builder::CfgBuilder;
use crate::inst::NullabilityProblem;
use df_core::ast::{CallExpr, Declarations, Expr, Ty};
use df_core::Result;

const OBJECTS: &str = "java.util.Objects";
const PRECONDITIONS: &str = "com.google.common.base.Preconditions";
const ILLEGAL_ARGUMENT_EXCEPTION: &str = "java.lang.IllegalArgumentException";
const ILLEGAL_STATE_EXCEPTION: &str = "java.lang.IllegalStateException";

/// `Objects.requireNonNull(x)`, `Preconditions.checkNotNull(x)`,
/// `Preconditions.checkArgument(c)` and `Preconditions.checkState(c)`:
/// the checked fact holds after the call.
pub struct AssumeInliner;

enum Assumption {
    NotNull,
    Condition { exception: &'static str },
}

impl AssumeInliner {
    fn assumption(call: &CallExpr, decls: &Declarations) -> Option<Assumption> {
        if call.args.is_empty() {
            return None;
        }
        if method_named(call, decls, OBJECTS, &["requireNonNull"]).is_some()
            || method_named(call, decls, PRECONDITIONS, &["checkNotNull"]).is_some()
        {
            return Some(Assumption::NotNull);
        }
        let decl = method_named(call, decls, PRECONDITIONS, &["checkArgument", "checkState"])?;
        let exception = if decl.name == "checkArgument" {
            ILLEGAL_ARGUMENT_EXCEPTION
        } else {
            ILLEGAL_STATE_EXCEPTION
        };
        Some(Assumption::Condition { exception })
    }
}

impl CallInliner for AssumeInliner {
    fn name(&self) -> &'static str {
        "assume"
    }

    fn may_inline(&self, call: &CallExpr, decls: &Declarations) -> bool {
        Self::assumption(call, decls).is_some()
    }

    fn try_inline<'a>(&self, builder: &mut CfgBuilder<'_, 'a>, expr: &'a Expr) -> Result<bool> {
        let Some(call) = call_of(expr) else {
            return Ok(false);
        };
        let Some(assumption) = Self::assumption(call, builder.decls()) else {
            return Ok(false);
        };
        let (checked, rest) = match call.args.split_first() {
            Some(split) => split,
            None => return Ok(false),
        };
        builder.push_expression(checked)?;
        if matches!(assumption, Assumption::Condition { .. }) {
            builder.box_unbox(checked, &Ty::BOOLEAN)?;
        }
        // messages and message suppliers are only observed on failure
        for arg in rest {
            builder.push_expression(arg)?.pop()?;
        }
        match assumption {
            Assumption::NotNull => {
                builder.check_not_null(NullabilityProblem::NonNullParameter)?;
            }
            Assumption::Condition { exception } => {
                builder.if_condition_is(false)?.throw(exception)?.end()?;
                builder.push_unknown()?;
            }
        }
        Ok(true)
    }
}
