use super::{call_of, CallInliner};
use crate::builder::CfgBuilder;
use df_core::ast::{CallExpr, Declarations, Expr, MethodDecl, Ty};
use df_core::Result;

/// `Integer.valueOf(int)` and the other wrapper factories box their argument.
pub struct BoxingInliner;

impl BoxingInliner {
    fn boxing_factory<'d>(call: &CallExpr, decls: &'d Declarations) -> Option<&'d MethodDecl> {
        let decl = decls.method(call.method?);
        let wrapped = Ty::class(decl.class_name.clone()).wrapped_primitive()?;
        let boxes = decl.is_static
            && decl.name == "valueOf"
            && call.args.len() == 1
            && decl.params == [Ty::Primitive(wrapped)];
        boxes.then_some(decl)
    }
}

impl CallInliner for BoxingInliner {
    fn name(&self) -> &'static str {
        "boxing"
    }

    fn may_inline(&self, call: &CallExpr, decls: &Declarations) -> bool {
        Self::boxing_factory(call, decls).is_some()
    }

    fn try_inline<'a>(&self, builder: &mut CfgBuilder<'_, 'a>, expr: &'a Expr) -> Result<bool> {
        let Some(call) = call_of(expr) else {
            return Ok(false);
        };
        let Some(decl) = Self::boxing_factory(call, builder.decls()) else {
            return Ok(false);
        };
        let primitive = decl.params[0].clone();
        if let Some(qualifier) = call.qualifier.as_deref() {
            builder.push_expression(qualifier)?.pop()?;
        }
        let arg = &call.args[0];
        builder
            .push_expression(arg)?
            .box_unbox(arg, &primitive)?
            .convert(&primitive, &primitive.boxed())?;
        Ok(true)
    }
}
