//! Call inliners: strategies that replace an opaque call with an equivalent,
//! more precise instruction sequence.
//!
//! The analyzer offers every call to the inliners in order and the first one
//! that accepts emits the call. An inliner must leave exactly one value (the
//! call result) on the stack and close every region it opens; declining must
//! emit nothing.

mod assume;
mod boxing;
mod lambda;
mod transform;

pub use assume::AssumeInliner;
pub use boxing::BoxingInliner;
pub use lambda::LambdaInliner;
pub use transform::TransformInliner;

use crate::builder::CfgBuilder;
use df_core::ast::{CallExpr, Declarations, Expr, ExprKind, MethodDecl};
use df_core::Result;
use std::sync::OnceLock;

pub trait CallInliner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap syntactic test; only calls accepted here reach `try_inline`.
    fn may_inline(&self, call: &CallExpr, decls: &Declarations) -> bool;

    fn try_inline<'a>(&self, builder: &mut CfgBuilder<'_, 'a>, call: &'a Expr) -> Result<bool>;
}

/// The shipped inliners in the order they are tried.
pub fn default_inliners() -> &'static [Box<dyn CallInliner>] {
    static INLINERS: OnceLock<Vec<Box<dyn CallInliner>>> = OnceLock::new();
    INLINERS.get_or_init(|| {
        vec![
            Box::new(LambdaInliner),
            Box::new(AssumeInliner),
            Box::new(BoxingInliner),
            Box::new(TransformInliner),
        ]
    })
}

fn call_of(expr: &Expr) -> Option<&CallExpr> {
    match &expr.kind {
        ExprKind::Call(call) => Some(call),
        _ => None,
    }
}

/// The resolved target of `call`, when it is one of `names` declared in `class`.
fn method_named<'d>(
    call: &CallExpr,
    decls: &'d Declarations,
    class: &str,
    names: &[&str],
) -> Option<&'d MethodDecl> {
    let decl = decls.method(call.method?);
    (decl.class_name == class && names.contains(&decl.name.as_str())).then_some(decl)
}
