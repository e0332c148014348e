use df_core::ast::{AstBuilder, BinaryOp, CallExpr, Declarations, Expr, Ty, JAVA_LANG_STRING};
use df_core::config::FlowOptions;
use df_core::types::Constant;
use df_core::Result;
use df_flow::inst::{InstructionKind, NullabilityProblem};
use df_flow::{
    build_flow_with, CallInliner, CfgBuilder, FragmentRoot, StablePlace, TransferTarget,
    ValueFactory,
};
use pretty_assertions::assert_eq;

mod support;

use support::assertions::{assigned_places, count, jump_target, kinds, positions};

#[test]
fn require_non_null_becomes_a_null_check() -> Result<()> {
    let ast = AstBuilder::new();
    let x = ast.local("x", Ty::string());
    let require = ast.static_method(
        "java.util.Objects",
        "requireNonNull",
        vec![Ty::object()],
        Ty::object(),
    );
    let expr = ast.call(None, require, vec![ast.var(x)]);
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Expression(&expr), &decls)?;

    assert_eq!(
        kinds(&flow),
        vec!["finish", "push", "check_not_null", "result_of", "return"]
    );
    assert!(matches!(
        flow.instruction(2).kind,
        InstructionKind::CheckNotNull {
            problem: NullabilityProblem::NonNullParameter,
            ..
        }
    ));
    Ok(())
}

#[test]
fn disabled_inlining_keeps_the_call() -> Result<()> {
    let ast = AstBuilder::new();
    let x = ast.local("x", Ty::string());
    let require = ast.static_method(
        "java.util.Objects",
        "requireNonNull",
        vec![Ty::object()],
        Ty::object(),
    );
    let expr = ast.call(None, require, vec![ast.var(x)]);
    let decls = ast.finish();
    let options = FlowOptions {
        inline_calls: false,
        ..FlowOptions::default()
    };

    let flow = support::build_with(FragmentRoot::Expression(&expr), &decls, &options)?;

    assert_eq!(count(&flow, "call"), 1);
    assert_eq!(count(&flow, "check_not_null"), 0);
    Ok(())
}

#[test]
fn failed_precondition_throws_illegal_argument() -> Result<()> {
    let ast = AstBuilder::new();
    let flag = ast.local("flag", Ty::BOOLEAN);
    let check = ast.static_method(
        "com.google.common.base.Preconditions",
        "checkArgument",
        vec![Ty::BOOLEAN],
        Ty::Void,
    );
    let expr = ast.call(None, check, vec![ast.var(flag)]);
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Expression(&expr), &decls)?;

    assert_eq!(count(&flow, "call"), 0);
    let thrown: Vec<_> = flow
        .instructions()
        .iter()
        .filter_map(|i| match &i.kind {
            InstructionKind::Throw { transfer } => Some(transfer.target.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        thrown,
        vec![TransferTarget::Exception {
            ty: "java.lang.IllegalArgumentException".to_string()
        }]
    );
    Ok(())
}

#[test]
fn value_of_boxes_its_argument() -> Result<()> {
    let ast = AstBuilder::new();
    let i = ast.local("i", Ty::INT);
    let value_of = ast.static_method(
        "java.lang.Integer",
        "valueOf",
        vec![Ty::INT],
        Ty::class("java.lang.Integer"),
    );
    let expr = ast.call(None, value_of, vec![ast.var(i)]);
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Expression(&expr), &decls)?;

    assert_eq!(count(&flow, "call"), 0);
    assert_eq!(count(&flow, "wrap"), 1);
    assert_eq!(count(&flow, "result_of"), 1);
    Ok(())
}

#[test]
fn immediately_invoked_lambda_runs_in_place() -> Result<()> {
    let ast = AstBuilder::new();
    let fn_ty = Ty::class("java.util.function.IntUnaryOperator");
    let apply = ast.method(
        "java.util.function.IntUnaryOperator",
        "applyAsInt",
        vec![Ty::INT],
        Ty::INT,
    );
    ast.update_method(apply, |m| m.functional = true);
    let x = ast.param("x", Ty::INT);
    let lambda = ast.lambda(
        vec![x],
        ast.binary(BinaryOp::Add, ast.var(x), ast.int(1)),
        fn_ty,
    );
    let expr = ast.call(Some(ast.paren(lambda)), apply, vec![ast.int(5)]);
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Expression(&expr), &decls)?;

    assert_eq!(count(&flow, "call"), 0);
    assert_eq!(count(&flow, "closure"), 0);
    assert_eq!(assigned_places(&flow), vec![&StablePlace::Var(x)]);
    let flushed = flow.instructions().iter().any(|i| {
        matches!(&i.kind, InstructionKind::Flush { place } if place.place == StablePlace::Var(x))
    });
    assert!(flushed);
    Ok(())
}

#[test]
fn lambda_with_wrong_arity_is_left_as_a_call() -> Result<()> {
    let ast = AstBuilder::new();
    let fn_ty = Ty::class("java.util.function.IntSupplier");
    let get = ast.method("java.util.function.IntSupplier", "getAsInt", vec![], Ty::INT);
    ast.update_method(get, |m| m.functional = true);
    let x = ast.param("x", Ty::INT);
    let lambda = ast.lambda(vec![x], ast.var(x), fn_ty);
    let expr = ast.call(Some(lambda), get, vec![]);
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Expression(&expr), &decls)?;

    assert_eq!(count(&flow, "call"), 1);
    assert_eq!(count(&flow, "closure"), 1);
    Ok(())
}

#[test]
fn string_transform_applies_the_function_to_the_receiver() -> Result<()> {
    let ast = AstBuilder::new();
    let s = ast.local("s", Ty::string());
    let t = ast.param("t", Ty::string());
    let transform = ast.method(
        JAVA_LANG_STRING,
        "transform",
        vec![Ty::class("java.util.function.Function")],
        Ty::object(),
    );
    let function = ast.lambda(
        vec![t],
        ast.int(42),
        Ty::class("java.util.function.Function"),
    );
    let expr = ast.call(Some(ast.var(s)), transform, vec![function]);
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Expression(&expr), &decls)?;

    assert_eq!(count(&flow, "call"), 0);
    assert_eq!(count(&flow, "check_not_null"), 1);
    assert_eq!(assigned_places(&flow), vec![&StablePlace::Var(t)]);
    Ok(())
}

/// Replaces every call to a method named `answer` with the constant 42.
struct AnswerInliner;

impl CallInliner for AnswerInliner {
    fn name(&self) -> &'static str {
        "answer"
    }

    fn may_inline(&self, call: &CallExpr, decls: &Declarations) -> bool {
        call.method.is_some_and(|m| decls.method(m).name == "answer")
    }

    fn try_inline<'a>(&self, builder: &mut CfgBuilder<'_, 'a>, _call: &'a Expr) -> Result<bool> {
        builder.push_constant(Constant::Int(42))?;
        Ok(true)
    }
}

/// Accepts everything in `may_inline`, then declines.
struct ShyInliner;

impl CallInliner for ShyInliner {
    fn name(&self) -> &'static str {
        "shy"
    }

    fn may_inline(&self, _call: &CallExpr, _decls: &Declarations) -> bool {
        true
    }

    fn try_inline<'a>(&self, _builder: &mut CfgBuilder<'_, 'a>, _call: &'a Expr) -> Result<bool> {
        Ok(false)
    }
}

#[test]
fn custom_inliners_are_tried_in_order() -> Result<()> {
    let ast = AstBuilder::new();
    let answer = ast.static_method("demo.Demo", "answer", vec![], Ty::INT);
    let other = ast.static_method("demo.Demo", "other", vec![], Ty::INT);
    let inlined = ast.call(None, answer, vec![]);
    let kept = ast.call(None, other, vec![]);
    let decls = ast.finish();
    let values = ValueFactory::new();
    let options = FlowOptions::default();
    let inliners: Vec<Box<dyn CallInliner>> = vec![Box::new(ShyInliner), Box::new(AnswerInliner)];

    let flow = build_flow_with(
        FragmentRoot::Expression(&inlined),
        &decls,
        &values,
        &options,
        &inliners,
        None,
    )?
    .expect("answer() should translate");
    assert_eq!(kinds(&flow), vec!["finish", "push", "result_of", "return"]);

    let flow = build_flow_with(
        FragmentRoot::Expression(&kept),
        &decls,
        &values,
        &options,
        &inliners,
        None,
    )?
    .expect("other() should translate");
    assert_eq!(kinds(&flow), vec!["finish", "call", "return"]);
    Ok(())
}

/// Treats `each(a, b, ...)` as a loop reading every argument once.
struct EachInliner;

impl CallInliner for EachInliner {
    fn name(&self) -> &'static str {
        "each"
    }

    fn may_inline(&self, call: &CallExpr, decls: &Declarations) -> bool {
        call.method.is_some_and(|m| decls.method(m).name == "each")
    }

    fn try_inline<'a>(&self, builder: &mut CfgBuilder<'_, 'a>, expr: &'a Expr) -> Result<bool> {
        let df_core::ast::ExprKind::Call(call) = &expr.kind else {
            return Ok(false);
        };
        let item = builder.create_temp(Ty::INT);
        builder
            .loop_over(&call.args, &item, &Ty::INT)?
            .push_place(&item)?
            .pop()?
            .end()?
            .push_unknown()?;
        Ok(true)
    }
}

#[test]
fn builder_loop_over_short_list_cascades_through_the_elements() -> Result<()> {
    let ast = AstBuilder::new();
    let a = ast.local("a", Ty::INT);
    let b = ast.local("b", Ty::INT);
    let each = ast.static_method("demo.Demo", "each", vec![Ty::INT, Ty::INT], Ty::INT);
    let expr = ast.call(None, each, vec![ast.var(a), ast.var(b)]);
    let decls = ast.finish();
    let values = ValueFactory::new();
    let options = FlowOptions::default();
    let inliners: Vec<Box<dyn CallInliner>> = vec![Box::new(EachInliner)];

    let flow = build_flow_with(
        FragmentRoot::Expression(&expr),
        &decls,
        &values,
        &options,
        &inliners,
        None,
    )?
    .expect("each() should translate");

    assert_eq!(count(&flow, "call"), 0);
    assert_eq!(count(&flow, "splice"), 1);
    assert_eq!(count(&flow, "cond_goto"), 1);
    let back = positions(&flow, "goto");
    assert_eq!(back.len(), 1);
    assert!(jump_target(&flow, back[0]) < back[0]);
    assert!(flow.temps().iter().any(|temp| temp.ty == Ty::INT));
    Ok(())
}
