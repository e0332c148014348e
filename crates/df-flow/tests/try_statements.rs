use df_core::ast::{AstBuilder, Ty};
use df_core::Result;
use df_flow::inst::InstructionKind;
use df_flow::{ControlTransfer, Flow, FragmentRoot, StablePlace, TransferTarget, TrapKind};
use pretty_assertions::assert_eq;

mod support;

use support::assertions::{assert_offsets_resolved, assigned_places, calls_to, positions, transfers};

const IO_EXCEPTION: &str = "java.io.IOException";

fn raised(flow: &Flow) -> Vec<(usize, &ControlTransfer)> {
    flow.instructions()
        .iter()
        .filter_map(|i| match &i.kind {
            InstructionKind::MayThrow { transfer } => Some((i.index, transfer)),
            _ => None,
        })
        .collect()
}

#[test]
fn declared_exception_is_routed_to_its_catch_section() -> Result<()> {
    let ast = AstBuilder::new();
    let risky = ast.static_method("demo.Demo", "risky", vec![], Ty::Void);
    ast.update_method(risky, |m| m.throws = vec![IO_EXCEPTION.to_string()]);
    let handle = ast.static_method("demo.Demo", "handle", vec![], Ty::Void);
    let error = ast.var_of_kind("e", Ty::class(IO_EXCEPTION), df_core::ast::VarKind::CatchParameter);
    let stmt = ast.try_(
        ast.block(vec![ast.expr_stmt(ast.call(None, risky, vec![]))]),
        vec![ast.catch_(
            error,
            vec![IO_EXCEPTION],
            ast.block(vec![ast.expr_stmt(ast.call(None, handle, vec![]))]),
        )],
        None,
    );
    let body = ast.block(vec![stmt]);
    let decls = ast.finish();

    let flow = support::build(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
    )?;

    assert_offsets_resolved(&flow);
    let handler = calls_to(&flow, handle)[0];
    let raised = raised(&flow);
    // unchecked exceptions cannot reach an IOException handler
    assert_eq!(raised.len(), 1);
    let (_, transfer) = raised[0];
    assert_eq!(
        transfer.target,
        TransferTarget::Exception {
            ty: IO_EXCEPTION.to_string()
        }
    );
    match transfer.traps.as_slice() {
        [trap] => match &trap.kind {
            TrapKind::TryCatch { clauses } => {
                assert_eq!(clauses.len(), 1);
                assert_eq!(clauses[0].param, error);
                assert_eq!(clauses[0].target.index(), Some(handler));
            }
            other => panic!("unexpected trap {other:?}"),
        },
        traps => panic!("expected the catch trap only, got {traps:?}"),
    }

    // both the body and the handler jump to the end without crossing any trap
    let exits = transfers(&flow);
    assert_eq!(exits.len(), 2);
    assert_eq!(exits[0], exits[1]);
    assert!(exits[0].traps.is_empty());
    Ok(())
}

#[test]
fn resources_are_closed_in_a_cleanup_section() -> Result<()> {
    let ast = AstBuilder::new();
    let res_ty = Ty::class("demo.Res");
    let open = ast.static_method("demo.Demo", "open", vec![], res_ty.clone());
    let consume = ast.static_method("demo.Demo", "consume", vec![res_ty.clone()], Ty::Void);
    let handle = ast.static_method("demo.Demo", "handle", vec![], Ty::Void);
    let res = ast.var_of_kind("r", res_ty, df_core::ast::VarKind::Resource);
    let error = ast.var_of_kind("e", Ty::class(IO_EXCEPTION), df_core::ast::VarKind::CatchParameter);
    let stmt = ast.try_with_resources(
        vec![ast.resource_decl(res, ast.call(None, open, vec![]), vec![IO_EXCEPTION])],
        ast.block(vec![ast.expr_stmt(ast.call(None, consume, vec![ast.var(res)]))]),
        vec![ast.catch_(
            error,
            vec![IO_EXCEPTION],
            ast.block(vec![ast.expr_stmt(ast.call(None, handle, vec![]))]),
        )],
        None,
    );
    let body = ast.block(vec![stmt]);
    let decls = ast.finish();

    let flow = support::build(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
    )?;

    assert_offsets_resolved(&flow);
    let resource = StablePlace::Var(res);
    assert!(assigned_places(&flow).contains(&&resource));

    let cleanup = positions(&flow, "flush_fields");
    assert_eq!(cleanup.len(), 1);
    let cleanup = cleanup[0];
    assert!(calls_to(&flow, consume)[0] < cleanup);
    assert!(cleanup < calls_to(&flow, handle)[0]);

    // closing may raise the declared exception, which the catch section observes
    let close_raises = raised(&flow).into_iter().any(|(index, transfer)| {
        index > cleanup
            && transfer.target
                == TransferTarget::Exception {
                    ty: IO_EXCEPTION.to_string(),
                }
            && matches!(
                transfer.traps.as_slice(),
                [inside, catch]
                    if inside.kind == TrapKind::InsideFinally
                        && matches!(catch.kind, TrapKind::TryCatch { .. })
            )
    });
    assert!(close_raises, "{}", df_flow::dump::dump_flow(&flow));

    let exits = transfers(&flow);
    assert_eq!(exits.len(), 4);
    match exits[0].traps.as_slice() {
        [trap] => match &trap.kind {
            TrapKind::TwrFinally { cleanup_start } => {
                assert_eq!(cleanup_start.index(), Some(cleanup))
            }
            other => panic!("unexpected trap {other:?}"),
        },
        traps => panic!("expected the resource trap only, got {traps:?}"),
    }
    assert_eq!(exits[1].target, TransferTarget::ExitFinally);
    assert!(exits[2].traps.is_empty());
    assert!(exits[3].traps.is_empty());
    Ok(())
}

#[test]
fn catch_parameter_is_flushed_when_the_handler_ends() -> Result<()> {
    let ast = AstBuilder::new();
    let risky = ast.static_method("demo.Demo", "risky", vec![], Ty::Void);
    let error = ast.var_of_kind(
        "e",
        Ty::class("java.lang.RuntimeException"),
        df_core::ast::VarKind::CatchParameter,
    );
    let stmt = ast.try_(
        ast.block(vec![ast.expr_stmt(ast.call(None, risky, vec![]))]),
        vec![ast.catch_(error, vec!["java.lang.RuntimeException"], ast.block(vec![]))],
        None,
    );
    let body = ast.block(vec![stmt]);
    let decls = ast.finish();

    let flow = support::build(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
    )?;

    let param = StablePlace::Var(error);
    let flushed = flow.instructions().iter().any(|i| {
        matches!(&i.kind, InstructionKind::Flush { place } if place.place == param)
    });
    assert!(flushed);
    Ok(())
}

const RUNTIME_EXCEPTION: &str = "java.lang.RuntimeException";

/// `try { <stmt> } catch (RuntimeException e) {}` as a method body.
fn caught(ast: &AstBuilder, stmt: df_core::ast::Stmt) -> df_core::ast::Block {
    let error = ast.var_of_kind(
        "e",
        Ty::class(RUNTIME_EXCEPTION),
        df_core::ast::VarKind::CatchParameter,
    );
    let stmt = ast.try_(
        ast.block(vec![stmt]),
        vec![ast.catch_(error, vec![RUNTIME_EXCEPTION], ast.block(vec![]))],
        None,
    );
    ast.block(vec![stmt])
}

#[test]
fn array_element_increment_reads_and_stores_with_a_bounds_check() -> Result<()> {
    let ast = AstBuilder::new();
    let arr = ast.local("arr", Ty::array_of(Ty::INT));
    let i = ast.local("i", Ty::INT);
    let stmt = ast.expr_stmt(ast.post_inc(ast.array_access(ast.var(arr), ast.var(i))));
    let body = caught(&ast, stmt);
    let decls = ast.finish();

    let flow = support::build(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
    )?;

    assert_offsets_resolved(&flow);
    let loads = positions(&flow, "array_load");
    let stores = positions(&flow, "array_store");
    assert_eq!(loads.len(), 1);
    assert_eq!(stores.len(), 1);
    assert!(loads[0] < stores[0]);
    match &flow.instruction(loads[0]).kind {
        InstructionKind::ArrayAccess {
            transfer: Some(transfer),
            ..
        } => assert_eq!(
            transfer.target,
            TransferTarget::Exception {
                ty: "java.lang.ArrayIndexOutOfBoundsException".to_string()
            }
        ),
        other => panic!("element read should carry a bounds transfer, got {other:?}"),
    }
    Ok(())
}

#[test]
fn unknown_function_value_may_throw() -> Result<()> {
    let ast = AstBuilder::new();
    let s = ast.local("s", Ty::string());
    let function_ty = Ty::class("java.util.function.Function");
    let f = ast.local("f", function_ty.clone());
    let transform = ast.method(
        df_core::ast::JAVA_LANG_STRING,
        "transform",
        vec![function_ty],
        Ty::object(),
    );
    let stmt = ast.expr_stmt(ast.call(Some(ast.var(s)), transform, vec![ast.var(f)]));
    let body = caught(&ast, stmt);
    let decls = ast.finish();

    let flow = support::build(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
    )?;

    let unknown = positions(&flow, "eval_unknown");
    assert_eq!(unknown.len(), 1);
    let after: Vec<_> = raised(&flow)
        .into_iter()
        .filter(|(index, _)| *index > unknown[0])
        .map(|(_, transfer)| transfer.target.clone())
        .collect();
    assert_eq!(
        after,
        vec![TransferTarget::Exception {
            ty: RUNTIME_EXCEPTION.to_string()
        }]
    );
    Ok(())
}
