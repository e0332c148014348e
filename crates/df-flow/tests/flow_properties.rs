use df_core::ast::{AstBuilder, BinaryOp, CaseLabel, Expr, Ty};
use df_core::config::FlowOptions;
use df_core::Result;
use df_flow::inst::{InstructionKind, PushValue};
use df_flow::{
    build_flow, Anchor, ExpressionResolver, FragmentRoot, PlaceValue, RecordingListener,
    StablePlace, TransferTarget, TrapKind, ValueFactory,
};
use pretty_assertions::assert_eq;

mod support;

use support::assertions::{assert_offsets_resolved, count, transfers};

#[test]
fn straight_line_expression_leaves_one_value() -> Result<()> {
    let ast = AstBuilder::new();
    let x = ast.local("x", Ty::INT);
    let y = ast.local("y", Ty::INT);
    let expr = ast.binary(
        BinaryOp::Add,
        ast.var(x),
        ast.binary(BinaryOp::Mul, ast.var(y), ast.int(2)),
    );
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Expression(&expr), &decls)?;

    let depth: isize = flow
        .instructions()
        .iter()
        .map(|i| i.stack_effect().delta())
        .sum();
    assert_eq!(depth, 1);
    assert_eq!(count(&flow, "numeric"), 2);
    Ok(())
}

#[test]
fn listener_sees_every_anchored_push_in_order() -> Result<()> {
    let ast = AstBuilder::new();
    let x = ast.local("x", Ty::INT);
    let y = ast.local("y", Ty::INT);
    let z = ast.local("z", Ty::INT);
    let (vx, vy, vz) = (ast.var(x), ast.var(y), ast.var(z));
    let (ix, iy, iz) = (vx.id, vy.id, vz.id);
    let expr = ast.polyadic(BinaryOp::Add, vec![vx, vy, vz]);
    let decls = ast.finish();
    let mut listener = RecordingListener::default();

    let flow = support::build_listened(FragmentRoot::Expression(&expr), &decls, &mut listener)?;

    assert!(flow.is_some());
    assert_eq!(
        listener.pushes,
        vec![
            (Anchor::Expr(ix), "push"),
            (Anchor::Expr(iy), "push"),
            (
                Anchor::PolyadicPart {
                    node: expr.id,
                    last_operand: 1
                },
                "numeric"
            ),
            (Anchor::Expr(iz), "push"),
            (Anchor::Expr(expr.id), "numeric"),
        ]
    );
    assert!(listener.returns.is_empty());
    Ok(())
}

#[test]
fn returned_value_is_reported_for_the_root() -> Result<()> {
    let ast = AstBuilder::new();
    let x = ast.param("x", Ty::INT);
    let body = ast.block(vec![ast.return_(Some(ast.var(x)))]);
    let decls = ast.finish();
    let mut listener = RecordingListener::default();

    let flow = support::build_listened(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::INT,
        },
        &decls,
        &mut listener,
    )?;

    assert!(flow.is_some());
    assert_eq!(listener.returns, vec![body.id]);
    Ok(())
}

#[test]
fn malformed_statement_gives_no_flow() -> Result<()> {
    let ast = AstBuilder::new();
    let work = ast.static_method("demo.Demo", "work", vec![], Ty::Void);
    let body = ast.block(vec![
        ast.expr_stmt(ast.call(None, work, vec![])),
        ast.error_stmt(),
    ]);
    let decls = ast.finish();
    let mut listener = RecordingListener::default();

    let flow = support::build_listened(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
        &mut listener,
    )?;

    assert!(flow.is_none());
    Ok(())
}

#[test]
fn loop_root_has_no_back_edge() -> Result<()> {
    let ast = AstBuilder::new();
    let flag = ast.local("flag", Ty::BOOLEAN);
    let work = ast.static_method("demo.Demo", "work", vec![], Ty::Void);
    let stmt = ast.while_(
        Some(ast.var(flag)),
        ast.block_stmt(vec![ast.expr_stmt(ast.call(None, work, vec![]))]),
    );
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Loop(&stmt), &decls)?;

    assert_offsets_resolved(&flow);
    assert_eq!(count(&flow, "goto"), 0);
    assert_eq!(count(&flow, "cond_goto"), 1);
    Ok(())
}

#[test]
fn labeled_break_leaves_the_outer_loop() -> Result<()> {
    let ast = AstBuilder::new();
    let flag = ast.local("flag", Ty::BOOLEAN);
    let outer = ast.reserve();
    let inner = ast.while_(
        Some(ast.var(flag)),
        ast.block_stmt(vec![ast.break_(Some(outer))]),
    );
    let labeled = ast.with_id(
        outer,
        ast.labeled("outer", ast.while_(Some(ast.var(flag)), ast.block_stmt(vec![inner]))),
    );
    let body = ast.block(vec![labeled]);
    let decls = ast.finish();

    let flow = support::build(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
    )?;

    assert_offsets_resolved(&flow);
    let transfers = transfers(&flow);
    assert_eq!(transfers.len(), 1);
    match &transfers[0].target {
        TransferTarget::Instruction { offset, .. } => {
            assert_eq!(offset.index(), flow.end_offset(outer));
        }
        other => panic!("break should jump inside the flow, got {other:?}"),
    }
    assert!(transfers[0].traps.is_empty());
    Ok(())
}

#[test]
fn return_inside_try_finally_crosses_the_finally_trap() -> Result<()> {
    let ast = AstBuilder::new();
    let cleanup = ast.static_method("demo.Demo", "cleanup", vec![], Ty::Void);
    let stmt = ast.try_(
        ast.block(vec![ast.return_(None)]),
        vec![],
        Some(ast.block(vec![ast.expr_stmt(ast.call(None, cleanup, vec![]))])),
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

    let (transfer, depth) = flow
        .instructions()
        .iter()
        .find_map(|i| match &i.kind {
            InstructionKind::ControlTransfer {
                transfer,
                trap_depth,
            } => Some((transfer, *trap_depth)),
            _ => None,
        })
        .expect("return should be a control transfer");
    assert_eq!(transfer.target, TransferTarget::Exit);
    assert_eq!(depth, 1);
    assert!(matches!(
        transfer.traps.as_slice(),
        [trap] if matches!(trap.kind, TrapKind::EnterFinally { .. })
    ));
    Ok(())
}

#[test]
fn switch_temp_is_a_synthetic_of_the_switch() -> Result<()> {
    let ast = AstBuilder::new();
    let next = ast.static_method("demo.Demo", "next", vec![], Ty::INT);
    let stmt = ast.switch_stmt(
        ast.call(None, next, vec![]),
        vec![ast.case_group(vec![CaseLabel::Expr(ast.int(1))], vec![ast.break_(None)])],
    );
    let switch_id = stmt.id;
    let body = ast.block(vec![stmt]);
    let decls = ast.finish();

    let flow = support::build(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
    )?;

    let temps: Vec<StablePlace> = flow
        .temps()
        .iter()
        .map(|temp| StablePlace::Temp(temp.id))
        .collect();
    assert_eq!(flow.synthetics(switch_id), temps);
    assert!(flow.synthetics(body.id).len() >= temps.len());

    let json = flow.to_json()?;
    assert!(json.contains("\"instructions\""));
    Ok(())
}

#[test]
fn branch_free_statements_evaluate_and_discard_without_temps() -> Result<()> {
    let ast = AstBuilder::new();
    let x = ast.local("x", Ty::INT);
    let y = ast.local("y", Ty::INT);
    let stmts = (1..=3)
        .map(|k| {
            let sum = ast.binary(BinaryOp::Add, ast.var(y), ast.int(k));
            ast.expr_stmt(ast.binary(BinaryOp::Mul, ast.var(x), sum))
        })
        .collect();
    let body = ast.block(stmts);
    let decls = ast.finish();

    let flow = support::build(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
    )?;

    assert_eq!(count(&flow, "numeric"), 6);
    assert_eq!(count(&flow, "pop"), 3);
    assert_eq!(count(&flow, "cond_goto") + count(&flow, "goto"), 0);
    assert!(flow.temps().is_empty());
    let depth: isize = flow
        .instructions()
        .iter()
        .map(|i| i.stack_effect().delta())
        .sum();
    assert_eq!(depth, 0);
    Ok(())
}

#[test]
fn same_expression_resolves_to_the_same_value() -> Result<()> {
    let ast = AstBuilder::new();
    let holder = ast.class("demo.Holder");
    let f = ast.field(holder, "f", Ty::INT, false, false, None);
    let x = ast.local("x", Ty::class("demo.Holder"));
    let first = ast.field_of(ast.var(x), f);
    let second = ast.field_of(ast.var(x), f);
    let decls = ast.finish();
    let values = ValueFactory::new();
    let resolver = ExpressionResolver::new(&decls);

    let a = resolver.resolve(&first, None).expect("field read should resolve");
    let b = resolver.resolve(&second, None).expect("field read should resolve");
    assert_eq!(a, b);
    assert_eq!(values.place_value(a), values.place_value(b));
    assert_eq!(values.interned_count(), 1);

    let options = FlowOptions::default();
    let pushed = |expr: &Expr| -> Result<Vec<PlaceValue>> {
        let flow = build_flow(FragmentRoot::Expression(expr), &decls, &values, &options, None)?
            .expect("field read should translate");
        Ok(flow
            .instructions()
            .iter()
            .filter_map(|i| match &i.kind {
                InstructionKind::Push {
                    value: PushValue::Place(place),
                    ..
                } => Some(place.clone()),
                _ => None,
            })
            .collect())
    };
    assert_eq!(pushed(&first)?, pushed(&second)?);
    Ok(())
}

#[test]
fn lookup_past_the_end_is_none() -> Result<()> {
    let ast = AstBuilder::new();
    let expr = ast.int(7);
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Expression(&expr), &decls)?;

    let last = flow.instruction_count() - 1;
    assert_eq!(flow.get(last).map(|i| i.kind.name()), Some("return"));
    assert!(flow.get(last + 1).is_none());
    Ok(())
}
