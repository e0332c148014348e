use df_core::ast::{AstBuilder, BinaryOp, CaseLabel, Ty, UnaryOp};
use df_core::config::FlowOptions;
use df_core::types::{Constant, DfType};
use df_core::Result;
use df_flow::inst::{InstructionKind, NumericOp, PushValue};
use df_flow::{FragmentRoot, StablePlace, TransferTarget, TrapKind};
use pretty_assertions::assert_eq;

mod support;

use support::assertions::{
    assert_offsets_resolved, assigned_places, calls_to, count, jump_target, kinds, positions,
    pushed_places, stack_depths, transfers,
};

#[test]
fn if_else_has_one_conditional_and_one_unconditional_jump() -> Result<()> {
    let ast = AstBuilder::new();
    let x = ast.local("x", Ty::BOOLEAN);
    let a = ast.static_method("demo.Demo", "a", vec![], Ty::Void);
    let b = ast.static_method("demo.Demo", "b", vec![], Ty::Void);
    let stmt = ast.if_(
        ast.var(x),
        ast.block_stmt(vec![ast.expr_stmt(ast.call(None, a, vec![]))]),
        Some(ast.block_stmt(vec![ast.expr_stmt(ast.call(None, b, vec![]))])),
    );
    let if_id = stmt.id;
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
    assert_eq!(count(&flow, "cond_goto"), 1);
    assert_eq!(count(&flow, "goto"), 1);

    let branch = positions(&flow, "cond_goto")[0];
    let skip = positions(&flow, "goto")[0];
    let call_a = calls_to(&flow, a)[0];
    let call_b = calls_to(&flow, b)[0];
    assert!(branch < call_a && call_a < skip && skip < call_b);
    assert_eq!(jump_target(&flow, branch), call_b);

    let end = jump_target(&flow, skip);
    assert!(end > call_b);
    assert!(matches!(
        flow.instruction(end).kind,
        InstructionKind::FinishElement { node: Some(node), .. } if node == if_id
    ));
    Ok(())
}

#[test]
fn small_counted_loop_is_unrolled_without_back_edge() -> Result<()> {
    let ast = AstBuilder::new();
    let i = ast.local("i", Ty::INT);
    let work = ast.static_method("demo.Demo", "body", vec![], Ty::Void);
    let stmt = ast.for_(
        Some(ast.decl(i, Some(ast.int(0)))),
        Some(ast.binary(BinaryOp::Lt, ast.var(i), ast.int(3))),
        Some(ast.expr_stmt(ast.post_inc(ast.var(i)))),
        ast.expr_stmt(ast.call(None, work, vec![])),
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
    assert_eq!(count(&flow, "goto"), 0);
    assert_eq!(calls_to(&flow, work).len(), 3);

    // the counter ends up exactly at the bound
    let counter = StablePlace::Var(i);
    let final_fact = flow.instructions().windows(2).any(|pair| {
        matches!(
            &pair[0].kind,
            InstructionKind::Push {
                value: PushValue::Value(DfType::Constant(Constant::Int(3))),
                for_write: false,
            }
        ) && matches!(
            &pair[1].kind,
            InstructionKind::Assign { target: Some(target) } if target.place == counter
        )
    });
    assert!(final_fact, "{}", df_flow::dump::dump_flow(&flow));
    Ok(())
}

#[test]
fn counted_loop_over_the_threshold_keeps_its_back_edge() -> Result<()> {
    let ast = AstBuilder::new();
    let i = ast.local("i", Ty::INT);
    let work = ast.static_method("demo.Demo", "body", vec![], Ty::Void);
    let stmt = ast.for_(
        Some(ast.decl(i, Some(ast.int(0)))),
        Some(ast.binary(BinaryOp::Lt, ast.var(i), ast.int(3))),
        Some(ast.expr_stmt(ast.post_inc(ast.var(i)))),
        ast.expr_stmt(ast.call(None, work, vec![])),
    );
    let body = ast.block(vec![stmt]);
    let decls = ast.finish();
    let options = FlowOptions {
        max_unroll: 2,
        ..FlowOptions::default()
    };

    let flow = support::build_with(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
        &options,
    )?;

    assert_offsets_resolved(&flow);
    assert_eq!(calls_to(&flow, work).len(), 1);
    let back_edges = positions(&flow, "goto");
    assert_eq!(back_edges.len(), 1);
    assert!(jump_target(&flow, back_edges[0]) < calls_to(&flow, work)[0]);

    let counter = StablePlace::Var(i);
    let range_fact = flow.instructions().windows(2).any(|pair| {
        matches!(
            &pair[0].kind,
            InstructionKind::Push {
                value: PushValue::Value(DfType::Range { .. }),
                ..
            }
        ) && matches!(
            &pair[1].kind,
            InstructionKind::Assign { target: Some(target) } if target.place == counter
        )
    });
    assert!(range_fact, "{}", df_flow::dump::dump_flow(&flow));
    Ok(())
}

#[test]
fn finally_runs_once_for_every_exit_of_the_body() -> Result<()> {
    let ast = AstBuilder::new();
    let risky = ast.static_method("demo.Demo", "risky", vec![], Ty::Void);
    let cleanup = ast.static_method("demo.Demo", "cleanup", vec![], Ty::Void);
    let stmt = ast.try_(
        ast.block(vec![ast.expr_stmt(ast.call(None, risky, vec![]))]),
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

    assert_offsets_resolved(&flow);
    let cleanups = calls_to(&flow, cleanup);
    assert_eq!(cleanups.len(), 1);
    let finally_start = cleanups[0];

    // exceptional exits of the body go through the finally block
    let raised: Vec<_> = flow
        .instructions()
        .iter()
        .filter_map(|i| match &i.kind {
            InstructionKind::MayThrow { transfer } => Some(transfer),
            _ => None,
        })
        .collect();
    assert_eq!(raised.len(), 2);
    for transfer in raised {
        match transfer.traps.as_slice() {
            [trap] => match &trap.kind {
                TrapKind::EnterFinally { finally_start: start } => {
                    assert_eq!(start.index(), Some(finally_start))
                }
                other => panic!("unexpected trap {other:?}"),
            },
            traps => panic!("expected one trap, got {traps:?}"),
        }
    }

    // the normal exit too, and the finally block resumes the pending transfer
    let transfers = transfers(&flow);
    assert_eq!(transfers.len(), 2);
    assert!(matches!(
        transfers[0].traps.as_slice(),
        [trap] if matches!(trap.kind, TrapKind::EnterFinally { .. })
    ));
    assert_eq!(transfers[1].target, TransferTarget::ExitFinally);
    assert!(calls_to(&flow, risky)[0] < finally_start);

    let last = flow.instruction(flow.instruction_count() - 1);
    match &last.kind {
        InstructionKind::Return { transfer } => {
            assert_eq!(transfer.target, TransferTarget::Exit);
            assert!(transfer.traps.is_empty());
        }
        other => panic!("flow should end with a return, found {}", other.name()),
    }
    Ok(())
}

#[test]
fn side_effecting_selector_is_evaluated_once_into_a_temp() -> Result<()> {
    let ast = AstBuilder::new();
    let next = ast.static_method("demo.Demo", "next", vec![], Ty::INT);
    let a = ast.static_method("demo.Demo", "a", vec![], Ty::Void);
    let b = ast.static_method("demo.Demo", "b", vec![], Ty::Void);
    let c = ast.static_method("demo.Demo", "c", vec![], Ty::Void);
    let stmt = ast.switch_stmt(
        ast.call(None, next, vec![]),
        vec![
            ast.case_expr(vec![CaseLabel::Expr(ast.int(1))], ast.call(None, a, vec![])),
            ast.case_expr(vec![CaseLabel::Expr(ast.int(2))], ast.call(None, b, vec![])),
            ast.case_expr(vec![CaseLabel::Default], ast.call(None, c, vec![])),
        ],
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
    assert_eq!(calls_to(&flow, next).len(), 1);
    assert_eq!(flow.temps().len(), 1);
    let temp = StablePlace::Temp(flow.temps()[0].id);

    let stores: Vec<_> = assigned_places(&flow)
        .into_iter()
        .filter(|place| place.is_temp())
        .collect();
    assert_eq!(stores, vec![&temp]);

    let reads = pushed_places(&flow)
        .into_iter()
        .filter(|place| **place == temp)
        .count();
    assert_eq!(reads, 2);
    assert_eq!(count(&flow, "compare"), 2);
    for case in [a, b, c] {
        assert_eq!(calls_to(&flow, case).len(), 1);
    }
    Ok(())
}

#[test]
fn conjunction_short_circuits_to_a_shared_false() -> Result<()> {
    let ast = AstBuilder::new();
    let a = ast.local("a", Ty::BOOLEAN);
    let b = ast.local("b", Ty::BOOLEAN);
    let c = ast.local("c", Ty::BOOLEAN);
    let expr = ast.and(vec![ast.var(a), ast.var(b), ast.var(c)]);
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Expression(&expr), &decls)?;

    assert_eq!(
        kinds(&flow),
        vec![
            "finish",
            "push",
            "cond_goto",
            "push",
            "cond_goto",
            "push",
            "goto",
            "push",
            "result_of",
            "return",
        ]
    );
    let exits = positions(&flow, "cond_goto");
    let shared = jump_target(&flow, exits[0]);
    assert_eq!(jump_target(&flow, exits[1]), shared);
    assert_eq!(shared, 7);
    assert!(matches!(
        &flow.instruction(shared).kind,
        InstructionKind::Push {
            value: PushValue::Value(value),
            ..
        } if *value == DfType::boolean(false)
    ));
    for exit in exits {
        assert!(matches!(
            &flow.instruction(exit).kind,
            InstructionKind::ConditionalGoto { compare, .. } if *compare == DfType::boolean(false)
        ));
    }
    // `c` flows straight to the result
    assert_eq!(jump_target(&flow, 6), 8);
    Ok(())
}

#[test]
fn break_out_of_a_fixed_element_loop_leaves_a_balanced_stack() -> Result<()> {
    let ast = AstBuilder::new();
    let a = ast.local("a", Ty::INT);
    let b = ast.local("b", Ty::INT);
    let x = ast.local("x", Ty::INT);
    let loop_id = ast.reserve();
    let exit = ast.if_(
        ast.binary(BinaryOp::Gt, ast.var(x), ast.int(0)),
        ast.break_(Some(loop_id)),
        None,
    );
    let stmt = ast.with_id(
        loop_id,
        ast.foreach(
            x,
            ast.new_array(
                Ty::INT,
                vec![],
                Some(ast.array_init(Ty::INT, vec![ast.var(a), ast.var(b)])),
            ),
            ast.block_stmt(vec![exit]),
        ),
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
    assert_eq!(count(&flow, "splice"), 0);
    assert_eq!(count(&flow, "goto"), 0);
    let breaks = transfers(&flow);
    assert_eq!(breaks.len(), 2);
    for transfer in breaks {
        match &transfer.target {
            TransferTarget::Instruction { offset, .. } => {
                assert_eq!(offset.index(), flow.end_offset(loop_id));
            }
            other => panic!("break should stay inside the flow, got {other:?}"),
        }
    }
    let depths = stack_depths(&flow);
    let end = flow.end_offset(loop_id).expect("loop should be closed");
    assert_eq!(depths[end], Some(0));
    assert_eq!(depths[flow.instruction_count() - 1], Some(0));
    Ok(())
}

#[test]
fn short_fixed_element_loop_runs_the_body_per_element() -> Result<()> {
    let ast = AstBuilder::new();
    let a = ast.local("a", Ty::INT);
    let x = ast.local("x", Ty::INT);
    let consume = ast.static_method("demo.Demo", "consume", vec![Ty::INT], Ty::Void);
    let stmt = ast.foreach(
        x,
        ast.array_init(Ty::INT, vec![ast.int(1), ast.var(a), ast.int(3)]),
        ast.block_stmt(vec![ast.expr_stmt(ast.call(None, consume, vec![ast.var(x)]))]),
    );
    let body = ast.block(vec![stmt]);
    let decls = ast.finish();

    let flow = support::build_with(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
        &FlowOptions::default(),
    )?;

    assert_eq!(calls_to(&flow, consume).len(), 3);
    assert_eq!(count(&flow, "goto"), 0);
    assert_eq!(count(&flow, "splice"), 0);
    // only the non-constant element needs a temp
    assert_eq!(flow.temps().len(), 1);
    let x_writes = assigned_places(&flow)
        .into_iter()
        .filter(|place| **place == StablePlace::Var(x))
        .count();
    assert_eq!(x_writes, 3);
    Ok(())
}

#[test]
fn long_fixed_element_loop_assigns_any_of_the_elements() -> Result<()> {
    let ast = AstBuilder::new();
    let x = ast.local("x", Ty::INT);
    let consume = ast.static_method("demo.Demo", "consume", vec![Ty::INT], Ty::Void);
    let stmt = ast.foreach(
        x,
        ast.array_init(
            Ty::INT,
            vec![ast.int(1), ast.int(2), ast.int(3), ast.int(2)],
        ),
        ast.block_stmt(vec![ast.expr_stmt(ast.call(None, consume, vec![ast.var(x)]))]),
    );
    let body = ast.block(vec![stmt]);
    let decls = ast.finish();

    let flow = support::build_with(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
        &FlowOptions::default(),
    )?;

    assert_offsets_resolved(&flow);
    assert_eq!(calls_to(&flow, consume).len(), 1);
    let back = positions(&flow, "goto");
    assert_eq!(back.len(), 1);
    assert!(jump_target(&flow, back[0]) < back[0]);

    let widened = flow.instructions().iter().any(|i| {
        matches!(
            &i.kind,
            InstructionKind::Push {
                value: PushValue::Value(DfType::AnyOf(values)),
                ..
            } if *values == vec![Constant::Int(1), Constant::Int(2), Constant::Int(3)]
        )
    });
    assert!(widened);
    assert_eq!(assigned_places(&flow), vec![&StablePlace::Var(x)]);
    Ok(())
}

#[test]
fn negated_double_is_not_rewritten_as_a_subtraction() -> Result<()> {
    let ast = AstBuilder::new();
    let x = ast.local("x", Ty::DOUBLE);
    let expr = ast.unary(UnaryOp::Neg, ast.var(x));
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Expression(&expr), &decls)?;

    assert_eq!(count(&flow, "numeric"), 0);
    assert_eq!(count(&flow, "eval_unknown"), 1);
    Ok(())
}

#[test]
fn negated_int_subtracts_from_zero() -> Result<()> {
    let ast = AstBuilder::new();
    let x = ast.local("x", Ty::INT);
    let expr = ast.unary(UnaryOp::Neg, ast.var(x));
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Expression(&expr), &decls)?;

    let numeric = positions(&flow, "numeric");
    assert_eq!(numeric.len(), 1);
    assert!(matches!(
        flow.instruction(numeric[0]).kind,
        InstructionKind::NumericBinary { op: NumericOp::Sub }
    ));
    Ok(())
}

#[test]
fn overridden_options_keep_loops_and_calls() -> Result<()> {
    let ast = AstBuilder::new();
    let i = ast.local("i", Ty::INT);
    let s = ast.local("s", Ty::string());
    let require = ast.static_method(
        "java.util.Objects",
        "requireNonNull",
        vec![Ty::object()],
        Ty::object(),
    );
    let stmt = ast.for_(
        Some(ast.decl(i, Some(ast.int(0)))),
        Some(ast.binary(BinaryOp::Lt, ast.var(i), ast.int(3))),
        Some(ast.expr_stmt(ast.post_inc(ast.var(i)))),
        ast.block_stmt(vec![ast.expr_stmt(ast.call(None, require, vec![ast.var(s)]))]),
    );
    let body = ast.block(vec![stmt]);
    let decls = ast.finish();
    let options = FlowOptions::default().with_overrides(Some(2), true);

    let flow = support::build_with(
        FragmentRoot::Body {
            block: &body,
            return_ty: &Ty::Void,
        },
        &decls,
        &options,
    )?;

    let back: Vec<_> = positions(&flow, "goto")
        .into_iter()
        .filter(|index| jump_target(&flow, *index) < *index)
        .collect();
    assert_eq!(back.len(), 1);
    assert_eq!(calls_to(&flow, require).len(), 1);
    Ok(())
}
