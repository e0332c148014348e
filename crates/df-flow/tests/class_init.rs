use df_core::ast::{AstBuilder, Ty};
use df_core::types::{Constant, DfType};
use df_core::Result;
use df_flow::inst::{InstructionKind, PushValue};
use df_flow::{FragmentRoot, StablePlace};
use pretty_assertions::assert_eq;

mod support;

use support::assertions::{
    assert_offsets_resolved, assigned_places, calls_to, count, jump_target, positions,
};

#[test]
fn static_and_instance_initializers_run_on_separate_paths() -> Result<()> {
    let ast = AstBuilder::new();
    let class = ast.class("demo.Counter");
    let count_field = ast.field(class, "count", Ty::INT, true, false, None);
    let name = ast.field(class, "NAME", Ty::string(), true, false, None);
    let size = ast.field(class, "size", Ty::INT, false, false, None);
    let cache = ast.field(class, "cache", Ty::object(), false, false, None);
    let work = ast.static_method("demo.Counter", "work", vec![], Ty::Void);
    let decl = ast.class_decl(
        class,
        vec![
            ast.field_member(count_field, None),
            ast.field_member(name, Some(ast.str_("x"))),
            ast.field_member(size, Some(ast.int(3))),
            ast.field_member(cache, None),
            ast.initializer(
                false,
                ast.block(vec![ast.expr_stmt(ast.call(None, work, vec![]))]),
            ),
        ],
    );
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Class(&decl), &decls)?;

    assert_offsets_resolved(&flow);
    assert_eq!(count(&flow, "end_of_initializer"), 1);
    assert_eq!(count(&flow, "flush_fields"), 2);

    let branch = positions(&flow, "cond_goto");
    assert_eq!(branch.len(), 1);
    assert!(matches!(
        &flow.instruction(branch[0]).kind,
        InstructionKind::ConditionalGoto { compare: DfType::Top, .. }
    ));
    let instance_start = jump_target(&flow, branch[0]);
    let skip = positions(&flow, "goto");
    assert_eq!(skip.len(), 1);
    assert_eq!(skip[0] + 1, instance_start);

    // defaults first, then initializers in declaration order
    let this = StablePlace::This;
    assert_eq!(
        assigned_places(&flow),
        vec![
            &StablePlace::field(None, count_field),
            &StablePlace::field(None, name),
            &StablePlace::field(Some(this.clone()), cache),
            &StablePlace::field(Some(this), size),
        ]
    );

    let work_call = calls_to(&flow, work)[0];
    assert!(work_call > instance_start);
    assert!(work_call < positions(&flow, "end_of_initializer")[0]);
    Ok(())
}

#[test]
fn missing_initializer_writes_the_type_default() -> Result<()> {
    let ast = AstBuilder::new();
    let class = ast.class("demo.Flags");
    let enabled = ast.field(class, "enabled", Ty::BOOLEAN, false, false, None);
    let fixed = ast.field(class, "FIXED", Ty::INT, true, true, None);
    let decl = ast.class_decl(
        class,
        vec![ast.field_member(enabled, None), ast.field_member(fixed, None)],
    );
    let decls = ast.finish();

    let flow = support::build(FragmentRoot::Class(&decl), &decls)?;

    // final fields without an initializer are assigned by a constructor instead
    let field = StablePlace::field(Some(StablePlace::This), enabled);
    assert_eq!(assigned_places(&flow), vec![&field]);
    let default = flow.instructions().windows(2).any(|pair| {
        matches!(
            &pair[0].kind,
            InstructionKind::Push {
                value: PushValue::Value(DfType::Constant(Constant::Bool(false))),
                for_write: false,
            }
        ) && matches!(
            &pair[1].kind,
            InstructionKind::Assign { target: Some(target) } if target.place == field
        )
    });
    assert!(default, "{}", df_flow::dump::dump_flow(&flow));
    Ok(())
}
