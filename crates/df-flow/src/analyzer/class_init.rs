use super::ControlFlowAnalyzer;
use crate::context::FlowContext;
use crate::inst::{InstructionKind, PushValue};
use crate::place::StablePlace;
use crate::resolver::InitScope;
use df_core::ast::{ClassDecl, ExprKind, Expr, MemberKind, VarId};
use df_core::types::{Constant, DfType};
use df_core::Result;

impl<'a> ControlFlowAnalyzer<'a> {
    /// `if (unknown) { static initializers } else { instance initializers }`
    pub(crate) fn visit_class_initializers(
        &self,
        cx: &mut FlowContext<'a>,
        class: &'a ClassDecl,
    ) -> Result<()> {
        let instance = cx.flow.defer();
        let end = cx.flow.defer();
        self.push_unknown(cx)?;
        cx.add(
            InstructionKind::ConditionalGoto {
                target: instance,
                compare: DfType::Top,
            },
            None,
        )?;
        self.visit_initializers(cx, class, true)?;
        cx.add(InstructionKind::Goto { target: end }, None)?;
        cx.flow.bind_here(instance);
        self.visit_initializers(cx, class, false)?;
        cx.flow.bind_here(end);
        cx.init_scope = None;
        Ok(())
    }

    fn visit_initializers(
        &self,
        cx: &mut FlowContext<'a>,
        class: &'a ClassDecl,
        is_static: bool,
    ) -> Result<()> {
        for member in &class.members {
            if let MemberKind::Field { var, init: None } = &member.kind {
                let decl = self.decls.var(*var);
                if decl.is_static_field() == is_static && !decl.is_final {
                    let value = DfType::Constant(Constant::default_for(&decl.ty));
                    self.assign_default(cx, *var, value)?;
                }
            }
        }
        for (order, member) in class.members.iter().enumerate() {
            match &member.kind {
                MemberKind::Field {
                    var,
                    init: Some(init),
                } if self.decls.var(*var).is_static_field() == is_static => {
                    cx.init_scope = Some(InitScope {
                        class: class.class,
                        order,
                        is_static,
                    });
                    cx.start(member.id);
                    self.init_field(cx, *var, init)?;
                    cx.finish_statement(member.id)?;
                }
                MemberKind::Initializer {
                    is_static: block_static,
                    body,
                } if *block_static == is_static => {
                    cx.init_scope = Some(InitScope {
                        class: class.class,
                        order,
                        is_static,
                    });
                    self.visit_block(cx, body, &[])?;
                }
                _ => {}
            }
        }
        if !is_static {
            cx.add(InstructionKind::EndOfInitializer, None)?;
        }
        cx.add(InstructionKind::FlushFields, None)?;
        Ok(())
    }

    fn init_field(&self, cx: &mut FlowContext<'a>, var: VarId, init: &'a Expr) -> Result<()> {
        let place = cx.place(self.field_place(var));
        let ty = self.decls.var(var).ty.clone();
        if let ExprKind::ArrayInit { element, elements } = &init.strip_parens().kind {
            return self.init_array(cx, &place, &ty, element, elements);
        }
        self.push_for_write(cx, &place)?;
        self.visit_expr(cx, init)?;
        self.box_unbox(cx, &init.ty, &ty)?;
        cx.add(
            InstructionKind::Assign {
                target: Some(place),
            },
            None,
        )?;
        self.pop(cx)
    }

    fn assign_default(&self, cx: &mut FlowContext<'a>, var: VarId, value: DfType) -> Result<()> {
        let place = cx.place(self.field_place(var));
        self.push_for_write(cx, &place)?;
        self.push_value(cx, PushValue::Value(value), None)?;
        cx.add(
            InstructionKind::Assign {
                target: Some(place),
            },
            None,
        )?;
        self.pop(cx)
    }

    fn field_place(&self, var: VarId) -> StablePlace {
        if self.decls.var(var).is_static_field() {
            StablePlace::field(None, var)
        } else {
            StablePlace::field(Some(StablePlace::This), var)
        }
    }
}
