use super::ControlFlowAnalyzer;
use crate::context::{ExpressionBlockContext, FlowContext};
use crate::inst::{InstructionKind, NullabilityProblem, PushValue};
use crate::place::StablePlace;
use df_core::ast::visit::{declared_vars, NodeRef};
use df_core::ast::{
    Block, Expr, ExprKind, LocalVar, NodeId, Stmt, StmtKind, Ty, VarId, ASSERTION_ERROR,
    THROWABLE,
};
use df_core::types::DfType;
use df_core::Result;

impl<'a> ControlFlowAnalyzer<'a> {
    /// Visit the statements of `block`, then flush everything declared inside it.
    /// `extra` lists variables bound on entry (catch parameters).
    pub(crate) fn visit_block(
        &self,
        cx: &mut FlowContext<'a>,
        block: &'a Block,
        extra: &[VarId],
    ) -> Result<()> {
        cx.start(block.id);
        cx.register_target(block.id, NodeRef::Block(block));
        for stmt in &block.stmts {
            self.visit_stmt(cx, stmt)?;
        }
        let mut vars: Vec<VarId> = extra.to_vec();
        for var in declared_vars(NodeRef::Block(block)) {
            if !vars.contains(&var) {
                vars.push(var);
            }
        }
        for var in vars {
            let place = cx.place(StablePlace::Var(var));
            cx.add(InstructionKind::Flush { place }, None)?;
        }
        cx.finish(block.id);
        Ok(())
    }

    pub(crate) fn visit_stmt(&self, cx: &mut FlowContext<'a>, stmt: &'a Stmt) -> Result<()> {
        cx.start(stmt.id);
        match &stmt.kind {
            StmtKind::Block(block) => self.visit_block(cx, block, &[])?,
            StmtKind::Expr(expr) => {
                self.visit_expr(cx, expr)?;
                self.pop(cx)?;
            }
            StmtKind::ExprList(exprs) => {
                for expr in exprs {
                    self.visit_expr(cx, expr)?;
                    self.pop(cx)?;
                }
            }
            StmtKind::Decl(locals) => {
                for local in locals {
                    self.visit_local(cx, local)?;
                }
            }
            StmtKind::LocalClass(class) => self.visit_class_closure(cx, class)?,
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => self.visit_if(cx, stmt, cond, then, otherwise.as_deref())?,
            StmtKind::While { cond, body } => self.visit_while(cx, stmt, cond.as_ref(), body)?,
            StmtKind::DoWhile { body, cond } => {
                self.visit_do_while(cx, stmt, body, cond.as_ref())?
            }
            StmtKind::For { .. } => self.visit_for(cx, stmt)?,
            StmtKind::ForEach {
                param,
                iterable,
                body,
            } => self.visit_foreach(cx, stmt, *param, iterable, body)?,
            StmtKind::Switch(switch) => {
                cx.register_target(stmt.id, NodeRef::Stmt(stmt));
                self.visit_switch(cx, switch, stmt.id, false)?;
            }
            StmtKind::Break { target } => self.jump_out(cx, *target)?,
            StmtKind::Continue { target } => self.visit_continue(cx, *target)?,
            StmtKind::Return(value) => self.visit_return(cx, value.as_ref())?,
            StmtKind::Yield { value, target } => self.visit_yield(cx, value, *target)?,
            StmtKind::Throw(exception) => {
                self.visit_expr(cx, exception)?;
                self.add_null_check(cx, exception.id, NullabilityProblem::ThrowOperand)?;
                self.pop(cx)?;
                let ty = exception.ty.class_name().unwrap_or(THROWABLE).to_string();
                self.throw_exception(cx, &ty)?;
            }
            StmtKind::Try(try_stmt) => self.visit_try(cx, stmt, try_stmt)?,
            StmtKind::Labeled { body, .. } => {
                cx.register_target(stmt.id, NodeRef::Stmt(stmt));
                self.visit_stmt(cx, body)?;
            }
            StmtKind::Assert { cond, message } => {
                self.visit_assert(cx, stmt.id, cond, message.as_ref())?
            }
            StmtKind::Synchronized { lock, body } => {
                self.visit_expr(cx, lock)?;
                self.add_null_check(cx, lock.id, NullabilityProblem::MonitorLock)?;
                self.pop(cx)?;
                cx.add(InstructionKind::FlushFields, None)?;
                self.visit_block(cx, body, &[])?;
            }
            StmtKind::Empty => {}
            StmtKind::Error => unsupported!(stmt.id, "malformed statement"),
        }
        match &stmt.kind {
            StmtKind::Return(_) | StmtKind::Block(_) => cx.finish(stmt.id),
            _ => cx.finish_statement(stmt.id)?,
        }
        Ok(())
    }

    fn visit_local(&self, cx: &mut FlowContext<'a>, local: &'a LocalVar) -> Result<()> {
        let Some(init) = &local.init else {
            return Ok(());
        };
        let ty = self.decls.var(local.var).ty.clone();
        let place = cx.place(StablePlace::Var(local.var));
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

    fn visit_if(
        &self,
        cx: &mut FlowContext<'a>,
        stmt: &'a Stmt,
        cond: &'a Expr,
        then: &'a Stmt,
        otherwise: Option<&'a Stmt>,
    ) -> Result<()> {
        self.visit_condition(cx, cond)?;
        let target = match otherwise {
            Some(otherwise) => cx.flow.start_offset(otherwise.id),
            None => cx.flow.end_offset(stmt.id),
        };
        cx.add(
            InstructionKind::ConditionalGoto {
                target,
                compare: DfType::boolean(false),
            },
            None,
        )?;
        self.visit_stmt(cx, then)?;
        if let Some(otherwise) = otherwise {
            let end = cx.flow.end_offset(stmt.id);
            cx.add(InstructionKind::Goto { target: end }, None)?;
            self.visit_stmt(cx, otherwise)?;
        }
        Ok(())
    }

    /// Push a condition converted to a primitive boolean.
    pub(crate) fn visit_condition(&self, cx: &mut FlowContext<'a>, cond: &'a Expr) -> Result<()> {
        self.visit_expr(cx, cond)?;
        self.box_unbox(cx, &cond.ty, &Ty::BOOLEAN)
    }

    fn visit_continue(&self, cx: &mut FlowContext<'a>, target: Option<NodeId>) -> Result<()> {
        let body = target.and_then(|loop_stmt| cx.loop_bodies.get(&loop_stmt).copied());
        match body {
            Some(body) if cx.flow.is_open(body) => {
                let transfer = cx.transfer_to(body, body);
                cx.control_transfer(transfer)
            }
            _ => {
                let transfer = cx.exit_transfer();
                cx.control_transfer(transfer)
            }
        }
    }

    fn visit_return(&self, cx: &mut FlowContext<'a>, value: Option<&'a Expr>) -> Result<()> {
        let inlined = cx.blocks.iter().rev().find(|b| b.accepts_return).cloned();
        if let Some(block) = inlined {
            return match value {
                Some(value) => self.generate_return(cx, &block, value),
                None => {
                    let transfer = cx.transfer_to(block.block, block.block);
                    cx.control_transfer(transfer)
                }
            };
        }
        if let Some(value) = value {
            self.visit_expr(cx, value)?;
            self.box_unbox(cx, &value.ty, &self.return_ty())?;
            cx.notify_return(self.root_node())?;
            self.pop(cx)?;
        }
        let transfer = cx.exit_transfer();
        cx.control_transfer(transfer)
    }

    fn visit_yield(
        &self,
        cx: &mut FlowContext<'a>,
        value: &'a Expr,
        target: Option<NodeId>,
    ) -> Result<()> {
        let block = cx
            .blocks
            .iter()
            .rev()
            .find(|b| Some(b.owner) == target)
            .cloned();
        match block {
            Some(block) => self.generate_return(cx, &block, value),
            None => {
                self.visit_expr(cx, value)?;
                self.pop(cx)?;
                self.jump_out(cx, target)
            }
        }
    }

    /// Store a value produced inside an inlined computation and leave it.
    pub(crate) fn generate_return(
        &self,
        cx: &mut FlowContext<'a>,
        block: &ExpressionBlockContext,
        value: &'a Expr,
    ) -> Result<()> {
        self.push_for_write(cx, &block.target)?;
        self.visit_expr(cx, value)?;
        self.box_unbox(cx, &value.ty, &block.target_ty)?;
        if block.force_non_null {
            self.add_null_check(cx, value.id, NullabilityProblem::NullableFunctionReturn)?;
        }
        cx.notify_return(block.owner)?;
        cx.add(
            InstructionKind::Assign {
                target: Some(block.target.clone()),
            },
            None,
        )?;
        self.pop(cx)?;
        let transfer = cx.transfer_to(block.block, block.block);
        cx.control_transfer(transfer)
    }

    fn visit_assert(
        &self,
        cx: &mut FlowContext<'a>,
        stmt: NodeId,
        cond: &'a Expr,
        message: Option<&'a Expr>,
    ) -> Result<()> {
        let end = cx.flow.end_offset(stmt);
        let disabled = cx.place(StablePlace::AssertionsDisabled);
        self.push_value(cx, PushValue::Place(disabled), None)?;
        cx.add(
            InstructionKind::ConditionalGoto {
                target: end,
                compare: DfType::boolean(true),
            },
            None,
        )?;
        self.visit_condition(cx, cond)?;
        cx.add(
            InstructionKind::ConditionalGoto {
                target: end,
                compare: DfType::boolean(true),
            },
            None,
        )?;
        if let Some(message) = message {
            self.visit_expr(cx, message)?;
            self.pop(cx)?;
        }
        self.throw_exception(cx, ASSERTION_ERROR)
    }
}
