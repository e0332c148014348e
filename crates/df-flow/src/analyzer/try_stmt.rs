//! `try` statements: catch sections, `finally` and resource cleanup.
//!
//! The protected body runs under a `TryCatch` trap (and an `EnterFinally` trap
//! when there is a `finally`). Normal completion of the body or of a catch
//! section jumps to the end of the statement through the finally block only.

use super::ControlFlowAnalyzer;
use crate::context::FlowContext;
use crate::inst::InstructionKind;
use crate::place::StablePlace;
use crate::trap::{CatchClause, ControlTransfer, TransferTarget, Trap, TrapKind};
use df_core::ast::visit::NodeRef;
use df_core::ast::{Block, NodeId, ResourceKind, ResourceList, Stmt, TryStmt};
use df_core::Result;

impl<'a> ControlFlowAnalyzer<'a> {
    pub(crate) fn visit_try(
        &self,
        cx: &mut FlowContext<'a>,
        stmt: &'a Stmt,
        try_stmt: &'a TryStmt,
    ) -> Result<()> {
        cx.register_target(stmt.id, NodeRef::Stmt(stmt));
        let finally = match &try_stmt.finally {
            Some(block) => {
                let finally_start = cx.flow.start_offset(block.id);
                let trap = Trap::new(block.id, TrapKind::EnterFinally { finally_start });
                cx.traps.push(trap.clone());
                Some((block, trap))
            }
            None => None,
        };
        if !try_stmt.catches.is_empty() {
            let clauses = try_stmt
                .catches
                .iter()
                .map(|section| CatchClause {
                    param: section.param,
                    types: section.types.clone(),
                    target: cx.flow.start_offset(section.id),
                })
                .collect();
            cx.traps.push(Trap::new(stmt.id, TrapKind::TryCatch { clauses }));
        }

        match &try_stmt.resources {
            Some(resources) => self.visit_resources(cx, resources, &try_stmt.body)?,
            None => self.visit_block(cx, &try_stmt.body, &[])?,
        }
        let through_finally: Vec<Trap> = finally.iter().map(|(_, trap)| trap.clone()).collect();
        let goto_end = self.leave_via(cx, stmt.id, try_stmt.body.id, through_finally);
        cx.control_transfer(goto_end.clone())?;

        if !try_stmt.catches.is_empty() {
            cx.traps.pop(stmt.id);
        }
        for section in &try_stmt.catches {
            cx.start(section.id);
            self.visit_block(cx, &section.body, &[section.param])?;
            cx.finish(section.id);
            cx.control_transfer(goto_end.clone())?;
        }

        if let Some((block, _)) = finally {
            self.visit_finally(cx, block.id, block)?;
        }
        Ok(())
    }

    /// Jump to the end of `exited` passing through `traps` only.
    fn leave_via(
        &self,
        cx: &mut FlowContext<'a>,
        exited: NodeId,
        flush_scope: NodeId,
        traps: Vec<Trap>,
    ) -> ControlTransfer {
        let mut transfer = cx.transfer_to(exited, flush_scope);
        transfer.traps = traps;
        transfer
    }

    fn visit_finally(&self, cx: &mut FlowContext<'a>, anchor: NodeId, block: &'a Block) -> Result<()> {
        cx.traps.pop(anchor);
        cx.traps.push(Trap::new(anchor, TrapKind::InsideFinally));
        self.visit_block(cx, block, &[])?;
        cx.control_transfer(ControlTransfer::new(TransferTarget::ExitFinally, Vec::new()))?;
        cx.traps.pop(anchor);
        Ok(())
    }

    /// Resource initialization, the body, then the cleanup section that models
    /// the implicit `close()` calls.
    fn visit_resources(
        &self,
        cx: &mut FlowContext<'a>,
        resources: &'a ResourceList,
        body: &'a Block,
    ) -> Result<()> {
        for resource in &resources.resources {
            match &resource.kind {
                ResourceKind::Decl { var, init } => {
                    let place = cx.place(StablePlace::Var(*var));
                    let ty = self.decls.var(*var).ty.clone();
                    self.push_for_write(cx, &place)?;
                    self.visit_expr(cx, init)?;
                    self.box_unbox(cx, &init.ty, &ty)?;
                    cx.add(
                        InstructionKind::Assign {
                            target: Some(place),
                        },
                        None,
                    )?;
                    self.pop(cx)?;
                }
                ResourceKind::Expr(expr) => {
                    self.visit_expr(cx, expr)?;
                    self.pop(cx)?;
                }
            }
        }
        let close_throws: Vec<String> = resources
            .resources
            .iter()
            .flat_map(|resource| resource.close_throws.iter().cloned())
            .collect();
        if close_throws.is_empty() {
            return self.visit_block(cx, body, &[]);
        }

        let cleanup_start = cx.flow.start_offset(resources.id);
        let trap = Trap::new(resources.id, TrapKind::TwrFinally { cleanup_start });
        cx.traps.push(trap.clone());
        self.visit_block(cx, body, &[])?;
        let goto_end = self.leave_via(cx, resources.id, body.id, vec![trap]);
        cx.control_transfer(goto_end)?;
        cx.traps.pop(resources.id);

        cx.traps.push(Trap::new(resources.id, TrapKind::InsideFinally));
        cx.start(resources.id);
        cx.add(InstructionKind::FlushFields, None)?;
        self.add_throws(cx, &close_throws)?;
        cx.control_transfer(ControlTransfer::new(TransferTarget::ExitFinally, Vec::new()))?;
        cx.finish(resources.id);
        cx.traps.pop(resources.id);
        Ok(())
    }
}
