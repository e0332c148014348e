use super::ControlFlowAnalyzer;
use crate::context::FlowContext;
use crate::inst::{InstructionKind, NullabilityProblem};
use crate::place::SpecialField;
use df_core::ast::{Ty, NULL_POINTER_EXCEPTION};
use df_core::Result;

impl<'a> ControlFlowAnalyzer<'a> {
    /// Convert the top value from `from` to `to`: primitive widening or
    /// narrowing, unboxing with its null check, or boxing.
    pub(crate) fn box_unbox(&self, cx: &mut FlowContext<'a>, from: &Ty, to: &Ty) -> Result<()> {
        if from == to || matches!(from, Ty::Unknown | Ty::Void) || matches!(to, Ty::Unknown | Ty::Void) {
            return Ok(());
        }
        match (from, to) {
            (Ty::Primitive(_), Ty::Primitive(target)) => {
                cx.add(InstructionKind::PrimitiveConversion { to: *target }, None)?;
            }
            (_, Ty::Primitive(target)) => {
                let transfer = cx.check_transfer(NULL_POINTER_EXCEPTION, self.decls);
                cx.add(
                    InstructionKind::CheckNotNull {
                        problem: NullabilityProblem::Unboxing,
                        transfer,
                    },
                    None,
                )?;
                cx.add(
                    InstructionKind::Unwrap {
                        field: SpecialField::Unbox,
                    },
                    None,
                )?;
                // `Object` unboxed to `int` is assumed to hold an `Integer`
                let wrapped = from.wrapped_primitive().unwrap_or(*target);
                if wrapped != *target {
                    cx.add(InstructionKind::PrimitiveConversion { to: *target }, None)?;
                }
            }
            (Ty::Primitive(source), _) => {
                // allocation of the wrapper may fail
                self.add_conditional_error_throw(cx)?;
                let prim = match to.wrapped_primitive() {
                    Some(wrapped) if wrapped != *source => {
                        cx.add(InstructionKind::PrimitiveConversion { to: wrapped }, None)?;
                        wrapped
                    }
                    _ => *source,
                };
                cx.add(
                    InstructionKind::Wrap {
                        ty: Ty::boxed_of(prim),
                        field: SpecialField::Unbox,
                    },
                    None,
                )?;
            }
            _ => {}
        }
        Ok(())
    }
}
