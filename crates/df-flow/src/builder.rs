//! Fluent emission façade shared by the analyzer and the call inliners.
//!
//! Regions opened by `if_condition_is`, `else_branch`, `do_try`, `catch_all`
//! and `loop_over` are closed by `end`, strictly last-opened-first. An
//! unbalanced `end` is a defect of the calling strategy and panics.

use crate::analyzer::ControlFlowAnalyzer;
use crate::context::FlowContext;
use crate::inst::{Anchor, InstructionKind, NullabilityProblem, PushValue};
use crate::offset::ControlFlowOffset;
use crate::place::{PlaceValue, SpecialField, StablePlace};
use crate::trap::{Trap, TrapKind};
use df_core::ast::{Declarations, Expr, ExprKind, MethodId, MethodRefKind, NodeId, Ty};
use df_core::config::FlowOptions;
use df_core::types::{Constant, DfType, Nullability, RelationType};
use df_core::Result;

/// Back-patch obligation of an open region.
#[derive(Debug, Clone)]
pub(crate) enum PendingBranch {
    /// Jump taken when the condition fails lands after the region.
    Condition { skip: ControlFlowOffset },
    /// The then-part jumps over the else-part.
    Else { end: ControlFlowOffset },
    /// Protected region under a catch-all trap.
    Try {
        anchor: NodeId,
        handler: ControlFlowOffset,
    },
    /// Catch-all handler; normal completion of the protected region jumps past it.
    Handler { end: ControlFlowOffset },
    /// Body of `loop_over`.
    Loop {
        head: ControlFlowOffset,
        exit: ControlFlowOffset,
        sentinel: bool,
    },
}

pub struct CfgBuilder<'b, 'a> {
    analyzer: &'b ControlFlowAnalyzer<'a>,
    cx: &'b mut FlowContext<'a>,
}

impl<'b, 'a> CfgBuilder<'b, 'a> {
    pub fn new(analyzer: &'b ControlFlowAnalyzer<'a>, cx: &'b mut FlowContext<'a>) -> Self {
        Self { analyzer, cx }
    }

    pub fn decls(&self) -> &'a Declarations {
        self.analyzer.decls()
    }

    pub fn options(&self) -> &FlowOptions {
        self.analyzer.options()
    }

    /// Number of regions currently open.
    pub fn branch_depth(&self) -> usize {
        self.cx.branches.len()
    }

    pub fn instruction_count(&self) -> usize {
        self.cx.flow.instruction_count()
    }

    fn add(&mut self, kind: InstructionKind) -> Result<&mut Self> {
        self.cx.add(kind, None)?;
        Ok(self)
    }

    pub fn push(&mut self, value: DfType) -> Result<&mut Self> {
        self.add(InstructionKind::Push {
            value: PushValue::Value(value),
            for_write: false,
        })
    }

    pub fn push_anchored(&mut self, value: DfType, anchor: &Expr) -> Result<&mut Self> {
        self.cx.add(
            InstructionKind::Push {
                value: PushValue::Value(value),
                for_write: false,
            },
            Some(Anchor::Expr(anchor.id)),
        )?;
        Ok(self)
    }

    pub fn push_unknown(&mut self) -> Result<&mut Self> {
        self.push(DfType::Top)
    }

    pub fn push_null(&mut self) -> Result<&mut Self> {
        self.push(DfType::null())
    }

    pub fn push_constant(&mut self, value: Constant) -> Result<&mut Self> {
        self.push(DfType::Constant(value))
    }

    pub fn push_place(&mut self, place: &PlaceValue) -> Result<&mut Self> {
        self.add(InstructionKind::Push {
            value: PushValue::Place(place.clone()),
            for_write: false,
        })
    }

    pub fn push_for_write(&mut self, place: &PlaceValue) -> Result<&mut Self> {
        self.add(InstructionKind::Push {
            value: PushValue::Place(place.clone()),
            for_write: true,
        })
    }

    /// Evaluate `expr` through the analyzer.
    pub fn push_expression(&mut self, expr: &'a Expr) -> Result<&mut Self> {
        self.analyzer.visit_expr(self.cx, expr)?;
        Ok(self)
    }

    /// Evaluate `expr` and check it against null, reporting `problem` on failure.
    pub fn push_expression_checked(
        &mut self,
        expr: &'a Expr,
        problem: NullabilityProblem,
    ) -> Result<&mut Self> {
        self.analyzer.visit_expr(self.cx, expr)?;
        self.analyzer.add_null_check(self.cx, expr.id, problem)?;
        Ok(self)
    }

    pub fn pop(&mut self) -> Result<&mut Self> {
        self.add(InstructionKind::Pop)
    }

    pub fn dup(&mut self) -> Result<&mut Self> {
        self.add(InstructionKind::Dup)
    }

    pub fn swap(&mut self) -> Result<&mut Self> {
        self.add(InstructionKind::Swap)
    }

    /// Pop `count` values and push back the listed ones; index 0 is the former top.
    pub fn splice(&mut self, count: usize, replacement: Vec<usize>) -> Result<&mut Self> {
        self.add(InstructionKind::Splice { count, replacement })
    }

    /// Convert the top value from the static type of `expr` to `expected`.
    pub fn box_unbox(&mut self, expr: &Expr, expected: &Ty) -> Result<&mut Self> {
        self.analyzer.box_unbox(self.cx, &expr.ty, expected)?;
        Ok(self)
    }

    pub fn convert(&mut self, from: &Ty, to: &Ty) -> Result<&mut Self> {
        self.analyzer.box_unbox(self.cx, from, to)?;
        Ok(self)
    }

    pub fn compare(&mut self, relation: RelationType) -> Result<&mut Self> {
        self.add(InstructionKind::BooleanBinary { relation })
    }

    pub fn not(&mut self) -> Result<&mut Self> {
        self.add(InstructionKind::Not)
    }

    pub fn unwrap(&mut self, field: SpecialField) -> Result<&mut Self> {
        self.add(InstructionKind::Unwrap { field })
    }

    pub fn wrap(&mut self, ty: Ty, field: SpecialField) -> Result<&mut Self> {
        self.add(InstructionKind::Wrap { ty, field })
    }

    /// Open a region entered when the top boolean equals `value`.
    pub fn if_condition_is(&mut self, value: bool) -> Result<&mut Self> {
        let skip = self.cx.flow.defer();
        self.add(InstructionKind::ConditionalGoto {
            target: skip,
            compare: DfType::boolean(!value),
        })?;
        self.cx.branches.push(PendingBranch::Condition { skip });
        Ok(self)
    }

    /// Compare the two top values and open a region entered when the relation holds.
    pub fn if_condition(&mut self, relation: RelationType) -> Result<&mut Self> {
        self.compare(relation)?.if_condition_is(true)
    }

    pub fn if_null(&mut self) -> Result<&mut Self> {
        self.push_null()?.if_condition(RelationType::Eq)
    }

    pub fn if_not_null(&mut self) -> Result<&mut Self> {
        self.push_null()?.if_condition(RelationType::Ne)
    }

    /// Close the latest conditional region and open its else part.
    pub fn else_branch(&mut self) -> Result<&mut Self> {
        let skip = match self.cx.branches.pop() {
            Some(PendingBranch::Condition { skip }) => skip,
            other => panic!("assertion failed: else_branch() after {other:?}"),
        };
        let end = self.cx.flow.defer();
        self.add(InstructionKind::Goto { target: end })?;
        self.cx.flow.bind_here(skip);
        self.cx.branches.push(PendingBranch::Else { end });
        Ok(self)
    }

    /// Open a region protected by a catch-all trap anchored at `anchor`.
    pub fn do_try(&mut self, anchor: NodeId) -> Result<&mut Self> {
        let handler = self.cx.flow.defer();
        self.cx.traps.push(Trap::new(
            anchor,
            TrapKind::TryCatchAll { target: handler },
        ));
        self.cx.branches.push(PendingBranch::Try { anchor, handler });
        Ok(self)
    }

    /// Close the protected region and open its handler.
    pub fn catch_all(&mut self) -> Result<&mut Self> {
        let (anchor, handler) = match self.cx.branches.pop() {
            Some(PendingBranch::Try { anchor, handler }) => (anchor, handler),
            other => panic!("assertion failed: catch_all() after {other:?}"),
        };
        self.cx.traps.pop(anchor);
        let end = self.cx.flow.defer();
        self.add(InstructionKind::Goto { target: end })?;
        self.cx.flow.bind_here(handler);
        self.cx.branches.push(PendingBranch::Handler { end });
        Ok(self)
    }

    /// Close the most recently opened region.
    pub fn end(&mut self) -> Result<&mut Self> {
        let branch = self.cx.branches.pop();
        assert_expr!(branch.is_some(), "end() without an open region");
        match branch {
            Some(PendingBranch::Condition { skip }) => self.cx.flow.bind_here(skip),
            Some(PendingBranch::Else { end }) | Some(PendingBranch::Handler { end }) => {
                self.cx.flow.bind_here(end)
            }
            Some(PendingBranch::Try { anchor, handler }) => {
                self.cx.traps.pop(anchor);
                self.cx.flow.bind_here(handler);
            }
            Some(PendingBranch::Loop {
                head,
                exit,
                sentinel,
            }) => {
                self.add(InstructionKind::Goto { target: head })?;
                self.cx.flow.bind_here(exit);
                if sentinel {
                    self.add(InstructionKind::Pop)?;
                }
            }
            None => {}
        }
        Ok(self)
    }

    /// Pop value and destination (pushed for write), store, keep the value.
    pub fn assign(&mut self) -> Result<&mut Self> {
        self.add(InstructionKind::Assign { target: None })
    }

    /// Store the top value into `place`, keeping it on the stack.
    pub fn assign_to(&mut self, place: &PlaceValue) -> Result<&mut Self> {
        self.add(InstructionKind::SimpleAssign {
            target: place.clone(),
        })
    }

    /// Evaluate `value`, convert it to `expected` and store it into `place`.
    pub fn assign_expression(
        &mut self,
        place: &PlaceValue,
        value: &'a Expr,
        expected: &Ty,
    ) -> Result<&mut Self> {
        self.push_for_write(place)?;
        self.push_expression(value)?;
        self.box_unbox(value, expected)?;
        self.add(InstructionKind::Assign {
            target: Some(place.clone()),
        })?;
        self.pop()
    }

    pub fn assign_place(&mut self, place: &PlaceValue, value: &PlaceValue) -> Result<&mut Self> {
        self.push_for_write(place)?;
        self.push_place(value)?;
        self.add(InstructionKind::Assign {
            target: Some(place.clone()),
        })?;
        self.pop()
    }

    /// Evaluate every element and store "any of them" into `target` in one step.
    pub fn assign_any_of(
        &mut self,
        elements: &'a [Expr],
        target: &PlaceValue,
        expected: &Ty,
    ) -> Result<&mut Self> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            self.push_expression(element)?;
            self.box_unbox(element, expected)?;
            self.pop()?;
            values.push(
                self.analyzer
                    .fold_constant(self.cx, element)
                    .map(DfType::Constant)
                    .unwrap_or(DfType::Top),
            );
        }
        let common = widen_elements(&values, expected);
        self.assign_and_pop(target, common)
    }

    pub fn assign_and_pop(&mut self, place: &PlaceValue, value: DfType) -> Result<&mut Self> {
        self.push_for_write(place)?;
        self.push(value)?;
        self.add(InstructionKind::Assign {
            target: Some(place.clone()),
        })?;
        self.pop()
    }

    pub fn flush(&mut self, place: &PlaceValue) -> Result<&mut Self> {
        self.add(InstructionKind::Flush {
            place: place.clone(),
        })
    }

    pub fn create_temp(&mut self, ty: Ty) -> PlaceValue {
        self.cx.create_temp(ty)
    }

    pub fn place(&self, place: StablePlace) -> PlaceValue {
        self.cx.place(place)
    }

    pub fn check_not_null(&mut self, problem: NullabilityProblem) -> Result<&mut Self> {
        let transfer = self
            .cx
            .check_transfer(df_core::ast::NULL_POINTER_EXCEPTION, self.decls());
        self.add(InstructionKind::CheckNotNull { problem, transfer })
    }

    /// Check `top <relation> compare`, raising `exception` when it fails.
    pub fn ensure(
        &mut self,
        relation: RelationType,
        compare: DfType,
        exception: &str,
        message: &str,
    ) -> Result<&mut Self> {
        let transfer = self.cx.check_transfer(exception, self.decls());
        self.add(InstructionKind::Ensure {
            relation,
            compare,
            transfer,
            message: message.to_string(),
        })
    }

    pub fn throw(&mut self, exception: &str) -> Result<&mut Self> {
        let transfer = self.cx.exception_transfer(exception, self.decls());
        self.add(InstructionKind::Throw { transfer })
    }

    /// Pop `arg_count` values and push an unknown value of type `ty`.
    pub fn eval_unknown(&mut self, arg_count: usize, ty: Ty) -> Result<&mut Self> {
        self.add(InstructionKind::EvalUnknown { arg_count, ty })
    }

    pub fn result_of(&mut self, anchor: &Expr) -> Result<&mut Self> {
        self.cx
            .add(InstructionKind::ResultOf, Some(Anchor::Expr(anchor.id)))?;
        Ok(self)
    }

    /// Opaque call of a resolved method, followed by its exception checks.
    pub fn call(&mut self, method: MethodId, arg_count: usize, receiver: bool) -> Result<&mut Self> {
        let decl = self.decls().method(method);
        let result = if decl.is_constructor {
            DfType::not_null(Ty::class(decl.class_name.clone()))
        } else {
            DfType::from_ty(&decl.return_ty)
        };
        self.add(InstructionKind::Call {
            method: Some(method),
            arg_count,
            receiver,
            result,
            precalculated: None,
        })?;
        self.analyzer.add_method_throws(self.cx, Some(method))?;
        Ok(self)
    }

    /// First half of calling a functional value: evaluate what must be evaluated before
    /// the arguments. Lambdas are deferred to `invoke_function`; bound method reference
    /// qualifiers are stored in a temp.
    pub fn evaluate_function(&mut self, function: &'a Expr) -> Result<&mut Self> {
        let stripped = function.strip_parens();
        match &stripped.kind {
            ExprKind::Lambda(_) => Ok(self),
            ExprKind::MethodRef(method_ref) => {
                if let (MethodRefKind::Bound, Some(qualifier)) =
                    (method_ref.kind, method_ref.qualifier.as_deref())
                {
                    let binding = self.create_temp(qualifier.ty.clone());
                    self.push_for_write(&binding)?;
                    self.push_expression_checked(qualifier, NullabilityProblem::CallReceiver)?;
                    self.assign()?.pop()?;
                    self.cx.method_ref_qualifiers.insert(stripped.id, binding);
                }
                Ok(self)
            }
            _ => self
                .push_expression_checked(function, NullabilityProblem::CallReceiver)?
                .pop(),
        }
    }

    /// Second half: consume `arg_count` arguments and push the function's result.
    pub fn invoke_function(
        &mut self,
        arg_count: usize,
        function: &'a Expr,
        result_nullability: Nullability,
    ) -> Result<&mut Self> {
        let stripped = function.strip_parens();
        match &stripped.kind {
            ExprKind::Lambda(lambda) => {
                if self.analyzer.inline_lambda(
                    self.cx,
                    stripped,
                    lambda,
                    arg_count,
                    result_nullability == Nullability::NotNull,
                )? {
                    return Ok(self);
                }
            }
            ExprKind::MethodRef(method_ref) => {
                if let Some(method) = method_ref.method {
                    if self.inline_method_reference(stripped.id, method_ref.kind, method, arg_count)? {
                        return Ok(self);
                    }
                }
            }
            _ => {}
        }
        self.eval_unknown(arg_count, Ty::Unknown)?;
        self.analyzer.add_method_throws(self.cx, None)?;
        Ok(self)
    }

    fn inline_method_reference(
        &mut self,
        node: NodeId,
        kind: MethodRefKind,
        method: MethodId,
        arg_count: usize,
    ) -> Result<bool> {
        let decl = self.decls().method(method);
        match kind {
            MethodRefKind::Static | MethodRefKind::Constructor => {
                if decl.params.len() != arg_count {
                    return Ok(false);
                }
                self.call(method, arg_count, false)?;
            }
            MethodRefKind::Unbound => {
                if arg_count == 0 || decl.params.len() != arg_count - 1 {
                    return Ok(false);
                }
                self.call(method, arg_count - 1, true)?;
            }
            MethodRefKind::Bound => {
                let Some(binding) = self.cx.method_ref_qualifiers.get(&node).cloned() else {
                    return Ok(false);
                };
                if decl.params.len() != arg_count {
                    return Ok(false);
                }
                self.push_place(&binding)?;
                let mut order = vec![0];
                order.extend((1..=arg_count).rev());
                self.splice(arg_count + 1, order)?;
                self.call(method, arg_count, true)?;
            }
        }
        Ok(true)
    }

    /// Iterate `target` over the values of `elements`.
    ///
    /// Short lists unroll into a sentinel-terminated cascade, longer ones assign
    /// the join of all element values once and loop an unknown number of times.
    /// The loop body follows; `end` closes it. The cascade keeps the remaining
    /// elements on the stack while the body runs, so the body must not leave the
    /// region through a control transfer.
    pub fn loop_over(
        &mut self,
        elements: &'a [Expr],
        target: &PlaceValue,
        expected: &Ty,
    ) -> Result<&mut Self> {
        let exit = self.cx.flow.defer();
        if elements.len() > self.analyzer.options().max_unroll {
            self.assign_any_of(elements, target, expected)?;
            let head = self.cx.flow.here();
            self.push_unknown()?;
            self.add(InstructionKind::ConditionalGoto {
                target: exit,
                compare: DfType::boolean(true),
            })?;
            self.cx.branches.push(PendingBranch::Loop {
                head,
                exit,
                sentinel: false,
            });
            return Ok(self);
        }
        self.push(DfType::Sentinel)?;
        for element in elements {
            self.push_expression(element)?;
            self.box_unbox(element, expected)?;
        }
        self.splice(elements.len(), (0..elements.len()).collect())?;
        let head = self.cx.flow.here();
        self.dup()?;
        self.push(DfType::Sentinel)?;
        self.compare(RelationType::Eq)?;
        self.add(InstructionKind::ConditionalGoto {
            target: exit,
            compare: DfType::boolean(true),
        })?;
        self.push_for_write(target)?;
        self.swap()?;
        self.add(InstructionKind::Assign {
            target: Some(target.clone()),
        })?;
        self.pop()?;
        self.cx.branches.push(PendingBranch::Loop {
            head,
            exit,
            sentinel: true,
        });
        Ok(self)
    }
}

/// "Any of these values": the exact set when every element is a constant, the
/// static type otherwise.
fn widen_elements(values: &[DfType], expected: &Ty) -> DfType {
    let mut constants: Vec<Constant> = Vec::with_capacity(values.len());
    for value in values {
        match value.as_constant() {
            Some(constant) if !constants.contains(constant) => constants.push(constant.clone()),
            Some(_) => {}
            None => return DfType::from_ty(expected),
        }
    }
    if constants.is_empty() {
        return DfType::from_ty(expected);
    }
    DfType::AnyOf(constants)
}
