//! Expression translation.
//!
//! Every expression leaves exactly one value on the stack. Constant-foldable
//! subtrees collapse to a single push; stable places are pushed as places so
//! that later reads of the same place share the value.

use super::ControlFlowAnalyzer;
use crate::builder::CfgBuilder;
use crate::context::FlowContext;
use crate::inst::{Anchor, InstructionKind, NullabilityProblem, NumericOp, PushValue};
use crate::place::{PlaceValue, StablePlace};
use df_core::ast::{
    BinaryOp, CallExpr, Expr, ExprKind, MethodId, NewExpr, PrimitiveTy, Ty, UnaryOp, VarId,
    ARITHMETIC_EXCEPTION, ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, CLASS_CAST_EXCEPTION,
    NEGATIVE_ARRAY_SIZE_EXCEPTION,
};
use df_core::types::{Constant, DfType, RelationType};
use df_core::Result;

impl<'a> ControlFlowAnalyzer<'a> {
    pub(crate) fn visit_expr(&self, cx: &mut FlowContext<'a>, expr: &'a Expr) -> Result<()> {
        if let ExprKind::Binary { .. }
        | ExprKind::Unary { .. }
        | ExprKind::Cast { .. }
        | ExprKind::Conditional { .. } = &expr.kind
        {
            if let Some(value) = self.fold_constant(cx, expr) {
                return self.push_value(cx, PushValue::Value(DfType::Constant(value)), Some(expr));
            }
        }
        match &expr.kind {
            ExprKind::Literal(value) => {
                self.push_value(cx, PushValue::Value(DfType::Constant(value.clone())), Some(expr))?
            }
            ExprKind::Local(var) => self.push_place(cx, StablePlace::Var(*var), Some(expr))?,
            ExprKind::This => self.push_place(cx, StablePlace::This, Some(expr))?,
            ExprKind::ClassLiteral(ty) => self.push_value(
                cx,
                PushValue::Value(DfType::Constant(Constant::Class(ty.clone()))),
                Some(expr),
            )?,
            ExprKind::Field { qualifier, field } => {
                self.visit_field(cx, expr, qualifier.as_deref(), *field)?
            }
            ExprKind::ArrayAccess { array, index } => {
                self.visit_expr(cx, array)?;
                self.add_null_check(cx, array.id, NullabilityProblem::ArrayAccess)?;
                self.visit_expr(cx, index)?;
                self.box_unbox(cx, &index.ty, &Ty::INT)?;
                let transfer = cx.check_transfer(ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, self.decls);
                let element = self.resolve(cx, expr).map(|place| cx.place(place));
                cx.add(
                    InstructionKind::ArrayAccess { transfer, element },
                    Some(Anchor::Expr(expr.id)),
                )?;
            }
            ExprKind::ArrayInit { element, elements } => {
                let temp = cx.create_temp(expr.ty.clone());
                self.init_array(cx, &temp, &expr.ty, element, elements)?;
                self.push_value(cx, PushValue::Place(temp), Some(expr))?;
            }
            ExprKind::NewArray { dims, init, .. } => self.visit_new_array(cx, expr, dims, init.as_deref())?,
            ExprKind::New(new) => self.visit_new(cx, expr, new)?,
            ExprKind::Call(call) => self.visit_call(cx, expr, call)?,
            ExprKind::Lambda(lambda) => self.visit_lambda(cx, expr, lambda)?,
            ExprKind::MethodRef(method_ref) => self.visit_method_ref(cx, expr, method_ref)?,
            ExprKind::Assign { op, target, value } => {
                self.visit_assign(cx, expr, *op, target, value)?
            }
            ExprKind::Binary { op, operands } => self.visit_binary(cx, expr, *op, operands)?,
            ExprKind::Unary { op, operand } => self.visit_unary(cx, expr, *op, operand)?,
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => self.visit_conditional(cx, expr, cond, then, otherwise)?,
            ExprKind::InstanceOf { operand, check } => {
                self.visit_instance_of(cx, expr, operand, check)?
            }
            ExprKind::Cast { ty, operand } => self.visit_cast(cx, expr, ty, operand)?,
            ExprKind::Switch(switch) => self.visit_switch_expression(cx, expr, switch)?,
            ExprKind::Paren(inner) => self.visit_expr(cx, inner)?,
            ExprKind::Error => unsupported!(expr.id, "malformed expression"),
        }
        Ok(())
    }

    fn visit_field(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        qualifier: Option<&'a Expr>,
        field: VarId,
    ) -> Result<()> {
        let decl = self.decls.var(field);
        let constant = self.resolver.field_constant(field, cx.init_scope);
        if constant.is_some() || decl.is_static_field() {
            // the qualifier of a static access is evaluated only for its side effects
            if let Some(qualifier) = qualifier.filter(|q| self.resolve(cx, q).is_none()) {
                self.visit_expr(cx, qualifier)?;
                self.pop(cx)?;
            }
            return match constant {
                Some(value) => {
                    self.push_value(cx, PushValue::Value(DfType::Constant(value)), Some(expr))
                }
                None => self.push_place(cx, StablePlace::field(None, field), Some(expr)),
            };
        }
        if let Some(qualifier) = qualifier {
            self.visit_expr(cx, qualifier)?;
            self.add_null_check(cx, qualifier.id, NullabilityProblem::FieldAccess)?;
            self.pop(cx)?;
        }
        match self.resolve(cx, expr) {
            Some(place) => self.push_place(cx, place, Some(expr)),
            None => self.push_value(cx, PushValue::Value(DfType::from_ty(&expr.ty)), Some(expr)),
        }
    }

    /// Store a freshly allocated array into `target` and write its elements.
    pub(crate) fn init_array(
        &self,
        cx: &mut FlowContext<'a>,
        target: &PlaceValue,
        array_ty: &Ty,
        element_ty: &Ty,
        elements: &'a [Expr],
    ) -> Result<()> {
        self.push_for_write(cx, target)?;
        self.push_value(cx, PushValue::Value(DfType::not_null(array_ty.clone())), None)?;
        cx.add(
            InstructionKind::Assign {
                target: Some(target.clone()),
            },
            None,
        )?;
        self.pop(cx)?;
        for (index, element) in elements.iter().enumerate() {
            if index < self.options.max_array_index_for_initializer {
                let slot = cx.place(StablePlace::ArrayElement {
                    array: Box::new(target.place.clone()),
                    index: index as u32,
                });
                self.push_for_write(cx, &slot)?;
                self.visit_expr(cx, element)?;
                self.box_unbox(cx, &element.ty, element_ty)?;
                cx.add(InstructionKind::Assign { target: Some(slot) }, None)?;
            } else {
                self.push_value(cx, PushValue::Place(target.clone()), None)?;
                self.push_value(cx, PushValue::Value(DfType::int(index as i32)), None)?;
                self.visit_expr(cx, element)?;
                self.box_unbox(cx, &element.ty, element_ty)?;
                cx.add(
                    InstructionKind::ArrayStore {
                        transfer: None,
                        element: None,
                    },
                    None,
                )?;
            }
            self.pop(cx)?;
        }
        Ok(())
    }

    fn visit_new_array(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        dims: &'a [Expr],
        init: Option<&'a Expr>,
    ) -> Result<()> {
        if let Some(init) = init {
            self.visit_expr(cx, init)?;
            cx.add(InstructionKind::ResultOf, Some(Anchor::Expr(expr.id)))?;
            return Ok(());
        }
        for dim in dims {
            self.visit_expr(cx, dim)?;
            self.box_unbox(cx, &dim.ty, &Ty::INT)?;
            self.ensure(
                cx,
                RelationType::Ge,
                DfType::int(0),
                NEGATIVE_ARRAY_SIZE_EXCEPTION,
                "negative array size",
            )?;
            self.pop(cx)?;
        }
        self.push_value(cx, PushValue::Value(DfType::not_null(expr.ty.clone())), Some(expr))
    }

    fn visit_new(&self, cx: &mut FlowContext<'a>, expr: &'a Expr, new: &'a NewExpr) -> Result<()> {
        if let Some(qualifier) = &new.qualifier {
            self.visit_expr(cx, qualifier)?;
            self.add_null_check(cx, qualifier.id, NullabilityProblem::CallReceiver)?;
            self.pop(cx)?;
        }
        let arg_count = self.visit_arguments(cx, new.ctor, &new.args)?;
        if let Some(body) = &new.body {
            self.visit_class_closure(cx, body)?;
        }
        cx.add(
            InstructionKind::Call {
                method: new.ctor,
                arg_count,
                receiver: false,
                result: DfType::not_null(new.class.clone()),
                precalculated: None,
            },
            Some(Anchor::Expr(expr.id)),
        )?;
        self.add_method_throws(cx, new.ctor)
    }

    /// Push the arguments of a call converted to the parameter types; variable
    /// arity arguments are folded into one array. Returns the number of values pushed.
    fn visit_arguments(
        &self,
        cx: &mut FlowContext<'a>,
        method: Option<MethodId>,
        args: &'a [Expr],
    ) -> Result<usize> {
        let Some(decl) = method.map(|m| self.decls.method(m)) else {
            for arg in args {
                self.visit_expr(cx, arg)?;
            }
            return Ok(args.len());
        };
        let fixed = if decl.varargs {
            decl.params.len().saturating_sub(1)
        } else {
            decl.params.len()
        };
        let passes_array = args.len() == decl.params.len()
            && args
                .last()
                .is_some_and(|arg| arg.ty.is_array() || arg.ty == Ty::Null);
        let spread = decl.varargs && !passes_array;
        for (index, arg) in args.iter().enumerate() {
            self.visit_expr(cx, arg)?;
            let expected = if spread && index >= fixed {
                decl.params.last().and_then(Ty::element)
            } else {
                decl.params.get(index)
            };
            if let Some(expected) = expected {
                self.box_unbox(cx, &arg.ty, expected)?;
            }
        }
        if !spread {
            return Ok(args.len());
        }
        let count = args.len().saturating_sub(fixed);
        let ty = decl.params.last().cloned().unwrap_or(Ty::Unknown);
        cx.add(InstructionKind::FoldArray { count, ty }, None)?;
        Ok(fixed + 1)
    }

    fn visit_call(&self, cx: &mut FlowContext<'a>, expr: &'a Expr, call: &'a CallExpr) -> Result<()> {
        if self.try_inliners(cx, expr, call)? {
            return Ok(());
        }
        // `a.b().c().d()` is emitted innermost first without recursing once per link
        let mut chain = vec![(expr, call)];
        let mut current = call;
        while let Some(qualifier) = current.qualifier.as_deref() {
            match &qualifier.kind {
                ExprKind::Call(inner) if !self.may_inline(inner) => {
                    chain.push((qualifier, inner));
                    current = inner;
                }
                _ => break,
            }
        }
        let innermost = chain.len() - 1;
        for (depth, (expr, call)) in chain.into_iter().enumerate().rev() {
            self.emit_call(cx, expr, call, depth != innermost)?;
        }
        Ok(())
    }

    fn emit_call(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        call: &'a CallExpr,
        qualifier_on_stack: bool,
    ) -> Result<()> {
        let decl = call.method.map(|m| self.decls.method(m));
        let is_static = decl.is_some_and(|d| d.is_static);
        let receiver = match call.qualifier.as_deref() {
            Some(qualifier) => {
                if !qualifier_on_stack {
                    self.visit_expr(cx, qualifier)?;
                }
                if is_static {
                    self.pop(cx)?;
                    false
                } else {
                    self.add_null_check(cx, qualifier.id, NullabilityProblem::CallReceiver)?;
                    true
                }
            }
            None if is_static || decl.is_none() => false,
            None => {
                self.push_place(cx, StablePlace::This, None)?;
                true
            }
        };
        let arg_count = self.visit_arguments(cx, call.method, &call.args)?;
        let precalculated = self
            .resolve(cx, expr)
            .filter(|place| place.as_constant().is_none())
            .map(|place| cx.place(place));
        let result = match decl {
            Some(decl) => DfType::from_ty(&decl.return_ty),
            None => DfType::from_ty(&expr.ty),
        };
        cx.add(
            InstructionKind::Call {
                method: call.method,
                arg_count,
                receiver,
                result,
                precalculated,
            },
            Some(Anchor::Expr(expr.id)),
        )?;
        self.add_method_throws(cx, call.method)
    }

    /// Offer the call to every inliner in order; the first one that accepts emits it.
    fn try_inliners(&self, cx: &mut FlowContext<'a>, expr: &'a Expr, call: &'a CallExpr) -> Result<bool> {
        if !self.options.inline_calls {
            return Ok(false);
        }
        for inliner in self.inliners {
            if !inliner.may_inline(call, self.decls) {
                continue;
            }
            let depth = cx.branches.len();
            let before = cx.flow.instruction_count();
            let inlined = inliner.try_inline(&mut CfgBuilder::new(self, cx), expr)?;
            assert_expr!(
                cx.branches.len() == depth,
                "inliner {} left the region stack at depth {} instead of {}",
                inliner.name(),
                cx.branches.len(),
                depth
            );
            if inlined {
                trace!(inliner = inliner.name(), node = %expr.id, "call inlined");
                cx.add(InstructionKind::ResultOf, Some(Anchor::Expr(expr.id)))?;
                return Ok(true);
            }
            assert_expr!(
                cx.flow.instruction_count() == before,
                "inliner {} emitted instructions and then declined",
                inliner.name()
            );
        }
        Ok(false)
    }

    fn may_inline(&self, call: &CallExpr) -> bool {
        self.options.inline_calls
            && self
                .inliners
                .iter()
                .any(|inliner| inliner.may_inline(call, self.decls))
    }

    fn visit_assign(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        op: Option<BinaryOp>,
        target: &'a Expr,
        value: &'a Expr,
    ) -> Result<()> {
        let target = target.strip_parens();
        if let ExprKind::ArrayAccess { array, index } = &target.kind {
            if self.resolve(cx, target).is_none() {
                return self.visit_array_store(cx, expr, op, target, array, index, value);
            }
        }
        let place = self.assign_target(cx, target)?;
        let destination = match &place {
            Some(place) => PushValue::Place(place.clone()),
            None => PushValue::Value(DfType::Top),
        };
        cx.add(
            InstructionKind::Push {
                value: destination,
                for_write: true,
            },
            None,
        )?;
        match op {
            None => {
                self.visit_expr(cx, value)?;
                self.box_unbox(cx, &value.ty, &target.ty)?;
            }
            Some(op) => {
                let current = match &place {
                    Some(place) => PushValue::Place(place.clone()),
                    None => PushValue::Value(DfType::from_ty(&target.ty)),
                };
                self.push_value(cx, current, None)?;
                let result_ty = self.binary_step(cx, op, &target.ty, value, None)?;
                self.box_unbox(cx, &result_ty, &target.ty)?;
            }
        }
        cx.add(
            InstructionKind::Assign { target: place },
            Some(Anchor::Expr(expr.id)),
        )?;
        Ok(())
    }

    /// Store into an array element whose index is not a constant.
    #[allow(clippy::too_many_arguments)]
    fn visit_array_store(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        op: Option<BinaryOp>,
        target: &'a Expr,
        array: &'a Expr,
        index: &'a Expr,
        value: &'a Expr,
    ) -> Result<()> {
        self.visit_expr(cx, array)?;
        self.add_null_check(cx, array.id, NullabilityProblem::ArrayAccess)?;
        self.visit_expr(cx, index)?;
        self.box_unbox(cx, &index.ty, &Ty::INT)?;
        match op {
            None => {
                self.visit_expr(cx, value)?;
                self.box_unbox(cx, &value.ty, &target.ty)?;
            }
            Some(op) => {
                cx.add(
                    InstructionKind::Splice {
                        count: 2,
                        replacement: vec![1, 0, 1, 0],
                    },
                    None,
                )?;
                let transfer = cx.check_transfer(ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, self.decls);
                cx.add(
                    InstructionKind::ArrayAccess {
                        transfer,
                        element: None,
                    },
                    None,
                )?;
                let result_ty = self.binary_step(cx, op, &target.ty, value, None)?;
                self.box_unbox(cx, &result_ty, &target.ty)?;
            }
        }
        let transfer = cx.check_transfer(ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, self.decls);
        cx.add(
            InstructionKind::ArrayStore {
                transfer,
                element: None,
            },
            Some(Anchor::Expr(expr.id)),
        )?;
        Ok(())
    }

    /// Evaluate what an assignment target needs evaluated and return the place written.
    fn assign_target(&self, cx: &mut FlowContext<'a>, target: &'a Expr) -> Result<Option<PlaceValue>> {
        let place = match &target.kind {
            ExprKind::Local(var) => Some(StablePlace::Var(*var)),
            ExprKind::Field { qualifier, field } => {
                if self.decls.var(*field).is_static_field() {
                    if let Some(qualifier) = qualifier.as_deref().filter(|q| self.resolve(cx, q).is_none()) {
                        self.visit_expr(cx, qualifier)?;
                        self.pop(cx)?;
                    }
                    Some(StablePlace::field(None, *field))
                } else {
                    let qualifier = match qualifier.as_deref() {
                        None => Some(StablePlace::This),
                        Some(qualifier) => {
                            self.visit_expr(cx, qualifier)?;
                            self.add_null_check(cx, qualifier.id, NullabilityProblem::FieldAccess)?;
                            self.pop(cx)?;
                            self.resolve(cx, qualifier)
                                .filter(|place| place.as_constant().is_none())
                        }
                    };
                    qualifier.map(|q| StablePlace::field(Some(q), *field))
                }
            }
            ExprKind::ArrayAccess { array, index } => {
                let element = self.resolve(cx, target);
                self.visit_expr(cx, array)?;
                self.add_null_check(cx, array.id, NullabilityProblem::ArrayAccess)?;
                self.pop(cx)?;
                if element.is_none() {
                    self.visit_expr(cx, index)?;
                    self.pop(cx)?;
                }
                element
            }
            _ => {
                self.visit_expr(cx, target)?;
                self.pop(cx)?;
                None
            }
        };
        Ok(place.map(|place| cx.place(place)))
    }

    fn visit_binary(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        op: BinaryOp,
        operands: &'a [Expr],
    ) -> Result<()> {
        if op.is_short_circuit() {
            return self.visit_short_circuit(cx, expr, op == BinaryOp::OrOr, operands);
        }
        let Some((first, rest)) = operands.split_first() else {
            unsupported!(expr.id, "binary expression without operands");
        };
        self.visit_expr(cx, first)?;
        let mut acc = first.ty.clone();
        for (offset, operand) in rest.iter().enumerate() {
            let last_operand = offset + 1;
            let anchor = if last_operand == operands.len() - 1 {
                Anchor::Expr(expr.id)
            } else {
                Anchor::PolyadicPart {
                    node: expr.id,
                    last_operand,
                }
            };
            acc = self.binary_step(cx, op, &acc, operand, Some(anchor))?;
        }
        if rest.is_empty() {
            cx.add(InstructionKind::ResultOf, Some(Anchor::Expr(expr.id)))?;
        }
        Ok(())
    }

    /// `a && b && c`: every operand but the last jumps to a shared push of the
    /// short-circuit value; the last operand is the result otherwise.
    fn visit_short_circuit(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        is_or: bool,
        operands: &'a [Expr],
    ) -> Result<()> {
        let short_circuit = cx.flow.defer();
        let end = cx.flow.defer();
        for (index, operand) in operands.iter().enumerate() {
            self.visit_condition(cx, operand)?;
            if index + 1 < operands.len() {
                cx.add(
                    InstructionKind::ConditionalGoto {
                        target: short_circuit,
                        compare: DfType::boolean(is_or),
                    },
                    None,
                )?;
            }
        }
        cx.add(InstructionKind::Goto { target: end }, None)?;
        cx.flow.bind_here(short_circuit);
        self.push_value(cx, PushValue::Value(DfType::boolean(is_or)), None)?;
        cx.flow.bind_here(end);
        cx.add(InstructionKind::ResultOf, Some(Anchor::Expr(expr.id)))?;
        Ok(())
    }

    /// Combine the value on the stack (of type `left`) with `right`. Returns the result type.
    fn binary_step(
        &self,
        cx: &mut FlowContext<'a>,
        op: BinaryOp,
        left: &Ty,
        right: &'a Expr,
        anchor: Option<Anchor>,
    ) -> Result<Ty> {
        if op == BinaryOp::Add && (left.is_string() || right.ty.is_string()) {
            self.visit_expr(cx, right)?;
            cx.add(InstructionKind::StringConcat, anchor)?;
            return Ok(Ty::string());
        }
        if let Some(relation) = op.relation() {
            let compared = match (left.unboxed(), right.ty.unboxed()) {
                (Some(l), Some(r)) if l.is_numeric() && r.is_numeric() => {
                    // `Integer == Integer` compares references
                    if left.is_boxed() && right.ty.is_boxed() {
                        None
                    } else {
                        Some(Ty::Primitive(l.binary_promotion(r)))
                    }
                }
                (Some(PrimitiveTy::Boolean), Some(PrimitiveTy::Boolean))
                    if !(left.is_boxed() && right.ty.is_boxed()) =>
                {
                    Some(Ty::BOOLEAN)
                }
                _ => None,
            };
            if let Some(compared) = &compared {
                self.box_unbox(cx, left, compared)?;
            }
            self.visit_expr(cx, right)?;
            if let Some(compared) = &compared {
                self.box_unbox(cx, &right.ty, compared)?;
            }
            cx.add(InstructionKind::BooleanBinary { relation }, anchor)?;
            return Ok(Ty::BOOLEAN);
        }
        if op.is_bitwise() && left.is_boolean() && right.ty.is_boolean() {
            self.box_unbox(cx, left, &Ty::BOOLEAN)?;
            self.visit_expr(cx, right)?;
            self.box_unbox(cx, &right.ty, &Ty::BOOLEAN)?;
            let kind = match op {
                BinaryOp::BitXor => InstructionKind::BooleanBinary {
                    relation: RelationType::Ne,
                },
                BinaryOp::BitOr => InstructionKind::BooleanAndOr { or: true },
                _ => InstructionKind::BooleanAndOr { or: false },
            };
            cx.add(kind, anchor)?;
            return Ok(Ty::BOOLEAN);
        }
        let operation = numeric_op(op);
        let promoted = match (left.unboxed(), right.ty.unboxed()) {
            (Some(l), Some(_)) if op.is_shift() && l.is_integral() => Some(l.promoted()),
            (Some(l), Some(r)) if l.is_numeric() && r.is_numeric() => Some(l.binary_promotion(r)),
            _ => None,
        };
        let (Some(operation), Some(promoted)) = (operation, promoted) else {
            self.visit_expr(cx, right)?;
            cx.add(
                InstructionKind::EvalUnknown {
                    arg_count: 2,
                    ty: Ty::Unknown,
                },
                anchor,
            )?;
            return Ok(Ty::Unknown);
        };
        let result = Ty::Primitive(promoted);
        self.box_unbox(cx, left, &result)?;
        self.visit_expr(cx, right)?;
        let right_ty = match right.ty.unboxed() {
            Some(r) if op.is_shift() => Ty::Primitive(r.promoted()),
            _ => result.clone(),
        };
        self.box_unbox(cx, &right.ty, &right_ty)?;
        if op.is_division() && promoted.is_integral() {
            self.check_divisor(cx, right, promoted)?;
        }
        cx.add(InstructionKind::NumericBinary { op: operation }, anchor)?;
        Ok(result)
    }

    /// Integral division by zero raises `ArithmeticException`.
    fn check_divisor(&self, cx: &mut FlowContext<'a>, divisor: &Expr, ty: PrimitiveTy) -> Result<()> {
        let non_zero = self
            .fold_constant(cx, divisor)
            .and_then(|c| c.as_long())
            .is_some_and(|value| value != 0);
        if non_zero {
            return Ok(());
        }
        let zero = if ty == PrimitiveTy::Long {
            Constant::Long(0)
        } else {
            Constant::Int(0)
        };
        self.ensure(
            cx,
            RelationType::Ne,
            DfType::Constant(zero),
            ARITHMETIC_EXCEPTION,
            "division by zero",
        )
    }

    fn ensure(
        &self,
        cx: &mut FlowContext<'a>,
        relation: RelationType,
        compare: DfType,
        exception: &str,
        message: &str,
    ) -> Result<()> {
        let transfer = cx.check_transfer(exception, self.decls);
        cx.add(
            InstructionKind::Ensure {
                relation,
                compare,
                transfer,
                message: message.to_string(),
            },
            None,
        )?;
        Ok(())
    }

    fn visit_unary(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        op: UnaryOp,
        operand: &'a Expr,
    ) -> Result<()> {
        if op.is_increment_or_decrement() {
            return self.visit_increment(cx, expr, op, operand);
        }
        let anchor = Some(Anchor::Expr(expr.id));
        if op == UnaryOp::Not {
            self.visit_condition(cx, operand)?;
            cx.add(InstructionKind::Not, anchor)?;
            return Ok(());
        }
        let Some(promoted) = operand.ty.unboxed().filter(|p| p.is_numeric()).map(PrimitiveTy::promoted) else {
            self.visit_expr(cx, operand)?;
            cx.add(
                InstructionKind::EvalUnknown {
                    arg_count: 1,
                    ty: expr.ty.clone(),
                },
                anchor,
            )?;
            return Ok(());
        };
        let ty = Ty::Primitive(promoted);
        match op {
            UnaryOp::Neg if !promoted.is_integral() => {
                // `0 - x` differs from `-x` at signed zero
                self.visit_expr(cx, operand)?;
                self.box_unbox(cx, &operand.ty, &ty)?;
                cx.add(InstructionKind::EvalUnknown { arg_count: 1, ty }, anchor)?;
            }
            UnaryOp::Neg => {
                let zero = Constant::from_long(0, promoted).unwrap_or(Constant::Int(0));
                self.push_value(cx, PushValue::Value(DfType::Constant(zero)), None)?;
                self.visit_expr(cx, operand)?;
                self.box_unbox(cx, &operand.ty, &ty)?;
                cx.add(InstructionKind::NumericBinary { op: NumericOp::Sub }, anchor)?;
            }
            UnaryOp::BitNot => {
                self.visit_expr(cx, operand)?;
                self.box_unbox(cx, &operand.ty, &ty)?;
                let all_ones = Constant::from_long(-1, promoted).unwrap_or(Constant::Int(-1));
                self.push_value(cx, PushValue::Value(DfType::Constant(all_ones)), None)?;
                cx.add(InstructionKind::NumericBinary { op: NumericOp::Xor }, anchor)?;
            }
            _ => {
                self.visit_expr(cx, operand)?;
                self.box_unbox(cx, &operand.ty, &ty)?;
                cx.add(InstructionKind::ResultOf, anchor)?;
            }
        }
        Ok(())
    }

    /// `++x`, `x--` and friends. The postfix forms leave the old value on the stack.
    fn visit_increment(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        op: UnaryOp,
        operand: &'a Expr,
    ) -> Result<()> {
        let target = operand.strip_parens();
        let prim = target.ty.unboxed().filter(|p| p.is_numeric());
        if let (ExprKind::ArrayAccess { array, index }, Some(prim)) = (&target.kind, prim) {
            if self.resolve(cx, target).is_none() {
                return self.visit_array_increment(cx, expr, op, target, prim, array, index);
            }
        }
        let place = self.assign_target(cx, target)?;
        let (Some(place), Some(prim)) = (place, prim) else {
            return self.push_value(cx, PushValue::Value(DfType::from_ty(&expr.ty)), Some(expr));
        };
        let promoted = Ty::Primitive(prim.promoted());
        let one = Constant::from_long(1, prim.promoted()).unwrap_or(Constant::Int(1));
        let operation = if op.is_increment() {
            NumericOp::Add
        } else {
            NumericOp::Sub
        };
        if op.is_postfix() {
            self.push_value(cx, PushValue::Place(place.clone()), None)?;
        }
        self.push_for_write(cx, &place)?;
        self.push_value(cx, PushValue::Place(place.clone()), None)?;
        self.box_unbox(cx, &target.ty, &promoted)?;
        self.push_value(cx, PushValue::Value(DfType::Constant(one)), None)?;
        cx.add(InstructionKind::NumericBinary { op: operation }, None)?;
        self.box_unbox(cx, &promoted, &target.ty)?;
        if op.is_postfix() {
            cx.add(InstructionKind::Assign { target: Some(place) }, None)?;
            self.pop(cx)?;
            cx.add(InstructionKind::ResultOf, Some(Anchor::Expr(expr.id)))?;
        } else {
            cx.add(
                InstructionKind::Assign { target: Some(place) },
                Some(Anchor::Expr(expr.id)),
            )?;
        }
        Ok(())
    }

    /// `a[i]++` with a non-constant index: read the element through the bounds check,
    /// update it and store it back.
    #[allow(clippy::too_many_arguments)]
    fn visit_array_increment(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        op: UnaryOp,
        target: &'a Expr,
        prim: PrimitiveTy,
        array: &'a Expr,
        index: &'a Expr,
    ) -> Result<()> {
        self.visit_expr(cx, array)?;
        self.add_null_check(cx, array.id, NullabilityProblem::ArrayAccess)?;
        self.visit_expr(cx, index)?;
        self.box_unbox(cx, &index.ty, &Ty::INT)?;
        cx.add(
            InstructionKind::Splice {
                count: 2,
                replacement: vec![1, 0, 1, 0],
            },
            None,
        )?;
        let transfer = cx.check_transfer(ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, self.decls);
        cx.add(
            InstructionKind::ArrayAccess {
                transfer,
                element: None,
            },
            None,
        )?;
        if op.is_postfix() {
            // old value below array, index and the value to update
            cx.add(
                InstructionKind::Splice {
                    count: 3,
                    replacement: vec![0, 2, 1, 0],
                },
                None,
            )?;
        }
        let promoted = Ty::Primitive(prim.promoted());
        let one = Constant::from_long(1, prim.promoted()).unwrap_or(Constant::Int(1));
        let operation = if op.is_increment() {
            NumericOp::Add
        } else {
            NumericOp::Sub
        };
        self.box_unbox(cx, &target.ty, &promoted)?;
        self.push_value(cx, PushValue::Value(DfType::Constant(one)), None)?;
        cx.add(InstructionKind::NumericBinary { op: operation }, None)?;
        self.box_unbox(cx, &promoted, &target.ty)?;
        let transfer = cx.check_transfer(ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, self.decls);
        if op.is_postfix() {
            cx.add(
                InstructionKind::ArrayStore {
                    transfer,
                    element: None,
                },
                None,
            )?;
            self.pop(cx)?;
            cx.add(InstructionKind::ResultOf, Some(Anchor::Expr(expr.id)))?;
        } else {
            cx.add(
                InstructionKind::ArrayStore {
                    transfer,
                    element: None,
                },
                Some(Anchor::Expr(expr.id)),
            )?;
        }
        Ok(())
    }

    fn visit_conditional(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        cond: &'a Expr,
        then: &'a Expr,
        otherwise: &'a Expr,
    ) -> Result<()> {
        self.visit_condition(cx, cond)?;
        let else_start = cx.flow.defer();
        let end = cx.flow.defer();
        cx.add(
            InstructionKind::ConditionalGoto {
                target: else_start,
                compare: DfType::boolean(false),
            },
            None,
        )?;
        self.visit_expr(cx, then)?;
        self.box_unbox(cx, &then.ty, &expr.ty)?;
        cx.add(InstructionKind::Goto { target: end }, None)?;
        cx.flow.bind_here(else_start);
        self.visit_expr(cx, otherwise)?;
        self.box_unbox(cx, &otherwise.ty, &expr.ty)?;
        cx.flow.bind_here(end);
        cx.add(InstructionKind::ResultOf, Some(Anchor::Expr(expr.id)))?;
        Ok(())
    }

    fn visit_cast(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        ty: &Ty,
        operand: &'a Expr,
    ) -> Result<()> {
        self.visit_expr(cx, operand)?;
        let from = &operand.ty;
        match ty {
            Ty::Primitive(prim) if from.is_reference() && !from.is_boxed() => {
                // `(int) obj` checks for `Integer`, then unboxes
                let boxed = Ty::boxed_of(*prim);
                let transfer = cx.check_transfer(CLASS_CAST_EXCEPTION, self.decls);
                cx.add(
                    InstructionKind::TypeCast {
                        ty: boxed.clone(),
                        transfer,
                    },
                    None,
                )?;
                self.box_unbox(cx, &boxed, ty)?;
            }
            Ty::Primitive(_) => self.box_unbox(cx, from, ty)?,
            _ if from.is_primitive() => self.box_unbox(cx, from, ty)?,
            _ if ty.is_reference() && ty != from && !self.is_upcast(from, ty) => {
                let transfer = cx.check_transfer(CLASS_CAST_EXCEPTION, self.decls);
                cx.add(
                    InstructionKind::TypeCast {
                        ty: ty.clone(),
                        transfer,
                    },
                    None,
                )?;
            }
            _ => {}
        }
        cx.add(InstructionKind::ResultOf, Some(Anchor::Expr(expr.id)))?;
        Ok(())
    }

    fn is_upcast(&self, from: &Ty, to: &Ty) -> bool {
        match (from.class_name(), to.class_name()) {
            (Some(from), Some(to)) => self.decls.is_subtype(from, to),
            _ => *from == Ty::Null,
        }
    }
}

fn numeric_op(op: BinaryOp) -> Option<NumericOp> {
    Some(match op {
        BinaryOp::Add => NumericOp::Add,
        BinaryOp::Sub => NumericOp::Sub,
        BinaryOp::Mul => NumericOp::Mul,
        BinaryOp::Div => NumericOp::Div,
        BinaryOp::Rem => NumericOp::Rem,
        BinaryOp::BitAnd => NumericOp::And,
        BinaryOp::BitOr => NumericOp::Or,
        BinaryOp::BitXor => NumericOp::Xor,
        BinaryOp::Shl => NumericOp::Shl,
        BinaryOp::Shr => NumericOp::Shr,
        BinaryOp::UShr => NumericOp::UShr,
        _ => return None,
    })
}
