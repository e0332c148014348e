//! Type tests, pattern matching and record deconstruction.
//!
//! A pattern test reads its scrutinee from a place, so nested components never
//! re-evaluate the matched expression. Every failing test pushes `false` and
//! jumps to the common end; the successful path pushes `true`.

use super::ControlFlowAnalyzer;
use crate::context::FlowContext;
use crate::inst::{Anchor, InstructionKind, PushValue};
use crate::numeric::{is_exact, is_unconditionally_exact};
use crate::offset::ControlFlowOffset;
use crate::place::{PlaceValue, StablePlace};
use df_core::ast::{Expr, InstanceCheck, Pattern, PatternKind, PrimitiveTy, Ty, VarId};
use df_core::types::{DfType, Nullability};
use df_core::Result;

impl<'a> ControlFlowAnalyzer<'a> {
    pub(crate) fn visit_instance_of(
        &self,
        cx: &mut FlowContext<'a>,
        expr: &'a Expr,
        operand: &'a Expr,
        check: &'a InstanceCheck,
    ) -> Result<()> {
        match check {
            InstanceCheck::Type(ty) => {
                self.visit_expr(cx, operand)?;
                self.push_value(cx, PushValue::Value(DfType::not_null(ty.clone())), None)?;
                cx.add(InstructionKind::InstanceOf, Some(Anchor::Expr(expr.id)))?;
            }
            InstanceCheck::Pattern(pattern) => {
                let value = match self.resolve(cx, operand) {
                    Some(place) if !matches!(place, StablePlace::Constant(_)) => cx.place(place),
                    _ => {
                        self.visit_expr(cx, operand)?;
                        let temp = cx.create_temp(operand.ty.clone());
                        cx.add(
                            InstructionKind::SimpleAssign {
                                target: temp.clone(),
                            },
                            None,
                        )?;
                        self.pop(cx)?;
                        temp
                    }
                };
                self.visit_pattern_test(cx, &value, &operand.ty, pattern)?;
                cx.add(InstructionKind::ResultOf, Some(Anchor::Expr(expr.id)))?;
            }
        }
        Ok(())
    }

    /// Push whether the value stored in `value` matches `pattern`, binding its
    /// variables on success.
    pub(crate) fn visit_pattern_test(
        &self,
        cx: &mut FlowContext<'a>,
        value: &PlaceValue,
        value_ty: &Ty,
        pattern: &'a Pattern,
    ) -> Result<()> {
        let end = cx.flow.defer();
        self.match_pattern(cx, value, value_ty, pattern, end, true)?;
        self.push_value(cx, PushValue::Value(DfType::boolean(true)), None)?;
        cx.flow.bind_here(end);
        Ok(())
    }

    fn match_pattern(
        &self,
        cx: &mut FlowContext<'a>,
        value: &PlaceValue,
        value_ty: &Ty,
        pattern: &'a Pattern,
        fail: ControlFlowOffset,
        check_type: bool,
    ) -> Result<()> {
        let ty = pattern.ty();
        if let (Some(to), Some(from)) = (ty.primitive(), value_ty.primitive()) {
            return self.match_primitive(cx, value, from, to, pattern.binding(), fail);
        }
        if check_type && !value_ty.is_primitive() {
            self.push_value(cx, PushValue::Place(value.clone()), None)?;
            let tested = ty.boxed();
            self.push_value(
                cx,
                PushValue::Value(DfType::typed(tested, Nullability::NotNull)),
                None,
            )?;
            cx.add(InstructionKind::InstanceOf, None)?;
            self.fail_unless(cx, fail)?;
        }
        if let Some(binding) = pattern.binding() {
            self.push_value(cx, PushValue::Place(value.clone()), None)?;
            self.box_unbox(cx, value_ty, ty)?;
            self.bind(cx, binding)?;
        }
        if let PatternKind::Record { components, .. } = &pattern.kind {
            self.match_components(cx, value, pattern, components, fail)?;
        }
        Ok(())
    }

    fn match_components(
        &self,
        cx: &mut FlowContext<'a>,
        value: &PlaceValue,
        record: &'a Pattern,
        components: &'a [Pattern],
        fail: ControlFlowOffset,
    ) -> Result<()> {
        let record_ty = record.ty();
        let fields: Vec<VarId> = record_ty
            .class_name()
            .and_then(|name| self.decls.class_by_name(name))
            .map(|class| class.record_components.iter().map(|c| c.field).collect())
            .unwrap_or_default();
        if fields.len() != components.len() {
            warn!(record = %record_ty, "record pattern does not match the record components");
            cx.anomaly(
                record.id,
                "record-arity",
                format!("record pattern for {record_ty} has {} components", components.len()),
            );
            for component in components {
                self.bind_unknown(cx, component)?;
            }
            self.push_unknown(cx)?;
            return self.fail_unless(cx, fail);
        }
        for (component, field) in components.iter().zip(fields) {
            let place = cx.place(StablePlace::field(Some(value.place.clone()), field));
            let field_ty = self.decls.var(field).ty.clone();
            let check_type = match &component.kind {
                PatternKind::Unnamed(_) => false,
                PatternKind::Record { .. } => true,
                PatternKind::Type { ty, .. } => ty != &field_ty,
            };
            self.match_pattern(cx, &place, &field_ty, component, fail, check_type)?;
        }
        Ok(())
    }

    /// Primitive pattern on a primitive value: an exactness test, then a conversion.
    fn match_primitive(
        &self,
        cx: &mut FlowContext<'a>,
        value: &PlaceValue,
        from: PrimitiveTy,
        to: PrimitiveTy,
        binding: Option<VarId>,
        fail: ControlFlowOffset,
    ) -> Result<()> {
        if from != to && !is_unconditionally_exact(from, to) {
            match value.place.as_constant() {
                Some(constant) => {
                    if !is_exact(constant, to) {
                        self.push_value(cx, PushValue::Value(DfType::boolean(false)), None)?;
                        cx.add(InstructionKind::Goto { target: fail }, None)?;
                        return Ok(());
                    }
                }
                None => {
                    self.push_value(cx, PushValue::Place(value.clone()), None)?;
                    cx.add(InstructionKind::ExactConversionTest { from, to }, None)?;
                    self.fail_unless(cx, fail)?;
                }
            }
        }
        if let Some(binding) = binding {
            self.push_value(cx, PushValue::Place(value.clone()), None)?;
            if from != to {
                cx.add(InstructionKind::PrimitiveConversion { to }, None)?;
            }
            self.bind(cx, binding)?;
        }
        Ok(())
    }

    /// Pop the top boolean; on `false` push `false` and jump to `fail`.
    fn fail_unless(&self, cx: &mut FlowContext<'a>, fail: ControlFlowOffset) -> Result<()> {
        let matched = cx.flow.defer();
        cx.add(
            InstructionKind::ConditionalGoto {
                target: matched,
                compare: DfType::boolean(true),
            },
            None,
        )?;
        self.push_value(cx, PushValue::Value(DfType::boolean(false)), None)?;
        cx.add(InstructionKind::Goto { target: fail }, None)?;
        cx.flow.bind_here(matched);
        Ok(())
    }

    fn bind(&self, cx: &mut FlowContext<'a>, binding: VarId) -> Result<()> {
        let target = cx.place(StablePlace::Var(binding));
        cx.add(InstructionKind::SimpleAssign { target }, None)?;
        self.pop(cx)
    }

    fn bind_unknown(&self, cx: &mut FlowContext<'a>, pattern: &'a Pattern) -> Result<()> {
        if let Some(binding) = pattern.binding() {
            let ty = self.decls.var(binding).ty.clone();
            self.push_value(cx, PushValue::Value(DfType::from_ty(&ty)), None)?;
            self.bind(cx, binding)?;
        }
        if let PatternKind::Record { components, .. } = &pattern.kind {
            for component in components {
                self.bind_unknown(cx, component)?;
            }
        }
        Ok(())
    }
}
