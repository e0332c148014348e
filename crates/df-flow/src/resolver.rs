//! Decides whether an expression denotes a stable place.
//!
//! A stable place can be re-read without evaluating the expression again:
//! locals, `this`, field chains over stable qualifiers, constant-index array
//! elements, compile-time constants and pure getters.

use crate::place::{SpecialField, StablePlace};
use df_core::ast::{
    BinaryOp, CallExpr, ClassId, Declarations, Expr, ExprKind, PrimitiveTy, Ty, UnaryOp, VarId,
};
use df_core::types::{Constant, RelationType};

/// Position inside a class initializer currently being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitScope {
    pub class: ClassId,
    /// Member position of the initializer being translated.
    pub order: usize,
    pub is_static: bool,
}

pub struct ExpressionResolver<'a> {
    decls: &'a Declarations,
}

impl<'a> ExpressionResolver<'a> {
    pub fn new(decls: &'a Declarations) -> Self {
        Self { decls }
    }

    /// The stable place `expr` denotes, if any.
    pub fn resolve(&self, expr: &Expr, scope: Option<InitScope>) -> Option<StablePlace> {
        let expr = expr.strip_parens();
        match &expr.kind {
            ExprKind::Literal(value) => Some(StablePlace::Constant(value.clone())),
            ExprKind::Local(var) => Some(StablePlace::Var(*var)),
            ExprKind::This => Some(StablePlace::This),
            ExprKind::Field { qualifier, field } => {
                self.resolve_field(qualifier.as_deref(), *field, scope)
            }
            ExprKind::Call(call) => self.resolve_getter(call, scope),
            ExprKind::ArrayAccess { array, index } => {
                let index = self.fold(index, scope)?.as_long()?;
                let index = u32::try_from(index).ok()?;
                let array = self.resolve(array, scope)?;
                if matches!(array, StablePlace::Constant(_)) {
                    return None;
                }
                Some(StablePlace::ArrayElement {
                    array: Box::new(array),
                    index,
                })
            }
            ExprKind::Binary { .. }
            | ExprKind::Unary { .. }
            | ExprKind::Cast { .. }
            | ExprKind::Conditional { .. } => self.fold(expr, scope).map(StablePlace::Constant),
            _ => None,
        }
    }

    fn resolve_field(
        &self,
        qualifier: Option<&Expr>,
        field: VarId,
        scope: Option<InitScope>,
    ) -> Option<StablePlace> {
        if let Some(value) = self.qualified_constant(qualifier, field, scope) {
            return Some(StablePlace::Constant(value));
        }
        let decl = self.decls.var(field);
        if decl.is_static_field() {
            return self
                .is_skippable(qualifier, scope)
                .then(|| StablePlace::field(None, field));
        }
        let qualifier = match qualifier {
            None => StablePlace::This,
            Some(q) => self.resolve(q, scope)?,
        };
        if matches!(qualifier, StablePlace::Constant(_)) {
            return None;
        }
        Some(StablePlace::field(Some(qualifier), field))
    }

    /// A call to a known getter aliases the field it returns, provided no override can intervene.
    fn resolve_getter(&self, call: &CallExpr, scope: Option<InitScope>) -> Option<StablePlace> {
        let method = self.decls.method(call.method?);
        let field = method.getter_of?;
        if !call.args.is_empty() || (method.overridable && !call.statically_bound) {
            return None;
        }
        self.resolve_field(call.qualifier.as_deref(), field, scope)
    }

    /// Constant value of a final field, unless the read happens before the field's
    /// own initializer in the initializer sequence of its class.
    pub fn field_constant(&self, field: VarId, scope: Option<InitScope>) -> Option<Constant> {
        let decl = self.decls.var(field);
        let info = decl.field()?;
        if !decl.is_final {
            return None;
        }
        let value = info.constant.clone()?;
        if let Some(scope) = scope {
            if scope.class == info.owner
                && scope.is_static == info.is_static
                && info.order >= scope.order
            {
                return None;
            }
        }
        Some(value)
    }

    /// Value of a constant field read through `qualifier`, when reading it skips
    /// nothing observable: the qualifier is absent (a type name) or a stable place.
    fn qualified_constant(
        &self,
        qualifier: Option<&Expr>,
        field: VarId,
        scope: Option<InitScope>,
    ) -> Option<Constant> {
        let value = self.field_constant(field, scope)?;
        self.is_skippable(qualifier, scope).then_some(value)
    }

    fn is_skippable(&self, qualifier: Option<&Expr>, scope: Option<InitScope>) -> bool {
        qualifier.map_or(true, |qualifier| self.resolve(qualifier, scope).is_some())
    }

    /// Compile-time value of `expr`.
    pub fn fold(&self, expr: &Expr, scope: Option<InitScope>) -> Option<Constant> {
        let expr = expr.strip_parens();
        match &expr.kind {
            ExprKind::Literal(value) => Some(value.clone()),
            ExprKind::Field { qualifier, field } => {
                self.qualified_constant(qualifier.as_deref(), *field, scope)
            }
            ExprKind::Unary { op, operand } => fold_unary(*op, &self.fold(operand, scope)?),
            ExprKind::Binary { op, operands } => {
                let mut operands = operands.iter();
                let mut acc = self.fold(operands.next()?, scope)?;
                for operand in operands {
                    acc = fold_binary(*op, &acc, &self.fold(operand, scope)?)?;
                }
                Some(acc)
            }
            ExprKind::Cast { ty, operand } => {
                let value = self.fold(operand, scope)?;
                match ty {
                    Ty::Primitive(prim) => value.convert(*prim),
                    ty if ty.is_string() && value.as_str().is_some() => Some(value),
                    _ => None,
                }
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.fold(cond, scope)?.as_bool()? {
                    self.fold(then, scope)
                } else {
                    self.fold(otherwise, scope)
                }
            }
            _ => None,
        }
    }

    /// Whether an opaque call may change the value stored in `place`.
    pub fn is_flushable_by_calls(&self, place: &StablePlace) -> bool {
        match place {
            StablePlace::Field { field, .. } => !self.decls.var(*field).is_final,
            StablePlace::ArrayElement { .. } => true,
            StablePlace::Derived { qualifier, field } => match field {
                SpecialField::ArrayLength
                | SpecialField::StringLength
                | SpecialField::Unbox => self.is_flushable_by_calls(qualifier),
                SpecialField::CollectionSize => true,
            },
            StablePlace::Var(_)
            | StablePlace::This
            | StablePlace::Constant(_)
            | StablePlace::Temp(_)
            | StablePlace::AssertionsDisabled => false,
        }
    }
}

fn fold_unary(op: UnaryOp, value: &Constant) -> Option<Constant> {
    match op {
        UnaryOp::Not => Some(Constant::Bool(!value.as_bool()?)),
        UnaryOp::Plus => {
            let prim = value.primitive_ty()?;
            value.convert(prim.promoted())
        }
        UnaryOp::Neg => {
            let prim = value.primitive_ty()?.promoted();
            match prim {
                PrimitiveTy::Int => Some(Constant::Int((value.as_long()? as i32).wrapping_neg())),
                PrimitiveTy::Long => Some(Constant::Long(value.as_long()?.wrapping_neg())),
                PrimitiveTy::Float => Some(Constant::float(-(value.as_double()? as f32))),
                PrimitiveTy::Double => Some(Constant::double(-value.as_double()?)),
                _ => None,
            }
        }
        UnaryOp::BitNot => {
            let prim = value.primitive_ty()?.promoted();
            match prim {
                PrimitiveTy::Int => Some(Constant::Int(!(value.as_long()? as i32))),
                PrimitiveTy::Long => Some(Constant::Long(!value.as_long()?)),
                _ => None,
            }
        }
        UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => None,
    }
}

/// Text a constant contributes to a string concatenation.
fn concat_text(value: &Constant) -> Option<String> {
    Some(match value {
        Constant::Null => "null".to_string(),
        Constant::Bool(v) => v.to_string(),
        Constant::Char(v) => char::from_u32(*v as u32)?.to_string(),
        Constant::Byte(v) => v.to_string(),
        Constant::Short(v) => v.to_string(),
        Constant::Int(v) => v.to_string(),
        Constant::Long(v) => v.to_string(),
        Constant::Float(bits) => format!("{:?}", f32::from_bits(*bits)),
        Constant::Double(bits) => format!("{:?}", f64::from_bits(*bits)),
        Constant::Str(s) => s.clone(),
        Constant::Class(_) => return None,
    })
}

pub(crate) fn fold_binary(op: BinaryOp, left: &Constant, right: &Constant) -> Option<Constant> {
    if op == BinaryOp::Add && (left.as_str().is_some() || right.as_str().is_some()) {
        return Some(Constant::Str(concat_text(left)? + &concat_text(right)?));
    }
    if let (Some(a), Some(b)) = (left.as_bool(), right.as_bool()) {
        return Some(Constant::Bool(match op {
            BinaryOp::AndAnd | BinaryOp::BitAnd => a && b,
            BinaryOp::OrOr | BinaryOp::BitOr => a || b,
            BinaryOp::BitXor | BinaryOp::Ne => a != b,
            BinaryOp::Eq => a == b,
            _ => return None,
        }));
    }
    let lp = left.primitive_ty()?;
    let rp = right.primitive_ty()?;
    if !lp.is_numeric() || !rp.is_numeric() {
        return None;
    }
    if op.is_shift() {
        return fold_shift(op, left, lp.promoted(), right.as_long()?);
    }
    let ty = lp.binary_promotion(rp);
    if let Some(relation) = op.relation() {
        let result = if ty.is_floating() {
            let (a, b) = (left.as_double()?, right.as_double()?);
            match relation {
                RelationType::Eq => a == b,
                RelationType::Ne => a != b,
                RelationType::Lt => a < b,
                RelationType::Le => a <= b,
                RelationType::Gt => a > b,
                RelationType::Ge => a >= b,
                _ => return None,
            }
        } else {
            let (a, b) = (left.as_long()?, right.as_long()?);
            match relation {
                RelationType::Eq => a == b,
                RelationType::Ne => a != b,
                RelationType::Lt => a < b,
                RelationType::Le => a <= b,
                RelationType::Gt => a > b,
                RelationType::Ge => a >= b,
                _ => return None,
            }
        };
        return Some(Constant::Bool(result));
    }
    match ty {
        PrimitiveTy::Int => {
            let (a, b) = (left.as_long()? as i32, right.as_long()? as i32);
            Some(Constant::Int(match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div if b != 0 => a.wrapping_div(b),
                BinaryOp::Rem if b != 0 => a.wrapping_rem(b),
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                _ => return None,
            }))
        }
        PrimitiveTy::Long => {
            let (a, b) = (left.as_long()?, right.as_long()?);
            Some(Constant::Long(match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div if b != 0 => a.wrapping_div(b),
                BinaryOp::Rem if b != 0 => a.wrapping_rem(b),
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                _ => return None,
            }))
        }
        PrimitiveTy::Float | PrimitiveTy::Double => {
            let (a, b) = (left.as_double()?, right.as_double()?);
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                _ => return None,
            };
            Constant::from_double(value, ty)
        }
        _ => None,
    }
}

fn fold_shift(op: BinaryOp, value: &Constant, ty: PrimitiveTy, count: i64) -> Option<Constant> {
    match ty {
        PrimitiveTy::Int => {
            let a = value.as_long()? as i32;
            let n = (count & 31) as u32;
            Some(Constant::Int(match op {
                BinaryOp::Shl => a.wrapping_shl(n),
                BinaryOp::Shr => a.wrapping_shr(n),
                BinaryOp::UShr => ((a as u32) >> n) as i32,
                _ => return None,
            }))
        }
        PrimitiveTy::Long => {
            let a = value.as_long()?;
            let n = (count & 63) as u32;
            Some(Constant::Long(match op {
                BinaryOp::Shl => a.wrapping_shl(n),
                BinaryOp::Shr => a.wrapping_shr(n),
                BinaryOp::UShr => ((a as u64) >> n) as i64,
                _ => return None,
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use df_core::ast::AstBuilder;
    use pretty_assertions::assert_eq;

    #[test]
    fn locals_and_literals_are_stable() {
        let ast = AstBuilder::new();
        let x = ast.local("x", Ty::INT);
        let decls = ast.decls();
        let resolver = ExpressionResolver::new(&decls);
        assert_eq!(resolver.resolve(&ast.var(x), None), Some(StablePlace::Var(x)));
        assert_eq!(
            resolver.resolve(&ast.paren(ast.int(4)), None),
            Some(StablePlace::Constant(Constant::Int(4)))
        );
        assert_eq!(resolver.resolve(&ast.this(Ty::class("Self")), None), Some(StablePlace::This));
    }

    #[test]
    fn constant_expressions_fold() {
        let ast = AstBuilder::new();
        let decls = ast.decls();
        let resolver = ExpressionResolver::new(&decls);
        let sum = ast.binary(BinaryOp::Mul, ast.int(6), ast.int(7));
        assert_eq!(resolver.fold(&sum, None), Some(Constant::Int(42)));
        let concat = ast.binary(BinaryOp::Add, ast.str_("n="), ast.int(1));
        assert_eq!(resolver.fold(&concat, None), Some(Constant::str("n=1")));
        let div = ast.binary(BinaryOp::Div, ast.int(1), ast.int(0));
        assert_eq!(resolver.fold(&div, None), None);
        let shift = ast.binary(BinaryOp::Shl, ast.int(1), ast.int(33));
        assert_eq!(resolver.fold(&shift, None), Some(Constant::Int(2)));
    }

    #[test]
    fn final_field_constant_respects_initialization_order() {
        let ast = AstBuilder::new();
        let class = ast.class("Holder");
        let early = ast.field(class, "EARLY", Ty::INT, true, true, Some(Constant::Int(1)));
        let late = ast.field(class, "LATE", Ty::INT, true, true, Some(Constant::Int(2)));
        let members = vec![
            ast.field_member(early, Some(ast.int(1))),
            ast.field_member(late, Some(ast.int(2))),
        ];
        let _decl = ast.class_decl(class, members);
        let decls = ast.decls();
        let resolver = ExpressionResolver::new(&decls);
        let reading_from_first = Some(InitScope {
            class,
            order: 0,
            is_static: true,
        });
        assert_eq!(
            resolver.resolve(&ast.var(late), reading_from_first),
            Some(StablePlace::field(None, late))
        );
        assert_eq!(
            resolver.resolve(&ast.var(late), None),
            Some(StablePlace::Constant(Constant::Int(2)))
        );
        let reading_from_second = Some(InitScope {
            class,
            order: 1,
            is_static: true,
        });
        assert_eq!(
            resolver.resolve(&ast.var(early), reading_from_second),
            Some(StablePlace::Constant(Constant::Int(1)))
        );
    }

    #[test]
    fn constant_read_through_a_call_is_not_folded() {
        let ast = AstBuilder::new();
        let class = ast.class("Limits");
        let max = ast.field(class, "MAX", Ty::INT, true, true, Some(Constant::Int(9)));
        let holder = ast.local("limits", Ty::class("Limits"));
        let make = ast.static_method("Limits", "make", vec![], Ty::class("Limits"));
        let through_local = ast.field_of(ast.var(holder), max);
        let through_call = ast.field_of(ast.call(None, make, vec![]), max);
        let sum = ast.binary(BinaryOp::Add, through_call.clone(), ast.int(1));
        let decls = ast.decls();
        let resolver = ExpressionResolver::new(&decls);
        assert_eq!(resolver.fold(&through_local, None), Some(Constant::Int(9)));
        assert_eq!(resolver.fold(&through_call, None), None);
        assert_eq!(resolver.fold(&sum, None), None);
        assert_eq!(resolver.resolve(&through_call, None), None);
    }

    #[test]
    fn getter_resolves_only_without_override() {
        let ast = AstBuilder::new();
        let class = ast.class("Point");
        let x = ast.field(class, "x", Ty::INT, false, true, None);
        let getter = ast.method("Point", "getX", vec![], Ty::INT);
        let p = ast.local("p", Ty::class("Point"));
        ast.update_method(getter, |m| m.getter_of = Some(x));
        let call = ast.call(Some(ast.var(p)), getter, vec![]);
        {
            let decls = ast.decls();
            let resolver = ExpressionResolver::new(&decls);
            assert_eq!(
                resolver.resolve(&call, None),
                Some(StablePlace::field(Some(StablePlace::Var(p)), x))
            );
        }

        ast.update_method(getter, |m| m.overridable = true);
        let decls = ast.decls();
        let resolver = ExpressionResolver::new(&decls);
        assert_eq!(resolver.resolve(&call, None), None);
    }

    #[test]
    fn array_element_needs_constant_index() {
        let ast = AstBuilder::new();
        let arr = ast.local("arr", Ty::array_of(Ty::INT));
        let i = ast.local("i", Ty::INT);
        let decls = ast.decls();
        let resolver = ExpressionResolver::new(&decls);
        let element = resolver.resolve(&ast.array_access(ast.var(arr), ast.int(2)), None);
        assert_eq!(
            element,
            Some(StablePlace::ArrayElement {
                array: Box::new(StablePlace::Var(arr)),
                index: 2
            })
        );
        assert!(resolver.is_flushable_by_calls(element.as_ref().unwrap()));
        assert_eq!(
            resolver.resolve(&ast.array_access(ast.var(arr), ast.var(i)), None),
            None
        );
    }
}
