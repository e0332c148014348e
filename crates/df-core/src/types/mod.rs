//! Value and type lattice consumed by the flow builder.
//!
//! The builder never reasons about these values; it only constructs them
//! (constants, unknowns, typed values, range facts) and hands them to the
//! instructions it emits. The operations here are the small surface the
//! downstream interpreter and the builder agree on.

mod range;

pub use range::LongRangeSet;

use crate::ast::{PrimitiveTy, Ty};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A compile-time known value. Floating values are stored as raw bits so that
/// `-0.0`, `0.0` and the various NaN payloads stay distinguishable and hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Bool(bool),
    Char(u16),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    Str(String),
    Class(Ty),
}

impl Constant {
    pub fn float(value: f32) -> Self {
        Constant::Float(value.to_bits())
    }

    pub fn double(value: f64) -> Self {
        Constant::Double(value.to_bits())
    }

    pub fn str(value: impl Into<String>) -> Self {
        Constant::Str(value.into())
    }

    pub fn primitive_ty(&self) -> Option<PrimitiveTy> {
        Some(match self {
            Constant::Bool(_) => PrimitiveTy::Boolean,
            Constant::Char(_) => PrimitiveTy::Char,
            Constant::Byte(_) => PrimitiveTy::Byte,
            Constant::Short(_) => PrimitiveTy::Short,
            Constant::Int(_) => PrimitiveTy::Int,
            Constant::Long(_) => PrimitiveTy::Long,
            Constant::Float(_) => PrimitiveTy::Float,
            Constant::Double(_) => PrimitiveTy::Double,
            Constant::Null | Constant::Str(_) | Constant::Class(_) => return None,
        })
    }

    pub fn ty(&self) -> Ty {
        match self {
            Constant::Null => Ty::Null,
            Constant::Str(_) => Ty::string(),
            Constant::Class(_) => Ty::class(crate::ast::JAVA_LANG_CLASS),
            other => other
                .primitive_ty()
                .map(Ty::Primitive)
                .unwrap_or(Ty::Unknown),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Constant::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integral value widened to `i64`.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Constant::Char(v) => Some(*v as i64),
            Constant::Byte(v) => Some(*v as i64),
            Constant::Short(v) => Some(*v as i64),
            Constant::Int(v) => Some(*v as i64),
            Constant::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Any numeric value widened to `f64`.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Constant::Float(bits) => Some(f32::from_bits(*bits) as f64),
            Constant::Double(bits) => Some(f64::from_bits(*bits)),
            other => other.as_long().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integral constant of the given type; the value wraps like a narrowing cast.
    pub fn from_long(value: i64, ty: PrimitiveTy) -> Option<Constant> {
        Some(match ty {
            PrimitiveTy::Byte => Constant::Byte(value as i8),
            PrimitiveTy::Char => Constant::Char(value as u16),
            PrimitiveTy::Short => Constant::Short(value as i16),
            PrimitiveTy::Int => Constant::Int(value as i32),
            PrimitiveTy::Long => Constant::Long(value),
            PrimitiveTy::Float => Constant::float(value as f32),
            PrimitiveTy::Double => Constant::double(value as f64),
            PrimitiveTy::Boolean => return None,
        })
    }

    /// Floating value converted with cast semantics: NaN becomes zero, out of range saturates,
    /// sub-int targets go through `int` first.
    pub fn from_double(value: f64, ty: PrimitiveTy) -> Option<Constant> {
        Some(match ty {
            PrimitiveTy::Float => Constant::float(value as f32),
            PrimitiveTy::Double => Constant::double(value),
            PrimitiveTy::Long => Constant::Long(value as i64),
            PrimitiveTy::Int => Constant::Int(value as i32),
            PrimitiveTy::Byte | PrimitiveTy::Char | PrimitiveTy::Short => {
                return Constant::from_long((value as i32) as i64, ty)
            }
            PrimitiveTy::Boolean => return None,
        })
    }

    /// Cast this constant to a primitive type.
    pub fn convert(&self, to: PrimitiveTy) -> Option<Constant> {
        let from = self.primitive_ty()?;
        if from == to {
            return Some(self.clone());
        }
        if from == PrimitiveTy::Boolean || to == PrimitiveTy::Boolean {
            return None;
        }
        if from.is_floating() {
            Constant::from_double(self.as_double()?, to)
        } else {
            Constant::from_long(self.as_long()?, to)
        }
    }

    /// The value a field of this type holds before any initializer runs.
    pub fn default_for(ty: &Ty) -> Constant {
        match ty {
            Ty::Primitive(PrimitiveTy::Boolean) => Constant::Bool(false),
            Ty::Primitive(PrimitiveTy::Float) => Constant::float(0.0),
            Ty::Primitive(PrimitiveTy::Double) => Constant::double(0.0),
            Ty::Primitive(prim) => Constant::from_long(0, *prim).unwrap_or(Constant::Int(0)),
            _ => Constant::Null,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Bool(v) => write!(f, "{v}"),
            Constant::Char(v) => match char::from_u32(*v as u32) {
                Some(c) => write!(f, "'{}'", c.escape_default()),
                None => write!(f, "'\\u{v:04x}'"),
            },
            Constant::Byte(v) => write!(f, "{v}"),
            Constant::Short(v) => write!(f, "{v}"),
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Float(bits) => write!(f, "{:?}f", f32::from_bits(*bits)),
            Constant::Double(bits) => write!(f, "{:?}", f64::from_bits(*bits)),
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Class(ty) => write!(f, "{ty}.class"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nullability {
    Unknown,
    NotNull,
    Nullable,
    Null,
}

impl Nullability {
    fn join(self, other: Nullability) -> Nullability {
        if self == other {
            return self;
        }
        match (self, other) {
            (Nullability::Unknown, _) | (_, Nullability::Unknown) => Nullability::Unknown,
            _ => Nullability::Nullable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    IsNot,
}

impl RelationType {
    pub fn negated(self) -> RelationType {
        match self {
            RelationType::Eq => RelationType::Ne,
            RelationType::Ne => RelationType::Eq,
            RelationType::Lt => RelationType::Ge,
            RelationType::Le => RelationType::Gt,
            RelationType::Gt => RelationType::Le,
            RelationType::Ge => RelationType::Lt,
            RelationType::Is => RelationType::IsNot,
            RelationType::IsNot => RelationType::Is,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RelationType::Eq => "==",
            RelationType::Ne => "!=",
            RelationType::Lt => "<",
            RelationType::Le => "<=",
            RelationType::Gt => ">",
            RelationType::Ge => ">=",
            RelationType::Is => "is",
            RelationType::IsNot => "is not",
        }
    }
}

/// Abstract value attached to push/compare/assign instructions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DfType {
    Top,
    Bottom,
    Constant(Constant),
    Range { ty: PrimitiveTy, set: LongRangeSet },
    Typed { ty: Ty, nullability: Nullability },
    /// Some unknown element of the listed constants.
    AnyOf(Vec<Constant>),
    /// End marker for value lists pushed on the stack.
    Sentinel,
    /// Result of a call that cannot complete.
    Fail,
}

impl DfType {
    pub fn boolean(value: bool) -> DfType {
        DfType::Constant(Constant::Bool(value))
    }

    pub fn null() -> DfType {
        DfType::Constant(Constant::Null)
    }

    pub fn constant(value: Constant) -> DfType {
        DfType::Constant(value)
    }

    pub fn int(value: i32) -> DfType {
        DfType::Constant(Constant::Int(value))
    }

    pub fn typed(ty: Ty, nullability: Nullability) -> DfType {
        DfType::Typed { ty, nullability }
    }

    pub fn not_null(ty: Ty) -> DfType {
        DfType::typed(ty, Nullability::NotNull)
    }

    /// Range fact for an integral type; bounds outside the type are clipped.
    pub fn range(ty: PrimitiveTy, from: i64, to: i64) -> DfType {
        let set = match ty.integral_bounds() {
            Some((lo, hi)) => LongRangeSet::range(from.max(lo), to.min(hi)),
            None => LongRangeSet::range(from, to),
        };
        if let Some(point) = set.as_point() {
            if let Some(value) = Constant::from_long(point, ty) {
                return DfType::Constant(value);
            }
        }
        if set.is_empty() {
            return DfType::Bottom;
        }
        DfType::Range { ty, set }
    }

    /// The least precise value of a static type.
    pub fn from_ty(ty: &Ty) -> DfType {
        match ty {
            Ty::Primitive(prim) => match prim.integral_bounds() {
                Some((lo, hi)) => DfType::Range {
                    ty: *prim,
                    set: LongRangeSet::range(lo, hi),
                },
                None => DfType::typed(ty.clone(), Nullability::NotNull),
            },
            Ty::Null => DfType::null(),
            Ty::Unknown | Ty::Void => DfType::Top,
            _ => DfType::typed(ty.clone(), Nullability::Unknown),
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            DfType::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_top(&self) -> bool {
        matches!(self, DfType::Top)
    }

    pub fn nullability(&self) -> Nullability {
        match self {
            DfType::Constant(Constant::Null) => Nullability::Null,
            DfType::Constant(_) | DfType::Range { .. } | DfType::AnyOf(_) => Nullability::NotNull,
            DfType::Typed { nullability, .. } => *nullability,
            _ => Nullability::Unknown,
        }
    }

    pub fn meet(&self, other: &DfType) -> DfType {
        match (self, other) {
            (DfType::Top, x) | (x, DfType::Top) => x.clone(),
            (a, b) if a == b => a.clone(),
            (DfType::Constant(c), DfType::Range { set, .. })
            | (DfType::Range { set, .. }, DfType::Constant(c)) => match c.as_long() {
                Some(v) if set.contains(v) => DfType::Constant(c.clone()),
                _ => DfType::Bottom,
            },
            (DfType::Range { ty, set: a }, DfType::Range { set: b, .. }) => {
                let set = a.intersect(b);
                if set.is_empty() {
                    DfType::Bottom
                } else {
                    DfType::Range { ty: *ty, set }
                }
            }
            (DfType::Constant(c), DfType::AnyOf(values))
            | (DfType::AnyOf(values), DfType::Constant(c)) => {
                if values.contains(c) {
                    DfType::Constant(c.clone())
                } else {
                    DfType::Bottom
                }
            }
            (DfType::Constant(c), DfType::Typed { nullability, .. })
            | (DfType::Typed { nullability, .. }, DfType::Constant(c)) => {
                match (c, nullability) {
                    (Constant::Null, Nullability::NotNull) => DfType::Bottom,
                    (Constant::Null, _) => DfType::null(),
                    (_, Nullability::Null) => DfType::Bottom,
                    _ => DfType::Constant(c.clone()),
                }
            }
            (
                DfType::Typed { ty: a, nullability: na },
                DfType::Typed { ty: b, nullability: nb },
            ) if a == b => {
                let nullability = match (na, nb) {
                    (Nullability::Unknown, n) | (n, Nullability::Unknown) => *n,
                    (Nullability::NotNull, Nullability::Null)
                    | (Nullability::Null, Nullability::NotNull) => return DfType::Bottom,
                    (n, _) => *n,
                };
                DfType::typed(a.clone(), nullability)
            }
            _ => DfType::Bottom,
        }
    }

    pub fn join(&self, other: &DfType) -> DfType {
        match (self, other) {
            (DfType::Bottom, x) | (x, DfType::Bottom) => x.clone(),
            (a, b) if a == b => a.clone(),
            (DfType::Constant(a), DfType::Constant(b)) => {
                match (a.primitive_ty(), b.primitive_ty(), a.as_long(), b.as_long()) {
                    (Some(ta), Some(tb), Some(va), Some(vb)) if ta == tb => DfType::Range {
                        ty: ta,
                        set: LongRangeSet::point(va).unite(&LongRangeSet::point(vb)),
                    },
                    _ => DfType::AnyOf(vec![a.clone(), b.clone()]),
                }
            }
            (DfType::AnyOf(values), DfType::Constant(c))
            | (DfType::Constant(c), DfType::AnyOf(values)) => {
                let mut values = values.clone();
                if !values.contains(c) {
                    values.push(c.clone());
                }
                DfType::AnyOf(values)
            }
            (DfType::AnyOf(a), DfType::AnyOf(b)) => {
                let mut values = a.clone();
                for c in b {
                    if !values.contains(c) {
                        values.push(c.clone());
                    }
                }
                DfType::AnyOf(values)
            }
            (DfType::Range { ty, set }, DfType::Constant(c))
            | (DfType::Constant(c), DfType::Range { ty, set }) => match c.as_long() {
                Some(v) if c.primitive_ty() == Some(*ty) => DfType::Range {
                    ty: *ty,
                    set: set.unite(&LongRangeSet::point(v)),
                },
                _ => DfType::Top,
            },
            (DfType::Range { ty, set: a }, DfType::Range { ty: tb, set: b }) if ty == tb => {
                DfType::Range {
                    ty: *ty,
                    set: a.unite(b),
                }
            }
            (
                DfType::Typed { ty: a, nullability: na },
                DfType::Typed { ty: b, nullability: nb },
            ) if a == b => DfType::typed(a.clone(), na.join(*nb)),
            _ => DfType::Top,
        }
    }

    /// Join of all values; `Bottom` for an empty list.
    pub fn common_value<'a>(values: impl IntoIterator<Item = &'a DfType>) -> DfType {
        values
            .into_iter()
            .fold(DfType::Bottom, |acc, value| acc.join(value))
    }
}

impl From<Constant> for DfType {
    fn from(value: Constant) -> Self {
        DfType::Constant(value)
    }
}

impl fmt::Display for DfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DfType::Top => f.write_str("TOP"),
            DfType::Bottom => f.write_str("BOTTOM"),
            DfType::Constant(c) => write!(f, "{c}"),
            DfType::Range { ty, set } => write!(f, "{} in {set}", ty.name()),
            DfType::Typed { ty, nullability } => match nullability {
                Nullability::NotNull => write!(f, "{ty} (not-null)"),
                Nullability::Nullable => write!(f, "{ty} (nullable)"),
                Nullability::Null => write!(f, "{ty} (null)"),
                Nullability::Unknown => write!(f, "{ty}"),
            },
            DfType::AnyOf(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "one of [{}]", parts.join(", "))
            }
            DfType::Sentinel => f.write_str("SENTINEL"),
            DfType::Fail => f.write_str("FAIL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn join_of_int_constants_is_range() {
        let joined = DfType::int(1).join(&DfType::int(3));
        assert_eq!(
            joined,
            DfType::Range {
                ty: PrimitiveTy::Int,
                set: LongRangeSet::point(1).unite(&LongRangeSet::point(3)),
            }
        );
    }

    #[test]
    fn join_of_strings_is_any_of() {
        let joined = DfType::common_value(&[
            DfType::constant(Constant::str("a")),
            DfType::constant(Constant::str("b")),
        ]);
        assert_eq!(
            joined,
            DfType::AnyOf(vec![Constant::str("a"), Constant::str("b")])
        );
    }

    #[test]
    fn meet_null_with_not_null_is_bottom() {
        let met = DfType::null().meet(&DfType::not_null(Ty::string()));
        assert_eq!(met, DfType::Bottom);
    }

    #[test]
    fn range_collapses_to_point_constant() {
        assert_eq!(DfType::range(PrimitiveTy::Int, 3, 3), DfType::int(3));
        assert_eq!(
            DfType::range(PrimitiveTy::Byte, 100, 1000),
            DfType::Range {
                ty: PrimitiveTy::Byte,
                set: LongRangeSet::range(100, 127)
            }
        );
    }

    #[test]
    fn signed_zero_constants_differ() {
        assert_ne!(Constant::double(0.0), Constant::double(-0.0));
        assert_eq!(Constant::double(-0.0).convert(PrimitiveTy::Int), Some(Constant::Int(0)));
    }
}
