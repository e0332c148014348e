use serde::{Deserialize, Serialize};
use std::fmt;

pub const JAVA_LANG_OBJECT: &str = "java.lang.Object";
pub const JAVA_LANG_STRING: &str = "java.lang.String";
pub const JAVA_LANG_CLASS: &str = "java.lang.Class";
pub const JAVA_LANG_ITERABLE: &str = "java.lang.Iterable";
pub const JAVA_UTIL_COLLECTION: &str = "java.util.Collection";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveTy {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveTy {
    pub const NUMERIC: [PrimitiveTy; 7] = [
        PrimitiveTy::Byte,
        PrimitiveTy::Char,
        PrimitiveTy::Short,
        PrimitiveTy::Int,
        PrimitiveTy::Long,
        PrimitiveTy::Float,
        PrimitiveTy::Double,
    ];

    pub fn is_numeric(self) -> bool {
        self != PrimitiveTy::Boolean
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveTy::Byte | PrimitiveTy::Char | PrimitiveTy::Short | PrimitiveTy::Int | PrimitiveTy::Long
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, PrimitiveTy::Float | PrimitiveTy::Double)
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveTy::Boolean => "boolean",
            PrimitiveTy::Byte => "byte",
            PrimitiveTy::Char => "char",
            PrimitiveTy::Short => "short",
            PrimitiveTy::Int => "int",
            PrimitiveTy::Long => "long",
            PrimitiveTy::Float => "float",
            PrimitiveTy::Double => "double",
        }
    }

    pub fn wrapper_name(self) -> &'static str {
        match self {
            PrimitiveTy::Boolean => "java.lang.Boolean",
            PrimitiveTy::Byte => "java.lang.Byte",
            PrimitiveTy::Char => "java.lang.Character",
            PrimitiveTy::Short => "java.lang.Short",
            PrimitiveTy::Int => "java.lang.Integer",
            PrimitiveTy::Long => "java.lang.Long",
            PrimitiveTy::Float => "java.lang.Float",
            PrimitiveTy::Double => "java.lang.Double",
        }
    }

    pub fn from_wrapper(name: &str) -> Option<PrimitiveTy> {
        let all = [PrimitiveTy::Boolean]
            .into_iter()
            .chain(PrimitiveTy::NUMERIC);
        for prim in all {
            if prim.wrapper_name() == name {
                return Some(prim);
            }
        }
        None
    }

    /// Inclusive value range of an integral type, widened to `i64`.
    pub fn integral_bounds(self) -> Option<(i64, i64)> {
        match self {
            PrimitiveTy::Byte => Some((i8::MIN as i64, i8::MAX as i64)),
            PrimitiveTy::Char => Some((0, u16::MAX as i64)),
            PrimitiveTy::Short => Some((i16::MIN as i64, i16::MAX as i64)),
            PrimitiveTy::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            PrimitiveTy::Long => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Whether a value of `self` converts to `to` by identity or widening.
    pub fn widens_to(self, to: PrimitiveTy) -> bool {
        use PrimitiveTy::*;
        if self == to {
            return true;
        }
        match self {
            Byte => matches!(to, Short | Int | Long | Float | Double),
            Short | Char => matches!(to, Int | Long | Float | Double),
            Int => matches!(to, Long | Float | Double),
            Long => matches!(to, Float | Double),
            Float => to == Double,
            Boolean | Double => false,
        }
    }

    /// Unary numeric promotion.
    pub fn promoted(self) -> PrimitiveTy {
        match self {
            PrimitiveTy::Byte | PrimitiveTy::Short | PrimitiveTy::Char => PrimitiveTy::Int,
            other => other,
        }
    }

    /// Binary numeric promotion.
    pub fn binary_promotion(self, other: PrimitiveTy) -> PrimitiveTy {
        use PrimitiveTy::*;
        if self == Double || other == Double {
            Double
        } else if self == Float || other == Float {
            Float
        } else if self == Long || other == Long {
            Long
        } else {
            Int
        }
    }
}

/// Static type of an expression or declaration, as far as the tree knows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    Primitive(PrimitiveTy),
    Void,
    Null,
    Class(String),
    Array(Box<Ty>),
    Unknown,
}

impl Ty {
    pub const BOOLEAN: Ty = Ty::Primitive(PrimitiveTy::Boolean);
    pub const BYTE: Ty = Ty::Primitive(PrimitiveTy::Byte);
    pub const CHAR: Ty = Ty::Primitive(PrimitiveTy::Char);
    pub const SHORT: Ty = Ty::Primitive(PrimitiveTy::Short);
    pub const INT: Ty = Ty::Primitive(PrimitiveTy::Int);
    pub const LONG: Ty = Ty::Primitive(PrimitiveTy::Long);
    pub const FLOAT: Ty = Ty::Primitive(PrimitiveTy::Float);
    pub const DOUBLE: Ty = Ty::Primitive(PrimitiveTy::Double);

    pub fn class(name: impl Into<String>) -> Ty {
        Ty::Class(name.into())
    }

    pub fn object() -> Ty {
        Ty::class(JAVA_LANG_OBJECT)
    }

    pub fn string() -> Ty {
        Ty::class(JAVA_LANG_STRING)
    }

    pub fn array_of(element: Ty) -> Ty {
        Ty::Array(Box::new(element))
    }

    pub fn boxed_of(prim: PrimitiveTy) -> Ty {
        Ty::class(prim.wrapper_name())
    }

    pub fn primitive(&self) -> Option<PrimitiveTy> {
        match self {
            Ty::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Ty::Primitive(_))
    }

    pub fn is_boolean(&self) -> bool {
        self.unboxed() == Some(PrimitiveTy::Boolean)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Ty::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Ty::Class(_) | Ty::Array(_) | Ty::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Ty::Class(name) if name == JAVA_LANG_STRING)
    }

    /// Primitive behind a wrapper class.
    pub fn wrapped_primitive(&self) -> Option<PrimitiveTy> {
        match self {
            Ty::Class(name) => PrimitiveTy::from_wrapper(name),
            _ => None,
        }
    }

    pub fn is_boxed(&self) -> bool {
        self.wrapped_primitive().is_some()
    }

    /// The primitive view of this type: itself when primitive, the wrapped type when boxed.
    pub fn unboxed(&self) -> Option<PrimitiveTy> {
        self.primitive().or_else(|| self.wrapped_primitive())
    }

    pub fn boxed(&self) -> Ty {
        match self {
            Ty::Primitive(p) => Ty::boxed_of(*p),
            other => other.clone(),
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            Ty::Class(name) => Some(name),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&Ty> {
        match self {
            Ty::Array(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Ty::Array(_))
    }
}

impl From<PrimitiveTy> for Ty {
    fn from(prim: PrimitiveTy) -> Self {
        Ty::Primitive(prim)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Primitive(p) => f.write_str(p.name()),
            Ty::Void => f.write_str("void"),
            Ty::Null => f.write_str("null"),
            Ty::Class(name) => f.write_str(name.rsplit('.').next().unwrap_or(name)),
            Ty::Array(element) => write!(f, "{element}[]"),
            Ty::Unknown => f.write_str("?"),
        }
    }
}
