use df_core::ast::{Ty, VarId};
use df_core::intern::{Interner, ValueId};
use df_core::types::Constant;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TempId(pub u32);

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp{}", self.0)
    }
}

/// Value derived from another place without a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialField {
    ArrayLength,
    CollectionSize,
    StringLength,
    Unbox,
}

impl SpecialField {
    pub fn name(self) -> &'static str {
        match self {
            SpecialField::ArrayLength => "length",
            SpecialField::CollectionSize => "size",
            SpecialField::StringLength => "length()",
            SpecialField::Unbox => "value",
        }
    }
}

/// Symbolic denotation of an expression whose value can be reused without
/// evaluating it again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StablePlace {
    Var(VarId),
    /// `qualifier` is `None` for static fields.
    Field {
        qualifier: Option<Box<StablePlace>>,
        field: VarId,
    },
    This,
    Constant(Constant),
    ArrayElement {
        array: Box<StablePlace>,
        index: u32,
    },
    Derived {
        qualifier: Box<StablePlace>,
        field: SpecialField,
    },
    Temp(TempId),
    /// Global flag consulted by `assert` statements.
    AssertionsDisabled,
}

impl StablePlace {
    pub fn field(qualifier: Option<StablePlace>, field: VarId) -> Self {
        StablePlace::Field {
            qualifier: qualifier.map(Box::new),
            field,
        }
    }

    pub fn derived(qualifier: StablePlace, field: SpecialField) -> Self {
        StablePlace::Derived {
            qualifier: Box::new(qualifier),
            field,
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            StablePlace::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Whether a value can be written to this place.
    pub fn is_variable(&self) -> bool {
        !matches!(self, StablePlace::Constant(_) | StablePlace::This)
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, StablePlace::Temp(_))
    }

    /// The outermost qualifier chain contains `place`.
    pub fn depends_on(&self, place: &StablePlace) -> bool {
        if self == place {
            return true;
        }
        match self {
            StablePlace::Field {
                qualifier: Some(q), ..
            }
            | StablePlace::ArrayElement { array: q, .. }
            | StablePlace::Derived { qualifier: q, .. } => q.depends_on(place),
            _ => false,
        }
    }
}

impl fmt::Display for StablePlace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StablePlace::Var(var) => write!(f, "{var}"),
            StablePlace::Field {
                qualifier: Some(q),
                field,
            } => write!(f, "{q}.{field}"),
            StablePlace::Field {
                qualifier: None,
                field,
            } => write!(f, "static {field}"),
            StablePlace::This => f.write_str("this"),
            StablePlace::Constant(c) => write!(f, "{c}"),
            StablePlace::ArrayElement { array, index } => write!(f, "{array}[{index}]"),
            StablePlace::Derived { qualifier, field } => write!(f, "{qualifier}.{}", field.name()),
            StablePlace::Temp(temp) => write!(f, "{temp}"),
            StablePlace::AssertionsDisabled => f.write_str("$assertionsDisabled"),
        }
    }
}

/// A place together with its interned token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaceValue {
    pub id: ValueId,
    pub place: StablePlace,
}

/// Interning facility shared across builds: the same place always receives the same token.
#[derive(Default)]
pub struct ValueFactory {
    places: Interner<StablePlace>,
}

impl ValueFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place_value(&self, place: StablePlace) -> PlaceValue {
        PlaceValue {
            id: self.places.intern(&place),
            place,
        }
    }

    pub fn place_of(&self, id: ValueId) -> Option<StablePlace> {
        self.places.resolve(id)
    }

    pub fn interned_count(&self) -> usize {
        self.places.len()
    }
}

/// A temp variable introduced while building a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempVar {
    pub id: TempId,
    pub ty: Ty,
    /// Instruction index at which the temp was created.
    pub location: usize,
}
