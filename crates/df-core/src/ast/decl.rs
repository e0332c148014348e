use super::{Ty, JAVA_LANG_OBJECT};
use crate::types::Constant;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("v{_0}")]
pub struct VarId(pub u32);

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("m{_0}")]
pub struct MethodId(pub u32);

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("c{_0}")]
pub struct ClassId(pub u32);

pub const THROWABLE: &str = "java.lang.Throwable";
pub const EXCEPTION: &str = "java.lang.Exception";
pub const ERROR: &str = "java.lang.Error";
pub const RUNTIME_EXCEPTION: &str = "java.lang.RuntimeException";
pub const NULL_POINTER_EXCEPTION: &str = "java.lang.NullPointerException";
pub const ARITHMETIC_EXCEPTION: &str = "java.lang.ArithmeticException";
pub const CLASS_CAST_EXCEPTION: &str = "java.lang.ClassCastException";
pub const INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "java.lang.IndexOutOfBoundsException";
pub const ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "java.lang.ArrayIndexOutOfBoundsException";
pub const ARRAY_STORE_EXCEPTION: &str = "java.lang.ArrayStoreException";
pub const NEGATIVE_ARRAY_SIZE_EXCEPTION: &str = "java.lang.NegativeArraySizeException";
pub const ASSERTION_ERROR: &str = "java.lang.AssertionError";
pub const INCOMPATIBLE_CLASS_CHANGE_ERROR: &str = "java.lang.IncompatibleClassChangeError";

const BUILTIN_SUPERTYPES: &[(&str, &str)] = &[
    (THROWABLE, JAVA_LANG_OBJECT),
    (EXCEPTION, THROWABLE),
    (ERROR, THROWABLE),
    (RUNTIME_EXCEPTION, EXCEPTION),
    ("java.io.IOException", EXCEPTION),
    ("java.lang.InterruptedException", EXCEPTION),
    (NULL_POINTER_EXCEPTION, RUNTIME_EXCEPTION),
    (ARITHMETIC_EXCEPTION, RUNTIME_EXCEPTION),
    (CLASS_CAST_EXCEPTION, RUNTIME_EXCEPTION),
    (INDEX_OUT_OF_BOUNDS_EXCEPTION, RUNTIME_EXCEPTION),
    (ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, INDEX_OUT_OF_BOUNDS_EXCEPTION),
    (ARRAY_STORE_EXCEPTION, RUNTIME_EXCEPTION),
    (NEGATIVE_ARRAY_SIZE_EXCEPTION, RUNTIME_EXCEPTION),
    ("java.lang.IllegalArgumentException", RUNTIME_EXCEPTION),
    ("java.lang.IllegalStateException", RUNTIME_EXCEPTION),
    (ASSERTION_ERROR, ERROR),
    (super::JAVA_UTIL_COLLECTION, super::JAVA_LANG_ITERABLE),
    ("java.util.List", super::JAVA_UTIL_COLLECTION),
    ("java.util.Set", super::JAVA_UTIL_COLLECTION),
    ("java.util.ArrayList", "java.util.List"),
    ("java.util.HashSet", "java.util.Set"),
    ("java.lang.LinkageError", ERROR),
    (INCOMPATIBLE_CLASS_CHANGE_ERROR, "java.lang.LinkageError"),
    ("java.lang.VirtualMachineError", ERROR),
    ("java.lang.OutOfMemoryError", "java.lang.VirtualMachineError"),
    ("java.lang.StackOverflowError", "java.lang.VirtualMachineError"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub owner: ClassId,
    pub is_static: bool,
    /// Position of the declaring member inside its class body.
    pub order: usize,
    /// Compile-time constant initializer, if any.
    pub constant: Option<Constant>,
    pub has_initializer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VarKind {
    Local,
    Parameter,
    CatchParameter,
    PatternBinding,
    Resource,
    Field(FieldInfo),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub id: VarId,
    pub name: String,
    pub ty: Ty,
    pub is_final: bool,
    pub kind: VarKind,
}

impl VarDecl {
    pub fn field(&self) -> Option<&FieldInfo> {
        match &self.kind {
            VarKind::Field(info) => Some(info),
            _ => None,
        }
    }

    pub fn is_field(&self) -> bool {
        self.field().is_some()
    }

    pub fn is_static_field(&self) -> bool {
        self.field().is_some_and(|info| info.is_static)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub id: MethodId,
    pub owner: Option<ClassId>,
    /// Fully qualified name of the declaring class.
    pub class_name: String,
    pub name: String,
    pub params: Vec<Ty>,
    pub varargs: bool,
    pub return_ty: Ty,
    pub is_static: bool,
    pub is_constructor: bool,
    /// A subclass unknown to the tree may override this method.
    pub overridable: bool,
    pub throws: Vec<String>,
    /// The method returns this field unmodified.
    pub getter_of: Option<VarId>,
    /// Single abstract method of a functional interface.
    pub functional: bool,
}

impl MethodDecl {
    pub fn new(id: MethodId, class_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            owner: None,
            class_name: class_name.into(),
            name: name.into(),
            params: Vec::new(),
            varargs: false,
            return_ty: Ty::Void,
            is_static: false,
            is_constructor: false,
            overridable: false,
            throws: Vec::new(),
            getter_of: None,
            functional: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordComponent {
    pub field: VarId,
    pub accessor: Option<MethodId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub superclass: Option<String>,
    pub is_final: bool,
    pub record_components: Vec<RecordComponent>,
}

/// Resolved declarations the tree refers to by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declarations {
    vars: Vec<VarDecl>,
    methods: Vec<MethodDecl>,
    classes: Vec<ClassInfo>,
    supertypes: HashMap<String, String>,
}

impl Declarations {
    pub fn new() -> Self {
        let supertypes = BUILTIN_SUPERTYPES
            .iter()
            .map(|(sub, sup)| (sub.to_string(), sup.to_string()))
            .collect();
        Self {
            vars: Vec::new(),
            methods: Vec::new(),
            classes: Vec::new(),
            supertypes,
        }
    }

    pub fn var(&self, id: VarId) -> &VarDecl {
        &self.vars[id.0 as usize]
    }

    pub fn method(&self, id: MethodId) -> &MethodDecl {
        &self.methods[id.0 as usize]
    }

    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.0 as usize]
    }

    pub fn class_by_name(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|class| class.name == name)
    }

    pub fn add_var(&mut self, name: impl Into<String>, ty: Ty, kind: VarKind) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarDecl {
            id,
            name: name.into(),
            ty,
            is_final: false,
            kind,
        });
        id
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut VarDecl {
        &mut self.vars[id.0 as usize]
    }

    pub fn next_method_id(&self) -> MethodId {
        MethodId(self.methods.len() as u32)
    }

    pub fn add_method(&mut self, mut method: MethodDecl) -> MethodId {
        let id = self.next_method_id();
        method.id = id;
        self.methods.push(method);
        id
    }

    pub fn replace_method(&mut self, method: MethodDecl) {
        let index = method.id.0 as usize;
        self.methods[index] = method;
    }

    pub fn add_class(&mut self, name: impl Into<String>, superclass: Option<String>) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        let name = name.into();
        let superclass = superclass.or_else(|| Some(JAVA_LANG_OBJECT.to_string()));
        if let Some(sup) = &superclass {
            self.supertypes.insert(name.clone(), sup.clone());
        }
        self.classes.push(ClassInfo {
            id,
            name,
            superclass,
            is_final: false,
            record_components: Vec::new(),
        });
        id
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassInfo {
        &mut self.classes[id.0 as usize]
    }

    pub fn declare_supertype(&mut self, sub: impl Into<String>, sup: impl Into<String>) {
        self.supertypes.insert(sub.into(), sup.into());
    }

    /// Reflexive subclass test over the known hierarchy.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sup == JAVA_LANG_OBJECT {
            return true;
        }
        let mut current = Some(sub);
        while let Some(name) = current {
            if name == sup {
                return true;
            }
            current = self.supertypes.get(name).map(String::as_str);
        }
        false
    }

    /// Whether the two types can have common instances along a single inheritance chain.
    pub fn are_related(&self, a: &str, b: &str) -> bool {
        self.is_subtype(a, b) || self.is_subtype(b, a)
    }
}

impl Default for Declarations {
    fn default() -> Self {
        Self::new()
    }
}
