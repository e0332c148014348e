use super::{ClassId, Expr, MethodId, NodeId, Pattern, VarId};
use crate::span::Span;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: NodeId,
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalVar {
    pub var: VarId,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Block(Block),
    Expr(Expr),
    ExprList(Vec<Expr>),
    Decl(Vec<LocalVar>),
    LocalClass(Box<ClassDecl>),
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Option<Expr>,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Option<Expr>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    ForEach {
        param: VarId,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Switch(Box<SwitchBlock>),
    /// `target` is the exited statement, resolved by the tree producer.
    Break {
        target: Option<NodeId>,
    },
    /// `target` is the continued loop statement.
    Continue {
        target: Option<NodeId>,
    },
    Return(Option<Expr>),
    /// `target` is the switch expression receiving the value.
    Yield {
        value: Expr,
        target: Option<NodeId>,
    },
    Throw(Expr),
    Try(Box<TryStmt>),
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    Assert {
        cond: Expr,
        message: Option<Expr>,
    },
    Synchronized {
        lock: Expr,
        body: Block,
    },
    Empty,
    /// Placeholder left by the parser for malformed source.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryStmt {
    pub resources: Option<ResourceList>,
    pub body: Block,
    pub catches: Vec<CatchSection>,
    pub finally: Option<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceList {
    pub id: NodeId,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: NodeId,
    pub kind: ResourceKind,
    /// Exceptions declared by the resource's `close()`.
    pub close_throws: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceKind {
    Decl { var: VarId, init: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchSection {
    pub id: NodeId,
    pub param: VarId,
    /// Caught exception classes; more than one for multi-catch.
    pub types: Vec<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchBlock {
    pub selector: Expr,
    /// Node delimiting the case bodies.
    pub body_id: NodeId,
    pub cases: Vec<SwitchCase>,
}

impl SwitchBlock {
    pub fn is_rule_switch(&self) -> bool {
        self.cases
            .iter()
            .any(|case| !matches!(case.body, CaseBody::Group(_)))
    }

    pub fn default_case(&self) -> Option<&SwitchCase> {
        self.cases
            .iter()
            .find(|case| case.labels.iter().any(|l| matches!(l, CaseLabel::Default)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub id: NodeId,
    pub labels: Vec<CaseLabel>,
    /// `when` guard of a pattern label.
    pub guard: Option<Expr>,
    pub body: CaseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaseLabel {
    Default,
    Expr(Expr),
    Pattern(Pattern),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaseBody {
    /// `case X:` followed by statements; falls through.
    Group(Vec<Stmt>),
    /// `case X -> expr;`
    Expr(Expr),
    /// `case X -> { ... }` or `case X -> throw ...;`
    Stmt(Box<Stmt>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub id: NodeId,
    pub class: ClassId,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: NodeId,
    pub kind: MemberKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberKind {
    Field {
        var: VarId,
        init: Option<Expr>,
    },
    Initializer {
        is_static: bool,
        body: Block,
    },
    Method {
        method: MethodId,
        params: Vec<VarId>,
        body: Option<Block>,
    },
}

impl Stmt {
    pub fn new(id: NodeId, kind: StmtKind) -> Self {
        Self {
            id,
            kind,
            span: Span::synthetic(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, StmtKind::Error)
    }
}
