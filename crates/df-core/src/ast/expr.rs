use super::{Block, ClassDecl, MethodId, NodeId, Pattern, SwitchBlock, Ty, VarId};
use crate::span::Span;
use crate::types::{Constant, RelationType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub ty: Ty,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Constant),
    Local(VarId),
    Field {
        qualifier: Option<Box<Expr>>,
        field: VarId,
    },
    This,
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    ArrayInit {
        element: Ty,
        elements: Vec<Expr>,
    },
    NewArray {
        element: Ty,
        dims: Vec<Expr>,
        init: Option<Box<Expr>>,
    },
    New(NewExpr),
    Call(CallExpr),
    Lambda(Lambda),
    MethodRef(MethodRefExpr),
    Assign {
        /// Operator of a compound assignment, `None` for `=`.
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// Polyadic binary expression: `a + b + c` is one node with three operands.
    Binary {
        op: BinaryOp,
        operands: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    InstanceOf {
        operand: Box<Expr>,
        check: InstanceCheck,
    },
    Cast {
        ty: Ty,
        operand: Box<Expr>,
    },
    Switch(Box<SwitchBlock>),
    Paren(Box<Expr>),
    ClassLiteral(Ty),
    /// Placeholder left by the parser for malformed source.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstanceCheck {
    Type(Ty),
    Pattern(Pattern),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpr {
    pub qualifier: Option<Box<Expr>>,
    pub method: Option<MethodId>,
    pub args: Vec<Expr>,
    /// The call site cannot dispatch to an override (`super.m()`, private or final receiver).
    pub statically_bound: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpr {
    pub class: Ty,
    pub ctor: Option<MethodId>,
    /// Outer instance for inner class creation.
    pub qualifier: Option<Box<Expr>>,
    pub args: Vec<Expr>,
    /// Anonymous class body.
    pub body: Option<Box<ClassDecl>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub params: Vec<VarId>,
    pub body: LambdaBody,
    pub return_ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LambdaBody {
    Expr(Box<Expr>),
    Block(Block),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodRefKind {
    /// `Type::staticMethod`
    Static,
    /// `expr::method`, receiver evaluated when the reference is created.
    Bound,
    /// `Type::instanceMethod`, receiver is the first argument.
    Unbound,
    /// `Type::new`
    Constructor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRefExpr {
    pub qualifier: Option<Box<Expr>>,
    pub method: Option<MethodId>,
    pub kind: MethodRefKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    AndAnd,
    OrOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn relation(self) -> Option<RelationType> {
        Some(match self {
            BinaryOp::Eq => RelationType::Eq,
            BinaryOp::Ne => RelationType::Ne,
            BinaryOp::Lt => RelationType::Lt,
            BinaryOp::Le => RelationType::Le,
            BinaryOp::Gt => RelationType::Gt,
            BinaryOp::Ge => RelationType::Ge,
            _ => return None,
        })
    }

    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinaryOp::AndAnd | BinaryOp::OrOr)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
    }

    pub fn is_division(self) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Rem)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::AndAnd => "&&",
            BinaryOp::OrOr => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    pub fn is_increment_or_decrement(self) -> bool {
        matches!(
            self,
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
        )
    }

    pub fn is_postfix(self) -> bool {
        matches!(self, UnaryOp::PostInc | UnaryOp::PostDec)
    }

    pub fn is_increment(self) -> bool {
        matches!(self, UnaryOp::PreInc | UnaryOp::PostInc)
    }
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind, ty: Ty) -> Self {
        Self {
            id,
            kind,
            ty,
            span: Span::synthetic(),
        }
    }

    /// The expression with enclosing parentheses removed.
    pub fn strip_parens(&self) -> &Expr {
        let mut current = self;
        while let ExprKind::Paren(inner) = &current.kind {
            current = inner;
        }
        current
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ExprKind::Error)
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.strip_parens().kind {
            ExprKind::Literal(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_local(&self) -> Option<VarId> {
        match &self.strip_parens().kind {
            ExprKind::Local(var) => Some(*var),
            _ => None,
        }
    }
}
