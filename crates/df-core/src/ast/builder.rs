use super::*;
use crate::span::Span;
use crate::types::Constant;
use std::cell::{Cell, Ref, RefCell};

/// Allocates node ids and declarations while assembling a tree by hand.
///
/// All constructors take `&self` so calls can nest freely:
/// `ast.if_(ast.var(x), ast.block_stmt(vec![]), None)`.
pub struct AstBuilder {
    next_id: Cell<u32>,
    decls: RefCell<Declarations>,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            decls: RefCell::new(Declarations::new()),
        }
    }

    pub fn reserve(&self) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        NodeId(id)
    }

    pub fn decls(&self) -> Ref<'_, Declarations> {
        self.decls.borrow()
    }

    pub fn finish(self) -> Declarations {
        self.decls.into_inner()
    }

    // ---- declarations ----

    pub fn local(&self, name: &str, ty: Ty) -> VarId {
        self.decls.borrow_mut().add_var(name, ty, VarKind::Local)
    }

    pub fn param(&self, name: &str, ty: Ty) -> VarId {
        self.decls.borrow_mut().add_var(name, ty, VarKind::Parameter)
    }

    pub fn var_of_kind(&self, name: &str, ty: Ty, kind: VarKind) -> VarId {
        self.decls.borrow_mut().add_var(name, ty, kind)
    }

    pub fn class(&self, name: &str) -> ClassId {
        self.decls.borrow_mut().add_class(name, None)
    }

    pub fn field(
        &self,
        owner: ClassId,
        name: &str,
        ty: Ty,
        is_static: bool,
        is_final: bool,
        constant: Option<Constant>,
    ) -> VarId {
        let info = FieldInfo {
            owner,
            is_static,
            order: 0,
            has_initializer: constant.is_some(),
            constant,
        };
        let mut decls = self.decls.borrow_mut();
        let id = decls.add_var(name, ty, VarKind::Field(info));
        decls.var_mut(id).is_final = is_final;
        id
    }

    pub fn set_final(&self, var: VarId) {
        self.decls.borrow_mut().var_mut(var).is_final = true;
    }

    pub fn method(&self, class_name: &str, name: &str, params: Vec<Ty>, return_ty: Ty) -> MethodId {
        let mut decls = self.decls.borrow_mut();
        let mut method = MethodDecl::new(decls.next_method_id(), class_name, name);
        method.params = params;
        method.return_ty = return_ty;
        decls.add_method(method)
    }

    pub fn static_method(
        &self,
        class_name: &str,
        name: &str,
        params: Vec<Ty>,
        return_ty: Ty,
    ) -> MethodId {
        let id = self.method(class_name, name, params, return_ty);
        self.update_method(id, |m| m.is_static = true);
        id
    }

    pub fn update_method(&self, id: MethodId, f: impl FnOnce(&mut MethodDecl)) {
        let mut decls = self.decls.borrow_mut();
        let mut method = decls.method(id).clone();
        f(&mut method);
        decls.replace_method(method);
    }

    pub fn update_class(&self, id: ClassId, f: impl FnOnce(&mut ClassInfo)) {
        f(self.decls.borrow_mut().class_mut(id));
    }

    // ---- expressions ----

    fn expr(&self, kind: ExprKind, ty: Ty) -> Expr {
        Expr {
            id: self.reserve(),
            kind,
            ty,
            span: Span::synthetic(),
        }
    }

    pub fn lit(&self, value: Constant) -> Expr {
        let ty = value.ty();
        self.expr(ExprKind::Literal(value), ty)
    }

    pub fn int(&self, value: i32) -> Expr {
        self.lit(Constant::Int(value))
    }

    pub fn long(&self, value: i64) -> Expr {
        self.lit(Constant::Long(value))
    }

    pub fn double(&self, value: f64) -> Expr {
        self.lit(Constant::double(value))
    }

    pub fn bool_(&self, value: bool) -> Expr {
        self.lit(Constant::Bool(value))
    }

    pub fn str_(&self, value: &str) -> Expr {
        self.lit(Constant::str(value))
    }

    pub fn null(&self) -> Expr {
        self.lit(Constant::Null)
    }

    pub fn var(&self, var: VarId) -> Expr {
        let ty = self.decls.borrow().var(var).ty.clone();
        let kind = if self.decls.borrow().var(var).is_field() {
            ExprKind::Field {
                qualifier: None,
                field: var,
            }
        } else {
            ExprKind::Local(var)
        };
        self.expr(kind, ty)
    }

    pub fn field_of(&self, qualifier: Expr, field: VarId) -> Expr {
        let ty = self.decls.borrow().var(field).ty.clone();
        self.expr(
            ExprKind::Field {
                qualifier: Some(Box::new(qualifier)),
                field,
            },
            ty,
        )
    }

    pub fn this(&self, ty: Ty) -> Expr {
        self.expr(ExprKind::This, ty)
    }

    pub fn call(&self, qualifier: Option<Expr>, method: MethodId, args: Vec<Expr>) -> Expr {
        let ty = self.decls.borrow().method(method).return_ty.clone();
        self.expr(
            ExprKind::Call(CallExpr {
                qualifier: qualifier.map(Box::new),
                method: Some(method),
                args,
                statically_bound: false,
            }),
            ty,
        )
    }

    /// Call whose target could not be resolved.
    pub fn unresolved_call(&self, qualifier: Option<Expr>, args: Vec<Expr>, ty: Ty) -> Expr {
        self.expr(
            ExprKind::Call(CallExpr {
                qualifier: qualifier.map(Box::new),
                method: None,
                args,
                statically_bound: false,
            }),
            ty,
        )
    }

    pub fn binary(&self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        self.polyadic(op, vec![left, right])
    }

    pub fn polyadic(&self, op: BinaryOp, operands: Vec<Expr>) -> Expr {
        let ty = binary_result_ty(op, &operands);
        self.expr(ExprKind::Binary { op, operands }, ty)
    }

    pub fn and(&self, operands: Vec<Expr>) -> Expr {
        self.polyadic(BinaryOp::AndAnd, operands)
    }

    pub fn or(&self, operands: Vec<Expr>) -> Expr {
        self.polyadic(BinaryOp::OrOr, operands)
    }

    pub fn assign(&self, target: Expr, value: Expr) -> Expr {
        let ty = target.ty.clone();
        self.expr(
            ExprKind::Assign {
                op: None,
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn compound_assign(&self, op: BinaryOp, target: Expr, value: Expr) -> Expr {
        let ty = target.ty.clone();
        self.expr(
            ExprKind::Assign {
                op: Some(op),
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
        )
    }

    pub fn unary(&self, op: UnaryOp, operand: Expr) -> Expr {
        let ty = match op {
            UnaryOp::Not => Ty::BOOLEAN,
            UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot => operand
                .ty
                .unboxed()
                .map(|p| Ty::Primitive(p.promoted()))
                .unwrap_or(Ty::Unknown),
            _ => operand.ty.clone(),
        };
        self.expr(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn not(&self, operand: Expr) -> Expr {
        self.unary(UnaryOp::Not, operand)
    }

    pub fn post_inc(&self, operand: Expr) -> Expr {
        self.unary(UnaryOp::PostInc, operand)
    }

    pub fn pre_inc(&self, operand: Expr) -> Expr {
        self.unary(UnaryOp::PreInc, operand)
    }

    pub fn conditional(&self, cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        let ty = if then.ty == otherwise.ty {
            then.ty.clone()
        } else {
            match (then.ty.unboxed(), otherwise.ty.unboxed()) {
                (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() => {
                    Ty::Primitive(a.binary_promotion(b))
                }
                _ => Ty::object(),
            }
        };
        self.expr(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            ty,
        )
    }

    pub fn instance_of(&self, operand: Expr, ty: Ty) -> Expr {
        self.expr(
            ExprKind::InstanceOf {
                operand: Box::new(operand),
                check: InstanceCheck::Type(ty),
            },
            Ty::BOOLEAN,
        )
    }

    pub fn instance_of_pattern(&self, operand: Expr, pattern: Pattern) -> Expr {
        self.expr(
            ExprKind::InstanceOf {
                operand: Box::new(operand),
                check: InstanceCheck::Pattern(pattern),
            },
            Ty::BOOLEAN,
        )
    }

    pub fn cast(&self, ty: Ty, operand: Expr) -> Expr {
        self.expr(
            ExprKind::Cast {
                ty: ty.clone(),
                operand: Box::new(operand),
            },
            ty,
        )
    }

    pub fn paren(&self, inner: Expr) -> Expr {
        let ty = inner.ty.clone();
        self.expr(ExprKind::Paren(Box::new(inner)), ty)
    }

    pub fn array_access(&self, array: Expr, index: Expr) -> Expr {
        let ty = array.ty.element().cloned().unwrap_or(Ty::Unknown);
        self.expr(
            ExprKind::ArrayAccess {
                array: Box::new(array),
                index: Box::new(index),
            },
            ty,
        )
    }

    pub fn array_init(&self, element: Ty, elements: Vec<Expr>) -> Expr {
        let ty = Ty::array_of(element.clone());
        self.expr(ExprKind::ArrayInit { element, elements }, ty)
    }

    pub fn new_array(&self, element: Ty, dims: Vec<Expr>, init: Option<Expr>) -> Expr {
        let mut ty = element.clone();
        for _ in 0..dims.len().max(1) {
            ty = Ty::array_of(ty);
        }
        self.expr(
            ExprKind::NewArray {
                element,
                dims,
                init: init.map(Box::new),
            },
            ty,
        )
    }

    pub fn new_object(&self, class: Ty, ctor: Option<MethodId>, args: Vec<Expr>) -> Expr {
        self.expr(
            ExprKind::New(NewExpr {
                class: class.clone(),
                ctor,
                qualifier: None,
                args,
                body: None,
            }),
            class,
        )
    }

    pub fn anonymous(&self, class: Ty, args: Vec<Expr>, body: ClassDecl) -> Expr {
        self.expr(
            ExprKind::New(NewExpr {
                class: class.clone(),
                ctor: None,
                qualifier: None,
                args,
                body: Some(Box::new(body)),
            }),
            class,
        )
    }

    pub fn lambda(&self, params: Vec<VarId>, body: Expr, fn_ty: Ty) -> Expr {
        let return_ty = body.ty.clone();
        self.expr(
            ExprKind::Lambda(Lambda {
                params,
                body: LambdaBody::Expr(Box::new(body)),
                return_ty,
            }),
            fn_ty,
        )
    }

    pub fn lambda_block(&self, params: Vec<VarId>, body: Block, return_ty: Ty, fn_ty: Ty) -> Expr {
        self.expr(
            ExprKind::Lambda(Lambda {
                params,
                body: LambdaBody::Block(body),
                return_ty,
            }),
            fn_ty,
        )
    }

    pub fn method_ref(
        &self,
        kind: MethodRefKind,
        qualifier: Option<Expr>,
        method: Option<MethodId>,
        fn_ty: Ty,
    ) -> Expr {
        self.expr(
            ExprKind::MethodRef(MethodRefExpr {
                qualifier: qualifier.map(Box::new),
                method,
                kind,
            }),
            fn_ty,
        )
    }

    pub fn class_literal(&self, ty: Ty) -> Expr {
        self.expr(ExprKind::ClassLiteral(ty), Ty::class(JAVA_LANG_CLASS))
    }

    pub fn switch_expr(&self, selector: Expr, cases: Vec<SwitchCase>, ty: Ty) -> Expr {
        let switch = self.switch_block(selector, cases);
        self.expr(ExprKind::Switch(Box::new(switch)), ty)
    }

    /// Switch expression whose node id was reserved earlier, so `yield` can name it.
    pub fn switch_expr_with_id(
        &self,
        id: NodeId,
        selector: Expr,
        cases: Vec<SwitchCase>,
        ty: Ty,
    ) -> Expr {
        let mut expr = self.switch_expr(selector, cases, ty);
        expr.id = id;
        expr
    }

    pub fn error_expr(&self) -> Expr {
        self.expr(ExprKind::Error, Ty::Unknown)
    }

    // ---- patterns ----

    fn pattern(&self, kind: PatternKind) -> Pattern {
        Pattern {
            id: self.reserve(),
            kind,
            span: Span::synthetic(),
        }
    }

    pub fn type_pattern(&self, ty: Ty, binding: Option<VarId>) -> Pattern {
        self.pattern(PatternKind::Type { ty, binding })
    }

    pub fn record_pattern(&self, ty: Ty, components: Vec<Pattern>, binding: Option<VarId>) -> Pattern {
        self.pattern(PatternKind::Record {
            ty,
            components,
            binding,
        })
    }

    pub fn unnamed_pattern(&self, ty: Ty) -> Pattern {
        self.pattern(PatternKind::Unnamed(ty))
    }

    // ---- statements ----

    fn stmt(&self, kind: StmtKind) -> Stmt {
        Stmt {
            id: self.reserve(),
            kind,
            span: Span::synthetic(),
        }
    }

    /// Give a statement an id reserved earlier, e.g. the target of a `break`.
    pub fn with_id(&self, id: NodeId, mut stmt: Stmt) -> Stmt {
        stmt.id = id;
        stmt
    }

    pub fn block(&self, stmts: Vec<Stmt>) -> Block {
        Block {
            id: self.reserve(),
            stmts,
            span: Span::synthetic(),
        }
    }

    pub fn block_stmt(&self, stmts: Vec<Stmt>) -> Stmt {
        let block = self.block(stmts);
        self.stmt(StmtKind::Block(block))
    }

    pub fn expr_stmt(&self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn expr_list(&self, exprs: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::ExprList(exprs))
    }

    pub fn decl(&self, var: VarId, init: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Decl(vec![LocalVar { var, init }]))
    }

    pub fn local_class(&self, class: ClassDecl) -> Stmt {
        self.stmt(StmtKind::LocalClass(Box::new(class)))
    }

    pub fn if_(&self, cond: Expr, then: Stmt, otherwise: Option<Stmt>) -> Stmt {
        self.stmt(StmtKind::If {
            cond,
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        })
    }

    pub fn while_(&self, cond: Option<Expr>, body: Stmt) -> Stmt {
        self.stmt(StmtKind::While {
            cond,
            body: Box::new(body),
        })
    }

    pub fn do_while(&self, body: Stmt, cond: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::DoWhile {
            body: Box::new(body),
            cond,
        })
    }

    pub fn for_(
        &self,
        init: Option<Stmt>,
        cond: Option<Expr>,
        update: Option<Stmt>,
        body: Stmt,
    ) -> Stmt {
        self.stmt(StmtKind::For {
            init: init.map(Box::new),
            cond,
            update: update.map(Box::new),
            body: Box::new(body),
        })
    }

    pub fn foreach(&self, param: VarId, iterable: Expr, body: Stmt) -> Stmt {
        self.stmt(StmtKind::ForEach {
            param,
            iterable,
            body: Box::new(body),
        })
    }

    fn switch_block(&self, selector: Expr, cases: Vec<SwitchCase>) -> SwitchBlock {
        SwitchBlock {
            selector,
            body_id: self.reserve(),
            cases,
        }
    }

    pub fn switch_stmt(&self, selector: Expr, cases: Vec<SwitchCase>) -> Stmt {
        let switch = self.switch_block(selector, cases);
        self.stmt(StmtKind::Switch(Box::new(switch)))
    }

    fn case(&self, labels: Vec<CaseLabel>, body: CaseBody) -> SwitchCase {
        SwitchCase {
            id: self.reserve(),
            labels,
            guard: None,
            body,
        }
    }

    pub fn case_group(&self, labels: Vec<CaseLabel>, stmts: Vec<Stmt>) -> SwitchCase {
        self.case(labels, CaseBody::Group(stmts))
    }

    pub fn case_expr(&self, labels: Vec<CaseLabel>, value: Expr) -> SwitchCase {
        self.case(labels, CaseBody::Expr(value))
    }

    pub fn case_stmt(&self, labels: Vec<CaseLabel>, body: Stmt) -> SwitchCase {
        self.case(labels, CaseBody::Stmt(Box::new(body)))
    }

    pub fn guarded(&self, mut case: SwitchCase, guard: Expr) -> SwitchCase {
        case.guard = Some(guard);
        case
    }

    pub fn break_(&self, target: Option<NodeId>) -> Stmt {
        self.stmt(StmtKind::Break { target })
    }

    pub fn continue_(&self, target: Option<NodeId>) -> Stmt {
        self.stmt(StmtKind::Continue { target })
    }

    pub fn return_(&self, value: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(value))
    }

    pub fn yield_(&self, value: Expr, target: Option<NodeId>) -> Stmt {
        self.stmt(StmtKind::Yield { value, target })
    }

    pub fn throw_(&self, exception: Expr) -> Stmt {
        self.stmt(StmtKind::Throw(exception))
    }

    pub fn catch_(&self, param: VarId, types: Vec<&str>, body: Block) -> CatchSection {
        CatchSection {
            id: self.reserve(),
            param,
            types: types.into_iter().map(str::to_string).collect(),
            body,
        }
    }

    pub fn try_(&self, body: Block, catches: Vec<CatchSection>, finally: Option<Block>) -> Stmt {
        self.stmt(StmtKind::Try(Box::new(TryStmt {
            resources: None,
            body,
            catches,
            finally,
        })))
    }

    pub fn resource_decl(&self, var: VarId, init: Expr, close_throws: Vec<&str>) -> Resource {
        Resource {
            id: self.reserve(),
            kind: ResourceKind::Decl { var, init },
            close_throws: close_throws.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn try_with_resources(
        &self,
        resources: Vec<Resource>,
        body: Block,
        catches: Vec<CatchSection>,
        finally: Option<Block>,
    ) -> Stmt {
        let resources = ResourceList {
            id: self.reserve(),
            resources,
        };
        self.stmt(StmtKind::Try(Box::new(TryStmt {
            resources: Some(resources),
            body,
            catches,
            finally,
        })))
    }

    pub fn labeled(&self, label: &str, body: Stmt) -> Stmt {
        self.stmt(StmtKind::Labeled {
            label: label.to_string(),
            body: Box::new(body),
        })
    }

    pub fn assert_(&self, cond: Expr, message: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Assert { cond, message })
    }

    pub fn synchronized(&self, lock: Expr, body: Block) -> Stmt {
        self.stmt(StmtKind::Synchronized { lock, body })
    }

    pub fn empty(&self) -> Stmt {
        self.stmt(StmtKind::Empty)
    }

    pub fn error_stmt(&self) -> Stmt {
        self.stmt(StmtKind::Error)
    }

    // ---- classes ----

    pub fn field_member(&self, var: VarId, init: Option<Expr>) -> Member {
        Member {
            id: self.reserve(),
            kind: MemberKind::Field { var, init },
        }
    }

    pub fn initializer(&self, is_static: bool, body: Block) -> Member {
        Member {
            id: self.reserve(),
            kind: MemberKind::Initializer { is_static, body },
        }
    }

    /// Class body; field declaration order is taken from member positions.
    pub fn class_decl(&self, class: ClassId, members: Vec<Member>) -> ClassDecl {
        {
            let mut decls = self.decls.borrow_mut();
            for (order, member) in members.iter().enumerate() {
                if let MemberKind::Field { var, init } = &member.kind {
                    let has_init = init.is_some();
                    if let VarKind::Field(info) = &mut decls.var_mut(*var).kind {
                        info.order = order;
                        info.has_initializer = info.has_initializer || has_init;
                    }
                }
            }
        }
        ClassDecl {
            id: self.reserve(),
            class,
            members,
        }
    }
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn binary_result_ty(op: BinaryOp, operands: &[Expr]) -> Ty {
    if op.relation().is_some() || op.is_short_circuit() {
        return Ty::BOOLEAN;
    }
    if op == BinaryOp::Add && operands.iter().any(|e| e.ty.is_string()) {
        return Ty::string();
    }
    if op.is_bitwise() && operands.iter().all(|e| e.ty.is_boolean()) {
        return Ty::BOOLEAN;
    }
    let mut prims = operands.iter().map(|e| e.ty.unboxed());
    let Some(Some(first)) = prims.next() else {
        return Ty::Unknown;
    };
    if op.is_shift() {
        return Ty::Primitive(first.promoted());
    }
    let mut result = first.promoted();
    for prim in prims {
        match prim {
            Some(prim) => result = result.binary_promotion(prim),
            None => return Ty::Unknown,
        }
    }
    Ty::Primitive(result)
}
