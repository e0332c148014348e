//! Read-only tree walks used for scoping questions: which variables a region
//! declares, which outer places a closure captures, whether a statement can
//! complete normally.

use super::*;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Stmt(&'a Stmt),
    Expr(&'a Expr),
    Pattern(&'a Pattern),
    Block(&'a Block),
    Class(&'a ClassDecl),
}

/// Pre-order walk. The callback returns `false` to skip the children of a node.
pub fn walk<'a>(node: NodeRef<'a>, f: &mut dyn FnMut(NodeRef<'a>) -> bool) {
    if !f(node) {
        return;
    }
    match node {
        NodeRef::Block(block) => {
            for stmt in &block.stmts {
                walk(NodeRef::Stmt(stmt), f);
            }
        }
        NodeRef::Stmt(stmt) => walk_stmt_children(stmt, f),
        NodeRef::Expr(expr) => walk_expr_children(expr, f),
        NodeRef::Pattern(pattern) => {
            if let PatternKind::Record { components, .. } = &pattern.kind {
                for component in components {
                    walk(NodeRef::Pattern(component), f);
                }
            }
        }
        NodeRef::Class(class) => {
            for member in &class.members {
                match &member.kind {
                    MemberKind::Field { init, .. } => {
                        if let Some(init) = init {
                            walk(NodeRef::Expr(init), f);
                        }
                    }
                    MemberKind::Initializer { body, .. } => walk(NodeRef::Block(body), f),
                    MemberKind::Method { body, .. } => {
                        if let Some(body) = body {
                            walk(NodeRef::Block(body), f);
                        }
                    }
                }
            }
        }
    }
}

fn walk_expr<'a>(expr: &'a Expr, f: &mut dyn FnMut(NodeRef<'a>) -> bool) {
    walk(NodeRef::Expr(expr), f)
}

fn walk_stmt_children<'a>(stmt: &'a Stmt, f: &mut dyn FnMut(NodeRef<'a>) -> bool) {
    match &stmt.kind {
        StmtKind::Block(block) => walk(NodeRef::Block(block), f),
        StmtKind::Expr(e) => walk_expr(e, f),
        StmtKind::ExprList(list) => list.iter().for_each(|e| walk_expr(e, f)),
        StmtKind::Decl(vars) => {
            for local in vars {
                if let Some(init) = &local.init {
                    walk_expr(init, f);
                }
            }
        }
        StmtKind::LocalClass(class) => walk(NodeRef::Class(class), f),
        StmtKind::If {
            cond,
            then,
            otherwise,
        } => {
            walk_expr(cond, f);
            walk(NodeRef::Stmt(then), f);
            if let Some(otherwise) = otherwise {
                walk(NodeRef::Stmt(otherwise), f);
            }
        }
        StmtKind::While { cond, body } => {
            if let Some(cond) = cond {
                walk_expr(cond, f);
            }
            walk(NodeRef::Stmt(body), f);
        }
        StmtKind::DoWhile { body, cond } => {
            walk(NodeRef::Stmt(body), f);
            if let Some(cond) = cond {
                walk_expr(cond, f);
            }
        }
        StmtKind::For {
            init,
            cond,
            update,
            body,
        } => {
            if let Some(init) = init {
                walk(NodeRef::Stmt(init), f);
            }
            if let Some(cond) = cond {
                walk_expr(cond, f);
            }
            if let Some(update) = update {
                walk(NodeRef::Stmt(update), f);
            }
            walk(NodeRef::Stmt(body), f);
        }
        StmtKind::ForEach { iterable, body, .. } => {
            walk_expr(iterable, f);
            walk(NodeRef::Stmt(body), f);
        }
        StmtKind::Switch(switch) => walk_switch(switch, f),
        StmtKind::Return(value) => {
            if let Some(value) = value {
                walk_expr(value, f);
            }
        }
        StmtKind::Yield { value, .. } | StmtKind::Throw(value) => walk_expr(value, f),
        StmtKind::Try(try_stmt) => {
            if let Some(resources) = &try_stmt.resources {
                for resource in &resources.resources {
                    match &resource.kind {
                        ResourceKind::Decl { init, .. } => walk_expr(init, f),
                        ResourceKind::Expr(e) => walk_expr(e, f),
                    }
                }
            }
            walk(NodeRef::Block(&try_stmt.body), f);
            for catch in &try_stmt.catches {
                walk(NodeRef::Block(&catch.body), f);
            }
            if let Some(finally) = &try_stmt.finally {
                walk(NodeRef::Block(finally), f);
            }
        }
        StmtKind::Labeled { body, .. } => walk(NodeRef::Stmt(body), f),
        StmtKind::Assert { cond, message } => {
            walk_expr(cond, f);
            if let Some(message) = message {
                walk_expr(message, f);
            }
        }
        StmtKind::Synchronized { lock, body } => {
            walk_expr(lock, f);
            walk(NodeRef::Block(body), f);
        }
        StmtKind::Break { .. } | StmtKind::Continue { .. } | StmtKind::Empty | StmtKind::Error => {}
    }
}

fn walk_switch<'a>(switch: &'a SwitchBlock, f: &mut dyn FnMut(NodeRef<'a>) -> bool) {
    walk(NodeRef::Expr(&switch.selector), f);
    for case in &switch.cases {
        for label in &case.labels {
            match label {
                CaseLabel::Default => {}
                CaseLabel::Expr(e) => walk(NodeRef::Expr(e), f),
                CaseLabel::Pattern(p) => walk(NodeRef::Pattern(p), f),
            }
        }
        if let Some(guard) = &case.guard {
            walk(NodeRef::Expr(guard), f);
        }
        match &case.body {
            CaseBody::Group(stmts) => stmts.iter().for_each(|s| walk(NodeRef::Stmt(s), f)),
            CaseBody::Expr(e) => walk(NodeRef::Expr(e), f),
            CaseBody::Stmt(s) => walk(NodeRef::Stmt(s), f),
        }
    }
}

fn walk_expr_children<'a>(expr: &'a Expr, f: &mut dyn FnMut(NodeRef<'a>) -> bool) {
    match &expr.kind {
        ExprKind::Field { qualifier, .. } => {
            if let Some(q) = qualifier {
                walk_expr(q, f);
            }
        }
        ExprKind::ArrayAccess { array, index } => {
            walk_expr(array, f);
            walk_expr(index, f);
        }
        ExprKind::ArrayInit { elements, .. } => elements.iter().for_each(|e| walk_expr(e, f)),
        ExprKind::NewArray { dims, init, .. } => {
            dims.iter().for_each(|e| walk_expr(e, f));
            if let Some(init) = init {
                walk_expr(init, f);
            }
        }
        ExprKind::New(new) => {
            if let Some(q) = &new.qualifier {
                walk_expr(q, f);
            }
            new.args.iter().for_each(|e| walk_expr(e, f));
            if let Some(body) = &new.body {
                walk(NodeRef::Class(body), f);
            }
        }
        ExprKind::Call(call) => {
            if let Some(q) = &call.qualifier {
                walk_expr(q, f);
            }
            call.args.iter().for_each(|e| walk_expr(e, f));
        }
        ExprKind::Lambda(lambda) => match &lambda.body {
            LambdaBody::Expr(body) => walk_expr(body, f),
            LambdaBody::Block(body) => walk(NodeRef::Block(body), f),
        },
        ExprKind::MethodRef(method_ref) => {
            if let Some(q) = &method_ref.qualifier {
                walk_expr(q, f);
            }
        }
        ExprKind::Assign { target, value, .. } => {
            walk_expr(target, f);
            walk_expr(value, f);
        }
        ExprKind::Binary { operands, .. } => operands.iter().for_each(|e| walk_expr(e, f)),
        ExprKind::Unary { operand, .. } | ExprKind::Cast { operand, .. } => walk_expr(operand, f),
        ExprKind::Paren(inner) => walk_expr(inner, f),
        ExprKind::Conditional {
            cond,
            then,
            otherwise,
        } => {
            walk_expr(cond, f);
            walk_expr(then, f);
            walk_expr(otherwise, f);
        }
        ExprKind::InstanceOf { operand, check } => {
            walk_expr(operand, f);
            if let InstanceCheck::Pattern(pattern) = check {
                walk(NodeRef::Pattern(pattern), f);
            }
        }
        ExprKind::Switch(switch) => walk_switch(switch, f),
        ExprKind::Literal(_)
        | ExprKind::Local(_)
        | ExprKind::This
        | ExprKind::ClassLiteral(_)
        | ExprKind::Error => {}
    }
}

/// Variables introduced anywhere inside `node`: locals, loop, catch and resource
/// variables, pattern bindings and lambda parameters.
pub fn declared_vars(node: NodeRef<'_>) -> Vec<VarId> {
    let mut vars = Vec::new();
    walk(node, &mut |n| {
        match n {
            NodeRef::Stmt(stmt) => match &stmt.kind {
                StmtKind::Decl(locals) => vars.extend(locals.iter().map(|l| l.var)),
                StmtKind::ForEach { param, .. } => vars.push(*param),
                StmtKind::Try(try_stmt) => {
                    if let Some(resources) = &try_stmt.resources {
                        for resource in &resources.resources {
                            if let ResourceKind::Decl { var, .. } = &resource.kind {
                                vars.push(*var);
                            }
                        }
                    }
                    vars.extend(try_stmt.catches.iter().map(|c| c.param));
                }
                _ => {}
            },
            NodeRef::Pattern(pattern) => vars.extend(pattern.binding()),
            NodeRef::Expr(Expr {
                kind: ExprKind::Lambda(lambda),
                ..
            }) => vars.extend(lambda.params.iter().copied()),
            _ => {}
        }
        true
    });
    vars
}

/// Whether `var` is the target of an assignment or increment inside `node`.
pub fn is_assigned(var: VarId, node: NodeRef<'_>) -> bool {
    let mut assigned = false;
    walk(node, &mut |n| {
        if let NodeRef::Expr(expr) = n {
            match &expr.kind {
                ExprKind::Assign { target, .. } if target.as_local() == Some(var) => {
                    assigned = true
                }
                ExprKind::Unary { op, operand }
                    if op.is_increment_or_decrement() && operand.as_local() == Some(var) =>
                {
                    assigned = true
                }
                _ => {}
            }
        }
        !assigned
    });
    assigned
}

/// Outer state a closure body can observe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captures {
    pub locals: Vec<VarId>,
    pub fields: Vec<VarId>,
    pub uses_this: bool,
}

/// Locals declared outside `node` but read inside it, instance fields reached
/// through implicit `this`, and explicit `this` uses.
pub fn captures(node: NodeRef<'_>, decls: &Declarations) -> Captures {
    let declared: HashSet<VarId> = declared_vars(node).into_iter().collect();
    let mut seen = HashSet::new();
    let mut captures = Captures::default();
    walk(node, &mut |n| {
        if let NodeRef::Expr(expr) = n {
            match &expr.kind {
                ExprKind::Local(var) if !declared.contains(var) && seen.insert(*var) => {
                    captures.locals.push(*var)
                }
                ExprKind::Field {
                    qualifier: None,
                    field,
                } if !decls.var(*field).is_static_field() => {
                    captures.uses_this = true;
                    if seen.insert(*field) {
                        captures.fields.push(*field);
                    }
                }
                ExprKind::This => captures.uses_this = true,
                _ => {}
            }
        }
        true
    });
    captures
}

/// Conservative normal-completion test: `false` only when the statement surely
/// transfers control elsewhere.
pub fn can_complete_normally(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_)
        | StmtKind::Throw(_)
        | StmtKind::Break { .. }
        | StmtKind::Continue { .. }
        | StmtKind::Yield { .. } => false,
        StmtKind::Block(block) => block.stmts.last().map_or(true, can_complete_normally),
        StmtKind::If {
            then,
            otherwise: Some(otherwise),
            ..
        } => can_complete_normally(then) || can_complete_normally(otherwise),
        StmtKind::While { cond: None, body } => contains_break(body),
        StmtKind::For {
            cond: None, body, ..
        } => contains_break(body),
        StmtKind::Labeled { body, .. } => can_complete_normally(body) || contains_break(body),
        StmtKind::Try(try_stmt) => {
            let finally_completes = try_stmt
                .finally
                .as_ref()
                .map_or(true, |b| b.stmts.last().map_or(true, can_complete_normally));
            finally_completes
                && (try_stmt.body.stmts.last().map_or(true, can_complete_normally)
                    || try_stmt
                        .catches
                        .iter()
                        .any(|c| c.body.stmts.last().map_or(true, can_complete_normally)))
        }
        _ => true,
    }
}

fn contains_break(stmt: &Stmt) -> bool {
    let mut found = false;
    walk(NodeRef::Stmt(stmt), &mut |n| {
        if let NodeRef::Stmt(Stmt {
            kind: StmtKind::Break { .. },
            ..
        }) = n
        {
            found = true;
        }
        !found && !matches!(n, NodeRef::Expr(_) | NodeRef::Class(_))
    });
    found
}

/// `return` statements of a block, not looking into nested closures or classes.
pub fn returns_of(block: &Block) -> Vec<Option<&Expr>> {
    let mut returns = Vec::new();
    walk(NodeRef::Block(block), &mut |n| match n {
        NodeRef::Stmt(Stmt {
            kind: StmtKind::Return(value),
            ..
        }) => {
            returns.push(value.as_ref());
            false
        }
        NodeRef::Expr(Expr {
            kind: ExprKind::Lambda(_),
            ..
        })
        | NodeRef::Class(_) => false,
        _ => true,
    });
    returns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_vars_include_nested_bindings() {
        let ast = AstBuilder::new();
        let i = ast.local("i", Ty::INT);
        let s = ast.local("s", Ty::string());
        let body = ast.block(vec![
            ast.decl(i, Some(ast.int(0))),
            ast.if_(
                ast.instance_of_pattern(ast.null(), ast.type_pattern(Ty::string(), Some(s))),
                ast.empty(),
                None,
            ),
        ]);
        let vars = declared_vars(NodeRef::Block(&body));
        assert_eq!(vars, vec![i, s]);
    }

    #[test]
    fn is_assigned_sees_increments() {
        let ast = AstBuilder::new();
        let i = ast.local("i", Ty::INT);
        let stmt = ast.expr_stmt(ast.post_inc(ast.var(i)));
        assert!(is_assigned(i, NodeRef::Stmt(&stmt)));
        let other = ast.local("j", Ty::INT);
        assert!(!is_assigned(other, NodeRef::Stmt(&stmt)));
    }

    #[test]
    fn return_and_throw_do_not_complete() {
        let ast = AstBuilder::new();
        assert!(!can_complete_normally(&ast.return_(None)));
        let block = ast.block_stmt(vec![ast.expr_stmt(ast.int(1)), ast.return_(None)]);
        assert!(!can_complete_normally(&block));
        assert!(can_complete_normally(&ast.expr_stmt(ast.int(1))));
    }
}
