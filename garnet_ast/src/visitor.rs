//! AST visitor pattern implementation for traversal

use crate::ast::*;

/// Trait for immutable AST visitors
pub trait Visitor: Sized {
    fn visit_class(&mut self, class: &ClassDecl) {
        walk_class(self, class);
    }

    fn visit_field(&mut self, field: &FieldDecl) {
        walk_field(self, field);
    }

    fn visit_method(&mut self, method: &MethodDecl) {
        walk_method(self, method);
    }

    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

// Walk functions

pub fn walk_class<V: Visitor>(visitor: &mut V, class: &ClassDecl) {
    for field in &class.fields {
        visitor.visit_field(field);
    }
    for method in &class.methods {
        visitor.visit_method(method);
    }
}

pub fn walk_field<V: Visitor>(visitor: &mut V, field: &FieldDecl) {
    if let Some(init) = &field.init {
        visitor.visit_expr(init);
    }
}

pub fn walk_method<V: Visitor>(visitor: &mut V, method: &MethodDecl) {
    if let Some(body) = &method.body {
        visitor.visit_block(body);
    }
}

pub fn walk_block<V: Visitor>(visitor: &mut V, block: &Block) {
    for stmt in &block.statements {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visitor>(visitor: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Expr(expr) => visitor.visit_expr(expr),
        StmtKind::VariableDecl { init, .. } => {
            if let Some(init) = init {
                visitor.visit_expr(init);
            }
        }
        StmtKind::Assign { target, value, .. } => {
            visitor.visit_expr(target);
            visitor.visit_expr(value);
        }
        StmtKind::If { condition, then_branch, else_branch } => {
            visitor.visit_expr(condition);
            visitor.visit_block(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_block(else_branch);
            }
        }
        StmtKind::While { condition, body } => {
            visitor.visit_expr(condition);
            visitor.visit_block(body);
        }
        StmtKind::DoWhile { body, condition } => {
            visitor.visit_block(body);
            visitor.visit_expr(condition);
        }
        StmtKind::For { init, condition, step, body } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(condition) = condition {
                visitor.visit_expr(condition);
            }
            if let Some(step) = step {
                visitor.visit_stmt(step);
            }
            visitor.visit_block(body);
        }
        StmtKind::Switch { selector, cases, default } => {
            visitor.visit_expr(selector);
            for case in cases {
                visitor.visit_block(&case.body);
            }
            if let Some(default) = default {
                visitor.visit_block(default);
            }
        }
        StmtKind::TryCatch { body, handlers, finally } => {
            visitor.visit_block(body);
            for handler in handlers {
                visitor.visit_block(&handler.body);
            }
            if let Some(finally) = finally {
                visitor.visit_block(finally);
            }
        }
        StmtKind::Synchronized { monitor, body } => {
            visitor.visit_expr(monitor);
            visitor.visit_block(body);
        }
        StmtKind::Labeled { body, .. } => visitor.visit_block(body),
        StmtKind::Block(block) => visitor.visit_block(block),
        StmtKind::Return(expr) => {
            if let Some(expr) = expr {
                visitor.visit_expr(expr);
            }
        }
        StmtKind::Throw(expr)
        | StmtKind::MonitorEnter(expr)
        | StmtKind::MonitorExit(expr) => visitor.visit_expr(expr),
        StmtKind::Goto { .. } | StmtKind::Comment(_) | StmtKind::Empty => {}
    }
}

pub fn walk_expr<V: Visitor>(visitor: &mut V, expr: &Expr) {
    match &*expr.kind {
        ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Invalid { .. } => {}
        ExprKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expr(operand),
        ExprKind::Cast { expr, .. } => visitor.visit_expr(expr),
        ExprKind::MethodCall { receiver, args, .. } => {
            if let Some(receiver) = receiver {
                visitor.visit_expr(receiver);
            }
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::FieldAccess { object, .. } => {
            if let Some(object) = object {
                visitor.visit_expr(object);
            }
        }
        ExprKind::ArrayAccess { array, index } => {
            visitor.visit_expr(array);
            visitor.visit_expr(index);
        }
        ExprKind::ArrayLength { array } => visitor.visit_expr(array),
        ExprKind::New { args, .. } => {
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::NewArray { dimensions, .. } => {
            for dim in dimensions {
                visitor.visit_expr(dim);
            }
        }
        ExprKind::InstanceOf { expr, .. } => visitor.visit_expr(expr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_typeinfer::JvmType;

    /// Counts identifier occurrences per name
    struct IdentCounter {
        count: usize,
    }

    impl Visitor for IdentCounter {
        fn visit_expr(&mut self, expr: &Expr) {
            if matches!(&*expr.kind, ExprKind::Identifier(_)) {
                self.count += 1;
            }
            walk_expr(self, expr);
        }
    }

    #[test]
    fn test_visitor_reaches_nested_expressions() {
        let body = Block::new(vec![
            Stmt::new(StmtKind::If {
                condition: Expr::binary(
                    BinaryOp::Eq,
                    Expr::identifier("x", JvmType::Int),
                    Expr::int(0),
                    JvmType::Boolean,
                ),
                then_branch: Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::identifier(
                    "y",
                    JvmType::Int,
                ))))]),
                else_branch: Some(Block::new(vec![Stmt::new(StmtKind::Return(Some(
                    Expr::binary(
                        BinaryOp::Add,
                        Expr::identifier("x", JvmType::Int),
                        Expr::identifier("y", JvmType::Int),
                        JvmType::Int,
                    ),
                )))])),
            }),
        ]);

        let mut counter = IdentCounter { count: 0 };
        counter.visit_block(&body);
        assert_eq!(counter.count, 4);
    }
}
