//! Bounded multi-pass AST optimization
//!
//! Each round runs constant folding, algebraic simplification, redundant
//! cast removal, and dead-code elimination over every method body; rounds
//! repeat until one changes nothing, capped at ten. Integer folding uses
//! the source machine's arithmetic: two's-complement wrap-around, truncating
//! division, and shift counts masked to 5 bits (32-bit) or 6 bits (64-bit).

use garnet_ast::{
    BinaryOp, Block, ClassDecl, Expr, ExprKind, Literal, Stmt, StmtKind, Visitor,
};
use garnet_common::{Diagnostics, Location};
use garnet_typeinfer::JvmType;
use hashbrown::HashMap;

const MAX_ROUNDS: usize = 10;

/// The multi-pass optimizer
pub struct OptimizationPipeline {
    applied: usize,
    diagnostics: Diagnostics,
    usage_counts: HashMap<String, usize>,
}

impl Default for OptimizationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationPipeline {
    pub fn new() -> Self {
        Self {
            applied: 0,
            diagnostics: Diagnostics::new(),
            usage_counts: HashMap::new(),
        }
    }

    /// Total rewrites applied so far
    pub fn optimizations_applied(&self) -> usize {
        self.applied
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Identifier usage counts from the most recent analysis pass. Collected
    /// as groundwork for variable inlining; no substitution is performed.
    pub fn usage_counts(&self) -> &HashMap<String, usize> {
        &self.usage_counts
    }

    /// Optimize every method body of a class
    pub fn optimize_class(&mut self, class: &mut ClassDecl) {
        for method in &mut class.methods {
            if let Some(body) = &mut method.body {
                self.optimize_block(body);
            }
        }
        for field in &mut class.fields {
            if let Some(init) = &mut field.init {
                let mut changed = false;
                self.rewrite_expr(init, &mut changed);
            }
        }
    }

    /// Optimize one statement block to a fixed point
    pub fn optimize_block(&mut self, block: &mut Block) {
        for round in 0..MAX_ROUNDS {
            self.collect_usages(block);
            let mut changed = false;
            self.rewrite_block(block, &mut changed);
            if !changed {
                log::debug!("optimizer settled after {} round(s)", round + 1);
                break;
            }
        }
    }

    fn collect_usages(&mut self, block: &Block) {
        struct Counter<'a> {
            counts: &'a mut HashMap<String, usize>,
        }
        impl Visitor for Counter<'_> {
            fn visit_expr(&mut self, expr: &Expr) {
                if let ExprKind::Identifier(name) = &*expr.kind {
                    *self.counts.entry(name.clone()).or_insert(0) += 1;
                }
                garnet_ast::walk_expr(self, expr);
            }
        }
        self.usage_counts.clear();
        let mut counter = Counter { counts: &mut self.usage_counts };
        counter.visit_block(block);
    }

    fn rewrite_block(&mut self, block: &mut Block, changed: &mut bool) {
        for stmt in &mut block.statements {
            self.rewrite_stmt(stmt, changed);
        }

        // Dead-code elimination over the statement list
        let before = block.statements.len();
        block.statements.retain(|stmt| match &stmt.kind {
            StmtKind::Expr(expr) => !expr.is_pure(),
            StmtKind::Empty => false,
            _ => true,
        });
        if block.statements.len() != before {
            self.applied += block.statements.len().abs_diff(before);
            *changed = true;
        }

        // Constant conditions collapse their statement
        for stmt in &mut block.statements {
            let replacement = match &mut stmt.kind {
                StmtKind::If { condition, then_branch, else_branch } => {
                    match condition_truth(condition) {
                        Some(true) => Some(StmtKind::Block(std::mem::take(then_branch))),
                        Some(false) => Some(match else_branch.take() {
                            Some(else_branch) => StmtKind::Block(else_branch),
                            None => StmtKind::Empty,
                        }),
                        None => None,
                    }
                }
                _ => None,
            };
            if let Some(kind) = replacement {
                stmt.kind = kind;
                self.applied += 1;
                *changed = true;
            }
        }
    }

    fn rewrite_stmt(&mut self, stmt: &mut Stmt, changed: &mut bool) {
        match &mut stmt.kind {
            StmtKind::Expr(expr) => self.rewrite_expr(expr, changed),
            StmtKind::VariableDecl { init, .. } => {
                if let Some(init) = init {
                    self.rewrite_expr(init, changed);
                }
            }
            StmtKind::Assign { target, value, .. } => {
                self.rewrite_expr(target, changed);
                self.rewrite_expr(value, changed);
            }
            StmtKind::If { condition, then_branch, else_branch } => {
                self.rewrite_expr(condition, changed);
                self.rewrite_block(then_branch, changed);
                if let Some(else_branch) = else_branch {
                    self.rewrite_block(else_branch, changed);
                }
            }
            StmtKind::While { condition, body } => {
                self.rewrite_expr(condition, changed);
                self.rewrite_block(body, changed);
            }
            StmtKind::DoWhile { body, condition } => {
                self.rewrite_block(body, changed);
                self.rewrite_expr(condition, changed);
            }
            StmtKind::For { init, condition, step, body } => {
                if let Some(init) = init {
                    self.rewrite_stmt(init, changed);
                }
                if let Some(condition) = condition {
                    self.rewrite_expr(condition, changed);
                }
                if let Some(step) = step {
                    self.rewrite_stmt(step, changed);
                }
                self.rewrite_block(body, changed);
            }
            StmtKind::Switch { selector, cases, default } => {
                self.rewrite_expr(selector, changed);
                for case in cases {
                    self.rewrite_block(&mut case.body, changed);
                }
                if let Some(default) = default {
                    self.rewrite_block(default, changed);
                }
            }
            StmtKind::TryCatch { body, handlers, finally } => {
                self.rewrite_block(body, changed);
                for handler in handlers {
                    self.rewrite_block(&mut handler.body, changed);
                }
                if let Some(finally) = finally {
                    self.rewrite_block(finally, changed);
                }
            }
            StmtKind::Synchronized { monitor, body } => {
                self.rewrite_expr(monitor, changed);
                self.rewrite_block(body, changed);
            }
            StmtKind::Labeled { body, .. } | StmtKind::Block(body) => {
                self.rewrite_block(body, changed);
            }
            StmtKind::Return(Some(expr))
            | StmtKind::Throw(expr)
            | StmtKind::MonitorEnter(expr)
            | StmtKind::MonitorExit(expr) => self.rewrite_expr(expr, changed),
            StmtKind::Return(None)
            | StmtKind::Goto { .. }
            | StmtKind::Comment(_)
            | StmtKind::Empty => {}
        }
    }

    /// Bottom-up expression rewrite: children first, then this node
    fn rewrite_expr(&mut self, expr: &mut Expr, changed: &mut bool) {
        match &mut *expr.kind {
            ExprKind::Binary { lhs, rhs, .. } => {
                self.rewrite_expr(lhs, changed);
                self.rewrite_expr(rhs, changed);
            }
            ExprKind::Unary { operand, .. } => self.rewrite_expr(operand, changed),
            ExprKind::Cast { expr, .. } => self.rewrite_expr(expr, changed),
            ExprKind::MethodCall { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    self.rewrite_expr(receiver, changed);
                }
                for arg in args {
                    self.rewrite_expr(arg, changed);
                }
            }
            ExprKind::FieldAccess { object, .. } => {
                if let Some(object) = object {
                    self.rewrite_expr(object, changed);
                }
            }
            ExprKind::ArrayAccess { array, index } => {
                self.rewrite_expr(array, changed);
                self.rewrite_expr(index, changed);
            }
            ExprKind::ArrayLength { array } => self.rewrite_expr(array, changed),
            ExprKind::New { args, .. } => {
                for arg in args {
                    self.rewrite_expr(arg, changed);
                }
            }
            ExprKind::NewArray { dimensions, .. } => {
                for dim in dimensions {
                    self.rewrite_expr(dim, changed);
                }
            }
            ExprKind::InstanceOf { expr, .. } => self.rewrite_expr(expr, changed),
            ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Invalid { .. } => {}
        }

        if let Some(folded) = self.fold(expr) {
            *expr = folded;
            self.applied += 1;
            *changed = true;
        }
    }

    /// One local rewrite of this node, if any applies
    fn fold(&mut self, expr: &Expr) -> Option<Expr> {
        match &*expr.kind {
            ExprKind::Binary { op, lhs, rhs } => self.fold_binary(*op, lhs, rhs),
            ExprKind::Cast { target, expr: inner } => fold_cast(target, inner),
            _ => None,
        }
    }

    fn fold_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
        // Constant folding on two integer literals
        if let (Some(a), Some(b)) = (lhs.as_int_literal(), rhs.as_int_literal()) {
            if let Some(value) = fold_int(op, a, b) {
                return Some(Expr::int(value));
            }
            if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0 {
                self.diagnostics.warning(
                    format!("division by constant zero ({} {} {})", a, op, b),
                    Location::class_level(),
                );
            }
        }
        if let (Some(a), Some(b)) = (lhs.as_long_literal(), rhs.as_long_literal()) {
            if let Some(value) = fold_long(op, a, b) {
                return Some(Expr::literal(Literal::Long(value), JvmType::Long));
            }
        }
        // Shifts mix operand widths: a long shifted by an int count
        if let (Some(a), Some(b)) = (lhs.as_long_literal(), rhs.as_int_literal()) {
            if let Some(value) = fold_long(op, a, b as i64) {
                return Some(Expr::literal(Literal::Long(value), JvmType::Long));
            }
        }

        // Algebraic identities
        let lhs_zero = lhs.is_literal_zero();
        let rhs_zero = rhs.is_literal_zero();
        let lhs_one = lhs.as_int_literal() == Some(1) || lhs.as_long_literal() == Some(1);
        let rhs_one = rhs.as_int_literal() == Some(1) || rhs.as_long_literal() == Some(1);

        match op {
            BinaryOp::Add if rhs_zero => Some(lhs.clone()),
            BinaryOp::Add if lhs_zero => Some(rhs.clone()),
            BinaryOp::Sub if rhs_zero => Some(lhs.clone()),
            BinaryOp::Mul if rhs_one => Some(lhs.clone()),
            BinaryOp::Mul if lhs_one => Some(rhs.clone()),
            // Eliminating the non-literal side is only sound without effects
            BinaryOp::Mul if rhs_zero && lhs.is_pure() => Some(rhs.clone()),
            BinaryOp::Mul if lhs_zero && rhs.is_pure() => Some(lhs.clone()),
            BinaryOp::Div if rhs_one => Some(lhs.clone()),
            BinaryOp::And if rhs_zero && lhs.is_pure() => Some(rhs.clone()),
            BinaryOp::Or if rhs_zero => Some(lhs.clone()),
            _ => None,
        }
    }
}

/// Wrap-around integer folding; comparisons and division by zero are left
/// to the emitter
fn fold_int(op: BinaryOp, a: i32, b: i32) -> Option<i32> {
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b != 0 => a.wrapping_div(b),
        BinaryOp::Rem if b != 0 => a.wrapping_rem(b),
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        // The shift count uses only its low five bits
        BinaryOp::Shl => a.wrapping_shl(b as u32 & 0x1f),
        BinaryOp::Shr => a.wrapping_shr(b as u32 & 0x1f),
        BinaryOp::Ushr => ((a as u32) >> (b as u32 & 0x1f)) as i32,
        _ => return None,
    };
    Some(value)
}

fn fold_long(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b != 0 => a.wrapping_div(b),
        BinaryOp::Rem if b != 0 => a.wrapping_rem(b),
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        // 64-bit shifts mask the count to six bits
        BinaryOp::Shl => a.wrapping_shl(b as u32 & 0x3f),
        BinaryOp::Shr => a.wrapping_shr(b as u32 & 0x3f),
        BinaryOp::Ushr => ((a as u64) >> (b as u32 & 0x3f)) as i64,
        _ => return None,
    };
    Some(value)
}

/// Redundant cast removal
fn fold_cast(target: &JvmType, inner: &Expr) -> Option<Expr> {
    if inner.ty == *target {
        return Some(inner.clone());
    }
    if let ExprKind::Cast { target: inner_target, expr } = &*inner.kind {
        if inner_target == target {
            return Some(Expr::new(
                ExprKind::Cast { target: target.clone(), expr: expr.clone() },
                target.clone(),
            ));
        }
    }
    None
}

/// Truth value of a literal condition, if it is one
fn condition_truth(condition: &Expr) -> Option<bool> {
    match &*condition.kind {
        ExprKind::Literal(Literal::Int(v)) => Some(*v != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn optimize(block: &mut Block) -> OptimizationPipeline {
        let mut pipeline = OptimizationPipeline::new();
        pipeline.optimize_block(block);
        pipeline
    }

    #[test]
    fn test_constant_add_folds() {
        // return (1 + 2) becomes return 3
        let mut block = Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::binary(
            BinaryOp::Add,
            Expr::int(1),
            Expr::int(2),
            JvmType::Int,
        ))))]);
        optimize(&mut block);
        assert_eq!(
            block.statements[0].kind,
            StmtKind::Return(Some(Expr::int(3)))
        );
    }

    #[test]
    fn test_wrapping_arithmetic() {
        let mut block = Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::binary(
            BinaryOp::Add,
            Expr::int(i32::MAX),
            Expr::int(1),
            JvmType::Int,
        ))))]);
        optimize(&mut block);
        assert_eq!(
            block.statements[0].kind,
            StmtKind::Return(Some(Expr::int(i32::MIN)))
        );
    }

    #[test]
    fn test_shift_count_masking() {
        // 1 << 33 behaves as 1 << 1 on the 32-bit machine
        assert_eq!(fold_int(BinaryOp::Shl, 1, 33), Some(2));
        assert_eq!(fold_int(BinaryOp::Ushr, -1, 28), Some(0xf));
        // 64-bit shifts use six bits of the count
        assert_eq!(fold_long(BinaryOp::Shl, 1, 65), Some(2));
    }

    #[test]
    fn test_truncating_division() {
        assert_eq!(fold_int(BinaryOp::Div, -7, 2), Some(-3));
        assert_eq!(fold_int(BinaryOp::Rem, -7, 2), Some(-1));
    }

    #[test]
    fn test_division_by_zero_left_flagged() {
        let mut block = Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::binary(
            BinaryOp::Div,
            Expr::int(4),
            Expr::int(0),
            JvmType::Int,
        ))))]);
        let pipeline = optimize(&mut block);
        // the expression survives and a warning is recorded
        match &block.statements[0].kind {
            StmtKind::Return(Some(expr)) => {
                assert!(matches!(&*expr.kind, ExprKind::Binary { op: BinaryOp::Div, .. }));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
        assert_eq!(pipeline.diagnostics().warning_count(), 1);
    }

    #[test]
    fn test_algebraic_identities() {
        let x = || Expr::identifier("x", JvmType::Int);
        let mut block = Block::new(vec![
            Stmt::assign(x(), Expr::binary(BinaryOp::Add, x(), Expr::int(0), JvmType::Int)),
            Stmt::assign(x(), Expr::binary(BinaryOp::Mul, Expr::int(1), x(), JvmType::Int)),
            Stmt::assign(x(), Expr::binary(BinaryOp::Mul, x(), Expr::int(0), JvmType::Int)),
        ]);
        optimize(&mut block);
        assert_eq!(block.statements[0].kind, StmtKind::Assign { target: x(), op: None, value: x() });
        assert_eq!(block.statements[1].kind, StmtKind::Assign { target: x(), op: None, value: x() });
        assert_eq!(
            block.statements[2].kind,
            StmtKind::Assign { target: x(), op: None, value: Expr::int(0) }
        );
    }

    #[test]
    fn test_redundant_cast_removal() {
        let inner = Expr::identifier("x", JvmType::Int);
        let mut block = Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::new(
            ExprKind::Cast { target: JvmType::Int, expr: inner.clone() },
            JvmType::Int,
        ))))]);
        optimize(&mut block);
        assert_eq!(block.statements[0].kind, StmtKind::Return(Some(inner)));
    }

    #[test]
    fn test_pure_statement_dropped_impure_kept() {
        let call = Expr::new(
            ExprKind::MethodCall {
                receiver: None,
                class_name: Some("java/lang/System".into()),
                name: "gc".into(),
                args: Vec::new(),
                is_static: true,
            },
            JvmType::Void,
        );
        let mut block = Block::new(vec![
            Stmt::expr(Expr::binary(
                BinaryOp::Add,
                Expr::identifier("a", JvmType::Int),
                Expr::int(1),
                JvmType::Int,
            )),
            Stmt::expr(call.clone()),
        ]);
        optimize(&mut block);
        assert_eq!(block.statements.len(), 1);
        assert_eq!(block.statements[0].kind, StmtKind::Expr(call));
    }

    #[test]
    fn test_constant_if_collapses() {
        let then_branch = Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::int(1))))]);
        let mut block = Block::new(vec![Stmt::new(StmtKind::If {
            condition: Expr::int(1),
            then_branch: then_branch.clone(),
            else_branch: Some(Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::int(2))))])),
        })]);
        optimize(&mut block);
        assert_eq!(block.statements[0].kind, StmtKind::Block(then_branch));
    }

    #[test]
    fn test_idempotence() {
        // folding plus identities: a second run must change nothing
        let mut block = Block::new(vec![
            Stmt::new(StmtKind::Return(Some(Expr::binary(
                BinaryOp::Mul,
                Expr::binary(BinaryOp::Add, Expr::int(1), Expr::int(2), JvmType::Int),
                Expr::identifier("x", JvmType::Int),
                JvmType::Int,
            )))),
        ]);
        optimize(&mut block);
        let after_first = block.clone();
        optimize(&mut block);
        assert_eq!(block, after_first);
    }

    #[test]
    fn test_usage_counts_collected() {
        let mut block = Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::binary(
            BinaryOp::Add,
            Expr::identifier("x", JvmType::Int),
            Expr::identifier("x", JvmType::Int),
            JvmType::Int,
        ))))]);
        let pipeline = optimize(&mut block);
        assert_eq!(pipeline.usage_counts().get("x"), Some(&2));
    }
}
