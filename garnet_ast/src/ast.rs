//! Node definitions for the reconstructed tree

use garnet_typeinfer::JvmType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An expression with its inferred type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: Box<ExprKind>,
    pub ty: JvmType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Literal value
    Literal(Literal),
    /// Variable reference
    Identifier(String),
    /// Binary operation
    Binary { op: BinaryOp, lhs: Expr, rhs: Expr },
    /// Unary operation
    Unary { op: UnaryOp, operand: Expr },
    /// Type cast
    Cast { target: JvmType, expr: Expr },
    /// Method invocation; `receiver` is `None` for static calls
    MethodCall {
        receiver: Option<Expr>,
        class_name: Option<String>,
        name: String,
        args: Vec<Expr>,
        is_static: bool,
    },
    /// Field read; `object` is `None` for static fields
    FieldAccess {
        object: Option<Expr>,
        class_name: Option<String>,
        name: String,
        is_static: bool,
    },
    /// Array element read
    ArrayAccess { array: Expr, index: Expr },
    /// The implicit `length` pseudo-field of arrays
    ArrayLength { array: Expr },
    /// Constructor call `new T(args)`
    New { class_name: String, args: Vec<Expr> },
    /// Array allocation; one dimension expression per allocated dimension
    NewArray { element: JvmType, dimensions: Vec<Expr> },
    /// `expr instanceof T`
    InstanceOf { expr: Expr, class_name: String },
    /// Placeholder synthesized where rebuilding failed; carries the
    /// offending pc in its message
    Invalid { message: String },
}

/// Literal values as they appear in the constant pool or inline operands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// A class literal such as `String.class`
    Class(String),
}

/// NaN ordering discipline of a floating-point comparison opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpNan {
    /// Integral comparison, NaN cannot occur
    Integral,
    /// NaN compares as less-than (`fcmpl`, `dcmpl`)
    NanLow,
    /// NaN compares as greater-than (`fcmpg`, `dcmpg`)
    NanHigh,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    // Bitwise
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
    // Comparison
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    /// Three-way comparison (`lcmp`, `fcmpl/g`, `dcmpl/g`), tagged with its
    /// NaN discipline
    Cmp(CmpNan),
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Ge | Self::Gt | Self::Le | Self::Cmp(_)
        )
    }

    /// The comparison with reversed truth value, where one exists
    pub fn negated(&self) -> Option<BinaryOp> {
        match self {
            Self::Eq => Some(Self::Ne),
            Self::Ne => Some(Self::Eq),
            Self::Lt => Some(Self::Ge),
            Self::Ge => Some(Self::Lt),
            Self::Gt => Some(Self::Le),
            Self::Le => Some(Self::Gt),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Ushr => ">>>",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Cmp(_) => "<=>",
        };
        write!(f, "{}", op)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Neg => write!(f, "-"),
            Self::Not => write!(f, "!"),
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, ty: JvmType) -> Self {
        Self { kind: Box::new(kind), ty }
    }

    pub fn literal(literal: Literal, ty: JvmType) -> Self {
        Self::new(ExprKind::Literal(literal), ty)
    }

    pub fn int(value: i32) -> Self {
        Self::literal(Literal::Int(value), JvmType::Int)
    }

    pub fn identifier(name: impl Into<String>, ty: JvmType) -> Self {
        Self::new(ExprKind::Identifier(name.into()), ty)
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, ty: JvmType) -> Self {
        Self::new(ExprKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ExprKind::Invalid { message: message.into() }, JvmType::Unknown)
    }

    pub fn as_int_literal(&self) -> Option<i32> {
        match &*self.kind {
            ExprKind::Literal(Literal::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long_literal(&self) -> Option<i64> {
        match &*self.kind {
            ExprKind::Literal(Literal::Long(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn is_literal_zero(&self) -> bool {
        matches!(
            &*self.kind,
            ExprKind::Literal(Literal::Int(0)) | ExprKind::Literal(Literal::Long(0))
        )
    }

    /// True for expressions whose evaluation cannot have side effects.
    /// Method calls, constructor calls, and array/field reads are treated
    /// as impure (a read may throw).
    pub fn is_pure(&self) -> bool {
        match &*self.kind {
            ExprKind::Literal(_) | ExprKind::Identifier(_) => true,
            ExprKind::Binary { lhs, rhs, .. } => lhs.is_pure() && rhs.is_pure(),
            ExprKind::Unary { operand, .. } => operand.is_pure(),
            ExprKind::Cast { expr, .. } => expr.is_pure(),
            ExprKind::InstanceOf { expr, .. } => expr.is_pure(),
            _ => false,
        }
    }
}

/// A statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// Expression evaluated for its side effect
    Expr(Expr),
    /// Local declaration with optional initializer
    VariableDecl {
        name: String,
        var_type: JvmType,
        init: Option<Expr>,
    },
    /// Assignment; `op` is `Some` for compound forms such as `+=`
    Assign {
        target: Expr,
        op: Option<BinaryOp>,
        value: Expr,
    },
    If {
        condition: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While { condition: Expr, body: Block },
    DoWhile { body: Block, condition: Expr },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Block,
    },
    Switch {
        selector: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Block>,
    },
    TryCatch {
        body: Block,
        handlers: Vec<CatchClause>,
        finally: Option<Block>,
    },
    Synchronized { monitor: Expr, body: Block },
    /// Unstructured residue: a labeled region and the jumps into it
    Labeled { label: String, body: Block },
    Goto { label: String },
    Block(Block),
    Return(Option<Expr>),
    Throw(Expr),
    MonitorEnter(Expr),
    MonitorExit(Expr),
    /// Pass-through for content the rebuilder could not express
    Comment(String),
    Empty,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind }
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(StmtKind::Expr(expr))
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::new(StmtKind::Assign { target, op: None, value })
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(StmtKind::Comment(text.into()))
    }
}

/// A brace-delimited statement sequence
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

impl Block {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stmt: Stmt) {
        self.statements.push(stmt);
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// One arm of a `switch`; several selector values may share a body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub values: Vec<i32>,
    pub body: Block,
    /// Absent `break`: control continues into the next case
    pub falls_through: bool,
}

/// One `catch` clause of a `try` statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    /// Binary class name of the caught type; `None` for catch-all
    pub exception_type: Option<String>,
    pub variable: String,
    pub body: Block,
}

/// Method parameter declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub param_type: JvmType,
}

/// A reconstructed method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub modifiers: Vec<String>,
    pub name: String,
    pub params: Vec<ParamDecl>,
    /// `None` for void and constructors
    pub return_type: Option<JvmType>,
    pub throws: Vec<String>,
    /// `None` for abstract, native, and degraded methods
    pub body: Option<Block>,
    pub is_constructor: bool,
    pub is_static_initializer: bool,
}

/// A reconstructed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub modifiers: Vec<String>,
    pub name: String,
    pub field_type: JvmType,
    pub init: Option<Expr>,
}

/// The root of a decompiled class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub modifiers: Vec<String>,
    /// Binary name (`com/example/Main`)
    pub name: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub is_interface: bool,
    pub source_file: Option<String>,
}

impl ClassDecl {
    /// Package part of the binary name, if any
    pub fn package(&self) -> Option<String> {
        self.name.rsplit_once('/').map(|(pkg, _)| pkg.replace('/', "."))
    }

    /// Simple (unqualified) class name
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purity() {
        let pure = Expr::binary(BinaryOp::Add, Expr::int(1), Expr::int(2), JvmType::Int);
        assert!(pure.is_pure());

        let call = Expr::new(
            ExprKind::MethodCall {
                receiver: None,
                class_name: Some("java/lang/System".into()),
                name: "nanoTime".into(),
                args: Vec::new(),
                is_static: true,
            },
            JvmType::Long,
        );
        assert!(!call.is_pure());

        let mixed = Expr::binary(BinaryOp::Add, Expr::int(1), call, JvmType::Long);
        assert!(!mixed.is_pure());
    }

    #[test]
    fn test_negated_comparisons() {
        assert_eq!(BinaryOp::Eq.negated(), Some(BinaryOp::Ne));
        assert_eq!(BinaryOp::Lt.negated(), Some(BinaryOp::Ge));
        assert_eq!(BinaryOp::Add.negated(), None);
    }

    #[test]
    fn test_literal_helpers() {
        let e = Expr::int(42);
        assert_eq!(e.as_int_literal(), Some(42));
        assert!(!e.is_literal_zero());
        assert!(Expr::int(0).is_literal_zero());
    }

    #[test]
    fn test_class_decl_names() {
        let class = ClassDecl {
            modifiers: vec!["public".into()],
            name: "com/example/Main".into(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            is_interface: false,
            source_file: None,
        };
        assert_eq!(class.package(), Some("com.example".into()));
        assert_eq!(class.simple_name(), "Main");
    }

    #[test]
    fn test_operator_display() {
        assert_eq!(BinaryOp::Ushr.to_string(), ">>>");
        assert_eq!(UnaryOp::Neg.to_string(), "-");
    }
}
