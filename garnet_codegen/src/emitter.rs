//! Recursive pretty-printer for the reconstructed tree

use garnet_ast::{
    BinaryOp, Block, CatchClause, ClassDecl, Expr, ExprKind, FieldDecl, Literal, MethodDecl,
    Stmt, StmtKind, SwitchCase,
};
use garnet_common::{GarnetError, GarnetResult};
use serde::{Deserialize, Serialize};

/// Where the opening brace of a block goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BraceStyle {
    SameLine,
    NextLine,
}

/// Output surface of the emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Java,
    Pseudocode,
    JsonAst,
}

/// Formatting options for the emitter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeGenOptions {
    pub indent_size: usize,
    pub use_tabs: bool,
    /// Soft wrapping hint for long argument lists
    pub max_line_length: usize,
    pub brace_style: BraceStyle,
    pub format: OutputFormat,
}

impl Default for CodeGenOptions {
    fn default() -> Self {
        Self {
            indent_size: 4,
            use_tabs: false,
            max_line_length: 120,
            brace_style: BraceStyle::SameLine,
            format: OutputFormat::Java,
        }
    }
}

/// Renders a class tree as text
pub struct CodeGenerator {
    options: CodeGenOptions,
    out: String,
    depth: usize,
}

impl CodeGenerator {
    pub fn new(options: CodeGenOptions) -> Self {
        Self { options, out: String::new(), depth: 0 }
    }

    /// Emit the whole class in the configured format
    pub fn generate(&mut self, class: &ClassDecl) -> GarnetResult<String> {
        self.out.clear();
        self.depth = 0;
        match self.options.format {
            OutputFormat::JsonAst => {
                return serde_json::to_string_pretty(class)
                    .map_err(|e| GarnetError::internal(format!("AST serialization: {}", e)));
            }
            OutputFormat::Java | OutputFormat::Pseudocode => self.emit_class(class),
        }
        Ok(std::mem::take(&mut self.out))
    }

    fn java(&self) -> bool {
        self.options.format == OutputFormat::Java
    }

    fn indent_unit(&self) -> String {
        if self.options.use_tabs {
            "\t".to_string()
        } else {
            " ".repeat(self.options.indent_size)
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(&self.indent_unit());
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank_line(&mut self) {
        self.out.push('\n');
    }

    /// Opening text for a braced block, honoring the brace style
    fn open_block(&mut self, header: &str) {
        match self.options.brace_style {
            BraceStyle::SameLine => self.line(&format!("{} {{", header)),
            BraceStyle::NextLine => {
                self.line(header);
                self.line("{");
            }
        }
        self.depth += 1;
    }

    fn close_block(&mut self) {
        self.depth -= 1;
        self.line("}");
    }

    fn close_block_with(&mut self, suffix: &str) {
        self.depth -= 1;
        self.line(&format!("}}{}", suffix));
    }

    fn emit_class(&mut self, class: &ClassDecl) {
        if let Some(source) = &class.source_file {
            self.line(&format!("// Decompiled from {}", source));
        }
        if let Some(package) = class.package() {
            if self.java() {
                self.line(&format!("package {};", package));
                self.blank_line();
            }
        }

        let keyword = if class.is_interface { "interface" } else { "class" };
        let mut header = String::new();
        if self.java() {
            for modifier in &class.modifiers {
                header.push_str(modifier);
                header.push(' ');
            }
        }
        header.push_str(keyword);
        header.push(' ');
        header.push_str(class.simple_name());
        if let Some(super_class) = &class.super_class {
            if super_class != "java/lang/Object" {
                header.push_str(" extends ");
                header.push_str(&super_class.replace('/', "."));
            }
        }
        if !class.interfaces.is_empty() {
            header.push_str(if class.is_interface { " extends " } else { " implements " });
            let names: Vec<String> =
                class.interfaces.iter().map(|i| i.replace('/', ".")).collect();
            header.push_str(&names.join(", "));
        }
        self.open_block(&header);

        for field in &class.fields {
            self.emit_field(field);
        }
        if !class.fields.is_empty() && !class.methods.is_empty() {
            self.blank_line();
        }
        for (i, method) in class.methods.iter().enumerate() {
            if i > 0 {
                self.blank_line();
            }
            self.emit_method(method, class);
        }

        self.close_block();
    }

    fn emit_field(&mut self, field: &FieldDecl) {
        let mut text = String::new();
        if self.java() {
            for modifier in &field.modifiers {
                text.push_str(modifier);
                text.push(' ');
            }
        }
        text.push_str(&field.field_type.display_name());
        text.push(' ');
        text.push_str(&field.name);
        if let Some(init) = &field.init {
            text.push_str(" = ");
            text.push_str(&self.expr_text(init));
        }
        text.push(';');
        self.line(&text);
    }

    fn emit_method(&mut self, method: &MethodDecl, class: &ClassDecl) {
        let mut header = String::new();
        if self.java() {
            for modifier in &method.modifiers {
                header.push_str(modifier);
                header.push(' ');
            }
        }

        if method.is_static_initializer {
            header.push_str("static");
        } else if method.is_constructor {
            header.push_str(class.simple_name());
        } else {
            if !self.java() {
                header.push_str("function ");
            }
            if self.java() {
                match &method.return_type {
                    Some(ty) => header.push_str(&ty.display_name()),
                    None => header.push_str("void"),
                }
                header.push(' ');
            }
            header.push_str(&method.name);
        }

        if !method.is_static_initializer {
            header.push('(');
            let params: Vec<String> = method
                .params
                .iter()
                .map(|p| {
                    if self.java() {
                        format!("{} {}", p.param_type.display_name(), p.name)
                    } else {
                        p.name.clone()
                    }
                })
                .collect();
            header.push_str(&params.join(", "));
            header.push(')');
        }
        if !method.throws.is_empty() && self.java() {
            header.push_str(" throws ");
            let names: Vec<String> = method.throws.iter().map(|t| t.replace('/', ".")).collect();
            header.push_str(&names.join(", "));
        }

        match &method.body {
            Some(body) => {
                self.open_block(&header);
                self.emit_statements(body);
                self.close_block();
            }
            None => self.line(&format!("{};", header)),
        }
    }

    fn emit_statements(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.emit_stmt(stmt);
        }
    }

    fn emit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let text = self.expr_text(expr);
                self.line(&format!("{};", text));
            }
            StmtKind::VariableDecl { name, var_type, init } => {
                let mut text = format!("{} {}", var_type.display_name(), name);
                if let Some(init) = init {
                    text.push_str(" = ");
                    text.push_str(&self.expr_text(init));
                }
                text.push(';');
                self.line(&text);
            }
            StmtKind::Assign { target, op, value } => {
                let target_text = self.expr_text(target);
                let value_text = self.expr_text(value);
                match op {
                    Some(op) => self.line(&format!("{} {}= {};", target_text, op, value_text)),
                    None => self.line(&format!("{} = {};", target_text, value_text)),
                }
            }
            StmtKind::If { condition, then_branch, else_branch } => {
                let condition_text = self.expr_text(condition);
                self.open_block(&format!("if ({})", condition_text));
                self.emit_statements(then_branch);
                match else_branch {
                    Some(else_branch) if !else_branch.is_empty() => {
                        self.close_block_with(" else {");
                        self.depth += 1;
                        self.emit_statements(else_branch);
                        self.close_block();
                    }
                    _ => self.close_block(),
                }
            }
            StmtKind::While { condition, body } => {
                let condition_text = self.expr_text(condition);
                self.open_block(&format!("while ({})", condition_text));
                self.emit_statements(body);
                self.close_block();
            }
            StmtKind::DoWhile { body, condition } => {
                let condition_text = self.expr_text(condition);
                self.open_block("do");
                self.emit_statements(body);
                self.close_block_with(&format!(" while ({});", condition_text));
            }
            StmtKind::For { init, condition, step, body } => {
                let init_text = init.as_deref().map(|s| self.inline_stmt(s)).unwrap_or_default();
                let condition_text =
                    condition.as_ref().map(|c| self.expr_text(c)).unwrap_or_default();
                let step_text = step.as_deref().map(|s| self.inline_stmt(s)).unwrap_or_default();
                self.open_block(&format!("for ({}; {}; {})", init_text, condition_text, step_text));
                self.emit_statements(body);
                self.close_block();
            }
            StmtKind::Switch { selector, cases, default } => {
                let selector_text = self.expr_text(selector);
                self.open_block(&format!("switch ({})", selector_text));
                for case in cases {
                    self.emit_case(case);
                }
                if let Some(default) = default {
                    self.line("default:");
                    self.depth += 1;
                    self.emit_statements(default);
                    self.depth -= 1;
                }
                self.close_block();
            }
            StmtKind::TryCatch { body, handlers, finally } => {
                self.open_block("try");
                self.emit_statements(body);
                for handler in handlers {
                    self.emit_catch(handler);
                }
                match finally {
                    Some(finally) => {
                        self.close_block_with(" finally {");
                        self.depth += 1;
                        self.emit_statements(finally);
                        self.close_block();
                    }
                    None => self.close_block(),
                }
            }
            StmtKind::Synchronized { monitor, body } => {
                let monitor_text = self.expr_text(monitor);
                self.open_block(&format!("synchronized ({})", monitor_text));
                self.emit_statements(body);
                self.close_block();
            }
            StmtKind::Labeled { label, body } => {
                self.open_block(&format!("{}:", label));
                self.emit_statements(body);
                self.close_block();
            }
            StmtKind::Goto { label } => {
                // No goto in the surface language; rendered as a break to
                // the labeled block
                self.line(&format!("break {};", label));
            }
            StmtKind::Block(block) => {
                self.open_block("");
                self.emit_statements(block);
                self.close_block();
            }
            StmtKind::Return(expr) => match expr {
                Some(expr) => {
                    let text = self.expr_text(expr);
                    self.line(&format!("return {};", text));
                }
                None => self.line("return;"),
            },
            StmtKind::Throw(expr) => {
                let text = self.expr_text(expr);
                self.line(&format!("throw {};", text));
            }
            StmtKind::MonitorEnter(expr) => {
                let text = self.expr_text(expr);
                self.line(&format!("// monitorenter {}", text));
            }
            StmtKind::MonitorExit(expr) => {
                let text = self.expr_text(expr);
                self.line(&format!("// monitorexit {}", text));
            }
            StmtKind::Comment(text) => self.line(&format!("// {}", text)),
            StmtKind::Empty => {}
        }
    }

    fn emit_case(&mut self, case: &SwitchCase) {
        for value in &case.values {
            self.line(&format!("case {}:", value));
        }
        self.depth += 1;
        self.emit_statements(&case.body);
        // No break after a statement that already leaves the switch
        let transfers = matches!(
            case.body.statements.last().map(|s| &s.kind),
            Some(StmtKind::Return(_)) | Some(StmtKind::Throw(_)) | Some(StmtKind::Goto { .. })
        );
        if !case.falls_through && !transfers {
            self.line("break;");
        }
        self.depth -= 1;
    }

    fn emit_catch(&mut self, handler: &CatchClause) {
        let caught = handler
            .exception_type
            .as_ref()
            .map(|t| t.replace('/', "."))
            .unwrap_or_else(|| "java.lang.Throwable".to_string());
        self.close_block_with(&format!(" catch ({} {}) {{", caught, handler.variable));
        self.depth += 1;
        self.emit_statements(&handler.body);
    }

    /// A statement rendered inline without trailing newline or semicolon,
    /// for `for` headers
    fn inline_stmt(&self, stmt: &Stmt) -> String {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.expr_text(expr),
            StmtKind::Assign { target, op, value } => {
                let target = self.expr_text(target);
                let value = self.expr_text(value);
                match op {
                    Some(op) => format!("{} {}= {}", target, op, value),
                    None => format!("{} = {}", target, value),
                }
            }
            StmtKind::VariableDecl { name, var_type, init } => match init {
                Some(init) => {
                    format!("{} {} = {}", var_type.display_name(), name, self.expr_text(init))
                }
                None => format!("{} {}", var_type.display_name(), name),
            },
            _ => String::new(),
        }
    }

    /// Render one expression. Nested binary operands are parenthesized
    /// conservatively rather than by precedence.
    pub fn expr_text(&self, expr: &Expr) -> String {
        match &*expr.kind {
            ExprKind::Literal(literal) => literal_text(literal),
            ExprKind::Identifier(name) => name.clone(),
            ExprKind::Binary { op, lhs, rhs } => {
                format!(
                    "{} {} {}",
                    self.operand_text(lhs),
                    binary_op_text(*op),
                    self.operand_text(rhs)
                )
            }
            ExprKind::Unary { op, operand } => format!("{}{}", op, self.operand_text(operand)),
            ExprKind::Cast { target, expr } => {
                format!("({}) {}", target.display_name(), self.operand_text(expr))
            }
            ExprKind::MethodCall { receiver, class_name, name, args, is_static } => {
                let target = match (receiver, class_name) {
                    (Some(receiver), _) => self.operand_text(receiver),
                    (None, Some(class_name)) if *is_static => class_name.replace('/', "."),
                    _ => String::new(),
                };
                let args = self.args_text(args);
                if target.is_empty() {
                    format!("{}({})", name, args)
                } else {
                    format!("{}.{}({})", target, name, args)
                }
            }
            ExprKind::FieldAccess { object, class_name, name, is_static } => {
                match (object, class_name) {
                    (Some(object), _) => format!("{}.{}", self.operand_text(object), name),
                    (None, Some(class_name)) if *is_static => {
                        format!("{}.{}", class_name.replace('/', "."), name)
                    }
                    _ => name.clone(),
                }
            }
            ExprKind::ArrayAccess { array, index } => {
                format!("{}[{}]", self.operand_text(array), self.expr_text(index))
            }
            ExprKind::ArrayLength { array } => format!("{}.length", self.operand_text(array)),
            ExprKind::New { class_name, args } => {
                format!("new {}({})", class_name.replace('/', "."), self.args_text(args))
            }
            ExprKind::NewArray { element, dimensions } => {
                let mut text = format!("new {}", element.display_name());
                for dim in dimensions {
                    text.push('[');
                    text.push_str(&self.expr_text(dim));
                    text.push(']');
                }
                text
            }
            ExprKind::InstanceOf { expr, class_name } => {
                format!(
                    "{} instanceof {}",
                    self.operand_text(expr),
                    class_name.replace('/', ".")
                )
            }
            ExprKind::Invalid { message } => format!("/* {} */", message),
        }
    }

    /// Operand position: wrap anything non-trivial in parentheses
    fn operand_text(&self, expr: &Expr) -> String {
        let text = self.expr_text(expr);
        match &*expr.kind {
            ExprKind::Binary { .. } | ExprKind::InstanceOf { .. } | ExprKind::Cast { .. } => {
                format!("({})", text)
            }
            _ => text,
        }
    }

    fn args_text(&self, args: &[Expr]) -> String {
        let rendered: Vec<String> = args.iter().map(|a| self.expr_text(a)).collect();
        let joined = rendered.join(", ");
        // The line-length limit is a soft hint; long argument lists wrap
        if joined.len() > self.options.max_line_length {
            let margin = self.indent_unit().repeat(self.depth + 2);
            let sep = format!(",\n{}", margin);
            format!("\n{}{}", margin, rendered.join(&sep))
        } else {
            joined
        }
    }
}

fn binary_op_text(op: BinaryOp) -> String {
    match op {
        // The three-way comparison has no surface operator; it only
        // survives when a comparison could not be fused into a branch
        BinaryOp::Cmp(_) => "compareTo".to_string(),
        other => other.to_string(),
    }
}

fn literal_text(literal: &Literal) -> String {
    match literal {
        Literal::Null => "null".to_string(),
        Literal::Int(v) => v.to_string(),
        Literal::Long(v) => format!("{}L", v),
        Literal::Float(v) => {
            if v.fract() == 0.0 && v.is_finite() {
                format!("{:.1}f", v)
            } else {
                format!("{}f", v)
            }
        }
        Literal::Double(v) => {
            if v.fract() == 0.0 && v.is_finite() {
                format!("{:.1}", v)
            } else {
                format!("{}", v)
            }
        }
        Literal::String(s) => format!("\"{}\"", escape_string(s)),
        Literal::Class(name) => format!("{}.class", name.replace('/', ".")),
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
