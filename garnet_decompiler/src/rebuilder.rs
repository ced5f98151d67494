//! Abstract interpretation of the operand stack into expression trees
//!
//! The rebuilder runs the stack machine with AST nodes as its values: every
//! push becomes a synthesized expression, every pop consumes one, and the
//! side-effecting instructions append statements to their block. Malformed
//! input never panics: an empty-stack pop yields a placeholder expression
//! naming the offending pc, and the pipeline continues.

use garnet_ast::{
    BinaryOp, CmpNan, Expr, ExprKind, Literal, Stmt, StmtKind, UnaryOp,
};
use garnet_bytecode::{apply_shuffle, is_shuffle, Instruction, Opcode, Operands};
use garnet_classfile::{ConstantEntry, ConstantPool, FieldType, MethodDescriptor};
use garnet_common::{Diagnostics, Location};
use garnet_flow::{BlockId, Cfg};
use garnet_typeinfer::{JvmType, TypeInference};
use hashbrown::{HashMap, HashSet};

/// Everything the rebuilder learned about one method
#[derive(Debug, Default)]
pub struct RebuildOutput {
    /// Statements of each block, in original pc order
    pub block_statements: HashMap<BlockId, Vec<Stmt>>,
    /// For blocks ending in a conditional branch: the condition under which
    /// the branch is taken
    pub branch_conditions: HashMap<BlockId, Expr>,
    /// For blocks ending in a switch: the selector expression
    pub switch_selectors: HashMap<BlockId, Expr>,
    /// Local slots written by the method body (declaration candidates)
    pub assigned_locals: HashSet<u16>,
    pub expressions_rebuilt: usize,
}

/// Synthesized name for the exception local of a handler
pub fn handler_variable(handler_pc: u32) -> String {
    format!("e{}", handler_pc)
}

/// Rebuilds expressions for one method
pub struct ExpressionRebuilder<'a> {
    pool: &'a ConstantPool,
    /// Binary name of the class being decompiled, for super-call detection
    this_class: &'a str,
    /// Preferred local names (from the LocalVariableTable or synthesized)
    local_names: &'a HashMap<u16, String>,
    inference: &'a TypeInference,
    diagnostics: Diagnostics,
    method_name: String,
    output: RebuildOutput,
    stack: Vec<Expr>,
    locals: HashMap<u16, Expr>,
    statements: Vec<Stmt>,
}

impl<'a> ExpressionRebuilder<'a> {
    pub fn new(
        pool: &'a ConstantPool,
        this_class: &'a str,
        method_name: impl Into<String>,
        local_names: &'a HashMap<u16, String>,
        inference: &'a TypeInference,
    ) -> Self {
        Self {
            pool,
            this_class,
            local_names,
            inference,
            diagnostics: Diagnostics::new(),
            method_name: method_name.into(),
            output: RebuildOutput::default(),
            stack: Vec::new(),
            locals: HashMap::new(),
            statements: Vec::new(),
        }
    }

    /// Run the abstract interpreter over every block of the CFG
    pub fn rebuild(mut self, cfg: &Cfg) -> (RebuildOutput, Diagnostics) {
        // Entry stacks per block. Blocks with several predecessors carry
        // their values in synthesized temporaries so the predecessors can
        // be fixed up independently.
        let mut entry_stacks: HashMap<BlockId, Vec<Expr>> = HashMap::new();
        entry_stacks.insert(cfg.entry, Vec::new());

        for &block_id in cfg.order() {
            let block = cfg.block(block_id);

            self.stack = match entry_stacks.get(&block_id) {
                Some(stack) => stack.clone(),
                None if block.kind == garnet_flow::BlockKind::Handler => {
                    // The thrown exception is the only stack value on entry
                    let name = handler_variable(block.start_pc);
                    let ty = self.handler_catch_type(cfg, block_id);
                    vec![Expr::identifier(name, ty)]
                }
                None => Vec::new(),
            };
            self.statements = Vec::new();

            for inst in &block.instructions {
                self.interpret(block_id, inst);
            }

            // Reconcile the exit stack with each successor's entry
            let exit_stack = std::mem::take(&mut self.stack);
            for &succ in &block.successors {
                self.flow_into(cfg, block_id, succ, &exit_stack, &mut entry_stacks);
            }

            let statements = std::mem::take(&mut self.statements);
            self.output.block_statements.insert(block_id, statements);
        }

        (self.output, self.diagnostics)
    }

    fn handler_catch_type(&self, cfg: &Cfg, handler_id: BlockId) -> JvmType {
        cfg.handler_ranges
            .iter()
            .find(|h| cfg.block_at(h.handler_pc) == Some(handler_id))
            .and_then(|h| h.catch_type.clone())
            .map(JvmType::Reference)
            .unwrap_or_else(|| JvmType::Reference("java/lang/Throwable".into()))
    }

    /// Propagate an exit stack along one edge, synthesizing temporaries at
    /// merge points and fixing up this block's exit with the assignments
    fn flow_into(
        &mut self,
        cfg: &Cfg,
        from: BlockId,
        to: BlockId,
        exit_stack: &[Expr],
        entry_stacks: &mut HashMap<BlockId, Vec<Expr>>,
    ) {
        let target = cfg.block(to);
        let merge_point = target.predecessors.len() > 1;

        if let Some(existing) = entry_stacks.get(&to) {
            if existing.len() != exit_stack.len() {
                self.diagnostics.error(
                    format!(
                        "stack heights diverge on edge {} -> {} ({} vs {})",
                        from,
                        to,
                        exit_stack.len(),
                        existing.len()
                    ),
                    Location::at_pc(&self.method_name, target.start_pc),
                );
                return;
            }
            if merge_point {
                // The entry already names temporaries; assign ours to them
                let assignments: Vec<(String, Expr)> = existing
                    .iter()
                    .zip(exit_stack)
                    .filter_map(|(tmp, value)| match &*tmp.kind {
                        ExprKind::Identifier(name) => Some((name.clone(), value.clone())),
                        _ => None,
                    })
                    .collect();
                for (name, value) in assignments {
                    let target_expr = Expr::identifier(name, value.ty.clone());
                    self.statements.push(Stmt::assign(target_expr, value));
                }
            }
            return;
        }

        let entry = if merge_point && !exit_stack.is_empty() {
            // First predecessor to arrive defines the temporaries
            let mut entry = Vec::with_capacity(exit_stack.len());
            for (i, value) in exit_stack.iter().enumerate() {
                let name = format!("tmp_{}_{}", target.start_pc, i);
                let tmp = Expr::identifier(name, value.ty.clone());
                self.statements.push(Stmt::assign(tmp.clone(), value.clone()));
                entry.push(tmp);
            }
            entry
        } else {
            exit_stack.to_vec()
        };
        entry_stacks.insert(to, entry);
    }

    // ---- value plumbing -------------------------------------------------

    fn push(&mut self, expr: Expr) {
        self.output.expressions_rebuilt += 1;
        self.stack.push(expr);
    }

    fn pop(&mut self, pc: u32) -> Expr {
        match self.stack.pop() {
            Some(expr) => expr,
            None => {
                self.diagnostics.error(
                    format!("operand stack underflow at pc {}", pc),
                    Location::at_pc(&self.method_name, pc),
                );
                Expr::invalid(format!("stack underflow at pc {}", pc))
            }
        }
    }

    fn emit(&mut self, stmt: Stmt) {
        self.statements.push(stmt);
    }

    fn local_name(&self, slot: u16) -> String {
        self.local_names
            .get(&slot)
            .cloned()
            .unwrap_or_else(|| format!("var_{}", slot))
    }

    fn local_expr(&mut self, slot: u16, fallback: JvmType) -> Expr {
        if let Some(expr) = self.locals.get(&slot) {
            return expr.clone();
        }
        let ty = match self.inference.local_type(slot) {
            JvmType::Unknown => fallback,
            ty => ty,
        };
        let expr = Expr::identifier(self.local_name(slot), ty);
        self.locals.insert(slot, expr.clone());
        expr
    }

    fn store_local(&mut self, slot: u16, value: Expr) {
        let name = self.local_name(slot);
        let target = Expr::identifier(name, value.ty.clone());
        let wide = value.ty.is_wide();
        self.emit(Stmt::assign(target.clone(), value));
        self.output.assigned_locals.insert(slot);
        self.locals.insert(slot, target);
        if wide {
            self.locals.remove(&(slot + 1));
        }
    }

    fn pool_index(inst: &Instruction) -> u16 {
        match inst.operands {
            Operands::Pool(index) => index,
            Operands::Invoke { pool_index, .. } => pool_index,
            Operands::MultiANewArray { pool_index, .. } => pool_index,
            _ => 0,
        }
    }

    fn local_slot(inst: &Instruction) -> u16 {
        match inst.operands {
            Operands::Local(slot) => slot,
            _ => compact_slot(inst.opcode),
        }
    }

    // ---- per-instruction effects ---------------------------------------

    fn interpret(&mut self, block_id: BlockId, inst: &Instruction) {
        use Opcode::*;
        let pc = inst.pc;

        if is_shuffle(inst.opcode) {
            let ok = apply_shuffle(inst.opcode, &mut self.stack, |e| e.ty.category());
            if ok.is_none() {
                self.diagnostics.error(
                    format!("{} underflowed the stack at pc {}", inst.opcode.mnemonic(), pc),
                    Location::at_pc(&self.method_name, pc),
                );
            }
            return;
        }

        match inst.opcode {
            Nop => {}

            // Constants
            AConstNull => self.push(Expr::literal(Literal::Null, JvmType::object())),
            IConstM1 => self.push(Expr::int(-1)),
            IConst0 => self.push(Expr::int(0)),
            IConst1 => self.push(Expr::int(1)),
            IConst2 => self.push(Expr::int(2)),
            IConst3 => self.push(Expr::int(3)),
            IConst4 => self.push(Expr::int(4)),
            IConst5 => self.push(Expr::int(5)),
            LConst0 => self.push(Expr::literal(Literal::Long(0), JvmType::Long)),
            LConst1 => self.push(Expr::literal(Literal::Long(1), JvmType::Long)),
            FConst0 => self.push(Expr::literal(Literal::Float(0.0), JvmType::Float)),
            FConst1 => self.push(Expr::literal(Literal::Float(1.0), JvmType::Float)),
            FConst2 => self.push(Expr::literal(Literal::Float(2.0), JvmType::Float)),
            DConst0 => self.push(Expr::literal(Literal::Double(0.0), JvmType::Double)),
            DConst1 => self.push(Expr::literal(Literal::Double(1.0), JvmType::Double)),
            Bipush => {
                let value = match inst.operands {
                    Operands::Byte(v) => v as i32,
                    _ => 0,
                };
                self.push(Expr::int(value));
            }
            Sipush => {
                let value = match inst.operands {
                    Operands::Short(v) => v as i32,
                    _ => 0,
                };
                self.push(Expr::int(value));
            }
            Ldc | LdcW | Ldc2W => self.load_constant(Self::pool_index(inst)),

            // Local loads
            ILoad | ILoad0 | ILoad1 | ILoad2 | ILoad3 => {
                let slot = Self::local_slot(inst);
                let expr = self.local_expr(slot, JvmType::Int);
                self.push(expr);
            }
            LLoad | LLoad0 | LLoad1 | LLoad2 | LLoad3 => {
                let slot = Self::local_slot(inst);
                let expr = self.local_expr(slot, JvmType::Long);
                self.push(expr);
            }
            FLoad | FLoad0 | FLoad1 | FLoad2 | FLoad3 => {
                let slot = Self::local_slot(inst);
                let expr = self.local_expr(slot, JvmType::Float);
                self.push(expr);
            }
            DLoad | DLoad0 | DLoad1 | DLoad2 | DLoad3 => {
                let slot = Self::local_slot(inst);
                let expr = self.local_expr(slot, JvmType::Double);
                self.push(expr);
            }
            ALoad | ALoad0 | ALoad1 | ALoad2 | ALoad3 => {
                let slot = Self::local_slot(inst);
                let expr = self.local_expr(slot, JvmType::object());
                self.push(expr);
            }

            // Local stores
            IStore | IStore0 | IStore1 | IStore2 | IStore3 | LStore | LStore0 | LStore1
            | LStore2 | LStore3 | FStore | FStore0 | FStore1 | FStore2 | FStore3 | DStore
            | DStore0 | DStore1 | DStore2 | DStore3 | AStore | AStore0 | AStore1 | AStore2
            | AStore3 => {
                let slot = Self::local_slot(inst);
                let value = self.pop(pc);
                self.store_local(slot, value);
            }

            // Array element access
            IALoad | LALoad | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad => {
                let index = self.pop(pc);
                let array = self.pop(pc);
                let element = array_element_type(inst.opcode, &array.ty);
                self.push(Expr::new(ExprKind::ArrayAccess { array, index }, element));
            }
            IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => {
                let value = self.pop(pc);
                let index = self.pop(pc);
                let array = self.pop(pc);
                let element = value.ty.clone();
                let access = Expr::new(ExprKind::ArrayAccess { array, index }, element);
                self.emit(Stmt::assign(access, value));
            }

            // Arithmetic
            IAdd | LAdd | FAdd | DAdd => self.binary(pc, BinaryOp::Add),
            ISub | LSub | FSub | DSub => self.binary(pc, BinaryOp::Sub),
            IMul | LMul | FMul | DMul => self.binary(pc, BinaryOp::Mul),
            IDiv | LDiv | FDiv | DDiv => {
                self.warn_zero_divisor(pc);
                self.binary(pc, BinaryOp::Div);
            }
            IRem | LRem | FRem | DRem => {
                self.warn_zero_divisor(pc);
                self.binary(pc, BinaryOp::Rem);
            }
            IShl | LShl => self.binary(pc, BinaryOp::Shl),
            IShr | LShr => self.binary(pc, BinaryOp::Shr),
            IUshr | LUshr => self.binary(pc, BinaryOp::Ushr),
            IAnd | LAnd => self.binary(pc, BinaryOp::And),
            IOr | LOr => self.binary(pc, BinaryOp::Or),
            IXor | LXor => self.binary(pc, BinaryOp::Xor),
            INeg | LNeg | FNeg | DNeg => {
                let operand = self.pop(pc);
                let ty = operand.ty.clone();
                self.push(Expr::new(ExprKind::Unary { op: UnaryOp::Neg, operand }, ty));
            }

            // Local increment is a statement; the stack is untouched
            IInc => {
                let (slot, delta) = match inst.operands {
                    Operands::Iinc { index, delta } => (index, delta),
                    _ => (0, 0),
                };
                let local = self.local_expr(slot, JvmType::Int);
                let value = Expr::binary(
                    BinaryOp::Add,
                    local.clone(),
                    Expr::int(delta as i32),
                    JvmType::Int,
                );
                self.emit(Stmt::assign(local, value));
                self.output.assigned_locals.insert(slot);
                self.output.expressions_rebuilt += 1;
            }

            // The fifteen numeric conversions
            I2L | F2L | D2L => self.cast(pc, JvmType::Long),
            I2F | L2F | D2F => self.cast(pc, JvmType::Float),
            I2D | L2D | F2D => self.cast(pc, JvmType::Double),
            L2I | F2I | D2I => self.cast(pc, JvmType::Int),
            I2B => self.cast(pc, JvmType::Byte),
            I2C => self.cast(pc, JvmType::Char),
            I2S => self.cast(pc, JvmType::Short),

            // Three-way comparisons carry their NaN discipline
            LCmp => self.compare(pc, CmpNan::Integral),
            FCmpL | DCmpL => self.compare(pc, CmpNan::NanLow),
            FCmpG | DCmpG => self.compare(pc, CmpNan::NanHigh),

            // Conditional branches record the branch-taken condition
            IfEq => self.unary_branch(block_id, pc, BinaryOp::Eq),
            IfNe => self.unary_branch(block_id, pc, BinaryOp::Ne),
            IfLt => self.unary_branch(block_id, pc, BinaryOp::Lt),
            IfGe => self.unary_branch(block_id, pc, BinaryOp::Ge),
            IfGt => self.unary_branch(block_id, pc, BinaryOp::Gt),
            IfLe => self.unary_branch(block_id, pc, BinaryOp::Le),
            IfICmpEq | IfACmpEq => self.pair_branch(block_id, pc, BinaryOp::Eq),
            IfICmpNe | IfACmpNe => self.pair_branch(block_id, pc, BinaryOp::Ne),
            IfICmpLt => self.pair_branch(block_id, pc, BinaryOp::Lt),
            IfICmpGe => self.pair_branch(block_id, pc, BinaryOp::Ge),
            IfICmpGt => self.pair_branch(block_id, pc, BinaryOp::Gt),
            IfICmpLe => self.pair_branch(block_id, pc, BinaryOp::Le),
            IfNull => self.null_branch(block_id, pc, BinaryOp::Eq),
            IfNonNull => self.null_branch(block_id, pc, BinaryOp::Ne),

            Goto | GotoW => {}

            // Subroutines are legacy; their bookkeeping is not modeled
            Jsr | JsrW => {
                self.push(Expr::identifier("returnAddress", JvmType::ReturnAddress));
                self.emit(Stmt::comment(format!("jsr at pc {}", pc)));
            }
            Ret => self.emit(Stmt::comment(format!("ret at pc {}", pc))),

            TableSwitch | LookupSwitch => {
                let selector = self.pop(pc);
                self.output.switch_selectors.insert(block_id, selector);
            }

            IReturn | LReturn | FReturn | DReturn | AReturn => {
                let value = self.pop(pc);
                self.emit(Stmt::new(StmtKind::Return(Some(value))));
                self.stack.clear();
            }
            Return => {
                self.emit(Stmt::new(StmtKind::Return(None)));
                self.stack.clear();
            }

            // Field access
            GetStatic => {
                let expr = self.field_access(inst, None);
                self.push(expr);
            }
            GetField => {
                let object = self.pop(pc);
                let expr = self.field_access(inst, Some(object));
                self.push(expr);
            }
            PutStatic => {
                let value = self.pop(pc);
                let target = self.field_access(inst, None);
                self.emit(Stmt::assign(target, value));
            }
            PutField => {
                let value = self.pop(pc);
                let object = self.pop(pc);
                let target = self.field_access(inst, Some(object));
                self.emit(Stmt::assign(target, value));
            }

            InvokeVirtual | InvokeInterface => self.invoke(inst, pc, InvokeKind::Virtual),
            InvokeSpecial => self.invoke(inst, pc, InvokeKind::Special),
            InvokeStatic => self.invoke(inst, pc, InvokeKind::Static),
            InvokeDynamic => self.invoke_dynamic(inst, pc),

            // Object and array creation
            New => {
                let class_name = self.class_operand(inst);
                let ty = JvmType::Reference(class_name.clone());
                // Uninitialized marker; completed by the matching
                // invokespecial <init>
                self.push(Expr::new(ExprKind::New { class_name, args: Vec::new() }, ty));
            }
            NewArray => {
                let count = self.pop(pc);
                let element = primitive_array_element(inst);
                let ty = JvmType::Array(Box::new(element.clone()));
                self.push(Expr::new(
                    ExprKind::NewArray { element, dimensions: vec![count] },
                    ty,
                ));
            }
            ANewArray => {
                let count = self.pop(pc);
                let element = JvmType::Reference(self.class_operand(inst));
                let ty = JvmType::Array(Box::new(element.clone()));
                self.push(Expr::new(
                    ExprKind::NewArray { element, dimensions: vec![count] },
                    ty,
                ));
            }
            MultiANewArray => {
                let dimension_count = match inst.operands {
                    Operands::MultiANewArray { dimensions, .. } => dimensions,
                    _ => 1,
                };
                let mut dimensions = Vec::with_capacity(dimension_count as usize);
                for _ in 0..dimension_count {
                    dimensions.push(self.pop(pc));
                }
                dimensions.reverse();
                let descriptor = self.class_operand(inst);
                let full_type = FieldType::parse(&descriptor)
                    .map(|t| JvmType::from_field_type(&t))
                    .unwrap_or_else(|_| JvmType::object());
                let element = strip_array_layers(&full_type, dimension_count as usize);
                self.push(Expr::new(
                    ExprKind::NewArray { element, dimensions },
                    full_type,
                ));
            }

            ArrayLength => {
                let array = self.pop(pc);
                self.push(Expr::new(ExprKind::ArrayLength { array }, JvmType::Int));
            }

            AThrow => {
                let exception = self.pop(pc);
                self.emit(Stmt::new(StmtKind::Throw(exception)));
                self.stack.clear();
            }

            CheckCast => {
                let expr = self.pop(pc);
                let class_name = self.class_operand(inst);
                let target = if class_name.starts_with('[') {
                    FieldType::parse(&class_name)
                        .map(|t| JvmType::from_field_type(&t))
                        .unwrap_or_else(|_| JvmType::object())
                } else {
                    JvmType::Reference(class_name)
                };
                self.push(Expr::new(
                    ExprKind::Cast { target: target.clone(), expr },
                    target,
                ));
            }
            InstanceOf => {
                let expr = self.pop(pc);
                let class_name = self.class_operand(inst);
                self.push(Expr::new(
                    ExprKind::InstanceOf { expr, class_name },
                    JvmType::Boolean,
                ));
            }

            MonitorEnter => {
                let monitor = self.pop(pc);
                self.emit(Stmt::new(StmtKind::MonitorEnter(monitor)));
            }
            MonitorExit => {
                let monitor = self.pop(pc);
                self.emit(Stmt::new(StmtKind::MonitorExit(monitor)));
            }

            // Shuffles were handled before the match; `wide` never appears
            // because the parser folds it into the modified opcode
            other => {
                self.emit(Stmt::comment(format!(
                    "unsupported opcode {} at pc {}",
                    other.mnemonic(),
                    pc
                )));
            }
        }
    }

    // ---- grouped effects ------------------------------------------------

    fn load_constant(&mut self, index: u16) {
        let expr = match self.pool.get(index) {
            Ok(ConstantEntry::Integer(v)) => Expr::int(*v),
            Ok(ConstantEntry::Float(v)) => Expr::literal(Literal::Float(*v), JvmType::Float),
            Ok(ConstantEntry::Long(v)) => Expr::literal(Literal::Long(*v), JvmType::Long),
            Ok(ConstantEntry::Double(v)) => Expr::literal(Literal::Double(*v), JvmType::Double),
            Ok(ConstantEntry::String { .. }) => match self.pool.string(index) {
                Ok(s) => Expr::literal(Literal::String(s.to_string()), JvmType::string()),
                Err(_) => Expr::invalid(format!("bad string constant #{}", index)),
            },
            Ok(ConstantEntry::Class { .. }) => match self.pool.class_name(index) {
                Ok(name) => Expr::literal(
                    Literal::Class(name.to_string()),
                    JvmType::Reference("java/lang/Class".into()),
                ),
                Err(_) => Expr::invalid(format!("bad class constant #{}", index)),
            },
            // Symbolic entries surface as identifier placeholders
            Ok(ConstantEntry::MethodType { .. }) => Expr::identifier(
                format!("methodType_{}", index),
                JvmType::Reference("java/lang/invoke/MethodType".into()),
            ),
            Ok(ConstantEntry::MethodHandle { .. }) => Expr::identifier(
                format!("methodHandle_{}", index),
                JvmType::Reference("java/lang/invoke/MethodHandle".into()),
            ),
            Ok(ConstantEntry::Dynamic { .. }) => {
                Expr::identifier(format!("dynamic_{}", index), JvmType::Unknown)
            }
            _ => Expr::invalid(format!("unloadable constant #{}", index)),
        };
        self.push(expr);
    }

    fn binary(&mut self, pc: u32, op: BinaryOp) {
        let rhs = self.pop(pc);
        let lhs = self.pop(pc);
        let ty = lhs.ty.clone();
        self.push(Expr::binary(op, lhs, rhs, ty));
    }

    /// Flag division/remainder with a literal zero divisor before building
    /// the node; emission keeps the expression as written
    fn warn_zero_divisor(&mut self, pc: u32) {
        let divisor_is_zero = self
            .stack
            .last()
            .map(|e| e.is_literal_zero())
            .unwrap_or(false);
        if divisor_is_zero {
            self.diagnostics.warning(
                format!("division by constant zero at pc {}", pc),
                Location::at_pc(&self.method_name, pc),
            );
        }
    }

    fn cast(&mut self, pc: u32, target: JvmType) {
        let expr = self.pop(pc);
        self.push(Expr::new(
            ExprKind::Cast { target: target.clone(), expr },
            target,
        ));
    }

    fn compare(&mut self, pc: u32, nan: CmpNan) {
        let rhs = self.pop(pc);
        let lhs = self.pop(pc);
        self.push(Expr::binary(BinaryOp::Cmp(nan), lhs, rhs, JvmType::Int));
    }

    /// `ifeq`-family: one operand compared against zero, or a fused
    /// three-way comparison
    fn unary_branch(&mut self, block_id: BlockId, pc: u32, op: BinaryOp) {
        let value = self.pop(pc);
        let condition = match &*value.kind {
            // if<op> over lcmp/fcmp/dcmp output compares the original pair
            ExprKind::Binary { op: BinaryOp::Cmp(_), lhs, rhs } => {
                Expr::binary(op, lhs.clone(), rhs.clone(), JvmType::Boolean)
            }
            _ if value.ty == JvmType::Boolean => match op {
                BinaryOp::Ne => value,
                BinaryOp::Eq => {
                    let ty = JvmType::Boolean;
                    Expr::new(ExprKind::Unary { op: UnaryOp::Not, operand: value }, ty)
                }
                _ => Expr::binary(op, value, Expr::int(0), JvmType::Boolean),
            },
            _ => Expr::binary(op, value, Expr::int(0), JvmType::Boolean),
        };
        self.output.expressions_rebuilt += 1;
        self.output.branch_conditions.insert(block_id, condition);
    }

    fn pair_branch(&mut self, block_id: BlockId, pc: u32, op: BinaryOp) {
        let rhs = self.pop(pc);
        let lhs = self.pop(pc);
        let condition = Expr::binary(op, lhs, rhs, JvmType::Boolean);
        self.output.expressions_rebuilt += 1;
        self.output.branch_conditions.insert(block_id, condition);
    }

    fn null_branch(&mut self, block_id: BlockId, pc: u32, op: BinaryOp) {
        let value = self.pop(pc);
        let null = Expr::literal(Literal::Null, JvmType::object());
        let condition = Expr::binary(op, value, null, JvmType::Boolean);
        self.output.expressions_rebuilt += 1;
        self.output.branch_conditions.insert(block_id, condition);
    }

    fn field_access(&mut self, inst: &Instruction, object: Option<Expr>) -> Expr {
        let index = Self::pool_index(inst);
        match self.pool.field_ref(index) {
            Ok(member) => {
                let ty = FieldType::parse(&member.descriptor)
                    .map(|t| JvmType::from_field_type(&t))
                    .unwrap_or(JvmType::Unknown);
                let is_static = object.is_none();
                Expr::new(
                    ExprKind::FieldAccess {
                        object,
                        class_name: Some(member.class_name),
                        name: member.name,
                        is_static,
                    },
                    ty,
                )
            }
            Err(e) => Expr::invalid(format!("unresolvable field #{}: {}", index, e)),
        }
    }

    fn class_operand(&mut self, inst: &Instruction) -> String {
        let index = Self::pool_index(inst);
        self.pool
            .class_name(index)
            .map(|s| s.to_string())
            .unwrap_or_else(|_| "java/lang/Object".to_string())
    }

    fn invoke(&mut self, inst: &Instruction, pc: u32, kind: InvokeKind) {
        let index = Self::pool_index(inst);
        let member = match self.pool.method_ref(index) {
            Ok(member) => member,
            Err(e) => {
                self.emit(Stmt::comment(format!("unresolvable call #{}: {}", index, e)));
                return;
            }
        };
        let descriptor = match MethodDescriptor::parse(&member.descriptor) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.emit(Stmt::comment(format!("bad descriptor for {}: {}", member.name, e)));
                return;
            }
        };

        // Arguments were pushed left to right
        let mut args = Vec::with_capacity(descriptor.arity());
        for _ in 0..descriptor.arity() {
            args.push(self.pop(pc));
        }
        args.reverse();

        let receiver = match kind {
            InvokeKind::Static => None,
            _ => Some(self.pop(pc)),
        };

        // Constructor calls become `new T(args)` nodes; the duplicated
        // uninitialized reference left by the dup is replaced in place
        if kind == InvokeKind::Special && member.name == "<init>" {
            if let Some(receiver) = &receiver {
                if let ExprKind::New { class_name, args: existing } = &*receiver.kind {
                    if existing.is_empty() {
                        let completed = Expr::new(
                            ExprKind::New { class_name: class_name.clone(), args },
                            receiver.ty.clone(),
                        );
                        if self.stack.last() == Some(receiver) {
                            self.stack.pop();
                            self.push(completed);
                        } else {
                            self.emit(Stmt::expr(completed));
                        }
                        return;
                    }
                }
                // this(...) / super(...) delegation inside a constructor
                if matches!(&*receiver.kind, ExprKind::Identifier(name) if name == "this") {
                    let callee = if member.class_name == self.this_class { "this" } else { "super" };
                    let call = Expr::new(
                        ExprKind::MethodCall {
                            receiver: None,
                            class_name: None,
                            name: callee.to_string(),
                            args,
                            is_static: false,
                        },
                        JvmType::Void,
                    );
                    self.emit(Stmt::expr(call));
                    return;
                }
            }
        }

        let return_type = descriptor
            .ret
            .as_ref()
            .map(JvmType::from_field_type)
            .unwrap_or(JvmType::Void);
        let call = Expr::new(
            ExprKind::MethodCall {
                receiver,
                class_name: Some(member.class_name),
                name: member.name,
                args,
                is_static: kind == InvokeKind::Static,
            },
            return_type,
        );
        if descriptor.is_void() {
            self.emit(Stmt::expr(call));
            self.output.expressions_rebuilt += 1;
        } else {
            self.push(call);
        }
    }

    fn invoke_dynamic(&mut self, inst: &Instruction, pc: u32) {
        let index = Self::pool_index(inst);
        let (name, descriptor) = match self.pool.invoke_dynamic(index) {
            Ok((_, name, descriptor)) => (name.to_string(), descriptor.to_string()),
            Err(e) => {
                self.emit(Stmt::comment(format!("unresolvable indy #{}: {}", index, e)));
                return;
            }
        };
        let descriptor = match MethodDescriptor::parse(&descriptor) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.emit(Stmt::comment(format!("bad indy descriptor: {}", e)));
                return;
            }
        };
        let mut args = Vec::with_capacity(descriptor.arity());
        for _ in 0..descriptor.arity() {
            args.push(self.pop(pc));
        }
        args.reverse();

        let return_type = descriptor
            .ret
            .as_ref()
            .map(JvmType::from_field_type)
            .unwrap_or(JvmType::Void);
        let call = Expr::new(
            ExprKind::MethodCall {
                receiver: None,
                class_name: None,
                name,
                args,
                is_static: true,
            },
            return_type,
        );
        if descriptor.is_void() {
            self.emit(Stmt::expr(call));
            self.output.expressions_rebuilt += 1;
        } else {
            self.push(call);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvokeKind {
    Virtual,
    Special,
    Static,
}

/// Slot encoded in the compact `*load_n` / `*store_n` forms
fn compact_slot(opcode: Opcode) -> u16 {
    use Opcode::*;
    match opcode {
        ILoad0 | LLoad0 | FLoad0 | DLoad0 | ALoad0 | IStore0 | LStore0 | FStore0 | DStore0
        | AStore0 => 0,
        ILoad1 | LLoad1 | FLoad1 | DLoad1 | ALoad1 | IStore1 | LStore1 | FStore1 | DStore1
        | AStore1 => 1,
        ILoad2 | LLoad2 | FLoad2 | DLoad2 | ALoad2 | IStore2 | LStore2 | FStore2 | DStore2
        | AStore2 => 2,
        _ => 3,
    }
}

/// Element type of a typed array load, preferring the tracked array type
fn array_element_type(opcode: Opcode, array_ty: &JvmType) -> JvmType {
    if let JvmType::Array(element) = array_ty {
        return (**element).clone();
    }
    match opcode {
        Opcode::IALoad => JvmType::Int,
        Opcode::LALoad => JvmType::Long,
        Opcode::FALoad => JvmType::Float,
        Opcode::DALoad => JvmType::Double,
        Opcode::BALoad => JvmType::Byte,
        Opcode::CALoad => JvmType::Char,
        Opcode::SALoad => JvmType::Short,
        _ => JvmType::object(),
    }
}

fn primitive_array_element(inst: &Instruction) -> JvmType {
    let code = match inst.operands {
        Operands::NewArrayType(code) => code,
        _ => 0,
    };
    match code {
        4 => JvmType::Boolean,
        5 => JvmType::Char,
        6 => JvmType::Float,
        7 => JvmType::Double,
        8 => JvmType::Byte,
        9 => JvmType::Short,
        11 => JvmType::Long,
        _ => JvmType::Int,
    }
}

/// Peel `count` array layers off a type, for multi-dimensional allocation
fn strip_array_layers(ty: &JvmType, count: usize) -> JvmType {
    let mut current = ty.clone();
    for _ in 0..count {
        current = match current {
            JvmType::Array(element) => *element,
            other => return other,
        };
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_bytecode::BytecodeParser;
    use garnet_classfile::ClassReader;
    use garnet_flow::CfgBuilder;

    fn empty_pool() -> ConstantPool {
        let bytes = [0u8, 1u8];
        let mut reader = ClassReader::new(&bytes);
        ConstantPool::parse(&mut reader).unwrap()
    }

    fn empty_inference() -> TypeInference {
        TypeInference {
            entry_frames: HashMap::new(),
            local_types: Vec::new(),
        }
    }

    fn rebuild(code: &[u8]) -> (RebuildOutput, Diagnostics, Cfg) {
        let instructions = BytecodeParser::new(code).parse().unwrap();
        let cfg = CfgBuilder::build(&instructions, &[]).unwrap();
        let pool = empty_pool();
        let names = HashMap::new();
        let inference = empty_inference();
        let rebuilder = ExpressionRebuilder::new(&pool, "Test", "m", &names, &inference);
        let (output, diagnostics) = rebuilder.rebuild(&cfg);
        (output, diagnostics, cfg)
    }

    #[test]
    fn test_constant_add_returns_expression() {
        // iconst_1 iconst_2 iadd ireturn
        let (output, diagnostics, cfg) = rebuild(&[0x04, 0x05, 0x60, 0xac]);
        assert!(!diagnostics.has_errors());

        let statements = &output.block_statements[&cfg.entry];
        assert_eq!(statements.len(), 1);
        match &statements[0].kind {
            StmtKind::Return(Some(expr)) => {
                assert_eq!(
                    *expr,
                    Expr::binary(BinaryOp::Add, Expr::int(1), Expr::int(2), JvmType::Int)
                );
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_locals_become_identifiers() {
        // iload_0 iload_1 iadd ireturn
        let (output, _, cfg) = rebuild(&[0x1a, 0x1b, 0x60, 0xac]);
        let statements = &output.block_statements[&cfg.entry];
        match &statements[0].kind {
            StmtKind::Return(Some(expr)) => match &*expr.kind {
                ExprKind::Binary { op: BinaryOp::Add, lhs, rhs } => {
                    assert_eq!(*lhs.kind, ExprKind::Identifier("var_0".into()));
                    assert_eq!(*rhs.kind, ExprKind::Identifier("var_1".into()));
                }
                other => panic!("unexpected expr {other:?}"),
            },
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_store_emits_assignment_and_records_identifier() {
        // iconst_2 istore_1 iload_1 ireturn
        let (output, _, cfg) = rebuild(&[0x05, 0x3c, 0x1b, 0xac]);
        let statements = &output.block_statements[&cfg.entry];
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].kind,
            StmtKind::Assign {
                target: Expr::identifier("var_1", JvmType::Int),
                op: None,
                value: Expr::int(2),
            }
        );
        match &statements[1].kind {
            StmtKind::Return(Some(expr)) => {
                assert_eq!(*expr.kind, ExprKind::Identifier("var_1".into()));
            }
            other => panic!("unexpected statement {other:?}"),
        }
        assert!(output.assigned_locals.contains(&1));
    }

    #[test]
    fn test_branch_condition_compares_to_zero() {
        // diamond header: iload_0, ifeq +5
        let code = [0x1a, 0x99, 0x00, 0x05, 0x05, 0xac, 0x04, 0xac];
        let (output, _, cfg) = rebuild(&code);
        let condition = &output.branch_conditions[&cfg.entry];
        assert_eq!(
            *condition,
            Expr::binary(
                BinaryOp::Eq,
                Expr::identifier("var_0", JvmType::Int),
                Expr::int(0),
                JvmType::Boolean
            )
        );
    }

    #[test]
    fn test_wide_iinc_shape() {
        // wide iinc 258 by -200, then return
        let code = [0xc4, 0x84, 0x01, 0x02, 0xff, 0x38, 0xb1];
        let (output, _, cfg) = rebuild(&code);
        let statements = &output.block_statements[&cfg.entry];
        assert_eq!(
            statements[0].kind,
            StmtKind::Assign {
                target: Expr::identifier("var_258", JvmType::Int),
                op: None,
                value: Expr::binary(
                    BinaryOp::Add,
                    Expr::identifier("var_258", JvmType::Int),
                    Expr::int(-200),
                    JvmType::Int
                ),
            }
        );
    }

    #[test]
    fn test_lcmp_fuses_into_branch() {
        // lload_0, lconst_0, lcmp, ifge +5 -> (var_0 >= 0)
        let code = [0x1e, 0x09, 0x94, 0x9c, 0x00, 0x05, 0x03, 0xac, 0x04, 0xac];
        let (output, _, cfg) = rebuild(&code);
        let condition = &output.branch_conditions[&cfg.entry];
        match &*condition.kind {
            ExprKind::Binary { op: BinaryOp::Ge, lhs, rhs } => {
                assert_eq!(*lhs.kind, ExprKind::Identifier("var_0".into()));
                assert_eq!(rhs.as_long_literal(), Some(0));
            }
            other => panic!("expected fused comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_stack_underflow_degrades() {
        // pop on an empty stack, then return
        let (output, diagnostics, cfg) = rebuild(&[0x57, 0xb1]);
        assert!(diagnostics.has_errors());
        // the method still produced statements
        assert!(output.block_statements[&cfg.entry]
            .iter()
            .any(|s| matches!(s.kind, StmtKind::Return(None))));
    }

    #[test]
    fn test_array_store_becomes_assignment() {
        // aload_0, iconst_0, iconst_5, iastore, return
        let (output, _, cfg) = rebuild(&[0x2a, 0x03, 0x08, 0x4f, 0xb1]);
        let statements = &output.block_statements[&cfg.entry];
        match &statements[0].kind {
            StmtKind::Assign { target, value, .. } => {
                assert!(matches!(&*target.kind, ExprKind::ArrayAccess { .. }));
                assert_eq!(value.as_int_literal(), Some(5));
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_negation() {
        // iload_0, ineg, ireturn
        let (output, _, cfg) = rebuild(&[0x1a, 0x74, 0xac]);
        let statements = &output.block_statements[&cfg.entry];
        match &statements[0].kind {
            StmtKind::Return(Some(expr)) => {
                assert!(matches!(
                    &*expr.kind,
                    ExprKind::Unary { op: UnaryOp::Neg, .. }
                ));
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_merge_synthesizes_temporaries() {
        // Two arms each push a value that meets at a join:
        // iload_0, ifeq +7 (-> 8), iconst_1, goto +4 (-> 9), pc 8: iconst_2,
        // pc 9: ireturn
        let code = [0x1a, 0x99, 0x00, 0x07, 0x04, 0xa7, 0x00, 0x04, 0x05, 0xac];
        let (output, diagnostics, cfg) = rebuild(&code);
        assert!(!diagnostics.has_errors());

        let join = cfg.block_at(9).unwrap();
        // both arms assign to the same temporary
        let arm_one = cfg.block_at(4).unwrap();
        let arm_two = cfg.block_at(8).unwrap();
        let tmp_name = format!("tmp_{}_0", 9);
        for arm in [arm_one, arm_two] {
            let statements = &output.block_statements[&arm];
            assert!(
                statements.iter().any(|s| matches!(
                    &s.kind,
                    StmtKind::Assign { target, .. }
                        if matches!(&*target.kind, ExprKind::Identifier(n) if *n == tmp_name)
                )),
                "arm {arm} does not assign to {tmp_name}"
            );
        }
        // the join returns the temporary
        match &output.block_statements[&join][0].kind {
            StmtKind::Return(Some(expr)) => {
                assert_eq!(*expr.kind, ExprKind::Identifier(tmp_name));
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }
}
