//! Per-class decompilation pipeline
//!
//! Container-level failures abort the class; anything that goes wrong
//! inside one method is recorded as a diagnostic and that method degrades
//! to an abstract placeholder, while the rest of the class decompiles.

use crate::rebuilder::{handler_variable, ExpressionRebuilder, RebuildOutput};
use garnet_ast::{
    Block, CatchClause, ClassDecl, Expr, ExprKind, FieldDecl, Literal, MethodDecl, ParamDecl,
    Stmt, StmtKind, SwitchCase, UnaryOp,
};
use garnet_bytecode::BytecodeParser;
use garnet_classfile::{
    AccessFlags, AttributeInfo, ClassFile, CodeAttribute, ConstantEntry, ConstantPool,
    MethodDescriptor, MethodInfo,
};
use garnet_codegen::{CodeGenOptions, CodeGenerator, OptimizationPipeline};
use garnet_common::{DecompileStats, Diagnostics, GarnetError, GarnetResult, Location};
use garnet_flow::{
    BlockId, Cfg, CfgBuilder, ControlStructure, Dominators, HandlerRange, LoopKind,
    StructureAnalyzer,
};
use garnet_typeinfer::{JvmType, TypeInference, TypeInferenceEngine};
use hashbrown::{HashMap, HashSet};
use std::time::Instant;

/// Everything produced for one class
#[derive(Debug)]
pub struct DecompileResult {
    /// The emitted source text
    pub source: String,
    /// Root of the reconstructed tree
    pub ast: ClassDecl,
    pub stats: DecompileStats,
    pub diagnostics: Diagnostics,
}

/// Decompiles one class at a time; owns its pipeline components
pub struct Decompiler {
    options: CodeGenOptions,
    optimize: bool,
}

impl Default for Decompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompiler {
    pub fn new() -> Self {
        Self { options: CodeGenOptions::default(), optimize: true }
    }

    pub fn with_options(options: CodeGenOptions, optimize: bool) -> Self {
        Self { options, optimize }
    }

    /// Decompile a class file from raw bytes
    pub fn decompile_class(&self, bytes: &[u8]) -> GarnetResult<DecompileResult> {
        let started = Instant::now();
        let mut stats = DecompileStats::new();
        let mut diagnostics = Diagnostics::new();

        let class_file = ClassFile::parse(bytes)?;
        class_file.constant_pool.verify()?;
        let class_name = class_file.class_name()?.to_string();

        let mut ast = ClassDecl {
            modifiers: class_modifiers(class_file.access_flags),
            name: class_name.clone(),
            super_class: class_file.super_class_name()?.map(str::to_string),
            interfaces: class_file
                .interface_names()?
                .into_iter()
                .map(str::to_string)
                .collect(),
            fields: Vec::new(),
            methods: Vec::new(),
            is_interface: class_file.access_flags.is_interface(),
            source_file: class_file.source_file().map(str::to_string),
        };

        for field in &class_file.fields {
            ast.fields.push(self.build_field(field, &class_file.constant_pool)?);
        }

        for method in &class_file.methods {
            stats.methods_processed += 1;
            let decl = self.build_method(
                method,
                &class_file.constant_pool,
                &class_name,
                &mut stats,
                &mut diagnostics,
            )?;
            ast.methods.push(decl);
        }

        if self.optimize {
            let mut pipeline = OptimizationPipeline::new();
            pipeline.optimize_class(&mut ast);
            stats.optimizations_applied += pipeline.optimizations_applied();
            diagnostics.extend(pipeline.diagnostics().clone());
        }

        let mut generator = CodeGenerator::new(self.options.clone());
        let source = generator.generate(&ast)?;

        stats.record_elapsed(started.elapsed());
        Ok(DecompileResult { source, ast, stats, diagnostics })
    }

    fn build_field(
        &self,
        field: &garnet_classfile::FieldInfo,
        pool: &ConstantPool,
    ) -> GarnetResult<FieldDecl> {
        let field_type = JvmType::from_field_type(&field.descriptor(pool)?);
        let init = field
            .constant_value_index()
            .and_then(|index| constant_literal(pool, index, &field_type));
        Ok(FieldDecl {
            modifiers: field_modifiers(field.access_flags),
            name: field.name(pool)?.to_string(),
            field_type,
            init,
        })
    }

    fn build_method(
        &self,
        method: &MethodInfo,
        pool: &ConstantPool,
        class_name: &str,
        stats: &mut DecompileStats,
        diagnostics: &mut Diagnostics,
    ) -> GarnetResult<MethodDecl> {
        let name = method.name(pool)?.to_string();
        let descriptor = method.descriptor(pool)?;
        let is_constructor = name == "<init>";
        let is_static_initializer = name == "<clinit>";
        let is_static = method.access_flags.is_static();

        let local_names = local_name_table(method, pool, is_static);
        let params = param_decls(&descriptor, &local_names, is_static);
        let throws = throws_list(method, pool);

        let mut decl = MethodDecl {
            modifiers: method_modifiers(method.access_flags),
            name: name.clone(),
            params,
            return_type: descriptor.ret.as_ref().map(JvmType::from_field_type),
            throws,
            body: None,
            is_constructor,
            is_static_initializer,
        };

        // Methods without code are abstract or native, not failures
        let code = match method.code() {
            Some(code) => code,
            None => {
                if let Some((attr_name, error)) = method.corrupted_attribute() {
                    diagnostics.add(
                        GarnetError::corrupted_attribute(attr_name, error).into_diagnostic(&name),
                    );
                    stats.methods_failed += 1;
                } else {
                    stats.methods_skipped += 1;
                }
                return Ok(decl);
            }
        };

        match self.rebuild_body(code, pool, class_name, &name, &descriptor, is_static, stats) {
            Ok((body, method_diagnostics)) => {
                diagnostics.extend(method_diagnostics);
                decl.body = Some(body);
                stats.methods_succeeded += 1;
            }
            Err(error) => {
                log::warn!("method {} degraded: {}", name, error);
                diagnostics.add(error.into_diagnostic(&name));
                stats.methods_failed += 1;
            }
        }
        Ok(decl)
    }

    /// The per-method pipeline: parse, CFG, inference, rebuild, structure,
    /// assemble
    #[allow(clippy::too_many_arguments)]
    fn rebuild_body(
        &self,
        code: &CodeAttribute,
        pool: &ConstantPool,
        class_name: &str,
        method_name: &str,
        descriptor: &MethodDescriptor,
        is_static: bool,
        stats: &mut DecompileStats,
    ) -> GarnetResult<(Block, Diagnostics)> {
        let instructions = BytecodeParser::new(&code.code).parse()?;
        stats.instructions_processed += instructions.len();

        let handler_ranges = resolve_handlers(code, pool);
        let cfg = CfgBuilder::build(&instructions, &handler_ranges)?;
        cfg.validate()?;
        let dominators = Dominators::compute(&cfg);

        let mut diagnostics = Diagnostics::new();
        let this_class = (!is_static).then_some(class_name);
        let engine = TypeInferenceEngine::new(pool);
        let inference = match engine.infer(&cfg, descriptor, this_class, code.max_locals as usize)
        {
            Ok(inference) => inference,
            Err(error) => {
                diagnostics.add(error.into_diagnostic(method_name));
                TypeInference {
                    entry_frames: HashMap::new(),
                    local_types: Vec::new(),
                }
            }
        };

        let local_names = local_name_table_for_code(code, pool, is_static);
        let rebuilder =
            ExpressionRebuilder::new(pool, class_name, method_name, &local_names, &inference);
        let (output, rebuild_diagnostics) = rebuilder.rebuild(&cfg);
        stats.expressions_rebuilt += output.expressions_rebuilt;
        diagnostics.extend(rebuild_diagnostics);

        let mut analyzer = StructureAnalyzer::new(&cfg, &dominators);
        let tree = analyzer.analyze();
        stats.structures_identified += analyzer.structures_identified();

        let assembler = Assembler::new(&cfg, &output);
        let mut body = assembler.assemble(&tree);
        declare_locals(&mut body, &output, &inference, &local_names, descriptor, is_static);
        Ok((body, diagnostics))
    }
}

trait IntoDiagnostic {
    fn into_diagnostic(self, method_name: &str) -> garnet_common::Diagnostic;
}

impl IntoDiagnostic for GarnetError {
    fn into_diagnostic(self, method_name: &str) -> garnet_common::Diagnostic {
        garnet_common::Diagnostic::error(self.to_string(), Location::method(method_name))
    }
}

// ---- naming and declaration helpers ------------------------------------

fn local_name_table(
    method: &MethodInfo,
    pool: &ConstantPool,
    is_static: bool,
) -> HashMap<u16, String> {
    match method.code() {
        Some(code) => local_name_table_for_code(code, pool, is_static),
        None => {
            let mut names = HashMap::new();
            seed_receiver_name(&mut names, is_static);
            names
        }
    }
}

fn local_name_table_for_code(
    code: &CodeAttribute,
    pool: &ConstantPool,
    is_static: bool,
) -> HashMap<u16, String> {
    let mut names: HashMap<u16, String> = HashMap::new();
    seed_receiver_name(&mut names, is_static);
    if let Some(table) = code.local_variable_table() {
        for entry in table {
            if let Ok(name) = pool.utf8(entry.name_index) {
                names.entry(entry.index).or_insert_with(|| name.to_string());
            }
        }
    }
    names
}

fn seed_receiver_name(names: &mut HashMap<u16, String>, is_static: bool) {
    if !is_static {
        names.insert(0, "this".to_string());
    }
}

fn param_decls(
    descriptor: &MethodDescriptor,
    names: &HashMap<u16, String>,
    is_static: bool,
) -> Vec<ParamDecl> {
    let mut params = Vec::with_capacity(descriptor.params.len());
    let mut slot: u16 = if is_static { 0 } else { 1 };
    for param in &descriptor.params {
        let name = names
            .get(&slot)
            .cloned()
            .unwrap_or_else(|| format!("var_{}", slot));
        params.push(ParamDecl { name, param_type: JvmType::from_field_type(param) });
        slot += param.width() as u16;
    }
    params
}

fn throws_list(method: &MethodInfo, pool: &ConstantPool) -> Vec<String> {
    method
        .attributes
        .iter()
        .find_map(|a| match &a.info {
            AttributeInfo::Exceptions(indices) => Some(indices),
            _ => None,
        })
        .map(|indices| {
            indices
                .iter()
                .filter_map(|&i| pool.class_name(i).ok())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn resolve_handlers(code: &CodeAttribute, pool: &ConstantPool) -> Vec<HandlerRange> {
    code.exception_table
        .iter()
        .map(|entry| HandlerRange {
            start_pc: entry.start_pc as u32,
            end_pc: entry.end_pc as u32,
            handler_pc: entry.handler_pc as u32,
            catch_type: (entry.catch_type != 0)
                .then(|| pool.class_name(entry.catch_type).unwrap_or("java/lang/Throwable"))
                .map(str::to_string),
        })
        .collect()
}

/// Declare assigned locals at the top of the method. A leading assignment
/// to a fresh local folds into its declaration.
fn declare_locals(
    body: &mut Block,
    output: &RebuildOutput,
    inference: &TypeInference,
    names: &HashMap<u16, String>,
    descriptor: &MethodDescriptor,
    is_static: bool,
) {
    let mut param_slots: HashSet<u16> = HashSet::new();
    let mut slot: u16 = 0;
    if !is_static {
        param_slots.insert(0);
        slot = 1;
    }
    for param in &descriptor.params {
        param_slots.insert(slot);
        slot += param.width() as u16;
    }

    let mut to_declare: Vec<u16> = output
        .assigned_locals
        .iter()
        .copied()
        .filter(|slot| !param_slots.contains(slot))
        .collect();
    to_declare.sort_unstable();
    if to_declare.is_empty() {
        return;
    }

    let name_of = |slot: u16| {
        names
            .get(&slot)
            .cloned()
            .unwrap_or_else(|| format!("var_{}", slot))
    };
    let type_of = |slot: u16| match inference.local_type(slot) {
        JvmType::Unknown | JvmType::Conflict => JvmType::object(),
        ty => ty,
    };

    // Fold `x = init;` into `T x = init;` for leading statements
    let mut declared: HashSet<u16> = HashSet::new();
    for stmt in body.statements.iter_mut() {
        let folded = match &mut stmt.kind {
            StmtKind::Assign { target, op: None, value } => match &*target.kind {
                ExprKind::Identifier(ident) => to_declare
                    .iter()
                    .copied()
                    .find(|&slot| name_of(slot) == *ident && !declared.contains(&slot))
                    .map(|slot| (slot, std::mem::replace(value, Expr::int(0)))),
                _ => None,
            },
            _ => None,
        };
        match folded {
            Some((slot, init)) => {
                declared.insert(slot);
                stmt.kind = StmtKind::VariableDecl {
                    name: name_of(slot),
                    var_type: type_of(slot),
                    init: Some(init),
                };
            }
            None => break,
        }
    }

    // Everything else is declared up front without an initializer
    let mut prelude: Vec<Stmt> = to_declare
        .iter()
        .copied()
        .filter(|slot| !declared.contains(slot))
        .map(|slot| {
            Stmt::new(StmtKind::VariableDecl {
                name: name_of(slot),
                var_type: type_of(slot),
                init: None,
            })
        })
        .collect();
    if !prelude.is_empty() {
        prelude.append(&mut body.statements);
        body.statements = prelude;
    }
}

// ---- structure-tree assembly -------------------------------------------

/// Turns the region tree plus per-block statements into one AST block
struct Assembler<'a> {
    cfg: &'a Cfg,
    output: &'a RebuildOutput,
    /// Targets of residual jumps; their blocks get labels
    residual_targets: HashSet<u32>,
}

impl<'a> Assembler<'a> {
    fn new(cfg: &'a Cfg, output: &'a RebuildOutput) -> Self {
        Self { cfg, output, residual_targets: HashSet::new() }
    }

    fn assemble(mut self, tree: &[ControlStructure]) -> Block {
        gather_jump_targets(tree, &mut self.residual_targets);
        let mut block = Block::empty();
        self.assemble_into(tree, &mut block);
        block
    }

    fn assemble_into(&self, nodes: &[ControlStructure], out: &mut Block) {
        for node in nodes {
            self.assemble_node(node, out);
        }
    }

    fn block_statements(&self, id: BlockId) -> Vec<Stmt> {
        self.output
            .block_statements
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    fn assemble_node(&self, node: &ControlStructure, out: &mut Block) {
        match node {
            ControlStructure::Basic { block } => {
                let start_pc = self.cfg.block(*block).start_pc;
                let statements = self.block_statements(*block);
                if self.residual_targets.contains(&start_pc) {
                    out.push(Stmt::new(StmtKind::Labeled {
                        label: block_label(start_pc),
                        body: Block::new(statements),
                    }));
                } else {
                    out.statements.extend(statements);
                }
            }
            ControlStructure::If { header, negate, then_body, else_body } => {
                out.statements.extend(self.block_statements(*header));
                let mut condition = self.branch_condition(*header);
                if *negate {
                    condition = negate_expr(condition);
                }
                let mut then_block = Block::empty();
                self.assemble_into(then_body, &mut then_block);
                let else_block = if else_body.is_empty() {
                    None
                } else {
                    let mut block = Block::empty();
                    self.assemble_into(else_body, &mut block);
                    Some(block)
                };
                out.push(Stmt::new(StmtKind::If {
                    condition,
                    then_branch: then_block,
                    else_branch: else_block,
                }));
            }
            ControlStructure::Loop { kind, header, latch, body } => {
                self.assemble_loop(*kind, *header, *latch, body, out);
            }
            ControlStructure::Switch { header, arms } => {
                out.statements.extend(self.block_statements(*header));
                let selector = self
                    .output
                    .switch_selectors
                    .get(header)
                    .cloned()
                    .unwrap_or_else(|| Expr::invalid("missing switch selector"));
                let mut cases = Vec::new();
                let mut default = None;
                for arm in arms {
                    let mut arm_nodes: &[ControlStructure] = &arm.body;
                    // A trailing residual jump out of the arm is its break
                    let mut falls_through = arm.falls_through;
                    if let Some(ControlStructure::Jump { .. }) = arm_nodes.last() {
                        arm_nodes = &arm_nodes[..arm_nodes.len() - 1];
                        falls_through = false;
                    }
                    let mut block = Block::empty();
                    self.assemble_into(arm_nodes, &mut block);
                    if arm.values.is_empty() {
                        default = Some(block);
                    } else {
                        cases.push(SwitchCase {
                            values: arm.values.clone(),
                            body: block,
                            falls_through,
                        });
                    }
                }
                out.push(Stmt::new(StmtKind::Switch { selector, cases, default }));
            }
            ControlStructure::Try { body, handlers } => {
                let mut try_block = Block::empty();
                self.assemble_into(body, &mut try_block);
                let mut catch_clauses = Vec::new();
                let mut finally = None;
                for handler in handlers {
                    let handler_pc = self.cfg.block(handler.handler).start_pc;
                    let mut block = Block::empty();
                    self.assemble_into(&handler.body, &mut block);
                    match &handler.catch_type {
                        Some(catch_type) => catch_clauses.push(CatchClause {
                            exception_type: Some(catch_type.clone()),
                            variable: handler_variable(handler_pc),
                            body: block,
                        }),
                        // A catch-all arm is the compiled form of finally
                        None if handlers.len() > 1 => finally = Some(block),
                        None => catch_clauses.push(CatchClause {
                            exception_type: None,
                            variable: handler_variable(handler_pc),
                            body: block,
                        }),
                    }
                }
                out.push(Stmt::new(StmtKind::TryCatch {
                    body: try_block,
                    handlers: catch_clauses,
                    finally,
                }));
            }
            ControlStructure::Jump { target_pc } => {
                out.push(Stmt::new(StmtKind::Goto { label: block_label(*target_pc) }));
            }
        }
    }

    fn assemble_loop(
        &self,
        kind: LoopKind,
        header: BlockId,
        latch: BlockId,
        body: &[ControlStructure],
        out: &mut Block,
    ) {
        let header_block = self.cfg.block(header);
        match kind {
            LoopKind::While => {
                // Header statements are the condition's side effects: they
                // run before the first test and before every retest
                let header_statements = self.block_statements(header);
                out.statements.extend(header_statements.iter().cloned());

                let taken_stays = self.branch_taken_enters(header, body);
                let mut condition = self.branch_condition(header);
                if !taken_stays {
                    condition = negate_expr(condition);
                }
                let mut loop_body = Block::empty();
                self.assemble_into(body, &mut loop_body);
                loop_body.statements.extend(header_statements);
                out.push(Stmt::new(StmtKind::While { condition, body: loop_body }));
            }
            LoopKind::DoWhile => {
                let taken_continues = self
                    .cfg
                    .block(latch)
                    .terminator()
                    .and_then(|t| t.branch_target())
                    .map(|pc| pc == header_block.start_pc)
                    .unwrap_or(false);
                let mut condition = self.branch_condition(latch);
                if !taken_continues {
                    condition = negate_expr(condition);
                }
                let mut loop_body = Block::empty();
                self.assemble_into(body, &mut loop_body);
                out.push(Stmt::new(StmtKind::DoWhile { body: loop_body, condition }));
            }
            LoopKind::Endless => {
                let mut loop_body = Block::empty();
                self.assemble_into(body, &mut loop_body);
                out.push(Stmt::new(StmtKind::While {
                    condition: Expr::int(1),
                    body: loop_body,
                }));
            }
        }
    }

    /// Whether the header's branch-taken edge stays inside the loop body
    fn branch_taken_enters(&self, header: BlockId, body: &[ControlStructure]) -> bool {
        let Some(target_pc) = self
            .cfg
            .block(header)
            .terminator()
            .and_then(|t| t.branch_target())
        else {
            return false;
        };
        let mut body_pcs = HashSet::new();
        gather_block_pcs(self.cfg, body, &mut body_pcs);
        body_pcs.insert(self.cfg.block(header).start_pc);
        body_pcs.contains(&target_pc)
    }

    fn branch_condition(&self, header: BlockId) -> Expr {
        self.output
            .branch_conditions
            .get(&header)
            .cloned()
            .unwrap_or_else(|| Expr::invalid("missing branch condition"))
    }
}

fn block_label(pc: u32) -> String {
    format!("L{}", pc)
}

fn gather_jump_targets(nodes: &[ControlStructure], targets: &mut HashSet<u32>) {
    for node in nodes {
        match node {
            ControlStructure::Jump { target_pc } => {
                targets.insert(*target_pc);
            }
            ControlStructure::If { then_body, else_body, .. } => {
                gather_jump_targets(then_body, targets);
                gather_jump_targets(else_body, targets);
            }
            ControlStructure::Loop { body, .. } => gather_jump_targets(body, targets),
            ControlStructure::Switch { arms, .. } => {
                for arm in arms {
                    // Trailing jumps are rendered as breaks, not labels
                    let nodes = match arm.body.last() {
                        Some(ControlStructure::Jump { .. }) => &arm.body[..arm.body.len() - 1],
                        _ => &arm.body[..],
                    };
                    gather_jump_targets(nodes, targets);
                }
            }
            ControlStructure::Try { body, handlers } => {
                gather_jump_targets(body, targets);
                for handler in handlers {
                    gather_jump_targets(&handler.body, targets);
                }
            }
            ControlStructure::Basic { .. } => {}
        }
    }
}

fn gather_block_pcs(cfg: &Cfg, nodes: &[ControlStructure], pcs: &mut HashSet<u32>) {
    for node in nodes {
        match node {
            ControlStructure::Basic { block } => {
                pcs.insert(cfg.block(*block).start_pc);
            }
            ControlStructure::If { header, then_body, else_body, .. } => {
                pcs.insert(cfg.block(*header).start_pc);
                gather_block_pcs(cfg, then_body, pcs);
                gather_block_pcs(cfg, else_body, pcs);
            }
            ControlStructure::Loop { header, body, .. } => {
                pcs.insert(cfg.block(*header).start_pc);
                gather_block_pcs(cfg, body, pcs);
            }
            ControlStructure::Switch { header, arms } => {
                pcs.insert(cfg.block(*header).start_pc);
                for arm in arms {
                    gather_block_pcs(cfg, &arm.body, pcs);
                }
            }
            ControlStructure::Try { body, handlers } => {
                gather_block_pcs(cfg, body, pcs);
                for handler in handlers {
                    gather_block_pcs(cfg, &handler.body, pcs);
                }
            }
            ControlStructure::Jump { .. } => {}
        }
    }
}

/// Logical negation with comparison flipping
fn negate_expr(expr: Expr) -> Expr {
    if let ExprKind::Binary { op, lhs, rhs } = &*expr.kind {
        if let Some(negated) = op.negated() {
            return Expr::binary(negated, lhs.clone(), rhs.clone(), JvmType::Boolean);
        }
    }
    if let ExprKind::Unary { op: UnaryOp::Not, operand } = &*expr.kind {
        return operand.clone();
    }
    Expr::new(ExprKind::Unary { op: UnaryOp::Not, operand: expr }, JvmType::Boolean)
}

// ---- modifier and constant rendering -----------------------------------

fn class_modifiers(flags: AccessFlags) -> Vec<String> {
    let mut modifiers = Vec::new();
    if flags.is_public() {
        modifiers.push("public".to_string());
    }
    if flags.is_final() && !flags.is_enum() {
        modifiers.push("final".to_string());
    }
    if flags.is_abstract() && !flags.is_interface() {
        modifiers.push("abstract".to_string());
    }
    modifiers
}

fn field_modifiers(flags: AccessFlags) -> Vec<String> {
    let mut modifiers = Vec::new();
    push_visibility(&mut modifiers, flags);
    if flags.is_static() {
        modifiers.push("static".to_string());
    }
    if flags.is_final() {
        modifiers.push("final".to_string());
    }
    if flags.contains(AccessFlags::VOLATILE) {
        modifiers.push("volatile".to_string());
    }
    if flags.contains(AccessFlags::TRANSIENT) {
        modifiers.push("transient".to_string());
    }
    modifiers
}

fn method_modifiers(flags: AccessFlags) -> Vec<String> {
    let mut modifiers = Vec::new();
    push_visibility(&mut modifiers, flags);
    if flags.is_static() {
        modifiers.push("static".to_string());
    }
    if flags.is_final() {
        modifiers.push("final".to_string());
    }
    if flags.contains(AccessFlags::SYNCHRONIZED) {
        modifiers.push("synchronized".to_string());
    }
    if flags.is_native() {
        modifiers.push("native".to_string());
    }
    if flags.is_abstract() {
        modifiers.push("abstract".to_string());
    }
    modifiers
}

fn push_visibility(modifiers: &mut Vec<String>, flags: AccessFlags) {
    if flags.is_public() {
        modifiers.push("public".to_string());
    } else if flags.contains(AccessFlags::PROTECTED) {
        modifiers.push("protected".to_string());
    } else if flags.contains(AccessFlags::PRIVATE) {
        modifiers.push("private".to_string());
    }
}

/// Render a `ConstantValue` entry as a literal of the field's type
fn constant_literal(pool: &ConstantPool, index: u16, field_type: &JvmType) -> Option<Expr> {
    let expr = match pool.get(index).ok()? {
        ConstantEntry::Integer(v) => match field_type {
            JvmType::Boolean => Expr::literal(Literal::Int(*v), JvmType::Boolean),
            _ => Expr::int(*v),
        },
        ConstantEntry::Float(v) => Expr::literal(Literal::Float(*v), JvmType::Float),
        ConstantEntry::Long(v) => Expr::literal(Literal::Long(*v), JvmType::Long),
        ConstantEntry::Double(v) => Expr::literal(Literal::Double(*v), JvmType::Double),
        ConstantEntry::String { .. } => {
            Expr::literal(Literal::String(pool.string(index).ok()?.to_string()), JvmType::string())
        }
        _ => return None,
    };
    Some(expr)
}
