//! End-to-end scenarios over synthetic class files

use garnet_ast::{Block, StmtKind};
use garnet_codegen::{CodeGenOptions, OutputFormat};
use garnet_decompiler::Decompiler;

/// Minimal class-file assembler for the scenarios
struct ClassBuilder {
    entries: Vec<Vec<u8>>,
    logical_count: u16,
    code_name_index: u16,
    this_index: u16,
    super_index: u16,
    methods: Vec<Vec<u8>>,
}

impl ClassBuilder {
    fn new(class_name: &str) -> Self {
        let mut builder = Self {
            entries: Vec::new(),
            logical_count: 1,
            code_name_index: 0,
            this_index: 0,
            super_index: 0,
            methods: Vec::new(),
        };
        builder.code_name_index = builder.utf8("Code");
        let name = builder.utf8(class_name);
        builder.this_index = builder.class(name);
        let object = builder.utf8("java/lang/Object");
        builder.super_index = builder.class(object);
        builder
    }

    fn push_entry(&mut self, bytes: Vec<u8>) -> u16 {
        let index = self.logical_count;
        self.entries.push(bytes);
        self.logical_count += 1;
        index
    }

    fn utf8(&mut self, text: &str) -> u16 {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&(text.len() as u16).to_be_bytes());
        bytes.extend_from_slice(text.as_bytes());
        self.push_entry(bytes)
    }

    fn class(&mut self, name_index: u16) -> u16 {
        let mut bytes = vec![7u8];
        bytes.extend_from_slice(&name_index.to_be_bytes());
        self.push_entry(bytes)
    }

    /// Append a public static method with a well-formed Code attribute
    fn method(&mut self, name: &str, descriptor: &str, max_locals: u16, code: &[u8]) {
        let payload = code_payload(2, max_locals, code.len() as u32, code);
        self.method_raw(name, descriptor, &payload);
    }

    /// Append a method whose Code attribute payload is supplied verbatim
    fn method_raw(&mut self, name: &str, descriptor: &str, code_payload: &[u8]) {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x0009u16.to_be_bytes()); // public static
        bytes.extend_from_slice(&name_index.to_be_bytes());
        bytes.extend_from_slice(&descriptor_index.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes()); // one attribute
        bytes.extend_from_slice(&self.code_name_index.to_be_bytes());
        bytes.extend_from_slice(&(code_payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(code_payload);
        self.methods.push(bytes);
    }

    fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major: Java 8
        out.extend_from_slice(&self.logical_count.to_be_bytes());
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
        out.extend_from_slice(&0x0021u16.to_be_bytes()); // public super
        out.extend_from_slice(&self.this_index.to_be_bytes());
        out.extend_from_slice(&self.super_index.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
        out.extend_from_slice(&0u16.to_be_bytes()); // fields
        out.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            out.extend_from_slice(method);
        }
        out.extend_from_slice(&0u16.to_be_bytes()); // class attributes
        out
    }
}

fn code_payload(max_stack: u16, max_locals: u16, claimed_length: u32, code: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&max_stack.to_be_bytes());
    payload.extend_from_slice(&max_locals.to_be_bytes());
    payload.extend_from_slice(&claimed_length.to_be_bytes());
    payload.extend_from_slice(code);
    payload.extend_from_slice(&0u16.to_be_bytes()); // exception table
    payload.extend_from_slice(&0u16.to_be_bytes()); // attributes
    payload
}

fn count_ifs(block: &Block) -> usize {
    let mut count = 0;
    for stmt in &block.statements {
        if let StmtKind::If { then_branch, else_branch, .. } = &stmt.kind {
            count += 1;
            count += count_ifs(then_branch);
            if let Some(else_branch) = else_branch {
                count += count_ifs(else_branch);
            }
        }
    }
    count
}

#[test]
fn constant_add_folds_to_three() {
    // [iconst_1, iconst_2, iadd, ireturn]
    let mut builder = ClassBuilder::new("ConstantAdd");
    builder.method("add", "()I", 0, &[0x04, 0x05, 0x60, 0xac]);
    let bytes = builder.build();

    let result = Decompiler::new().decompile_class(&bytes).unwrap();
    assert!(result.source.contains("return 3;"), "source was:\n{}", result.source);
    assert_eq!(result.stats.methods_succeeded, 1);
}

#[test]
fn constant_add_unoptimized_keeps_expression() {
    let mut builder = ClassBuilder::new("KeptExpression");
    builder.method("add", "()I", 0, &[0x04, 0x05, 0x60, 0xac]);
    let bytes = builder.build();

    let decompiler = Decompiler::with_options(CodeGenOptions::default(), false);
    let result = decompiler.decompile_class(&bytes).unwrap();
    assert!(
        result.source.contains("return 1 + 2;"),
        "source was:\n{}",
        result.source
    );
}

#[test]
fn locals_add_uses_placeholder_names() {
    // [iload_0, iload_1, iadd, ireturn] with (II)I
    let mut builder = ClassBuilder::new("LocalsAdd");
    builder.method("add", "(II)I", 2, &[0x1a, 0x1b, 0x60, 0xac]);
    let bytes = builder.build();

    let result = Decompiler::new().decompile_class(&bytes).unwrap();
    assert!(
        result.source.contains("return var_0 + var_1;"),
        "source was:\n{}",
        result.source
    );
    assert!(result.source.contains("int add(int var_0, int var_1)"));
}

#[test]
fn if_then_else_has_both_branches() {
    // [iload_0, ifeq +5, iconst_2, ireturn, iconst_1, ireturn]
    let mut builder = ClassBuilder::new("Branching");
    builder.method("choose", "(I)I", 1, &[0x1a, 0x99, 0x00, 0x05, 0x05, 0xac, 0x04, 0xac]);
    let bytes = builder.build();

    let result = Decompiler::new().decompile_class(&bytes).unwrap();

    let body = result.ast.methods[0].body.as_ref().expect("method body");
    assert_eq!(count_ifs(body), 1, "ast was:\n{:#?}", body);
    let has_both = body.statements.iter().any(|s| {
        matches!(
            &s.kind,
            StmtKind::If { else_branch: Some(else_branch), then_branch, .. }
                if !then_branch.is_empty() && !else_branch.is_empty()
        )
    });
    assert!(has_both, "expected an if with both branches:\n{:#?}", body);

    assert!(result.source.contains("return 1;"), "source was:\n{}", result.source);
    assert!(result.source.contains("return 2;"), "source was:\n{}", result.source);
}

#[test]
fn corrupted_method_degrades_alone() {
    // the bad method claims more code bytes than its attribute holds
    let mut builder = ClassBuilder::new("PartlyCorrupt");
    builder.method("good", "()I", 0, &[0x04, 0x05, 0x60, 0xac]);
    let bad_payload = code_payload(1, 1, 9999, &[0x00, 0xb1]);
    builder.method_raw("bad", "()V", &bad_payload);
    let bytes = builder.build();

    let result = Decompiler::new().decompile_class(&bytes).unwrap();

    assert_eq!(result.stats.methods_processed, 2);
    assert_eq!(result.stats.methods_succeeded, 1);
    assert_eq!(result.stats.methods_failed, 1);
    assert!(result.diagnostics.has_errors());
    assert!(
        result.diagnostics.errors().any(|d| d.message.contains("Code")),
        "diagnostics: {:?}",
        result.diagnostics
    );
    // the good method still decompiled
    assert!(result.source.contains("return 3;"));
    // the bad one is present as a bodiless declaration
    assert!(result.source.contains("void bad();"), "source was:\n{}", result.source);
}

#[test]
fn while_loop_is_reconstructed() {
    // loop shape at the whole-pipeline level:
    // pc 0: iload_0 / pc 1: ifeq -> 10 / pc 4: iinc 0 by -1 /
    // pc 7: goto -> 0 / pc 10: return
    let code = [0x1a, 0x99, 0x00, 0x09, 0x84, 0x00, 0xff, 0xa7, 0xff, 0xf9, 0xb1];
    let mut builder = ClassBuilder::new("Spinner");
    builder.method("spin", "(I)V", 1, &code);
    let bytes = builder.build();

    let result = Decompiler::new().decompile_class(&bytes).unwrap();
    assert!(
        result.source.contains("while ("),
        "source was:\n{}",
        result.source
    );
    assert!(result.stats.structures_identified >= 1);
}

#[test]
fn json_ast_output_is_valid_json() {
    let mut builder = ClassBuilder::new("JsonOut");
    builder.method("add", "()I", 0, &[0x04, 0x05, 0x60, 0xac]);
    let bytes = builder.build();

    let options = CodeGenOptions { format: OutputFormat::JsonAst, ..Default::default() };
    let result = Decompiler::with_options(options, true).decompile_class(&bytes).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&result.source).unwrap();
    assert_eq!(parsed["name"], "JsonOut");
}

#[test]
fn invalid_magic_aborts_class() {
    let err = Decompiler::new().decompile_class(&[0, 1, 2, 3]).unwrap_err();
    assert!(err.is_container_error());
}
