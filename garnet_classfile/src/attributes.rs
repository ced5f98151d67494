//! Attribute decoding: generic envelope first, typed refinement second
//!
//! Stage one captures `{name_index, raw bytes}` for every attribute. Stage
//! two re-parses the payload keyed by the constant-pool string at
//! `name_index`. Unrecognized names are retained verbatim; a recognized
//! attribute whose payload is malformed degrades to `Corrupted` so the rest
//! of the class survives. Every parsed form serializes back to its original
//! bytes.

use crate::constant_pool::ConstantPool;
use crate::reader::ClassReader;
use garnet_common::GarnetResult;
use serde::{Deserialize, Serialize};

/// One entry of a `Code` attribute's exception table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Pool index of the caught class, 0 for catch-all (`finally`)
    pub catch_type: u16,
}

/// The decoded `Code` attribute of one method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    /// Absolute offset of `code[0]` within the class file, kept so pc
    /// arithmetic can be mapped back to file offsets exactly
    pub code_offset: u32,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    pub fn line_number_table(&self) -> Option<&[LineNumberEntry]> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::LineNumberTable(entries) => Some(entries.as_slice()),
            _ => None,
        })
    }

    pub fn local_variable_table(&self) -> Option<&[LocalVariableEntry]> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::LocalVariableTable(entries) => Some(entries.as_slice()),
            _ => None,
        })
    }

    /// Source line covering a bytecode offset, if the table is present
    pub fn line_for_pc(&self, pc: u16) -> Option<u16> {
        let table = self.line_number_table()?;
        table
            .iter()
            .filter(|e| e.start_pc <= pc)
            .max_by_key(|e| e.start_pc)
            .map(|e| e.line_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    /// Descriptor index for `LocalVariableTable`, signature index for
    /// `LocalVariableTypeTable` (identical wire layout)
    pub descriptor_index: u16,
    pub index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerClassEntry {
    pub inner_class_info_index: u16,
    pub outer_class_info_index: u16,
    pub inner_name_index: u16,
    pub inner_class_access_flags: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapMethodEntry {
    pub bootstrap_method_ref: u16,
    pub arguments: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodParameterEntry {
    pub name_index: u16,
    pub access_flags: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordComponent {
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

/// Typed attribute payloads. Structured where the pipeline consumes the
/// contents, raw where it only needs to carry them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeInfo {
    Code(CodeAttribute),
    ConstantValue { value_index: u16 },
    LineNumberTable(Vec<LineNumberEntry>),
    LocalVariableTable(Vec<LocalVariableEntry>),
    LocalVariableTypeTable(Vec<LocalVariableEntry>),
    Exceptions(Vec<u16>),
    InnerClasses(Vec<InnerClassEntry>),
    EnclosingMethod { class_index: u16, method_index: u16 },
    StackMapTable { data: Vec<u8> },
    SourceFile { sourcefile_index: u16 },
    SourceDebugExtension { data: Vec<u8> },
    Signature { signature_index: u16 },
    Synthetic,
    Deprecated,
    BootstrapMethods(Vec<BootstrapMethodEntry>),
    MethodParameters(Vec<MethodParameterEntry>),
    NestHost { host_class_index: u16 },
    NestMembers(Vec<u16>),
    PermittedSubclasses(Vec<u16>),
    Record(Vec<RecordComponent>),
    /// Runtime annotation attributes, carried without interpretation
    Annotations { name: String, data: Vec<u8> },
    /// `Module`, `ModulePackages`, `ModuleMainClass`, carried raw
    ModuleInfo { name: String, data: Vec<u8> },
    /// Recognized name but malformed payload; the raw bytes are kept and
    /// the error is surfaced when the attribute is consumed
    Corrupted { name: String, data: Vec<u8>, error: String },
    /// Unrecognized attribute name, retained verbatim
    Unknown { name: String, data: Vec<u8> },
}

/// A class, field, method, or nested attribute: envelope plus typed payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name_index: u16,
    pub info: AttributeInfo,
}

impl Attribute {
    pub fn name<'p>(&self, pool: &'p ConstantPool) -> GarnetResult<&'p str> {
        pool.utf8(self.name_index)
    }

    /// Serialize the full attribute, envelope included, back to class-file
    /// bytes. For every recognized attribute this reproduces the input
    /// byte-for-byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.payload_to_bytes();
        let mut out = Vec::with_capacity(6 + payload.len());
        out.extend_from_slice(&self.name_index.to_be_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&payload);
        out
    }

    /// Serialize just the payload (the `info` bytes after the envelope)
    pub fn payload_to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match &self.info {
            AttributeInfo::Code(code) => {
                out.extend_from_slice(&code.max_stack.to_be_bytes());
                out.extend_from_slice(&code.max_locals.to_be_bytes());
                out.extend_from_slice(&(code.code.len() as u32).to_be_bytes());
                out.extend_from_slice(&code.code);
                out.extend_from_slice(&(code.exception_table.len() as u16).to_be_bytes());
                for entry in &code.exception_table {
                    out.extend_from_slice(&entry.start_pc.to_be_bytes());
                    out.extend_from_slice(&entry.end_pc.to_be_bytes());
                    out.extend_from_slice(&entry.handler_pc.to_be_bytes());
                    out.extend_from_slice(&entry.catch_type.to_be_bytes());
                }
                out.extend_from_slice(&(code.attributes.len() as u16).to_be_bytes());
                for attr in &code.attributes {
                    out.extend_from_slice(&attr.to_bytes());
                }
            }
            AttributeInfo::ConstantValue { value_index } => {
                out.extend_from_slice(&value_index.to_be_bytes());
            }
            AttributeInfo::LineNumberTable(entries) => {
                out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
                for entry in entries {
                    out.extend_from_slice(&entry.start_pc.to_be_bytes());
                    out.extend_from_slice(&entry.line_number.to_be_bytes());
                }
            }
            AttributeInfo::LocalVariableTable(entries)
            | AttributeInfo::LocalVariableTypeTable(entries) => {
                out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
                for entry in entries {
                    out.extend_from_slice(&entry.start_pc.to_be_bytes());
                    out.extend_from_slice(&entry.length.to_be_bytes());
                    out.extend_from_slice(&entry.name_index.to_be_bytes());
                    out.extend_from_slice(&entry.descriptor_index.to_be_bytes());
                    out.extend_from_slice(&entry.index.to_be_bytes());
                }
            }
            AttributeInfo::Exceptions(indices)
            | AttributeInfo::NestMembers(indices)
            | AttributeInfo::PermittedSubclasses(indices) => {
                out.extend_from_slice(&(indices.len() as u16).to_be_bytes());
                for index in indices {
                    out.extend_from_slice(&index.to_be_bytes());
                }
            }
            AttributeInfo::InnerClasses(entries) => {
                out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
                for entry in entries {
                    out.extend_from_slice(&entry.inner_class_info_index.to_be_bytes());
                    out.extend_from_slice(&entry.outer_class_info_index.to_be_bytes());
                    out.extend_from_slice(&entry.inner_name_index.to_be_bytes());
                    out.extend_from_slice(&entry.inner_class_access_flags.to_be_bytes());
                }
            }
            AttributeInfo::EnclosingMethod { class_index, method_index } => {
                out.extend_from_slice(&class_index.to_be_bytes());
                out.extend_from_slice(&method_index.to_be_bytes());
            }
            AttributeInfo::SourceFile { sourcefile_index } => {
                out.extend_from_slice(&sourcefile_index.to_be_bytes());
            }
            AttributeInfo::Signature { signature_index } => {
                out.extend_from_slice(&signature_index.to_be_bytes());
            }
            AttributeInfo::NestHost { host_class_index } => {
                out.extend_from_slice(&host_class_index.to_be_bytes());
            }
            AttributeInfo::Synthetic | AttributeInfo::Deprecated => {}
            AttributeInfo::BootstrapMethods(entries) => {
                out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
                for entry in entries {
                    out.extend_from_slice(&entry.bootstrap_method_ref.to_be_bytes());
                    out.extend_from_slice(&(entry.arguments.len() as u16).to_be_bytes());
                    for arg in &entry.arguments {
                        out.extend_from_slice(&arg.to_be_bytes());
                    }
                }
            }
            AttributeInfo::MethodParameters(entries) => {
                out.push(entries.len() as u8);
                for entry in entries {
                    out.extend_from_slice(&entry.name_index.to_be_bytes());
                    out.extend_from_slice(&entry.access_flags.to_be_bytes());
                }
            }
            AttributeInfo::Record(components) => {
                out.extend_from_slice(&(components.len() as u16).to_be_bytes());
                for component in components {
                    out.extend_from_slice(&component.name_index.to_be_bytes());
                    out.extend_from_slice(&component.descriptor_index.to_be_bytes());
                    out.extend_from_slice(&(component.attributes.len() as u16).to_be_bytes());
                    for attr in &component.attributes {
                        out.extend_from_slice(&attr.to_bytes());
                    }
                }
            }
            AttributeInfo::StackMapTable { data }
            | AttributeInfo::SourceDebugExtension { data }
            | AttributeInfo::Annotations { data, .. }
            | AttributeInfo::ModuleInfo { data, .. }
            | AttributeInfo::Corrupted { data, .. }
            | AttributeInfo::Unknown { data, .. } => {
                out.extend_from_slice(data);
            }
        }
        out
    }
}

/// Parse `count` attributes from the reader
pub fn parse_attributes(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
    count: u16,
) -> GarnetResult<Vec<Attribute>> {
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        attributes.push(parse_attribute(reader, pool)?);
    }
    Ok(attributes)
}

/// Parse one attribute: generic envelope, then typed refinement
pub fn parse_attribute(reader: &mut ClassReader<'_>, pool: &ConstantPool) -> GarnetResult<Attribute> {
    let name_index = reader.read_u16()?;
    let length = reader.read_u32()? as usize;
    let payload_offset = reader.position() as u32;
    let data = reader.read_bytes(length)?;

    let name = pool.utf8(name_index).unwrap_or("").to_string();
    let info = match refine_attribute(&name, data, payload_offset, pool) {
        Ok(info) => info,
        Err(error) => {
            log::warn!("attribute '{}' is corrupted: {}", name, error);
            AttributeInfo::Corrupted {
                name,
                data: data.to_vec(),
                error: error.to_string(),
            }
        }
    };
    Ok(Attribute { name_index, info })
}

fn refine_attribute(
    name: &str,
    data: &[u8],
    payload_offset: u32,
    pool: &ConstantPool,
) -> GarnetResult<AttributeInfo> {
    let mut r = ClassReader::new(data);
    let info = match name {
        "Code" => {
            let max_stack = r.read_u16()?;
            let max_locals = r.read_u16()?;
            let code_length = r.read_u32()? as usize;
            let code = r.read_bytes(code_length)?.to_vec();
            let code_offset = payload_offset + 8;
            let exception_count = r.read_u16()?;
            let mut exception_table = Vec::with_capacity(exception_count as usize);
            for _ in 0..exception_count {
                exception_table.push(ExceptionTableEntry {
                    start_pc: r.read_u16()?,
                    end_pc: r.read_u16()?,
                    handler_pc: r.read_u16()?,
                    catch_type: r.read_u16()?,
                });
            }
            let attr_count = r.read_u16()?;
            let attributes = parse_attributes(&mut r, pool, attr_count)?;
            AttributeInfo::Code(CodeAttribute {
                max_stack,
                max_locals,
                code,
                code_offset,
                exception_table,
                attributes,
            })
        }
        "ConstantValue" => AttributeInfo::ConstantValue { value_index: r.read_u16()? },
        "LineNumberTable" => {
            let count = r.read_u16()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(LineNumberEntry {
                    start_pc: r.read_u16()?,
                    line_number: r.read_u16()?,
                });
            }
            AttributeInfo::LineNumberTable(entries)
        }
        "LocalVariableTable" | "LocalVariableTypeTable" => {
            let count = r.read_u16()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(LocalVariableEntry {
                    start_pc: r.read_u16()?,
                    length: r.read_u16()?,
                    name_index: r.read_u16()?,
                    descriptor_index: r.read_u16()?,
                    index: r.read_u16()?,
                });
            }
            if name == "LocalVariableTable" {
                AttributeInfo::LocalVariableTable(entries)
            } else {
                AttributeInfo::LocalVariableTypeTable(entries)
            }
        }
        "Exceptions" => {
            let count = r.read_u16()?;
            let mut indices = Vec::with_capacity(count as usize);
            for _ in 0..count {
                indices.push(r.read_u16()?);
            }
            AttributeInfo::Exceptions(indices)
        }
        "InnerClasses" => {
            let count = r.read_u16()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(InnerClassEntry {
                    inner_class_info_index: r.read_u16()?,
                    outer_class_info_index: r.read_u16()?,
                    inner_name_index: r.read_u16()?,
                    inner_class_access_flags: r.read_u16()?,
                });
            }
            AttributeInfo::InnerClasses(entries)
        }
        "EnclosingMethod" => AttributeInfo::EnclosingMethod {
            class_index: r.read_u16()?,
            method_index: r.read_u16()?,
        },
        "StackMapTable" => AttributeInfo::StackMapTable { data: data.to_vec() },
        "SourceFile" => AttributeInfo::SourceFile { sourcefile_index: r.read_u16()? },
        "SourceDebugExtension" => AttributeInfo::SourceDebugExtension { data: data.to_vec() },
        "Signature" => AttributeInfo::Signature { signature_index: r.read_u16()? },
        "Synthetic" => AttributeInfo::Synthetic,
        "Deprecated" => AttributeInfo::Deprecated,
        "BootstrapMethods" => {
            let count = r.read_u16()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let bootstrap_method_ref = r.read_u16()?;
                let arg_count = r.read_u16()?;
                let mut arguments = Vec::with_capacity(arg_count as usize);
                for _ in 0..arg_count {
                    arguments.push(r.read_u16()?);
                }
                entries.push(BootstrapMethodEntry { bootstrap_method_ref, arguments });
            }
            AttributeInfo::BootstrapMethods(entries)
        }
        "MethodParameters" => {
            let count = r.read_u8()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(MethodParameterEntry {
                    name_index: r.read_u16()?,
                    access_flags: r.read_u16()?,
                });
            }
            AttributeInfo::MethodParameters(entries)
        }
        "NestHost" => AttributeInfo::NestHost { host_class_index: r.read_u16()? },
        "NestMembers" => {
            let count = r.read_u16()?;
            let mut indices = Vec::with_capacity(count as usize);
            for _ in 0..count {
                indices.push(r.read_u16()?);
            }
            AttributeInfo::NestMembers(indices)
        }
        "PermittedSubclasses" => {
            let count = r.read_u16()?;
            let mut indices = Vec::with_capacity(count as usize);
            for _ in 0..count {
                indices.push(r.read_u16()?);
            }
            AttributeInfo::PermittedSubclasses(indices)
        }
        "Record" => {
            let count = r.read_u16()?;
            let mut components = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let name_index = r.read_u16()?;
                let descriptor_index = r.read_u16()?;
                let attr_count = r.read_u16()?;
                let attributes = parse_attributes(&mut r, pool, attr_count)?;
                components.push(RecordComponent { name_index, descriptor_index, attributes });
            }
            AttributeInfo::Record(components)
        }
        "RuntimeVisibleAnnotations"
        | "RuntimeInvisibleAnnotations"
        | "RuntimeVisibleParameterAnnotations"
        | "RuntimeInvisibleParameterAnnotations"
        | "RuntimeVisibleTypeAnnotations"
        | "RuntimeInvisibleTypeAnnotations"
        | "AnnotationDefault" => AttributeInfo::Annotations {
            name: name.to_string(),
            data: data.to_vec(),
        },
        "Module" | "ModulePackages" | "ModuleMainClass" => AttributeInfo::ModuleInfo {
            name: name.to_string(),
            data: data.to_vec(),
        },
        _ => AttributeInfo::Unknown {
            name: name.to_string(),
            data: data.to_vec(),
        },
    };

    // Fixed-shape attributes must consume their whole payload
    if !matches!(
        info,
        AttributeInfo::StackMapTable { .. }
            | AttributeInfo::SourceDebugExtension { .. }
            | AttributeInfo::Annotations { .. }
            | AttributeInfo::ModuleInfo { .. }
            | AttributeInfo::Unknown { .. }
    ) && !r.is_at_end()
    {
        return Err(garnet_common::GarnetError::corrupted_attribute(
            name,
            format!("{} unconsumed payload bytes", r.remaining()),
        ));
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_pool::ConstantEntry;

    fn pool_with_names(names: &[&str]) -> ConstantPool {
        // Build a pool whose entry i+1 is Utf8 names[i]
        let mut bytes = vec![0u8, (names.len() + 1) as u8];
        for name in names {
            bytes.push(1);
            bytes.extend_from_slice(&(name.len() as u16).to_be_bytes());
            bytes.extend_from_slice(name.as_bytes());
        }
        let mut reader = ClassReader::new(&bytes);
        ConstantPool::parse(&mut reader).unwrap()
    }

    fn envelope(name_index: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&name_index.to_be_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_line_number_table_round_trip() {
        let pool = pool_with_names(&["LineNumberTable"]);
        let payload = [0x00, 0x02, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x05, 0x00, 0x0B];
        let bytes = envelope(1, &payload);

        let mut reader = ClassReader::new(&bytes);
        let attr = parse_attribute(&mut reader, &pool).unwrap();

        match &attr.info {
            AttributeInfo::LineNumberTable(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0], LineNumberEntry { start_pc: 0, line_number: 10 });
                assert_eq!(entries[1], LineNumberEntry { start_pc: 5, line_number: 11 });
            }
            other => panic!("unexpected attribute: {other:?}"),
        }
        assert_eq!(attr.to_bytes(), bytes);
    }

    #[test]
    fn test_code_attribute_round_trip() {
        let pool = pool_with_names(&["Code"]);
        let mut payload = Vec::new();
        payload.extend_from_slice(&2u16.to_be_bytes()); // max_stack
        payload.extend_from_slice(&1u16.to_be_bytes()); // max_locals
        payload.extend_from_slice(&3u32.to_be_bytes()); // code_length
        payload.extend_from_slice(&[0x04, 0x05, 0x60]); // iconst_1 iconst_2 iadd
        payload.extend_from_slice(&1u16.to_be_bytes()); // exception_table_length
        payload.extend_from_slice(&[0, 0, 0, 3, 0, 3, 0, 0]); // one entry
        payload.extend_from_slice(&0u16.to_be_bytes()); // attributes_count
        let bytes = envelope(1, &payload);

        let mut reader = ClassReader::new(&bytes);
        let attr = parse_attribute(&mut reader, &pool).unwrap();

        match &attr.info {
            AttributeInfo::Code(code) => {
                assert_eq!(code.max_stack, 2);
                assert_eq!(code.max_locals, 1);
                assert_eq!(code.code, vec![0x04, 0x05, 0x60]);
                assert_eq!(code.exception_table.len(), 1);
                assert_eq!(code.exception_table[0].handler_pc, 3);
                // envelope is 6 bytes, code starts 8 bytes into the payload
                assert_eq!(code.code_offset, 6 + 8);
            }
            other => panic!("unexpected attribute: {other:?}"),
        }
        assert_eq!(attr.to_bytes(), bytes);
    }

    #[test]
    fn test_truncated_code_degrades_to_corrupted() {
        let pool = pool_with_names(&["Code"]);
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u16.to_be_bytes());
        payload.extend_from_slice(&1u16.to_be_bytes());
        // code_length claims far more bytes than the payload holds
        payload.extend_from_slice(&100u32.to_be_bytes());
        payload.extend_from_slice(&[0x00, 0x01]);
        let bytes = envelope(1, &payload);

        let mut reader = ClassReader::new(&bytes);
        let attr = parse_attribute(&mut reader, &pool).unwrap();

        match &attr.info {
            AttributeInfo::Corrupted { name, data, .. } => {
                assert_eq!(name, "Code");
                assert_eq!(data, &payload);
            }
            other => panic!("expected Corrupted, got {other:?}"),
        }
        // Corrupted attributes still round-trip their raw bytes
        assert_eq!(attr.to_bytes(), bytes);
    }

    #[test]
    fn test_unknown_attribute_retained_verbatim() {
        let pool = pool_with_names(&["SomeVendorThing"]);
        let payload = [0xDE, 0xAD, 0xBE, 0xEF];
        let bytes = envelope(1, &payload);

        let mut reader = ClassReader::new(&bytes);
        let attr = parse_attribute(&mut reader, &pool).unwrap();

        match &attr.info {
            AttributeInfo::Unknown { name, data } => {
                assert_eq!(name, "SomeVendorThing");
                assert_eq!(data, &payload);
            }
            other => panic!("unexpected attribute: {other:?}"),
        }
        assert_eq!(attr.to_bytes(), bytes);
    }

    #[test]
    fn test_exceptions_and_sourcefile_round_trip() {
        let pool = pool_with_names(&["Exceptions", "SourceFile"]);

        let exceptions_bytes = envelope(1, &[0x00, 0x02, 0x00, 0x07, 0x00, 0x09]);
        let mut reader = ClassReader::new(&exceptions_bytes);
        let attr = parse_attribute(&mut reader, &pool).unwrap();
        assert_eq!(attr.info, AttributeInfo::Exceptions(vec![7, 9]));
        assert_eq!(attr.to_bytes(), exceptions_bytes);

        let sourcefile_bytes = envelope(2, &[0x00, 0x03]);
        let mut reader = ClassReader::new(&sourcefile_bytes);
        let attr = parse_attribute(&mut reader, &pool).unwrap();
        assert_eq!(attr.info, AttributeInfo::SourceFile { sourcefile_index: 3 });
        assert_eq!(attr.to_bytes(), sourcefile_bytes);
    }

    #[test]
    fn test_bootstrap_methods_round_trip() {
        let pool = pool_with_names(&["BootstrapMethods"]);
        let payload = [
            0x00, 0x01, // one bootstrap method
            0x00, 0x05, // method ref
            0x00, 0x02, // two arguments
            0x00, 0x0A, 0x00, 0x0B,
        ];
        let bytes = envelope(1, &payload);

        let mut reader = ClassReader::new(&bytes);
        let attr = parse_attribute(&mut reader, &pool).unwrap();
        match &attr.info {
            AttributeInfo::BootstrapMethods(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].bootstrap_method_ref, 5);
                assert_eq!(entries[0].arguments, vec![10, 11]);
            }
            other => panic!("unexpected attribute: {other:?}"),
        }
        assert_eq!(attr.to_bytes(), bytes);
    }

    #[test]
    fn test_line_for_pc_picks_latest_entry() {
        let code = CodeAttribute {
            max_stack: 0,
            max_locals: 0,
            code: Vec::new(),
            code_offset: 0,
            exception_table: Vec::new(),
            attributes: vec![Attribute {
                name_index: 1,
                info: AttributeInfo::LineNumberTable(vec![
                    LineNumberEntry { start_pc: 0, line_number: 4 },
                    LineNumberEntry { start_pc: 8, line_number: 6 },
                ]),
            }],
        };
        assert_eq!(code.line_for_pc(0), Some(4));
        assert_eq!(code.line_for_pc(7), Some(4));
        assert_eq!(code.line_for_pc(8), Some(6));
        assert_eq!(code.line_for_pc(100), Some(6));
    }

    #[test]
    fn test_trailing_garbage_is_corruption() {
        let pool = pool_with_names(&["SourceFile"]);
        // SourceFile payload should be exactly two bytes
        let bytes = envelope(1, &[0x00, 0x03, 0xFF]);
        let mut reader = ClassReader::new(&bytes);
        let attr = parse_attribute(&mut reader, &pool).unwrap();
        assert!(matches!(attr.info, AttributeInfo::Corrupted { .. }));
    }

    #[test]
    fn test_pool_entry_guard() {
        // Reserved constant-pool behavior sanity for attribute names
        let pool = pool_with_names(&["Synthetic"]);
        assert_eq!(pool.get(1).unwrap(), &ConstantEntry::Utf8("Synthetic".into()));
    }
}
