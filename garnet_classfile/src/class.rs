//! Top-level class-file records: header, fields, methods, validation

use crate::attributes::{parse_attributes, Attribute, AttributeInfo, CodeAttribute};
use crate::constant_pool::ConstantPool;
use crate::descriptor::{FieldType, MethodDescriptor};
use crate::reader::ClassReader;
use bitflags::bitflags;
use garnet_common::{GarnetError, GarnetResult};
use serde::{Deserialize, Serialize};

/// The 4-byte prefix every class file starts with
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Versions 45 (JDK 1.0) through 69 (Java 25)
pub const MIN_MAJOR_VERSION: u16 = 45;
pub const MAX_MAJOR_VERSION: u16 = 69;

bitflags! {
    /// Access and property flags of classes, fields, and methods. The same
    /// bit can mean different things per declaration kind (0x0020 is SUPER
    /// on classes and SYNCHRONIZED on methods); callers pick the reading.
    /// Serde impls come from the `bitflags/serde` feature.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AccessFlags: u16 {
        const PUBLIC       = 0x0001;
        const PRIVATE      = 0x0002;
        const PROTECTED    = 0x0004;
        const STATIC       = 0x0008;
        const FINAL        = 0x0010;
        const SUPER        = 0x0020;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE     = 0x0040;
        const BRIDGE       = 0x0040;
        const TRANSIENT    = 0x0080;
        const VARARGS      = 0x0080;
        const NATIVE       = 0x0100;
        const INTERFACE    = 0x0200;
        const ABSTRACT     = 0x0400;
        const STRICT       = 0x0800;
        const SYNTHETIC    = 0x1000;
        const ANNOTATION   = 0x2000;
        const ENUM         = 0x4000;
        const MODULE       = 0x8000;
    }
}

impl AccessFlags {
    pub fn is_public(&self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_static(&self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.contains(Self::FINAL)
    }

    pub fn is_abstract(&self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_native(&self) -> bool {
        self.contains(Self::NATIVE)
    }

    pub fn is_interface(&self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub fn is_enum(&self) -> bool {
        self.contains(Self::ENUM)
    }
}

/// A field record: flags, name, descriptor, attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl FieldInfo {
    pub fn name<'p>(&self, pool: &'p ConstantPool) -> GarnetResult<&'p str> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor(&self, pool: &ConstantPool) -> GarnetResult<FieldType> {
        FieldType::parse(pool.utf8(self.descriptor_index)?)
    }

    /// Pool index of the `ConstantValue` initializer, if any
    pub fn constant_value_index(&self) -> Option<u16> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::ConstantValue { value_index } => Some(*value_index),
            _ => None,
        })
    }
}

/// A method record: flags, name, descriptor, attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl MethodInfo {
    pub fn name<'p>(&self, pool: &'p ConstantPool) -> GarnetResult<&'p str> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor(&self, pool: &ConstantPool) -> GarnetResult<MethodDescriptor> {
        MethodDescriptor::parse(pool.utf8(self.descriptor_index)?)
    }

    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }

    /// The error recorded for a recognized-but-malformed attribute, if any.
    /// A corrupted `Code` payload surfaces here rather than during parse.
    pub fn corrupted_attribute(&self) -> Option<(&str, &str)> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::Corrupted { name, error, .. } => Some((name.as_str(), error.as_str())),
            _ => None,
        })
    }

    /// A method with no `Code` attribute is abstract or native
    pub fn is_concrete(&self) -> bool {
        !self.access_flags.is_abstract() && !self.access_flags.is_native()
    }
}

/// A fully decoded class file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: AccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Decode a class file from raw bytes, validating the container shape
    pub fn parse(data: &[u8]) -> GarnetResult<Self> {
        let mut reader = ClassReader::new(data);

        let magic = reader.read_u32()?;
        if magic != CLASS_MAGIC {
            return Err(GarnetError::InvalidMagic { found: magic });
        }

        let minor_version = reader.read_u16()?;
        let major_version = reader.read_u16()?;
        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
            return Err(GarnetError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let constant_pool = ConstantPool::parse(&mut reader)?;

        let access_flags = AccessFlags::from_bits_retain(reader.read_u16()?);
        let this_class = reader.read_u16()?;
        let super_class = reader.read_u16()?;

        let interface_count = reader.read_u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(reader.read_u16()?);
        }

        let field_count = reader.read_u16()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let access_flags = AccessFlags::from_bits_retain(reader.read_u16()?);
            let name_index = reader.read_u16()?;
            let descriptor_index = reader.read_u16()?;
            let attr_count = reader.read_u16()?;
            let attributes = parse_attributes(&mut reader, &constant_pool, attr_count)?;
            fields.push(FieldInfo { access_flags, name_index, descriptor_index, attributes });
        }

        let method_count = reader.read_u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let access_flags = AccessFlags::from_bits_retain(reader.read_u16()?);
            let name_index = reader.read_u16()?;
            let descriptor_index = reader.read_u16()?;
            let attr_count = reader.read_u16()?;
            let attributes = parse_attributes(&mut reader, &constant_pool, attr_count)?;
            methods.push(MethodInfo { access_flags, name_index, descriptor_index, attributes });
        }

        let attr_count = reader.read_u16()?;
        let attributes = parse_attributes(&mut reader, &constant_pool, attr_count)?;

        let class = Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        class.validate()?;
        Ok(class)
    }

    fn validate(&self) -> GarnetResult<()> {
        self.constant_pool.class_name(self.this_class)?;
        if self.super_class != 0 {
            self.constant_pool.class_name(self.super_class)?;
        }
        for &interface in &self.interfaces {
            self.constant_pool.class_name(interface)?;
        }
        for field in &self.fields {
            self.constant_pool.utf8(field.name_index)?;
            self.constant_pool.utf8(field.descriptor_index)?;
        }
        for method in &self.methods {
            self.constant_pool.utf8(method.name_index)?;
            self.constant_pool.utf8(method.descriptor_index)?;
        }
        Ok(())
    }

    /// Binary name of this class (`com/example/Main`)
    pub fn class_name(&self) -> GarnetResult<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Binary name of the superclass; `None` for `java/lang/Object`
    pub fn super_class_name(&self) -> GarnetResult<Option<&str>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        Ok(Some(self.constant_pool.class_name(self.super_class)?))
    }

    pub fn interface_names(&self) -> GarnetResult<Vec<&str>> {
        self.interfaces
            .iter()
            .map(|&i| self.constant_pool.class_name(i))
            .collect()
    }

    pub fn source_file(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::SourceFile { sourcefile_index } => {
                self.constant_pool.utf8(*sourcefile_index).ok()
            }
            _ => None,
        })
    }

    /// Bootstrap method table, if the class carries `invokedynamic` call sites
    pub fn bootstrap_methods(&self) -> Option<&[crate::attributes::BootstrapMethodEntry]> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::BootstrapMethods(entries) => Some(entries.as_slice()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build the smallest valid class file: `class Empty extends Object {}`
    pub fn minimal_class_bytes() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
        b.extend_from_slice(&0u16.to_be_bytes()); // minor
        b.extend_from_slice(&52u16.to_be_bytes()); // major (Java 8)

        // pool: 1=Utf8 "Empty", 2=Class #1, 3=Utf8 "java/lang/Object", 4=Class #3
        b.extend_from_slice(&5u16.to_be_bytes());
        b.push(1);
        b.extend_from_slice(&5u16.to_be_bytes());
        b.extend_from_slice(b"Empty");
        b.push(7);
        b.extend_from_slice(&1u16.to_be_bytes());
        b.push(1);
        b.extend_from_slice(&16u16.to_be_bytes());
        b.extend_from_slice(b"java/lang/Object");
        b.push(7);
        b.extend_from_slice(&3u16.to_be_bytes());

        b.extend_from_slice(&0x0021u16.to_be_bytes()); // public super
        b.extend_from_slice(&2u16.to_be_bytes()); // this
        b.extend_from_slice(&4u16.to_be_bytes()); // super
        b.extend_from_slice(&0u16.to_be_bytes()); // interfaces
        b.extend_from_slice(&0u16.to_be_bytes()); // fields
        b.extend_from_slice(&0u16.to_be_bytes()); // methods
        b.extend_from_slice(&0u16.to_be_bytes()); // attributes
        b
    }

    #[test]
    fn test_parse_minimal_class() {
        let bytes = minimal_class_bytes();
        let class = ClassFile::parse(&bytes).unwrap();

        assert_eq!(class.major_version, 52);
        assert_eq!(class.class_name().unwrap(), "Empty");
        assert_eq!(class.super_class_name().unwrap(), Some("java/lang/Object"));
        assert!(class.access_flags.is_public());
        assert!(class.fields.is_empty());
        assert!(class.methods.is_empty());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = minimal_class_bytes();
        bytes[0] = 0xDE;
        match ClassFile::parse(&bytes) {
            Err(GarnetError::InvalidMagic { found }) => {
                assert_eq!(found, 0xDEFE_BABE);
            }
            other => panic!("expected InvalidMagic, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = minimal_class_bytes();
        // major version lives at bytes 6..8
        bytes[6] = 0x01;
        bytes[7] = 0x00;
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(GarnetError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let bytes = minimal_class_bytes();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(
            ClassFile::parse(truncated),
            Err(GarnetError::UnexpectedEndOfFile { .. })
        ));
    }

    #[test]
    fn test_this_class_must_be_class_entry() {
        let mut bytes = minimal_class_bytes();
        // Point this_class at the Utf8 entry instead of the Class entry.
        // The trailer is access/this/super/interfaces/fields/methods/attrs,
        // seven u16 words.
        let trailer = bytes.len() - 14;
        bytes[trailer + 2] = 0x00;
        bytes[trailer + 3] = 0x01;
        assert!(ClassFile::parse(&bytes).is_err());
    }

    #[test]
    fn test_access_flag_helpers() {
        let flags = AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL;
        assert!(flags.is_public());
        assert!(flags.is_static());
        assert!(flags.is_final());
        assert!(!flags.is_abstract());
    }
}
