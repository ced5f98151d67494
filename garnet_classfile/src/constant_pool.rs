//! The per-class constant pool: tagged entries plus validated resolution
//!
//! The pool is 1-indexed. `Long` and `Double` entries occupy two logical
//! slots; the slot after them holds a reserved placeholder that is never a
//! valid target of resolution.

use crate::reader::ClassReader;
use garnet_common::{GarnetError, GarnetResult};
use serde::{Deserialize, Serialize};

/// Constant pool entry tags as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConstantTag {
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    FieldRef = 9,
    MethodRef = 10,
    InterfaceMethodRef = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

impl ConstantTag {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Utf8),
            3 => Some(Self::Integer),
            4 => Some(Self::Float),
            5 => Some(Self::Long),
            6 => Some(Self::Double),
            7 => Some(Self::Class),
            8 => Some(Self::String),
            9 => Some(Self::FieldRef),
            10 => Some(Self::MethodRef),
            11 => Some(Self::InterfaceMethodRef),
            12 => Some(Self::NameAndType),
            15 => Some(Self::MethodHandle),
            16 => Some(Self::MethodType),
            17 => Some(Self::Dynamic),
            18 => Some(Self::InvokeDynamic),
            19 => Some(Self::Module),
            20 => Some(Self::Package),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8 => "Utf8",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Long => "Long",
            Self::Double => "Double",
            Self::Class => "Class",
            Self::String => "String",
            Self::FieldRef => "FieldRef",
            Self::MethodRef => "MethodRef",
            Self::InterfaceMethodRef => "InterfaceMethodRef",
            Self::NameAndType => "NameAndType",
            Self::MethodHandle => "MethodHandle",
            Self::MethodType => "MethodType",
            Self::Dynamic => "Dynamic",
            Self::InvokeDynamic => "InvokeDynamic",
            Self::Module => "Module",
            Self::Package => "Package",
        }
    }
}

/// A parsed constant pool entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstantEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
    /// Placeholder filling the second slot of a `Long` or `Double`
    Reserved,
}

impl ConstantEntry {
    pub fn tag_name(&self) -> &'static str {
        match self {
            Self::Utf8(_) => "Utf8",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Long(_) => "Long",
            Self::Double(_) => "Double",
            Self::Class { .. } => "Class",
            Self::String { .. } => "String",
            Self::FieldRef { .. } => "FieldRef",
            Self::MethodRef { .. } => "MethodRef",
            Self::InterfaceMethodRef { .. } => "InterfaceMethodRef",
            Self::NameAndType { .. } => "NameAndType",
            Self::MethodHandle { .. } => "MethodHandle",
            Self::MethodType { .. } => "MethodType",
            Self::Dynamic { .. } => "Dynamic",
            Self::InvokeDynamic { .. } => "InvokeDynamic",
            Self::Module { .. } => "Module",
            Self::Package { .. } => "Package",
            Self::Reserved => "Reserved",
        }
    }

    /// True for entries that consume two pool slots
    pub fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }
}

/// A resolved field or method reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

/// The constant pool of one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantPool {
    /// Slot 0 is reserved; real entries start at index 1
    entries: Vec<ConstantEntry>,
}

impl ConstantPool {
    /// Parse `constant_pool_count` and the entries that follow it
    pub fn parse(reader: &mut ClassReader<'_>) -> GarnetResult<Self> {
        let count = reader.read_u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(ConstantEntry::Reserved);

        let mut index = 1u16;
        while index < count {
            let tag_byte = reader.read_u8()?;
            let tag = ConstantTag::from_u8(tag_byte).ok_or_else(|| {
                GarnetError::eof(format!("unknown constant pool tag {} at entry {}", tag_byte, index))
            })?;
            let entry = Self::parse_entry(reader, tag)?;
            let wide = entry.is_wide();
            entries.push(entry);
            if wide {
                entries.push(ConstantEntry::Reserved);
                index += 2;
            } else {
                index += 1;
            }
        }

        Ok(Self { entries })
    }

    fn parse_entry(reader: &mut ClassReader<'_>, tag: ConstantTag) -> GarnetResult<ConstantEntry> {
        let entry = match tag {
            ConstantTag::Utf8 => {
                let length = reader.read_u16()? as usize;
                let bytes = reader.read_bytes(length)?;
                // Modified UTF-8 differs from standard UTF-8 only for NUL and
                // supplementary characters; the lossy conversion keeps the
                // pipeline alive on those.
                ConstantEntry::Utf8(String::from_utf8_lossy(bytes).into_owned())
            }
            ConstantTag::Integer => ConstantEntry::Integer(reader.read_i32()?),
            ConstantTag::Float => ConstantEntry::Float(reader.read_f32()?),
            ConstantTag::Long => ConstantEntry::Long(reader.read_i64()?),
            ConstantTag::Double => ConstantEntry::Double(reader.read_f64()?),
            ConstantTag::Class => ConstantEntry::Class { name_index: reader.read_u16()? },
            ConstantTag::String => ConstantEntry::String { string_index: reader.read_u16()? },
            ConstantTag::FieldRef => ConstantEntry::FieldRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            ConstantTag::MethodRef => ConstantEntry::MethodRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            ConstantTag::InterfaceMethodRef => ConstantEntry::InterfaceMethodRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            ConstantTag::NameAndType => ConstantEntry::NameAndType {
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
            },
            ConstantTag::MethodHandle => ConstantEntry::MethodHandle {
                reference_kind: reader.read_u8()?,
                reference_index: reader.read_u16()?,
            },
            ConstantTag::MethodType => ConstantEntry::MethodType { descriptor_index: reader.read_u16()? },
            ConstantTag::Dynamic => ConstantEntry::Dynamic {
                bootstrap_method_attr_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            ConstantTag::InvokeDynamic => ConstantEntry::InvokeDynamic {
                bootstrap_method_attr_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            ConstantTag::Module => ConstantEntry::Module { name_index: reader.read_u16()? },
            ConstantTag::Package => ConstantEntry::Package { name_index: reader.read_u16()? },
        };
        Ok(entry)
    }

    /// Number of logical slots, including slot 0 and reserved slots
    pub fn len(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Look up an entry; index 0 and reserved slots are invalid targets
    pub fn get(&self, index: u16) -> GarnetResult<&ConstantEntry> {
        if index == 0 || index as usize >= self.entries.len() {
            return Err(GarnetError::InvalidConstantPoolIndex { index, size: self.len() });
        }
        let entry = &self.entries[index as usize];
        if matches!(entry, ConstantEntry::Reserved) {
            return Err(GarnetError::InvalidConstantPoolIndex { index, size: self.len() });
        }
        Ok(entry)
    }

    fn expect<'p, T>(
        &'p self,
        index: u16,
        expected: &'static str,
        select: impl FnOnce(&'p ConstantEntry) -> Option<T>,
    ) -> GarnetResult<T> {
        let entry = self.get(index)?;
        select(entry).ok_or(GarnetError::UnexpectedConstantTag {
            index,
            expected,
            found: entry.tag_name(),
        })
    }

    pub fn utf8(&self, index: u16) -> GarnetResult<&str> {
        self.expect(index, "Utf8", |e| match e {
            ConstantEntry::Utf8(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Resolve a `Class` entry to its binary name (`java/lang/Object`)
    pub fn class_name(&self, index: u16) -> GarnetResult<&str> {
        let name_index = self.expect(index, "Class", |e| match e {
            ConstantEntry::Class { name_index } => Some(*name_index),
            _ => None,
        })?;
        self.utf8(name_index)
    }

    /// Resolve a `String` entry to its literal text
    pub fn string(&self, index: u16) -> GarnetResult<&str> {
        let string_index = self.expect(index, "String", |e| match e {
            ConstantEntry::String { string_index } => Some(*string_index),
            _ => None,
        })?;
        self.utf8(string_index)
    }

    /// Resolve a `NameAndType` entry to `(name, descriptor)`
    pub fn name_and_type(&self, index: u16) -> GarnetResult<(&str, &str)> {
        let (name_index, descriptor_index) = self.expect(index, "NameAndType", |e| match e {
            ConstantEntry::NameAndType { name_index, descriptor_index } => {
                Some((*name_index, *descriptor_index))
            }
            _ => None,
        })?;
        Ok((self.utf8(name_index)?, self.utf8(descriptor_index)?))
    }

    /// Resolve a `FieldRef` entry
    pub fn field_ref(&self, index: u16) -> GarnetResult<MemberRef> {
        let (class_index, nat_index) = self.expect(index, "FieldRef", |e| match e {
            ConstantEntry::FieldRef { class_index, name_and_type_index } => {
                Some((*class_index, *name_and_type_index))
            }
            _ => None,
        })?;
        self.resolve_member(index, class_index, nat_index, false)
            .map_err(|e| match e {
                GarnetError::UnexpectedConstantTag { .. } => GarnetError::InvalidFieldReference {
                    index,
                    message: e.to_string(),
                },
                other => other,
            })
    }

    /// Resolve a `MethodRef` or `InterfaceMethodRef` entry
    pub fn method_ref(&self, index: u16) -> GarnetResult<MemberRef> {
        let (class_index, nat_index, is_interface) =
            self.expect(index, "MethodRef or InterfaceMethodRef", |e| match e {
                ConstantEntry::MethodRef { class_index, name_and_type_index } => {
                    Some((*class_index, *name_and_type_index, false))
                }
                ConstantEntry::InterfaceMethodRef { class_index, name_and_type_index } => {
                    Some((*class_index, *name_and_type_index, true))
                }
                _ => None,
            })?;
        self.resolve_member(index, class_index, nat_index, is_interface)
            .map_err(|e| match e {
                GarnetError::UnexpectedConstantTag { .. } => GarnetError::InvalidMethodReference {
                    index,
                    message: e.to_string(),
                },
                other => other,
            })
    }

    /// Resolve the `NameAndType` behind a `Dynamic` or `InvokeDynamic` entry
    pub fn invoke_dynamic(&self, index: u16) -> GarnetResult<(u16, &str, &str)> {
        let (bootstrap, nat_index) = self.expect(index, "InvokeDynamic", |e| match e {
            ConstantEntry::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => {
                Some((*bootstrap_method_attr_index, *name_and_type_index))
            }
            ConstantEntry::Dynamic { bootstrap_method_attr_index, name_and_type_index } => {
                Some((*bootstrap_method_attr_index, *name_and_type_index))
            }
            _ => None,
        })?;
        let (name, descriptor) = self.name_and_type(nat_index)?;
        Ok((bootstrap, name, descriptor))
    }

    fn resolve_member(
        &self,
        _ref_index: u16,
        class_index: u16,
        nat_index: u16,
        is_interface: bool,
    ) -> GarnetResult<MemberRef> {
        let class_name = self.class_name(class_index)?.to_string();
        let (name, descriptor) = self.name_and_type(nat_index)?;
        Ok(MemberRef {
            class_name,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_interface,
        })
    }

    /// Check every cross-reference in the pool: each referenced index must
    /// resolve to an entry of the tag the reference expects, and reserved
    /// slots must never be targeted.
    pub fn verify(&self) -> GarnetResult<()> {
        for (i, entry) in self.entries.iter().enumerate() {
            let index = i as u16;
            match entry {
                ConstantEntry::Class { name_index }
                | ConstantEntry::Module { name_index }
                | ConstantEntry::Package { name_index } => {
                    self.utf8(*name_index)?;
                }
                ConstantEntry::String { string_index } => {
                    self.utf8(*string_index)?;
                }
                ConstantEntry::FieldRef { .. } => {
                    self.field_ref(index)?;
                }
                ConstantEntry::MethodRef { .. } | ConstantEntry::InterfaceMethodRef { .. } => {
                    self.method_ref(index)?;
                }
                ConstantEntry::NameAndType { .. } => {
                    self.name_and_type(index)?;
                }
                ConstantEntry::MethodType { descriptor_index } => {
                    self.utf8(*descriptor_index)?;
                }
                ConstantEntry::Dynamic { name_and_type_index, .. }
                | ConstantEntry::InvokeDynamic { name_and_type_index, .. } => {
                    self.name_and_type(*name_and_type_index)?;
                }
                ConstantEntry::MethodHandle { reference_index, .. } => {
                    self.get(*reference_index)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = (u16, &ConstantEntry)> {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, e)| (i as u16, e))
    }
}
