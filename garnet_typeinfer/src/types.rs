//! The type lattice
//!
//! Primitives, references, arrays, `void`, plus `Unknown` (no information
//! yet) and `Conflict` (irreconcilable merge). The lattice is finite for any
//! one method: the class names that can appear are bounded by the constant
//! pool, so iterating merges terminates.

use garnet_classfile::FieldType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The canonical top of the reference half of the lattice
pub const OBJECT_CLASS: &str = "java/lang/Object";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JvmType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference(String),
    Array(Box<JvmType>),
    /// Target of `jsr`, only ever stored and fed to `ret`
    ReturnAddress,
    Void,
    /// No information yet; merges as the identity
    Unknown,
    /// Irreconcilable merge result
    Conflict,
}

impl JvmType {
    pub fn object() -> Self {
        Self::Reference(OBJECT_CLASS.to_string())
    }

    pub fn string() -> Self {
        Self::Reference("java/lang/String".to_string())
    }

    /// Operand-stack category: 2 for `long`/`double`, 1 otherwise
    pub fn category(&self) -> u8 {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    pub fn is_wide(&self) -> bool {
        self.category() == 2
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_) | Self::Array(_))
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Self::Boolean | Self::Byte | Self::Char | Self::Short | Self::Int | Self::Long
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || matches!(self, Self::Float | Self::Double)
    }

    /// Position in the widening chain `byte -> short -> int -> long ->
    /// float -> double`; `char` and `boolean` fold into the int group
    fn widening_rank(&self) -> Option<u8> {
        match self {
            Self::Byte => Some(1),
            Self::Boolean | Self::Char | Self::Short => Some(2),
            Self::Int => Some(3),
            Self::Long => Some(4),
            Self::Float => Some(5),
            Self::Double => Some(6),
            _ => None,
        }
    }

    /// Least upper bound of two lattice elements. Equal types stay; numeric
    /// primitives widen; unrelated references over-approximate to
    /// `java/lang/Object`; anything else is a `Conflict`.
    pub fn merge(&self, other: &JvmType) -> JvmType {
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (Self::Unknown, t) | (t, Self::Unknown) => t.clone(),
            (Self::Conflict, _) | (_, Self::Conflict) => Self::Conflict,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let rank = a.widening_rank().max(b.widening_rank());
                match rank {
                    Some(1) => Self::Byte,
                    Some(2) => Self::Int,
                    Some(3) => Self::Int,
                    Some(4) => Self::Long,
                    Some(5) => Self::Float,
                    Some(6) => Self::Double,
                    _ => Self::Conflict,
                }
            }
            (Self::Array(a), Self::Array(b)) => {
                let element = a.merge(b);
                if element == Self::Conflict {
                    Self::object()
                } else {
                    Self::Array(Box::new(element))
                }
            }
            (a, b) if a.is_reference() && b.is_reference() => {
                // Nearest-common-supertype approximation without a loaded
                // class hierarchy: fall back to Object
                Self::object()
            }
            _ => Self::Conflict,
        }
    }

    /// Lift a descriptor type into the lattice
    pub fn from_field_type(ty: &FieldType) -> JvmType {
        match ty {
            FieldType::Byte => Self::Byte,
            FieldType::Char => Self::Char,
            FieldType::Double => Self::Double,
            FieldType::Float => Self::Float,
            FieldType::Int => Self::Int,
            FieldType::Long => Self::Long,
            FieldType::Short => Self::Short,
            FieldType::Boolean => Self::Boolean,
            FieldType::Object(name) => Self::Reference(name.clone()),
            FieldType::Array(element) => Self::Array(Box::new(Self::from_field_type(element))),
        }
    }

    /// Java-facing rendering: `int`, `java.lang.String`, `long[]`
    pub fn display_name(&self) -> String {
        match self {
            Self::Boolean => "boolean".into(),
            Self::Byte => "byte".into(),
            Self::Char => "char".into(),
            Self::Short => "short".into(),
            Self::Int => "int".into(),
            Self::Long => "long".into(),
            Self::Float => "float".into(),
            Self::Double => "double".into(),
            Self::Reference(name) => name.replace('/', "."),
            Self::Array(element) => format!("{}[]", element.display_name()),
            Self::ReturnAddress => "returnAddress".into(),
            Self::Void => "void".into(),
            Self::Unknown => "var".into(),
            Self::Conflict => "java.lang.Object".into(),
        }
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(JvmType::Long.category(), 2);
        assert_eq!(JvmType::Double.category(), 2);
        assert_eq!(JvmType::Int.category(), 1);
        assert_eq!(JvmType::object().category(), 1);
    }

    #[test]
    fn test_merge_equal_types() {
        assert_eq!(JvmType::Int.merge(&JvmType::Int), JvmType::Int);
        let list = JvmType::Reference("java/util/List".into());
        assert_eq!(list.merge(&list.clone()), list);
    }

    #[test]
    fn test_merge_unknown_is_identity() {
        assert_eq!(JvmType::Unknown.merge(&JvmType::Float), JvmType::Float);
        assert_eq!(JvmType::Long.merge(&JvmType::Unknown), JvmType::Long);
    }

    #[test]
    fn test_merge_widens_primitives() {
        assert_eq!(JvmType::Byte.merge(&JvmType::Short), JvmType::Int);
        assert_eq!(JvmType::Int.merge(&JvmType::Long), JvmType::Long);
        assert_eq!(JvmType::Int.merge(&JvmType::Float), JvmType::Float);
        assert_eq!(JvmType::Float.merge(&JvmType::Double), JvmType::Double);
        assert_eq!(JvmType::Char.merge(&JvmType::Byte), JvmType::Int);
    }

    #[test]
    fn test_merge_unrelated_references_to_object() {
        let a = JvmType::Reference("java/lang/String".into());
        let b = JvmType::Reference("java/util/Map".into());
        assert_eq!(a.merge(&b), JvmType::object());
    }

    #[test]
    fn test_merge_arrays_elementwise() {
        let a = JvmType::Array(Box::new(JvmType::Int));
        assert_eq!(a.merge(&a.clone()), a);
        let b = JvmType::Array(Box::new(JvmType::Long));
        assert_eq!(a.merge(&b), JvmType::Array(Box::new(JvmType::Long)));
    }

    #[test]
    fn test_merge_primitive_with_reference_conflicts() {
        assert_eq!(JvmType::Int.merge(&JvmType::object()), JvmType::Conflict);
        assert_eq!(
            JvmType::Conflict.merge(&JvmType::Int),
            JvmType::Conflict
        );
    }

    #[test]
    fn test_from_field_type() {
        let ty = FieldType::parse("[Ljava/lang/String;").unwrap();
        assert_eq!(
            JvmType::from_field_type(&ty),
            JvmType::Array(Box::new(JvmType::Reference("java/lang/String".into())))
        );
    }

    #[test]
    fn test_display_names() {
        assert_eq!(JvmType::Array(Box::new(JvmType::Int)).display_name(), "int[]");
        assert_eq!(JvmType::object().display_name(), "java.lang.Object");
    }
}
