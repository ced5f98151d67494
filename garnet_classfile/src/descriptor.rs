//! Field and method descriptor parsing
//!
//! Grammar: a field type is one of the eight primitive letters,
//! `L<class-name>;`, or `[` repeated per array dimension before an element
//! type. A method descriptor is `(<param types>)<return type>` where the
//! return position may also be `V`.

use garnet_common::{GarnetError, GarnetResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed field type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn parse(descriptor: &str) -> GarnetResult<Self> {
        let mut chars = descriptor.char_indices().peekable();
        let ty = Self::parse_from(descriptor, &mut chars)?;
        if chars.next().is_some() {
            return Err(GarnetError::invalid_descriptor(descriptor, "trailing characters"));
        }
        Ok(ty)
    }

    fn parse_from(
        descriptor: &str,
        chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    ) -> GarnetResult<Self> {
        let (_, c) = chars
            .next()
            .ok_or_else(|| GarnetError::invalid_descriptor(descriptor, "empty type"))?;
        let ty = match c {
            'B' => Self::Byte,
            'C' => Self::Char,
            'D' => Self::Double,
            'F' => Self::Float,
            'I' => Self::Int,
            'J' => Self::Long,
            'S' => Self::Short,
            'Z' => Self::Boolean,
            'L' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, ';')) => break,
                        Some((_, c)) => name.push(c),
                        None => {
                            return Err(GarnetError::invalid_descriptor(
                                descriptor,
                                "unterminated class name",
                            ))
                        }
                    }
                }
                Self::Object(name)
            }
            '[' => Self::Array(Box::new(Self::parse_from(descriptor, chars)?)),
            other => {
                return Err(GarnetError::invalid_descriptor(
                    descriptor,
                    format!("unexpected character '{}'", other),
                ))
            }
        };
        Ok(ty)
    }

    /// Operand-stack width: 2 for `long`/`double`, 1 otherwise
    pub fn width(&self) -> u8 {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    /// Java-facing rendering: `int`, `java.lang.String`, `int[]`
    pub fn display_name(&self) -> String {
        match self {
            Self::Byte => "byte".into(),
            Self::Char => "char".into(),
            Self::Double => "double".into(),
            Self::Float => "float".into(),
            Self::Int => "int".into(),
            Self::Long => "long".into(),
            Self::Short => "short".into(),
            Self::Boolean => "boolean".into(),
            Self::Object(name) => name.replace('/', "."),
            Self::Array(element) => format!("{}[]", element.display_name()),
        }
    }
}

impl fmt::Display for FieldType {
    /// Renders descriptor syntax, so `parse` and `Display` round-trip
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => write!(f, "B"),
            Self::Char => write!(f, "C"),
            Self::Double => write!(f, "D"),
            Self::Float => write!(f, "F"),
            Self::Int => write!(f, "I"),
            Self::Long => write!(f, "J"),
            Self::Short => write!(f, "S"),
            Self::Boolean => write!(f, "Z"),
            Self::Object(name) => write!(f, "L{};", name),
            Self::Array(element) => write!(f, "[{}", element),
        }
    }
}

/// A parsed method descriptor: parameter types and return type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` means void
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> GarnetResult<Self> {
        let mut chars = descriptor.char_indices().peekable();
        match chars.next() {
            Some((_, '(')) => {}
            _ => return Err(GarnetError::invalid_descriptor(descriptor, "missing '('")),
        }

        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some((_, ')')) => {
                    chars.next();
                    break;
                }
                Some(_) => params.push(FieldType::parse_from(descriptor, &mut chars)?),
                None => return Err(GarnetError::invalid_descriptor(descriptor, "missing ')'")),
            }
        }

        let ret = match chars.peek() {
            Some((_, 'V')) => {
                chars.next();
                None
            }
            Some(_) => Some(FieldType::parse_from(descriptor, &mut chars)?),
            None => return Err(GarnetError::invalid_descriptor(descriptor, "missing return type")),
        };
        if chars.next().is_some() {
            return Err(GarnetError::invalid_descriptor(descriptor, "trailing characters"));
        }

        Ok(Self { params, ret })
    }

    /// Number of logical arguments (one per parameter type)
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Number of local-variable slots the parameters occupy; `long` and
    /// `double` count twice. Does not include the receiver slot.
    pub fn param_slot_count(&self) -> usize {
        self.params.iter().map(|p| p.width() as usize).sum()
    }

    pub fn is_void(&self) -> bool {
        self.ret.is_none()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        write!(f, ")")?;
        match &self.ret {
            Some(ty) => write!(f, "{}", ty),
            None => write!(f, "V"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(FieldType::parse("I").unwrap(), FieldType::Int);
        assert_eq!(FieldType::parse("Z").unwrap(), FieldType::Boolean);
        assert_eq!(FieldType::parse("J").unwrap(), FieldType::Long);
    }

    #[test]
    fn test_parse_object_and_array() {
        assert_eq!(
            FieldType::parse("Ljava/lang/String;").unwrap(),
            FieldType::Object("java/lang/String".into())
        );
        assert_eq!(
            FieldType::parse("[[I").unwrap(),
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Int))))
        );
    }

    #[test]
    fn test_display_round_trip() {
        for descriptor in ["I", "J", "Ljava/lang/Object;", "[[Ljava/util/List;", "[D"] {
            let parsed = FieldType::parse(descriptor).unwrap();
            assert_eq!(parsed.to_string(), descriptor);
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(FieldType::parse("[I").unwrap().display_name(), "int[]");
        assert_eq!(
            FieldType::parse("Ljava/lang/String;").unwrap().display_name(),
            "java.lang.String"
        );
    }

    #[test]
    fn test_method_descriptor() {
        let desc = MethodDescriptor::parse("(IJLjava/lang/String;)V").unwrap();
        assert_eq!(desc.params.len(), 3);
        assert!(desc.is_void());
        // long counts for two slots
        assert_eq!(desc.param_slot_count(), 4);
        assert_eq!(desc.to_string(), "(IJLjava/lang/String;)V");
    }

    #[test]
    fn test_method_descriptor_return() {
        let desc = MethodDescriptor::parse("()[B").unwrap();
        assert!(desc.params.is_empty());
        assert_eq!(desc.ret, Some(FieldType::Array(Box::new(FieldType::Byte))));
    }

    #[test]
    fn test_malformed_descriptors() {
        assert!(FieldType::parse("Q").is_err());
        assert!(FieldType::parse("Ljava/lang/String").is_err());
        assert!(FieldType::parse("II").is_err());
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(I)").is_err());
    }
}
