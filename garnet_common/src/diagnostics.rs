//! Diagnostic message handling for the Garnet decompiler
//!
//! Per-method failures (bad bytecode, stack mismatches, type conflicts) are
//! recorded here instead of aborting the class; the method is then emitted in
//! a degraded form.

use crate::GarnetError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level for diagnostic messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Where inside a class a diagnostic was raised
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Method name, empty for class-level diagnostics
    pub method_name: String,
    /// Bytecode offset within the method's code, if known
    pub pc: Option<u32>,
    /// Source line from the LineNumberTable, if known
    pub line: Option<u16>,
}

impl Location {
    pub fn class_level() -> Self {
        Self::default()
    }

    pub fn method(name: impl Into<String>) -> Self {
        Self { method_name: name.into(), pc: None, line: None }
    }

    pub fn at_pc(name: impl Into<String>, pc: u32) -> Self {
        Self { method_name: name.into(), pc: Some(pc), line: None }
    }

    pub fn with_line(mut self, line: u16) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.method_name.is_empty() {
            return write!(f, "<class>");
        }
        write!(f, "{}", self.method_name)?;
        if let Some(pc) = self.pc {
            write!(f, " @ pc {}", pc)?;
        }
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        Ok(())
    }
}

/// A diagnostic message with location and severity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Location,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, location: Location) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            location,
        }
    }

    pub fn warning(message: impl Into<String>, location: Location) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            location,
        }
    }

    pub fn info(message: impl Into<String>, location: Location) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            location,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} at {}", self.severity, self.message, self.location)
    }
}

impl From<GarnetError> for Diagnostic {
    fn from(error: GarnetError) -> Self {
        Diagnostic::error(error.to_string(), Location::class_level())
    }
}

/// Collection of diagnostic messages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub messages: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.messages.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>, location: Location) {
        self.add(Diagnostic::error(message, location));
    }

    pub fn warning(&mut self, message: impl Into<String>, location: Location) {
        self.add(Diagnostic::warning(message, location));
    }

    pub fn info(&mut self, message: impl Into<String>, location: Location) {
        self.add(Diagnostic::info(message, location));
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.messages.iter().filter(|d| d.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.messages.iter().filter(|d| d.severity == Severity::Warning).count()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.messages.extend(other.messages);
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter()
    }
}
