//! Shared utilities and error types for the Garnet decompiler
//!
//! This crate provides common functionality used across all pipeline stages:
//! - Error types and handling utilities
//! - Diagnostic collection for degraded (per-method) failures
//! - Aggregate decompilation statistics

pub mod diagnostics;
pub mod error;
pub mod stats;

pub use diagnostics::*;
pub use error::*;
pub use stats::*;
