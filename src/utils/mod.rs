//! Utility functions shared across the crate.
//!
//! - [`code_generator`] - Short code generation and code-space arithmetic

pub mod code_generator;
