//! # Tessera Support
//!
//! Shared utilities for the Tessera IoC container.
//!
//! This crate provides:
//! - Rendering of construction chains for cycle diagnostics
//! - Short type names for log and error output
//! - "Did you mean?" suggestions for unknown component names

pub mod rendering;
