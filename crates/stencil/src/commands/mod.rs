//! Command implementations for the stencil CLI
//!
//! Each command module handles the CLI interface and delegates to
//! stencil-render for the actual work.

pub mod fields;
pub mod placeholder;
pub mod render;
