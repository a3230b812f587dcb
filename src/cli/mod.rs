//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, config loading for an
//! invocation, the `view` listing and shell completion.

pub mod app;

// Re-export main types
pub use app::*;
