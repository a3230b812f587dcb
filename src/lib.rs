//! Cohesion - a monorepo-aware task and action orchestrator
//!
//! A YAML config declares a tree of tasks whose leaves are typed actions.
//! Configs discover other Configs through module patterns, and actions like
//! `delegate` fan a task out across every discovered module in dependency
//! order.

// Public modules
pub mod actions;
pub mod cli;
pub mod config;
pub mod error;
pub mod plugin;
pub mod runner;
pub mod utils;

// Re-export commonly used types
pub use error::{CohesionError, Result};

/// Current version of Cohesion
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
