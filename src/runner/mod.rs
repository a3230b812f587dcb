//! Task execution engine
//!
//! This module handles task selection, variable interpolation, command
//! running and the dispatch of actions to their registered handlers.

pub mod args;
pub mod command;
pub mod context;
pub mod engine;
pub mod interpolate;
pub mod registry;

// Re-export main types
pub use args::*;
pub use command::*;
pub use context::*;
pub use engine::*;
pub use interpolate::*;
pub use registry::*;
