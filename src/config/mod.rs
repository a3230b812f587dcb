//! Configuration parsing, registration and discovery
//!
//! This module turns `cohesion.yml` documents into registered [`Config`]
//! trees, resolves their variables, discovers module Configs and orders
//! them by their dependency rules.

pub mod model;
pub mod modules;
pub mod order;
pub mod parse;
pub mod schema;
pub mod types;
pub mod variables;

// Re-export main types
pub use model::*;
pub use modules::{collect_configs, resolve_configs};
pub use order::{order_configs, Inclusion};
pub use parse::*;
pub use schema::*;
pub use types::*;
pub use variables::*;
