//! Core types and abstractions for the Cadastre registry system.
//!
//! This crate provides the foundational types, error handling, and
//! configuration used across all Cadastre components.

pub mod config;
pub mod error;
pub mod id;
pub mod types;

pub use config::StoreConfig;
pub use error::{CadastreError, Result};
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::StoreConfig;
    pub use crate::error::{CadastreError, Result};
    pub use crate::types::*;
}
