//! eduquery-core - Core types and traits for the subject knowledge bases
//!
//! This crate provides the domain types, error taxonomy, configuration and
//! collaborator traits shared by the chunker, index, retriever and registry.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{KbError, Result};
pub use traits::*;
pub use types::*;
