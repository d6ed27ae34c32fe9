//! # freesail-core
//!
//! Protocol types, data-model utilities, and configuration shared by the
//! Freesail gateway, client, and CLI.
//!
//! - **Protocol**: downstream/upstream message types and the streaming codec
//! - **Components**: component records, dynamic values, and child expansion
//! - **Catalogs**: catalog loading, schema validation, and agent summaries
//! - **Configuration**: loading, validation, and persistence of config files

pub mod catalog;
pub mod component;
pub mod config;
pub mod error;
pub mod id;
pub mod paths;
pub mod pointer;
pub mod protocol;

// Re-exports for convenience
pub use catalog::Catalog;
pub use component::{Component, DynamicValue};
pub use config::Config;
pub use error::{Error, Result};
