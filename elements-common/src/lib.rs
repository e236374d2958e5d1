//! # Elements Common Library
//!
//! Shared code for the Elements profile tooling:
//! - Credential file loading (per-environment API, SSH and database settings)
//! - Config file path resolution
//! - Common error types

pub mod config;
pub mod error;

pub use config::Environment;
pub use error::{Error, Result};
