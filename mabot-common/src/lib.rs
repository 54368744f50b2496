//! # Meeting Analysis Bot Common Library
//!
//! Shared code for the mabot binaries:
//! - Error and result types
//! - Configuration model, loading and path resolution
//! - Timestamp and date formatting helpers

pub mod config;
pub mod error;
pub mod time;

pub use config::AppConfig;
pub use error::{Error, Result};
