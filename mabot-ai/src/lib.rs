//! mabot-ai library interface
//!
//! Exposes the pipeline core and its adapters for the binary and for
//! integration testing.

pub mod adapters;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod types;

pub use crate::error::{LedgerError, RemoteError};
pub use crate::services::{Pipeline, RetryPolicy, RunCoordinator};
pub use crate::types::Collaborators;
