//! optlayer - a layered option resolver.
//!
//! This library provides the core functionality for the `optlayer` CLI tool:
//! typed option schemas, a per-request resolution context walking a fixed
//! precedence chain (request > entity > mode > parent mode > global > default),
//! and an authorized save path that writes each scope atomically.

pub mod action_log;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod resolver;
pub mod schema;
pub mod storage;


/// Library-level error type for optlayer operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailure(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Not initialized: run `optlayer init` first")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for optlayer operations.
pub type Result<T> = std::result::Result<T, Error>;
