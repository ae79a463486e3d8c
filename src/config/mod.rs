//! Configuration and state management for optlayer.
//!
//! This module defines KDL schemas for two distinct files:
//!
//! ## config.kdl - User preferences
//!
//! Located at:
//! - System: `~/.config/optlayer/config.kdl`
//! - Session: `~/.local/share/optlayer/<site-hash>/config.kdl`
//!
//! Contains:
//! - `output-format` - "json" or "human"
//! - `strict` - whether unregistered option names are errors
//! - `schema` - path of the option schema file
//! - `backend` - "file" or "memory"
//! - `action-log` - whether commands are logged
//!
//! ## state.kdl - Runtime state (contains secrets)
//!
//! Located at `~/.local/share/optlayer/<site-hash>/state.kdl`.
//!
//! Contains:
//! - `nonce-secret` - secret used to derive authenticity tokens
//! - `secret-created-at` - RFC 3339 timestamp of secret generation
//!
//! ## Security
//!
//! **CRITICAL**: `state.kdl` MUST be created with 0600 permissions (owner read/write only)
//! because it contains the nonce secret.
//!
//! ## Precedence
//!
//! For the nonce secret: env var > session state
//! For preferences: CLI flag > session config > system config > defaults
//!
//! Use the [`resolver`] module for unified precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigOverrides, NONCE_SECRET_ENV, Resolved, ResolvedConfig, ResolvedSettings, ResolvedState,
    ValueSource, resolve_config, resolve_config_without_storage, resolve_state,
};
pub use schema::{CONFIG_KEYS, OptlayerConfig, OptlayerState, OutputFormat};
#[cfg(unix)]
pub use schema::{CONFIG_FILE_MODE, STATE_FILE_MODE};
