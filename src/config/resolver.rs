//! Unified precedence resolution for configuration and state.
//!
//! ## Nonce Secret Precedence (highest to lowest)
//!
//! 1. `OPTLAYER_NONCE_SECRET` environment variable
//! 2. Session state.kdl (`~/.local/share/optlayer/<site-hash>/state.kdl`)
//!
//! ## Config Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Session config.kdl (`~/.local/share/optlayer/<site-hash>/config.kdl`)
//! 3. System config.kdl (`~/.config/optlayer/config.kdl`)
//! 4. Built-in defaults

use crate::Result;
use crate::config::{OptlayerConfig, OutputFormat};
use crate::storage::{BackendType, Storage};
use std::path::PathBuf;

/// Environment variable name for the nonce secret override.
pub const NONCE_SECRET_ENV: &str = "OPTLAYER_NONCE_SECRET";

/// Tracks where a resolved setting came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from session-level config/state
    Session,
    /// Value from system-level config/state
    System,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::Session => write!(f, "session"),
            ValueSource::System => write!(f, "system"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
///
/// The source type defaults to [`ValueSource`]; option resolution uses
/// its own source type (see `resolver::OptionSource`).
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T, S = ValueSource> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: S,
}

impl<T, S> Resolved<T, S> {
    /// Create a new resolved value.
    pub fn new(value: T, source: S) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Output format preference
    pub output_format: Resolved<OutputFormat>,
    /// Whether unknown option names are errors
    pub strict: Resolved<bool>,
    /// Option schema file, if configured
    pub schema: Option<Resolved<PathBuf>>,
    /// Option storage backend
    pub backend: Resolved<BackendType>,
    /// Whether commands are logged
    pub action_log: Resolved<bool>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            output_format: Resolved::new(OutputFormat::Json, ValueSource::Default),
            strict: Resolved::new(true, ValueSource::Default),
            schema: None,
            backend: Resolved::new(BackendType::File, ValueSource::Default),
            action_log: Resolved::new(true, ValueSource::Default),
        }
    }
}

impl ResolvedConfig {
    /// Get the output format value.
    pub fn output_format(&self) -> &OutputFormat {
        &self.output_format.value
    }

    pub fn strict(&self) -> bool {
        self.strict.value
    }

    /// Get the schema path, if set.
    pub fn schema_path(&self) -> Option<&PathBuf> {
        self.schema.as_ref().map(|r| &r.value)
    }

    pub fn backend(&self) -> BackendType {
        self.backend.value
    }

    pub fn action_log_enabled(&self) -> bool {
        self.action_log.value
    }
}

/// Fully resolved state with source tracking.
#[derive(Debug, Clone, Default)]
pub struct ResolvedState {
    /// Secret for authenticity tokens
    pub nonce_secret: Option<Resolved<String>>,
}

impl ResolvedState {
    /// Get the secret value, if set.
    pub fn secret(&self) -> Option<&str> {
        self.nonce_secret.as_ref().map(|r| r.value.as_str())
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Output format override from CLI flag
    pub output_format: Option<OutputFormat>,
    /// Strictness override from CLI flag
    pub strict: Option<bool>,
    /// Schema path override from CLI flag
    pub schema: Option<PathBuf>,
    /// Backend override from CLI flag
    pub backend: Option<BackendType>,
}

impl ConfigOverrides {
    /// Create empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set output format override.
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn with_schema(mut self, schema: impl Into<PathBuf>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = Some(backend);
        self
    }
}

/// Pick the highest-precedence value among CLI flag, session and system.
fn layered<T: Clone>(
    cli: Option<&T>,
    session: Option<&T>,
    system: Option<&T>,
) -> Option<Resolved<T>> {
    if let Some(v) = cli {
        Some(Resolved::new(v.clone(), ValueSource::CliFlag))
    } else if let Some(v) = session {
        Some(Resolved::new(v.clone(), ValueSource::Session))
    } else {
        system.map(|v| Resolved::new(v.clone(), ValueSource::System))
    }
}

/// Resolve configuration with full precedence chain.
///
/// Precedence (highest to lowest):
/// 1. CLI flags (from `overrides`)
/// 2. Session config.kdl
/// 3. System config.kdl
/// 4. Built-in defaults
pub fn resolve_config(storage: &Storage, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let system_config = Storage::read_system_optlayer_config()?;
    let session_config = storage.read_optlayer_config()?;
    Ok(resolve_config_layers(overrides, &session_config, &system_config))
}

/// Resolve configuration when no site storage exists yet.
pub fn resolve_config_without_storage(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let system_config = Storage::read_system_optlayer_config()?;
    Ok(resolve_config_layers(
        overrides,
        &OptlayerConfig::default(),
        &system_config,
    ))
}

fn resolve_config_layers(
    overrides: &ConfigOverrides,
    session: &OptlayerConfig,
    system: &OptlayerConfig,
) -> ResolvedConfig {
    let mut result = ResolvedConfig::default();

    if let Some(r) = layered(
        overrides.output_format.as_ref(),
        session.output_format.as_ref(),
        system.output_format.as_ref(),
    ) {
        result.output_format = r;
    }

    if let Some(r) = layered(
        overrides.strict.as_ref(),
        session.strict.as_ref(),
        system.strict.as_ref(),
    ) {
        result.strict = r;
    }

    let session_schema = session.schema.as_ref().map(PathBuf::from);
    let system_schema = system.schema.as_ref().map(PathBuf::from);
    result.schema = layered(
        overrides.schema.as_ref(),
        session_schema.as_ref(),
        system_schema.as_ref(),
    );

    // Invalid backend names are rejected on write, so parse failures here
    // just fall through to the next layer.
    let session_backend = session.backend.as_deref().and_then(BackendType::parse);
    let system_backend = system.backend.as_deref().and_then(BackendType::parse);
    if let Some(r) = layered(
        overrides.backend.as_ref(),
        session_backend.as_ref(),
        system_backend.as_ref(),
    ) {
        result.backend = r;
    }

    if let Some(r) = layered(None, session.action_log.as_ref(), system.action_log.as_ref()) {
        result.action_log = r;
    }

    result
}

/// Resolve state with full precedence chain.
///
/// Secret precedence (highest to lowest):
/// 1. `OPTLAYER_NONCE_SECRET` environment variable
/// 2. Session state.kdl
pub fn resolve_state(storage: &Storage) -> Result<ResolvedState> {
    let mut result = ResolvedState::default();

    if let Ok(secret) = std::env::var(NONCE_SECRET_ENV) {
        if !secret.is_empty() {
            result.nonce_secret = Some(Resolved::new(
                secret,
                ValueSource::EnvVar(NONCE_SECRET_ENV.to_string()),
            ));
            return Ok(result);
        }
    }

    let session_state = storage.read_optlayer_state()?;
    if let Some(secret) = session_state.nonce_secret {
        result.nonce_secret = Some(Resolved::new(secret, ValueSource::Session));
    }

    Ok(result)
}

/// Combined resolver for both config and state.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    /// Resolved configuration
    pub config: ResolvedConfig,
    /// Resolved state
    pub state: ResolvedState,
}

impl ResolvedSettings {
    /// Resolve all settings with the given overrides.
    pub fn resolve(storage: &Storage, config_overrides: &ConfigOverrides) -> Result<Self> {
        Ok(Self {
            config: resolve_config(storage, config_overrides)?,
            state: resolve_state(storage)?,
        })
    }
}
