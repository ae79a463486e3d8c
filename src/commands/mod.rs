//! Command implementations for the optlayer CLI.
//!
//! Each command returns a result type implementing [`Output`] so `main` can
//! print it as JSON or as human-readable text. Commands are grouped by
//! concern:
//! - this module: `init`, `nonce` and the shared site session
//! - [`options`] - `get`, `explain`, `save`, `reset`, `form`
//! - [`schema`] - `schema show`, `schema deps`
//! - [`config`] - `config get/set/list`

pub mod config;
pub mod options;
pub mod schema;

pub use config::{config_get, config_list, config_set};
pub use options::{explain, form, get, reset, save};
pub use schema::{schema_deps, schema_show};

use crate::auth::{Action, NonceIssuer, generate_secret};
use crate::config::{ConfigOverrides, ResolvedConfig, resolve_config, resolve_state};
use crate::models::{EntityId, Mode};
use crate::resolver::{RequestContext, RequestOverrides};
use crate::schema::Schema;
use crate::schema::kdl::load_schema_from_file;
use crate::storage::Storage;
use crate::{Error, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Schema file looked up in the site directory when none is configured.
pub const DEFAULT_SCHEMA_FILE: &str = "schema.kdl";

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// Serialize a result, falling back to an error object.
pub(crate) fn json_of<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {}"}}"#, e))
}

/// Everything a command needs to talk to one site.
pub struct Session {
    pub site: PathBuf,
    pub storage: Storage,
    pub config: ResolvedConfig,
}

impl Session {
    /// Open an initialized site and resolve its configuration.
    pub fn open(site: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        let storage = Storage::open(site)?;
        let config = resolve_config(&storage, overrides)?;
        Ok(Self {
            site: site.to_path_buf(),
            storage,
            config,
        })
    }

    /// Schema file: configured path (relative to the site) or `schema.kdl`.
    pub fn schema_path(&self) -> PathBuf {
        match self.config.schema_path() {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.site.join(path),
            None => self.site.join(DEFAULT_SCHEMA_FILE),
        }
    }

    pub fn load_schema(&self) -> Result<Schema> {
        let path = self.schema_path();
        if !path.exists() {
            return Err(Error::Schema(format!(
                "no schema at {} (set one with `optlayer config set schema <path>`)",
                path.display()
            )));
        }
        load_schema_from_file(&path)
    }

    /// Nonce issuer from the resolved secret, if any.
    pub fn nonces(&self) -> Result<Option<NonceIssuer>> {
        Ok(resolve_state(&self.storage)?
            .secret()
            .map(NonceIssuer::new))
    }

    /// Build the request context for a command.
    pub fn context(
        &self,
        mode: Option<Mode>,
        entity: Option<EntityId>,
        query: Option<&str>,
    ) -> Result<RequestContext> {
        let schema = Arc::new(self.load_schema()?);
        let backend = self.storage.backend(self.config.backend());
        let overrides = query.map(RequestOverrides::from_query).unwrap_or_default();
        let mut ctx = RequestContext::new(schema, backend)
            .with_mode(mode)
            .with_entity(entity)
            .with_overrides(overrides)
            .strict(self.config.strict());
        if let Some(issuer) = self.nonces()? {
            ctx = ctx.with_nonces(issuer);
        }
        Ok(ctx)
    }
}

/// Parse an optional CLI mode.
pub(crate) fn parse_mode(mode: Option<&str>) -> Option<Mode> {
    mode.and_then(Mode::new)
}

/// Parse an optional CLI entity id (`0` means none).
pub(crate) fn parse_entity(entity: Option<u64>) -> Option<EntityId> {
    entity.and_then(EntityId::new)
}

// === Init ===

#[derive(Serialize)]
pub struct InitResult {
    pub site: String,
    pub storage_root: String,
    pub secret_created: bool,
}

impl Output for InitResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Initialized optlayer for {}", self.site)];
        lines.push(format!("  storage: {}", self.storage_root));
        if self.secret_created {
            lines.push("  generated a new nonce secret".to_string());
        }
        lines.join("\n")
    }
}

/// Create storage for the site and a nonce secret if none exists.
pub fn init(site: &Path) -> Result<InitResult> {
    let storage = Storage::init(site)?;
    let mut state = storage.read_optlayer_state()?;
    let secret_created = state.nonce_secret.is_none();
    if secret_created {
        state.nonce_secret = Some(generate_secret());
        state.secret_created_at = Some(Utc::now());
        storage.write_optlayer_state(&state)?;
        tracing::info!(root = %storage.root.display(), "generated nonce secret");
    }
    Ok(InitResult {
        site: site.display().to_string(),
        storage_root: storage.root.display().to_string(),
        secret_created,
    })
}

// === Nonce ===

#[derive(Serialize)]
pub struct NonceResult {
    pub action: String,
    pub token: String,
}

impl Output for NonceResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        format!("{} ({})", self.token, self.action)
    }
}

/// Issue an authenticity token for a site-wide or entity save.
pub fn nonce(site: &Path, entity: Option<u64>) -> Result<NonceResult> {
    let session = Session::open(site, &ConfigOverrides::default())?;
    let issuer = session.nonces()?.ok_or_else(|| {
        Error::AuthorizationFailure("no nonce secret configured (run `optlayer init`)".to_string())
    })?;
    let action = match parse_entity(entity) {
        Some(id) => Action::SaveEntity(id),
        None => Action::SaveGlobal,
    };
    Ok(NonceResult {
        action: action.to_string(),
        token: issuer.create(&action),
    })
}
