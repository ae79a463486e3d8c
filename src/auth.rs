//! Authorization gate for option writes.
//!
//! Two independent checks run before anything is written:
//! - authenticity: the submitted token must be a nonce issued for the
//!   exact action being performed (`options:global` or
//!   `options:entity:<id>`) within the last two ticks
//! - privilege: the acting principal's role must grant the capability the
//!   action requires
//!
//! A tick is half the nonce lifetime, so a token stays valid for between
//! one half and one full lifetime after issue.

use crate::models::EntityId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Default nonce lifetime: one day.
pub const DEFAULT_NONCE_LIFETIME_SECS: i64 = 86_400;

/// Length of an issued token, in hex characters.
pub const TOKEN_LEN: usize = 10;

/// A protected write action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Save or reset site-wide options
    SaveGlobal,
    /// Save one entity's overrides
    SaveEntity(EntityId),
}

impl Action {
    pub fn as_string(&self) -> String {
        match self {
            Action::SaveGlobal => "options:global".to_string(),
            Action::SaveEntity(id) => format!("options:entity:{}", id),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

/// How old a verified token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceAge {
    /// Issued during the current tick
    Fresh,
    /// Issued during the previous tick
    Aging,
}

/// Issues and verifies authenticity tokens from a shared secret.
#[derive(Clone)]
pub struct NonceIssuer {
    secret: String,
    lifetime_secs: i64,
}

impl std::fmt::Debug for NonceIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceIssuer")
            .field("secret", &"<redacted>")
            .field("lifetime_secs", &self.lifetime_secs)
            .finish()
    }
}

impl NonceIssuer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            lifetime_secs: DEFAULT_NONCE_LIFETIME_SECS,
        }
    }

    /// Override the lifetime (clamped to at least two seconds).
    pub fn with_lifetime(mut self, secs: i64) -> Self {
        self.lifetime_secs = secs.max(2);
        self
    }

    fn tick(&self, now: DateTime<Utc>) -> i64 {
        let half = self.lifetime_secs / 2;
        // ceil for non-negative timestamps
        (now.timestamp() + half - 1).div_euclid(half)
    }

    /// HMAC-SHA256 of `tick|action` keyed by the secret, truncated to
    /// [`TOKEN_LEN`] hex characters.
    fn digest(&self, action: &Action, tick: i64) -> String {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return String::new();
        };
        mac.update(tick.to_string().as_bytes());
        mac.update(b"|");
        mac.update(action.as_string().as_bytes());
        let hex: String = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        hex[..TOKEN_LEN].to_string()
    }

    /// Issue a token for `action` now.
    pub fn create(&self, action: &Action) -> String {
        self.create_at(action, Utc::now())
    }

    pub fn create_at(&self, action: &Action, now: DateTime<Utc>) -> String {
        self.digest(action, self.tick(now))
    }

    /// Verify a token for `action` now.
    pub fn verify(&self, token: &str, action: &Action) -> Option<NonceAge> {
        self.verify_at(token, action, Utc::now())
    }

    pub fn verify_at(&self, token: &str, action: &Action, now: DateTime<Utc>) -> Option<NonceAge> {
        if token.len() != TOKEN_LEN {
            return None;
        }
        let tick = self.tick(now);
        if token_matches(token, &self.digest(action, tick)) {
            Some(NonceAge::Fresh)
        } else if token_matches(token, &self.digest(action, tick - 1)) {
            Some(NonceAge::Aging)
        } else {
            None
        }
    }
}

fn token_matches(token: &str, expected: &str) -> bool {
    token.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Generate a fresh random nonce secret.
pub fn generate_secret() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Something a principal may be allowed to do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Change site-wide options
    ManageOptions,
    /// Edit entities of the given capability type (`page`, `post`, ...)
    Edit(String),
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::ManageOptions => write!(f, "manage_options"),
            Capability::Edit(kind) => write!(f, "edit_{}s", kind),
        }
    }
}

/// Role of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Editor,
    Author,
    Subscriber,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "administrator" | "admin" => Some(Role::Administrator),
            "editor" => Some(Role::Editor),
            "author" => Some(Role::Author),
            "subscriber" => Some(Role::Subscriber),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Editor => "editor",
            Role::Author => "author",
            Role::Subscriber => "subscriber",
        }
    }

    /// Whether this role grants `capability`.
    ///
    /// Administrators can do everything, editors can edit any entity type,
    /// authors can only edit posts, subscribers nothing.
    pub fn grants(&self, capability: &Capability) -> bool {
        match (self, capability) {
            (Role::Administrator, _) => true,
            (Role::Editor, Capability::Edit(_)) => true,
            (Role::Author, Capability::Edit(kind)) => kind == "post",
            _ => false,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The acting user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub role: Role,
}

impl Principal {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

/// Credentials accompanying a write.
#[derive(Debug, Clone)]
pub struct Authorization {
    /// Authenticity token submitted with the form
    pub token: String,
    /// Who is submitting
    pub principal: Principal,
}

impl Authorization {
    pub fn new(token: impl Into<String>, principal: Principal) -> Self {
        Self {
            token: token.into(),
            principal,
        }
    }

    /// Run both checks for `action`, authenticity first.
    pub fn check(
        &self,
        issuer: Option<&NonceIssuer>,
        action: &Action,
        required: &Capability,
    ) -> Result<NonceAge> {
        let issuer = issuer.ok_or_else(|| {
            Error::AuthorizationFailure("no nonce secret configured".to_string())
        })?;
        let age = issuer.verify(&self.token, action).ok_or_else(|| {
            Error::AuthorizationFailure(format!("invalid or expired token for {}", action))
        })?;
        if !self.principal.role.grants(required) {
            return Err(Error::PermissionDenied(format!(
                "{} ({}) lacks {}",
                self.principal.name, self.principal.role, required
            )));
        }
        Ok(age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn entity(id: u64) -> Action {
        Action::SaveEntity(EntityId::new(id).unwrap())
    }

    #[test]
    fn test_action_strings() {
        assert_eq!(Action::SaveGlobal.to_string(), "options:global");
        assert_eq!(entity(42).to_string(), "options:entity:42");
    }

    #[test]
    fn test_token_shape() {
        let issuer = NonceIssuer::new("secret");
        let token = issuer.create(&Action::SaveGlobal);
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_token_valid_for_current_and_previous_tick() {
        let issuer = NonceIssuer::new("secret").with_lifetime(100);
        let token = issuer.create_at(&Action::SaveGlobal, at(1_000));

        assert_eq!(
            issuer.verify_at(&token, &Action::SaveGlobal, at(1_000)),
            Some(NonceAge::Fresh)
        );
        assert_eq!(
            issuer.verify_at(&token, &Action::SaveGlobal, at(1_050)),
            Some(NonceAge::Aging)
        );
        assert_eq!(issuer.verify_at(&token, &Action::SaveGlobal, at(1_100)), None);
    }

    #[test]
    fn test_token_bound_to_action_and_secret() {
        let issuer = NonceIssuer::new("secret");
        let token = issuer.create_at(&entity(42), at(5_000));
        assert!(issuer.verify_at(&token, &entity(42), at(5_000)).is_some());
        assert!(issuer.verify_at(&token, &entity(43), at(5_000)).is_none());
        assert!(issuer.verify_at(&token, &Action::SaveGlobal, at(5_000)).is_none());

        let other = NonceIssuer::new("other-secret");
        assert!(other.verify_at(&token, &entity(42), at(5_000)).is_none());
    }

    #[test]
    fn test_token_is_keyed_mac_prefix() {
        let issuer = NonceIssuer::new("secret").with_lifetime(100);
        let now = at(1_000);
        let tick = issuer.tick(now);
        assert_eq!(tick, 20);

        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"20|options:global");
        let expected: String = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        assert_eq!(issuer.create_at(&Action::SaveGlobal, now), expected[..TOKEN_LEN]);
    }

    #[test]
    fn test_token_matches_requires_equal_length() {
        assert!(token_matches("abcdef0123", "abcdef0123"));
        assert!(!token_matches("abcdef0123", "abcdef0124"));
        assert!(!token_matches("abcdef012", "abcdef0123"));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let issuer = NonceIssuer::new("secret");
        assert!(issuer.verify("", &Action::SaveGlobal).is_none());
        assert!(issuer.verify("not-a-token", &Action::SaveGlobal).is_none());
    }

    #[test]
    fn test_generate_secret_is_random_hex() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn test_role_capabilities() {
        let edit_page = Capability::Edit("page".to_string());
        let edit_post = Capability::Edit("post".to_string());

        assert!(Role::Administrator.grants(&Capability::ManageOptions));
        assert!(Role::Administrator.grants(&edit_page));
        assert!(!Role::Editor.grants(&Capability::ManageOptions));
        assert!(Role::Editor.grants(&edit_page));
        assert!(Role::Author.grants(&edit_post));
        assert!(!Role::Author.grants(&edit_page));
        assert!(!Role::Subscriber.grants(&edit_post));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Admin"), Some(Role::Administrator));
        assert_eq!(Role::parse("editor"), Some(Role::Editor));
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn test_check_order_authenticity_before_privilege() {
        let issuer = NonceIssuer::new("secret");
        let subscriber = Principal::new("sam", Role::Subscriber);

        let bad = Authorization::new("0000000000", subscriber.clone());
        assert!(matches!(
            bad.check(Some(&issuer), &Action::SaveGlobal, &Capability::ManageOptions),
            Err(Error::AuthorizationFailure(_))
        ));

        let token = issuer.create(&Action::SaveGlobal);
        let good_token = Authorization::new(token, subscriber);
        assert!(matches!(
            good_token.check(Some(&issuer), &Action::SaveGlobal, &Capability::ManageOptions),
            Err(Error::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_check_without_issuer_fails() {
        let auth = Authorization::new("abc", Principal::new("a", Role::Administrator));
        assert!(matches!(
            auth.check(None, &Action::SaveGlobal, &Capability::ManageOptions),
            Err(Error::AuthorizationFailure(_))
        ));
    }
}
