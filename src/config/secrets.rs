//! Credential resolution
//!
//! Configs only carry a `credentials_ref`; the live user/password pair is
//! looked up when a generator is about to run and is never written back.

use crate::error::{BackupError, ErrorKind};
use std::collections::HashMap;
use std::env;
use std::fmt;

/// Live credentials for one database connection
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolves a `credentials_ref` into live credentials
pub trait SecretsProvider: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<Credentials, BackupError>;
}

/// Reads `<REF>_USER` / `<REF>_PASSWORD` from the process environment
///
/// `prod-db` maps to `PROD_DB_USER`; the `${DB}` form is accepted too.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretsProvider;

impl EnvSecretsProvider {
    pub fn new() -> Self {
        Self
    }

    /// Environment variable prefix for a reference
    pub fn env_prefix(reference: &str) -> String {
        let trimmed = reference.trim();
        let inner = trimmed
            .strip_prefix("${")
            .and_then(|r| r.strip_suffix('}'))
            .unwrap_or(trimmed);

        inner
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl SecretsProvider for EnvSecretsProvider {
    fn resolve(&self, reference: &str) -> Result<Credentials, BackupError> {
        let prefix = Self::env_prefix(reference);
        let user_var = format!("{}_USER", prefix);
        let password_var = format!("{}_PASSWORD", prefix);

        let user = env::var(&user_var).map_err(|_| {
            BackupError::new(
                ErrorKind::Auth,
                format!("environment variable {} is not set", user_var),
            )
        })?;

        // An empty password is legitimate (trust/peer auth), a missing one is not
        let password = env::var(&password_var).map_err(|_| {
            BackupError::new(
                ErrorKind::Auth,
                format!("environment variable {} is not set", password_var),
            )
        })?;

        Ok(Credentials { user, password })
    }
}

/// Fixed credential table, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticSecretsProvider {
    entries: HashMap<String, Credentials>,
}

impl StaticSecretsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: &str, credentials: Credentials) -> Self {
        self.entries.insert(reference.to_string(), credentials);
        self
    }
}

impl SecretsProvider for StaticSecretsProvider {
    fn resolve(&self, reference: &str) -> Result<Credentials, BackupError> {
        self.entries.get(reference).cloned().ok_or_else(|| {
            BackupError::new(
                ErrorKind::Auth,
                format!("no credentials registered for '{}'", reference),
            )
        })
    }
}
