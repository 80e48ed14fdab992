//! Access token sources.
//!
//! Token acquisition (consent screens, refresh flows) happens outside this
//! tool. We only read an already-issued bearer token, either from an
//! environment variable or from a JSON token file.

use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::TokenConfig;
use crate::error::AuthError;
use crate::pipeline::types::Source;

/// Keys a token file may store the access token under.
const TOKEN_KEYS: &[&str] = &["access_token", "token"];

/// Bearer token for one provider.
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Resolve a token: the environment variable wins, then the token file.
    pub fn load(provider: Source, config: &TokenConfig) -> Result<Self, AuthError> {
        if let Some(ref value) = config.env_value {
            debug!(provider = %provider, env_var = %config.env_var, "Using access token from environment");
            return Ok(Self::new(value.trim()));
        }

        if !config.token_file.exists() {
            return Err(AuthError::MissingToken {
                provider: provider.to_string(),
                env_var: config.env_var.clone(),
                path: config.token_file.clone(),
            });
        }

        let token = read_token_file(&config.token_file)?;
        debug!(provider = %provider, path = %config.token_file.display(), "Using access token from file");
        Ok(token)
    }

    /// `Authorization` header value.
    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.0.expose_secret())
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

fn read_token_file(path: &Path) -> Result<AccessToken, AuthError> {
    let raw = std::fs::read_to_string(path).map_err(|source| AuthError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| AuthError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    TOKEN_KEYS
        .iter()
        .find_map(|key| value.get(*key).and_then(serde_json::Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .map(|s| AccessToken::new(s.trim()))
        .ok_or_else(|| AuthError::Malformed {
            path: path.to_path_buf(),
            reason: format!("expected one of: {}", TOKEN_KEYS.join(", ")),
        })
}
