use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use docket_core::config::{Config, JWT_SECRET_KEY};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, get_current_timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Resolves a bearer token to the owner id it was issued for.
pub trait TokenVerifier: Debug + Send + Sync {
    fn verify(&self, token: &str) -> Option<String>;
}

/// Fixed token table from `auth.token.<owner> = <token>` config keys, for
/// service accounts and local use.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    by_token: HashMap<String, String>,
}

impl StaticTokens {
    pub fn from_config(cfg: &Config) -> Self {
        let tokens = Self::new(cfg.auth_tokens());
        debug!(count = tokens.by_token.len(), "static tokens configured");
        tokens
    }

    pub fn new<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            by_token: pairs
                .into_iter()
                .map(|(owner, token)| (token, owner))
                .collect(),
        }
    }
}

impl TokenVerifier for StaticTokens {
    fn verify(&self, token: &str) -> Option<String> {
        self.by_token.get(token).cloned()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
}

/// HS256 session tokens carrying the owner id in `sub`.
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
}

impl Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl_secs,
        }
    }

    /// Reads `auth.jwt_secret` and `auth.token_ttl_days`. Without a secret a
    /// random one is generated, so issued tokens die with the process.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let days = cfg
            .get_parsed::<u64>("auth.token_ttl_days")?
            .unwrap_or(7);
        let secret = match cfg.get(JWT_SECRET_KEY).filter(|s| !s.trim().is_empty()) {
            Some(secret) => secret.trim().to_string(),
            None => {
                warn!("{JWT_SECRET_KEY} not set; using a random secret for this run");
                format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
            }
        };
        Ok(Self::new(secret.as_bytes(), days.saturating_mul(24 * 60 * 60)))
    }

    pub fn issue(&self, owner: &str) -> anyhow::Result<String> {
        let iat = get_current_timestamp();
        let claims = Claims {
            sub: owner.to_string(),
            iat,
            exp: iat.saturating_add(self.ttl_secs),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("failed to sign session token")
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Option<String> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(data.claims.sub),
            Err(err) => {
                debug!(error = %err, "rejected session token");
                None
            }
        }
    }
}

/// Tries each verifier in turn.
#[derive(Debug, Clone, Default)]
pub struct TokenChain(pub Vec<Arc<dyn TokenVerifier>>);

impl TokenVerifier for TokenChain {
    fn verify(&self, token: &str) -> Option<String> {
        self.0.iter().find_map(|verifier| verifier.verify(token))
    }
}

/// The authenticated caller. Rejects with 401 unless the request carries
/// `Authorization: Bearer <token>` for a known token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl FromRequestParts<AppState> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        let token = match header.split_once(' ') {
            Some(("Bearer", token)) if !token.trim().is_empty() => token.trim(),
            _ => return Err(ApiError::Unauthorized("Unauthorized")),
        };

        match state.tokens.verify(token) {
            Some(owner) => {
                debug!(%owner, "authenticated request");
                Ok(Self(owner))
            }
            None => Err(ApiError::Unauthorized("Invalid or expired token")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_map_to_owners() {
        let tokens = StaticTokens::new(vec![
            ("alice".to_string(), "t-a".to_string()),
            ("bob".to_string(), "t-b".to_string()),
        ]);
        assert_eq!(tokens.verify("t-b").as_deref(), Some("bob"));
        assert_eq!(tokens.verify("alice"), None);
    }

    #[test]
    fn session_tokens_round_trip_only_with_the_same_secret() {
        let jwt = JwtVerifier::new(b"first-secret", 3600);
        let token = jwt.issue("owner-1").unwrap();
        assert_eq!(jwt.verify(&token).as_deref(), Some("owner-1"));

        let other = JwtVerifier::new(b"second-secret", 3600);
        assert_eq!(other.verify(&token), None);
        assert_eq!(jwt.verify("not.a.jwt"), None);
    }

    #[test]
    fn expired_session_token_is_rejected() {
        let jwt = JwtVerifier::new(b"secret", 3600);
        let claims = Claims {
            sub: "owner-1".to_string(),
            iat: 1_000,
            exp: 2_000,
        };
        let stale = encode(&Header::new(Algorithm::HS256), &claims, &jwt.encoding).unwrap();
        assert_eq!(jwt.verify(&stale), None);
    }

    #[test]
    fn chain_accepts_either_kind() {
        let jwt = Arc::new(JwtVerifier::new(b"secret", 3600));
        let token = jwt.issue("owner-1").unwrap();
        let chain = TokenChain(vec![
            jwt as Arc<dyn TokenVerifier>,
            Arc::new(StaticTokens::new(vec![("ci".to_string(), "t-ci".to_string())])),
        ]);
        assert_eq!(chain.verify(&token).as_deref(), Some("owner-1"));
        assert_eq!(chain.verify("t-ci").as_deref(), Some("ci"));
        assert_eq!(chain.verify("t-unknown"), None);
    }
}
