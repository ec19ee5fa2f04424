use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::datastore::Store;
use crate::datetime::Clock;
use crate::error::{Error, Result};

pub const MIN_PASSWORD_LEN: usize = 8;

/// A registered account. Its `id`, as a string, is the owner of every task
/// and list the account creates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: &str, email: &str, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn owner_id(&self) -> String {
        self.id.to_string()
    }
}

/// The public face of a [`User`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Argon2id hashing in PHC string format.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .finish_non_exhaustive()
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordHasher {
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> anyhow::Result<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
            .map_err(|err| anyhow!("failed to encode salt: {err}"))?;
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(hash.to_string())
    }

    /// `false` for a wrong password and for a hash that does not parse.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(err) => {
                debug!(error = %err, "stored password hash does not parse");
                false
            }
        }
    }
}

/// Registration and login over the shared [`Store`].
#[derive(Debug, Clone)]
pub struct AccountService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    hasher: PasswordHasher,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            hasher: PasswordHasher::default(),
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    #[tracing::instrument(skip(self, input))]
    pub fn register(&self, input: Registration) -> Result<User> {
        let name = input.name.trim();
        let email = normalize_email(&input.email);
        if name.is_empty() || email.is_empty() || input.password.is_empty() {
            return Err(Error::validation("Missing required fields"));
        }
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.store.find_user_by_email(&email)?.is_some() {
            return Err(Error::Conflict("Email already registered".to_string()));
        }

        let hash = self.hasher.hash(&input.password)?;
        let user = User::new(name, &email, hash, self.clock.now());
        self.store.insert_user(user.clone())?;
        info!(id = %user.id, "registered user");
        Ok(user)
    }

    #[tracing::instrument(skip(self, input))]
    pub fn login(&self, input: Credentials) -> Result<User> {
        let email = normalize_email(&input.email);
        if email.is_empty() || input.password.is_empty() {
            return Err(Error::validation("Missing email or password"));
        }
        let user = self
            .store
            .find_user_by_email(&email)?
            .ok_or(Error::InvalidCredentials)?;
        if !self.hasher.verify(&input.password, &user.password_hash) {
            debug!(id = %user.id, "password mismatch");
            return Err(Error::InvalidCredentials);
        }
        info!(id = %user.id, "user logged in");
        Ok(user)
    }
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}
