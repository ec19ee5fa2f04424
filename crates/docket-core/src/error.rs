use std::fmt;

use uuid::Uuid;

use crate::datastore::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Task,
    Subtask,
    List,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Task => "task",
            Self::Subtask => "subtask",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the service operations.
///
/// `NotFound` also covers ids that exist but belong to another owner.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown email or wrong password; the two are not told apart.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateListName(name) => {
                Self::Conflict(format!("list name already exists: {name}"))
            }
            StoreError::DuplicateEmail(_) => {
                Self::Conflict("Email already registered".to_string())
            }
            StoreError::Backend(err) => Self::Store(err),
        }
    }
}
