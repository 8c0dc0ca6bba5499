use ulid::Ulid;

use crate::auth::AuthError;
use crate::index::IndexError;
use crate::model::Interval;

#[derive(Debug)]
pub enum EngineError {
    /// Unknown user e-mail, vehicle plate or booking id.
    NotFound(String),
    AlreadyExists(String),
    /// The vehicle is already booked for part of the interval.
    Conflict {
        plate: String,
        interval: Interval,
    },
    InvalidInput(&'static str),
    InvalidCredentials,
    WeakPassword(&'static str),
    /// The booking belongs to another user.
    Forbidden(Ulid),
    LimitExceeded(&'static str),
    Index(IndexError),
    PasswordHash(String),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(key) => write!(f, "not found: {key}"),
            EngineError::AlreadyExists(key) => write!(f, "already exists: {key}"),
            EngineError::Conflict { plate, interval } => {
                write!(f, "vehicle {plate} is already booked during {interval}")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::InvalidCredentials => write!(f, "invalid e-mail or password"),
            EngineError::WeakPassword(msg) => write!(f, "weak password: {msg}"),
            EngineError::Forbidden(id) => write!(f, "booking {id} belongs to another user"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Index(e) => write!(f, "booking index error: {e}"),
            EngineError::PasswordHash(e) => write!(f, "password hash error: {e}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<IndexError> for EngineError {
    fn from(e: IndexError) -> Self {
        EngineError::Index(e)
    }
}

impl From<AuthError> for EngineError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::WeakPassword(msg) => EngineError::WeakPassword(msg),
            AuthError::Hash(e) => EngineError::PasswordHash(e),
        }
    }
}
