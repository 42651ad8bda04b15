use rusqlite::ErrorCode;
use serde_json::json;
use thiserror::Error;

/// Failures raised by the roster, session, attendance and reporting engines.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Nothing usable was supplied (empty payload, no selection).
    #[error("{0}")]
    Validation(String),

    /// The requested transition is not allowed from the current state.
    #[error("{0}")]
    Conflict(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The store is busy or locked; the call may be retried.
    #[error("store unavailable: {0}")]
    TransientStore(String),

    #[error("store error: {0}")]
    Store(rusqlite::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CoreError::Conflict(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation_failed",
            CoreError::Conflict(_) => "conflict",
            CoreError::NotFound { .. } => "not_found",
            CoreError::TransientStore(_) => "store_unavailable",
            CoreError::Store(_) => "db_query_failed",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::TransientStore(_))
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CoreError::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                CoreError::TransientStore(e.to_string())
            }
            Some(ErrorCode::ConstraintViolation)
                if e.to_string().contains("checkin_sessions.class_id") =>
            {
                CoreError::Conflict("class already has an active check-in session".to_string())
            }
            _ => CoreError::Store(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_and_locked_are_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let locked = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            None,
        );
        assert!(CoreError::from(busy).is_transient());
        assert!(CoreError::from(locked).is_transient());
        assert!(!CoreError::from(rusqlite::Error::QueryReturnedNoRows).is_transient());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(CoreError::validation("x").code(), "validation_failed");
        assert_eq!(CoreError::conflict("x").code(), "conflict");
        assert_eq!(CoreError::not_found("class", "c1").code(), "not_found");
        assert_eq!(
            CoreError::not_found("class", "c1").to_string(),
            "class not found: c1"
        );
    }
}
