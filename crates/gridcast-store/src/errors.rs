//! Store error type with optional structured detail.

use serde_json::Value;

/// Errors surfaced by a [`crate::GridStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The cell failed domain validation (e.g. out of world bounds).
    #[error("{message}")]
    Validation {
        /// Human-readable description.
        message: String,
        /// Machine-readable detail forwarded to clients when present.
        detail: Option<Value>,
    },

    /// Underlying SQLite failure.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool failure.
    #[error(transparent)]
    Pool(#[from] r2d2::Error),

    /// Blocking task failure.
    #[error(transparent)]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Build the out-of-bounds validation error.
    pub fn out_of_bounds(x: i64, y: i64, bound: i64) -> Self {
        let message = format!("Voxel ({x}, {y}) is outside the world bounds (±{bound})");
        let detail = serde_json::json!({
            "message": message,
            "x": x,
            "y": y,
        });
        Self::Validation {
            message,
            detail: Some(detail),
        }
    }

    /// The message to put in an error envelope: the structured detail when
    /// one exists, otherwise the display string.
    pub fn client_message(&self) -> Value {
        match self {
            Self::Validation {
                detail: Some(detail),
                ..
            } => detail.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_carries_structured_detail() {
        let err = StoreError::out_of_bounds(9000, -3, 1000);
        let msg = err.client_message();
        assert_eq!(msg["x"], 9000);
        assert_eq!(msg["y"], -3);
        assert!(msg["message"].as_str().unwrap().contains("world bounds"));
    }

    #[test]
    fn display_matches_detail_message() {
        let err = StoreError::out_of_bounds(5, 5, 1);
        let msg = err.client_message();
        assert_eq!(msg["message"].as_str().unwrap(), err.to_string());
    }

    #[test]
    fn plain_errors_fall_back_to_string_message() {
        let err = StoreError::Validation {
            message: "bad cell".into(),
            detail: None,
        };
        assert_eq!(err.client_message(), Value::String("bad cell".into()));
    }

    #[test]
    fn sqlite_error_client_message_is_string() {
        let err = StoreError::Sqlite(rusqlite::Error::InvalidQuery);
        assert!(err.client_message().is_string());
    }
}
