/// Errors raised by the SQLite record store.
///
/// The [`crate::RecordStore`] trait surfaces these as `anyhow::Error`; the
/// inherent methods of [`crate::engine::SqliteRecordStore`] return them
/// directly so callers can match on [`StorageError::NotFound`].
///
/// # Examples
///
/// ```rust
/// use adpulse_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "monitor",
///     id: "m-42".to_string(),
/// };
/// assert!(err.to_string().contains("monitor"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Payload columns hold JSON-encoded domain records.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage: invalid value in column '{column}': {value}")]
    InvalidValue { column: &'static str, value: String },

    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
