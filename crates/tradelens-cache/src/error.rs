use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid cache row for key={key}: {reason}")]
    InvalidRow { key: String, reason: String },

    #[error("Cache not available: {0}")]
    Unavailable(String),
}
