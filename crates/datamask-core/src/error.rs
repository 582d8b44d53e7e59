use thiserror::Error;

/// Core error type shared across Datamask crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Database error or adapter failure.
    #[error("database error: {0}")]
    Db(String),
    /// Connection or table configuration is missing or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A table referenced by an operation does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),
    /// A requested feature is not supported by this store.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Catch-all error for unexpected failures.
    #[error("other error: {0}")]
    Other(String),
}

/// Convenience alias for results returned by Datamask crates.
pub type Result<T> = std::result::Result<T, Error>;
