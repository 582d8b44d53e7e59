use thiserror::Error;

/// Errors emitted while declaring rules or anonymizing a table.
#[derive(Debug, Error)]
pub enum AnonymizeError {
    #[error(transparent)]
    Core(#[from] datamask_core::Error),
    /// Declaration or write-mode configuration that cannot run.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A rule could not be applied to a value.
    #[error("rule '{rule}' on column '{column}': {message}")]
    Rule {
        column: String,
        rule: String,
        message: String,
    },
    /// A per-row step popped from an exhausted staged buffer.
    #[error("staged data for column '{column}' exhausted after {consumed} rows")]
    StagedUnderflow { column: String, consumed: u64 },
    /// Staged values left over once every row of the chunk was transformed.
    #[error("staged data for column '{column}' has {remaining} unconsumed values")]
    StagedSurplus { column: String, remaining: usize },
    #[error("incorrect row modifier state: no row bound")]
    RowNotBound,
    #[error("incorrect checker state: {0}")]
    Check(String),
}

impl AnonymizeError {
    pub(crate) fn rule(column: &str, rule: &str, message: impl Into<String>) -> Self {
        Self::Rule {
            column: column.to_string(),
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnonymizeError>;
