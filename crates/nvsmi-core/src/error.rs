use thiserror::Error;

#[derive(Error, Debug)]
pub enum NvsmiError {
    #[error("Duplicate metric name: {0}")]
    DuplicateMetricName(String),

    #[error("Duplicate query key: {0}")]
    DuplicateQueryKey(String),

    #[error("Invalid metric definition {metric}: {reason}")]
    InvalidDefinition { metric: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NvsmiError>;
