use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("SOURCE_UNAVAILABLE: {0}")]
    Source(String),
    #[error("SOURCE_TIMEOUT: {0}")]
    Timeout(String),
    #[error("DISCOVERY_FAILED: {0}")]
    Discovery(String),
    #[error("PERSISTENCE: {0}")]
    Persistence(String),
    #[error("INVALID_INPUT: {0}")]
    Invalid(String),
}

impl From<reqwest::Error> for DashboardError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout(value.to_string())
        } else {
            Self::Source(value.to_string())
        }
    }
}

impl From<sqlx::Error> for DashboardError {
    fn from(value: sqlx::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for DashboardError {
    fn from(value: tokio::time::error::Elapsed) -> Self {
        Self::Timeout(value.to_string())
    }
}

pub type DashboardResult<T> = Result<T, DashboardError>;
