//! Data source abstraction for fetching fills from the venue.

use crate::domain::{Address, Fill};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod hyperliquid;
pub mod mock;

pub use hyperliquid::HyperliquidDataSource;
pub use mock::MockDataSource;

/// Data source trait for fetching an account's fills.
///
/// Implementations handle retry/backoff and reject malformed records at the boundary.
/// No ordering or uniqueness guarantee is made about the returned fills.
#[async_trait]
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Fetch the venue's current fill set for an account.
    async fn fetch_fills(&self, account: &Address) -> Result<Vec<Fill>, DataSourceError>;
}

/// Failure to obtain an account's fills from the venue.
#[derive(Debug, Clone, Error)]
pub enum DataSourceError {
    #[error("Feed unreachable: {0}")]
    NetworkError(String),
    #[error("Feed returned HTTP {status}: {message}")]
    HttpError { status: u16, message: String },
    #[error("Feed response unreadable: {0}")]
    ParseError(String),
    #[error("Feed rate limit hit")]
    RateLimited,
    #[error("Feed error: {0}")]
    Other(String),
}

impl DataSourceError {
    /// Map a non-success HTTP status onto an error.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => DataSourceError::RateLimited,
            500..=599 => DataSourceError::HttpError {
                status,
                message: "server error".to_string(),
            },
            _ => DataSourceError::HttpError {
                status,
                message: "request rejected".to_string(),
            },
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DataSourceError::NetworkError(_) | DataSourceError::RateLimited => true,
            DataSourceError::HttpError { status, .. } => *status >= 500,
            DataSourceError::ParseError(_) | DataSourceError::Other(_) => false,
        }
    }
}
