//! Mock data source for testing without network calls.

use super::{DataSource, DataSourceError};
use crate::domain::{Address, Fill};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Mock data source that returns predefined fills per account.
///
/// The fill set can be replaced between cycles to simulate the venue
/// redelivering, reordering or extending its history.
#[derive(Debug, Default)]
pub struct MockDataSource {
    fills: Mutex<HashMap<String, Vec<Fill>>>,
    failing: Mutex<Option<DataSourceError>>,
}

fn poisoned<T>(err: PoisonError<T>) -> DataSourceError {
    DataSourceError::Other(err.to_string())
}

fn account_key(account: &Address) -> String {
    account.as_str().to_lowercase()
}

impl MockDataSource {
    /// Create a new mock data source with empty data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fill for an account.
    pub fn with_fill(self, account: &Address, fill: Fill) -> Self {
        self.with_fills(account, vec![fill])
    }

    /// Add multiple fills for an account.
    pub fn with_fills(mut self, account: &Address, fills: Vec<Fill>) -> Self {
        self.fills
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(account_key(account))
            .or_default()
            .extend(fills);
        self
    }

    /// Make every fetch fail with a network error.
    pub fn failing(mut self) -> Self {
        *self.failing.get_mut().unwrap_or_else(PoisonError::into_inner) = Some(
            DataSourceError::NetworkError("mock feed unavailable".to_string()),
        );
        self
    }

    pub fn push_fills(&self, account: &Address, fills: Vec<Fill>) -> Result<(), DataSourceError> {
        self.fills
            .lock()
            .map_err(poisoned)?
            .entry(account_key(account))
            .or_default()
            .extend(fills);
        Ok(())
    }

    /// Replace the whole fill set served for an account.
    pub fn set_fills(&self, account: &Address, fills: Vec<Fill>) -> Result<(), DataSourceError> {
        self.fills
            .lock()
            .map_err(poisoned)?
            .insert(account_key(account), fills);
        Ok(())
    }

    pub fn set_failure(&self, failure: Option<DataSourceError>) -> Result<(), DataSourceError> {
        *self.failing.lock().map_err(poisoned)? = failure;
        Ok(())
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn fetch_fills(&self, account: &Address) -> Result<Vec<Fill>, DataSourceError> {
        let failure = self
            .failing
            .lock()
            .map_err(poisoned)?
            .clone();
        if let Some(err) = failure {
            return Err(err);
        }

        let map = self.fills.lock().map_err(poisoned)?;
        Ok(map.get(&account_key(account)).cloned().unwrap_or_default())
    }
}
