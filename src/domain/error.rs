// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    #[error("Transaction failed: {hash:?}, reason: {reason}")]
    Transaction { hash: String, reason: String },

    #[error("Insufficient funds. Required: {required}, Available: {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("External API error: {provider} responded with {status}")]
    ApiCall { provider: String, status: u16 },

    #[error("Validation failed for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Address {0} is invalid")]
    InvalidAddress(String),

    #[error("All {attempts} providers failed for {operation}: {last_error}")]
    AllProvidersFailed {
        operation: String,
        attempts: usize,
        last_error: String,
    },

    #[error("Recovery state error: {0}")]
    State(String),

    #[error("Signer vault is locked")]
    VaultLocked,

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Errors worth retrying on a later tick (transport level), as opposed to
    /// errors that will not change by asking again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Connection(_) | AppError::AllProvidersFailed { .. } | AppError::ApiCall { .. }
        )
    }
}
