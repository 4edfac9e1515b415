use std::error::Error as StdError;

use thiserror::Error;

use crate::application::auth::AuthError;
use crate::application::checkout::CheckoutError;
use crate::cache::{MutationError, TransportError};
use crate::config::LoadError;
use crate::infra::error::InfraError;

/// Top-level error of the `agromart` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("query failed: {0}")]
    Query(#[from] TransportError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Process exit code: 2 for usage/configuration problems, 3 for
    /// rejected credentials, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Validation(_) => 2,
            AppError::Checkout(CheckoutError::NotAuthenticated) => 3,
            _ if self.transport().is_some_and(TransportError::is_unauthorized) => 3,
            _ => 1,
        }
    }

    fn transport(&self) -> Option<&TransportError> {
        match self {
            AppError::Query(error) => Some(error),
            AppError::Mutation(error)
            | AppError::Auth(AuthError::Mutation(error))
            | AppError::Checkout(CheckoutError::Mutation(error)) => error.transport(),
            _ => None,
        }
    }

    /// The error followed by its `source()` chain.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = self.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages.dedup();
        messages
    }
}
