use thiserror::Error;

use crate::{
    application::{mutations::MutationError, repos::SourceError},
    config::LoadError,
    domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Process exit code for the command-line client, after sysexits.h.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Domain(DomainError::NotFound { .. })
            | AppError::Source(SourceError::NotFound { .. })
            | AppError::Mutation(MutationError::Source(SourceError::NotFound { .. }))
            | AppError::NotFound => 66,
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Mutation(MutationError::Validation(_))
            | AppError::Validation(_) => 65,
            AppError::Config(_) | AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Mutation(MutationError::Unauthenticated) => 77,
            AppError::Source(_) | AppError::Mutation(_) | AppError::Infra(_) => 69,
            AppError::Domain(DomainError::Invariant { .. }) => 70,
        }
    }
}
