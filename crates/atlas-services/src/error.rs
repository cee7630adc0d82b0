// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for atlas-services.

use atlas_core::error::CoreError;
use thiserror::Error;

use crate::party_quest::registration::RegistrationCode;

/// Services errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Saga runtime, bus, or tenant error.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Key-value store operation failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// REST collaborator call failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Character is already riding a transport.
    #[error("Character {0} is already in a transport")]
    AlreadyInTransport(u32),

    /// No such route for the tenant.
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// Input failed validation.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Entity not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Entity already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Party-quest registration was refused.
    #[error("Party quest registration refused ({code}): {message}")]
    PartyQuest {
        /// Machine-readable refusal.
        code: RegistrationCode,
        /// Human-readable detail.
        message: String,
    },
}

impl Error {
    /// Machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database(_) | Self::Migrate(_) => "DATABASE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Core(e) => e.error_code(),
            Self::Redis(_) => "KV_ERROR",
            Self::Http(_) => "COLLABORATOR_ERROR",
            Self::AlreadyInTransport(_) => "ALREADY_IN_TRANSPORT",
            Self::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::PartyQuest { code, .. } => code.as_str(),
        }
    }

    /// Shorthand for a party-quest refusal.
    pub fn party_quest(code: RegistrationCode, message: impl Into<String>) -> Self {
        Self::PartyQuest {
            code,
            message: message.into(),
        }
    }
}

impl From<Error> for CoreError {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(e) => e,
            Error::Database(e) => CoreError::from(e),
            Error::Redis(e) => CoreError::from(e),
            Error::Json(e) => CoreError::from(e),
            other => CoreError::ValidationError {
                field: other.error_code().to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type using services Error.
pub type Result<T> = std::result::Result<T, Error>;
