//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, page size bounded, write refresh
//!   budget below the request timeout)
//! - Validate listener addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>
//! - Runs before settings are accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::Settings;

/// Largest `admin.max_page_size` accepted.
pub const PAGE_SIZE_CEILING: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("refresh.interval_secs must be greater than zero")]
    ZeroRefreshInterval,

    #[error("database.query_timeout_secs must be greater than zero")]
    ZeroQueryTimeout,

    #[error("admin.request_timeout_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error(
        "admin.refresh_timeout_secs must be between 1 and admin.request_timeout_secs - 1, \
         got {refresh} (request timeout {request})"
    )]
    RefreshTimeoutOutOfRange { refresh: u64, request: u64 },

    #[error("database.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("{field} '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("admin.max_page_size must be between 1 and {PAGE_SIZE_CEILING}, got {0}")]
    PageSizeOutOfRange(u32),
}

/// Check every semantic rule and report all violations.
pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.refresh.interval_secs == 0 {
        errors.push(ValidationError::ZeroRefreshInterval);
    }
    if settings.database.query_timeout_secs == 0 {
        errors.push(ValidationError::ZeroQueryTimeout);
    }
    let admin = &settings.admin;
    if admin.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if admin.refresh_timeout_secs == 0 || admin.refresh_timeout_secs >= admin.request_timeout_secs {
        errors.push(ValidationError::RefreshTimeoutOutOfRange {
            refresh: admin.refresh_timeout_secs,
            request: admin.request_timeout_secs,
        });
    }
    if settings.database.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if settings.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: settings.admin.bind_address.clone(),
        });
    }
    if settings.observability.metrics_enabled
        && settings.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: settings.observability.metrics_address.clone(),
        });
    }
    let page_size = settings.admin.max_page_size;
    if page_size == 0 || page_size > PAGE_SIZE_CEILING {
        errors.push(ValidationError::PageSizeOutOfRange(page_size));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
