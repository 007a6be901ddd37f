//! # Error Handling Module
//!
//! This module defines every error the provisioner can produce using the `thiserror` crate,
//! together with the HTTP status, the stable error type string and the retry classification
//! of each variant.
//!
//! Errors fall into three groups:
//! - request errors (malformed JSON, missing keys, invalid values) that abort a request
//! - adapter errors (DNS, IPAM, NITRO) that are reported per resource and never abort
//! - startup errors (configuration, I/O) that stop the process before it serves traffic

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the provisioner
pub type ProvisionerResult<T> = Result<T, ProvisionerError>;

/// Error types for the provisioner
#[derive(Debug, Error, Clone)]
pub enum ProvisionerError {
    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Request validation errors (missing keys, empty names, zero ports, etc.)
    #[error("Request validation failed: {field} - {reason}")]
    RequestValidation { field: String, reason: String },

    /// A hostname could not be resolved because of a transient resolver failure
    #[error("DNS resolution failed for {host}: {reason}")]
    Resolution { host: String, reason: String },

    /// The address allocator could not hand out an address
    #[error("Address allocation failed: {message}")]
    AddressAllocation { message: String, retryable: bool },

    /// The load-balancer control plane rejected an operation
    #[error("Load balancer API error during {operation} (status {status}): {message}")]
    Vendor {
        operation: String,
        status: u16,
        message: String,
    },

    /// Adapter call timeout
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// I/O errors (file operations, socket binding, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// HTTP client transport errors when talking to NITRO or Infoblox
    #[error("HTTP client error: {message}")]
    HttpClient { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ProvisionerError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error for a specific request field
    pub fn validation<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::RequestValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a transient DNS resolution error
    pub fn resolution<H: Into<String>, R: Into<String>>(host: H, reason: R) -> Self {
        Self::Resolution {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Create a permanent address allocation error (exhausted network, unmapped scope)
    pub fn allocation<S: Into<String>>(message: S) -> Self {
        Self::AddressAllocation {
            message: message.into(),
            retryable: false,
        }
    }

    /// Create a transient address allocation error (IPAM unavailable)
    pub fn allocation_unavailable<S: Into<String>>(message: S) -> Self {
        Self::AddressAllocation {
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a vendor API error for the given NITRO operation
    pub fn vendor<O: Into<String>, M: Into<String>>(operation: O, status: u16, message: M) -> Self {
        Self::Vendor {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RequestValidation { .. } => StatusCode::BAD_REQUEST,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::Resolution { .. } => StatusCode::BAD_GATEWAY,
            Self::AddressAllocation { .. } => StatusCode::BAD_GATEWAY,
            Self::Vendor { .. } => StatusCode::BAD_GATEWAY,
            Self::HttpClient { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be retried
    ///
    /// Transient adapter failures are retried by the retry policy; everything the
    /// remote side rejected on its merits is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Resolution { .. } => true,
            Self::AddressAllocation { retryable, .. } => *retryable,
            Self::Vendor { status, .. } => *status >= 500,
            Self::Timeout { .. } => true,
            Self::HttpClient { .. } => true,
            Self::Io { .. } => true,
            _ => false,
        }
    }

    /// Get a string representation of the error type for API responses and reports
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::RequestValidation { .. } => "request_validation_error",
            Self::Resolution { .. } => "dns_resolution_error",
            Self::AddressAllocation { .. } => "address_allocation_error",
            Self::Vendor { .. } => "load_balancer_api_error",
            Self::Timeout { .. } => "timeout",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "malformed_request",
            Self::Yaml { .. } => "yaml_error",
            Self::HttpClient { .. } => "http_client_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<std::io::Error> for ProvisionerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ProvisionerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ProvisionerError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ProvisionerError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpClient {
            message: err.to_string(),
        }
    }
}

/// Convert errors into the structured JSON error body
impl IntoResponse for ProvisionerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
                "retryable": self.is_retryable(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}
