//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Storefront payment errors
///
/// Every variant displays as the bare message so it can be handed to the
/// browser client unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// Missing or malformed request input
    #[error("{0}")]
    Validation(String),

    /// Lookup miss (customer directory)
    #[error("{0}")]
    NotFound(String),

    /// Required server configuration is absent or inconsistent
    #[error("{0}")]
    Config(String),

    /// Webhook signature verification failed
    #[error("Webhook Error: {0}")]
    Signature(String),

    /// Failure surfaced by the payment provider, message passed through verbatim
    #[error("{0}")]
    Upstream(String),
}

impl PaymentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// HTTP status code this error maps to at the API boundary
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::NotFound(_) => 404,
            PaymentError::Config(_) => 500,
            PaymentError::Validation(_)
            | PaymentError::Signature(_)
            | PaymentError::Upstream(_) => 400,
        }
    }

    /// Short machine-readable kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "validation",
            PaymentError::NotFound(_) => "not_found",
            PaymentError::Config(_) => "config",
            PaymentError::Signature(_) => "signature",
            PaymentError::Upstream(_) => "upstream",
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::Upstream(err.to_string())
    }
}

#[cfg(feature = "axum-handlers")]
mod response {
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use serde::Serialize;

    use super::PaymentError;

    /// Uniform `{ "error": "<message>" }` body
    #[derive(Debug, Serialize)]
    pub struct ErrorBody {
        pub error: String,
    }

    impl IntoResponse for PaymentError {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(self.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(ErrorBody { error: self.to_string() })).into_response()
        }
    }
}

#[cfg(feature = "axum-handlers")]
pub use response::ErrorBody;
