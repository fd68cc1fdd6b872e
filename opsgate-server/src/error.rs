//! Error responses.
//!
//! Every failure leaves the server as `{"success": false, "error": "..."}`.
//! Input problems map to 400, a failed bearer check to 401, an expired
//! server deadline to 408, and anything that went wrong after the request
//! was accepted to 500.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use opsgate::amount::AmountError;
use opsgate::chain::ChainNotFound;
use opsgate::marketplace::MarketplaceError;
use opsgate_evm::funding::FundingError;
use serde_json::json;

/// Errors returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The `Authorization` header was absent or wrong.
    #[error("Unauthorized - Invalid or missing authentication")]
    Unauthorized,
    /// The body was not the JSON the endpoint expects.
    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),
    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),
    /// The funding amount is out of range.
    #[error(transparent)]
    InvalidAmount(#[from] AmountError),
    /// The chain is not supported.
    #[error(transparent)]
    UnknownChain(#[from] ChainNotFound),
    /// The funding pipeline failed.
    #[error(transparent)]
    Funding(#[from] FundingError),
    /// The marketplace order service failed.
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
    /// The server-wide request deadline expired before a response was ready.
    #[error("Request timed out; any submitted transaction may still be included")]
    RequestTimeout,
}

impl ApiError {
    /// HTTP status this error is reported with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidBody(_)
            | Self::Validation(_)
            | Self::InvalidAmount(_)
            | Self::UnknownChain(_)
            | Self::Funding(FundingError::InvalidAmount(_)) => StatusCode::BAD_REQUEST,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::Funding(_) | Self::Marketplace(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else if status == StatusCode::REQUEST_TIMEOUT {
            tracing::warn!("Request deadline expired");
        }
        let body = json!({ "success": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::UnknownChain(ChainNotFound("Solana".to_owned())).status(),
            StatusCode::BAD_REQUEST
        );
        let amount = AmountError::OutOfRange {
            amount: Decimal::from(2001),
            max: Decimal::from(2000),
        };
        assert_eq!(
            ApiError::Funding(FundingError::InvalidAmount(amount)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Marketplace(MarketplaceError::InvalidResponse("x".to_owned())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::RequestTimeout.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
