#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP clients for the off-chain collaborators of opsgate.
//!
//! - [`ChargeClient`] implements [`ChargeNegotiator`](opsgate::ChargeNegotiator)
//!   against the billing service's charge endpoint.
//! - [`MarketplaceClient`] implements [`Marketplace`](opsgate::marketplace::Marketplace)
//!   against a marketplace order service.
//!
//! Both use `reqwest`, send JSON, and make exactly one attempt per call.
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod charge;
pub mod marketplace;

pub use charge::ChargeClient;
pub use marketplace::MarketplaceClient;

use http::header::InvalidHeaderValue;
use url::Url;

/// Errors raised while constructing a client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An endpoint URL could not be derived from the base URL.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// A credential contained bytes not allowed in an HTTP header.
    #[error("Invalid header value: {context}: {source}")]
    InvalidHeader {
        /// Human-readable context.
        context: &'static str,
        /// The underlying header error.
        #[source]
        source: InvalidHeaderValue,
    },
}

/// Ensures `url` ends with a slash so relative joins append to its path.
fn directory(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
