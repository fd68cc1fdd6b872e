//! Marketplace order-service client.
//!
//! Offers go to `POST {base}/offers`, listings and auctions to
//! `POST {base}/listings`; the service authenticates with an `X-API-KEY`
//! header and signs orders with the operator account it manages. Response
//! bodies are returned as-is.

use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};
use opsgate::marketplace::{ListingOrder, Marketplace, MarketplaceError, OfferOrder};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::{ClientError, directory};

/// Client for a marketplace order service.
#[derive(Clone, Debug)]
pub struct MarketplaceClient {
    offers_url: Url,
    listings_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl MarketplaceClient {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Creates a client for the order service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if an endpoint URL cannot be derived or the API
    /// key is not a valid header value.
    pub fn try_new(base_url: Url, api_key: &str) -> Result<Self, ClientError> {
        let base_url = directory(base_url);
        let offers_url = base_url
            .join("./offers")
            .map_err(|e| ClientError::UrlParse {
                context: "Failed to construct ./offers URL",
                source: e,
            })?;
        let listings_url = base_url
            .join("./listings")
            .map_err(|e| ClientError::UrlParse {
                context: "Failed to construct ./listings URL",
                source: e,
            })?;

        let mut key = HeaderValue::from_str(api_key).map_err(|e| ClientError::InvalidHeader {
            context: "marketplace API key",
            source: e,
        })?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-api-key"), key);

        Ok(Self {
            offers_url,
            listings_url,
            client: Client::new(),
            headers,
            timeout: Some(Self::DEFAULT_TIMEOUT),
        })
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn post_json<T>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<Value, MarketplaceError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let mut req = self
            .client
            .post(url.clone())
            .headers(self.headers.clone())
            .json(payload);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let response = req
            .send()
            .await
            .map_err(|e| MarketplaceError::Transport(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or_default().to_owned()
            } else {
                body
            };
            #[cfg(feature = "telemetry")]
            tracing::error!(context, status = status.as_u16(), %message, "Marketplace request failed");
            return Err(MarketplaceError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| MarketplaceError::InvalidResponse(format!("{context}: {e}")))
    }
}

#[async_trait::async_trait]
impl Marketplace for MarketplaceClient {
    async fn create_offer(&self, order: &OfferOrder) -> Result<Value, MarketplaceError> {
        self.post_json(&self.offers_url, "POST /offers", order).await
    }

    async fn create_listing(&self, order: &ListingOrder) -> Result<Value, MarketplaceError> {
        self.post_json(&self.listings_url, "POST /listings", order)
            .await
    }
}
