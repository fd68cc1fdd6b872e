//! Billing service charge client.
//!
//! [`ChargeClient`] POSTs `{amount, sender, chain_id}` to
//! `{base}/api/v1/credits/coinbase` with the billing API key as a bearer
//! token, and turns the response into a validated
//! [`PaymentIntent`](opsgate::PaymentIntent):
//!
//! - connect, TLS and timeout failures become [`NegotiationError::Transport`]
//! - any status other than 200 becomes [`NegotiationError::Rejected`] with the canonical status text
//! - a 200 with an unreadable or incomplete body becomes [`NegotiationError::InvalidIntent`]

use std::time::Duration;

use http::{HeaderMap, HeaderValue, StatusCode, header};
use opsgate::BoxFuture;
use opsgate::charge::{ChargeNegotiator, ChargeRequest, NegotiationError};
use opsgate::intent::{InvalidIntent, PaymentIntent};
use reqwest::Client;
use serde_json::Value;
#[cfg(feature = "telemetry")]
use tracing::instrument;
use url::Url;

use crate::{ClientError, directory};

/// Client for the billing service's charge endpoint.
#[derive(Clone, Debug)]
pub struct ChargeClient {
    base_url: Url,
    charge_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl ChargeClient {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a client for the billing service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the charge URL cannot be derived or the API
    /// key is not a valid header value.
    pub fn try_new(base_url: Url, api_key: &str) -> Result<Self, ClientError> {
        let base_url = directory(base_url);
        let charge_url =
            base_url
                .join("./api/v1/credits/coinbase")
                .map_err(|e| ClientError::UrlParse {
                    context: "Failed to construct ./api/v1/credits/coinbase URL",
                    source: e,
                })?;

        let mut authorization = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(
            |e| ClientError::InvalidHeader {
                context: "billing API key",
                source: e,
            },
        )?;
        authorization.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, authorization);

        Ok(Self {
            base_url,
            charge_url,
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

    /// Removes the per-request timeout.
    #[must_use]
    pub const fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed charge endpoint URL.
    #[must_use]
    pub const fn charge_url(&self) -> &Url {
        &self.charge_url
    }

    /// Creates a charge and returns the validated intent. Single attempt.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError`] as described in the module docs.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "opsgate.charge_client.create_charge",
            skip_all,
            fields(amount = %request.amount, chain_id = request.chain_id, timeout = ?self.timeout),
            err
        )
    )]
    pub async fn create_charge(
        &self,
        request: &ChargeRequest,
    ) -> Result<PaymentIntent, NegotiationError> {
        let mut req = self
            .client
            .post(self.charge_url.clone())
            .headers(self.headers.clone())
            .json(request);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let response = req
            .send()
            .await
            .map_err(|e| NegotiationError::Transport(Box::new(e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(NegotiationError::Rejected {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_owned(),
            });
        }

        // A body that fails to arrive is a transport problem; only bytes that
        // arrived but are not JSON make the intent invalid.
        let bytes = response
            .bytes()
            .await
            .map_err(|e| NegotiationError::Transport(Box::new(e)))?;
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| InvalidIntent::new("body", e.to_string()))?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(charge = ?body.get("data"), "Charge response received");

        Ok(PaymentIntent::from_charge_json(&body)?)
    }
}

impl ChargeNegotiator for ChargeClient {
    fn request_charge<'a>(
        &'a self,
        request: &'a ChargeRequest,
    ) -> BoxFuture<'a, Result<PaymentIntent, NegotiationError>> {
        Box::pin(self.create_charge(request))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use alloy_primitives::Address;
    use rust_decimal::Decimal;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn sender() -> Address {
        Address::from_str("0x1111111111111111111111111111111111111111").unwrap()
    }

    fn charge_body() -> Value {
        json!({
            "data": {
                "id": "charge-1",
                "web3_data": {
                    "transfer_intent": {
                        "metadata": {
                            "contract_address": "0x03059433BCdB6144624cC2443159D9445C32b7a8"
                        },
                        "call_data": {
                            "recipient_amount": "49500000",
                            "deadline": "2024-06-01T12:00:00Z",
                            "recipient": "0x2222222222222222222222222222222222222222",
                            "recipient_currency": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                            "refund_destination": "0x1111111111111111111111111111111111111111",
                            "fee_amount": "500000",
                            "id": "0x0123456789abcdef0123456789abcdef",
                            "operator": "0x3333333333333333333333333333333333333333",
                            "signature": "0xdeadbeef",
                            "prefix": "0x1901"
                        }
                    }
                }
            }
        })
    }

    fn client(server: &MockServer) -> ChargeClient {
        ChargeClient::try_new(server.uri().parse().unwrap(), "billing-key").unwrap()
    }

    #[tokio::test]
    async fn test_create_charge_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/credits/coinbase"))
            .and(header("authorization", "Bearer billing-key"))
            .and(body_json(json!({
                "amount": 50.0,
                "sender": "0x1111111111111111111111111111111111111111",
                "chain_id": 8453
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(charge_body()))
            .expect(1)
            .mount(&server)
            .await;

        let request = ChargeRequest::new(Decimal::from(50), sender());
        let intent = client(&server).create_charge(&request).await.unwrap();
        assert_eq!(intent.charge_id.as_deref(), Some("charge-1"));
        assert_eq!(intent.deadline.timestamp(), 1_717_243_200);
    }

    #[tokio::test]
    async fn test_non_200_is_rejected_with_status_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/credits/coinbase"))
            .respond_with(ResponseTemplate::new(402).set_body_string("insufficient credit"))
            .expect(1)
            .mount(&server)
            .await;

        let request = ChargeRequest::new(Decimal::from(50), sender());
        let err = client(&server).request_charge(&request).await.unwrap_err();
        match err {
            NegotiationError::Rejected { status, ref reason } => {
                assert_eq!(status, 402);
                assert_eq!(reason, "Payment Required");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_created_status_is_not_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(charge_body()))
            .mount(&server)
            .await;

        let request = ChargeRequest::new(Decimal::from(50), sender());
        let err = client(&server).create_charge(&request).await.unwrap_err();
        assert!(matches!(err, NegotiationError::Rejected { status: 201, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_intent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let request = ChargeRequest::new(Decimal::from(50), sender());
        let err = client(&server).create_charge(&request).await.unwrap_err();
        assert!(matches!(err, NegotiationError::InvalidIntent(ref e) if e.field == "body"));
    }

    #[tokio::test]
    async fn test_incomplete_intent_names_field() {
        let server = MockServer::start().await;
        let mut body = charge_body();
        body["data"]["web3_data"]["transfer_intent"]["call_data"]
            .as_object_mut()
            .unwrap()
            .remove("operator");
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let request = ChargeRequest::new(Decimal::from(50), sender());
        let err = client(&server).create_charge(&request).await.unwrap_err();
        match err {
            NegotiationError::InvalidIntent(e) => {
                assert_eq!(e.field, "data.web3_data.transfer_intent.call_data.operator");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url: Url = format!("http://{}/", listener.local_addr().unwrap())
            .parse()
            .unwrap();
        drop(listener);

        let client = ChargeClient::try_new(url, "billing-key")
            .unwrap()
            .with_timeout(Duration::from_secs(2));
        let request = ChargeRequest::new(Decimal::from(50), sender());
        let err = client.create_charge(&request).await.unwrap_err();
        assert!(matches!(err, NegotiationError::Transport(_)));
    }

    #[tokio::test]
    async fn test_truncated_body_is_transport_error() {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url: Url = format!("http://{}/", listener.local_addr().unwrap())
            .parse()
            .unwrap();
        // Announces a 512-byte body, sends a fragment, then hangs up.
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !received.ends_with(b"}") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => received.extend_from_slice(&buf[..n]),
                }
            }
            let _ = stream.write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 512\r\n\r\n{\"data\":",
            );
        });

        let client = ChargeClient::try_new(url, "billing-key")
            .unwrap()
            .with_timeout(Duration::from_secs(5));
        let request = ChargeRequest::new(Decimal::from(50), sender());
        let err = client.create_charge(&request).await.unwrap_err();
        assert!(matches!(err, NegotiationError::Transport(_)), "{err}");
    }

    #[test]
    fn test_charge_url_is_relative_to_base() {
        let client =
            ChargeClient::try_new("https://billing.example".parse().unwrap(), "k").unwrap();
        assert_eq!(
            client.charge_url().as_str(),
            "https://billing.example/api/v1/credits/coinbase"
        );
    }
}
