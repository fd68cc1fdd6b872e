//! Axum route handlers.
//!
//! - `POST /fund-openrouter` - fund the credit balance through the settlement pipeline
//! - `POST /make-offer` - place a purchase offer
//! - `POST /sell-nft` - create a fixed-price listing
//! - `POST /create-auction` - create an English auction paid in wrapped native currency
//! - `GET /health` - liveness, unauthenticated

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use opsgate::amount::FundingAmount;
use opsgate::chain::{ChainDescriptor, ChainRegistry};
use opsgate::marketplace::{Asset, ListingOrder, Marketplace, OfferOrder};
use opsgate_evm::funding::FundingOrchestrator;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::gate::{BearerToken, require_bearer};

/// Immutable per-process context shared by all handlers.
pub struct AppState {
    /// Funding pipeline.
    pub funding: FundingOrchestrator,
    /// Marketplace order service.
    pub marketplace: Arc<dyn Marketplace>,
    /// Supported chains.
    pub chains: ChainRegistry,
    /// Account marketplace orders are placed from.
    pub account: Address,
    /// Lifetime of listings and auctions.
    pub listing_ttl: Duration,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("funding", &self.funding)
            .field("account", &self.account)
            .field("listing_ttl", &self.listing_ttl)
            .finish_non_exhaustive()
    }
}

/// Shared application state.
pub type SharedState = Arc<AppState>;

/// Body of `POST /fund-openrouter`.
#[derive(Debug, Deserialize)]
pub struct FundRequest {
    /// Amount to fund; a number or a numeric string.
    #[serde(default)]
    pub amount_usd: Option<Value>,
}

/// Body of the marketplace endpoints.
///
/// `amount` is the offer price; `startAmount` the listing price or opening
/// bid. Token IDs and prices may be sent as strings or numbers.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Chain name, e.g. `Base`.
    #[serde(default)]
    pub chain: Option<String>,
    /// Collection contract address.
    #[serde(default)]
    pub token_address: Option<String>,
    /// Token identifier.
    #[serde(default)]
    pub token_id: Option<Value>,
    /// Offer price.
    #[serde(default)]
    pub amount: Option<Value>,
    /// Listing price or opening bid.
    #[serde(default)]
    pub start_amount: Option<Value>,
}

/// Which request field carries the price, and whether zero is acceptable.
#[derive(Debug, Clone, Copy)]
enum PriceField {
    /// Offer price in `amount`; must be non-zero.
    Amount,
    /// Listing price in `startAmount`; must be non-zero.
    ListingPrice,
    /// Opening bid in `startAmount`; zero is allowed.
    OpeningBid,
}

impl PriceField {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Amount => "amount",
            Self::ListingPrice | Self::OpeningBid => "startAmount",
        }
    }

    const fn allows_zero(self) -> bool {
        matches!(self, Self::OpeningBid)
    }
}

/// A marketplace request that passed validation.
#[derive(Debug)]
struct ValidOrder<'a> {
    chain: &'a ChainDescriptor,
    asset: Asset,
    price: String,
}

impl OrderRequest {
    fn validate<'a>(
        &self,
        chains: &'a ChainRegistry,
        price_field: PriceField,
    ) -> Result<ValidOrder<'a>, ApiError> {
        let price = match price_field {
            PriceField::Amount => self.amount.as_ref(),
            PriceField::ListingPrice | PriceField::OpeningBid => self.start_amount.as_ref(),
        };
        let (Some(chain), Some(token_address), Some(token_id), Some(price)) = (
            self.chain.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            self.token_address.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            text(self.token_id.as_ref()),
            text(price).filter(|p| price_field.allows_zero() || !is_zero(p)),
        ) else {
            return Err(ApiError::Validation(format!(
                "Missing required parameters: chain, tokenAddress, tokenId, and {} are required",
                price_field.as_str()
            )));
        };

        let chain = chains.resolve(chain)?;
        let token_address = Address::from_str(token_address)
            .map_err(|_| ApiError::Validation(format!("Invalid tokenAddress: {token_address}")))?;

        Ok(ValidOrder {
            chain,
            asset: Asset {
                token_address,
                token_id,
            },
            price,
        })
    }
}

/// Renders a JSON string or number as text; anything else counts as absent.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Whether a rendered price is numerically zero.
fn is_zero(price: &str) -> bool {
    Decimal::from_str(price).is_ok_and(|d| d.is_zero())
}

/// `POST /fund-openrouter`
///
/// # Errors
///
/// 400 for an invalid amount, 500 naming the cause if any pipeline stage fails.
pub async fn fund_openrouter(
    State(state): State<SharedState>,
    payload: Result<Json<FundRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let amount =
        FundingAmount::from_json(request.amount_usd.as_ref(), state.funding.max_amount())?;

    tracing::info!(%amount, "Funding requested");
    let outcome = state.funding.fund(amount.value()).await?;

    Ok(Json(json!({
        "success": true,
        "message": "OpenRouter wallet funded successfully",
        "transactionHash": outcome.transaction_hash,
    })))
}

/// `POST /make-offer`
///
/// # Errors
///
/// 400 for missing or invalid fields, 500 if the order service fails.
pub async fn make_offer(
    State(state): State<SharedState>,
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let order = request.validate(&state.chains, PriceField::Amount)?;
    let order = OfferOrder::new(order.chain, order.asset, state.account, order.price);

    let offer = state.marketplace.create_offer(&order).await?;
    Ok(Json(json!({ "success": true, "offer": offer })))
}

/// `POST /sell-nft`
///
/// # Errors
///
/// 400 for missing or invalid fields, 500 if the order service fails.
pub async fn sell_nft(
    State(state): State<SharedState>,
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let order = request.validate(&state.chains, PriceField::ListingPrice)?;
    let order = ListingOrder::fixed_price(
        order.chain,
        order.asset,
        state.account,
        order.price,
        state.listing_ttl,
    );

    let listing = state.marketplace.create_listing(&order).await?;
    Ok(Json(json!({ "success": true, "listing": listing })))
}

/// `POST /create-auction`
///
/// # Errors
///
/// 400 for missing or invalid fields or a chain without a wrapped native
/// token, 500 if the order service fails.
pub async fn create_auction(
    State(state): State<SharedState>,
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let order = request.validate(&state.chains, PriceField::OpeningBid)?;
    let payment_token = order.chain.wrapped_native.ok_or_else(|| {
        ApiError::Validation(format!(
            "Auctions are not supported on {}: no wrapped native token",
            order.chain.name
        ))
    })?;
    let order = ListingOrder::english_auction(
        order.chain,
        order.asset,
        state.account,
        order.price,
        state.listing_ttl,
        payment_token,
    );

    let auction = state.marketplace.create_auction(&order).await?;
    Ok(Json(json!({ "success": true, "auction": auction })))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Replaces the empty body of a timed-out response with the JSON error shape.
async fn render_timeout(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        ApiError::RequestTimeout.into_response()
    } else {
        response
    }
}

/// Creates the application router.
///
/// Business endpoints sit behind the bearer gate; `/health` does not.
pub fn router(state: SharedState, token: BearerToken, request_timeout: Duration) -> Router {
    let gated = Router::new()
        .route("/fund-openrouter", post(fund_openrouter))
        .route("/make-offer", post(make_offer))
        .route("/sell-nft", post(sell_nft))
        .route("/create-auction", post(create_auction))
        .route_layer(middleware::from_fn_with_state(token, require_bearer))
        .with_state(state);

    Router::new()
        .merge(gated)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(middleware::map_response(render_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: Value) -> OrderRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_validate_accepts_numbers_and_strings() {
        let chains = ChainRegistry::known();
        let order = request(json!({
            "chain": "Base",
            "tokenAddress": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "tokenId": 1234,
            "amount": "0.1"
        }))
        .validate(&chains, PriceField::Amount)
        .unwrap();
        assert_eq!(order.asset.token_id, "1234");
        assert_eq!(order.price, "0.1");
        assert_eq!(order.chain.chain_id, 8453);
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let chains = ChainRegistry::known();
        let err = request(json!({ "chain": "Base", "tokenAddress": "0xaa", "tokenId": "1" }))
            .validate(&chains, PriceField::ListingPrice)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required parameters: chain, tokenAddress, tokenId, and startAmount are required"
        );
    }

    #[test]
    fn test_zero_price_only_opens_auctions() {
        let chains = ChainRegistry::known();
        let body = |price: Value| {
            request(json!({
                "chain": "Base",
                "tokenAddress": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "tokenId": "1",
                "amount": price,
                "startAmount": price
            }))
        };
        for price in [json!(0), json!("0"), json!("0.00")] {
            let err = body(price.clone()).validate(&chains, PriceField::Amount).unwrap_err();
            assert!(err.to_string().ends_with("and amount are required"), "{price}");
            let err = body(price.clone()).validate(&chains, PriceField::ListingPrice).unwrap_err();
            assert!(err.to_string().ends_with("and startAmount are required"), "{price}");
            let order = body(price.clone()).validate(&chains, PriceField::OpeningBid).unwrap();
            assert!(is_zero(&order.price), "{price}");
        }
    }

    #[test]
    fn test_validate_rejects_unknown_chain_and_bad_address() {
        let chains = ChainRegistry::known();
        let body = json!({
            "chain": "base",
            "tokenAddress": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "tokenId": "1",
            "amount": "1"
        });
        let err = request(body).validate(&chains, PriceField::Amount).unwrap_err();
        assert!(matches!(err, ApiError::UnknownChain(_)));

        let body = json!({ "chain": "Base", "tokenAddress": "nope", "tokenId": "1", "amount": "1" });
        let err = request(body).validate(&chains, PriceField::Amount).unwrap_err();
        assert_eq!(err.to_string(), "Invalid tokenAddress: nope");
    }
}
