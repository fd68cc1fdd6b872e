//! Marketplace order seam.
//!
//! Offer, listing and auction creation are delegated wholesale to an external
//! marketplace order service; price semantics, order signing and order-book
//! mechanics are its concern. This module only fixes the shape of what is
//! sent and the trait through which it is sent.

use std::time::Duration;

use alloy_primitives::Address;
use serde::Serialize;
use serde_json::Value;

use crate::chain::{ChainDescriptor, ChainId, ChainName};
use crate::timestamp::UnixTimestamp;

/// Default lifetime of listings and auctions.
pub const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// The token an order refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Collection contract.
    pub token_address: Address,
    /// Token identifier within the collection.
    pub token_id: String,
}

/// A purchase offer for a single asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferOrder {
    /// Chain the asset lives on.
    pub chain: ChainName,
    /// EIP-155 chain ID of `chain`.
    pub chain_id: ChainId,
    /// The asset being bid on.
    pub asset: Asset,
    /// Account placing the offer.
    pub account_address: Address,
    /// Offer price, as a decimal string in the chain's payment token.
    pub start_amount: String,
}

impl OfferOrder {
    /// Creates an offer on `chain`.
    #[must_use]
    pub fn new(chain: &ChainDescriptor, asset: Asset, account: Address, amount: String) -> Self {
        Self {
            chain: chain.name,
            chain_id: chain.chain_id,
            asset,
            account_address: account,
            start_amount: amount,
        }
    }
}

/// A fixed-price listing or an English auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingOrder {
    /// Chain the asset lives on.
    pub chain: ChainName,
    /// EIP-155 chain ID of `chain`.
    pub chain_id: ChainId,
    /// The asset being sold.
    pub asset: Asset,
    /// Account selling the asset.
    pub account_address: Address,
    /// Listing price, or the auction's opening bid.
    pub start_amount: String,
    /// When the order expires.
    pub expiration_time: UnixTimestamp,
    /// Token bids are paid in; set for auctions only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_token_address: Option<Address>,
    /// Whether this is an English auction.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub english_auction: bool,
}

impl ListingOrder {
    /// Creates a fixed-price listing expiring `ttl` from now.
    #[must_use]
    pub fn fixed_price(
        chain: &ChainDescriptor,
        asset: Asset,
        account: Address,
        start_amount: String,
        ttl: Duration,
    ) -> Self {
        Self {
            chain: chain.name,
            chain_id: chain.chain_id,
            asset,
            account_address: account,
            start_amount,
            expiration_time: UnixTimestamp::now() + ttl,
            payment_token_address: None,
            english_auction: false,
        }
    }

    /// Creates an English auction paid in `payment_token`, expiring `ttl` from now.
    #[must_use]
    pub fn english_auction(
        chain: &ChainDescriptor,
        asset: Asset,
        account: Address,
        start_amount: String,
        ttl: Duration,
        payment_token: Address,
    ) -> Self {
        Self {
            payment_token_address: Some(payment_token),
            english_auction: true,
            ..Self::fixed_price(chain, asset, account, start_amount, ttl)
        }
    }
}

/// Failures reported by a marketplace implementation.
#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    /// The order service rejected the order.
    #[error("Marketplace rejected order: {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Body or status text returned by the service.
        message: String,
    },
    /// The order service could not be reached.
    #[error("Marketplace unreachable: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The order service answered with an unreadable body.
    #[error("Invalid marketplace response: {0}")]
    InvalidResponse(String),
}

/// Creates marketplace orders on behalf of the operator account.
///
/// Results are returned as the service produced them; big integers are
/// expected to already be rendered as strings.
#[async_trait::async_trait]
pub trait Marketplace: Send + Sync {
    /// Places a purchase offer.
    async fn create_offer(&self, order: &OfferOrder) -> Result<Value, MarketplaceError>;

    /// Creates a fixed-price listing.
    async fn create_listing(&self, order: &ListingOrder) -> Result<Value, MarketplaceError>;

    /// Creates an English auction.
    async fn create_auction(&self, order: &ListingOrder) -> Result<Value, MarketplaceError> {
        self.create_listing(order).await
    }
}
