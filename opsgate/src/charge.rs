//! Charge negotiation with the billing service.
//!
//! A [`ChargeNegotiator`] turns a requested fiat amount into a signed
//! [`PaymentIntent`]. It makes exactly one attempt; retry policy belongs to
//! the caller, and the funding pipeline does not retry.

use alloy_primitives::Address;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::BoxFuture;
use crate::chain::{BASE_MAINNET, ChainId};
use crate::intent::{InvalidIntent, PaymentIntent};

/// Body of a charge request, as sent to the billing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeRequest {
    /// Requested amount in the reference fiat currency.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Wallet that will execute the payment.
    pub sender: Address,
    /// Chain the payment will be executed on.
    pub chain_id: ChainId,
}

impl ChargeRequest {
    /// Creates a charge request settled on Base.
    #[must_use]
    pub const fn new(amount: Decimal, sender: Address) -> Self {
        Self {
            amount,
            sender,
            chain_id: BASE_MAINNET,
        }
    }

    /// Overrides the settlement chain.
    #[must_use]
    pub const fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = chain_id;
        self
    }
}

/// Failures of a single charge negotiation attempt.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// The billing service answered with a non-200 status.
    #[error("Failed to create charge: {status} {reason}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Canonical status text.
        reason: String,
    },
    /// The billing service could not be reached (connect, timeout, TLS).
    #[error("Billing service unreachable: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The billing service answered 200 with an unusable body.
    #[error(transparent)]
    InvalidIntent(#[from] InvalidIntent),
}

/// Obtains signed payment intents from a billing service.
pub trait ChargeNegotiator: Send + Sync {
    /// Requests a charge and returns the validated intent.
    fn request_charge<'a>(
        &'a self,
        request: &'a ChargeRequest,
    ) -> BoxFuture<'a, Result<PaymentIntent, NegotiationError>>;
}

impl<T: ChargeNegotiator + ?Sized> ChargeNegotiator for std::sync::Arc<T> {
    fn request_charge<'a>(
        &'a self,
        request: &'a ChargeRequest,
    ) -> BoxFuture<'a, Result<PaymentIntent, NegotiationError>> {
        (**self).request_charge(request)
    }
}
