#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the opsgate operator backend.
//!
//! This crate holds the chain-agnostic vocabulary shared by the rest of the
//! workspace: which chains are supported, what a funding request may ask for,
//! what a billing-issued payment intent looks like once validated, and the
//! seams through which the off-chain collaborators (billing service,
//! marketplace order service) are reached.
//!
//! # Modules
//!
//! - [`amount`] - Funding amount validation
//! - [`chain`] - Static registry of supported EVM chains
//! - [`charge`] - Charge negotiation seam and errors
//! - [`intent`] - Billing wire format and the validated [`PaymentIntent`](intent::PaymentIntent)
//! - [`marketplace`] - Marketplace order seam
//! - [`timestamp`] - Unix timestamps and deadline parsing
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod amount;
pub mod chain;
pub mod charge;
pub mod intent;
pub mod marketplace;
pub mod timestamp;

pub use amount::{AmountError, FundingAmount};
pub use chain::{ChainDescriptor, ChainId, ChainName, ChainNotFound, ChainRegistry};
pub use charge::{ChargeNegotiator, ChargeRequest, NegotiationError};
pub use intent::{InvalidIntent, PaymentIntent};
pub use timestamp::UnixTimestamp;

use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future, used by the dyn-compatible collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
