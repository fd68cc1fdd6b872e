#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM settlement for the opsgate funding pipeline.
//!
//! A payment intent issued by the billing service is settled by calling
//! `swapAndTransferUniswapV3Native` on the settlement contract, paying with
//! native currency that is swapped into the recipient's token.
//!
//! # Architecture
//!
//! - [`contract`] - Solidity interface of the settlement contract
//! - [`builder`] - Pure mapping from [`PaymentIntent`](opsgate::PaymentIntent) to a typed call
//! - [`nonce`] - Resettable nonce tracking for the settlement signer
//! - [`provider`] - The RPC seam ([`SettlementChain`]) and its alloy implementation
//! - [`executor`] - Estimate, price, send and confirm under a deadline
//! - [`funding`] - The end-to-end funding pipeline
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod builder;
pub mod contract;
pub mod executor;
pub mod funding;
pub mod nonce;
pub mod provider;

pub use builder::{FeeTier, SettlementCall, SettlementConfig};
pub use executor::{ExecutionError, TransactionExecutor, TransactionOutcome};
pub use funding::{FundingError, FundingOrchestrator, FundingStage};
pub use nonce::PendingNonceManager;
pub use provider::{AlloySettlementChain, ChainError, SettlementChain};
