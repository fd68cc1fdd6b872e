//! Transaction executor.
//!
//! Sequences one settlement call through a [`SettlementChain`]:
//!
//! 1. estimate gas — a failure means the call would revert; terminal
//! 2. fetch the gas price — transient, retried once
//! 3. send with explicit gas limit, price and value — terminal on failure
//! 4. wait for inclusion under an explicit deadline
//!
//! A deadline expiry is reported as [`ExecutionError::ConfirmationTimeout`],
//! distinct from a submission failure, because the transaction may still
//! land. Dropping the confirmation future on expiry cancels the underlying
//! receipt polling. A failed or expired confirmation also resets the chain's
//! nonce tracking, so the next submission starts from the node's view.

use std::time::Duration;

use alloy_primitives::TxHash;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::builder::SettlementCall;
use crate::provider::{ChainError, SettlementChain};

/// Default bound on the confirmation wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// The confirmed result of a settlement transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// Hash of the included transaction.
    pub transaction_hash: TxHash,
    /// Always `true`; an unconfirmed transaction is an error, not an outcome.
    pub confirmed: bool,
    /// Block the transaction was included in.
    pub block_number: Option<u64>,
}

/// Failures of [`TransactionExecutor::submit`], one per step.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Gas estimation failed; the call would revert against current state.
    #[error("Gas estimation failed: {0}")]
    GasEstimation(#[source] ChainError),
    /// The network gas price could not be fetched, even after a retry.
    #[error("Failed to fetch fee data: {0}")]
    FeeFetch(#[source] ChainError),
    /// The transaction could not be submitted (nonce, balance, ...).
    #[error("Transaction submission failed: {0}")]
    Submission(#[source] ChainError),
    /// The transaction was not confirmed in time and may still be included.
    #[error("Transaction {tx_hash} not confirmed within {timeout:?}; it may still be included")]
    ConfirmationTimeout {
        /// Hash of the submitted transaction.
        tx_hash: TxHash,
        /// The deadline that expired.
        timeout: Duration,
    },
    /// Waiting for confirmation failed for a reason other than the deadline.
    #[error("Failed to confirm transaction {tx_hash}: {source}")]
    Confirmation {
        /// Hash of the submitted transaction.
        tx_hash: TxHash,
        /// Underlying watcher error.
        #[source]
        source: ChainError,
    },
    /// The transaction was included but reverted.
    #[error("Transaction {0} reverted")]
    Reverted(TxHash),
}

/// Executes settlement calls against a chain with a bounded confirmation wait.
#[derive(Debug, Clone)]
pub struct TransactionExecutor<C> {
    chain: C,
    confirmation_timeout: Duration,
    confirmations: u64,
}

impl<C: SettlementChain> TransactionExecutor<C> {
    /// Creates an executor waiting for one confirmation for at most
    /// [`DEFAULT_CONFIRMATION_TIMEOUT`].
    pub const fn new(chain: C) -> Self {
        Self {
            chain,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            confirmations: 1,
        }
    }

    /// Sets the confirmation deadline.
    #[must_use]
    pub const fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Sets the number of confirmations to wait for.
    #[must_use]
    pub const fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Returns the underlying chain.
    pub const fn chain(&self) -> &C {
        &self.chain
    }

    /// Estimates, prices, sends and confirms `call`.
    ///
    /// # Errors
    ///
    /// Returns the [`ExecutionError`] variant of the first step that failed.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opsgate.executor.submit", skip_all, fields(to = %call.to), err)
    )]
    pub async fn submit(&self, call: &SettlementCall) -> Result<TransactionOutcome, ExecutionError> {
        let gas_limit = self
            .chain
            .estimate_gas(call)
            .await
            .map_err(ExecutionError::GasEstimation)?;

        let gas_price = self.fetch_gas_price().await?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(gas_limit, gas_price, value = %call.value, "Submitting settlement transaction");

        let tx_hash = self
            .chain
            .send(call, gas_limit, gas_price)
            .await
            .map_err(ExecutionError::Submission)?;

        #[cfg(feature = "telemetry")]
        tracing::info!(%tx_hash, "Settlement transaction submitted");

        let confirmation = self.chain.confirm(tx_hash, self.confirmations);
        let receipt = match tokio::time::timeout(self.confirmation_timeout, confirmation).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(source)) => {
                self.chain.reset_nonce().await;
                return Err(ExecutionError::Confirmation { tx_hash, source });
            }
            Err(_) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(%tx_hash, timeout = ?self.confirmation_timeout, "Confirmation deadline expired");
                self.chain.reset_nonce().await;
                return Err(ExecutionError::ConfirmationTimeout {
                    tx_hash,
                    timeout: self.confirmation_timeout,
                });
            }
        };

        if !receipt.success {
            return Err(ExecutionError::Reverted(receipt.transaction_hash));
        }

        Ok(TransactionOutcome {
            transaction_hash: receipt.transaction_hash,
            confirmed: true,
            block_number: receipt.block_number,
        })
    }

    async fn fetch_gas_price(&self) -> Result<u128, ExecutionError> {
        match self.chain.gas_price().await {
            Ok(price) => Ok(price),
            Err(_first) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %_first, "Gas price fetch failed, retrying once");
                self.chain.gas_price().await.map_err(ExecutionError::FeeFetch)
            }
        }
    }
}
