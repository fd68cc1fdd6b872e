//! Chain access for settlement transactions.
//!
//! [`SettlementChain`] is the seam between the executor's sequencing logic
//! and the JSON-RPC node: estimate, price, send, confirm. The executor owns
//! ordering, retries and deadlines; implementations only perform one RPC
//! interaction per call.
//!
//! [`AlloySettlementChain`] is the production implementation. It holds the
//! signing key in a wallet filler and lets a [`PendingNonceManager`] order
//! concurrent submissions from the same key, resetting it whenever a
//! submission fails.

use alloy_network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, TxHash};
use alloy_provider::fillers::{ChainIdFiller, GasFiller, JoinFill, NonceFiller};
use alloy_provider::{
    DynProvider, PendingTransactionBuilder, PendingTransactionError, Provider, ProviderBuilder,
};
use alloy_rpc_client::RpcClient;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::TransportError;
use alloy_transport::layers::ThrottleLayer;
use alloy_transport_http::Http;
use opsgate::BoxFuture;
use tower::ServiceBuilder;
use url::Url;

use crate::builder::SettlementCall;
use crate::nonce::PendingNonceManager;

/// Errors surfaced by a [`SettlementChain`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// RPC transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Pending transaction watcher error.
    #[error(transparent)]
    PendingTransaction(#[from] PendingTransactionError),
    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

/// What the node reported once a transaction was included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusionReceipt {
    /// Hash of the included transaction.
    pub transaction_hash: TxHash,
    /// Whether execution succeeded (receipt status 1).
    pub success: bool,
    /// Block the transaction was included in.
    pub block_number: Option<u64>,
}

/// Single-step RPC operations needed to execute a settlement call.
pub trait SettlementChain: Send + Sync {
    /// Estimates the gas limit for `call` against current chain state.
    fn estimate_gas<'a>(&'a self, call: &'a SettlementCall) -> BoxFuture<'a, Result<u64, ChainError>>;

    /// Fetches the current legacy gas price, in wei.
    fn gas_price(&self) -> BoxFuture<'_, Result<u128, ChainError>>;

    /// Signs and broadcasts `call` with an explicit gas limit and price.
    fn send<'a>(
        &'a self,
        call: &'a SettlementCall,
        gas_limit: u64,
        gas_price: u128,
    ) -> BoxFuture<'a, Result<TxHash, ChainError>>;

    /// Waits until `tx_hash` has the given number of confirmations.
    ///
    /// Implementations may wait indefinitely; callers impose the deadline.
    fn confirm(
        &self,
        tx_hash: TxHash,
        confirmations: u64,
    ) -> BoxFuture<'_, Result<InclusionReceipt, ChainError>>;

    /// Discards locally tracked nonce state so the next [`send`](Self::send)
    /// re-reads it from the node.
    ///
    /// Called by the executor when a confirmation wait fails or expires.
    fn reset_nonce(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

impl<T: SettlementChain + ?Sized> SettlementChain for std::sync::Arc<T> {
    fn estimate_gas<'a>(&'a self, call: &'a SettlementCall) -> BoxFuture<'a, Result<u64, ChainError>> {
        (**self).estimate_gas(call)
    }

    fn gas_price(&self) -> BoxFuture<'_, Result<u128, ChainError>> {
        (**self).gas_price()
    }

    fn send<'a>(
        &'a self,
        call: &'a SettlementCall,
        gas_limit: u64,
        gas_price: u128,
    ) -> BoxFuture<'a, Result<TxHash, ChainError>> {
        (**self).send(call, gas_limit, gas_price)
    }

    fn confirm(
        &self,
        tx_hash: TxHash,
        confirmations: u64,
    ) -> BoxFuture<'_, Result<InclusionReceipt, ChainError>> {
        (**self).confirm(tx_hash, confirmations)
    }

    fn reset_nonce(&self) -> BoxFuture<'_, ()> {
        (**self).reset_nonce()
    }
}

/// [`SettlementChain`] backed by an alloy provider with a local signer.
#[derive(Clone)]
pub struct AlloySettlementChain {
    provider: DynProvider<Ethereum>,
    nonce_manager: PendingNonceManager,
    from: Address,
}

impl std::fmt::Debug for AlloySettlementChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloySettlementChain")
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl AlloySettlementChain {
    /// Creates an RPC client for a single HTTP endpoint.
    ///
    /// When `rate_limit` is set, requests are throttled to that many per second.
    #[must_use]
    pub fn rpc_client(url: Url, rate_limit: Option<u32>) -> RpcClient {
        let service = ServiceBuilder::new()
            .layer(ThrottleLayer::new(rate_limit.unwrap_or(u32::MAX)))
            .service(Http::new(url));
        RpcClient::new(service, false)
    }

    /// Connects to `rpc_url` and signs with `signer`.
    ///
    /// Gas limit and price are always set explicitly by the executor, so the
    /// gas filler only acts on requests built elsewhere.
    #[must_use]
    pub fn new(signer: PrivateKeySigner, rpc_url: Url, rate_limit: Option<u32>) -> Self {
        let from = signer.address();
        let wallet = EthereumWallet::from(signer);
        let client = Self::rpc_client(rpc_url, rate_limit);
        let nonce_manager = PendingNonceManager::default();

        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                NonceFiller::new(nonce_manager.clone()),
                ChainIdFiller::default(),
            ),
        );
        let provider = ProviderBuilder::default()
            .filler(filler)
            .wallet(wallet)
            .connect_client(client)
            .erased();

        #[cfg(feature = "telemetry")]
        tracing::info!(signer = %from, "Using settlement provider");

        Self {
            provider,
            nonce_manager,
            from,
        }
    }

    /// Address transactions are sent from.
    #[must_use]
    pub const fn signer_address(&self) -> Address {
        self.from
    }
}

impl SettlementChain for AlloySettlementChain {
    fn estimate_gas<'a>(&'a self, call: &'a SettlementCall) -> BoxFuture<'a, Result<u64, ChainError>> {
        Box::pin(async move {
            let request = call.to_request(self.from);
            Ok(self.provider.estimate_gas(request).await?)
        })
    }

    fn gas_price(&self) -> BoxFuture<'_, Result<u128, ChainError>> {
        Box::pin(async move { Ok(self.provider.get_gas_price().await?) })
    }

    fn send<'a>(
        &'a self,
        call: &'a SettlementCall,
        gas_limit: u64,
        gas_price: u128,
    ) -> BoxFuture<'a, Result<TxHash, ChainError>> {
        Box::pin(async move {
            let request = call
                .to_request(self.from)
                .with_gas_limit(gas_limit)
                .with_gas_price(gas_price);
            match self.provider.send_transaction(request).await {
                Ok(pending) => Ok(*pending.tx_hash()),
                Err(e) => {
                    // The filler already advanced the nonce for a transaction
                    // that never reached the mempool.
                    self.nonce_manager.reset_nonce(self.from).await;
                    Err(e.into())
                }
            }
        })
    }

    fn confirm(
        &self,
        tx_hash: TxHash,
        confirmations: u64,
    ) -> BoxFuture<'_, Result<InclusionReceipt, ChainError>> {
        Box::pin(async move {
            let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
                .with_required_confirmations(confirmations)
                .get_receipt()
                .await?;
            Ok(InclusionReceipt {
                transaction_hash: receipt.transaction_hash,
                success: receipt.status(),
                block_number: receipt.block_number,
            })
        })
    }

    fn reset_nonce(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            #[cfg(feature = "telemetry")]
            tracing::debug!(signer = %self.from, "Resetting cached nonce");
            self.nonce_manager.reset_nonce(self.from).await;
        })
    }
}
