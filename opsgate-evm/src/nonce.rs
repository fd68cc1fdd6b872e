//! Nonce tracking for the settlement signer.
//!
//! alloy's `CachedNonceManager` keeps incrementing after a rejected
//! broadcast, so one failed submission leaves a gap that strands every later
//! transaction from the same key. [`PendingNonceManager`] seeds from the
//! `pending` transaction count and can be reset, so the next call re-queries
//! the node instead of building on a nonce that never reached the mempool.

use std::sync::Arc;

use alloy_network::Network;
use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_provider::fillers::NonceManager;
use alloy_transport::TransportResult;
use dashmap::DashMap;
use tokio::sync::Mutex;

const NONCE_UNSET: u64 = u64::MAX;

/// Nonce manager that queries the `pending` count on first use and after
/// every [`reset_nonce`](Self::reset_nonce).
///
/// Each address has its own slot guarded by an async mutex, so concurrent
/// submissions from one key receive consecutive nonces.
#[derive(Clone, Debug, Default)]
pub struct PendingNonceManager {
    nonces: Arc<DashMap<Address, Arc<Mutex<u64>>>>,
}

#[cfg_attr(target_family = "wasm", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_family = "wasm"), async_trait::async_trait)]
impl NonceManager for PendingNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: Network,
    {
        let slot = {
            let entry = self
                .nonces
                .entry(address)
                .or_insert_with(|| Arc::new(Mutex::new(NONCE_UNSET)));
            Arc::clone(entry.value())
        };

        let mut nonce = slot.lock().await;
        let next = if *nonce == NONCE_UNSET {
            provider.get_transaction_count(address).pending().await?
        } else {
            *nonce + 1
        };
        *nonce = next;
        Ok(next)
    }
}

impl PendingNonceManager {
    /// Forgets the cached nonce for `address`; the next transaction
    /// re-queries the node.
    ///
    /// Call after any failure that leaves the mempool state uncertain: a
    /// rejected broadcast, a failed receipt wait or an expired deadline.
    pub async fn reset_nonce(&self, address: Address) {
        let slot = self.nonces.get(&address).map(|entry| Arc::clone(entry.value()));
        if let Some(slot) = slot {
            *slot.lock().await = NONCE_UNSET;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reset_unknown_address_is_noop() {
        let manager = PendingNonceManager::default();
        manager.reset_nonce(Address::repeat_byte(0x01)).await;
        assert!(manager.nonces.is_empty());
    }
}
