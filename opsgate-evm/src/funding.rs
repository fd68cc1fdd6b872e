//! Funding orchestrator.
//!
//! One funding request runs three stages strictly in order: negotiate a
//! charge with the billing service, build the settlement call from the
//! returned intent, then execute it on chain. Each stage needs the previous
//! stage's output, so nothing runs concurrently within a request. Requests
//! do not coordinate with each other; two identical requests are two
//! independent on-chain payments.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use alloy_primitives::Address;
use opsgate::amount::{AmountError, DEFAULT_MAX_AMOUNT, FundingAmount};
use opsgate::chain::{BASE_MAINNET, ChainId};
use opsgate::charge::{ChargeNegotiator, ChargeRequest, NegotiationError};
use opsgate::intent::InvalidIntent;
use rust_decimal::Decimal;

use crate::builder::{self, SettlementConfig};
use crate::executor::{ExecutionError, TransactionExecutor, TransactionOutcome};
use crate::provider::SettlementChain;

/// The pipeline stage a [`FundingError`] originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingStage {
    /// Requesting a charge from the billing service.
    ChargeNegotiation,
    /// Turning the payment intent into a settlement call.
    IntentBuild,
    /// Estimating, sending and confirming the transaction.
    TransactionExecution,
}

impl FundingStage {
    /// Human-readable stage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ChargeNegotiation => "charge negotiation",
            Self::IntentBuild => "intent build",
            Self::TransactionExecution => "transaction execution",
        }
    }
}

impl Display for FundingStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The underlying error of a failed stage.
#[derive(Debug, thiserror::Error)]
pub enum StageFailure {
    /// Charge negotiation failed.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    /// The intent could not be turned into a call.
    #[error(transparent)]
    Build(#[from] InvalidIntent),
    /// The transaction did not confirm successfully.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Failures of [`FundingOrchestrator::fund`].
///
/// The display form of a stage failure is the underlying cause's message;
/// the stage is carried separately for logging and matching.
#[derive(Debug, thiserror::Error)]
pub enum FundingError {
    /// The requested amount was rejected before any network call.
    #[error(transparent)]
    InvalidAmount(#[from] AmountError),
    /// A pipeline stage failed.
    #[error("{cause}")]
    Stage {
        /// Stage that failed.
        stage: FundingStage,
        /// What went wrong.
        #[source]
        cause: StageFailure,
    },
}

impl FundingError {
    fn at(stage: FundingStage, cause: impl Into<StageFailure>) -> Self {
        Self::Stage {
            stage,
            cause: cause.into(),
        }
    }

    /// The stage that failed, if the pipeline was entered at all.
    #[must_use]
    pub const fn stage(&self) -> Option<FundingStage> {
        match self {
            Self::InvalidAmount(_) => None,
            Self::Stage { stage, .. } => Some(*stage),
        }
    }
}

/// Runs the funding pipeline with shared, immutable collaborators.
#[derive(Clone)]
pub struct FundingOrchestrator {
    negotiator: Arc<dyn ChargeNegotiator>,
    executor: TransactionExecutor<Arc<dyn SettlementChain>>,
    settlement: SettlementConfig,
    sender: Address,
    chain_id: ChainId,
    max_amount: Decimal,
}

impl std::fmt::Debug for FundingOrchestrator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FundingOrchestrator")
            .field("settlement", &self.settlement)
            .field("sender", &self.sender)
            .field("chain_id", &self.chain_id)
            .field("max_amount", &self.max_amount)
            .finish_non_exhaustive()
    }
}

impl FundingOrchestrator {
    /// Creates an orchestrator paying from `sender` on Base with default
    /// settlement economics.
    pub fn new(
        negotiator: Arc<dyn ChargeNegotiator>,
        executor: TransactionExecutor<Arc<dyn SettlementChain>>,
        sender: Address,
    ) -> Self {
        Self {
            negotiator,
            executor,
            settlement: SettlementConfig::default(),
            sender,
            chain_id: BASE_MAINNET,
            max_amount: DEFAULT_MAX_AMOUNT,
        }
    }

    /// Sets the fee tier and value attached to settlement calls.
    #[must_use]
    pub const fn with_settlement(mut self, settlement: SettlementConfig) -> Self {
        self.settlement = settlement;
        self
    }

    /// Sets the chain charges are requested for.
    #[must_use]
    pub const fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Sets the largest amount a single request may fund.
    #[must_use]
    pub const fn with_max_amount(mut self, max_amount: Decimal) -> Self {
        self.max_amount = max_amount;
        self
    }

    /// The largest amount a single request may fund.
    #[must_use]
    pub const fn max_amount(&self) -> Decimal {
        self.max_amount
    }

    /// Funds the credit balance with `amount` of the reference currency.
    ///
    /// # Errors
    ///
    /// Returns [`FundingError::InvalidAmount`] without any network call if
    /// `amount` is out of range, or [`FundingError::Stage`] naming the stage
    /// that failed.
    pub async fn fund(&self, amount: Decimal) -> Result<TransactionOutcome, FundingError> {
        let amount = FundingAmount::new(amount, self.max_amount)?;
        let result = self.run(amount).await;

        #[cfg(feature = "telemetry")]
        match &result {
            Ok(outcome) => tracing::info!(
                %amount,
                tx_hash = %outcome.transaction_hash,
                "Funding transaction confirmed"
            ),
            Err(err) => tracing::error!(
                %amount,
                stage = err.stage().map(|stage| stage.as_str()),
                error = %err,
                "Funding failed"
            ),
        }

        result
    }

    async fn run(&self, amount: FundingAmount) -> Result<TransactionOutcome, FundingError> {
        let request = ChargeRequest::new(amount.value(), self.sender).with_chain_id(self.chain_id);
        let intent = self
            .negotiator
            .request_charge(&request)
            .await
            .map_err(|e| FundingError::at(FundingStage::ChargeNegotiation, e))?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(charge_id = ?intent.charge_id, deadline = %intent.deadline, "Charge created");

        let call = builder::build(&intent, &self.settlement)
            .map_err(|e| FundingError::at(FundingStage::IntentBuild, e))?;

        self.executor
            .submit(&call)
            .await
            .map_err(|e| FundingError::at(FundingStage::TransactionExecution, e))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    use alloy_primitives::{B128, Bytes, U256};
    use opsgate::BoxFuture;
    use opsgate::intent::PaymentIntent;
    use opsgate::timestamp::parse_deadline;

    use super::*;
    use crate::executor::tests::MockChain;

    #[derive(Default)]
    struct MockNegotiator {
        reject_with: Option<u16>,
        requests: Mutex<Vec<ChargeRequest>>,
    }

    impl ChargeNegotiator for MockNegotiator {
        fn request_charge<'a>(
            &'a self,
            request: &'a ChargeRequest,
        ) -> BoxFuture<'a, Result<PaymentIntent, NegotiationError>> {
            self.requests.lock().unwrap().push(request.clone());
            let reject_with = self.reject_with;
            Box::pin(async move {
                if let Some(status) = reject_with {
                    return Err(NegotiationError::Rejected {
                        status,
                        reason: "Payment Required".to_owned(),
                    });
                }
                Ok(PaymentIntent {
                    charge_id: Some("charge-1".to_owned()),
                    recipient_amount: U256::from(49_500_000u64),
                    deadline: parse_deadline("2024-06-01T12:00:00Z").unwrap(),
                    recipient: Address::repeat_byte(0x22),
                    recipient_currency: Address::repeat_byte(0x33),
                    refund_destination: Address::repeat_byte(0x11),
                    fee_amount: U256::from(500_000u64),
                    id: B128::repeat_byte(0x01),
                    operator: Address::repeat_byte(0x44),
                    signature: Bytes::from(vec![0xde, 0xad]),
                    prefix: Bytes::from(vec![0x19, 0x01]),
                    settlement_contract: Address::repeat_byte(0x55),
                })
            })
        }
    }

    fn orchestrator(
        negotiator: Arc<MockNegotiator>,
        chain: Arc<MockChain>,
    ) -> FundingOrchestrator {
        let chain: Arc<dyn SettlementChain> = chain;
        FundingOrchestrator::new(
            negotiator,
            TransactionExecutor::new(chain),
            Address::repeat_byte(0x11),
        )
    }

    #[tokio::test]
    async fn test_fund_runs_all_stages() {
        let negotiator = Arc::new(MockNegotiator::default());
        let chain = Arc::new(MockChain::default());
        let outcome = orchestrator(negotiator.clone(), chain.clone())
            .fund(Decimal::from(50))
            .await
            .unwrap();
        assert!(outcome.confirmed);

        let requests = negotiator.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].amount, Decimal::from(50));
        assert_eq!(requests[0].sender, Address::repeat_byte(0x11));
        assert_eq!(requests[0].chain_id, BASE_MAINNET);
        assert_eq!(chain.sends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_charge_never_reaches_chain() {
        let negotiator = Arc::new(MockNegotiator {
            reject_with: Some(402),
            ..MockNegotiator::default()
        });
        let chain = Arc::new(MockChain::default());
        let err = orchestrator(negotiator, chain.clone())
            .fund(Decimal::from(50))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(FundingStage::ChargeNegotiation));
        assert!(matches!(
            err,
            FundingError::Stage {
                cause: StageFailure::Negotiation(NegotiationError::Rejected { status: 402, .. }),
                ..
            }
        ));
        assert_eq!(err.to_string(), "Failed to create charge: 402 Payment Required");
        assert_eq!(chain.estimates.load(Ordering::SeqCst), 0);
        assert!(chain.sends.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_amount_makes_no_calls() {
        let negotiator = Arc::new(MockNegotiator::default());
        let chain = Arc::new(MockChain::default());
        let orchestrator = orchestrator(negotiator.clone(), chain.clone());

        for amount in ["0", "-1", "2000.01", "2001"] {
            let err = orchestrator
                .fund(Decimal::from_str(amount).unwrap())
                .await
                .unwrap_err();
            assert!(matches!(err, FundingError::InvalidAmount(_)), "{amount}");
            assert_eq!(err.stage(), None);
        }
        assert!(negotiator.requests.lock().unwrap().is_empty());
        assert_eq!(chain.estimates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execution_failure_is_attributed() {
        let negotiator = Arc::new(MockNegotiator::default());
        let chain = Arc::new(MockChain {
            estimate_fails: true,
            ..MockChain::default()
        });
        let err = orchestrator(negotiator, chain.clone())
            .fund(Decimal::from(50))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(FundingStage::TransactionExecution));
        assert!(err.to_string().starts_with("Gas estimation failed"));
        assert!(chain.sends.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_fundings_are_independent() {
        let negotiator = Arc::new(MockNegotiator::default());
        let chain = Arc::new(MockChain::default());
        let orchestrator = orchestrator(negotiator.clone(), chain.clone());

        let (first, second) = tokio::join!(
            orchestrator.fund(Decimal::from(50)),
            orchestrator.fund(Decimal::from(50))
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first.transaction_hash, second.transaction_hash);
        assert_eq!(negotiator.requests.lock().unwrap().len(), 2);
        assert_eq!(chain.sends.lock().unwrap().len(), 2);
    }
}
