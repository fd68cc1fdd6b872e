//! Intent transaction builder.
//!
//! Maps a validated [`PaymentIntent`] onto the exact arguments of
//! `swapAndTransferUniswapV3Native`. The transform is pure: the same intent
//! and configuration always produce the same [`SettlementCall`].
//!
//! Amounts are passed through untouched; the billing service already
//! expresses them in the settlement token's base units. The native value
//! attached to the call is a fixed per-transaction ceiling taken from
//! configuration, not derived from the requested fiat amount. If settlement
//! needs more, the contract's own accounting rejects it.

use std::fmt::{Display, Formatter};

use alloy_network::TransactionBuilder;
use alloy_primitives::aliases::U24;
use alloy_primitives::{Address, Bytes, U256};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_sol_types::SolCall;
use opsgate::intent::{InvalidIntent, PaymentIntent};
use opsgate::timestamp::UnixTimestamp;

use crate::contract::ITransfers;

/// 0.004 of the chain's native unit, in wei.
pub const DEFAULT_VALUE_WEI: U256 = U256::from_limbs([4_000_000_000_000_000, 0, 0, 0]);

/// Uniswap V3 pool fee tiers, in hundredths of a basis point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeeTier {
    /// 0.01%.
    Lowest,
    /// 0.05%.
    #[default]
    Low,
    /// 0.3%.
    Medium,
    /// 1%.
    High,
}

impl FeeTier {
    /// Returns the tier as the contract's `uint24` value.
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        match self {
            Self::Lowest => 100,
            Self::Low => 500,
            Self::Medium => 3000,
            Self::High => 10_000,
        }
    }
}

impl Display for FeeTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// The value is not a Uniswap V3 fee tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unsupported pool fee tier {0}; expected one of 100, 500, 3000, 10000")]
pub struct UnsupportedFeeTier(pub u32);

impl TryFrom<u32> for FeeTier {
    type Error = UnsupportedFeeTier;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            100 => Ok(Self::Lowest),
            500 => Ok(Self::Low),
            3000 => Ok(Self::Medium),
            10_000 => Ok(Self::High),
            other => Err(UnsupportedFeeTier(other)),
        }
    }
}

/// Settlement economics applied to every funding transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementConfig {
    /// Pool fee tier for the swap path.
    pub pool_fees_tier: FeeTier,
    /// Native value attached to each call, in wei.
    pub value: U256,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            pool_fees_tier: FeeTier::default(),
            value: DEFAULT_VALUE_WEI,
        }
    }
}

/// A fully-typed `swapAndTransferUniswapV3Native` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementCall {
    /// Settlement contract address.
    pub to: Address,
    /// The intent tuple.
    pub intent: ITransfers::TransferIntent,
    /// Pool fee tier argument.
    pub pool_fees_tier: U24,
    /// Native value attached to the call.
    pub value: U256,
}

impl SettlementCall {
    /// ABI-encodes the call, selector included.
    #[must_use]
    pub fn calldata(&self) -> Bytes {
        ITransfers::swapAndTransferUniswapV3NativeCall {
            _intent: self.intent.clone(),
            poolFeesTier: self.pool_fees_tier,
        }
        .abi_encode()
        .into()
    }

    /// Builds the transaction request for this call sent from `from`.
    ///
    /// Gas limit and gas price are left unset; the executor fills them in.
    #[must_use]
    pub fn to_request(&self, from: Address) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(from)
            .with_to(self.to)
            .with_value(self.value)
            .with_input(self.calldata())
    }

    /// Returns the intent deadline in epoch seconds.
    #[must_use]
    pub fn deadline(&self) -> U256 {
        self.intent.deadline
    }
}

/// Builds the settlement call for `intent`.
///
/// # Errors
///
/// Returns [`InvalidIntent`] if the deadline lies before the Unix epoch.
pub fn build(
    intent: &PaymentIntent,
    config: &SettlementConfig,
) -> Result<SettlementCall, InvalidIntent> {
    let deadline = UnixTimestamp::from_datetime(&intent.deadline)
        .ok_or_else(|| InvalidIntent::new("deadline", "before the Unix epoch"))?;

    Ok(SettlementCall {
        to: intent.settlement_contract,
        intent: ITransfers::TransferIntent {
            recipientAmount: intent.recipient_amount,
            deadline: U256::from(deadline.as_secs()),
            recipient: intent.recipient,
            recipientCurrency: intent.recipient_currency,
            refundDestination: intent.refund_destination,
            feeAmount: intent.fee_amount,
            id: intent.id,
            operator: intent.operator,
            signature: intent.signature.clone(),
            prefix: intent.prefix.clone(),
        },
        pool_fees_tier: U24::from(config.pool_fees_tier.as_u32()),
        value: config.value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B128;
    use alloy_primitives::utils::parse_ether;
    use opsgate::timestamp::parse_deadline;

    fn intent(deadline: &str) -> PaymentIntent {
        PaymentIntent {
            charge_id: None,
            recipient_amount: U256::from(49_500_000u64),
            deadline: parse_deadline(deadline).unwrap(),
            recipient: Address::repeat_byte(0x22),
            recipient_currency: Address::repeat_byte(0x33),
            refund_destination: Address::repeat_byte(0x11),
            fee_amount: U256::from(500_000u64),
            id: B128::repeat_byte(0x01),
            operator: Address::repeat_byte(0x44),
            signature: Bytes::from(vec![0xde, 0xad]),
            prefix: Bytes::from(vec![0x19, 0x01]),
            settlement_contract: Address::repeat_byte(0x55),
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let intent = intent("2024-06-01T12:00:00.750Z");
        let config = SettlementConfig::default();
        let first = build(&intent, &config).unwrap();
        let second = build(&intent, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.calldata(), second.calldata());
    }

    #[test]
    fn test_build_maps_fields() {
        let call = build(&intent("2024-06-01T12:00:00.750Z"), &SettlementConfig::default()).unwrap();
        assert_eq!(call.to, Address::repeat_byte(0x55));
        assert_eq!(call.deadline(), U256::from(1_717_243_200u64));
        assert_eq!(call.intent.recipientAmount, U256::from(49_500_000u64));
        assert_eq!(call.intent.feeAmount, U256::from(500_000u64));
        assert_eq!(call.intent.operator, Address::repeat_byte(0x44));
        assert_eq!(call.pool_fees_tier, U24::from(500u32));
        assert_eq!(call.value, parse_ether("0.004").unwrap());
    }

    #[test]
    fn test_calldata_selector() {
        let call = build(&intent("2024-06-01T12:00:00Z"), &SettlementConfig::default()).unwrap();
        let calldata = call.calldata();
        assert_eq!(
            &calldata[..4],
            ITransfers::swapAndTransferUniswapV3NativeCall::SELECTOR.as_slice()
        );
        let decoded =
            ITransfers::swapAndTransferUniswapV3NativeCall::abi_decode(&calldata).unwrap();
        assert_eq!(decoded._intent, call.intent);
    }

    #[test]
    fn test_request_carries_value_and_target() {
        let call = build(&intent("2024-06-01T12:00:00Z"), &SettlementConfig::default()).unwrap();
        let from = Address::repeat_byte(0x99);
        let request = call.to_request(from);
        assert_eq!(request.from, Some(from));
        assert_eq!(request.value, Some(DEFAULT_VALUE_WEI));
        assert!(request.gas.is_none());
        assert!(request.gas_price.is_none());
    }

    #[test]
    fn test_configured_economics() {
        let config = SettlementConfig {
            pool_fees_tier: FeeTier::Medium,
            value: parse_ether("0.01").unwrap(),
        };
        let call = build(&intent("2024-06-01T12:00:00Z"), &config).unwrap();
        assert_eq!(call.pool_fees_tier, U24::from(3000u32));
        assert_eq!(call.value, parse_ether("0.01").unwrap());
    }

    #[test]
    fn test_pre_epoch_deadline_is_invalid() {
        let err = build(&intent("1969-07-20T20:17:00Z"), &SettlementConfig::default()).unwrap_err();
        assert_eq!(err.field, "deadline");
    }

    #[test]
    fn test_fee_tier_parsing() {
        assert_eq!(FeeTier::try_from(500).unwrap(), FeeTier::Low);
        assert_eq!(FeeTier::try_from(10_000).unwrap(), FeeTier::High);
        assert_eq!(FeeTier::try_from(250), Err(UnsupportedFeeTier(250)));
    }
}
