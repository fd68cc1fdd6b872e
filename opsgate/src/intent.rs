//! Billing-issued payment intents.
//!
//! The billing service answers a charge request with a nested JSON object:
//!
//! ```json
//! { "data": { "id": "...", "web3_data": { "transfer_intent": {
//!     "metadata":  { "contract_address": "0x..." },
//!     "call_data": { "recipient_amount": "...", "deadline": "2024-06-01T12:00:00Z", ... }
//! } } } }
//! ```
//!
//! That payload is untrusted. [`PaymentIntent::from_charge_json`] walks it,
//! checks the shape and type of every field the settlement contract needs,
//! and fails closed with [`InvalidIntent`] naming the first bad field. The
//! signature is not verified here; the billing service is authoritative for
//! intent correctness.

use std::str::FromStr;

use alloy_primitives::{Address, B128, Bytes, U256};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::timestamp::parse_deadline;

/// The billing response did not contain a well-formed intent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid payment intent: {field}: {reason}")]
pub struct InvalidIntent {
    /// Dotted path of the offending field.
    pub field: String,
    /// What was wrong with it.
    pub reason: String,
}

impl InvalidIntent {
    /// Creates a new error for `field`.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// A validated, strongly-typed payment intent.
///
/// Created fresh per funding request, used exactly once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Billing-side charge identifier, when supplied. Used for logging only.
    pub charge_id: Option<String>,
    /// Amount the recipient receives, in settlement-token base units.
    pub recipient_amount: U256,
    /// Absolute deadline after which the contract rejects the intent.
    pub deadline: DateTime<Utc>,
    /// Payee.
    pub recipient: Address,
    /// Token the recipient is paid in.
    pub recipient_currency: Address,
    /// Where excess native currency is refunded.
    pub refund_destination: Address,
    /// Operator fee, in settlement-token base units.
    pub fee_amount: U256,
    /// 16-byte intent identifier.
    pub id: B128,
    /// Operator address that signed the intent.
    pub operator: Address,
    /// Operator signature over the intent.
    pub signature: Bytes,
    /// Signature prefix expected by the contract.
    pub prefix: Bytes,
    /// Settlement contract the intent must be executed against.
    pub settlement_contract: Address,
}

const INTENT_PATH: &str = "data.web3_data.transfer_intent";

impl PaymentIntent {
    /// Parses and validates a full billing charge response.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidIntent`] if any required field is missing or ill-typed.
    pub fn from_charge_json(body: &Value) -> Result<Self, InvalidIntent> {
        let parsed = Self::parse(body);
        #[cfg(feature = "telemetry")]
        if let Err(err) = &parsed {
            tracing::warn!(field = %err.field, reason = %err.reason, "Rejected billing intent");
        }
        parsed
    }

    fn parse(body: &Value) -> Result<Self, InvalidIntent> {
        let data = object(body, "data")?;
        let charge_id = data.get("id").and_then(Value::as_str).map(str::to_owned);
        let web3_data = object(data, "web3_data").map_err(|e| e.under("data"))?;
        let transfer_intent =
            object(web3_data, "transfer_intent").map_err(|e| e.under("data.web3_data"))?;
        let metadata = object(transfer_intent, "metadata").map_err(|e| e.under(INTENT_PATH))?;
        let call_data = object(transfer_intent, "call_data").map_err(|e| e.under(INTENT_PATH))?;

        let settlement_contract = string(metadata, "contract_address")
            .and_then(|raw| {
                Address::from_str(raw)
                    .map_err(|_| InvalidIntent::new("contract_address", "expected an address"))
            })
            .map_err(|e| e.under(&format!("{INTENT_PATH}.metadata")))?;

        let fields = CallData(call_data);
        Ok(Self {
            charge_id,
            recipient_amount: fields.amount("recipient_amount")?,
            deadline: fields.deadline("deadline")?,
            recipient: fields.address("recipient")?,
            recipient_currency: fields.address("recipient_currency")?,
            refund_destination: fields.address("refund_destination")?,
            fee_amount: fields.amount("fee_amount")?,
            id: fields.parse::<B128>("id", "expected 16 bytes of hex")?,
            operator: fields.address("operator")?,
            signature: fields.parse::<Bytes>("signature", "expected hex bytes")?,
            prefix: fields.parse::<Bytes>("prefix", "expected hex bytes")?,
            settlement_contract,
        })
    }
}

impl InvalidIntent {
    fn under(self, parent: &str) -> Self {
        Self::new(format!("{parent}.{}", self.field), self.reason)
    }
}

fn object<'a>(value: &'a Value, field: &str) -> Result<&'a Value, InvalidIntent> {
    match value.get(field) {
        Some(inner @ Value::Object(_)) => Ok(inner),
        Some(_) => Err(InvalidIntent::new(field, "expected an object")),
        None => Err(InvalidIntent::new(field, "missing")),
    }
}

fn string<'a>(value: &'a Value, field: &str) -> Result<&'a str, InvalidIntent> {
    match value.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
        Some(Value::Null) | None => Err(InvalidIntent::new(field, "missing")),
        Some(_) => Err(InvalidIntent::new(field, "expected a non-empty string")),
    }
}

/// Field accessors for the `call_data` object that report full paths.
struct CallData<'a>(&'a Value);

impl CallData<'_> {
    fn err(field: &str, reason: &str) -> InvalidIntent {
        InvalidIntent::new(format!("{INTENT_PATH}.call_data.{field}"), reason)
    }

    fn string(&self, field: &str) -> Result<&str, InvalidIntent> {
        string(self.0, field).map_err(|e| Self::err(field, &e.reason))
    }

    fn parse<T: FromStr>(&self, field: &str, reason: &str) -> Result<T, InvalidIntent> {
        self.string(field)?
            .parse::<T>()
            .map_err(|_| Self::err(field, reason))
    }

    fn address(&self, field: &str) -> Result<Address, InvalidIntent> {
        self.parse(field, "expected an address")
    }

    fn deadline(&self, field: &str) -> Result<DateTime<Utc>, InvalidIntent> {
        parse_deadline(self.string(field)?)
            .map_err(|_| Self::err(field, "expected an ISO-8601 date-time"))
    }

    /// Base-unit quantities arrive either as JSON integers or integer strings.
    fn amount(&self, field: &str) -> Result<U256, InvalidIntent> {
        match self.0.get(field) {
            Some(Value::Number(n)) => n
                .as_u64()
                .map(U256::from)
                .ok_or_else(|| Self::err(field, "expected a non-negative integer")),
            Some(Value::String(_)) => {
                self.parse::<U256>(field, "expected a non-negative integer")
            }
            Some(Value::Null) | None => Err(Self::err(field, "missing")),
            Some(_) => Err(Self::err(field, "expected a non-negative integer")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A complete billing response with the given deadline.
    fn charge_body(deadline: &str) -> Value {
        json!({
            "data": {
                "id": "charge-1",
                "web3_data": {
                    "transfer_intent": {
                        "metadata": {
                            "chain_id": 8453,
                            "contract_address": "0x03059433BCdB6144624cC2443159D9445C32b7a8",
                            "sender": "0x1111111111111111111111111111111111111111"
                        },
                        "call_data": {
                            "recipient_amount": "49500000",
                            "deadline": deadline,
                            "recipient": "0x2222222222222222222222222222222222222222",
                            "recipient_currency": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
                            "refund_destination": "0x1111111111111111111111111111111111111111",
                            "fee_amount": 500000,
                            "id": "0x0123456789abcdef0123456789abcdef",
                            "operator": "0x3333333333333333333333333333333333333333",
                            "signature": "0xdeadbeef",
                            "prefix": "0x1901"
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_parses_complete_intent() {
        let intent = PaymentIntent::from_charge_json(&charge_body("2024-06-01T12:00:00Z")).unwrap();
        assert_eq!(intent.charge_id.as_deref(), Some("charge-1"));
        assert_eq!(intent.recipient_amount, U256::from(49_500_000u64));
        assert_eq!(intent.fee_amount, U256::from(500_000u64));
        assert_eq!(intent.deadline.timestamp(), 1_717_243_200);
        assert_eq!(intent.signature, Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(intent.prefix, Bytes::from(vec![0x19, 0x01]));
        assert_eq!(
            intent.settlement_contract,
            Address::from_str("0x03059433BCdB6144624cC2443159D9445C32b7a8").unwrap()
        );
    }

    #[test]
    fn test_missing_call_data_field() {
        let mut body = charge_body("2024-06-01T12:00:00Z");
        body["data"]["web3_data"]["transfer_intent"]["call_data"]
            .as_object_mut()
            .unwrap()
            .remove("operator");
        let err = PaymentIntent::from_charge_json(&body).unwrap_err();
        assert_eq!(err.field, "data.web3_data.transfer_intent.call_data.operator");
        assert_eq!(err.reason, "missing");
    }

    #[test]
    fn test_missing_envelope() {
        let err = PaymentIntent::from_charge_json(&json!({"data": {}})).unwrap_err();
        assert_eq!(err.field, "data.web3_data");
        let err = PaymentIntent::from_charge_json(&json!({"error": "nope"})).unwrap_err();
        assert_eq!(err.field, "data");
    }

    #[test]
    fn test_rejects_ill_typed_fields() {
        let cases = [
            ("id", json!("0x0123")),
            ("recipient", json!("not-an-address")),
            ("fee_amount", json!(-5)),
            ("recipient_amount", json!(1.5)),
            ("deadline", json!("soon")),
            ("signature", json!(42)),
        ];
        for (field, value) in cases {
            let mut body = charge_body("2024-06-01T12:00:00Z");
            body["data"]["web3_data"]["transfer_intent"]["call_data"][field] = value;
            let err = PaymentIntent::from_charge_json(&body).unwrap_err();
            assert!(err.field.ends_with(field), "{field}: {err}");
        }
    }

    #[test]
    fn test_bad_contract_address() {
        let mut body = charge_body("2024-06-01T12:00:00Z");
        body["data"]["web3_data"]["transfer_intent"]["metadata"]["contract_address"] =
            json!("0x12");
        let err = PaymentIntent::from_charge_json(&body).unwrap_err();
        assert_eq!(
            err.field,
            "data.web3_data.transfer_intent.metadata.contract_address"
        );
    }
}
