use crate::core::token::{amount_serde, is_native};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A token the user hands over for settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub token: Address,
    #[serde(with = "amount_serde")]
    pub amount: U256,
}

impl Input {
    pub fn new(token: Address, amount: U256) -> Self {
        Self { token, amount }
    }
}

/// A token the user expects back, with the least acceptable amount.
///
/// A zero minimum is a catch-all: whatever custody holds of the token is
/// returned, including nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub token: Address,
    #[serde(with = "amount_serde")]
    pub min_output_amount: U256,
}

impl Output {
    pub fn new(token: Address, min_output_amount: U256) -> Self {
        Self {
            token,
            min_output_amount,
        }
    }

    /// An output that only collects leftovers.
    pub fn refund(token: Address) -> Self {
        Self::new(token, U256::ZERO)
    }
}

/// When the relay call runs relative to the rest of the settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayTiming {
    /// Before the first step, right after inputs are pulled.
    BeforeRoute,
    /// After outputs have been forwarded to the recipient.
    #[default]
    AfterSettlement,
}

/// One auxiliary call attached to an order, typically a bridge hook.
///
/// A relay whose target is the zero address is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Relay {
    pub target: Address,
    #[serde(with = "amount_serde", default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub timing: RelayTiming,
}

impl Relay {
    pub fn new(target: Address, value: U256, data: Bytes) -> Self {
        Self {
            target,
            value,
            data,
            timing: RelayTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: RelayTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.target != Address::ZERO
    }
}

/// A caller's declaration of what goes in, what must come out and who
/// receives it.
///
/// Orders are built off-chain, settled once and never stored.
///
/// # Examples
///
/// ```
/// use settlement_engine::core::order::{Input, Order, Output};
/// use settlement_engine::core::token::NATIVE;
/// use alloy_primitives::{Address, U256};
///
/// let user = Address::repeat_byte(0x01);
/// let token_x = Address::repeat_byte(0x42);
/// let order = Order::new(user)
///     .with_input(Input::new(NATIVE, U256::from(1_000_000_000_000_000u64)))
///     .with_output(Output::new(token_x, U256::from(900u64)));
///
/// assert_eq!(order.recipient, user);
/// assert_eq!(order.native_input_total(), Some(U256::from(1_000_000_000_000_000u64)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub relay: Relay,
    pub user: Address,
    pub recipient: Address,
}

impl Order {
    /// An empty order for `user`, paying out to `user`.
    pub fn new(user: Address) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            relay: Relay::default(),
            user,
            recipient: user,
        }
    }

    pub fn with_input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_relay(mut self, relay: Relay) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_recipient(mut self, recipient: Address) -> Self {
        self.recipient = recipient;
        self
    }

    /// Sum of native-currency inputs, or `None` on overflow.
    pub fn native_input_total(&self) -> Option<U256> {
        self.inputs
            .iter()
            .filter(|i| is_native(&i.token))
            .try_fold(U256::ZERO, |acc, i| acc.checked_add(i.amount))
    }

    /// Keccak-256 over a packed encoding of every field.
    ///
    /// Two orders share a fingerprint only if they are field-for-field
    /// identical, which makes it usable as an audit key for settlements.
    pub fn fingerprint(&self) -> B256 {
        let mut buf = Vec::with_capacity(
            64 + self.inputs.len() * 52 + self.outputs.len() * 52 + self.relay.data.len() + 93,
        );
        buf.extend_from_slice(&(self.inputs.len() as u64).to_be_bytes());
        for input in &self.inputs {
            buf.extend_from_slice(input.token.as_slice());
            buf.extend_from_slice(&input.amount.to_be_bytes::<32>());
        }
        buf.extend_from_slice(&(self.outputs.len() as u64).to_be_bytes());
        for output in &self.outputs {
            buf.extend_from_slice(output.token.as_slice());
            buf.extend_from_slice(&output.min_output_amount.to_be_bytes::<32>());
        }
        buf.extend_from_slice(self.relay.target.as_slice());
        buf.extend_from_slice(&self.relay.value.to_be_bytes::<32>());
        buf.extend_from_slice(&(self.relay.data.len() as u64).to_be_bytes());
        buf.extend_from_slice(&self.relay.data);
        buf.push(match self.relay.timing {
            RelayTiming::BeforeRoute => 0,
            RelayTiming::AfterSettlement => 1,
        });
        buf.extend_from_slice(self.user.as_slice());
        buf.extend_from_slice(self.recipient.as_slice());
        keccak256(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::token::NATIVE;

    fn sample_order() -> Order {
        Order::new(Address::repeat_byte(1))
            .with_input(Input::new(Address::repeat_byte(0xa), U256::from(5_000_000u64)))
            .with_output(Output::new(Address::repeat_byte(0xb), U256::from(4_000_000u64)))
            .with_output(Output::refund(Address::repeat_byte(0xa)))
    }

    #[test]
    fn test_order_defaults_recipient_to_user() {
        let order = sample_order();
        assert_eq!(order.recipient, order.user);
        assert!(!order.relay.is_enabled());
    }

    #[test]
    fn test_native_input_total_sums_only_native() {
        let order = sample_order()
            .with_input(Input::new(NATIVE, U256::from(7u64)))
            .with_input(Input::new(NATIVE, U256::from(3u64)));
        assert_eq!(order.native_input_total(), Some(U256::from(10u64)));
    }

    #[test]
    fn test_native_input_total_overflow() {
        let order = Order::new(Address::repeat_byte(1))
            .with_input(Input::new(NATIVE, U256::MAX))
            .with_input(Input::new(NATIVE, U256::from(1u64)));
        assert_eq!(order.native_input_total(), None);
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(sample_order().fingerprint(), sample_order().fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_minimum() {
        let a = sample_order();
        let mut b = sample_order();
        b.outputs[0].min_output_amount = U256::from(4_000_001u64);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_order_json_uses_decimal_amounts() {
        let json = serde_json::to_value(sample_order()).unwrap();
        assert_eq!(json["inputs"][0]["amount"], "5000000");
        assert_eq!(json["outputs"][1]["min_output_amount"], "0");
        assert_eq!(json["relay"]["timing"], "after_settlement");
    }

    #[test]
    fn test_order_json_without_relay() {
        let json = format!(
            r#"{{"inputs":[{{"token":"{}","amount":"10"}}],"outputs":[],"user":"{}","recipient":"{}"}}"#,
            NATIVE,
            Address::repeat_byte(1),
            Address::repeat_byte(2)
        );
        let order: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order.inputs[0].amount, U256::from(10u64));
        assert!(!order.relay.is_enabled());
    }
}
