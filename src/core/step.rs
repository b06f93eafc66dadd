use crate::core::token::amount_serde;
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Where, if anywhere, a step token's live custody balance is written into
/// the step payload.
///
/// On the wire this is a signed integer: any negative value means "do not
/// patch", anything else is a byte offset into the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum PatchIndex {
    #[default]
    None,
    At(usize),
}

impl PatchIndex {
    pub fn offset(&self) -> Option<usize> {
        match self {
            PatchIndex::None => None,
            PatchIndex::At(offset) => Some(*offset),
        }
    }
}

impl From<i64> for PatchIndex {
    fn from(raw: i64) -> Self {
        match usize::try_from(raw) {
            Ok(offset) => PatchIndex::At(offset),
            Err(_) => PatchIndex::None,
        }
    }
}

impl From<PatchIndex> for i64 {
    fn from(index: PatchIndex) -> Self {
        match index {
            PatchIndex::None => -1,
            PatchIndex::At(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
        }
    }
}

/// A token a step works with.
///
/// Every listed token is made available to the step target before the call;
/// a real `index` additionally injects its balance into the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepToken {
    pub token: Address,
    #[serde(default)]
    pub index: PatchIndex,
}

impl StepToken {
    pub fn new(token: Address) -> Self {
        Self {
            token,
            index: PatchIndex::None,
        }
    }

    pub fn patched(token: Address, offset: usize) -> Self {
        Self {
            token,
            index: PatchIndex::At(offset),
        }
    }
}

/// One external call of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub target: Address,
    #[serde(with = "amount_serde", default)]
    pub value: U256,
    pub data: Bytes,
    #[serde(default)]
    pub tokens: Vec<StepToken>,
}

impl Step {
    pub fn new(target: Address, data: impl Into<Bytes>) -> Self {
        Self {
            target,
            value: U256::ZERO,
            data: data.into(),
            tokens: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_token(mut self, token: StepToken) -> Self {
        self.tokens.push(token);
        self
    }
}

/// An ordered list of steps. Order matters: later steps consume what earlier
/// steps produced.
pub type Route = Vec<Step>;

/// A route vouched for by the quoting service that produced it.
///
/// The engine executes whatever targets and payloads a trusted route holds
/// and only checks the balances that come out. Wrapping a route in this type
/// is the caller's explicit statement that it trusts the source; nothing is
/// validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrustedRoute(Route);

impl TrustedRoute {
    pub fn from_quote(steps: Route) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every token the route lists, in first-seen order.
    pub fn tokens(&self) -> Vec<Address> {
        let mut seen = Vec::new();
        for token in self.0.iter().flat_map(|s| s.tokens.iter().map(|t| t.token)) {
            if !seen.contains(&token) {
                seen.push(token);
            }
        }
        seen
    }
}

impl From<TrustedRoute> for Route {
    fn from(route: TrustedRoute) -> Self {
        route.0
    }
}
