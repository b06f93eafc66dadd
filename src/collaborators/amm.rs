use crate::chain::contract::{CallContext, Contract, Revert};
use crate::collaborators::calldata::{arg_offset, IPool};
use crate::core::ledger::TokenLedger;
use crate::core::token::is_native;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolValue};
use log::debug;

/// Byte offset of `amountIn` in swap calldata, the slot a route patches.
pub const SWAP_AMOUNT_OFFSET: usize = arg_offset(1);

const BPS: u64 = 10_000;

/// An `x * y = k` pool between two tokens, either of which may be native.
///
/// Reserves are the pool's own ledger balances. Token inputs are pulled
/// with an allowance; native input arrives as the call value.
#[derive(Debug, Clone)]
pub struct ConstantProductPool {
    address: Address,
    token0: Address,
    token1: Address,
    fee_bps: u64,
}

impl ConstantProductPool {
    pub fn new(address: Address, token0: Address, token1: Address, fee_bps: u64) -> Self {
        Self {
            address,
            token0,
            token1,
            fee_bps: fee_bps.min(BPS),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn tokens(&self) -> (Address, Address) {
        (self.token0, self.token1)
    }

    fn other(&self, token: &Address) -> Option<Address> {
        if *token == self.token0 {
            Some(self.token1)
        } else if *token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }

    pub fn reserve(&self, ledger: &TokenLedger, token: &Address) -> U256 {
        ledger.balance_of(token, &self.address)
    }

    /// Output for `amount_in` of `token_in` against the given reserves.
    pub fn amount_out(&self, amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
        let with_fee = amount_in.saturating_mul(U256::from(BPS - self.fee_bps));
        let numerator = with_fee.saturating_mul(reserve_out);
        let denominator = reserve_in
            .saturating_mul(U256::from(BPS))
            .saturating_add(with_fee);
        if denominator == U256::ZERO {
            return U256::ZERO;
        }
        numerator / denominator
    }

    /// What a swap of `amount_in` of `token_in` would pay at current
    /// reserves. `None` if the pool does not trade `token_in`.
    pub fn quote(&self, ledger: &TokenLedger, token_in: &Address, amount_in: U256) -> Option<U256> {
        let token_out = self.other(token_in)?;
        Some(self.amount_out(
            amount_in,
            self.reserve(ledger, token_in),
            self.reserve(ledger, &token_out),
        ))
    }

    /// Calldata for a swap. `amount_in` sits at [`SWAP_AMOUNT_OFFSET`].
    pub fn swap_calldata(token_in: Address, amount_in: U256, min_amount_out: U256, recipient: Address) -> Vec<u8> {
        IPool::swapCall {
            tokenIn: token_in,
            amountIn: amount_in,
            minAmountOut: min_amount_out,
            recipient,
        }
        .abi_encode()
    }

    fn swap(
        &mut self,
        ctx: &mut CallContext<'_>,
        token_in: Address,
        amount_in: U256,
        min_amount_out: U256,
        recipient: Address,
    ) -> Result<U256, Revert> {
        let token_out = self
            .other(&token_in)
            .ok_or_else(|| Revert::new(format!("pool does not trade {}", token_in)))?;
        if amount_in == U256::ZERO {
            return Err(Revert::new("zero input"));
        }

        let reserve_in = if is_native(&token_in) {
            if ctx.value != amount_in {
                return Err(Revert::new(format!(
                    "native input {} does not match value {}",
                    amount_in, ctx.value
                )));
            }
            // value is already credited to the pool
            self.reserve(ctx.ledger, &token_in) - amount_in
        } else {
            if ctx.value > U256::ZERO {
                return Err(Revert::new("unexpected native value"));
            }
            let reserve = self.reserve(ctx.ledger, &token_in);
            ctx.ledger
                .transfer_from(&token_in, &self.address, &ctx.sender, &self.address, amount_in)?;
            reserve
        };

        let reserve_out = self.reserve(ctx.ledger, &token_out);
        let out = self.amount_out(amount_in, reserve_in, reserve_out);
        if out == U256::ZERO || out < min_amount_out {
            return Err(Revert::new(format!(
                "insufficient output {} (min {})",
                out, min_amount_out
            )));
        }
        ctx.ledger
            .transfer(&token_out, &self.address, &recipient, out)?;
        debug!(
            "pool {} swapped {} of {} for {} of {}",
            self.address, amount_in, token_in, out, token_out
        );
        Ok(out)
    }
}

impl Contract for ConstantProductPool {
    fn call(&mut self, ctx: &mut CallContext<'_>, data: &[u8]) -> Result<Bytes, Revert> {
        let call = IPool::swapCall::abi_decode(data)
            .map_err(|e| Revert::new(format!("unrecognized pool call: {}", e)))?;
        let out = self.swap(ctx, call.tokenIn, call.amountIn, call.minAmountOut, call.recipient)?;
        Ok(Bytes::from(out.abi_encode()))
    }

    fn clone_box(&self) -> Box<dyn Contract> {
        Box::new(self.clone())
    }
}
