use crate::chain::contract::{CallContext, Contract, Revert};
use crate::collaborators::calldata::IVault::IVaultCalls;
use crate::collaborators::fee_config::FeeCategory;
use crate::core::ledger::TokenLedger;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolInterface, SolValue};
use log::debug;

/// Price scale of [`Vault::price_per_full_share`].
pub const PRICE_SCALE: u64 = 1_000_000_000_000_000_000;

/// A yield vault that takes one token (`want`) and issues shares.
///
/// Shares are themselves a token whose address is the vault's address.
pub trait Vault {
    fn want(&self) -> Address;

    /// Take `amount` of `want` from `account` (which must have approved the
    /// vault) and mint shares to it. Returns the shares minted.
    fn deposit(&mut self, ledger: &mut TokenLedger, account: &Address, amount: U256) -> Result<U256, Revert>;

    /// Burn `shares` of `account` and pay out the matching `want`, less any
    /// withdrawal fee. Returns the amount paid to `account`.
    fn withdraw(&mut self, ledger: &mut TokenLedger, account: &Address, shares: U256) -> Result<U256, Revert>;

    fn balance_of(&self, ledger: &TokenLedger, account: &Address) -> U256;

    /// `want` per share, scaled by 1e18.
    fn price_per_full_share(&self, ledger: &TokenLedger) -> U256;
}

/// A vault whose share price only moves when `want` is sent to it directly.
#[derive(Debug, Clone)]
pub struct SimpleVault {
    address: Address,
    want: Address,
    withdrawal_fee: Option<(FeeCategory, Address)>,
}

impl SimpleVault {
    pub fn new(address: Address, want: Address) -> Self {
        Self {
            address,
            want,
            withdrawal_fee: None,
        }
    }

    /// Charge `category` on every withdrawal, paid to `recipient`.
    pub fn with_withdrawal_fee(mut self, category: FeeCategory, recipient: Address) -> Self {
        self.withdrawal_fee = Some((category, recipient));
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The share token.
    pub fn share_token(&self) -> Address {
        self.address
    }

    pub fn total_shares(&self, ledger: &TokenLedger) -> U256 {
        ledger.total_supply(&self.address)
    }

    /// `want` held by the vault.
    pub fn assets(&self, ledger: &TokenLedger) -> U256 {
        ledger.balance_of(&self.want, &self.address)
    }

    /// Shares `amount` of `want` would mint right now.
    pub fn preview_deposit(&self, ledger: &TokenLedger, amount: U256) -> U256 {
        let supply = self.total_shares(ledger);
        let assets = self.assets(ledger);
        if supply == U256::ZERO || assets == U256::ZERO {
            return amount;
        }
        amount.saturating_mul(supply) / assets
    }
}

impl Vault for SimpleVault {
    fn want(&self) -> Address {
        self.want
    }

    fn deposit(&mut self, ledger: &mut TokenLedger, account: &Address, amount: U256) -> Result<U256, Revert> {
        let shares = self.preview_deposit(ledger, amount);
        if shares == U256::ZERO {
            return Err(Revert::new("deposit mints no shares"));
        }
        ledger.transfer_from(&self.want, &self.address, account, &self.address, amount)?;
        ledger.mint(&self.address, account, shares)?;
        debug!("vault {} minted {} shares to {}", self.address, shares, account);
        Ok(shares)
    }

    fn withdraw(&mut self, ledger: &mut TokenLedger, account: &Address, shares: U256) -> Result<U256, Revert> {
        let supply = self.total_shares(ledger);
        if shares == U256::ZERO || supply == U256::ZERO {
            return Err(Revert::new("nothing to withdraw"));
        }
        let owed = self.assets(ledger).saturating_mul(shares) / supply;
        ledger.burn(&self.address, account, shares)?;

        let fee = match &self.withdrawal_fee {
            Some((category, recipient)) => {
                let fee = category.fee_on(owed);
                if fee > U256::ZERO {
                    ledger.transfer(&self.want, &self.address, recipient, fee)?;
                }
                fee
            }
            None => U256::ZERO,
        };
        let paid = owed - fee;
        ledger.transfer(&self.want, &self.address, account, paid)?;
        debug!("vault {} paid {} (fee {}) to {}", self.address, paid, fee, account);
        Ok(paid)
    }

    fn balance_of(&self, ledger: &TokenLedger, account: &Address) -> U256 {
        ledger.balance_of(&self.address, account)
    }

    fn price_per_full_share(&self, ledger: &TokenLedger) -> U256 {
        let supply = self.total_shares(ledger);
        if supply == U256::ZERO {
            return U256::from(PRICE_SCALE);
        }
        self.assets(ledger).saturating_mul(U256::from(PRICE_SCALE)) / supply
    }
}

impl Contract for SimpleVault {
    fn call(&mut self, ctx: &mut CallContext<'_>, data: &[u8]) -> Result<Bytes, Revert> {
        if ctx.value > U256::ZERO {
            return Err(Revert::new("vault does not take native currency"));
        }
        let call = IVaultCalls::abi_decode(data)
            .map_err(|e| Revert::new(format!("unrecognized vault call: {}", e)))?;

        let out = match call {
            IVaultCalls::deposit(c) => self.deposit(ctx.ledger, &ctx.sender, c.amount)?,
            IVaultCalls::depositAll(_) => {
                let amount = ctx.ledger.balance_of(&self.want, &ctx.sender);
                self.deposit(ctx.ledger, &ctx.sender, amount)?
            }
            IVaultCalls::withdraw(c) => self.withdraw(ctx.ledger, &ctx.sender, c.shares)?,
            IVaultCalls::withdrawAll(_) => {
                let shares = self.balance_of(ctx.ledger, &ctx.sender);
                self.withdraw(ctx.ledger, &ctx.sender, shares)?
            }
            IVaultCalls::balanceOf(c) => self.balance_of(ctx.ledger, &c.account),
            IVaultCalls::getPricePerFullShare(_) => self.price_per_full_share(ctx.ledger),
        };
        Ok(Bytes::from(out.abi_encode()))
    }

    fn clone_box(&self) -> Box<dyn Contract> {
        Box::new(self.clone())
    }
}
