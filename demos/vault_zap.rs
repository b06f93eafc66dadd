//! Deposit a token into a yield vault in one settlement.
//!
//! The user approves the token manager once, and the route deposits the
//! pulled tokens into the vault. Shares come back to the user only if at
//! least the quoted amount was minted.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use settlement_engine::chain::state::ChainState;
use settlement_engine::collaborators::calldata::{arg_offset, IVault};
use settlement_engine::collaborators::vault::{SimpleVault, Vault};
use settlement_engine::core::order::{Input, Order, Output};
use settlement_engine::core::step::{Step, StepToken, TrustedRoute};
use settlement_engine::engine::router::OrderRouter;

fn main() {
    println!("╔════════════════════════════════════════╗");
    println!("║  settlement-engine: Vault Zap Example  ║");
    println!("╚════════════════════════════════════════╝\n");

    let owner = Address::repeat_byte(0x0e);
    let user = Address::repeat_byte(0x01);
    let usdc = Address::repeat_byte(0xaa);
    let vault_address = Address::repeat_byte(0x5a);
    let vault = SimpleVault::new(vault_address, usdc);

    let mut chain = ChainState::new();
    let router = OrderRouter::deploy(&mut chain, Address::repeat_byte(0x70), owner, Address::repeat_byte(0x7a))
        .expect("deploy router");
    chain.deploy(vault_address, Box::new(vault.clone()));
    let ledger = chain.ledger_mut();
    // an earlier depositor and some accrued yield: 1.25 USDC per share
    ledger
        .mint(&vault_address, &Address::repeat_byte(0xed), U256::from(1_000_000u64))
        .expect("seed shares");
    ledger
        .mint(&usdc, &vault_address, U256::from(1_250_000u64))
        .expect("seed vault");
    ledger
        .mint(&usdc, &user, U256::from(5_000_000u64))
        .expect("fund user");
    ledger.approve(&usdc, &user, &router.custody(), U256::MAX);

    println!(
        "Price per full share: {}",
        vault.price_per_full_share(chain.ledger())
    );

    let order = Order::new(user)
        .with_input(Input::new(usdc, U256::from(5_000_000u64)))
        .with_output(Output::new(vault.share_token(), U256::from(4_000_000u64)));
    let route = TrustedRoute::from_quote(vec![Step::new(
        vault_address,
        IVault::depositCall { amount: U256::ZERO }.abi_encode(),
    )
    .with_token(StepToken::patched(usdc, arg_offset(0)))]);

    match router.execute_order(&mut chain, user, U256::ZERO, &order, &route) {
        Ok(receipt) => {
            println!("{}", receipt);
            println!(
                "User shares: {}",
                vault.balance_of(chain.ledger(), &user)
            );
        }
        Err(e) => println!("Settlement aborted ({}): {}", e.kind(), e),
    }
}
