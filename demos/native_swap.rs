//! Swap native currency for a token through a constant-product pool.
//!
//! Shows the amount injection at work: the route is built with a zero
//! `amountIn` and the engine writes the live custody balance into it.

use alloy_primitives::{Address, U256};
use settlement_engine::chain::state::ChainState;
use settlement_engine::collaborators::amm::{ConstantProductPool, SWAP_AMOUNT_OFFSET};
use settlement_engine::core::order::{Input, Order, Output};
use settlement_engine::core::step::{Step, StepToken, TrustedRoute};
use settlement_engine::core::token::NATIVE;
use settlement_engine::engine::router::OrderRouter;

const ONE_FINNEY: u64 = 1_000_000_000_000_000;

fn main() {
    println!("╔══════════════════════════════════════════╗");
    println!("║  settlement-engine: Native Swap Example  ║");
    println!("╚══════════════════════════════════════════╝\n");

    let owner = Address::repeat_byte(0x0e);
    let user = Address::repeat_byte(0x01);
    let token_x = Address::repeat_byte(0x42);
    let pool = Address::repeat_byte(0xb0);

    let mut chain = ChainState::new();
    let router = OrderRouter::deploy(&mut chain, Address::repeat_byte(0x70), owner, Address::repeat_byte(0x7a))
        .expect("deploy router");
    chain.deploy(pool, Box::new(ConstantProductPool::new(pool, NATIVE, token_x, 30)));
    let ledger = chain.ledger_mut();
    ledger
        .mint(&NATIVE, &pool, U256::from(1_000u64) * U256::from(ONE_FINNEY))
        .expect("seed pool");
    ledger
        .mint(&token_x, &pool, U256::from(1_000_000_000u64))
        .expect("seed pool");
    ledger
        .mint(&NATIVE, &user, U256::from(ONE_FINNEY))
        .expect("fund user");

    let order = Order::new(user)
        .with_input(Input::new(NATIVE, U256::from(ONE_FINNEY)))
        .with_output(Output::new(token_x, U256::from(900u64)));
    let data = ConstantProductPool::swap_calldata(NATIVE, U256::ZERO, U256::ZERO, router.custody());
    let route = TrustedRoute::from_quote(vec![
        Step::new(pool, data).with_token(StepToken::patched(NATIVE, SWAP_AMOUNT_OFFSET))
    ]);

    println!("━━━ Order ━━━\n");
    println!("  In:  {} native", ONE_FINNEY);
    println!("  Out: at least 900 of {}", token_x);
    println!("  Fingerprint: {}\n", order.fingerprint());

    match router.execute_order(&mut chain, user, U256::from(ONE_FINNEY), &order, &route) {
        Ok(receipt) => {
            println!("{}", receipt);
            println!("User now holds {} of {}", chain.balance_of(&token_x, &user), token_x);
        }
        Err(e) => println!("Settlement aborted: {}", e),
    }

    println!("\n━━━ Same order, unreachable minimum ━━━\n");
    let greedy = order.clone().with_output(Output::new(token_x, U256::from(10_000_000u64)));
    chain
        .ledger_mut()
        .mint(&NATIVE, &user, U256::from(ONE_FINNEY))
        .expect("fund user");
    match router.execute_order(&mut chain, user, U256::from(ONE_FINNEY), &greedy, &route) {
        Ok(_) => println!("Unexpectedly settled"),
        Err(e) => println!("Aborted as expected ({}): {}", e.kind(), e),
    }
}
