//! settlement-engine CLI
//!
//! Run settlement scenarios from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Settle the order described by a scenario file
//! settlement-engine run --input scenario.json
//!
//! # Output the receipt as JSON
//! settlement-engine run --input scenario.json --format json
//!
//! # Generate a random multi-hop swap scenario
//! settlement-engine generate --steps 4 --output scenario.json
//!
//! # Print a function selector
//! settlement-engine selector "deposit(uint256)"
//! ```

use settlement_engine::collaborators::calldata::selector_hex;
use settlement_engine::simulation::scenario::{Scenario, ScenarioError};
use settlement_engine::simulation::stress_test::{generate_random_scenario, ScenarioConfig};
use std::collections::BTreeMap;
use std::fs;
use std::process;

fn print_usage() {
    eprintln!(
        r#"settlement-engine: atomic order settlement over untrusted call routes

USAGE:
    settlement-engine <COMMAND> [OPTIONS]

COMMANDS:
    run         Settle the order of a scenario file
    generate    Generate a random swap-chain scenario (for testing)
    selector    Print the 4-byte selector of a function signature
    help        Show this message

OPTIONS (run):
    --input <FILE>      Path to JSON scenario file
    --format <FORMAT>   Output format: text (default) or json

OPTIONS (generate):
    --steps <N>         Number of swap hops (default: 3)
    --native            Start the chain from native currency
    --output <FILE>     Write to file instead of stdout

EXAMPLES:
    settlement-engine run --input scenario.json
    settlement-engine run --input scenario.json --format json
    settlement-engine generate --steps 5 --output scenario.json
    settlement-engine selector "depositAll()"

Set RUST_LOG=debug to trace every settlement phase."#
    );
}

/// JSON output schema for a settled scenario.
#[derive(serde::Serialize)]
struct RunOutput {
    receipt: settlement_engine::engine::router::SettlementReceipt,
    recipient_holdings: BTreeMap<String, String>,
    events: Vec<settlement_engine::core::events::Event>,
}

fn load_scenario(path: &str) -> Scenario {
    let content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading file '{}': {}", path, e);
        process::exit(1);
    });

    Scenario::from_json(&content).unwrap_or_else(|e| {
        eprintln!("Error parsing scenario: {}", e);
        eprintln!("Generate a valid example with: settlement-engine generate");
        process::exit(1);
    })
}

fn cmd_run(args: &[String]) {
    let mut input_path = None;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--input requires a file path");
                    process::exit(1);
                }));
            }
            "--format" => {
                i += 1;
                format = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--format requires 'text' or 'json'");
                    process::exit(1);
                });
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| {
        eprintln!("Error: --input <FILE> is required");
        process::exit(1);
    });

    let scenario = load_scenario(&path);
    let outcome = match scenario.run() {
        Ok(outcome) => outcome,
        Err(ScenarioError::Settlement(err)) => {
            eprintln!("Settlement aborted ({}): {}", err.kind(), err);
            process::exit(1);
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    };

    let holdings: BTreeMap<String, String> = outcome
        .recipient_holdings()
        .into_iter()
        .map(|(token, amount)| (token.to_string(), amount.to_string()))
        .collect();

    if format == "json" {
        let output = RunOutput {
            receipt: outcome.receipt.clone(),
            recipient_holdings: holdings,
            events: outcome.chain.events().to_vec(),
        };
        let json = serde_json::to_string_pretty(&output).unwrap_or_else(|e| {
            eprintln!("Error serializing receipt: {}", e);
            process::exit(1);
        });
        println!("{}", json);
    } else {
        println!("{}", outcome.receipt);
        println!("Recipient holdings:");
        for (token, amount) in &holdings {
            println!("  {} {}", amount, token);
        }
        println!("\nEvents:");
        for event in outcome.chain.events() {
            println!("  {}", event.name());
        }
    }
}

fn cmd_generate(args: &[String]) {
    let mut config = ScenarioConfig::default();
    let mut output_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--steps" => {
                i += 1;
                config.steps = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        eprintln!("--steps requires a number");
                        process::exit(1);
                    });
            }
            "--native" => config.native_input = true,
            "--output" => {
                i += 1;
                output_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--output requires a file path");
                    process::exit(1);
                }));
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let scenario = generate_random_scenario(&config);
    let json = scenario.to_json().unwrap_or_else(|e| {
        eprintln!("Error serializing scenario: {}", e);
        process::exit(1);
    });

    if let Some(path) = output_path {
        fs::write(&path, &json).unwrap_or_else(|e| {
            eprintln!("Error writing to '{}': {}", path, e);
            process::exit(1);
        });
        eprintln!(
            "Generated {}-step scenario → {}",
            scenario.route.len(),
            path
        );
    } else {
        println!("{}", json);
    }
}

fn cmd_selector(args: &[String]) {
    let signature = args.first().unwrap_or_else(|| {
        eprintln!("selector requires a function signature, e.g. \"deposit(uint256)\"");
        process::exit(1);
    });
    println!("{}", selector_hex(signature));
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "run" => cmd_run(rest),
        "generate" => cmd_generate(rest),
        "selector" => cmd_selector(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
