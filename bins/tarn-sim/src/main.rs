//! Tarn scenario runner: drives the escrow ledger through a scripted
//! sequence of lifecycle operations and prints voting-power traces.
//!
//! Scenarios are JSON files listing funded users and week-stamped
//! operations. With no scenario file, a built-in demo runs: two users
//! lock, delegate, and one liquidates halfway.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use tarn_core::constants::{COIN, DEFAULT_PENALTY_BPS, WEEK};
use tarn_core::traits::VotingPowerSource;
use tarn_core::types::{Address, LockId, Moment};
use tarn_escrow::{Escrow, EscrowConfig, MemoryToken};

/// Simulation starts on this week boundary.
const START: u64 = 1000 * WEEK;

/// CLI arguments for the scenario runner.
#[derive(Debug, Parser)]
#[command(name = "tarn-sim")]
#[command(about = "Tarn voting-escrow scenario runner", long_about = None)]
struct Args {
    /// Path to a JSON scenario file. Omit to run the built-in demo.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// A funded account, addressed by a single seed byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserSpec {
    seed: u8,
    /// Starting balance in whole TARN.
    balance: u64,
}

/// One scripted operation at a given week offset from the start.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Step {
    week: u64,
    #[serde(flatten)]
    action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Action {
    Create { user: u8, amount: u64, weeks: u64 },
    IncreaseAmount { user: u8, lock: u64, amount: u64 },
    Extend { user: u8, lock: u64, weeks: u64 },
    Withdraw { user: u8, lock: u64 },
    Merge { user: u8, from: u64, to: u64 },
    Split { user: u8, lock: u64, extracted: u64 },
    Liquidate { user: u8, lock: u64 },
    Delegate { user: u8, to: u8 },
    EnableLiquidations,
    Checkpoint,
    Report { delegatees: Vec<u8> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Scenario {
    users: Vec<UserSpec>,
    steps: Vec<Step>,
}

fn addr(seed: u8) -> Address {
    Address([seed; 20])
}

/// Admin/treasury/voter accounts used by every scenario.
fn config() -> EscrowConfig {
    EscrowConfig {
        vault: addr(0xEE),
        treasury: addr(0xDD),
        voter: addr(0xCC),
        admin: addr(0xAA),
        penalty_bps: DEFAULT_PENALTY_BPS,
    }
}

/// Blocks tick every 10 seconds in simulations.
fn moment(timestamp: u64) -> Moment {
    Moment::new(timestamp, timestamp / 10)
}

/// Two users lock for different horizons; one delegates, one exits early.
fn demo_scenario() -> Scenario {
    Scenario {
        users: vec![
            UserSpec { seed: 1, balance: 10_000 },
            UserSpec { seed: 2, balance: 10_000 },
        ],
        steps: vec![
            Step { week: 0, action: Action::EnableLiquidations },
            Step { week: 0, action: Action::Create { user: 1, amount: 1000, weeks: 208 } },
            Step { week: 0, action: Action::Create { user: 2, amount: 4000, weeks: 104 } },
            Step { week: 1, action: Action::Delegate { user: 2, to: 1 } },
            Step { week: 26, action: Action::Report { delegatees: vec![1, 2] } },
            Step { week: 52, action: Action::Liquidate { user: 1, lock: 1 } },
            Step { week: 52, action: Action::Report { delegatees: vec![1, 2] } },
            Step { week: 104, action: Action::Report { delegatees: vec![1, 2] } },
        ],
    }
}

fn run(scenario: &Scenario) -> Result<()> {
    let mut token = MemoryToken::new();
    for user in &scenario.users {
        token
            .mint(addr(user.seed), user.balance * COIN)
            .context("funding user")?;
    }
    let mut esc = Escrow::new(config(), token, moment(START));

    for step in &scenario.steps {
        let now = START + step.week * WEEK;
        let at = moment(now);
        match &step.action {
            Action::Create { user, amount, weeks } => {
                let id = esc
                    .create_lock(addr(*user), amount * COIN, now + weeks * WEEK, at)
                    .with_context(|| format!("create at week {}", step.week))?;
                info!(week = step.week, user, %id, amount, weeks, "created lock");
            }
            Action::IncreaseAmount { user, lock, amount } => {
                esc.increase_amount(addr(*user), LockId(*lock), amount * COIN, at)
                    .with_context(|| format!("top-up at week {}", step.week))?;
            }
            Action::Extend { user, lock, weeks } => {
                esc.increase_unlock_time(addr(*user), LockId(*lock), now + weeks * WEEK, at)
                    .with_context(|| format!("extend at week {}", step.week))?;
            }
            Action::Withdraw { user, lock } => {
                let paid = esc
                    .withdraw(addr(*user), LockId(*lock), at)
                    .with_context(|| format!("withdraw at week {}", step.week))?;
                info!(week = step.week, user, lock, paid = paid / COIN, "withdrew");
            }
            Action::Merge { user, from, to } => {
                esc.merge(addr(*user), LockId(*from), LockId(*to), at)
                    .with_context(|| format!("merge at week {}", step.week))?;
            }
            Action::Split { user, lock, extracted } => {
                let sibling = esc
                    .split(addr(*user), LockId(*lock), extracted * COIN, at)
                    .with_context(|| format!("split at week {}", step.week))?;
                info!(week = step.week, user, lock, %sibling, "split lock");
            }
            Action::Liquidate { user, lock } => {
                let (paid, penalty) = esc
                    .liquidate(addr(*user), LockId(*lock), at)
                    .with_context(|| format!("liquidate at week {}", step.week))?;
                info!(
                    week = step.week,
                    user,
                    lock,
                    paid = paid / COIN,
                    penalty = penalty / COIN,
                    "liquidated"
                );
            }
            Action::Delegate { user, to } => {
                esc.delegate(addr(*user), addr(*to), at)
                    .with_context(|| format!("delegate at week {}", step.week))?;
            }
            Action::EnableLiquidations => {
                esc.enable_liquidations(addr(0xAA))
                    .context("enable liquidations")?;
            }
            Action::Checkpoint => {
                esc.checkpoint(at)
                    .with_context(|| format!("checkpoint at week {}", step.week))?;
            }
            Action::Report { delegatees } => {
                esc.checkpoint(at)
                    .with_context(|| format!("checkpoint at week {}", step.week))?;
                for delegatee in delegatees {
                    let power = esc.current_voting_power(&addr(*delegatee))?;
                    println!(
                        "week {:>4} | delegatee {:>3} | voting power {:>14}",
                        step.week,
                        delegatee,
                        format_tarn(power)
                    );
                }
                let total = esc.aggregate_voting_power_at(now)?;
                println!(
                    "week {:>4} | aggregate      | voting power {:>14}",
                    step.week,
                    format_tarn(total)
                );
            }
        }
    }

    info!(
        locked = esc.total_locked_supply() / COIN,
        "simulation complete"
    );
    Ok(())
}

/// Render grains as whole TARN with two decimals.
fn format_tarn(grains: u64) -> String {
    format!("{}.{:02} TARN", grains / COIN, grains % COIN / (COIN / 100))
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    info!("tarn-sim v{}", env!("CARGO_PKG_VERSION"));

    let scenario = match &args.scenario {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading scenario {}", path.display()))?;
            serde_json::from_str(&raw).context("parsing scenario JSON")?
        }
        None => {
            info!("no scenario file given; running the built-in demo");
            demo_scenario()
        }
    };

    run(&scenario)
}
