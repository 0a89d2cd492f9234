use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing_subscriber::prelude::*;

use ringstake::chain::{Clock, ManualClock, SystemClock};
use ringstake::scenario::{measure_ingestion, AddTxScenario, BenchConfig, Harness};
use ringstake::stats::{IngestStats, StatsAccumulator};
use ringstake::COIN;

#[derive(Parser, Debug)]
#[clap(version)]
pub struct Cli {
    /// path to config file, defaults apply when omitted
    #[clap(long, value_parser)]
    config_path: Option<PathBuf>,

    /// only run scenarios whose label contains this
    #[clap(long, value_parser)]
    filter: Option<String>,

    /// stake against wall-clock time instead of a simulated clock
    #[clap(long, action)]
    wall_clock: bool,
}

#[tokio::main]
async fn main() {
    let result = _main().await;
    result.unwrap();
}

async fn _main() -> anyhow::Result<()> {
    // Start logging setup block
    let fmt_layer = tracing_subscriber::fmt::layer().with_test_writer();

    tracing_subscriber::registry().with(fmt_layer).init();

    let Cli {
        config_path,
        filter,
        wall_clock,
    } = Cli::parse();

    let config = match config_path {
        Some(config_path) => {
            tracing::info!("Config file {:?}", config_path);
            let file = File::open(&config_path).with_context(|| {
                format!(
                    "Cannot read config file {path}",
                    path = config_path.display()
                )
            })?;
            serde_yaml::from_reader(file).with_context(|| {
                format!(
                    "Cannot read config file {path}",
                    path = config_path.display()
                )
            })?
        }
        None => BenchConfig::default(),
    };
    config
        .engine
        .validate()
        .map_err(|err| anyhow!("{}", err.reason()))?;

    let scenarios: Vec<AddTxScenario> = AddTxScenario::all()
        .filter(|scenario| {
            filter
                .as_ref()
                .map_or(true, |f| scenario.to_string().contains(f.as_str()))
        })
        .collect();

    let mut stats = StatsAccumulator::<IngestStats>::default();
    for scenario in scenarios {
        let config = config.clone();
        // staking sleeps on the clock, keep it off the runtime threads
        let points =
            tokio::task::spawn_blocking(move || run_scenario(&config, scenario, wall_clock))
                .await??;

        let label = scenario.to_string();
        let total: u128 = points.iter().map(|p| p.elapsed.as_micros()).sum();
        tracing::info!(
            "{}: {} ingestions, mean {}us",
            label,
            points.len(),
            total / points.len().max(1) as u128
        );
        for (index, point) in points.into_iter().enumerate() {
            stats.add_stats(&label, index as u64, point);
        }
    }

    stats.dump_stats(&config.output_path, IngestStats::FORMAT)?;
    tracing::info!("Stats written to {:?}", config.output_path);
    Ok(())
}

fn run_scenario(
    config: &BenchConfig,
    scenario: AddTxScenario,
    wall_clock: bool,
) -> anyhow::Result<Vec<IngestStats>> {
    let clock: Arc<dyn Clock> = if wall_clock {
        Arc::new(SystemClock)
    } else {
        Arc::new(ManualClock::new(SystemClock.adjusted_time()))
    };
    let funding = vec![10 * COIN; config.genesis_coins];
    let harness = Harness::new(config.engine.clone(), clock, &funding);

    harness
        .prepare_sender(scenario.from)
        .map_err(|err| anyhow!("{}: funding failed: {}", scenario, err.reason()))?;
    let outcome = harness
        .build_payment(&scenario)
        .map_err(|err| anyhow!("{}: build failed: {}", scenario, err.reason()))?;
    tracing::info!(
        "{}: built {} with fee {}",
        scenario,
        outcome.txid(),
        outcome.fee
    );

    Ok(
        measure_ingestion(&harness.bob, &outcome.transaction, config.iterations)
            .into_iter()
            .map(|(elapsed, involved)| IngestStats { elapsed, involved })
            .collect(),
    )
}
