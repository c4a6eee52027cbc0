//! storecheck - runs the products API suite
//!
//! Run with: cargo run --package storecheck-e2e -- --offline

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use storecheck_e2e::{E2eResult, RunnerConfig, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "storecheck")]
#[command(about = "Contract and scenario tests for the DummyJSON products API")]
struct Args {
    /// Directory containing environments and test-data fixtures
    #[arg(short, long, env = "STORECHECK_FIXTURES", default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures"))]
    fixtures: PathBuf,

    /// Environment profile to use
    #[arg(short, long, env = "STORECHECK_ENV", default_value = "development")]
    environment: String,

    /// Override the environment's base URL
    #[arg(long, env = "STORECHECK_BASE_URL")]
    base_url: Option<String>,

    /// Run against the in-process stub catalog instead of the network
    #[arg(long)]
    offline: bool,

    /// Run only tests carrying this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific test by name
    #[arg(short, long)]
    name: Option<String>,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    output: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let config = RunnerConfig {
        fixtures_dir: args.fixtures,
        environment: args.environment,
        base_url: args.base_url,
        offline: args.offline,
        tag: args.tag,
        name: args.name,
        output_dir: args.output,
        ..Default::default()
    };

    let mut runner = TestRunner::with_config(config);
    let results = runner.run_all().await?;
    runner.write_results(&results)?;

    Ok(results.failed == 0)
}
