use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use runfold_core::app::{
    AggregatorBuilder, AggregatorConfig, AggregatorError, BuildError, ConfigError,
};
use runfold_core::impls::{FetchFixture, FixtureError, InMemoryArtifactFetcher};
use tracing_subscriber::EnvFilter;

/// Fan out artifact listings for a set of runs and print the aggregate state.
#[derive(Debug, Parser)]
#[command(name = "runfold", version)]
struct Args {
    /// JSON fixture with scripted listings/errors per run.
    #[arg(long)]
    fixture: PathBuf,

    /// Aggregator config (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `max_concurrent_fetches` from the config.
    #[arg(long, env = "RUNFOLD_MAX_CONCURRENT_FETCHES")]
    max_concurrent_fetches: Option<usize>,

    /// List this sub-path of each run's artifact root.
    #[arg(long)]
    path: Option<String>,

    /// Run ids to aggregate (duplicates are collapsed).
    run_ids: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(failed) if failed => ExitCode::from(2),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("runfold: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the aggregate state carries an error.
async fn run(args: Args) -> Result<bool, CliError> {
    // (A) fetcher と config を用意
    let fixture = FetchFixture::from_path(&args.fixture)?;
    let fetcher = Arc::new(InMemoryArtifactFetcher::from_fixture(fixture));

    let mut config = match &args.config {
        Some(path) => AggregatorConfig::from_path(path)?,
        None => AggregatorConfig::default(),
    };
    if let Some(n) = args.max_concurrent_fetches {
        config.max_concurrent_fetches = Some(n);
    }
    if let Some(path) = args.path {
        config.artifact_path = Some(path);
    }

    // (B) aggregator を起動して run を observe
    let aggregator = AggregatorBuilder::new(fetcher).config(config).build()?;
    let mut view = aggregator.observe(args.run_ids).await?;

    // (C) 全 fetch の settle を待って結果を出力
    let state = view.settled().await?;
    tracing::info!(
        invocation = %state.invocation(),
        results = state.results_by_key().len(),
        "runfold.cli.done"
    );
    println!("{}", serde_json::to_string_pretty(&state.status())?);

    aggregator.shutdown_and_join().await;
    Ok(state.error().is_some())
}
