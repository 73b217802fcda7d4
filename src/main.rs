//! kv-cache-sim binary: load a configuration, build the workload and store,
//! run one simulation, print the report.

use clap::Parser;
use tracing::info;

use kv_cache_sim::cache::build_store;
use kv_cache_sim::config::{Cli, Config, WorkloadConfig};
use kv_cache_sim::report;
use kv_cache_sim::sim::driver::SimulationDriver;
use kv_cache_sim::workload::synthetic::SyntheticWorkload;
use kv_cache_sim::workload::trace::TraceWorkload;
use kv_cache_sim::workload::RequestSource;

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "kv_cache_sim=debug"
    } else {
        "kv_cache_sim=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("kv-cache-sim v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(policy) = cli.policy {
        config.cache.policy = policy;
    }
    config.validate()?;

    info!(
        policy = %config.cache.policy,
        block_size_tokens = config.cache.block_size_tokens,
        block_bytes = config.cache.block_bytes(),
        "Configuration loaded"
    );

    // Build the workload. Trace workloads also yield the unique-block count
    // needed to resolve fraction-based capacities.
    let (source, unique_blocks): (Box<dyn RequestSource>, Option<usize>) = match &config.workload {
        WorkloadConfig::Synthetic(synthetic) => {
            info!(
                seed = synthetic.seed,
                num_requests = synthetic.num_requests,
                "Synthetic workload"
            );
            (Box::new(SyntheticWorkload::new(synthetic.clone())), None)
        }
        WorkloadConfig::Trace(trace) => {
            let workload = TraceWorkload::load(&trace.path)?;
            let unique = workload.unique_blocks();
            info!(
                path = %trace.path.display(),
                requests = workload.len(),
                unique_blocks = unique,
                "Trace workload loaded"
            );
            (Box::new(workload), Some(unique))
        }
    };

    // Resolve capacities and build the store.
    let store = build_store(&config.cache, unique_blocks)?;
    info!(capacity_blocks = store.capacity(), "Cache store ready");

    // Run the simulation.
    let driver = SimulationDriver::new(&config, store);
    let snapshot = driver.run(source.as_ref())?;

    if cli.json {
        println!("{}", report::render_json(&snapshot)?);
    } else {
        print!("{}", report::render_text(&snapshot));
    }

    Ok(())
}
