// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! TPC-C Benchmark Driver
//!
//! Loads a TPC-C dataset into one of the embedded engines and runs the
//! transaction mix against it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use synadb_tpcc::loader::{LoadOutcome, Loader};
use synadb_tpcc::store::doc::DocStore;
use synadb_tpcc::store::sqlite::SqliteStore;
use synadb_tpcc::{
    Benchmark, Layout, RunConfig, RunLength, ScaleParameters, TransactionMix, WorkloadStore,
};
use tracing_subscriber::EnvFilter;

mod config;
mod report;

use config::{parse_mix, RunSettings};
use report::{BenchmarkReport, LoadInfo};

/// TPC-C benchmark driver
#[derive(Parser, Debug)]
#[command(name = "tpcc_bench")]
#[command(about = "TPC-C load and run driver for embedded engines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the dataset (no-op when already loaded with the same parameters)
    Load(StoreArgs),

    /// Load if needed, then run the transaction mix
    Run {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Engine {
    /// In-process document store (memory only)
    Doc,
    /// SQLite database file
    Sqlite,
    /// DuckDB database file, or memory when no path is given
    Duckdb,
}

impl Engine {
    fn name(self) -> &'static str {
        match self {
            Engine::Doc => "doc",
            Engine::Sqlite => "sqlite",
            Engine::Duckdb => "duckdb",
        }
    }
}

/// Store selection and dataset size.
#[derive(Args, Debug, Clone)]
struct StoreArgs {
    /// Storage engine
    #[arg(long, value_enum, default_value = "sqlite")]
    engine: Engine,

    /// Schema layout: classic or modern
    #[arg(long, default_value = "classic")]
    layout: Layout,

    /// Database file. Defaults to `tpcc-<layout>.<engine>` for file engines.
    #[arg(long)]
    path: Option<PathBuf>,

    /// Number of warehouses
    #[arg(long, default_value_t = 1)]
    warehouses: u32,

    /// Divide items, customers and new orders by this factor
    #[arg(long, default_value_t = 1.0)]
    scale_factor: f64,

    /// Loader threads
    #[arg(long, default_value_t = 4)]
    load_workers: usize,

    /// Seed for data generation
    #[arg(long, default_value_t = 42)]
    load_seed: u64,
}

impl StoreArgs {
    fn scale(&self) -> anyhow::Result<ScaleParameters> {
        Ok(ScaleParameters::make_scaled(self.warehouses, self.scale_factor)?)
    }

    fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            PathBuf::from(format!("tpcc-{}.{}", self.layout, self.engine.name()))
        })
    }
}

/// Run phase options.
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Benchmark threads
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Wall-clock run time
    #[arg(long, default_value = "60s")]
    duration: humantime::Duration,

    /// Run this many transactions per worker instead of a fixed duration
    #[arg(long)]
    transactions: Option<u64>,

    /// Seed for parameter generation
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Retries of one transaction after a conflict
    #[arg(long, default_value_t = 10)]
    max_retries: u32,

    /// Failures in a row before a worker aborts the run
    #[arg(long, default_value_t = 100)]
    max_consecutive_failures: u32,

    /// Weights: new_order,payment,order_status,delivery,stock_level
    #[arg(long, default_value = "45,43,4,4,4", value_parser = parse_mix)]
    mix: TransactionMix,

    /// Output directory for reports
    #[arg(long, default_value = "results")]
    output: PathBuf,
}

impl RunArgs {
    fn config(&self) -> RunConfig {
        RunConfig {
            workers: self.workers,
            length: match self.transactions {
                Some(n) => RunLength::Transactions(n),
                None => RunLength::Duration(self.duration.into()),
            },
            seed: self.seed,
            max_retries: self.max_retries,
            max_consecutive_failures: self.max_consecutive_failures,
            mix: self.mix,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("synadb_tpcc=info,tpcc_bench=info,warn")),
        )
        .init();

    let cli = Cli::parse();
    let (store_args, run_args) = match cli.command {
        Commands::Load(store) => (store, None),
        Commands::Run { store, run } => (store, Some(run)),
    };

    match store_args.engine {
        Engine::Doc => {
            if run_args.is_none() {
                tracing::warn!("the doc engine keeps nothing after exit; load only measures load time");
            }
            let store = DocStore::new(store_args.layout);
            drive(&store, &store_args, run_args.as_ref())
        }
        Engine::Sqlite => {
            let path = store_args.path();
            let store = SqliteStore::open(&path, store_args.layout)
                .with_context(|| format!("open sqlite database {}", path.display()))?;
            drive(&store, &store_args, run_args.as_ref())
        }
        #[cfg(feature = "duckdb")]
        Engine::Duckdb => {
            use synadb_tpcc::store::duck::DuckStore;
            let store = match &store_args.path {
                Some(path) => DuckStore::open(path, store_args.layout)
                    .with_context(|| format!("open duckdb database {}", path.display()))?,
                None => DuckStore::open_in_memory(store_args.layout)?,
            };
            drive(&store, &store_args, run_args.as_ref())
        }
        #[cfg(not(feature = "duckdb"))]
        Engine::Duckdb => anyhow::bail!("built without the duckdb feature"),
    }
}

fn drive<S: WorkloadStore>(
    store: &S,
    store_args: &StoreArgs,
    run_args: Option<&RunArgs>,
) -> anyhow::Result<()> {
    let scale = store_args.scale()?;
    let start = Instant::now();
    let outcome = Loader::new(store, store_args.load_seed)
        .ensure_loaded(&scale, store_args.load_workers)
        .context("load dataset")?;
    let load = LoadInfo {
        loaded: outcome.was_loaded(),
        elapsed_secs: match &outcome {
            LoadOutcome::Loaded(report) => report.elapsed.as_secs_f64(),
            LoadOutcome::AlreadyLoaded(_) => start.elapsed().as_secs_f64(),
        },
    };
    if load.loaded {
        println!(
            "Loaded {} warehouses into {} ({}) in {:.1}s",
            scale.warehouses,
            store.engine(),
            store.layout(),
            load.elapsed_secs
        );
    } else {
        println!("Dataset already loaded in {} ({})", store.engine(), store.layout());
    }

    let Some(run_args) = run_args else {
        return Ok(());
    };
    let config = run_args.config();
    let mut settings = RunSettings {
        engine: store.engine().to_string(),
        layout: store.layout(),
        scale,
        load_workers: store_args.load_workers,
        workers: config.workers,
        seed: config.seed,
        duration_secs: None,
        transactions_per_worker: None,
        max_retries: config.max_retries,
        mix: config.mix,
    };
    settings.set_length(config.length);

    let summary = Benchmark::new(store, outcome.manifest(), config)?
        .run()
        .context("benchmark run")?;
    print_summary(&summary);

    let report = BenchmarkReport::new(settings, load, summary);
    for path in report::generate_report(&report, Path::new(&run_args.output))? {
        println!("  Generated: {}", path.display());
    }
    Ok(())
}

fn print_summary(summary: &synadb_tpcc::RunSummary) {
    println!();
    println!(
        "{:<14} {:>10} {:>10} {:>8} {:>8} {:>12} {:>12}",
        "transaction", "completed", "rolled", "failed", "retries", "p50 (us)", "p99 (us)"
    );
    for t in &summary.per_type {
        println!(
            "{:<14} {:>10} {:>10} {:>8} {:>8} {:>12.1} {:>12.1}",
            t.transaction, t.completed, t.rolled_back, t.failed, t.retries, t.p50_us, t.p99_us
        );
    }
    println!();
    println!("tpmC:        {:.1}", summary.tpmc);
    println!("throughput:  {:.1} txn/sec", summary.throughput);
    println!("no new orders: {}  failed new orders: {}", summary.no_new_orders, summary.failed_new_orders);
}
