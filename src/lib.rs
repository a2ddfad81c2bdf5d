// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! # SynaDB TPC-C
//!
//! A TPC-C workload engine: dataset generation, the five transaction
//! profiles and a multi-threaded benchmark driver, written once against an
//! abstract store and run on several embedded engines.
//!
//! ## Features
//!
//! ### Workload
//! - **[`random::RandomHelper`]** - Seeded generator with TPC-C distributions
//!   (NURand with pinned constants, syllable last names, unique id sets)
//! - **[`scale::ScaleParameters`]** - Validated dataset cardinalities
//! - **[`generator`]** - Initial-population row generators
//! - **[`params::ParamGenerator`]** - Per-transaction input generation and the
//!   45/43/4/4/4 mix
//! - **[`executor`]** - NewOrder, Payment, OrderStatus, Delivery and StockLevel
//!
//! ### Stores
//! - **[`store::doc::DocStore`]** - In-process document store with optimistic
//!   concurrency
//! - **[`store::sqlite::SqliteStore`]** - SQLite over WAL with `BEGIN IMMEDIATE`
//! - **[`store::duck::DuckStore`]** - DuckDB (optional `duckdb` feature, on by
//!   default)
//!
//! Every store supports the normalized [`store::Layout::Classic`] and the
//! denormalized [`store::Layout::Modern`] schema.
//!
//! ### Driver
//! - **[`loader::Loader`]** - Idempotent parallel load
//! - **[`runner::Benchmark`]** - Worker threads, conflict retries, latency
//!   percentiles and tpmC
//!
//! ## Quick Start
//!
//! ```rust
//! use synadb_tpcc::loader::Loader;
//! use synadb_tpcc::runner::{Benchmark, RunConfig, RunLength};
//! use synadb_tpcc::store::{doc::DocStore, Layout};
//! use synadb_tpcc::ScaleParameters;
//!
//! fn main() -> synadb_tpcc::Result<()> {
//!     let store = DocStore::new(Layout::Modern);
//!     let scale = ScaleParameters::make_scaled(1, 100.0)?;
//!
//!     let outcome = Loader::new(&store, 7).ensure_loaded(&scale, 2)?;
//!
//!     let config = RunConfig {
//!         workers: 2,
//!         length: RunLength::Transactions(20),
//!         ..RunConfig::default()
//!     };
//!     let summary = Benchmark::new(&store, outcome.manifest(), config)?.run()?;
//!     assert_eq!(summary.completed + summary.failed, 40);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `duckdb` | Enable the DuckDB store (bundled engine) |

pub mod error;
pub mod executor;
pub mod generator;
pub mod loader;
pub mod params;
pub mod random;
pub mod runner;
pub mod scale;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use error::{Result, TpccError};
pub use executor::{execute, TransactionOutcome};
pub use loader::{LoadOutcome, Loader};
pub use params::{ParamGenerator, TransactionMix, TransactionParams, TransactionType};
pub use random::{NuRandConstants, RandomHelper};
pub use runner::{Benchmark, RunConfig, RunLength, RunSummary};
pub use scale::ScaleParameters;
pub use store::{Layout, LoadManifest, WorkloadSession, WorkloadStore};
pub use types::Entity;
