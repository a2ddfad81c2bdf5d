// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Benchmark driver.
//!
//! A [`Benchmark`] runs one OS thread per worker. Every worker owns its
//! session and its [`RandomHelper`], so workers share nothing but the store.
//! Each iteration picks a transaction type from the mix, draws parameters and
//! runs the transaction in its own unit of work. Conflicts are retried with
//! freshly drawn parameters. Any other error is logged and counted and the
//! worker moves on, unless it keeps failing.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{Result, TpccError};
use crate::executor::{execute, NewOrderOutcome, TransactionOutcome};
use crate::params::{ParamGenerator, TransactionMix, TransactionType};
use crate::random::{mix_seed, NuRandConstants, RandomHelper};
use crate::store::{LoadManifest, WorkloadStore};
use crate::types::now_millis;

/// How long each worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLength {
    /// A fixed number of iterations per worker.
    Transactions(u64),
    /// Wall-clock time.
    Duration(Duration),
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub workers: usize,
    pub length: RunLength,
    pub seed: u64,
    /// Retries of one transaction after a conflict.
    pub max_retries: u32,
    /// Fatal failures in a row before a worker gives up.
    pub max_consecutive_failures: u32,
    pub mix: TransactionMix,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            length: RunLength::Duration(Duration::from_secs(60)),
            seed: 42,
            max_retries: 10,
            max_consecutive_failures: 100,
            mix: TransactionMix::default(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(TpccError::InvalidArgument(
                "runner needs at least one worker".to_string(),
            ));
        }
        if self.mix.total() == 0 {
            return Err(TpccError::InvalidArgument(
                "transaction mix has no weight".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Linear sub-buckets per power of two. Reported percentiles overstate the
/// true value by at most 1/16.
const SUB_BUCKET_BITS: u32 = 4;
const SUB_BUCKETS: usize = 1 << SUB_BUCKET_BITS;
const LATENCY_BUCKETS: usize = (64 - SUB_BUCKET_BITS as usize + 1) * SUB_BUCKETS;

fn bucket_index(ns: u64) -> usize {
    if ns < SUB_BUCKETS as u64 {
        return ns as usize;
    }
    let exp = 63 - ns.leading_zeros();
    let shift = exp - SUB_BUCKET_BITS;
    let sub = (ns >> shift) as usize - SUB_BUCKETS;
    (shift as usize + 1) * SUB_BUCKETS + sub
}

/// Largest value that lands in bucket `idx`.
fn bucket_upper(idx: usize) -> u64 {
    if idx < SUB_BUCKETS {
        return idx as u64;
    }
    let shift = (idx / SUB_BUCKETS - 1) as u32;
    let sub = (idx % SUB_BUCKETS) as u128;
    let upper = ((SUB_BUCKETS as u128 + sub + 1) << shift) - 1;
    upper.min(u64::MAX as u128) as u64
}

/// Fixed-size latency histogram in nanoseconds.
///
/// Memory does not grow with the number of samples, so duration-bound runs
/// can record every transaction.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    counts: Vec<u64>,
    count: u64,
    max_ns: u64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            counts: vec![0; LATENCY_BUCKETS],
            count: 0,
            max_ns: 0,
        }
    }
}

impl LatencyHistogram {
    pub fn record(&mut self, latency: Duration) {
        let ns = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.counts[bucket_index(ns)] += 1;
        self.count += 1;
        self.max_ns = self.max_ns.max(ns);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn merge(&mut self, other: &LatencyHistogram) {
        for (mine, theirs) in self.counts.iter_mut().zip(&other.counts) {
            *mine += theirs;
        }
        self.count += other.count;
        self.max_ns = self.max_ns.max(other.max_ns);
    }

    /// Latency at rank `count * pct / 100` of the sorted samples, in nanoseconds.
    fn value_at(&self, pct: u64) -> u64 {
        let rank = self.count * pct / 100;
        let mut cumulative = 0u64;
        for (idx, count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative > rank {
                return bucket_upper(idx).min(self.max_ns);
            }
        }
        self.max_ns
    }

    /// p50, p95 and p99 in microseconds.
    pub fn percentiles(&self) -> (f64, f64, f64) {
        if self.count == 0 {
            return (0.0, 0.0, 0.0);
        }
        let us = |pct| self.value_at(pct) as f64 / 1_000.0;
        (us(50), us(95), us(99))
    }
}

#[derive(Debug, Clone, Default)]
struct TypeStats {
    /// Committed plus designed rollbacks.
    completed: u64,
    rolled_back: u64,
    failed: u64,
    retries: u64,
    latencies: LatencyHistogram,
}

impl TypeStats {
    fn merge(&mut self, other: TypeStats) {
        self.completed += other.completed;
        self.rolled_back += other.rolled_back;
        self.failed += other.failed;
        self.retries += other.retries;
        self.latencies.merge(&other.latencies);
    }
}

/// Counters collected by one worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    per_type: [TypeStats; 5],
    no_new_orders: u64,
    failed_new_orders: u64,
}

fn slot(txn: TransactionType) -> usize {
    match txn {
        TransactionType::NewOrder => 0,
        TransactionType::Payment => 1,
        TransactionType::OrderStatus => 2,
        TransactionType::Delivery => 3,
        TransactionType::StockLevel => 4,
    }
}

impl WorkerStats {
    fn record(&mut self, outcome: &TransactionOutcome, latency: Duration) {
        let stats = &mut self.per_type[slot(outcome.transaction_type())];
        stats.completed += 1;
        stats.latencies.record(latency);
        match outcome {
            TransactionOutcome::NewOrder(NewOrderOutcome::InvalidItem { .. }) => {
                stats.rolled_back += 1;
                self.failed_new_orders += 1;
            }
            TransactionOutcome::Delivery(receipt) => {
                self.no_new_orders += u64::from(receipt.skipped);
            }
            _ => {}
        }
    }

    fn record_retry(&mut self, txn: TransactionType) {
        self.per_type[slot(txn)].retries += 1;
    }

    fn record_failure(&mut self, txn: TransactionType) {
        self.per_type[slot(txn)].failed += 1;
    }

    /// Completed iterations of every type.
    pub fn completed(&self) -> u64 {
        self.per_type.iter().map(|s| s.completed).sum()
    }

    fn merge(&mut self, other: WorkerStats) {
        for (mine, theirs) in self.per_type.iter_mut().zip(other.per_type) {
            mine.merge(theirs);
        }
        self.no_new_orders += other.no_new_orders;
        self.failed_new_orders += other.failed_new_orders;
    }
}

/// Per-type figures of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct TypeSummary {
    pub transaction: &'static str,
    pub completed: u64,
    pub rolled_back: u64,
    pub failed: u64,
    pub retries: u64,
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
}

/// Figures of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub workers: usize,
    pub elapsed_secs: f64,
    pub per_type: Vec<TypeSummary>,
    pub completed: u64,
    pub failed: u64,
    pub retries: u64,
    /// Completed transactions per second.
    pub throughput: f64,
    /// Completed NewOrder transactions per minute.
    pub tpmc: f64,
    /// Delivery districts that had no undelivered order.
    pub no_new_orders: u64,
    /// NewOrder transactions rolled back on an unused item id.
    pub failed_new_orders: u64,
}

impl RunSummary {
    fn from_stats(stats: WorkerStats, workers: usize, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let per_type: Vec<TypeSummary> = TransactionType::ALL
            .iter()
            .zip(stats.per_type)
            .map(|(txn, s)| {
                let (p50_us, p95_us, p99_us) = s.latencies.percentiles();
                TypeSummary {
                    transaction: txn.name(),
                    completed: s.completed,
                    rolled_back: s.rolled_back,
                    failed: s.failed,
                    retries: s.retries,
                    p50_us,
                    p95_us,
                    p99_us,
                }
            })
            .collect();
        let completed = per_type.iter().map(|t| t.completed).sum::<u64>();
        let new_orders = per_type[slot(TransactionType::NewOrder)].completed;
        Self {
            workers,
            elapsed_secs: elapsed.as_secs_f64(),
            failed: per_type.iter().map(|t| t.failed).sum(),
            retries: per_type.iter().map(|t| t.retries).sum(),
            per_type,
            completed,
            throughput: completed as f64 / secs,
            tpmc: new_orders as f64 * 60.0 / secs,
            no_new_orders: stats.no_new_orders,
            failed_new_orders: stats.failed_new_orders,
        }
    }

    pub fn transaction(&self, txn: TransactionType) -> &TypeSummary {
        &self.per_type[slot(txn)]
    }
}

// ============================================================================
// Benchmark
// ============================================================================

/// Drives the transaction mix against a loaded store.
pub struct Benchmark<'a, S: WorkloadStore> {
    store: &'a S,
    params: ParamGenerator,
    constants: NuRandConstants,
    config: RunConfig,
}

impl<'a, S: WorkloadStore> Benchmark<'a, S> {
    /// Prepares a run against the dataset described by `manifest`.
    ///
    /// Run-time NURand constants are derived once from the load constants so
    /// every worker uses the same `C` values.
    pub fn new(store: &'a S, manifest: &LoadManifest, config: RunConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = RandomHelper::new(mix_seed(config.seed, 0));
        let constants = NuRandConstants::for_run(&mut rng, &manifest.constants);
        Ok(Self {
            store,
            params: ParamGenerator::new(manifest.scale),
            constants,
            config,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs every worker to completion and merges their counters.
    pub fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        let deadline = match self.config.length {
            RunLength::Duration(d) => Some(start + d),
            RunLength::Transactions(_) => None,
        };
        tracing::info!(
            engine = self.store.engine(),
            layout = %self.store.layout(),
            workers = self.config.workers,
            "benchmark started"
        );

        let results: Vec<Result<WorkerStats>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.config.workers)
                .map(|worker| scope.spawn(move || self.run_worker(worker, deadline)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(TpccError::invariant("benchmark worker panicked")))
                })
                .collect()
        });

        let mut merged = WorkerStats::default();
        for result in results {
            merged.merge(result?);
        }
        let summary = RunSummary::from_stats(merged, self.config.workers, start.elapsed());
        tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            retries = summary.retries,
            tpmc = summary.tpmc,
            "benchmark finished"
        );
        Ok(summary)
    }

    fn run_worker(&self, worker: usize, deadline: Option<Instant>) -> Result<WorkerStats> {
        let mut session = self.store.open_session()?;
        let mut rng =
            RandomHelper::with_constants(mix_seed(self.config.seed, worker as u64 + 1), self.constants);
        let mut stats = WorkerStats::default();
        let mut consecutive = 0u32;
        let mut iterations = 0u64;

        loop {
            match (self.config.length, deadline) {
                (RunLength::Transactions(n), _) if iterations >= n => break,
                (_, Some(deadline)) if Instant::now() >= deadline => break,
                _ => {}
            }
            iterations += 1;

            let txn = self.config.mix.pick(&mut rng);
            match self.run_one(&mut session, &mut rng, txn, &mut stats) {
                Ok(()) => consecutive = 0,
                Err(err) => {
                    consecutive += 1;
                    stats.record_failure(txn);
                    tracing::error!(worker, txn = %txn, error = %err, "transaction failed");
                    if consecutive > self.config.max_consecutive_failures {
                        return Err(TpccError::TooManyFailures {
                            worker,
                            failures: consecutive,
                        });
                    }
                }
            }
        }
        Ok(stats)
    }

    /// One iteration: retries conflicts with fresh parameters.
    fn run_one(
        &self,
        session: &mut S::Session,
        rng: &mut RandomHelper,
        txn: TransactionType,
        stats: &mut WorkerStats,
    ) -> Result<()> {
        let start = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let params = self.params.generate(rng, txn, now_millis())?;
            match execute(session, &params) {
                Ok(outcome) => {
                    stats.record(&outcome, start.elapsed());
                    return Ok(());
                }
                Err(err) if err.is_transient() && attempt <= self.config.max_retries => {
                    stats.record_retry(txn);
                    tracing::debug!(txn = %txn, attempt, error = %err, "conflict, retrying");
                }
                Err(err) if err.is_transient() => {
                    return Err(TpccError::RetriesExhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}
