// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Benchmark report generation.
//!
//! Every run writes `report.json` (the full figures plus metadata) and
//! `report.md` (a summary table) into the output directory.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use synadb_tpcc::RunSummary;

use crate::config::{RunSettings, SystemInfo};

// ============================================================================
// Report Data Structures
// ============================================================================

/// Complete benchmark report with all metadata and results
#[derive(Debug, Serialize)]
pub struct BenchmarkReport {
    pub metadata: ReportMetadata,
    pub load: LoadInfo,
    pub summary: RunSummary,
}

/// Report metadata including system information and configuration
#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    pub timestamp: String,
    pub version: String,
    pub system: SystemInfo,
    pub settings: RunSettings,
}

/// What the load phase did before the run.
#[derive(Debug, Serialize)]
pub struct LoadInfo {
    /// False when the dataset was already present.
    pub loaded: bool,
    pub elapsed_secs: f64,
}

impl BenchmarkReport {
    pub fn new(settings: RunSettings, load: LoadInfo, summary: RunSummary) -> Self {
        Self {
            metadata: ReportMetadata {
                timestamp: chrono::Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                system: SystemInfo::collect(),
                settings,
            },
            load,
            summary,
        }
    }
}

// ============================================================================
// Report Generation Functions
// ============================================================================

/// Writes the JSON and Markdown reports, returning their paths.
pub fn generate_report(report: &BenchmarkReport, output_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("create output directory {}", output_dir.display()))?;

    let json_path = output_dir.join("report.json");
    let json = serde_json::to_string_pretty(report).context("serialize report")?;
    fs::write(&json_path, json).with_context(|| format!("write {}", json_path.display()))?;

    let md_path = output_dir.join("report.md");
    fs::write(&md_path, generate_markdown(report))
        .with_context(|| format!("write {}", md_path.display()))?;

    Ok(vec![json_path, md_path])
}

/// Generate Markdown content from report
pub fn generate_markdown(report: &BenchmarkReport) -> String {
    let meta = &report.metadata;
    let settings = &meta.settings;
    let summary = &report.summary;
    let mut md = String::new();

    md.push_str("# TPC-C Benchmark Report\n\n");

    md.push_str("## System Information\n\n");
    let _ = writeln!(md, "- **Date**: {}", meta.timestamp);
    let _ = writeln!(md, "- **Version**: {}", meta.version);
    let _ = writeln!(md, "- **OS**: {}", meta.system.os);
    let _ = writeln!(md, "- **CPU**: {}", meta.system.cpu);
    let _ = writeln!(md, "- **Cores**: {}", meta.system.cores);
    let _ = writeln!(md, "- **RAM**: {:.1} GB", meta.system.ram_gb);
    md.push('\n');

    md.push_str("## Configuration\n\n");
    let _ = writeln!(md, "- **Engine**: {}", settings.engine);
    let _ = writeln!(md, "- **Layout**: {}", settings.layout);
    let _ = writeln!(
        md,
        "- **Scale**: {} warehouses, {} items, {} customers per district",
        settings.scale.warehouses, settings.scale.items, settings.scale.customers_per_district
    );
    let _ = writeln!(md, "- **Workers**: {} (load: {})", settings.workers, settings.load_workers);
    if let Some(secs) = settings.duration_secs {
        let _ = writeln!(md, "- **Duration**: {secs:.1} seconds");
    }
    if let Some(n) = settings.transactions_per_worker {
        let _ = writeln!(md, "- **Transactions per worker**: {n}");
    }
    let mix = &settings.mix;
    let _ = writeln!(
        md,
        "- **Mix**: {}/{}/{}/{}/{}",
        mix.new_order, mix.payment, mix.order_status, mix.delivery, mix.stock_level
    );
    if report.load.loaded {
        let _ = writeln!(md, "- **Load time**: {:.1} seconds", report.load.elapsed_secs);
    } else {
        md.push_str("- **Load time**: dataset already loaded\n");
    }
    md.push('\n');

    md.push_str("## Summary\n\n");
    let _ = writeln!(md, "- **tpmC**: {:.1}", summary.tpmc);
    let _ = writeln!(md, "- **Throughput**: {:.1} txn/sec", summary.throughput);
    let _ = writeln!(md, "- **Elapsed**: {:.1} seconds", summary.elapsed_secs);
    let _ = writeln!(md, "- **Completed**: {}", summary.completed);
    let _ = writeln!(md, "- **Failed**: {}", summary.failed);
    let _ = writeln!(md, "- **Retries**: {}", summary.retries);
    let _ = writeln!(md, "- **Failed new orders**: {}", summary.failed_new_orders);
    let _ = writeln!(md, "- **Districts without new orders**: {}", summary.no_new_orders);
    md.push('\n');

    md.push_str("## Transactions\n\n");
    md.push_str("| Transaction | Completed | Rolled back | Failed | Retries | p50 (μs) | p95 (μs) | p99 (μs) |\n");
    md.push_str("|-------------|-----------|-------------|--------|---------|----------|----------|----------|\n");
    for t in &summary.per_type {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {:.1} | {:.1} | {:.1} |",
            t.transaction, t.completed, t.rolled_back, t.failed, t.retries, t.p50_us, t.p95_us, t.p99_us
        );
    }

    md
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use synadb_tpcc::loader::Loader;
    use synadb_tpcc::store::doc::DocStore;
    use synadb_tpcc::{Benchmark, Layout, RunConfig, RunLength, ScaleParameters, TransactionMix};
    use tempfile::tempdir;

    fn sample_report() -> BenchmarkReport {
        let store = DocStore::new(Layout::Classic);
        let scale = ScaleParameters::new(100, 1, 2, 20, 6).unwrap();
        let outcome = Loader::new(&store, 1).ensure_loaded(&scale, 1).unwrap();
        let config = RunConfig {
            length: RunLength::Transactions(30),
            ..RunConfig::default()
        };
        let summary = Benchmark::new(&store, outcome.manifest(), config.clone())
            .unwrap()
            .run()
            .unwrap();
        let mut settings = RunSettings {
            engine: "doc".to_string(),
            layout: Layout::Classic,
            scale,
            load_workers: 1,
            workers: config.workers,
            seed: config.seed,
            duration_secs: None,
            transactions_per_worker: None,
            max_retries: config.max_retries,
            mix: TransactionMix::default(),
        };
        settings.set_length(config.length);
        BenchmarkReport::new(
            settings,
            LoadInfo {
                loaded: true,
                elapsed_secs: 0.1,
            },
            summary,
        )
    }

    #[test]
    fn test_generate_markdown() {
        let md = generate_markdown(&sample_report());
        assert!(md.contains("# TPC-C Benchmark Report"));
        assert!(md.contains("- **Engine**: doc"));
        assert!(md.contains("- **Transactions per worker**: 30"));
        for name in ["new_order", "payment", "order_status", "delivery", "stock_level"] {
            assert!(md.contains(&format!("| {name} |")), "missing row for {name}");
        }
    }

    #[test]
    fn test_generate_report_writes_files() {
        let dir = tempdir().unwrap();
        let paths = generate_report(&sample_report(), dir.path()).unwrap();
        assert_eq!(paths.len(), 2);
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(json["metadata"]["settings"]["layout"], "classic");
        assert_eq!(json["summary"]["per_type"].as_array().unwrap().len(), 5);
        assert!(json["metadata"]["settings"].get("duration_secs").is_none());
    }
}
