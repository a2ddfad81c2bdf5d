// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Benchmark configuration utilities.

use serde::Serialize;
use synadb_tpcc::{Layout, RunLength, ScaleParameters, TransactionMix};
use sysinfo::System;

/// System information for benchmark reports
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub cpu: String,
    pub cores: usize,
    pub ram_gb: f64,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let os = format!(
            "{} {}",
            System::name().unwrap_or_default(),
            System::os_version().unwrap_or_default()
        );

        let cpu = sys
            .cpus()
            .first()
            .map(|c| c.brand().to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let cores = sys.cpus().len();
        let ram_gb = sys.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0;

        Self {
            os,
            cpu,
            cores,
            ram_gb,
        }
    }
}

/// Parameters of one benchmark invocation, as recorded in the report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSettings {
    pub engine: String,
    pub layout: Layout,
    pub scale: ScaleParameters,
    pub load_workers: usize,
    pub workers: usize,
    pub seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactions_per_worker: Option<u64>,
    pub max_retries: u32,
    pub mix: TransactionMix,
}

impl RunSettings {
    pub fn set_length(&mut self, length: RunLength) {
        match length {
            RunLength::Duration(d) => self.duration_secs = Some(d.as_secs_f64()),
            RunLength::Transactions(n) => self.transactions_per_worker = Some(n),
        }
    }
}

/// Parses `new_order,payment,order_status,delivery,stock_level` weights.
pub fn parse_mix(value: &str) -> Result<TransactionMix, String> {
    let weights = value
        .split(',')
        .map(|w| w.trim().parse::<u32>().map_err(|e| format!("bad weight {w:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    let [new_order, payment, order_status, delivery, stock_level] = weights[..] else {
        return Err(format!("expected 5 weights, got {}", weights.len()));
    };
    let mix = TransactionMix {
        new_order,
        payment,
        order_status,
        delivery,
        stock_level,
    };
    if mix.total() == 0 {
        return Err("at least one weight must be positive".to_string());
    }
    Ok(mix)
}
