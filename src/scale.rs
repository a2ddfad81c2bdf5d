// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Workload size configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TpccError};

/// Catalog size mandated by TPC-C.
pub const MAX_ITEMS: u32 = 100_000;
/// Districts per warehouse mandated by TPC-C.
pub const DISTRICTS_PER_WAREHOUSE: u32 = 10;
/// Customers per district mandated by TPC-C.
pub const CUSTOMERS_PER_DISTRICT: u32 = 3_000;
/// Undelivered orders per district at load time.
pub const NEW_ORDERS_PER_DISTRICT: u32 = 900;

/// Immutable description of the dataset size.
///
/// Warehouses occupy the contiguous id range
/// `starting_warehouse..=ending_warehouse`, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleParameters {
    pub items: u32,
    pub warehouses: u32,
    pub districts_per_warehouse: u32,
    pub customers_per_district: u32,
    pub new_orders_per_district: u32,
    pub starting_warehouse: u32,
    pub ending_warehouse: u32,
}

impl ScaleParameters {
    /// Validates and builds a parameter set.
    pub fn new(
        items: u32,
        warehouses: u32,
        districts_per_warehouse: u32,
        customers_per_district: u32,
        new_orders_per_district: u32,
    ) -> Result<Self> {
        if items == 0 || items > MAX_ITEMS {
            return Err(TpccError::InvalidScale(format!(
                "items must be in [1, {MAX_ITEMS}], got {items}"
            )));
        }
        if warehouses == 0 {
            return Err(TpccError::InvalidScale("warehouses must be > 0".to_string()));
        }
        if districts_per_warehouse == 0 || districts_per_warehouse > DISTRICTS_PER_WAREHOUSE {
            return Err(TpccError::InvalidScale(format!(
                "districts per warehouse must be in [1, {DISTRICTS_PER_WAREHOUSE}], got {districts_per_warehouse}"
            )));
        }
        if customers_per_district == 0 || customers_per_district > CUSTOMERS_PER_DISTRICT {
            return Err(TpccError::InvalidScale(format!(
                "customers per district must be in [1, {CUSTOMERS_PER_DISTRICT}], got {customers_per_district}"
            )));
        }
        if new_orders_per_district > NEW_ORDERS_PER_DISTRICT {
            return Err(TpccError::InvalidScale(format!(
                "new orders per district must be <= {NEW_ORDERS_PER_DISTRICT}, got {new_orders_per_district}"
            )));
        }
        if new_orders_per_district > customers_per_district {
            return Err(TpccError::InvalidScale(format!(
                "new orders per district ({new_orders_per_district}) exceed orders per district ({customers_per_district})"
            )));
        }
        Ok(Self {
            items,
            warehouses,
            districts_per_warehouse,
            customers_per_district,
            new_orders_per_district,
            starting_warehouse: 1,
            ending_warehouse: warehouses,
        })
    }

    /// Full TPC-C cardinalities for `warehouses` warehouses.
    pub fn make_default(warehouses: u32) -> Result<Self> {
        Self::new(
            MAX_ITEMS,
            warehouses,
            DISTRICTS_PER_WAREHOUSE,
            CUSTOMERS_PER_DISTRICT,
            NEW_ORDERS_PER_DISTRICT,
        )
    }

    /// Divides items, customers and new orders by `factor`.
    ///
    /// Items and customers never drop below 1. Districts stay at 10.
    pub fn make_scaled(warehouses: u32, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor < 1.0 {
            return Err(TpccError::InvalidScale(format!(
                "scale factor must be >= 1.0, got {factor}"
            )));
        }
        let items = ((MAX_ITEMS as f64 / factor) as u32).max(1);
        let customers = ((CUSTOMERS_PER_DISTRICT as f64 / factor) as u32).max(1);
        let new_orders = (NEW_ORDERS_PER_DISTRICT as f64 / factor) as u32;
        Self::new(
            items,
            warehouses,
            DISTRICTS_PER_WAREHOUSE,
            customers,
            new_orders,
        )
    }

    /// Warehouse ids covered by this parameter set.
    pub fn warehouse_ids(&self) -> std::ops::RangeInclusive<u32> {
        self.starting_warehouse..=self.ending_warehouse
    }

    /// District ids of every warehouse.
    pub fn district_ids(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.districts_per_warehouse
    }
}
