// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! The workload store capability.
//!
//! The five executors and the loader are written once against
//! [`WorkloadSession`]. Each engine supplies one implementation:
//!
//! | Engine | Type | Notes |
//! |--------|------|-------|
//! | `doc` | [`doc::DocStore`] | embedded document store, optimistic commits |
//! | `sqlite` | [`sqlite::SqliteStore`] | one connection per session, `BEGIN IMMEDIATE` |
//! | `duckdb` | `duck::DuckStore` | cloned connections, optional `duckdb` feature |
//!
//! Every engine supports both [`Layout`]s.

pub mod doc;
pub mod sql;
pub mod sqlite;

#[cfg(feature = "duckdb")]
pub mod duck;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TpccError};
use crate::random::NuRandConstants;
use crate::scale::ScaleParameters;
use crate::types::{
    Customer, District, Entity, History, Item, Order, OrderLine, Stock, Warehouse,
};

/// Schema design used by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Normalized: separate order, order line and backlog collections.
    Classic,
    /// Denormalized: lines embedded in the order, backlog as an order flag.
    Modern,
}

impl Layout {
    pub const ALL: [Layout; 2] = [Layout::Classic, Layout::Modern];

    pub fn name(self) -> &'static str {
        match self {
            Layout::Classic => "classic",
            Layout::Modern => "modern",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Layout {
    type Err = TpccError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "classic" => Ok(Layout::Classic),
            "modern" => Ok(Layout::Modern),
            other => Err(TpccError::InvalidArgument(format!("unknown layout '{other}'"))),
        }
    }
}

/// Result of atomically claiming the next order id of a district.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderSlot {
    /// The claimed order id (the district counter before the increment).
    pub o_id: u32,
    /// District tax rate.
    pub d_tax: f64,
}

/// Record of a completed load, persisted by every engine.
///
/// Loading again with an equal manifest is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadManifest {
    pub scale: ScaleParameters,
    pub workers: usize,
    pub layout: Layout,
    /// NURand constants drawn for the load.
    pub constants: NuRandConstants,
}

impl LoadManifest {
    /// True when `self` describes the same dataset as (`scale`, `workers`, `layout`).
    pub fn matches(&self, scale: &ScaleParameters, workers: usize, layout: Layout) -> bool {
        self.scale == *scale && self.workers == workers && self.layout == layout
    }
}

/// Factory of sessions against one database.
pub trait WorkloadStore: Send + Sync {
    type Session: WorkloadSession + Send;

    /// Short engine name used in logs and reports.
    fn engine(&self) -> &'static str;

    fn layout(&self) -> Layout;

    /// Opens a new session. Each worker owns exactly one.
    fn open_session(&self) -> Result<Self::Session>;
}

/// One connection to a store.
///
/// Reads and writes issued between [`begin`](WorkloadSession::begin) and
/// [`commit`](WorkloadSession::commit) form one atomic unit of work. A commit
/// that loses a race returns [`TpccError::Conflict`].
pub trait WorkloadSession {
    // ====================================================================
    // Unit of work
    // ====================================================================

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    // ====================================================================
    // Setup
    // ====================================================================

    /// Drops every entity and recreates an empty schema for the store's layout.
    fn reset_schema(&mut self) -> Result<()>;

    /// Builds the secondary indexes: customer by name, order by customer and
    /// stock by warehouse and item.
    fn create_indexes(&mut self) -> Result<()>;

    fn load_manifest(&mut self) -> Result<Option<LoadManifest>>;

    fn record_manifest(&mut self, manifest: &LoadManifest) -> Result<()>;

    fn insert_items(&mut self, items: &[Item]) -> Result<()>;

    fn insert_warehouse(&mut self, warehouse: &Warehouse) -> Result<()>;

    fn insert_districts(&mut self, districts: &[District]) -> Result<()>;

    fn insert_customers(&mut self, customers: &[Customer]) -> Result<()>;

    fn insert_stock(&mut self, stock: &[Stock]) -> Result<()>;

    fn insert_history(&mut self, history: &History) -> Result<()>;

    /// Inserts an order with its lines. Orders without a carrier also get
    /// their backlog marker.
    fn insert_order(&mut self, order: &Order, lines: &[OrderLine]) -> Result<()>;

    // ====================================================================
    // Point reads
    // ====================================================================

    fn warehouse(&mut self, w_id: u32) -> Result<Option<Warehouse>>;

    fn district(&mut self, w_id: u32, d_id: u32) -> Result<Option<District>>;

    fn customer_by_id(&mut self, w_id: u32, d_id: u32, c_id: u32) -> Result<Option<Customer>>;

    /// Customers with last name `last`, ordered by first name.
    fn customers_by_last_name(&mut self, w_id: u32, d_id: u32, last: &str)
        -> Result<Vec<Customer>>;

    /// Items with the given ids. Unknown ids are silently absent.
    fn items_by_ids(&mut self, ids: &[u32]) -> Result<Vec<Item>>;

    // ====================================================================
    // NewOrder
    // ====================================================================

    /// Atomically reads and increments the district's next order id.
    fn next_order_id(&mut self, w_id: u32, d_id: u32) -> Result<OrderSlot>;

    /// Stock rows of warehouse `w_id` for `i_ids`, claimed for update.
    fn stock_for_update(&mut self, w_id: u32, i_ids: &[u32]) -> Result<Vec<Stock>>;

    /// Writes quantity, ytd, order and remote counts of `stock`.
    fn update_stock(&mut self, stock: &Stock) -> Result<()>;

    // ====================================================================
    // Payment
    // ====================================================================

    /// Adds `amount` to the district ytd and returns the updated row.
    fn add_district_ytd(&mut self, w_id: u32, d_id: u32, amount: f64) -> Result<District>;

    /// Adds `amount` to the warehouse ytd and returns the updated row.
    fn add_warehouse_ytd(&mut self, w_id: u32, amount: f64) -> Result<Warehouse>;

    /// Writes balance, ytd payment, payment count and data of `customer`.
    fn update_customer_payment(&mut self, customer: &Customer) -> Result<()>;

    // ====================================================================
    // OrderStatus
    // ====================================================================

    /// The customer's order with the highest id, with its lines.
    fn last_order(
        &mut self,
        w_id: u32,
        d_id: u32,
        c_id: u32,
    ) -> Result<Option<(Order, Vec<OrderLine>)>>;

    // ====================================================================
    // Delivery
    // ====================================================================

    /// Lowest order id in the district's backlog.
    fn oldest_undelivered(&mut self, w_id: u32, d_id: u32) -> Result<Option<u32>>;

    fn order_with_lines(
        &mut self,
        w_id: u32,
        d_id: u32,
        o_id: u32,
    ) -> Result<Option<(Order, Vec<OrderLine>)>>;

    /// Sets the carrier on the order, the delivery date on its lines and
    /// removes it from the backlog.
    fn complete_delivery(
        &mut self,
        w_id: u32,
        d_id: u32,
        o_id: u32,
        carrier_id: u32,
        delivery_d: i64,
    ) -> Result<()>;

    /// Adds `amount` to the customer balance and bumps the delivery count.
    fn credit_customer_delivery(&mut self, w_id: u32, d_id: u32, c_id: u32, amount: f64)
        -> Result<()>;

    // ====================================================================
    // StockLevel and inspection
    // ====================================================================

    /// Distinct items among the lines of orders `[next_o_id - 20, next_o_id)`
    /// whose stock in `w_id` is below `threshold`.
    fn stock_level(&mut self, w_id: u32, d_id: u32, next_o_id: u32, threshold: u32)
        -> Result<u64>;

    /// Number of stored entities of a kind. In the modern layout order lines
    /// and backlog markers are counted inside their orders.
    fn count(&mut self, entity: Entity) -> Result<u64>;
}

/// Orders inspected by StockLevel.
pub const STOCK_LEVEL_ORDERS: u32 = 20;

/// First order id inspected by StockLevel.
pub fn stock_level_floor(next_o_id: u32) -> u32 {
    next_o_id.saturating_sub(STOCK_LEVEL_ORDERS).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_parse() {
        assert_eq!("Classic".parse::<Layout>().unwrap(), Layout::Classic);
        assert_eq!("modern".parse::<Layout>().unwrap(), Layout::Modern);
        assert!("flat".parse::<Layout>().is_err());
        assert_eq!(serde_json::to_string(&Layout::Modern).unwrap(), "\"modern\"");
    }

    #[test]
    fn test_stock_level_floor() {
        assert_eq!(stock_level_floor(3001), 2981);
        assert_eq!(stock_level_floor(5), 1);
    }

    #[test]
    fn test_manifest_matching() {
        let scale = ScaleParameters::make_scaled(1, 100.0).unwrap();
        let manifest = LoadManifest {
            scale,
            workers: 2,
            layout: Layout::Classic,
            constants: NuRandConstants {
                c_last: 1,
                c_id: 2,
                order_line_item_id: 3,
            },
        };
        assert!(manifest.matches(&scale, 2, Layout::Classic));
        assert!(!manifest.matches(&scale, 3, Layout::Classic));
        assert!(!manifest.matches(&scale, 2, Layout::Modern));
    }
}
