// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! TPC-C entities.
//!
//! This module defines the rows/documents every backend stores:
//! - [`Warehouse`], [`District`], [`Customer`], [`History`]
//! - [`Item`], [`Stock`]
//! - [`Order`], [`OrderLine`], [`NewOrder`]
//!
//! Monetary values are `f64` with two (or four, for rates) fractional digits.
//! Timestamps are milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};

/// Marker spliced into item and stock data of "original" rows.
pub const ORIGINAL_MARKER: &str = "ORIGINAL";

/// Maximum length of a customer's data blob.
pub const MAX_CUSTOMER_DATA: usize = 500;

/// Number of district-distribution strings on every stock row.
pub const STOCK_DISTS: usize = 10;

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Street address shared by warehouses, districts and customers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street_1: String,
    pub street_2: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warehouse {
    pub w_id: u32,
    pub name: String,
    pub address: Address,
    pub tax: f64,
    pub ytd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    pub w_id: u32,
    pub d_id: u32,
    pub name: String,
    pub address: Address,
    pub tax: f64,
    pub ytd: f64,
    /// Id the next NewOrder in this district receives.
    pub next_o_id: u32,
}

/// Customer credit rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Credit {
    #[serde(rename = "GC")]
    Good,
    #[serde(rename = "BC")]
    Bad,
}

impl Credit {
    /// Two-letter code stored by the SQL layouts.
    pub fn code(self) -> &'static str {
        match self {
            Credit::Good => "GC",
            Credit::Bad => "BC",
        }
    }

    /// Parses a two-letter credit code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "GC" => Some(Credit::Good),
            "BC" => Some(Credit::Bad),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub w_id: u32,
    pub d_id: u32,
    pub c_id: u32,
    pub first: String,
    pub middle: String,
    pub last: String,
    pub address: Address,
    pub phone: String,
    pub since: i64,
    pub credit: Credit,
    pub credit_lim: f64,
    pub discount: f64,
    pub balance: f64,
    pub ytd_payment: f64,
    pub payment_cnt: u32,
    pub delivery_cnt: u32,
    pub data: String,
}

/// Append-only payment log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub c_id: u32,
    pub c_d_id: u32,
    pub c_w_id: u32,
    pub d_id: u32,
    pub w_id: u32,
    pub date: i64,
    pub amount: f64,
    pub data: String,
}

/// Read-only catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub i_id: u32,
    pub im_id: u32,
    pub name: String,
    pub price: f64,
    pub data: String,
}

impl Item {
    /// True when the item data carries [`ORIGINAL_MARKER`].
    pub fn is_original(&self) -> bool {
        self.data.contains(ORIGINAL_MARKER)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub w_id: u32,
    pub i_id: u32,
    pub quantity: u32,
    pub dists: [String; STOCK_DISTS],
    pub ytd: u32,
    pub order_cnt: u32,
    pub remote_cnt: u32,
    pub data: String,
}

impl Stock {
    /// Distribution string of district `d_id` (1-based).
    pub fn dist_info(&self, d_id: u32) -> &str {
        let idx = (d_id.max(1) as usize - 1) % STOCK_DISTS;
        &self.dists[idx]
    }

    /// True when the stock data carries [`ORIGINAL_MARKER`].
    pub fn is_original(&self) -> bool {
        self.data.contains(ORIGINAL_MARKER)
    }
}

/// Order header. Lines are stored alongside or embedded depending on the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub w_id: u32,
    pub d_id: u32,
    pub o_id: u32,
    pub c_id: u32,
    pub entry_d: i64,
    /// `None` while the order is undelivered.
    pub carrier_id: Option<u32>,
    pub delivery_d: Option<i64>,
    pub ol_cnt: u32,
    pub all_local: bool,
}

impl Order {
    /// True until a Delivery assigns a carrier.
    pub fn is_undelivered(&self) -> bool {
        self.carrier_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub w_id: u32,
    pub d_id: u32,
    pub o_id: u32,
    pub number: u32,
    pub i_id: u32,
    pub supply_w_id: u32,
    pub delivery_d: Option<i64>,
    pub quantity: u32,
    pub amount: f64,
    pub dist_info: String,
}

/// Backlog marker of an undelivered order (classic layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub w_id: u32,
    pub d_id: u32,
    pub o_id: u32,
}

/// Entity kinds, used for row counts and schema bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    Warehouse,
    District,
    Customer,
    History,
    Item,
    Stock,
    Order,
    OrderLine,
    NewOrder,
}

impl Entity {
    /// Every entity kind.
    pub const ALL: [Entity; 9] = [
        Entity::Warehouse,
        Entity::District,
        Entity::Customer,
        Entity::History,
        Entity::Item,
        Entity::Stock,
        Entity::Order,
        Entity::OrderLine,
        Entity::NewOrder,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Entity::Warehouse => "warehouse",
            Entity::District => "district",
            Entity::Customer => "customer",
            Entity::History => "history",
            Entity::Item => "item",
            Entity::Stock => "stock",
            Entity::Order => "orders",
            Entity::OrderLine => "order_line",
            Entity::NewOrder => "new_order",
        }
    }
}
