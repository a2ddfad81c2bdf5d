// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Shared SQL implementation of the workload session.
//!
//! [`SqlSession`] implements every [`WorkloadSession`] operation once, for
//! both layouts, over the small [`SqlConnection`] surface an engine binding
//! provides. Statements use `?` placeholders and portable types: `BIGINT`
//! for ids, counters and timestamps, `DOUBLE` for money and rates, `VARCHAR`
//! and `TEXT` for strings. Booleans are stored as 0/1.
//!
//! In the modern layout `orders` carries its lines as a JSON array
//! (`o_lines`) and the backlog as the `o_undelivered` flag; the `order_line`
//! and `new_order` tables do not exist.

use std::collections::BTreeSet;

use super::{stock_level_floor, Layout, LoadManifest, OrderSlot, WorkloadSession};
use crate::error::{Result, TpccError};
use crate::types::{
    Address, Credit, Customer, District, Entity, History, Item, Order, OrderLine, Stock,
    Warehouse, STOCK_DISTS,
};

// ============================================================================
// Values and rows
// ============================================================================

/// A value bound to or read from a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Builds a `[SqlValue; N]` from heterogeneous expressions.
macro_rules! sql_params {
    ($($value:expr),* $(,)?) => {
        [$($crate::store::sql::SqlValue::from($value)),*]
    };
}

/// One result row.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow(Vec<SqlValue>);

impl SqlRow {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self(values)
    }

    fn value(&self, idx: usize) -> Result<&SqlValue> {
        self.0
            .get(idx)
            .ok_or_else(|| TpccError::Decode(format!("row has no column {idx}")))
    }

    pub fn int(&self, idx: usize) -> Result<i64> {
        match self.value(idx)? {
            SqlValue::Int(v) => Ok(*v),
            other => Err(TpccError::Decode(format!(
                "column {idx}: expected integer, found {other:?}"
            ))),
        }
    }

    pub fn opt_int(&self, idx: usize) -> Result<Option<i64>> {
        match self.value(idx)? {
            SqlValue::Null => Ok(None),
            _ => self.int(idx).map(Some),
        }
    }

    pub fn u32(&self, idx: usize) -> Result<u32> {
        let v = self.int(idx)?;
        u32::try_from(v)
            .map_err(|_| TpccError::Decode(format!("column {idx}: {v} out of range for u32")))
    }

    pub fn opt_u32(&self, idx: usize) -> Result<Option<u32>> {
        match self.value(idx)? {
            SqlValue::Null => Ok(None),
            _ => self.u32(idx).map(Some),
        }
    }

    pub fn real(&self, idx: usize) -> Result<f64> {
        match self.value(idx)? {
            SqlValue::Real(v) => Ok(*v),
            SqlValue::Int(v) => Ok(*v as f64),
            other => Err(TpccError::Decode(format!(
                "column {idx}: expected number, found {other:?}"
            ))),
        }
    }

    pub fn text(&self, idx: usize) -> Result<String> {
        match self.value(idx)? {
            SqlValue::Text(v) => Ok(v.clone()),
            other => Err(TpccError::Decode(format!(
                "column {idx}: expected text, found {other:?}"
            ))),
        }
    }

    pub fn flag(&self, idx: usize) -> Result<bool> {
        Ok(self.int(idx)? != 0)
    }

    fn address(&self, start: usize) -> Result<Address> {
        Ok(Address {
            street_1: self.text(start)?,
            street_2: self.text(start + 1)?,
            city: self.text(start + 2)?,
            state: self.text(start + 3)?,
            zip: self.text(start + 4)?,
        })
    }
}

/// The surface an engine binding provides to [`SqlSession`].
pub trait SqlConnection {
    /// Statement that opens a unit of work.
    const BEGIN: &'static str;

    /// Runs a statement and returns the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize>;

    /// Runs a query returning `columns` values per row.
    fn query(&mut self, sql: &str, params: &[SqlValue], columns: usize) -> Result<Vec<SqlRow>>;

    /// Runs one or more statements without parameters.
    fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Appends full rows to `table`, in column order.
    fn insert_rows(&mut self, table: &str, columns: &str, rows: Vec<Vec<SqlValue>>) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({})",
            placeholders(first.len())
        );
        for row in rows {
            self.execute(&sql, &row)?;
        }
        Ok(())
    }
}

/// `?, ?, ...` with `n` placeholders.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn width(columns: &str) -> usize {
    columns.split(',').count()
}

// ============================================================================
// Schema
// ============================================================================

const DROP_TABLES: &str = "
DROP TABLE IF EXISTS new_order;
DROP TABLE IF EXISTS order_line;
DROP TABLE IF EXISTS orders;
DROP TABLE IF EXISTS history;
DROP TABLE IF EXISTS stock;
DROP TABLE IF EXISTS item;
DROP TABLE IF EXISTS customer;
DROP TABLE IF EXISTS district;
DROP TABLE IF EXISTS warehouse;
DROP TABLE IF EXISTS tpcc_meta;
";

const CREATE_META: &str = "CREATE TABLE IF NOT EXISTS tpcc_meta (
    meta_key VARCHAR NOT NULL PRIMARY KEY,
    meta_value TEXT NOT NULL
);";

const CREATE_COMMON: &str = "
CREATE TABLE warehouse (
    w_id BIGINT NOT NULL,
    w_name VARCHAR(10),
    w_street_1 VARCHAR(20),
    w_street_2 VARCHAR(20),
    w_city VARCHAR(20),
    w_state VARCHAR(2),
    w_zip VARCHAR(9),
    w_tax DOUBLE,
    w_ytd DOUBLE,
    PRIMARY KEY (w_id)
);
CREATE TABLE district (
    d_w_id BIGINT NOT NULL,
    d_id BIGINT NOT NULL,
    d_name VARCHAR(10),
    d_street_1 VARCHAR(20),
    d_street_2 VARCHAR(20),
    d_city VARCHAR(20),
    d_state VARCHAR(2),
    d_zip VARCHAR(9),
    d_tax DOUBLE,
    d_ytd DOUBLE,
    d_next_o_id BIGINT,
    PRIMARY KEY (d_w_id, d_id)
);
CREATE TABLE customer (
    c_w_id BIGINT NOT NULL,
    c_d_id BIGINT NOT NULL,
    c_id BIGINT NOT NULL,
    c_first VARCHAR(16),
    c_middle VARCHAR(2),
    c_last VARCHAR(16),
    c_street_1 VARCHAR(20),
    c_street_2 VARCHAR(20),
    c_city VARCHAR(20),
    c_state VARCHAR(2),
    c_zip VARCHAR(9),
    c_phone VARCHAR(16),
    c_since BIGINT,
    c_credit VARCHAR(2),
    c_credit_lim DOUBLE,
    c_discount DOUBLE,
    c_balance DOUBLE,
    c_ytd_payment DOUBLE,
    c_payment_cnt BIGINT,
    c_delivery_cnt BIGINT,
    c_data TEXT,
    PRIMARY KEY (c_w_id, c_d_id, c_id)
);
CREATE TABLE history (
    h_c_id BIGINT,
    h_c_d_id BIGINT,
    h_c_w_id BIGINT,
    h_d_id BIGINT,
    h_w_id BIGINT,
    h_date BIGINT,
    h_amount DOUBLE,
    h_data VARCHAR(24)
);
CREATE TABLE item (
    i_id BIGINT NOT NULL,
    i_im_id BIGINT,
    i_name VARCHAR(24),
    i_price DOUBLE,
    i_data VARCHAR(50),
    PRIMARY KEY (i_id)
);
CREATE TABLE stock (
    s_w_id BIGINT NOT NULL,
    s_i_id BIGINT NOT NULL,
    s_quantity BIGINT,
    s_dist_01 VARCHAR(24),
    s_dist_02 VARCHAR(24),
    s_dist_03 VARCHAR(24),
    s_dist_04 VARCHAR(24),
    s_dist_05 VARCHAR(24),
    s_dist_06 VARCHAR(24),
    s_dist_07 VARCHAR(24),
    s_dist_08 VARCHAR(24),
    s_dist_09 VARCHAR(24),
    s_dist_10 VARCHAR(24),
    s_ytd BIGINT,
    s_order_cnt BIGINT,
    s_remote_cnt BIGINT,
    s_data VARCHAR(50),
    PRIMARY KEY (s_w_id, s_i_id)
);
";

const CREATE_CLASSIC: &str = "
CREATE TABLE orders (
    o_w_id BIGINT NOT NULL,
    o_d_id BIGINT NOT NULL,
    o_id BIGINT NOT NULL,
    o_c_id BIGINT,
    o_entry_d BIGINT,
    o_carrier_id BIGINT,
    o_delivery_d BIGINT,
    o_ol_cnt BIGINT,
    o_all_local BIGINT,
    PRIMARY KEY (o_w_id, o_d_id, o_id)
);
CREATE TABLE order_line (
    ol_w_id BIGINT NOT NULL,
    ol_d_id BIGINT NOT NULL,
    ol_o_id BIGINT NOT NULL,
    ol_number BIGINT NOT NULL,
    ol_i_id BIGINT,
    ol_supply_w_id BIGINT,
    ol_delivery_d BIGINT,
    ol_quantity BIGINT,
    ol_amount DOUBLE,
    ol_dist_info VARCHAR(24),
    PRIMARY KEY (ol_w_id, ol_d_id, ol_o_id, ol_number)
);
CREATE TABLE new_order (
    no_w_id BIGINT NOT NULL,
    no_d_id BIGINT NOT NULL,
    no_o_id BIGINT NOT NULL,
    PRIMARY KEY (no_w_id, no_d_id, no_o_id)
);
";

const CREATE_MODERN: &str = "
CREATE TABLE orders (
    o_w_id BIGINT NOT NULL,
    o_d_id BIGINT NOT NULL,
    o_id BIGINT NOT NULL,
    o_c_id BIGINT,
    o_entry_d BIGINT,
    o_carrier_id BIGINT,
    o_delivery_d BIGINT,
    o_ol_cnt BIGINT,
    o_all_local BIGINT,
    o_lines TEXT,
    o_undelivered BIGINT,
    PRIMARY KEY (o_w_id, o_d_id, o_id)
);
";

// Stock is keyed by (s_w_id, s_i_id) through its primary key.
const CREATE_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_customer_name ON customer (c_w_id, c_d_id, c_last, c_first);
CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders (o_w_id, o_d_id, o_c_id, o_id);
";

/// Full DDL for `layout`, including the metadata table.
pub fn schema(layout: Layout) -> String {
    let orders = match layout {
        Layout::Classic => CREATE_CLASSIC,
        Layout::Modern => CREATE_MODERN,
    };
    format!("{CREATE_META}\n{CREATE_COMMON}\n{orders}")
}

// ============================================================================
// Column lists and row codecs
// ============================================================================

const WAREHOUSE_COLUMNS: &str =
    "w_id, w_name, w_street_1, w_street_2, w_city, w_state, w_zip, w_tax, w_ytd";
const DISTRICT_COLUMNS: &str = "d_w_id, d_id, d_name, d_street_1, d_street_2, d_city, d_state, \
     d_zip, d_tax, d_ytd, d_next_o_id";
const CUSTOMER_COLUMNS: &str = "c_w_id, c_d_id, c_id, c_first, c_middle, c_last, c_street_1, \
     c_street_2, c_city, c_state, c_zip, c_phone, c_since, c_credit, c_credit_lim, c_discount, \
     c_balance, c_ytd_payment, c_payment_cnt, c_delivery_cnt, c_data";
const HISTORY_COLUMNS: &str =
    "h_c_id, h_c_d_id, h_c_w_id, h_d_id, h_w_id, h_date, h_amount, h_data";
const ITEM_COLUMNS: &str = "i_id, i_im_id, i_name, i_price, i_data";
const STOCK_COLUMNS: &str = "s_w_id, s_i_id, s_quantity, s_dist_01, s_dist_02, s_dist_03, \
     s_dist_04, s_dist_05, s_dist_06, s_dist_07, s_dist_08, s_dist_09, s_dist_10, s_ytd, \
     s_order_cnt, s_remote_cnt, s_data";
const ORDER_COLUMNS: &str = "o_w_id, o_d_id, o_id, o_c_id, o_entry_d, o_carrier_id, \
     o_delivery_d, o_ol_cnt, o_all_local";
const MODERN_ORDER_COLUMNS: &str = "o_w_id, o_d_id, o_id, o_c_id, o_entry_d, o_carrier_id, \
     o_delivery_d, o_ol_cnt, o_all_local, o_lines, o_undelivered";
const ORDER_LINE_COLUMNS: &str = "ol_w_id, ol_d_id, ol_o_id, ol_number, ol_i_id, \
     ol_supply_w_id, ol_delivery_d, ol_quantity, ol_amount, ol_dist_info";

fn address_values(a: &Address, out: &mut Vec<SqlValue>) {
    out.extend(sql_params![&a.street_1, &a.street_2, &a.city, &a.state, &a.zip]);
}

fn warehouse_values(w: &Warehouse) -> Vec<SqlValue> {
    let mut v = Vec::from(sql_params![w.w_id, &w.name]);
    address_values(&w.address, &mut v);
    v.extend(sql_params![w.tax, w.ytd]);
    v
}

fn decode_warehouse(row: &SqlRow) -> Result<Warehouse> {
    Ok(Warehouse {
        w_id: row.u32(0)?,
        name: row.text(1)?,
        address: row.address(2)?,
        tax: row.real(7)?,
        ytd: row.real(8)?,
    })
}

fn district_values(d: &District) -> Vec<SqlValue> {
    let mut v = Vec::from(sql_params![d.w_id, d.d_id, &d.name]);
    address_values(&d.address, &mut v);
    v.extend(sql_params![d.tax, d.ytd, d.next_o_id]);
    v
}

fn decode_district(row: &SqlRow) -> Result<District> {
    Ok(District {
        w_id: row.u32(0)?,
        d_id: row.u32(1)?,
        name: row.text(2)?,
        address: row.address(3)?,
        tax: row.real(8)?,
        ytd: row.real(9)?,
        next_o_id: row.u32(10)?,
    })
}

fn customer_values(c: &Customer) -> Vec<SqlValue> {
    let mut v = Vec::from(sql_params![c.w_id, c.d_id, c.c_id, &c.first, &c.middle, &c.last]);
    address_values(&c.address, &mut v);
    v.extend(sql_params![
        &c.phone,
        c.since,
        c.credit.code(),
        c.credit_lim,
        c.discount,
        c.balance,
        c.ytd_payment,
        c.payment_cnt,
        c.delivery_cnt,
        &c.data,
    ]);
    v
}

fn decode_customer(row: &SqlRow) -> Result<Customer> {
    let code = row.text(13)?;
    let credit = Credit::from_code(&code)
        .ok_or_else(|| TpccError::Decode(format!("unknown credit code '{code}'")))?;
    Ok(Customer {
        w_id: row.u32(0)?,
        d_id: row.u32(1)?,
        c_id: row.u32(2)?,
        first: row.text(3)?,
        middle: row.text(4)?,
        last: row.text(5)?,
        address: row.address(6)?,
        phone: row.text(11)?,
        since: row.int(12)?,
        credit,
        credit_lim: row.real(14)?,
        discount: row.real(15)?,
        balance: row.real(16)?,
        ytd_payment: row.real(17)?,
        payment_cnt: row.u32(18)?,
        delivery_cnt: row.u32(19)?,
        data: row.text(20)?,
    })
}

fn history_values(h: &History) -> Vec<SqlValue> {
    Vec::from(sql_params![
        h.c_id, h.c_d_id, h.c_w_id, h.d_id, h.w_id, h.date, h.amount, &h.data,
    ])
}

fn item_values(i: &Item) -> Vec<SqlValue> {
    Vec::from(sql_params![i.i_id, i.im_id, &i.name, i.price, &i.data])
}

fn decode_item(row: &SqlRow) -> Result<Item> {
    Ok(Item {
        i_id: row.u32(0)?,
        im_id: row.u32(1)?,
        name: row.text(2)?,
        price: row.real(3)?,
        data: row.text(4)?,
    })
}

fn stock_values(s: &Stock) -> Vec<SqlValue> {
    let mut v = Vec::from(sql_params![s.w_id, s.i_id, s.quantity]);
    v.extend(s.dists.iter().map(SqlValue::from));
    v.extend(sql_params![s.ytd, s.order_cnt, s.remote_cnt, &s.data]);
    v
}

fn decode_stock(row: &SqlRow) -> Result<Stock> {
    let dists: [String; STOCK_DISTS] = (0..STOCK_DISTS)
        .map(|i| row.text(3 + i))
        .collect::<Result<Vec<_>>>()?
        .try_into()
        .map_err(|_| TpccError::Decode("stock row without ten districts".to_string()))?;
    Ok(Stock {
        w_id: row.u32(0)?,
        i_id: row.u32(1)?,
        quantity: row.u32(2)?,
        dists,
        ytd: row.u32(13)?,
        order_cnt: row.u32(14)?,
        remote_cnt: row.u32(15)?,
        data: row.text(16)?,
    })
}

fn order_values(o: &Order) -> Vec<SqlValue> {
    Vec::from(sql_params![
        o.w_id,
        o.d_id,
        o.o_id,
        o.c_id,
        o.entry_d,
        o.carrier_id,
        o.delivery_d,
        o.ol_cnt,
        o.all_local,
    ])
}

fn decode_order(row: &SqlRow) -> Result<Order> {
    Ok(Order {
        w_id: row.u32(0)?,
        d_id: row.u32(1)?,
        o_id: row.u32(2)?,
        c_id: row.u32(3)?,
        entry_d: row.int(4)?,
        carrier_id: row.opt_u32(5)?,
        delivery_d: row.opt_int(6)?,
        ol_cnt: row.u32(7)?,
        all_local: row.flag(8)?,
    })
}

fn order_line_values(l: &OrderLine) -> Vec<SqlValue> {
    Vec::from(sql_params![
        l.w_id,
        l.d_id,
        l.o_id,
        l.number,
        l.i_id,
        l.supply_w_id,
        l.delivery_d,
        l.quantity,
        l.amount,
        &l.dist_info,
    ])
}

fn decode_order_line(row: &SqlRow) -> Result<OrderLine> {
    Ok(OrderLine {
        w_id: row.u32(0)?,
        d_id: row.u32(1)?,
        o_id: row.u32(2)?,
        number: row.u32(3)?,
        i_id: row.u32(4)?,
        supply_w_id: row.u32(5)?,
        delivery_d: row.opt_int(6)?,
        quantity: row.u32(7)?,
        amount: row.real(8)?,
        dist_info: row.text(9)?,
    })
}

/// Embedded lines of a modern order row.
fn decode_embedded_lines(row: &SqlRow, idx: usize) -> Result<Vec<OrderLine>> {
    Ok(serde_json::from_str(&row.text(idx)?)?)
}

// ============================================================================
// Session
// ============================================================================

/// A [`WorkloadSession`] over any [`SqlConnection`].
pub struct SqlSession<C> {
    conn: C,
    layout: Layout,
}

impl<C: SqlConnection> SqlSession<C> {
    pub fn new(conn: C, layout: Layout) -> Self {
        Self { conn, layout }
    }

    /// The underlying connection.
    pub fn connection(&mut self) -> &mut C {
        &mut self.conn
    }

    fn order_columns(&self) -> &'static str {
        match self.layout {
            Layout::Classic => ORDER_COLUMNS,
            Layout::Modern => MODERN_ORDER_COLUMNS,
        }
    }

    /// Runs an update that must touch exactly one row.
    fn update_one(&mut self, sql: &str, params: &[SqlValue], what: &str) -> Result<()> {
        match self.conn.execute(sql, params)? {
            1 => Ok(()),
            n => Err(TpccError::invariant(format!("{what}: updated {n} rows, expected 1"))),
        }
    }

    fn query_one(&mut self, sql: &str, params: &[SqlValue], columns: usize) -> Result<Option<SqlRow>> {
        Ok(self.conn.query(sql, params, columns)?.into_iter().next())
    }

    fn scalar(&mut self, sql: &str, params: &[SqlValue]) -> Result<i64> {
        self.query_one(sql, params, 1)?
            .ok_or_else(|| TpccError::Decode(format!("no row for scalar query: {sql}")))?
            .int(0)
    }

    fn decode_order_row(&mut self, row: &SqlRow) -> Result<(Order, Vec<OrderLine>)> {
        let order = decode_order(row)?;
        let lines = match self.layout {
            Layout::Modern => decode_embedded_lines(row, 9)?,
            Layout::Classic => {
                let sql = format!(
                    "SELECT {ORDER_LINE_COLUMNS} FROM order_line \
                     WHERE ol_w_id = ? AND ol_d_id = ? AND ol_o_id = ? ORDER BY ol_number"
                );
                self.conn
                    .query(
                        &sql,
                        &sql_params![order.w_id, order.d_id, order.o_id],
                        width(ORDER_LINE_COLUMNS),
                    )?
                    .iter()
                    .map(decode_order_line)
                    .collect::<Result<Vec<_>>>()?
            }
        };
        Ok((order, lines))
    }
}

impl<C: SqlConnection> WorkloadSession for SqlSession<C> {
    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch(C::BEGIN)
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")
    }

    fn reset_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(DROP_TABLES)?;
        self.conn.execute_batch(&schema(self.layout))
    }

    fn create_indexes(&mut self) -> Result<()> {
        self.conn.execute_batch(CREATE_INDEXES)
    }

    fn load_manifest(&mut self) -> Result<Option<LoadManifest>> {
        self.conn.execute_batch(CREATE_META)?;
        match self.query_one(
            "SELECT meta_value FROM tpcc_meta WHERE meta_key = ?",
            &sql_params!["manifest"],
            1,
        )? {
            Some(row) => Ok(Some(serde_json::from_str(&row.text(0)?)?)),
            None => Ok(None),
        }
    }

    fn record_manifest(&mut self, manifest: &LoadManifest) -> Result<()> {
        let json = serde_json::to_string(manifest)?;
        self.conn.execute_batch(CREATE_META)?;
        let updated = self.conn.execute(
            "UPDATE tpcc_meta SET meta_value = ? WHERE meta_key = ?",
            &sql_params![json.as_str(), "manifest"],
        )?;
        if updated == 0 {
            self.conn.execute(
                "INSERT INTO tpcc_meta (meta_key, meta_value) VALUES (?, ?)",
                &sql_params!["manifest", json],
            )?;
        }
        Ok(())
    }

    fn insert_items(&mut self, items: &[Item]) -> Result<()> {
        self.conn
            .insert_rows("item", ITEM_COLUMNS, items.iter().map(item_values).collect())
    }

    fn insert_warehouse(&mut self, warehouse: &Warehouse) -> Result<()> {
        self.conn.insert_rows(
            "warehouse",
            WAREHOUSE_COLUMNS,
            vec![warehouse_values(warehouse)],
        )
    }

    fn insert_districts(&mut self, districts: &[District]) -> Result<()> {
        self.conn.insert_rows(
            "district",
            DISTRICT_COLUMNS,
            districts.iter().map(district_values).collect(),
        )
    }

    fn insert_customers(&mut self, customers: &[Customer]) -> Result<()> {
        self.conn.insert_rows(
            "customer",
            CUSTOMER_COLUMNS,
            customers.iter().map(customer_values).collect(),
        )
    }

    fn insert_stock(&mut self, stock: &[Stock]) -> Result<()> {
        self.conn
            .insert_rows("stock", STOCK_COLUMNS, stock.iter().map(stock_values).collect())
    }

    fn insert_history(&mut self, history: &History) -> Result<()> {
        let sql = format!(
            "INSERT INTO history ({HISTORY_COLUMNS}) VALUES ({})",
            placeholders(width(HISTORY_COLUMNS))
        );
        self.conn.execute(&sql, &history_values(history))?;
        Ok(())
    }

    fn insert_order(&mut self, order: &Order, lines: &[OrderLine]) -> Result<()> {
        match self.layout {
            Layout::Modern => {
                let mut row = order_values(order);
                row.push(SqlValue::Text(serde_json::to_string(lines)?));
                row.push(SqlValue::from(order.is_undelivered()));
                let sql = format!(
                    "INSERT INTO orders ({MODERN_ORDER_COLUMNS}) VALUES ({})",
                    placeholders(row.len())
                );
                self.conn.execute(&sql, &row)?;
            }
            Layout::Classic => {
                let sql = format!(
                    "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ({})",
                    placeholders(width(ORDER_COLUMNS))
                );
                self.conn.execute(&sql, &order_values(order))?;
                self.conn.insert_rows(
                    "order_line",
                    ORDER_LINE_COLUMNS,
                    lines.iter().map(order_line_values).collect(),
                )?;
                if order.is_undelivered() {
                    self.conn.execute(
                        "INSERT INTO new_order (no_w_id, no_d_id, no_o_id) VALUES (?, ?, ?)",
                        &sql_params![order.w_id, order.d_id, order.o_id],
                    )?;
                }
            }
        }
        Ok(())
    }

    fn warehouse(&mut self, w_id: u32) -> Result<Option<Warehouse>> {
        let sql = format!("SELECT {WAREHOUSE_COLUMNS} FROM warehouse WHERE w_id = ?");
        self.query_one(&sql, &sql_params![w_id], width(WAREHOUSE_COLUMNS))?
            .map(|row| decode_warehouse(&row))
            .transpose()
    }

    fn district(&mut self, w_id: u32, d_id: u32) -> Result<Option<District>> {
        let sql = format!("SELECT {DISTRICT_COLUMNS} FROM district WHERE d_w_id = ? AND d_id = ?");
        self.query_one(&sql, &sql_params![w_id, d_id], width(DISTRICT_COLUMNS))?
            .map(|row| decode_district(&row))
            .transpose()
    }

    fn customer_by_id(&mut self, w_id: u32, d_id: u32, c_id: u32) -> Result<Option<Customer>> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer WHERE c_w_id = ? AND c_d_id = ? AND c_id = ?"
        );
        self.query_one(&sql, &sql_params![w_id, d_id, c_id], width(CUSTOMER_COLUMNS))?
            .map(|row| decode_customer(&row))
            .transpose()
    }

    fn customers_by_last_name(
        &mut self,
        w_id: u32,
        d_id: u32,
        last: &str,
    ) -> Result<Vec<Customer>> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customer \
             WHERE c_w_id = ? AND c_d_id = ? AND c_last = ? ORDER BY c_first, c_id"
        );
        self.conn
            .query(&sql, &sql_params![w_id, d_id, last], width(CUSTOMER_COLUMNS))?
            .iter()
            .map(decode_customer)
            .collect()
    }

    fn items_by_ids(&mut self, ids: &[u32]) -> Result<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM item WHERE i_id IN ({})",
            placeholders(ids.len())
        );
        let params: Vec<SqlValue> = ids.iter().map(|&id| SqlValue::from(id)).collect();
        self.conn
            .query(&sql, &params, width(ITEM_COLUMNS))?
            .iter()
            .map(decode_item)
            .collect()
    }

    fn next_order_id(&mut self, w_id: u32, d_id: u32) -> Result<OrderSlot> {
        self.update_one(
            "UPDATE district SET d_next_o_id = d_next_o_id + 1 WHERE d_w_id = ? AND d_id = ?",
            &sql_params![w_id, d_id],
            "district counter",
        )?;
        let row = self
            .query_one(
                "SELECT d_next_o_id - 1, d_tax FROM district WHERE d_w_id = ? AND d_id = ?",
                &sql_params![w_id, d_id],
                2,
            )?
            .ok_or_else(|| TpccError::invariant(format!("no district {w_id}/{d_id}")))?;
        Ok(OrderSlot {
            o_id: row.u32(0)?,
            d_tax: row.real(1)?,
        })
    }

    fn stock_for_update(&mut self, w_id: u32, i_ids: &[u32]) -> Result<Vec<Stock>> {
        if i_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM stock WHERE s_w_id = ? AND s_i_id IN ({})",
            placeholders(i_ids.len())
        );
        let mut params = vec![SqlValue::from(w_id)];
        params.extend(i_ids.iter().map(|&id| SqlValue::from(id)));
        self.conn
            .query(&sql, &params, width(STOCK_COLUMNS))?
            .iter()
            .map(decode_stock)
            .collect()
    }

    fn update_stock(&mut self, stock: &Stock) -> Result<()> {
        self.update_one(
            "UPDATE stock SET s_quantity = ?, s_ytd = ?, s_order_cnt = ?, s_remote_cnt = ? \
             WHERE s_w_id = ? AND s_i_id = ?",
            &sql_params![
                stock.quantity,
                stock.ytd,
                stock.order_cnt,
                stock.remote_cnt,
                stock.w_id,
                stock.i_id,
            ],
            "stock",
        )
    }

    fn add_district_ytd(&mut self, w_id: u32, d_id: u32, amount: f64) -> Result<District> {
        self.update_one(
            "UPDATE district SET d_ytd = d_ytd + ? WHERE d_w_id = ? AND d_id = ?",
            &sql_params![amount, w_id, d_id],
            "district ytd",
        )?;
        self.district(w_id, d_id)?
            .ok_or_else(|| TpccError::invariant(format!("no district {w_id}/{d_id}")))
    }

    fn add_warehouse_ytd(&mut self, w_id: u32, amount: f64) -> Result<Warehouse> {
        self.update_one(
            "UPDATE warehouse SET w_ytd = w_ytd + ? WHERE w_id = ?",
            &sql_params![amount, w_id],
            "warehouse ytd",
        )?;
        self.warehouse(w_id)?
            .ok_or_else(|| TpccError::invariant(format!("no warehouse {w_id}")))
    }

    fn update_customer_payment(&mut self, customer: &Customer) -> Result<()> {
        self.update_one(
            "UPDATE customer SET c_balance = ?, c_ytd_payment = ?, c_payment_cnt = ?, c_data = ? \
             WHERE c_w_id = ? AND c_d_id = ? AND c_id = ?",
            &sql_params![
                customer.balance,
                customer.ytd_payment,
                customer.payment_cnt,
                &customer.data,
                customer.w_id,
                customer.d_id,
                customer.c_id,
            ],
            "customer payment",
        )
    }

    fn last_order(
        &mut self,
        w_id: u32,
        d_id: u32,
        c_id: u32,
    ) -> Result<Option<(Order, Vec<OrderLine>)>> {
        let columns = self.order_columns();
        let sql = format!(
            "SELECT {columns} FROM orders WHERE o_w_id = ? AND o_d_id = ? AND o_c_id = ? \
             ORDER BY o_id DESC LIMIT 1"
        );
        match self.query_one(&sql, &sql_params![w_id, d_id, c_id], width(columns))? {
            Some(row) => self.decode_order_row(&row).map(Some),
            None => Ok(None),
        }
    }

    fn oldest_undelivered(&mut self, w_id: u32, d_id: u32) -> Result<Option<u32>> {
        let sql = match self.layout {
            Layout::Classic => {
                "SELECT no_o_id FROM new_order WHERE no_w_id = ? AND no_d_id = ? \
                 ORDER BY no_o_id LIMIT 1"
            }
            Layout::Modern => {
                "SELECT o_id FROM orders WHERE o_w_id = ? AND o_d_id = ? AND o_undelivered = 1 \
                 ORDER BY o_id LIMIT 1"
            }
        };
        self.query_one(sql, &sql_params![w_id, d_id], 1)?
            .map(|row| row.u32(0))
            .transpose()
    }

    fn order_with_lines(
        &mut self,
        w_id: u32,
        d_id: u32,
        o_id: u32,
    ) -> Result<Option<(Order, Vec<OrderLine>)>> {
        let columns = self.order_columns();
        let sql = format!("SELECT {columns} FROM orders WHERE o_w_id = ? AND o_d_id = ? AND o_id = ?");
        match self.query_one(&sql, &sql_params![w_id, d_id, o_id], width(columns))? {
            Some(row) => self.decode_order_row(&row).map(Some),
            None => Ok(None),
        }
    }

    fn complete_delivery(
        &mut self,
        w_id: u32,
        d_id: u32,
        o_id: u32,
        carrier_id: u32,
        delivery_d: i64,
    ) -> Result<()> {
        match self.layout {
            Layout::Classic => {
                let removed = self.conn.execute(
                    "DELETE FROM new_order WHERE no_w_id = ? AND no_d_id = ? AND no_o_id = ?",
                    &sql_params![w_id, d_id, o_id],
                )?;
                if removed != 1 {
                    return Err(TpccError::Conflict(format!(
                        "order {w_id}/{d_id}/{o_id} already delivered"
                    )));
                }
                self.update_one(
                    "UPDATE orders SET o_carrier_id = ?, o_delivery_d = ? \
                     WHERE o_w_id = ? AND o_d_id = ? AND o_id = ?",
                    &sql_params![carrier_id, delivery_d, w_id, d_id, o_id],
                    "order carrier",
                )?;
                self.conn.execute(
                    "UPDATE order_line SET ol_delivery_d = ? \
                     WHERE ol_w_id = ? AND ol_d_id = ? AND ol_o_id = ?",
                    &sql_params![delivery_d, w_id, d_id, o_id],
                )?;
            }
            Layout::Modern => {
                let (_, mut lines) = self
                    .order_with_lines(w_id, d_id, o_id)?
                    .ok_or_else(|| TpccError::invariant(format!("no order {w_id}/{d_id}/{o_id}")))?;
                for line in &mut lines {
                    line.delivery_d = Some(delivery_d);
                }
                let updated = self.conn.execute(
                    "UPDATE orders SET o_carrier_id = ?, o_delivery_d = ?, o_undelivered = 0, \
                     o_lines = ? WHERE o_w_id = ? AND o_d_id = ? AND o_id = ? AND o_undelivered = 1",
                    &sql_params![
                        carrier_id,
                        delivery_d,
                        serde_json::to_string(&lines)?,
                        w_id,
                        d_id,
                        o_id,
                    ],
                )?;
                if updated != 1 {
                    return Err(TpccError::Conflict(format!(
                        "order {w_id}/{d_id}/{o_id} already delivered"
                    )));
                }
            }
        }
        Ok(())
    }

    fn credit_customer_delivery(
        &mut self,
        w_id: u32,
        d_id: u32,
        c_id: u32,
        amount: f64,
    ) -> Result<()> {
        self.update_one(
            "UPDATE customer SET c_balance = c_balance + ?, c_delivery_cnt = c_delivery_cnt + 1 \
             WHERE c_w_id = ? AND c_d_id = ? AND c_id = ?",
            &sql_params![amount, w_id, d_id, c_id],
            "customer delivery",
        )
    }

    fn stock_level(
        &mut self,
        w_id: u32,
        d_id: u32,
        next_o_id: u32,
        threshold: u32,
    ) -> Result<u64> {
        let floor = stock_level_floor(next_o_id);
        let count = match self.layout {
            Layout::Classic => self.scalar(
                "SELECT COUNT(DISTINCT ol_i_id) FROM order_line, stock \
                 WHERE ol_w_id = ? AND ol_d_id = ? AND ol_o_id < ? AND ol_o_id >= ? \
                 AND s_w_id = ? AND s_i_id = ol_i_id AND s_quantity < ?",
                &sql_params![w_id, d_id, next_o_id, floor, w_id, threshold],
            )?,
            Layout::Modern => {
                let rows = self.conn.query(
                    "SELECT o_lines FROM orders \
                     WHERE o_w_id = ? AND o_d_id = ? AND o_id < ? AND o_id >= ?",
                    &sql_params![w_id, d_id, next_o_id, floor],
                    1,
                )?;
                let mut i_ids = BTreeSet::new();
                for row in &rows {
                    i_ids.extend(decode_embedded_lines(row, 0)?.iter().map(|l| l.i_id));
                }
                if i_ids.is_empty() {
                    return Ok(0);
                }
                let sql = format!(
                    "SELECT COUNT(*) FROM stock WHERE s_w_id = ? AND s_quantity < ? \
                     AND s_i_id IN ({})",
                    placeholders(i_ids.len())
                );
                let mut params = Vec::from(sql_params![w_id, threshold]);
                params.extend(i_ids.into_iter().map(SqlValue::from));
                self.scalar(&sql, &params)?
            }
        };
        Ok(count.max(0) as u64)
    }

    fn count(&mut self, entity: Entity) -> Result<u64> {
        let sql = match (entity, self.layout) {
            (Entity::OrderLine, Layout::Modern) => {
                "SELECT CAST(COALESCE(SUM(o_ol_cnt), 0) AS BIGINT) FROM orders".to_string()
            }
            (Entity::NewOrder, Layout::Modern) => {
                "SELECT COUNT(*) FROM orders WHERE o_undelivered = 1".to_string()
            }
            (entity, _) => format!("SELECT COUNT(*) FROM {}", entity.name()),
        };
        Ok(self.scalar(&sql, &[])?.max(0) as u64)
    }
}
