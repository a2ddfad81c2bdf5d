// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Embedded document store.
//!
//! All documents live in one ordered map keyed by a composite key. Keys
//! order documents by warehouse, district and id, so per-district scans are
//! plain range reads.
//!
//! Units of work buffer their writes. Reads see the latest committed state
//! overlaid with the unit of work's own writes; there is no snapshot. Commit
//! validation makes up for it:
//!
//! - a unit that writes: every written key whose version was observed must
//!   still carry that version, and blind inserts must not find an existing
//!   document (first committer wins, write skew on read-only keys is allowed);
//! - a read-only unit: every observed key must still carry the version it was
//!   read at, so a committed read-only unit saw a single committed state.
//!   Range scans do not detect documents inserted into the range afterwards.
//!
//! A failed validation is a [`TpccError::Conflict`].
//!
//! # Example
//!
//! ```rust
//! use synadb_tpcc::store::doc::DocStore;
//! use synadb_tpcc::store::{Layout, WorkloadSession, WorkloadStore};
//! use synadb_tpcc::types::Entity;
//!
//! let store = DocStore::new(Layout::Modern);
//! let mut session = store.open_session().unwrap();
//! session.reset_schema().unwrap();
//! assert_eq!(session.count(Entity::Item).unwrap(), 0);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{stock_level_floor, Layout, LoadManifest, OrderSlot, WorkloadSession, WorkloadStore};
use crate::error::{Result, TpccError};
use crate::types::{
    Customer, District, Entity, History, Item, NewOrder, Order, OrderLine, Stock, Warehouse,
};

const ENGINE: &str = "doc";
const MAX: u32 = u32::MAX;

/// Composite document key.
///
/// The derived ordering groups documents by kind, then by warehouse, district
/// and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum DocKey {
    Meta,
    Item(u32),
    Warehouse(u32),
    District(u32, u32),
    Customer(u32, u32, u32),
    Stock(u32, u32),
    Order(u32, u32, u32),
    OrderLine(u32, u32, u32, u32),
    NewOrder(u32, u32, u32),
    History(u64),
}

/// An order header. In the modern layout the lines are embedded.
#[derive(Debug, Clone)]
struct OrderDoc {
    order: Order,
    lines: Vec<OrderLine>,
}

#[derive(Debug, Clone)]
enum Document {
    Meta(LoadManifest),
    Item(Item),
    Warehouse(Warehouse),
    District(District),
    Customer(Customer),
    Stock(Stock),
    Order(OrderDoc),
    OrderLine(OrderLine),
    NewOrder(NewOrder),
    History(History),
}

impl Document {
    fn kind(&self) -> &'static str {
        match self {
            Document::Meta(_) => "meta",
            Document::Item(_) => "item",
            Document::Warehouse(_) => "warehouse",
            Document::District(_) => "district",
            Document::Customer(_) => "customer",
            Document::Stock(_) => "stock",
            Document::Order(_) => "order",
            Document::OrderLine(_) => "order_line",
            Document::NewOrder(_) => "new_order",
            Document::History(_) => "history",
        }
    }
}

macro_rules! document_accessors {
    ($($name:ident => $variant:ident($ty:ty)),* $(,)?) => {
        impl Document {
            $(
                fn $name(self) -> Result<$ty> {
                    match self {
                        Document::$variant(v) => Ok(v),
                        other => Err(TpccError::Decode(format!(
                            "expected {} document, found {}",
                            stringify!($variant),
                            other.kind()
                        ))),
                    }
                }
            )*
        }
    };
}

document_accessors! {
    into_meta => Meta(LoadManifest),
    into_item => Item(Item),
    into_warehouse => Warehouse(Warehouse),
    into_district => District(District),
    into_customer => Customer(Customer),
    into_stock => Stock(Stock),
    into_order => Order(OrderDoc),
    into_order_line => OrderLine(OrderLine),
}

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    doc: Document,
}

/// A buffered write.
#[derive(Debug, Clone)]
enum Write {
    /// Must not find an existing document unless the key was observed.
    Insert(Document),
    Put(Document),
    Delete,
}

impl Write {
    fn document(&self) -> Option<&Document> {
        match self {
            Write::Insert(doc) | Write::Put(doc) => Some(doc),
            Write::Delete => None,
        }
    }

    fn into_document(self) -> Option<Document> {
        match self {
            Write::Insert(doc) | Write::Put(doc) => Some(doc),
            Write::Delete => None,
        }
    }
}

struct DocState {
    layout: Layout,
    docs: BTreeMap<DocKey, Versioned>,
    /// Last committed version; absent documents have version 0.
    version: u64,
    indexed: bool,
    /// (w, d, last, first, c)
    by_name: BTreeSet<(u32, u32, String, String, u32)>,
    /// (w, d, c, o)
    by_customer: BTreeSet<(u32, u32, u32, u32)>,
    /// Undelivered orders of the modern layout: (w, d, o).
    backlog: BTreeSet<(u32, u32, u32)>,
}

impl DocState {
    fn new(layout: Layout) -> Self {
        Self {
            layout,
            docs: BTreeMap::new(),
            version: 0,
            indexed: false,
            by_name: BTreeSet::new(),
            by_customer: BTreeSet::new(),
            backlog: BTreeSet::new(),
        }
    }

    fn version_of(&self, key: &DocKey) -> u64 {
        self.docs.get(key).map_or(0, |v| v.version)
    }

    fn apply(&mut self, key: DocKey, write: Write) {
        if let Some(old) = self.docs.remove(&key) {
            self.unindex(&old.doc);
        }
        if let Some(doc) = write.into_document() {
            self.index(&doc);
            self.version += 1;
            self.docs.insert(
                key,
                Versioned {
                    version: self.version,
                    doc,
                },
            );
        }
    }

    fn index(&mut self, doc: &Document) {
        match doc {
            Document::Customer(c) if self.indexed => {
                self.by_name
                    .insert((c.w_id, c.d_id, c.last.clone(), c.first.clone(), c.c_id));
            }
            Document::Order(o) => {
                let order = &o.order;
                if self.indexed {
                    self.by_customer
                        .insert((order.w_id, order.d_id, order.c_id, order.o_id));
                }
                if self.layout == Layout::Modern && order.is_undelivered() {
                    self.backlog.insert((order.w_id, order.d_id, order.o_id));
                }
            }
            _ => {}
        }
    }

    fn unindex(&mut self, doc: &Document) {
        match doc {
            Document::Customer(c) => {
                self.by_name
                    .remove(&(c.w_id, c.d_id, c.last.clone(), c.first.clone(), c.c_id));
            }
            Document::Order(o) => {
                let order = &o.order;
                self.by_customer
                    .remove(&(order.w_id, order.d_id, order.c_id, order.o_id));
                self.backlog.remove(&(order.w_id, order.d_id, order.o_id));
            }
            _ => {}
        }
    }

    fn rebuild_indexes(&mut self) {
        self.indexed = true;
        self.by_name.clear();
        self.by_customer.clear();
        let docs = std::mem::take(&mut self.docs);
        for versioned in docs.values() {
            self.index(&versioned.doc);
        }
        self.docs = docs;
    }
}

struct DocShared {
    layout: Layout,
    state: RwLock<DocState>,
    history_seq: AtomicU64,
}

impl DocShared {
    /// Validates and applies a unit of work under the write lock.
    ///
    /// Writing units validate the keys they write; read-only units validate
    /// every key they read.
    fn commit(&self, observed: &HashMap<DocKey, u64>, writes: BTreeMap<DocKey, Write>) -> Result<()> {
        if writes.is_empty() {
            let state = self.state.read();
            return match observed.iter().find(|(key, seen)| state.version_of(key) != **seen) {
                Some((key, _)) => Err(TpccError::Conflict(format!(
                    "{key:?} changed during a read-only unit of work"
                ))),
                None => Ok(()),
            };
        }
        let mut state = self.state.write();
        for (key, write) in &writes {
            let current = state.version_of(key);
            match observed.get(key) {
                Some(&seen) if seen != current => {
                    return Err(TpccError::Conflict(format!(
                        "{key:?} changed since it was read"
                    )));
                }
                None if matches!(write, Write::Insert(_)) && current != 0 => {
                    return Err(TpccError::Conflict(format!("{key:?} already exists")));
                }
                _ => {}
            }
        }
        for (key, write) in writes {
            state.apply(key, write);
        }
        Ok(())
    }
}

/// In-process document store shared by any number of sessions.
#[derive(Clone)]
pub struct DocStore {
    shared: Arc<DocShared>,
}

impl DocStore {
    /// Creates an empty store using `layout`.
    pub fn new(layout: Layout) -> Self {
        Self {
            shared: Arc::new(DocShared {
                layout,
                state: RwLock::new(DocState::new(layout)),
                history_seq: AtomicU64::new(0),
            }),
        }
    }
}

impl WorkloadStore for DocStore {
    type Session = DocSession;

    fn engine(&self) -> &'static str {
        ENGINE
    }

    fn layout(&self) -> Layout {
        self.shared.layout
    }

    fn open_session(&self) -> Result<DocSession> {
        Ok(DocSession {
            shared: Arc::clone(&self.shared),
            txn: None,
        })
    }
}

#[derive(Default)]
struct DocTxn {
    observed: HashMap<DocKey, u64>,
    writes: BTreeMap<DocKey, Write>,
}

/// Session on a [`DocStore`].
pub struct DocSession {
    shared: Arc<DocShared>,
    txn: Option<DocTxn>,
}

impl DocSession {
    fn layout(&self) -> Layout {
        self.shared.layout
    }

    // ====================================================================
    // Raw document access
    // ====================================================================

    /// The buffered write for `key`, if any: `Some(None)` means deleted.
    fn buffered(&self, key: &DocKey) -> Option<Option<&Document>> {
        self.txn
            .as_ref()
            .and_then(|txn| txn.writes.get(key))
            .map(Write::document)
    }

    fn get(&mut self, key: DocKey) -> Option<Document> {
        if let Some(buffered) = self.buffered(&key) {
            return buffered.cloned();
        }
        let state = self.shared.state.read();
        let found = state.docs.get(&key);
        if let Some(txn) = self.txn.as_mut() {
            txn.observed
                .entry(key)
                .or_insert_with(|| found.map_or(0, |v| v.version));
        }
        found.map(|v| v.doc.clone())
    }

    /// Documents in `range`, committed state overlaid with buffered writes.
    fn scan(&mut self, range: RangeInclusive<DocKey>) -> Vec<(DocKey, Document)> {
        let mut out = BTreeMap::new();
        {
            let state = self.shared.state.read();
            for (key, v) in state.docs.range(range.clone()) {
                if let Some(txn) = self.txn.as_mut() {
                    txn.observed.entry(*key).or_insert(v.version);
                }
                out.insert(*key, v.doc.clone());
            }
        }
        if let Some(txn) = &self.txn {
            for (key, write) in txn.writes.range(range) {
                match write.document() {
                    Some(doc) => {
                        out.insert(*key, doc.clone());
                    }
                    None => {
                        out.remove(key);
                    }
                }
            }
        }
        out.into_iter().collect()
    }

    /// Sums `weight` over the documents in `range` without cloning them.
    fn tally(&self, range: RangeInclusive<DocKey>, weight: impl Fn(&Document) -> u64) -> u64 {
        let state = self.shared.state.read();
        let mut total = 0;
        for (key, v) in state.docs.range(range.clone()) {
            match self.buffered(key) {
                Some(Some(doc)) => total += weight(doc),
                Some(None) => {}
                None => total += weight(&v.doc),
            }
        }
        if let Some(txn) = &self.txn {
            for (key, write) in txn.writes.range(range) {
                if !state.docs.contains_key(key) {
                    if let Some(doc) = write.document() {
                        total += weight(doc);
                    }
                }
            }
        }
        total
    }

    /// Buffers `write`, or applies it at once outside a unit of work.
    fn write(&mut self, key: DocKey, write: Write) -> Result<()> {
        match self.txn.as_mut() {
            Some(txn) => {
                let merged = match (txn.writes.remove(&key), write) {
                    (Some(Write::Insert(_)), Write::Put(doc)) => Some(Write::Insert(doc)),
                    (Some(Write::Insert(_)), Write::Delete) => None,
                    (_, write) => Some(write),
                };
                if let Some(write) = merged {
                    txn.writes.insert(key, write);
                }
                Ok(())
            }
            None => self
                .shared
                .commit(&HashMap::new(), BTreeMap::from([(key, write)])),
        }
    }

    fn require(&mut self, key: DocKey) -> Result<Document> {
        self.get(key)
            .ok_or_else(|| TpccError::invariant(format!("missing document {key:?}")))
    }

    fn order_doc(&mut self, w_id: u32, d_id: u32, o_id: u32) -> Result<Option<OrderDoc>> {
        self.get(DocKey::Order(w_id, d_id, o_id))
            .map(Document::into_order)
            .transpose()
    }

    /// Lines of one order in the classic layout.
    fn classic_lines(&mut self, w_id: u32, d_id: u32, o_id: u32) -> Result<Vec<OrderLine>> {
        self.scan(DocKey::OrderLine(w_id, d_id, o_id, 0)..=DocKey::OrderLine(w_id, d_id, o_id, MAX))
            .into_iter()
            .map(|(_, doc)| doc.into_order_line())
            .collect()
    }

    fn with_lines(&mut self, doc: OrderDoc) -> Result<(Order, Vec<OrderLine>)> {
        match self.layout() {
            Layout::Modern => Ok((doc.order, doc.lines)),
            Layout::Classic => {
                let o = &doc.order;
                let lines = self.classic_lines(o.w_id, o.d_id, o.o_id)?;
                Ok((doc.order, lines))
            }
        }
    }

    /// Buffered orders of a district matching `filter`.
    fn buffered_orders(&self, w_id: u32, d_id: u32, filter: impl Fn(&Order) -> bool) -> Vec<u32> {
        let Some(txn) = &self.txn else {
            return Vec::new();
        };
        txn.writes
            .range(DocKey::Order(w_id, d_id, 0)..=DocKey::Order(w_id, d_id, MAX))
            .filter_map(|(_, w)| match w.document() {
                Some(Document::Order(o)) if filter(&o.order) => Some(o.order.o_id),
                _ => None,
            })
            .collect()
    }
}

impl WorkloadSession for DocSession {
    fn begin(&mut self) -> Result<()> {
        if self.txn.is_some() {
            return Err(TpccError::InvalidArgument(
                "unit of work already open".to_string(),
            ));
        }
        self.txn = Some(DocTxn::default());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| TpccError::InvalidArgument("no unit of work to commit".to_string()))?;
        self.shared.commit(&txn.observed, txn.writes)
    }

    fn rollback(&mut self) -> Result<()> {
        self.txn = None;
        Ok(())
    }

    fn reset_schema(&mut self) -> Result<()> {
        self.txn = None;
        *self.shared.state.write() = DocState::new(self.layout());
        self.shared.history_seq.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn create_indexes(&mut self) -> Result<()> {
        self.shared.state.write().rebuild_indexes();
        Ok(())
    }

    fn load_manifest(&mut self) -> Result<Option<LoadManifest>> {
        self.get(DocKey::Meta).map(Document::into_meta).transpose()
    }

    fn record_manifest(&mut self, manifest: &LoadManifest) -> Result<()> {
        self.write(DocKey::Meta, Write::Put(Document::Meta(manifest.clone())))
    }

    fn insert_items(&mut self, items: &[Item]) -> Result<()> {
        for item in items {
            self.write(
                DocKey::Item(item.i_id),
                Write::Insert(Document::Item(item.clone())),
            )?;
        }
        Ok(())
    }

    fn insert_warehouse(&mut self, warehouse: &Warehouse) -> Result<()> {
        self.write(
            DocKey::Warehouse(warehouse.w_id),
            Write::Insert(Document::Warehouse(warehouse.clone())),
        )
    }

    fn insert_districts(&mut self, districts: &[District]) -> Result<()> {
        for d in districts {
            self.write(
                DocKey::District(d.w_id, d.d_id),
                Write::Insert(Document::District(d.clone())),
            )?;
        }
        Ok(())
    }

    fn insert_customers(&mut self, customers: &[Customer]) -> Result<()> {
        for c in customers {
            self.write(
                DocKey::Customer(c.w_id, c.d_id, c.c_id),
                Write::Insert(Document::Customer(c.clone())),
            )?;
        }
        Ok(())
    }

    fn insert_stock(&mut self, stock: &[Stock]) -> Result<()> {
        for s in stock {
            self.write(
                DocKey::Stock(s.w_id, s.i_id),
                Write::Insert(Document::Stock(s.clone())),
            )?;
        }
        Ok(())
    }

    fn insert_history(&mut self, history: &History) -> Result<()> {
        let seq = self.shared.history_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.write(
            DocKey::History(seq),
            Write::Insert(Document::History(history.clone())),
        )
    }

    fn insert_order(&mut self, order: &Order, lines: &[OrderLine]) -> Result<()> {
        let (w, d, o) = (order.w_id, order.d_id, order.o_id);
        match self.layout() {
            Layout::Modern => self.write(
                DocKey::Order(w, d, o),
                Write::Insert(Document::Order(OrderDoc {
                    order: order.clone(),
                    lines: lines.to_vec(),
                })),
            ),
            Layout::Classic => {
                self.write(
                    DocKey::Order(w, d, o),
                    Write::Insert(Document::Order(OrderDoc {
                        order: order.clone(),
                        lines: Vec::new(),
                    })),
                )?;
                for line in lines {
                    self.write(
                        DocKey::OrderLine(w, d, o, line.number),
                        Write::Insert(Document::OrderLine(line.clone())),
                    )?;
                }
                if order.is_undelivered() {
                    self.write(
                        DocKey::NewOrder(w, d, o),
                        Write::Insert(Document::NewOrder(NewOrder {
                            w_id: w,
                            d_id: d,
                            o_id: o,
                        })),
                    )?;
                }
                Ok(())
            }
        }
    }

    fn warehouse(&mut self, w_id: u32) -> Result<Option<Warehouse>> {
        self.get(DocKey::Warehouse(w_id))
            .map(Document::into_warehouse)
            .transpose()
    }

    fn district(&mut self, w_id: u32, d_id: u32) -> Result<Option<District>> {
        self.get(DocKey::District(w_id, d_id))
            .map(Document::into_district)
            .transpose()
    }

    fn customer_by_id(&mut self, w_id: u32, d_id: u32, c_id: u32) -> Result<Option<Customer>> {
        self.get(DocKey::Customer(w_id, d_id, c_id))
            .map(Document::into_customer)
            .transpose()
    }

    fn customers_by_last_name(
        &mut self,
        w_id: u32,
        d_id: u32,
        last: &str,
    ) -> Result<Vec<Customer>> {
        let indexed: Option<Vec<u32>> = {
            let state = self.shared.state.read();
            state.indexed.then(|| {
                state
                    .by_name
                    .range((w_id, d_id, last.to_string(), String::new(), 0)..)
                    .take_while(|(w, d, l, _, _)| *w == w_id && *d == d_id && l == last)
                    .map(|(_, _, _, _, c)| *c)
                    .collect()
            })
        };

        let mut customers = match indexed {
            Some(ids) => {
                let mut found = Vec::with_capacity(ids.len());
                for c_id in ids {
                    if let Some(c) = self.customer_by_id(w_id, d_id, c_id)? {
                        found.push(c);
                    }
                }
                if let Some(txn) = &self.txn {
                    let extra: Vec<Customer> = txn
                        .writes
                        .range(DocKey::Customer(w_id, d_id, 0)..=DocKey::Customer(w_id, d_id, MAX))
                        .filter_map(|(_, w)| match w.document() {
                            Some(Document::Customer(c)) if c.last == last => Some(c.clone()),
                            _ => None,
                        })
                        .filter(|c| !found.iter().any(|f| f.c_id == c.c_id))
                        .collect();
                    found.extend(extra);
                }
                found
            }
            None => self
                .scan(DocKey::Customer(w_id, d_id, 0)..=DocKey::Customer(w_id, d_id, MAX))
                .into_iter()
                .map(|(_, doc)| doc.into_customer())
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .filter(|c| c.last == last)
                .collect(),
        };
        customers.retain(|c| c.last == last);
        customers.sort_by(|a, b| a.first.cmp(&b.first).then(a.c_id.cmp(&b.c_id)));
        Ok(customers)
    }

    fn items_by_ids(&mut self, ids: &[u32]) -> Result<Vec<Item>> {
        let mut items = Vec::with_capacity(ids.len());
        for &i_id in ids {
            if let Some(doc) = self.get(DocKey::Item(i_id)) {
                items.push(doc.into_item()?);
            }
        }
        Ok(items)
    }

    fn next_order_id(&mut self, w_id: u32, d_id: u32) -> Result<OrderSlot> {
        let mut district = self.require(DocKey::District(w_id, d_id))?.into_district()?;
        let slot = OrderSlot {
            o_id: district.next_o_id,
            d_tax: district.tax,
        };
        district.next_o_id += 1;
        self.write(
            DocKey::District(w_id, d_id),
            Write::Put(Document::District(district)),
        )?;
        Ok(slot)
    }

    fn stock_for_update(&mut self, w_id: u32, i_ids: &[u32]) -> Result<Vec<Stock>> {
        let mut stock = Vec::with_capacity(i_ids.len());
        for &i_id in i_ids {
            if let Some(doc) = self.get(DocKey::Stock(w_id, i_id)) {
                stock.push(doc.into_stock()?);
            }
        }
        Ok(stock)
    }

    fn update_stock(&mut self, stock: &Stock) -> Result<()> {
        self.write(
            DocKey::Stock(stock.w_id, stock.i_id),
            Write::Put(Document::Stock(stock.clone())),
        )
    }

    fn add_district_ytd(&mut self, w_id: u32, d_id: u32, amount: f64) -> Result<District> {
        let mut district = self.require(DocKey::District(w_id, d_id))?.into_district()?;
        district.ytd += amount;
        self.write(
            DocKey::District(w_id, d_id),
            Write::Put(Document::District(district.clone())),
        )?;
        Ok(district)
    }

    fn add_warehouse_ytd(&mut self, w_id: u32, amount: f64) -> Result<Warehouse> {
        let mut warehouse = self.require(DocKey::Warehouse(w_id))?.into_warehouse()?;
        warehouse.ytd += amount;
        self.write(
            DocKey::Warehouse(w_id),
            Write::Put(Document::Warehouse(warehouse.clone())),
        )?;
        Ok(warehouse)
    }

    fn update_customer_payment(&mut self, customer: &Customer) -> Result<()> {
        let key = DocKey::Customer(customer.w_id, customer.d_id, customer.c_id);
        let mut stored = self.require(key)?.into_customer()?;
        stored.balance = customer.balance;
        stored.ytd_payment = customer.ytd_payment;
        stored.payment_cnt = customer.payment_cnt;
        stored.data = customer.data.clone();
        self.write(key, Write::Put(Document::Customer(stored)))
    }

    fn last_order(
        &mut self,
        w_id: u32,
        d_id: u32,
        c_id: u32,
    ) -> Result<Option<(Order, Vec<OrderLine>)>> {
        let indexed: Option<Vec<u32>> = {
            let state = self.shared.state.read();
            state.indexed.then(|| {
                state
                    .by_customer
                    .range((w_id, d_id, c_id, 0)..=(w_id, d_id, c_id, MAX))
                    .map(|(_, _, _, o)| *o)
                    .collect()
            })
        };

        let mut best: Option<OrderDoc> = None;
        match indexed {
            Some(o_ids) => {
                for o_id in o_ids.into_iter().rev() {
                    if let Some(doc) = self.order_doc(w_id, d_id, o_id)? {
                        if doc.order.c_id == c_id {
                            best = Some(doc);
                            break;
                        }
                    }
                }
                for o_id in self.buffered_orders(w_id, d_id, |o| o.c_id == c_id) {
                    if best.as_ref().map_or(true, |b| o_id > b.order.o_id) {
                        best = self.order_doc(w_id, d_id, o_id)?;
                    }
                }
            }
            None => {
                for (_, doc) in
                    self.scan(DocKey::Order(w_id, d_id, 0)..=DocKey::Order(w_id, d_id, MAX))
                {
                    let doc = doc.into_order()?;
                    if doc.order.c_id == c_id {
                        best = Some(doc);
                    }
                }
            }
        }

        best.map(|doc| self.with_lines(doc)).transpose()
    }

    fn oldest_undelivered(&mut self, w_id: u32, d_id: u32) -> Result<Option<u32>> {
        match self.layout() {
            Layout::Classic => {
                let committed: Vec<u32> = {
                    let state = self.shared.state.read();
                    state
                        .docs
                        .range(DocKey::NewOrder(w_id, d_id, 0)..=DocKey::NewOrder(w_id, d_id, MAX))
                        .filter_map(|(k, _)| match k {
                            DocKey::NewOrder(_, _, o) => Some(*o),
                            _ => None,
                        })
                        .collect()
                };
                let mut oldest = None;
                for o_id in committed {
                    if self.get(DocKey::NewOrder(w_id, d_id, o_id)).is_some() {
                        oldest = Some(o_id);
                        break;
                    }
                }
                if let Some(txn) = &self.txn {
                    let buffered = txn
                        .writes
                        .range(DocKey::NewOrder(w_id, d_id, 0)..=DocKey::NewOrder(w_id, d_id, MAX))
                        .find_map(|(k, w)| match (k, w.document()) {
                            (DocKey::NewOrder(_, _, o), Some(_)) => Some(*o),
                            _ => None,
                        });
                    oldest = match (oldest, buffered) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                }
                Ok(oldest)
            }
            Layout::Modern => {
                let committed: Vec<u32> = {
                    let state = self.shared.state.read();
                    state
                        .backlog
                        .range((w_id, d_id, 0)..=(w_id, d_id, MAX))
                        .map(|(_, _, o)| *o)
                        .collect()
                };
                let mut oldest = None;
                for o_id in committed {
                    if let Some(doc) = self.order_doc(w_id, d_id, o_id)? {
                        if doc.order.is_undelivered() {
                            oldest = Some(o_id);
                            break;
                        }
                    }
                }
                let buffered = self
                    .buffered_orders(w_id, d_id, Order::is_undelivered)
                    .into_iter()
                    .min();
                Ok(match (oldest, buffered) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                })
            }
        }
    }

    fn order_with_lines(
        &mut self,
        w_id: u32,
        d_id: u32,
        o_id: u32,
    ) -> Result<Option<(Order, Vec<OrderLine>)>> {
        self.order_doc(w_id, d_id, o_id)?
            .map(|doc| self.with_lines(doc))
            .transpose()
    }

    fn complete_delivery(
        &mut self,
        w_id: u32,
        d_id: u32,
        o_id: u32,
        carrier_id: u32,
        delivery_d: i64,
    ) -> Result<()> {
        let key = DocKey::Order(w_id, d_id, o_id);
        let mut doc = self.require(key)?.into_order()?;
        doc.order.carrier_id = Some(carrier_id);
        doc.order.delivery_d = Some(delivery_d);
        match self.layout() {
            Layout::Modern => {
                for line in &mut doc.lines {
                    line.delivery_d = Some(delivery_d);
                }
                self.write(key, Write::Put(Document::Order(doc)))
            }
            Layout::Classic => {
                self.write(key, Write::Put(Document::Order(doc)))?;
                for mut line in self.classic_lines(w_id, d_id, o_id)? {
                    line.delivery_d = Some(delivery_d);
                    self.write(
                        DocKey::OrderLine(w_id, d_id, o_id, line.number),
                        Write::Put(Document::OrderLine(line)),
                    )?;
                }
                let marker = DocKey::NewOrder(w_id, d_id, o_id);
                self.require(marker)?;
                self.write(marker, Write::Delete)
            }
        }
    }

    fn credit_customer_delivery(
        &mut self,
        w_id: u32,
        d_id: u32,
        c_id: u32,
        amount: f64,
    ) -> Result<()> {
        let key = DocKey::Customer(w_id, d_id, c_id);
        let mut customer = self.require(key)?.into_customer()?;
        customer.balance += amount;
        customer.delivery_cnt += 1;
        self.write(key, Write::Put(Document::Customer(customer)))
    }

    fn stock_level(
        &mut self,
        w_id: u32,
        d_id: u32,
        next_o_id: u32,
        threshold: u32,
    ) -> Result<u64> {
        let floor = stock_level_floor(next_o_id);
        if next_o_id <= floor {
            return Ok(0);
        }
        let last = next_o_id - 1;
        let mut i_ids = BTreeSet::new();
        match self.layout() {
            Layout::Classic => {
                for (_, doc) in self.scan(
                    DocKey::OrderLine(w_id, d_id, floor, 0)..=DocKey::OrderLine(w_id, d_id, last, MAX),
                ) {
                    i_ids.insert(doc.into_order_line()?.i_id);
                }
            }
            Layout::Modern => {
                for (_, doc) in
                    self.scan(DocKey::Order(w_id, d_id, floor)..=DocKey::Order(w_id, d_id, last))
                {
                    i_ids.extend(doc.into_order()?.lines.iter().map(|l| l.i_id));
                }
            }
        }

        let mut low = 0;
        for i_id in i_ids {
            if let Some(doc) = self.get(DocKey::Stock(w_id, i_id)) {
                if doc.into_stock()?.quantity < threshold {
                    low += 1;
                }
            }
        }
        Ok(low)
    }

    fn count(&mut self, entity: Entity) -> Result<u64> {
        let one = |_: &Document| 1u64;
        Ok(match (entity, self.layout()) {
            (Entity::Warehouse, _) => {
                self.tally(DocKey::Warehouse(0)..=DocKey::Warehouse(MAX), one)
            }
            (Entity::District, _) => {
                self.tally(DocKey::District(0, 0)..=DocKey::District(MAX, MAX), one)
            }
            (Entity::Customer, _) => self.tally(
                DocKey::Customer(0, 0, 0)..=DocKey::Customer(MAX, MAX, MAX),
                one,
            ),
            (Entity::History, _) => {
                self.tally(DocKey::History(0)..=DocKey::History(u64::MAX), one)
            }
            (Entity::Item, _) => self.tally(DocKey::Item(0)..=DocKey::Item(MAX), one),
            (Entity::Stock, _) => {
                self.tally(DocKey::Stock(0, 0)..=DocKey::Stock(MAX, MAX), one)
            }
            (Entity::Order, _) => {
                self.tally(DocKey::Order(0, 0, 0)..=DocKey::Order(MAX, MAX, MAX), one)
            }
            (Entity::OrderLine, Layout::Classic) => self.tally(
                DocKey::OrderLine(0, 0, 0, 0)..=DocKey::OrderLine(MAX, MAX, MAX, MAX),
                one,
            ),
            (Entity::NewOrder, Layout::Classic) => self.tally(
                DocKey::NewOrder(0, 0, 0)..=DocKey::NewOrder(MAX, MAX, MAX),
                one,
            ),
            (Entity::OrderLine, Layout::Modern) => self.tally(
                DocKey::Order(0, 0, 0)..=DocKey::Order(MAX, MAX, MAX),
                |doc| match doc {
                    Document::Order(o) => o.lines.len() as u64,
                    _ => 0,
                },
            ),
            (Entity::NewOrder, Layout::Modern) => self.tally(
                DocKey::Order(0, 0, 0)..=DocKey::Order(MAX, MAX, MAX),
                |doc| match doc {
                    Document::Order(o) if o.order.is_undelivered() => 1,
                    _ => 0,
                },
            ),
        })
    }
}
