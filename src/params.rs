// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Transaction parameter generation.
//!
//! Generators only depend on the scale parameters and the worker's
//! [`RandomHelper`]. They never touch a backend, so the same parameters can be
//! replayed against any engine.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::generator::{MAX_OL_CNT, MIN_OL_CNT};
use crate::random::RandomHelper;
use crate::scale::ScaleParameters;

/// Largest quantity a NewOrder line requests.
pub const MAX_OL_QUANTITY: u32 = 10;
/// Share of NewOrders (percent) that end in the invalid-item rollback.
pub const INVALID_ITEM_PERCENT: u32 = 1;
/// Share of NewOrder lines (percent) supplied by a remote warehouse.
pub const REMOTE_LINE_PERCENT: u32 = 1;
/// Share of Payments (percent) made through a remote district.
pub const REMOTE_PAYMENT_PERCENT: u32 = 15;
/// Share of Payments (percent) that look the customer up by id.
pub const PAYMENT_BY_ID_PERCENT: u32 = 60;
/// Share of OrderStatus requests (percent) that look the customer up by id.
pub const ORDER_STATUS_BY_ID_PERCENT: u32 = 40;

/// NURand draws spent on finding a distinct item before falling back to a
/// uniform draw.
const MAX_SKEWED_ITEM_DRAWS: usize = 64;

/// The five TPC-C transaction profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransactionType {
    NewOrder,
    Payment,
    OrderStatus,
    Delivery,
    StockLevel,
}

impl TransactionType {
    pub const ALL: [TransactionType; 5] = [
        TransactionType::NewOrder,
        TransactionType::Payment,
        TransactionType::OrderStatus,
        TransactionType::Delivery,
        TransactionType::StockLevel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TransactionType::NewOrder => "new_order",
            TransactionType::Payment => "payment",
            TransactionType::OrderStatus => "order_status",
            TransactionType::Delivery => "delivery",
            TransactionType::StockLevel => "stock_level",
        }
    }

    /// True for the profiles that never write.
    pub fn is_read_only(self) -> bool {
        matches!(self, TransactionType::OrderStatus | TransactionType::StockLevel)
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Percent weights of the transaction mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMix {
    pub new_order: u32,
    pub payment: u32,
    pub order_status: u32,
    pub delivery: u32,
    pub stock_level: u32,
}

impl Default for TransactionMix {
    fn default() -> Self {
        Self {
            new_order: 45,
            payment: 43,
            order_status: 4,
            delivery: 4,
            stock_level: 4,
        }
    }
}

impl TransactionMix {
    /// A mix that only issues `txn`.
    pub fn only(txn: TransactionType) -> Self {
        let mut mix = Self {
            new_order: 0,
            payment: 0,
            order_status: 0,
            delivery: 0,
            stock_level: 0,
        };
        *mix.weight_mut(txn) = 100;
        mix
    }

    pub fn weight(&self, txn: TransactionType) -> u32 {
        match txn {
            TransactionType::NewOrder => self.new_order,
            TransactionType::Payment => self.payment,
            TransactionType::OrderStatus => self.order_status,
            TransactionType::Delivery => self.delivery,
            TransactionType::StockLevel => self.stock_level,
        }
    }

    fn weight_mut(&mut self, txn: TransactionType) -> &mut u32 {
        match txn {
            TransactionType::NewOrder => &mut self.new_order,
            TransactionType::Payment => &mut self.payment,
            TransactionType::OrderStatus => &mut self.order_status,
            TransactionType::Delivery => &mut self.delivery,
            TransactionType::StockLevel => &mut self.stock_level,
        }
    }

    pub fn total(&self) -> u32 {
        TransactionType::ALL.iter().map(|t| self.weight(*t)).sum()
    }

    /// Draws a transaction type according to the weights.
    ///
    /// # Panics
    ///
    /// Panics if every weight is zero.
    pub fn pick(&self, rng: &mut RandomHelper) -> TransactionType {
        let mut x = rng.number(1, self.total());
        for txn in TransactionType::ALL {
            let w = self.weight(txn);
            if x <= w {
                return txn;
            }
            x -= w;
        }
        TransactionType::NewOrder
    }
}

/// One requested NewOrder line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub i_id: u32,
    pub supply_w_id: u32,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderParams {
    pub w_id: u32,
    pub d_id: u32,
    pub c_id: u32,
    pub entry_d: i64,
    pub items: Vec<NewOrderItem>,
}

impl NewOrderParams {
    /// True when every line is supplied by the home warehouse.
    pub fn all_local(&self) -> bool {
        self.items.iter().all(|i| i.supply_w_id == self.w_id)
    }
}

/// How Payment and OrderStatus find their customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerSelector {
    ById(u32),
    ByLastName(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentParams {
    pub w_id: u32,
    pub d_id: u32,
    pub c_w_id: u32,
    pub c_d_id: u32,
    pub customer: CustomerSelector,
    pub amount: f64,
    pub date: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusParams {
    pub w_id: u32,
    pub d_id: u32,
    pub customer: CustomerSelector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryParams {
    pub w_id: u32,
    /// Districts of the warehouse, all processed by one Delivery.
    pub districts: u32,
    pub carrier_id: u32,
    pub delivery_d: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevelParams {
    pub w_id: u32,
    pub d_id: u32,
    pub threshold: u32,
}

/// Parameters of one transaction of any type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionParams {
    NewOrder(NewOrderParams),
    Payment(PaymentParams),
    OrderStatus(OrderStatusParams),
    Delivery(DeliveryParams),
    StockLevel(StockLevelParams),
}

impl TransactionParams {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TransactionParams::NewOrder(_) => TransactionType::NewOrder,
            TransactionParams::Payment(_) => TransactionType::Payment,
            TransactionParams::OrderStatus(_) => TransactionType::OrderStatus,
            TransactionParams::Delivery(_) => TransactionType::Delivery,
            TransactionParams::StockLevel(_) => TransactionType::StockLevel,
        }
    }
}

/// Storage-agnostic parameter source for one worker.
#[derive(Debug, Clone, Copy)]
pub struct ParamGenerator {
    scale: ScaleParameters,
}

impl ParamGenerator {
    pub fn new(scale: ScaleParameters) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> &ScaleParameters {
        &self.scale
    }

    pub fn generate(
        &self,
        rng: &mut RandomHelper,
        txn: TransactionType,
        now: i64,
    ) -> Result<TransactionParams> {
        Ok(match txn {
            TransactionType::NewOrder => TransactionParams::NewOrder(self.new_order(rng, now)?),
            TransactionType::Payment => TransactionParams::Payment(self.payment(rng, now)?),
            TransactionType::OrderStatus => TransactionParams::OrderStatus(self.order_status(rng)),
            TransactionType::Delivery => TransactionParams::Delivery(self.delivery(rng, now)),
            TransactionType::StockLevel => TransactionParams::StockLevel(self.stock_level(rng)),
        })
    }

    fn warehouse_id(&self, rng: &mut RandomHelper) -> u32 {
        rng.number(self.scale.starting_warehouse, self.scale.ending_warehouse)
    }

    fn district_id(&self, rng: &mut RandomHelper) -> u32 {
        rng.number(1, self.scale.districts_per_warehouse)
    }

    fn other_warehouse(&self, rng: &mut RandomHelper, w_id: u32) -> Result<u32> {
        rng.number_excluding(self.scale.starting_warehouse, self.scale.ending_warehouse, w_id)
    }

    fn customer(&self, rng: &mut RandomHelper, by_id_percent: u32) -> CustomerSelector {
        if rng.chance(by_id_percent) {
            CustomerSelector::ById(rng.customer_id(self.scale.customers_per_district))
        } else {
            CustomerSelector::ByLastName(rng.random_last_name(self.scale.customers_per_district))
        }
    }

    /// Skewed item id not yet present in `taken`.
    fn distinct_item(&self, rng: &mut RandomHelper, taken: &[NewOrderItem]) -> u32 {
        let is_taken = |i_id: u32| taken.iter().any(|t| t.i_id == i_id);
        for _ in 0..MAX_SKEWED_ITEM_DRAWS {
            let i_id = rng.item_id(self.scale.items);
            if !is_taken(i_id) {
                return i_id;
            }
        }
        loop {
            let i_id = rng.number(1, self.scale.items);
            if !is_taken(i_id) {
                return i_id;
            }
        }
    }

    /// NewOrder input.
    ///
    /// Item ids within one order are distinct. One order in a hundred ends
    /// with the unused item id `items + 1`.
    pub fn new_order(&self, rng: &mut RandomHelper, now: i64) -> Result<NewOrderParams> {
        let w_id = self.warehouse_id(rng);
        let d_id = self.district_id(rng);
        let c_id = rng.customer_id(self.scale.customers_per_district);
        let ol_cnt = rng.number(MIN_OL_CNT, MAX_OL_CNT);
        let rollback = rng.chance(INVALID_ITEM_PERCENT);

        // Small catalogs cannot fill 15 distinct lines.
        let valid_lines = if rollback { ol_cnt - 1 } else { ol_cnt }.min(self.scale.items);

        let mut items = Vec::with_capacity(ol_cnt as usize);
        for _ in 0..valid_lines {
            let i_id = self.distinct_item(rng, &items);
            items.push(self.line(rng, w_id, i_id)?);
        }
        if rollback {
            let i_id = self.scale.items + 1;
            items.push(self.line(rng, w_id, i_id)?);
        }

        Ok(NewOrderParams {
            w_id,
            d_id,
            c_id,
            entry_d: now,
            items,
        })
    }

    fn line(&self, rng: &mut RandomHelper, w_id: u32, i_id: u32) -> Result<NewOrderItem> {
        let remote = self.scale.warehouses > 1 && rng.chance(REMOTE_LINE_PERCENT);
        let supply_w_id = if remote {
            self.other_warehouse(rng, w_id)?
        } else {
            w_id
        };
        Ok(NewOrderItem {
            i_id,
            supply_w_id,
            quantity: rng.number(1, MAX_OL_QUANTITY),
        })
    }

    /// Payment input.
    pub fn payment(&self, rng: &mut RandomHelper, now: i64) -> Result<PaymentParams> {
        let w_id = self.warehouse_id(rng);
        let d_id = self.district_id(rng);
        let amount = rng.fixed_point(2, 1.00, 5000.00);

        let remote = self.scale.warehouses > 1 && rng.chance(REMOTE_PAYMENT_PERCENT);
        let (c_w_id, c_d_id) = if remote {
            (self.other_warehouse(rng, w_id)?, self.district_id(rng))
        } else {
            (w_id, d_id)
        };

        Ok(PaymentParams {
            w_id,
            d_id,
            c_w_id,
            c_d_id,
            customer: self.customer(rng, PAYMENT_BY_ID_PERCENT),
            amount,
            date: now,
        })
    }

    pub fn order_status(&self, rng: &mut RandomHelper) -> OrderStatusParams {
        OrderStatusParams {
            w_id: self.warehouse_id(rng),
            d_id: self.district_id(rng),
            customer: self.customer(rng, ORDER_STATUS_BY_ID_PERCENT),
        }
    }

    pub fn delivery(&self, rng: &mut RandomHelper, now: i64) -> DeliveryParams {
        DeliveryParams {
            w_id: self.warehouse_id(rng),
            districts: self.scale.districts_per_warehouse,
            carrier_id: rng.number(1, 10),
            delivery_d: now,
        }
    }

    pub fn stock_level(&self, rng: &mut RandomHelper) -> StockLevelParams {
        StockLevelParams {
            w_id: self.warehouse_id(rng),
            d_id: self.district_id(rng),
            threshold: rng.number(10, 20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn generator(warehouses: u32) -> ParamGenerator {
        ParamGenerator::new(ScaleParameters::new(1_000, warehouses, 10, 300, 90).unwrap())
    }

    #[test]
    fn test_mix_frequencies() {
        let mix = TransactionMix::default();
        assert_eq!(mix.total(), 100);
        let mut rng = RandomHelper::new(21);
        let mut counts: HashMap<TransactionType, u32> = HashMap::new();
        for _ in 0..100_000 {
            *counts.entry(mix.pick(&mut rng)).or_default() += 1;
        }
        let share = |t| counts[&t] as f64 / 100_000.0;
        assert!((share(TransactionType::NewOrder) - 0.45).abs() < 0.01);
        assert!((share(TransactionType::Payment) - 0.43).abs() < 0.01);
        for t in [
            TransactionType::OrderStatus,
            TransactionType::Delivery,
            TransactionType::StockLevel,
        ] {
            assert!((share(t) - 0.04).abs() < 0.005);
        }
    }

    #[test]
    fn test_only_mix() {
        let mix = TransactionMix::only(TransactionType::Delivery);
        let mut rng = RandomHelper::new(22);
        for _ in 0..100 {
            assert_eq!(mix.pick(&mut rng), TransactionType::Delivery);
        }
    }

    #[test]
    fn test_new_order_lines_are_distinct_and_in_range() {
        let gen = generator(1);
        let mut rng = RandomHelper::new(23);
        let mut rollbacks = 0;
        for _ in 0..5_000 {
            let p = gen.new_order(&mut rng, 0).unwrap();
            assert!((1..=300).contains(&p.c_id));
            assert!((5..=15).contains(&p.items.len()));
            let ids: HashSet<u32> = p.items.iter().map(|i| i.i_id).collect();
            assert_eq!(ids.len(), p.items.len());
            assert!(p.all_local());
            let invalid = p.items.iter().filter(|i| i.i_id == 1_001).count();
            assert!(invalid <= 1);
            if invalid == 1 {
                assert_eq!(p.items.last().unwrap().i_id, 1_001);
                rollbacks += 1;
            }
            assert!(p.items.iter().all(|i| (1..=10).contains(&i.quantity)));
        }
        assert!(rollbacks > 10 && rollbacks < 120, "rollbacks = {rollbacks}");
    }

    #[test]
    fn test_single_warehouse_never_remote() {
        let gen = generator(1);
        let mut rng = RandomHelper::new(24);
        for _ in 0..2_000 {
            let p = gen.payment(&mut rng, 0).unwrap();
            assert_eq!((p.c_w_id, p.c_d_id), (p.w_id, p.d_id));
            assert!((1.00..=5000.00).contains(&p.amount));
        }
    }

    #[test]
    fn test_remote_payments_use_other_warehouse() {
        let gen = generator(4);
        let mut rng = RandomHelper::new(25);
        let mut remote = 0;
        for _ in 0..10_000 {
            let p = gen.payment(&mut rng, 0).unwrap();
            if p.c_w_id != p.w_id {
                remote += 1;
            }
        }
        assert!((1_200..1_800).contains(&remote), "remote = {remote}");
    }

    #[test]
    fn test_customer_selector_split() {
        let gen = generator(1);
        let mut rng = RandomHelper::new(26);
        let by_id = (0..10_000)
            .filter(|_| matches!(gen.order_status(&mut rng).customer, CustomerSelector::ById(_)))
            .count();
        assert!((3_600..4_400).contains(&by_id), "by_id = {by_id}");
    }

    #[test]
    fn test_delivery_and_stock_level_ranges() {
        let gen = generator(2);
        let mut rng = RandomHelper::new(27);
        for _ in 0..1_000 {
            let d = gen.delivery(&mut rng, 5);
            assert!((1..=10).contains(&d.carrier_id));
            assert!((1..=2).contains(&d.w_id));
            let s = gen.stock_level(&mut rng);
            assert!((10..=20).contains(&s.threshold));
        }
    }

    #[test]
    fn test_tiny_catalog_terminates() {
        let gen = ParamGenerator::new(ScaleParameters::new(3, 1, 1, 1, 0).unwrap());
        let mut rng = RandomHelper::new(28);
        for _ in 0..500 {
            let p = gen.new_order(&mut rng, 0).unwrap();
            assert!(p.items.len() <= 4);
        }
    }
}
