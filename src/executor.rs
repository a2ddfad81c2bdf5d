// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! The five TPC-C transaction profiles.
//!
//! Each executor is written once against [`WorkloadSession`] and runs inside
//! a unit of work opened by [`execute`]. Executors never begin or commit
//! themselves.
//!
//! The designed NewOrder rollback (an unknown item id) is a normal outcome,
//! [`NewOrderOutcome::InvalidItem`]. [`execute`] rolls the unit of work back
//! and returns it as `Ok`.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, TpccError};
use crate::params::{
    CustomerSelector, DeliveryParams, NewOrderParams, OrderStatusParams, PaymentParams,
    StockLevelParams, TransactionParams, TransactionType,
};
use crate::store::WorkloadSession;
use crate::types::{Credit, Customer, History, Order, OrderLine, MAX_CUSTOMER_DATA};

/// Stock below this many units after an order is restocked.
const RESTOCK_MARGIN: u32 = 10;
/// Units added when restocking.
const RESTOCK_AMOUNT: u32 = 91;

/// New stock quantity after `requested` units are taken from `quantity`.
///
/// Stock that would drop below 10 units is restocked by 91, so the quantity
/// never goes negative.
pub fn adjusted_quantity(quantity: u32, requested: u32) -> u32 {
    if quantity >= requested + RESTOCK_MARGIN {
        quantity - requested
    } else {
        quantity + RESTOCK_AMOUNT - requested
    }
}

/// Lower-middle element of `matches`, at index `(n - 1) / 2`.
pub fn midpoint<T>(mut matches: Vec<T>) -> Option<T> {
    if matches.is_empty() {
        return None;
    }
    let idx = (matches.len() - 1) / 2;
    Some(matches.swap_remove(idx))
}

fn truncate_bytes(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

/// Resolves a customer by id or by last name (midpoint of the matches
/// ordered by first name).
pub fn resolve_customer<S: WorkloadSession + ?Sized>(
    session: &mut S,
    w_id: u32,
    d_id: u32,
    selector: &CustomerSelector,
) -> Result<Customer> {
    match selector {
        CustomerSelector::ById(c_id) => session
            .customer_by_id(w_id, d_id, *c_id)?
            .ok_or_else(|| TpccError::invariant(format!("no customer {w_id}/{d_id}/{c_id}"))),
        CustomerSelector::ByLastName(last) => {
            midpoint(session.customers_by_last_name(w_id, d_id, last)?).ok_or_else(|| {
                TpccError::invariant(format!("no customer named {last} in {w_id}/{d_id}"))
            })
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// One line of a placed order.
#[derive(Debug, Clone, PartialEq)]
pub struct LineReceipt {
    pub i_id: u32,
    pub supply_w_id: u32,
    pub i_name: String,
    pub quantity: u32,
    /// Stock quantity after the update.
    pub s_quantity: u32,
    /// `'B'` when both item and stock data are original, else `'G'`.
    pub brand_generic: char,
    pub i_price: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderReceipt {
    pub w_id: u32,
    pub d_id: u32,
    pub o_id: u32,
    pub c_id: u32,
    pub c_last: String,
    pub c_credit: Credit,
    pub c_discount: f64,
    pub w_tax: f64,
    pub d_tax: f64,
    pub lines: Vec<LineReceipt>,
    /// `sum(amount) * (1 - c_discount) * (1 + w_tax + d_tax)`. Not stored.
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NewOrderOutcome {
    Placed(NewOrderReceipt),
    /// The order referenced an unknown item and was rolled back.
    InvalidItem { w_id: u32, d_id: u32, i_id: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub w_id: u32,
    pub d_id: u32,
    pub c_id: u32,
    pub c_w_id: u32,
    pub c_d_id: u32,
    pub amount: f64,
    pub c_balance: f64,
    pub c_credit: Credit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusReceipt {
    pub customer: Customer,
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeliveryReceipt {
    /// `(d_id, o_id)` of every delivered order.
    pub delivered: Vec<(u32, u32)>,
    /// Districts without undelivered orders.
    pub skipped: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockLevelReceipt {
    pub w_id: u32,
    pub d_id: u32,
    pub threshold: u32,
    pub low_stock: u64,
}

/// Result of one executed transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    NewOrder(NewOrderOutcome),
    Payment(PaymentReceipt),
    OrderStatus(OrderStatusReceipt),
    Delivery(DeliveryReceipt),
    StockLevel(StockLevelReceipt),
}

impl TransactionOutcome {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TransactionOutcome::NewOrder(_) => TransactionType::NewOrder,
            TransactionOutcome::Payment(_) => TransactionType::Payment,
            TransactionOutcome::OrderStatus(_) => TransactionType::OrderStatus,
            TransactionOutcome::Delivery(_) => TransactionType::Delivery,
            TransactionOutcome::StockLevel(_) => TransactionType::StockLevel,
        }
    }

    /// True for the designed NewOrder rollback.
    pub fn is_rollback(&self) -> bool {
        matches!(
            self,
            TransactionOutcome::NewOrder(NewOrderOutcome::InvalidItem { .. })
        )
    }
}

// ============================================================================
// Unit of work
// ============================================================================

/// Runs one transaction in its own unit of work.
///
/// Commits on success, rolls back on the designed NewOrder rollback and on
/// any error. Conflicts are returned unchanged so the caller can retry.
pub fn execute<S: WorkloadSession + ?Sized>(
    session: &mut S,
    params: &TransactionParams,
) -> Result<TransactionOutcome> {
    session.begin()?;
    let outcome = match params {
        TransactionParams::NewOrder(p) => new_order(session, p).map(TransactionOutcome::NewOrder),
        TransactionParams::Payment(p) => payment(session, p).map(TransactionOutcome::Payment),
        TransactionParams::OrderStatus(p) => {
            order_status(session, p).map(TransactionOutcome::OrderStatus)
        }
        TransactionParams::Delivery(p) => delivery(session, p).map(TransactionOutcome::Delivery),
        TransactionParams::StockLevel(p) => {
            stock_level(session, p).map(TransactionOutcome::StockLevel)
        }
    };

    match outcome {
        Ok(outcome) if outcome.is_rollback() => {
            session.rollback()?;
            Ok(outcome)
        }
        Ok(outcome) => match session.commit() {
            Ok(()) => Ok(outcome),
            Err(err) => {
                abandon(session, &err);
                Err(err)
            }
        },
        Err(err) => {
            abandon(session, &err);
            Err(err)
        }
    }
}

fn abandon<S: WorkloadSession + ?Sized>(session: &mut S, cause: &TpccError) {
    if let Err(rollback) = session.rollback() {
        tracing::warn!(error = %rollback, cause = %cause, "rollback failed");
    }
}

// ============================================================================
// Executors
// ============================================================================

/// NewOrder: claims an order id, updates stock and inserts the order.
pub fn new_order<S: WorkloadSession + ?Sized>(
    session: &mut S,
    p: &NewOrderParams,
) -> Result<NewOrderOutcome> {
    let slot = session.next_order_id(p.w_id, p.d_id)?;

    let i_ids: Vec<u32> = p.items.iter().map(|i| i.i_id).collect();
    let items: HashMap<u32, _> = session
        .items_by_ids(&i_ids)?
        .into_iter()
        .map(|item| (item.i_id, item))
        .collect();
    if let Some(missing) = i_ids.iter().find(|id| !items.contains_key(id)) {
        return Ok(NewOrderOutcome::InvalidItem {
            w_id: p.w_id,
            d_id: p.d_id,
            i_id: *missing,
        });
    }

    let warehouse = session
        .warehouse(p.w_id)?
        .ok_or_else(|| TpccError::invariant(format!("no warehouse {}", p.w_id)))?;
    let customer = session
        .customer_by_id(p.w_id, p.d_id, p.c_id)?
        .ok_or_else(|| {
            TpccError::invariant(format!("no customer {}/{}/{}", p.w_id, p.d_id, p.c_id))
        })?;

    // One batched fetch per supply warehouse.
    let mut by_supplier: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for item in &p.items {
        by_supplier.entry(item.supply_w_id).or_default().push(item.i_id);
    }
    let mut stock = HashMap::with_capacity(p.items.len());
    for (supply_w_id, ids) in &by_supplier {
        for s in session.stock_for_update(*supply_w_id, ids)? {
            stock.insert((s.w_id, s.i_id), s);
        }
    }

    let all_local = p.all_local();
    let mut lines = Vec::with_capacity(p.items.len());
    let mut receipts = Vec::with_capacity(p.items.len());
    let mut sum = 0.0;
    for (idx, req) in p.items.iter().enumerate() {
        let item = items
            .get(&req.i_id)
            .ok_or_else(|| TpccError::invariant(format!("item {} vanished", req.i_id)))?;
        let s = stock.get_mut(&(req.supply_w_id, req.i_id)).ok_or_else(|| {
            TpccError::invariant(format!("no stock {}/{}", req.supply_w_id, req.i_id))
        })?;

        s.quantity = adjusted_quantity(s.quantity, req.quantity);
        s.ytd += req.quantity;
        s.order_cnt += 1;
        if req.supply_w_id != p.w_id {
            s.remote_cnt += 1;
        }
        session.update_stock(s)?;

        let amount = f64::from(req.quantity) * item.price;
        sum += amount;
        let brand_generic = if item.is_original() && s.is_original() {
            'B'
        } else {
            'G'
        };
        lines.push(OrderLine {
            w_id: p.w_id,
            d_id: p.d_id,
            o_id: slot.o_id,
            number: idx as u32 + 1,
            i_id: req.i_id,
            supply_w_id: req.supply_w_id,
            delivery_d: None,
            quantity: req.quantity,
            amount,
            dist_info: s.dist_info(p.d_id).to_string(),
        });
        receipts.push(LineReceipt {
            i_id: req.i_id,
            supply_w_id: req.supply_w_id,
            i_name: item.name.clone(),
            quantity: req.quantity,
            s_quantity: s.quantity,
            brand_generic,
            i_price: item.price,
            amount,
        });
    }

    let order = Order {
        w_id: p.w_id,
        d_id: p.d_id,
        o_id: slot.o_id,
        c_id: p.c_id,
        entry_d: p.entry_d,
        carrier_id: None,
        delivery_d: None,
        ol_cnt: lines.len() as u32,
        all_local,
    };
    session.insert_order(&order, &lines)?;

    let total = sum * (1.0 - customer.discount) * (1.0 + warehouse.tax + slot.d_tax);
    Ok(NewOrderOutcome::Placed(NewOrderReceipt {
        w_id: p.w_id,
        d_id: p.d_id,
        o_id: slot.o_id,
        c_id: p.c_id,
        c_last: customer.last,
        c_credit: customer.credit,
        c_discount: customer.discount,
        w_tax: warehouse.tax,
        d_tax: slot.d_tax,
        lines: receipts,
        total,
    }))
}

/// Payment: books `amount` on warehouse, district and customer, and appends
/// one History row.
pub fn payment<S: WorkloadSession + ?Sized>(
    session: &mut S,
    p: &PaymentParams,
) -> Result<PaymentReceipt> {
    let district = session.add_district_ytd(p.w_id, p.d_id, p.amount)?;
    let warehouse = session.add_warehouse_ytd(p.w_id, p.amount)?;
    let mut customer = resolve_customer(session, p.c_w_id, p.c_d_id, &p.customer)?;

    customer.balance -= p.amount;
    customer.ytd_payment += p.amount;
    customer.payment_cnt += 1;
    if customer.credit == Credit::Bad {
        let note = format!(
            "{} {} {} {} {} {:.2}",
            customer.c_id, p.c_d_id, p.c_w_id, p.d_id, p.w_id, p.amount
        );
        let mut data = format!("{note}|{}", customer.data);
        truncate_bytes(&mut data, MAX_CUSTOMER_DATA);
        customer.data = data;
    }
    session.update_customer_payment(&customer)?;

    session.insert_history(&History {
        c_id: customer.c_id,
        c_d_id: p.c_d_id,
        c_w_id: p.c_w_id,
        d_id: p.d_id,
        w_id: p.w_id,
        date: p.date,
        amount: p.amount,
        data: format!("{}    {}", warehouse.name, district.name),
    })?;

    Ok(PaymentReceipt {
        w_id: p.w_id,
        d_id: p.d_id,
        c_id: customer.c_id,
        c_w_id: p.c_w_id,
        c_d_id: p.c_d_id,
        amount: p.amount,
        c_balance: customer.balance,
        c_credit: customer.credit,
    })
}

/// OrderStatus: the customer's most recent order and its lines. Read-only.
pub fn order_status<S: WorkloadSession + ?Sized>(
    session: &mut S,
    p: &OrderStatusParams,
) -> Result<OrderStatusReceipt> {
    let customer = resolve_customer(session, p.w_id, p.d_id, &p.customer)?;
    let (order, lines) = session
        .last_order(p.w_id, p.d_id, customer.c_id)?
        .ok_or_else(|| {
            TpccError::invariant(format!(
                "customer {}/{}/{} has no orders",
                p.w_id, p.d_id, customer.c_id
            ))
        })?;
    if lines.is_empty() {
        return Err(TpccError::invariant(format!(
            "order {}/{}/{} has no lines",
            order.w_id, order.d_id, order.o_id
        )));
    }
    Ok(OrderStatusReceipt {
        customer,
        order,
        lines,
    })
}

/// Delivery: delivers the oldest undelivered order of every district.
pub fn delivery<S: WorkloadSession + ?Sized>(
    session: &mut S,
    p: &DeliveryParams,
) -> Result<DeliveryReceipt> {
    let mut receipt = DeliveryReceipt::default();
    for d_id in 1..=p.districts {
        let Some(o_id) = session.oldest_undelivered(p.w_id, d_id)? else {
            receipt.skipped += 1;
            continue;
        };
        let (order, lines) = session
            .order_with_lines(p.w_id, d_id, o_id)?
            .ok_or_else(|| {
                TpccError::invariant(format!("backlog names missing order {}/{d_id}/{o_id}", p.w_id))
            })?;
        let total: f64 = lines.iter().map(|l| l.amount).sum();

        session.complete_delivery(p.w_id, d_id, o_id, p.carrier_id, p.delivery_d)?;
        session.credit_customer_delivery(p.w_id, d_id, order.c_id, total)?;
        receipt.delivered.push((d_id, o_id));
    }
    Ok(receipt)
}

/// StockLevel: distinct recently ordered items below the threshold. Read-only.
pub fn stock_level<S: WorkloadSession + ?Sized>(
    session: &mut S,
    p: &StockLevelParams,
) -> Result<StockLevelReceipt> {
    let district = session
        .district(p.w_id, p.d_id)?
        .ok_or_else(|| TpccError::invariant(format!("no district {}/{}", p.w_id, p.d_id)))?;
    let low_stock = session.stock_level(p.w_id, p.d_id, district.next_o_id, p.threshold)?;
    Ok(StockLevelReceipt {
        w_id: p.w_id,
        d_id: p.d_id,
        threshold: p.threshold,
        low_stock,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjusted_quantity() {
        assert_eq!(adjusted_quantity(50, 5), 45);
        assert_eq!(adjusted_quantity(15, 5), 10);
        assert_eq!(adjusted_quantity(14, 5), 100);
        assert_eq!(adjusted_quantity(10, 10), 91);
        assert_eq!(adjusted_quantity(1, 10), 82);
    }

    #[test]
    fn test_midpoint_is_lower_middle() {
        assert_eq!(midpoint(Vec::<u32>::new()), None);
        assert_eq!(midpoint(vec![1]), Some(1));
        assert_eq!(midpoint(vec![1, 2]), Some(1));
        assert_eq!(midpoint(vec![1, 2, 3]), Some(2));
        assert_eq!(midpoint(vec![1, 2, 3, 4]), Some(2));
        assert_eq!(midpoint(vec![1, 2, 3, 4, 5]), Some(3));
    }

    #[test]
    fn test_truncate_bytes() {
        let mut s = "a".repeat(600);
        truncate_bytes(&mut s, MAX_CUSTOMER_DATA);
        assert_eq!(s.len(), 500);
        let mut short = "abc".to_string();
        truncate_bytes(&mut short, 500);
        assert_eq!(short, "abc");
    }
}
