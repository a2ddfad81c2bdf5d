//! Transaction invariants, checked against every store and layout.
//!
//! Each suite loads a small two-warehouse dataset and then runs the five
//! transactions one at a time, comparing the rows they touch before and after.

use std::collections::{BTreeSet, HashMap};

use synadb_tpcc::executor::{adjusted_quantity, execute, NewOrderOutcome, TransactionOutcome};
use synadb_tpcc::loader::Loader;
use synadb_tpcc::params::{
    CustomerSelector, DeliveryParams, NewOrderItem, NewOrderParams, OrderStatusParams,
    ParamGenerator, PaymentParams, StockLevelParams, TransactionMix, TransactionParams,
};
use synadb_tpcc::random::RandomHelper;
use synadb_tpcc::store::doc::DocStore;
use synadb_tpcc::store::sqlite::SqliteStore;
use synadb_tpcc::store::stock_level_floor;
use synadb_tpcc::types::{now_millis, Credit, Stock};
use synadb_tpcc::{Entity, Layout, ScaleParameters, WorkloadSession, WorkloadStore};
use tempfile::{tempdir, TempDir};

const EPS: f64 = 1e-6;

fn scale() -> ScaleParameters {
    ScaleParameters::new(200, 2, 3, 30, 9).unwrap()
}

fn placed(outcome: TransactionOutcome) -> synadb_tpcc::executor::NewOrderReceipt {
    match outcome {
        TransactionOutcome::NewOrder(NewOrderOutcome::Placed(receipt)) => receipt,
        other => panic!("expected a placed order, got {other:?}"),
    }
}

fn stock_map<S: WorkloadSession>(s: &mut S, keys: &[(u32, u32)]) -> HashMap<(u32, u32), Stock> {
    let mut out = HashMap::new();
    for &(w_id, i_id) in keys {
        for st in s.stock_for_update(w_id, &[i_id]).unwrap() {
            out.insert((st.w_id, st.i_id), st);
        }
    }
    out
}

// ============================================================================
// Checks
// ============================================================================

/// Returns the id of the placed order.
fn check_new_order<S: WorkloadStore>(store: &S) -> u32 {
    let mut s = store.open_session().unwrap();
    let district_before = s.district(1, 2).unwrap().unwrap();
    let orders_before = s.count(Entity::Order).unwrap();
    let backlog_before = s.count(Entity::NewOrder).unwrap();
    let keys = [(1, 10), (1, 11), (2, 12)];
    let stock_before = stock_map(&mut s, &keys);

    let params = NewOrderParams {
        w_id: 1,
        d_id: 2,
        c_id: 7,
        entry_d: now_millis(),
        items: vec![
            NewOrderItem { i_id: 10, supply_w_id: 1, quantity: 4 },
            NewOrderItem { i_id: 11, supply_w_id: 1, quantity: 9 },
            NewOrderItem { i_id: 12, supply_w_id: 2, quantity: 1 },
        ],
    };
    let receipt = placed(execute(&mut s, &TransactionParams::NewOrder(params.clone())).unwrap());

    assert_eq!(receipt.o_id, district_before.next_o_id);
    let district_after = s.district(1, 2).unwrap().unwrap();
    assert_eq!(district_after.next_o_id, district_before.next_o_id + 1);
    assert_eq!(s.count(Entity::Order).unwrap(), orders_before + 1);
    assert_eq!(s.count(Entity::NewOrder).unwrap(), backlog_before + 1);

    let (order, lines) = s.order_with_lines(1, 2, receipt.o_id).unwrap().unwrap();
    assert_eq!(order.c_id, 7);
    assert_eq!(order.carrier_id, None);
    assert_eq!(order.delivery_d, None);
    assert_eq!(order.ol_cnt, 3);
    assert!(!order.all_local);
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l.delivery_d.is_none()));
    let numbers: Vec<u32> = lines.iter().map(|l| l.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let stock_after = stock_map(&mut s, &keys);
    for item in &params.items {
        let key = (item.supply_w_id, item.i_id);
        let before = &stock_before[&key];
        let after = &stock_after[&key];
        assert_eq!(after.quantity, adjusted_quantity(before.quantity, item.quantity));
        assert_eq!(after.ytd, before.ytd + item.quantity);
        assert_eq!(after.order_cnt, before.order_cnt + 1);
        let remote = u32::from(item.supply_w_id != params.w_id);
        assert_eq!(after.remote_cnt, before.remote_cnt + remote);
    }

    let sum: f64 = receipt.lines.iter().map(|l| l.amount).sum();
    let expected = sum * (1.0 - receipt.c_discount) * (1.0 + receipt.w_tax + receipt.d_tax);
    assert!((receipt.total - expected).abs() < EPS);
    for (line, stored) in receipt.lines.iter().zip(&lines) {
        assert!((line.amount - line.quantity as f64 * line.i_price).abs() < EPS);
        assert!((line.amount - stored.amount).abs() < EPS);
    }
    receipt.o_id
}

fn check_invalid_item_rolls_back<S: WorkloadStore>(store: &S) {
    let mut s = store.open_session().unwrap();
    let district_before = s.district(1, 1).unwrap().unwrap();
    let orders_before = s.count(Entity::Order).unwrap();
    let stock_before = stock_map(&mut s, &[(1, 1)]);
    let unused = scale().items + 1;

    let params = NewOrderParams {
        w_id: 1,
        d_id: 1,
        c_id: 3,
        entry_d: now_millis(),
        items: vec![
            NewOrderItem { i_id: 1, supply_w_id: 1, quantity: 2 },
            NewOrderItem { i_id: unused, supply_w_id: 1, quantity: 2 },
        ],
    };
    let outcome = execute(&mut s, &TransactionParams::NewOrder(params)).unwrap();
    assert!(outcome.is_rollback());
    assert_eq!(
        outcome,
        TransactionOutcome::NewOrder(NewOrderOutcome::InvalidItem {
            w_id: 1,
            d_id: 1,
            i_id: unused
        })
    );
    assert_eq!(s.district(1, 1).unwrap().unwrap().next_o_id, district_before.next_o_id);
    assert_eq!(s.count(Entity::Order).unwrap(), orders_before);
    assert_eq!(stock_map(&mut s, &[(1, 1)]), stock_before);
}

fn check_payment_by_id<S: WorkloadStore>(store: &S) {
    let mut s = store.open_session().unwrap();
    // Remote customer: paid at warehouse 1, district 1, customer of 2/3.
    let customer_before = s.customer_by_id(2, 3, 5).unwrap().unwrap();
    let warehouse_before = s.warehouse(1).unwrap().unwrap();
    let district_before = s.district(1, 1).unwrap().unwrap();
    let history_before = s.count(Entity::History).unwrap();
    let amount = 123.45;

    let params = PaymentParams {
        w_id: 1,
        d_id: 1,
        c_w_id: 2,
        c_d_id: 3,
        customer: CustomerSelector::ById(5),
        amount,
        date: now_millis(),
    };
    let outcome = execute(&mut s, &TransactionParams::Payment(params)).unwrap();
    let TransactionOutcome::Payment(receipt) = outcome else {
        panic!("expected a payment receipt");
    };
    assert_eq!(receipt.c_id, 5);

    let customer = s.customer_by_id(2, 3, 5).unwrap().unwrap();
    assert!((customer.balance - (customer_before.balance - amount)).abs() < EPS);
    assert!((customer.ytd_payment - (customer_before.ytd_payment + amount)).abs() < EPS);
    assert_eq!(customer.payment_cnt, customer_before.payment_cnt + 1);
    assert!((receipt.c_balance - customer.balance).abs() < EPS);
    if customer.credit == Credit::Bad {
        assert!(customer.data.starts_with("5 3 2 1 1 123.45|"), "{}", customer.data);
        assert!(customer.data.len() <= 500);
    } else {
        assert_eq!(customer.data, customer_before.data);
    }

    let warehouse = s.warehouse(1).unwrap().unwrap();
    let district = s.district(1, 1).unwrap().unwrap();
    assert!((warehouse.ytd - (warehouse_before.ytd + amount)).abs() < EPS);
    assert!((district.ytd - (district_before.ytd + amount)).abs() < EPS);
    assert_eq!(s.count(Entity::History).unwrap(), history_before + 1);
}

fn check_payment_by_last_name<S: WorkloadStore>(store: &S) {
    let mut s = store.open_session().unwrap();
    let template = s.customer_by_id(1, 3, 1).unwrap().unwrap();

    // Three more customers sharing the surname, so the midpoint rule matters.
    let extra: Vec<_> = ["AARDVARK", "MIDDLING", "ZEBRA"]
        .iter()
        .zip(101..)
        .map(|(first, c_id)| {
            let mut c = template.clone();
            c.c_id = c_id;
            c.first = first.to_string();
            c
        })
        .collect();
    s.begin().unwrap();
    s.insert_customers(&extra).unwrap();
    s.commit().unwrap();

    let matches = s.customers_by_last_name(1, 3, &template.last).unwrap();
    assert_eq!(matches.len(), 4);
    assert!(matches.windows(2).all(|w| w[0].first <= w[1].first));
    let expected = matches[(matches.len() - 1) / 2].c_id;

    let params = PaymentParams {
        w_id: 1,
        d_id: 3,
        c_w_id: 1,
        c_d_id: 3,
        customer: CustomerSelector::ByLastName(template.last.clone()),
        amount: 10.0,
        date: now_millis(),
    };
    let TransactionOutcome::Payment(receipt) =
        execute(&mut s, &TransactionParams::Payment(params)).unwrap()
    else {
        panic!("expected a payment receipt");
    };
    assert_eq!(receipt.c_id, expected);
}

fn check_order_status<S: WorkloadStore>(store: &S, placed_o_id: u32) {
    let mut s = store.open_session().unwrap();
    let params = OrderStatusParams {
        w_id: 1,
        d_id: 2,
        customer: CustomerSelector::ById(7),
    };
    let history_before = s.count(Entity::History).unwrap();
    let TransactionOutcome::OrderStatus(receipt) =
        execute(&mut s, &TransactionParams::OrderStatus(params)).unwrap()
    else {
        panic!("expected an order status receipt");
    };
    assert_eq!(receipt.customer.c_id, 7);
    assert_eq!(receipt.order.o_id, placed_o_id);
    assert_eq!(receipt.lines.len(), 3);
    assert_eq!(s.count(Entity::History).unwrap(), history_before);
}

fn check_stock_level<S: WorkloadStore>(store: &S) {
    let mut s = store.open_session().unwrap();
    let next = s.district(1, 1).unwrap().unwrap().next_o_id;
    let mut recent = BTreeSet::new();
    for o_id in stock_level_floor(next)..next {
        let (_, lines) = s.order_with_lines(1, 1, o_id).unwrap().unwrap();
        // Loaded lines may name the unused item id, which has no stock.
        recent.extend(lines.iter().map(|l| l.i_id).filter(|&i| i <= scale().items));
    }

    let run = |s: &mut S::Session, threshold| {
        let params = StockLevelParams { w_id: 1, d_id: 1, threshold };
        match execute(s, &TransactionParams::StockLevel(params)).unwrap() {
            TransactionOutcome::StockLevel(receipt) => receipt.low_stock,
            other => panic!("expected a stock level receipt, got {other:?}"),
        }
    };
    // Stock quantities never exceed 100.
    assert_eq!(run(&mut s, 101), recent.len() as u64);
    assert_eq!(run(&mut s, 0), 0);
    let some = run(&mut s, 50);
    assert!(some <= recent.len() as u64);
}

fn check_delivery<S: WorkloadStore>(store: &S) {
    let mut s = store.open_session().unwrap();
    let backlog_before = s.count(Entity::NewOrder).unwrap();
    let mut expected = Vec::new();
    for d_id in 1..=3 {
        let o_id = s.oldest_undelivered(1, d_id).unwrap().unwrap();
        let (order, lines) = s.order_with_lines(1, d_id, o_id).unwrap().unwrap();
        let total: f64 = lines.iter().map(|l| l.amount).sum();
        let customer = s.customer_by_id(1, d_id, order.c_id).unwrap().unwrap();
        expected.push((d_id, o_id, total, customer));
    }

    let delivered_at = now_millis();
    let params = DeliveryParams {
        w_id: 1,
        districts: 3,
        carrier_id: 7,
        delivery_d: delivered_at,
    };
    let TransactionOutcome::Delivery(receipt) =
        execute(&mut s, &TransactionParams::Delivery(params)).unwrap()
    else {
        panic!("expected a delivery receipt");
    };
    assert_eq!(receipt.skipped, 0);
    assert_eq!(
        receipt.delivered,
        expected.iter().map(|(d, o, _, _)| (*d, *o)).collect::<Vec<_>>()
    );
    assert_eq!(s.count(Entity::NewOrder).unwrap(), backlog_before - 3);

    for (d_id, o_id, total, before) in expected {
        let (order, lines) = s.order_with_lines(1, d_id, o_id).unwrap().unwrap();
        assert_eq!(order.carrier_id, Some(7));
        assert!(lines.iter().all(|l| l.delivery_d == Some(delivered_at)));
        assert_ne!(s.oldest_undelivered(1, d_id).unwrap(), Some(o_id));

        let customer = s.customer_by_id(1, d_id, before.c_id).unwrap().unwrap();
        assert!((customer.balance - (before.balance + total)).abs() < EPS);
        assert_eq!(customer.delivery_cnt, before.delivery_cnt + 1);
    }
}

fn check_delivery_drains_backlog<S: WorkloadStore>(store: &S) {
    let mut s = store.open_session().unwrap();
    let params = TransactionParams::Delivery(DeliveryParams {
        w_id: 2,
        districts: 3,
        carrier_id: 1,
        delivery_d: now_millis(),
    });
    for _ in 0..scale().new_orders_per_district {
        let TransactionOutcome::Delivery(receipt) = execute(&mut s, &params).unwrap() else {
            panic!("expected a delivery receipt");
        };
        assert_eq!(receipt.skipped, 0);
    }
    let TransactionOutcome::Delivery(receipt) = execute(&mut s, &params).unwrap() else {
        panic!("expected a delivery receipt");
    };
    assert_eq!(receipt.skipped, 3);
    assert!(receipt.delivered.is_empty());
    for d_id in 1..=3 {
        assert_eq!(s.oldest_undelivered(2, d_id).unwrap(), None);
    }
}

/// Generated parameters never hit an invariant violation.
fn check_generated_mix<S: WorkloadStore>(store: &S) {
    let mut s = store.open_session().unwrap();
    let generator = ParamGenerator::new(scale());
    let mut rng = RandomHelper::new(99);
    let mix = TransactionMix::default();
    for _ in 0..150 {
        let txn = mix.pick(&mut rng);
        let params = generator.generate(&mut rng, txn, now_millis()).unwrap();
        let outcome = execute(&mut s, &params)
            .unwrap_or_else(|e| panic!("{txn} failed on {}: {e}", store.engine()));
        assert_eq!(outcome.transaction_type(), txn);
    }
}

fn run_suite<S: WorkloadStore>(store: &S) {
    Loader::new(store, 21).ensure_loaded(&scale(), 2).unwrap();
    let o_id = check_new_order(store);
    check_invalid_item_rolls_back(store);
    check_payment_by_id(store);
    check_payment_by_last_name(store);
    check_order_status(store, o_id);
    check_stock_level(store);
    check_delivery(store);
    check_delivery_drains_backlog(store);
    check_generated_mix(store);
}

// ============================================================================
// Backends
// ============================================================================

fn open_doc(layout: Layout) -> (Option<TempDir>, DocStore) {
    (None, DocStore::new(layout))
}

fn open_sqlite(layout: Layout) -> (Option<TempDir>, SqliteStore) {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("tpcc.db"), layout).unwrap();
    (Some(dir), store)
}

#[cfg(feature = "duckdb")]
fn open_duckdb(layout: Layout) -> (Option<TempDir>, synadb_tpcc::store::duck::DuckStore) {
    (None, synadb_tpcc::store::duck::DuckStore::open_in_memory(layout).unwrap())
}

macro_rules! backend_suite {
    ($(#[$meta:meta])* $name:ident, $open:path) => {
        $(#[$meta])*
        mod $name {
            use super::*;

            #[test]
            fn classic_layout() {
                let (_dir, store) = $open(Layout::Classic);
                run_suite(&store);
            }

            #[test]
            fn modern_layout() {
                let (_dir, store) = $open(Layout::Modern);
                run_suite(&store);
            }
        }
    };
}

backend_suite!(doc, open_doc);
backend_suite!(sqlite, open_sqlite);
backend_suite!(#[cfg(feature = "duckdb")] duckdb, open_duckdb);
