//! Loader idempotence and concurrent benchmark runs.

use synadb_tpcc::executor::execute;
use synadb_tpcc::generator::{INITIAL_D_YTD, INITIAL_W_YTD};
use synadb_tpcc::loader::Loader;
use std::collections::BTreeSet;

use synadb_tpcc::executor::TransactionOutcome;
use synadb_tpcc::params::{
    CustomerSelector, PaymentParams, StockLevelParams, TransactionParams, TransactionType,
};
use synadb_tpcc::store::doc::DocStore;
use synadb_tpcc::store::sqlite::SqliteStore;
use synadb_tpcc::store::stock_level_floor;
use synadb_tpcc::types::now_millis;
use synadb_tpcc::{
    Benchmark, Entity, Layout, RunConfig, RunLength, RunSummary, ScaleParameters, WorkloadSession,
    WorkloadStore,
};
use tempfile::tempdir;

fn small() -> ScaleParameters {
    ScaleParameters::new(300, 2, 4, 40, 12).unwrap()
}

fn pay(session: &mut impl WorkloadSession, amount: f64) {
    let params = PaymentParams {
        w_id: 1,
        d_id: 1,
        c_w_id: 1,
        c_d_id: 1,
        customer: CustomerSelector::ById(1),
        amount,
        date: now_millis(),
    };
    execute(session, &TransactionParams::Payment(params)).unwrap();
}

// ============================================================================
// Loader
// ============================================================================

#[test]
fn test_reload_with_same_parameters_is_a_no_op() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tpcc.db");
    let scale = small();

    {
        let store = SqliteStore::open(&path, Layout::Classic).unwrap();
        assert!(Loader::new(&store, 5).ensure_loaded(&scale, 2).unwrap().was_loaded());
        let mut s = store.open_session().unwrap();
        pay(&mut s, 50.0);
    }

    // A fresh process over the same file sees the manifest and keeps the
    // payment made after the first load.
    let store = SqliteStore::open(&path, Layout::Classic).unwrap();
    let outcome = Loader::new(&store, 5).ensure_loaded(&scale, 2).unwrap();
    assert!(!outcome.was_loaded());
    let mut s = store.open_session().unwrap();
    let warehouse = s.warehouse(1).unwrap().unwrap();
    assert!((warehouse.ytd - (INITIAL_W_YTD + 50.0)).abs() < 1e-6);
    assert_eq!(s.count(Entity::History).unwrap(), 2 * 4 * 40 + 1);
}

#[test]
fn test_changed_parameters_force_reload() {
    let store = DocStore::new(Layout::Modern);
    let loader = Loader::new(&store, 5);
    loader.ensure_loaded(&small(), 2).unwrap();
    let mut s = store.open_session().unwrap();
    pay(&mut s, 50.0);

    // Same scale, different worker count.
    assert!(loader.ensure_loaded(&small(), 3).unwrap().was_loaded());
    let warehouse = s.warehouse(1).unwrap().unwrap();
    assert!((warehouse.ytd - INITIAL_W_YTD).abs() < 1e-6);

    // Different scale.
    let bigger = ScaleParameters::new(300, 3, 4, 40, 12).unwrap();
    assert!(loader.ensure_loaded(&bigger, 3).unwrap().was_loaded());
    assert_eq!(s.count(Entity::Warehouse).unwrap(), 3);
    assert_eq!(s.count(Entity::Stock).unwrap(), 900);
}

#[test]
fn test_layouts_store_the_same_rows() {
    let scale = small();
    for layout in Layout::ALL {
        let store = DocStore::new(layout);
        Loader::new(&store, 8).ensure_loaded(&scale, 1).unwrap();
        let mut s = store.open_session().unwrap();
        assert_eq!(s.count(Entity::Order).unwrap(), 2 * 4 * 40);
        assert_eq!(s.count(Entity::NewOrder).unwrap(), 2 * 4 * 12);
        let (order, lines) = s.order_with_lines(2, 3, 40).unwrap().unwrap();
        assert_eq!(order.ol_cnt as usize, lines.len());
        assert!(order.carrier_id.is_none());
        assert!(lines.iter().all(|l| l.amount == 0.0 && l.delivery_d.is_none()));
        let (order, lines) = s.order_with_lines(2, 3, 1).unwrap().unwrap();
        assert!(order.carrier_id.is_some());
        assert!(lines.iter().all(|l| l.amount > 0.0 && l.delivery_d.is_some()));
    }
}

/// Runs StockLevel with threshold 20 in every district of warehouse 1 and
/// checks the count against the last 20 orders read back line by line.
fn check_stock_level_window<S: WorkloadStore>(store: &S, scale: &ScaleParameters) {
    let mut s = store.open_session().unwrap();
    for d_id in scale.district_ids() {
        let next = s.district(1, d_id).unwrap().unwrap().next_o_id;
        let params = TransactionParams::StockLevel(StockLevelParams {
            w_id: 1,
            d_id,
            threshold: 20,
        });
        let TransactionOutcome::StockLevel(receipt) = execute(&mut s, &params).unwrap() else {
            panic!("expected a StockLevel receipt");
        };

        let mut window = BTreeSet::new();
        for o_id in stock_level_floor(next)..next {
            let (_, lines) = s.order_with_lines(1, d_id, o_id).unwrap().unwrap();
            window.extend(lines.iter().map(|l| l.i_id));
        }
        let ids: Vec<u32> = window.into_iter().collect();
        let stock = s.stock_for_update(1, &ids).unwrap();
        assert!(stock.len() > 1, "window of district {d_id} holds {} items", stock.len());
        let expected = stock.iter().filter(|st| st.quantity < 20).count() as u64;

        assert_eq!(receipt.low_stock, expected, "district {d_id}");
        assert!(receipt.low_stock > 0, "district {d_id} reported no low stock");
    }
}

#[test]
fn test_full_warehouse_cardinalities() {
    let store = DocStore::new(Layout::Classic);
    let scale = ScaleParameters::make_default(1).unwrap();
    Loader::new(&store, 1).ensure_loaded(&scale, 4).unwrap();

    let mut s = store.open_session().unwrap();
    assert_eq!(s.count(Entity::Warehouse).unwrap(), 1);
    assert_eq!(s.count(Entity::District).unwrap(), 10);
    assert_eq!(s.count(Entity::Customer).unwrap(), 30_000);
    assert_eq!(s.count(Entity::Item).unwrap(), 100_000);
    assert_eq!(s.count(Entity::Stock).unwrap(), 100_000);
    assert_eq!(s.count(Entity::Order).unwrap(), 30_000);
    assert_eq!(s.count(Entity::NewOrder).unwrap(), 9_000);
    for d_id in 1..=10 {
        assert_eq!(s.district(1, d_id).unwrap().unwrap().next_o_id, 3001);
    }

    check_stock_level_window(&store, &scale);
}

#[test]
fn test_stock_level_window_sqlite() {
    let dir = tempdir().unwrap();
    let scale = ScaleParameters::make_scaled(1, 10.0).unwrap();
    for layout in Layout::ALL {
        let store = SqliteStore::open(dir.path().join(format!("stock-{layout}.db")), layout).unwrap();
        Loader::new(&store, 4).ensure_loaded(&scale, 2).unwrap();
        check_stock_level_window(&store, &scale);
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Database-wide consistency after a concurrent run.
fn check_consistency<S: WorkloadStore>(store: &S, scale: &ScaleParameters, summary: &RunSummary) {
    let mut s = store.open_session().unwrap();

    // Order ids are handed out without gaps or duplicates.
    let mut claimed = 0u64;
    for w_id in scale.warehouse_ids() {
        let mut district_ytd = 0.0;
        for d_id in scale.district_ids() {
            let district = s.district(w_id, d_id).unwrap().unwrap();
            claimed += u64::from(district.next_o_id - 1);
            district_ytd += district.ytd - INITIAL_D_YTD;
            assert!(s.order_with_lines(w_id, d_id, district.next_o_id).unwrap().is_none());
        }
        // Every payment books the same amount on warehouse and district.
        let warehouse = s.warehouse(w_id).unwrap().unwrap();
        assert!((warehouse.ytd - INITIAL_W_YTD - district_ytd).abs() < 1e-3);
    }
    assert_eq!(s.count(Entity::Order).unwrap(), claimed);

    let payments = summary.transaction(TransactionType::Payment).completed;
    let loaded_history = u64::from(scale.warehouses * scale.districts_per_warehouse * scale.customers_per_district);
    assert_eq!(s.count(Entity::History).unwrap(), loaded_history + payments);
}

fn run_concurrently<S: WorkloadStore>(store: &S) {
    let scale = small();
    let outcome = Loader::new(store, 3).ensure_loaded(&scale, 2).unwrap();
    let config = RunConfig {
        workers: 4,
        length: RunLength::Transactions(60),
        seed: 17,
        max_retries: 50,
        ..RunConfig::default()
    };
    let summary = Benchmark::new(store, outcome.manifest(), config).unwrap().run().unwrap();
    assert_eq!(summary.failed, 0, "{summary:?}");
    assert_eq!(summary.completed, 240);
    assert!(summary.transaction(TransactionType::NewOrder).completed > 0);
    check_consistency(store, &scale, &summary);
}

#[test]
fn test_concurrent_run_doc_store() {
    for layout in Layout::ALL {
        run_concurrently(&DocStore::new(layout));
    }
}

#[test]
fn test_concurrent_run_sqlite() {
    let dir = tempdir().unwrap();
    for layout in Layout::ALL {
        let store = SqliteStore::open(dir.path().join(format!("{layout}.db")), layout).unwrap();
        run_concurrently(&store);
    }
}

#[cfg(feature = "duckdb")]
#[test]
fn test_concurrent_run_duckdb() {
    use synadb_tpcc::store::duck::DuckStore;
    for layout in Layout::ALL {
        run_concurrently(&DuckStore::open_in_memory(layout).unwrap());
    }
}

#[test]
fn test_duration_bound_run_stops() {
    let store = DocStore::new(Layout::Classic);
    let outcome = Loader::new(&store, 3).ensure_loaded(&small(), 1).unwrap();
    let config = RunConfig {
        workers: 2,
        length: RunLength::Duration(std::time::Duration::from_millis(200)),
        ..RunConfig::default()
    };
    let summary = Benchmark::new(&store, outcome.manifest(), config).unwrap().run().unwrap();
    assert!(summary.completed > 0);
    assert!(summary.elapsed_secs < 30.0);
}
