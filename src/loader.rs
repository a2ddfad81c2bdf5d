// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Initial population.
//!
//! [`Loader::ensure_loaded`] is idempotent per (scale parameters, worker
//! count, layout): the first call drops and reloads everything and records a
//! [`LoadManifest`]; later calls with the same inputs do nothing. Items are
//! loaded first, then warehouses are spread round-robin over the workers, one
//! unit of work per warehouse. Secondary indexes are built once the data is
//! in place.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Result, TpccError};
use crate::generator::{
    generate_district_data, generate_items, generate_stock_for_warehouse, generate_warehouse,
    DistrictData,
};
use crate::random::{mix_seed, NuRandConstants, RandomHelper};
use crate::scale::ScaleParameters;
use crate::store::{LoadManifest, WorkloadSession, WorkloadStore};
use crate::types::{now_millis, Stock, Warehouse};

/// Attempts per unit of work before a conflict fails the load.
const LOAD_ATTEMPTS: u32 = 5;

/// Summary of a completed load.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub manifest: LoadManifest,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The store already held this dataset; nothing was written.
    AlreadyLoaded(LoadManifest),
    Loaded(LoadReport),
}

impl LoadOutcome {
    pub fn manifest(&self) -> &LoadManifest {
        match self {
            LoadOutcome::AlreadyLoaded(manifest) => manifest,
            LoadOutcome::Loaded(report) => &report.manifest,
        }
    }

    pub fn was_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_))
    }
}

/// Everything written for one warehouse.
struct WarehouseData {
    warehouse: Warehouse,
    stock: Vec<Stock>,
    districts: Vec<DistrictData>,
}

fn generate_warehouse_data(
    rng: &mut RandomHelper,
    w_id: u32,
    scale: &ScaleParameters,
    now: i64,
) -> Result<WarehouseData> {
    let warehouse = generate_warehouse(rng, w_id);
    let stock = generate_stock_for_warehouse(rng, w_id, scale)?;
    let districts = scale
        .district_ids()
        .map(|d_id| generate_district_data(rng, w_id, d_id, scale, now))
        .collect::<Result<Vec<_>>>()?;
    Ok(WarehouseData {
        warehouse,
        stock,
        districts,
    })
}

/// Runs `f` in a unit of work, retrying conflicts.
fn in_unit_of_work<S, F>(session: &mut S, what: &str, mut f: F) -> Result<()>
where
    S: WorkloadSession + ?Sized,
    F: FnMut(&mut S) -> Result<()>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        session.begin()?;
        let result = f(session).and_then(|()| session.commit());
        match result {
            Ok(()) => return Ok(()),
            Err(err) => {
                session.rollback().ok();
                if !err.is_transient() {
                    return Err(err);
                }
                if attempt >= LOAD_ATTEMPTS {
                    return Err(TpccError::RetriesExhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                tracing::debug!(what, attempt, error = %err, "load conflict, retrying");
            }
        }
    }
}

fn write_warehouse<S: WorkloadSession + ?Sized>(session: &mut S, data: &WarehouseData) -> Result<()> {
    session.insert_warehouse(&data.warehouse)?;
    session.insert_stock(&data.stock)?;
    for district in &data.districts {
        session.insert_districts(std::slice::from_ref(&district.district))?;
        session.insert_customers(&district.customers)?;
        for history in &district.history {
            session.insert_history(history)?;
        }
        for (order, lines) in &district.orders {
            session.insert_order(order, lines)?;
        }
    }
    Ok(())
}

/// Populates a [`WorkloadStore`].
pub struct Loader<'a, S: WorkloadStore> {
    store: &'a S,
    seed: u64,
    cache: Mutex<Option<LoadManifest>>,
}

impl<'a, S: WorkloadStore> Loader<'a, S> {
    pub fn new(store: &'a S, seed: u64) -> Self {
        Self {
            store,
            seed,
            cache: Mutex::new(None),
        }
    }

    /// Loads the dataset described by `scale` unless it is already present.
    pub fn ensure_loaded(&self, scale: &ScaleParameters, workers: usize) -> Result<LoadOutcome> {
        if workers == 0 {
            return Err(TpccError::InvalidArgument(
                "loader needs at least one worker".to_string(),
            ));
        }
        let layout = self.store.layout();
        let mut cache = self.cache.lock();
        if let Some(manifest) = cache.as_ref().filter(|m| m.matches(scale, workers, layout)) {
            return Ok(LoadOutcome::AlreadyLoaded(manifest.clone()));
        }

        let mut session = self.store.open_session()?;
        match session.load_manifest()? {
            Some(manifest) if manifest.matches(scale, workers, layout) => {
                tracing::info!(engine = self.store.engine(), %layout, "dataset already loaded");
                *cache = Some(manifest.clone());
                return Ok(LoadOutcome::AlreadyLoaded(manifest));
            }
            Some(previous) => {
                tracing::info!(
                    engine = self.store.engine(),
                    previous_warehouses = previous.scale.warehouses,
                    previous_workers = previous.workers,
                    "load parameters changed, reloading"
                );
            }
            None => {}
        }

        let start = Instant::now();
        let mut rng = RandomHelper::new(self.seed);
        let constants = rng.constants();

        session.reset_schema()?;
        let items = generate_items(&mut rng, scale)?;
        in_unit_of_work(&mut session, "items", |s| s.insert_items(&items))?;
        tracing::info!(items = items.len(), "items loaded");
        drop(items);

        self.load_warehouses(scale, workers, constants)?;

        session.create_indexes()?;
        let manifest = LoadManifest {
            scale: *scale,
            workers,
            layout,
            constants,
        };
        session.record_manifest(&manifest)?;
        *cache = Some(manifest.clone());

        let elapsed = start.elapsed();
        tracing::info!(
            engine = self.store.engine(),
            %layout,
            warehouses = scale.warehouses,
            elapsed_ms = elapsed.as_millis() as u64,
            "load complete"
        );
        Ok(LoadOutcome::Loaded(LoadReport { manifest, elapsed }))
    }

    fn load_warehouses(
        &self,
        scale: &ScaleParameters,
        workers: usize,
        constants: NuRandConstants,
    ) -> Result<()> {
        let mut assignments: Vec<Vec<u32>> = vec![Vec::new(); workers];
        for (idx, w_id) in scale.warehouse_ids().enumerate() {
            assignments[idx % workers].push(w_id);
        }
        let now = now_millis();

        let results: Vec<Result<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = assignments
                .into_iter()
                .enumerate()
                .filter(|(_, ids)| !ids.is_empty())
                .map(|(worker, ids)| {
                    scope.spawn(move || self.load_worker(worker, &ids, scale, constants, now))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(TpccError::invariant("loader worker panicked")))
                })
                .collect()
        });
        results.into_iter().collect()
    }

    fn load_worker(
        &self,
        worker: usize,
        w_ids: &[u32],
        scale: &ScaleParameters,
        constants: NuRandConstants,
        now: i64,
    ) -> Result<()> {
        let mut session = self.store.open_session()?;
        for &w_id in w_ids {
            let start = Instant::now();
            let mut rng = RandomHelper::with_constants(mix_seed(self.seed, u64::from(w_id)), constants);
            let data = generate_warehouse_data(&mut rng, w_id, scale, now)?;
            in_unit_of_work(&mut session, "warehouse", |s| write_warehouse(s, &data))?;
            tracing::info!(
                worker,
                w_id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "warehouse loaded"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::doc::DocStore;
    use crate::store::Layout;
    use crate::types::Entity;

    fn tiny() -> ScaleParameters {
        ScaleParameters::new(50, 2, 2, 12, 4).unwrap()
    }

    #[test]
    fn test_load_counts() {
        let store = DocStore::new(Layout::Classic);
        let loader = Loader::new(&store, 5);
        let outcome = loader.ensure_loaded(&tiny(), 2).unwrap();
        assert!(outcome.was_loaded());

        let mut s = store.open_session().unwrap();
        assert_eq!(s.count(Entity::Warehouse).unwrap(), 2);
        assert_eq!(s.count(Entity::District).unwrap(), 4);
        assert_eq!(s.count(Entity::Customer).unwrap(), 48);
        assert_eq!(s.count(Entity::History).unwrap(), 48);
        assert_eq!(s.count(Entity::Item).unwrap(), 50);
        assert_eq!(s.count(Entity::Stock).unwrap(), 100);
        assert_eq!(s.count(Entity::Order).unwrap(), 48);
        assert_eq!(s.count(Entity::NewOrder).unwrap(), 16);
        assert_eq!(s.load_manifest().unwrap(), Some(outcome.manifest().clone()));
    }

    #[test]
    fn test_cached_manifest_skips_store() {
        let store = DocStore::new(Layout::Modern);
        let loader = Loader::new(&store, 5);
        loader.ensure_loaded(&tiny(), 1).unwrap();
        assert!(!loader.ensure_loaded(&tiny(), 1).unwrap().was_loaded());
        assert!(loader.ensure_loaded(&tiny(), 2).unwrap().was_loaded());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let store = DocStore::new(Layout::Classic);
        assert!(Loader::new(&store, 1).ensure_loaded(&tiny(), 0).is_err());
    }
}
