//! Property-based tests for the TPC-C random number engine.
//!
//! Covers excluded draws, distinct id sets, the surname table, NURand skew and
//! seed determinism.

use proptest::prelude::*;
use std::collections::HashSet;
use synadb_tpcc::random::{last_name, NuRandConstants, RandomHelper, A_C_ID};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// `number_excluding` stays in range and never yields the excluded value.
    #[test]
    fn prop_number_excluding_skips_value(
        seed in any::<u64>(),
        low in 0u32..1000,
        span in 1u32..50,
        offset in 0u32..50,
    ) {
        let high = low + span;
        let excluded = low + offset % (span + 1);
        let mut rng = RandomHelper::new(seed);
        for _ in 0..50 {
            let v = rng.number_excluding(low, high, excluded).unwrap();
            prop_assert!(v >= low && v <= high);
            prop_assert_ne!(v, excluded);
        }
    }

    /// `unique_ids` returns `n` distinct values inside the range.
    #[test]
    fn prop_unique_ids_are_distinct(
        seed in any::<u64>(),
        low in 1u32..10_000,
        span in 0u32..200,
        fill in 0.0f64..=1.0,
    ) {
        let high = low + span;
        let n = ((span + 1) as f64 * fill) as usize;
        let mut rng = RandomHelper::new(seed);
        let ids = rng.unique_ids(n, low, high).unwrap();
        prop_assert_eq!(ids.len(), n);
        prop_assert!(ids.iter().all(|id| *id >= low && *id <= high));
        let distinct: HashSet<u32> = ids.iter().copied().collect();
        prop_assert_eq!(distinct.len(), n);
    }

    /// Asking for more ids than the range holds fails instead of looping.
    #[test]
    fn prop_unique_ids_rejects_small_range(seed in any::<u64>(), low in 1u32..1000, span in 0u32..20) {
        let mut rng = RandomHelper::new(seed);
        prop_assert!(rng.unique_ids(span as usize + 2, low, low + span).is_err());
    }

    /// The surname table is a pure function of `n`.
    #[test]
    fn prop_last_name_is_pure(n in 0u32..1000) {
        let name = last_name(n);
        prop_assert_eq!(&name, &last_name(n));
        prop_assert_eq!(&name, &last_name(n + 1000));
        prop_assert!(name.len() >= 6 && name.len() <= 15);
    }

    /// Run constants always keep an admissible distance from the load constant.
    #[test]
    fn prop_run_constants_are_admissible(seed in any::<u64>()) {
        let mut rng = RandomHelper::new(seed);
        let load = rng.constants();
        let run = NuRandConstants::for_run(&mut rng, &load);
        prop_assert!(NuRandConstants::is_valid_c_last_delta(
            run.c_last as i64 - load.c_last as i64
        ));
    }
}

#[test]
fn test_last_name_examples() {
    assert_eq!(last_name(0), "BARBARBAR");
    assert_eq!(last_name(1), "BARBAROUGHT");
    assert_eq!(last_name(371), "PRICALLYOUGHT");
    assert_eq!(last_name(999), "EINGEINGEING");
}

#[test]
fn test_seed_zero_sequence_is_pinned() {
    let mut rng = RandomHelper::new(0);
    let draws: Vec<u32> = (0..5).map(|_| rng.number(1, 100)).collect();
    assert_eq!(draws, [55, 60, 72, 85, 61]);
}

#[test]
fn test_same_seed_same_sequence() {
    let mut a = RandomHelper::new(0);
    let mut b = RandomHelper::new(0);
    let xs: Vec<u32> = (0..100).map(|_| a.number(1, 100)).collect();
    let ys: Vec<u32> = (0..100).map(|_| b.number(1, 100)).collect();
    assert_eq!(xs, ys);
    assert!(xs.iter().all(|x| (1..=100).contains(x)));

    let mut c = RandomHelper::new(1);
    let zs: Vec<u32> = (0..100).map(|_| c.number(1, 100)).collect();
    assert_ne!(xs, zs);
}

#[test]
fn test_reseeding_reproduces_constants() {
    let first = RandomHelper::new(1234).constants();
    let again = RandomHelper::new(1234).constants();
    assert_eq!(first, again);
}

#[test]
fn test_constants_are_pinned_after_first_use() {
    let mut rng = RandomHelper::new(77);
    let before = rng.constants();
    for _ in 0..1000 {
        rng.nurand(A_C_ID, 1, 3000).unwrap();
    }
    assert_eq!(rng.constants(), before);
}

#[test]
fn test_nurand_is_skewed() {
    // With a pinned C, NURand(1023, 1, 3000) concentrates its mass on a small
    // set of ids. A uniform draw would give the 300 most frequent ids about 10%.
    let mut rng = RandomHelper::new(9);
    let mut hits = vec![0u32; 3001];
    let draws = 100_000;
    for _ in 0..draws {
        let v = rng.nurand(A_C_ID, 1, 3000).unwrap();
        assert!((1..=3000).contains(&v));
        hits[v as usize] += 1;
    }
    hits.sort_unstable_by(|a, b| b.cmp(a));
    let top: u32 = hits.iter().take(300).sum();
    assert!(
        top as f64 / draws as f64 > 0.4,
        "top 300 ids got {top} of {draws} draws"
    );
}

#[test]
fn test_nurand_rejects_unknown_a() {
    let mut rng = RandomHelper::new(3);
    assert!(rng.nurand(100, 1, 10).is_err());
}
