// Copyright (c) 2025 SynaDB Contributors
// Licensed under the SynaDB License. See LICENSE file for details.

//! Deterministic random source and TPC-C distributions.
//!
//! Every worker owns one [`RandomHelper`]. It wraps a seeded MT19937 engine
//! and the NURand constants ([`NuRandConstants`]) that stay pinned for the
//! lifetime of the helper. Nothing in this module is shared between threads.
//!
//! Integer draws reduce the 32-bit engine output to a range with the
//! multiply-and-shift rejection method of libstdc++'s
//! `uniform_int_distribution`, so a given seed yields the same sequence as a
//! `std::mt19937` driving that distribution.
//!
//! # Example
//!
//! ```rust
//! use synadb_tpcc::random::{last_name, RandomHelper};
//!
//! let mut rng = RandomHelper::new(0);
//! let draws: Vec<u32> = (0..5).map(|_| rng.number(1, 100)).collect();
//! assert_eq!(draws, [55, 60, 72, 85, 61]);
//! assert_eq!(last_name(1), "BARBAROUGHT");
//! ```

use std::collections::HashSet;

use rand_mt::Mt;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TpccError};

const ALPHA_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const NUM_CHARS: &[u8] = b"0123456789";

/// Syllables used to synthesize customer last names.
const SYLLABLES: [&str; 10] = [
    "BAR", "OUGHT", "ABLE", "PRI", "PRES", "ESE", "ANTI", "CALLY", "ATION", "EING",
];

/// NURand `A` for customer last names.
pub const A_C_LAST: u32 = 255;
/// NURand `A` for customer ids.
pub const A_C_ID: u32 = 1023;
/// NURand `A` for item ids.
pub const A_ITEM_ID: u32 = 8191;

/// Returns the last name built from the three decimal digits of `n`.
///
/// The hundreds, tens and units digits each select one syllable. The function
/// is pure: lookups by last name rebuild the target surname with it.
pub fn last_name(n: u32) -> String {
    let n = n % 1000;
    let mut name = String::with_capacity(15);
    name.push_str(SYLLABLES[(n / 100) as usize]);
    name.push_str(SYLLABLES[(n / 10 % 10) as usize]);
    name.push_str(SYLLABLES[(n % 10) as usize]);
    name
}

/// Derives the seed of stream `stream` (a worker or warehouse) from a base seed.
pub fn mix_seed(seed: u64, stream: u64) -> u64 {
    seed ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

/// The three values selected by the NURand `A` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NuRandKind {
    /// `A = 255`
    LastName,
    /// `A = 1023`
    CustomerId,
    /// `A = 8191`
    ItemId,
}

impl NuRandKind {
    /// Maps a NURand `A` value to its kind.
    pub fn from_a(a: u32) -> Option<Self> {
        match a {
            A_C_LAST => Some(NuRandKind::LastName),
            A_C_ID => Some(NuRandKind::CustomerId),
            A_ITEM_ID => Some(NuRandKind::ItemId),
            _ => None,
        }
    }

    /// The `A` parameter of this kind.
    pub fn a(self) -> u32 {
        match self {
            NuRandKind::LastName => A_C_LAST,
            NuRandKind::CustomerId => A_C_ID,
            NuRandKind::ItemId => A_ITEM_ID,
        }
    }
}

/// Per-run NURand `C` constants.
///
/// The load phase draws one set. The measurement phase draws a second set whose
/// `c_last` differs from the load value by an amount accepted by
/// [`NuRandConstants::is_valid_c_last_delta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NuRandConstants {
    /// Constant for `A = 255`.
    pub c_last: u32,
    /// Constant for `A = 1023`.
    pub c_id: u32,
    /// Constant for `A = 8191`.
    pub order_line_item_id: u32,
}

impl NuRandConstants {
    /// Draws the constants used while loading.
    pub fn for_load(rng: &mut RandomHelper) -> Self {
        Self {
            c_last: rng.number(0, A_C_LAST),
            c_id: rng.number(0, A_C_ID),
            order_line_item_id: rng.number(0, A_ITEM_ID),
        }
    }

    /// Draws measurement constants compatible with `load`.
    pub fn for_run(rng: &mut RandomHelper, load: &NuRandConstants) -> Self {
        let mut c_last = rng.number(0, A_C_LAST);
        while !Self::is_valid_c_last_delta(c_last as i64 - load.c_last as i64) {
            c_last = rng.number(0, A_C_LAST);
        }
        Self {
            c_last,
            c_id: rng.number(0, A_C_ID),
            order_line_item_id: rng.number(0, A_ITEM_ID),
        }
    }

    /// `|C_run - C_load|` must lie in `[65, 119]` and differ from 96 and 112.
    pub fn is_valid_c_last_delta(delta: i64) -> bool {
        let delta = delta.abs();
        (65..=119).contains(&delta) && delta != 96 && delta != 112
    }

    fn get(&self, kind: NuRandKind) -> u32 {
        match kind {
            NuRandKind::LastName => self.c_last,
            NuRandKind::CustomerId => self.c_id,
            NuRandKind::ItemId => self.order_line_item_id,
        }
    }
}

/// Seeded random source owned by exactly one worker.
#[derive(Debug, Clone)]
pub struct RandomHelper {
    rng: Mt,
    seed: u64,
    constants: Option<NuRandConstants>,
}

/// Engine seed for `seed`. Seeds below 2^32 are used as is.
fn engine_seed(seed: u64) -> u32 {
    (seed ^ (seed >> 32)) as u32
}

impl RandomHelper {
    /// Creates a helper whose NURand constants are drawn on first use.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mt::new(engine_seed(seed)),
            seed,
            constants: None,
        }
    }

    /// Creates a helper with already pinned NURand constants.
    pub fn with_constants(seed: u64, constants: NuRandConstants) -> Self {
        Self {
            rng: Mt::new(engine_seed(seed)),
            seed,
            constants: Some(constants),
        }
    }

    /// The seed this helper was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the pinned NURand constants, drawing them on first call.
    pub fn constants(&mut self) -> NuRandConstants {
        match self.constants {
            Some(c) => c,
            None => {
                let c = NuRandConstants::for_load(self);
                self.constants = Some(c);
                c
            }
        }
    }

    /// Uniform integer in `[low, high]`.
    ///
    /// # Panics
    ///
    /// Panics if `low > high`.
    pub fn number(&mut self, low: u32, high: u32) -> u32 {
        assert!(low <= high, "number({low}, {high})");
        match (high - low).checked_add(1) {
            Some(span) => low + self.below(span),
            None => self.rng.next_u32(),
        }
    }

    /// Uniform integer in `[0, span)`, `span > 0`.
    fn below(&mut self, span: u32) -> u32 {
        let wide = u64::from(span);
        let mut product = u64::from(self.rng.next_u32()) * wide;
        let mut low = product as u32;
        if low < span {
            let threshold = span.wrapping_neg() % span;
            while low < threshold {
                product = u64::from(self.rng.next_u32()) * wide;
                low = product as u32;
            }
        }
        (product >> 32) as u32
    }

    /// Uniform integer in `[low, high]` that is never `excluded`.
    pub fn number_excluding(&mut self, low: u32, high: u32, excluded: u32) -> Result<u32> {
        if low >= high || excluded < low || excluded > high {
            return Err(TpccError::InvalidArgument(format!(
                "number_excluding({low}, {high}, {excluded})"
            )));
        }
        let n = self.number(low, high - 1);
        Ok(if n >= excluded { n + 1 } else { n })
    }

    /// Uniform decimal in `[low, high]` with `digits` fractional digits.
    pub fn fixed_point(&mut self, digits: u32, low: f64, high: f64) -> f64 {
        let multiplier = 10u64.pow(digits) as f64;
        let lo = (low * multiplier + 0.5) as u32;
        let hi = (high * multiplier + 0.5) as u32;
        f64::from(self.number(lo, hi)) / multiplier
    }

    /// Random lowercase string with a length in `[low_len, high_len]`.
    pub fn alpha_string(&mut self, low_len: usize, high_len: usize) -> String {
        self.string_from(ALPHA_CHARS, low_len, high_len)
    }

    /// Random digit string with a length in `[low_len, high_len]`.
    pub fn num_string(&mut self, low_len: usize, high_len: usize) -> String {
        self.string_from(NUM_CHARS, low_len, high_len)
    }

    fn string_from(&mut self, chars: &[u8], low_len: usize, high_len: usize) -> String {
        let len = self.number(low_len as u32, high_len as u32);
        let last = chars.len() as u32 - 1;
        (0..len)
            .map(|_| chars[self.number(0, last) as usize] as char)
            .collect()
    }

    /// `n` distinct integers drawn uniformly from `[low, high]`.
    ///
    /// Draws with rejection until `n` distinct values have been seen. The
    /// values are returned in draw order.
    pub fn unique_ids(&mut self, n: usize, low: u32, high: u32) -> Result<Vec<u32>> {
        if high < low || ((high - low) as usize + 1) < n {
            return Err(TpccError::InvalidArgument(format!(
                "cannot draw {n} distinct ids from [{low}, {high}]"
            )));
        }
        let mut seen = HashSet::with_capacity(n);
        let mut ids = Vec::with_capacity(n);
        while ids.len() < n {
            let id = self.number(low, high);
            if seen.insert(id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// TPC-C non-uniform random number `NURand(A, x, y)`.
    ///
    /// `a` must be 255, 1023 or 8191.
    pub fn nurand(&mut self, a: u32, x: u32, y: u32) -> Result<u32> {
        let kind = NuRandKind::from_a(a)
            .ok_or_else(|| TpccError::InvalidArgument(format!("no NURand constant for A={a}")))?;
        Ok(self.nurand_for(kind, x, y))
    }

    /// [`RandomHelper::nurand`] for a known kind.
    pub fn nurand_for(&mut self, kind: NuRandKind, x: u32, y: u32) -> u32 {
        let c = self.constants().get(kind);
        let r = self.number(0, kind.a()) | self.number(x, y);
        ((r + c) % (y - x + 1)) + x
    }

    /// Skewed customer id in `[1, max_cid]`.
    pub fn customer_id(&mut self, max_cid: u32) -> u32 {
        self.nurand_for(NuRandKind::CustomerId, 1, max_cid)
    }

    /// Skewed item id in `[1, max_item]`.
    pub fn item_id(&mut self, max_item: u32) -> u32 {
        self.nurand_for(NuRandKind::ItemId, 1, max_item)
    }

    /// Skewed last name among the first `min(1000, max_cid)` names.
    pub fn random_last_name(&mut self, max_cid: u32) -> String {
        let upper = max_cid.saturating_sub(1).min(999);
        let n = self.nurand_for(NuRandKind::LastName, 0, upper);
        last_name(n)
    }

    /// True with probability `pct` percent.
    pub fn chance(&mut self, pct: u32) -> bool {
        self.number(1, 100) <= pct
    }

    /// Shuffles `items` in place (Fisher-Yates).
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.number(0, i as u32) as usize;
            items.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_name_examples() {
        assert_eq!(last_name(0), "BARBARBAR");
        assert_eq!(last_name(1), "BARBAROUGHT");
        assert_eq!(last_name(371), "PRICALLYOUGHT");
        assert_eq!(last_name(999), "EINGEINGEING");
    }

    #[test]
    fn test_engine_seed_keeps_small_seeds() {
        assert_eq!(engine_seed(0), 0);
        assert_eq!(engine_seed(5489), 5489);
        assert_ne!(engine_seed(1 << 32), engine_seed(0));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = RandomHelper::new(0);
        let mut b = RandomHelper::new(0);
        let xs: Vec<u32> = (0..5).map(|_| a.number(1, 100)).collect();
        let ys: Vec<u32> = (0..5).map(|_| b.number(1, 100)).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|x| (1..=100).contains(x)));
    }

    #[test]
    fn test_below_covers_small_spans() {
        let mut rng = RandomHelper::new(10);
        let mut seen = [false; 3];
        for _ in 0..300 {
            seen[rng.below(3) as usize] = true;
            assert_eq!(rng.below(1), 0);
        }
        assert!(seen.iter().all(|s| *s));
        let _ = rng.number(0, u32::MAX);
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let mut rng = RandomHelper::new(11);
        let mut v: Vec<u32> = (1..=50).collect();
        rng.shuffle(&mut v);
        assert_ne!(v, (1..=50).collect::<Vec<_>>());
        v.sort_unstable();
        assert_eq!(v, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn test_number_excluding_rejects_bad_ranges() {
        let mut rng = RandomHelper::new(1);
        assert!(rng.number_excluding(5, 5, 5).is_err());
        assert!(rng.number_excluding(1, 10, 11).is_err());
        assert!(rng.number_excluding(1, 2, 1).is_ok());
    }

    #[test]
    fn test_number_excluding_two_values() {
        let mut rng = RandomHelper::new(2);
        for _ in 0..100 {
            assert_eq!(rng.number_excluding(1, 2, 1).unwrap(), 2);
            assert_eq!(rng.number_excluding(1, 2, 2).unwrap(), 1);
        }
    }

    #[test]
    fn test_fixed_point_bounds_and_digits() {
        let mut rng = RandomHelper::new(3);
        for _ in 0..1000 {
            let v = rng.fixed_point(2, 1.00, 5000.00);
            assert!((1.00..=5000.00).contains(&v));
            let cents = v * 100.0;
            assert!((cents - cents.round()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unique_ids_exhaustive_range() {
        let mut rng = RandomHelper::new(4);
        let mut ids = rng.unique_ids(10, 1, 10).unwrap();
        ids.sort_unstable();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
        assert!(rng.unique_ids(11, 1, 10).is_err());
        assert!(rng.unique_ids(0, 1, 10).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_nurand_a() {
        let mut rng = RandomHelper::new(5);
        assert!(rng.nurand(100, 1, 10).is_err());
        let v = rng.nurand(A_C_ID, 1, 3000).unwrap();
        assert!((1..=3000).contains(&v));
    }

    #[test]
    fn test_run_constants_delta() {
        let mut rng = RandomHelper::new(6);
        for _ in 0..200 {
            let load = NuRandConstants::for_load(&mut rng);
            let run = NuRandConstants::for_run(&mut rng, &load);
            let delta = run.c_last as i64 - load.c_last as i64;
            assert!(NuRandConstants::is_valid_c_last_delta(delta));
        }
        assert!(!NuRandConstants::is_valid_c_last_delta(96));
        assert!(!NuRandConstants::is_valid_c_last_delta(-112));
        assert!(!NuRandConstants::is_valid_c_last_delta(64));
        assert!(NuRandConstants::is_valid_c_last_delta(-65));
    }

    #[test]
    fn test_constants_pinned_after_first_use() {
        let mut rng = RandomHelper::new(8);
        let first = rng.constants();
        for _ in 0..1000 {
            rng.customer_id(3000);
        }
        assert_eq!(rng.constants(), first);
    }

    #[test]
    fn test_strings() {
        let mut rng = RandomHelper::new(9);
        for _ in 0..100 {
            let s = rng.alpha_string(26, 50);
            assert!((26..=50).contains(&s.len()));
            assert!(s.bytes().all(|b| b.is_ascii_lowercase()));
            let n = rng.num_string(16, 16);
            assert_eq!(n.len(), 16);
            assert!(n.bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
