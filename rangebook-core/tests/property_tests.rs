//! Property tests for range-store and settlement invariants.
//!
//! Uses proptest to verify:
//! 1. Ordering and uniqueness: one range per distinct lower bound, ascending
//! 2. Removal: reaching zero or below deletes, partial removal keeps the rest
//! 3. Rebalance conservation and the band split policy
//! 4. Atomic rollback: failing the k-th apply restores the store for every k
//! 5. Key-binding immutability

use proptest::prelude::*;
use rangebook_core::rebalance::BandSplit;
use rangebook_core::sim::InMemoryResource;
use rangebook_core::{
    LiquidityChange, LiquidityManager, Owner, PositionId, RangeStore, RebalanceEngine,
    RebalanceParams, ResourceKey,
};
use std::collections::BTreeMap;

// ── Strategies (proptest) ────────────────────────────────────────────

/// Lower bound on a spacing-10 grid, including negative and zero ticks.
fn arb_lower() -> impl Strategy<Value = i32> {
    (-200i32..200).prop_map(|t| t * 10)
}

fn arb_width() -> impl Strategy<Value = i32> {
    (1i32..50).prop_map(|w| w * 10)
}

fn arb_amount() -> impl Strategy<Value = i128> {
    1i128..1_000_000_000
}

fn arb_adds() -> impl Strategy<Value = Vec<(i32, i32, i128)>> {
    prop::collection::vec((arb_lower(), arb_width(), arb_amount()), 1..20)
}

fn pool() -> ResourceKey {
    ResourceKey::new("ETH", "USDC", 3000, 10)
}

fn manager_at(tick: i32) -> LiquidityManager<InMemoryResource> {
    let mut resource = InMemoryResource::new();
    resource.register_pool(pool(), tick);
    resource.register_pool(ResourceKey::new("ETH", "DAI", 3000, 10), tick);
    LiquidityManager::new(resource)
}

/// Keep the first width seen per lower bound, so repeated adds agree on upper.
fn consistent(adds: Vec<(i32, i32, i128)>) -> Vec<(i32, i32, i128)> {
    let mut widths = BTreeMap::new();
    adds.into_iter()
        .map(|(lower, width, amount)| {
            let width = *widths.entry(lower).or_insert(width);
            (lower, lower + width, amount)
        })
        .collect()
}

// ── 1. Ordering and uniqueness ───────────────────────────────────────

proptest! {
    #[test]
    fn one_range_per_lower_bound_ascending(adds in arb_adds()) {
        let adds = consistent(adds);
        let mut store = RangeStore::new();
        let mut expected: BTreeMap<i32, i128> = BTreeMap::new();
        for (lower, upper, amount) in &adds {
            store.upsert(*lower, *upper, *amount).unwrap();
            *expected.entry(*lower).or_insert(0) += amount;
        }

        let lowers: Vec<i32> = store.iter().map(|r| r.lower).collect();
        let expected_lowers: Vec<i32> = expected.keys().copied().collect();
        prop_assert_eq!(lowers, expected_lowers);
        for range in store.iter() {
            prop_assert_eq!(range.liquidity, expected[&range.lower]);
        }
        prop_assert!(store.check_invariants().is_ok());
    }

    // ── 2. Removal ───────────────────────────────────────────────────

    #[test]
    fn removal_deletes_at_or_below_zero(
        lower in arb_lower(),
        width in arb_width(),
        held in arb_amount(),
        removed in arb_amount(),
    ) {
        let mut store = RangeStore::new();
        store.upsert(lower, lower + width, held).unwrap();
        store.apply_delta(lower, lower + width, -removed).unwrap();

        if removed >= held {
            prop_assert!(store.get(lower).is_none());
        } else {
            prop_assert_eq!(store.get(lower).unwrap().liquidity, held - removed);
        }
        prop_assert!(store.check_invariants().is_ok());
    }

    // ── 3. Rebalance conservation ────────────────────────────────────

    #[test]
    fn rebalance_conserves_liquidity(
        adds in arb_adds(),
        reference in -1000i32..1000,
        inner_percent in 0u8..=100,
        window in 1i32..2000,
    ) {
        let adds = consistent(adds);
        let mut store = RangeStore::new();
        for (lower, upper, amount) in &adds {
            store.upsert(*lower, *upper, *amount).unwrap();
        }
        let before = store.total_liquidity().unwrap();

        let engine = RebalanceEngine::new(RebalanceParams { inner_percent, window }).unwrap();
        let plan = engine.plan(PositionId(1), &mut store, reference).unwrap();

        let removed: u128 = plan.removals().map(|a| a.magnitude()).sum();
        let added: u128 = plan.additions().map(|a| a.magnitude()).sum();
        prop_assert_eq!(removed, before as u128);
        prop_assert_eq!(added, removed);
        prop_assert_eq!(store.total_liquidity(), Some(before));

        let split = plan.split.unwrap();
        prop_assert_eq!(split.inner, before * i128::from(inner_percent) / 100);
        prop_assert!(split.right - split.left == 0 || split.right - split.left == 1);
        prop_assert_eq!(plan.actions.len(), store_len_before(&adds) + 3);
    }

    #[test]
    fn band_split_always_sums_to_total(total in 0i128..1_000_000_000_000, pct in 0u8..=100) {
        let split = BandSplit::compute(total, pct).unwrap();
        prop_assert_eq!(split.total(), total);
        prop_assert!(split.right >= split.left);
        prop_assert!(split.right - split.left <= 1);
    }

    // ── 4. Atomic rollback for every k ───────────────────────────────

    #[test]
    fn failed_batch_restores_store_for_every_k(
        seed in arb_adds(),
        batch in arb_adds(),
        tick in -1000i32..1000,
    ) {
        let seed = consistent(seed);
        let owner = Owner::new("alice");
        let mut m = manager_at(tick);
        let (l, u, a) = seed[0];
        let id = m.add_liquidity(&owner, PositionId::NEW, &pool(), l, u, a, &[]).unwrap().position;
        for (lower, upper, amount) in &seed[1..] {
            m.add_liquidity(&owner, id, &pool(), *lower, *upper, *amount, &[]).unwrap();
        }

        // New ranges only, widths consistent with the seeded store.
        let taken: BTreeMap<i32, i32> = m.ranges(id).unwrap().iter().map(|r| (r.lower, r.upper)).collect();
        let changes: Vec<LiquidityChange> = consistent(batch)
            .into_iter()
            .map(|(lower, upper, amount)| {
                let upper = taken.get(&lower).copied().unwrap_or(upper);
                LiquidityChange::add(lower, upper, amount)
            })
            .collect();

        let before = m.ranges(id).cloned();
        let journal = m.resource().journal().len();
        for k in 1..=changes.len() {
            m.resource_mut().fail_apply_at(k);
            let err = m.modify_liquidity(&owner, id, &pool(), changes.clone(), &[]).unwrap_err();
            prop_assert_eq!(err.kind(), "external_apply_failure");
            prop_assert_eq!(m.ranges(id).cloned(), before.clone());
            prop_assert_eq!(m.resource().journal().len(), journal);
        }

        prop_assert!(m.modify_liquidity(&owner, id, &pool(), changes.clone(), &[]).is_ok());
        prop_assert_eq!(m.resource().journal().len(), journal + changes.len());
    }

    #[test]
    fn failed_rebalance_restores_store_for_every_k(
        seed in arb_adds(),
        reference in -100i32..100,
    ) {
        let seed = consistent(seed);
        let owner = Owner::new("alice");
        let mut m = manager_at(0);
        let id = m
            .modify_liquidity(
                &owner,
                PositionId::NEW,
                &pool(),
                seed.iter().map(|(l, u, a)| LiquidityChange::add(*l, *u, *a)).collect(),
                &[],
            )
            .unwrap()
            .position;
        let before = m.ranges(id).cloned();
        let journal = m.resource().journal().len();
        let reference = reference * 10;

        // Every drained range is one apply; only non-zero bands add one more.
        let store = m.ranges(id).unwrap();
        let split = BandSplit::compute(store.total_liquidity().unwrap(), 80).unwrap();
        let bands = [split.inner, split.left, split.right]
            .iter()
            .filter(|b| **b > 0)
            .count();
        let effective = store.len() + bands;

        for k in 1..=effective {
            m.resource_mut().fail_apply_at(k);
            let err = m.rebalance(&owner, id, reference, &[]).unwrap_err();
            prop_assert_eq!(err.kind(), "external_apply_failure");
            prop_assert_eq!(m.ranges(id).cloned(), before.clone());
            prop_assert_eq!(m.resource().journal().len(), journal);
        }

        prop_assert!(m.rebalance(&owner, id, reference, &[]).is_ok());
        prop_assert_eq!(m.resource().journal().len(), journal + effective);
    }

    // ── 5. Key-binding immutability ──────────────────────────────────

    #[test]
    fn other_key_always_mismatches(seed in arb_adds(), extra in arb_adds()) {
        let seed = consistent(seed);
        let owner = Owner::new("alice");
        let other = ResourceKey::new("ETH", "DAI", 3000, 10);
        let mut m = manager_at(0);
        let (l, u, a) = seed[0];
        let id = m.add_liquidity(&owner, PositionId::NEW, &pool(), l, u, a, &[]).unwrap().position;
        let before = m.ranges(id).cloned();

        for (lower, width, amount) in extra {
            let err = m
                .add_liquidity(&owner, id, &other, lower, lower + width, amount, &[])
                .unwrap_err();
            prop_assert_eq!(err.kind(), "key_mismatch");
        }
        prop_assert_eq!(m.ranges(id).cloned(), before);
        prop_assert_eq!(m.resource().journal().len(), 1);
    }
}

fn store_len_before(adds: &[(i32, i32, i128)]) -> usize {
    adds.iter()
        .map(|(lower, _, _)| *lower)
        .collect::<std::collections::BTreeSet<_>>()
        .len()
}
