//! BDD tests for the public operation surface.
//!
//! Scenarios:
//! 1. Add to a new position: one range, one external apply
//! 2. Second add to the same position: two ranges, applies in order, same key
//! 3. Rebalance around zero: exact four-action list
//! 4. Batch that fails mid-session leaves nothing behind; retry succeeds
//! 5. Preconditions: zero amount, foreign caller, uninitialized, wrong key
//! 6. Removal semantics: partial, exact and over-removal

use rangebook_core::sim::InMemoryResource;
use rangebook_core::{
    LiquidityChange, LiquidityError, LiquidityManager, Owner, PositionId, Range, RangeStore,
    ResourceKey,
};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

const E18: i128 = 1_000_000_000_000_000_000;

fn pool_a() -> ResourceKey {
    ResourceKey::new("ETH", "USDC", 3000, 10)
}

fn pool_b() -> ResourceKey {
    ResourceKey::new("ETH", "USDC", 500, 10)
}

fn alice() -> Owner {
    Owner::new("alice")
}

fn manager() -> LiquidityManager<InMemoryResource> {
    let mut resource = InMemoryResource::new();
    resource.register_pool(pool_a(), 0);
    resource.register_pool(pool_b(), 0);
    LiquidityManager::new(resource)
}

/// Scenario 2 state: one position with `[-1000,1000]` 1e18 and `[-2000,0]` 2e18.
fn two_range_position() -> (LiquidityManager<InMemoryResource>, PositionId) {
    let mut m = manager();
    let id = m
        .add_liquidity(&alice(), PositionId::NEW, &pool_a(), -1000, 1000, E18, &[])
        .expect("first add should succeed")
        .position;
    m.add_liquidity(&alice(), id, &pool_a(), -2000, 0, 2 * E18, &[])
        .expect("second add should succeed");
    (m, id)
}

fn stored(m: &LiquidityManager<InMemoryResource>, id: PositionId) -> Vec<Range> {
    m.ranges(id).map(|s| s.iter().copied().collect()).unwrap_or_default()
}

fn snapshot(m: &LiquidityManager<InMemoryResource>, id: PositionId) -> Option<RangeStore> {
    m.ranges(id).cloned()
}

// ──────────────────────────────────────────────
// Scenarios from the reference walkthrough
// ──────────────────────────────────────────────

#[test]
fn bdd_scenario_add_to_new_position() {
    // GIVEN an empty manager over a pool at tick 0
    let mut m = manager();

    // WHEN alice adds 1e18 on [-1000, 1000) to a new position
    let receipt = m
        .add_liquidity(&alice(), PositionId::NEW, &pool_a(), -1000, 1000, E18, &[])
        .expect("add should succeed");

    // THEN exactly one range is stored with the full liquidity
    assert_eq!(stored(&m, receipt.position), vec![Range::new(-1000, 1000, E18)]);
    assert_eq!(m.ranges(receipt.position).unwrap().total_liquidity(), Some(E18));
    assert_eq!(m.total_positions(), 1);

    // AND one external apply was recorded with those exact bounds and delta
    let journal = m.resource().journal();
    assert_eq!(journal.len(), 1);
    assert_eq!((journal[0].lower, journal[0].upper), (-1000, 1000));
    assert_eq!(journal[0].liquidity_delta, E18);
    assert_eq!(journal[0].position, receipt.position);
}

#[test]
fn bdd_scenario_second_add_same_position() {
    // GIVEN the scenario-2 position
    let (m, id) = two_range_position();

    // THEN the store holds two ranges in ascending order
    assert_eq!(
        stored(&m, id),
        vec![Range::new(-2000, 0, 2 * E18), Range::new(-1000, 1000, E18)]
    );

    // AND two applies were recorded in insertion order against the same key
    let journal = m.resource().journal();
    assert_eq!(journal.len(), 2);
    assert_eq!(journal[0].lower, -1000);
    assert_eq!(journal[1].lower, -2000);
    assert!(journal.iter().all(|r| r.key == pool_a()));
}

#[test]
fn bdd_scenario_rebalance_around_zero() {
    // GIVEN a position with a single range [-1000, 1000) holding 100
    let mut m = manager();
    let id = m
        .add_liquidity(&alice(), PositionId::NEW, &pool_a(), -1000, 1000, 100, &[])
        .unwrap()
        .position;

    // WHEN it is rebalanced at reference 0 (window 500, 80% inner)
    let receipt = m.rebalance(&alice(), id, 0, &[]).expect("rebalance should succeed");

    // THEN the action list is removal then inner, left and right bands
    let rendered: Vec<String> = receipt.actions.iter().map(|a| a.to_string()).collect();
    assert_eq!(
        rendered,
        vec![
            "remove(-1000,1000,-100)",
            "add(-500,500,80)",
            "add(-1000,-500,10)",
            "add(500,1000,10)",
        ]
    );

    // AND the store holds exactly the three bands
    assert_eq!(
        stored(&m, id),
        vec![
            Range::new(-1000, -500, 10),
            Range::new(-500, 500, 80),
            Range::new(500, 1000, 10),
        ]
    );
}

#[test]
fn bdd_scenario_failed_batch_leaves_nothing_and_retry_succeeds() {
    // GIVEN the scenario-2 position
    let (mut m, id) = two_range_position();
    let before = snapshot(&m, id);
    let journal_before = m.resource().journal().len();
    let batch = vec![
        LiquidityChange::add(-500, 500, E18),
        LiquidityChange::add(1000, 2000, E18),
    ];

    // WHEN the 2nd apply of a 2-action add batch fails at the resource
    m.resource_mut().fail_apply_at(2);
    let err = m
        .modify_liquidity(&alice(), id, &pool_a(), batch.clone(), &[])
        .unwrap_err();

    // THEN the failure is reported as ExternalApplyFailure on action index 1
    assert!(matches!(err, LiquidityError::ExternalApplyFailure { index: 1, .. }));

    // AND the store still shows only the original two ranges
    assert_eq!(snapshot(&m, id), before);
    assert_eq!(m.resource().journal().len(), journal_before);

    // WHEN the identical batch is retried without the fault
    let receipt = m
        .modify_liquidity(&alice(), id, &pool_a(), batch, &[])
        .expect("retry should succeed");

    // THEN exactly the batch's applies were added to the journal
    assert_eq!(receipt.report.applied.len(), 2);
    assert_eq!(m.resource().journal().len(), journal_before + 2);
    assert_eq!(m.ranges(id).unwrap().len(), 4);
}

#[test]
fn bdd_scenario_failed_single_add_retry_adds_one_record() {
    // GIVEN the scenario-2 position
    let (mut m, id) = two_range_position();
    let before = snapshot(&m, id);

    // WHEN a new add fails at the resource
    m.resource_mut().fail_apply_at(1);
    let err = m
        .add_liquidity(&alice(), id, &pool_a(), 2000, 3000, E18, &[])
        .unwrap_err();
    assert_eq!(err.kind(), "external_apply_failure");
    assert_eq!(snapshot(&m, id), before);

    // THEN retrying the identical add records exactly one new apply
    m.add_liquidity(&alice(), id, &pool_a(), 2000, 3000, E18, &[])
        .expect("retry should succeed");
    assert_eq!(m.resource().journal().len(), 3);
    assert_eq!(m.resource().journal()[2].lower, 2000);
}

// ──────────────────────────────────────────────
// Preconditions
// ──────────────────────────────────────────────

#[test]
fn bdd_zero_amount_rejected_without_side_effects() {
    let (mut m, id) = two_range_position();
    let before = snapshot(&m, id);

    let err = m
        .add_liquidity(&alice(), id, &pool_a(), 0, 100, 0, &[])
        .unwrap_err();
    assert_eq!(err, LiquidityError::ZeroOrNegativeLiquidity(0));

    let err = m
        .remove_liquidity(&alice(), id, &pool_a(), -1000, 1000, -5, &[])
        .unwrap_err();
    assert_eq!(err, LiquidityError::ZeroOrNegativeLiquidity(-5));

    assert_eq!(snapshot(&m, id), before);
    assert_eq!(m.resource().journal().len(), 2);
}

#[test]
fn bdd_foreign_caller_is_not_owner() {
    let (mut m, id) = two_range_position();
    let bob = Owner::new("bob");

    let err = m.rebalance(&bob, id, 0, &[]).unwrap_err();
    assert_eq!(
        err,
        LiquidityError::NotOwner {
            position: id,
            caller: "bob".into()
        }
    );

    // AND an id that was never minted has no owner at all
    let err = m
        .add_liquidity(&alice(), PositionId(42), &pool_a(), 0, 100, 1, &[])
        .unwrap_err();
    assert_eq!(err.kind(), "not_owner");
}

#[test]
fn bdd_transferred_position_follows_new_owner() {
    let (mut m, id) = two_range_position();
    let bob = Owner::new("bob");
    assert!(m.identity_mut().transfer(id, bob.clone()));

    assert_eq!(m.rebalance(&alice(), id, 0, &[]).unwrap_err().kind(), "not_owner");
    assert!(m.rebalance(&bob, id, 0, &[]).is_ok());
}

#[test]
fn bdd_minted_but_unused_position_is_not_initialized() {
    // GIVEN an id minted directly at the identity collaborator
    let mut m = manager();
    let id = {
        use rangebook_core::IdentityRegistry;
        m.identity_mut().mint_next(&alice())
    };

    // WHEN removing or rebalancing before any add
    let remove = m
        .remove_liquidity(&alice(), id, &pool_a(), 0, 100, 1, &[])
        .unwrap_err();
    let rebalance = m.rebalance(&alice(), id, 0, &[]).unwrap_err();

    // THEN both fail with NotInitialized
    assert_eq!(remove, LiquidityError::NotInitialized(id));
    assert_eq!(rebalance, LiquidityError::NotInitialized(id));

    // AND the first add binds it
    m.add_liquidity(&alice(), id, &pool_a(), 0, 100, 1, &[]).unwrap();
    assert!(m.position(id).unwrap().is_initialized());
}

#[test]
fn bdd_key_binding_is_permanent() {
    // GIVEN a position bound to pool A
    let (mut m, id) = two_range_position();
    let before = snapshot(&m, id);

    // WHEN any operation presents pool B
    let add = m.add_liquidity(&alice(), id, &pool_b(), 0, 100, 1, &[]);
    let remove = m.remove_liquidity(&alice(), id, &pool_b(), -1000, 1000, 1, &[]);
    let batch = m.modify_liquidity(
        &alice(),
        id,
        &pool_b(),
        vec![LiquidityChange::add(0, 100, 1)],
        &[],
    );

    // THEN each fails with KeyMismatch and nothing moves
    for result in [add, remove, batch] {
        assert_eq!(result.unwrap_err().kind(), "key_mismatch");
    }
    assert_eq!(snapshot(&m, id), before);
    assert_eq!(m.position(id).unwrap().binding(), Some(&pool_a()));
    assert_eq!(m.resource().journal().len(), 2);
}

#[test]
fn bdd_invalid_bounds_rejected() {
    let mut m = manager();
    let err = m
        .add_liquidity(&alice(), PositionId::NEW, &pool_a(), 100, 100, 1, &[])
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_range");
    assert_eq!(m.total_positions(), 0);
}

// ──────────────────────────────────────────────
// Removal semantics
// ──────────────────────────────────────────────

#[test]
fn bdd_partial_remove_keeps_range() {
    let (mut m, id) = two_range_position();
    m.remove_liquidity(&alice(), id, &pool_a(), -1000, 1000, E18 / 4, &[])
        .unwrap();
    assert_eq!(m.ranges(id).unwrap().get(-1000).unwrap().liquidity, 3 * E18 / 4);
}

#[test]
fn bdd_exact_remove_deletes_range() {
    let (mut m, id) = two_range_position();
    m.remove_liquidity(&alice(), id, &pool_a(), -1000, 1000, E18, &[])
        .unwrap();
    assert_eq!(stored(&m, id), vec![Range::new(-2000, 0, 2 * E18)]);
}

#[test]
fn bdd_over_remove_rejected_by_resource_and_rolled_back() {
    let (mut m, id) = two_range_position();
    let before = snapshot(&m, id);

    let err = m
        .remove_liquidity(&alice(), id, &pool_a(), -1000, 1000, 2 * E18, &[])
        .unwrap_err();

    assert_eq!(err.kind(), "external_apply_failure");
    assert_eq!(snapshot(&m, id), before);
}

#[test]
fn bdd_remove_unknown_range_fails() {
    let (mut m, id) = two_range_position();
    let err = m
        .remove_liquidity(&alice(), id, &pool_a(), 5000, 6000, 1, &[])
        .unwrap_err();
    assert_eq!(err.kind(), "range_not_found");
}

#[test]
fn bdd_upper_bound_mismatch_rejected() {
    let (mut m, id) = two_range_position();
    let err = m
        .add_liquidity(&alice(), id, &pool_a(), -1000, 2000, 1, &[])
        .unwrap_err();
    assert_eq!(err.kind(), "upper_bound_mismatch");
}

#[test]
fn bdd_misaligned_bounds_rolled_back() {
    let (mut m, id) = two_range_position();
    let before = snapshot(&m, id);
    let err = m
        .add_liquidity(&alice(), id, &pool_a(), 5, 105, 1, &[])
        .unwrap_err();
    assert_eq!(err.kind(), "external_apply_failure");
    assert_eq!(snapshot(&m, id), before);
}
