//! End-to-end picker scenarios S1–S3 (spec.md §8), built directly over
//! [`meshreg::picker::Picker`] so they run without a live directory.

use meshreg::context::{context_with_hash, context_with_standard, context_with_target};
use meshreg::picker::{PickResult, Picker};
use meshreg::ring::Ring;

fn picker_over(addrs: &[&str]) -> Picker {
    let mut ring = Ring::new(20);
    for a in addrs {
        ring.add(a);
    }
    Picker::new(addrs.iter().map(|s| s.to_string()).collect(), ring, false)
}

/// S1 — round-robin: three services, no hint, 9 picks, each address
/// occurring exactly 3 times.
#[test]
fn s1_round_robin_distributes_three_each() {
    let picker = picker_over(&["10.0.0.1:9001", "10.0.0.2:9001", "10.0.0.3:9001"]);
    let mut counts = std::collections::HashMap::new();
    for _ in 0..9 {
        if let PickResult::Address(addr) = picker.pick(&context_with_standard()) {
            *counts.entry(addr).or_insert(0) += 1;
        }
    }
    assert_eq!(counts.len(), 3);
    for count in counts.values() {
        assert_eq!(*count, 3);
    }
}

/// S2 — consistent-hash: same routing key always resolves to the same
/// address while membership is unchanged; removing one node displaces at
/// most one of two sampled keys.
#[test]
fn s2_consistent_hash_stable_until_membership_changes() {
    let picker = picker_over(&["10.0.0.1:9001", "10.0.0.2:9001", "10.0.0.3:9001"]);
    let first = picker.pick(&context_with_hash("42"));
    let second = picker.pick(&context_with_hash("42"));
    assert_eq!(first, second);

    let before_42 = first;
    let before_7 = picker.pick(&context_with_hash("7"));

    let after_picker = picker_over(&["10.0.0.1:9001", "10.0.0.3:9001"]);
    let after_42 = after_picker.pick(&context_with_hash("42"));
    let after_7 = after_picker.pick(&context_with_hash("7"));

    let moved = (before_42 != after_42) as u32 + (before_7 != after_7) as u32;
    assert!(moved <= 1, "expected at most one of two keys to move, got {moved}");
}

/// S3 — broadcast: membership of size 3, targets 1..=3 resolve to
/// distinct addresses, target 4 returns `TargetOver`.
#[test]
fn s3_broadcast_visits_each_ready_subconn_then_terminates() {
    let picker = picker_over(&["10.0.0.1:9001", "10.0.0.2:9001", "10.0.0.3:9001"]);

    let mut seen = Vec::new();
    for target in 1..=3u32 {
        match picker.pick(&context_with_target(target)) {
            PickResult::Address(addr) => seen.push(addr),
            other => panic!("expected an address at target {target}, got {other:?}"),
        }
    }
    assert_eq!(seen.len(), 3);
    assert_eq!(seen.iter().collect::<std::collections::HashSet<_>>().len(), 3);

    assert_eq!(picker.pick(&context_with_target(4)), PickResult::TargetOver);
}

#[test]
fn sticky_error_pool_returns_error_before_touching_hints() {
    let picker = Picker::new(vec!["a".into()], Ring::new(20), true);
    assert_eq!(
        picker.pick(&context_with_hash("anything")),
        PickResult::StickyError
    );
}
