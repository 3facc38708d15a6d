use super::*;

#[test]
fn allocation_within_budget_does_not_flag() {
    let shared = SharedArena::new(LinearArena::new(256).unwrap());
    let span = shared.allocate_or_flag(64, 64);
    assert!(!span.is_detached());
    assert!(!shared.overflowed());
}

#[test]
fn exhaustion_flags_rewinds_and_retries_once() {
    let shared = SharedArena::new(LinearArena::new(128).unwrap());
    let first = shared.allocate_or_flag(128, 64);
    let second = shared.allocate_or_flag(64, 64);

    assert!(shared.overflowed());
    assert!(!second.is_detached());
    assert_eq!(second.offset(), 0);
    assert!(!shared.arena().is_live(&first));
    assert!(shared.arena().is_live(&second));
}

#[test]
fn oversized_request_yields_detached_span() {
    let shared = SharedArena::new(LinearArena::new(64).unwrap());
    let span = shared.allocate_or_flag(1024, 64);
    assert!(span.is_detached());
    assert!(shared.overflowed());

    shared.reset();
    assert!(!shared.overflowed());
    assert_eq!(shared.arena().available(), 64);
}
