use super::*;
use crate::{AggregatorConfig, LinearArena, Scheduler, SchedulerConfig};

fn scheduler(arena_bytes: usize) -> Scheduler<u32> {
    Scheduler::new(SchedulerConfig {
        arena_bytes,
        ..SchedulerConfig::default()
    })
    .unwrap()
}

fn aggregator(s: &Scheduler<u32>, batch_capacity: u32) -> Aggregator<u32> {
    Aggregator::new(
        s,
        AggregatorConfig {
            capacity: 64,
            batch_capacity,
            ..AggregatorConfig::default()
        },
    )
    .unwrap()
}

#[test]
fn tasks_stay_local_until_flush() {
    let s = scheduler(1 << 20);
    let agg = aggregator(&s, 16);

    let mut batch = agg.make_batch(PhaseId(2));
    assert!(batch.is_empty());
    batch.add(1, TechniqueId(0), 10);
    batch.add(2, TechniqueId(0), 11);
    batch.add(3, TechniqueId(1), 12);
    assert_eq!(batch.len(), 3);
    assert_eq!(batch.phase(), PhaseId(2));
    assert!(agg.is_empty());

    batch.flush();
    assert!(batch.is_empty());
    assert_eq!(agg.len(), 1);
}

#[test]
fn full_buffer_flushes_itself() {
    let s = scheduler(1 << 20);
    let agg = aggregator(&s, 4);

    let mut batch = agg.make_batch(PhaseId(0));
    for i in 0..10 {
        batch.add(i, TechniqueId(0), i);
    }
    assert_eq!(agg.len(), 2);
    assert_eq!(batch.len(), 2);

    batch.flush();
    assert_eq!(agg.len(), 3);
}

#[test]
fn flushing_an_empty_batch_records_nothing() {
    let s = scheduler(1 << 20);
    let agg = aggregator(&s, 4);

    let mut batch = agg.make_batch(PhaseId(0));
    batch.flush();
    batch.flush();
    assert!(agg.is_empty());
    assert_eq!(s.arena().used(), 0);
}

#[test]
#[should_panic(expected = "unflushed tasks")]
fn dropping_an_unflushed_batch_panics() {
    let s = scheduler(1 << 20);
    let agg = aggregator(&s, 4);
    let mut batch = agg.make_batch(PhaseId(0));
    batch.add(0, TechniqueId(0), 0);
    drop(batch);
}

#[test]
fn buffers_are_charged_to_the_arena() {
    let s = scheduler(1 << 20);
    let agg = aggregator(&s, 32);
    let block = LinearArena::calc_size(32 * std::mem::size_of::<Task<u32>>());

    let mut batch = agg.make_batch(PhaseId(0));
    batch.add(0, TechniqueId(0), 0);
    assert_eq!(s.arena().used(), block);

    for i in 0..32 {
        batch.add(i, TechniqueId(0), i);
    }
    batch.flush();
    assert_eq!(s.arena().used(), 2 * block);

    let span = batch.reserve(100, 8);
    assert!(s.arena().is_live(&span));
    assert_eq!(span.len(), 100);
}

#[test]
fn arena_exhaustion_never_fails_the_producer() {
    let s = scheduler(128);
    let agg = aggregator(&s, 64);

    let mut batch = agg.make_batch(PhaseId(0));
    batch.add(5, TechniqueId(0), 1);
    batch.add(6, TechniqueId(0), 2);
    assert_eq!(batch.len(), 2);
    assert!(s.overflowed());

    batch.flush();
    assert_eq!(agg.len(), 1);
}

#[test]
fn oversized_reserve_sends_the_cycle_through_recovery() {
    let mut s = scheduler(1024);
    let mut agg = aggregator(&s, 4);
    let phases = crate::PhaseTable::new(vec![crate::PhaseDesc::unsorted("only")]).unwrap();

    let mut batch = agg.make_batch(PhaseId(0));
    batch.add(0, TechniqueId(0), 1);
    let span = batch.reserve(4096, 8);
    batch.flush();
    drop(batch);
    assert!(span.is_detached());
    assert!(!s.arena().is_live(&span));
    assert!(s.overflowed());

    let mut recovered = false;
    let total = s
        .consolidate(&mut agg, &phases, |agg| {
            recovered = true;
            let mut batch = agg.make_batch(PhaseId(0));
            batch.add(0, TechniqueId(0), 2);
            let span = batch.reserve(256, 8);
            batch.flush();
            assert_eq!(span.len(), 256);
        })
        .unwrap();
    assert!(recovered);
    assert_eq!(total, 1);
    assert_eq!(s.phase_tasks(PhaseId(0)).unwrap()[0].data, 2);
}
