use super::*;

#[test]
fn rejects_unaligned_or_zero_capacity() {
    assert!(LinearArena::new(0).is_err());
    let err = LinearArena::new(100).unwrap_err();
    assert!(err.to_string().contains("cache line"));
    assert!(LinearArena::new(128).is_ok());
}

#[test]
fn calc_size_rounds_to_cache_lines() {
    assert_eq!(LinearArena::calc_size(0), 0);
    assert_eq!(LinearArena::calc_size(1), CACHE_LINE_SIZE);
    assert_eq!(LinearArena::calc_size(8 * 1024), 8 * 1024);
    assert_eq!(LinearArena::calc_size(8 * 1024 + 1), 8 * 1024 + CACHE_LINE_SIZE);
    assert_eq!(LinearArena::calc_size(usize::MAX) % CACHE_LINE_SIZE, 0);
}

#[test]
fn allocations_are_aligned_and_bounded() {
    let arena = LinearArena::new(256).unwrap();
    let a = arena.allocate(10, 1).unwrap();
    assert_eq!(a.offset(), 0);
    assert_eq!(a.len(), 10);

    let b = arena.allocate(16, 64).unwrap();
    assert_eq!(b.offset(), 64);
    assert_eq!(arena.used(), 80);
    assert_eq!(arena.available(), 176);

    assert!(arena.allocate(200, 1).is_none());
    assert!(arena.allocate(8, 3).is_none());
    let c = arena.allocate(176, 0).unwrap();
    assert_eq!(c.offset(), 80);
    assert_eq!(arena.available(), 0);
    assert!(arena.allocate(1, 1).is_none());
}

#[test]
fn reset_restores_full_capacity_and_invalidates_spans() {
    let arena = LinearArena::new(128).unwrap();
    let span = arena.allocate(128, 64).unwrap();
    assert!(arena.is_live(&span));
    assert_eq!(arena.available(), 0);

    arena.reset();
    assert_eq!(arena.available(), arena.capacity());
    assert_eq!(arena.generation(), 1);
    assert!(!arena.is_live(&span));

    let again = arena.allocate(128, 64).unwrap();
    assert!(arena.is_live(&again));
    assert_eq!(arena.high_water(), 128);

    arena.reset();
    arena.reset();
    assert_eq!(arena.available(), 128);
}

#[test]
fn detached_spans_are_never_live() {
    let arena = LinearArena::new(64).unwrap();
    let span = ArenaSpan::detached(4096);
    assert!(span.is_detached());
    assert!(!arena.is_live(&span));
    assert_eq!(span.len(), 4096);
}

#[test]
fn concurrent_allocations_never_overlap() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 64;
    let arena = LinearArena::new(THREADS * PER_THREAD * CACHE_LINE_SIZE).unwrap();

    let mut spans: Vec<ArenaSpan> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    (0..PER_THREAD)
                        .map(|_| arena.allocate(40, CACHE_LINE_SIZE).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    spans.sort_by_key(|s| s.offset());
    assert_eq!(spans.len(), THREADS * PER_THREAD);
    for pair in spans.windows(2) {
        assert!(pair[0].offset() + pair[0].len() <= pair[1].offset());
        assert_eq!(pair[1].offset() % CACHE_LINE_SIZE, 0);
    }
    assert!(arena.allocate(1, 1).is_none());
}

#[test]
fn spans_live_after_concurrent_resets_belong_to_the_last_cycle() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 2000;
    let arena = LinearArena::new(64 * CACHE_LINE_SIZE).unwrap();

    let spans: Vec<ArenaSpan> = std::thread::scope(|s| {
        let producers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    (0..PER_THREAD)
                        .filter_map(|_| arena.allocate(24, 8))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        s.spawn(|| {
            for _ in 0..200 {
                arena.reset();
                std::thread::yield_now();
            }
        });
        producers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let mut live: Vec<_> = spans.iter().filter(|s| arena.is_live(s)).collect();
    live.sort_by_key(|s| s.offset());
    for pair in live.windows(2) {
        assert!(pair[0].offset() + pair[0].len() <= pair[1].offset());
    }
    if let Some(last) = live.last() {
        assert!(last.offset() + last.len() <= arena.used());
    }
}
