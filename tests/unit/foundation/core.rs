use super::*;

#[test]
fn cache_aligned_occupies_a_full_line() {
    assert_eq!(std::mem::align_of::<CacheAligned<u32>>(), CACHE_LINE_SIZE);
    assert_eq!(std::mem::size_of::<CacheAligned<u32>>(), CACHE_LINE_SIZE);

    let pair = [CacheAligned::new(1u32), CacheAligned::new(2u32)];
    let a = &pair[0] as *const _ as usize;
    let b = &pair[1] as *const _ as usize;
    assert_eq!(b - a, CACHE_LINE_SIZE);
    assert_eq!(*pair[1], 2);
}

#[test]
fn align_up_rounds_to_power_of_two() {
    assert_eq!(align_up(0, 64), Some(0));
    assert_eq!(align_up(1, 64), Some(64));
    assert_eq!(align_up(64, 64), Some(64));
    assert_eq!(align_up(65, 8), Some(72));
    assert_eq!(align_up(usize::MAX, 64), None);
}

#[test]
fn ids_expose_indices() {
    assert_eq!(PhaseId(3).index(), 3);
    assert_eq!(TechniqueId(7).index(), 7);
}
