use super::*;

#[test]
fn fnv_hash_is_streaming() {
    let mut a = Fnv1a64::new_default();
    a.write_bytes(b"frameplan");
    let mut b = Fnv1a64::new_default();
    b.write_bytes(b"frame");
    b.write_bytes(b"plan");
    assert_eq!(a.finish(), b.finish());
}

#[test]
fn fnv_integer_writes_are_little_endian_bytes() {
    let mut a = Fnv1a64::new_default();
    a.write_u64(0x0102_0304_0506_0708);
    let mut b = Fnv1a64::new_default();
    b.write_bytes(&[8, 7, 6, 5, 4, 3, 2, 1]);
    assert_eq!(a.finish(), b.finish());
}

#[test]
fn task_hash_is_deterministic_and_spreads() {
    assert_eq!(task_hash(7, 1, 2), task_hash(7, 1, 2));
    assert_ne!(task_hash(7, 1, 2), task_hash(7, 2, 1));
    assert_ne!(task_hash(7, 1, 2), task_hash(8, 1, 2));
}
