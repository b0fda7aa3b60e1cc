//! Unit tests for ring_cursor.rs

use super::*;

#[test]
fn test_zero_page_is_reserved_and_aligned() {
    let cursor = RingCursor::new(64 * 1024, 256, 4096);
    assert_eq!(cursor.zero_page(), 4096);

    let cursor = RingCursor::new(64 * 1024, 256, 300);
    assert_eq!(cursor.zero_page(), 512);
}

#[test]
fn test_push_returns_aligned_offsets() {
    let mut cursor = RingCursor::new(16 * 1024, 256, 4096);
    assert_eq!(cursor.push(288), Some(4096));
    assert_eq!(cursor.push(64), Some(4096 + 512));
    assert_eq!(cursor.push(192), Some(4096 + 768));
    for offset in [cursor.push(1), cursor.push(4096)] {
        assert_eq!(offset.unwrap() % 256, 0);
    }
}

#[test]
fn test_push_fails_when_full() {
    let mut cursor = RingCursor::new(1024, 256, 256);
    assert_eq!(cursor.push(512), Some(256));
    assert_eq!(cursor.push(256), Some(768));
    assert_eq!(cursor.push(1), None);
    assert_eq!(cursor.push(u64::MAX), None);
}

#[test]
fn test_reset_rewinds_to_after_zero_page() {
    let mut cursor = RingCursor::new(4096, 64, 128);
    cursor.push(1000);
    assert!(cursor.used() > 0);
    cursor.reset();
    assert_eq!(cursor.used(), 0);
    assert_eq!(cursor.push(16), Some(128));
}

#[test]
fn test_zero_alignment_is_treated_as_one() {
    let mut cursor = RingCursor::new(100, 0, 10);
    assert_eq!(cursor.push(7), Some(10));
    assert_eq!(cursor.push(7), Some(17));
}
