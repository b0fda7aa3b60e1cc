//! Unit tests for HostData

use super::*;
use crate::Error;

#[test]
fn test_new_is_zero_filled_and_initialized() {
    let data = HostData::new(8, Some(&[1, 2, 3]));
    assert_eq!(data.snapshot(), vec![1, 2, 3, 0, 0, 0, 0, 0]);
    assert_eq!(data.len(), 8);
}

#[test]
fn test_write_bumps_generation() {
    let data = HostData::new(4, None);
    let before = data.generation();
    data.write("cb", 2, &[7, 7]).unwrap();
    assert!(data.generation() > before);
    assert_eq!(data.snapshot(), vec![0, 0, 7, 7]);
}

#[test]
fn test_write_out_of_range_is_rejected() {
    let data = HostData::new(4, None);
    let before = data.generation();
    assert!(matches!(data.write("cb", 3, &[1, 2]), Err(Error::InvalidResource(_))));
    assert_eq!(data.generation(), before);
}

#[test]
fn test_copy_into_truncates_and_pads() {
    let data = HostData::new(4, Some(&[1, 2, 3, 4]));

    let mut small = [9u8; 2];
    assert_eq!(data.copy_into(&mut small), 2);
    assert_eq!(small, [1, 2]);

    let mut large = [9u8; 6];
    assert_eq!(data.copy_into(&mut large), 4);
    assert_eq!(large, [1, 2, 3, 4, 0, 0]);
}
