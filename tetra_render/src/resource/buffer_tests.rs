//! Unit tests for buffer.rs

use crate::resource::{BufferDesc, BufferUsage, IndexFormat, check_update_range};
use crate::layout::{Vertex, ObjectConstants};
use crate::Error;

// ============================================================================
// DESCRIPTOR CONSTRUCTORS
// ============================================================================

#[test]
fn test_vertex_desc_uses_vertex_stride() {
    let vertices = [Vertex::default(); 3];
    let desc = BufferDesc::vertex("tri", &vertices);
    assert_eq!(desc.usage, BufferUsage::Vertex);
    assert_eq!(desc.stride, 92);
    assert_eq!(desc.size, 92 * 3);
    assert!(desc.validate().is_ok());
}

#[test]
fn test_index_desc_widths() {
    let short = BufferDesc::index_u16("i16", &[0, 1, 2]);
    let long = BufferDesc::index_u32("i32", &[0, 1, 2]);
    assert_eq!(short.size, 6);
    assert_eq!(long.size, 12);
    assert_eq!(IndexFormat::from_stride(short.stride), Some(IndexFormat::U16));
    assert_eq!(IndexFormat::from_stride(long.stride), Some(IndexFormat::U32));
    assert_eq!(IndexFormat::U32.size_bytes(), 4);
}

#[test]
fn test_constant_desc_matches_struct_size() {
    let desc = BufferDesc::constant("transform", &ObjectConstants::default());
    assert_eq!(desc.usage, BufferUsage::Constant);
    assert_eq!(desc.size, 128);
    assert!(desc.validate().is_ok());
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn test_validate_rejects_zero_size() {
    let desc = BufferDesc::constant_sized("empty", 0);
    assert!(matches!(desc.validate(), Err(Error::InvalidResource(_))));
}

#[test]
fn test_validate_rejects_data_size_mismatch() {
    let mut desc = BufferDesc::constant_sized("cb", 64);
    desc.data = Some(vec![0u8; 32]);
    assert!(matches!(desc.validate(), Err(Error::InvalidResource(_))));
}

#[test]
fn test_validate_rejects_bad_index_stride() {
    let mut desc = BufferDesc::index_u16("idx", &[0, 1, 2, 3]);
    desc.stride = 3;
    assert!(desc.validate().is_err());
}

#[test]
fn test_update_range_checks() {
    assert!(check_update_range("cb", 64, 0, 64).is_ok());
    assert!(check_update_range("cb", 64, 32, 32).is_ok());
    assert!(check_update_range("cb", 64, 32, 33).is_err());
    assert!(check_update_range("cb", 64, u64::MAX, 1).is_err());
}
