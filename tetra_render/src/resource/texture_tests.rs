//! Unit tests for texture.rs

use crate::resource::{TextureDesc, TextureData, TextureFormat, TextureKind};

fn faces(size: u32) -> [Vec<u8>; 6] {
    let bytes = (size * size * 4) as usize;
    std::array::from_fn(|i| vec![i as u8; bytes])
}

#[test]
fn test_format_sizes() {
    assert_eq!(TextureFormat::Rgba8Unorm.bytes_per_pixel(), 4);
    assert_eq!(TextureFormat::R8Unorm.bytes_per_pixel(), 1);
    assert!(TextureFormat::Depth32Float.is_depth());
    assert!(!TextureFormat::Bgra8Unorm.is_depth());
}

#[test]
fn test_kind_layer_count() {
    assert_eq!(TextureKind::Texture2D.layer_count(), 1);
    assert_eq!(TextureKind::Cubemap.layer_count(), 6);
}

#[test]
fn test_validate_2d_ok() {
    let desc = TextureDesc::rgba8("albedo", 4, 2, vec![0; 32]);
    assert!(desc.validate(TextureKind::Texture2D).is_ok());
    assert_eq!(desc.layers().len(), 1);
}

#[test]
fn test_validate_2d_wrong_size() {
    let desc = TextureDesc::rgba8("albedo", 4, 2, vec![0; 31]);
    assert!(desc.validate(TextureKind::Texture2D).is_err());
}

#[test]
fn test_validate_zero_extent() {
    let desc = TextureDesc::rgba8("empty", 0, 2, Vec::new());
    assert!(desc.validate(TextureKind::Texture2D).is_err());
}

#[test]
fn test_validate_cubemap_ok() {
    let desc = TextureDesc::rgba8_cubemap("sky", 8, faces(8));
    assert!(desc.validate(TextureKind::Cubemap).is_ok());
    assert_eq!(desc.layers().len(), 6);
    assert_eq!(desc.layers()[5][0], 5);
}

#[test]
fn test_validate_cubemap_shape_mismatch() {
    let cube = TextureDesc::rgba8_cubemap("sky", 8, faces(8));
    assert!(cube.validate(TextureKind::Texture2D).is_err());

    let flat = TextureDesc::rgba8("flat", 8, 8, vec![0; 256]);
    assert!(flat.validate(TextureKind::Cubemap).is_err());
}

#[test]
fn test_validate_cubemap_not_square() {
    let mut desc = TextureDesc::rgba8_cubemap("sky", 8, faces(8));
    desc.height = 4;
    desc.data = TextureData::Empty;
    assert!(desc.validate(TextureKind::Cubemap).is_err());
}
