use super::*;
use crate::null_gl::{NullGl, ObjectKind};

// ============================================================================
// LAYOUTS
// ============================================================================

#[test]
fn test_skinned_layout_adds_bone_attributes() {
    assert_eq!(layout_attributes(VertexLayout::Standard).len(), 5);
    let skinned = layout_attributes(VertexLayout::Skinned);
    assert_eq!(skinned.len(), 7);
    assert_eq!(skinned[5].location, 5);
    assert_eq!(skinned[5].offset, 60);
}

#[test]
fn test_color_layout_has_position_and_color() {
    let attributes = layout_attributes(VertexLayout::PositionColor);
    let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
    assert_eq!(offsets, vec![0, 12]);
}

// ============================================================================
// CACHE
// ============================================================================

#[test]
fn test_one_vertex_array_per_layout() {
    let gl = NullGl::new();
    let mut cache = VertexArrayCache::new();

    let standard = cache.get_or_create(&gl, VertexLayout::Standard).unwrap();
    assert_eq!(cache.get_or_create(&gl, VertexLayout::Standard).unwrap(), standard);
    let lines = cache.get_or_create(&gl, VertexLayout::PositionColor).unwrap();

    assert_ne!(standard, lines);
    assert_eq!(cache.len(), 2);
    assert_eq!(gl.counters().vertex_arrays_created, 2);
}

#[test]
fn test_clear_deletes_every_vertex_array() {
    let gl = NullGl::new();
    let mut cache = VertexArrayCache::new();
    cache.get_or_create(&gl, VertexLayout::Standard).unwrap();
    cache.get_or_create(&gl, VertexLayout::Skinned).unwrap();

    cache.clear(&gl);

    assert_eq!(cache.len(), 0);
    assert_eq!(gl.live_objects_of(ObjectKind::VertexArray), 0);
}
