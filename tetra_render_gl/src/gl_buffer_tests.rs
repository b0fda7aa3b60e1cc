use super::*;
use crate::null_gl::{NullGl, ObjectKind};

fn context() -> (Arc<NullGl>, Arc<GpuContext>) {
    let gl = Arc::new(NullGl::new());
    let ctx = GpuContext::new(gl.clone());
    (gl, ctx)
}

// ============================================================================
// CREATION
// ============================================================================

#[test]
fn test_uniform_buffer_is_padded_to_16() {
    let (gl, ctx) = context();
    let buffer = GlBuffer::create(&ctx, &BufferDesc::constant_sized("odd", 20)).unwrap();
    assert_eq!(buffer.size(), 20);
    assert_eq!(gl.buffer_contents(buffer.name).unwrap().len(), 32);
}

#[test]
fn test_initial_data_is_uploaded() {
    let (gl, ctx) = context();
    let buffer = GlBuffer::create(&ctx, &BufferDesc::index_u16("ib", &[0, 1, 2])).unwrap();
    let contents = gl.buffer_contents(buffer.name).unwrap();
    let indices: &[u16] = bytemuck::cast_slice(&contents);
    assert_eq!(indices, &[0, 1, 2]);
    assert_eq!(buffer.index_format(), Some(IndexFormat::U16));
}

#[test]
fn test_out_of_memory_deletes_the_name() {
    let (gl, ctx) = context();
    gl.fail_next_allocation();
    let result = GlBuffer::create(&ctx, &BufferDesc::vertex("vb", &[0.0f32; 9]));

    assert_eq!(result.err(), Some(Error::OutOfMemory));
    assert_eq!(gl.live_objects_of(ObjectKind::Buffer), 0);
}

// ============================================================================
// UPDATES
// ============================================================================

#[test]
fn test_partial_update_keeps_the_rest() {
    let (gl, ctx) = context();
    let buffer = GlBuffer::create(&ctx, &BufferDesc::constant("cb", &[1u32, 2, 3, 4])).unwrap();
    buffer.update(4, &9u32.to_ne_bytes()).unwrap();

    let contents = gl.buffer_contents(buffer.name).unwrap();
    let values: Vec<u32> = contents
        .chunks_exact(4)
        .map(|chunk| u32::from_ne_bytes(chunk.try_into().unwrap()))
        .collect();
    assert_eq!(values, vec![1, 9, 3, 4]);
}

#[test]
fn test_update_past_logical_size_is_rejected() {
    let (gl, ctx) = context();
    let buffer = GlBuffer::create(&ctx, &BufferDesc::constant_sized("cb", 20)).unwrap();

    // Inside the padded allocation but past the declared size
    assert!(matches!(buffer.update(16, &[0; 8]), Err(Error::InvalidResource(_))));
    assert_eq!(gl.counters().buffer_uploads, 1);
}

// ============================================================================
// LIFETIME
// ============================================================================

#[test]
fn test_cleanup_deletes_once() {
    let (gl, ctx) = context();
    let buffer = GlBuffer::create(&ctx, &BufferDesc::vertex("vb", &[0.0f32; 3])).unwrap();
    buffer.cleanup();
    buffer.cleanup();
    drop(buffer);

    assert_eq!(gl.live_objects(), 0);
    assert!(gl.violations().is_empty());
}

#[test]
fn test_update_after_cleanup_fails() {
    let (_gl, ctx) = context();
    let buffer = GlBuffer::create(&ctx, &BufferDesc::vertex("vb", &[0.0f32; 3])).unwrap();
    buffer.cleanup();
    assert!(matches!(buffer.update(0, &[0; 4]), Err(Error::InvalidResource(_))));
}

#[test]
fn test_retired_context_skips_delete() {
    let (gl, ctx) = context();
    let buffer = GlBuffer::create(&ctx, &BufferDesc::vertex("vb", &[0.0f32; 3])).unwrap();
    ctx.retire();
    drop(buffer);

    assert_eq!(gl.live_objects(), 1);
    assert!(matches!(GlBuffer::create(&ctx, &BufferDesc::vertex("late", &[0.0f32; 3])), Err(Error::InvalidState(_))));
}
