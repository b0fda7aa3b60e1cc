//! Unit tests for RenderCommandQueue and the concrete commands
//!
//! All tests drain against the recording MockContext.

use crate::command::*;
use crate::context::{RenderContext, RenderFace, RenderMode};
use crate::layout::SLOT_TRANSFORM;
use crate::mock::*;
use crate::resource::*;
use crate::Error;
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn vertex_buffer(label: &str) -> (BufferRef, u64) {
    let buffer = MockBuffer::new(label, BufferUsage::Vertex, 92 * 24, 92);
    let id = buffer.id.0;
    let handle: BufferRef = buffer;
    (handle, id)
}

fn index_buffer(label: &str) -> (BufferRef, u64) {
    let buffer = MockBuffer::new(label, BufferUsage::Index, 36 * 2, 2);
    let id = buffer.id.0;
    let handle: BufferRef = buffer;
    (handle, id)
}

fn constant_buffer(label: &str) -> (BufferRef, u64) {
    let buffer = MockBuffer::new(label, BufferUsage::Constant, 128, 0);
    let id = buffer.id.0;
    let handle: BufferRef = buffer;
    (handle, id)
}

fn texture(label: &str) -> (TextureRef, u64) {
    let texture = MockTexture::new(label, TextureKind::Texture2D, 4, 4);
    let id = texture.id.0;
    let handle: TextureRef = texture;
    (handle, id)
}

fn shader(label: &str) -> (ShaderRef, u64) {
    let shader = MockShader::new(label, VertexLayout::Standard);
    let id = shader.id.0;
    let handle: ShaderRef = shader;
    (handle, id)
}

/// Context with a shader already bound and its call log cleared
fn primed_context() -> MockContext {
    let mut ctx = MockContext::new();
    let (s, _) = shader("primer");
    ctx.bind_shader(&s).unwrap();
    ctx.take_calls();
    ctx
}

// ============================================================================
// CUBE SCENARIO
// ============================================================================

#[test]
fn test_cube_scenario_records_exact_calls() {
    let queue = RenderCommandQueue::new();
    let mut ctx = MockContext::new();

    let (s, s_id) = shader("cube_shader");
    let (t, t_id) = constant_buffer("cube_transform");
    let (v, v_id) = vertex_buffer("cube_vertices");
    let (i, i_id) = index_buffer("cube_indices");

    queue.submit_bind_shader(None, s);
    queue.submit_bind_constant_buffer(None, t.clone(), 0);
    queue.submit_draw_indexed(None, DrawIndexedCommand::new(v, i, 36).with_constant_buffers(vec![t]));

    let report = queue.execute_commands(&mut ctx);

    assert_eq!(
        ctx.calls,
        vec![
            MockCall::BindShader { shader: s_id },
            MockCall::BindConstantBuffer { buffer: t_id, slot: 0 },
            MockCall::DrawIndexed { vertex_buffer: v_id, index_buffer: i_id, index_count: 36, instances: 1 },
        ]
    );
    assert_eq!(report.executed, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.shadow_draws, 1);
}

// ============================================================================
// ORDERING AND DRAIN
// ============================================================================

#[test]
fn test_execute_is_strict_fifo() {
    let queue = RenderCommandQueue::new();
    let mut ctx = MockContext::new();

    let (s1, s1_id) = shader("a");
    let (s2, s2_id) = shader("b");
    let (tex, tex_id) = texture("albedo");
    let (cb, cb_id) = constant_buffer("material");
    let (v, v_id) = vertex_buffer("mesh");

    queue.submit_bind_shader(None, s1);
    queue.submit_set_render_mode(None, RenderMode::Wireframe);
    queue.submit_bind_texture(None, tex, 1);
    queue.submit_draw(None, DrawCommand::new(v.clone(), 3));
    queue.submit_bind_shader(None, s2);
    queue.submit_set_render_face(None, RenderFace::Both);
    queue.submit_bind_constant_buffer(None, cb, 2);
    queue.submit_draw(None, DrawCommand::new(v, 6).instanced(4));

    queue.sort_commands();
    queue.optimize_batching();
    queue.execute_commands(&mut ctx);

    assert_eq!(
        ctx.calls,
        vec![
            MockCall::BindShader { shader: s1_id },
            MockCall::SetRenderMode(RenderMode::Wireframe),
            MockCall::BindTexture { texture: tex_id, slot: 1 },
            MockCall::Draw { vertex_buffer: v_id, vertex_count: 3, instances: 1 },
            MockCall::BindShader { shader: s2_id },
            MockCall::SetRenderFace(RenderFace::Both),
            MockCall::BindConstantBuffer { buffer: cb_id, slot: 2 },
            MockCall::Draw { vertex_buffer: v_id, vertex_count: 6, instances: 4 },
        ]
    );
}

#[test]
fn test_queue_empty_after_execute() {
    let queue = RenderCommandQueue::new();
    let mut ctx = primed_context();
    let (v, _) = vertex_buffer("mesh");
    for _ in 0..10 {
        queue.submit_draw(None, DrawCommand::new(v.clone(), 3));
    }
    assert_eq!(queue.len(), 10);

    queue.execute_commands(&mut ctx);
    assert!(queue.is_empty());

    // A second drain executes nothing
    ctx.take_calls();
    let report = queue.execute_commands(&mut ctx);
    assert_eq!(report.executed, 0);
    assert!(ctx.calls.is_empty());
}

#[test]
fn test_clear_discards_without_executing() {
    let queue = RenderCommandQueue::new();
    let mut ctx = primed_context();
    let (v, _) = vertex_buffer("mesh");
    let (s, _) = shader("s");
    queue.submit_bind_shader(None, s);
    queue.submit_draw(None, DrawCommand::new(v, 3));

    queue.clear();
    assert!(queue.is_empty());

    queue.execute_commands(&mut ctx);
    assert!(ctx.calls.is_empty());
}

#[test]
fn test_failing_command_does_not_abort_drain() {
    let queue = RenderCommandQueue::new();
    let mut ctx = primed_context();
    let (v, v_id) = vertex_buffer("mesh");

    queue.submit_custom(Some(OwnerId(9)), "explodes", |_ctx| Err(Error::BackendError("boom".to_string())));
    queue.submit_draw(Some(OwnerId(10)), DrawCommand::new(v, 3));

    let report = queue.execute_commands(&mut ctx);
    assert_eq!(report.failed, 1);
    assert_eq!(report.executed, 1);
    assert_eq!(report.failed_by_kind.get(&CommandKind::Custom), Some(&1));
    assert_eq!(ctx.calls, vec![MockCall::Draw { vertex_buffer: v_id, vertex_count: 3, instances: 1 }]);
}

#[test]
fn test_custom_command_runs_in_order() {
    let queue = RenderCommandQueue::new();
    let mut ctx = MockContext::new();
    let (s, s_id) = shader("s");

    queue.submit_set_render_mode(None, RenderMode::Wireframe);
    queue.submit_custom(None, "bind", move |ctx| ctx.bind_shader(&s));
    queue.submit_set_render_mode(None, RenderMode::Solid);

    queue.execute_commands(&mut ctx);
    assert_eq!(
        ctx.calls,
        vec![
            MockCall::SetRenderMode(RenderMode::Wireframe),
            MockCall::BindShader { shader: s_id },
            MockCall::SetRenderMode(RenderMode::Solid),
        ]
    );
}

#[test]
fn test_submission_from_custom_command_lands_next_frame() {
    let queue = Arc::new(RenderCommandQueue::new());
    let mut ctx = MockContext::new();

    let inner = Arc::clone(&queue);
    queue.submit_custom(None, "resubmit", move |_ctx| {
        inner.submit_set_render_face(None, RenderFace::Back);
        Ok(())
    });

    queue.execute_commands(&mut ctx);
    assert!(ctx.calls.is_empty());
    assert_eq!(queue.len(), 1);

    queue.execute_commands(&mut ctx);
    assert_eq!(ctx.calls, vec![MockCall::SetRenderFace(RenderFace::Back)]);
}

#[test]
fn test_update_payload_copied_at_submission() {
    let queue = RenderCommandQueue::new();
    let mut ctx = MockContext::new();
    let cb = MockBuffer::new("cb", BufferUsage::Constant, 4, 0);
    let handle: BufferRef = cb.clone();

    let mut scratch = vec![1u8, 2, 3, 4];
    queue.submit_update_constant_buffer(None, handle, &scratch);
    scratch.copy_from_slice(&[9, 9, 9, 9]);

    queue.execute_commands(&mut ctx);
    assert_eq!(*cb.contents.lock().unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(ctx.calls, vec![MockCall::UpdateConstantBuffer { buffer: cb.id.0, len: 4 }]);
}

#[test]
fn test_threaded_producers_then_single_drain() {
    let queue = Arc::new(RenderCommandQueue::new());
    let (v, _) = vertex_buffer("mesh");

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let queue = Arc::clone(&queue);
            let v = v.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    queue.submit_draw(Some(OwnerId(t * 100 + i)), DrawCommand::new(v.clone(), 3));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut ctx = primed_context();
    let report = queue.execute_commands(&mut ctx);
    assert_eq!(report.executed, 100);
    assert_eq!(ctx.draw_calls().len(), 100);
}

// ============================================================================
// SHADOW CACHE
// ============================================================================

#[test]
fn test_shadow_replay_rebinds_cached_transform_per_draw() {
    let queue = RenderCommandQueue::new();
    let mut ctx = primed_context();

    let (t1, t1_id) = constant_buffer("transform_a");
    let (t2, t2_id) = constant_buffer("transform_b");
    let (va, va_id) = vertex_buffer("mesh_a");
    let (vb, vb_id) = vertex_buffer("mesh_b");
    let (ib, ib_id) = index_buffer("mesh_b_indices");
    let (tex, _) = texture("albedo");
    let (s, _) = shader("lit");

    queue.submit_bind_constant_buffer(None, t1, SLOT_TRANSFORM);
    queue.submit_draw(None, DrawCommand::new(va, 3).with_textures(vec![(0, tex)]));
    queue.submit_bind_shader(None, s);
    queue.submit_bind_constant_buffer(None, t2, SLOT_TRANSFORM);
    queue.submit_draw_indexed(None, DrawIndexedCommand::new(vb, ib, 36));

    let report = queue.execute_commands(&mut ctx);
    assert_eq!(report.shadow_draws, 2);
    assert_eq!(queue.shadow_cache_len(), 2);

    ctx.take_calls();
    let replayed = queue.execute_shadow_pass(&mut ctx);

    assert_eq!(replayed, 2);
    assert_eq!(
        ctx.calls,
        vec![
            MockCall::BindConstantBuffer { buffer: t1_id, slot: 0 },
            MockCall::Draw { vertex_buffer: va_id, vertex_count: 3, instances: 1 },
            MockCall::BindConstantBuffer { buffer: t2_id, slot: 0 },
            MockCall::DrawIndexed { vertex_buffer: vb_id, index_buffer: ib_id, index_count: 36, instances: 1 },
        ]
    );
}

#[test]
fn test_shadow_cache_ignores_non_transform_slots() {
    let queue = RenderCommandQueue::new();
    let mut ctx = primed_context();
    let (t, t_id) = constant_buffer("transform");
    let (material, _) = constant_buffer("material");
    let (v, _) = vertex_buffer("mesh");

    queue.submit_bind_constant_buffer(None, t, 0);
    queue.submit_bind_constant_buffer(None, material, 2);
    queue.submit_draw(None, DrawCommand::new(v, 3));
    queue.execute_commands(&mut ctx);

    ctx.take_calls();
    queue.execute_shadow_pass(&mut ctx);
    assert_eq!(ctx.calls[0], MockCall::BindConstantBuffer { buffer: t_id, slot: 0 });
    assert_eq!(ctx.calls.len(), 2);
}

#[test]
fn test_shadow_draw_without_transform_replays_geometry_only() {
    let queue = RenderCommandQueue::new();
    let mut ctx = primed_context();
    let (v, v_id) = vertex_buffer("mesh");

    queue.submit_draw(None, DrawCommand::new(v, 3));
    queue.execute_commands(&mut ctx);

    ctx.take_calls();
    queue.execute_shadow_pass(&mut ctx);
    assert_eq!(ctx.calls, vec![MockCall::Draw { vertex_buffer: v_id, vertex_count: 3, instances: 1 }]);
}

#[test]
fn test_shadow_cache_keeps_live_transform_over_expired_bind() {
    let queue = RenderCommandQueue::new();
    let mut ctx = primed_context();
    let (live, live_id) = constant_buffer("transform_live");
    let (dead, _) = constant_buffer("transform_dead");
    let (v, v_id) = vertex_buffer("mesh");
    dead.cleanup();

    queue.submit_bind_constant_buffer(None, live, SLOT_TRANSFORM);
    queue.submit_bind_constant_buffer(None, dead, SLOT_TRANSFORM);
    queue.submit_draw(None, DrawCommand::new(v, 3));
    let report = queue.execute_commands(&mut ctx);

    // Main pass: the expired bind fails, the draw uses the live transform
    assert_eq!(report.failed, 1);
    let main_calls = ctx.take_calls();
    assert_eq!(
        main_calls,
        vec![
            MockCall::BindConstantBuffer { buffer: live_id, slot: 0 },
            MockCall::Draw { vertex_buffer: v_id, vertex_count: 3, instances: 1 },
        ]
    );

    // Shadow pass draws with the same transform
    assert_eq!(queue.execute_shadow_pass(&mut ctx), 1);
    assert_eq!(ctx.calls, main_calls);
}

#[test]
fn test_shadow_cache_survives_drain_and_is_rebuilt() {
    let queue = RenderCommandQueue::new();
    let mut ctx = primed_context();
    let (v, _) = vertex_buffer("mesh");

    queue.submit_draw(None, DrawCommand::new(v.clone(), 3));
    queue.submit_draw(None, DrawCommand::new(v, 3));
    queue.execute_commands(&mut ctx);
    assert!(queue.is_empty());
    assert_eq!(queue.shadow_cache_len(), 2);

    // Replay twice: the cache is not consumed
    assert_eq!(queue.execute_shadow_pass(&mut ctx), 2);
    assert_eq!(queue.execute_shadow_pass(&mut ctx), 2);

    // Next drain with no draws rebuilds an empty cache
    queue.execute_commands(&mut ctx);
    assert_eq!(queue.shadow_cache_len(), 0);
}

// ============================================================================
// EXPIRED HANDLES
// ============================================================================

#[test]
fn test_expired_material_texture_skips_bind_but_draws() {
    let queue = RenderCommandQueue::new();
    let mut ctx = primed_context();
    let (v, v_id) = vertex_buffer("mesh");
    let (alive, alive_id) = texture("alive");
    let (dead, _) = texture("dead");
    dead.cleanup();

    queue.submit_draw(None, DrawCommand::new(v, 3).with_textures(vec![(0, dead), (1, alive)]));
    let report = queue.execute_commands(&mut ctx);

    assert_eq!(report.failed, 1);
    assert_eq!(
        ctx.calls,
        vec![
            MockCall::BindTexture { texture: alive_id, slot: 1 },
            MockCall::Draw { vertex_buffer: v_id, vertex_count: 3, instances: 1 },
        ]
    );
}

#[test]
fn test_expired_constant_buffer_gates_draw() {
    let queue = RenderCommandQueue::new();
    let mut ctx = primed_context();
    let (v, _) = vertex_buffer("mesh");
    let (t, _) = constant_buffer("transform");
    t.cleanup();

    queue.submit_draw(None, DrawCommand::new(v, 3).with_constant_buffers(vec![t]));
    let report = queue.execute_commands(&mut ctx);

    assert_eq!(report.failed, 1);
    assert!(ctx.calls.is_empty());
}

/// xorshift64, deterministic
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn chance(&mut self, percent: u64) -> bool {
        self.next() % 100 < percent
    }
}

#[test]
fn test_fuzz_mixed_valid_and_dangling_handles() {
    let mut rng = Rng(0x9E37_79B9_7F4A_7C15);

    for round in 0..50 {
        let queue = RenderCommandQueue::new();
        let mut ctx = primed_context();
        let mut expected = Vec::new();
        let mut expected_failures = 0;

        for _ in 0..40 {
            let dangling = rng.chance(35);
            match rng.next() % 5 {
                0 => {
                    let (cb, id) = constant_buffer("cb");
                    let slot = (rng.next() % 5) as u32;
                    if dangling {
                        cb.cleanup();
                        expected_failures += 1;
                    } else {
                        expected.push(MockCall::BindConstantBuffer { buffer: id, slot });
                    }
                    queue.submit_bind_constant_buffer(None, cb, slot);
                }
                1 => {
                    let (tex, id) = texture("tex");
                    let slot = (rng.next() % 4) as u32;
                    if dangling {
                        tex.cleanup();
                        expected_failures += 1;
                    } else {
                        expected.push(MockCall::BindTexture { texture: id, slot });
                    }
                    queue.submit_bind_texture(None, tex, slot);
                }
                2 => {
                    let (s, id) = shader("s");
                    if dangling {
                        s.cleanup();
                        expected_failures += 1;
                    } else {
                        expected.push(MockCall::BindShader { shader: id });
                    }
                    queue.submit_bind_shader(None, s);
                }
                3 => {
                    let (v, id) = vertex_buffer("v");
                    if dangling {
                        v.cleanup();
                        expected_failures += 1;
                    } else {
                        expected.push(MockCall::Draw { vertex_buffer: id, vertex_count: 3, instances: 1 });
                    }
                    queue.submit_draw(None, DrawCommand::new(v, 3));
                }
                _ => {
                    let (v, v_id) = vertex_buffer("v");
                    let (i, i_id) = index_buffer("i");
                    if dangling {
                        i.cleanup();
                        expected_failures += 1;
                    } else {
                        expected.push(MockCall::DrawIndexed {
                            vertex_buffer: v_id,
                            index_buffer: i_id,
                            index_count: 36,
                            instances: 1,
                        });
                    }
                    queue.submit_draw_indexed(None, DrawIndexedCommand::new(v, i, 36));
                }
            }
        }

        let report = queue.execute_commands(&mut ctx);
        assert_eq!(ctx.calls, expected, "round {}", round);
        assert_eq!(report.failed, expected_failures, "round {}", round);
        assert!(queue.is_empty());
    }
}
