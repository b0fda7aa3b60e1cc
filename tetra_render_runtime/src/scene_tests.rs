use super::*;
use crate::demo::headless_shader;
use tetra_render::mock::{buffer_id, shader_id, MockCall, MockContext};
use tetra_render::BackendKind;

fn scene(ctx: &mut MockContext) -> CubeScene {
    let scene = CubeScene::create(ctx, &headless_shader(BackendKind::OpenGl).unwrap()).unwrap();
    ctx.take_calls();
    scene
}

// ============================================================================
// MESH
// ============================================================================

#[test]
fn test_cube_mesh_counts() {
    let (vertices, indices) = cube_mesh(0.5);
    assert_eq!(vertices.len(), CUBE_VERTEX_COUNT);
    assert_eq!(indices.len(), CUBE_INDEX_COUNT as usize);
    assert!(indices.iter().all(|&i| (i as usize) < CUBE_VERTEX_COUNT));
}

#[test]
fn test_cube_vertices_lie_on_their_face() {
    let (vertices, _) = cube_mesh(0.5);
    for vertex in &vertices {
        let position = Vec3::from_array(vertex.position);
        let normal = Vec3::from_array(vertex.normal);
        assert!((position.dot(normal) - 0.5).abs() < 1e-6);
        assert!(position.abs().max_element() <= 0.5 + 1e-6);
    }
}

#[test]
fn test_cube_triangles_wind_outward() {
    let (vertices, indices) = cube_mesh(1.0);
    for triangle in indices.chunks(3) {
        let [a, b, c] = [0, 1, 2].map(|k| Vec3::from_array(vertices[triangle[k] as usize].position));
        let normal = Vec3::from_array(vertices[triangle[0] as usize].normal);
        assert!((b - a).cross(c - a).dot(normal) > 0.0);
    }
}

#[test]
fn test_world_at_start_is_the_tilt_only() {
    assert!(CubeScene::world_at(0.0).abs_diff_eq(Mat4::from_rotation_x(0.4), 1e-6));
}

// ============================================================================
// SUBMISSION
// ============================================================================

#[test]
fn test_create_makes_shader_and_three_buffers() {
    let mut ctx = MockContext::new();
    CubeScene::create(&mut ctx, &headless_shader(BackendKind::OpenGl).unwrap()).unwrap();

    let calls = ctx.take_calls();
    assert_eq!(calls.iter().filter(|c| matches!(c, MockCall::CreateShader(_))).count(), 1);
    assert_eq!(calls.iter().filter(|c| matches!(c, MockCall::CreateBuffer(_))).count(), 3);
}

#[test]
fn test_draw_records_exactly_bind_bind_draw() {
    let mut ctx = MockContext::new();
    let scene = scene(&mut ctx);
    let queue = RenderCommandQueue::new();
    scene.submit_draw(&queue);
    queue.execute_commands(&mut ctx);

    assert_eq!(
        ctx.take_calls(),
        vec![
            MockCall::BindShader { shader: shader_id(&scene.shader) },
            MockCall::BindConstantBuffer { buffer: buffer_id(&scene.transform), slot: SLOT_TRANSFORM },
            MockCall::DrawIndexed {
                vertex_buffer: buffer_id(&scene.vertex_buffer),
                index_buffer: buffer_id(&scene.index_buffer),
                index_count: CUBE_INDEX_COUNT,
                instances: 1,
            },
        ]
    );
}

#[test]
fn test_submit_updates_transform_first() {
    let mut ctx = MockContext::new();
    let scene = scene(&mut ctx);
    let queue = RenderCommandQueue::new();
    scene.submit(&queue, 1.0);
    let report = queue.execute_commands(&mut ctx);

    assert_eq!(report.executed, 4);
    assert_eq!(
        ctx.take_calls()[0],
        MockCall::UpdateConstantBuffer {
            buffer: buffer_id(&scene.transform),
            len: std::mem::size_of::<ObjectConstants>(),
        }
    );
}
