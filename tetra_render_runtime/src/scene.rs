/// CubeScene - one spinning unit cube
///
/// Each frame submits the transform update, then shader bind, transform bind
/// on slot 0 and one 36-index draw.

use glam::{Mat4, Vec3};
use tetra_render::layout::{ObjectConstants, Vertex, SLOT_TRANSFORM};
use tetra_render::{BufferDesc, BufferRef, DrawIndexedCommand, RenderCommandQueue, RenderContext, Result, ShaderDesc, ShaderRef};

pub const CUBE_VERTEX_COUNT: usize = 24;
pub const CUBE_INDEX_COUNT: u32 = 36;

/// Radians per second around the Y axis
const SPIN_SPEED: f32 = 0.8;

/// Face normals in +X, -X, +Y, -Y, +Z, -Z order, with each face's
/// two in-plane axes
const FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
];

/// 24 vertices (4 per face, so normals stay flat) and 36 indices
pub fn cube_mesh(half_extent: f32) -> (Vec<Vertex>, Vec<u16>) {
    let mut vertices = Vec::with_capacity(CUBE_VERTEX_COUNT);
    let mut indices = Vec::with_capacity(CUBE_INDEX_COUNT as usize);
    for (normal, right, up) in FACES {
        let base = vertices.len() as u16;
        let center = normal * half_extent;
        let right = right * half_extent;
        let up = up * half_extent;
        vertices.push(Vertex::new(center - right - up, normal, [0.0, 1.0]));
        vertices.push(Vertex::new(center + right - up, normal, [1.0, 1.0]));
        vertices.push(Vertex::new(center + right + up, normal, [1.0, 0.0]));
        vertices.push(Vertex::new(center - right + up, normal, [0.0, 0.0]));
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

pub struct CubeScene {
    shader: ShaderRef,
    vertex_buffer: BufferRef,
    index_buffer: BufferRef,
    transform: BufferRef,
}

impl CubeScene {
    pub fn create(ctx: &mut dyn RenderContext, shader: &ShaderDesc) -> Result<Self> {
        let (vertices, indices) = cube_mesh(0.5);
        Ok(Self {
            shader: ctx.create_shader(shader)?,
            vertex_buffer: ctx.create_buffer(&BufferDesc::vertex("cube vertices", &vertices))?,
            index_buffer: ctx.create_buffer(&BufferDesc::index_u16("cube indices", &indices))?,
            transform: ctx.create_buffer(&BufferDesc::constant("cube transform", &ObjectConstants::default()))?,
        })
    }

    /// World transform after `seconds` of spinning
    pub fn world_at(seconds: f32) -> Mat4 {
        Mat4::from_rotation_y(seconds * SPIN_SPEED) * Mat4::from_rotation_x(0.4)
    }

    /// Queue this frame's transform and draw
    pub fn submit(&self, queue: &RenderCommandQueue, seconds: f32) {
        let constants = ObjectConstants::from_world(Self::world_at(seconds));
        queue.submit_update_constant_buffer(None, self.transform.clone(), bytemuck::bytes_of(&constants));
        self.submit_draw(queue);
    }

    /// Queue the draw alone, with whatever transform was last written
    pub fn submit_draw(&self, queue: &RenderCommandQueue) {
        queue.submit_bind_shader(None, self.shader.clone());
        queue.submit_bind_constant_buffer(None, self.transform.clone(), SLOT_TRANSFORM);
        queue.submit_draw_indexed(
            None,
            DrawIndexedCommand::new(self.vertex_buffer.clone(), self.index_buffer.clone(), CUBE_INDEX_COUNT),
        );
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
