//! Bit-exact vertex and constant-buffer layouts
//!
//! These structs mirror the input layouts and constant blocks of the compiled
//! shaders. Field order, offsets and 16-byte row alignment are part of the
//! shader contract; the const assertions below fail the build if they drift.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec4, Vec3, Vec4};

// ===== BINDING SLOTS =====

/// Per-object transform (world + normal matrix)
pub const SLOT_TRANSFORM: u32 = 0;
/// Per-frame camera block
pub const SLOT_CAMERA: u32 = 1;
/// Per-material block
pub const SLOT_MATERIAL: u32 = 2;
/// Lighting block
pub const SLOT_LIGHTING: u32 = 3;
/// Skinning palette
pub const SLOT_BONES: u32 = 4;
/// Number of constant-buffer slots
pub const MAX_CONSTANT_SLOTS: u32 = 5;

/// Material texture slots 0..MAX_TEXTURE_SLOTS
pub const MAX_TEXTURE_SLOTS: u32 = 4;
/// Texture slot the shadow map is sampled from
pub const SHADOW_MAP_SLOT: u32 = 4;

/// Vertex stream slots accepted by `bind_vertex_buffer`
pub const MAX_VERTEX_STREAMS: u32 = 2;

/// Largest per-draw payload copied by value into the command stream
pub const PUSH_CONSTANT_SIZE: u32 = 128;

pub const MAX_BONES: usize = 64;
pub const MAX_POINT_LIGHTS: usize = 4;

// ===== VERTICES =====

/// Standard mesh vertex
///
/// | field        | offset |
/// |--------------|--------|
/// | position     | 0      |
/// | normal       | 12     |
/// | tangent      | 24     |
/// | color        | 36     |
/// | uv           | 52     |
/// | bone_ids     | 60     |
/// | bone_weights | 76     |
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub color: [f32; 4],
    pub uv: [f32; 2],
    pub bone_ids: [u32; 4],
    pub bone_weights: [f32; 4],
}

pub const VERTEX_STRIDE: u32 = 92;

impl Vertex {
    /// Unskinned vertex with white color
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tangent: [1.0, 0.0, 0.0],
            color: [1.0; 4],
            uv,
            bone_ids: [0; 4],
            bone_weights: [1.0, 0.0, 0.0, 0.0],
        }
    }

    /// Attach bone influences
    pub fn with_bones(mut self, ids: [u32; 4], weights: [f32; 4]) -> Self {
        self.bone_ids = ids;
        self.bone_weights = weights;
        self
    }
}

/// Debug-line vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

pub const COLOR_VERTEX_STRIDE: u32 = 28;

/// Attribute description shared by backends to build native input layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub offset: u32,
    pub format: AttributeFormat,
    pub semantic: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeFormat {
    Float2,
    Float3,
    Float4,
    Uint4,
}

impl AttributeFormat {
    pub fn components(self) -> u32 {
        match self {
            AttributeFormat::Float2 => 2,
            AttributeFormat::Float3 => 3,
            AttributeFormat::Float4 | AttributeFormat::Uint4 => 4,
        }
    }
}

/// Attributes of `Vertex`; the skinned layout also reads bone data
pub fn vertex_attributes(skinned: bool) -> Vec<VertexAttribute> {
    let mut attributes = vec![
        VertexAttribute { location: 0, offset: 0, format: AttributeFormat::Float3, semantic: "POSITION" },
        VertexAttribute { location: 1, offset: 12, format: AttributeFormat::Float3, semantic: "NORMAL" },
        VertexAttribute { location: 2, offset: 24, format: AttributeFormat::Float3, semantic: "TANGENT" },
        VertexAttribute { location: 3, offset: 36, format: AttributeFormat::Float4, semantic: "COLOR" },
        VertexAttribute { location: 4, offset: 52, format: AttributeFormat::Float2, semantic: "TEXCOORD" },
    ];
    if skinned {
        attributes.push(VertexAttribute { location: 5, offset: 60, format: AttributeFormat::Uint4, semantic: "BLENDINDICES" });
        attributes.push(VertexAttribute { location: 6, offset: 76, format: AttributeFormat::Float4, semantic: "BLENDWEIGHT" });
    }
    attributes
}

/// Attributes of `ColorVertex`
pub fn color_vertex_attributes() -> Vec<VertexAttribute> {
    vec![
        VertexAttribute { location: 0, offset: 0, format: AttributeFormat::Float3, semantic: "POSITION" },
        VertexAttribute { location: 1, offset: 12, format: AttributeFormat::Float4, semantic: "COLOR" },
    ]
}

// ===== CONSTANT BLOCKS =====

/// Slot 0: per-object transform. Exactly one push-constant range.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    pub world: Mat4,
    pub normal_matrix: Mat4,
}

impl ObjectConstants {
    pub fn from_world(world: Mat4) -> Self {
        Self {
            world,
            normal_matrix: world.inverse().transpose(),
        }
    }
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self { world: Mat4::IDENTITY, normal_matrix: Mat4::IDENTITY }
    }
}

/// Slot 1: camera and frame data
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct FrameConstants {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub light_view_projection: Mat4,
    pub camera_position: Vec4,
    /// x = seconds since start, y = delta, zw unused
    pub time: Vec4,
}

impl FrameConstants {
    /// Camera block seen by shadow draws: everything projects through the light
    pub fn for_light(light_view_projection: Mat4) -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: light_view_projection,
            view_projection: light_view_projection,
            light_view_projection,
            ..Self::default()
        }
    }
}

/// Slot 2: material parameters
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    pub base_color: Vec4,
    pub emissive: Vec4,
    /// x = metallic, y = roughness, z = ambient occlusion, w unused
    pub metallic_roughness_ao: Vec4,
    /// x = texture presence mask, y = alpha mode
    pub flags: UVec4,
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            emissive: Vec4::ZERO,
            metallic_roughness_ao: Vec4::new(0.0, 0.5, 1.0, 0.0),
            flags: UVec4::ZERO,
        }
    }
}

#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct DirectionalLight {
    pub direction: Vec4,
    /// rgb color, w intensity
    pub color: Vec4,
}

#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    /// xyz position, w range
    pub position_range: Vec4,
    /// rgb color, w intensity
    pub color_intensity: Vec4,
}

/// Slot 3: lights
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct LightingConstants {
    pub directional: DirectionalLight,
    pub point_lights: [PointLight; MAX_POINT_LIGHTS],
    pub ambient: Vec4,
    /// x = active point lights, y = shadows enabled
    pub counts: UVec4,
}

/// Slot 4: skinning palette
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BoneConstants {
    pub bones: [Mat4; MAX_BONES],
}

impl Default for BoneConstants {
    fn default() -> Self {
        Self { bones: [Mat4::IDENTITY; MAX_BONES] }
    }
}

// ===== LAYOUT ASSERTIONS =====

const _: () = assert!(std::mem::size_of::<Vertex>() == VERTEX_STRIDE as usize);
const _: () = assert!(std::mem::size_of::<ColorVertex>() == COLOR_VERTEX_STRIDE as usize);
const _: () = assert!(std::mem::size_of::<ObjectConstants>() == PUSH_CONSTANT_SIZE as usize);
const _: () = assert!(std::mem::size_of::<FrameConstants>() == 288);
const _: () = assert!(std::mem::size_of::<MaterialConstants>() == 64);
const _: () = assert!(std::mem::size_of::<LightingConstants>() == 192);
const _: () = assert!(std::mem::size_of::<BoneConstants>() == 64 * MAX_BONES);

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
