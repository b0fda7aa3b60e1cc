/// Conversions between tetra types and OpenGL enums, plus GL error mapping

use tetra_render::layout::AttributeFormat;
use tetra_render::{CompareOp, CullMode, Error, IndexFormat, PrimitiveTopology, RenderMode, Result, TextureFormat};

use crate::api::{GlApi, GlEnum};

// ===== ERRORS =====

pub const GL_NO_ERROR: GlEnum = 0;
pub const GL_INVALID_ENUM: GlEnum = 0x0500;
pub const GL_INVALID_VALUE: GlEnum = 0x0501;
pub const GL_INVALID_OPERATION: GlEnum = 0x0502;
pub const GL_OUT_OF_MEMORY: GlEnum = 0x0505;
pub const GL_INVALID_FRAMEBUFFER_OPERATION: GlEnum = 0x0506;
pub const GL_CONTEXT_LOST: GlEnum = 0x0507;

pub fn error_name(code: GlEnum) -> &'static str {
    match code {
        GL_NO_ERROR => "GL_NO_ERROR",
        GL_INVALID_ENUM => "GL_INVALID_ENUM",
        GL_INVALID_VALUE => "GL_INVALID_VALUE",
        GL_INVALID_OPERATION => "GL_INVALID_OPERATION",
        GL_OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        GL_INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
        GL_CONTEXT_LOST => "GL_CONTEXT_LOST",
        _ => "unknown GL error",
    }
}

/// Map a GL error flag to the render error taxonomy, logging it
pub fn gl_err(source: &str, what: &str, code: GlEnum) -> Error {
    match code {
        GL_OUT_OF_MEMORY => {
            tetra_render::render_error!(source, "{}: out of memory", what);
            Error::OutOfMemory
        }
        GL_CONTEXT_LOST => {
            tetra_render::render_error!(source, "{}: context lost", what);
            Error::DeviceLost
        }
        other => tetra_render::render_err!(source, "{}: {} (0x{:04X})", what, error_name(other), other),
    }
}

/// Poll the error flag after a call sequence
pub fn check_error(api: &dyn GlApi, source: &str, what: &str) -> Result<()> {
    match api.get_error() {
        GL_NO_ERROR => Ok(()),
        code => Err(gl_err(source, what, code)),
    }
}

// ===== OBJECTS AND TARGETS =====

pub const GL_TEXTURE_2D: GlEnum = 0x0DE1;
pub const GL_TEXTURE_CUBE_MAP: GlEnum = 0x8513;
pub const GL_TEXTURE0: GlEnum = 0x84C0;

pub const GL_STATIC_DRAW: GlEnum = 0x88E4;
pub const GL_DYNAMIC_DRAW: GlEnum = 0x88E8;
pub const GL_UNIFORM_BUFFER: GlEnum = 0x8A11;

pub const GL_FRAGMENT_SHADER: GlEnum = 0x8B30;
pub const GL_VERTEX_SHADER: GlEnum = 0x8B31;

pub const GL_FRAMEBUFFER: GlEnum = 0x8D40;
pub const GL_COLOR_ATTACHMENT0: GlEnum = 0x8CE0;
pub const GL_DEPTH_ATTACHMENT: GlEnum = 0x8D00;
pub const GL_FRAMEBUFFER_COMPLETE: GlEnum = 0x8CD5;
pub const GL_FRAMEBUFFER_INCOMPLETE_MULTISAMPLE: GlEnum = 0x8D56;

pub const GL_COLOR_BUFFER_BIT: u32 = 0x4000;
pub const GL_DEPTH_BUFFER_BIT: u32 = 0x0100;

// ===== SAMPLERS =====

pub const GL_NEAREST: GlEnum = 0x2600;
pub const GL_LINEAR: GlEnum = 0x2601;
pub const GL_REPEAT: GlEnum = 0x2901;
pub const GL_CLAMP_TO_EDGE: GlEnum = 0x812F;
pub const GL_TEXTURE_MAG_FILTER: GlEnum = 0x2800;
pub const GL_TEXTURE_MIN_FILTER: GlEnum = 0x2801;
pub const GL_TEXTURE_WRAP_S: GlEnum = 0x2802;
pub const GL_TEXTURE_WRAP_T: GlEnum = 0x2803;
pub const GL_TEXTURE_COMPARE_MODE: GlEnum = 0x884C;
pub const GL_TEXTURE_COMPARE_FUNC: GlEnum = 0x884D;
pub const GL_COMPARE_REF_TO_TEXTURE: GlEnum = 0x884E;

// ===== FIXED FUNCTION =====

pub const GL_LINES: GlEnum = 0x0001;
pub const GL_TRIANGLES: GlEnum = 0x0004;

pub const GL_FRONT: GlEnum = 0x0404;
pub const GL_BACK: GlEnum = 0x0405;
pub const GL_FRONT_AND_BACK: GlEnum = 0x0408;
pub const GL_LINE: GlEnum = 0x1B01;
pub const GL_FILL: GlEnum = 0x1B02;

pub const GL_CULL_FACE: GlEnum = 0x0B44;
pub const GL_DEPTH_TEST: GlEnum = 0x0B71;
pub const GL_MULTISAMPLE: GlEnum = 0x809D;

pub const GL_LESS: GlEnum = 0x0201;
pub const GL_LEQUAL: GlEnum = 0x0203;
pub const GL_ALWAYS: GlEnum = 0x0207;

// ===== DATA FORMATS =====

pub const GL_UNSIGNED_BYTE: GlEnum = 0x1401;
pub const GL_UNSIGNED_SHORT: GlEnum = 0x1403;
pub const GL_UNSIGNED_INT: GlEnum = 0x1405;
pub const GL_FLOAT: GlEnum = 0x1406;

pub const GL_RED: GlEnum = 0x1903;
pub const GL_RGBA: GlEnum = 0x1908;
pub const GL_BGRA: GlEnum = 0x80E1;
pub const GL_DEPTH_COMPONENT: GlEnum = 0x1902;
pub const GL_R8: GlEnum = 0x8229;
pub const GL_RGBA8: GlEnum = 0x8058;
pub const GL_SRGB8_ALPHA8: GlEnum = 0x8C43;
pub const GL_DEPTH_COMPONENT32F: GlEnum = 0x8CAC;

/// Color format of the multisampled main target
pub const MSAA_COLOR_FORMAT: GlEnum = GL_RGBA8;

/// Pixel upload triple for a texture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub internal_format: GlEnum,
    pub format: GlEnum,
    pub ty: GlEnum,
}

pub fn pixel_format(format: TextureFormat) -> PixelFormat {
    let (internal_format, format, ty) = match format {
        TextureFormat::Rgba8Unorm => (GL_RGBA8, GL_RGBA, GL_UNSIGNED_BYTE),
        TextureFormat::Rgba8Srgb => (GL_SRGB8_ALPHA8, GL_RGBA, GL_UNSIGNED_BYTE),
        TextureFormat::Bgra8Unorm => (GL_RGBA8, GL_BGRA, GL_UNSIGNED_BYTE),
        TextureFormat::R8Unorm => (GL_R8, GL_RED, GL_UNSIGNED_BYTE),
        TextureFormat::Depth32Float => (GL_DEPTH_COMPONENT32F, GL_DEPTH_COMPONENT, GL_FLOAT),
    };
    PixelFormat { internal_format, format, ty }
}

/// (component count, component type, integer attribute)
pub fn attribute_format_to_gl(format: AttributeFormat) -> (u32, GlEnum, bool) {
    match format {
        AttributeFormat::Float2 => (2, GL_FLOAT, false),
        AttributeFormat::Float3 => (3, GL_FLOAT, false),
        AttributeFormat::Float4 => (4, GL_FLOAT, false),
        AttributeFormat::Uint4 => (4, GL_UNSIGNED_INT, true),
    }
}

pub fn index_format_to_gl(format: IndexFormat) -> GlEnum {
    match format {
        IndexFormat::U16 => GL_UNSIGNED_SHORT,
        IndexFormat::U32 => GL_UNSIGNED_INT,
    }
}

pub fn polygon_mode_to_gl(mode: RenderMode) -> GlEnum {
    match mode {
        RenderMode::Solid => GL_FILL,
        RenderMode::Wireframe => GL_LINE,
    }
}

/// Face passed to `glCullFace`, None when culling is disabled
pub fn cull_face_to_gl(mode: CullMode) -> Option<GlEnum> {
    match mode {
        CullMode::None => None,
        CullMode::Front => Some(GL_FRONT),
        CullMode::Back => Some(GL_BACK),
    }
}

pub fn compare_op_to_gl(op: CompareOp) -> GlEnum {
    match op {
        CompareOp::Less => GL_LESS,
        CompareOp::LessOrEqual => GL_LEQUAL,
        CompareOp::Always => GL_ALWAYS,
    }
}

pub fn topology_to_gl(topology: PrimitiveTopology) -> GlEnum {
    match topology {
        PrimitiveTopology::TriangleList => GL_TRIANGLES,
        PrimitiveTopology::LineList => GL_LINES,
    }
}

#[cfg(test)]
#[path = "gl_convert_tests.rs"]
mod tests;
