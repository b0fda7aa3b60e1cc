/// Conversions between tetra types and Direct3D 11 / DXGI values

use tetra_render::layout::AttributeFormat;
use tetra_render::{CompareOp, CullMode, Error, IndexFormat, PrimitiveTopology, RenderMode, TextureFormat};

use crate::device::HResult;

// ===== HRESULT =====

pub const E_INVALIDARG: HResult = 0x8007_0057_u32 as i32;
pub const E_OUTOFMEMORY: HResult = 0x8007_000E_u32 as i32;
pub const DXGI_ERROR_INVALID_CALL: HResult = 0x887A_0001_u32 as i32;
pub const DXGI_ERROR_DEVICE_REMOVED: HResult = 0x887A_0005_u32 as i32;
pub const DXGI_ERROR_DEVICE_HUNG: HResult = 0x887A_0006_u32 as i32;
pub const DXGI_ERROR_DEVICE_RESET: HResult = 0x887A_0007_u32 as i32;

/// Map a failed call to the render error taxonomy, logging it
pub fn hr_err(source: &str, what: &str, hr: HResult) -> Error {
    match hr {
        E_OUTOFMEMORY => {
            tetra_render::render_error!(source, "{}: out of memory", what);
            Error::OutOfMemory
        }
        DXGI_ERROR_DEVICE_REMOVED | DXGI_ERROR_DEVICE_HUNG | DXGI_ERROR_DEVICE_RESET => {
            tetra_render::render_error!(source, "{}: device removed (0x{:08X})", what, hr as u32);
            Error::DeviceLost
        }
        other => tetra_render::render_err!(source, "{}: HRESULT 0x{:08X}", what, other as u32),
    }
}

/// Fatal variant of `hr_err` for renderer creation
pub fn hr_init_err(source: &str, what: &str, hr: HResult) -> Error {
    tetra_render::render_error!(source, "{}: HRESULT 0x{:08X}", what, hr as u32);
    Error::InitializationFailed(format!("{}: HRESULT 0x{:08X}", what, hr as u32))
}

// ===== DXGI FORMATS =====

pub const DXGI_FORMAT_R32G32B32A32_FLOAT: u32 = 2;
pub const DXGI_FORMAT_R32G32B32A32_UINT: u32 = 3;
pub const DXGI_FORMAT_R32G32B32_FLOAT: u32 = 6;
pub const DXGI_FORMAT_R32G32_FLOAT: u32 = 16;
pub const DXGI_FORMAT_R8G8B8A8_UNORM: u32 = 28;
pub const DXGI_FORMAT_R8G8B8A8_UNORM_SRGB: u32 = 29;
pub const DXGI_FORMAT_R32_TYPELESS: u32 = 39;
pub const DXGI_FORMAT_D32_FLOAT: u32 = 40;
pub const DXGI_FORMAT_R32_FLOAT: u32 = 41;
pub const DXGI_FORMAT_R32_UINT: u32 = 42;
pub const DXGI_FORMAT_R16_UINT: u32 = 57;
pub const DXGI_FORMAT_R8_UNORM: u32 = 61;
pub const DXGI_FORMAT_B8G8R8A8_UNORM: u32 = 87;

pub const BACK_BUFFER_FORMAT: u32 = DXGI_FORMAT_R8G8B8A8_UNORM;

// ===== D3D11 ENUMS =====

pub const D3D11_FILL_WIREFRAME: u32 = 2;
pub const D3D11_FILL_SOLID: u32 = 3;

pub const D3D11_CULL_NONE: u32 = 1;
pub const D3D11_CULL_FRONT: u32 = 2;
pub const D3D11_CULL_BACK: u32 = 3;

pub const D3D11_COMPARISON_LESS: u32 = 2;
pub const D3D11_COMPARISON_LESS_EQUAL: u32 = 4;
pub const D3D11_COMPARISON_ALWAYS: u32 = 8;

pub const D3D11_PRIMITIVE_TOPOLOGY_LINELIST: u32 = 2;
pub const D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST: u32 = 4;

/// Constant buffer byte widths must be multiples of this
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 16;

/// Resource and SRV formats; depth textures are typeless so they can be sampled
pub fn texture_formats(format: TextureFormat) -> (u32, u32) {
    match format {
        TextureFormat::Rgba8Unorm => (DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_FORMAT_R8G8B8A8_UNORM),
        TextureFormat::Rgba8Srgb => (DXGI_FORMAT_R8G8B8A8_UNORM_SRGB, DXGI_FORMAT_R8G8B8A8_UNORM_SRGB),
        TextureFormat::Bgra8Unorm => (DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_B8G8R8A8_UNORM),
        TextureFormat::R8Unorm => (DXGI_FORMAT_R8_UNORM, DXGI_FORMAT_R8_UNORM),
        TextureFormat::Depth32Float => (DXGI_FORMAT_R32_TYPELESS, DXGI_FORMAT_R32_FLOAT),
    }
}

pub fn attribute_format_to_dxgi(format: AttributeFormat) -> u32 {
    match format {
        AttributeFormat::Float2 => DXGI_FORMAT_R32G32_FLOAT,
        AttributeFormat::Float3 => DXGI_FORMAT_R32G32B32_FLOAT,
        AttributeFormat::Float4 => DXGI_FORMAT_R32G32B32A32_FLOAT,
        AttributeFormat::Uint4 => DXGI_FORMAT_R32G32B32A32_UINT,
    }
}

pub fn index_format_to_dxgi(format: IndexFormat) -> u32 {
    match format {
        IndexFormat::U16 => DXGI_FORMAT_R16_UINT,
        IndexFormat::U32 => DXGI_FORMAT_R32_UINT,
    }
}

pub fn fill_mode_to_d3d11(mode: RenderMode) -> u32 {
    match mode {
        RenderMode::Solid => D3D11_FILL_SOLID,
        RenderMode::Wireframe => D3D11_FILL_WIREFRAME,
    }
}

pub fn cull_mode_to_d3d11(mode: CullMode) -> u32 {
    match mode {
        CullMode::None => D3D11_CULL_NONE,
        CullMode::Front => D3D11_CULL_FRONT,
        CullMode::Back => D3D11_CULL_BACK,
    }
}

pub fn compare_op_to_d3d11(op: CompareOp) -> u32 {
    match op {
        CompareOp::Less => D3D11_COMPARISON_LESS,
        CompareOp::LessOrEqual => D3D11_COMPARISON_LESS_EQUAL,
        CompareOp::Always => D3D11_COMPARISON_ALWAYS,
    }
}

pub fn topology_to_d3d11(topology: PrimitiveTopology) -> u32 {
    match topology {
        PrimitiveTopology::TriangleList => D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
        PrimitiveTopology::LineList => D3D11_PRIMITIVE_TOPOLOGY_LINELIST,
    }
}

#[cfg(test)]
#[path = "d3d11_convert_tests.rs"]
mod tests;
