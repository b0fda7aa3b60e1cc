/// Conversions between tetra types and Vulkan enums
///
/// Pure functions, no device needed. Kept together so the mapping tables can
/// be unit-tested without a GPU.

use ash::vk;
use tetra_render::layout::AttributeFormat;
use tetra_render::{
    CompareOp, CullMode, Error, IndexFormat, PrimitiveTopology, RenderMode, TextureFormat,
};

/// Map a failed `vk::Result` to the render error taxonomy, logging it
pub fn vk_err(source: &str, what: &str, result: vk::Result) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            tetra_render::render_error!(source, "{}: out of memory ({:?})", what, result);
            Error::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => {
            tetra_render::render_error!(source, "{}: device lost", what);
            Error::DeviceLost
        }
        vk::Result::ERROR_OUT_OF_DATE_KHR => {
            tetra_render::render_debug!(source, "{}: swapchain out of date", what);
            Error::SwapchainOutOfDate
        }
        other => tetra_render::render_err!(source, "{}: {:?}", what, other),
    }
}

/// Same as `vk_err`, but fatal: used while the renderer is being created
pub fn vk_init_err(source: &str, what: &str, result: vk::Result) -> Error {
    tetra_render::render_error!(source, "{}: {:?}", what, result);
    Error::InitializationFailed(format!("{}: {:?}", what, result))
}

pub fn texture_format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::R8Unorm => vk::Format::R8_UNORM,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
    }
}

pub fn aspect_for_format(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub fn attribute_format_to_vk(format: AttributeFormat) -> vk::Format {
    match format {
        AttributeFormat::Float2 => vk::Format::R32G32_SFLOAT,
        AttributeFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        AttributeFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
        AttributeFormat::Uint4 => vk::Format::R32G32B32A32_UINT,
    }
}

pub fn index_type_to_vk(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::U16 => vk::IndexType::UINT16,
        IndexFormat::U32 => vk::IndexType::UINT32,
    }
}

pub fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
    }
}

pub fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

/// Wireframe needs the fillModeNonSolid feature; without it we stay solid
pub fn polygon_mode_to_vk(mode: RenderMode, non_solid_supported: bool) -> vk::PolygonMode {
    match mode {
        RenderMode::Wireframe if non_solid_supported => vk::PolygonMode::LINE,
        _ => vk::PolygonMode::FILL,
    }
}

pub fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

/// Sample count flag for a power-of-two count (anything else maps to 1)
pub fn sample_count_to_vk(samples: u32) -> vk::SampleCountFlags {
    match samples {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        32 => vk::SampleCountFlags::TYPE_32,
        64 => vk::SampleCountFlags::TYPE_64,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

/// Highest single sample count contained in `flags`
pub fn max_sample_count(flags: vk::SampleCountFlags) -> u32 {
    [64, 32, 16, 8, 4, 2]
        .into_iter()
        .find(|&count| flags.contains(sample_count_to_vk(count)))
        .unwrap_or(1)
}

#[cfg(test)]
#[path = "vulkan_convert_tests.rs"]
mod tests;
