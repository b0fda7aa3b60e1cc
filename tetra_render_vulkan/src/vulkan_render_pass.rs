/// Render passes - main (color + depth, optional MSAA resolve) and shadow
/// (depth only)

use ash::vk;
use tetra_render::Result;

use crate::vulkan_convert::{sample_count_to_vk, vk_err};

const SOURCE: &str = "tetra::vulkan::render_pass";

/// Depth format of the main depth target and of the shadow map
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Attachment list of the main pass and the role of each index
#[derive(Debug, Clone)]
pub struct MainPassAttachments {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub color: u32,
    pub depth: u32,
    /// Single-sample swapchain image the MSAA color resolves into
    pub resolve: Option<u32>,
}

/// Multisampled: [MSAA color, depth, swapchain resolve].
/// Single-sampled: [swapchain color, depth].
pub fn main_pass_attachments(color_format: vk::Format, samples: u32) -> MainPassAttachments {
    let sample_flags = sample_count_to_vk(samples);
    let multisampled = samples > 1;

    let color = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(sample_flags)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(if multisampled { vk::AttachmentStoreOp::DONT_CARE } else { vk::AttachmentStoreOp::STORE })
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(if multisampled {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::PRESENT_SRC_KHR
        });

    let depth = vk::AttachmentDescription::default()
        .format(DEPTH_FORMAT)
        .samples(sample_flags)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let mut attachments = vec![color, depth];
    let resolve = if multisampled {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::DONT_CARE)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        );
        Some(2)
    } else {
        None
    };

    MainPassAttachments { attachments, color: 0, depth: 1, resolve }
}

/// Clear values matching `main_pass_attachments` (resolve is not cleared)
pub fn main_clear_values(clear_color: [f32; 4], samples: u32) -> Vec<vk::ClearValue> {
    let mut values = vec![
        vk::ClearValue { color: vk::ClearColorValue { float32: clear_color } },
        vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 } },
    ];
    if samples > 1 {
        values.push(vk::ClearValue { color: vk::ClearColorValue { float32: [0.0; 4] } });
    }
    values
}

pub fn create_main_pass(device: &ash::Device, color_format: vk::Format, samples: u32) -> Result<vk::RenderPass> {
    let layout = main_pass_attachments(color_format, samples);

    let color_refs = [vk::AttachmentReference::default()
        .attachment(layout.color)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let depth_ref = vk::AttachmentReference::default()
        .attachment(layout.depth)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    let resolve_refs: Vec<vk::AttachmentReference> = layout
        .resolve
        .map(|index| {
            vk::AttachmentReference::default()
                .attachment(index)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        })
        .into_iter()
        .collect();

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref);
    if !resolve_refs.is_empty() {
        subpass = subpass.resolve_attachments(&resolve_refs);
    }

    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE);

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&layout.attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    unsafe {
        device
            .create_render_pass(&create_info, None)
            .map_err(|e| vk_err(SOURCE, "Failed to create main render pass", e))
    }
}

/// Depth-only pass; the map ends up shader-readable for the main pass
pub fn create_shadow_pass(device: &ash::Device) -> Result<vk::RenderPass> {
    let depth = vk::AttachmentDescription::default()
        .format(DEPTH_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);

    let depth_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .depth_stencil_attachment(&depth_ref);

    let dependencies = [
        // Previous frame's sampling finishes before the map is cleared
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .src_access_mask(vk::AccessFlags::SHADER_READ)
            .dst_stage_mask(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
            .dst_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
        // Depth writes are visible to the main pass fragment shader
        vk::SubpassDependency::default()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
    ];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(std::slice::from_ref(&depth))
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(&dependencies);

    unsafe {
        device
            .create_render_pass(&create_info, None)
            .map_err(|e| vk_err(SOURCE, "Failed to create shadow render pass", e))
    }
}

#[cfg(test)]
#[path = "vulkan_render_pass_tests.rs"]
mod tests;
