/// Shadow map - depth-only target rendered from the light before the main
/// pass, then sampled with a compare sampler from texture slot 4

use ash::vk;
use tetra_render::Result;

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::vk_err;
use crate::vulkan_render_pass::DEPTH_FORMAT;
use crate::vulkan_targets::ImageTarget;

const SOURCE: &str = "tetra::vulkan::shadow";

pub struct ShadowMap {
    pub target: ImageTarget,
    pub framebuffer: vk::Framebuffer,
    pub size: u32,
}

impl ShadowMap {
    pub fn create(ctx: &GpuContext, render_pass: vk::RenderPass, size: u32) -> Result<Self> {
        let size = size.max(1);
        let extent = vk::Extent2D { width: size, height: size };
        let mut target = ImageTarget::create(
            ctx,
            "shadow map",
            DEPTH_FORMAT,
            extent,
            1,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_DST,
            vk::ImageAspectFlags::DEPTH,
        )?;

        // Sampled before the first shadow pass runs: clear to far and leave it read-only
        let image = target.image;
        let transitioned = ctx.submit_one_shot("shadow map clear", |device, command_buffer| unsafe {
            let range = vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            };
            let to_transfer = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            let far = vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 };
            device.cmd_clear_depth_stencil_image(
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &far,
                &[range],
            );

            let to_read = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_read],
            );
        });
        if let Err(e) = transitioned {
            target.destroy(ctx);
            return Err(e);
        }

        let attachments = [target.view];
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(size)
            .height(size)
            .layers(1);
        let framebuffer = match unsafe { ctx.device.create_framebuffer(&create_info, None) } {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                target.destroy(ctx);
                return Err(vk_err(SOURCE, "Failed to create shadow framebuffer", e));
            }
        };

        tetra_render::render_debug!(SOURCE, "Shadow map {}x{}", size, size);
        Ok(Self { target, framebuffer, size })
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D { width: self.size, height: self.size }
    }

    pub fn view(&self) -> vk::ImageView {
        self.target.view
    }

    pub fn destroy(&mut self, ctx: &GpuContext) {
        unsafe { ctx.device.destroy_framebuffer(self.framebuffer, None) };
        self.target.destroy(ctx);
    }
}
