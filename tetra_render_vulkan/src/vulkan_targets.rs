/// Swapchain-sized attachments: MSAA color, depth and one framebuffer per
/// swapchain image. Rebuilt on every swapchain recreation.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tetra_render::Result;

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::{sample_count_to_vk, vk_err};
use crate::vulkan_render_pass::DEPTH_FORMAT;
use crate::vulkan_swapchain::Swapchain;

const SOURCE: &str = "tetra::vulkan::targets";

/// A device-local image with one view
pub struct ImageTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl ImageTarget {
    pub fn create(
        ctx: &GpuContext,
        name: &str,
        format: vk::Format,
        extent: vk::Extent2D,
        samples: u32,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D { width: extent.width, height: extent.height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .samples(sample_count_to_vk(samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let (image, allocation) = ctx.create_image(name, &image_info)?;
        match ctx.create_image_view(image, vk::ImageViewType::TYPE_2D, format, aspect, 1) {
            Ok(view) => Ok(Self { image, view, allocation: Some(allocation) }),
            Err(e) => {
                ctx.free(allocation);
                unsafe { ctx.device.destroy_image(image, None) };
                Err(e)
            }
        }
    }

    pub fn destroy(&mut self, ctx: &GpuContext) {
        unsafe { ctx.device.destroy_image_view(self.view, None) };
        if let Some(allocation) = self.allocation.take() {
            ctx.free(allocation);
        }
        unsafe { ctx.device.destroy_image(self.image, None) };
    }
}

pub struct RenderTargets {
    /// Present only when rendering with more than one sample
    pub msaa_color: Option<ImageTarget>,
    pub depth: ImageTarget,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl RenderTargets {
    pub fn create(ctx: &GpuContext, swapchain: &Swapchain, render_pass: vk::RenderPass, samples: u32) -> Result<Self> {
        let extent = swapchain.extent;

        let mut msaa_color = if samples > 1 {
            Some(ImageTarget::create(
                ctx,
                "msaa color",
                swapchain.format,
                extent,
                samples,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
            )?)
        } else {
            None
        };

        let depth = match ImageTarget::create(
            ctx,
            "depth",
            DEPTH_FORMAT,
            extent,
            samples,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        ) {
            Ok(depth) => depth,
            Err(e) => {
                if let Some(target) = msaa_color.as_mut() {
                    target.destroy(ctx);
                }
                return Err(e);
            }
        };

        let mut targets = Self { msaa_color, depth, framebuffers: Vec::with_capacity(swapchain.views.len()) };

        for &swapchain_view in &swapchain.views {
            let attachments: Vec<vk::ImageView> = match &targets.msaa_color {
                Some(color) => vec![color.view, targets.depth.view, swapchain_view],
                None => vec![swapchain_view, targets.depth.view],
            };
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            match unsafe { ctx.device.create_framebuffer(&create_info, None) } {
                Ok(framebuffer) => targets.framebuffers.push(framebuffer),
                Err(e) => {
                    targets.destroy(ctx);
                    return Err(vk_err(SOURCE, "Failed to create framebuffer", e));
                }
            }
        }

        tetra_render::render_debug!(
            SOURCE,
            "Render targets {}x{}, {} samples, {} framebuffers",
            extent.width, extent.height, samples, targets.framebuffers.len()
        );
        Ok(targets)
    }

    pub fn destroy(&mut self, ctx: &GpuContext) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                ctx.device.destroy_framebuffer(framebuffer, None);
            }
        }
        if let Some(mut color) = self.msaa_color.take() {
            color.destroy(ctx);
        }
        self.depth.destroy(ctx);
    }
}
