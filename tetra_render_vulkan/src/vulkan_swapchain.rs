/// Swapchain - presentable images and their views
///
/// Only owns the `VkSwapchainKHR` and its image views. Acquire/present and
/// every semaphore live in `FrameSync`; the surface belongs to the renderer.

use ash::vk;
use tetra_render::{Error, Result};

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::vk_err;

const SOURCE: &str = "tetra::vulkan::swapchain";

/// Prefer an sRGB 8-bit format, else whatever the surface lists first
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|f| {
            (f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// FIFO with vsync; otherwise MAILBOX, then IMMEDIATE, then FIFO (always present)
pub fn choose_present_mode(vsync: bool, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Surface extent, or the window size clamped to the surface limits when
/// the surface leaves the choice to the swapchain
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One image above the minimum; `max_image_count == 0` means no upper limit
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count != 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

pub struct Swapchain {
    pub loader: ash::khr::swapchain::Device,
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Create a swapchain; `old` is retired by the driver once this one exists
    pub fn create(
        ctx: &GpuContext,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        vsync: bool,
        old: Option<&Swapchain>,
    ) -> Result<Self> {
        unsafe {
            let caps = surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, surface)
                .map_err(|e| vk_err(SOURCE, "Failed to query surface capabilities", e))?;
            let formats = surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, surface)
                .map_err(|e| vk_err(SOURCE, "Failed to query surface formats", e))?;
            let modes = surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device, surface)
                .map_err(|e| vk_err(SOURCE, "Failed to query present modes", e))?;

            let surface_format = choose_surface_format(&formats).ok_or_else(|| {
                tetra_render::render_error!(SOURCE, "Surface reports no formats");
                Error::InitializationFailed("Surface reports no formats".to_string())
            })?;
            let present_mode = choose_present_mode(vsync, &modes);
            let extent = choose_extent(&caps, width, height);
            let image_count = choose_image_count(&caps);

            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(surface)
                .min_image_count(image_count)
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(caps.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode)
                .clipped(true)
                .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |s| s.handle));

            let loader = match old {
                Some(previous) => previous.loader.clone(),
                None => ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device),
            };
            let handle = loader
                .create_swapchain(&create_info, None)
                .map_err(|e| vk_err(SOURCE, "Failed to create swapchain", e))?;

            let images = match loader.get_swapchain_images(handle) {
                Ok(images) => images,
                Err(e) => {
                    loader.destroy_swapchain(handle, None);
                    return Err(vk_err(SOURCE, "Failed to get swapchain images", e));
                }
            };

            let mut views = Vec::with_capacity(images.len());
            for &image in &images {
                match ctx.create_image_view(
                    image,
                    vk::ImageViewType::TYPE_2D,
                    surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                    1,
                ) {
                    Ok(view) => views.push(view),
                    Err(e) => {
                        for view in views {
                            ctx.device.destroy_image_view(view, None);
                        }
                        loader.destroy_swapchain(handle, None);
                        return Err(e);
                    }
                }
            }

            tetra_render::render_info!(
                SOURCE,
                "Swapchain {}x{}, {} images, {:?}, {:?}",
                extent.width, extent.height, images.len(), surface_format.format, present_mode
            );

            Ok(Self {
                loader,
                handle,
                images,
                views,
                format: surface_format.format,
                extent,
                present_mode,
            })
        }
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Destroy views and the swapchain (device must be idle)
    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            for view in self.views.drain(..) {
                device.destroy_image_view(view, None);
            }
            if self.handle != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.handle, None);
                self.handle = vk::SwapchainKHR::null();
            }
        }
        self.images.clear();
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
