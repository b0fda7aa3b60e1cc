/// GpuContext - shared GPU state for every Vulkan object
///
/// Shared (via `Arc`) by buffers, textures, shaders and the render context so
/// each resource can release its native objects on cleanup. The context does
/// not destroy anything itself: `VulkanRenderer::cleanup` tears down the
/// device after every resource has been released.
///
/// The allocator lives in a `Mutex<Option<_>>` so the renderer can take and
/// drop it before destroying the device, even while the application still
/// holds resource handles (and therefore `Arc<GpuContext>` clones).

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tetra_render::{AliveFlag, Error, Result};

use crate::vulkan_convert::vk_err;

const SOURCE: &str = "tetra::vulkan";

/// Device properties the backend consults after creation
#[derive(Debug, Clone)]
pub struct DeviceLimits {
    pub device_name: String,
    /// `minUniformBufferOffsetAlignment`
    pub min_uniform_alignment: u64,
    /// Highest MSAA count supported by both color and depth attachments
    pub max_samples: u32,
    pub max_anisotropy: f32,
    /// fillModeNonSolid (wireframe)
    pub fill_mode_non_solid: bool,
    pub sampler_anisotropy: bool,
}

pub struct GpuContext {
    pub instance: ash::Instance,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,

    /// Graphics queue, also used for present
    pub queue: vk::Queue,
    pub queue_family: u32,

    /// Command pool for blocking one-shot uploads (TRANSIENT + RESET)
    pub upload_pool: Mutex<vk::CommandPool>,

    pub limits: DeviceLimits,

    allocator: Mutex<Option<Allocator>>,
    alive: AliveFlag,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GpuContext {
    pub fn new(
        instance: ash::Instance,
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
        queue: vk::Queue,
        queue_family: u32,
        upload_pool: vk::CommandPool,
        allocator: Allocator,
        limits: DeviceLimits,
    ) -> Self {
        Self {
            instance,
            device,
            physical_device,
            queue,
            queue_family,
            upload_pool: Mutex::new(upload_pool),
            limits,
            allocator: Mutex::new(Some(allocator)),
            alive: AliveFlag::new(),
        }
    }

    /// False once the renderer started destroying the device
    pub fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }

    pub fn require_alive(&self, operation: &str) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("{} after the Vulkan device was destroyed", operation)))
        }
    }

    // ===== MEMORY =====

    pub fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        let mut guard = lock(&self.allocator);
        let allocator = guard
            .as_mut()
            .ok_or_else(|| Error::InvalidState("GPU allocator already released".to_string()))?;
        allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                tetra_render::render_error!(SOURCE, "Out of GPU memory for '{}' ({:.2} MB): {}", name, size_mb, e);
                Error::OutOfMemory
            })
    }

    /// Return an allocation; ignored once the allocator was released
    pub fn free(&self, allocation: Allocation) {
        if let Some(allocator) = lock(&self.allocator).as_mut() {
            if let Err(e) = allocator.free(allocation) {
                tetra_render::render_warn!(SOURCE, "Failed to free GPU allocation: {}", e);
            }
        }
    }

    /// Create a buffer with bound memory
    pub fn create_buffer(
        &self,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<(vk::Buffer, Allocation)> {
        unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let buffer = self
                .device
                .create_buffer(&create_info, None)
                .map_err(|e| vk_err(SOURCE, &format!("Failed to create buffer '{}' ({} bytes)", name, size), e))?;

            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let allocation = match self.allocate(name, requirements, location, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            if let Err(e) = self.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                self.free(allocation);
                self.device.destroy_buffer(buffer, None);
                return Err(vk_err(SOURCE, &format!("Failed to bind memory of buffer '{}'", name), e));
            }
            Ok((buffer, allocation))
        }
    }

    /// Create a device-local image with bound memory
    pub fn create_image(&self, name: &str, create_info: &vk::ImageCreateInfo) -> Result<(vk::Image, Allocation)> {
        unsafe {
            let image = self
                .device
                .create_image(create_info, None)
                .map_err(|e| vk_err(SOURCE, &format!("Failed to create image '{}'", name), e))?;

            let requirements = self.device.get_image_memory_requirements(image);
            let allocation = match self.allocate(name, requirements, MemoryLocation::GpuOnly, false) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            if let Err(e) = self.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                self.free(allocation);
                self.device.destroy_image(image, None);
                return Err(vk_err(SOURCE, &format!("Failed to bind memory of image '{}'", name), e));
            }
            Ok((image, allocation))
        }
    }

    pub fn create_image_view(
        &self,
        image: vk::Image,
        view_type: vk::ImageViewType,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
        layer_count: u32,
    ) -> Result<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count,
            });
        unsafe {
            self.device
                .create_image_view(&create_info, None)
                .map_err(|e| vk_err(SOURCE, "Failed to create image view", e))
        }
    }

    // ===== ONE-SHOT SUBMISSION =====

    /// Record commands into a throwaway command buffer, submit and block
    /// until the GPU has executed them
    pub fn submit_one_shot<F>(&self, what: &str, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let pool = lock(&self.upload_pool);
        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = self
                .device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| vk_err(SOURCE, &format!("{}: failed to allocate command buffer", what), e))?[0];

            let result = self.record_and_wait(what, command_buffer, record);
            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }

    unsafe fn record_and_wait<F>(&self, what: &str, command_buffer: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| vk_err(SOURCE, &format!("{}: failed to begin command buffer", what), e))?;

        record(&self.device, command_buffer);

        self.device
            .end_command_buffer(command_buffer)
            .map_err(|e| vk_err(SOURCE, &format!("{}: failed to end command buffer", what), e))?;

        let fence = self
            .device
            .create_fence(&vk::FenceCreateInfo::default(), None)
            .map_err(|e| vk_err(SOURCE, &format!("{}: failed to create fence", what), e))?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let submitted = self
            .device
            .queue_submit(self.queue, &[submit_info], fence)
            .map_err(|e| vk_err(SOURCE, &format!("{}: failed to submit", what), e))
            .and_then(|()| {
                self.device
                    .wait_for_fences(&[fence], true, u64::MAX)
                    .map_err(|e| vk_err(SOURCE, &format!("{}: failed to wait for upload", what), e))
            });

        self.device.destroy_fence(fence, None);
        submitted
    }

    // ===== TEARDOWN (renderer only) =====

    /// Mark the device as going away; later resource cleanups become no-ops
    pub(crate) fn retire(&self) {
        self.alive.retire();
    }

    /// Hand the allocator over for dropping before the device is destroyed
    pub(crate) fn take_allocator(&self) -> Option<Allocator> {
        lock(&self.allocator).take()
    }
}
