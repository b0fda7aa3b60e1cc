/// VulkanRenderer - Vulkan implementation of the Renderer trait
///
/// `new` creates instance, surface, device and allocator. `initialize` builds
/// everything that depends on the surface: swapchain, render passes, render
/// targets, shadow map, frame slots and per-frame uniform rings.
///
/// Frame:
/// 1. `begin_render` runs the frame-sync acquire protocol, records the shadow
///    pass from the queue's shadow cache, then opens the main pass
/// 2. the application drains the queue into `context()`
/// 3. `end_render` closes the pass, submits and presents

use ash::vk;
use glam::Mat4;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CString;
use std::sync::{Arc, PoisonError};
use tetra_render::{
    BackendKind, Error, FrameStatus, FrameTiming, Lifecycle, LifecycleState, RenderCommandQueue, RenderContext,
    Renderer, RendererConfig, RendererStats, Result, ShaderRef, SkipReason,
};

#[cfg(feature = "vulkan-validation")]
use crate::debug::{DebugMessenger, VALIDATION_LAYER};
use crate::frame_sync::{AcquireOutcome, BeginOutcome, FrameSync, FrameTicket, PresentOutcome, SyncDevice};
use crate::shadow::ShadowMap;
use crate::vulkan_context::{DeviceLimits, GpuContext};
use crate::vulkan_convert::{max_sample_count, vk_err, vk_init_err};
use crate::vulkan_pipeline::PipelineFeatures;
use crate::vulkan_render_context::VulkanRenderContext;
use crate::vulkan_render_pass::{create_main_pass, create_shadow_pass, main_clear_values};
use crate::vulkan_swapchain::Swapchain;
use crate::vulkan_targets::RenderTargets;

const SOURCE: &str = "tetra::vulkan";

// ===== SYNC DEVICE =====

/// `SyncDevice` over the real device, queue and swapchain
struct VkSync {
    device: ash::Device,
    queue: vk::Queue,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    acquire_timeout_ns: u64,
}

impl SyncDevice for VkSync {
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type Commands = vk::CommandBuffer;

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
                .map_err(|e| vk_err(SOURCE, "Failed to create fence", e))
        }
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| vk_err(SOURCE, "Failed to create semaphore", e))
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn wait_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| vk_err(SOURCE, "Failed to wait for fence", e))
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.device
                .reset_fences(&[fence])
                .map_err(|e| vk_err(SOURCE, "Failed to reset fence", e))
        }
    }

    fn acquire_image(&self, signal: vk::Semaphore) -> Result<AcquireOutcome> {
        let acquired = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, self.acquire_timeout_ns, signal, vk::Fence::null())
        };
        match acquired {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(AcquireOutcome::Timeout),
            Err(e) => Err(vk_err(SOURCE, "Failed to acquire swapchain image", e)),
        }
    }

    fn submit(
        &self,
        commands: Option<vk::CommandBuffer>,
        wait: vk::Semaphore,
        signal: Option<vk::Semaphore>,
        fence: vk::Fence,
    ) -> Result<()> {
        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers: Vec<vk::CommandBuffer> = commands.into_iter().collect();
        let signal_semaphores: Vec<vk::Semaphore> = signal.into_iter().collect();

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], fence)
                .map_err(|e| vk_err(SOURCE, "Failed to submit frame", e))
        }
    }

    fn present(&self, wait: vk::Semaphore, image_index: u32) -> Result<PresentOutcome> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(self.queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(vk_err(SOURCE, "Failed to present", e)),
        }
    }
}

// ===== PRESENTATION =====

/// Command pool and primary buffer of one frame slot
struct FrameCommands {
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
}

/// Everything built by `initialize` and torn down by `cleanup`
struct Presentation {
    swapchain: Swapchain,
    sync_device: VkSync,
    sync: FrameSync<VkSync>,
    samples: u32,
    main_pass: vk::RenderPass,
    shadow_pass: vk::RenderPass,
    targets: Option<RenderTargets>,
    shadow_map: Option<ShadowMap>,
    frames: Vec<FrameCommands>,
    /// Frame between begin_render and end_render
    active: Option<FrameTicket>,
}

impl Presentation {
    /// Render passes, targets, shadow map and command pools
    fn build(&mut self, gpu: &GpuContext, config: &RendererConfig) -> Result<()> {
        let device = &gpu.device;
        self.main_pass = create_main_pass(device, self.swapchain.format, self.samples)?;
        self.shadow_pass = create_shadow_pass(device)?;
        self.targets = Some(RenderTargets::create(gpu, &self.swapchain, self.main_pass, self.samples)?);

        let shadow_size = if config.shadow.enabled { config.shadow.map_size } else { 1 };
        self.shadow_map = Some(ShadowMap::create(gpu, self.shadow_pass, shadow_size)?);

        for _ in 0..self.sync.frames_in_flight() {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(gpu.queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT);
            let pool = unsafe { device.create_command_pool(&pool_info, None) }
                .map_err(|e| vk_init_err(SOURCE, "Failed to create frame command pool", e))?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            match unsafe { device.allocate_command_buffers(&allocate_info) } {
                Ok(buffers) => self.frames.push(FrameCommands { pool, command_buffer: buffers[0] }),
                Err(e) => {
                    unsafe { device.destroy_command_pool(pool, None) };
                    return Err(vk_init_err(SOURCE, "Failed to allocate frame command buffer", e));
                }
            }
        }
        Ok(())
    }

    fn framebuffer(&self, image_index: u32) -> Result<vk::Framebuffer> {
        self.targets
            .as_ref()
            .and_then(|targets| targets.framebuffers.get(image_index as usize).copied())
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "No framebuffer for swapchain image {}", image_index))
    }

    /// Reverse creation order; the device must be idle
    fn destroy(&mut self, gpu: &GpuContext) {
        let device = &gpu.device;
        self.active = None;
        self.sync.destroy(&self.sync_device);
        unsafe {
            for frame in self.frames.drain(..) {
                device.destroy_command_pool(frame.pool, None);
            }
        }
        if let Some(mut shadow_map) = self.shadow_map.take() {
            shadow_map.destroy(gpu);
        }
        if let Some(mut targets) = self.targets.take() {
            targets.destroy(gpu);
        }
        unsafe {
            if self.shadow_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.shadow_pass, None);
                self.shadow_pass = vk::RenderPass::null();
            }
            if self.main_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.main_pass, None);
                self.main_pass = vk::RenderPass::null();
            }
        }
        self.swapchain.destroy(device);
    }
}

// ===== RENDERER =====

pub struct VulkanRenderer {
    config: RendererConfig,
    lifecycle: Lifecycle,
    timing: FrameTiming,
    stats: RendererStats,

    _entry: ash::Entry,
    #[cfg(feature = "vulkan-validation")]
    messenger: Option<DebugMessenger>,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,

    gpu: Arc<GpuContext>,
    context: VulkanRenderContext,
    presentation: Option<Presentation>,

    width: u32,
    height: u32,
    minimized: bool,
    /// Recreate the swapchain before the next acquire
    swapchain_dirty: bool,

    light_view_projection: Mat4,
    shadow_shader: Option<ShaderRef>,
}

fn init_err(what: &str, detail: impl std::fmt::Display) -> Error {
    tetra_render::render_error!(SOURCE, "{}: {}", what, detail);
    Error::InitializationFailed(format!("{}: {}", what, detail))
}

/// Graphics queue family that can also present to `surface`
unsafe fn present_family(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> Option<u32> {
    instance
        .get_physical_device_queue_family_properties(physical_device)
        .iter()
        .enumerate()
        .filter(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(index, _)| index as u32)
        .find(|&index| {
            surface_loader
                .get_physical_device_surface_support(physical_device, index, surface)
                .unwrap_or(false)
        })
}

/// Prefer a discrete GPU, then integrated, then anything that can present
unsafe fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    let devices = instance
        .enumerate_physical_devices()
        .map_err(|e| vk_init_err(SOURCE, "Failed to enumerate physical devices", e))?;

    devices
        .into_iter()
        .filter_map(|device| {
            let family = present_family(instance, surface_loader, surface, device)?;
            let score = match instance.get_physical_device_properties(device).device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 2,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                _ => 0,
            };
            Some((score, device, family))
        })
        .max_by_key(|(score, _, _)| *score)
        .map(|(_, device, family)| (device, family))
        .ok_or_else(|| init_err("No suitable GPU", "no device can render and present to this surface"))
}

impl VulkanRenderer {
    /// Create instance, surface and device for `window`
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: RendererConfig) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| init_err("Failed to load Vulkan library", e))?;

            let app_name = CString::new(config.app_name.as_str()).map_err(|e| init_err("Invalid app name", e))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Tetra")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            let display_handle = window.display_handle().map_err(|e| init_err("Failed to get display handle", e))?;
            let window_handle = window.window_handle().map_err(|e| init_err("Failed to get window handle", e))?;

            #[allow(unused_mut)]
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| vk_init_err(SOURCE, "Failed to get required extensions", e))?
                .to_vec();
            #[allow(unused_mut)]
            let mut layer_names: Vec<*const std::os::raw::c_char> = Vec::new();

            #[cfg(feature = "vulkan-validation")]
            {
                if config.enable_validation {
                    extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                    layer_names.push(VALIDATION_LAYER.as_ptr());
                }
            }
            #[cfg(not(feature = "vulkan-validation"))]
            {
                if config.enable_validation {
                    tetra_render::render_warn!(
                        SOURCE,
                        "Validation requested but the crate was built without the vulkan-validation feature"
                    );
                }
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);
            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| vk_init_err(SOURCE, "Failed to create instance", e))?;

            #[cfg(feature = "vulkan-validation")]
            let messenger = if config.enable_validation {
                match DebugMessenger::create(&entry, &instance) {
                    Ok(messenger) => Some(messenger),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
            let surface = match ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            ) {
                Ok(surface) => surface,
                Err(e) => {
                    #[cfg(feature = "vulkan-validation")]
                    {
                        if let Some(mut messenger) = messenger {
                            messenger.destroy();
                        }
                    }
                    instance.destroy_instance(None);
                    return Err(vk_init_err(SOURCE, "Failed to create surface", e));
                }
            };

            let created = Self::create_device(&instance, &surface_loader, surface, &config);
            let (gpu, context) = match created {
                Ok(created) => created,
                Err(e) => {
                    surface_loader.destroy_surface(surface, None);
                    #[cfg(feature = "vulkan-validation")]
                    {
                        if let Some(mut messenger) = messenger {
                            messenger.destroy();
                        }
                    }
                    instance.destroy_instance(None);
                    return Err(e);
                }
            };

            tetra_render::render_info!(
                SOURCE,
                "Vulkan device '{}' (max {}x MSAA, non-solid fill: {})",
                gpu.limits.device_name, gpu.limits.max_samples, gpu.limits.fill_mode_non_solid
            );

            Ok(Self {
                width: config.width,
                height: config.height,
                config,
                lifecycle: Lifecycle::new(),
                timing: FrameTiming::new(),
                stats: RendererStats::default(),
                _entry: entry,
                #[cfg(feature = "vulkan-validation")]
                messenger,
                surface_loader,
                surface,
                gpu,
                context,
                presentation: None,
                minimized: false,
                swapchain_dirty: false,
                light_view_projection: Mat4::IDENTITY,
                shadow_shader: None,
            })
        }
    }

    unsafe fn create_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        config: &RendererConfig,
    ) -> Result<(Arc<GpuContext>, VulkanRenderContext)> {
        let (physical_device, queue_family) = pick_physical_device(instance, surface_loader, surface)?;
        let properties = instance.get_physical_device_properties(physical_device);
        let supported = instance.get_physical_device_features(physical_device);

        let limits = DeviceLimits {
            device_name: properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            min_uniform_alignment: properties.limits.min_uniform_buffer_offset_alignment,
            max_samples: max_sample_count(
                properties.limits.framebuffer_color_sample_counts & properties.limits.framebuffer_depth_sample_counts,
            ),
            max_anisotropy: properties.limits.max_sampler_anisotropy,
            fill_mode_non_solid: supported.fill_mode_non_solid == vk::TRUE,
            sampler_anisotropy: supported.sampler_anisotropy == vk::TRUE,
        };

        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)];
        let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default()
            .fill_mode_non_solid(limits.fill_mode_non_solid)
            .sampler_anisotropy(limits.sampler_anisotropy);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_extension_names)
            .enabled_features(&features);
        let device = instance
            .create_device(physical_device, &device_create_info, None)
            .map_err(|e| vk_init_err(SOURCE, "Failed to create logical device", e))?;
        let queue = device.get_device_queue(queue_family, 0);

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                device.destroy_device(None);
                return Err(init_err("Failed to create GPU allocator", e));
            }
        };

        let upload_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let upload_pool = match device.create_command_pool(&upload_pool_info, None) {
            Ok(pool) => pool,
            Err(e) => {
                drop(allocator);
                device.destroy_device(None);
                return Err(vk_init_err(SOURCE, "Failed to create upload command pool", e));
            }
        };

        let gpu = Arc::new(GpuContext::new(
            instance.clone(),
            device,
            physical_device,
            queue,
            queue_family,
            upload_pool,
            allocator,
            limits,
        ));

        let features = PipelineFeatures {
            fill_mode_non_solid: gpu.limits.fill_mode_non_solid,
            depth_bias: config.shadow.depth_bias,
        };
        match VulkanRenderContext::new(Arc::clone(&gpu), features) {
            Ok(context) => Ok((gpu, context)),
            Err(e) => {
                Self::destroy_device(&gpu);
                Err(e)
            }
        }
    }

    /// Upload pool, allocator, device. Resources still held by the
    /// application see a retired context afterwards.
    fn destroy_device(gpu: &GpuContext) {
        gpu.retire();
        unsafe {
            let pool = *gpu.upload_pool.lock().unwrap_or_else(PoisonError::into_inner);
            gpu.device.destroy_command_pool(pool, None);
        }
        drop(gpu.take_allocator());
        unsafe { gpu.device.destroy_device(None) };
    }

    fn create_presentation(&self) -> Result<Presentation> {
        let samples = self.config.msaa_samples(self.gpu.limits.max_samples);
        let swapchain = Swapchain::create(
            &self.gpu,
            &self.surface_loader,
            self.surface,
            self.width,
            self.height,
            self.config.vsync,
            None,
        )?;

        let sync_device = VkSync {
            device: self.gpu.device.clone(),
            queue: self.gpu.queue,
            swapchain_loader: swapchain.loader.clone(),
            swapchain: swapchain.handle,
            acquire_timeout_ns: self.config.acquire_timeout_ns,
        };
        let sync = match FrameSync::new(&sync_device, self.config.frames_in_flight(), swapchain.image_count()) {
            Ok(sync) => sync,
            Err(e) => {
                let mut swapchain = swapchain;
                swapchain.destroy(&self.gpu.device);
                return Err(e);
            }
        };

        let mut presentation = Presentation {
            swapchain,
            sync_device,
            sync,
            samples,
            main_pass: vk::RenderPass::null(),
            shadow_pass: vk::RenderPass::null(),
            targets: None,
            shadow_map: None,
            frames: Vec::new(),
            active: None,
        };
        if let Err(e) = presentation.build(&self.gpu, &self.config) {
            presentation.destroy(&self.gpu);
            return Err(e);
        }
        Ok(presentation)
    }

    /// Rebuild the swapchain and its targets at the current window size
    fn recreate_swapchain(&mut self) -> Result<()> {
        let Some(presentation) = self.presentation.as_mut() else {
            return Ok(());
        };
        let gpu = &self.gpu;
        unsafe { gpu.device.device_wait_idle() }.map_err(|e| vk_err(SOURCE, "Failed to wait idle", e))?;

        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(gpu.physical_device, self.surface)
        }
        .map_err(|e| vk_err(SOURCE, "Failed to query surface capabilities", e))?;
        if caps.current_extent.width == 0 || caps.current_extent.height == 0 {
            tetra_render::render_debug!(SOURCE, "Surface has zero extent, treating as minimized");
            self.minimized = true;
            return Ok(());
        }

        if let Some(mut targets) = presentation.targets.take() {
            targets.destroy(gpu);
        }
        let swapchain = Swapchain::create(
            gpu,
            &self.surface_loader,
            self.surface,
            self.width,
            self.height,
            self.config.vsync,
            Some(&presentation.swapchain),
        )?;
        let mut old = std::mem::replace(&mut presentation.swapchain, swapchain);
        old.destroy(&gpu.device);

        if presentation.swapchain.format != old.format {
            tetra_render::render_info!(
                SOURCE,
                "Swapchain format changed {:?} -> {:?}, rebuilding main pass",
                old.format, presentation.swapchain.format
            );
            unsafe { gpu.device.destroy_render_pass(presentation.main_pass, None) };
            presentation.main_pass = vk::RenderPass::null();
            presentation.main_pass = create_main_pass(&gpu.device, presentation.swapchain.format, presentation.samples)?;
            self.context.clear_pipelines();
        }

        presentation.targets = Some(RenderTargets::create(
            gpu,
            &presentation.swapchain,
            presentation.main_pass,
            presentation.samples,
        )?);
        presentation.sync.on_swapchain_recreated(presentation.swapchain.image_count());
        presentation.sync_device.swapchain = presentation.swapchain.handle;
        self.swapchain_dirty = false;

        tetra_render::render_debug!(
            SOURCE,
            "Swapchain recreated at {}x{}",
            presentation.swapchain.extent.width, presentation.swapchain.extent.height
        );
        Ok(())
    }

    /// Acquire, then record the shadow pass and open the main pass
    fn start_frame(&mut self, queue: &RenderCommandQueue) -> Result<FrameStatus> {
        if self.minimized {
            return Ok(FrameStatus::Skipped(SkipReason::Minimized));
        }
        if self.swapchain_dirty {
            self.recreate_swapchain()?;
            if self.minimized {
                return Ok(FrameStatus::Skipped(SkipReason::Minimized));
            }
        }

        let presentation = self
            .presentation
            .as_mut()
            .ok_or_else(|| Error::InvalidState("begin_render before initialize".to_string()))?;

        let outcome = presentation.sync.begin_frame(&presentation.sync_device)?;
        if outcome.needs_recreate() {
            self.swapchain_dirty = true;
        }
        let ticket = match outcome {
            BeginOutcome::Ready(ticket) => ticket,
            BeginOutcome::Skipped(reason) => return Ok(FrameStatus::Skipped(reason)),
        };
        presentation.active = Some(ticket);

        let device = &self.gpu.device;
        let frame = &presentation.frames[ticket.slot];
        let command_buffer = frame.command_buffer;
        unsafe {
            device
                .reset_command_pool(frame.pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| vk_err(SOURCE, "Failed to reset frame command pool", e))?;
            let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| vk_err(SOURCE, "Failed to begin command buffer", e))?;
        }
        self.context.begin_frame(command_buffer, ticket.slot)?;

        // Shadow pass: replay last drain's shadow cache into the depth map
        if let (true, Some(shader), Some(shadow_map)) =
            (self.config.shadow.enabled, self.shadow_shader.as_ref(), presentation.shadow_map.as_ref())
        {
            let extent = shadow_map.extent();
            let clear = [vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            }];
            let pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(presentation.shadow_pass)
                .framebuffer(shadow_map.framebuffer)
                .render_area(vk::Rect2D { offset: vk::Offset2D::default(), extent })
                .clear_values(&clear);
            unsafe {
                device.cmd_begin_render_pass(command_buffer, &pass_info, vk::SubpassContents::INLINE);
                set_viewport(device, command_buffer, extent);
            }

            self.context.begin_shadow_pass(presentation.shadow_pass, shader, self.light_view_projection)?;
            let replayed = queue.execute_shadow_pass(&mut self.context);
            self.context.end_shadow_pass()?;
            unsafe { device.cmd_end_render_pass(command_buffer) };
            tetra_render::render_trace!(SOURCE, "Shadow pass replayed {} draws", replayed);
        }

        // Main pass
        let extent = presentation.swapchain.extent;
        let clear_values = main_clear_values(self.config.clear_color, presentation.samples);
        let pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(presentation.main_pass)
            .framebuffer(presentation.framebuffer(ticket.image_index)?)
            .render_area(vk::Rect2D { offset: vk::Offset2D::default(), extent })
            .clear_values(&clear_values);
        unsafe {
            device.cmd_begin_render_pass(command_buffer, &pass_info, vk::SubpassContents::INLINE);
            set_viewport(device, command_buffer, extent);
        }
        self.context.begin_main_pass(presentation.main_pass, presentation.samples);
        Ok(FrameStatus::Ready)
    }

    /// Drop the frame being recorded so the slot can be reused
    fn abandon_frame(&mut self) {
        self.context.abandon_frame();
        self.lifecycle.abandon_frame();
        if let Some(presentation) = self.presentation.as_mut() {
            presentation.active = None;
            if let Err(e) = presentation.sync.abandon_frame(&presentation.sync_device) {
                tetra_render::render_error!(SOURCE, "Failed to release abandoned frame: {}", e);
            }
        }
        // The acquired image was never presented
        self.swapchain_dirty = true;
    }

    /// Samples actually used by the main pass (after clamping to device support)
    pub fn msaa_samples(&self) -> u32 {
        self.presentation
            .as_ref()
            .map_or_else(|| self.config.msaa_samples(self.gpu.limits.max_samples), |p| p.samples)
    }

    pub fn device_limits(&self) -> &DeviceLimits {
        &self.gpu.limits
    }
}

unsafe fn set_viewport(device: &ash::Device, command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
    let viewport = vk::Viewport::default()
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0);
    device.cmd_set_viewport(command_buffer, 0, &[viewport]);
    device.cmd_set_scissor(command_buffer, 0, &[vk::Rect2D { offset: vk::Offset2D::default(), extent }]);
}

impl Renderer for VulkanRenderer {
    fn backend(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn initialize(&mut self) -> Result<()> {
        if self.lifecycle.state() != LifecycleState::Uninitialized {
            return self.lifecycle.initialized();
        }
        let presentation = self.create_presentation()?;

        let shadow_view = presentation.shadow_map.as_ref().map(|map| map.view());
        if let Err(e) = self
            .context
            .init_frame_resources(self.config.frames_in_flight(), self.config.uniform_ring_size)
        {
            let mut presentation = presentation;
            presentation.destroy(&self.gpu);
            return Err(e);
        }
        if let Some(view) = shadow_view {
            self.context.set_shadow_map(view);
        }

        tetra_render::render_info!(
            SOURCE,
            "Initialized: {} frames in flight, {}x MSAA, shadows {}",
            presentation.sync.frames_in_flight(),
            presentation.samples,
            if self.config.shadow.enabled { "on" } else { "off" }
        );
        self.presentation = Some(presentation);
        self.lifecycle.initialized()
    }

    fn begin_render(&mut self, queue: &RenderCommandQueue) -> Result<FrameStatus> {
        self.lifecycle.begin()?;
        self.stats.reset_frame();

        match self.start_frame(queue) {
            Ok(FrameStatus::Ready) => Ok(FrameStatus::Ready),
            Ok(FrameStatus::Skipped(reason)) => {
                self.lifecycle.abandon_frame();
                self.stats.skipped_frames += 1;
                tetra_render::render_debug!(SOURCE, "Frame skipped: {:?}", reason);
                Ok(FrameStatus::Skipped(reason))
            }
            Err(e) => {
                self.abandon_frame();
                Err(e)
            }
        }
    }

    fn end_render(&mut self) -> Result<FrameStatus> {
        self.lifecycle.end()?;
        let Some(presentation) = self.presentation.as_mut() else {
            return Err(Error::InvalidState("end_render before initialize".to_string()));
        };
        let Some(ticket) = presentation.active else {
            return Err(Error::InvalidState("end_render without a recorded frame".to_string()));
        };

        let command_buffer = presentation.frames[ticket.slot].command_buffer;
        let draws = self.context.end_frame();
        self.stats.draw_calls = draws.draw_calls;
        self.stats.pipeline_binds = draws.pipeline_binds;
        self.stats.descriptor_allocations = draws.descriptor_allocations;
        self.stats.shadow_draws = draws.shadow_draws;

        let ended = unsafe {
            self.gpu.device.cmd_end_render_pass(command_buffer);
            self.gpu.device.end_command_buffer(command_buffer)
        };
        if let Err(e) = ended {
            self.abandon_frame();
            return Err(vk_err(SOURCE, "Failed to end command buffer", e));
        }

        presentation.active = None;
        let outcome = match presentation.sync.end_frame(&presentation.sync_device, command_buffer) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.swapchain_dirty = true;
                return Err(e);
            }
        };

        if outcome.needs_recreate() {
            self.swapchain_dirty = true;
        }
        if outcome == PresentOutcome::OutOfDate {
            self.stats.skipped_frames += 1;
            return Ok(FrameStatus::Skipped(SkipReason::SwapchainOutOfDate));
        }
        self.stats.presented_frames += 1;
        self.timing.tick();
        Ok(FrameStatus::Ready)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.lifecycle.require_initialized("resize")?;
        if width == 0 || height == 0 {
            tetra_render::render_debug!(SOURCE, "Minimized");
            self.minimized = true;
            return Ok(());
        }

        self.minimized = false;
        self.width = width;
        self.height = height;
        self.swapchain_dirty = true;
        // Mid-frame resizes are applied before the next acquire
        if self.lifecycle.state() == LifecycleState::Initialized {
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        if !self.lifecycle.cleaned_up() {
            return;
        }
        if !self.gpu.is_alive() {
            return;
        }
        tetra_render::render_info!(SOURCE, "Cleaning up");

        unsafe {
            if let Err(e) = self.gpu.device.device_wait_idle() {
                tetra_render::render_warn!(SOURCE, "device_wait_idle failed during cleanup: {:?}", e);
            }
        }

        if let Some(mut presentation) = self.presentation.take() {
            presentation.destroy(&self.gpu);
        }
        self.context.destroy();
        self.shadow_shader = None;
        Self::destroy_device(&self.gpu);

        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
        self.surface = vk::SurfaceKHR::null();

        #[cfg(feature = "vulkan-validation")]
        {
            if let Some(mut messenger) = self.messenger.take() {
                messenger.destroy();
                crate::debug::print_validation_stats_report();
            }
        }

        unsafe { self.gpu.instance.destroy_instance(None) };
    }

    fn context(&mut self) -> &mut dyn RenderContext {
        &mut self.context
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    fn stats(&self) -> RendererStats {
        let mut stats = self.stats;
        stats.live_sync_objects = self.presentation.as_ref().map_or(0, |p| p.sync.live_sync_objects() as u32);
        stats.cached_pipelines = self.context.cached_pipelines() as u32;
        stats
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.gpu.require_alive("wait_idle")?;
        unsafe {
            self.gpu
                .device
                .device_wait_idle()
                .map_err(|e| vk_err(SOURCE, "Failed to wait idle", e))
        }
    }

    fn set_shadow_view_projection(&mut self, view_projection: Mat4) {
        self.light_view_projection = view_projection;
    }

    fn set_shadow_shader(&mut self, shader: Option<ShaderRef>) {
        self.shadow_shader = shader;
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        self.cleanup();
    }
}
