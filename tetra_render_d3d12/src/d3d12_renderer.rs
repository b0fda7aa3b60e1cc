/// Dx12Renderer - Direct3D 12 implementation of the Renderer trait
///
/// `new` wraps the device in a `GpuContext` (copy path) and builds the root
/// signature. `initialize` creates the swapchain, render targets, shadow map,
/// one command allocator + list per frame slot and the frame fence.
///
/// Frame:
/// 1. `begin_render` waits until the slot's last fence value completed, resets
///    its allocator and list, records the shadow pass from the queue's shadow
///    cache, then transitions and clears the main target
/// 2. the application drains the queue into `context()`
/// 3. `end_render` resolves or transitions to PRESENT, executes, signals the
///    slot's next fence value and presents

use glam::Mat4;
use std::sync::Arc;
use tetra_render::{
    BackendKind, Error, FrameStatus, FrameTiming, Lifecycle, LifecycleState, RenderCommandQueue, RenderContext,
    Renderer, RendererConfig, RendererStats, Result, ShaderRef, SkipReason,
};

use crate::d3d12_context::{GpuContext, INFINITE};
use crate::d3d12_convert::{
    hr_err, hr_init_err, BACK_BUFFER_FORMAT, DXGI_FORMAT_D32_FLOAT, DXGI_FORMAT_R32_FLOAT,
    DXGI_FORMAT_R32_TYPELESS,
};
use crate::d3d12_render_context::Dx12RenderContext;
use crate::device::{
    Dx12Device, HeapKind, ListCommand, NativeHandle, QueueKind, ResourceDesc, ResourceState, SwapchainDesc,
    ViewKind,
};

const SOURCE: &str = "tetra::d3d12";

// ===== TARGETS =====

/// A texture and the one view the renderer uses it through
#[derive(Debug, Clone, Copy)]
struct ViewedTexture {
    resource: NativeHandle,
    view: NativeHandle,
}

impl ViewedTexture {
    fn create(
        device: &dyn Dx12Device,
        label: &str,
        desc: ResourceDesc,
        initial_state: ResourceState,
        view: ViewKind,
    ) -> Result<Self> {
        let resource = device
            .create_committed_resource(label, HeapKind::Default, &desc, initial_state)
            .map_err(|hr| hr_err(SOURCE, &format!("Failed to create {}", label), hr))?;
        match device.create_view(resource, view) {
            Ok(view) => Ok(Self { resource, view }),
            Err(hr) => {
                device.release(resource);
                Err(hr_err(SOURCE, &format!("Failed to create {} view", label), hr))
            }
        }
    }

    fn release(self, device: &dyn Dx12Device) {
        device.release(self.view);
        device.release(self.resource);
    }
}

/// Everything that depends on the swapchain size
struct SwapchainTargets {
    /// Back-buffer references with their RTVs
    back_buffers: Vec<ViewedTexture>,
    /// Multisampled color target resolved into the back buffer
    msaa_color: Option<ViewedTexture>,
    depth: Option<ViewedTexture>,
}

impl SwapchainTargets {
    fn create(device: &dyn Dx12Device, swapchain: NativeHandle, desc: &SwapchainDesc, samples: u32) -> Result<Self> {
        let mut targets = Self { back_buffers: Vec::new(), msaa_color: None, depth: None };
        if let Err(e) = targets.build(device, swapchain, desc, samples) {
            targets.release(device);
            return Err(e);
        }
        Ok(targets)
    }

    fn build(&mut self, device: &dyn Dx12Device, swapchain: NativeHandle, desc: &SwapchainDesc, samples: u32) -> Result<()> {
        for index in 0..desc.buffer_count {
            let resource = device
                .swapchain_buffer(swapchain, index)
                .map_err(|hr| hr_err(SOURCE, &format!("Failed to get back buffer {}", index), hr))?;
            match device.create_view(resource, ViewKind::RenderTarget { format: BACK_BUFFER_FORMAT }) {
                Ok(view) => self.back_buffers.push(ViewedTexture { resource, view }),
                Err(hr) => {
                    device.release(resource);
                    return Err(hr_err(SOURCE, "Failed to create back-buffer RTV", hr));
                }
            }
        }

        let texture = |format, render_target, depth_stencil| ResourceDesc::Texture2D {
            width: desc.width,
            height: desc.height,
            array_size: 1,
            format,
            samples,
            render_target,
            depth_stencil,
        };
        if samples > 1 {
            self.msaa_color = Some(ViewedTexture::create(
                device,
                "msaa color",
                texture(BACK_BUFFER_FORMAT, true, false),
                ResourceState::RenderTarget,
                ViewKind::RenderTarget { format: BACK_BUFFER_FORMAT },
            )?);
        }
        self.depth = Some(ViewedTexture::create(
            device,
            "depth buffer",
            texture(DXGI_FORMAT_D32_FLOAT, false, true),
            ResourceState::DepthWrite,
            ViewKind::DepthStencil { format: DXGI_FORMAT_D32_FLOAT },
        )?);
        Ok(())
    }

    /// Release every reference; required before `resize_buffers`
    fn release(&mut self, device: &dyn Dx12Device) {
        for target in self.back_buffers.drain(..) {
            target.release(device);
        }
        if let Some(target) = self.msaa_color.take() {
            target.release(device);
        }
        if let Some(target) = self.depth.take() {
            target.release(device);
        }
    }
}

/// Depth-only shadow map, sampled at texture slot 4 by the main pass
struct ShadowTarget {
    texture: ViewedTexture,
    srv: NativeHandle,
    size: u32,
}

impl ShadowTarget {
    fn create(device: &dyn Dx12Device, size: u32) -> Result<Self> {
        let texture = ViewedTexture::create(
            device,
            "shadow map",
            ResourceDesc::Texture2D {
                width: size,
                height: size,
                array_size: 1,
                format: DXGI_FORMAT_R32_TYPELESS,
                samples: 1,
                render_target: false,
                depth_stencil: true,
            },
            ResourceState::PixelShaderResource,
            ViewKind::DepthStencil { format: DXGI_FORMAT_D32_FLOAT },
        )?;
        match device.create_view(texture.resource, ViewKind::ShaderResource { format: DXGI_FORMAT_R32_FLOAT, cube: false }) {
            Ok(srv) => Ok(Self { texture, srv, size }),
            Err(hr) => {
                texture.release(device);
                Err(hr_err(SOURCE, "Failed to create shadow map SRV", hr))
            }
        }
    }

    fn release(self, device: &dyn Dx12Device) {
        device.release(self.srv);
        self.texture.release(device);
    }
}

// ===== PRESENTATION =====

/// Command allocator and list of one frame slot
struct FrameSlot {
    allocator: NativeHandle,
    list: NativeHandle,
    /// Fence value signalled after this slot's last submission
    fence_value: u64,
}

/// Frame between begin_render and end_render
#[derive(Debug, Clone, Copy)]
struct ActiveFrame {
    slot: usize,
    back_buffer: usize,
}

/// Everything built by `initialize` and torn down by `cleanup`
struct Presentation {
    swapchain: NativeHandle,
    swapchain_desc: SwapchainDesc,
    samples: u32,
    targets: Option<SwapchainTargets>,
    shadow: Option<ShadowTarget>,
    frames: Vec<FrameSlot>,
    fence: NativeHandle,
    fence_value: u64,
    next_slot: usize,
    active: Option<ActiveFrame>,
}

impl Presentation {
    fn build(&mut self, device: &dyn Dx12Device, config: &RendererConfig) -> Result<()> {
        self.targets = Some(SwapchainTargets::create(device, self.swapchain, &self.swapchain_desc, self.samples)?);

        let shadow_size = if config.shadow.enabled { config.shadow.map_size } else { 1 };
        self.shadow = Some(ShadowTarget::create(device, shadow_size)?);

        self.fence = device
            .create_fence(0)
            .map_err(|hr| hr_init_err(SOURCE, "Failed to create frame fence", hr))?;

        for slot in 0..config.frames_in_flight() {
            let allocator = device
                .create_command_allocator(QueueKind::Direct)
                .map_err(|hr| hr_init_err(SOURCE, &format!("Failed to create allocator {}", slot), hr))?;
            let list = match device.create_command_list(QueueKind::Direct, allocator) {
                Ok(list) => list,
                Err(hr) => {
                    device.release(allocator);
                    return Err(hr_init_err(SOURCE, &format!("Failed to create command list {}", slot), hr));
                }
            };
            self.frames.push(FrameSlot { allocator, list, fence_value: 0 });
        }
        Ok(())
    }

    /// Signal the next frame fence value on the direct queue
    fn signal(&mut self, device: &dyn Dx12Device) -> Result<u64> {
        self.fence_value += 1;
        device
            .signal(QueueKind::Direct, self.fence, self.fence_value)
            .map_err(|hr| hr_err(SOURCE, "Failed to signal frame fence", hr))?;
        Ok(self.fence_value)
    }

    /// Block until every submitted frame has finished
    fn wait_idle(&mut self, device: &dyn Dx12Device) -> Result<()> {
        let value = self.signal(device)?;
        let done = device
            .wait_for_value(self.fence, value, INFINITE)
            .map_err(|hr| hr_err(SOURCE, "Failed to wait for frame fence", hr))?;
        if !done {
            tetra_render::render_bail!(SOURCE, "GPU never reached fence value {}", value);
        }
        Ok(())
    }

    /// Frame fence plus one command allocator per slot
    fn live_sync_objects(&self) -> usize {
        usize::from(!self.fence.is_null()) + self.frames.len()
    }

    fn targets(&self) -> Result<&SwapchainTargets> {
        self.targets
            .as_ref()
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "Swapchain targets missing"))
    }

    /// Reverse creation order; the GPU must be idle
    fn destroy(&mut self, device: &dyn Dx12Device) {
        self.active = None;
        for frame in self.frames.drain(..) {
            device.release(frame.list);
            device.release(frame.allocator);
        }
        if !self.fence.is_null() {
            device.release(self.fence);
            self.fence = NativeHandle::NULL;
        }
        if let Some(shadow) = self.shadow.take() {
            shadow.release(device);
        }
        if let Some(mut targets) = self.targets.take() {
            targets.release(device);
        }
        if !self.swapchain.is_null() {
            device.release(self.swapchain);
            self.swapchain = NativeHandle::NULL;
        }
    }
}

// ===== RENDERER =====

pub struct Dx12Renderer {
    config: RendererConfig,
    lifecycle: Lifecycle,
    timing: FrameTiming,
    stats: RendererStats,

    gpu: Arc<GpuContext>,
    context: Dx12RenderContext,
    presentation: Option<Presentation>,

    width: u32,
    height: u32,
    minimized: bool,
    /// Resize the swapchain before the next frame
    swapchain_dirty: bool,

    light_view_projection: Mat4,
    shadow_shader: Option<ShaderRef>,
}

impl Dx12Renderer {
    /// Wrap an already created device; fails if the copy path or root signature can't be built
    pub fn new(device: Arc<dyn Dx12Device>, config: RendererConfig) -> Result<Self> {
        if config.enable_validation {
            tetra_render::render_debug!(SOURCE, "Validation requested; the injected device owns the debug layer");
        }
        let adapter = device.adapter_name();
        let gpu = GpuContext::new(device)?;
        let context = match Dx12RenderContext::new(Arc::clone(&gpu), config.shadow.depth_bias) {
            Ok(context) => context,
            Err(e) => {
                gpu.retire();
                return Err(e);
            }
        };
        tetra_render::render_info!(SOURCE, "D3D12 adapter '{}'", adapter);

        Ok(Self {
            width: config.width,
            height: config.height,
            config,
            lifecycle: Lifecycle::new(),
            timing: FrameTiming::new(),
            stats: RendererStats::default(),
            gpu,
            context,
            presentation: None,
            minimized: false,
            swapchain_dirty: false,
            light_view_projection: Mat4::IDENTITY,
            shadow_shader: None,
        })
    }

    fn create_presentation(&self) -> Result<Presentation> {
        let device = self.gpu.device.as_ref();
        let samples = self.config.msaa_samples(device.max_sample_count(BACK_BUFFER_FORMAT));
        let swapchain_desc = SwapchainDesc {
            width: self.width,
            height: self.height,
            buffer_count: (self.config.frames_in_flight() as u32).max(2),
            format: BACK_BUFFER_FORMAT,
        };
        let swapchain = device
            .create_swapchain(&swapchain_desc)
            .map_err(|hr| hr_init_err(SOURCE, "Failed to create swapchain", hr))?;

        let mut presentation = Presentation {
            swapchain,
            swapchain_desc,
            samples,
            targets: None,
            shadow: None,
            frames: Vec::new(),
            fence: NativeHandle::NULL,
            fence_value: 0,
            next_slot: 0,
            active: None,
        };
        if let Err(e) = presentation.build(device, &self.config) {
            presentation.destroy(device);
            return Err(e);
        }
        Ok(presentation)
    }

    /// Resize the swapchain buffers to the current window size
    fn recreate_swapchain(&mut self) -> Result<()> {
        let Some(presentation) = self.presentation.as_mut() else {
            return Ok(());
        };
        let device = self.gpu.device.as_ref();
        presentation.wait_idle(device)?;

        if let Some(mut targets) = presentation.targets.take() {
            targets.release(device);
        }
        device
            .resize_buffers(presentation.swapchain, self.width, self.height)
            .map_err(|hr| hr_err(SOURCE, "Failed to resize swapchain buffers", hr))?;
        presentation.swapchain_desc.width = self.width;
        presentation.swapchain_desc.height = self.height;
        presentation.targets = Some(SwapchainTargets::create(
            device,
            presentation.swapchain,
            &presentation.swapchain_desc,
            presentation.samples,
        )?);
        self.swapchain_dirty = false;

        tetra_render::render_debug!(SOURCE, "Swapchain resized to {}x{}", self.width, self.height);
        Ok(())
    }

    /// Wait for the slot, then record the shadow pass and open the main pass
    fn start_frame(&mut self, queue: &RenderCommandQueue) -> Result<FrameStatus> {
        if self.minimized {
            return Ok(FrameStatus::Skipped(SkipReason::Minimized));
        }
        if self.swapchain_dirty {
            self.recreate_swapchain()?;
        }

        let presentation = self
            .presentation
            .as_mut()
            .ok_or_else(|| Error::InvalidState("begin_render before initialize".to_string()))?;
        let device = self.gpu.device.as_ref();

        let slot = presentation.next_slot;
        let frame = &presentation.frames[slot];
        let timeout_ms = (self.config.acquire_timeout_ns / 1_000_000).clamp(1, u64::from(u32::MAX - 1)) as u32;
        let ready = device
            .wait_for_value(presentation.fence, frame.fence_value, timeout_ms)
            .map_err(|hr| hr_err(SOURCE, "Failed to wait for frame slot", hr))?;
        if !ready {
            return Ok(FrameStatus::Skipped(SkipReason::AcquireTimeout));
        }

        device
            .reset_command_allocator(frame.allocator)
            .map_err(|hr| hr_err(SOURCE, "Failed to reset command allocator", hr))?;
        device
            .reset_command_list(frame.list, frame.allocator)
            .map_err(|hr| hr_err(SOURCE, "Failed to reset command list", hr))?;
        let list = frame.list;
        let back_buffer = device.current_back_buffer_index(presentation.swapchain) as usize;
        presentation.active = Some(ActiveFrame { slot, back_buffer });
        self.context.begin_frame(list, slot)?;

        // Shadow pass: replay last drain's shadow cache into the depth map
        if let (true, Some(shader), Some(shadow)) =
            (self.config.shadow.enabled, self.shadow_shader.as_ref(), presentation.shadow.as_ref())
        {
            let map = shadow.texture;
            device.record(list, ListCommand::ResourceBarrier {
                resource: map.resource,
                before: ResourceState::PixelShaderResource,
                after: ResourceState::DepthWrite,
            });
            device.record(list, ListCommand::ClearDepthStencilView { dsv: map.view, depth: 1.0 });
            device.record(list, ListCommand::SetRenderTargets { rtv: None, dsv: Some(map.view) });
            device.record(list, ListCommand::SetViewport { width: shadow.size, height: shadow.size });

            self.context.begin_shadow_pass(shader, self.light_view_projection)?;
            let replayed = queue.execute_shadow_pass(&mut self.context);
            self.context.end_shadow_pass()?;

            device.record(list, ListCommand::ResourceBarrier {
                resource: map.resource,
                before: ResourceState::DepthWrite,
                after: ResourceState::PixelShaderResource,
            });
            tetra_render::render_trace!(SOURCE, "Shadow pass replayed {} draws", replayed);
        }

        // Main pass
        let targets = presentation.targets()?;
        let target = targets
            .back_buffers
            .get(back_buffer)
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "No back buffer {}", back_buffer))?;
        let depth = targets
            .depth
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "Depth buffer missing"))?;
        let rtv = match targets.msaa_color {
            Some(msaa) => msaa.view,
            None => {
                device.record(list, ListCommand::ResourceBarrier {
                    resource: target.resource,
                    before: ResourceState::Present,
                    after: ResourceState::RenderTarget,
                });
                target.view
            }
        };
        device.record(list, ListCommand::ClearRenderTargetView { rtv, color: self.config.clear_color });
        device.record(list, ListCommand::ClearDepthStencilView { dsv: depth.view, depth: 1.0 });
        device.record(list, ListCommand::SetRenderTargets { rtv: Some(rtv), dsv: Some(depth.view) });
        device.record(list, ListCommand::SetViewport {
            width: presentation.swapchain_desc.width,
            height: presentation.swapchain_desc.height,
        });
        self.context.begin_main_pass(presentation.samples);
        Ok(FrameStatus::Ready)
    }

    /// Record the resolve or transition that hands the back buffer to PRESENT
    fn finish_main_pass(&self, presentation: &Presentation, frame: ActiveFrame, list: NativeHandle) -> Result<()> {
        let device = self.gpu.device.as_ref();
        let targets = presentation.targets()?;
        let target = targets
            .back_buffers
            .get(frame.back_buffer)
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "No back buffer {}", frame.back_buffer))?;
        let barrier = |resource, before, after| ListCommand::ResourceBarrier { resource, before, after };

        match targets.msaa_color {
            Some(msaa) => {
                device.record(list, barrier(msaa.resource, ResourceState::RenderTarget, ResourceState::ResolveSource));
                device.record(list, barrier(target.resource, ResourceState::Present, ResourceState::ResolveDest));
                device.record(list, ListCommand::ResolveSubresource {
                    dst: target.resource,
                    src: msaa.resource,
                    format: BACK_BUFFER_FORMAT,
                });
                device.record(list, barrier(target.resource, ResourceState::ResolveDest, ResourceState::Present));
                device.record(list, barrier(msaa.resource, ResourceState::ResolveSource, ResourceState::RenderTarget));
            }
            None => {
                device.record(list, barrier(target.resource, ResourceState::RenderTarget, ResourceState::Present));
            }
        }
        Ok(())
    }

    /// Drop the frame being recorded; its list is closed unexecuted
    fn abandon_frame(&mut self) {
        self.context.abandon_frame();
        self.lifecycle.abandon_frame();
        if let Some(presentation) = self.presentation.as_mut() {
            if let Some(frame) = presentation.active.take() {
                let list = presentation.frames[frame.slot].list;
                if let Err(hr) = self.gpu.device.close_command_list(list) {
                    tetra_render::render_error!(SOURCE, "Failed to close abandoned list: HRESULT 0x{:08X}", hr as u32);
                }
            }
        }
        // Back-buffer state after a partial recording is unknown
        self.swapchain_dirty = true;
    }

    /// Samples actually used by the main target (after clamping to device support)
    pub fn msaa_samples(&self) -> u32 {
        self.presentation.as_ref().map_or_else(
            || self.config.msaa_samples(self.gpu.device.max_sample_count(BACK_BUFFER_FORMAT)),
            |p| p.samples,
        )
    }
}

impl Renderer for Dx12Renderer {
    fn backend(&self) -> BackendKind {
        BackendKind::D3D12
    }

    fn initialize(&mut self) -> Result<()> {
        if self.lifecycle.state() != LifecycleState::Uninitialized {
            return self.lifecycle.initialized();
        }
        let device = self.gpu.device.as_ref();
        let mut presentation = self.create_presentation()?;

        if let Err(e) = self
            .context
            .init_frame_resources(self.config.frames_in_flight(), self.config.uniform_ring_size)
        {
            presentation.destroy(device);
            return Err(e);
        }
        if let Some(shadow) = presentation.shadow.as_ref() {
            self.context.set_shadow_map(shadow.srv);
        }

        tetra_render::render_info!(
            SOURCE,
            "Initialized: {} frames in flight, {} back buffers, {}x MSAA, shadows {}",
            presentation.frames.len(),
            presentation.swapchain_desc.buffer_count,
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
        let Some(frame) = self.presentation.as_ref().and_then(|p| p.active) else {
            return Err(Error::InvalidState("end_render without a recorded frame".to_string()));
        };

        let draws = self.context.end_frame();
        self.stats.draw_calls = draws.draw_calls;
        self.stats.pipeline_binds = draws.pipeline_binds;
        self.stats.descriptor_allocations = draws.descriptor_allocations;
        self.stats.shadow_draws = draws.shadow_draws;

        let Some(presentation) = self.presentation.as_ref() else {
            return Err(Error::InvalidState("end_render before initialize".to_string()));
        };
        let list = presentation.frames[frame.slot].list;
        if let Err(e) = self.finish_main_pass(presentation, frame, list) {
            self.abandon_frame();
            return Err(e);
        }

        let device = self.gpu.device.as_ref();
        let Some(presentation) = self.presentation.as_mut() else {
            return Err(Error::InvalidState("end_render before initialize".to_string()));
        };
        presentation.active = None;
        device
            .close_command_list(list)
            .map_err(|hr| hr_err(SOURCE, "Failed to close command list", hr))?;
        device
            .execute_command_list(QueueKind::Direct, list)
            .map_err(|hr| hr_err(SOURCE, "Failed to execute command list", hr))?;
        let value = presentation.signal(device)?;
        presentation.frames[frame.slot].fence_value = value;
        presentation.next_slot = (frame.slot + 1) % presentation.frames.len();

        let sync_interval = u32::from(self.config.vsync);
        device
            .present(presentation.swapchain, sync_interval)
            .map_err(|hr| hr_err(SOURCE, "Failed to present", hr))?;

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
        // Mid-frame resizes are applied before the next frame
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

        let device = self.gpu.device.as_ref();
        if let Some(mut presentation) = self.presentation.take() {
            if let Err(e) = presentation.wait_idle(device) {
                tetra_render::render_warn!(SOURCE, "Wait idle failed during cleanup: {}", e);
            }
            presentation.destroy(device);
        }
        self.context.destroy();
        self.shadow_shader = None;
        self.gpu.retire();
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
        let presentation = self.presentation.as_ref().map_or(0, Presentation::live_sync_objects);
        stats.live_sync_objects = (presentation + self.gpu.live_sync_objects()) as u32;
        stats.cached_pipelines = self.context.cached_pipelines() as u32;
        stats
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.gpu.require_alive("wait_idle")?;
        match self.presentation.as_mut() {
            Some(presentation) => presentation.wait_idle(self.gpu.device.as_ref()),
            None => Ok(()),
        }
    }

    fn set_shadow_view_projection(&mut self, view_projection: Mat4) {
        self.light_view_projection = view_projection;
    }

    fn set_shadow_shader(&mut self, shader: Option<ShaderRef>) {
        self.shadow_shader = shader;
    }
}

impl Drop for Dx12Renderer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
#[path = "d3d12_renderer_tests.rs"]
mod tests;
