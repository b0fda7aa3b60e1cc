/// Renderer trait - owns a RenderContext, the device/swapchain lifecycle
/// and frame timing
///
/// State machine:
/// Uninitialized -> Initialized -> {begin_render <-> end_render}* -> CleanedUp
///
/// Failure semantics:
/// - `initialize` failures are fatal; no partially initialized renderer is usable
/// - swapchain staleness is recoverable: the frame is reported `Skipped`
/// - a bad per-frame operation (stale handle) only degrades visuals

use std::fmt;
use std::str::FromStr;
use glam::Mat4;
use crate::command::RenderCommandQueue;
use crate::context::RenderContext;
use crate::error::{Error, Result};
use crate::renderer::{FrameTiming, LifecycleState};
use crate::resource::ShaderRef;

/// Native backend family, chosen once at process start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Vulkan,
    D3D12,
    D3D11,
    OpenGl,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [BackendKind::Vulkan, BackendKind::D3D12, BackendKind::D3D11, BackendKind::OpenGl];

    /// Backend used when none is requested
    pub fn platform_default() -> Self {
        if cfg!(target_os = "windows") {
            BackendKind::D3D12
        } else {
            BackendKind::Vulkan
        }
    }

    /// Read `--backend <name>` or `--backend=<name>`; falls back to the platform default
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let arg = arg.as_ref();
            if let Some(value) = arg.strip_prefix("--backend=") {
                return value.parse();
            }
            if arg == "--backend" {
                return match args.next() {
                    Some(value) => value.as_ref().parse(),
                    None => Err(Error::InvalidState("--backend expects a value".to_string())),
                };
            }
        }
        Ok(Self::platform_default())
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Vulkan => "vulkan",
            BackendKind::D3D12 => "d3d12",
            BackendKind::D3D11 => "d3d11",
            BackendKind::OpenGl => "opengl",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vulkan" | "vk" => Ok(BackendKind::Vulkan),
            "d3d12" | "dx12" => Ok(BackendKind::D3D12),
            "d3d11" | "dx11" => Ok(BackendKind::D3D11),
            "opengl" | "gl" => Ok(BackendKind::OpenGl),
            other => Err(Error::InvalidState(format!("Unknown backend '{}'", other))),
        }
    }
}

/// Why a frame was not rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Surface has zero extent
    Minimized,
    /// Swapchain went stale; it has been (or will be) recreated
    SwapchainOutOfDate,
    /// No image or frame slot became available in time
    AcquireTimeout,
}

/// Result of `begin_render` / `end_render`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Ready,
    Skipped(SkipReason),
}

impl FrameStatus {
    pub fn is_ready(self) -> bool {
        matches!(self, FrameStatus::Ready)
    }
}

/// Per-frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub draw_calls: u32,
    pub pipeline_binds: u32,
    pub descriptor_allocations: u32,
    pub shadow_draws: u32,
    /// Frames skipped since initialize
    pub skipped_frames: u64,
    /// Frames presented since initialize
    pub presented_frames: u64,
    /// Live fences + semaphores (or the backend's equivalents)
    pub live_sync_objects: u32,
    /// Pipelines currently cached
    pub cached_pipelines: u32,
}

impl RendererStats {
    /// Clear the per-frame counters, keep the running totals
    pub fn reset_frame(&mut self) {
        self.draw_calls = 0;
        self.pipeline_binds = 0;
        self.descriptor_allocations = 0;
        self.shadow_draws = 0;
    }
}

/// A native backend behind the one logical API
pub trait Renderer {
    fn backend(&self) -> BackendKind;

    /// Create device, swapchain, default pipeline and fallback texture
    fn initialize(&mut self) -> Result<()>;

    /// Acquire the next frame. Backends with a shadow pass replay the
    /// queue's shadow cache here, before the main pass starts recording.
    fn begin_render(&mut self, queue: &RenderCommandQueue) -> Result<FrameStatus>;

    /// Close recording, submit and present
    fn end_render(&mut self) -> Result<FrameStatus>;

    /// Rebuild swapchain-size resources; (0, 0) means minimized
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Tear everything down in reverse creation order. Idempotent.
    fn cleanup(&mut self);

    /// Context for the frame being recorded
    fn context(&mut self) -> &mut dyn RenderContext;

    fn state(&self) -> LifecycleState;

    fn timing(&self) -> &FrameTiming;

    fn stats(&self) -> RendererStats;

    /// Block until the GPU is idle
    fn wait_idle(&mut self) -> Result<()>;

    /// Light matrix used by the shadow pass
    fn set_shadow_view_projection(&mut self, _view_projection: Mat4) {}

    /// Shader whose vertex stage renders the shadow pass; `None` disables it
    fn set_shadow_shader(&mut self, _shader: Option<ShaderRef>) {}
}
