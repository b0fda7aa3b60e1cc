/// GlRenderer - OpenGL 4.5 implementation of the Renderer trait
///
/// The window system owns the default framebuffer, so there is no swapchain
/// to build: `initialize` only sets the swap interval and, with MSAA, a
/// multisampled framebuffer that `end_render` blits into framebuffer 0
/// before swapping. GL reports failures through its error flag; the flag is
/// drained once per frame and a lost context ends the renderer.
///
/// Shadows are not rendered on this backend; unit 4 samples as fully lit.

use std::sync::Arc;
use tetra_render::{
    BackendKind, Error, FrameStatus, FrameTiming, Lifecycle, LifecycleState, RenderCommandQueue, RenderContext,
    Renderer, RendererConfig, RendererStats, Result, SkipReason,
};

use crate::api::{GlApi, GlName};
use crate::gl_context::GpuContext;
use crate::gl_convert::*;
use crate::gl_render_context::GlRenderContext;

const SOURCE: &str = "tetra::gl";

/// Flags read per drain; GL_CONTEXT_LOST repeats forever
const MAX_DRAINED_ERRORS: usize = 16;

/// Multisampled color + depth framebuffer of the main pass
#[derive(Debug, Clone, Copy)]
struct MsaaTarget {
    framebuffer: GlName,
    color: GlName,
    depth: GlName,
}

impl MsaaTarget {
    fn create(api: &dyn GlApi, samples: u32, width: u32, height: u32) -> Result<Self> {
        let target = Self {
            framebuffer: api.create_framebuffer(),
            color: api.create_renderbuffer(),
            depth: api.create_renderbuffer(),
        };
        if let Err(e) = target.build(api, samples, width, height) {
            target.release(api);
            return Err(e);
        }
        Ok(target)
    }

    fn build(&self, api: &dyn GlApi, samples: u32, width: u32, height: u32) -> Result<()> {
        api.named_renderbuffer_storage_multisample(self.color, samples, MSAA_COLOR_FORMAT, width, height);
        api.named_renderbuffer_storage_multisample(self.depth, samples, GL_DEPTH_COMPONENT32F, width, height);
        api.named_framebuffer_renderbuffer(self.framebuffer, GL_COLOR_ATTACHMENT0, self.color);
        api.named_framebuffer_renderbuffer(self.framebuffer, GL_DEPTH_ATTACHMENT, self.depth);
        check_error(api, SOURCE, "Failed to create MSAA framebuffer")?;

        let status = api.check_named_framebuffer_status(self.framebuffer);
        if status != GL_FRAMEBUFFER_COMPLETE {
            return Err(tetra_render::render_err!(SOURCE, "MSAA framebuffer incomplete: status 0x{:04X}", status));
        }
        Ok(())
    }

    fn release(self, api: &dyn GlApi) {
        api.delete_framebuffer(self.framebuffer);
        api.delete_renderbuffer(self.color);
        api.delete_renderbuffer(self.depth);
    }
}

/// Everything built by `initialize` and torn down by `cleanup`
struct Presentation {
    samples: u32,
    width: u32,
    height: u32,
    msaa: Option<MsaaTarget>,
}

impl Presentation {
    fn create(api: &dyn GlApi, samples: u32, width: u32, height: u32) -> Result<Self> {
        let msaa = if samples > 1 {
            api.enable(GL_MULTISAMPLE);
            Some(MsaaTarget::create(api, samples, width, height)?)
        } else {
            None
        };
        Ok(Self { samples, width, height, msaa })
    }

    /// Framebuffer the main pass draws into
    fn draw_framebuffer(&self) -> GlName {
        self.msaa.map_or(0, |target| target.framebuffer)
    }

    fn destroy(&mut self, api: &dyn GlApi) {
        api.bind_framebuffer(GL_FRAMEBUFFER, 0);
        if let Some(target) = self.msaa.take() {
            target.release(api);
        }
    }
}

pub struct GlRenderer {
    config: RendererConfig,
    lifecycle: Lifecycle,
    timing: FrameTiming,
    stats: RendererStats,

    gpu: Arc<GpuContext>,
    context: GlRenderContext,
    presentation: Option<Presentation>,

    width: u32,
    height: u32,
    minimized: bool,
    /// Rebuild the MSAA target before the next frame
    targets_dirty: bool,
}

impl GlRenderer {
    /// Wrap a GL context that is current on this thread
    pub fn new(api: Arc<dyn GlApi>, config: RendererConfig) -> Self {
        if config.enable_validation {
            tetra_render::render_debug!(SOURCE, "Validation requested; debug output belongs to the context creator");
        }
        tetra_render::render_info!(SOURCE, "OpenGL renderer '{}'", api.renderer_name());
        let gpu = GpuContext::new(api);
        Self {
            width: config.width,
            height: config.height,
            config,
            lifecycle: Lifecycle::new(),
            timing: FrameTiming::new(),
            stats: RendererStats::default(),
            context: GlRenderContext::new(Arc::clone(&gpu)),
            gpu,
            presentation: None,
            minimized: false,
            targets_dirty: false,
        }
    }

    /// Read every pending error flag; loss and exhaustion are fatal
    fn drain_errors(&self) -> Result<()> {
        let api = self.gpu.api.as_ref();
        for _ in 0..MAX_DRAINED_ERRORS {
            match api.get_error() {
                GL_NO_ERROR => return Ok(()),
                code @ (GL_CONTEXT_LOST | GL_OUT_OF_MEMORY) => return Err(gl_err(SOURCE, "Frame", code)),
                code => {
                    tetra_render::render_warn!(SOURCE, "GL error during frame: {} (0x{:04X})", error_name(code), code);
                }
            }
        }
        Ok(())
    }

    fn recreate_targets(&mut self) -> Result<()> {
        let Some(presentation) = self.presentation.as_mut() else {
            return Ok(());
        };
        let api = self.gpu.api.as_ref();
        api.resize_surface(self.width, self.height);
        if let Some(target) = presentation.msaa.take() {
            api.bind_framebuffer(GL_FRAMEBUFFER, 0);
            target.release(api);
            presentation.msaa = Some(MsaaTarget::create(api, presentation.samples, self.width, self.height)?);
        }
        presentation.width = self.width;
        presentation.height = self.height;
        self.targets_dirty = false;

        tetra_render::render_debug!(SOURCE, "Targets resized to {}x{}", self.width, self.height);
        Ok(())
    }

    fn start_frame(&mut self) -> Result<FrameStatus> {
        if self.minimized {
            return Ok(FrameStatus::Skipped(SkipReason::Minimized));
        }
        if self.targets_dirty {
            self.recreate_targets()?;
        }

        let presentation = self
            .presentation
            .as_ref()
            .ok_or_else(|| Error::InvalidState("begin_render before initialize".to_string()))?;
        let api = self.gpu.api.as_ref();

        api.bind_framebuffer(GL_FRAMEBUFFER, presentation.draw_framebuffer());
        api.viewport(presentation.width, presentation.height);
        // Depth clears honor the write mask
        api.depth_mask(true);
        api.clear_color(self.config.clear_color);
        api.clear_depth(1.0);
        api.clear(GL_COLOR_BUFFER_BIT | GL_DEPTH_BUFFER_BIT);
        self.context.begin_frame()?;
        Ok(FrameStatus::Ready)
    }

    /// Samples actually used by the main target (after clamping to context support)
    pub fn msaa_samples(&self) -> u32 {
        self.presentation.as_ref().map_or_else(
            || self.config.msaa_samples(self.gpu.api.max_samples()),
            |p| p.samples,
        )
    }
}

impl Renderer for GlRenderer {
    fn backend(&self) -> BackendKind {
        BackendKind::OpenGl
    }

    fn initialize(&mut self) -> Result<()> {
        if self.lifecycle.state() != LifecycleState::Uninitialized {
            return self.lifecycle.initialized();
        }
        let api = self.gpu.api.as_ref();
        api.swap_interval(u32::from(self.config.vsync));
        let samples = self.config.msaa_samples(api.max_samples());
        let mut presentation = Presentation::create(api, samples, self.width, self.height)?;
        if let Err(e) = self.context.init_frame_resources() {
            presentation.destroy(api);
            return Err(e);
        }

        tetra_render::render_info!(
            SOURCE,
            "Initialized: {}x{}, {}x MSAA",
            presentation.width, presentation.height, presentation.samples
        );
        if self.config.shadow.enabled {
            tetra_render::render_debug!(SOURCE, "Shadow mapping is not implemented on OpenGL; scenes render unshadowed");
        }
        self.presentation = Some(presentation);
        self.lifecycle.initialized()
    }

    fn begin_render(&mut self, _queue: &RenderCommandQueue) -> Result<FrameStatus> {
        self.lifecycle.begin()?;
        self.stats.reset_frame();

        match self.start_frame() {
            Ok(FrameStatus::Ready) => Ok(FrameStatus::Ready),
            Ok(FrameStatus::Skipped(reason)) => {
                self.lifecycle.abandon_frame();
                self.stats.skipped_frames += 1;
                tetra_render::render_debug!(SOURCE, "Frame skipped: {:?}", reason);
                Ok(FrameStatus::Skipped(reason))
            }
            Err(e) => {
                self.context.abandon_frame();
                self.lifecycle.abandon_frame();
                Err(e)
            }
        }
    }

    fn end_render(&mut self) -> Result<FrameStatus> {
        self.lifecycle.end()?;
        let draws = self.context.end_frame();
        self.stats.draw_calls = draws.draw_calls;
        self.stats.pipeline_binds = draws.pipeline_binds;
        self.stats.descriptor_allocations = draws.descriptor_allocations;

        let Some(presentation) = self.presentation.as_ref() else {
            return Err(Error::InvalidState("end_render before initialize".to_string()));
        };
        let api = self.gpu.api.as_ref();
        if let Some(target) = presentation.msaa {
            api.blit_named_framebuffer(
                target.framebuffer,
                0,
                presentation.width,
                presentation.height,
                GL_COLOR_BUFFER_BIT,
                GL_NEAREST,
            );
        }
        api.swap_buffers();
        self.drain_errors()?;

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
        self.targets_dirty = true;
        // The MSAA framebuffer is bound until end_render
        if self.lifecycle.state() == LifecycleState::Initialized {
            self.recreate_targets()?;
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

        let api = self.gpu.api.as_ref();
        if let Some(mut presentation) = self.presentation.take() {
            presentation.destroy(api);
        }
        self.context.destroy();
        api.finish();
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
        stats.live_sync_objects = 0;
        stats.cached_pipelines = self.context.cached_vertex_arrays() as u32;
        stats
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.gpu.require_alive("wait_idle")?;
        let api = self.gpu.api.as_ref();
        api.finish();
        check_error(api, SOURCE, "glFinish")
    }
}

impl Drop for GlRenderer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
#[path = "gl_renderer_tests.rs"]
mod tests;
