//! Windowed cube demo on the native drivers
//!
//! winit owns the loop: every redraw submits the scene and runs one frame,
//! window resizes and minimizes go through `handle_window_event`.

use std::time::Instant;
use tetra_render::frame_loop::{handle_window_event, render_frame, WindowEvent};
use tetra_render::{Error, FrameStatus, RenderCommandQueue, Renderer, Result, ShaderDesc, SkipReason};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent as WinitEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use crate::any_renderer::AnyRenderer;
use crate::demo::{demo_config, demo_shader, DemoOptions, DemoSummary};
use crate::factory::{create_windowed_renderer, Drivers};
use crate::scene::CubeScene;

const SOURCE: &str = "tetra::demo";

/// Translate a winit size into the renderer's window event
pub fn resize_event(width: u32, height: u32) -> WindowEvent {
    if width == 0 || height == 0 {
        WindowEvent::Minimized
    } else {
        WindowEvent::Resized { width, height }
    }
}

struct Running {
    // Dropped before the renderer is cleaned up
    scene: Option<CubeScene>,
    renderer: AnyRenderer,
    window: Window,
}

struct DemoApp<'a> {
    options: &'a DemoOptions,
    shader: ShaderDesc,
    queue: RenderCommandQueue,
    running: Option<Running>,
    started: Instant,
    frame: u64,
    summary: DemoSummary,
    error: Option<Error>,
}

impl DemoApp<'_> {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let config = demo_config();
        let attributes = Window::default_attributes()
            .with_title(format!("tetra-demo ({})", self.options.backend))
            .with_inner_size(PhysicalSize::new(config.width, config.height));
        let window = event_loop
            .create_window(attributes)
            .map_err(|e| Error::InitializationFailed(format!("Failed to create window: {}", e)))?;

        let mut renderer = create_windowed_renderer(self.options.backend, &window, config, &Drivers::default())?;
        renderer.initialize()?;
        tetra_render::render_info!(
            SOURCE,
            "{} renderer ready, {}x MSAA",
            renderer.backend(), renderer.msaa_samples()
        );
        let scene = CubeScene::create(renderer.context(), &self.shader)?;

        window.request_redraw();
        self.started = Instant::now();
        self.running = Some(Running { scene: Some(scene), renderer, window });
        Ok(())
    }

    fn resized(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };
        handle_window_event(&mut running.renderer, resize_event(size.width, size.height))?;
        running.window.request_redraw();
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };
        if let Some(scene) = &running.scene {
            scene.submit(&self.queue, self.started.elapsed().as_secs_f32());
        }
        let outcome = render_frame(&mut running.renderer, &self.queue)?;
        self.summary.record(&outcome, running.renderer.stats().draw_calls);
        self.frame += 1;

        if self.options.frames.is_some_and(|frames| self.frame >= frames) {
            event_loop.exit();
        } else if outcome.status != FrameStatus::Skipped(SkipReason::Minimized) {
            // A minimized window redraws again once it is resized
            running.window.request_redraw();
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        tetra_render::render_error!(SOURCE, "{}", error);
        self.error.get_or_insert(error);
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        drop(running.scene.take());
        if let Err(e) = running.renderer.wait_idle() {
            tetra_render::render_warn!(SOURCE, "wait_idle before cleanup failed: {}", e);
        }
        running.renderer.cleanup();
        tetra_render::render_info!(
            SOURCE,
            "Done: {} presented, {} skipped, {} draws, {} failed commands",
            self.summary.presented_frames,
            self.summary.skipped_frames,
            self.summary.draw_calls,
            self.summary.failed_commands
        );
    }
}

impl ApplicationHandler for DemoApp<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() || self.error.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window: WindowId, event: WinitEvent) {
        let result = match event {
            WinitEvent::CloseRequested => {
                event_loop.exit();
                Ok(())
            }
            WinitEvent::Resized(size) => self.resized(size),
            WinitEvent::RedrawRequested => self.redraw(event_loop),
            _ => Ok(()),
        };
        if let Err(e) = result {
            self.fail(event_loop, e);
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

/// Open a window and render the cube scene on the backend's native driver
///
/// Runs until the window is closed, or for `options.frames` frames.
pub fn run_windowed_demo(options: &DemoOptions) -> Result<DemoSummary> {
    let shader = demo_shader(options)?;
    let event_loop =
        EventLoop::new().map_err(|e| Error::InitializationFailed(format!("No event loop: {}", e)))?;

    let mut app = DemoApp {
        options,
        shader,
        queue: RenderCommandQueue::new(),
        running: None,
        started: Instant::now(),
        frame: 0,
        summary: DemoSummary::default(),
        error: None,
    };
    let run = event_loop.run_app(&mut app);
    app.shutdown();
    run.map_err(|e| Error::BackendError(format!("Event loop failed: {}", e)))?;

    match app.error.take() {
        Some(error) => Err(error),
        None => Ok(app.summary),
    }
}

#[cfg(test)]
#[path = "windowed_tests.rs"]
mod tests;
