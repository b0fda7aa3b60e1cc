//! Frame-loop driver
//!
//! Connects an injected `RenderCommandQueue` to a `Renderer` once per frame,
//! and routes the window notifications the renderer reacts to.

use crate::command::{DrainReport, RenderCommandQueue};
use crate::error::Result;
use crate::renderer::{FrameStatus, Renderer};

const SOURCE: &str = "tetra::frame";

/// Window notifications routed to `Renderer::resize`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    Resized { width: u32, height: u32 },
    FullscreenToggled { width: u32, height: u32 },
    Minimized,
}

/// What happened to one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOutcome {
    pub status: FrameStatus,
    /// Present when the queue was drained
    pub report: Option<DrainReport>,
}

/// Render one frame: begin, drain the queue, end
///
/// A skipped frame discards the pending commands; the producers resubmit
/// next frame from scene state, so nothing is carried over.
pub fn render_frame(renderer: &mut dyn Renderer, queue: &RenderCommandQueue) -> Result<FrameOutcome> {
    let status = renderer.begin_render(queue)?;
    if let FrameStatus::Skipped(reason) = status {
        crate::render_debug!(SOURCE, "Frame skipped ({:?}), discarding {} commands", reason, queue.len());
        queue.clear();
        return Ok(FrameOutcome { status, report: None });
    }

    queue.sort_commands();
    queue.optimize_batching();
    let report = queue.execute_commands(renderer.context());

    let status = renderer.end_render()?;
    Ok(FrameOutcome { status, report: Some(report) })
}

/// Route a window notification to the renderer
pub fn handle_window_event(renderer: &mut dyn Renderer, event: WindowEvent) -> Result<()> {
    match event {
        WindowEvent::Resized { width, height } | WindowEvent::FullscreenToggled { width, height } => {
            crate::render_debug!(SOURCE, "{:?}", event);
            renderer.resize(width, height)
        }
        WindowEvent::Minimized => renderer.resize(0, 0),
    }
}

#[cfg(test)]
#[path = "frame_loop_tests.rs"]
mod tests;
