//! Cube demo
//!
//! Options shared by both runs, plus the headless run: the cube scene goes
//! through the frame loop on the recording drivers, with a resize and a
//! minimize partway through. The windowed run lives in `windowed`.

use std::path::PathBuf;
use tetra_render::frame_loop::{handle_window_event, render_frame, FrameOutcome, WindowEvent};
use tetra_render::{
    BackendKind, Error, RenderCommandQueue, Renderer, RendererConfig, Result, ShaderDesc, ShaderStageDesc,
    VertexLayout,
};

use crate::factory::{create_renderer_with, Drivers};
use crate::scene::CubeScene;

const SOURCE: &str = "tetra::demo";

const DEFAULT_FRAMES: u64 = 120;

/// Seconds of scene time per frame
const FRAME_STEP: f32 = 1.0 / 60.0;

const VERTEX_GLSL: &str = "#version 450
layout(location = 0) in vec3 position;
layout(std140, binding = 0) uniform Object { mat4 world; mat4 normal_matrix; };
void main() { gl_Position = world * vec4(position, 1.0); }
";

const FRAGMENT_GLSL: &str = "#version 450
out vec4 color;
void main() { color = vec4(0.8, 0.5, 0.2, 1.0); }
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoOptions {
    pub backend: BackendKind,
    /// Frames to render; the windowed run goes until closed when unset
    pub frames: Option<u64>,
    /// Run on the recording drivers instead of opening a window
    pub headless: bool,
    /// Compiled stages for backends without built-in demo shaders
    pub vertex_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
}

impl DemoOptions {
    /// Windowed run of `backend` until the window is closed
    pub fn new(backend: BackendKind) -> Self {
        Self { backend, frames: None, headless: false, vertex_shader: None, fragment_shader: None }
    }

    /// Parse `--backend <name>`, `--frames <n>`, `--headless`,
    /// `--vertex <file>` and `--fragment <file>`
    ///
    /// Without `--backend` the platform default is used, except that Vulkan
    /// (which has no built-in demo shaders) falls back to OpenGL.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|arg| arg.as_ref().to_string()).collect();
        let explicit = args.iter().any(|arg| arg == "--backend" || arg.starts_with("--backend="));
        let backend = match BackendKind::from_args(&args)? {
            BackendKind::Vulkan if !explicit => BackendKind::OpenGl,
            kind => kind,
        };

        let mut options = Self::new(backend);
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "--headless" {
                options.headless = true;
                continue;
            }
            let (name, inline) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg.as_str(), None),
            };
            if !matches!(name, "--frames" | "--vertex" | "--fragment") {
                continue;
            }
            let value = match inline {
                Some(value) => value,
                None => iter
                    .next()
                    .map(String::as_str)
                    .ok_or_else(|| Error::InvalidState(format!("{} expects a value", name)))?,
            };
            match name {
                "--frames" => {
                    let frames = value
                        .parse()
                        .map_err(|_| Error::InvalidState(format!("Invalid frame count '{}'", value)))?;
                    options.frames = Some(frames);
                }
                "--vertex" => options.vertex_shader = Some(PathBuf::from(value)),
                _ => options.fragment_shader = Some(PathBuf::from(value)),
            }
        }
        Ok(options)
    }

    /// Frames of a headless run
    pub fn headless_frames(&self) -> u64 {
        self.frames.unwrap_or(DEFAULT_FRAMES)
    }
}

/// What a demo run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemoSummary {
    pub presented_frames: u64,
    pub skipped_frames: u64,
    pub draw_calls: u64,
    pub failed_commands: u64,
}

/// Shader stages the headless drivers accept for `kind`
///
/// D3D stages are empty DXBC containers; the headless drivers only check
/// the container header.
pub fn headless_shader(kind: BackendKind) -> Result<ShaderDesc> {
    let (vertex, fragment) = match kind {
        BackendKind::Vulkan => {
            return Err(Error::InvalidState("the vulkan backend has no headless driver".to_string()));
        }
        BackendKind::D3D12 | BackendKind::D3D11 => (dxbc_container(), dxbc_container()),
        BackendKind::OpenGl => (VERTEX_GLSL.as_bytes().to_vec(), FRAGMENT_GLSL.as_bytes().to_vec()),
    };
    Ok(ShaderDesc {
        label: "cube".to_string(),
        vertex: ShaderStageDesc::new(vertex),
        fragment: ShaderStageDesc::new(fragment),
        layout: VertexLayout::Standard,
    })
}

fn dxbc_container() -> Vec<u8> {
    let mut bytes = b"DXBC".to_vec();
    bytes.resize(128, 0);
    bytes
}

/// Shader stages for a windowed run
///
/// Stage files given on the command line win. Otherwise only OpenGL has
/// built-in stages, since the GLSL is compiled by the driver.
pub fn demo_shader(options: &DemoOptions) -> Result<ShaderDesc> {
    let (vertex, fragment) = match (&options.vertex_shader, &options.fragment_shader) {
        (Some(vertex), Some(fragment)) => (read_stage(vertex)?, read_stage(fragment)?),
        (None, None) if options.backend == BackendKind::OpenGl => {
            (VERTEX_GLSL.as_bytes().to_vec(), FRAGMENT_GLSL.as_bytes().to_vec())
        }
        _ => {
            return Err(Error::InitializationFailed(format!(
                "the {} demo needs --vertex and --fragment with compiled stages",
                options.backend
            )));
        }
    };
    Ok(ShaderDesc {
        label: "cube".to_string(),
        vertex: ShaderStageDesc::new(vertex),
        fragment: ShaderStageDesc::new(fragment),
        layout: VertexLayout::Standard,
    })
}

fn read_stage(path: &PathBuf) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| Error::InitializationFailed(format!("Cannot read shader stage {}: {}", path.display(), e)))
}

pub(crate) fn demo_config() -> RendererConfig {
    RendererConfig { app_name: "tetra-demo".to_string(), ..RendererConfig::default() }
}

impl DemoSummary {
    /// Count one frame the frame loop handled
    pub(crate) fn record(&mut self, outcome: &FrameOutcome, draw_calls: u32) {
        match &outcome.report {
            Some(report) => {
                self.presented_frames += 1;
                self.failed_commands += report.failed as u64;
                self.draw_calls += u64::from(draw_calls);
            }
            None => self.skipped_frames += 1,
        }
    }
}

/// Render the cube scene on the recording drivers, then clean up
pub fn run_demo(options: &DemoOptions) -> Result<DemoSummary> {
    let config = demo_config();
    let (width, height) = (config.width, config.height);
    let frames = options.headless_frames();
    let mut renderer = create_renderer_with(options.backend, config, &Drivers::headless())?;
    renderer.initialize()?;
    tetra_render::render_info!(
        SOURCE,
        "{} renderer ready (headless), {}x MSAA, {} frames",
        renderer.backend(), renderer.msaa_samples(), frames
    );

    let scene = CubeScene::create(renderer.context(), &headless_shader(options.backend)?)?;
    let queue = RenderCommandQueue::new();
    let mut summary = DemoSummary::default();

    for frame in 0..frames {
        if let Some(event) = scripted_event(frame, frames, width, height) {
            handle_window_event(&mut renderer, event)?;
        }

        scene.submit(&queue, frame as f32 * FRAME_STEP);
        let outcome = render_frame(&mut renderer, &queue)?;
        summary.record(&outcome, renderer.stats().draw_calls);
    }

    renderer.wait_idle()?;
    tetra_render::render_info!(
        SOURCE,
        "Done: {} presented, {} skipped, {} draws, {} failed commands",
        summary.presented_frames, summary.skipped_frames, summary.draw_calls, summary.failed_commands
    );
    drop(scene);
    renderer.cleanup();
    Ok(summary)
}

/// Window events replayed at fixed points of the run
fn scripted_event(frame: u64, frames: u64, width: u32, height: u32) -> Option<WindowEvent> {
    let half = frames / 2;
    if frames < 4 {
        None
    } else if frame == frames / 4 {
        Some(WindowEvent::Resized { width: width / 2, height: height / 2 })
    } else if frame == half {
        Some(WindowEvent::Minimized)
    } else if frame == half + 1 {
        Some(WindowEvent::Resized { width, height })
    } else {
        None
    }
}

#[cfg(test)]
#[path = "demo_tests.rs"]
mod tests;
