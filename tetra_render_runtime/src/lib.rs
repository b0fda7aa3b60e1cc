/*!
# Tetra Render - runtime

Backend selection for applications built on the Tetra rendering subsystem.
The backend is chosen once at process start, from `--backend <name>` or the
platform default, and the resulting renderer is a closed [`AnyRenderer`]
enum over the four native backends.

```no_run
use tetra_render::{BackendKind, RenderCommandQueue, Renderer, RendererConfig};
use tetra_render_runtime::{create_windowed_renderer, Drivers};

# fn run(window: &winit::window::Window) -> tetra_render::Result<()> {
let config = RendererConfig::default();
let mut renderer = create_windowed_renderer(BackendKind::OpenGl, window, config, &Drivers::default())?;
renderer.initialize()?;
let queue = RenderCommandQueue::new();
tetra_render::frame_loop::render_frame(&mut renderer, &queue)?;
# Ok(())
# }
```

A windowed renderer opens the native driver: Vulkan, OpenGL through glutin,
and on Windows Direct3D 12 and 11. [`Drivers::headless`] injects the
recording test doubles instead; [`create_renderer`] has no window and no
driver, so it only reports `InitializationFailed`.
*/

mod any_renderer;
mod demo;
mod factory;
mod scene;
mod windowed;

pub use any_renderer::AnyRenderer;
pub use factory::{create_renderer, create_renderer_with, create_windowed_renderer, Drivers};
pub use scene::{cube_mesh, CubeScene};
pub use demo::{demo_shader, headless_shader, run_demo, DemoOptions, DemoSummary};
pub use windowed::{resize_event, run_windowed_demo};
