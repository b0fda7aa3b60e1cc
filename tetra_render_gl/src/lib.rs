/*!
# Tetra Render - OpenGL backend

OpenGL 4.5 core backend of the Tetra rendering subsystem. Entry points go
through the [`GlApi`] seam: [`NativeGl`] creates a real context on a window
with `glutin` and loads the driver through the `gl` bindings; [`NullGl`] is
the headless test double.

- direct-state-access object creation, so uploads never disturb bindings
- uniform buffers on binding points 0..5, material textures on units 0..4
- one vertex array object per vertex layout, buffers attached per draw
- MSAA through a multisampled framebuffer blitted to the window surface

```
use std::sync::Arc;
use tetra_render::{RenderCommandQueue, Renderer, RendererConfig};
use tetra_render_gl::{GlRenderer, NullGl};

let mut renderer = GlRenderer::new(Arc::new(NullGl::new()), RendererConfig::default());
renderer.initialize()?;
let queue = RenderCommandQueue::new();
if renderer.begin_render(&queue)?.is_ready() {
    queue.execute_commands(renderer.context());
    renderer.end_render()?;
}
# Ok::<(), tetra_render::Error>(())
```
*/

mod api;
mod gl_buffer;
mod gl_context;
mod gl_convert;
mod gl_render_context;
mod gl_renderer;
mod gl_shader;
mod gl_texture;
mod gl_vertex_array;
mod native_gl;
mod null_gl;

pub use gl_renderer::GlRenderer;
pub use gl_render_context::{DrawStats, GlRenderContext};
pub use gl_buffer::GlBuffer;
pub use gl_texture::GlTexture;
pub use gl_shader::GlShader;
pub use gl_convert::{check_error, error_name, gl_err, GL_CONTEXT_LOST, GL_NO_ERROR, GL_OUT_OF_MEMORY};

pub use api::{GlApi, GlEnum, GlName};
pub use native_gl::NativeGl;
pub use null_gl::{NullCounters, NullGl, ObjectKind};
