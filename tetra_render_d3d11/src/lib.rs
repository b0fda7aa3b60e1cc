/*!
# Tetra Render - Direct3D 11 backend

Immediate-context backend of the Tetra rendering subsystem. Native calls go
through the [`Dx11Device`] seam: `NativeDx11Device` (Windows) forwards them to
`ID3D11Device`, [`NullDx11Device`] records them for headless tests.

- dynamic constant buffers written with map-discard from a CPU shadow copy
- rasterizer, depth-stencil and input-layout objects cached per combination
- state applied as it is bound; pass scopes rebind their snapshot on close
- MSAA color target resolved into the back buffer before present

```
use std::sync::Arc;
use tetra_render::{RenderCommandQueue, Renderer, RendererConfig};
use tetra_render_d3d11::{Dx11Renderer, NullDx11Device};

let mut renderer = Dx11Renderer::new(Arc::new(NullDx11Device::new()), RendererConfig::default());
renderer.initialize()?;
let queue = RenderCommandQueue::new();
if renderer.begin_render(&queue)?.is_ready() {
    queue.execute_commands(renderer.context());
    renderer.end_render()?;
}
# Ok::<(), tetra_render::Error>(())
```
*/

mod d3d11_buffer;
mod d3d11_context;
mod d3d11_convert;
mod d3d11_render_context;
mod d3d11_renderer;
mod d3d11_shader;
mod d3d11_state;
mod d3d11_texture;
mod device;
mod null_device;
#[cfg(windows)]
mod native_device;

pub use d3d11_renderer::Dx11Renderer;
pub use d3d11_render_context::{DrawStats, Dx11RenderContext};
pub use d3d11_buffer::Dx11Buffer;
pub use d3d11_texture::Dx11Texture;
pub use d3d11_shader::Dx11Shader;
pub use d3d11_convert::{hr_err, BACK_BUFFER_FORMAT, DXGI_ERROR_DEVICE_REMOVED};

pub use device::{
    BufferBind, BufferResourceDesc, ContextCall, DepthStencilDesc, Dx11Device, HResult, HrResult, InputElement,
    NativeHandle, RasterizerDesc, SamplerKind, SubresourceData, SwapchainDesc, Texture2DDesc, ViewKind,
};
#[cfg(windows)]
pub use native_device::NativeDx11Device;
pub use null_device::{NullCounters, NullDx11Device, ObjectKind};
