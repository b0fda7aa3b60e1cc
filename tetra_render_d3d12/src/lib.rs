/*!
# Tetra Render - Direct3D 12 backend

Command-list backend of the Tetra rendering subsystem. Every native call goes
through the [`Dx12Device`] seam. On Windows `NativeDx12Device` drives a real
`ID3D12Device` and DXGI swapchain; [`NullDx12Device`] is the headless test double.

- one command allocator + list per frame slot, reused once the slot's fence value completed
- blocking resource uploads through a dedicated copy list and fence
- root constants for the object transform, root CBVs into a per-frame constant ring
- PSOs cached per shader, pass scope, render mode, face, target and sample count
- depth-only shadow pass sampled at texture slot 4, MSAA resolve into the back buffer

```
use std::sync::Arc;
use tetra_render::{RenderCommandQueue, Renderer, RendererConfig};
use tetra_render_d3d12::{Dx12Renderer, NullDx12Device};

let mut renderer = Dx12Renderer::new(Arc::new(NullDx12Device::new()), RendererConfig::default())?;
renderer.initialize()?;
let queue = RenderCommandQueue::new();
if renderer.begin_render(&queue)?.is_ready() {
    queue.execute_commands(renderer.context());
    renderer.end_render()?;
}
# Ok::<(), tetra_render::Error>(())
```
*/

mod d3d12_buffer;
mod d3d12_constant_ring;
mod d3d12_context;
mod d3d12_convert;
mod d3d12_pipeline;
mod d3d12_render_context;
mod d3d12_renderer;
mod d3d12_shader;
mod d3d12_texture;
mod device;
mod null_device;
#[cfg(windows)]
mod native_device;

pub use d3d12_renderer::Dx12Renderer;
pub use d3d12_render_context::{DrawStats, Dx12RenderContext};
pub use d3d12_buffer::Dx12Buffer;
pub use d3d12_texture::Dx12Texture;
pub use d3d12_shader::Dx12Shader;
pub use d3d12_convert::{hr_err, BACK_BUFFER_FORMAT, DXGI_ERROR_DEVICE_REMOVED};

pub use device::{
    DepthStencilDesc, Dx12Device, GraphicsPipelineDesc, HResult, HeapKind, HrResult, InputElement, ListCommand,
    NativeHandle, QueueKind, RasterizerDesc, ResourceDesc, ResourceState, RootParameter, RootSignatureDesc,
    StaticSampler, SwapchainDesc, ViewKind,
};
#[cfg(windows)]
pub use native_device::NativeDx12Device;
pub use null_device::{NullCounters, NullDx12Device, ObjectKind, Submission};
