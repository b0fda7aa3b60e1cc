/*!
# Tetra Render - Vulkan backend

Explicit-API backend of the Tetra rendering subsystem, built on `ash` with
`gpu-allocator` for memory and `ash-window` for surfaces.

- frames in flight with per-image fences (`FrameSync`, generic over `SyncDevice`)
- per-frame dynamic uniform rings and growable descriptor pools
- main pass with MSAA resolve, depth-only shadow pass sampled at texture slot 4
- pipelines cached per shader, pass scope, render mode, face and sample count
- swapchain recreation on resize, out-of-date and suboptimal presents

Enable the `vulkan-validation` feature to route validation layer messages
through the tetra logger.

```no_run
use tetra_render::{Renderer, RendererConfig};
use tetra_render_vulkan::VulkanRenderer;
# fn run(window: &winit::window::Window) -> tetra_render::Result<()> {
let mut renderer = VulkanRenderer::new(window, RendererConfig::default())?;
renderer.initialize()?;
# Ok(())
# }
```
*/

mod debug;
mod frame_sync;
mod shadow;
mod vulkan_buffer;
mod vulkan_context;
mod vulkan_convert;
mod vulkan_descriptors;
mod vulkan_pipeline;
mod vulkan_render_context;
mod vulkan_render_pass;
mod vulkan_renderer;
mod vulkan_sampler;
mod vulkan_shader;
mod vulkan_swapchain;
mod vulkan_targets;
mod vulkan_texture;
mod vulkan_uniform_ring;

pub use vulkan_renderer::VulkanRenderer;
pub use vulkan_render_context::{DrawStats, VulkanRenderContext};
pub use vulkan_context::DeviceLimits;
pub use vulkan_buffer::VulkanBuffer;
pub use vulkan_texture::VulkanTexture;
pub use vulkan_shader::VulkanShader;

pub use frame_sync::{AcquireOutcome, BeginOutcome, FrameSync, FrameTicket, PresentOutcome, SyncDevice};

pub use debug::{get_validation_stats, print_validation_stats_report, ValidationStats};
