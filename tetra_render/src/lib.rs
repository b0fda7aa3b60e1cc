/*!
# Tetra Render

Core contract of the Tetra rendering subsystem.

One logical graphics API implemented independently by several native backends.
This crate holds everything the backends share:

- **RenderCommand / RenderCommandQueue**: deferred "what to draw", drained once per frame
- **RenderContext**: state changes, resource creation and draw submission for the current frame
- **Renderer**: device/swapchain lifecycle and frame timing
- **Buffer / Texture / Shader**: shared, refcounted resource handles
- **layout**: bit-exact vertex and constant-buffer layouts shared with compiled shaders

Backend crates provide concrete `Renderer` + `RenderContext` + resource families.
*/

mod error;
pub mod log;
pub mod layout;
pub mod resource;
pub mod context;
pub mod command;
pub mod renderer;
pub mod frame_loop;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use crate::error::{Error, Result};

pub use crate::resource::{
    GpuResource, ResourceId, AliveFlag, ResourceTracker, HostData,
    Buffer, BufferRef, BufferDesc, BufferUsage, IndexFormat,
    Texture, TextureRef, TextureDesc, TextureData, TextureFormat, TextureKind,
    Shader, ShaderRef, ShaderDesc, ShaderStageDesc, VertexLayout,
};

pub use crate::context::{
    RenderContext, RenderMode, RenderFace, CullMode, PrimitiveTopology, CompareOp, DepthState,
    PassKind, PipelineState, RasterKey, ScopeStack, DirtyFlags,
};

pub use crate::command::{
    RenderCommand, CommandPayload, CommandKind, OwnerId,
    DrawCommand, DrawIndexedCommand, UpdateConstantBufferCommand, BindConstantBufferCommand,
    BindTextureCommand, BindShaderCommand, SetRenderModeCommand, SetRenderFaceCommand,
    CustomCommand, RenderCommandQueue, DrainReport,
};

pub use crate::renderer::{
    Renderer, RendererConfig, ShadowConfig, RendererStats, BackendKind,
    FrameStatus, SkipReason, Lifecycle, LifecycleState, FrameTiming,
};

// Re-export math library at crate root
pub use glam;
