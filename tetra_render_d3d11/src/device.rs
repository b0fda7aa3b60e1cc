/// Dx11Device - the slice of the Direct3D 11 / DXGI API the backend uses
///
/// Object creation goes through `ID3D11Device`; everything that changes
/// pipeline state or draws goes through `call`, one `ContextCall` per
/// immediate-context method. A native implementation forwards each call
/// as it arrives; `NullDx11Device` records and validates them.

/// Native result code (`HRESULT`)
pub type HResult = i32;

/// Result of a native call; the error is the failing `HRESULT`
pub type HrResult<T> = std::result::Result<T, HResult>;

/// Opaque native object (interface pointer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativeHandle(pub u64);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// `D3D11_BIND_*` of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferBind {
    Vertex,
    Index,
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferResourceDesc {
    pub size: u32,
    pub bind: BufferBind,
    /// `D3D11_USAGE_DYNAMIC` with CPU write access; written with `map_discard`
    pub dynamic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture2DDesc {
    pub width: u32,
    pub height: u32,
    pub array_size: u32,
    /// DXGI format
    pub format: u32,
    pub samples: u32,
    pub cube: bool,
    pub shader_resource: bool,
    pub render_target: bool,
    pub depth_stencil: bool,
}

/// Initial contents of one subresource
#[derive(Debug, Clone, Copy)]
pub struct SubresourceData<'a> {
    pub bytes: &'a [u8],
    pub row_pitch: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    RenderTarget { format: u32 },
    DepthStencil { format: u32 },
    ShaderResource { format: u32, cube: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    pub fill_mode: u32,
    pub cull_mode: u32,
    pub multisample: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_func: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    LinearWrap,
    /// Comparison sampler for depth maps
    ShadowCompare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputElement {
    pub semantic: &'static str,
    pub format: u32,
    pub input_slot: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub format: u32,
}

/// One immediate-context call
#[derive(Debug, Clone, PartialEq)]
pub enum ContextCall {
    IASetInputLayout(NativeHandle),
    IASetPrimitiveTopology(u32),
    IASetVertexBuffer { slot: u32, buffer: Option<NativeHandle>, stride: u32 },
    IASetIndexBuffer { buffer: NativeHandle, format: u32 },
    VSSetShader(NativeHandle),
    /// None for depth-only rendering
    PSSetShader(Option<NativeHandle>),
    VSSetConstantBuffer { slot: u32, buffer: Option<NativeHandle> },
    PSSetConstantBuffer { slot: u32, buffer: Option<NativeHandle> },
    PSSetShaderResources { start_slot: u32, views: Vec<NativeHandle> },
    PSSetSamplers { start_slot: u32, samplers: Vec<NativeHandle> },
    RSSetState(NativeHandle),
    RSSetViewport { width: u32, height: u32 },
    OMSetDepthStencilState(NativeHandle),
    OMSetRenderTargets { rtv: Option<NativeHandle>, dsv: Option<NativeHandle> },
    ClearRenderTargetView { rtv: NativeHandle, color: [f32; 4] },
    ClearDepthStencilView { dsv: NativeHandle, depth: f32 },
    DrawInstanced { vertex_count: u32, instance_count: u32 },
    DrawIndexedInstanced { index_count: u32, instance_count: u32 },
    ResolveSubresource { dst: NativeHandle, src: NativeHandle, format: u32 },
}

pub trait Dx11Device: Send + Sync {
    fn adapter_name(&self) -> String;

    /// Highest supported MSAA count for render targets of `format`
    fn max_sample_count(&self, format: u32) -> u32;

    // ===== OBJECTS =====

    fn create_buffer(&self, label: &str, desc: &BufferResourceDesc, initial: Option<&[u8]>) -> HrResult<NativeHandle>;

    /// `UpdateSubresource` on a default-usage buffer
    fn update_subresource(&self, buffer: NativeHandle, offset: u32, data: &[u8]) -> HrResult<()>;

    /// `Map(WRITE_DISCARD)`, copy, `Unmap` on a dynamic buffer
    fn map_discard(&self, buffer: NativeHandle, data: &[u8]) -> HrResult<()>;

    fn create_texture2d(
        &self,
        label: &str,
        desc: &Texture2DDesc,
        initial: &[SubresourceData<'_>],
    ) -> HrResult<NativeHandle>;

    fn create_view(&self, resource: NativeHandle, kind: ViewKind) -> HrResult<NativeHandle>;

    fn create_rasterizer_state(&self, desc: &RasterizerDesc) -> HrResult<NativeHandle>;

    fn create_depth_stencil_state(&self, desc: &DepthStencilDesc) -> HrResult<NativeHandle>;

    fn create_sampler_state(&self, kind: SamplerKind) -> HrResult<NativeHandle>;

    fn create_vertex_shader(&self, bytecode: &[u8]) -> HrResult<NativeHandle>;

    fn create_pixel_shader(&self, bytecode: &[u8]) -> HrResult<NativeHandle>;

    /// Validated against the vertex shader's input signature
    fn create_input_layout(&self, elements: &[InputElement], vertex_bytecode: &[u8]) -> HrResult<NativeHandle>;

    /// Drop one reference to a native object or view
    fn release(&self, handle: NativeHandle);

    // ===== IMMEDIATE CONTEXT =====

    fn call(&self, call: ContextCall);

    /// `Flush` plus a wait on an event query: returns once queued work finished
    fn flush(&self) -> HrResult<()>;

    // ===== SWAPCHAIN =====

    fn create_swapchain(&self, desc: &SwapchainDesc) -> HrResult<NativeHandle>;

    /// New reference to the current back buffer; must be released before `resize_buffers`
    fn swapchain_buffer(&self, swapchain: NativeHandle) -> HrResult<NativeHandle>;

    fn resize_buffers(&self, swapchain: NativeHandle, width: u32, height: u32) -> HrResult<()>;

    fn present(&self, swapchain: NativeHandle, sync_interval: u32) -> HrResult<()>;
}
