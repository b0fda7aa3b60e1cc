/// Dx12Device - the slice of the Direct3D 12 / DXGI API the backend uses
///
/// The renderer never touches native interfaces directly: every object it
/// creates, every fence it signals and every call it records into a command
/// list goes through this trait. A native implementation wraps
/// `ID3D12Device`, its queues and `IDXGISwapChain3`; `NullDx12Device` is the
/// headless driver used by the tests and the demo.
///
/// Command lists are created closed. Recording happens between
/// `reset_command_list` and `close_command_list`; errors in recorded calls
/// surface at close, as they do natively.

/// Native result code (`HRESULT`)
pub type HResult = i32;

/// Result of a native call; the error is the failing `HRESULT`
pub type HrResult<T> = std::result::Result<T, HResult>;

/// Opaque native object: interface pointer or CPU descriptor handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativeHandle(pub u64);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Direct,
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// GPU-local, written through the copy queue
    Default,
    /// CPU-writable, read by the GPU across PCIe
    Upload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    CopyDest,
    CopySource,
    GenericRead,
    PixelShaderResource,
    RenderTarget,
    DepthWrite,
    ResolveSource,
    ResolveDest,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceDesc {
    Buffer {
        size: u64,
    },
    Texture2D {
        width: u32,
        height: u32,
        array_size: u32,
        /// DXGI format
        format: u32,
        samples: u32,
        render_target: bool,
        depth_stencil: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    RenderTarget { format: u32 },
    DepthStencil { format: u32 },
    ShaderResource { format: u32, cube: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub format: u32,
}

// ===== ROOT SIGNATURE / PIPELINE =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootParameter {
    /// 32-bit values copied into the command list (`b{register}`)
    Constants { register: u32, values: u32 },
    /// Root CBV addressing an upload-heap range (`b{register}`)
    ConstantBufferView { register: u32 },
    /// Descriptor table of SRVs `t{base}..t{base + count}`
    ShaderResourceTable { base_register: u32, count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticSampler {
    pub register: u32,
    /// Comparison sampler (shadow map) instead of linear-wrap
    pub comparison: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSignatureDesc {
    pub parameters: Vec<RootParameter>,
    pub static_samplers: Vec<StaticSampler>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputElement {
    pub semantic: &'static str,
    pub format: u32,
    pub input_slot: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    pub fill_mode: u32,
    pub cull_mode: u32,
    pub depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_func: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDesc<'a> {
    pub label: &'a str,
    pub root_signature: NativeHandle,
    pub vertex_shader: &'a [u8],
    /// None for depth-only pipelines
    pub pixel_shader: Option<&'a [u8]>,
    pub input_layout: Vec<InputElement>,
    pub rasterizer: RasterizerDesc,
    pub depth_stencil: DepthStencilDesc,
    pub topology_type: u32,
    pub rtv_format: Option<u32>,
    pub dsv_format: u32,
    pub sample_count: u32,
}

// ===== COMMAND LIST CALLS =====

/// One call recorded into a graphics or copy command list
#[derive(Debug, Clone, PartialEq)]
pub enum ListCommand {
    ResourceBarrier { resource: NativeHandle, before: ResourceState, after: ResourceState },
    CopyBufferRegion { dst: NativeHandle, dst_offset: u64, src: NativeHandle, src_offset: u64, size: u64 },
    CopyTextureRegion { dst: NativeHandle, subresource: u32, src: NativeHandle, src_offset: u64, row_pitch: u32 },
    ResolveSubresource { dst: NativeHandle, src: NativeHandle, format: u32 },
    ClearRenderTargetView { rtv: NativeHandle, color: [f32; 4] },
    ClearDepthStencilView { dsv: NativeHandle, depth: f32 },
    SetRenderTargets { rtv: Option<NativeHandle>, dsv: Option<NativeHandle> },
    SetViewport { width: u32, height: u32 },
    SetGraphicsRootSignature(NativeHandle),
    SetPipelineState(NativeHandle),
    SetPrimitiveTopology(u32),
    SetGraphicsRoot32BitConstants { parameter: u32, data: Vec<u8> },
    SetGraphicsRootConstantBufferView { parameter: u32, resource: NativeHandle, offset: u64 },
    SetGraphicsRootDescriptorTable { parameter: u32, views: Vec<NativeHandle> },
    SetVertexBuffer { slot: u32, buffer: NativeHandle, stride: u32, size: u64 },
    SetIndexBuffer { buffer: NativeHandle, format: u32, size: u64 },
    DrawInstanced { vertex_count: u32, instance_count: u32 },
    DrawIndexedInstanced { index_count: u32, instance_count: u32 },
}

pub trait Dx12Device: Send + Sync {
    fn adapter_name(&self) -> String;

    /// Highest supported MSAA count for render targets of `format`
    fn max_sample_count(&self, format: u32) -> u32;

    // ===== OBJECTS =====

    fn create_committed_resource(
        &self,
        label: &str,
        heap: HeapKind,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> HrResult<NativeHandle>;

    /// Map, copy, unmap; `resource` must live on the upload heap
    fn write_buffer(&self, resource: NativeHandle, offset: u64, data: &[u8]) -> HrResult<()>;

    fn create_view(&self, resource: NativeHandle, kind: ViewKind) -> HrResult<NativeHandle>;

    fn create_root_signature(&self, desc: &RootSignatureDesc) -> HrResult<NativeHandle>;

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> HrResult<NativeHandle>;

    /// Drop one reference to a native object or view
    fn release(&self, handle: NativeHandle);

    // ===== QUEUES AND FENCES =====

    fn create_fence(&self, initial_value: u64) -> HrResult<NativeHandle>;

    fn completed_value(&self, fence: NativeHandle) -> u64;

    /// `ID3D12CommandQueue::Signal` on the given queue
    fn signal(&self, queue: QueueKind, fence: NativeHandle, value: u64) -> HrResult<()>;

    /// Block until `fence` reaches `value`; `Ok(false)` on timeout
    fn wait_for_value(&self, fence: NativeHandle, value: u64, timeout_ms: u32) -> HrResult<bool>;

    // ===== COMMAND LISTS =====

    fn create_command_allocator(&self, queue: QueueKind) -> HrResult<NativeHandle>;

    fn reset_command_allocator(&self, allocator: NativeHandle) -> HrResult<()>;

    fn create_command_list(&self, queue: QueueKind, allocator: NativeHandle) -> HrResult<NativeHandle>;

    fn reset_command_list(&self, list: NativeHandle, allocator: NativeHandle) -> HrResult<()>;

    fn record(&self, list: NativeHandle, command: ListCommand);

    fn close_command_list(&self, list: NativeHandle) -> HrResult<()>;

    fn execute_command_list(&self, queue: QueueKind, list: NativeHandle) -> HrResult<()>;

    // ===== SWAPCHAIN =====

    fn create_swapchain(&self, desc: &SwapchainDesc) -> HrResult<NativeHandle>;

    /// New reference to back buffer `index`; must be released before `resize_buffers`
    fn swapchain_buffer(&self, swapchain: NativeHandle, index: u32) -> HrResult<NativeHandle>;

    fn current_back_buffer_index(&self, swapchain: NativeHandle) -> u32;

    fn resize_buffers(&self, swapchain: NativeHandle, width: u32, height: u32) -> HrResult<()>;

    fn present(&self, swapchain: NativeHandle, sync_interval: u32) -> HrResult<()>;
}
