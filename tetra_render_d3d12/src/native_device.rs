/// NativeDx12Device - `Dx12Device` over `ID3D12Device` and DXGI
///
/// Handles are keys into an object table owning the COM interfaces; releasing
/// a handle drops the interface. Views live in CPU descriptor heaps (one per
/// view type). Descriptor tables are copied into a shader-visible ring when
/// recorded, so the views bound by a frame stay valid while it executes.
///
/// Recording never fails on the spot: an unknown handle marks the list and
/// `close_command_list` reports `E_INVALIDARG`, as the debug layer would.

use std::ffi::{c_void, CString};
use std::mem::{size_of, transmute_copy, ManuallyDrop};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use rustc_hash::FxHashMap;
use tetra_render::{Error, Result};
use windows::core::{Interface, HSTRING, PCSTR};
use windows::Win32::Foundation::{CloseHandle, HWND, RECT, WAIT_OBJECT_0};
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject};

use crate::d3d12_convert::{DXGI_FORMAT_D32_FLOAT, DXGI_FORMAT_R32_TYPELESS, E_INVALIDARG};
use crate::device::{
    Dx12Device, GraphicsPipelineDesc, HResult, HeapKind, HrResult, ListCommand, NativeHandle, QueueKind,
    ResourceDesc, ResourceState, RootParameter, RootSignatureDesc, SwapchainDesc, ViewKind,
};

const SOURCE: &str = "tetra::d3d12::native";

const RTV_CAPACITY: u32 = 64;
const DSV_CAPACITY: u32 = 64;
const SRV_CAPACITY: u32 = 4096;
/// Shader-visible descriptors recycled in FIFO order across frames
const SRV_RING_CAPACITY: u32 = 16384;

fn hr(error: windows::core::Error) -> HResult {
    error.code().0
}

fn init_err(what: &str, error: windows::core::Error) -> Error {
    tetra_render::render_error!(SOURCE, "{}: {}", what, error);
    Error::InitializationFailed(format!("{}: {}", what, error))
}

fn dxgi_format(format: u32) -> DXGI_FORMAT {
    DXGI_FORMAT(format as i32)
}

fn resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Common => D3D12_RESOURCE_STATE_COMMON,
        ResourceState::CopyDest => D3D12_RESOURCE_STATE_COPY_DEST,
        ResourceState::CopySource => D3D12_RESOURCE_STATE_COPY_SOURCE,
        ResourceState::GenericRead => D3D12_RESOURCE_STATE_GENERIC_READ,
        ResourceState::PixelShaderResource => D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::DepthWrite => D3D12_RESOURCE_STATE_DEPTH_WRITE,
        ResourceState::ResolveSource => D3D12_RESOURCE_STATE_RESOLVE_SOURCE,
        ResourceState::ResolveDest => D3D12_RESOURCE_STATE_RESOLVE_DEST,
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
    }
}

fn list_type(queue: QueueKind) -> D3D12_COMMAND_LIST_TYPE {
    match queue {
        QueueKind::Direct => D3D12_COMMAND_LIST_TYPE_DIRECT,
        QueueKind::Copy => D3D12_COMMAND_LIST_TYPE_COPY,
    }
}

/// Depth format a typeless depth resource is cleared and viewed as
fn depth_view_format(format: u32) -> u32 {
    if format == DXGI_FORMAT_R32_TYPELESS {
        DXGI_FORMAT_D32_FLOAT
    } else {
        format
    }
}

fn utf16_name(name: &[u16]) -> String {
    let end = name.iter().position(|&c| c == 0).unwrap_or(name.len());
    String::from_utf16_lossy(&name[..end])
}

// ===== DESCRIPTOR HEAPS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewHeap {
    Rtv,
    Dsv,
    Srv,
}

/// Non-shader-visible heap with a free list
struct CpuHeap {
    heap: ID3D12DescriptorHeap,
    start: usize,
    increment: usize,
    capacity: u32,
    next: u32,
    free: Vec<u32>,
}

impl CpuHeap {
    fn new(device: &ID3D12Device, kind: D3D12_DESCRIPTOR_HEAP_TYPE, capacity: u32) -> windows::core::Result<Self> {
        let heap: ID3D12DescriptorHeap = unsafe {
            device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                Type: kind,
                NumDescriptors: capacity,
                Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
                NodeMask: 0,
            })
        }?;
        let start = unsafe { heap.GetCPUDescriptorHandleForHeapStart() }.ptr;
        let increment = unsafe { device.GetDescriptorHandleIncrementSize(kind) } as usize;
        Ok(Self { heap, start, increment, capacity, next: 0, free: Vec::new() })
    }

    fn alloc(&mut self) -> Option<u32> {
        if let Some(slot) = self.free.pop() {
            return Some(slot);
        }
        if self.next == self.capacity {
            return None;
        }
        self.next += 1;
        Some(self.next - 1)
    }

    fn handle(&self, slot: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        D3D12_CPU_DESCRIPTOR_HANDLE { ptr: self.start + slot as usize * self.increment }
    }
}

/// Shader-visible heap handed out front to back, wrapping at the end
struct GpuRing {
    heap: ID3D12DescriptorHeap,
    cpu_start: usize,
    gpu_start: u64,
    increment: usize,
    capacity: u32,
    next: u32,
}

impl GpuRing {
    fn new(device: &ID3D12Device, capacity: u32) -> windows::core::Result<Self> {
        let heap: ID3D12DescriptorHeap = unsafe {
            device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
                NumDescriptors: capacity,
                Flags: D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE,
                NodeMask: 0,
            })
        }?;
        let increment =
            unsafe { device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV) } as usize;
        Ok(Self {
            cpu_start: unsafe { heap.GetCPUDescriptorHandleForHeapStart() }.ptr,
            gpu_start: unsafe { heap.GetGPUDescriptorHandleForHeapStart() }.ptr,
            heap,
            increment,
            capacity,
            next: 0,
        })
    }

    /// `count` contiguous descriptors
    fn alloc(&mut self, count: u32) -> (D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_GPU_DESCRIPTOR_HANDLE) {
        if self.next + count > self.capacity {
            self.next = 0;
        }
        let offset = self.next as usize * self.increment;
        self.next += count;
        (
            D3D12_CPU_DESCRIPTOR_HANDLE { ptr: self.cpu_start + offset },
            D3D12_GPU_DESCRIPTOR_HANDLE { ptr: self.gpu_start + offset as u64 },
        )
    }
}

// ===== OBJECT TABLE =====

enum Object {
    Resource(ID3D12Resource),
    View { heap: ViewHeap, slot: u32 },
    RootSignature(ID3D12RootSignature),
    Pipeline(ID3D12PipelineState),
    Fence(ID3D12Fence),
    Allocator(ID3D12CommandAllocator),
    List { list: ID3D12GraphicsCommandList, queue: QueueKind, failed: Option<HResult> },
    Swapchain(IDXGISwapChain3),
}

struct State {
    next_handle: u64,
    objects: FxHashMap<NativeHandle, Object>,
    rtv: CpuHeap,
    dsv: CpuHeap,
    srv: CpuHeap,
    srv_ring: GpuRing,
}

impl State {
    fn insert(&mut self, object: Object) -> NativeHandle {
        self.next_handle += 1;
        let handle = NativeHandle(self.next_handle);
        self.objects.insert(handle, object);
        handle
    }

    fn resource(&self, handle: NativeHandle) -> HrResult<ID3D12Resource> {
        match self.objects.get(&handle) {
            Some(Object::Resource(resource)) => Ok(resource.clone()),
            _ => Err(E_INVALIDARG),
        }
    }

    fn fence(&self, handle: NativeHandle) -> HrResult<ID3D12Fence> {
        match self.objects.get(&handle) {
            Some(Object::Fence(fence)) => Ok(fence.clone()),
            _ => Err(E_INVALIDARG),
        }
    }

    fn allocator(&self, handle: NativeHandle) -> HrResult<ID3D12CommandAllocator> {
        match self.objects.get(&handle) {
            Some(Object::Allocator(allocator)) => Ok(allocator.clone()),
            _ => Err(E_INVALIDARG),
        }
    }

    fn list(&self, handle: NativeHandle) -> HrResult<(ID3D12GraphicsCommandList, QueueKind)> {
        match self.objects.get(&handle) {
            Some(Object::List { list, queue, .. }) => Ok((list.clone(), *queue)),
            _ => Err(E_INVALIDARG),
        }
    }

    fn swapchain(&self, handle: NativeHandle) -> HrResult<IDXGISwapChain3> {
        match self.objects.get(&handle) {
            Some(Object::Swapchain(swapchain)) => Ok(swapchain.clone()),
            _ => Err(E_INVALIDARG),
        }
    }

    fn view(&self, handle: NativeHandle, expected: ViewHeap) -> HrResult<D3D12_CPU_DESCRIPTOR_HANDLE> {
        match self.objects.get(&handle) {
            Some(Object::View { heap, slot }) if *heap == expected => Ok(self.cpu_heap(*heap).handle(*slot)),
            _ => Err(E_INVALIDARG),
        }
    }

    fn cpu_heap(&self, heap: ViewHeap) -> &CpuHeap {
        match heap {
            ViewHeap::Rtv => &self.rtv,
            ViewHeap::Dsv => &self.dsv,
            ViewHeap::Srv => &self.srv,
        }
    }

    fn cpu_heap_mut(&mut self, heap: ViewHeap) -> &mut CpuHeap {
        match heap {
            ViewHeap::Rtv => &mut self.rtv,
            ViewHeap::Dsv => &mut self.dsv,
            ViewHeap::Srv => &mut self.srv,
        }
    }
}

// ===== DEVICE =====

pub struct NativeDx12Device {
    device: ID3D12Device,
    factory: IDXGIFactory4,
    direct: ID3D12CommandQueue,
    copy: ID3D12CommandQueue,
    hwnd: isize,
    adapter: String,
    state: Mutex<State>,
}

// SAFETY: ID3D12Device and the queues are free-threaded; command lists,
// allocators and descriptor heaps are only touched under the state mutex.
unsafe impl Send for NativeDx12Device {}
unsafe impl Sync for NativeDx12Device {}

impl NativeDx12Device {
    /// Create a device on the first hardware adapter that supports feature level 11.0
    ///
    /// `window` must be a Win32 window; the swapchain presents to it.
    pub fn new<W: HasWindowHandle>(window: &W, debug: bool) -> Result<Self> {
        let handle = window
            .window_handle()
            .map_err(|e| Error::InitializationFailed(format!("No window handle: {}", e)))?;
        let RawWindowHandle::Win32(win32) = handle.as_raw() else {
            return Err(Error::InitializationFailed("Direct3D 12 needs a Win32 window".to_string()));
        };

        if debug {
            let mut controller: Option<ID3D12Debug> = None;
            if unsafe { D3D12GetDebugInterface(&mut controller) }.is_ok() {
                if let Some(controller) = controller {
                    unsafe { controller.EnableDebugLayer() };
                    tetra_render::render_info!(SOURCE, "D3D12 debug layer enabled");
                }
            }
        }
        let flags = if debug { DXGI_CREATE_FACTORY_DEBUG } else { DXGI_CREATE_FACTORY_FLAGS(0) };
        let factory: IDXGIFactory4 =
            unsafe { CreateDXGIFactory2(flags) }.map_err(|e| init_err("Failed to create DXGI factory", e))?;

        let (device, adapter) = Self::pick_adapter(&factory)?;
        let queue = |queue: QueueKind| -> Result<ID3D12CommandQueue> {
            unsafe {
                device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                    Type: list_type(queue),
                    ..Default::default()
                })
            }
            .map_err(|e| init_err("Failed to create command queue", e))
        };
        let direct = queue(QueueKind::Direct)?;
        let copy = queue(QueueKind::Copy)?;

        let heaps = (|| -> windows::core::Result<State> {
            Ok(State {
                next_handle: 0,
                objects: FxHashMap::default(),
                rtv: CpuHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, RTV_CAPACITY)?,
                dsv: CpuHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_DSV, DSV_CAPACITY)?,
                srv: CpuHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV, SRV_CAPACITY)?,
                srv_ring: GpuRing::new(&device, SRV_RING_CAPACITY)?,
            })
        })();
        let state = heaps.map_err(|e| init_err("Failed to create descriptor heaps", e))?;

        tetra_render::render_info!(SOURCE, "D3D12 device on '{}'", adapter);
        Ok(Self {
            device,
            factory,
            direct,
            copy,
            hwnd: win32.hwnd.get(),
            adapter,
            state: Mutex::new(state),
        })
    }

    fn pick_adapter(factory: &IDXGIFactory4) -> Result<(ID3D12Device, String)> {
        for index in 0.. {
            let Ok(adapter) = (unsafe { factory.EnumAdapters1(index) }) else {
                break;
            };
            let Ok(desc) = (unsafe { adapter.GetDesc1() }) else {
                continue;
            };
            if (DXGI_ADAPTER_FLAG(desc.Flags as i32) & DXGI_ADAPTER_FLAG_SOFTWARE) != DXGI_ADAPTER_FLAG_NONE {
                continue;
            }
            let mut device: Option<ID3D12Device> = None;
            if unsafe { D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device) }.is_ok() {
                if let Some(device) = device {
                    return Ok((device, utf16_name(&desc.Description)));
                }
            }
        }
        Err(Error::InitializationFailed("No Direct3D 12 capable hardware adapter".to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self, queue: QueueKind) -> &ID3D12CommandQueue {
        match queue {
            QueueKind::Direct => &self.direct,
            QueueKind::Copy => &self.copy,
        }
    }

    fn record_command(&self, state: &mut State, list: &ID3D12GraphicsCommandList, command: ListCommand) -> HrResult<()> {
        match command {
            ListCommand::ResourceBarrier { resource, before, after } => {
                let resource = state.resource(resource)?;
                let barrier = D3D12_RESOURCE_BARRIER {
                    Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
                    Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
                    Anonymous: D3D12_RESOURCE_BARRIER_0 {
                        Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                            // Borrowed without AddRef; the barrier never releases it
                            pResource: unsafe { transmute_copy(&resource) },
                            Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                            StateBefore: resource_state(before),
                            StateAfter: resource_state(after),
                        }),
                    },
                };
                unsafe { list.ResourceBarrier(&[barrier]) };
            }
            ListCommand::CopyBufferRegion { dst, dst_offset, src, src_offset, size } => {
                let (dst, src) = (state.resource(dst)?, state.resource(src)?);
                unsafe { list.CopyBufferRegion(&dst, dst_offset, &src, src_offset, size) };
            }
            ListCommand::CopyTextureRegion { dst, subresource, src, src_offset, row_pitch } => {
                let (dst, src) = (state.resource(dst)?, state.resource(src)?);
                let desc = unsafe { dst.GetDesc() };
                let dst_location = D3D12_TEXTURE_COPY_LOCATION {
                    pResource: unsafe { transmute_copy(&dst) },
                    Type: D3D12_TEXTURE_COPY_TYPE_SUBRESOURCE_INDEX,
                    Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 { SubresourceIndex: subresource },
                };
                let src_location = D3D12_TEXTURE_COPY_LOCATION {
                    pResource: unsafe { transmute_copy(&src) },
                    Type: D3D12_TEXTURE_COPY_TYPE_PLACED_FOOTPRINT,
                    Anonymous: D3D12_TEXTURE_COPY_LOCATION_0 {
                        PlacedFootprint: D3D12_PLACED_SUBRESOURCE_FOOTPRINT {
                            Offset: src_offset,
                            Footprint: D3D12_SUBRESOURCE_FOOTPRINT {
                                Format: desc.Format,
                                Width: desc.Width as u32,
                                Height: desc.Height,
                                Depth: 1,
                                RowPitch: row_pitch,
                            },
                        },
                    },
                };
                unsafe { list.CopyTextureRegion(&dst_location, 0, 0, 0, &src_location, None) };
            }
            ListCommand::ResolveSubresource { dst, src, format } => {
                let (dst, src) = (state.resource(dst)?, state.resource(src)?);
                unsafe { list.ResolveSubresource(&dst, 0, &src, 0, dxgi_format(format)) };
            }
            ListCommand::ClearRenderTargetView { rtv, color } => {
                let rtv = state.view(rtv, ViewHeap::Rtv)?;
                unsafe { list.ClearRenderTargetView(rtv, color.as_ptr().cast(), None) };
            }
            ListCommand::ClearDepthStencilView { dsv, depth } => {
                let dsv = state.view(dsv, ViewHeap::Dsv)?;
                unsafe { list.ClearDepthStencilView(dsv, D3D12_CLEAR_FLAG_DEPTH, depth, 0, &[]) };
            }
            ListCommand::SetRenderTargets { rtv, dsv } => {
                let rtv = rtv.map(|h| state.view(h, ViewHeap::Rtv)).transpose()?;
                let dsv = dsv.map(|h| state.view(h, ViewHeap::Dsv)).transpose()?;
                unsafe {
                    list.OMSetRenderTargets(
                        u32::from(rtv.is_some()),
                        rtv.as_ref().map(|h| h as *const _),
                        false,
                        dsv.as_ref().map(|h| h as *const _),
                    )
                };
            }
            ListCommand::SetViewport { width, height } => unsafe {
                list.RSSetViewports(&[D3D12_VIEWPORT {
                    TopLeftX: 0.0,
                    TopLeftY: 0.0,
                    Width: width as f32,
                    Height: height as f32,
                    MinDepth: D3D12_MIN_DEPTH,
                    MaxDepth: D3D12_MAX_DEPTH,
                }]);
                list.RSSetScissorRects(&[RECT { left: 0, top: 0, right: width as i32, bottom: height as i32 }]);
            },
            ListCommand::SetGraphicsRootSignature(handle) => match state.objects.get(&handle) {
                Some(Object::RootSignature(root)) => unsafe { list.SetGraphicsRootSignature(root) },
                _ => return Err(E_INVALIDARG),
            },
            ListCommand::SetPipelineState(handle) => match state.objects.get(&handle) {
                Some(Object::Pipeline(pipeline)) => unsafe { list.SetPipelineState(pipeline) },
                _ => return Err(E_INVALIDARG),
            },
            ListCommand::SetPrimitiveTopology(topology) => unsafe {
                list.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY(topology as i32))
            },
            ListCommand::SetGraphicsRoot32BitConstants { parameter, data } => unsafe {
                list.SetGraphicsRoot32BitConstants(parameter, (data.len() / 4) as u32, data.as_ptr().cast(), 0)
            },
            ListCommand::SetGraphicsRootConstantBufferView { parameter, resource, offset } => {
                let resource = state.resource(resource)?;
                unsafe {
                    let address = resource.GetGPUVirtualAddress() + offset;
                    list.SetGraphicsRootConstantBufferView(parameter, address);
                }
            }
            ListCommand::SetGraphicsRootDescriptorTable { parameter, views } => {
                let sources = views
                    .iter()
                    .map(|&view| state.view(view, ViewHeap::Srv))
                    .collect::<HrResult<Vec<_>>>()?;
                let increment = state.srv_ring.increment;
                let (cpu, gpu) = state.srv_ring.alloc(sources.len() as u32);
                for (index, source) in sources.into_iter().enumerate() {
                    let dst = D3D12_CPU_DESCRIPTOR_HANDLE { ptr: cpu.ptr + index * increment };
                    unsafe {
                        self.device.CopyDescriptorsSimple(1, dst, source, D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV)
                    };
                }
                unsafe { list.SetGraphicsRootDescriptorTable(parameter, gpu) };
            }
            ListCommand::SetVertexBuffer { slot, buffer, stride, size } => {
                let buffer = state.resource(buffer)?;
                let view = D3D12_VERTEX_BUFFER_VIEW {
                    BufferLocation: unsafe { buffer.GetGPUVirtualAddress() },
                    StrideInBytes: stride,
                    SizeInBytes: size as u32,
                };
                unsafe { list.IASetVertexBuffers(slot, Some(&[view])) };
            }
            ListCommand::SetIndexBuffer { buffer, format, size } => {
                let buffer = state.resource(buffer)?;
                let view = D3D12_INDEX_BUFFER_VIEW {
                    BufferLocation: unsafe { buffer.GetGPUVirtualAddress() },
                    SizeInBytes: size as u32,
                    Format: dxgi_format(format),
                };
                unsafe { list.IASetIndexBuffer(Some(&view as *const _)) };
            }
            ListCommand::DrawInstanced { vertex_count, instance_count } => unsafe {
                list.DrawInstanced(vertex_count, instance_count, 0, 0)
            },
            ListCommand::DrawIndexedInstanced { index_count, instance_count } => unsafe {
                list.DrawIndexedInstanced(index_count, instance_count, 0, 0, 0)
            },
        }
        Ok(())
    }

    fn serialize_root_signature(desc: &RootSignatureDesc) -> windows::core::Result<ID3DBlob> {
        let ranges: Vec<D3D12_DESCRIPTOR_RANGE> = desc
            .parameters
            .iter()
            .map(|parameter| match *parameter {
                RootParameter::ShaderResourceTable { base_register, count } => D3D12_DESCRIPTOR_RANGE {
                    RangeType: D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
                    NumDescriptors: count,
                    BaseShaderRegister: base_register,
                    RegisterSpace: 0,
                    OffsetInDescriptorsFromTableStart: D3D12_DESCRIPTOR_RANGE_OFFSET_APPEND,
                },
                _ => D3D12_DESCRIPTOR_RANGE::default(),
            })
            .collect();

        let parameters: Vec<D3D12_ROOT_PARAMETER> = desc
            .parameters
            .iter()
            .zip(&ranges)
            .map(|(parameter, range)| match *parameter {
                RootParameter::Constants { register, values } => D3D12_ROOT_PARAMETER {
                    ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
                    Anonymous: D3D12_ROOT_PARAMETER_0 {
                        Constants: D3D12_ROOT_CONSTANTS {
                            ShaderRegister: register,
                            RegisterSpace: 0,
                            Num32BitValues: values,
                        },
                    },
                    ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
                },
                RootParameter::ConstantBufferView { register } => D3D12_ROOT_PARAMETER {
                    ParameterType: D3D12_ROOT_PARAMETER_TYPE_CBV,
                    Anonymous: D3D12_ROOT_PARAMETER_0 {
                        Descriptor: D3D12_ROOT_DESCRIPTOR { ShaderRegister: register, RegisterSpace: 0 },
                    },
                    ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
                },
                RootParameter::ShaderResourceTable { .. } => D3D12_ROOT_PARAMETER {
                    ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                    Anonymous: D3D12_ROOT_PARAMETER_0 {
                        DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                            NumDescriptorRanges: 1,
                            pDescriptorRanges: range,
                        },
                    },
                    ShaderVisibility: D3D12_SHADER_VISIBILITY_PIXEL,
                },
            })
            .collect();

        let samplers: Vec<D3D12_STATIC_SAMPLER_DESC> = desc
            .static_samplers
            .iter()
            .map(|sampler| {
                let (filter, address, compare) = if sampler.comparison {
                    (
                        D3D12_FILTER_COMPARISON_MIN_MAG_LINEAR_MIP_POINT,
                        D3D12_TEXTURE_ADDRESS_MODE_BORDER,
                        D3D12_COMPARISON_FUNC_LESS_EQUAL,
                    )
                } else {
                    (D3D12_FILTER_MIN_MAG_MIP_LINEAR, D3D12_TEXTURE_ADDRESS_MODE_WRAP, D3D12_COMPARISON_FUNC_NEVER)
                };
                D3D12_STATIC_SAMPLER_DESC {
                    Filter: filter,
                    AddressU: address,
                    AddressV: address,
                    AddressW: address,
                    MipLODBias: 0.0,
                    MaxAnisotropy: 1,
                    ComparisonFunc: compare,
                    BorderColor: D3D12_STATIC_BORDER_COLOR_OPAQUE_WHITE,
                    MinLOD: 0.0,
                    MaxLOD: D3D12_FLOAT32_MAX,
                    ShaderRegister: sampler.register,
                    RegisterSpace: 0,
                    ShaderVisibility: D3D12_SHADER_VISIBILITY_PIXEL,
                }
            })
            .collect();

        let root = D3D12_ROOT_SIGNATURE_DESC {
            NumParameters: parameters.len() as u32,
            pParameters: parameters.as_ptr(),
            NumStaticSamplers: samplers.len() as u32,
            pStaticSamplers: samplers.as_ptr(),
            Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
        };
        let mut blob: Option<ID3DBlob> = None;
        let mut errors: Option<ID3DBlob> = None;
        let serialized =
            unsafe { D3D12SerializeRootSignature(&root, D3D_ROOT_SIGNATURE_VERSION_1, &mut blob, Some(&mut errors)) };
        if let (Err(e), Some(errors)) = (&serialized, &errors) {
            let message = unsafe {
                std::slice::from_raw_parts(errors.GetBufferPointer() as *const u8, errors.GetBufferSize())
            };
            tetra_render::render_error!(
                SOURCE,
                "Root signature rejected ({}): {}",
                e,
                String::from_utf8_lossy(message).trim_end_matches('\0')
            );
        }
        serialized?;
        blob.ok_or_else(|| windows::core::Error::from(windows::Win32::Foundation::E_FAIL))
    }
}

impl Dx12Device for NativeDx12Device {
    fn adapter_name(&self) -> String {
        self.adapter.clone()
    }

    fn max_sample_count(&self, format: u32) -> u32 {
        for count in [8, 4, 2] {
            let mut levels = D3D12_FEATURE_DATA_MULTISAMPLE_QUALITY_LEVELS {
                Format: dxgi_format(format),
                SampleCount: count,
                Flags: D3D12_MULTISAMPLE_QUALITY_LEVELS_FLAG_NONE,
                NumQualityLevels: 0,
            };
            let supported = unsafe {
                self.device.CheckFeatureSupport(
                    D3D12_FEATURE_MULTISAMPLE_QUALITY_LEVELS,
                    &mut levels as *mut _ as *mut c_void,
                    size_of::<D3D12_FEATURE_DATA_MULTISAMPLE_QUALITY_LEVELS>() as u32,
                )
            };
            if supported.is_ok() && levels.NumQualityLevels > 0 {
                return count;
            }
        }
        1
    }

    // ===== OBJECTS =====

    fn create_committed_resource(
        &self,
        label: &str,
        heap: HeapKind,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> HrResult<NativeHandle> {
        let properties = D3D12_HEAP_PROPERTIES {
            Type: match heap {
                HeapKind::Default => D3D12_HEAP_TYPE_DEFAULT,
                HeapKind::Upload => D3D12_HEAP_TYPE_UPLOAD,
            },
            ..Default::default()
        };
        let mut clear = None;
        let native = match *desc {
            ResourceDesc::Buffer { size } => D3D12_RESOURCE_DESC {
                Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
                Width: size,
                Height: 1,
                DepthOrArraySize: 1,
                MipLevels: 1,
                SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
                Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
                ..Default::default()
            },
            ResourceDesc::Texture2D { width, height, array_size, format, samples, render_target, depth_stencil } => {
                let mut flags = D3D12_RESOURCE_FLAG_NONE;
                if render_target {
                    flags |= D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET;
                }
                if depth_stencil {
                    flags |= D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL;
                    clear = Some(D3D12_CLEAR_VALUE {
                        Format: dxgi_format(depth_view_format(format)),
                        Anonymous: D3D12_CLEAR_VALUE_0 {
                            DepthStencil: D3D12_DEPTH_STENCIL_VALUE { Depth: 1.0, Stencil: 0 },
                        },
                    });
                }
                D3D12_RESOURCE_DESC {
                    Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
                    Width: width as u64,
                    Height: height,
                    DepthOrArraySize: array_size as u16,
                    MipLevels: 1,
                    Format: dxgi_format(format),
                    SampleDesc: DXGI_SAMPLE_DESC { Count: samples, Quality: 0 },
                    Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
                    Flags: flags,
                    ..Default::default()
                }
            }
        };

        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.device.CreateCommittedResource(
                &properties,
                D3D12_HEAP_FLAG_NONE,
                &native,
                resource_state(initial_state),
                clear.as_ref().map(|c| c as *const _),
                &mut resource,
            )
        }
        .map_err(hr)?;
        let resource = resource.ok_or(E_INVALIDARG)?;
        // Debug name only
        let _ = unsafe { resource.SetName(&HSTRING::from(label)) };
        Ok(self.lock().insert(Object::Resource(resource)))
    }

    fn write_buffer(&self, resource: NativeHandle, offset: u64, data: &[u8]) -> HrResult<()> {
        let resource = self.lock().resource(resource)?;
        let width = unsafe { resource.GetDesc() }.Width;
        if offset + data.len() as u64 > width {
            return Err(E_INVALIDARG);
        }
        let mut mapped: *mut c_void = ptr::null_mut();
        let read_nothing = D3D12_RANGE { Begin: 0, End: 0 };
        unsafe {
            resource.Map(0, Some(&read_nothing), Some(&mut mapped)).map_err(hr)?;
            ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast::<u8>().add(offset as usize), data.len());
            resource.Unmap(0, None);
        }
        Ok(())
    }

    fn create_view(&self, resource: NativeHandle, kind: ViewKind) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        let native = state.resource(resource)?;
        let multisampled = unsafe { native.GetDesc() }.SampleDesc.Count > 1;
        let heap = match kind {
            ViewKind::RenderTarget { .. } => ViewHeap::Rtv,
            ViewKind::DepthStencil { .. } => ViewHeap::Dsv,
            ViewKind::ShaderResource { .. } => ViewHeap::Srv,
        };
        let slot = state.cpu_heap_mut(heap).alloc().ok_or(E_INVALIDARG)?;
        let handle = state.cpu_heap(heap).handle(slot);

        unsafe {
            match kind {
                ViewKind::RenderTarget { format } => {
                    let desc = D3D12_RENDER_TARGET_VIEW_DESC {
                        Format: dxgi_format(format),
                        ViewDimension: if multisampled {
                            D3D12_RTV_DIMENSION_TEXTURE2DMS
                        } else {
                            D3D12_RTV_DIMENSION_TEXTURE2D
                        },
                        Anonymous: D3D12_RENDER_TARGET_VIEW_DESC_0 { Texture2D: D3D12_TEX2D_RTV::default() },
                    };
                    self.device.CreateRenderTargetView(&native, Some(&desc), handle);
                }
                ViewKind::DepthStencil { format } => {
                    let desc = D3D12_DEPTH_STENCIL_VIEW_DESC {
                        Format: dxgi_format(format),
                        ViewDimension: if multisampled {
                            D3D12_DSV_DIMENSION_TEXTURE2DMS
                        } else {
                            D3D12_DSV_DIMENSION_TEXTURE2D
                        },
                        Flags: D3D12_DSV_FLAG_NONE,
                        Anonymous: D3D12_DEPTH_STENCIL_VIEW_DESC_0 { Texture2D: D3D12_TEX2D_DSV::default() },
                    };
                    self.device.CreateDepthStencilView(&native, Some(&desc), handle);
                }
                ViewKind::ShaderResource { format, cube } => {
                    let (dimension, anonymous) = if cube {
                        (
                            D3D12_SRV_DIMENSION_TEXTURECUBE,
                            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                                TextureCube: D3D12_TEXCUBE_SRV { MipLevels: 1, ..Default::default() },
                            },
                        )
                    } else {
                        (
                            D3D12_SRV_DIMENSION_TEXTURE2D,
                            D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                                Texture2D: D3D12_TEX2D_SRV { MipLevels: 1, ..Default::default() },
                            },
                        )
                    };
                    let desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
                        Format: dxgi_format(format),
                        ViewDimension: dimension,
                        Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
                        Anonymous: anonymous,
                    };
                    self.device.CreateShaderResourceView(&native, Some(&desc), handle);
                }
            }
        }
        Ok(state.insert(Object::View { heap, slot }))
    }

    fn create_root_signature(&self, desc: &RootSignatureDesc) -> HrResult<NativeHandle> {
        let blob = Self::serialize_root_signature(desc).map_err(hr)?;
        let root: ID3D12RootSignature = unsafe {
            let bytes = std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize());
            self.device.CreateRootSignature(0, bytes)
        }
        .map_err(hr)?;
        Ok(self.lock().insert(Object::RootSignature(root)))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> HrResult<NativeHandle> {
        let root = match self.lock().objects.get(&desc.root_signature) {
            Some(Object::RootSignature(root)) => root.clone(),
            _ => return Err(E_INVALIDARG),
        };

        let semantics = desc
            .input_layout
            .iter()
            .map(|element| CString::new(element.semantic).map_err(|_| E_INVALIDARG))
            .collect::<HrResult<Vec<_>>>()?;
        let mut elements: Vec<D3D12_INPUT_ELEMENT_DESC> = desc
            .input_layout
            .iter()
            .zip(&semantics)
            .map(|(element, semantic)| D3D12_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(semantic.as_ptr().cast()),
                SemanticIndex: 0,
                Format: dxgi_format(element.format),
                InputSlot: element.input_slot,
                AlignedByteOffset: element.offset,
                InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            })
            .collect();

        let bytecode = |code: &[u8]| D3D12_SHADER_BYTECODE {
            pShaderBytecode: code.as_ptr().cast(),
            BytecodeLength: code.len(),
        };
        let mut blend_targets = [D3D12_RENDER_TARGET_BLEND_DESC::default(); 8];
        blend_targets[0] = D3D12_RENDER_TARGET_BLEND_DESC {
            SrcBlend: D3D12_BLEND_ONE,
            DestBlend: D3D12_BLEND_ZERO,
            BlendOp: D3D12_BLEND_OP_ADD,
            SrcBlendAlpha: D3D12_BLEND_ONE,
            DestBlendAlpha: D3D12_BLEND_ZERO,
            BlendOpAlpha: D3D12_BLEND_OP_ADD,
            LogicOp: D3D12_LOGIC_OP_NOOP,
            RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
            ..Default::default()
        };

        let mut native = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            // Borrowed without AddRef, like the barrier resources
            pRootSignature: unsafe { transmute_copy(&root) },
            VS: bytecode(desc.vertex_shader),
            PS: desc.pixel_shader.map(bytecode).unwrap_or_default(),
            BlendState: D3D12_BLEND_DESC { RenderTarget: blend_targets, ..Default::default() },
            SampleMask: u32::MAX,
            RasterizerState: D3D12_RASTERIZER_DESC {
                FillMode: D3D12_FILL_MODE(desc.rasterizer.fill_mode as i32),
                CullMode: D3D12_CULL_MODE(desc.rasterizer.cull_mode as i32),
                DepthBias: desc.rasterizer.depth_bias,
                SlopeScaledDepthBias: desc.rasterizer.slope_scaled_depth_bias,
                FrontCounterClockwise: true.into(),
                DepthClipEnable: true.into(),
                MultisampleEnable: (desc.sample_count > 1).into(),
                ..Default::default()
            },
            DepthStencilState: D3D12_DEPTH_STENCIL_DESC {
                DepthEnable: desc.depth_stencil.depth_enable.into(),
                DepthWriteMask: if desc.depth_stencil.depth_write {
                    D3D12_DEPTH_WRITE_MASK_ALL
                } else {
                    D3D12_DEPTH_WRITE_MASK_ZERO
                },
                DepthFunc: D3D12_COMPARISON_FUNC(desc.depth_stencil.depth_func as i32),
                ..Default::default()
            },
            InputLayout: D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: elements.as_mut_ptr(),
                NumElements: elements.len() as u32,
            },
            PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE(desc.topology_type as i32),
            DSVFormat: dxgi_format(desc.dsv_format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: desc.sample_count, Quality: 0 },
            ..Default::default()
        };
        if let Some(format) = desc.rtv_format {
            native.NumRenderTargets = 1;
            native.RTVFormats[0] = dxgi_format(format);
        }

        let pipeline: ID3D12PipelineState = unsafe { self.device.CreateGraphicsPipelineState(&native) }.map_err(|e| {
            tetra_render::render_error!(SOURCE, "PSO '{}' rejected: {}", desc.label, e);
            hr(e)
        })?;
        let _ = unsafe { pipeline.SetName(&HSTRING::from(desc.label)) };
        Ok(self.lock().insert(Object::Pipeline(pipeline)))
    }

    fn release(&self, handle: NativeHandle) {
        let mut state = self.lock();
        match state.objects.remove(&handle) {
            Some(Object::View { heap, slot }) => state.cpu_heap_mut(heap).free.push(slot),
            Some(_) => {}
            None => tetra_render::render_warn!(SOURCE, "Release of unknown handle {:?}", handle),
        }
    }

    // ===== QUEUES AND FENCES =====

    fn create_fence(&self, initial_value: u64) -> HrResult<NativeHandle> {
        let fence: ID3D12Fence =
            unsafe { self.device.CreateFence(initial_value, D3D12_FENCE_FLAG_NONE) }.map_err(hr)?;
        Ok(self.lock().insert(Object::Fence(fence)))
    }

    fn completed_value(&self, fence: NativeHandle) -> u64 {
        match self.lock().fence(fence) {
            Ok(fence) => unsafe { fence.GetCompletedValue() },
            Err(_) => 0,
        }
    }

    fn signal(&self, queue: QueueKind, fence: NativeHandle, value: u64) -> HrResult<()> {
        let fence = self.lock().fence(fence)?;
        unsafe { self.queue(queue).Signal(&fence, value) }.map_err(hr)
    }

    fn wait_for_value(&self, fence: NativeHandle, value: u64, timeout_ms: u32) -> HrResult<bool> {
        let fence = self.lock().fence(fence)?;
        if unsafe { fence.GetCompletedValue() } >= value {
            return Ok(true);
        }
        unsafe {
            let event = CreateEventW(None, false, false, None).map_err(hr)?;
            let armed = fence.SetEventOnCompletion(value, event);
            let waited = armed.is_ok() && WaitForSingleObject(event, timeout_ms) == WAIT_OBJECT_0;
            let _ = CloseHandle(event);
            armed.map_err(hr)?;
            Ok(waited)
        }
    }

    // ===== COMMAND LISTS =====

    fn create_command_allocator(&self, queue: QueueKind) -> HrResult<NativeHandle> {
        let allocator: ID3D12CommandAllocator =
            unsafe { self.device.CreateCommandAllocator(list_type(queue)) }.map_err(hr)?;
        Ok(self.lock().insert(Object::Allocator(allocator)))
    }

    fn reset_command_allocator(&self, allocator: NativeHandle) -> HrResult<()> {
        let allocator = self.lock().allocator(allocator)?;
        unsafe { allocator.Reset() }.map_err(hr)
    }

    fn create_command_list(&self, queue: QueueKind, allocator: NativeHandle) -> HrResult<NativeHandle> {
        let allocator = self.lock().allocator(allocator)?;
        let list: ID3D12GraphicsCommandList =
            unsafe { self.device.CreateCommandList(0, list_type(queue), &allocator, None::<&ID3D12PipelineState>) }.map_err(hr)?;
        unsafe { list.Close() }.map_err(hr)?;
        Ok(self.lock().insert(Object::List { list, queue, failed: None }))
    }

    fn reset_command_list(&self, list: NativeHandle, allocator: NativeHandle) -> HrResult<()> {
        let mut state = self.lock();
        let allocator = state.allocator(allocator)?;
        let (native, queue) = state.list(list)?;
        unsafe { native.Reset(&allocator, None::<&ID3D12PipelineState>) }.map_err(hr)?;
        if queue == QueueKind::Direct {
            unsafe { native.SetDescriptorHeaps(&[Some(state.srv_ring.heap.clone())]) };
        }
        if let Some(Object::List { failed, .. }) = state.objects.get_mut(&list) {
            *failed = None;
        }
        Ok(())
    }

    fn record(&self, list: NativeHandle, command: ListCommand) {
        let mut state = self.lock();
        let Ok((native, _)) = state.list(list) else {
            tetra_render::render_warn!(SOURCE, "Recording into unknown list {:?}", list);
            return;
        };
        if let Err(code) = self.record_command(&mut state, &native, command) {
            if let Some(Object::List { failed, .. }) = state.objects.get_mut(&list) {
                failed.get_or_insert(code);
            }
        }
    }

    fn close_command_list(&self, list: NativeHandle) -> HrResult<()> {
        let state = self.lock();
        let Some(Object::List { list: native, failed, .. }) = state.objects.get(&list) else {
            return Err(E_INVALIDARG);
        };
        let closed = unsafe { native.Close() }.map_err(hr);
        match failed {
            Some(code) => Err(*code),
            None => closed,
        }
    }

    fn execute_command_list(&self, queue: QueueKind, list: NativeHandle) -> HrResult<()> {
        let (native, _) = self.lock().list(list)?;
        let list: ID3D12CommandList = native.cast().map_err(hr)?;
        unsafe { self.queue(queue).ExecuteCommandLists(&[Some(list)]) };
        Ok(())
    }

    // ===== SWAPCHAIN =====

    fn create_swapchain(&self, desc: &SwapchainDesc) -> HrResult<NativeHandle> {
        let hwnd = HWND(self.hwnd as *mut c_void);
        let native = DXGI_SWAP_CHAIN_DESC1 {
            Width: desc.width,
            Height: desc.height,
            Format: dxgi_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: desc.buffer_count,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            ..Default::default()
        };
        let swapchain: IDXGISwapChain3 = unsafe {
            let swapchain = self.factory.CreateSwapChainForHwnd(&self.direct, hwnd, &native, None, None::<&IDXGIOutput>);
            swapchain.and_then(|s| s.cast())
        }
        .map_err(hr)?;
        // Fullscreen transitions are the application's call
        let _ = unsafe { self.factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER) };
        Ok(self.lock().insert(Object::Swapchain(swapchain)))
    }

    fn swapchain_buffer(&self, swapchain: NativeHandle, index: u32) -> HrResult<NativeHandle> {
        let swapchain = self.lock().swapchain(swapchain)?;
        let buffer: ID3D12Resource = unsafe { swapchain.GetBuffer(index) }.map_err(hr)?;
        Ok(self.lock().insert(Object::Resource(buffer)))
    }

    fn current_back_buffer_index(&self, swapchain: NativeHandle) -> u32 {
        match self.lock().swapchain(swapchain) {
            Ok(swapchain) => unsafe { swapchain.GetCurrentBackBufferIndex() },
            Err(_) => 0,
        }
    }

    fn resize_buffers(&self, swapchain: NativeHandle, width: u32, height: u32) -> HrResult<()> {
        let swapchain = self.lock().swapchain(swapchain)?;
        unsafe { swapchain.ResizeBuffers(0, width, height, DXGI_FORMAT_UNKNOWN, DXGI_SWAP_CHAIN_FLAG(0)) }
            .map_err(hr)
    }

    fn present(&self, swapchain: NativeHandle, sync_interval: u32) -> HrResult<()> {
        let swapchain = self.lock().swapchain(swapchain)?;
        unsafe { swapchain.Present(sync_interval, DXGI_PRESENT(0)) }.ok().map_err(hr)
    }
}
