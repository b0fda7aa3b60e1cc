/// NativeDx11Device - `Dx11Device` over `ID3D11Device` and its immediate context
///
/// Handles are keys into an object table owning the COM interfaces. The
/// immediate context is not free-threaded, so every context call and every
/// table access happens under one mutex. A call naming an unknown handle is
/// dropped with a warning.

use std::ffi::{c_void, CString};
use std::mem::size_of;
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use rustc_hash::FxHashMap;
use tetra_render::{Error, Result};
use windows::core::{Interface, PCSTR};
use windows::Win32::Foundation::{BOOL, HMODULE, HWND};
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::d3d11_convert::E_INVALIDARG;
use crate::device::{
    BufferBind, BufferResourceDesc, ContextCall, DepthStencilDesc, Dx11Device, HResult, HrResult, InputElement,
    NativeHandle, RasterizerDesc, SamplerKind, SubresourceData, SwapchainDesc, Texture2DDesc, ViewKind,
};

const SOURCE: &str = "tetra::d3d11::native";

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

fn utf16_name(name: &[u16]) -> String {
    let end = name.iter().position(|&c| c == 0).unwrap_or(name.len());
    String::from_utf16_lossy(&name[..end])
}

/// Fill an out-parameter interface, failing with `E_INVALIDARG` if the call left it empty
fn created<T>(result: windows::core::Result<()>, object: Option<T>) -> HrResult<T> {
    result.map_err(hr)?;
    object.ok_or(E_INVALIDARG)
}

// ===== OBJECT TABLE =====

enum Object {
    Buffer(ID3D11Buffer),
    Texture(ID3D11Texture2D),
    RenderTargetView(ID3D11RenderTargetView),
    DepthStencilView(ID3D11DepthStencilView),
    ShaderResourceView(ID3D11ShaderResourceView),
    Rasterizer(ID3D11RasterizerState),
    DepthStencil(ID3D11DepthStencilState),
    Sampler(ID3D11SamplerState),
    VertexShader(ID3D11VertexShader),
    PixelShader(ID3D11PixelShader),
    InputLayout(ID3D11InputLayout),
    Swapchain(IDXGISwapChain1),
}

struct State {
    context: ID3D11DeviceContext,
    next_handle: u64,
    objects: FxHashMap<NativeHandle, Object>,
}

macro_rules! lookup {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        fn $fn_name(&self, handle: NativeHandle) -> HrResult<$ty> {
            match self.objects.get(&handle) {
                Some(Object::$variant(object)) => Ok(object.clone()),
                _ => Err(E_INVALIDARG),
            }
        }
    };
}

impl State {
    fn insert(&mut self, object: Object) -> NativeHandle {
        self.next_handle += 1;
        let handle = NativeHandle(self.next_handle);
        self.objects.insert(handle, object);
        handle
    }

    lookup!(buffer, Buffer, ID3D11Buffer);
    lookup!(texture, Texture, ID3D11Texture2D);
    lookup!(rtv, RenderTargetView, ID3D11RenderTargetView);
    lookup!(dsv, DepthStencilView, ID3D11DepthStencilView);
    lookup!(srv, ShaderResourceView, ID3D11ShaderResourceView);
    lookup!(rasterizer, Rasterizer, ID3D11RasterizerState);
    lookup!(depth_stencil, DepthStencil, ID3D11DepthStencilState);
    lookup!(sampler, Sampler, ID3D11SamplerState);
    lookup!(vertex_shader, VertexShader, ID3D11VertexShader);
    lookup!(pixel_shader, PixelShader, ID3D11PixelShader);
    lookup!(input_layout, InputLayout, ID3D11InputLayout);
    lookup!(swapchain, Swapchain, IDXGISwapChain1);

    fn optional_buffer(&self, handle: Option<NativeHandle>) -> HrResult<Option<ID3D11Buffer>> {
        handle.map(|h| self.buffer(h)).transpose()
    }

    fn apply(&self, call: &ContextCall) -> HrResult<()> {
        let context = &self.context;
        unsafe {
            match *call {
                ContextCall::IASetInputLayout(layout) => context.IASetInputLayout(&self.input_layout(layout)?),
                ContextCall::IASetPrimitiveTopology(topology) => {
                    context.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY(topology as i32))
                }
                ContextCall::IASetVertexBuffer { slot, buffer, stride } => {
                    let buffers = [self.optional_buffer(buffer)?];
                    let offset = 0u32;
                    context.IASetVertexBuffers(
                        slot,
                        1,
                        Some(buffers.as_ptr()),
                        Some(&stride as *const u32),
                        Some(&offset as *const u32),
                    );
                }
                ContextCall::IASetIndexBuffer { buffer, format } => {
                    context.IASetIndexBuffer(&self.buffer(buffer)?, dxgi_format(format), 0)
                }
                ContextCall::VSSetShader(shader) => context.VSSetShader(&self.vertex_shader(shader)?, None),
                ContextCall::PSSetShader(Some(shader)) => context.PSSetShader(&self.pixel_shader(shader)?, None),
                ContextCall::PSSetShader(None) => context.PSSetShader(None::<&ID3D11PixelShader>, None),
                ContextCall::VSSetConstantBuffer { slot, buffer } => {
                    context.VSSetConstantBuffers(slot, Some(&[self.optional_buffer(buffer)?]))
                }
                ContextCall::PSSetConstantBuffer { slot, buffer } => {
                    context.PSSetConstantBuffers(slot, Some(&[self.optional_buffer(buffer)?]))
                }
                ContextCall::PSSetShaderResources { start_slot, ref views } => {
                    let views = views
                        .iter()
                        .map(|&view| if view.is_null() { Ok(None) } else { self.srv(view).map(Some) })
                        .collect::<HrResult<Vec<_>>>()?;
                    context.PSSetShaderResources(start_slot, Some(&views));
                }
                ContextCall::PSSetSamplers { start_slot, ref samplers } => {
                    let samplers = samplers
                        .iter()
                        .map(|&sampler| self.sampler(sampler).map(Some))
                        .collect::<HrResult<Vec<_>>>()?;
                    context.PSSetSamplers(start_slot, Some(&samplers));
                }
                ContextCall::RSSetState(state) => context.RSSetState(&self.rasterizer(state)?),
                ContextCall::RSSetViewport { width, height } => context.RSSetViewports(Some(&[D3D11_VIEWPORT {
                    TopLeftX: 0.0,
                    TopLeftY: 0.0,
                    Width: width as f32,
                    Height: height as f32,
                    MinDepth: D3D11_MIN_DEPTH,
                    MaxDepth: D3D11_MAX_DEPTH,
                }])),
                ContextCall::OMSetDepthStencilState(state) => {
                    context.OMSetDepthStencilState(&self.depth_stencil(state)?, 0)
                }
                ContextCall::OMSetRenderTargets { rtv, dsv } => {
                    let rtv = rtv.map(|h| self.rtv(h)).transpose()?;
                    let dsv = dsv.map(|h| self.dsv(h)).transpose()?;
                    let targets = [rtv];
                    let targets = if targets[0].is_some() { Some(&targets[..]) } else { None };
                    context.OMSetRenderTargets(targets, dsv.as_ref());
                }
                ContextCall::ClearRenderTargetView { rtv, color } => {
                    context.ClearRenderTargetView(&self.rtv(rtv)?, color.as_ptr().cast())
                }
                ContextCall::ClearDepthStencilView { dsv, depth } => {
                    context.ClearDepthStencilView(&self.dsv(dsv)?, D3D11_CLEAR_DEPTH.0 as u32, depth, 0)
                }
                ContextCall::DrawInstanced { vertex_count, instance_count } => {
                    context.DrawInstanced(vertex_count, instance_count, 0, 0)
                }
                ContextCall::DrawIndexedInstanced { index_count, instance_count } => {
                    context.DrawIndexedInstanced(index_count, instance_count, 0, 0, 0)
                }
                ContextCall::ResolveSubresource { dst, src, format } => {
                    let (dst, src) = (self.texture(dst)?, self.texture(src)?);
                    context.ResolveSubresource(&dst, 0, &src, 0, dxgi_format(format));
                }
            }
        }
        Ok(())
    }
}

// ===== DEVICE =====

pub struct NativeDx11Device {
    device: ID3D11Device,
    factory: IDXGIFactory2,
    hwnd: isize,
    adapter: String,
    state: Mutex<State>,
}

// SAFETY: ID3D11Device is free-threaded; the immediate context and the
// object table are only reached through the state mutex.
unsafe impl Send for NativeDx11Device {}
unsafe impl Sync for NativeDx11Device {}

impl NativeDx11Device {
    /// Create a hardware device (feature level 11.0 or better) presenting to `window`
    pub fn new<W: HasWindowHandle>(window: &W, debug: bool) -> Result<Self> {
        let handle = window
            .window_handle()
            .map_err(|e| Error::InitializationFailed(format!("No window handle: {}", e)))?;
        let RawWindowHandle::Win32(win32) = handle.as_raw() else {
            return Err(Error::InitializationFailed("Direct3D 11 needs a Win32 window".to_string()));
        };

        let mut flags = D3D11_CREATE_DEVICE_BGRA_SUPPORT;
        if debug {
            flags |= D3D11_CREATE_DEVICE_DEBUG;
        }
        let levels = [D3D_FEATURE_LEVEL_11_1, D3D_FEATURE_LEVEL_11_0];
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                HMODULE::default(),
                flags,
                Some(&levels),
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
        }
        .map_err(|e| init_err("Failed to create Direct3D 11 device", e))?;
        let (Some(device), Some(context)) = (device, context) else {
            return Err(Error::InitializationFailed("D3D11CreateDevice returned no device".to_string()));
        };

        let adapter: IDXGIAdapter = unsafe { device.cast::<IDXGIDevice>().and_then(|dxgi| dxgi.GetAdapter()) }
            .map_err(|e| init_err("Failed to query DXGI adapter", e))?;
        let name = unsafe { adapter.GetDesc() }.map(|desc| utf16_name(&desc.Description)).unwrap_or_default();
        let factory: IDXGIFactory2 =
            unsafe { adapter.GetParent() }.map_err(|e| init_err("Failed to query DXGI factory", e))?;

        tetra_render::render_info!(SOURCE, "D3D11 device on '{}'", name);
        Ok(Self {
            device,
            factory,
            hwnd: win32.hwnd.get(),
            adapter: name,
            state: Mutex::new(State { context, next_handle: 0, objects: FxHashMap::default() }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, object: Object) -> NativeHandle {
        self.lock().insert(object)
    }
}

impl Dx11Device for NativeDx11Device {
    fn adapter_name(&self) -> String {
        self.adapter.clone()
    }

    fn max_sample_count(&self, format: u32) -> u32 {
        [8, 4, 2]
            .into_iter()
            .find(|&count| {
                let levels = unsafe { self.device.CheckMultisampleQualityLevels(dxgi_format(format), count) };
                levels.is_ok_and(|levels| levels > 0)
            })
            .unwrap_or(1)
    }

    // ===== OBJECTS =====

    fn create_buffer(&self, label: &str, desc: &BufferResourceDesc, initial: Option<&[u8]>) -> HrResult<NativeHandle> {
        let bind = match desc.bind {
            BufferBind::Vertex => D3D11_BIND_VERTEX_BUFFER,
            BufferBind::Index => D3D11_BIND_INDEX_BUFFER,
            BufferBind::Constant => D3D11_BIND_CONSTANT_BUFFER,
        };
        let native = D3D11_BUFFER_DESC {
            ByteWidth: desc.size,
            Usage: if desc.dynamic { D3D11_USAGE_DYNAMIC } else { D3D11_USAGE_DEFAULT },
            BindFlags: bind.0 as u32,
            CPUAccessFlags: if desc.dynamic { D3D11_CPU_ACCESS_WRITE.0 as u32 } else { 0 },
            ..Default::default()
        };
        let data = initial.map(|bytes| D3D11_SUBRESOURCE_DATA { pSysMem: bytes.as_ptr().cast(), ..Default::default() });
        let mut buffer = None;
        let result =
            unsafe { self.device.CreateBuffer(&native, data.as_ref().map(|d| d as *const _), Some(&mut buffer)) };
        let buffer = created(result, buffer).inspect_err(|code| {
            tetra_render::render_warn!(SOURCE, "Buffer '{}' rejected: {:#x}", label, code);
        })?;
        Ok(self.insert(Object::Buffer(buffer)))
    }

    fn update_subresource(&self, buffer: NativeHandle, offset: u32, data: &[u8]) -> HrResult<()> {
        let state = self.lock();
        let buffer = state.buffer(buffer)?;
        let region = D3D11_BOX {
            left: offset,
            top: 0,
            front: 0,
            right: offset + data.len() as u32,
            bottom: 1,
            back: 1,
        };
        unsafe { state.context.UpdateSubresource(&buffer, 0, Some(&region), data.as_ptr().cast(), 0, 0) };
        Ok(())
    }

    fn map_discard(&self, buffer: NativeHandle, data: &[u8]) -> HrResult<()> {
        let state = self.lock();
        let buffer = state.buffer(buffer)?;
        let mut desc = D3D11_BUFFER_DESC::default();
        unsafe { buffer.GetDesc(&mut desc) };
        if data.len() > desc.ByteWidth as usize {
            return Err(E_INVALIDARG);
        }
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            state.context.Map(&buffer, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped)).map_err(hr)?;
            ptr::copy_nonoverlapping(data.as_ptr(), mapped.pData.cast::<u8>(), data.len());
            state.context.Unmap(&buffer, 0);
        }
        Ok(())
    }

    fn create_texture2d(
        &self,
        label: &str,
        desc: &Texture2DDesc,
        initial: &[SubresourceData<'_>],
    ) -> HrResult<NativeHandle> {
        let mut bind = 0;
        if desc.shader_resource {
            bind |= D3D11_BIND_SHADER_RESOURCE.0;
        }
        if desc.render_target {
            bind |= D3D11_BIND_RENDER_TARGET.0;
        }
        if desc.depth_stencil {
            bind |= D3D11_BIND_DEPTH_STENCIL.0;
        }
        let native = D3D11_TEXTURE2D_DESC {
            Width: desc.width,
            Height: desc.height,
            MipLevels: 1,
            ArraySize: desc.array_size,
            Format: dxgi_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC { Count: desc.samples, Quality: 0 },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: bind as u32,
            CPUAccessFlags: 0,
            MiscFlags: if desc.cube { D3D11_RESOURCE_MISC_TEXTURECUBE.0 as u32 } else { 0 },
        };
        let data: Vec<D3D11_SUBRESOURCE_DATA> = initial
            .iter()
            .map(|sub| D3D11_SUBRESOURCE_DATA {
                pSysMem: sub.bytes.as_ptr().cast(),
                SysMemPitch: sub.row_pitch,
                SysMemSlicePitch: 0,
            })
            .collect();
        let initial = if data.is_empty() { None } else { Some(data.as_ptr()) };
        let mut texture = None;
        let result = unsafe { self.device.CreateTexture2D(&native, initial, Some(&mut texture)) };
        let texture = created(result, texture).inspect_err(|code| {
            tetra_render::render_warn!(SOURCE, "Texture '{}' rejected: {:#x}", label, code);
        })?;
        Ok(self.insert(Object::Texture(texture)))
    }

    fn create_view(&self, resource: NativeHandle, kind: ViewKind) -> HrResult<NativeHandle> {
        let texture = self.lock().texture(resource)?;
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };
        let multisampled = desc.SampleDesc.Count > 1;

        let object = match kind {
            ViewKind::RenderTarget { format } => {
                let view = D3D11_RENDER_TARGET_VIEW_DESC {
                    Format: dxgi_format(format),
                    ViewDimension: if multisampled {
                        D3D11_RTV_DIMENSION_TEXTURE2DMS
                    } else {
                        D3D11_RTV_DIMENSION_TEXTURE2D
                    },
                    Anonymous: D3D11_RENDER_TARGET_VIEW_DESC_0 { Texture2D: D3D11_TEX2D_RTV::default() },
                };
                let mut rtv = None;
                let result = unsafe { self.device.CreateRenderTargetView(&texture, Some(&view), Some(&mut rtv)) };
                Object::RenderTargetView(created(result, rtv)?)
            }
            ViewKind::DepthStencil { format } => {
                let view = D3D11_DEPTH_STENCIL_VIEW_DESC {
                    Format: dxgi_format(format),
                    ViewDimension: if multisampled {
                        D3D11_DSV_DIMENSION_TEXTURE2DMS
                    } else {
                        D3D11_DSV_DIMENSION_TEXTURE2D
                    },
                    Flags: 0,
                    Anonymous: D3D11_DEPTH_STENCIL_VIEW_DESC_0 { Texture2D: D3D11_TEX2D_DSV::default() },
                };
                let mut dsv = None;
                let result = unsafe { self.device.CreateDepthStencilView(&texture, Some(&view), Some(&mut dsv)) };
                Object::DepthStencilView(created(result, dsv)?)
            }
            ViewKind::ShaderResource { format, cube } => {
                let (dimension, anonymous) = if cube {
                    (
                        D3D_SRV_DIMENSION_TEXTURECUBE,
                        D3D11_SHADER_RESOURCE_VIEW_DESC_0 {
                            TextureCube: D3D11_TEXCUBE_SRV { MostDetailedMip: 0, MipLevels: 1 },
                        },
                    )
                } else {
                    (
                        D3D_SRV_DIMENSION_TEXTURE2D,
                        D3D11_SHADER_RESOURCE_VIEW_DESC_0 {
                            Texture2D: D3D11_TEX2D_SRV { MostDetailedMip: 0, MipLevels: 1 },
                        },
                    )
                };
                let view = D3D11_SHADER_RESOURCE_VIEW_DESC {
                    Format: dxgi_format(format),
                    ViewDimension: dimension,
                    Anonymous: anonymous,
                };
                let mut srv = None;
                let result = unsafe { self.device.CreateShaderResourceView(&texture, Some(&view), Some(&mut srv)) };
                Object::ShaderResourceView(created(result, srv)?)
            }
        };
        Ok(self.insert(object))
    }

    fn create_rasterizer_state(&self, desc: &RasterizerDesc) -> HrResult<NativeHandle> {
        let native = D3D11_RASTERIZER_DESC {
            FillMode: D3D11_FILL_MODE(desc.fill_mode as i32),
            CullMode: D3D11_CULL_MODE(desc.cull_mode as i32),
            FrontCounterClockwise: true.into(),
            DepthClipEnable: true.into(),
            MultisampleEnable: desc.multisample.into(),
            ..Default::default()
        };
        let mut state = None;
        let result = unsafe { self.device.CreateRasterizerState(&native, Some(&mut state)) };
        Ok(self.insert(Object::Rasterizer(created(result, state)?)))
    }

    fn create_depth_stencil_state(&self, desc: &DepthStencilDesc) -> HrResult<NativeHandle> {
        let native = D3D11_DEPTH_STENCIL_DESC {
            DepthEnable: desc.depth_enable.into(),
            DepthWriteMask: if desc.depth_write { D3D11_DEPTH_WRITE_MASK_ALL } else { D3D11_DEPTH_WRITE_MASK_ZERO },
            DepthFunc: D3D11_COMPARISON_FUNC(desc.depth_func as i32),
            ..Default::default()
        };
        let mut state = None;
        let result = unsafe { self.device.CreateDepthStencilState(&native, Some(&mut state)) };
        Ok(self.insert(Object::DepthStencil(created(result, state)?)))
    }

    fn create_sampler_state(&self, kind: SamplerKind) -> HrResult<NativeHandle> {
        let (filter, address, compare) = match kind {
            SamplerKind::LinearWrap => {
                (D3D11_FILTER_MIN_MAG_MIP_LINEAR, D3D11_TEXTURE_ADDRESS_WRAP, D3D11_COMPARISON_NEVER)
            }
            SamplerKind::ShadowCompare => (
                D3D11_FILTER_COMPARISON_MIN_MAG_LINEAR_MIP_POINT,
                D3D11_TEXTURE_ADDRESS_BORDER,
                D3D11_COMPARISON_LESS_EQUAL,
            ),
        };
        let native = D3D11_SAMPLER_DESC {
            Filter: filter,
            AddressU: address,
            AddressV: address,
            AddressW: address,
            MipLODBias: 0.0,
            MaxAnisotropy: 1,
            ComparisonFunc: compare,
            BorderColor: [1.0; 4],
            MinLOD: 0.0,
            MaxLOD: D3D11_FLOAT32_MAX,
        };
        let mut sampler = None;
        let result = unsafe { self.device.CreateSamplerState(&native, Some(&mut sampler)) };
        Ok(self.insert(Object::Sampler(created(result, sampler)?)))
    }

    fn create_vertex_shader(&self, bytecode: &[u8]) -> HrResult<NativeHandle> {
        let mut shader = None;
        let result = unsafe { self.device.CreateVertexShader(bytecode, None, Some(&mut shader)) };
        Ok(self.insert(Object::VertexShader(created(result, shader)?)))
    }

    fn create_pixel_shader(&self, bytecode: &[u8]) -> HrResult<NativeHandle> {
        let mut shader = None;
        let result = unsafe { self.device.CreatePixelShader(bytecode, None, Some(&mut shader)) };
        Ok(self.insert(Object::PixelShader(created(result, shader)?)))
    }

    fn create_input_layout(&self, elements: &[InputElement], vertex_bytecode: &[u8]) -> HrResult<NativeHandle> {
        let semantics = elements
            .iter()
            .map(|element| CString::new(element.semantic).map_err(|_| E_INVALIDARG))
            .collect::<HrResult<Vec<_>>>()?;
        let native: Vec<D3D11_INPUT_ELEMENT_DESC> = elements
            .iter()
            .zip(&semantics)
            .map(|(element, semantic)| D3D11_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(semantic.as_ptr().cast()),
                SemanticIndex: 0,
                Format: dxgi_format(element.format),
                InputSlot: element.input_slot,
                AlignedByteOffset: element.offset,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            })
            .collect();
        let mut layout = None;
        let result = unsafe { self.device.CreateInputLayout(&native, vertex_bytecode, Some(&mut layout)) };
        Ok(self.insert(Object::InputLayout(created(result, layout)?)))
    }

    fn release(&self, handle: NativeHandle) {
        if self.lock().objects.remove(&handle).is_none() {
            tetra_render::render_warn!(SOURCE, "Release of unknown handle {:?}", handle);
        }
    }

    // ===== IMMEDIATE CONTEXT =====

    fn call(&self, call: ContextCall) {
        if self.lock().apply(&call).is_err() {
            tetra_render::render_warn!(SOURCE, "Dropped context call with unknown handle: {:?}", call);
        }
    }

    fn flush(&self) -> HrResult<()> {
        let desc = D3D11_QUERY_DESC { Query: D3D11_QUERY_EVENT, MiscFlags: 0 };
        let mut query = None;
        let result = unsafe { self.device.CreateQuery(&desc, Some(&mut query)) };
        let query: ID3D11Query = created(result, query)?;

        let state = self.lock();
        unsafe {
            state.context.End(&query);
            state.context.Flush();
        }
        let mut done = BOOL(0);
        while !done.as_bool() {
            unsafe {
                state.context.GetData(&query, Some(&mut done as *mut BOOL as *mut c_void), size_of::<BOOL>() as u32, 0)
            }
            .map_err(hr)?;
            std::thread::yield_now();
        }
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
        let swapchain =
            unsafe { self.factory.CreateSwapChainForHwnd(&self.device, hwnd, &native, None, None::<&IDXGIOutput>) }
                .map_err(hr)?;
        // Fullscreen transitions are the application's call
        let _ = unsafe { self.factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER) };
        Ok(self.insert(Object::Swapchain(swapchain)))
    }

    fn swapchain_buffer(&self, swapchain: NativeHandle) -> HrResult<NativeHandle> {
        let swapchain = self.lock().swapchain(swapchain)?;
        let buffer: ID3D11Texture2D = unsafe { swapchain.GetBuffer(0) }.map_err(hr)?;
        Ok(self.insert(Object::Texture(buffer)))
    }

    fn resize_buffers(&self, swapchain: NativeHandle, width: u32, height: u32) -> HrResult<()> {
        let state = self.lock();
        let swapchain = state.swapchain(swapchain)?;
        // Views of the old buffers may still be bound
        unsafe {
            state.context.OMSetRenderTargets(None, None::<&ID3D11DepthStencilView>);
            state.context.Flush();
        }
        drop(state);
        unsafe { swapchain.ResizeBuffers(0, width, height, DXGI_FORMAT_UNKNOWN, DXGI_SWAP_CHAIN_FLAG(0)) }
            .map_err(hr)
    }

    fn present(&self, swapchain: NativeHandle, sync_interval: u32) -> HrResult<()> {
        let swapchain = self.lock().swapchain(swapchain)?;
        unsafe { swapchain.Present(sync_interval, DXGI_PRESENT(0)) }.ok().map_err(hr)
    }
}
