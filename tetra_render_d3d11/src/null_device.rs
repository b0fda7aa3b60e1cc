/// NullDx11Device - headless Direct3D 11 driver
///
/// Keeps the immediate context's bound state so draws can be checked the
/// way the debug layer checks them:
/// - a draw needs an input layout, a vertex shader, vertex stream 0 and an
///   output target; an indexed draw also needs an index buffer
/// - nothing bound at draw time may have been released
/// - dynamic buffers are written with `map_discard` only, default ones with
///   `update_subresource` only
/// - back-buffer references (views included, and the bound render target)
///   must be gone before `resize_buffers`
///
/// Violations are collected in `violations()`.

use std::sync::{Mutex, MutexGuard, PoisonError};
use rustc_hash::FxHashMap;

use crate::d3d11_convert::{DXGI_ERROR_INVALID_CALL, E_INVALIDARG};
use crate::device::*;

const SOURCE: &str = "tetra::d3d11::null";

/// Slots tracked per shader-visible table
const TRACKED_SLOTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Buffer,
    Texture,
    View,
    RasterizerState,
    DepthStencilState,
    Sampler,
    VertexShader,
    PixelShader,
    InputLayout,
    Swapchain,
    BackBuffer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullCounters {
    pub draws: u64,
    pub maps: u64,
    pub subresource_updates: u64,
    pub flushes: u64,
    pub presents: u64,
    pub resizes: u64,
    pub rasterizer_states_created: u64,
    pub depth_states_created: u64,
    pub input_layouts_created: u64,
}

struct Object {
    kind: ObjectKind,
    label: String,
}

struct BufferData {
    desc: BufferResourceDesc,
    bytes: Vec<u8>,
}

/// Immediate-context state that draws read
#[derive(Default)]
struct BoundState {
    input_layout: Option<NativeHandle>,
    vertex_shader: Option<NativeHandle>,
    pixel_shader: Option<NativeHandle>,
    vertex_buffers: [Option<NativeHandle>; 2],
    index_buffer: Option<NativeHandle>,
    constant_buffers: [Option<NativeHandle>; TRACKED_SLOTS],
    shader_resources: [Option<NativeHandle>; TRACKED_SLOTS],
    rasterizer: Option<NativeHandle>,
    depth_stencil: Option<NativeHandle>,
    rtv: Option<NativeHandle>,
    dsv: Option<NativeHandle>,
}

impl BoundState {
    fn referenced(&self) -> Vec<NativeHandle> {
        let mut handles: Vec<NativeHandle> = [
            self.input_layout,
            self.vertex_shader,
            self.pixel_shader,
            self.index_buffer,
            self.rasterizer,
            self.depth_stencil,
            self.rtv,
            self.dsv,
        ]
        .into_iter()
        .flatten()
        .collect();
        handles.extend(self.vertex_buffers.iter().flatten());
        handles.extend(self.constant_buffers.iter().flatten());
        handles.extend(self.shader_resources.iter().flatten());
        handles
    }
}

struct NullState {
    max_samples: u32,
    next_handle: u64,
    objects: FxHashMap<NativeHandle, Object>,
    buffers: FxHashMap<NativeHandle, BufferData>,
    swapchains: FxHashMap<NativeHandle, SwapchainDesc>,
    /// Back-buffer reference -> owning swapchain
    back_buffers: FxHashMap<NativeHandle, NativeHandle>,
    /// Views created on back buffers -> owning swapchain; kept after release
    back_buffer_views: FxHashMap<NativeHandle, NativeHandle>,
    bound: BoundState,
    calls: Vec<ContextCall>,
    violations: Vec<String>,
    counters: NullCounters,
    fail_next_present: Option<HResult>,
    fail_next_allocation: Option<HResult>,
}

impl NullState {
    fn alloc(&mut self, kind: ObjectKind, label: &str) -> NativeHandle {
        self.next_handle += 1;
        let handle = NativeHandle(self.next_handle);
        self.objects.insert(handle, Object { kind, label: label.to_string() });
        handle
    }

    fn violation(&mut self, message: String) {
        tetra_render::render_warn!(SOURCE, "{}", message);
        self.violations.push(message);
    }

    fn is_live(&self, handle: NativeHandle) -> bool {
        self.objects.contains_key(&handle)
    }

    fn apply(&mut self, call: &ContextCall) {
        let bound = &mut self.bound;
        match call {
            ContextCall::IASetInputLayout(layout) => bound.input_layout = Some(*layout),
            ContextCall::IASetVertexBuffer { slot, buffer, .. } => {
                if let Some(entry) = bound.vertex_buffers.get_mut(*slot as usize) {
                    *entry = *buffer;
                }
            }
            ContextCall::IASetIndexBuffer { buffer, .. } => bound.index_buffer = Some(*buffer),
            ContextCall::VSSetShader(shader) => bound.vertex_shader = Some(*shader),
            ContextCall::PSSetShader(shader) => bound.pixel_shader = *shader,
            ContextCall::VSSetConstantBuffer { slot, buffer } | ContextCall::PSSetConstantBuffer { slot, buffer } => {
                if let Some(entry) = bound.constant_buffers.get_mut(*slot as usize) {
                    *entry = *buffer;
                }
            }
            ContextCall::PSSetShaderResources { start_slot, views } => {
                for (index, view) in views.iter().enumerate() {
                    if let Some(entry) = bound.shader_resources.get_mut(*start_slot as usize + index) {
                        *entry = Some(*view);
                    }
                }
            }
            ContextCall::RSSetState(state) => bound.rasterizer = Some(*state),
            ContextCall::OMSetDepthStencilState(state) => bound.depth_stencil = Some(*state),
            ContextCall::OMSetRenderTargets { rtv, dsv } => {
                bound.rtv = *rtv;
                bound.dsv = *dsv;
            }
            ContextCall::DrawInstanced { .. } => self.check_draw(false),
            ContextCall::DrawIndexedInstanced { .. } => self.check_draw(true),
            ContextCall::ClearRenderTargetView { rtv: view, .. } | ContextCall::ClearDepthStencilView { dsv: view, .. } => {
                if !self.is_live(*view) {
                    self.violation(format!("Clear of released view {:?}", view));
                }
            }
            ContextCall::ResolveSubresource { dst, src, .. } => {
                if !self.is_live(*dst) || !self.is_live(*src) {
                    self.violation(format!("Resolve between released resources {:?} <- {:?}", dst, src));
                }
            }
            ContextCall::IASetPrimitiveTopology(_)
            | ContextCall::PSSetSamplers { .. }
            | ContextCall::RSSetViewport { .. } => {}
        }
    }

    fn check_draw(&mut self, indexed: bool) {
        self.counters.draws += 1;
        let bound = &self.bound;
        let mut problems = Vec::new();
        if bound.input_layout.is_none() || bound.vertex_shader.is_none() {
            problems.push("draw without input layout and vertex shader".to_string());
        }
        if bound.vertex_buffers[0].is_none() {
            problems.push("draw without vertex stream 0".to_string());
        }
        if indexed && bound.index_buffer.is_none() {
            problems.push("indexed draw without index buffer".to_string());
        }
        if bound.rtv.is_none() && bound.dsv.is_none() {
            problems.push("draw without output target".to_string());
        }
        let released: Vec<NativeHandle> =
            bound.referenced().into_iter().filter(|h| !self.objects.contains_key(h)).collect();
        if !released.is_empty() {
            problems.push(format!("draw references released object(s) {:?}", released));
        }
        for problem in problems {
            self.violation(problem);
        }
    }
}

pub struct NullDx11Device {
    state: Mutex<NullState>,
}

impl NullDx11Device {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NullState {
                max_samples: 8,
                next_handle: 0,
                objects: FxHashMap::default(),
                buffers: FxHashMap::default(),
                swapchains: FxHashMap::default(),
                back_buffers: FxHashMap::default(),
                back_buffer_views: FxHashMap::default(),
                bound: BoundState::default(),
                calls: Vec::new(),
                violations: Vec::new(),
                counters: NullCounters::default(),
                fail_next_present: None,
                fail_next_allocation: None,
            }),
        }
    }

    pub fn with_max_samples(self, samples: u32) -> Self {
        self.lock().max_samples = samples.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, NullState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== INSPECTION =====

    pub fn live_objects(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn live_objects_of(&self, kind: ObjectKind) -> usize {
        self.lock().objects.values().filter(|o| o.kind == kind).count()
    }

    pub fn object_label(&self, handle: NativeHandle) -> Option<String> {
        self.lock().objects.get(&handle).map(|o| o.label.clone())
    }

    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    pub fn calls(&self) -> Vec<ContextCall> {
        self.lock().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<ContextCall> {
        std::mem::take(&mut self.lock().calls)
    }

    pub fn counters(&self) -> NullCounters {
        self.lock().counters
    }

    pub fn buffer_contents(&self, buffer: NativeHandle) -> Option<Vec<u8>> {
        self.lock().buffers.get(&buffer).map(|b| b.bytes.clone())
    }

    pub fn swapchain_extent(&self, swapchain: NativeHandle) -> Option<(u32, u32)> {
        self.lock().swapchains.get(&swapchain).map(|d| (d.width, d.height))
    }

    // ===== FAULT INJECTION =====

    pub fn fail_next_present(&self, hr: HResult) {
        self.lock().fail_next_present = Some(hr);
    }

    pub fn fail_next_allocation(&self, hr: HResult) {
        self.lock().fail_next_allocation = Some(hr);
    }
}

impl Default for NullDx11Device {
    fn default() -> Self {
        Self::new()
    }
}

impl Dx11Device for NullDx11Device {
    fn adapter_name(&self) -> String {
        "Null D3D11 Adapter".to_string()
    }

    fn max_sample_count(&self, _format: u32) -> u32 {
        self.lock().max_samples
    }

    fn create_buffer(&self, label: &str, desc: &BufferResourceDesc, initial: Option<&[u8]>) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        if let Some(hr) = state.fail_next_allocation.take() {
            return Err(hr);
        }
        if desc.size == 0 || (desc.bind == BufferBind::Constant && desc.size % 16 != 0) {
            return Err(E_INVALIDARG);
        }
        let mut bytes = vec![0u8; desc.size as usize];
        if let Some(data) = initial {
            if data.len() > bytes.len() {
                return Err(E_INVALIDARG);
            }
            bytes[..data.len()].copy_from_slice(data);
        }
        let handle = state.alloc(ObjectKind::Buffer, label);
        state.buffers.insert(handle, BufferData { desc: *desc, bytes });
        Ok(handle)
    }

    fn update_subresource(&self, buffer: NativeHandle, offset: u32, data: &[u8]) -> HrResult<()> {
        let mut state = self.lock();
        let dynamic = match state.buffers.get(&buffer) {
            Some(entry) => entry.desc.dynamic,
            None => {
                state.violation(format!("UpdateSubresource on unknown buffer {:?}", buffer));
                return Err(E_INVALIDARG);
            }
        };
        if dynamic {
            state.violation(format!("UpdateSubresource on dynamic buffer {:?}", buffer));
            return Err(E_INVALIDARG);
        }
        state.counters.subresource_updates += 1;
        let Some(entry) = state.buffers.get_mut(&buffer) else {
            return Err(E_INVALIDARG);
        };
        let start = offset as usize;
        let Some(end) = start.checked_add(data.len()).filter(|&end| end <= entry.bytes.len()) else {
            return Err(E_INVALIDARG);
        };
        entry.bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn map_discard(&self, buffer: NativeHandle, data: &[u8]) -> HrResult<()> {
        let mut state = self.lock();
        let dynamic = match state.buffers.get(&buffer) {
            Some(entry) => entry.desc.dynamic,
            None => {
                state.violation(format!("Map of unknown buffer {:?}", buffer));
                return Err(E_INVALIDARG);
            }
        };
        if !dynamic {
            state.violation(format!("Map(WRITE_DISCARD) on non-dynamic buffer {:?}", buffer));
            return Err(E_INVALIDARG);
        }
        state.counters.maps += 1;
        let Some(entry) = state.buffers.get_mut(&buffer) else {
            return Err(E_INVALIDARG);
        };
        if data.len() > entry.bytes.len() {
            return Err(E_INVALIDARG);
        }
        entry.bytes.fill(0);
        entry.bytes[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn create_texture2d(
        &self,
        label: &str,
        desc: &Texture2DDesc,
        initial: &[SubresourceData<'_>],
    ) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        if let Some(hr) = state.fail_next_allocation.take() {
            return Err(hr);
        }
        if desc.width == 0 || desc.height == 0 || desc.array_size == 0 || desc.samples > state.max_samples {
            return Err(E_INVALIDARG);
        }
        if desc.cube && desc.array_size != 6 {
            return Err(E_INVALIDARG);
        }
        if !initial.is_empty() {
            let valid = desc.samples == 1
                && initial.len() == desc.array_size as usize
                && initial.iter().all(|s| s.bytes.len() == s.row_pitch as usize * desc.height as usize);
            if !valid {
                return Err(E_INVALIDARG);
            }
        }
        Ok(state.alloc(ObjectKind::Texture, label))
    }

    fn create_view(&self, resource: NativeHandle, kind: ViewKind) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        if !state.is_live(resource) {
            state.violation(format!("{:?} created for unknown resource {:?}", kind, resource));
            return Err(E_INVALIDARG);
        }
        let view = state.alloc(ObjectKind::View, "view");
        if let Some(&swapchain) = state.back_buffers.get(&resource) {
            state.back_buffer_views.insert(view, swapchain);
        }
        Ok(view)
    }

    fn create_rasterizer_state(&self, _desc: &RasterizerDesc) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        state.counters.rasterizer_states_created += 1;
        Ok(state.alloc(ObjectKind::RasterizerState, "rasterizer state"))
    }

    fn create_depth_stencil_state(&self, _desc: &DepthStencilDesc) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        state.counters.depth_states_created += 1;
        Ok(state.alloc(ObjectKind::DepthStencilState, "depth-stencil state"))
    }

    fn create_sampler_state(&self, kind: SamplerKind) -> HrResult<NativeHandle> {
        Ok(self.lock().alloc(ObjectKind::Sampler, &format!("{:?} sampler", kind)))
    }

    fn create_vertex_shader(&self, bytecode: &[u8]) -> HrResult<NativeHandle> {
        if bytecode.is_empty() {
            return Err(E_INVALIDARG);
        }
        Ok(self.lock().alloc(ObjectKind::VertexShader, "vertex shader"))
    }

    fn create_pixel_shader(&self, bytecode: &[u8]) -> HrResult<NativeHandle> {
        if bytecode.is_empty() {
            return Err(E_INVALIDARG);
        }
        Ok(self.lock().alloc(ObjectKind::PixelShader, "pixel shader"))
    }

    fn create_input_layout(&self, elements: &[InputElement], vertex_bytecode: &[u8]) -> HrResult<NativeHandle> {
        if elements.is_empty() || vertex_bytecode.is_empty() {
            return Err(E_INVALIDARG);
        }
        let mut state = self.lock();
        state.counters.input_layouts_created += 1;
        Ok(state.alloc(ObjectKind::InputLayout, "input layout"))
    }

    fn release(&self, handle: NativeHandle) {
        let mut state = self.lock();
        if state.objects.remove(&handle).is_none() {
            state.violation(format!("Release of unknown or released object {:?}", handle));
            return;
        }
        state.buffers.remove(&handle);
        state.swapchains.remove(&handle);
        state.back_buffers.remove(&handle);
    }

    fn call(&self, call: ContextCall) {
        let mut state = self.lock();
        state.apply(&call);
        state.calls.push(call);
    }

    fn flush(&self) -> HrResult<()> {
        self.lock().counters.flushes += 1;
        Ok(())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> HrResult<NativeHandle> {
        if !(2..=16).contains(&desc.buffer_count) || desc.width == 0 || desc.height == 0 {
            return Err(DXGI_ERROR_INVALID_CALL);
        }
        let mut state = self.lock();
        let handle = state.alloc(ObjectKind::Swapchain, "swapchain");
        state.swapchains.insert(handle, *desc);
        Ok(handle)
    }

    fn swapchain_buffer(&self, swapchain: NativeHandle) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        if !state.swapchains.contains_key(&swapchain) {
            return Err(DXGI_ERROR_INVALID_CALL);
        }
        let handle = state.alloc(ObjectKind::BackBuffer, "back buffer");
        state.back_buffers.insert(handle, swapchain);
        Ok(handle)
    }

    fn resize_buffers(&self, swapchain: NativeHandle, width: u32, height: u32) -> HrResult<()> {
        let mut state = self.lock();
        let buffers = state.back_buffers.values().filter(|&&owner| owner == swapchain).count();
        let views = state
            .back_buffer_views
            .iter()
            .filter(|&(view, owner)| {
                *owner == swapchain && (state.objects.contains_key(view) || state.bound.rtv == Some(*view))
            })
            .count();
        if buffers + views > 0 {
            state.violation(format!(
                "ResizeBuffers with {} back-buffer reference(s) and {} view(s) outstanding",
                buffers, views
            ));
            return Err(DXGI_ERROR_INVALID_CALL);
        }
        let Some(desc) = state.swapchains.get_mut(&swapchain) else {
            return Err(DXGI_ERROR_INVALID_CALL);
        };
        desc.width = width;
        desc.height = height;
        state.counters.resizes += 1;
        Ok(())
    }

    fn present(&self, swapchain: NativeHandle, _sync_interval: u32) -> HrResult<()> {
        let mut state = self.lock();
        if let Some(hr) = state.fail_next_present.take() {
            return Err(hr);
        }
        if !state.swapchains.contains_key(&swapchain) {
            return Err(DXGI_ERROR_INVALID_CALL);
        }
        state.counters.presents += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "null_device_tests.rs"]
mod tests;
