/// NullDx12Device - headless Direct3D 12 driver
///
/// Runs the renderer without a GPU while keeping the rules it has to obey:
/// - a signalled fence value completes `lag` signals later, so waits on it
///   really block (counted in `NullCounters::blocking_waits`)
/// - an allocator may not be reset while lists recorded from it execute
/// - lists record only while open; draws need a root signature and a PSO
/// - back-buffer references must be released before `resize_buffers`
///
/// Misuse that a debug layer would report is collected in `violations()`
/// and the call fails the way the native one does.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use rustc_hash::FxHashMap;

use crate::d3d12_convert::{DXGI_ERROR_INVALID_CALL, E_FAIL, E_INVALIDARG};
use crate::device::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Resource,
    View,
    RootSignature,
    Pipeline,
    Fence,
    CommandAllocator,
    CommandList,
    Swapchain,
    BackBuffer,
}

/// One executed command list, as the queue saw it
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub queue: QueueKind,
    pub commands: Vec<ListCommand>,
}

impl Submission {
    pub fn draws(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, ListCommand::DrawInstanced { .. } | ListCommand::DrawIndexedInstanced { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullCounters {
    pub executes: u64,
    pub signals: u64,
    pub blocking_waits: u64,
    pub presents: u64,
    pub pipelines_created: u64,
    pub resizes: u64,
}

struct Object {
    kind: ObjectKind,
    label: String,
}

#[derive(Default)]
struct Fence {
    completed: u64,
    /// (value, clock tick at which it completes)
    pending: VecDeque<(u64, u64)>,
}

struct Allocator {
    /// Fence values guarding lists executed from this allocator
    in_flight: Vec<(NativeHandle, u64)>,
}

struct List {
    allocator: NativeHandle,
    open: bool,
    commands: Vec<ListCommand>,
    root_signature: bool,
    pipeline: bool,
}

struct Swapchain {
    desc: SwapchainDesc,
    current: u32,
}

struct NullState {
    lag: u64,
    max_samples: u32,
    next_handle: u64,
    clock: u64,
    objects: FxHashMap<NativeHandle, Object>,
    fences: FxHashMap<NativeHandle, Fence>,
    allocators: FxHashMap<NativeHandle, Allocator>,
    lists: FxHashMap<NativeHandle, List>,
    swapchains: FxHashMap<NativeHandle, Swapchain>,
    /// Back-buffer reference -> owning swapchain
    back_buffers: FxHashMap<NativeHandle, NativeHandle>,
    upload_heap: FxHashMap<NativeHandle, Vec<u8>>,
    /// Allocators executed on each queue since its last signal
    unsignalled: [Vec<NativeHandle>; 2],
    submissions: Vec<Submission>,
    violations: Vec<String>,
    counters: NullCounters,
    fail_next_present: Option<HResult>,
    fail_next_allocation: Option<HResult>,
}

fn queue_index(queue: QueueKind) -> usize {
    match queue {
        QueueKind::Direct => 0,
        QueueKind::Copy => 1,
    }
}

impl NullState {
    fn alloc(&mut self, kind: ObjectKind, label: &str) -> NativeHandle {
        self.next_handle += 1;
        let handle = NativeHandle(self.next_handle);
        self.objects.insert(handle, Object { kind, label: label.to_string() });
        handle
    }

    fn violation(&mut self, message: String) {
        tetra_render::render_warn!("tetra::d3d12::null", "{}", message);
        self.violations.push(message);
    }

    /// Complete every fence value whose tick has come
    fn advance(&mut self) {
        let clock = self.clock;
        for fence in self.fences.values_mut() {
            while let Some(&(value, complete_at)) = fence.pending.front() {
                if complete_at > clock {
                    break;
                }
                fence.completed = fence.completed.max(value);
                fence.pending.pop_front();
            }
        }
    }

    fn completed(&mut self, fence: NativeHandle) -> u64 {
        self.advance();
        self.fences.get(&fence).map_or(0, |f| f.completed)
    }
}

pub struct NullDx12Device {
    state: Mutex<NullState>,
}

impl NullDx12Device {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NullState {
                lag: 0,
                max_samples: 8,
                next_handle: 0,
                clock: 0,
                objects: FxHashMap::default(),
                fences: FxHashMap::default(),
                allocators: FxHashMap::default(),
                lists: FxHashMap::default(),
                swapchains: FxHashMap::default(),
                back_buffers: FxHashMap::default(),
                upload_heap: FxHashMap::default(),
                unsignalled: [Vec::new(), Vec::new()],
                submissions: Vec::new(),
                violations: Vec::new(),
                counters: NullCounters::default(),
                fail_next_present: None,
                fail_next_allocation: None,
            }),
        }
    }

    /// GPU running `lag` signals behind the CPU
    pub fn with_lag(self, lag: u64) -> Self {
        self.lock().lag = lag;
        self
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

    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    pub fn take_submissions(&self) -> Vec<Submission> {
        std::mem::take(&mut self.lock().submissions)
    }

    pub fn counters(&self) -> NullCounters {
        self.lock().counters
    }

    /// Current contents of an upload-heap buffer
    pub fn upload_contents(&self, resource: NativeHandle) -> Option<Vec<u8>> {
        self.lock().upload_heap.get(&resource).cloned()
    }

    pub fn swapchain_extent(&self, swapchain: NativeHandle) -> Option<(u32, u32)> {
        self.lock().swapchains.get(&swapchain).map(|s| (s.desc.width, s.desc.height))
    }

    // ===== FAULT INJECTION =====

    pub fn fail_next_present(&self, hr: HResult) {
        self.lock().fail_next_present = Some(hr);
    }

    pub fn fail_next_allocation(&self, hr: HResult) {
        self.lock().fail_next_allocation = Some(hr);
    }
}

impl Default for NullDx12Device {
    fn default() -> Self {
        Self::new()
    }
}

impl Dx12Device for NullDx12Device {
    fn adapter_name(&self) -> String {
        "Null D3D12 Adapter".to_string()
    }

    fn max_sample_count(&self, _format: u32) -> u32 {
        self.lock().max_samples
    }

    fn create_committed_resource(
        &self,
        label: &str,
        heap: HeapKind,
        desc: &ResourceDesc,
        _initial_state: ResourceState,
    ) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        if let Some(hr) = state.fail_next_allocation.take() {
            return Err(hr);
        }
        match (*desc, heap) {
            (ResourceDesc::Buffer { size: 0 }, _) => Err(E_INVALIDARG),
            (ResourceDesc::Buffer { size }, HeapKind::Upload) => {
                let handle = state.alloc(ObjectKind::Resource, label);
                state.upload_heap.insert(handle, vec![0; size as usize]);
                Ok(handle)
            }
            (ResourceDesc::Buffer { .. }, HeapKind::Default) => Ok(state.alloc(ObjectKind::Resource, label)),
            (ResourceDesc::Texture2D { width, height, array_size, samples, .. }, HeapKind::Default) => {
                if width == 0 || height == 0 || array_size == 0 || samples > state.max_samples {
                    return Err(E_INVALIDARG);
                }
                Ok(state.alloc(ObjectKind::Resource, label))
            }
            (ResourceDesc::Texture2D { .. }, HeapKind::Upload) => Err(E_INVALIDARG),
        }
    }

    fn write_buffer(&self, resource: NativeHandle, offset: u64, data: &[u8]) -> HrResult<()> {
        let mut state = self.lock();
        let Some(bytes) = state.upload_heap.get_mut(&resource) else {
            state.violation(format!("Map of {:?}, which is not an upload-heap buffer", resource));
            return Err(E_INVALIDARG);
        };
        let start = offset as usize;
        let Some(end) = start.checked_add(data.len()).filter(|&end| end <= bytes.len()) else {
            return Err(E_INVALIDARG);
        };
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_view(&self, resource: NativeHandle, kind: ViewKind) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        if !state.objects.contains_key(&resource) {
            state.violation(format!("{:?} created for unknown resource {:?}", kind, resource));
            return Err(E_INVALIDARG);
        }
        Ok(state.alloc(ObjectKind::View, "view"))
    }

    fn create_root_signature(&self, desc: &RootSignatureDesc) -> HrResult<NativeHandle> {
        // 64 DWORDs: root constants cost one per value, root descriptors two, tables one
        let cost: u32 = desc
            .parameters
            .iter()
            .map(|p| match p {
                RootParameter::Constants { values, .. } => *values,
                RootParameter::ConstantBufferView { .. } => 2,
                RootParameter::ShaderResourceTable { .. } => 1,
            })
            .sum();
        if cost > 64 {
            return Err(E_INVALIDARG);
        }
        Ok(self.lock().alloc(ObjectKind::RootSignature, "root signature"))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        if !state.objects.contains_key(&desc.root_signature) {
            state.violation(format!("PSO '{}' references an unknown root signature", desc.label));
            return Err(E_INVALIDARG);
        }
        if desc.vertex_shader.is_empty() || desc.input_layout.is_empty() || desc.sample_count > state.max_samples {
            return Err(E_INVALIDARG);
        }
        if desc.rtv_format.is_some() != desc.pixel_shader.is_some() {
            return Err(E_INVALIDARG);
        }
        state.counters.pipelines_created += 1;
        Ok(state.alloc(ObjectKind::Pipeline, desc.label))
    }

    fn release(&self, handle: NativeHandle) {
        let mut state = self.lock();
        if state.objects.remove(&handle).is_none() {
            state.violation(format!("Release of unknown or released object {:?}", handle));
            return;
        }
        state.fences.remove(&handle);
        state.allocators.remove(&handle);
        state.lists.remove(&handle);
        state.swapchains.remove(&handle);
        state.back_buffers.remove(&handle);
        state.upload_heap.remove(&handle);
    }

    fn create_fence(&self, initial_value: u64) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        let handle = state.alloc(ObjectKind::Fence, "fence");
        state.fences.insert(handle, Fence { completed: initial_value, pending: VecDeque::new() });
        Ok(handle)
    }

    fn completed_value(&self, fence: NativeHandle) -> u64 {
        self.lock().completed(fence)
    }

    fn signal(&self, queue: QueueKind, fence: NativeHandle, value: u64) -> HrResult<()> {
        let mut state = self.lock();
        if !state.fences.contains_key(&fence) {
            return Err(E_INVALIDARG);
        }
        state.clock += 1;
        state.counters.signals += 1;
        let complete_at = state.clock + state.lag;
        if let Some(entry) = state.fences.get_mut(&fence) {
            entry.pending.push_back((value, complete_at));
        }
        let executed = std::mem::take(&mut state.unsignalled[queue_index(queue)]);
        for allocator in executed {
            if let Some(entry) = state.allocators.get_mut(&allocator) {
                entry.in_flight.push((fence, value));
            }
        }
        state.advance();
        Ok(())
    }

    fn wait_for_value(&self, fence: NativeHandle, value: u64, timeout_ms: u32) -> HrResult<bool> {
        let mut state = self.lock();
        if !state.fences.contains_key(&fence) {
            return Err(E_INVALIDARG);
        }
        if state.completed(fence) >= value {
            return Ok(true);
        }
        if timeout_ms == 0 {
            return Ok(false);
        }
        let complete_at = state
            .fences
            .get(&fence)
            .and_then(|f| f.pending.iter().find(|(pending, _)| *pending >= value).map(|&(_, at)| at));
        match complete_at {
            Some(at) => {
                state.counters.blocking_waits += 1;
                state.clock = state.clock.max(at);
                state.advance();
                Ok(true)
            }
            None => {
                state.violation(format!("Wait for fence value {} that nothing will signal", value));
                Ok(false)
            }
        }
    }

    fn create_command_allocator(&self, _queue: QueueKind) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        let handle = state.alloc(ObjectKind::CommandAllocator, "command allocator");
        state.allocators.insert(handle, Allocator { in_flight: Vec::new() });
        Ok(handle)
    }

    fn reset_command_allocator(&self, allocator: NativeHandle) -> HrResult<()> {
        let mut state = self.lock();
        state.advance();
        if state.unsignalled.iter().any(|executed| executed.contains(&allocator)) {
            state.violation(format!("Allocator {:?} reset after an unfenced execute", allocator));
            return Err(E_FAIL);
        }
        if state.lists.values().any(|l| l.allocator == allocator && l.open) {
            state.violation(format!("Allocator {:?} reset while a list records into it", allocator));
            return Err(E_FAIL);
        }
        let fences = &state.fences;
        let busy = state.allocators.get(&allocator).map_or(false, |entry| {
            entry
                .in_flight
                .iter()
                .any(|(fence, value)| fences.get(fence).map_or(false, |f| f.completed < *value))
        });
        if busy {
            state.violation(format!("Allocator {:?} reset while its command lists execute", allocator));
            return Err(E_FAIL);
        }
        match state.allocators.get_mut(&allocator) {
            Some(entry) => {
                entry.in_flight.clear();
                Ok(())
            }
            None => Err(E_INVALIDARG),
        }
    }

    fn create_command_list(&self, _queue: QueueKind, allocator: NativeHandle) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        if !state.allocators.contains_key(&allocator) {
            return Err(E_INVALIDARG);
        }
        let handle = state.alloc(ObjectKind::CommandList, "command list");
        state.lists.insert(
            handle,
            List { allocator, open: false, commands: Vec::new(), root_signature: false, pipeline: false },
        );
        Ok(handle)
    }

    fn reset_command_list(&self, list: NativeHandle, allocator: NativeHandle) -> HrResult<()> {
        let mut state = self.lock();
        let open = match state.lists.get(&list) {
            Some(entry) => entry.open,
            None => return Err(E_INVALIDARG),
        };
        if open {
            state.violation(format!("Reset of open command list {:?}", list));
            return Err(E_FAIL);
        }
        if let Some(entry) = state.lists.get_mut(&list) {
            *entry = List { allocator, open: true, commands: Vec::new(), root_signature: false, pipeline: false };
        }
        Ok(())
    }

    fn record(&self, list: NativeHandle, command: ListCommand) {
        let mut state = self.lock();
        let Some(entry) = state.lists.get_mut(&list) else {
            state.violation(format!("Recording into unknown list {:?}", list));
            return;
        };
        if !entry.open {
            state.violation(format!("Recording {:?} into closed list {:?}", command, list));
            return;
        }
        let problem = match &command {
            ListCommand::SetGraphicsRootSignature(_) => {
                entry.root_signature = true;
                None
            }
            ListCommand::SetPipelineState(_) => {
                entry.pipeline = true;
                None
            }
            ListCommand::SetGraphicsRoot32BitConstants { .. }
            | ListCommand::SetGraphicsRootConstantBufferView { .. }
            | ListCommand::SetGraphicsRootDescriptorTable { .. }
                if !entry.root_signature =>
            {
                Some("root argument set before the root signature")
            }
            ListCommand::DrawInstanced { .. } | ListCommand::DrawIndexedInstanced { .. }
                if !entry.root_signature || !entry.pipeline =>
            {
                Some("draw without root signature and pipeline state")
            }
            _ => None,
        };
        entry.commands.push(command);
        if let Some(problem) = problem {
            state.violation(format!("List {:?}: {}", list, problem));
        }
    }

    fn close_command_list(&self, list: NativeHandle) -> HrResult<()> {
        let mut state = self.lock();
        match state.lists.get_mut(&list) {
            Some(entry) if entry.open => {
                entry.open = false;
                Ok(())
            }
            Some(_) => {
                state.violation(format!("Close of closed list {:?}", list));
                Err(E_FAIL)
            }
            None => Err(E_INVALIDARG),
        }
    }

    fn execute_command_list(&self, queue: QueueKind, list: NativeHandle) -> HrResult<()> {
        let mut state = self.lock();
        let (allocator, commands) = match state.lists.get(&list) {
            Some(entry) if !entry.open => (entry.allocator, entry.commands.clone()),
            Some(_) => {
                state.violation(format!("Execute of open list {:?}", list));
                return Err(E_FAIL);
            }
            None => return Err(E_INVALIDARG),
        };
        state.counters.executes += 1;
        state.submissions.push(Submission { queue, commands });
        let executed = &mut state.unsignalled[queue_index(queue)];
        if !executed.contains(&allocator) {
            executed.push(allocator);
        }
        Ok(())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> HrResult<NativeHandle> {
        if !(2..=16).contains(&desc.buffer_count) || desc.width == 0 || desc.height == 0 {
            return Err(DXGI_ERROR_INVALID_CALL);
        }
        let mut state = self.lock();
        let handle = state.alloc(ObjectKind::Swapchain, "swapchain");
        state.swapchains.insert(handle, Swapchain { desc: *desc, current: 0 });
        Ok(handle)
    }

    fn swapchain_buffer(&self, swapchain: NativeHandle, index: u32) -> HrResult<NativeHandle> {
        let mut state = self.lock();
        match state.swapchains.get(&swapchain) {
            Some(chain) if index < chain.desc.buffer_count => {}
            _ => return Err(DXGI_ERROR_INVALID_CALL),
        }
        let handle = state.alloc(ObjectKind::BackBuffer, &format!("back buffer {}", index));
        state.back_buffers.insert(handle, swapchain);
        Ok(handle)
    }

    fn current_back_buffer_index(&self, swapchain: NativeHandle) -> u32 {
        self.lock().swapchains.get(&swapchain).map_or(0, |s| s.current)
    }

    fn resize_buffers(&self, swapchain: NativeHandle, width: u32, height: u32) -> HrResult<()> {
        let mut state = self.lock();
        let outstanding = state.back_buffers.values().filter(|&&owner| owner == swapchain).count();
        if outstanding > 0 {
            state.violation(format!("ResizeBuffers with {} back-buffer reference(s) outstanding", outstanding));
            return Err(DXGI_ERROR_INVALID_CALL);
        }
        let Some(chain) = state.swapchains.get_mut(&swapchain) else {
            return Err(DXGI_ERROR_INVALID_CALL);
        };
        chain.desc.width = width;
        chain.desc.height = height;
        chain.current = 0;
        state.counters.resizes += 1;
        Ok(())
    }

    fn present(&self, swapchain: NativeHandle, _sync_interval: u32) -> HrResult<()> {
        let mut state = self.lock();
        if let Some(hr) = state.fail_next_present.take() {
            return Err(hr);
        }
        let Some(chain) = state.swapchains.get_mut(&swapchain) else {
            return Err(DXGI_ERROR_INVALID_CALL);
        };
        chain.current = (chain.current + 1) % chain.desc.buffer_count;
        state.counters.presents += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "null_device_tests.rs"]
mod tests;
