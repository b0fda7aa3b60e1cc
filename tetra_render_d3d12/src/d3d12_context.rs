/// GpuContext - device plus the blocking copy path shared by every resource
///
/// Buffers and textures hold an `Arc<GpuContext>` so they can upload on
/// update and release their native objects on cleanup. Uploads go through a
/// dedicated copy allocator/list: stage into an upload-heap buffer, record
/// the copy, execute on the copy queue, signal and wait. The call returns
/// once the data is resident.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tetra_render::{AliveFlag, Error, Result};

use crate::d3d12_convert::{hr_err, hr_init_err};
use crate::device::{Dx12Device, HeapKind, NativeHandle, QueueKind, ResourceDesc, ResourceState};

const SOURCE: &str = "tetra::d3d12::upload";

/// Wait without timeout
pub const INFINITE: u32 = u32::MAX;

struct CopyPath {
    allocator: NativeHandle,
    list: NativeHandle,
    fence: NativeHandle,
    value: u64,
}

pub struct GpuContext {
    pub device: Arc<dyn Dx12Device>,
    copy: Mutex<CopyPath>,
    alive: AliveFlag,
}

impl GpuContext {
    pub fn new(device: Arc<dyn Dx12Device>) -> Result<Arc<Self>> {
        let allocator = device
            .create_command_allocator(QueueKind::Copy)
            .map_err(|hr| hr_init_err(SOURCE, "Failed to create copy allocator", hr))?;
        let list = match device.create_command_list(QueueKind::Copy, allocator) {
            Ok(list) => list,
            Err(hr) => {
                device.release(allocator);
                return Err(hr_init_err(SOURCE, "Failed to create copy list", hr));
            }
        };
        let fence = match device.create_fence(0) {
            Ok(fence) => fence,
            Err(hr) => {
                device.release(list);
                device.release(allocator);
                return Err(hr_init_err(SOURCE, "Failed to create copy fence", hr));
            }
        };
        Ok(Arc::new(Self {
            device,
            copy: Mutex::new(CopyPath { allocator, list, fence, value: 0 }),
            alive: AliveFlag::new(),
        }))
    }

    fn copy_path(&self) -> MutexGuard<'_, CopyPath> {
        self.copy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }

    pub fn require_alive(&self, operation: &str) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("{} after renderer cleanup", operation)))
        }
    }

    /// Stage `data` and run `record` on the copy list; blocks until done
    ///
    /// `record` receives the device, the open copy list and the staging
    /// buffer holding `data` at offset 0.
    pub fn upload<F>(&self, label: &str, data: &[u8], record: F) -> Result<()>
    where
        F: FnOnce(&dyn Dx12Device, NativeHandle, NativeHandle),
    {
        self.require_alive("upload")?;
        let device = self.device.as_ref();
        let staging = device
            .create_committed_resource(
                &format!("{} staging", label),
                HeapKind::Upload,
                &ResourceDesc::Buffer { size: data.len().max(1) as u64 },
                ResourceState::GenericRead,
            )
            .map_err(|hr| hr_err(SOURCE, "Failed to create staging buffer", hr))?;

        let result = self.submit_copy(label, staging, data, record);
        device.release(staging);
        result
    }

    fn submit_copy<F>(&self, label: &str, staging: NativeHandle, data: &[u8], record: F) -> Result<()>
    where
        F: FnOnce(&dyn Dx12Device, NativeHandle, NativeHandle),
    {
        let device = self.device.as_ref();
        device
            .write_buffer(staging, 0, data)
            .map_err(|hr| hr_err(SOURCE, "Failed to fill staging buffer", hr))?;

        let mut copy = self.copy_path();
        device
            .reset_command_allocator(copy.allocator)
            .map_err(|hr| hr_err(SOURCE, "Failed to reset copy allocator", hr))?;
        device
            .reset_command_list(copy.list, copy.allocator)
            .map_err(|hr| hr_err(SOURCE, "Failed to reset copy list", hr))?;
        record(device, copy.list, staging);
        device
            .close_command_list(copy.list)
            .map_err(|hr| hr_err(SOURCE, "Failed to close copy list", hr))?;
        device
            .execute_command_list(QueueKind::Copy, copy.list)
            .map_err(|hr| hr_err(SOURCE, "Failed to execute copy list", hr))?;

        copy.value += 1;
        device
            .signal(QueueKind::Copy, copy.fence, copy.value)
            .map_err(|hr| hr_err(SOURCE, "Failed to signal copy fence", hr))?;
        let done = device
            .wait_for_value(copy.fence, copy.value, INFINITE)
            .map_err(|hr| hr_err(SOURCE, "Failed to wait for copy fence", hr))?;
        if !done {
            tetra_render::render_bail!(SOURCE, "Upload of '{}' never completed", label);
        }
        tetra_render::render_trace!(SOURCE, "Uploaded {} bytes for '{}'", data.len(), label);
        Ok(())
    }

    /// Release the copy path; resources keep their handles but stop touching the device
    pub fn retire(&self) {
        if !self.alive.retire() {
            return;
        }
        let mut guard = self.copy_path();
        let copy = &mut *guard;
        for handle in [&mut copy.list, &mut copy.allocator, &mut copy.fence] {
            self.device.release(*handle);
            *handle = NativeHandle::NULL;
        }
    }

    /// Copy fence and copy allocator still owned
    pub fn live_sync_objects(&self) -> usize {
        let copy = self.copy_path();
        [copy.fence, copy.allocator].iter().filter(|handle| !handle.is_null()).count()
    }
}
