/// ConstantRing - per-frame upload-heap buffer for root CBVs
///
/// Constant slots 1..=4 are copied here when a draw flushes them and bound
/// as root CBVs at their ring offset. One ring per frame slot, reset once the
/// slot's fence value has completed. Offset 0 is a zeroed page that unbound
/// slots point at.

use std::sync::Arc;
use tetra_render::resource::{align_up, RingCursor};
use tetra_render::{HostData, Result};

use crate::d3d12_convert::{hr_err, CONSTANT_BUFFER_ALIGNMENT};
use crate::device::{Dx12Device, HeapKind, NativeHandle, ResourceDesc, ResourceState};

const SOURCE: &str = "tetra::d3d12::constant_ring";

pub struct ConstantRing {
    pub resource: NativeHandle,
    device: Arc<dyn Dx12Device>,
    cursor: RingCursor,
    scratch: Vec<u8>,
}

impl ConstantRing {
    /// `zero_page` must cover the largest CBV bound from the ring
    pub fn create(device: &Arc<dyn Dx12Device>, name: &str, size: u64, zero_page: u64) -> Result<Self> {
        let capacity = size.max(align_up(zero_page, CONSTANT_BUFFER_ALIGNMENT) * 2);
        let resource = device
            .create_committed_resource(
                name,
                HeapKind::Upload,
                &ResourceDesc::Buffer { size: capacity },
                ResourceState::GenericRead,
            )
            .map_err(|hr| hr_err(SOURCE, &format!("Failed to create '{}'", name), hr))?;

        let ring = Self {
            resource,
            device: Arc::clone(device),
            cursor: RingCursor::new(capacity, CONSTANT_BUFFER_ALIGNMENT, zero_page),
            scratch: Vec::new(),
        };
        let zeros = vec![0u8; ring.cursor.zero_page() as usize];
        if let Err(hr) = device.write_buffer(resource, 0, &zeros) {
            device.release(resource);
            return Err(hr_err(SOURCE, &format!("Failed to clear '{}'", name), hr));
        }
        Ok(ring)
    }

    pub fn reset(&mut self) {
        self.cursor.reset();
    }

    /// Copy raw bytes; returns the ring offset
    pub fn write(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.reserve(data.len() as u64)?;
        self.device
            .write_buffer(self.resource, offset, data)
            .map_err(|hr| hr_err(SOURCE, "Failed to write constant ring", hr))?;
        Ok(offset)
    }

    /// Copy a constant buffer's host data into a `range`-byte block (zero padded)
    pub fn copy_host(&mut self, host: &HostData, range: u64) -> Result<u64> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.resize(range as usize, 0);
        host.copy_into(&mut scratch);
        let written = self.write(&scratch);
        self.scratch = scratch;
        written
    }

    fn reserve(&mut self, size: u64) -> Result<u64> {
        self.cursor.push(size).ok_or_else(|| {
            tetra_render::render_warn_err!(
                SOURCE,
                "Constant ring full ({} of {} bytes used), raise uniform_ring_size",
                self.cursor.used(), self.cursor.capacity()
            )
        })
    }

    pub fn destroy(&mut self) {
        if !self.resource.is_null() {
            self.device.release(self.resource);
            self.resource = NativeHandle::NULL;
        }
    }
}
