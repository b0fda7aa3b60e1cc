/// Buffer - vertex, index and constant buffers

use std::any::Any;
use std::sync::Arc;
use bytemuck::Pod;
use crate::error::{Error, Result};
use crate::resource::GpuResource;

/// What a buffer is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Vertex stream
    Vertex,
    /// Index stream (u16 or u32)
    Index,
    /// Constant/uniform data addressed by a binding slot
    Constant,
}

/// Index element width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn size_bytes(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }

    /// Index format from an index buffer stride
    pub fn from_stride(stride: u32) -> Option<Self> {
        match stride {
            2 => Some(IndexFormat::U16),
            4 => Some(IndexFormat::U32),
            _ => None,
        }
    }
}

/// Buffer creation descriptor
#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub label: String,
    pub usage: BufferUsage,
    /// Size in bytes
    pub size: u64,
    /// Vertex stride, index width (2/4) or 0 for constant buffers
    pub stride: u32,
    /// Initial contents (must be `size` bytes when present)
    pub data: Option<Vec<u8>>,
}

impl BufferDesc {
    /// Vertex buffer holding `vertices`
    pub fn vertex<T: Pod>(label: &str, vertices: &[T]) -> Self {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        Self {
            label: label.to_string(),
            usage: BufferUsage::Vertex,
            size: bytes.len() as u64,
            stride: std::mem::size_of::<T>() as u32,
            data: Some(bytes.to_vec()),
        }
    }

    /// 16-bit index buffer
    pub fn index_u16(label: &str, indices: &[u16]) -> Self {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        Self {
            label: label.to_string(),
            usage: BufferUsage::Index,
            size: bytes.len() as u64,
            stride: 2,
            data: Some(bytes.to_vec()),
        }
    }

    /// 32-bit index buffer
    pub fn index_u32(label: &str, indices: &[u32]) -> Self {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        Self {
            label: label.to_string(),
            usage: BufferUsage::Index,
            size: bytes.len() as u64,
            stride: 4,
            data: Some(bytes.to_vec()),
        }
    }

    /// Constant buffer initialized with `value`
    pub fn constant<T: Pod>(label: &str, value: &T) -> Self {
        let bytes = bytemuck::bytes_of(value);
        Self {
            label: label.to_string(),
            usage: BufferUsage::Constant,
            size: bytes.len() as u64,
            stride: 0,
            data: Some(bytes.to_vec()),
        }
    }

    /// Zero-initialized constant buffer of `size` bytes
    pub fn constant_sized(label: &str, size: u64) -> Self {
        Self {
            label: label.to_string(),
            usage: BufferUsage::Constant,
            size,
            stride: 0,
            data: None,
        }
    }

    /// Check the descriptor before any native allocation
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidResource(format!("Buffer '{}' has zero size", self.label)));
        }
        if let Some(data) = &self.data {
            if data.len() as u64 != self.size {
                return Err(Error::InvalidResource(format!(
                    "Buffer '{}' data is {} bytes, expected {}",
                    self.label, data.len(), self.size
                )));
            }
        }
        match self.usage {
            BufferUsage::Vertex if self.stride == 0 => Err(Error::InvalidResource(format!(
                "Vertex buffer '{}' needs a non-zero stride", self.label
            ))),
            BufferUsage::Index if IndexFormat::from_stride(self.stride).is_none() => {
                Err(Error::InvalidResource(format!(
                    "Index buffer '{}' stride must be 2 or 4, got {}", self.label, self.stride
                )))
            }
            _ => Ok(()),
        }
    }
}

/// GPU buffer
pub trait Buffer: GpuResource {
    fn usage(&self) -> BufferUsage;

    /// Size in bytes
    fn size(&self) -> u64;

    /// Vertex stride or index width
    fn stride(&self) -> u32;

    /// Write `data` at `offset`; fails on expired buffers or out-of-range writes
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Downcast hook for backends
    fn as_any(&self) -> &dyn Any;

    /// Number of vertices or indices held
    fn element_count(&self) -> u32 {
        match self.stride() {
            0 => 0,
            stride => (self.size() / stride as u64) as u32,
        }
    }
}

/// Shared buffer handle
pub type BufferRef = Arc<dyn Buffer>;

/// Bounds check shared by every backend's `Buffer::update`
pub fn check_update_range(label: &str, size: u64, offset: u64, len: usize) -> Result<()> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::InvalidResource(format!(
            "Update of {} bytes at offset {} overflows buffer '{}' ({} bytes)",
            len, offset, label, size
        ))),
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
