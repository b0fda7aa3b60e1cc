/// HostData - CPU copy of a constant buffer's contents
///
/// Backends that snapshot constants into a per-frame ring at draw time (the
/// explicit and command-list backends) keep constant buffers on the host.
/// The generation counter tells them whether a bound buffer changed since it
/// was last copied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use crate::error::Result;
use crate::resource::check_update_range;

#[derive(Debug)]
pub struct HostData {
    bytes: Mutex<Vec<u8>>,
    generation: AtomicU64,
}

impl HostData {
    /// Zero-filled storage of `size` bytes, optionally initialized
    pub fn new(size: usize, initial: Option<&[u8]>) -> Self {
        let mut bytes = vec![0u8; size];
        if let Some(initial) = initial {
            let len = initial.len().min(size);
            bytes[..len].copy_from_slice(&initial[..len]);
        }
        Self { bytes: Mutex::new(bytes), generation: AtomicU64::new(1) }
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bounds-checked write; bumps the generation
    pub fn write(&self, label: &str, offset: u64, data: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        check_update_range(label, bytes.len() as u64, offset, data.len())?;
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Copy as much as fits into `dst`, zero the remainder; returns bytes copied
    pub fn copy_into(&self, dst: &mut [u8]) -> usize {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        let len = bytes.len().min(dst.len());
        dst[..len].copy_from_slice(&bytes[..len]);
        dst[len..].fill(0);
        len
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[path = "host_data_tests.rs"]
mod tests;
