/// ResourceTracker - weak registry of everything a renderer created
///
/// The application may still hold handles when the renderer tears down.
/// Renderer cleanup calls `cleanup_all()` before destroying the device so the
/// native objects are released while the device is alive; the handles then
/// report expired.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use crate::resource::GpuResource;

#[derive(Default)]
pub struct ResourceTracker {
    entries: Mutex<Vec<Weak<dyn GpuResource>>>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created resource
    pub fn track<T: GpuResource + 'static>(&self, resource: &Arc<T>) {
        let weak: Weak<dyn GpuResource> = Arc::downgrade(resource) as Weak<dyn GpuResource>;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|entry| entry.strong_count() > 0);
        entries.push(weak);
    }

    /// Resources still referenced and not cleaned up
    pub fn live_count(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|resource| resource.is_alive())
            .count()
    }

    /// Clean up every live resource, newest first; returns how many were released
    pub fn cleanup_all(&self) -> usize {
        let drained: Vec<Weak<dyn GpuResource>> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *entries)
        };
        let mut released = 0;
        for entry in drained.iter().rev() {
            if let Some(resource) = entry.upgrade() {
                if resource.is_alive() {
                    resource.cleanup();
                    released += 1;
                }
            }
        }
        released
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
