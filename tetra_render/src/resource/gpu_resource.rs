/// GpuResource - lifecycle every backend resource implements
///
/// Initialize is the backend's `create_*` call, Update is type-specific
/// (`Buffer::update`), Cleanup releases the native object. Handles are shared
/// through `Arc`; a handle whose `cleanup()` already ran is *expired* and every
/// context operation treats it as a soft failure.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Minimal lifecycle shared by buffers, textures and shaders
pub trait GpuResource: Send + Sync {
    /// Debug label given at creation
    fn label(&self) -> &str;

    /// False once `cleanup()` has run
    fn is_alive(&self) -> bool;

    /// Release the native object. Idempotent.
    fn cleanup(&self);
}

/// Process-unique resource id, handy for logs and pipeline/cache keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl ResourceId {
    /// Allocate the next id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ResourceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Alive flag backends embed in their resource structs
///
/// `retire()` returns true exactly once, so the caller releases native
/// objects a single time even when cleanup and drop race.
#[derive(Debug)]
pub struct AliveFlag(AtomicBool);

impl AliveFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark dead; true if this call performed the transition
    pub fn retire(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for AliveFlag {
    fn default() -> Self {
        Self::new()
    }
}
