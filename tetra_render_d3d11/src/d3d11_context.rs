/// GpuContext - device handle shared by the renderer and every resource
///
/// Resources keep an `Arc<GpuContext>` so cleanup can release their native
/// objects; once the renderer retires the context they stop touching the
/// device.

use std::sync::Arc;
use tetra_render::{AliveFlag, Error, Result};

use crate::device::Dx11Device;

pub struct GpuContext {
    pub device: Arc<dyn Dx11Device>,
    alive: AliveFlag,
}

impl GpuContext {
    pub fn new(device: Arc<dyn Dx11Device>) -> Arc<Self> {
        Arc::new(Self { device, alive: AliveFlag::new() })
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

    pub fn retire(&self) {
        self.alive.retire();
    }
}
