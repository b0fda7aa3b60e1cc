/// GpuContext - GL entry points shared by the renderer and every resource
///
/// GL object names are only meaningful while the context lives. Resources
/// hold an `Arc<GpuContext>` and skip their deletes once the renderer has
/// retired it.

use std::sync::Arc;
use tetra_render::{AliveFlag, Error, Result};

use crate::api::GlApi;

pub struct GpuContext {
    pub api: Arc<dyn GlApi>,
    alive: AliveFlag,
}

impl GpuContext {
    pub fn new(api: Arc<dyn GlApi>) -> Arc<Self> {
        Arc::new(Self { api, alive: AliveFlag::new() })
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
