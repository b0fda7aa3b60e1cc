/// Renderer configuration

/// Shadow pass settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowConfig {
    pub enabled: bool,
    /// Square depth-map size in texels
    pub map_size: u32,
    /// (constant factor, slope factor)
    pub depth_bias: (f32, f32),
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            map_size: 2048,
            depth_bias: (1.25, 1.75),
        }
    }
}

/// Configuration shared by every backend
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Application name (instance info, window title)
    pub app_name: String,
    pub width: u32,
    pub height: u32,
    /// Enable validation / debug layers
    pub enable_validation: bool,
    pub vsync: bool,
    /// Frames the CPU may record ahead of the GPU (clamped to 1..=3)
    pub frames_in_flight: u32,
    /// MSAA sample count (clamped to device support; 1 disables resolve)
    pub msaa_samples: u32,
    pub clear_color: [f32; 4],
    pub shadow: ShadowConfig,
    /// Bytes of per-frame dynamic constant storage
    pub uniform_ring_size: u64,
    /// Upper bound on swapchain acquire, in nanoseconds
    pub acquire_timeout_ns: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "tetra".to_string(),
            width: 1280,
            height: 720,
            enable_validation: cfg!(debug_assertions),
            vsync: true,
            frames_in_flight: 2,
            msaa_samples: 4,
            clear_color: [0.1, 0.1, 0.12, 1.0],
            shadow: ShadowConfig::default(),
            uniform_ring_size: 4 * 1024 * 1024,
            acquire_timeout_ns: 100_000_000,
        }
    }
}

impl RendererConfig {
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight.clamp(1, 3) as usize
    }

    /// Largest power of two not above the request and `supported_max`
    pub fn msaa_samples(&self, supported_max: u32) -> u32 {
        let wanted = self.msaa_samples.clamp(1, supported_max.max(1));
        1 << (31 - wanted.leading_zeros())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
