/// Renderer module - device/swapchain lifecycle and frame timing

pub mod renderer;
pub mod config;
pub mod lifecycle;
pub mod timing;

pub use renderer::*;
pub use config::*;
pub use lifecycle::*;
pub use timing::*;
