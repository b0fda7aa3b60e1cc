//! Renderer construction per backend
//!
//! D3D12, D3D11 and OpenGL reach the driver through a seam. A windowed
//! renderer opens the native driver for its window unless one is injected in
//! [`Drivers`]; without a window there is no native device, so a seam left
//! empty is an initialization failure.

use std::sync::Arc;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tetra_render::{BackendKind, Error, RendererConfig, Result};
use tetra_render_d3d11::{Dx11Device, Dx11Renderer, NullDx11Device};
use tetra_render_d3d12::{Dx12Device, Dx12Renderer, NullDx12Device};
use tetra_render_gl::{GlApi, GlRenderer, NativeGl, NullGl};
use tetra_render_vulkan::VulkanRenderer;

use crate::any_renderer::AnyRenderer;

const SOURCE: &str = "tetra::runtime";

/// Drivers for the seam-based backends
#[derive(Clone, Default)]
pub struct Drivers {
    pub d3d12: Option<Arc<dyn Dx12Device>>,
    pub d3d11: Option<Arc<dyn Dx11Device>>,
    pub gl: Option<Arc<dyn GlApi>>,
}

impl Drivers {
    /// The recording test doubles for every seam; nothing reaches a GPU
    pub fn headless() -> Self {
        Self {
            d3d12: Some(Arc::new(NullDx12Device::new())),
            d3d11: Some(Arc::new(NullDx11Device::new())),
            gl: Some(Arc::new(NullGl::new())),
        }
    }

    /// Whether `kind` has a driver here (Vulkan never does)
    pub fn has(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Vulkan => false,
            BackendKind::D3D12 => self.d3d12.is_some(),
            BackendKind::D3D11 => self.d3d11.is_some(),
            BackendKind::OpenGl => self.gl.is_some(),
        }
    }

    /// Open the native driver of `kind` for `window` and store it
    fn open_native<W>(&mut self, kind: BackendKind, window: &W, config: &RendererConfig) -> Result<()>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        tetra_render::render_info!(SOURCE, "Opening native {} driver", kind);
        match kind {
            BackendKind::Vulkan => {}
            BackendKind::OpenGl => {
                let gl = NativeGl::new(window, config.width, config.height, config.enable_validation)?;
                self.gl = Some(Arc::new(gl));
            }
            #[cfg(windows)]
            BackendKind::D3D12 => {
                let device = tetra_render_d3d12::NativeDx12Device::new(window, config.enable_validation)?;
                self.d3d12 = Some(Arc::new(device));
            }
            #[cfg(windows)]
            BackendKind::D3D11 => {
                let device = tetra_render_d3d11::NativeDx11Device::new(window, config.enable_validation)?;
                self.d3d11 = Some(Arc::new(device));
            }
            #[cfg(not(windows))]
            BackendKind::D3D12 | BackendKind::D3D11 => {
                return Err(Error::InitializationFailed(format!("the {} backend is only available on Windows", kind)));
            }
        }
        Ok(())
    }
}

fn missing_driver(kind: BackendKind) -> Error {
    let message = format!(
        "no {} device available: pass a window to create_windowed_renderer or inject a driver",
        kind
    );
    tetra_render::render_error!(SOURCE, "{}", message);
    Error::InitializationFailed(message)
}

/// Create an uninitialized renderer without a window
///
/// No native device can be opened without a window, so this fails with
/// `InitializationFailed` for every backend. Kept as the entry point that
/// tells callers where to go instead.
pub fn create_renderer(kind: BackendKind, config: RendererConfig) -> Result<AnyRenderer> {
    create_renderer_with(kind, config, &Drivers::default())
}

/// Create an uninitialized renderer on injected drivers
///
/// Fails for Vulkan, which needs a surface to pick a presenting device, and
/// for a seam-based backend whose driver is missing.
pub fn create_renderer_with(kind: BackendKind, config: RendererConfig, drivers: &Drivers) -> Result<AnyRenderer> {
    tetra_render::render_info!(SOURCE, "Creating {} renderer", kind);
    match kind {
        BackendKind::Vulkan => Err(Error::InitializationFailed(
            "the vulkan backend presents to a window surface; use create_windowed_renderer".to_string(),
        )),
        BackendKind::D3D12 => {
            let device = drivers.d3d12.clone().ok_or_else(|| missing_driver(kind))?;
            Ok(AnyRenderer::D3D12(Dx12Renderer::new(device, config)?))
        }
        BackendKind::D3D11 => {
            let device = drivers.d3d11.clone().ok_or_else(|| missing_driver(kind))?;
            Ok(AnyRenderer::D3D11(Dx11Renderer::new(device, config)))
        }
        BackendKind::OpenGl => {
            let gl = drivers.gl.clone().ok_or_else(|| missing_driver(kind))?;
            Ok(AnyRenderer::OpenGl(GlRenderer::new(gl, config)))
        }
    }
}

/// Create an uninitialized renderer presenting to `window`
///
/// An injected driver wins; otherwise the backend's native driver is opened
/// on `window`.
pub fn create_windowed_renderer<W>(
    kind: BackendKind,
    window: &W,
    config: RendererConfig,
    drivers: &Drivers,
) -> Result<AnyRenderer>
where
    W: HasDisplayHandle + HasWindowHandle,
{
    if kind == BackendKind::Vulkan {
        tetra_render::render_info!(SOURCE, "Creating {} renderer", kind);
        return Ok(AnyRenderer::Vulkan(VulkanRenderer::new(window, config)?));
    }
    if drivers.has(kind) {
        return create_renderer_with(kind, config, drivers);
    }
    let mut native = drivers.clone();
    native.open_native(kind, window, &config)?;
    create_renderer_with(kind, config, &native)
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
