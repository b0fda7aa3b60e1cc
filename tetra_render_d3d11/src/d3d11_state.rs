/// StateCache - immutable D3D11 state objects, created once per combination
///
/// Rasterizer states are keyed by (fill, cull), depth-stencil states by
/// `DepthState`, input layouts by (shader, vertex layout). The context binds
/// the cached object whenever the effective state changes.

use rustc_hash::FxHashMap;
use tetra_render::layout::{color_vertex_attributes, vertex_attributes};
use tetra_render::{CullMode, DepthState, RenderMode, ResourceId, Result, VertexLayout};

use crate::d3d11_convert::{attribute_format_to_dxgi, compare_op_to_d3d11, cull_mode_to_d3d11, fill_mode_to_d3d11, hr_err};
use crate::d3d11_shader::Dx11Shader;
use crate::device::{DepthStencilDesc, Dx11Device, InputElement, NativeHandle, RasterizerDesc};

const SOURCE: &str = "tetra::d3d11::state";

/// Input elements of a vertex layout, all from input slot 0
pub fn input_elements(layout: VertexLayout) -> Vec<InputElement> {
    let attributes = match layout {
        VertexLayout::Standard => vertex_attributes(false),
        VertexLayout::Skinned => vertex_attributes(true),
        VertexLayout::PositionColor => color_vertex_attributes(),
    };
    attributes
        .iter()
        .map(|attribute| InputElement {
            semantic: attribute.semantic,
            format: attribute_format_to_dxgi(attribute.format),
            input_slot: 0,
            offset: attribute.offset,
        })
        .collect()
}

pub fn rasterizer_desc(mode: RenderMode, cull: CullMode, multisample: bool) -> RasterizerDesc {
    RasterizerDesc {
        fill_mode: fill_mode_to_d3d11(mode),
        cull_mode: cull_mode_to_d3d11(cull),
        multisample,
    }
}

pub fn depth_stencil_desc(depth: DepthState) -> DepthStencilDesc {
    DepthStencilDesc {
        depth_enable: depth.test,
        depth_write: depth.write,
        depth_func: compare_op_to_d3d11(depth.compare),
    }
}

#[derive(Default)]
pub struct StateCache {
    rasterizer: FxHashMap<(RenderMode, CullMode), NativeHandle>,
    depth: FxHashMap<DepthState, NativeHandle>,
    input_layouts: FxHashMap<(ResourceId, VertexLayout), NativeHandle>,
    multisample: bool,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rasterizer states created from now on enable multisampling
    pub fn set_multisample(&mut self, multisample: bool) {
        self.multisample = multisample;
    }

    pub fn rasterizer_state(&mut self, device: &dyn Dx11Device, mode: RenderMode, cull: CullMode) -> Result<NativeHandle> {
        if let Some(&state) = self.rasterizer.get(&(mode, cull)) {
            return Ok(state);
        }
        let state = device
            .create_rasterizer_state(&rasterizer_desc(mode, cull, self.multisample))
            .map_err(|hr| hr_err(SOURCE, "Failed to create rasterizer state", hr))?;
        tetra_render::render_debug!(SOURCE, "Rasterizer state {:?}/cull {:?}", mode, cull);
        self.rasterizer.insert((mode, cull), state);
        Ok(state)
    }

    pub fn depth_state(&mut self, device: &dyn Dx11Device, depth: DepthState) -> Result<NativeHandle> {
        if let Some(&state) = self.depth.get(&depth) {
            return Ok(state);
        }
        let state = device
            .create_depth_stencil_state(&depth_stencil_desc(depth))
            .map_err(|hr| hr_err(SOURCE, "Failed to create depth-stencil state", hr))?;
        tetra_render::render_debug!(SOURCE, "Depth-stencil state {:?}", depth);
        self.depth.insert(depth, state);
        Ok(state)
    }

    pub fn input_layout(&mut self, device: &dyn Dx11Device, shader: &Dx11Shader, layout: VertexLayout) -> Result<NativeHandle> {
        let key = (shader.id, layout);
        if let Some(&input_layout) = self.input_layouts.get(&key) {
            return Ok(input_layout);
        }
        let input_layout = device
            .create_input_layout(&input_elements(layout), &shader.vertex_bytecode)
            .map_err(|hr| hr_err(SOURCE, &format!("Failed to create {:?} input layout", layout), hr))?;
        self.input_layouts.insert(key, input_layout);
        Ok(input_layout)
    }

    /// State objects currently cached
    pub fn len(&self) -> usize {
        self.rasterizer.len() + self.depth.len() + self.input_layouts.len()
    }

    pub fn clear(&mut self, device: &dyn Dx11Device) {
        for (_, state) in self.rasterizer.drain() {
            device.release(state);
        }
        for (_, state) in self.depth.drain() {
            device.release(state);
        }
        for (_, layout) in self.input_layouts.drain() {
            device.release(layout);
        }
    }
}

#[cfg(test)]
#[path = "d3d11_state_tests.rs"]
mod tests;
