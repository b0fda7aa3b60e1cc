/// Root signature and the pipeline state cache
///
/// Root signature shared by every PSO:
/// - parameter 0: 32 root constants at `b0` (slot 0, `ObjectConstants`)
/// - parameters 1..=4: root CBVs at `b1..b4` into the frame's constant ring
/// - parameter 5: SRV table `t0..t4`, `t4` is the shadow map
/// - static samplers: `s0` linear wrap, `s1` comparison for the shadow map
///
/// PSOs are keyed by shader, raster state, target and sample count.

use rustc_hash::FxHashMap;
use tetra_render::layout::{
    color_vertex_attributes, vertex_attributes, BoneConstants, FrameConstants, LightingConstants,
    MaterialConstants, MAX_CONSTANT_SLOTS, MAX_TEXTURE_SLOTS, PUSH_CONSTANT_SIZE,
};
use tetra_render::{RasterKey, RenderMode, ResourceId, Result, VertexLayout};

use crate::d3d12_convert::{
    attribute_format_to_dxgi, compare_op_to_d3d12, cull_mode_to_d3d12, fill_mode_to_d3d12, hr_err,
    topology_type_to_d3d12, BACK_BUFFER_FORMAT, CONSTANT_BUFFER_ALIGNMENT, DXGI_FORMAT_D32_FLOAT,
};
use crate::d3d12_shader::Dx12Shader;
use crate::device::{
    DepthStencilDesc, Dx12Device, GraphicsPipelineDesc, InputElement, NativeHandle, RasterizerDesc,
    RootParameter, RootSignatureDesc, StaticSampler,
};

const SOURCE: &str = "tetra::d3d12::pipeline";

/// Root parameter index of constant slot `n` (1..=4) is `n`
pub const ROOT_OBJECT_CONSTANTS: u32 = 0;
pub const ROOT_TEXTURE_TABLE: u32 = MAX_CONSTANT_SLOTS;

/// SRVs in the texture table (material textures + shadow map)
pub const TEXTURE_TABLE_SIZE: u32 = MAX_TEXTURE_SLOTS + 1;

/// CBV sizes of constant slots 1..=4, rounded to the CBV alignment
pub const CBV_SIZES: [u64; (MAX_CONSTANT_SLOTS - 1) as usize] = [
    cbv_size(std::mem::size_of::<FrameConstants>()),
    cbv_size(std::mem::size_of::<MaterialConstants>()),
    cbv_size(std::mem::size_of::<LightingConstants>()),
    cbv_size(std::mem::size_of::<BoneConstants>()),
];

/// Largest CBV; sizes the ring's zero page
pub const MAX_CBV_SIZE: u64 = cbv_size(std::mem::size_of::<BoneConstants>());

const fn cbv_size(bytes: usize) -> u64 {
    let alignment = CONSTANT_BUFFER_ALIGNMENT;
    (bytes as u64).div_ceil(alignment) * alignment
}

pub fn root_signature_desc() -> RootSignatureDesc {
    let mut parameters = vec![RootParameter::Constants { register: 0, values: PUSH_CONSTANT_SIZE / 4 }];
    parameters.extend((1..MAX_CONSTANT_SLOTS).map(|register| RootParameter::ConstantBufferView { register }));
    parameters.push(RootParameter::ShaderResourceTable { base_register: 0, count: TEXTURE_TABLE_SIZE });
    RootSignatureDesc {
        parameters,
        static_samplers: vec![
            StaticSampler { register: 0, comparison: false },
            StaticSampler { register: 1, comparison: true },
        ],
    }
}

/// Input elements of a vertex layout, all from input slot 0
pub fn input_layout(layout: VertexLayout) -> Vec<InputElement> {
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

/// Render target set a PSO is compatible with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Main,
    /// Depth-only: no pixel shader, no RTV, depth bias
    Shadow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub shader: ResourceId,
    pub raster: RasterKey,
    pub target: TargetKind,
    pub samples: u32,
}

pub fn rasterizer_desc(key: &PipelineKey, depth_bias: (f32, f32)) -> RasterizerDesc {
    let shadow = key.target == TargetKind::Shadow;
    let mode = if shadow { RenderMode::Solid } else { key.raster.mode };
    let (constant, slope) = if shadow { depth_bias } else { (0.0, 0.0) };
    RasterizerDesc {
        fill_mode: fill_mode_to_d3d12(mode),
        cull_mode: cull_mode_to_d3d12(key.raster.cull),
        depth_bias: constant.ceil() as i32,
        slope_scaled_depth_bias: slope,
    }
}

fn create_pipeline(
    device: &dyn Dx12Device,
    key: &PipelineKey,
    shader: &Dx12Shader,
    root_signature: NativeHandle,
    depth_bias: (f32, f32),
) -> Result<NativeHandle> {
    let shadow = key.target == TargetKind::Shadow;
    let depth = key.raster.depth;
    let label = format!("{:?} pso {}", key.raster.pass, key.shader.0);
    let desc = GraphicsPipelineDesc {
        label: &label,
        root_signature,
        vertex_shader: &shader.vertex,
        pixel_shader: (!shadow).then_some(shader.pixel.as_slice()),
        input_layout: input_layout(key.raster.layout),
        rasterizer: rasterizer_desc(key, depth_bias),
        depth_stencil: DepthStencilDesc {
            depth_enable: depth.test,
            depth_write: depth.write,
            depth_func: compare_op_to_d3d12(depth.compare),
        },
        topology_type: topology_type_to_d3d12(key.raster.topology),
        rtv_format: (!shadow).then_some(BACK_BUFFER_FORMAT),
        dsv_format: DXGI_FORMAT_D32_FLOAT,
        sample_count: if shadow { 1 } else { key.samples },
    };
    device
        .create_graphics_pipeline(&desc)
        .map_err(|hr| hr_err(SOURCE, &format!("Failed to create pipeline state '{}'", label), hr))
}

#[derive(Default)]
pub struct PipelineCache {
    pipelines: FxHashMap<PipelineKey, NativeHandle>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        device: &dyn Dx12Device,
        key: PipelineKey,
        shader: &Dx12Shader,
        root_signature: NativeHandle,
        depth_bias: (f32, f32),
    ) -> Result<NativeHandle> {
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline);
        }
        let pipeline = create_pipeline(device, &key, shader, root_signature, depth_bias)?;
        tetra_render::render_debug!(
            SOURCE,
            "Created {:?} PSO for shader {} ({:?}, {:?}, cull {:?}, {} samples), {} cached",
            key.target, key.shader.0, key.raster.pass, key.raster.mode, key.raster.cull, key.samples,
            self.pipelines.len() + 1
        );
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Release every PSO (GPU must be idle)
    pub fn clear(&mut self, device: &dyn Dx12Device) {
        for (_, pipeline) in self.pipelines.drain() {
            device.release(pipeline);
        }
    }
}

#[cfg(test)]
#[path = "d3d12_pipeline_tests.rs"]
mod tests;
