/// Pipeline layouts and the baked pipeline cache
///
/// Binding model shared by every pipeline:
/// - push constants (128 bytes, vertex stage): slot 0, `ObjectConstants`
/// - set 0: `UNIFORM_BUFFER_DYNAMIC` bindings 1..=4 for constant slots 1..=4,
///   all pointing into the frame's uniform ring
/// - set 1: combined image samplers 0..=4, binding 4 is the shadow map
///
/// Pipelines are keyed by shader, raster state, target pass and sample
/// count, and created on first use.

use ash::vk;
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use tetra_render::layout::{
    color_vertex_attributes, vertex_attributes, BoneConstants, FrameConstants, LightingConstants,
    MaterialConstants, VertexAttribute, MAX_CONSTANT_SLOTS, MAX_TEXTURE_SLOTS, PUSH_CONSTANT_SIZE,
};
use tetra_render::{RasterKey, RenderMode, ResourceId, Result, VertexLayout};

use crate::vulkan_convert::{
    attribute_format_to_vk, compare_op_to_vk, cull_mode_to_vk, polygon_mode_to_vk, sample_count_to_vk,
    topology_to_vk, vk_err,
};
use crate::vulkan_shader::VulkanShader;

const SOURCE: &str = "tetra::vulkan::pipeline";

/// Descriptor ranges of constant slots 1..=4, in slot order
pub const UNIFORM_RANGES: [u64; (MAX_CONSTANT_SLOTS - 1) as usize] = [
    std::mem::size_of::<FrameConstants>() as u64,
    std::mem::size_of::<MaterialConstants>() as u64,
    std::mem::size_of::<LightingConstants>() as u64,
    std::mem::size_of::<BoneConstants>() as u64,
];

/// Largest uniform range; sizes the ring's zero page
pub const MAX_UNIFORM_RANGE: u64 = std::mem::size_of::<BoneConstants>() as u64;

/// Texture bindings in set 1 (material textures + shadow map)
pub const TEXTURE_BINDINGS: u32 = MAX_TEXTURE_SLOTS + 1;

/// Render pass a pipeline is compatible with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Main,
    /// Depth-only, vertex stage only, depth bias
    Shadow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub shader: ResourceId,
    pub raster: RasterKey,
    pub target: TargetKind,
    pub samples: u32,
}

/// Device-level knobs that shape every pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineFeatures {
    pub fill_mode_non_solid: bool,
    /// (constant factor, slope factor) for shadow pipelines
    pub depth_bias: (f32, f32),
}

/// Vertex binding 0 and its attributes for a layout
#[derive(Debug, Clone)]
pub struct VertexInput {
    pub binding: vk::VertexInputBindingDescription,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

pub fn vertex_input(layout: VertexLayout) -> VertexInput {
    let attributes: Vec<VertexAttribute> = match layout {
        VertexLayout::Standard => vertex_attributes(false),
        VertexLayout::Skinned => vertex_attributes(true),
        VertexLayout::PositionColor => color_vertex_attributes(),
    };
    VertexInput {
        binding: vk::VertexInputBindingDescription {
            binding: 0,
            stride: layout.stride(),
            input_rate: vk::VertexInputRate::VERTEX,
        },
        attributes: attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: 0,
                format: attribute_format_to_vk(attribute.format),
                offset: attribute.offset,
            })
            .collect(),
    }
}

/// Rasterizer values for a key; shadow pipelines get depth bias
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterSettings {
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub topology: vk::PrimitiveTopology,
    pub depth_bias: Option<(f32, f32)>,
    pub samples: vk::SampleCountFlags,
}

impl RasterSettings {
    pub fn new(key: &PipelineKey, features: &PipelineFeatures) -> Self {
        let shadow = key.target == TargetKind::Shadow;
        let mode = if shadow { RenderMode::Solid } else { key.raster.mode };
        Self {
            polygon_mode: polygon_mode_to_vk(mode, features.fill_mode_non_solid),
            cull_mode: cull_mode_to_vk(key.raster.cull),
            topology: topology_to_vk(key.raster.topology),
            depth_bias: shadow.then_some(features.depth_bias),
            samples: sample_count_to_vk(if shadow { 1 } else { key.samples }),
        }
    }
}

/// Set layouts and the single pipeline layout every pipeline uses
pub struct PipelineLayouts {
    pub uniform_set: vk::DescriptorSetLayout,
    pub texture_set: vk::DescriptorSetLayout,
    pub layout: vk::PipelineLayout,
}

impl PipelineLayouts {
    pub fn create(device: &ash::Device) -> Result<Self> {
        let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;

        let uniform_bindings: Vec<vk::DescriptorSetLayoutBinding> = (1..MAX_CONSTANT_SLOTS)
            .map(|slot| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(slot)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                    .descriptor_count(1)
                    .stage_flags(stages)
            })
            .collect();
        let texture_bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..TEXTURE_BINDINGS)
            .map(|slot| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(slot)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            })
            .collect();

        unsafe {
            let uniform_set = device
                .create_descriptor_set_layout(
                    &vk::DescriptorSetLayoutCreateInfo::default().bindings(&uniform_bindings),
                    None,
                )
                .map_err(|e| vk_err(SOURCE, "Failed to create uniform set layout", e))?;

            let texture_set = match device.create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::default().bindings(&texture_bindings),
                None,
            ) {
                Ok(layout) => layout,
                Err(e) => {
                    device.destroy_descriptor_set_layout(uniform_set, None);
                    return Err(vk_err(SOURCE, "Failed to create texture set layout", e));
                }
            };

            let set_layouts = [uniform_set, texture_set];
            let push_constants = [vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::VERTEX,
                offset: 0,
                size: PUSH_CONSTANT_SIZE,
            }];
            let layout_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&set_layouts)
                .push_constant_ranges(&push_constants);

            let layout = match device.create_pipeline_layout(&layout_info, None) {
                Ok(layout) => layout,
                Err(e) => {
                    device.destroy_descriptor_set_layout(texture_set, None);
                    device.destroy_descriptor_set_layout(uniform_set, None);
                    return Err(vk_err(SOURCE, "Failed to create pipeline layout", e));
                }
            };

            Ok(Self { uniform_set, texture_set, layout })
        }
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline_layout(self.layout, None);
            device.destroy_descriptor_set_layout(self.texture_set, None);
            device.destroy_descriptor_set_layout(self.uniform_set, None);
        }
    }
}

#[derive(Default)]
pub struct PipelineCache {
    pipelines: FxHashMap<PipelineKey, vk::Pipeline>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        device: &ash::Device,
        key: PipelineKey,
        shader: &VulkanShader,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        features: &PipelineFeatures,
    ) -> Result<vk::Pipeline> {
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline);
        }
        let pipeline = create_pipeline(device, &key, shader, layout, render_pass, features)?;
        tetra_render::render_debug!(
            SOURCE,
            "Created {:?} pipeline for shader {} ({:?}, {:?}, cull {:?}, {} samples), {} cached",
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

    /// Destroy every pipeline (GPU must be idle)
    pub fn clear(&mut self, device: &ash::Device) {
        for (_, pipeline) in self.pipelines.drain() {
            unsafe { device.destroy_pipeline(pipeline, None) };
        }
    }
}

fn create_pipeline(
    device: &ash::Device,
    key: &PipelineKey,
    shader: &VulkanShader,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    features: &PipelineFeatures,
) -> Result<vk::Pipeline> {
    let settings = RasterSettings::new(key, features);
    let input = vertex_input(key.raster.layout);
    let shadow = key.target == TargetKind::Shadow;

    let vertex_entry: &CStr = shader.vertex_entry.as_c_str();
    let fragment_entry: &CStr = shader.fragment_entry.as_c_str();
    let mut stages = vec![vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(shader.vertex)
        .name(vertex_entry)];
    if !shadow {
        stages.push(
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(shader.fragment)
                .name(fragment_entry),
        );
    }

    let bindings = [input.binding];
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&input.attributes);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(settings.topology)
        .primitive_restart_enable(false);

    // Viewport and scissor are dynamic
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let mut rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(settings.polygon_mode)
        .line_width(1.0)
        .cull_mode(settings.cull_mode)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE);
    rasterization_state = match settings.depth_bias {
        Some((constant, slope)) => rasterization_state
            .depth_bias_enable(true)
            .depth_bias_constant_factor(constant)
            .depth_bias_slope_factor(slope)
            .depth_bias_clamp(0.0),
        None => rasterization_state.depth_bias_enable(false),
    };

    let depth = key.raster.depth;
    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(depth.test)
        .depth_write_enable(depth.write)
        .depth_compare_op(compare_op_to_vk(depth.compare))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(settings.samples);

    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)];
    let blend_attachments: &[vk::PipelineColorBlendAttachmentState] =
        if shadow { &[] } else { &color_blend_attachments };
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .depth_stencil_state(&depth_stencil_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let pipelines = unsafe {
        device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
            .map_err(|(_, e)| vk_err(SOURCE, "Failed to create graphics pipeline", e))?
    };
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| tetra_render::render_err!(SOURCE, "Driver returned no pipeline"))
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;
