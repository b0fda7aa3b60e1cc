/// SamplerCache - VkSampler objects created on first use
///
/// Only three samplers exist: repeat for material textures, clamp for
/// cubemaps and a depth-compare sampler for the shadow map.

use ash::vk;
use rustc_hash::FxHashMap;
use tetra_render::{Result, TextureKind};

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::vk_err;

const SOURCE: &str = "tetra::vulkan::sampler";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    LinearRepeat,
    LinearClamp,
    /// LESS_OR_EQUAL compare, white border outside the light frustum
    Shadow,
}

impl SamplerKind {
    pub fn for_texture(kind: TextureKind) -> Self {
        match kind {
            TextureKind::Texture2D => SamplerKind::LinearRepeat,
            TextureKind::Cubemap => SamplerKind::LinearClamp,
        }
    }
}

#[derive(Default)]
pub struct SamplerCache {
    cache: FxHashMap<SamplerKind, vk::Sampler>,
}

impl SamplerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, ctx: &GpuContext, kind: SamplerKind) -> Result<vk::Sampler> {
        if let Some(&sampler) = self.cache.get(&kind) {
            return Ok(sampler);
        }
        let sampler = Self::create_sampler(ctx, kind)?;
        self.cache.insert(kind, sampler);
        Ok(sampler)
    }

    /// Destroy every cached sampler (device must be alive)
    pub fn shutdown(&mut self, ctx: &GpuContext) {
        for (_, sampler) in self.cache.drain() {
            unsafe { ctx.device.destroy_sampler(sampler, None) };
        }
    }

    fn create_sampler(ctx: &GpuContext, kind: SamplerKind) -> Result<vk::Sampler> {
        let (filter, mipmap, address, border) = match kind {
            SamplerKind::LinearRepeat => (
                vk::Filter::LINEAR,
                vk::SamplerMipmapMode::LINEAR,
                vk::SamplerAddressMode::REPEAT,
                vk::BorderColor::FLOAT_OPAQUE_BLACK,
            ),
            SamplerKind::LinearClamp => (
                vk::Filter::LINEAR,
                vk::SamplerMipmapMode::LINEAR,
                vk::SamplerAddressMode::CLAMP_TO_EDGE,
                vk::BorderColor::FLOAT_OPAQUE_BLACK,
            ),
            SamplerKind::Shadow => (
                vk::Filter::LINEAR,
                vk::SamplerMipmapMode::NEAREST,
                vk::SamplerAddressMode::CLAMP_TO_BORDER,
                vk::BorderColor::FLOAT_OPAQUE_WHITE,
            ),
        };

        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap)
            .address_mode_u(address)
            .address_mode_v(address)
            .address_mode_w(address)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(border)
            .unnormalized_coordinates(false);

        create_info = if kind == SamplerKind::Shadow {
            create_info.compare_enable(true).compare_op(vk::CompareOp::LESS_OR_EQUAL)
        } else {
            create_info.compare_enable(false).compare_op(vk::CompareOp::ALWAYS)
        };

        create_info = if kind != SamplerKind::Shadow && ctx.limits.sampler_anisotropy {
            create_info.anisotropy_enable(true).max_anisotropy(ctx.limits.max_anisotropy.min(16.0))
        } else {
            create_info.anisotropy_enable(false).max_anisotropy(1.0)
        };

        let sampler = unsafe {
            ctx.device
                .create_sampler(&create_info, None)
                .map_err(|e| vk_err(SOURCE, &format!("Failed to create {:?} sampler", kind), e))?
        };
        tetra_render::render_trace!(SOURCE, "Created {:?} sampler", kind);
        Ok(sampler)
    }
}
