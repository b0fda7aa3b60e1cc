/// VulkanTexture - Vulkan implementation of the Texture trait
///
/// Creation is synchronous: pixel data goes through one staging buffer per
/// layer and a blocking one-shot submit, after which the image sits in
/// SHADER_READ_ONLY_OPTIMAL for its whole life.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use tetra_render::{
    AliveFlag, GpuResource, ResourceId, Result, Texture, TextureDesc, TextureFormat, TextureKind, TextureRef,
};

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::{aspect_for_format, texture_format_to_vk};

const SOURCE: &str = "tetra::vulkan::texture";

pub struct VulkanTexture {
    pub(crate) id: ResourceId,
    label: String,
    kind: TextureKind,
    width: u32,
    height: u32,
    format: TextureFormat,
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    allocation: Mutex<Option<Allocation>>,
    ctx: Arc<GpuContext>,
    alive: AliveFlag,
}

impl VulkanTexture {
    pub fn create(ctx: &Arc<GpuContext>, desc: &TextureDesc, kind: TextureKind) -> Result<Arc<Self>> {
        desc.validate(kind)?;
        ctx.require_alive("create_texture")?;

        let format = texture_format_to_vk(desc.format);
        let aspect_mask = aspect_for_format(desc.format);
        let layer_count = kind.layer_count();

        let (flags, view_type) = match kind {
            TextureKind::Texture2D => (vk::ImageCreateFlags::empty(), vk::ImageViewType::TYPE_2D),
            TextureKind::Cubemap => (vk::ImageCreateFlags::CUBE_COMPATIBLE, vk::ImageViewType::CUBE),
        };

        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: 1 })
            .mip_levels(1)
            .array_layers(layer_count)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let (image, allocation) = ctx.create_image(&desc.label, &image_info)?;

        let view = match ctx.create_image_view(image, view_type, format, aspect_mask, layer_count) {
            Ok(view) => view,
            Err(e) => {
                ctx.free(allocation);
                unsafe { ctx.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        // From here on the texture owns the native objects; drop releases them on error
        let texture = Arc::new(Self {
            id: ResourceId::next(),
            label: desc.label.clone(),
            kind,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            image,
            view,
            allocation: Mutex::new(Some(allocation)),
            ctx: Arc::clone(ctx),
            alive: AliveFlag::new(),
        });

        texture.upload(desc, aspect_mask, layer_count)?;

        tetra_render::render_debug!(
            SOURCE,
            "Created {:?} '{}' {}x{} {:?}",
            kind, desc.label, desc.width, desc.height, desc.format
        );
        Ok(texture)
    }

    /// Copy every layer through staging buffers and leave the image shader-readable
    fn upload(&self, desc: &TextureDesc, aspect_mask: vk::ImageAspectFlags, layer_count: u32) -> Result<()> {
        let layers = desc.layers();

        let mut staging: Vec<(vk::Buffer, Allocation)> = Vec::with_capacity(layers.len());
        let staged = self.fill_staging(&layers, &mut staging);

        let uploaded = staged.and_then(|()| {
            let range = vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count,
            };
            let image = self.image;
            let (width, height) = (self.width, self.height);
            let staging_buffers: Vec<vk::Buffer> = staging.iter().map(|(buffer, _)| *buffer).collect();

            self.ctx.submit_one_shot("texture upload", |device, command_buffer| unsafe {
                let to_transfer = vk::ImageMemoryBarrier::default()
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(range)
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);
                device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_transfer],
                );

                for (layer, buffer) in staging_buffers.iter().enumerate() {
                    let region = vk::BufferImageCopy::default()
                        .buffer_offset(0)
                        .buffer_row_length(0)
                        .buffer_image_height(0)
                        .image_subresource(vk::ImageSubresourceLayers {
                            aspect_mask,
                            mip_level: 0,
                            base_array_layer: layer as u32,
                            layer_count: 1,
                        })
                        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                        .image_extent(vk::Extent3D { width, height, depth: 1 });
                    device.cmd_copy_buffer_to_image(
                        command_buffer,
                        *buffer,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }

                let to_shader = vk::ImageMemoryBarrier::default()
                    .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(range)
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::SHADER_READ);
                device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_shader],
                );
            })
        });

        for (buffer, allocation) in staging {
            self.ctx.free(allocation);
            unsafe { self.ctx.device.destroy_buffer(buffer, None) };
        }
        uploaded
    }

    fn fill_staging(&self, layers: &[&[u8]], staging: &mut Vec<(vk::Buffer, Allocation)>) -> Result<()> {
        for (index, data) in layers.iter().enumerate() {
            let (buffer, allocation) = self.ctx.create_buffer(
                &format!("{} staging layer {}", self.label, index),
                data.len() as u64,
                vk::BufferUsageFlags::TRANSFER_SRC,
                MemoryLocation::CpuToGpu,
            )?;
            let mapped = allocation.mapped_ptr();
            staging.push((buffer, allocation));

            let mapped = mapped.ok_or_else(|| {
                tetra_render::render_err!(SOURCE, "Staging buffer for '{}' layer {} is not mapped", self.label, index)
            })?;
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.as_ptr() as *mut u8, data.len());
            }
        }
        Ok(())
    }

    /// Downcast a shared handle, rejecting expired or foreign textures
    pub(crate) fn from_handle(handle: &TextureRef) -> Result<&VulkanTexture> {
        if !handle.is_alive() {
            return Err(tetra_render::render_warn_err!(SOURCE, "Texture '{}' has expired", handle.label()));
        }
        handle.as_any().downcast_ref::<VulkanTexture>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Texture '{}' was not created by the Vulkan backend", handle.label())
        })
    }
}

impl GpuResource for VulkanTexture {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }

    fn cleanup(&self) {
        if !self.alive.retire() || !self.ctx.is_alive() {
            return;
        }
        unsafe {
            self.ctx.device.destroy_image_view(self.view, None);
        }
        let allocation = self.allocation.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(allocation) = allocation {
            self.ctx.free(allocation);
        }
        unsafe {
            self.ctx.device.destroy_image(self.image, None);
        }
    }
}

impl Texture for VulkanTexture {
    fn kind(&self) -> TextureKind {
        self.kind
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        self.cleanup();
    }
}
