/// Dx12Texture - Direct3D 12 implementation of the Texture trait
///
/// One default-heap Texture2D array (six layers for cubemaps) plus its SRV.
/// Pixel data is laid out in a single staging buffer following the copy
/// footprint rules (256-byte row pitch, 512-byte layer placement) and copied
/// in one blocking submit.

use std::any::Any;
use std::sync::Arc;
use tetra_render::resource::align_up;
use tetra_render::{
    AliveFlag, GpuResource, ResourceId, Result, Texture, TextureDesc, TextureFormat, TextureKind, TextureRef,
};

use crate::d3d12_context::GpuContext;
use crate::d3d12_convert::{
    hr_err, texture_format_to_dxgi, DXGI_FORMAT_R32_FLOAT, DXGI_FORMAT_R32_TYPELESS,
    TEXTURE_DATA_PITCH_ALIGNMENT, TEXTURE_DATA_PLACEMENT_ALIGNMENT,
};
use crate::device::{HeapKind, ListCommand, NativeHandle, ResourceDesc, ResourceState, ViewKind};

const SOURCE: &str = "tetra::d3d12::texture";

/// Placement of one layer inside the staging buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerFootprint {
    pub offset: u64,
    pub row_pitch: u32,
    pub rows: u32,
}

/// Copy footprints for `layers` layers of `width`x`height` texels
pub fn layer_footprints(width: u32, height: u32, bytes_per_pixel: u32, layers: usize) -> (Vec<LayerFootprint>, u64) {
    let row_pitch = align_up((width * bytes_per_pixel) as u64, TEXTURE_DATA_PITCH_ALIGNMENT as u64) as u32;
    let layer_size = row_pitch as u64 * height as u64;
    let mut offset = 0;
    let footprints = (0..layers)
        .map(|_| {
            let footprint = LayerFootprint { offset, row_pitch, rows: height };
            offset = align_up(offset + layer_size, TEXTURE_DATA_PLACEMENT_ALIGNMENT);
            footprint
        })
        .collect();
    (footprints, offset)
}

/// Resource and SRV formats; depth textures are typeless so they can be sampled
fn native_formats(format: TextureFormat) -> (u32, u32) {
    if format.is_depth() {
        (DXGI_FORMAT_R32_TYPELESS, DXGI_FORMAT_R32_FLOAT)
    } else {
        let dxgi = texture_format_to_dxgi(format);
        (dxgi, dxgi)
    }
}

pub struct Dx12Texture {
    pub(crate) id: ResourceId,
    label: String,
    kind: TextureKind,
    width: u32,
    height: u32,
    format: TextureFormat,
    pub(crate) resource: NativeHandle,
    pub(crate) srv: NativeHandle,
    ctx: Arc<GpuContext>,
    alive: AliveFlag,
}

impl Dx12Texture {
    pub fn create(ctx: &Arc<GpuContext>, desc: &TextureDesc, kind: TextureKind) -> Result<Arc<Self>> {
        desc.validate(kind)?;
        ctx.require_alive("create_texture")?;

        let (resource_format, view_format) = native_formats(desc.format);
        let resource = ctx
            .device
            .create_committed_resource(
                &desc.label,
                HeapKind::Default,
                &ResourceDesc::Texture2D {
                    width: desc.width,
                    height: desc.height,
                    array_size: kind.layer_count(),
                    format: resource_format,
                    samples: 1,
                    render_target: false,
                    depth_stencil: false,
                },
                ResourceState::CopyDest,
            )
            .map_err(|hr| hr_err(SOURCE, &format!("Failed to create texture '{}'", desc.label), hr))?;

        let srv = match ctx.device.create_view(
            resource,
            ViewKind::ShaderResource { format: view_format, cube: kind == TextureKind::Cubemap },
        ) {
            Ok(view) => view,
            Err(hr) => {
                ctx.device.release(resource);
                return Err(hr_err(SOURCE, &format!("Failed to create SRV for '{}'", desc.label), hr));
            }
        };

        // The texture owns the native objects from here; drop releases them on error
        let texture = Arc::new(Self {
            id: ResourceId::next(),
            label: desc.label.clone(),
            kind,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            resource,
            srv,
            ctx: Arc::clone(ctx),
            alive: AliveFlag::new(),
        });

        texture.upload(desc)?;

        tetra_render::render_debug!(
            SOURCE,
            "Created {:?} '{}' {}x{} {:?}",
            kind, desc.label, desc.width, desc.height, desc.format
        );
        Ok(texture)
    }

    fn upload(&self, desc: &TextureDesc) -> Result<()> {
        let layers = desc.layers();
        let bytes_per_pixel = desc.format.bytes_per_pixel();
        let (footprints, total) = layer_footprints(desc.width, desc.height, bytes_per_pixel, layers.len());
        let resource = self.resource;

        if layers.is_empty() {
            // Nothing to copy; still leave the texture shader-readable
            return self.ctx.upload(&self.label, &[], |device, list, _| {
                device.record(
                    list,
                    ListCommand::ResourceBarrier { resource, before: ResourceState::CopyDest, after: ResourceState::Common },
                );
            });
        }

        let tight_row = (desc.width * bytes_per_pixel) as usize;
        let mut staging = vec![0u8; total as usize];
        for (data, footprint) in layers.iter().zip(&footprints) {
            for (row, src) in data.chunks_exact(tight_row).enumerate() {
                let start = footprint.offset as usize + row * footprint.row_pitch as usize;
                staging[start..start + tight_row].copy_from_slice(src);
            }
        }

        self.ctx.upload(&self.label, &staging, |device, list, src| {
            for (layer, footprint) in footprints.iter().enumerate() {
                device.record(
                    list,
                    ListCommand::CopyTextureRegion {
                        dst: resource,
                        subresource: layer as u32,
                        src,
                        src_offset: footprint.offset,
                        row_pitch: footprint.row_pitch,
                    },
                );
            }
            device.record(
                list,
                ListCommand::ResourceBarrier { resource, before: ResourceState::CopyDest, after: ResourceState::Common },
            );
        })
    }

    /// Downcast a shared handle, rejecting expired or foreign textures
    pub(crate) fn from_handle(handle: &TextureRef) -> Result<&Dx12Texture> {
        if !handle.is_alive() {
            return Err(tetra_render::render_warn_err!(SOURCE, "Texture '{}' has expired", handle.label()));
        }
        handle.as_any().downcast_ref::<Dx12Texture>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Texture '{}' was not created by the D3D12 backend", handle.label())
        })
    }
}

impl GpuResource for Dx12Texture {
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
        self.ctx.device.release(self.srv);
        self.ctx.device.release(self.resource);
    }
}

impl Texture for Dx12Texture {
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

impl Drop for Dx12Texture {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
#[path = "d3d12_texture_tests.rs"]
mod tests;
