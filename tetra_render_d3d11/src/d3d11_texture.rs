/// Dx11Texture - Direct3D 11 implementation of the Texture trait
///
/// A Texture2D array (six layers for cubemaps) created with its pixels as
/// initial data, plus the SRV the context binds.

use std::any::Any;
use std::sync::Arc;
use tetra_render::{
    AliveFlag, GpuResource, Result, Texture, TextureDesc, TextureFormat, TextureKind, TextureRef,
};

use crate::d3d11_context::GpuContext;
use crate::d3d11_convert::{hr_err, texture_formats};
use crate::device::{NativeHandle, SubresourceData, Texture2DDesc, ViewKind};

const SOURCE: &str = "tetra::d3d11::texture";

pub struct Dx11Texture {
    label: String,
    kind: TextureKind,
    width: u32,
    height: u32,
    format: TextureFormat,
    resource: NativeHandle,
    pub(crate) srv: NativeHandle,
    ctx: Arc<GpuContext>,
    alive: AliveFlag,
}

impl Dx11Texture {
    pub fn create(ctx: &Arc<GpuContext>, desc: &TextureDesc, kind: TextureKind) -> Result<Arc<Self>> {
        desc.validate(kind)?;
        ctx.require_alive("create_texture")?;

        let (resource_format, view_format) = texture_formats(desc.format);
        let row_pitch = desc.width * desc.format.bytes_per_pixel();
        let initial: Vec<SubresourceData<'_>> = desc
            .layers()
            .into_iter()
            .map(|bytes| SubresourceData { bytes, row_pitch })
            .collect();
        let cube = kind == TextureKind::Cubemap;

        let resource = ctx
            .device
            .create_texture2d(
                &desc.label,
                &Texture2DDesc {
                    width: desc.width,
                    height: desc.height,
                    array_size: kind.layer_count(),
                    format: resource_format,
                    samples: 1,
                    cube,
                    shader_resource: true,
                    render_target: false,
                    depth_stencil: false,
                },
                &initial,
            )
            .map_err(|hr| hr_err(SOURCE, &format!("Failed to create texture '{}'", desc.label), hr))?;

        let srv = match ctx.device.create_view(resource, ViewKind::ShaderResource { format: view_format, cube }) {
            Ok(view) => view,
            Err(hr) => {
                ctx.device.release(resource);
                return Err(hr_err(SOURCE, &format!("Failed to create SRV for '{}'", desc.label), hr));
            }
        };

        tetra_render::render_debug!(
            SOURCE,
            "Created {:?} '{}' {}x{} {:?}",
            kind, desc.label, desc.width, desc.height, desc.format
        );
        Ok(Arc::new(Self {
            label: desc.label.clone(),
            kind,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            resource,
            srv,
            ctx: Arc::clone(ctx),
            alive: AliveFlag::new(),
        }))
    }

    /// Downcast a shared handle, rejecting expired or foreign textures
    pub(crate) fn from_handle(handle: &TextureRef) -> Result<&Dx11Texture> {
        if !handle.is_alive() {
            return Err(tetra_render::render_warn_err!(SOURCE, "Texture '{}' has expired", handle.label()));
        }
        handle.as_any().downcast_ref::<Dx11Texture>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Texture '{}' was not created by the D3D11 backend", handle.label())
        })
    }
}

impl GpuResource for Dx11Texture {
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

impl Texture for Dx11Texture {
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

impl Drop for Dx11Texture {
    fn drop(&mut self) {
        self.cleanup();
    }
}
