/// GlTexture - OpenGL implementation of the Texture trait
///
/// Immutable storage (`glTextureStorage2D`, one level) and one whole-image
/// upload per layer; cube faces upload in +X, -X, +Y, -Y, +Z, -Z order.

use std::any::Any;
use std::sync::Arc;
use tetra_render::{AliveFlag, GpuResource, Result, Texture, TextureDesc, TextureFormat, TextureKind, TextureRef};

use crate::api::{GlEnum, GlName};
use crate::gl_context::GpuContext;
use crate::gl_convert::{check_error, pixel_format, GL_TEXTURE_2D, GL_TEXTURE_CUBE_MAP};

const SOURCE: &str = "tetra::gl::texture";

pub struct GlTexture {
    label: String,
    kind: TextureKind,
    width: u32,
    height: u32,
    format: TextureFormat,
    pub(crate) target: GlEnum,
    pub(crate) name: GlName,
    ctx: Arc<GpuContext>,
    alive: AliveFlag,
}

impl GlTexture {
    pub fn create(ctx: &Arc<GpuContext>, desc: &TextureDesc, kind: TextureKind) -> Result<Arc<Self>> {
        desc.validate(kind)?;
        ctx.require_alive("create_texture")?;

        let target = match kind {
            TextureKind::Texture2D => GL_TEXTURE_2D,
            TextureKind::Cubemap => GL_TEXTURE_CUBE_MAP,
        };
        let pixels = pixel_format(desc.format);

        let api = ctx.api.as_ref();
        let name = api.create_texture(target);
        api.texture_storage_2d(name, pixels.internal_format, desc.width, desc.height);
        for (layer, bytes) in desc.layers().into_iter().enumerate() {
            api.texture_sub_image(name, layer as u32, desc.width, desc.height, pixels.format, pixels.ty, bytes);
        }
        if let Err(error) = check_error(api, SOURCE, &format!("Failed to create texture '{}'", desc.label)) {
            api.delete_texture(name);
            return Err(error);
        }

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
            target,
            name,
            ctx: Arc::clone(ctx),
            alive: AliveFlag::new(),
        }))
    }

    /// Downcast a shared handle, rejecting expired or foreign textures
    pub(crate) fn from_handle(handle: &TextureRef) -> Result<&GlTexture> {
        if !handle.is_alive() {
            return Err(tetra_render::render_warn_err!(SOURCE, "Texture '{}' has expired", handle.label()));
        }
        handle.as_any().downcast_ref::<GlTexture>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Texture '{}' was not created by the OpenGL backend", handle.label())
        })
    }
}

impl GpuResource for GlTexture {
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
        self.ctx.api.delete_texture(self.name);
    }
}

impl Texture for GlTexture {
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

impl Drop for GlTexture {
    fn drop(&mut self) {
        self.cleanup();
    }
}
