/// Texture - 2D and cubemap textures with decoded pixel data

use std::any::Any;
use std::sync::Arc;
use crate::error::{Error, Result};
use crate::resource::GpuResource;

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Texture2D,
    /// Six square faces in +X, -X, +Y, -Y, +Z, -Z order
    Cubemap,
}

impl TextureKind {
    pub fn layer_count(self) -> u32 {
        match self {
            TextureKind::Texture2D => 1,
            TextureKind::Cubemap => 6,
        }
    }
}

/// Pixel formats accepted by `create_texture`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    R8Unorm,
    Depth32Float,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8Srgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Depth32Float => 4,
            TextureFormat::R8Unorm => 1,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }
}

/// Decoded pixel data
#[derive(Debug, Clone)]
pub enum TextureData {
    /// No initial contents
    Empty,
    /// One layer
    Single(Vec<u8>),
    /// Cubemap faces
    Faces([Vec<u8>; 6]),
}

/// Texture creation descriptor
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: TextureData,
}

impl TextureDesc {
    /// RGBA8 2D texture from decoded pixels
    pub fn rgba8(label: &str, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            label: label.to_string(),
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            data: TextureData::Single(pixels),
        }
    }

    /// RGBA8 cubemap from six decoded faces
    pub fn rgba8_cubemap(label: &str, size: u32, faces: [Vec<u8>; 6]) -> Self {
        Self {
            label: label.to_string(),
            width: size,
            height: size,
            format: TextureFormat::Rgba8Unorm,
            data: TextureData::Faces(faces),
        }
    }

    /// Bytes of one layer
    pub fn layer_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() as usize
    }

    /// Check sizes and data shape for the requested kind
    pub fn validate(&self, kind: TextureKind) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidResource(format!(
                "Texture '{}' has zero extent {}x{}", self.label, self.width, self.height
            )));
        }
        let expected = self.layer_size();
        match (kind, &self.data) {
            (_, TextureData::Empty) => {}
            (TextureKind::Texture2D, TextureData::Single(pixels)) => {
                if pixels.len() != expected {
                    return Err(Error::InvalidResource(format!(
                        "Texture '{}' data is {} bytes, expected {}", self.label, pixels.len(), expected
                    )));
                }
            }
            (TextureKind::Cubemap, TextureData::Faces(faces)) => {
                if let Some((index, face)) = faces.iter().enumerate().find(|(_, f)| f.len() != expected) {
                    return Err(Error::InvalidResource(format!(
                        "Cubemap '{}' face {} is {} bytes, expected {}", self.label, index, face.len(), expected
                    )));
                }
            }
            (TextureKind::Texture2D, TextureData::Faces(_)) => {
                return Err(Error::InvalidResource(format!(
                    "Texture '{}' got cubemap faces; use create_cubemap_texture", self.label
                )));
            }
            (TextureKind::Cubemap, TextureData::Single(_)) => {
                return Err(Error::InvalidResource(format!(
                    "Cubemap '{}' needs six faces", self.label
                )));
            }
        }
        if kind == TextureKind::Cubemap && self.width != self.height {
            return Err(Error::InvalidResource(format!(
                "Cubemap '{}' faces must be square, got {}x{}", self.label, self.width, self.height
            )));
        }
        Ok(())
    }

    /// Per-layer byte slices in upload order
    pub fn layers(&self) -> Vec<&[u8]> {
        match &self.data {
            TextureData::Empty => Vec::new(),
            TextureData::Single(pixels) => vec![pixels.as_slice()],
            TextureData::Faces(faces) => faces.iter().map(|f| f.as_slice()).collect(),
        }
    }
}

/// GPU texture
pub trait Texture: GpuResource {
    fn kind(&self) -> TextureKind;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> TextureFormat;

    /// Downcast hook for backends
    fn as_any(&self) -> &dyn Any;
}

/// Shared texture handle
pub type TextureRef = Arc<dyn Texture>;

/// 1x1 opaque white, bound into every empty texture slot
pub const WHITE_PIXEL: [u8; 4] = [255, 255, 255, 255];

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
