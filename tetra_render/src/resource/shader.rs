/// Shader - compiled vertex + fragment program
///
/// Source compilation happens outside the render core; descriptors carry
/// backend bytecode (SPIR-V, DXBC/DXIL or GLSL text for the GL backend).

use std::any::Any;
use std::sync::Arc;
use crate::error::{Error, Result};
use crate::resource::GpuResource;

/// Vertex input layout a shader was compiled against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// `layout::Vertex` (92 bytes)
    Standard,
    /// `layout::ColorVertex` (28 bytes), used by debug lines
    PositionColor,
    /// `layout::Vertex` with bone ids/weights consumed
    Skinned,
}

impl VertexLayout {
    pub fn stride(self) -> u32 {
        match self {
            VertexLayout::Standard | VertexLayout::Skinned => crate::layout::VERTEX_STRIDE,
            VertexLayout::PositionColor => crate::layout::COLOR_VERTEX_STRIDE,
        }
    }
}

/// One compiled stage
#[derive(Debug, Clone)]
pub struct ShaderStageDesc {
    pub bytecode: Vec<u8>,
    pub entry_point: String,
}

impl ShaderStageDesc {
    pub fn new(bytecode: Vec<u8>) -> Self {
        Self { bytecode, entry_point: "main".to_string() }
    }
}

/// Shader creation descriptor
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    pub label: String,
    pub vertex: ShaderStageDesc,
    pub fragment: ShaderStageDesc,
    pub layout: VertexLayout,
}

impl ShaderDesc {
    pub fn validate(&self) -> Result<()> {
        for (stage, desc) in [("vertex", &self.vertex), ("fragment", &self.fragment)] {
            if desc.bytecode.is_empty() {
                return Err(Error::InvalidResource(format!(
                    "Shader '{}' has empty {} bytecode", self.label, stage
                )));
            }
            if desc.entry_point.is_empty() {
                return Err(Error::InvalidResource(format!(
                    "Shader '{}' has no {} entry point", self.label, stage
                )));
            }
        }
        Ok(())
    }
}

/// GPU shader program
pub trait Shader: GpuResource {
    fn layout(&self) -> VertexLayout;

    /// Downcast hook for backends
    fn as_any(&self) -> &dyn Any;
}

/// Shared shader handle
pub type ShaderRef = Arc<dyn Shader>;
