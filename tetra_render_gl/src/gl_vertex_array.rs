/// VertexArrayCache - one vertex array object per vertex layout
///
/// Attribute formats live in the VAO and every attribute reads from vertex
/// binding 0; buffers are attached per draw with `glVertexArrayVertexBuffer`,
/// so a single VAO serves every mesh of a layout.

use rustc_hash::FxHashMap;
use tetra_render::layout::{color_vertex_attributes, vertex_attributes, VertexAttribute};
use tetra_render::{Result, VertexLayout};

use crate::api::{GlApi, GlName};
use crate::gl_convert::{attribute_format_to_gl, check_error};

const SOURCE: &str = "tetra::gl::vertex_array";

pub fn layout_attributes(layout: VertexLayout) -> Vec<VertexAttribute> {
    match layout {
        VertexLayout::Standard => vertex_attributes(false),
        VertexLayout::Skinned => vertex_attributes(true),
        VertexLayout::PositionColor => color_vertex_attributes(),
    }
}

#[derive(Default)]
pub struct VertexArrayCache {
    arrays: FxHashMap<VertexLayout, GlName>,
}

impl VertexArrayCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, api: &dyn GlApi, layout: VertexLayout) -> Result<GlName> {
        if let Some(&vao) = self.arrays.get(&layout) {
            return Ok(vao);
        }
        let vao = api.create_vertex_array();
        for attribute in layout_attributes(layout) {
            let (size, ty, integer) = attribute_format_to_gl(attribute.format);
            api.vertex_array_attrib_format(vao, attribute.location, size, ty, integer, attribute.offset);
            api.vertex_array_attrib_binding(vao, attribute.location, 0);
            api.enable_vertex_array_attrib(vao, attribute.location);
        }
        if let Err(error) = check_error(api, SOURCE, &format!("Failed to build {:?} vertex array", layout)) {
            api.delete_vertex_array(vao);
            return Err(error);
        }
        tetra_render::render_debug!(SOURCE, "Vertex array {} for {:?} layout", vao, layout);
        self.arrays.insert(layout, vao);
        Ok(vao)
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn clear(&mut self, api: &dyn GlApi) {
        for (_, vao) in self.arrays.drain() {
            api.delete_vertex_array(vao);
        }
    }
}

#[cfg(test)]
#[path = "gl_vertex_array_tests.rs"]
mod tests;
