/// GlApi - the OpenGL 4.5 entry points the backend calls
///
/// Direct-state-access variants throughout, so creating and uploading
/// resources never disturbs the bindings the render context applies.
/// Failures are reported the GL way: calls return nothing and the caller
/// polls `get_error`.
///
/// An implementation wraps a context that is current on the render thread.

/// `GLuint` object name; 0 is "no object"
pub type GlName = u32;
/// `GLenum`
pub type GlEnum = u32;

pub trait GlApi: Send + Sync {
    // ===== QUERIES =====

    /// `GL_RENDERER` string
    fn renderer_name(&self) -> String;
    /// `GL_MAX_SAMPLES`
    fn max_samples(&self) -> u32;
    /// Oldest recorded error flag, `GL_NO_ERROR` if none
    fn get_error(&self) -> GlEnum;

    // ===== BUFFERS =====

    fn create_buffer(&self) -> GlName;
    fn named_buffer_data(&self, buffer: GlName, size: usize, data: Option<&[u8]>, usage: GlEnum);
    fn named_buffer_sub_data(&self, buffer: GlName, offset: usize, data: &[u8]);
    fn delete_buffer(&self, buffer: GlName);

    // ===== TEXTURES AND SAMPLERS =====

    fn create_texture(&self, target: GlEnum) -> GlName;
    /// Single mip level; cube maps get six faces
    fn texture_storage_2d(&self, texture: GlName, internal_format: GlEnum, width: u32, height: u32);
    /// Whole-image upload; `layer` is the cube face, 0 for 2D textures
    #[allow(clippy::too_many_arguments)]
    fn texture_sub_image(
        &self,
        texture: GlName,
        layer: u32,
        width: u32,
        height: u32,
        format: GlEnum,
        ty: GlEnum,
        pixels: &[u8],
    );
    fn delete_texture(&self, texture: GlName);

    fn create_sampler(&self) -> GlName;
    fn sampler_parameter(&self, sampler: GlName, pname: GlEnum, value: GlEnum);
    fn delete_sampler(&self, sampler: GlName);

    // ===== PROGRAMS =====

    fn create_shader(&self, stage: GlEnum) -> GlName;
    fn shader_source(&self, shader: GlName, source: &str);
    fn compile_shader(&self, shader: GlName);
    fn shader_compile_status(&self, shader: GlName) -> bool;
    fn shader_info_log(&self, shader: GlName) -> String;
    fn delete_shader(&self, shader: GlName);

    fn create_program(&self) -> GlName;
    fn attach_shader(&self, program: GlName, shader: GlName);
    fn link_program(&self, program: GlName);
    fn program_link_status(&self, program: GlName) -> bool;
    fn program_info_log(&self, program: GlName) -> String;
    fn delete_program(&self, program: GlName);

    // ===== VERTEX ARRAYS =====

    fn create_vertex_array(&self) -> GlName;
    /// `glVertexArrayAttribFormat` (float) or `glVertexArrayAttribIFormat` (integer)
    fn vertex_array_attrib_format(&self, vao: GlName, index: u32, size: u32, ty: GlEnum, integer: bool, offset: u32);
    fn vertex_array_attrib_binding(&self, vao: GlName, index: u32, binding: u32);
    fn enable_vertex_array_attrib(&self, vao: GlName, index: u32);
    /// Buffer 0 detaches the binding
    fn vertex_array_vertex_buffer(&self, vao: GlName, binding: u32, buffer: GlName, stride: u32);
    fn vertex_array_element_buffer(&self, vao: GlName, buffer: GlName);
    fn delete_vertex_array(&self, vao: GlName);

    // ===== FRAMEBUFFERS =====

    fn create_renderbuffer(&self) -> GlName;
    fn named_renderbuffer_storage_multisample(
        &self,
        renderbuffer: GlName,
        samples: u32,
        internal_format: GlEnum,
        width: u32,
        height: u32,
    );
    fn delete_renderbuffer(&self, renderbuffer: GlName);

    fn create_framebuffer(&self) -> GlName;
    fn named_framebuffer_renderbuffer(&self, framebuffer: GlName, attachment: GlEnum, renderbuffer: GlName);
    fn check_named_framebuffer_status(&self, framebuffer: GlName) -> GlEnum;
    /// Same-size blit from `read` into `draw` (0 is the default framebuffer)
    fn blit_named_framebuffer(&self, read: GlName, draw: GlName, width: u32, height: u32, mask: u32, filter: GlEnum);
    fn delete_framebuffer(&self, framebuffer: GlName);

    // ===== FIXED-FUNCTION STATE =====

    fn enable(&self, capability: GlEnum);
    fn disable(&self, capability: GlEnum);
    fn polygon_mode(&self, face: GlEnum, mode: GlEnum);
    fn cull_face(&self, face: GlEnum);
    fn depth_func(&self, func: GlEnum);
    fn depth_mask(&self, write: bool);
    fn viewport(&self, width: u32, height: u32);
    fn bind_framebuffer(&self, target: GlEnum, framebuffer: GlName);
    fn clear_color(&self, color: [f32; 4]);
    fn clear_depth(&self, depth: f32);
    fn clear(&self, mask: u32);

    // ===== BINDING AND DRAWING =====

    fn use_program(&self, program: GlName);
    fn bind_vertex_array(&self, vao: GlName);
    /// Buffer 0 unbinds the indexed binding point
    fn bind_buffer_base(&self, target: GlEnum, index: u32, buffer: GlName);
    /// `GL_TEXTURE0 + unit`
    fn active_texture(&self, unit: GlEnum);
    fn bind_texture(&self, target: GlEnum, texture: GlName);
    fn bind_sampler(&self, unit: u32, sampler: GlName);
    fn draw_arrays_instanced(&self, mode: GlEnum, first: u32, count: u32, instances: u32);
    /// Indices start at offset 0 of the vertex array's element buffer
    fn draw_elements_instanced(&self, mode: GlEnum, count: u32, ty: GlEnum, instances: u32);

    // ===== SURFACE =====

    fn swap_interval(&self, interval: u32);
    /// Match the window surface to a new client size
    fn resize_surface(&self, _width: u32, _height: u32) {}
    fn swap_buffers(&self);
    fn finish(&self);
}
