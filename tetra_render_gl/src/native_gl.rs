/// NativeGl - `GlApi` over a real OpenGL 4.5 core context
///
/// `glutin` creates the context and the window surface from raw window
/// handles and makes them current on the calling thread; the `gl` crate
/// loads the entry points through the display. The context stays current on
/// that thread, so every call must come from it: build the renderer on the
/// render thread and keep it there.

use std::ffi::{c_char, c_void, CStr, CString};
use std::num::NonZeroU32;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use glutin::config::{Config, ConfigTemplateBuilder};
use glutin::context::{ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext, Version};
use glutin::display::{Display, DisplayApiPreference};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawWindowHandle};
use tetra_render::{Error, Result};

use crate::api::{GlApi, GlEnum, GlName};
use crate::gl_convert::{
    GL_BGRA, GL_DEPTH_COMPONENT, GL_FLOAT, GL_INVALID_ENUM, GL_INVALID_VALUE, GL_NO_ERROR, GL_RED, GL_RGBA,
    GL_TEXTURE_CUBE_MAP, GL_UNSIGNED_BYTE,
};

const SOURCE: &str = "tetra::gl::native";

fn init_err(message: &str, error: impl std::fmt::Display) -> Error {
    tetra_render::render_error!(SOURCE, "{}: {}", message, error);
    Error::InitializationFailed(format!("{}: {}", message, error))
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

#[cfg(windows)]
fn display_preference(window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::WglThenEgl(Some(window))
}

#[cfg(target_os = "macos")]
fn display_preference(_window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Cgl
}

#[cfg(all(unix, not(target_os = "macos")))]
fn display_preference(_window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Egl
}

/// Bytes per pixel of an upload, None for combinations the backend never uses
fn upload_pixel_size(format: GlEnum, ty: GlEnum) -> Option<usize> {
    match (format, ty) {
        (GL_RED, GL_UNSIGNED_BYTE) => Some(1),
        (GL_RGBA | GL_BGRA, GL_UNSIGNED_BYTE) => Some(4),
        (GL_DEPTH_COMPONENT, GL_FLOAT) => Some(4),
        _ => None,
    }
}

fn gl_bool(value: bool) -> gl::types::GLboolean {
    if value {
        gl::TRUE
    } else {
        gl::FALSE
    }
}

pub struct NativeGl {
    // Field order is drop order: context before surface before display
    context: PossiblyCurrentContext,
    surface: Surface<WindowSurface>,
    _display: Display,
    renderer: String,
    /// Error raised by argument checks on this side of the driver
    local_error: AtomicU32,
}

// SAFETY: the context is current on the thread that created it and the
// renderer owning this value never leaves that thread; glutin objects are
// only touched through `&self` from there.
unsafe impl Send for NativeGl {}
unsafe impl Sync for NativeGl {}

impl NativeGl {
    /// Create a 4.5 core context and window surface for `window`, make it current
    pub fn new<W>(window: &W, width: u32, height: u32, debug: bool) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let raw_display = window
            .display_handle()
            .map_err(|e| init_err("No display handle", e))?
            .as_raw();
        let raw_window = window
            .window_handle()
            .map_err(|e| init_err("No window handle", e))?
            .as_raw();

        // SAFETY: both handles come from a live window borrowed for this call
        let display = unsafe { Display::new(raw_display, display_preference(raw_window)) }
            .map_err(|e| init_err("Failed to open GL display", e))?;

        let config = Self::pick_config(&display, raw_window)?;
        let attributes = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::OpenGl(Some(Version::new(4, 5))))
            .with_profile(GlProfile::Core)
            .with_debug(debug)
            .build(Some(raw_window));
        // SAFETY: raw_window is valid for the duration of the call
        let not_current = unsafe { display.create_context(&config, &attributes) }
            .map_err(|e| init_err("Failed to create OpenGL 4.5 core context", e))?;

        let surface_attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
            raw_window,
            non_zero(width),
            non_zero(height),
        );
        // SAFETY: the surface is dropped before the window it draws to
        let surface = unsafe { display.create_window_surface(&config, &surface_attributes) }
            .map_err(|e| init_err("Failed to create window surface", e))?;
        let context = not_current
            .make_current(&surface)
            .map_err(|e| init_err("Failed to make context current", e))?;

        gl::load_with(|symbol| match CString::new(symbol) {
            Ok(name) => display.get_proc_address(&name),
            Err(_) => ptr::null(),
        });
        if !gl::CreateBuffers::is_loaded() || !gl::BlitNamedFramebuffer::is_loaded() {
            return Err(init_err("Context lacks OpenGL 4.5 direct state access", "entry points missing"));
        }
        // Rows of every upload are tightly packed
        unsafe { gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1) };

        let renderer = unsafe {
            let name = gl::GetString(gl::RENDERER);
            if name.is_null() {
                String::from("unknown")
            } else {
                CStr::from_ptr(name as *const c_char).to_string_lossy().into_owned()
            }
        };
        tetra_render::render_info!(SOURCE, "OpenGL context on '{}', {}x{}", renderer, width, height);

        Ok(Self { context, surface, _display: display, renderer, local_error: AtomicU32::new(GL_NO_ERROR) })
    }

    /// Single-sampled config with depth; MSAA goes through renderbuffers
    fn pick_config(display: &Display, window: RawWindowHandle) -> Result<Config> {
        let template = ConfigTemplateBuilder::new()
            .compatible_with_native_window(window)
            .with_alpha_size(8)
            .with_depth_size(24)
            .build();
        // SAFETY: the template references a live window
        let configs = unsafe { display.find_configs(template) }
            .map_err(|e| init_err("Failed to enumerate GL configs", e))?;
        configs
            .min_by_key(|config| config.num_samples())
            .ok_or_else(|| init_err("No GL config matches the window", "empty config list"))
    }

    fn raise(&self, code: GlEnum) {
        let _ = self
            .local_error
            .compare_exchange(GL_NO_ERROR, code, Ordering::AcqRel, Ordering::Acquire);
    }

    fn create_name(create: unsafe fn(gl::types::GLsizei, *mut GlName)) -> GlName {
        let mut name = 0;
        unsafe { create(1, &mut name) };
        name
    }

    fn info_log(
        object: GlName,
        get_iv: unsafe fn(GlName, GlEnum, *mut gl::types::GLint),
        get_log: unsafe fn(GlName, gl::types::GLsizei, *mut gl::types::GLsizei, *mut gl::types::GLchar),
    ) -> String {
        let mut length = 0;
        unsafe { get_iv(object, gl::INFO_LOG_LENGTH, &mut length) };
        if length <= 0 {
            return String::new();
        }
        let mut buffer = vec![0u8; length as usize];
        let mut written = 0;
        unsafe { get_log(object, length, &mut written, buffer.as_mut_ptr().cast()) };
        buffer.truncate(written.max(0) as usize);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl GlApi for NativeGl {
    fn renderer_name(&self) -> String {
        self.renderer.clone()
    }

    fn max_samples(&self) -> u32 {
        let mut samples = 0;
        unsafe { gl::GetIntegerv(gl::MAX_SAMPLES, &mut samples) };
        samples.max(1) as u32
    }

    fn get_error(&self) -> GlEnum {
        match self.local_error.swap(GL_NO_ERROR, Ordering::AcqRel) {
            GL_NO_ERROR => unsafe { gl::GetError() },
            code => code,
        }
    }

    // ===== BUFFERS =====

    fn create_buffer(&self) -> GlName {
        Self::create_name(gl::CreateBuffers)
    }

    fn named_buffer_data(&self, buffer: GlName, size: usize, data: Option<&[u8]>, usage: GlEnum) {
        let contents = match data {
            Some(bytes) if bytes.len() < size => {
                self.raise(GL_INVALID_VALUE);
                return;
            }
            Some(bytes) => bytes.as_ptr().cast::<c_void>(),
            None => ptr::null(),
        };
        unsafe { gl::NamedBufferData(buffer, size as gl::types::GLsizeiptr, contents, usage) };
    }

    fn named_buffer_sub_data(&self, buffer: GlName, offset: usize, data: &[u8]) {
        unsafe {
            gl::NamedBufferSubData(
                buffer,
                offset as gl::types::GLintptr,
                data.len() as gl::types::GLsizeiptr,
                data.as_ptr().cast(),
            )
        };
    }

    fn delete_buffer(&self, buffer: GlName) {
        unsafe { gl::DeleteBuffers(1, &buffer) };
    }

    // ===== TEXTURES AND SAMPLERS =====

    fn create_texture(&self, target: GlEnum) -> GlName {
        let mut name = 0;
        unsafe { gl::CreateTextures(target, 1, &mut name) };
        name
    }

    fn texture_storage_2d(&self, texture: GlName, internal_format: GlEnum, width: u32, height: u32) {
        unsafe { gl::TextureStorage2D(texture, 1, internal_format, width as i32, height as i32) };
    }

    fn texture_sub_image(
        &self,
        texture: GlName,
        layer: u32,
        width: u32,
        height: u32,
        format: GlEnum,
        ty: GlEnum,
        pixels: &[u8],
    ) {
        let Some(pixel_size) = upload_pixel_size(format, ty) else {
            self.raise(GL_INVALID_ENUM);
            return;
        };
        if pixels.len() < width as usize * height as usize * pixel_size {
            self.raise(GL_INVALID_VALUE);
            return;
        }

        let mut target = 0;
        unsafe { gl::GetTextureParameteriv(texture, gl::TEXTURE_TARGET, &mut target) };
        let (w, h) = (width as i32, height as i32);
        unsafe {
            if target as GlEnum == GL_TEXTURE_CUBE_MAP {
                gl::TextureSubImage3D(texture, 0, 0, 0, layer as i32, w, h, 1, format, ty, pixels.as_ptr().cast());
            } else {
                gl::TextureSubImage2D(texture, 0, 0, 0, w, h, format, ty, pixels.as_ptr().cast());
            }
        }
    }

    fn delete_texture(&self, texture: GlName) {
        unsafe { gl::DeleteTextures(1, &texture) };
    }

    fn create_sampler(&self) -> GlName {
        Self::create_name(gl::CreateSamplers)
    }

    fn sampler_parameter(&self, sampler: GlName, pname: GlEnum, value: GlEnum) {
        unsafe { gl::SamplerParameteri(sampler, pname, value as i32) };
    }

    fn delete_sampler(&self, sampler: GlName) {
        unsafe { gl::DeleteSamplers(1, &sampler) };
    }

    // ===== PROGRAMS =====

    fn create_shader(&self, stage: GlEnum) -> GlName {
        unsafe { gl::CreateShader(stage) }
    }

    fn shader_source(&self, shader: GlName, source: &str) {
        let text = source.as_ptr() as *const gl::types::GLchar;
        let length = source.len() as gl::types::GLint;
        unsafe { gl::ShaderSource(shader, 1, &text, &length) };
    }

    fn compile_shader(&self, shader: GlName) {
        unsafe { gl::CompileShader(shader) };
    }

    fn shader_compile_status(&self, shader: GlName) -> bool {
        let mut status = 0;
        unsafe { gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status) };
        status == gl::TRUE as i32
    }

    fn shader_info_log(&self, shader: GlName) -> String {
        Self::info_log(shader, gl::GetShaderiv, gl::GetShaderInfoLog)
    }

    fn delete_shader(&self, shader: GlName) {
        unsafe { gl::DeleteShader(shader) };
    }

    fn create_program(&self) -> GlName {
        unsafe { gl::CreateProgram() }
    }

    fn attach_shader(&self, program: GlName, shader: GlName) {
        unsafe { gl::AttachShader(program, shader) };
    }

    fn link_program(&self, program: GlName) {
        unsafe { gl::LinkProgram(program) };
    }

    fn program_link_status(&self, program: GlName) -> bool {
        let mut status = 0;
        unsafe { gl::GetProgramiv(program, gl::LINK_STATUS, &mut status) };
        status == gl::TRUE as i32
    }

    fn program_info_log(&self, program: GlName) -> String {
        Self::info_log(program, gl::GetProgramiv, gl::GetProgramInfoLog)
    }

    fn delete_program(&self, program: GlName) {
        unsafe { gl::DeleteProgram(program) };
    }

    // ===== VERTEX ARRAYS =====

    fn create_vertex_array(&self) -> GlName {
        Self::create_name(gl::CreateVertexArrays)
    }

    fn vertex_array_attrib_format(&self, vao: GlName, index: u32, size: u32, ty: GlEnum, integer: bool, offset: u32) {
        unsafe {
            if integer {
                gl::VertexArrayAttribIFormat(vao, index, size as i32, ty, offset);
            } else {
                gl::VertexArrayAttribFormat(vao, index, size as i32, ty, gl::FALSE, offset);
            }
        }
    }

    fn vertex_array_attrib_binding(&self, vao: GlName, index: u32, binding: u32) {
        unsafe { gl::VertexArrayAttribBinding(vao, index, binding) };
    }

    fn enable_vertex_array_attrib(&self, vao: GlName, index: u32) {
        unsafe { gl::EnableVertexArrayAttrib(vao, index) };
    }

    fn vertex_array_vertex_buffer(&self, vao: GlName, binding: u32, buffer: GlName, stride: u32) {
        unsafe { gl::VertexArrayVertexBuffer(vao, binding, buffer, 0, stride as i32) };
    }

    fn vertex_array_element_buffer(&self, vao: GlName, buffer: GlName) {
        unsafe { gl::VertexArrayElementBuffer(vao, buffer) };
    }

    fn delete_vertex_array(&self, vao: GlName) {
        unsafe { gl::DeleteVertexArrays(1, &vao) };
    }

    // ===== FRAMEBUFFERS =====

    fn create_renderbuffer(&self) -> GlName {
        Self::create_name(gl::CreateRenderbuffers)
    }

    fn named_renderbuffer_storage_multisample(
        &self,
        renderbuffer: GlName,
        samples: u32,
        internal_format: GlEnum,
        width: u32,
        height: u32,
    ) {
        unsafe {
            gl::NamedRenderbufferStorageMultisample(
                renderbuffer,
                samples as i32,
                internal_format,
                width as i32,
                height as i32,
            )
        };
    }

    fn delete_renderbuffer(&self, renderbuffer: GlName) {
        unsafe { gl::DeleteRenderbuffers(1, &renderbuffer) };
    }

    fn create_framebuffer(&self) -> GlName {
        Self::create_name(gl::CreateFramebuffers)
    }

    fn named_framebuffer_renderbuffer(&self, framebuffer: GlName, attachment: GlEnum, renderbuffer: GlName) {
        unsafe { gl::NamedFramebufferRenderbuffer(framebuffer, attachment, gl::RENDERBUFFER, renderbuffer) };
    }

    fn check_named_framebuffer_status(&self, framebuffer: GlName) -> GlEnum {
        unsafe { gl::CheckNamedFramebufferStatus(framebuffer, gl::FRAMEBUFFER) }
    }

    fn blit_named_framebuffer(&self, read: GlName, draw: GlName, width: u32, height: u32, mask: u32, filter: GlEnum) {
        let (w, h) = (width as i32, height as i32);
        unsafe { gl::BlitNamedFramebuffer(read, draw, 0, 0, w, h, 0, 0, w, h, mask, filter) };
    }

    fn delete_framebuffer(&self, framebuffer: GlName) {
        unsafe { gl::DeleteFramebuffers(1, &framebuffer) };
    }

    // ===== FIXED-FUNCTION STATE =====

    fn enable(&self, capability: GlEnum) {
        unsafe { gl::Enable(capability) };
    }

    fn disable(&self, capability: GlEnum) {
        unsafe { gl::Disable(capability) };
    }

    fn polygon_mode(&self, face: GlEnum, mode: GlEnum) {
        unsafe { gl::PolygonMode(face, mode) };
    }

    fn cull_face(&self, face: GlEnum) {
        unsafe { gl::CullFace(face) };
    }

    fn depth_func(&self, func: GlEnum) {
        unsafe { gl::DepthFunc(func) };
    }

    fn depth_mask(&self, write: bool) {
        unsafe { gl::DepthMask(gl_bool(write)) };
    }

    fn viewport(&self, width: u32, height: u32) {
        unsafe { gl::Viewport(0, 0, width as i32, height as i32) };
    }

    fn bind_framebuffer(&self, target: GlEnum, framebuffer: GlName) {
        unsafe { gl::BindFramebuffer(target, framebuffer) };
    }

    fn clear_color(&self, color: [f32; 4]) {
        unsafe { gl::ClearColor(color[0], color[1], color[2], color[3]) };
    }

    fn clear_depth(&self, depth: f32) {
        unsafe { gl::ClearDepthf(depth) };
    }

    fn clear(&self, mask: u32) {
        unsafe { gl::Clear(mask) };
    }

    // ===== BINDING AND DRAWING =====

    fn use_program(&self, program: GlName) {
        unsafe { gl::UseProgram(program) };
    }

    fn bind_vertex_array(&self, vao: GlName) {
        unsafe { gl::BindVertexArray(vao) };
    }

    fn bind_buffer_base(&self, target: GlEnum, index: u32, buffer: GlName) {
        unsafe { gl::BindBufferBase(target, index, buffer) };
    }

    fn active_texture(&self, unit: GlEnum) {
        unsafe { gl::ActiveTexture(unit) };
    }

    fn bind_texture(&self, target: GlEnum, texture: GlName) {
        unsafe { gl::BindTexture(target, texture) };
    }

    fn bind_sampler(&self, unit: u32, sampler: GlName) {
        unsafe { gl::BindSampler(unit, sampler) };
    }

    fn draw_arrays_instanced(&self, mode: GlEnum, first: u32, count: u32, instances: u32) {
        unsafe { gl::DrawArraysInstanced(mode, first as i32, count as i32, instances as i32) };
    }

    fn draw_elements_instanced(&self, mode: GlEnum, count: u32, ty: GlEnum, instances: u32) {
        unsafe { gl::DrawElementsInstanced(mode, count as i32, ty, ptr::null(), instances as i32) };
    }

    // ===== SURFACE =====

    fn swap_interval(&self, interval: u32) {
        let interval = match NonZeroU32::new(interval) {
            Some(frames) => SwapInterval::Wait(frames),
            None => SwapInterval::DontWait,
        };
        if let Err(e) = self.surface.set_swap_interval(&self.context, interval) {
            tetra_render::render_warn!(SOURCE, "Swap interval not applied: {}", e);
        }
    }

    fn resize_surface(&self, width: u32, height: u32) {
        self.surface.resize(&self.context, non_zero(width), non_zero(height));
    }

    fn swap_buffers(&self) {
        if let Err(e) = self.surface.swap_buffers(&self.context) {
            tetra_render::render_error!(SOURCE, "Swap failed: {}", e);
            self.raise(crate::gl_convert::GL_CONTEXT_LOST);
        }
    }

    fn finish(&self) {
        unsafe { gl::Finish() };
    }
}
