/// NullGl - headless OpenGL driver
///
/// Tracks object storage and the context's binding state so misuse shows up
/// the way a debug context reports it. Errors are raised as GL error flags
/// (`get_error`); contract breaks a real driver would silently tolerate are
/// collected in `violations()`:
/// - a draw needs a linked program, a vertex array with enabled attributes
///   and a buffer at binding 0; an indexed draw also needs an element buffer
/// - deleting an unknown name, or a name through the wrong delete call
/// - uploading to a texture without storage
///
/// Deleting a bound object unbinds it, as in GL.

use std::sync::{Mutex, MutexGuard, PoisonError};
use rustc_hash::FxHashMap;

use crate::api::{GlApi, GlEnum, GlName};
use crate::gl_convert::*;

const SOURCE: &str = "tetra::gl::null";

/// Binding points tracked per indexed table
const TRACKED_UNITS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Buffer,
    Texture,
    Sampler,
    Shader,
    Program,
    VertexArray,
    Renderbuffer,
    Framebuffer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullCounters {
    pub draws: u64,
    pub buffer_uploads: u64,
    pub texture_uploads: u64,
    pub programs_linked: u64,
    pub vertex_arrays_created: u64,
    /// polygon mode, cull and depth calls
    pub state_changes: u64,
    pub blits: u64,
    pub swaps: u64,
    pub finishes: u64,
}

struct TextureData {
    target: GlEnum,
    /// (internal format, width, height) once storage exists
    storage: Option<(GlEnum, u32, u32)>,
}

struct ShaderData {
    stage: GlEnum,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Default)]
struct ProgramData {
    shaders: Vec<GlName>,
    linked: bool,
    log: String,
}

#[derive(Default)]
struct VertexArrayData {
    enabled: Vec<u32>,
    buffers: [GlName; 2],
    element_buffer: GlName,
}

#[derive(Debug, Clone, Copy)]
struct RenderbufferData {
    samples: u32,
    width: u32,
    height: u32,
}

/// Context state draws read
struct Bindings {
    program: GlName,
    vertex_array: GlName,
    uniform_buffers: [GlName; TRACKED_UNITS],
    active_unit: usize,
    textures: [(GlEnum, GlName); TRACKED_UNITS],
    samplers: [GlName; TRACKED_UNITS],
    framebuffer: GlName,
    polygon_mode: GlEnum,
    cull_enabled: bool,
    cull_face: GlEnum,
    depth_test: bool,
    depth_write: bool,
    depth_func: GlEnum,
    multisample: bool,
    viewport: (u32, u32),
}

impl Default for Bindings {
    /// GL's initial context state
    fn default() -> Self {
        Self {
            program: 0,
            vertex_array: 0,
            uniform_buffers: [0; TRACKED_UNITS],
            active_unit: 0,
            textures: [(GL_TEXTURE_2D, 0); TRACKED_UNITS],
            samplers: [0; TRACKED_UNITS],
            framebuffer: 0,
            polygon_mode: GL_FILL,
            cull_enabled: false,
            cull_face: GL_BACK,
            depth_test: false,
            depth_write: true,
            depth_func: GL_LESS,
            multisample: true,
            viewport: (0, 0),
        }
    }
}

struct NullState {
    max_samples: u32,
    next_name: GlName,
    objects: FxHashMap<GlName, ObjectKind>,
    buffers: FxHashMap<GlName, Vec<u8>>,
    textures: FxHashMap<GlName, TextureData>,
    shaders: FxHashMap<GlName, ShaderData>,
    programs: FxHashMap<GlName, ProgramData>,
    vertex_arrays: FxHashMap<GlName, VertexArrayData>,
    renderbuffers: FxHashMap<GlName, Option<RenderbufferData>>,
    framebuffers: FxHashMap<GlName, Vec<(GlEnum, GlName)>>,
    bound: Bindings,
    swap_interval: u32,
    surface_size: Option<(u32, u32)>,
    error: Option<GlEnum>,
    context_lost: bool,
    fail_next_allocation: bool,
    violations: Vec<String>,
    counters: NullCounters,
}

impl NullState {
    fn alloc(&mut self, kind: ObjectKind) -> GlName {
        self.next_name += 1;
        self.objects.insert(self.next_name, kind);
        self.next_name
    }

    /// GL keeps the first flag until it is read
    fn raise(&mut self, code: GlEnum) {
        if self.error.is_none() {
            self.error = Some(code);
        }
    }

    fn violation(&mut self, message: String) {
        tetra_render::render_warn!(SOURCE, "{}", message);
        self.violations.push(message);
    }

    fn is(&self, name: GlName, kind: ObjectKind) -> bool {
        self.objects.get(&name) == Some(&kind)
    }

    /// Check name kind for a call; raises INVALID_OPERATION on mismatch
    fn expect(&mut self, name: GlName, kind: ObjectKind) -> bool {
        if self.is(name, kind) {
            true
        } else {
            self.raise(GL_INVALID_OPERATION);
            false
        }
    }

    /// Take the pending allocation failure, raising OUT_OF_MEMORY
    fn allocation_fails(&mut self) -> bool {
        if std::mem::take(&mut self.fail_next_allocation) {
            self.raise(GL_OUT_OF_MEMORY);
            return true;
        }
        false
    }

    fn delete(&mut self, name: GlName, kind: ObjectKind) {
        if name == 0 {
            return;
        }
        if !self.is(name, kind) {
            self.violation(format!("delete of unknown {:?} {}", kind, name));
            return;
        }
        self.objects.remove(&name);
        let bound = &mut self.bound;
        match kind {
            ObjectKind::Buffer => {
                self.buffers.remove(&name);
                for slot in bound.uniform_buffers.iter_mut().filter(|b| **b == name) {
                    *slot = 0;
                }
                for vao in self.vertex_arrays.values_mut() {
                    for buffer in vao.buffers.iter_mut().filter(|b| **b == name) {
                        *buffer = 0;
                    }
                    if vao.element_buffer == name {
                        vao.element_buffer = 0;
                    }
                }
            }
            ObjectKind::Texture => {
                self.textures.remove(&name);
                for unit in bound.textures.iter_mut().filter(|(_, t)| *t == name) {
                    unit.1 = 0;
                }
            }
            ObjectKind::Sampler => {
                for sampler in bound.samplers.iter_mut().filter(|s| **s == name) {
                    *sampler = 0;
                }
            }
            ObjectKind::Shader => {
                self.shaders.remove(&name);
            }
            ObjectKind::Program => {
                self.programs.remove(&name);
                if bound.program == name {
                    bound.program = 0;
                }
            }
            ObjectKind::VertexArray => {
                self.vertex_arrays.remove(&name);
                if bound.vertex_array == name {
                    bound.vertex_array = 0;
                }
            }
            ObjectKind::Renderbuffer => {
                self.renderbuffers.remove(&name);
            }
            ObjectKind::Framebuffer => {
                self.framebuffers.remove(&name);
                if bound.framebuffer == name {
                    bound.framebuffer = 0;
                }
            }
        }
    }

    fn check_draw(&mut self, indexed: bool) {
        self.counters.draws += 1;
        let mut problems = Vec::new();
        match self.programs.get(&self.bound.program) {
            Some(program) if program.linked => {}
            _ => problems.push("draw without a linked program".to_string()),
        }
        match self.vertex_arrays.get(&self.bound.vertex_array) {
            Some(vao) => {
                if vao.enabled.is_empty() {
                    problems.push("draw with no enabled vertex attributes".to_string());
                }
                if vao.buffers[0] == 0 {
                    problems.push("draw without a buffer at vertex binding 0".to_string());
                }
                if indexed && vao.element_buffer == 0 {
                    problems.push("indexed draw without an element buffer".to_string());
                }
            }
            None => problems.push("draw without a vertex array".to_string()),
        }
        if self.bound.framebuffer != 0 && !self.framebuffers.contains_key(&self.bound.framebuffer) {
            problems.push(format!("draw into deleted framebuffer {}", self.bound.framebuffer));
        }
        for problem in problems {
            self.violation(problem);
        }
    }
}

pub struct NullGl {
    state: Mutex<NullState>,
}

impl NullGl {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NullState {
                max_samples: 8,
                next_name: 0,
                objects: FxHashMap::default(),
                buffers: FxHashMap::default(),
                textures: FxHashMap::default(),
                shaders: FxHashMap::default(),
                programs: FxHashMap::default(),
                vertex_arrays: FxHashMap::default(),
                renderbuffers: FxHashMap::default(),
                framebuffers: FxHashMap::default(),
                bound: Bindings::default(),
                swap_interval: 1,
                surface_size: None,
                error: None,
                context_lost: false,
                fail_next_allocation: false,
                violations: Vec::new(),
                counters: NullCounters::default(),
            }),
        }
    }

    pub fn with_max_samples(self, samples: u32) -> Self {
        self.lock().max_samples = samples.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, NullState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== INSPECTION =====

    pub fn live_objects(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn live_objects_of(&self, kind: ObjectKind) -> usize {
        self.lock().objects.values().filter(|&&k| k == kind).count()
    }

    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    pub fn counters(&self) -> NullCounters {
        self.lock().counters
    }

    pub fn buffer_contents(&self, buffer: GlName) -> Option<Vec<u8>> {
        self.lock().buffers.get(&buffer).cloned()
    }

    pub fn polygon_mode(&self) -> GlEnum {
        self.lock().bound.polygon_mode
    }

    /// Culled face, None while `GL_CULL_FACE` is disabled
    pub fn culled_face(&self) -> Option<GlEnum> {
        let state = self.lock();
        state.bound.cull_enabled.then_some(state.bound.cull_face)
    }

    /// (test enabled, write enabled, compare func)
    pub fn depth_state(&self) -> (bool, bool, GlEnum) {
        let bound = &self.lock().bound;
        (bound.depth_test, bound.depth_write, bound.depth_func)
    }

    pub fn multisample_enabled(&self) -> bool {
        self.lock().bound.multisample
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.lock().bound.viewport
    }

    pub fn current_program(&self) -> GlName {
        self.lock().bound.program
    }

    pub fn bound_vertex_array(&self) -> GlName {
        self.lock().bound.vertex_array
    }

    pub fn bound_framebuffer(&self) -> GlName {
        self.lock().bound.framebuffer
    }

    pub fn uniform_buffer(&self, index: u32) -> GlName {
        self.lock().bound.uniform_buffers.get(index as usize).copied().unwrap_or(0)
    }

    /// (target, texture) bound on a texture unit
    pub fn texture_unit(&self, unit: u32) -> (GlEnum, GlName) {
        self.lock().bound.textures.get(unit as usize).copied().unwrap_or((GL_TEXTURE_2D, 0))
    }

    pub fn sampler_unit(&self, unit: u32) -> GlName {
        self.lock().bound.samplers.get(unit as usize).copied().unwrap_or(0)
    }

    /// Buffers attached to a vertex array's bindings 0 and 1
    pub fn vertex_array_buffers(&self, vao: GlName) -> Option<[GlName; 2]> {
        self.lock().vertex_arrays.get(&vao).map(|v| v.buffers)
    }

    /// (samples, width, height) of a renderbuffer with storage
    pub fn renderbuffer_storage(&self, renderbuffer: GlName) -> Option<(u32, u32, u32)> {
        self.lock()
            .renderbuffers
            .get(&renderbuffer)
            .copied()
            .flatten()
            .map(|r| (r.samples, r.width, r.height))
    }

    pub fn swap_interval_value(&self) -> u32 {
        self.lock().swap_interval
    }

    /// Last size passed to `resize_surface`
    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.lock().surface_size
    }

    // ===== FAULT INJECTION =====

    /// Every later `get_error` reports `GL_CONTEXT_LOST`
    pub fn lose_context(&self) {
        self.lock().context_lost = true;
    }

    /// The next buffer, texture or renderbuffer storage call raises `GL_OUT_OF_MEMORY`
    pub fn fail_next_allocation(&self) {
        self.lock().fail_next_allocation = true;
    }
}

impl Default for NullGl {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes per pixel of an upload (format, type) pair
fn upload_pixel_size(format: GlEnum, ty: GlEnum) -> Option<usize> {
    match (format, ty) {
        (GL_RGBA | GL_BGRA, GL_UNSIGNED_BYTE) => Some(4),
        (GL_RED, GL_UNSIGNED_BYTE) => Some(1),
        (GL_DEPTH_COMPONENT, GL_FLOAT) => Some(4),
        _ => None,
    }
}

impl GlApi for NullGl {
    fn renderer_name(&self) -> String {
        "Null GL".to_string()
    }

    fn max_samples(&self) -> u32 {
        self.lock().max_samples
    }

    fn get_error(&self) -> GlEnum {
        let mut state = self.lock();
        if state.context_lost {
            return GL_CONTEXT_LOST;
        }
        state.error.take().unwrap_or(GL_NO_ERROR)
    }

    // ===== BUFFERS =====

    fn create_buffer(&self) -> GlName {
        let mut state = self.lock();
        let name = state.alloc(ObjectKind::Buffer);
        state.buffers.insert(name, Vec::new());
        name
    }

    fn named_buffer_data(&self, buffer: GlName, size: usize, data: Option<&[u8]>, _usage: GlEnum) {
        let mut state = self.lock();
        if !state.expect(buffer, ObjectKind::Buffer) || state.allocation_fails() {
            return;
        }
        if data.is_some_and(|d| d.len() != size) {
            state.raise(GL_INVALID_VALUE);
            return;
        }
        let bytes = data.map_or_else(|| vec![0; size], <[u8]>::to_vec);
        state.buffers.insert(buffer, bytes);
        state.counters.buffer_uploads += 1;
    }

    fn named_buffer_sub_data(&self, buffer: GlName, offset: usize, data: &[u8]) {
        let mut state = self.lock();
        if !state.expect(buffer, ObjectKind::Buffer) {
            return;
        }
        let Some(store) = state.buffers.get_mut(&buffer) else {
            return;
        };
        let Some(end) = offset.checked_add(data.len()).filter(|&end| end <= store.len()) else {
            state.raise(GL_INVALID_VALUE);
            return;
        };
        store[offset..end].copy_from_slice(data);
        state.counters.buffer_uploads += 1;
    }

    fn delete_buffer(&self, buffer: GlName) {
        self.lock().delete(buffer, ObjectKind::Buffer);
    }

    // ===== TEXTURES AND SAMPLERS =====

    fn create_texture(&self, target: GlEnum) -> GlName {
        let mut state = self.lock();
        let name = state.alloc(ObjectKind::Texture);
        state.textures.insert(name, TextureData { target, storage: None });
        name
    }

    fn texture_storage_2d(&self, texture: GlName, internal_format: GlEnum, width: u32, height: u32) {
        let mut state = self.lock();
        if !state.expect(texture, ObjectKind::Texture) || state.allocation_fails() {
            return;
        }
        let Some(data) = state.textures.get_mut(&texture) else {
            return;
        };
        let square = data.target != GL_TEXTURE_CUBE_MAP || width == height;
        if data.storage.is_some() || width == 0 || height == 0 || !square {
            state.raise(GL_INVALID_OPERATION);
            return;
        }
        data.storage = Some((internal_format, width, height));
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
        let mut state = self.lock();
        if !state.expect(texture, ObjectKind::Texture) {
            return;
        }
        let Some(data) = state.textures.get(&texture) else {
            return;
        };
        let Some((_, storage_width, storage_height)) = data.storage else {
            state.violation(format!("upload to texture {} without storage", texture));
            state.raise(GL_INVALID_OPERATION);
            return;
        };
        let layers = if data.target == GL_TEXTURE_CUBE_MAP { 6 } else { 1 };
        let expected = upload_pixel_size(format, ty).map(|bpp| bpp * width as usize * height as usize);
        let valid = layer < layers
            && (width, height) == (storage_width, storage_height)
            && expected == Some(pixels.len());
        if !valid {
            state.raise(GL_INVALID_VALUE);
            return;
        }
        state.counters.texture_uploads += 1;
    }

    fn delete_texture(&self, texture: GlName) {
        self.lock().delete(texture, ObjectKind::Texture);
    }

    fn create_sampler(&self) -> GlName {
        self.lock().alloc(ObjectKind::Sampler)
    }

    fn sampler_parameter(&self, sampler: GlName, _pname: GlEnum, _value: GlEnum) {
        self.lock().expect(sampler, ObjectKind::Sampler);
    }

    fn delete_sampler(&self, sampler: GlName) {
        self.lock().delete(sampler, ObjectKind::Sampler);
    }

    // ===== PROGRAMS =====

    fn create_shader(&self, stage: GlEnum) -> GlName {
        let mut state = self.lock();
        if stage != GL_VERTEX_SHADER && stage != GL_FRAGMENT_SHADER {
            state.raise(GL_INVALID_ENUM);
            return 0;
        }
        let name = state.alloc(ObjectKind::Shader);
        state.shaders.insert(
            name,
            ShaderData { stage, source: String::new(), compiled: false, log: String::new() },
        );
        name
    }

    fn shader_source(&self, shader: GlName, source: &str) {
        let mut state = self.lock();
        if let Some(data) = state.shaders.get_mut(&shader) {
            data.source = source.to_string();
        } else {
            state.raise(GL_INVALID_VALUE);
        }
    }

    /// Accepts any source that declares a version and defines `main`
    fn compile_shader(&self, shader: GlName) {
        let mut state = self.lock();
        let Some(data) = state.shaders.get_mut(&shader) else {
            state.raise(GL_INVALID_VALUE);
            return;
        };
        let source = data.source.trim_start();
        if !source.starts_with("#version") {
            data.compiled = false;
            data.log = "0:1(1): error: missing #version directive".to_string();
        } else if !source.contains("void main") {
            data.compiled = false;
            data.log = "0:0(0): error: function `main' is undefined".to_string();
        } else {
            data.compiled = true;
            data.log.clear();
        }
    }

    fn shader_compile_status(&self, shader: GlName) -> bool {
        self.lock().shaders.get(&shader).is_some_and(|s| s.compiled)
    }

    fn shader_info_log(&self, shader: GlName) -> String {
        self.lock().shaders.get(&shader).map(|s| s.log.clone()).unwrap_or_default()
    }

    fn delete_shader(&self, shader: GlName) {
        self.lock().delete(shader, ObjectKind::Shader);
    }

    fn create_program(&self) -> GlName {
        let mut state = self.lock();
        let name = state.alloc(ObjectKind::Program);
        state.programs.insert(name, ProgramData::default());
        name
    }

    fn attach_shader(&self, program: GlName, shader: GlName) {
        let mut state = self.lock();
        if !state.is(shader, ObjectKind::Shader) {
            state.raise(GL_INVALID_VALUE);
            return;
        }
        match state.programs.get_mut(&program) {
            Some(data) if !data.shaders.contains(&shader) => data.shaders.push(shader),
            _ => state.raise(GL_INVALID_OPERATION),
        }
    }

    fn link_program(&self, program: GlName) {
        let mut state = self.lock();
        let Some(data) = state.programs.get(&program) else {
            state.raise(GL_INVALID_VALUE);
            return;
        };
        let compiled_stage = |stage: GlEnum| {
            data.shaders
                .iter()
                .filter_map(|s| state.shaders.get(s))
                .any(|s| s.stage == stage && s.compiled)
        };
        let linked = compiled_stage(GL_VERTEX_SHADER) && compiled_stage(GL_FRAGMENT_SHADER);
        let log = if linked {
            String::new()
        } else {
            "error: program needs a compiled vertex and fragment shader".to_string()
        };
        if let Some(data) = state.programs.get_mut(&program) {
            data.linked = linked;
            data.log = log;
        }
        if linked {
            state.counters.programs_linked += 1;
        }
    }

    fn program_link_status(&self, program: GlName) -> bool {
        self.lock().programs.get(&program).is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: GlName) -> String {
        self.lock().programs.get(&program).map(|p| p.log.clone()).unwrap_or_default()
    }

    fn delete_program(&self, program: GlName) {
        self.lock().delete(program, ObjectKind::Program);
    }

    // ===== VERTEX ARRAYS =====

    fn create_vertex_array(&self) -> GlName {
        let mut state = self.lock();
        let name = state.alloc(ObjectKind::VertexArray);
        state.vertex_arrays.insert(name, VertexArrayData::default());
        state.counters.vertex_arrays_created += 1;
        name
    }

    fn vertex_array_attrib_format(&self, vao: GlName, _index: u32, size: u32, _ty: GlEnum, _integer: bool, _offset: u32) {
        let mut state = self.lock();
        if !state.expect(vao, ObjectKind::VertexArray) {
            return;
        }
        if !(1..=4).contains(&size) {
            state.raise(GL_INVALID_VALUE);
        }
    }

    fn vertex_array_attrib_binding(&self, vao: GlName, _index: u32, binding: u32) {
        let mut state = self.lock();
        if state.expect(vao, ObjectKind::VertexArray) && binding >= 2 {
            state.raise(GL_INVALID_VALUE);
        }
    }

    fn enable_vertex_array_attrib(&self, vao: GlName, index: u32) {
        let mut state = self.lock();
        match state.vertex_arrays.get_mut(&vao) {
            Some(data) => {
                if !data.enabled.contains(&index) {
                    data.enabled.push(index);
                }
            }
            None => state.raise(GL_INVALID_OPERATION),
        }
    }

    fn vertex_array_vertex_buffer(&self, vao: GlName, binding: u32, buffer: GlName, _stride: u32) {
        let mut state = self.lock();
        if buffer != 0 && !state.is(buffer, ObjectKind::Buffer) {
            state.raise(GL_INVALID_OPERATION);
            return;
        }
        match state.vertex_arrays.get_mut(&vao).and_then(|v| v.buffers.get_mut(binding as usize)) {
            Some(slot) => *slot = buffer,
            None => state.raise(GL_INVALID_VALUE),
        }
    }

    fn vertex_array_element_buffer(&self, vao: GlName, buffer: GlName) {
        let mut state = self.lock();
        if buffer != 0 && !state.is(buffer, ObjectKind::Buffer) {
            state.raise(GL_INVALID_OPERATION);
            return;
        }
        match state.vertex_arrays.get_mut(&vao) {
            Some(data) => data.element_buffer = buffer,
            None => state.raise(GL_INVALID_OPERATION),
        }
    }

    fn delete_vertex_array(&self, vao: GlName) {
        self.lock().delete(vao, ObjectKind::VertexArray);
    }

    // ===== FRAMEBUFFERS =====

    fn create_renderbuffer(&self) -> GlName {
        let mut state = self.lock();
        let name = state.alloc(ObjectKind::Renderbuffer);
        state.renderbuffers.insert(name, None);
        name
    }

    fn named_renderbuffer_storage_multisample(
        &self,
        renderbuffer: GlName,
        samples: u32,
        _internal_format: GlEnum,
        width: u32,
        height: u32,
    ) {
        let mut state = self.lock();
        if !state.expect(renderbuffer, ObjectKind::Renderbuffer) || state.allocation_fails() {
            return;
        }
        if samples > state.max_samples || width == 0 || height == 0 {
            state.raise(GL_INVALID_VALUE);
            return;
        }
        state.renderbuffers.insert(renderbuffer, Some(RenderbufferData { samples, width, height }));
    }

    fn delete_renderbuffer(&self, renderbuffer: GlName) {
        self.lock().delete(renderbuffer, ObjectKind::Renderbuffer);
    }

    fn create_framebuffer(&self) -> GlName {
        let mut state = self.lock();
        let name = state.alloc(ObjectKind::Framebuffer);
        state.framebuffers.insert(name, Vec::new());
        name
    }

    fn named_framebuffer_renderbuffer(&self, framebuffer: GlName, attachment: GlEnum, renderbuffer: GlName) {
        let mut state = self.lock();
        if !state.is(renderbuffer, ObjectKind::Renderbuffer) {
            state.raise(GL_INVALID_OPERATION);
            return;
        }
        match state.framebuffers.get_mut(&framebuffer) {
            Some(attachments) => {
                attachments.retain(|(a, _)| *a != attachment);
                attachments.push((attachment, renderbuffer));
            }
            None => state.raise(GL_INVALID_OPERATION),
        }
    }

    fn check_named_framebuffer_status(&self, framebuffer: GlName) -> GlEnum {
        let state = self.lock();
        if framebuffer == 0 {
            return GL_FRAMEBUFFER_COMPLETE;
        }
        let Some(attachments) = state.framebuffers.get(&framebuffer) else {
            return 0;
        };
        let storages: Vec<Option<RenderbufferData>> = attachments
            .iter()
            .map(|(_, rb)| state.renderbuffers.get(rb).copied().flatten())
            .collect();
        if storages.is_empty() || storages.iter().any(Option::is_none) {
            return 0;
        }
        let first = storages.iter().flatten().next().copied();
        let mismatched = storages
            .iter()
            .flatten()
            .any(|s| Some(s.samples) != first.map(|f| f.samples));
        if mismatched {
            GL_FRAMEBUFFER_INCOMPLETE_MULTISAMPLE
        } else {
            GL_FRAMEBUFFER_COMPLETE
        }
    }

    fn blit_named_framebuffer(&self, read: GlName, draw: GlName, _width: u32, _height: u32, _mask: u32, _filter: GlEnum) {
        let mut state = self.lock();
        let exists = |fb: GlName| fb == 0 || state.framebuffers.contains_key(&fb);
        if !exists(read) || !exists(draw) || read == draw {
            state.raise(GL_INVALID_OPERATION);
            return;
        }
        state.counters.blits += 1;
    }

    fn delete_framebuffer(&self, framebuffer: GlName) {
        self.lock().delete(framebuffer, ObjectKind::Framebuffer);
    }

    // ===== FIXED-FUNCTION STATE =====

    fn enable(&self, capability: GlEnum) {
        self.set_capability(capability, true);
    }

    fn disable(&self, capability: GlEnum) {
        self.set_capability(capability, false);
    }

    fn polygon_mode(&self, face: GlEnum, mode: GlEnum) {
        let mut state = self.lock();
        // Core profile only accepts FRONT_AND_BACK
        if face != GL_FRONT_AND_BACK {
            state.raise(GL_INVALID_ENUM);
            return;
        }
        state.bound.polygon_mode = mode;
        state.counters.state_changes += 1;
    }

    fn cull_face(&self, face: GlEnum) {
        let mut state = self.lock();
        state.bound.cull_face = face;
        state.counters.state_changes += 1;
    }

    fn depth_func(&self, func: GlEnum) {
        let mut state = self.lock();
        state.bound.depth_func = func;
        state.counters.state_changes += 1;
    }

    fn depth_mask(&self, write: bool) {
        let mut state = self.lock();
        state.bound.depth_write = write;
        state.counters.state_changes += 1;
    }

    fn viewport(&self, width: u32, height: u32) {
        self.lock().bound.viewport = (width, height);
    }

    fn bind_framebuffer(&self, _target: GlEnum, framebuffer: GlName) {
        let mut state = self.lock();
        if framebuffer != 0 && !state.is(framebuffer, ObjectKind::Framebuffer) {
            state.raise(GL_INVALID_OPERATION);
            return;
        }
        state.bound.framebuffer = framebuffer;
    }

    fn clear_color(&self, _color: [f32; 4]) {}

    fn clear_depth(&self, _depth: f32) {}

    fn clear(&self, mask: u32) {
        let mut state = self.lock();
        if mask & GL_DEPTH_BUFFER_BIT != 0 && !state.bound.depth_write {
            state.violation("depth clear with depth writes disabled clears nothing".to_string());
        }
    }

    // ===== BINDING AND DRAWING =====

    fn use_program(&self, program: GlName) {
        let mut state = self.lock();
        if program != 0 && !state.programs.get(&program).is_some_and(|p| p.linked) {
            state.raise(GL_INVALID_OPERATION);
            return;
        }
        state.bound.program = program;
    }

    fn bind_vertex_array(&self, vao: GlName) {
        let mut state = self.lock();
        if vao != 0 && !state.is(vao, ObjectKind::VertexArray) {
            state.raise(GL_INVALID_OPERATION);
            return;
        }
        state.bound.vertex_array = vao;
    }

    fn bind_buffer_base(&self, target: GlEnum, index: u32, buffer: GlName) {
        let mut state = self.lock();
        if target != GL_UNIFORM_BUFFER {
            state.raise(GL_INVALID_ENUM);
            return;
        }
        if buffer != 0 && !state.is(buffer, ObjectKind::Buffer) {
            state.raise(GL_INVALID_VALUE);
            return;
        }
        match state.bound.uniform_buffers.get_mut(index as usize) {
            Some(slot) => *slot = buffer,
            None => state.raise(GL_INVALID_VALUE),
        }
    }

    fn active_texture(&self, unit: GlEnum) {
        let mut state = self.lock();
        match unit.checked_sub(GL_TEXTURE0).map(|u| u as usize) {
            Some(index) if index < TRACKED_UNITS => state.bound.active_unit = index,
            _ => state.raise(GL_INVALID_ENUM),
        }
    }

    fn bind_texture(&self, target: GlEnum, texture: GlName) {
        let mut state = self.lock();
        if texture != 0 {
            match state.textures.get(&texture) {
                Some(data) if data.target == target => {}
                _ => {
                    state.raise(GL_INVALID_OPERATION);
                    return;
                }
            }
        }
        let unit = state.bound.active_unit;
        state.bound.textures[unit] = (target, texture);
    }

    fn bind_sampler(&self, unit: u32, sampler: GlName) {
        let mut state = self.lock();
        if sampler != 0 && !state.is(sampler, ObjectKind::Sampler) {
            state.raise(GL_INVALID_OPERATION);
            return;
        }
        match state.bound.samplers.get_mut(unit as usize) {
            Some(slot) => *slot = sampler,
            None => state.raise(GL_INVALID_VALUE),
        }
    }

    fn draw_arrays_instanced(&self, _mode: GlEnum, _first: u32, _count: u32, _instances: u32) {
        self.lock().check_draw(false);
    }

    fn draw_elements_instanced(&self, _mode: GlEnum, _count: u32, ty: GlEnum, _instances: u32) {
        let mut state = self.lock();
        if ty != GL_UNSIGNED_SHORT && ty != GL_UNSIGNED_INT {
            state.raise(GL_INVALID_ENUM);
            return;
        }
        state.check_draw(true);
    }

    // ===== SURFACE =====

    fn swap_interval(&self, interval: u32) {
        self.lock().swap_interval = interval;
    }

    fn resize_surface(&self, width: u32, height: u32) {
        self.lock().surface_size = Some((width, height));
    }

    fn swap_buffers(&self) {
        let mut state = self.lock();
        if !state.context_lost {
            state.counters.swaps += 1;
        }
    }

    fn finish(&self) {
        self.lock().counters.finishes += 1;
    }
}

impl NullGl {
    fn set_capability(&self, capability: GlEnum, enabled: bool) {
        let mut state = self.lock();
        let bound = &mut state.bound;
        match capability {
            GL_CULL_FACE => bound.cull_enabled = enabled,
            GL_DEPTH_TEST => bound.depth_test = enabled,
            GL_MULTISAMPLE => bound.multisample = enabled,
            _ => {
                state.raise(GL_INVALID_ENUM);
                return;
            }
        }
        state.counters.state_changes += 1;
    }
}

#[cfg(test)]
#[path = "null_gl_tests.rs"]
mod tests;
