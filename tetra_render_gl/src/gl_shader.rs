/// GlShader - linked GLSL program
///
/// Stage "bytecode" is GLSL 4.50 source text. Both stages compile, link into
/// one program, and the stage objects are deleted once linked. Compile and
/// link logs are forwarded to the render log on failure.

use std::any::Any;
use std::sync::Arc;
use tetra_render::{
    AliveFlag, GpuResource, Result, Shader, ShaderDesc, ShaderRef, ShaderStageDesc, VertexLayout,
};

use crate::api::{GlApi, GlEnum, GlName};
use crate::gl_context::GpuContext;
use crate::gl_convert::{GL_FRAGMENT_SHADER, GL_VERTEX_SHADER};

const SOURCE: &str = "tetra::gl::shader";

/// Source text of one stage
fn glsl_source<'a>(label: &str, stage: &str, desc: &'a ShaderStageDesc) -> Result<&'a str> {
    let text = std::str::from_utf8(&desc.bytecode).map_err(|_| {
        tetra_render::render_warn_err!(SOURCE, "Shader '{}' {} stage is not GLSL text", label, stage)
    })?;
    if !text.trim_start().starts_with("#version") {
        return Err(tetra_render::render_warn_err!(
            SOURCE,
            "Shader '{}' {} stage has no #version directive",
            label, stage
        ));
    }
    // GLSL always enters through main()
    if desc.entry_point != "main" {
        return Err(tetra_render::render_warn_err!(
            SOURCE,
            "Shader '{}' {} entry point must be 'main', got '{}'",
            label, stage, desc.entry_point
        ));
    }
    Ok(text)
}

fn compile_stage(api: &dyn GlApi, label: &str, stage: GlEnum, source: &str) -> Result<GlName> {
    let shader = api.create_shader(stage);
    api.shader_source(shader, source);
    api.compile_shader(shader);
    if api.shader_compile_status(shader) {
        return Ok(shader);
    }
    let log = api.shader_info_log(shader);
    api.delete_shader(shader);
    let stage_name = if stage == GL_VERTEX_SHADER { "vertex" } else { "fragment" };
    Err(tetra_render::render_err!(
        SOURCE,
        "Failed to compile {} stage of '{}': {}",
        stage_name, label, log.trim_end()
    ))
}

pub struct GlShader {
    label: String,
    layout: VertexLayout,
    pub(crate) program: GlName,
    ctx: Arc<GpuContext>,
    alive: AliveFlag,
}

impl GlShader {
    pub fn create(ctx: &Arc<GpuContext>, desc: &ShaderDesc) -> Result<Arc<Self>> {
        desc.validate()?;
        ctx.require_alive("create_shader")?;
        let vertex_source = glsl_source(&desc.label, "vertex", &desc.vertex)?;
        let fragment_source = glsl_source(&desc.label, "fragment", &desc.fragment)?;

        let api = ctx.api.as_ref();
        let vertex = compile_stage(api, &desc.label, GL_VERTEX_SHADER, vertex_source)?;
        let fragment = match compile_stage(api, &desc.label, GL_FRAGMENT_SHADER, fragment_source) {
            Ok(fragment) => fragment,
            Err(error) => {
                api.delete_shader(vertex);
                return Err(error);
            }
        };

        let program = api.create_program();
        api.attach_shader(program, vertex);
        api.attach_shader(program, fragment);
        api.link_program(program);
        api.delete_shader(vertex);
        api.delete_shader(fragment);
        if !api.program_link_status(program) {
            let log = api.program_info_log(program);
            api.delete_program(program);
            return Err(tetra_render::render_err!(SOURCE, "Failed to link '{}': {}", desc.label, log.trim_end()));
        }

        tetra_render::render_debug!(SOURCE, "Linked program '{}' ({:?} layout)", desc.label, desc.layout);
        Ok(Arc::new(Self {
            label: desc.label.clone(),
            layout: desc.layout,
            program,
            ctx: Arc::clone(ctx),
            alive: AliveFlag::new(),
        }))
    }

    /// Downcast a shared handle, rejecting expired or foreign shaders
    pub(crate) fn from_handle(handle: &ShaderRef) -> Result<&GlShader> {
        if !handle.is_alive() {
            return Err(tetra_render::render_warn_err!(SOURCE, "Shader '{}' has expired", handle.label()));
        }
        handle.as_any().downcast_ref::<GlShader>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Shader '{}' was not created by the OpenGL backend", handle.label())
        })
    }
}

impl GpuResource for GlShader {
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
        self.ctx.api.delete_program(self.program);
    }
}

impl Shader for GlShader {
    fn layout(&self) -> VertexLayout {
        self.layout
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for GlShader {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
#[path = "gl_shader_tests.rs"]
mod tests;
