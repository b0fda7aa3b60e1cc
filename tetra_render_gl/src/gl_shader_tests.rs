use super::*;
use tetra_render::Error;
use crate::null_gl::{NullGl, ObjectKind};

const VERTEX: &str = "#version 450\nlayout(location = 0) in vec3 position;\nvoid main() { gl_Position = vec4(position, 1.0); }";
const FRAGMENT: &str = "#version 450\nout vec4 color;\nvoid main() { color = vec4(1.0); }";

fn context() -> (Arc<NullGl>, Arc<GpuContext>) {
    let gl = Arc::new(NullGl::new());
    let ctx = GpuContext::new(gl.clone());
    (gl, ctx)
}

fn desc(vertex: &str, fragment: &str) -> ShaderDesc {
    ShaderDesc {
        label: "basic".to_string(),
        vertex: ShaderStageDesc::new(vertex.as_bytes().to_vec()),
        fragment: ShaderStageDesc::new(fragment.as_bytes().to_vec()),
        layout: VertexLayout::Standard,
    }
}

// ============================================================================
// SOURCE CHECKS
// ============================================================================

#[test]
fn test_binary_bytecode_is_rejected() {
    let (gl, ctx) = context();
    let mut shader = desc(VERTEX, FRAGMENT);
    shader.vertex.bytecode = vec![0x03, 0x02, 0x23, 0x07, 0xFF, 0xFE];

    assert!(matches!(GlShader::create(&ctx, &shader), Err(Error::InvalidResource(_))));
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn test_missing_version_is_rejected_before_compiling() {
    let (gl, ctx) = context();
    let result = GlShader::create(&ctx, &desc(VERTEX, "void main() {}"));

    assert!(matches!(result, Err(Error::InvalidResource(_))));
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn test_entry_point_must_be_main() {
    let (_gl, ctx) = context();
    let mut shader = desc(VERTEX, FRAGMENT);
    shader.fragment.entry_point = "ps_main".to_string();

    assert!(matches!(GlShader::create(&ctx, &shader), Err(Error::InvalidResource(_))));
}

// ============================================================================
// COMPILE AND LINK
// ============================================================================

#[test]
fn test_stage_objects_deleted_after_link() {
    let (gl, ctx) = context();
    let shader = GlShader::create(&ctx, &desc(VERTEX, FRAGMENT)).unwrap();

    assert!(gl.program_link_status(shader.program));
    assert_eq!(gl.live_objects_of(ObjectKind::Shader), 0);
    assert_eq!(gl.live_objects_of(ObjectKind::Program), 1);
    assert_eq!(shader.layout(), VertexLayout::Standard);
}

#[test]
fn test_compile_failure_reports_the_log() {
    let (gl, ctx) = context();
    let result = GlShader::create(&ctx, &desc(VERTEX, "#version 450\nvoid mian() {}"));

    match result {
        Err(Error::BackendError(message)) => {
            assert!(message.contains("fragment"));
            assert!(message.contains("main"));
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
    assert_eq!(gl.live_objects(), 0);
}

#[test]
fn test_cleanup_deletes_program() {
    let (gl, ctx) = context();
    let shader = GlShader::create(&ctx, &desc(VERTEX, FRAGMENT)).unwrap();
    shader.cleanup();

    assert!(!shader.is_alive());
    assert_eq!(gl.live_objects(), 0);
    assert!(gl.violations().is_empty());
}
