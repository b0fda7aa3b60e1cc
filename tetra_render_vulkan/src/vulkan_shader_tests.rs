//! Unit tests for SPIR-V validation (no GPU)

use super::*;

fn module_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Header-only module: magic, version 1.0, generator, bound, schema
fn minimal_module() -> Vec<u8> {
    module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0])
}

#[test]
fn test_spirv_words_accepts_valid_header() {
    let words = spirv_words("test", "vertex", &minimal_module()).unwrap();
    assert_eq!(words.len(), 5);
    assert_eq!(words[0], SPIRV_MAGIC);
    assert_eq!(words[1], 0x0001_0000);
}

#[test]
fn test_spirv_words_rejects_unaligned_size() {
    let mut bytes = minimal_module();
    bytes.push(0);
    assert!(matches!(spirv_words("test", "vertex", &bytes), Err(Error::InvalidResource(_))));
}

#[test]
fn test_spirv_words_rejects_bad_magic() {
    let bytes = module_bytes(&[0xDEAD_BEEF, 0x0001_0000, 0, 1, 0]);
    match spirv_words("test", "fragment", &bytes) {
        Err(Error::InvalidResource(message)) => assert!(message.contains("fragment")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_spirv_words_rejects_truncated_header() {
    let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000]);
    assert!(spirv_words("test", "vertex", &bytes).is_err());
}

#[test]
fn test_spirv_words_rejects_text_source() {
    let glsl = b"#version 450\nvoid main() {}\n....".to_vec();
    assert!(spirv_words("test", "vertex", &glsl).is_err());
}
