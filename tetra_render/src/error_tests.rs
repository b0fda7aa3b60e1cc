//! Unit tests for error.rs

use crate::error::{Error, Result};

// ============================================================================
// DISPLAY TESTS
// ============================================================================

#[test]
fn test_error_display_backend() {
    let err = Error::BackendError("vkQueueSubmit failed".to_string());
    assert_eq!(format!("{}", err), "Backend error: vkQueueSubmit failed");
}

#[test]
fn test_error_display_out_of_memory() {
    assert_eq!(format!("{}", Error::OutOfMemory), "Out of GPU memory");
}

#[test]
fn test_error_display_invalid_resource() {
    let err = Error::InvalidResource("buffer expired".to_string());
    assert_eq!(format!("{}", err), "Invalid resource: buffer expired");
}

#[test]
fn test_error_display_initialization_failed() {
    let err = Error::InitializationFailed("no GPU".to_string());
    assert_eq!(format!("{}", err), "Initialization failed: no GPU");
}

#[test]
fn test_error_display_transient_variants() {
    assert_eq!(format!("{}", Error::SwapchainOutOfDate), "Swapchain out of date");
    assert_eq!(format!("{}", Error::DeviceLost), "Device lost");
    assert_eq!(
        format!("{}", Error::InvalidState("not initialized".to_string())),
        "Invalid state: not initialized"
    );
}

// ============================================================================
// CLASSIFICATION TESTS
// ============================================================================

#[test]
fn test_error_fatal_classification() {
    assert!(Error::InitializationFailed("x".to_string()).is_fatal());
    assert!(Error::DeviceLost.is_fatal());
    assert!(!Error::SwapchainOutOfDate.is_fatal());
    assert!(!Error::InvalidResource("x".to_string()).is_fatal());
    assert!(!Error::BackendError("x".to_string()).is_fatal());
    assert!(!Error::OutOfMemory.is_fatal());
}

#[test]
fn test_error_is_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(Error::OutOfMemory);
    assert_eq!(err.to_string(), "Out of GPU memory");
}

#[test]
fn test_result_alias_propagates() {
    fn inner() -> Result<u32> {
        Err(Error::DeviceLost)
    }
    fn outer() -> Result<u32> {
        let value = inner()?;
        Ok(value + 1)
    }
    assert_eq!(outer(), Err(Error::DeviceLost));
}
