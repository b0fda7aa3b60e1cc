//! Unit tests for lifecycle.rs

use crate::renderer::{Lifecycle, LifecycleState};
use crate::Error;

#[test]
fn test_full_lifecycle() {
    let mut lifecycle = Lifecycle::new();
    assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
    lifecycle.initialized().unwrap();
    for _ in 0..3 {
        lifecycle.begin().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Rendering);
        lifecycle.end().unwrap();
    }
    assert!(lifecycle.cleaned_up());
    assert_eq!(lifecycle.state(), LifecycleState::CleanedUp);
}

#[test]
fn test_begin_before_initialize_fails() {
    let mut lifecycle = Lifecycle::new();
    assert!(matches!(lifecycle.begin(), Err(Error::InvalidState(_))));
    assert!(lifecycle.require_initialized("resize").is_err());
}

#[test]
fn test_double_begin_fails() {
    let mut lifecycle = Lifecycle::new();
    lifecycle.initialized().unwrap();
    lifecycle.begin().unwrap();
    assert!(lifecycle.begin().is_err());
}

#[test]
fn test_abandon_frame_returns_to_initialized() {
    let mut lifecycle = Lifecycle::new();
    lifecycle.initialized().unwrap();
    lifecycle.begin().unwrap();
    lifecycle.abandon_frame();
    assert_eq!(lifecycle.state(), LifecycleState::Initialized);
    assert!(lifecycle.begin().is_ok());
}

#[test]
fn test_cleanup_is_idempotent() {
    let mut lifecycle = Lifecycle::new();
    lifecycle.initialized().unwrap();
    assert!(lifecycle.cleaned_up());
    assert!(!lifecycle.cleaned_up());
    assert!(lifecycle.initialized().is_err());
}
