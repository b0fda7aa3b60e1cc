//! Unit tests for timing.rs

use crate::renderer::FrameTiming;
use std::time::{Duration, Instant};

#[test]
fn test_delta_between_ticks() {
    let mut timing = FrameTiming::new();
    let t0 = Instant::now();
    timing.tick_at(t0);
    assert_eq!(timing.delta(), Duration::ZERO);
    timing.tick_at(t0 + Duration::from_millis(16));
    assert_eq!(timing.delta(), Duration::from_millis(16));
    assert_eq!(timing.frame_index(), 2);
}

#[test]
fn test_fps_over_one_second_window() {
    let mut timing = FrameTiming::new();
    let t0 = Instant::now();
    for i in 1..=61 {
        timing.tick_at(t0 + Duration::from_millis(i * 1000 / 60));
    }
    assert!(timing.fps() > 55.0 && timing.fps() < 65.0, "fps = {}", timing.fps());
}
