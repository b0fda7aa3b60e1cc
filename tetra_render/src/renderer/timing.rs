/// FrameTiming - delta time and FPS over a one-second window

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct FrameTiming {
    start: Instant,
    last_frame: Option<Instant>,
    window_start: Instant,
    window_frames: u32,
    delta: Duration,
    fps: f32,
    frame_index: u64,
}

impl FrameTiming {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: None,
            window_start: now,
            window_frames: 0,
            delta: Duration::ZERO,
            fps: 0.0,
            frame_index: 0,
        }
    }

    /// Record a presented frame
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        if let Some(last) = self.last_frame {
            self.delta = now.saturating_duration_since(last);
        }
        self.last_frame = Some(now);
        self.frame_index += 1;
        self.window_frames += 1;

        let window = now.saturating_duration_since(self.window_start);
        if window >= Duration::from_secs(1) {
            self.fps = self.window_frames as f32 / window.as_secs_f32();
            self.window_frames = 0;
            self.window_start = now;
        }
    }

    /// Time between the last two frames
    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Frames per second measured over the last full window
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Frames presented so far
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "timing_tests.rs"]
mod tests;
