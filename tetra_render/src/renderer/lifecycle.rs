/// Lifecycle - renderer state machine shared by every backend

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    /// Between a successful begin_render and its end_render
    Rendering,
    CleanedUp,
}

/// Guards renderer transitions; backends call these before doing work
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { state: LifecycleState::Uninitialized }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, LifecycleState::Initialized | LifecycleState::Rendering)
    }

    pub fn initialized(&mut self) -> Result<()> {
        self.transition(LifecycleState::Uninitialized, LifecycleState::Initialized, "initialize")
    }

    pub fn begin(&mut self) -> Result<()> {
        self.transition(LifecycleState::Initialized, LifecycleState::Rendering, "begin_render")
    }

    pub fn end(&mut self) -> Result<()> {
        self.transition(LifecycleState::Rendering, LifecycleState::Initialized, "end_render")
    }

    /// Back to Initialized after a skipped frame
    pub fn abandon_frame(&mut self) {
        if self.state == LifecycleState::Rendering {
            self.state = LifecycleState::Initialized;
        }
    }

    /// Returns false if already cleaned up (cleanup is idempotent)
    pub fn cleaned_up(&mut self) -> bool {
        if self.state == LifecycleState::CleanedUp {
            return false;
        }
        self.state = LifecycleState::CleanedUp;
        true
    }

    /// Error unless the renderer can take resize/resource calls
    pub fn require_initialized(&self, operation: &str) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("{} called while {:?}", operation, self.state)))
        }
    }

    fn transition(&mut self, from: LifecycleState, to: LifecycleState, operation: &str) -> Result<()> {
        if self.state != from {
            return Err(Error::InvalidState(format!(
                "{} called while {:?} (expected {:?})", operation, self.state, from
            )));
        }
        self.state = to;
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
