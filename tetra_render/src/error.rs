//! Error types for the Tetra render subsystem
//!
//! One enum covers the whole error taxonomy: fatal-at-init failures,
//! recoverable swapchain staleness, per-operation soft failures and
//! runtime resource-creation failures.

use std::fmt;

/// Result type for render operations
pub type Result<T> = std::result::Result<T, Error>;

/// Render subsystem errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (native API call failed)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (expired handle, wrong usage, bad size, foreign backend)
    InvalidResource(String),

    /// Initialization failed (device, swapchain, default pipeline)
    InitializationFailed(String),

    /// Swapchain no longer matches the surface; handled by recreation
    SwapchainOutOfDate,

    /// The device was lost; rendering cannot continue
    DeviceLost,

    /// Operation not allowed in the current lifecycle or pass state
    InvalidState(String),
}

impl Error {
    /// True for errors that must abort rendering entirely
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InitializationFailed(_) | Error::DeviceLost)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::SwapchainOutOfDate => write!(f, "Swapchain out of date"),
            Error::DeviceLost => write!(f, "Device lost"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
