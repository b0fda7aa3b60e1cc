/// FrameSync - frames-in-flight synchronization
///
/// Every slot owns a fence (created signalled), an image-available semaphore
/// and a render-finished semaphore. They are created once, cycled every
/// frame and destroyed at teardown only.
///
/// `begin_frame` runs the acquire protocol:
/// 1. wait for the slot's fence
/// 2. acquire the next swapchain image (signals the slot's image-available semaphore)
/// 3. if another slot last submitted against that image, wait for that slot's fence
/// 4. reset the slot's fence
///
/// The caller records commands, then `end_frame` submits (wait image-available,
/// signal render-finished and the slot fence), presents and advances the slot.
///
/// The protocol is generic over `SyncDevice` so it can run against a
/// simulated GPU as well as the real device.

use std::fmt;
use tetra_render::{Error, Result, SkipReason};

const SOURCE: &str = "tetra::vulkan::sync";

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// Swapchain must be recreated; the semaphore was not signalled
    OutOfDate,
    /// No image became available within the acquire timeout
    Timeout,
}

/// Result of a present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// True when the swapchain should be recreated before the next frame
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// The device operations the protocol needs
pub trait SyncDevice {
    type Fence: Copy + PartialEq + fmt::Debug;
    type Semaphore: Copy + PartialEq + fmt::Debug;
    type Commands: Copy;

    fn create_fence(&self, signaled: bool) -> Result<Self::Fence>;
    fn create_semaphore(&self) -> Result<Self::Semaphore>;
    fn destroy_fence(&self, fence: Self::Fence);
    fn destroy_semaphore(&self, semaphore: Self::Semaphore);

    /// Block until `fence` is signalled
    fn wait_fence(&self, fence: Self::Fence) -> Result<()>;
    fn reset_fence(&self, fence: Self::Fence) -> Result<()>;

    fn acquire_image(&self, signal: Self::Semaphore) -> Result<AcquireOutcome>;

    /// Queue submission; `commands: None` is an empty submit
    fn submit(
        &self,
        commands: Option<Self::Commands>,
        wait: Self::Semaphore,
        signal: Option<Self::Semaphore>,
        fence: Self::Fence,
    ) -> Result<()>;

    fn present(&self, wait: Self::Semaphore, image_index: u32) -> Result<PresentOutcome>;
}

struct FrameSlot<F, S> {
    in_flight: F,
    image_available: S,
    render_finished: S,
}

/// The frame currently being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTicket {
    pub slot: usize,
    pub image_index: u32,
    /// Acquire reported SUBOPTIMAL; recreate after present
    pub suboptimal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    Ready(FrameTicket),
    Skipped(SkipReason),
}

impl BeginOutcome {
    /// True when the swapchain must be rebuilt before the next acquire
    ///
    /// A timed-out acquire means the presentation engine is holding every
    /// image; retrying against the same swapchain can time out forever.
    pub fn needs_recreate(self) -> bool {
        matches!(
            self,
            BeginOutcome::Skipped(SkipReason::SwapchainOutOfDate | SkipReason::AcquireTimeout)
        )
    }
}

pub struct FrameSync<D: SyncDevice> {
    slots: Vec<FrameSlot<D::Fence, D::Semaphore>>,
    /// Fence of the slot that last submitted against each swapchain image
    images_in_flight: Vec<Option<D::Fence>>,
    current: usize,
    pending: Option<FrameTicket>,
}

impl<D: SyncDevice> FrameSync<D> {
    /// Create `frames_in_flight` slots for a swapchain of `image_count` images
    pub fn new(device: &D, frames_in_flight: usize, image_count: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(Error::InitializationFailed("frames_in_flight must be at least 1".to_string()));
        }

        let mut sync = Self {
            slots: Vec::with_capacity(frames_in_flight),
            images_in_flight: vec![None; image_count],
            current: 0,
            pending: None,
        };

        for _ in 0..frames_in_flight {
            match Self::create_slot(device) {
                Ok(slot) => sync.slots.push(slot),
                Err(e) => {
                    sync.destroy(device);
                    return Err(e);
                }
            }
        }

        tetra_render::render_debug!(
            SOURCE,
            "Created {} frame slots for {} swapchain images",
            frames_in_flight, image_count
        );
        Ok(sync)
    }

    fn create_slot(device: &D) -> Result<FrameSlot<D::Fence, D::Semaphore>> {
        let in_flight = device.create_fence(true)?;
        let image_available = match device.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                device.destroy_fence(in_flight);
                return Err(e);
            }
        };
        let render_finished = match device.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                device.destroy_semaphore(image_available);
                device.destroy_fence(in_flight);
                return Err(e);
            }
        };
        Ok(FrameSlot { in_flight, image_available, render_finished })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Slot the next (or current) frame uses
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Frame between `begin_frame` and `end_frame`/`abandon_frame`
    pub fn pending(&self) -> Option<FrameTicket> {
        self.pending
    }

    /// Fences plus semaphores currently owned
    pub fn live_sync_objects(&self) -> usize {
        self.slots.len() * 3
    }

    /// Fence of the current slot (for callers that must wait on it)
    pub fn current_fence(&self) -> Option<D::Fence> {
        self.slots.get(self.current).map(|slot| slot.in_flight)
    }

    // ===== PROTOCOL =====

    /// Wait for the slot, acquire an image and claim it
    ///
    /// A skipped frame leaves the slot fence signalled, so nothing needs
    /// to be undone.
    pub fn begin_frame(&mut self, device: &D) -> Result<BeginOutcome> {
        if let Some(ticket) = self.pending {
            return Err(Error::InvalidState(format!(
                "begin_frame while slot {} is still recording", ticket.slot
            )));
        }
        let slot = self.slots.get(self.current).ok_or_else(|| {
            Error::InvalidState("frame sync used after destroy".to_string())
        })?;
        let in_flight = slot.in_flight;
        let image_available = slot.image_available;

        // 1. The GPU has finished the last frame recorded in this slot
        device.wait_fence(in_flight)?;

        // 2. Acquire
        let (image_index, suboptimal) = match device.acquire_image(image_available)? {
            AcquireOutcome::Acquired { image_index, suboptimal } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                tetra_render::render_debug!(SOURCE, "Acquire: swapchain out of date");
                return Ok(BeginOutcome::Skipped(SkipReason::SwapchainOutOfDate));
            }
            AcquireOutcome::Timeout => {
                tetra_render::render_debug!(SOURCE, "Acquire timed out");
                return Ok(BeginOutcome::Skipped(SkipReason::AcquireTimeout));
            }
        };

        let image = image_index as usize;
        if image >= self.images_in_flight.len() {
            self.images_in_flight.resize(image + 1, None);
        }

        // 3. Image may still be in use by a frame recorded in another slot
        if let Some(owner) = self.images_in_flight[image] {
            if owner != in_flight {
                device.wait_fence(owner)?;
            }
        }
        self.images_in_flight[image] = Some(in_flight);

        // 4. Claim the slot
        device.reset_fence(in_flight)?;

        let ticket = FrameTicket { slot: self.current, image_index, suboptimal };
        self.pending = Some(ticket);
        Ok(BeginOutcome::Ready(ticket))
    }

    /// Submit the recorded commands, present and advance to the next slot
    pub fn end_frame(&mut self, device: &D, commands: D::Commands) -> Result<PresentOutcome> {
        let ticket = self.pending.take().ok_or_else(|| {
            Error::InvalidState("end_frame without a successful begin_frame".to_string())
        })?;
        let slot = &self.slots[ticket.slot];

        if let Err(e) = device.submit(
            Some(commands),
            slot.image_available,
            Some(slot.render_finished),
            slot.in_flight,
        ) {
            // Keep the fence wait of the next frame in this slot from hanging
            if let Err(recover) = device.submit(None, slot.image_available, None, slot.in_flight) {
                tetra_render::render_error!(SOURCE, "Recovery submit failed: {}", recover);
            }
            return Err(e);
        }

        let presented = device.present(slot.render_finished, ticket.image_index);
        self.current = (self.current + 1) % self.slots.len();

        match presented? {
            PresentOutcome::Presented if ticket.suboptimal => Ok(PresentOutcome::Suboptimal),
            outcome => Ok(outcome),
        }
    }

    /// Give up on the frame being recorded
    ///
    /// Issues an empty submit that consumes the image-available semaphore and
    /// signals the slot fence, so the next wait on this slot cannot deadlock.
    /// The acquired image is not presented: the caller must recreate the
    /// swapchain to get it back.
    pub fn abandon_frame(&mut self, device: &D) -> Result<()> {
        let Some(ticket) = self.pending.take() else {
            return Ok(());
        };
        let slot = &self.slots[ticket.slot];
        tetra_render::render_warn!(SOURCE, "Abandoning frame in slot {} (image {})", ticket.slot, ticket.image_index);
        device.submit(None, slot.image_available, None, slot.in_flight)
    }

    /// Forget image ownership after the swapchain was rebuilt (device idle)
    pub fn on_swapchain_recreated(&mut self, image_count: usize) {
        self.images_in_flight = vec![None; image_count];
    }

    /// Destroy every sync object. Idempotent. The device must be idle.
    pub fn destroy(&mut self, device: &D) {
        for slot in self.slots.drain(..) {
            device.destroy_semaphore(slot.render_finished);
            device.destroy_semaphore(slot.image_available);
            device.destroy_fence(slot.in_flight);
        }
        self.images_in_flight.clear();
        self.pending = None;
        self.current = 0;
    }
}

#[cfg(test)]
#[path = "frame_sync_tests.rs"]
mod tests;
