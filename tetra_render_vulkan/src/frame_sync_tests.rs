//! Unit tests for FrameSync against a simulated GPU
//!
//! `SimDevice` models queue latency, fence/semaphore state and a
//! presentation engine, and reports the misuse a real driver would hang or
//! fail on (waiting a fence nothing will signal, double-signalling a
//! semaphore, submitting with a signalled fence).

use super::*;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

// ============================================================================
// Simulated device
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SemState {
    Unsignaled,
    Signaled,
    /// Will be signalled when the job completes
    Pending(u64),
}

#[derive(Debug, Clone, Copy)]
struct FenceState {
    signaled: bool,
    pending_job: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct Job {
    id: u64,
    complete_at: u64,
    fence: u32,
    signal: Option<u32>,
}

#[derive(Default)]
struct SimState {
    clock: u64,
    next_id: u32,
    next_job: u64,
    fences: HashMap<u32, FenceState>,
    semaphores: HashMap<u32, SemState>,
    jobs: Vec<Job>,
    /// None = held by the application, Some(t) = available from tick t
    images: Vec<Option<u64>>,
    next_image: usize,
    acquires: u64,
    presents: u64,
    submits: u64,
    fence_waits: Vec<u32>,
    created: usize,
    destroyed: usize,
    out_of_date_acquires: HashSet<u64>,
    timeout_acquires: HashSet<u64>,
    out_of_date_presents: HashSet<u64>,
}

impl SimState {
    fn complete_until(&mut self, tick: u64) {
        self.clock = self.clock.max(tick);
        let clock = self.clock;
        let (done, rest): (Vec<Job>, Vec<Job>) =
            std::mem::take(&mut self.jobs).into_iter().partition(|j| j.complete_at <= clock);
        self.jobs = rest;
        for job in done {
            if let Some(fence) = self.fences.get_mut(&job.fence) {
                fence.signaled = true;
                fence.pending_job = None;
            }
            if let Some(sem) = job.signal {
                if let Some(state) = self.semaphores.get_mut(&sem) {
                    if *state == SemState::Pending(job.id) {
                        *state = SemState::Signaled;
                    }
                }
            }
        }
    }

    fn job_completion(&self, job_id: u64) -> Option<u64> {
        self.jobs.iter().find(|j| j.id == job_id).map(|j| j.complete_at)
    }
}

/// GPU with a fixed queue latency (in submits)
struct SimDevice {
    lag: u64,
    state: RefCell<SimState>,
}

fn sim_err(message: &str) -> Error {
    Error::BackendError(format!("simulated device: {}", message))
}

impl SimDevice {
    fn new(image_count: usize, lag: u64) -> Self {
        let state = SimState { images: vec![Some(0); image_count], ..SimState::default() };
        Self { lag, state: RefCell::new(state) }
    }

    fn live_objects(&self) -> usize {
        let state = self.state.borrow();
        state.created - state.destroyed
    }

    /// Swapchain rebuilt: every image goes back to the presentation engine
    fn recreate_swapchain(&self, image_count: usize) {
        let mut state = self.state.borrow_mut();
        let clock = state.clock;
        state.images = vec![Some(clock); image_count];
        state.next_image = 0;
    }

    /// Device idle: complete every outstanding job
    fn wait_idle(&self) {
        let mut state = self.state.borrow_mut();
        let last = state.jobs.iter().map(|j| j.complete_at).max().unwrap_or(0);
        state.complete_until(last);
    }
}

impl SyncDevice for SimDevice {
    type Fence = u32;
    type Semaphore = u32;
    type Commands = ();

    fn create_fence(&self, signaled: bool) -> Result<u32> {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.fences.insert(id, FenceState { signaled, pending_job: None });
        state.created += 1;
        Ok(id)
    }

    fn create_semaphore(&self) -> Result<u32> {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.semaphores.insert(id, SemState::Unsignaled);
        state.created += 1;
        Ok(id)
    }

    fn destroy_fence(&self, fence: u32) {
        let mut state = self.state.borrow_mut();
        if state.fences.remove(&fence).is_some() {
            state.destroyed += 1;
        }
    }

    fn destroy_semaphore(&self, semaphore: u32) {
        let mut state = self.state.borrow_mut();
        if state.semaphores.remove(&semaphore).is_some() {
            state.destroyed += 1;
        }
    }

    fn wait_fence(&self, fence: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.fence_waits.push(fence);
        let current = *state.fences.get(&fence).ok_or_else(|| sim_err("wait on destroyed fence"))?;
        if current.signaled {
            return Ok(());
        }
        let job = current.pending_job.ok_or_else(|| sim_err("deadlock: fence will never be signalled"))?;
        let completion = state.job_completion(job).ok_or_else(|| sim_err("job vanished"))?;
        state.complete_until(completion);
        Ok(())
    }

    fn reset_fence(&self, fence: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let current = state.fences.get_mut(&fence).ok_or_else(|| sim_err("reset of destroyed fence"))?;
        if current.pending_job.is_some() {
            return Err(sim_err("reset of a fence with pending work"));
        }
        current.signaled = false;
        Ok(())
    }

    fn acquire_image(&self, signal: u32) -> Result<AcquireOutcome> {
        let mut state = self.state.borrow_mut();
        let call = state.acquires;
        state.acquires += 1;

        if state.out_of_date_acquires.contains(&call) {
            return Ok(AcquireOutcome::OutOfDate);
        }
        if state.timeout_acquires.contains(&call) {
            return Ok(AcquireOutcome::Timeout);
        }
        if state.semaphores.get(&signal) != Some(&SemState::Unsignaled) {
            return Err(sim_err("acquire with a semaphore that is already signalled"));
        }

        // Block until the next image in order comes back from presentation
        let count = state.images.len();
        let index = state.next_image % count;
        let Some(available_at) = state.images[index] else {
            return Ok(AcquireOutcome::Timeout);
        };
        state.complete_until(available_at);
        state.images[index] = None;
        state.next_image = index + 1;
        state.semaphores.insert(signal, SemState::Signaled);

        Ok(AcquireOutcome::Acquired { image_index: index as u32, suboptimal: false })
    }

    fn submit(&self, _commands: Option<()>, wait: u32, signal: Option<u32>, fence: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match state.semaphores.get(&wait) {
            Some(SemState::Signaled) | Some(SemState::Pending(_)) => {}
            _ => return Err(sim_err("submit waits on a semaphore nothing signals")),
        }
        let fence_state = *state.fences.get(&fence).ok_or_else(|| sim_err("submit with destroyed fence"))?;
        if fence_state.signaled || fence_state.pending_job.is_some() {
            return Err(sim_err("submit with a fence that was not reset"));
        }

        state.next_job += 1;
        let id = state.next_job;
        if let Some(signal) = signal {
            if state.semaphores.get(&signal) != Some(&SemState::Unsignaled) {
                return Err(sim_err("signal of a semaphore that is already signalled"));
            }
            state.semaphores.insert(signal, SemState::Pending(id));
        }
        state.semaphores.insert(wait, SemState::Unsignaled);
        if let Some(f) = state.fences.get_mut(&fence) {
            f.pending_job = Some(id);
        }

        let complete_at = state.clock + self.lag;
        state.jobs.push(Job { id, complete_at, fence, signal });
        state.submits += 1;
        state.clock += 1;
        let clock = state.clock;
        state.complete_until(clock);
        Ok(())
    }

    fn present(&self, wait: u32, image_index: u32) -> Result<PresentOutcome> {
        let mut state = self.state.borrow_mut();
        let call = state.presents;
        state.presents += 1;

        let available_at = match state.semaphores.get(&wait) {
            Some(SemState::Signaled) => state.clock,
            Some(SemState::Pending(job)) => {
                let job = *job;
                state.job_completion(job).unwrap_or(state.clock)
            }
            _ => return Err(sim_err("present waits on a semaphore nothing signals")),
        };
        state.semaphores.insert(wait, SemState::Unsignaled);
        // Drop the pending signal so completion does not re-signal it
        for job in state.jobs.iter_mut() {
            if job.signal == Some(wait) {
                job.signal = None;
            }
        }
        state.images[image_index as usize] = Some(available_at + 1);

        if state.out_of_date_presents.contains(&call) {
            return Ok(PresentOutcome::OutOfDate);
        }
        Ok(PresentOutcome::Presented)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn run_frame(sync: &mut FrameSync<SimDevice>, device: &SimDevice) -> Result<Option<PresentOutcome>> {
    match sync.begin_frame(device)? {
        BeginOutcome::Ready(_) => Ok(Some(sync.end_frame(device, ())?)),
        BeginOutcome::Skipped(_) => Ok(None),
    }
}

// ============================================================================
// STEADY STATE
// ============================================================================

#[test]
fn test_thousand_frames_keep_sync_objects_constant() {
    for frames_in_flight in 1..=3 {
        for image_count in 2..=4 {
            for lag in 0..=4 {
                let device = SimDevice::new(image_count, lag);
                let mut sync = FrameSync::new(&device, frames_in_flight, image_count).unwrap();
                let baseline = device.live_objects();
                assert_eq!(baseline, frames_in_flight * 3);

                for frame in 0..1000 {
                    let outcome = run_frame(&mut sync, &device).unwrap_or_else(|e| {
                        panic!("frame {} (fif {}, images {}, lag {}): {}", frame, frames_in_flight, image_count, lag, e)
                    });
                    assert_eq!(outcome, Some(PresentOutcome::Presented));
                    assert_eq!(device.live_objects(), baseline);
                    assert_eq!(sync.live_sync_objects(), baseline);
                }

                assert_eq!(device.state.borrow().presents, 1000);
                device.wait_idle();
                sync.destroy(&device);
                assert_eq!(device.live_objects(), 0);
            }
        }
    }
}

#[test]
fn test_slot_cycles_through_frames_in_flight() {
    let device = SimDevice::new(3, 1);
    let mut sync = FrameSync::new(&device, 2, 3).unwrap();

    let mut slots = Vec::new();
    for _ in 0..6 {
        if let BeginOutcome::Ready(ticket) = sync.begin_frame(&device).unwrap() {
            slots.push(ticket.slot);
            sync.end_frame(&device, ()).unwrap();
        }
    }
    assert_eq!(slots, vec![0, 1, 0, 1, 0, 1]);
}

#[test]
fn test_waits_on_image_fence_owned_by_other_slot() {
    // 3 images, 2 slots: image 0 is reacquired by slot 1 on the fourth frame
    let device = SimDevice::new(3, 3);
    let mut sync = FrameSync::new(&device, 2, 3).unwrap();
    let slot0_fence = sync.current_fence().unwrap();

    for _ in 0..3 {
        run_frame(&mut sync, &device).unwrap();
    }

    device.state.borrow_mut().fence_waits.clear();
    let ticket = match sync.begin_frame(&device).unwrap() {
        BeginOutcome::Ready(ticket) => ticket,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(ticket.slot, 1);
    assert_eq!(ticket.image_index, 0);
    assert!(device.state.borrow().fence_waits.contains(&slot0_fence));
    sync.end_frame(&device, ()).unwrap();
}

// ============================================================================
// SWAPCHAIN STALENESS
// ============================================================================

#[test]
fn test_out_of_date_acquire_skips_without_resetting_fence() {
    let device = SimDevice::new(3, 2);
    device.state.borrow_mut().out_of_date_acquires.insert(5);
    let mut sync = FrameSync::new(&device, 2, 3).unwrap();

    for _ in 0..5 {
        run_frame(&mut sync, &device).unwrap();
    }

    let outcome = sync.begin_frame(&device).unwrap();
    assert_eq!(outcome, BeginOutcome::Skipped(SkipReason::SwapchainOutOfDate));
    assert!(sync.pending().is_none());

    // Caller recreates the swapchain, then rendering resumes
    device.wait_idle();
    device.recreate_swapchain(4);
    sync.on_swapchain_recreated(4);

    for _ in 0..20 {
        assert_eq!(run_frame(&mut sync, &device).unwrap(), Some(PresentOutcome::Presented));
    }
}

#[test]
fn test_acquire_timeout_skips_frame() {
    let device = SimDevice::new(2, 0);
    device.state.borrow_mut().timeout_acquires.insert(0);
    let mut sync = FrameSync::new(&device, 2, 2).unwrap();

    assert_eq!(sync.begin_frame(&device).unwrap(), BeginOutcome::Skipped(SkipReason::AcquireTimeout));
    assert_eq!(run_frame(&mut sync, &device).unwrap(), Some(PresentOutcome::Presented));
}

#[test]
fn test_acquire_timeout_rebuilds_swapchain_before_next_acquire() {
    let device = SimDevice::new(2, 0);
    device.state.borrow_mut().timeout_acquires.insert(1);
    let mut sync = FrameSync::new(&device, 2, 2).unwrap();

    // Same bookkeeping the renderer does around begin_frame
    let mut dirty = false;
    let mut rebuilt_before_acquire = Vec::new();
    let mut presented = 0;
    for _ in 0..4 {
        if dirty {
            device.wait_idle();
            device.recreate_swapchain(2);
            sync.on_swapchain_recreated(2);
            rebuilt_before_acquire.push(device.state.borrow().acquires);
            dirty = false;
        }
        let outcome = sync.begin_frame(&device).unwrap();
        dirty = outcome.needs_recreate();
        if let BeginOutcome::Ready(_) = outcome {
            sync.end_frame(&device, ()).unwrap();
            presented += 1;
        }
    }

    assert!(BeginOutcome::Skipped(SkipReason::AcquireTimeout).needs_recreate());
    assert!(!BeginOutcome::Skipped(SkipReason::Minimized).needs_recreate());
    assert_eq!(rebuilt_before_acquire, vec![2]);
    assert_eq!(presented, 3);
}

#[test]
fn test_out_of_date_present_advances_slot() {
    let device = SimDevice::new(3, 1);
    device.state.borrow_mut().out_of_date_presents.insert(2);
    let mut sync = FrameSync::new(&device, 2, 3).unwrap();

    run_frame(&mut sync, &device).unwrap();
    run_frame(&mut sync, &device).unwrap();
    let slot_before = sync.current_slot();
    assert_eq!(run_frame(&mut sync, &device).unwrap(), Some(PresentOutcome::OutOfDate));
    assert_ne!(sync.current_slot(), slot_before);

    device.wait_idle();
    device.recreate_swapchain(3);
    sync.on_swapchain_recreated(3);
    for _ in 0..10 {
        assert_eq!(run_frame(&mut sync, &device).unwrap(), Some(PresentOutcome::Presented));
    }
}

#[test]
fn test_suboptimal_acquire_reported_after_present() {
    struct Suboptimal(SimDevice);
    impl SyncDevice for Suboptimal {
        type Fence = u32;
        type Semaphore = u32;
        type Commands = ();
        fn create_fence(&self, signaled: bool) -> Result<u32> { self.0.create_fence(signaled) }
        fn create_semaphore(&self) -> Result<u32> { self.0.create_semaphore() }
        fn destroy_fence(&self, fence: u32) { self.0.destroy_fence(fence) }
        fn destroy_semaphore(&self, semaphore: u32) { self.0.destroy_semaphore(semaphore) }
        fn wait_fence(&self, fence: u32) -> Result<()> { self.0.wait_fence(fence) }
        fn reset_fence(&self, fence: u32) -> Result<()> { self.0.reset_fence(fence) }
        fn acquire_image(&self, signal: u32) -> Result<AcquireOutcome> {
            match self.0.acquire_image(signal)? {
                AcquireOutcome::Acquired { image_index, .. } => {
                    Ok(AcquireOutcome::Acquired { image_index, suboptimal: true })
                }
                other => Ok(other),
            }
        }
        fn submit(&self, c: Option<()>, w: u32, s: Option<u32>, f: u32) -> Result<()> { self.0.submit(c, w, s, f) }
        fn present(&self, wait: u32, image: u32) -> Result<PresentOutcome> { self.0.present(wait, image) }
    }

    let device = Suboptimal(SimDevice::new(3, 1));
    let mut sync = FrameSync::new(&device, 2, 3).unwrap();
    let BeginOutcome::Ready(ticket) = sync.begin_frame(&device).unwrap() else {
        panic!("frame skipped");
    };
    assert!(ticket.suboptimal);
    let outcome = sync.end_frame(&device, ()).unwrap();
    assert_eq!(outcome, PresentOutcome::Suboptimal);
    assert!(outcome.needs_recreate());
}

// ============================================================================
// ABANDONED FRAMES AND MISUSE
// ============================================================================

#[test]
fn test_abandoned_frame_does_not_deadlock_next_wait() {
    let device = SimDevice::new(3, 2);
    let mut sync = FrameSync::new(&device, 2, 3).unwrap();

    run_frame(&mut sync, &device).unwrap();
    assert!(matches!(sync.begin_frame(&device).unwrap(), BeginOutcome::Ready(_)));
    sync.abandon_frame(&device).unwrap();
    assert!(sync.pending().is_none());

    // The abandoned image is only returned by a swapchain rebuild
    device.wait_idle();
    device.recreate_swapchain(3);
    sync.on_swapchain_recreated(3);

    for _ in 0..10 {
        assert_eq!(run_frame(&mut sync, &device).unwrap(), Some(PresentOutcome::Presented));
    }
}

#[test]
fn test_abandon_without_pending_frame_is_noop() {
    let device = SimDevice::new(2, 0);
    let mut sync = FrameSync::new(&device, 2, 2).unwrap();
    sync.abandon_frame(&device).unwrap();
    assert_eq!(device.state.borrow().submits, 0);
}

#[test]
fn test_end_without_begin_is_invalid_state() {
    let device = SimDevice::new(2, 0);
    let mut sync = FrameSync::new(&device, 2, 2).unwrap();
    assert!(matches!(sync.end_frame(&device, ()), Err(Error::InvalidState(_))));
}

#[test]
fn test_begin_twice_is_invalid_state() {
    let device = SimDevice::new(3, 0);
    let mut sync = FrameSync::new(&device, 2, 3).unwrap();
    sync.begin_frame(&device).unwrap();
    assert!(matches!(sync.begin_frame(&device), Err(Error::InvalidState(_))));
}

#[test]
fn test_zero_frames_in_flight_rejected() {
    let device = SimDevice::new(2, 0);
    assert!(matches!(FrameSync::new(&device, 0, 2), Err(Error::InitializationFailed(_))));
}

#[test]
fn test_destroy_is_idempotent() {
    let device = SimDevice::new(2, 0);
    let mut sync = FrameSync::new(&device, 3, 2).unwrap();
    sync.destroy(&device);
    sync.destroy(&device);
    assert_eq!(device.live_objects(), 0);
    assert_eq!(sync.live_sync_objects(), 0);
    assert!(matches!(sync.begin_frame(&device), Err(Error::InvalidState(_))));
}
