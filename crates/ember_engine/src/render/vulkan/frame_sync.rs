//! Frame-level CPU/GPU synchronization
//!
//! The CPU records up to `frames_in_flight` frames ahead of the GPU. Two
//! rules keep that safe:
//!
//! 1. A frame slot's command buffer and uniform region are not touched until
//!    the slot's fence has signaled.
//! 2. A swapchain image is not re-targeted while the fence of the frame that
//!    last used it is still pending, even when that frame ran under a
//!    different slot index.
//!
//! The bookkeeping behind both rules lives in [`FrameLedger`], which is pure
//! state so the reuse logic can be exercised without a device.
//! [`FrameScheduler`] drives the ledger with real fences and semaphores.
//!
//! Present-wait semaphores are per swapchain image, not per slot: frames may
//! complete out of submission order on the GPU, and presentation has to wait
//! on the completion of the image actually being shown. Acquire semaphores
//! stay per slot because the image index is unknown until acquisition; the
//! slot-fence wait in step (a) guarantees the semaphore is free for reuse.

use ash::vk;

use super::context::{VulkanContext, VulkanError, VulkanResult};
use super::swapchain::Swapchain;
use super::sync::{Fence, Semaphore};

/// Lifecycle of one frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Not in use
    Idle,
    /// Blocking on the slot fence before reuse
    FenceWait,
    /// A swapchain image has been acquired
    ImageAcquired,
    /// Command recording in progress
    Recording,
    /// Submitted to the GPU, fence pending
    Submitted,
    /// Acquisition reported a stale surface; frame dropped without
    /// submission, swapchain resources must be rebuilt before retrying
    Aborted,
}

impl FrameState {
    /// Whether `next` is a legal successor state
    pub fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::FenceWait)
                | (Self::Submitted, Self::FenceWait)
                | (Self::FenceWait, Self::ImageAcquired)
                | (Self::FenceWait, Self::Aborted)
                | (Self::ImageAcquired, Self::Recording)
                | (Self::ImageAcquired, Self::Aborted)
                | (Self::Recording, Self::Submitted)
                | (Self::Submitted, Self::Idle)
                | (Self::Aborted, Self::Idle)
        )
    }
}

/// Pure reuse bookkeeping for frame slots and swapchain images.
///
/// "Pending" means: submitted, and the fence has not yet been observed
/// signaled by a CPU-side wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLedger {
    slot_pending: Vec<bool>,
    image_last_user: Vec<Option<usize>>,
}

impl FrameLedger {
    /// New ledger for `slot_count` frame slots and `image_count` images
    pub fn new(slot_count: usize, image_count: usize) -> Self {
        Self {
            slot_pending: vec![false; slot_count],
            image_last_user: vec![None; image_count],
        }
    }

    /// Step (a): must the CPU wait on this slot's fence before reuse?
    pub fn slot_pending(&self, slot: usize) -> bool {
        self.slot_pending[slot]
    }

    /// Record that a slot's fence was observed signaled
    pub fn mark_slot_idle(&mut self, slot: usize) {
        self.slot_pending[slot] = false;
    }

    /// Step (c): the slot whose still-pending fence gates reuse of `image`,
    /// if any. A recorded user whose fence already signaled does not gate.
    pub fn image_pending_user(&self, image: usize) -> Option<usize> {
        self.image_last_user[image].filter(|&slot| self.slot_pending[slot])
    }

    /// Step (e): record `slot` as the last user of `image`
    pub fn assign_image(&mut self, image: usize, slot: usize) {
        self.image_last_user[image] = Some(slot);
    }

    /// Record a submission: the slot's fence is pending until observed
    pub fn mark_submitted(&mut self, slot: usize) {
        self.slot_pending[slot] = true;
    }

    /// Swapchain was rebuilt behind a device-idle wait: image associations
    /// and pending flags are void.
    pub fn reset_images(&mut self, image_count: usize) {
        self.image_last_user = vec![None; image_count];
        for pending in &mut self.slot_pending {
            *pending = false;
        }
    }

    /// Number of tracked swapchain images
    pub fn image_count(&self) -> usize {
        self.image_last_user.len()
    }
}

/// Per-slot synchronization objects
pub struct FrameSlot {
    /// Signals when the GPU finished the slot's last submission
    pub fence: Fence,
    /// Signaled by the backend when the acquired image is ready
    pub image_acquired: Semaphore,
}

impl FrameSlot {
    fn new(device: &ash::Device) -> VulkanResult<Self> {
        Ok(Self {
            // Created signaled so the first wait on a fresh slot passes
            fence: Fence::new(device.clone(), true)?,
            image_acquired: Semaphore::new(device.clone())?,
        })
    }
}

/// Result of acquiring a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Frame may be recorded against this swapchain image index
    ImageReady(u32),
    /// Surface is stale; the frame was dropped with no fence progress
    SurfaceStale,
}

/// Result of submit + present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Frame presented
    Presented,
    /// Frame submitted, but the surface needs rebuilding before the next one
    SurfaceStale,
}

/// Owns all frame-level sync objects and runs the acquire/submit protocol.
pub struct FrameScheduler {
    slots: Vec<FrameSlot>,
    render_finished: Vec<Semaphore>,
    ledger: FrameLedger,
    states: Vec<FrameState>,
}

impl FrameScheduler {
    /// Create sync objects for `frames_in_flight` slots and the swapchain's
    /// current image count
    pub fn new(
        context: &VulkanContext,
        frames_in_flight: usize,
        image_count: usize,
    ) -> VulkanResult<Self> {
        log::debug!(
            "Creating FrameScheduler: {} slots, {} images",
            frames_in_flight,
            image_count
        );
        let device = context.raw_device();
        let slots = (0..frames_in_flight)
            .map(|_| FrameSlot::new(device))
            .collect::<VulkanResult<Vec<_>>>()?;
        let render_finished = (0..image_count)
            .map(|_| Semaphore::new(device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self {
            slots,
            render_finished,
            ledger: FrameLedger::new(frames_in_flight, image_count),
            states: vec![FrameState::Idle; frames_in_flight],
        })
    }

    /// Acquire a swapchain image for `slot`, enforcing both reuse rules.
    pub fn acquire_frame(
        &mut self,
        context: &VulkanContext,
        swapchain: &Swapchain,
        slot: usize,
    ) -> VulkanResult<AcquireOutcome> {
        self.transition(slot, FrameState::FenceWait)?;

        // (a) the slot's previous frame must be fully consumed by the GPU
        if self.ledger.slot_pending(slot) {
            self.slots[slot].fence.wait()?;
            self.ledger.mark_slot_idle(slot);
        }

        // (b) request the next presentable image
        let acquire_semaphore = self.slots[slot].image_acquired.handle();
        let image_index = match unsafe {
            context.swapchain_loader().acquire_next_image(
                swapchain.handle(),
                u64::MAX,
                acquire_semaphore,
                vk::Fence::null(),
            )
        } {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("Swapchain out of date during image acquisition");
                self.transition(slot, FrameState::Aborted)?;
                return Ok(AcquireOutcome::SurfaceStale);
            }
            Err(e) => return Err(VulkanError::Api(e)),
        };

        // (c) the image may still be read by a frame under another slot
        if let Some(owner) = self.ledger.image_pending_user(image_index as usize) {
            self.slots[owner].fence.wait()?;
            self.ledger.mark_slot_idle(owner);
        }

        // (d) + (e)
        self.slots[slot].fence.reset()?;
        self.ledger.assign_image(image_index as usize, slot);

        self.transition(slot, FrameState::ImageAcquired)?;
        Ok(AcquireOutcome::ImageReady(image_index))
    }

    /// Mark the slot as recording commands
    pub fn begin_recording(&mut self, slot: usize) -> VulkanResult<()> {
        self.transition(slot, FrameState::Recording)
    }

    /// Submit the recorded command stream and present the image.
    ///
    /// Submission waits on the slot's acquire semaphore at the color output
    /// stage, signals the *image's* render-finished semaphore and the slot's
    /// fence. Presentation waits on that same per-image semaphore.
    pub fn submit_and_present(
        &mut self,
        context: &VulkanContext,
        swapchain: &Swapchain,
        command_buffer: vk::CommandBuffer,
        slot: usize,
        image_index: u32,
    ) -> VulkanResult<PresentOutcome> {
        self.transition(slot, FrameState::Submitted)?;

        let wait_semaphores = [self.slots[slot].image_acquired.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_finished[image_index as usize].handle()];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            context
                .raw_device()
                .queue_submit(
                    context.graphics_queue(),
                    &[submit_info.build()],
                    self.slots[slot].fence.handle(),
                )
                .map_err(VulkanError::Api)?;
        }
        self.ledger.mark_submitted(slot);

        let swapchains = [swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe {
            context
                .swapchain_loader()
                .queue_present(context.present_queue(), &present_info)
        } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => {
                log::warn!("Swapchain suboptimal during present");
                Ok(PresentOutcome::SurfaceStale)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("Swapchain out of date during present");
                Ok(PresentOutcome::SurfaceStale)
            }
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Rebuild per-image sync objects after swapchain recreation. Caller
    /// must have completed a device-idle wait.
    pub fn rebuild_for_swapchain(
        &mut self,
        context: &VulkanContext,
        image_count: usize,
    ) -> VulkanResult<()> {
        self.render_finished = (0..image_count)
            .map(|_| Semaphore::new(context.raw_device().clone()))
            .collect::<VulkanResult<Vec<_>>>()?;
        // Fence waits are gated by the ledger, so clearing it is all the
        // fence-side work a rebuild needs.
        self.ledger.reset_images(image_count);
        for state in &mut self.states {
            *state = FrameState::Idle;
        }
        Ok(())
    }

    /// Current state of a frame slot
    pub fn slot_state(&self, slot: usize) -> FrameState {
        self.states[slot]
    }

    /// Read-only view of the reuse ledger
    pub fn ledger(&self) -> &FrameLedger {
        &self.ledger
    }

    fn transition(&mut self, slot: usize, next: FrameState) -> VulkanResult<()> {
        let current = self.states[slot];
        // Aborted and Submitted slots re-enter through FenceWait
        let effective = if next == FrameState::FenceWait
            && matches!(current, FrameState::Aborted | FrameState::Submitted)
        {
            FrameState::Idle
        } else {
            current
        };
        if !effective.can_transition(next) {
            return Err(VulkanError::InvalidOperation {
                reason: format!("illegal frame state transition {:?} -> {:?}", current, next),
            });
        }
        self.states[slot] = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives the ledger the way the scheduler does, simulating GPU fence
    /// completion, and asserts the two reuse invariants along the way.
    struct SimulatedFrames {
        ledger: FrameLedger,
        // Fences the GPU has been handed and not yet signaled
        outstanding: Vec<bool>,
        waits_observed: usize,
    }

    impl SimulatedFrames {
        fn new(slots: usize, images: usize) -> Self {
            Self {
                ledger: FrameLedger::new(slots, images),
                outstanding: vec![false; slots],
                waits_observed: 0,
            }
        }

        /// Run one frame against `slot`, acquiring `image`. Panics if a wait
        /// would block forever (fence never submitted).
        fn frame(&mut self, slot: usize, image: usize) {
            if self.ledger.slot_pending(slot) {
                assert!(
                    self.outstanding[slot],
                    "deadlock: waiting on slot {} whose fence was never submitted",
                    slot
                );
                self.outstanding[slot] = false; // GPU signals
                self.ledger.mark_slot_idle(slot);
                self.waits_observed += 1;
            }
            // Invariant (fence safety): recording may begin now
            assert!(!self.ledger.slot_pending(slot));

            if let Some(owner) = self.ledger.image_pending_user(image) {
                assert!(
                    self.outstanding[owner],
                    "deadlock: image {} gated by unsubmitted slot {}",
                    image, owner
                );
                self.outstanding[owner] = false;
                self.ledger.mark_slot_idle(owner);
                self.waits_observed += 1;
            }
            // Invariant (image reuse safety): no pending fence is registered
            // as this image's last user at submission time
            assert!(self.ledger.image_pending_user(image).is_none());

            self.ledger.assign_image(image, slot);
            self.ledger.mark_submitted(slot);
            self.outstanding[slot] = true;
        }
    }

    #[test]
    fn five_frames_cycling_two_slots_never_deadlock() {
        // Scenario: FRAMES_IN_FLIGHT=2, 2-image swapchain, slots 0,1,0,1,0
        let mut sim = SimulatedFrames::new(2, 2);
        for n in 0..5 {
            sim.frame(n % 2, n % 2);
        }
        // Every required wait unblocked (the SimulatedFrames harness panics
        // on a wait that could not make progress)
        assert!(sim.waits_observed >= 3);
    }

    #[test]
    fn image_reuse_waits_on_foreign_slot() {
        // Slot 0 renders into image 0, then slot 1 acquires the same image:
        // the ledger must gate on slot 0's fence, not slot 1's.
        let mut ledger = FrameLedger::new(2, 2);
        ledger.assign_image(0, 0);
        ledger.mark_submitted(0);

        assert_eq!(ledger.image_pending_user(0), Some(0));

        // Once the fence is observed, the image is free without forgetting
        // who used it last
        ledger.mark_slot_idle(0);
        assert_eq!(ledger.image_pending_user(0), None);
    }

    #[test]
    fn aborted_acquire_leaves_ledger_untouched() {
        // Scenario: stale surface on acquire drops the frame with no fence
        // progress; a recreate + retry then proceeds normally.
        let mut ledger = FrameLedger::new(2, 2);
        ledger.assign_image(1, 0);
        ledger.mark_submitted(0);

        let before = ledger.clone();
        // A stale acquire performs none of steps (c)-(e); nothing to do.
        assert_eq!(ledger, before);

        // Recreate: associations void, slots reusable immediately
        ledger.reset_images(3);
        assert_eq!(ledger.image_count(), 3);
        assert!(!ledger.slot_pending(0));
        assert_eq!(ledger.image_pending_user(1), None);
    }

    #[test]
    fn fresh_slots_do_not_require_waiting() {
        let ledger = FrameLedger::new(2, 3);
        assert!(!ledger.slot_pending(0));
        assert!(!ledger.slot_pending(1));
        for image in 0..3 {
            assert_eq!(ledger.image_pending_user(image), None);
        }
    }

    #[test]
    fn frame_state_machine_accepts_the_happy_path() {
        use FrameState::*;
        let path = [Idle, FenceWait, ImageAcquired, Recording, Submitted, Idle];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition(pair[1]),
                "{:?} -> {:?} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn frame_state_machine_rejects_recording_without_acquire() {
        use FrameState::*;
        assert!(!Idle.can_transition(Recording));
        assert!(!FenceWait.can_transition(Recording));
        assert!(!Aborted.can_transition(Recording));
    }

    #[test]
    fn stale_surface_aborts_from_acquisition_states_only() {
        use FrameState::*;
        assert!(FenceWait.can_transition(Aborted));
        assert!(ImageAcquired.can_transition(Aborted));
        assert!(!Recording.can_transition(Aborted));
        assert!(!Submitted.can_transition(Aborted));
        // An aborted frame recovers through Idle after the rebuild
        assert!(Aborted.can_transition(Idle));
    }
}
