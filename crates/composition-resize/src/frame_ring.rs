use array_init::try_array_init;
use tracing::warn;
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::System::Threading::*;

use crate::device::DeviceContext;
use crate::error::FatalExt;
use crate::error::RenderError;
use crate::error::RenderResult;
use crate::handle::OwnedHandle;
use crate::swap_chain::BACK_BUFFER_COUNT;

/// Frames that may be in flight concurrently. Kept equal to the back
/// buffer count for simplicity.
pub const FRAMES_IN_FLIGHT: usize = BACK_BUFFER_COUNT as usize;

/// One ring entry: command-recording storage plus the fence value of the
/// last submission that used it. 0 means no outstanding work.
pub struct FrameSlot {
    pub command_allocator: ID3D12CommandAllocator,
    fence_value: u64,
}

/// Fixed pool of per-frame resources. A slot's allocator is only handed
/// back for reuse once the GPU has signaled the fence value last assigned
/// to it; resetting earlier would be a use-after-free on the GPU timeline.
pub struct FrameRing {
    slots: [FrameSlot; FRAMES_IN_FLIGHT],
    frame_counter: u64,
    last_signaled_value: u64,
    fence: ID3D12Fence,
    fence_event: OwnedHandle,
}

impl FrameRing {
    pub fn new(device: &DeviceContext) -> RenderResult<Self> {
        let slots: [FrameSlot; FRAMES_IN_FLIGHT] = try_array_init(|_| -> RenderResult<FrameSlot> {
            let command_allocator = unsafe {
                device
                    .device
                    .CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)
            }
            .map_err(|source| RenderError::creation("CreateCommandAllocator", source))?;
            Ok(FrameSlot {
                command_allocator,
                fence_value: 0,
            })
        })?;

        let fence = unsafe { device.device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }
            .map_err(|source| RenderError::creation("CreateFence", source))?;

        let fence_event = unsafe { CreateEventA(None, false, false, None) }
            .map_err(|source| RenderError::creation("CreateEventA", source))?;
        if fence_event.is_invalid() {
            return Err(RenderError::creation(
                "CreateEventA",
                windows::core::Error::from_win32(),
            ));
        }

        Ok(Self {
            slots,
            frame_counter: 0,
            last_signaled_value: 0,
            fence,
            fence_event: OwnedHandle::new(fence_event),
        })
    }

    pub fn allocator(&self, slot: usize) -> &ID3D12CommandAllocator {
        &self.slots[slot].command_allocator
    }

    /// Advance the frame counter and block until both conditions hold: the
    /// swap chain can accept another frame, and the selected slot's
    /// previous GPU work (if any) has retired. Returns the slot index.
    pub fn wait_for_next_slot(&mut self, swap_chain_waitable: HANDLE) -> usize {
        self.frame_counter += 1;
        let index = slot_index(self.frame_counter, FRAMES_IN_FLIGHT);

        let mut waitables = [swap_chain_waitable, HANDLE::default()];
        let mut waitable_count = 1;

        let slot = &mut self.slots[index];
        if slot.fence_value != 0 {
            let fence_value = std::mem::take(&mut slot.fence_value);
            unsafe {
                self.fence
                    .SetEventOnCompletion(fence_value, self.fence_event.raw())
            }
            .or_fatal("ID3D12Fence::SetEventOnCompletion");
            waitables[1] = self.fence_event.raw();
            waitable_count = 2;
        }

        unsafe { WaitForMultipleObjects(&waitables[..waitable_count], true, INFINITE) };

        index
    }

    /// Record that the work just submitted for `slot` completes at a fresh
    /// fence value.
    pub fn signal_slot(&mut self, command_queue: &ID3D12CommandQueue, slot: usize) {
        let fence_value = self.last_signaled_value + 1;
        unsafe { command_queue.Signal(&self.fence, fence_value) }
            .or_fatal("ID3D12CommandQueue::Signal");
        self.last_signaled_value = fence_value;
        self.slots[slot].fence_value = fence_value;
    }

    /// Retire every slot's outstanding work. Used before render-target
    /// teardown and at shutdown; afterwards no slot has an unsignaled
    /// fence.
    pub fn flush_all(&mut self, command_queue: &ID3D12CommandQueue) {
        for _ in 0..FRAMES_IN_FLIGHT {
            let current = slot_index(self.frame_counter, FRAMES_IN_FLIGHT);
            let fence_value = self.last_signaled_value + 1;
            if let Err(error) = unsafe { command_queue.Signal(&self.fence, fence_value) } {
                // A lost device cannot signal; there is nothing left to drain.
                warn!("queue signal failed during flush: {error}");
                return;
            }
            self.last_signaled_value = fence_value;
            self.slots[current].fence_value = fence_value;
            self.wait_for_last_submitted();
        }
    }

    fn wait_for_last_submitted(&mut self) {
        let current = slot_index(self.frame_counter, FRAMES_IN_FLIGHT);
        let slot = &mut self.slots[current];
        if slot.fence_value == 0 {
            return;
        }
        let fence_value = std::mem::take(&mut slot.fence_value);
        if unsafe { self.fence.GetCompletedValue() } >= fence_value {
            return;
        }
        unsafe {
            self.fence
                .SetEventOnCompletion(fence_value, self.fence_event.raw())
                .or_fatal("ID3D12Fence::SetEventOnCompletion");
            WaitForSingleObjectEx(self.fence_event.raw(), INFINITE, false);
        }
    }
}

fn slot_index(frame_counter: u64, ring_size: usize) -> usize {
    (frame_counter % ring_size as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_selection_cycles_through_the_ring() {
        let indices: Vec<usize> = (1..=7).map(|counter| slot_index(counter, 3)).collect();
        assert_eq!(indices, vec![1, 2, 0, 1, 2, 0, 1]);
    }

    #[test]
    fn slot_selection_is_bounded_by_ring_size() {
        for counter in 0..1000 {
            assert!(slot_index(counter, FRAMES_IN_FLIGHT) < FRAMES_IN_FLIGHT);
        }
    }

    #[test]
    fn consecutive_frames_use_distinct_slots() {
        for counter in 0..100u64 {
            assert_ne!(
                slot_index(counter, FRAMES_IN_FLIGHT),
                slot_index(counter + 1, FRAMES_IN_FLIGHT)
            );
        }
    }
}
