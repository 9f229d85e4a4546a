use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::cache::DrawingCache;
use crate::contents::GraphicContents;
use crate::device::DeviceContext;
use crate::draw;
use crate::error::RenderError;
use crate::error::RenderResult;
use crate::frame_ring::FrameRing;
use crate::output;
use crate::output::OutputSync;
use crate::swap_chain::SwapChainManager;

/// Owns the GPU-side state and coordinates the resize protocol. All of it
/// runs on the thread that owns the window message loop; there is no other
/// mutator.
pub struct Renderer {
    command_list: ID3D12GraphicsCommandList,
    cache: DrawingCache,
    output_sync: OutputSync,
    frame_ring: FrameRing,
    swap_chain: SwapChainManager,
    // Dropped last: everything above was created from this device.
    device: DeviceContext,
}

impl Renderer {
    pub fn new() -> RenderResult<Self> {
        let device = DeviceContext::create()?;
        let swap_chain = SwapChainManager::new(&device)?;
        let frame_ring = FrameRing::new(&device)?;
        let output_sync = OutputSync::new(&device.adapters);

        let command_list: ID3D12GraphicsCommandList = unsafe {
            device.device.CreateCommandList(
                0,
                D3D12_COMMAND_LIST_TYPE_DIRECT,
                frame_ring.allocator(0),
                None::<&ID3D12PipelineState>,
            )
        }
        .map_err(|source| RenderError::creation("CreateCommandList", source))?;
        // Created in the recording state; the first frame expects it closed.
        unsafe { command_list.Close() }
            .map_err(|source| RenderError::creation("ID3D12GraphicsCommandList::Close", source))?;

        Ok(Self {
            command_list,
            cache: DrawingCache::default(),
            output_sync,
            frame_ring,
            swap_chain,
            device,
        })
    }

    /// The swap chain object, for the compositor binding.
    pub fn swap_chain(&self) -> &IDXGISwapChain3 {
        self.swap_chain.swap_chain()
    }

    /// Extent spanning every attached output. Used for the startup
    /// reposition, so a frame of a usable size exists before the window
    /// first appears.
    pub fn initial_position(&self) -> RECT {
        output::full_display_rect(&self.device.adapters)
    }

    /// The resize protocol. Triggered synchronously by the windowing
    /// layer's client-rect notification and runs to completion before
    /// returning; the window manager may not finish the resize until both
    /// presents have been issued.
    pub fn reposition(
        &mut self,
        position: RECT,
        contents: &mut dyn GraphicContents,
    ) -> RenderResult<()> {
        let width = (position.right - position.left).max(1) as u32;
        let height = (position.bottom - position.top).max(1) as u32;
        contents.update_layout(width, height);

        self.output_sync.locate_output(&position);

        // Views released, buffers reallocated, views recreated.
        self.swap_chain
            .resize(&self.device, &mut self.frame_ring, width, height)?;

        let slot = self
            .frame_ring
            .wait_for_next_slot(self.swap_chain.frame_latency_waitable());
        let back_buffer = self.swap_chain.current_back_buffer_index();
        let (width, height) = self.swap_chain.extent();

        draw::draw_frame(
            &self.device.device,
            &self.device.command_queue,
            &self.command_list,
            self.frame_ring.allocator(slot),
            self.swap_chain.render_target(back_buffer),
            self.swap_chain.rtv_handle(back_buffer),
            width,
            height,
            contents,
            &mut self.cache,
        )?;

        self.output_sync.wait_for_vblank();

        // Discard outstanding queued presents and get a frame with the new
        // size on screen as soon as possible.
        self.swap_chain
            .present(&self.device, 0, DXGI_PRESENT_RESTART)?;

        self.frame_ring.signal_slot(&self.device.command_queue, slot);

        // One present is not enough for the resized frame to be visible
        // before the window manager finishes the gesture. The second,
        // unsequenced present forces it.
        self.swap_chain
            .present(&self.device, 1, DXGI_PRESENT_DO_NOT_SEQUENCE)?;

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Drain the queue before releasing anything the GPU may still read.
        self.frame_ring.flush_all(&self.device.command_queue);
    }
}
