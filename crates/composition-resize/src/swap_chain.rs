use windows::core::Interface;
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::device::DeviceContext;
use crate::error::check_swap_chain;
use crate::error::fatal_state;
use crate::error::FatalExt;
use crate::error::RenderError;
use crate::error::RenderResult;
use crate::frame_ring::FrameRing;
use crate::handle::OwnedHandle;

pub const BACK_BUFFER_COUNT: u32 = 3;

/// Shared by the swap chain and the pipeline's render target format; the
/// two must agree.
pub const BACK_BUFFER_FORMAT: DXGI_FORMAT = DXGI_FORMAT_B8G8R8A8_UNORM;

/// Presentable buffer ring bound for off-screen composition rather than to
/// a window handle. Owns the render-target views into its buffers; those
/// are released before every buffer resize and recreated after, because
/// the buffers cannot be resized while still referenced.
pub struct SwapChainManager {
    render_targets: [Option<ID3D12Resource>; BACK_BUFFER_COUNT as usize],
    rtv_heap: ID3D12DescriptorHeap,
    rtv_descriptor_size: u32,
    frame_latency_waitable: OwnedHandle,
    swap_chain: IDXGISwapChain3,
    width: u32,
    height: u32,
}

impl SwapChainManager {
    pub fn new(device: &DeviceContext) -> RenderResult<Self> {
        let desc = DXGI_SWAP_CHAIN_DESC1 {
            BufferCount: BACK_BUFFER_COUNT,
            // Minimal extent; the first client-rect notification resizes it.
            Width: 1,
            Height: 1,
            Format: BACK_BUFFER_FORMAT,
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_SEQUENTIAL,
            AlphaMode: DXGI_ALPHA_MODE_IGNORE,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Flags: DXGI_SWAP_CHAIN_FLAG_FRAME_LATENCY_WAITABLE_OBJECT.0 as u32,
            ..Default::default()
        };

        let factory2: IDXGIFactory2 = device
            .dxgi_factory
            .cast()
            .map_err(|source| RenderError::creation("IDXGIFactory4::cast", source))?;
        let swap_chain_base: IDXGISwapChain1 = unsafe {
            factory2.CreateSwapChainForComposition(&device.command_queue, &desc, None)
        }
        .map_err(|source| RenderError::creation("CreateSwapChainForComposition", source))?;
        let swap_chain: IDXGISwapChain3 = swap_chain_base
            .cast()
            .map_err(|source| RenderError::creation("IDXGISwapChain1::cast", source))?;

        unsafe { swap_chain.SetMaximumFrameLatency(BACK_BUFFER_COUNT) }
            .map_err(|source| RenderError::creation("SetMaximumFrameLatency", source))?;
        let frame_latency_waitable =
            OwnedHandle::new(unsafe { swap_chain.GetFrameLatencyWaitableObject() });

        let rtv_heap: ID3D12DescriptorHeap = unsafe {
            device
                .device
                .CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                    Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
                    NumDescriptors: BACK_BUFFER_COUNT,
                    Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
                    ..Default::default()
                })
        }
        .map_err(|source| RenderError::creation("CreateDescriptorHeap", source))?;

        let rtv_descriptor_size = unsafe {
            device
                .device
                .GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV)
        };

        let mut manager = Self {
            render_targets: std::array::from_fn(|_| None),
            rtv_heap,
            rtv_descriptor_size,
            frame_latency_waitable,
            swap_chain,
            width: 1,
            height: 1,
        };
        manager
            .create_render_targets(&device.device)
            .map_err(|source| RenderError::creation("creating render target views", source))?;
        Ok(manager)
    }

    pub fn swap_chain(&self) -> &IDXGISwapChain3 {
        &self.swap_chain
    }

    pub fn frame_latency_waitable(&self) -> HANDLE {
        self.frame_latency_waitable.raw()
    }

    pub fn current_back_buffer_index(&self) -> u32 {
        unsafe { self.swap_chain.GetCurrentBackBufferIndex() }
    }

    /// Extent of the current buffers; matches the most recent resize.
    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn render_target(&self, index: u32) -> &ID3D12Resource {
        match &self.render_targets[index as usize] {
            Some(target) => target,
            None => fatal_state("render target accessed between release and recreate"),
        }
    }

    pub fn rtv_handle(&self, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: unsafe { self.rtv_heap.GetCPUDescriptorHandleForHeapStart() }.ptr
                + (index * self.rtv_descriptor_size) as usize,
        }
    }

    /// Discard and reallocate every buffer at the new extent. The frame
    /// ring is drained and all views dropped first; every view into the
    /// old buffers is invalid afterwards, so they are recreated before
    /// returning.
    pub fn resize(
        &mut self,
        device: &DeviceContext,
        frame_ring: &mut FrameRing,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        frame_ring.flush_all(&device.command_queue);
        self.release_render_targets();

        let hr = unsafe {
            self.swap_chain.ResizeBuffers(
                0,
                width,
                height,
                DXGI_FORMAT_UNKNOWN,
                DXGI_SWAP_CHAIN_FLAG_FRAME_LATENCY_WAITABLE_OBJECT,
            )
        }
        .map_or_else(|error| error.code(), |()| S_OK);
        check_swap_chain(hr, &device.device, "IDXGISwapChain3::ResizeBuffers")?;

        self.create_render_targets(&device.device)
            .or_fatal("recreating render target views");
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Submit the current back buffer for display. Called twice per resize
    /// cycle with different flags; callers must preserve that sequence.
    pub fn present(
        &self,
        device: &DeviceContext,
        sync_interval: u32,
        flags: DXGI_PRESENT,
    ) -> RenderResult<()> {
        let hr = unsafe { self.swap_chain.Present(sync_interval, flags) };
        check_swap_chain(hr, &device.device, "IDXGISwapChain3::Present")
    }

    fn create_render_targets(&mut self, device: &ID3D12Device) -> windows::core::Result<()> {
        for i in 0..BACK_BUFFER_COUNT {
            let buffer: ID3D12Resource = unsafe { self.swap_chain.GetBuffer(i)? };
            unsafe { device.CreateRenderTargetView(&buffer, None, self.rtv_handle(i)) };
            self.render_targets[i as usize] = Some(buffer);
        }
        Ok(())
    }

    fn release_render_targets(&mut self) {
        for target in &mut self.render_targets {
            *target = None;
        }
    }
}
