use tracing::info;
use tracing::warn;
use windows::core::Interface;
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::error::RenderError;
use crate::error::RenderResult;

/// Process-wide GPU device and command queue. Every other GPU object in
/// this crate is created from this context and must not outlive it.
pub struct DeviceContext {
    pub command_queue: ID3D12CommandQueue,
    pub adapters: Vec<IDXGIAdapter1>,
    pub dxgi_factory: IDXGIFactory4,
    // Declared last so dependent objects above drop first.
    pub device: ID3D12Device,
}

impl DeviceContext {
    pub fn create() -> RenderResult<Self> {
        let mut factory_flags = DXGI_CREATE_FACTORY_FLAGS(0);
        if cfg!(debug_assertions) {
            unsafe {
                let mut debug: Option<ID3D12Debug> = None;
                if let Some(debug) = D3D12GetDebugInterface(&mut debug).ok().and(debug) {
                    debug.EnableDebugLayer();
                    factory_flags |= DXGI_CREATE_FACTORY_DEBUG;
                    info!("D3D12 debug layer enabled");
                } else {
                    warn!("D3D12 debug layer unavailable");
                }
            }
        }

        let dxgi_factory: IDXGIFactory4 = unsafe { CreateDXGIFactory2(factory_flags) }
            .map_err(|source| RenderError::creation("CreateDXGIFactory2", source))?;

        let adapters = enumerate_adapters(&dxgi_factory)?;
        let adapter = pick_render_adapter(&adapters)?;

        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(adapter, D3D_FEATURE_LEVEL_11_0, &mut device) }
            .map_err(|source| RenderError::creation("D3D12CreateDevice", source))?;
        let device = device.unwrap();

        if cfg!(debug_assertions) {
            // Promote validation findings to a break so they cannot scroll
            // past unnoticed.
            if let Ok(info_queue) = device.cast::<ID3D12InfoQueue>() {
                unsafe {
                    info_queue
                        .SetBreakOnSeverity(D3D12_MESSAGE_SEVERITY_CORRUPTION, true)
                        .ok();
                    info_queue
                        .SetBreakOnSeverity(D3D12_MESSAGE_SEVERITY_ERROR, true)
                        .ok();
                    info_queue
                        .SetBreakOnSeverity(D3D12_MESSAGE_SEVERITY_WARNING, true)
                        .ok();
                }
            }
        }

        let command_queue: ID3D12CommandQueue = unsafe {
            device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                ..Default::default()
            })
        }
        .map_err(|source| RenderError::creation("CreateCommandQueue", source))?;

        Ok(Self {
            command_queue,
            adapters,
            dxgi_factory,
            device,
        })
    }
}

fn enumerate_adapters(factory: &IDXGIFactory4) -> RenderResult<Vec<IDXGIAdapter1>> {
    let mut adapters = Vec::new();
    for i in 0.. {
        match unsafe { factory.EnumAdapters1(i) } {
            Ok(adapter) => adapters.push(adapter),
            Err(error) if error.code() == DXGI_ERROR_NOT_FOUND => break,
            Err(source) => return Err(RenderError::creation("EnumAdapters1", source)),
        }
    }
    Ok(adapters)
}

/// First hardware adapter that supports Direct3D 12 Feature Level 11.0.
fn pick_render_adapter(adapters: &[IDXGIAdapter1]) -> RenderResult<&IDXGIAdapter1> {
    for adapter in adapters {
        let desc = unsafe { adapter.GetDesc1() }
            .map_err(|source| RenderError::creation("IDXGIAdapter1::GetDesc1", source))?;

        if (DXGI_ADAPTER_FLAG(desc.Flags as i32) & DXGI_ADAPTER_FLAG_SOFTWARE)
            != DXGI_ADAPTER_FLAG_NONE
        {
            continue;
        }

        if unsafe {
            D3D12CreateDevice(
                adapter,
                D3D_FEATURE_LEVEL_11_0,
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
        }
        .is_ok()
        {
            info!(
                "using hardware adapter: {}",
                String::from_utf16_lossy(&desc.Description)
            );
            return Ok(adapter);
        }
    }

    Err(RenderError::creation(
        "adapter selection",
        windows::core::Error::new(
            DXGI_ERROR_NOT_FOUND,
            "no suitable D3D12 hardware adapter found",
        ),
    ))
}
