use windows::Win32::Foundation::*;
use windows::Win32::Graphics::DirectComposition::*;
use windows::Win32::Graphics::Dxgi::*;

use crate::error::RenderError;
use crate::error::RenderResult;

/// Attaches the swap chain's output to the window through a
/// DirectComposition visual. Creation and teardown are deliberately
/// asymmetric: the binding is created once between window creation and the
/// first show, and torn down by dropping it at WM_DESTROY, while the
/// window handle is still valid.
pub struct CompositionBinding {
    // Field order is release order: visual, then target, then device.
    _visual: IDCompositionVisual,
    _target: IDCompositionTarget,
    _device: IDCompositionDevice,
}

impl CompositionBinding {
    pub fn bind(hwnd: HWND, swap_chain: &IDXGISwapChain3) -> RenderResult<Self> {
        // No DXGI device is passed: the composition device only carries
        // content produced elsewhere, it allocates nothing itself.
        let device: IDCompositionDevice = unsafe {
            DCompositionCreateDevice(None::<&IDXGIDevice>)
        }
        .map_err(|source| RenderError::creation("DCompositionCreateDevice", source))?;

        let target = unsafe { device.CreateTargetForHwnd(hwnd, false) }
            .map_err(|source| RenderError::creation("CreateTargetForHwnd", source))?;
        let visual = unsafe { device.CreateVisual() }
            .map_err(|source| RenderError::creation("CreateVisual", source))?;

        unsafe { target.SetRoot(&visual) }
            .map_err(|source| RenderError::creation("IDCompositionTarget::SetRoot", source))?;
        unsafe { visual.SetContent(swap_chain) }
            .map_err(|source| RenderError::creation("IDCompositionVisual::SetContent", source))?;
        unsafe { device.Commit() }
            .map_err(|source| RenderError::creation("IDCompositionDevice::Commit", source))?;

        Ok(Self {
            _visual: visual,
            _target: target,
            _device: device,
        })
    }
}
