use thiserror::Error;
use tracing::error;
use windows::core::HRESULT;
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;

pub type RenderResult<T, E = RenderError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Any failure while standing up the device, queue, heaps, fence, or
    /// swap chain. There is no partial-success state; startup aborts.
    #[error("device creation failed ({stage}): {source}")]
    DeviceCreation {
        stage: &'static str,
        #[source]
        source: windows::core::Error,
    },

    /// Device removed or reset. Detected and reported; the device
    /// recreation recovery path is not implemented.
    #[error("device lost: reason code {reason:#010x}")]
    DeviceLost { reason: i32 },

    /// Shader text is externally supplied content, so a failed compile is
    /// reported with the compiler's diagnostics rather than crashing.
    #[error("shader compilation failed: {diagnostics}")]
    ShaderCompilation { diagnostics: String },

    #[error(transparent)]
    Content(#[from] ContentError),
}

impl RenderError {
    pub fn creation(stage: &'static str, source: windows::core::Error) -> Self {
        Self::DeviceCreation { stage, source }
    }
}

/// Raised by a content provider when it cannot produce vertices or shader
/// source.
#[derive(Debug, Error)]
#[error("content provider error: {0}")]
pub struct ContentError(pub String);

/// How a swap-chain HRESULT is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrClass {
    Success,
    /// The window is occluded. A normal desktop state, not an error.
    Occluded,
    /// Device removed or reset; recoverable in principle by recreating the
    /// device, so this must never take the fatal path.
    DeviceLost,
    /// Everything else indicates a programming error, not a runtime
    /// condition.
    Fatal,
}

pub fn classify_hr(hr: HRESULT) -> HrClass {
    if hr == DXGI_STATUS_OCCLUDED {
        return HrClass::Occluded;
    }
    if hr.is_ok() {
        return HrClass::Success;
    }
    if hr == DXGI_ERROR_DEVICE_REMOVED || hr == DXGI_ERROR_DEVICE_RESET {
        return HrClass::DeviceLost;
    }
    HrClass::Fatal
}

/// Apply the swap-chain error policy to an HRESULT from ResizeBuffers or
/// Present.
pub fn check_swap_chain(hr: HRESULT, device: &ID3D12Device, what: &'static str) -> RenderResult<()> {
    match classify_hr(hr) {
        HrClass::Success | HrClass::Occluded => Ok(()),
        HrClass::DeviceLost => {
            let reason = if hr == DXGI_ERROR_DEVICE_REMOVED {
                unsafe { device.GetDeviceRemovedReason() }
                    .err()
                    .map(|error| error.code().0)
                    .unwrap_or(hr.0)
            } else {
                hr.0
            };
            Err(RenderError::DeviceLost { reason })
        }
        HrClass::Fatal => fatal(what, hr),
    }
}

/// Fail fast on a GPU call that has no recoverable meaning. Continuing in
/// an inconsistent GPU state hides the original defect.
pub fn fatal(what: &str, hr: HRESULT) -> ! {
    error!("fatal GPU error in {what}: {hr:?}");
    std::process::abort();
}

/// Fail fast on a broken internal invariant.
pub fn fatal_state(what: &str) -> ! {
    error!("fatal renderer state: {what}");
    std::process::abort();
}

pub trait FatalExt<T> {
    /// Unwrap a GPU call whose failure would mean an unreachable state.
    fn or_fatal(self, what: &'static str) -> T;
}

impl<T> FatalExt<T> for windows::core::Result<T> {
    fn or_fatal(self, what: &'static str) -> T {
        match self {
            Ok(value) => value,
            Err(error) => fatal(what, error.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_is_success() {
        assert_eq!(classify_hr(S_OK), HrClass::Success);
    }

    #[test]
    fn occluded_presents_are_not_errors() {
        assert_eq!(classify_hr(DXGI_STATUS_OCCLUDED), HrClass::Occluded);
    }

    #[test]
    fn device_removed_and_reset_are_recoverable() {
        assert_eq!(classify_hr(DXGI_ERROR_DEVICE_REMOVED), HrClass::DeviceLost);
        assert_eq!(classify_hr(DXGI_ERROR_DEVICE_RESET), HrClass::DeviceLost);
    }

    #[test]
    fn other_failures_are_fatal() {
        assert_eq!(classify_hr(E_FAIL), HrClass::Fatal);
        assert_eq!(classify_hr(DXGI_ERROR_INVALID_CALL), HrClass::Fatal);
    }
}
