use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::Graphics::Gdi::*;

use crate::error::fatal;
use crate::error::FatalExt;

/// Intel adapters present "immediately" in a way that is not actually
/// immediate, which shows up as compositor flicker during resize. The
/// workaround is to wait for the occupied output's vertical blank by hand
/// between drawing and the final present.
const SYNC_VENDOR_ID: u32 = 0x8086;

pub struct OutputSync {
    vendor_adapter: Option<IDXGIAdapter1>,
    output: Option<IDXGIOutput>,
}

impl OutputSync {
    pub fn new(adapters: &[IDXGIAdapter1]) -> Self {
        let vendor_adapter = adapters
            .iter()
            .find(|adapter| {
                matches!(unsafe { adapter.GetDesc1() }, Ok(desc) if desc.VendorId == SYNC_VENDOR_ID)
            })
            .cloned();
        Self {
            vendor_adapter,
            output: None,
        }
    }

    /// Re-resolve which display output the window occupies, matching by
    /// the monitor handle under the window's top-left corner. Must run on
    /// every reposition; the window may have moved outputs.
    pub fn locate_output(&mut self, position: &RECT) {
        self.output = None;
        let Some(adapter) = &self.vendor_adapter else {
            return;
        };

        let monitor = unsafe {
            MonitorFromPoint(
                POINT {
                    x: position.left,
                    y: position.top,
                },
                MONITOR_DEFAULTTONULL,
            )
        };
        if monitor.is_invalid() {
            return;
        }

        for i in 0.. {
            let output = match unsafe { adapter.EnumOutputs(i) } {
                Ok(output) => output,
                Err(error) if error.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(error) => fatal("IDXGIAdapter1::EnumOutputs", error.code()),
            };
            let desc = unsafe { output.GetDesc() }.or_fatal("IDXGIOutput::GetDesc");
            if desc.Monitor == monitor {
                self.output = Some(output);
                break;
            }
        }
    }

    /// Block until the located output's next vertical blank; a no-op when
    /// the window is not on an output of the filtered vendor.
    pub fn wait_for_vblank(&self) {
        if let Some(output) = &self.output {
            unsafe { output.WaitForVBlank() }.or_fatal("IDXGIOutput::WaitForVBlank");
        }
    }
}

/// Union of every attached output's desktop rectangle: the virtual
/// desktop extent.
pub fn full_display_rect(adapters: &[IDXGIAdapter1]) -> RECT {
    let mut bounds = RECT::default();
    for adapter in adapters {
        for i in 0.. {
            let output = match unsafe { adapter.EnumOutputs(i) } {
                Ok(output) => output,
                Err(error) if error.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(error) => fatal("IDXGIAdapter1::EnumOutputs", error.code()),
            };
            let desc = unsafe { output.GetDesc() }.or_fatal("IDXGIOutput::GetDesc");
            bounds = union_rects(&bounds, &desc.DesktopCoordinates);
        }
    }
    bounds
}

fn union_rects(a: &RECT, b: &RECT) -> RECT {
    RECT {
        left: a.left.min(b.left),
        top: a.top.min(b.top),
        right: a.right.max(b.right),
        bottom: a.bottom.max(b.bottom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(left: i32, top: i32, right: i32, bottom: i32) -> RECT {
        RECT {
            left,
            top,
            right,
            bottom,
        }
    }

    #[test]
    fn union_spans_side_by_side_outputs() {
        let primary = rect(0, 0, 2560, 1440);
        let secondary = rect(2560, 0, 4480, 1080);
        assert_eq!(
            union_rects(&primary, &secondary),
            rect(0, 0, 4480, 1440)
        );
    }

    #[test]
    fn union_handles_outputs_left_of_the_primary() {
        let primary = rect(0, 0, 1920, 1080);
        let secondary = rect(-1920, -200, 0, 880);
        assert_eq!(
            union_rects(&primary, &secondary),
            rect(-1920, -200, 1920, 1080)
        );
    }
}
