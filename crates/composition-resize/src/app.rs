use tracing::error;
use tracing::warn;
use windows::core::w;
use windows::core::PCWSTR;
use windows::Win32::Foundation::*;
use windows::Win32::System::LibraryLoader::*;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::composition::CompositionBinding;
use crate::contents::GraphicContents;
use crate::error::RenderError;
use crate::renderer::Renderer;

const WINDOW_CLASS: PCWSTR = w!("CompositionResizeWindow");

/// Everything the window procedure needs, reached through the window's
/// user-data slot instead of process globals.
pub struct AppContext<C: GraphicContents> {
    pub renderer: Renderer,
    pub contents: C,
    pub composition: Option<CompositionBinding>,
}

/// Register the window class, create the window, bind the compositor
/// visual, and pump messages until WM_QUIT. The context must stay at a
/// stable address for the lifetime of the window; the caller keeps it
/// boxed.
pub fn run<C: GraphicContents>(app: &mut AppContext<C>) -> eyre::Result<()> {
    let module = module_handle()?;

    let window_class = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        style: CS_HREDRAW | CS_VREDRAW,
        lpfnWndProc: Some(wndproc::<C>),
        hInstance: module.into(),
        hCursor: unsafe { LoadCursorW(None, IDC_ARROW)? },
        lpszClassName: WINDOW_CLASS,
        ..Default::default()
    };
    let atom = unsafe { RegisterClassExW(&window_class) };
    debug_assert_ne!(atom, 0, "window class registration failed");

    let window_size = (1280, 720);
    let mut window_rect = RECT {
        left: 0,
        top: 0,
        right: window_size.0,
        bottom: window_size.1,
    };
    unsafe { AdjustWindowRect(&mut window_rect, WS_OVERLAPPEDWINDOW, false)? };

    // All presentation happens through the composition visual, so the
    // window never needs a redirection surface.
    let hwnd = unsafe {
        CreateWindowExW(
            WS_EX_NOREDIRECTIONBITMAP,
            WINDOW_CLASS,
            w!("Composition Resize"),
            WS_OVERLAPPEDWINDOW,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            window_rect.right - window_rect.left,
            window_rect.bottom - window_rect.top,
            None,
            None,
            Some(module.into()),
            Some(app as *mut AppContext<C> as _),
        )
    }?;

    // Created here, between window creation and the first show; torn down
    // at WM_DESTROY rather than in a destructor, because destructor-time
    // teardown races window-handle invalidation.
    let binding = CompositionBinding::bind(hwnd, app.renderer.swap_chain())?;
    app.composition = Some(binding);

    unsafe { _ = ShowWindow(hwnd, SW_SHOWNORMAL) };

    loop {
        let mut message = MSG::default();
        if unsafe { GetMessageW(&mut message, None, 0, 0) }.0 <= 0 {
            break;
        }
        unsafe {
            _ = TranslateMessage(&message);
            DispatchMessageW(&message);
        }
    }

    Ok(())
}

extern "system" fn wndproc<C: GraphicContents>(
    window: HWND,
    message: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if message == WM_NCCREATE {
        // Stash the context pointer before the first WM_NCCALCSIZE arrives,
        // so even the creation-time resize reaches the renderer.
        unsafe {
            let create_struct: &CREATESTRUCTW = &*(lparam.0 as *const CREATESTRUCTW);
            SetWindowLongPtrW(window, GWLP_USERDATA, create_struct.lpCreateParams as _);
        }
        return unsafe { DefWindowProcW(window, message, wparam, lparam) };
    }

    let user_data = unsafe { GetWindowLongPtrW(window, GWLP_USERDATA) };
    if user_data == 0 {
        // Messages can arrive before WM_NCCREATE or after WM_DESTROY.
        return unsafe { DefWindowProcW(window, message, wparam, lparam) };
    }
    // Safety: the slot holds the AppContext passed to CreateWindowExW; the
    // caller of run keeps it alive (and pinned) past the message loop.
    let app = unsafe { &mut *(user_data as *mut AppContext<C>) };

    match message {
        WM_NCCALCSIZE => {
            // Let DefWindowProc compute the upcoming client rect first.
            // When wparam is TRUE, lparam points at NCCALCSIZE_PARAMS, but
            // its first member is a RECT with the same meaning as the one
            // lparam carries when wparam is FALSE.
            unsafe { DefWindowProcW(window, message, wparam, lparam) };
            let rect = unsafe { &*(lparam.0 as *const RECT) };
            if let Some(rect) = proposed_client_rect(rect) {
                handle_resize(app, rect);
            }
            // The client area is never preserved across a resize.
            LRESULT(0)
        }
        WM_SIZING => {
            let rect = unsafe { &*(lparam.0 as *const RECT) };
            app.contents.update_layout(
                (rect.right - rect.left).max(0) as u32,
                (rect.bottom - rect.top).max(0) as u32,
            );
            LRESULT(0)
        }
        WM_DESTROY => {
            // Unbind the composition visual while the window handle is
            // still valid, so the window fades away cleanly.
            app.composition = None;
            unsafe { PostQuitMessage(0) };
            LRESULT(0)
        }
        _ => unsafe { DefWindowProcW(window, message, wparam, lparam) },
    }
}

/// The resize must complete inside this call; the OS treats the
/// notification as synchronous. Errors are reported, never propagated into
/// the window procedure's return value.
fn handle_resize<C: GraphicContents>(app: &mut AppContext<C>, rect: RECT) {
    let AppContext {
        renderer, contents, ..
    } = app;
    match renderer.reposition(rect, contents) {
        Ok(()) => {}
        Err(RenderError::DeviceLost { reason }) => {
            // Detected and reported; full device recreation is a known gap.
            warn!("device lost during resize (reason {reason:#010x}); recovery not implemented");
        }
        Err(other) => error!("resize repaint failed: {other}"),
    }
}

/// A proposed rect is only actionable when it has positive area.
fn proposed_client_rect(rect: &RECT) -> Option<RECT> {
    if rect.right > rect.left && rect.bottom > rect.top {
        Some(*rect)
    } else {
        None
    }
}

fn module_handle() -> windows::core::Result<HMODULE> {
    let mut module = HMODULE::default();
    unsafe { GetModuleHandleExW(Default::default(), None, &mut module)? };
    Ok(module)
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
    fn positive_rects_are_actionable() {
        let proposed = proposed_client_rect(&rect(0, 0, 800, 600)).unwrap();
        assert_eq!(proposed.right, 800);
        assert_eq!(proposed.bottom, 600);
    }

    #[test]
    fn degenerate_rects_are_ignored() {
        assert!(proposed_client_rect(&rect(0, 0, 0, 600)).is_none());
        assert!(proposed_client_rect(&rect(0, 0, 800, 0)).is_none());
        assert!(proposed_client_rect(&rect(100, 100, 100, 100)).is_none());
    }

    #[test]
    fn inverted_rects_are_ignored() {
        assert!(proposed_client_rect(&rect(800, 0, 0, 600)).is_none());
        assert!(proposed_client_rect(&rect(0, 600, 800, 0)).is_none());
    }
}
