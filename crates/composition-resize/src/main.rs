pub mod app;
pub mod cache;
pub mod composition;
pub mod contents;
pub mod device;
pub mod draw;
pub mod error;
pub mod frame_ring;
pub mod handle;
pub mod output;
pub mod renderer;
pub mod swap_chain;

use app::AppContext;
use contents::TriangleContents;
use renderer::Renderer;
use tracing::info;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_target(false)
        .init();

    let renderer = Renderer::new()?;
    // Boxed so the pointer handed to the window procedure stays stable.
    let mut app = Box::new(AppContext {
        renderer,
        contents: TriangleContents::new(),
        composition: None,
    });

    // Size the chain to the whole virtual desktop up front; the first
    // client-rect notification trims it to the real window.
    let initial = app.renderer.initial_position();
    let AppContext {
        renderer, contents, ..
    } = &mut *app;
    renderer.reposition(initial, contents)?;

    app::run(&mut app)?;

    info!("shutting down");
    Ok(())
}
