// =============================================================================
// CUBE REALMS - tutorial Vulkan renderer
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, window)                                 │
// │    └── Renderer                                                 │
// │          └── Instance + Surface + Device                        │
// │                └── Swapchain, Pipeline, Framebuffers            │
// │                      └── Command buffers, vertex buffer, sync   │
// └─────────────────────────────────────────────────────────────────┘
//
// =============================================================================

mod app;
mod backend;
mod config;
mod error;
mod logger;
mod renderer;
mod window;

use std::process::ExitCode;
use winit::event_loop::EventLoop;

use app::App;
use config::Config;

fn main() -> ExitCode {
    let config = Config::load();
    logger::init(&config.debug);
    log::info!("Starting Cube Realms");

    match run(config) {
        Ok(()) => {
            log::info!("Cleanup complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = error::exit_code_of(&e);
            log::error!("{}", error::fatal_line(code, &e));
            ExitCode::from(code)
        }
    }
}

fn run(config: Config) -> anyhow::Result<()> {
    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    app.into_result()
}
