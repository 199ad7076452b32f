// =============================================================================
// APPLICATION - window + renderer driven by the winit event loop
// =============================================================================

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::config::Config;
use crate::renderer::{should_draw, Renderer};
use crate::window::create_window;

/// Frames presented since the last title update
struct FpsCounter {
    frame_count: u32,
    last_update: Instant,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            frame_count: 0,
            last_update: Instant::now(),
        }
    }

    /// Count a frame; yields frames per second about once a second.
    fn tick(&mut self, now: Instant) -> Option<f32> {
        self.frame_count += 1;
        let elapsed = now.duration_since(self.last_update).as_secs_f32();
        if elapsed < 1.0 {
            return None;
        }
        let fps = self.frame_count as f32 / elapsed;
        self.frame_count = 0;
        self.last_update = now;
        Some(fps)
    }
}

/// The renderer is declared before the window so it is dropped first.
pub struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    fps: FpsCounter,
    /// First fatal error; ends the event loop
    error: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            fps: FpsCounter::new(),
            error: None,
        }
    }

    /// Consume the app after the event loop returned.
    pub fn into_result(mut self) -> Result<()> {
        // Tear the renderer down before reporting
        self.renderer = None;
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Keep the first error for `main` to report, then stop the loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = create_window(event_loop, &self.config.window)?;
        let renderer = Renderer::new(&window, &self.config)?;
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return Ok(());
        };

        let size = window.inner_size();
        let presented = renderer.draw(size.width, size.height)?;

        if presented && self.config.debug.show_fps {
            if let Some(fps) = self.fps.tick(Instant::now()) {
                window.set_title(&format!("{} - {:.0} FPS", self.config.window.title, fps));
            }
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e.context("Failed to initialise application"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(renderer) = &self.renderer {
                    if let Err(e) = renderer.wait_idle() {
                        log::warn!("Device did not go idle before shutdown: {:#}", e);
                    }
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = &mut self.renderer {
                    renderer.resized();
                }
                // Restarts the frame loop after a minimize
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e.context("Failed to draw frame"));
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Keep the frame loop running while there is something to draw into.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            let size = window.inner_size();
            if should_draw(size.width, size.height) {
                window.request_redraw();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fps_reported_once_per_second() {
        let start = Instant::now();
        let mut fps = FpsCounter {
            frame_count: 0,
            last_update: start,
        };

        for i in 1..60 {
            assert_eq!(fps.tick(start + Duration::from_millis(i * 10)), None);
        }
        let reported = fps.tick(start + Duration::from_secs(2)).unwrap();
        assert!((reported - 30.0).abs() < 0.01);
        assert_eq!(fps.frame_count, 0);
    }

    #[test]
    fn errors_surface_from_into_result() {
        let mut app = App::new(Config::default());
        assert!(App::new(Config::default()).into_result().is_ok());

        app.error = Some(anyhow::anyhow!("device lost"));
        assert!(app.into_result().is_err());
    }
}
