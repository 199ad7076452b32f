// Window creation

use anyhow::{Context, Result};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

use crate::config::WindowConfig;

fn window_attributes(config: &WindowConfig) -> WindowAttributes {
    WindowAttributes::default()
        .with_title(config.title.clone())
        .with_inner_size(PhysicalSize::new(config.width, config.height))
        .with_resizable(config.resizable)
}

pub fn create_window(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Arc<Window>> {
    let window = event_loop
        .create_window(window_attributes(config))
        .context("Failed to create window")?;

    log::info!(
        "Window: {}x{} \"{}\"{}",
        config.width,
        config.height,
        config.title,
        if config.resizable { "" } else { " (fixed size)" }
    );

    Ok(Arc::new(window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::Size;

    #[test]
    fn attributes_follow_config() {
        let attributes = window_attributes(&WindowConfig::default());
        assert_eq!(attributes.title, "Cube Realms");
        assert!(!attributes.resizable);
        assert_eq!(
            attributes.inner_size,
            Some(Size::Physical(PhysicalSize::new(800, 600)))
        );
    }
}
