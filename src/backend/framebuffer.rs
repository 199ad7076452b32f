// Framebuffers - one per swapchain image view

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::Device;
use crate::error::VkResultExt;

pub struct Framebuffers {
    pub framebuffers: Vec<vk::Framebuffer>,
    device: Arc<Device>,
}

impl Framebuffers {
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let mut framebuffers = Self {
            framebuffers: Vec::with_capacity(image_views.len()),
            device,
        };

        for (i, &image_view) in image_views.iter().enumerate() {
            let attachments = [image_view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe {
                framebuffers
                    .device
                    .device
                    .create_framebuffer(&framebuffer_info, None)
            }
            .engine_context("vkCreateFramebuffer failed")
            .with_context(|| format!("Failed to create framebuffer {}", i))?;

            framebuffers.framebuffers.push(framebuffer);
        }

        Ok(framebuffers)
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
