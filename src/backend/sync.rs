// Synchronization primitives
//
// One frame in flight: the image-available semaphore orders rendering after
// acquisition, render-finished orders presentation after rendering. The
// renderer stalls on the queue after every frame, so no fence is needed.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use super::Device;
use crate::error::VkResultExt;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    device: Arc<Device>,
}

impl FrameSync {
    pub fn new(device: Arc<Device>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        let image_available = unsafe { device.device.create_semaphore(&semaphore_info, None) }
            .engine_context("Failed to create image-available semaphore")?;

        let render_finished = match unsafe { device.device.create_semaphore(&semaphore_info, None) } {
            Ok(semaphore) => semaphore,
            Err(e) => {
                unsafe { device.device.destroy_semaphore(image_available, None) };
                return Err(e).engine_context("Failed to create render-finished semaphore");
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            device,
        })
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_semaphore(self.render_finished, None);
        }
    }
}
