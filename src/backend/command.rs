// Command pool and pre-recorded command buffers
//
// The scene never changes, so each swapchain image gets one command buffer
// recorded up front and resubmitted every frame.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::{Device, Framebuffers, GraphicsPipeline, VertexBuffer};
use crate::error::VkResultExt;

pub struct CommandPool {
    pub pool: vk::CommandPool,
    device: Arc<Device>,
}

impl CommandPool {
    /// Pool on the graphics queue family
    pub fn new(device: Arc<Device>) -> Result<Arc<Self>> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_families.graphics);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .engine_context("vkCreateCommandPool failed")?;

        Ok(Arc::new(Self { pool, device }))
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_command_pool(self.pool, None) };
    }
}

/// Everything a draw command buffer refers to
pub struct DrawTargets<'a> {
    pub pipeline: &'a GraphicsPipeline,
    pub framebuffers: &'a Framebuffers,
    pub extent: vk::Extent2D,
    pub vertex_buffer: &'a VertexBuffer,
    pub clear_color: [f32; 4],
}

pub struct CommandBuffers {
    pub buffers: Vec<vk::CommandBuffer>,
    pool: Arc<CommandPool>,
}

impl CommandBuffers {
    /// Allocate and record one primary command buffer per framebuffer.
    pub fn record(pool: Arc<CommandPool>, targets: &DrawTargets) -> Result<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(targets.framebuffers.framebuffers.len() as u32);

        let buffers = unsafe { pool.device.device.allocate_command_buffers(&alloc_info) }
            .engine_context("Failed to allocate command buffer memory")?;

        // Freed by Drop if recording fails part way
        let command_buffers = Self { buffers, pool };

        for (i, (&cmd, &framebuffer)) in command_buffers
            .buffers
            .iter()
            .zip(&targets.framebuffers.framebuffers)
            .enumerate()
        {
            command_buffers
                .record_one(cmd, framebuffer, targets)
                .with_context(|| format!("Failed to record command buffer {}", i))?;
        }

        log::info!("Recorded {} command buffers", command_buffers.buffers.len());
        Ok(command_buffers)
    }

    fn record_one(
        &self,
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        targets: &DrawTargets,
    ) -> Result<()> {
        let device = &self.pool.device.device;

        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe { device.begin_command_buffer(cmd, &begin_info) }
            .engine_context("vkBeginCommandBuffer failed")?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: targets.clear_color,
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(targets.pipeline.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: targets.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                targets.pipeline.pipeline,
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[targets.vertex_buffer.buffer], &[0]);
            device.cmd_draw(cmd, targets.vertex_buffer.vertex_count, 1, 0, 0);
            device.cmd_end_render_pass(cmd);
        }

        unsafe { device.end_command_buffer(cmd) }.engine_context("Failed to record command buffer")
    }
}

impl Drop for CommandBuffers {
    fn drop(&mut self) {
        unsafe {
            self.pool
                .device
                .device
                .free_command_buffers(self.pool.pool, &self.buffers);
        }
    }
}
