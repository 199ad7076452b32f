// =============================================================================
// RENDERER - owns every Vulkan object and draws the frame
// =============================================================================
//
// FRAME FLOW (one frame in flight):
// 1. Acquire swapchain image      -> signals image_available
// 2. Submit that image's commands -> waits image_available, signals render_finished
// 3. Present                      -> waits render_finished
// 4. Stall until the present queue is idle
//
// Field order is drop order: swapchain-dependent objects first, the
// instance last.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::HasRawDisplayHandle;
use std::path::PathBuf;
use std::sync::Arc;
use winit::window::Window;

use crate::backend::command::DrawTargets;
use crate::backend::{
    CommandBuffers, CommandPool, Device, FrameSync, Framebuffers, GraphicsPipeline, Instance,
    Surface, Swapchain, SwapchainStatus, VertexBuffer, VertexData,
};
use crate::config::Config;
use crate::error::VkResultExt;

/// Settings the swapchain-dependent objects are rebuilt from
struct RenderSettings {
    present_mode: vk::PresentModeKHR,
    clear_color: [f32; 4],
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,
}

/// Everything that has to be rebuilt when the swapchain changes
struct SwapchainTargets {
    command_buffers: CommandBuffers,
    _framebuffers: Framebuffers,
    _pipeline: GraphicsPipeline,
    swapchain: Swapchain,
}

impl SwapchainTargets {
    fn new(
        device: &Arc<Device>,
        surface: &Surface,
        settings: &RenderSettings,
        command_pool: &Arc<CommandPool>,
        vertex_buffer: &VertexBuffer,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let swapchain = Swapchain::new(device.clone(), surface, settings.present_mode, width, height)?;

        let pipeline = GraphicsPipeline::new(
            device.clone(),
            swapchain.format,
            swapchain.extent,
            &settings.vertex_shader,
            &settings.fragment_shader,
        )
        .context("Failed to create graphics pipeline")?;

        let framebuffers = Framebuffers::new(
            device.clone(),
            pipeline.render_pass,
            &swapchain.image_views,
            swapchain.extent,
        )?;

        let command_buffers = CommandBuffers::record(
            command_pool.clone(),
            &DrawTargets {
                pipeline: &pipeline,
                framebuffers: &framebuffers,
                extent: swapchain.extent,
                vertex_buffer,
                clear_color: settings.clear_color,
            },
        )?;

        Ok(Self {
            command_buffers,
            _framebuffers: framebuffers,
            _pipeline: pipeline,
            swapchain,
        })
    }
}

/// A minimized window has a zero-sized framebuffer and nothing to draw into.
pub fn should_draw(width: u32, height: u32) -> bool {
    width != 0 && height != 0
}

/// Whether a frame reached the screen, and whether the swapchain must be
/// rebuilt before the next one.
fn frame_outcome(acquired: SwapchainStatus, presented: SwapchainStatus) -> (bool, bool) {
    let shown = acquired != SwapchainStatus::OutOfDate && presented != SwapchainStatus::OutOfDate;
    let rebuild = acquired != SwapchainStatus::Optimal || presented != SwapchainStatus::Optimal;
    (shown, rebuild)
}

pub struct Renderer {
    sync: FrameSync,
    targets: Option<SwapchainTargets>,
    vertex_buffer: VertexBuffer,
    command_pool: Arc<CommandPool>,
    device: Arc<Device>,
    surface: Surface,
    _instance: Arc<Instance>,

    settings: RenderSettings,
    /// Set when the window was resized or presentation reported a stale
    /// swapchain
    needs_rebuild: bool,
    wait_stages: [vk::PipelineStageFlags; 1],
}

impl Renderer {
    pub fn new(window: &Window, config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let vertex_data = VertexData::from_interleaved(&config.graphics.vertices)
            .context("Invalid [graphics] vertices")?;

        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let instance = Arc::new(Instance::new(window.raw_display_handle(), enable_validation)?);
        let surface = Surface::new(instance.clone(), window)?;
        let device = Device::new(instance.clone(), &surface)?;

        let settings = RenderSettings {
            present_mode: config.present_mode(),
            clear_color: config.graphics.clear_color,
            vertex_shader: config.graphics.vertex_shader.clone(),
            fragment_shader: config.graphics.fragment_shader.clone(),
        };

        let command_pool = CommandPool::new(device.clone())?;
        let vertex_buffer = VertexBuffer::new(device.clone(), &vertex_data)?;

        let size = window.inner_size();
        let targets = SwapchainTargets::new(
            &device,
            &surface,
            &settings,
            &command_pool,
            &vertex_buffer,
            size.width,
            size.height,
        )?;

        let sync = FrameSync::new(device.clone())?;

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            sync,
            targets: Some(targets),
            vertex_buffer,
            command_pool,
            device,
            surface,
            _instance: instance,
            settings,
            needs_rebuild: false,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
        })
    }

    /// The window changed size; rebuild before the next frame.
    pub fn resized(&mut self) {
        self.needs_rebuild = true;
    }

    /// Draw one frame. Returns false when nothing was presented (minimized
    /// window or stale swapchain).
    pub fn draw(&mut self, width: u32, height: u32) -> Result<bool> {
        if !should_draw(width, height) {
            return Ok(false);
        }

        if self.needs_rebuild {
            self.rebuild(width, height)?;
        }

        let targets = self
            .targets
            .as_ref()
            .context("Swapchain not initialized")?;

        let (image_index, acquired) = targets
            .swapchain
            .acquire_next_image(u64::MAX, self.sync.image_available)?;

        if acquired == SwapchainStatus::OutOfDate {
            self.needs_rebuild = true;
            return Ok(false);
        }

        let wait_semaphores = [self.sync.image_available];
        let signal_semaphores = [self.sync.render_finished];
        let command_buffers = [targets.command_buffers.buffers[image_index as usize]];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                vk::Fence::null(),
            )
        }
        .engine_context("Failed to submit draw command buffer")?;

        let presented = targets.swapchain.present(
            self.device.present_queue,
            image_index,
            &signal_semaphores,
        )?;

        // Full stall: the semaphores and command buffers are reused next frame
        unsafe { self.device.device.queue_wait_idle(self.device.present_queue) }
            .engine_context("Failed waiting for present queue")?;

        let (shown, rebuild) = frame_outcome(acquired, presented);
        self.needs_rebuild |= rebuild;
        Ok(shown)
    }

    fn rebuild(&mut self, width: u32, height: u32) -> Result<()> {
        log::info!("Rebuilding swapchain for {}x{}", width, height);
        self.device.wait_idle()?;

        // The surface only supports one swapchain at a time
        self.targets = None;
        self.targets = Some(SwapchainTargets::new(
            &self.device,
            &self.surface,
            &self.settings,
            &self.command_pool,
            &self.vertex_buffer,
            width,
            height,
        )?);
        self.needs_rebuild = false;
        Ok(())
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        // Nothing may be destroyed while the GPU still uses it
        let _ = self.device.wait_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimal_frame_needs_no_rebuild() {
        assert_eq!(
            frame_outcome(SwapchainStatus::Optimal, SwapchainStatus::Optimal),
            (true, false)
        );
    }

    #[test]
    fn suboptimal_frame_is_shown_then_rebuilt() {
        assert_eq!(
            frame_outcome(SwapchainStatus::Suboptimal, SwapchainStatus::Optimal),
            (true, true)
        );
        assert_eq!(
            frame_outcome(SwapchainStatus::Optimal, SwapchainStatus::Suboptimal),
            (true, true)
        );
    }

    #[test]
    fn out_of_date_present_is_not_shown() {
        assert_eq!(
            frame_outcome(SwapchainStatus::Optimal, SwapchainStatus::OutOfDate),
            (false, true)
        );
        assert_eq!(
            frame_outcome(SwapchainStatus::OutOfDate, SwapchainStatus::Optimal),
            (false, true)
        );
    }

    #[test]
    fn minimized_window_skips_drawing() {
        assert!(!should_draw(0, 600));
        assert!(!should_draw(800, 0));
        assert!(should_draw(800, 600));
    }
}
