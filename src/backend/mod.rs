// Backend module - Vulkan abstraction layer
//
// One owning wrapper per Vulkan object. Children hold an `Arc` to the
// object they were created from, so dropping in reverse creation order
// is enforced by ownership.

pub mod buffer;
pub mod command;
pub mod device;
pub mod framebuffer;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::{VertexBuffer, VertexData};
pub use command::{CommandBuffers, CommandPool};
pub use device::Device;
pub use framebuffer::Framebuffers;
pub use instance::Instance;
pub use pipeline::GraphicsPipeline;
pub use surface::Surface;
pub use swapchain::{Swapchain, SwapchainStatus};
pub use sync::FrameSync;
