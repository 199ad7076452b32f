// Engine error domain
//
// Vulkan status codes collapse into a small fixed set of failures. Backend
// code propagates them through anyhow with a context message, and main turns
// whatever reached the top into a process exit code.

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("initialisation failed")]
    InitFailed,
    #[error("out of host or device memory")]
    OutOfMemory,
    #[error("incompatible Vulkan driver")]
    IncompatibleDriver,
    #[error("no suitable graphics device")]
    InvalidDevice,
    #[error("graphics device lost")]
    DeviceLost,
    #[error("presentation surface lost")]
    SurfaceLost,
    #[error("no valid swap chain surface format")]
    InvalidSwapChainFormat,
    #[error("window already in use by Vulkan or another API")]
    WindowInUse,
}

impl EngineError {
    /// Process exit code. 1 was "ok" in the engine's numbering, so failures
    /// start at 2.
    pub fn exit_code(self) -> u8 {
        match self {
            EngineError::InitFailed => 2,
            EngineError::OutOfMemory => 3,
            EngineError::IncompatibleDriver => 4,
            EngineError::InvalidDevice => 5,
            EngineError::DeviceLost => 6,
            EngineError::SurfaceLost => 7,
            EngineError::InvalidSwapChainFormat => 8,
            EngineError::WindowInUse => 9,
        }
    }
}

impl From<vk::Result> for EngineError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                EngineError::OutOfMemory
            }
            vk::Result::ERROR_INCOMPATIBLE_DRIVER => EngineError::IncompatibleDriver,
            vk::Result::ERROR_DEVICE_LOST => EngineError::DeviceLost,
            vk::Result::ERROR_SURFACE_LOST_KHR => EngineError::SurfaceLost,
            vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => EngineError::WindowInUse,
            _ => EngineError::InitFailed,
        }
    }
}

/// Attach an [`EngineError`] and a message to a failed Vulkan call.
pub trait VkResultExt<T> {
    fn engine_context(self, what: &'static str) -> anyhow::Result<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn engine_context(self, what: &'static str) -> anyhow::Result<T> {
        self.map_err(|result| {
            anyhow::Error::new(EngineError::from(result)).context(format!("{} ({:?})", what, result))
        })
    }
}

/// Exit code for an error chain; errors that never passed through Vulkan
/// count as initialisation failures.
pub fn exit_code_of(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<EngineError>())
        .copied()
        .unwrap_or(EngineError::InitFailed)
        .exit_code()
}

/// Last line logged before the process exits with `code`.
pub fn fatal_line(code: u8, error: &anyhow::Error) -> String {
    format!("Fatal [0x{:08x}]: {:#}", code, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn memory_errors_collapse() {
        assert_eq!(
            EngineError::from(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            EngineError::OutOfMemory
        );
        assert_eq!(
            EngineError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            EngineError::OutOfMemory
        );
    }

    #[test]
    fn surface_and_window_errors() {
        assert_eq!(
            EngineError::from(vk::Result::ERROR_SURFACE_LOST_KHR),
            EngineError::SurfaceLost
        );
        assert_eq!(
            EngineError::from(vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR),
            EngineError::WindowInUse
        );
        assert_eq!(
            EngineError::from(vk::Result::ERROR_DEVICE_LOST),
            EngineError::DeviceLost
        );
    }

    #[test]
    fn unknown_results_are_init_failures() {
        assert_eq!(
            EngineError::from(vk::Result::ERROR_INITIALIZATION_FAILED),
            EngineError::InitFailed
        );
        assert_eq!(
            EngineError::from(vk::Result::ERROR_FRAGMENTED_POOL),
            EngineError::InitFailed
        );
    }

    #[test]
    fn exit_code_survives_context() {
        let result: VkResult<()> = Err(vk::Result::ERROR_INCOMPATIBLE_DRIVER);
        let error = result
            .engine_context("Failed to create instance")
            .context("Failed to initialise renderer")
            .unwrap_err();

        assert_eq!(exit_code_of(&error), 4);
        assert!(format!("{:#}", error).contains("Failed to create instance"));
    }

    #[test]
    fn plain_errors_default_to_init_failed() {
        let error = anyhow::anyhow!("shader file missing");
        assert_eq!(exit_code_of(&error), EngineError::InitFailed.exit_code());
    }

    #[test]
    fn fatal_line_carries_exit_code() {
        let result: VkResult<()> = Err(vk::Result::ERROR_DEVICE_LOST);
        let error = result.engine_context("Failed to submit draw command buffer").unwrap_err();
        let code = exit_code_of(&error);

        assert_eq!(
            fatal_line(code, &error),
            "Fatal [0x00000006]: Failed to submit draw command buffer (ERROR_DEVICE_LOST): graphics device lost"
        );
    }
}
