// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (suitability checks, prefer discrete GPU)
// - Queue family selection (graphics + present)
// - Logical device + queue creation

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

use super::{Instance, Surface};
use crate::error::{EngineError, VkResultExt};

fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Queue families used by the renderer. They may be the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Pick graphics and present families, preferring one family that does
    /// both. `supports_present` is asked per family index.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> Result<bool>,
    ) -> Result<Option<Self>> {
        let mut graphics = None;
        let mut present = None;

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            let is_graphics =
                family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let can_present = family.queue_count > 0 && supports_present(index)?;

            if is_graphics && can_present {
                return Ok(Some(Self {
                    graphics: index,
                    present: index,
                }));
            }
            if is_graphics && graphics.is_none() {
                graphics = Some(index);
            }
            if can_present && present.is_none() {
                present = Some(index);
            }
        }

        Ok(graphics
            .zip(present)
            .map(|(graphics, present)| Self { graphics, present }))
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// What a physical device can do with a given surface
#[derive(Debug, Default, Clone)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(surface: &Surface, physical_device: vk::PhysicalDevice) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface
                    .loader
                    .get_physical_device_surface_capabilities(physical_device, surface.surface)
                    .engine_context("Failed to query surface capabilities")?,
                formats: surface
                    .loader
                    .get_physical_device_surface_formats(physical_device, surface.surface)
                    .engine_context("Failed to query surface formats")?,
                present_modes: surface
                    .loader
                    .get_physical_device_surface_present_modes(physical_device, surface.surface)
                    .engine_context("Failed to query present modes")?,
            })
        }
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Required extensions the device does not advertise.
pub fn missing_extensions<'a>(
    available: &[vk::ExtensionProperties],
    required: &[&'a CStr],
) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|wanted| {
            !available
                .iter()
                .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == *wanted)
        })
        .collect()
}

fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 1,
    }
}

/// Highest scoring candidate; the first one wins a tie.
fn pick_best<T>(candidates: impl IntoIterator<Item = (T, vk::PhysicalDeviceType)>) -> Option<T> {
    let mut best: Option<(T, u32)> = None;
    for (candidate, device_type) in candidates {
        let score = device_type_score(device_type);
        if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Logical device wrapper with automatic cleanup
pub struct Device {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilyIndices,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub instance: Arc<Instance>,
}

impl Device {
    pub fn new(instance: Arc<Instance>, surface: &Surface) -> Result<Arc<Self>> {
        let (physical_device, queue_families) = pick_physical_device(&instance, surface)?;

        let properties = unsafe { instance.instance.get_physical_device_properties(physical_device) };
        let memory_properties = unsafe {
            instance
                .instance
                .get_physical_device_memory_properties(physical_device)
        };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::debug!("Queue families: {:?}", queue_families);

        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<_> = required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .instance
                .create_device(physical_device, &create_info, None)
        }
        .engine_context("Failed to create logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        Ok(Arc::new(Self {
            device,
            physical_device,
            queue_families,
            graphics_queue,
            present_queue,
            memory_properties,
            instance,
        }))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.engine_context("Failed waiting for device idle")
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

fn pick_physical_device(
    instance: &Instance,
    surface: &Surface,
) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
    let devices = unsafe { instance.instance.enumerate_physical_devices() }
        .engine_context("Failed to enumerate physical devices")?;

    if devices.is_empty() {
        return Err(anyhow::Error::new(EngineError::IncompatibleDriver))
            .context("Failed to find device with Vulkan support");
    }

    let mut suitable = Vec::new();
    for device in devices {
        if let Some(families) = check_device(instance, surface, device)? {
            let props = unsafe { instance.instance.get_physical_device_properties(device) };
            suitable.push(((device, families), props.device_type));
        }
    }

    pick_best(suitable)
        .ok_or_else(|| anyhow::Error::new(EngineError::InvalidDevice))
        .context("Failed to find suitable device")
}

/// Queue families of `device` when it can drive the renderer, `None` otherwise.
fn check_device(
    instance: &Instance,
    surface: &Surface,
    device: vk::PhysicalDevice,
) -> Result<Option<QueueFamilyIndices>> {
    let name = unsafe {
        let props = instance.instance.get_physical_device_properties(device);
        CStr::from_ptr(props.device_name.as_ptr())
            .to_string_lossy()
            .into_owned()
    };

    let available = unsafe { instance.instance.enumerate_device_extension_properties(device) }
        .engine_context("Failed to enumerate device extensions")?;
    let missing = missing_extensions(&available, &required_device_extensions());
    if !missing.is_empty() {
        log::debug!("{} is missing device extensions {:?}", name, missing);
        return Ok(None);
    }

    let families =
        unsafe { instance.instance.get_physical_device_queue_family_properties(device) };
    let indices = QueueFamilyIndices::find(&families, |index| unsafe {
        surface
            .loader
            .get_physical_device_surface_support(device, index, surface.surface)
            .engine_context("Failed to query present support")
    })?;
    let Some(indices) = indices else {
        log::debug!("{} has no graphics/present queue families", name);
        return Ok(None);
    };

    if !SwapchainSupport::query(surface, device)?.is_adequate() {
        log::debug!("{} has no usable swap chain support", name);
        return Ok(None);
    }

    Ok(Some(indices))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, src) in props.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = *src as std::ffi::c_char;
        }
        props
    }

    #[test]
    fn prefers_family_doing_both() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let found = QueueFamilyIndices::find(&families, |i| Ok(i != 0)).unwrap();
        assert_eq!(
            found,
            Some(QueueFamilyIndices {
                graphics: 2,
                present: 2
            })
        );
        assert!(found.unwrap().is_shared());
    }

    #[test]
    fn splits_graphics_and_present() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let found = QueueFamilyIndices::find(&families, |i| Ok(i == 1))
            .unwrap()
            .unwrap();
        assert_eq!(found.graphics, 0);
        assert_eq!(found.present, 1);
        assert_eq!(found.unique(), vec![0, 1]);
    }

    #[test]
    fn no_present_family_is_unsuitable() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(QueueFamilyIndices::find(&families, |_| Ok(false)).unwrap(), None);
    }

    #[test]
    fn present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(QueueFamilyIndices::find(&families, |_| anyhow::bail!("surface lost")).is_err());
    }

    #[test]
    fn every_required_extension_must_be_present() {
        let swapchain = khr::Swapchain::name();
        let available = [extension(c"VK_KHR_swapchain_mutable_format")];
        assert_eq!(missing_extensions(&available, &[swapchain]), vec![swapchain]);

        let available = [extension(c"VK_KHR_maintenance1"), extension(swapchain)];
        assert!(missing_extensions(&available, &[swapchain]).is_empty());
    }

    #[test]
    fn discrete_gpu_wins() {
        let picked = pick_best([
            ("llvmpipe", vk::PhysicalDeviceType::CPU),
            ("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU),
            ("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU),
            ("dgpu2", vk::PhysicalDeviceType::DISCRETE_GPU),
        ]);
        assert_eq!(picked, Some("dgpu"));
        assert_eq!(pick_best(Vec::<((), vk::PhysicalDeviceType)>::new()), None);
    }

    #[test]
    fn swapchain_support_needs_formats_and_modes() {
        let mut support = SwapchainSupport::default();
        assert!(!support.is_adequate());
        support.formats.push(vk::SurfaceFormatKHR::default());
        assert!(!support.is_adequate());
        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.is_adequate());
    }
}
