//! Common utilities for integration tests.
//!
//! Tests run against the dummy device everywhere and additionally against a
//! real Vulkan device when a loader and a physical device are present.

use gpu_upload::{DummyDevice, DummyDeviceConfig, RenderContext};

/// Initialize logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Dummy device with the given offset alignment.
pub fn dummy_device(alignment: u64) -> DummyDevice {
    DummyDevice::with_config(DummyDeviceConfig::default().with_offset_alignment(alignment))
}

/// Context over a dummy device.
pub fn dummy_context(alignment: u64, frames_in_flight: u32) -> RenderContext<DummyDevice> {
    init_logging();
    RenderContext::new(dummy_device(alignment)).with_frames_in_flight(frames_in_flight)
}

/// Deterministic byte pattern.
#[allow(dead_code)]
pub fn generate_test_pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

// ============================================================================
// Vulkan Harness
// ============================================================================

#[cfg(feature = "vulkan-backend")]
pub use vulkan::VulkanHarness;

#[cfg(feature = "vulkan-backend")]
mod vulkan {
    use std::ffi::CString;

    use ash::vk;
    use gpu_upload::VulkanDevice;

    /// Instance and logical device for tests that need a real GPU.
    ///
    /// Drop order matters: every buffer created from [`device`](Self::device)
    /// must be gone before the harness is dropped.
    #[allow(dead_code)]
    pub struct VulkanHarness {
        _entry: ash::Entry,
        instance: ash::Instance,
        device: ash::Device,
        buffer_device: VulkanDevice,
    }

    #[allow(dead_code)]
    impl VulkanHarness {
        /// Create a harness, or `None` when no Vulkan device is usable.
        pub fn new() -> Option<Self> {
            let entry = unsafe { ash::Entry::load() }.ok()?;

            let app_name = CString::new("gpu-upload-tests").ok()?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .api_version(vk::API_VERSION_1_0);
            let create_info = vk::InstanceCreateInfo::default().application_info(&app_info);
            let instance = unsafe { entry.create_instance(&create_info, None) }.ok()?;

            let Some((physical_device, queue_family)) = pick_device(&instance) else {
                unsafe { instance.destroy_instance(None) };
                return None;
            };

            let queue_priorities = [1.0f32];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];
            let device_info =
                vk::DeviceCreateInfo::default().queue_create_infos(&queue_create_infos);

            let device = match unsafe { instance.create_device(physical_device, &device_info, None) }
            {
                Ok(device) => device,
                Err(e) => {
                    log::warn!("Failed to create Vulkan device: {:?}", e);
                    unsafe { instance.destroy_instance(None) };
                    return None;
                }
            };

            let buffer_device = VulkanDevice::new(&instance, physical_device, device.clone());
            Some(Self {
                _entry: entry,
                instance,
                device,
                buffer_device,
            })
        }

        /// Buffer device over the harness's logical device.
        pub fn device(&self) -> VulkanDevice {
            self.buffer_device.clone()
        }
    }

    impl Drop for VulkanHarness {
        fn drop(&mut self) {
            unsafe {
                let _ = self.device.device_wait_idle();
                self.device.destroy_device(None);
                self.instance.destroy_instance(None);
            }
        }
    }

    fn pick_device(instance: &ash::Instance) -> Option<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }.ok()?;
        devices.into_iter().find_map(|physical_device| {
            let families = unsafe {
                instance.get_physical_device_queue_family_properties(physical_device)
            };
            (!families.is_empty()).then_some((physical_device, 0))
        })
    }
}
