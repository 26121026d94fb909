//! Textures and Vulkan handles shared by the legacy renderer.

use crate::pose::EYE_COUNT;
use ash::vk;
use ash::vk::Handle;

/// What the legacy renderer passes when it shares one of its color targets.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TextureDescriptor {
    pub instance: vk::Instance,
    pub device: vk::Device,
    pub image: vk::Image,
    pub format: vk::Format,
    pub sample_count: vk::SampleCountFlags,
    pub width: u32,
    pub height: u32,
    pub physical_device: vk::PhysicalDevice,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    pub get_device_proc_addr: Option<vk::PFN_vkGetDeviceProcAddr>,
}

/// A stored source texture. The layout is the one the renderer is assumed to
/// leave the image in; it is never transitioned by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTexture {
    pub image: vk::Image,
    pub layout: vk::ImageLayout,
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
}

/// Vulkan handles learned from the first texture that carried them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceContext {
    pub instance: vk::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: vk::Device,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    pub get_device_proc_addr: Option<vk::PFN_vkGetDeviceProcAddr>,
}

impl DeviceContext {
    /// Fills every handle that is still null; handles already known win.
    fn seed(&mut self, desc: &TextureDescriptor) {
        if self.instance.is_null() && !desc.instance.is_null() {
            self.instance = desc.instance;
        }
        if self.physical_device.is_null() && !desc.physical_device.is_null() {
            self.physical_device = desc.physical_device;
        }
        if self.device.is_null() && !desc.device.is_null() {
            self.device = desc.device;
            log::info!("XR Bridge: using Vulkan device {:#x}", desc.device.as_raw());
        }
        if self.queue.is_null() && !desc.queue.is_null() {
            self.queue = desc.queue;
            self.queue_family_index = desc.queue_family_index;
        }
        if self.get_device_proc_addr.is_none() {
            self.get_device_proc_addr = desc.get_device_proc_addr;
        }
    }

    /// Device, queue and loader are all known.
    pub fn is_ready(&self) -> bool {
        !self.device.is_null() && !self.queue.is_null() && self.get_device_proc_addr.is_some()
    }
}

/// Up to one source texture per eye slot.
#[derive(Debug, Clone, Default)]
pub struct TextureSet {
    slots: [Option<SourceTexture>; EYE_COUNT],
}

impl TextureSet {
    pub fn count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn get(&self, slot: usize) -> Option<&SourceTexture> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Lowest-index stored texture; its format drives format negotiation.
    pub fn primary(&self) -> Option<&SourceTexture> {
        self.slots.iter().flatten().next()
    }

    /// Texture feeding `eye`: the single stored texture when only one
    /// exists, else the texture in the eye's own slot.
    pub fn source_for_eye(&self, eye: usize) -> Option<&SourceTexture> {
        if self.count() == 1 {
            self.primary()
        } else {
            self.get(eye)
        }
    }

    fn store(&mut self, slot: usize, texture: SourceTexture) {
        self.slots[slot] = Some(texture);
    }
}

/// Everything the legacy renderer has shared so far.
#[derive(Debug, Clone, Default)]
pub struct SharedTextures {
    pub textures: TextureSet,
    pub device: DeviceContext,
}

impl SharedTextures {
    /// Records a shared texture.
    ///
    /// Device handles are seeded from any well-formed descriptor, but the
    /// texture itself is only kept when it is single-sampled and at least
    /// `min_size` in both dimensions. Returns whether the texture was stored.
    pub fn ingest(
        &mut self,
        index: i32,
        desc: Option<&TextureDescriptor>,
        min_size: (u32, u32),
        layout: vk::ImageLayout,
    ) -> bool {
        let Some(desc) = desc else {
            log::debug!("XR Bridge: ignoring shared texture {index} without descriptor");
            return false;
        };
        let slot = match usize::try_from(index) {
            Ok(slot) if slot < EYE_COUNT => slot,
            _ => {
                log::debug!("XR Bridge: ignoring shared texture with index {index}");
                return false;
            }
        };

        self.device.seed(desc);

        if desc.sample_count != vk::SampleCountFlags::TYPE_1 {
            log::debug!(
                "XR Bridge: texture {index} has {:?} samples, surfaces are single-sampled",
                desc.sample_count
            );
            return false;
        }

        let (min_w, min_h) = min_size;
        if desc.width < min_w || desc.height < min_h {
            log::debug!(
                "XR Bridge: texture {index} is {}x{}, smaller than render size {min_w}x{min_h}",
                desc.width,
                desc.height
            );
            return false;
        }

        self.textures.store(
            slot,
            SourceTexture {
                image: desc.image,
                layout,
                width: desc.width,
                height: desc.height,
                format: desc.format,
            },
        );
        log::info!(
            "XR Bridge: stored texture {index} ({}x{}, {:?})",
            desc.width,
            desc.height,
            desc.format
        );
        true
    }
}
