use crate::error::{BridgeError, Result};
use ash::vk;
use openxr::sys as xr;
use std::os::raw::c_void;

// ── Raw Vulkan function pointer types ────────────────────────────────────────

pub type PfnCreateCommandPool = unsafe extern "system" fn(
    vk::Device,
    *const vk::CommandPoolCreateInfo,
    *const vk::AllocationCallbacks,
    *mut vk::CommandPool,
) -> vk::Result;

pub type PfnDestroyCommandPool =
    unsafe extern "system" fn(vk::Device, vk::CommandPool, *const vk::AllocationCallbacks);

pub type PfnAllocateCommandBuffers = unsafe extern "system" fn(
    vk::Device,
    *const vk::CommandBufferAllocateInfo,
    *mut vk::CommandBuffer,
) -> vk::Result;

pub type PfnFreeCommandBuffers =
    unsafe extern "system" fn(vk::Device, vk::CommandPool, u32, *const vk::CommandBuffer);

pub type PfnBeginCommandBuffer =
    unsafe extern "system" fn(vk::CommandBuffer, *const vk::CommandBufferBeginInfo) -> vk::Result;

pub type PfnEndCommandBuffer = unsafe extern "system" fn(vk::CommandBuffer) -> vk::Result;

pub type PfnCmdPipelineBarrier = unsafe extern "system" fn(
    vk::CommandBuffer,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
    vk::DependencyFlags,
    u32,
    *const vk::MemoryBarrier,
    u32,
    *const vk::BufferMemoryBarrier,
    u32,
    *const vk::ImageMemoryBarrier,
);

pub type PfnCmdCopyImage = unsafe extern "system" fn(
    vk::CommandBuffer,
    vk::Image,
    vk::ImageLayout,
    vk::Image,
    vk::ImageLayout,
    u32,
    *const vk::ImageCopy,
);

pub type PfnQueueSubmit =
    unsafe extern "system" fn(vk::Queue, u32, *const vk::SubmitInfo, vk::Fence) -> vk::Result;

pub type PfnQueueWaitIdle = unsafe extern "system" fn(vk::Queue) -> vk::Result;

// ── Loader helpers ───────────────────────────────────────────────────────────

pub unsafe fn load_device<F: Copy>(
    gdpa: vk::PFN_vkGetDeviceProcAddr,
    device: vk::Device,
    name: &[u8],
) -> Option<F> {
    let raw: *const c_void = unsafe { std::mem::transmute(gdpa(device, name.as_ptr() as _)) };
    (!raw.is_null()).then(|| unsafe { std::mem::transmute_copy(&raw) })
}

pub unsafe fn load_xr<F: Copy>(
    gipa: xr::pfn::GetInstanceProcAddr,
    instance: xr::Instance,
    name: &[u8],
) -> Option<F> {
    let mut raw: Option<xr::pfn::VoidFunction> = None;
    let result = unsafe { gipa(instance, name.as_ptr() as _, &mut raw) };
    if result.into_raw() < 0 {
        return None;
    }
    raw.map(|f| unsafe { std::mem::transmute_copy(&f) })
}

macro_rules! req {
    ($opt:expr, $name:literal) => {
        $opt.ok_or(BridgeError::MissingEntryPoint($name))?
    };
}

// ── Tables ───────────────────────────────────────────────────────────────────

/// Device-level entry points used by the one-shot transfer path.
pub struct DeviceTable {
    pub handle: vk::Device,
    pub create_command_pool: PfnCreateCommandPool,
    pub destroy_command_pool: PfnDestroyCommandPool,
    pub allocate_command_buffers: PfnAllocateCommandBuffers,
    pub free_command_buffers: PfnFreeCommandBuffers,
    pub begin_command_buffer: PfnBeginCommandBuffer,
    pub end_command_buffer: PfnEndCommandBuffer,
    pub cmd_pipeline_barrier: PfnCmdPipelineBarrier,
    pub cmd_copy_image: PfnCmdCopyImage,
    pub queue_submit: PfnQueueSubmit,
    pub queue_wait_idle: PfnQueueWaitIdle,
}

impl DeviceTable {
    pub unsafe fn load(device: vk::Device, gdpa: vk::PFN_vkGetDeviceProcAddr) -> Result<Self> {
        macro_rules! ld {
            ($name:literal, $ty:ty) => {
                req!(
                    unsafe { load_device::<$ty>(gdpa, device, concat!($name, "\0").as_bytes()) },
                    $name
                )
            };
        }
        Ok(Self {
            handle: device,
            create_command_pool: ld!("vkCreateCommandPool", PfnCreateCommandPool),
            destroy_command_pool: ld!("vkDestroyCommandPool", PfnDestroyCommandPool),
            allocate_command_buffers: ld!("vkAllocateCommandBuffers", PfnAllocateCommandBuffers),
            free_command_buffers: ld!("vkFreeCommandBuffers", PfnFreeCommandBuffers),
            begin_command_buffer: ld!("vkBeginCommandBuffer", PfnBeginCommandBuffer),
            end_command_buffer: ld!("vkEndCommandBuffer", PfnEndCommandBuffer),
            cmd_pipeline_barrier: ld!("vkCmdPipelineBarrier", PfnCmdPipelineBarrier),
            cmd_copy_image: ld!("vkCmdCopyImage", PfnCmdCopyImage),
            queue_submit: ld!("vkQueueSubmit", PfnQueueSubmit),
            queue_wait_idle: ld!("vkQueueWaitIdle", PfnQueueWaitIdle),
        })
    }
}

/// OpenXR entry points the compositor backend calls.
pub struct XrTable {
    pub enumerate_swapchain_formats: xr::pfn::EnumerateSwapchainFormats,
    pub enumerate_view_configurations: xr::pfn::EnumerateViewConfigurations,
    pub enumerate_view_configuration_views: xr::pfn::EnumerateViewConfigurationViews,
    pub create_swapchain: xr::pfn::CreateSwapchain,
    pub destroy_swapchain: xr::pfn::DestroySwapchain,
    pub enumerate_swapchain_images: xr::pfn::EnumerateSwapchainImages,
    pub acquire_swapchain_image: xr::pfn::AcquireSwapchainImage,
    pub wait_swapchain_image: xr::pfn::WaitSwapchainImage,
    pub release_swapchain_image: xr::pfn::ReleaseSwapchainImage,
    pub wait_frame: xr::pfn::WaitFrame,
    pub begin_frame: xr::pfn::BeginFrame,
    pub end_frame: xr::pfn::EndFrame,
    pub locate_views: xr::pfn::LocateViews,
}

impl XrTable {
    pub unsafe fn load(instance: xr::Instance, gipa: xr::pfn::GetInstanceProcAddr) -> Result<Self> {
        macro_rules! lx {
            ($name:literal, $ty:ty) => {
                req!(
                    unsafe { load_xr::<$ty>(gipa, instance, concat!($name, "\0").as_bytes()) },
                    $name
                )
            };
        }
        Ok(Self {
            enumerate_swapchain_formats: lx!(
                "xrEnumerateSwapchainFormats",
                xr::pfn::EnumerateSwapchainFormats
            ),
            enumerate_view_configurations: lx!(
                "xrEnumerateViewConfigurations",
                xr::pfn::EnumerateViewConfigurations
            ),
            enumerate_view_configuration_views: lx!(
                "xrEnumerateViewConfigurationViews",
                xr::pfn::EnumerateViewConfigurationViews
            ),
            create_swapchain: lx!("xrCreateSwapchain", xr::pfn::CreateSwapchain),
            destroy_swapchain: lx!("xrDestroySwapchain", xr::pfn::DestroySwapchain),
            enumerate_swapchain_images: lx!(
                "xrEnumerateSwapchainImages",
                xr::pfn::EnumerateSwapchainImages
            ),
            acquire_swapchain_image: lx!("xrAcquireSwapchainImage", xr::pfn::AcquireSwapchainImage),
            wait_swapchain_image: lx!("xrWaitSwapchainImage", xr::pfn::WaitSwapchainImage),
            release_swapchain_image: lx!("xrReleaseSwapchainImage", xr::pfn::ReleaseSwapchainImage),
            wait_frame: lx!("xrWaitFrame", xr::pfn::WaitFrame),
            begin_frame: lx!("xrBeginFrame", xr::pfn::BeginFrame),
            end_frame: lx!("xrEndFrame", xr::pfn::EndFrame),
            locate_views: lx!("xrLocateViews", xr::pfn::LocateViews),
        })
    }
}
