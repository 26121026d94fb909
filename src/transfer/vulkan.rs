use super::{CopyRegion, ImageCopier};
use crate::dispatch::DeviceTable;
use crate::error::{BridgeError, Result};
use crate::ingest::{DeviceContext, SourceTexture};
use ash::vk;
use ash::vk::Handle;

/// Copies on the legacy renderer's own device and queue, one transient
/// command buffer per copy.
#[derive(Default)]
pub struct VulkanCopier {
    dt: Option<DeviceTable>,
}

impl VulkanCopier {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&mut self, device: &DeviceContext) -> Result<&DeviceTable> {
        let gdpa = match device.get_device_proc_addr {
            Some(gdpa) if device.is_ready() => gdpa,
            _ => return Err(BridgeError::MissingDevice),
        };

        let stale = self
            .dt
            .as_ref()
            .is_none_or(|dt| dt.handle != device.device);
        if stale {
            let dt = unsafe { DeviceTable::load(device.device, gdpa)? };
            log::info!(
                "Transfer: loaded device table for {:#x}",
                device.device.as_raw()
            );
            self.dt = Some(dt);
        }
        self.dt.as_ref().ok_or(BridgeError::MissingDevice)
    }
}

impl ImageCopier for VulkanCopier {
    fn copy_image(
        &mut self,
        device: &DeviceContext,
        src: &SourceTexture,
        dst: vk::Image,
        region: CopyRegion,
    ) -> Result<()> {
        let dt = self.table(device)?;
        let cmd = OneShot::begin(dt, device.queue_family_index)?;

        unsafe {
            let to_transfer_dst = vk::ImageMemoryBarrier {
                s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
                p_next: std::ptr::null(),
                src_access_mask: vk::AccessFlags::empty(),
                dst_access_mask: vk::AccessFlags::TRANSFER_WRITE,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                image: dst,
                subresource_range: color_subresource_range(),
                _marker: std::marker::PhantomData,
            };

            (dt.cmd_pipeline_barrier)(
                cmd.buf,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                0,
                std::ptr::null(),
                0,
                std::ptr::null(),
                1,
                &to_transfer_dst,
            );

            let copy = vk::ImageCopy {
                src_subresource: color_subresource_layers(),
                src_offset: vk::Offset3D {
                    x: region.src_x,
                    y: region.src_y,
                    z: 0,
                },
                dst_subresource: color_subresource_layers(),
                dst_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                extent: vk::Extent3D {
                    width: region.width,
                    height: region.height,
                    depth: 1,
                },
            };

            (dt.cmd_copy_image)(
                cmd.buf,
                src.image,
                src.layout,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                1,
                &copy,
            );

            let to_color_attachment = vk::ImageMemoryBarrier {
                s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
                p_next: std::ptr::null(),
                src_access_mask: vk::AccessFlags::TRANSFER_WRITE,
                dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ,
                old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                image: dst,
                subresource_range: color_subresource_range(),
                _marker: std::marker::PhantomData,
            };

            (dt.cmd_pipeline_barrier)(
                cmd.buf,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::DependencyFlags::empty(),
                0,
                std::ptr::null(),
                0,
                std::ptr::null(),
                1,
                &to_color_attachment,
            );
        }

        cmd.submit_and_wait(device.queue)
    }
}

/// Transient pool with a single primary buffer. Dropping it frees both.
struct OneShot<'a> {
    dt: &'a DeviceTable,
    pool: vk::CommandPool,
    buf: vk::CommandBuffer,
}

impl<'a> OneShot<'a> {
    fn begin(dt: &'a DeviceTable, queue_family: u32) -> Result<Self> {
        let dev = dt.handle;
        let mut cmd = Self {
            dt,
            pool: vk::CommandPool::null(),
            buf: vk::CommandBuffer::null(),
        };

        unsafe {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT);
            (dt.create_command_pool)(dev, &pool_info, std::ptr::null(), &mut cmd.pool)
                .result()
                .map_err(BridgeError::Vk)?;

            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(cmd.pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            (dt.allocate_command_buffers)(dev, &alloc_info, &mut cmd.buf)
                .result()
                .map_err(BridgeError::Vk)?;

            // Entry points come straight from vkGetDeviceProcAddr, so the
            // loader never stamps its dispatch key on the new buffer.
            let dev_key = *(dev.as_raw() as *const usize);
            *(cmd.buf.as_raw() as *mut usize) = dev_key;

            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            (dt.begin_command_buffer)(cmd.buf, &begin)
                .result()
                .map_err(BridgeError::Vk)?;
        }
        Ok(cmd)
    }

    fn submit_and_wait(self, queue: vk::Queue) -> Result<()> {
        let dt = self.dt;
        unsafe {
            (dt.end_command_buffer)(self.buf)
                .result()
                .map_err(BridgeError::Vk)?;

            let submit =
                vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&self.buf));
            (dt.queue_submit)(queue, 1, &submit, vk::Fence::null())
                .result()
                .map_err(BridgeError::Vk)?;

            (dt.queue_wait_idle)(queue)
                .result()
                .map_err(BridgeError::Vk)?;
        }
        Ok(())
    }
}

impl Drop for OneShot<'_> {
    fn drop(&mut self) {
        let dt = self.dt;
        unsafe {
            if !self.buf.is_null() {
                (dt.free_command_buffers)(dt.handle, self.pool, 1, &self.buf);
            }
            if !self.pool.is_null() {
                (dt.destroy_command_pool)(dt.handle, self.pool, std::ptr::null());
            }
        }
    }
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn color_subresource_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    }
}
