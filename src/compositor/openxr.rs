use super::{Compositor, ProjectionView, RecommendedView, SwapchainDesc};
use crate::dispatch::XrTable;
use crate::error::{BridgeError, Result, check};
use crate::pose::{EYE_COUNT, EyeView, Fov, Pose, ViewFlags, ViewPair};
use crate::timing::FrameTiming;
use ::openxr::sys as xr;
use ash::vk;
use ash::vk::Handle;
use std::ptr;
use std::time::Duration;

/// Handles of an OpenXR session the host application already created.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SessionHandles {
    pub get_instance_proc_addr: Option<xr::pfn::GetInstanceProcAddr>,
    pub instance: xr::Instance,
    pub system_id: xr::SystemId,
    pub session: xr::Session,
    /// Reference space views are located in and layers are submitted in.
    pub space: xr::Space,
}

pub struct OpenXrCompositor {
    xr: XrTable,
    instance: xr::Instance,
    system_id: xr::SystemId,
    session: xr::Session,
    space: xr::Space,
}

impl OpenXrCompositor {
    /// # Safety
    /// `handles` must name a live instance and a session created from it,
    /// and must outlive the returned compositor.
    pub unsafe fn new(handles: &SessionHandles) -> Result<Self> {
        let gipa = handles
            .get_instance_proc_addr
            .ok_or(BridgeError::MissingEntryPoint("xrGetInstanceProcAddr"))?;
        if handles.instance.into_raw() == 0 || handles.session.into_raw() == 0 {
            return Err(BridgeError::NotInitialized);
        }

        let xr = unsafe { XrTable::load(handles.instance, gipa)? };
        log::info!(
            "XR Bridge: attached to session {:#x}",
            handles.session.into_raw()
        );
        Ok(Self {
            xr,
            instance: handles.instance,
            system_id: handles.system_id,
            session: handles.session,
            space: handles.space,
        })
    }
}

/// Two-call enumeration: query the count, then fill a buffer of that size.
fn enumerate<T: Copy>(
    call: &'static str,
    blank: T,
    mut f: impl FnMut(u32, &mut u32, *mut T) -> xr::Result,
) -> Result<Vec<T>> {
    let mut count = 0u32;
    check(call, f(0, &mut count, ptr::null_mut()))?;
    let mut out = vec![blank; count as usize];
    check(call, f(count, &mut count, out.as_mut_ptr()))?;
    out.truncate(count as usize);
    Ok(out)
}

fn blank_view() -> xr::View {
    let mut v: xr::View = unsafe { std::mem::zeroed() };
    v.ty = xr::View::TYPE;
    v
}

fn to_eye_view(v: &xr::View) -> EyeView {
    let o = v.pose.orientation;
    let p = v.pose.position;
    EyeView {
        pose: Pose {
            orientation: [o.x, o.y, o.z, o.w],
            position: [p.x, p.y, p.z],
        },
        fov: Fov {
            angle_left: v.fov.angle_left,
            angle_right: v.fov.angle_right,
            angle_up: v.fov.angle_up,
            angle_down: v.fov.angle_down,
        },
    }
}

fn to_posef(pose: &Pose) -> xr::Posef {
    let [x, y, z, w] = pose.orientation;
    let [px, py, pz] = pose.position;
    xr::Posef {
        orientation: xr::Quaternionf { x, y, z, w },
        position: xr::Vector3f {
            x: px,
            y: py,
            z: pz,
        },
    }
}

fn to_fovf(fov: &Fov) -> xr::Fovf {
    xr::Fovf {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}

fn projection_view(v: &ProjectionView) -> xr::CompositionLayerProjectionView {
    xr::CompositionLayerProjectionView {
        ty: xr::CompositionLayerProjectionView::TYPE,
        next: ptr::null(),
        pose: to_posef(&v.view.pose),
        fov: to_fovf(&v.view.fov),
        sub_image: xr::SwapchainSubImage {
            swapchain: v.swapchain,
            image_rect: xr::Rect2Di {
                offset: xr::Offset2Di {
                    x: v.image_rect.x,
                    y: v.image_rect.y,
                },
                extent: xr::Extent2Di {
                    width: v.image_rect.width,
                    height: v.image_rect.height,
                },
            },
            image_array_index: 0,
        },
    }
}

impl Compositor for OpenXrCompositor {
    fn swapchain_formats(&self) -> Result<Vec<vk::Format>> {
        let raw = enumerate("xrEnumerateSwapchainFormats", 0i64, |cap, count, out| unsafe {
            (self.xr.enumerate_swapchain_formats)(self.session, cap, count, out)
        })?;
        Ok(raw
            .into_iter()
            .map(|f| vk::Format::from_raw(f as i32))
            .collect())
    }

    fn view_configurations(&self) -> Result<Vec<xr::ViewConfigurationType>> {
        enumerate(
            "xrEnumerateViewConfigurations",
            xr::ViewConfigurationType::PRIMARY_MONO,
            |cap, count, out| unsafe {
                (self.xr.enumerate_view_configurations)(
                    self.instance,
                    self.system_id,
                    cap,
                    count,
                    out,
                )
            },
        )
    }

    fn stereo_views(&self) -> Result<Vec<RecommendedView>> {
        let mut blank: xr::ViewConfigurationView = unsafe { std::mem::zeroed() };
        blank.ty = xr::ViewConfigurationView::TYPE;

        let raw = enumerate(
            "xrEnumerateViewConfigurationViews",
            blank,
            |cap, count, out| unsafe {
                (self.xr.enumerate_view_configuration_views)(
                    self.instance,
                    self.system_id,
                    xr::ViewConfigurationType::PRIMARY_STEREO,
                    cap,
                    count,
                    out,
                )
            },
        )?;
        Ok(raw
            .iter()
            .map(|v| RecommendedView {
                width: v.recommended_image_rect_width,
                height: v.recommended_image_rect_height,
            })
            .collect())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<xr::Swapchain> {
        let info = xr::SwapchainCreateInfo {
            ty: xr::SwapchainCreateInfo::TYPE,
            next: ptr::null(),
            create_flags: xr::SwapchainCreateFlags::EMPTY,
            usage_flags: xr::SwapchainUsageFlags::SAMPLED
                | xr::SwapchainUsageFlags::COLOR_ATTACHMENT
                | xr::SwapchainUsageFlags::TRANSFER_DST,
            format: desc.format.as_raw() as i64,
            sample_count: 1,
            width: desc.width,
            height: desc.height,
            face_count: 1,
            array_size: 1,
            mip_count: 1,
        };
        let mut swapchain = xr::Swapchain::from_raw(0);
        check("xrCreateSwapchain", unsafe {
            (self.xr.create_swapchain)(self.session, &info, &mut swapchain)
        })?;
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: xr::Swapchain) -> Result<Vec<vk::Image>> {
        let mut blank: xr::SwapchainImageVulkanKHR = unsafe { std::mem::zeroed() };
        blank.ty = xr::SwapchainImageVulkanKHR::TYPE;

        let raw = enumerate("xrEnumerateSwapchainImages", blank, |cap, count, out| unsafe {
            (self.xr.enumerate_swapchain_images)(
                swapchain,
                cap,
                count,
                out as *mut xr::SwapchainImageBaseHeader,
            )
        })?;
        Ok(raw
            .iter()
            .map(|img| vk::Image::from_raw(img.image as u64))
            .collect())
    }

    fn destroy_swapchain(&self, swapchain: xr::Swapchain) {
        let result = unsafe { (self.xr.destroy_swapchain)(swapchain) };
        if let Err(e) = check("xrDestroySwapchain", result) {
            log::warn!("Surfaces: {e}");
        }
    }

    fn acquire_image(&self, swapchain: xr::Swapchain) -> Result<u32> {
        let info = xr::SwapchainImageAcquireInfo {
            ty: xr::SwapchainImageAcquireInfo::TYPE,
            next: ptr::null(),
        };
        let mut index = 0u32;
        check("xrAcquireSwapchainImage", unsafe {
            (self.xr.acquire_swapchain_image)(swapchain, &info, &mut index)
        })?;
        Ok(index)
    }

    fn wait_image(&self, swapchain: xr::Swapchain, timeout: Duration) -> Result<()> {
        let info = xr::SwapchainImageWaitInfo {
            ty: xr::SwapchainImageWaitInfo::TYPE,
            next: ptr::null(),
            timeout: xr::Duration::from_nanos(timeout.as_nanos().min(i64::MAX as u128) as i64),
        };
        let result = unsafe { (self.xr.wait_swapchain_image)(swapchain, &info) };
        if result == xr::Result::TIMEOUT_EXPIRED {
            return Err(BridgeError::Xr {
                call: "xrWaitSwapchainImage",
                result,
            });
        }
        check("xrWaitSwapchainImage", result)
    }

    fn release_image(&self, swapchain: xr::Swapchain) -> Result<()> {
        let info = xr::SwapchainImageReleaseInfo {
            ty: xr::SwapchainImageReleaseInfo::TYPE,
            next: ptr::null(),
        };
        check("xrReleaseSwapchainImage", unsafe {
            (self.xr.release_swapchain_image)(swapchain, &info)
        })
    }

    fn wait_frame(&self) -> Result<FrameTiming> {
        let info = xr::FrameWaitInfo {
            ty: xr::FrameWaitInfo::TYPE,
            next: ptr::null(),
        };
        let mut state: xr::FrameState = unsafe { std::mem::zeroed() };
        state.ty = xr::FrameState::TYPE;
        check("xrWaitFrame", unsafe {
            (self.xr.wait_frame)(self.session, &info, &mut state)
        })?;
        Ok(FrameTiming {
            predicted_display_time: state.predicted_display_time,
            predicted_display_period: state.predicted_display_period,
            should_render: state.should_render != xr::FALSE,
        })
    }

    fn begin_frame(&self) -> Result<()> {
        let info = xr::FrameBeginInfo {
            ty: xr::FrameBeginInfo::TYPE,
            next: ptr::null(),
        };
        check("xrBeginFrame", unsafe {
            (self.xr.begin_frame)(self.session, &info)
        })
    }

    fn locate_views(&self, display_time: xr::Time) -> Result<ViewPair> {
        let info = xr::ViewLocateInfo {
            ty: xr::ViewLocateInfo::TYPE,
            next: ptr::null(),
            view_configuration_type: xr::ViewConfigurationType::PRIMARY_STEREO,
            display_time,
            space: self.space,
        };
        let mut state: xr::ViewState = unsafe { std::mem::zeroed() };
        state.ty = xr::ViewState::TYPE;
        let mut raw = [blank_view(); EYE_COUNT];
        let mut count = 0u32;

        check("xrLocateViews", unsafe {
            (self.xr.locate_views)(
                self.session,
                &info,
                &mut state,
                EYE_COUNT as u32,
                &mut count,
                raw.as_mut_ptr(),
            )
        })?;
        if count as usize != EYE_COUNT {
            return Err(BridgeError::ViewCount(count as usize));
        }

        let flags = state.view_state_flags;
        Ok(ViewPair {
            views: [to_eye_view(&raw[0]), to_eye_view(&raw[1])],
            flags: ViewFlags {
                position_valid: flags.contains(xr::ViewStateFlags::POSITION_VALID),
                orientation_valid: flags.contains(xr::ViewStateFlags::ORIENTATION_VALID),
            },
        })
    }

    fn end_frame(&self, display_time: xr::Time, views: &[ProjectionView]) -> Result<()> {
        let layer_views: Vec<_> = views.iter().map(projection_view).collect();
        let layer = xr::CompositionLayerProjection {
            ty: xr::CompositionLayerProjection::TYPE,
            next: ptr::null(),
            layer_flags: xr::CompositionLayerFlags::EMPTY,
            space: self.space,
            view_count: layer_views.len() as u32,
            views: layer_views.as_ptr(),
        };
        let layer_ptr = &layer as *const xr::CompositionLayerProjection
            as *const xr::CompositionLayerBaseHeader;

        let info = xr::FrameEndInfo {
            ty: xr::FrameEndInfo::TYPE,
            next: ptr::null(),
            display_time,
            environment_blend_mode: xr::EnvironmentBlendMode::OPAQUE,
            layer_count: if views.is_empty() { 0 } else { 1 },
            layers: if views.is_empty() {
                ptr::null()
            } else {
                &layer_ptr
            },
        };
        check("xrEndFrame", unsafe {
            (self.xr.end_frame)(self.session, &info)
        })
    }
}
