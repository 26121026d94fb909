//! In-process stand-ins for the compositor and the GPU copy path.

use crate::compositor::{Compositor, ProjectionView, RecommendedView, SwapchainDesc};
use crate::error::{BridgeError, Result};
use crate::ingest::{DeviceContext, SourceTexture};
use crate::pose::{EyeView, Fov, Pose, ViewFlags, ViewPair};
use crate::timing::FrameTiming;
use crate::transfer::{CopyRegion, ImageCopier};
use ::openxr::sys as xr;
use ash::vk;
use ash::vk::Handle;
use std::collections::HashMap;
use std::mem::discriminant;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const IMAGES_PER_SWAPCHAIN: u64 = 3;
const PERIOD_NS: i64 = 11_111_111;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Call {
    SwapchainFormats,
    ViewConfigurations,
    StereoViews,
    CreateSwapchain,
    SwapchainImages(xr::Swapchain),
    DestroySwapchain(xr::Swapchain),
    Acquire(xr::Swapchain),
    WaitImage(xr::Swapchain),
    Release(xr::Swapchain),
    WaitFrame,
    BeginFrame,
    LocateViews,
    /// Number of projection views submitted.
    EndFrame(usize),
}

impl Call {
    fn same_kind(&self, other: &Call) -> bool {
        discriminant(self) == discriminant(other)
    }
}

#[derive(Debug, Clone, Copy)]
struct Failure {
    kind: Call,
    /// Successful calls of this kind still allowed before the failure.
    skip: usize,
}

struct MockSwapchain {
    images: Vec<vk::Image>,
    next: u32,
    held: bool,
    waited: bool,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub display_time: xr::Time,
    pub views: Vec<ProjectionView>,
}

struct MockState {
    formats: Vec<vk::Format>,
    configurations: Vec<xr::ViewConfigurationType>,
    views: Vec<RecommendedView>,
    located: ViewPair,
    display_time: i64,
    calls: Vec<Call>,
    failures: Vec<Failure>,
    next_handle: u64,
    swapchains: HashMap<u64, MockSwapchain>,
    submissions: Vec<Submission>,
    order_violations: usize,
}

/// Scriptable compositor recording every call it receives.
pub struct MockCompositor {
    state: Mutex<MockState>,
}

impl MockCompositor {
    /// A stereo headset with two 1440x1600 views reporting tracked poses.
    pub fn stereo() -> Self {
        let eye = |x: f32| EyeView {
            pose: Pose {
                orientation: Pose::IDENTITY.orientation,
                position: [x, 1.6, 0.0],
            },
            fov: Fov {
                angle_left: -0.8,
                angle_right: 0.8,
                angle_up: 0.8,
                angle_down: -0.8,
            },
        };
        Self {
            state: Mutex::new(MockState {
                formats: vec![vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM],
                configurations: vec![xr::ViewConfigurationType::PRIMARY_STEREO],
                views: vec![
                    RecommendedView {
                        width: 1440,
                        height: 1600,
                    };
                    2
                ],
                located: ViewPair {
                    views: [eye(-0.032), eye(0.032)],
                    flags: ViewFlags::TRACKED,
                },
                display_time: 0,
                calls: Vec::new(),
                failures: Vec::new(),
                next_handle: 1,
                swapchains: HashMap::new(),
                submissions: Vec::new(),
                order_violations: 0,
            }),
        }
    }

    pub fn with_formats(self, formats: &[vk::Format]) -> Self {
        self.lock().formats = formats.to_vec();
        self
    }

    pub fn with_configurations(self, configurations: &[xr::ViewConfigurationType]) -> Self {
        self.lock().configurations = configurations.to_vec();
        self
    }

    pub fn with_views(self, views: &[RecommendedView]) -> Self {
        self.lock().views = views.to_vec();
        self
    }

    pub fn set_view_flags(&self, flags: ViewFlags) {
        self.lock().located.flags = flags;
    }

    /// Makes the next call of `kind` fail.
    pub fn fail_next(&self, kind: Call) {
        self.fail_after(kind, 0);
    }

    /// Lets `skip` calls of `kind` succeed, then fails the one after.
    pub fn fail_after(&self, kind: Call, skip: usize) {
        self.lock().failures.push(Failure { kind, skip });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn count(&self, kind: Call) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.same_kind(&kind))
            .count()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    pub fn live_swapchains(&self) -> usize {
        self.lock().swapchains.len()
    }

    /// Acquires on a swapchain that still holds an image, waits without a
    /// held image, and releases of an image that was never waited on.
    pub fn order_violations(&self) -> usize {
        self.lock().order_violations
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `call` and reports whether a scripted failure fires for it.
    fn enter(&self, call: Call) -> Result<std::sync::MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        state.calls.push(call);

        let pos = state.failures.iter().position(|f| f.kind.same_kind(&call));
        if let Some(pos) = pos {
            if state.failures[pos].skip == 0 {
                state.failures.remove(pos);
                return Err(BridgeError::Xr {
                    call: "mock",
                    result: xr::Result::ERROR_RUNTIME_FAILURE,
                });
            }
            state.failures[pos].skip -= 1;
        }
        Ok(state)
    }
}

impl Compositor for MockCompositor {
    fn swapchain_formats(&self) -> Result<Vec<vk::Format>> {
        Ok(self.enter(Call::SwapchainFormats)?.formats.clone())
    }

    fn view_configurations(&self) -> Result<Vec<xr::ViewConfigurationType>> {
        Ok(self.enter(Call::ViewConfigurations)?.configurations.clone())
    }

    fn stereo_views(&self) -> Result<Vec<RecommendedView>> {
        Ok(self.enter(Call::StereoViews)?.views.clone())
    }

    fn create_swapchain(&self, _desc: &SwapchainDesc) -> Result<xr::Swapchain> {
        let mut state = self.enter(Call::CreateSwapchain)?;
        let raw = state.next_handle;
        state.next_handle += 1;
        let images = (0..IMAGES_PER_SWAPCHAIN)
            .map(|i| vk::Image::from_raw(raw * 0x100 + i))
            .collect();
        state.swapchains.insert(
            raw,
            MockSwapchain {
                images,
                next: 0,
                held: false,
                waited: false,
            },
        );
        Ok(xr::Swapchain::from_raw(raw))
    }

    fn swapchain_images(&self, swapchain: xr::Swapchain) -> Result<Vec<vk::Image>> {
        let state = self.enter(Call::SwapchainImages(swapchain))?;
        Ok(state
            .swapchains
            .get(&swapchain.into_raw())
            .map(|s| s.images.clone())
            .unwrap_or_default())
    }

    fn destroy_swapchain(&self, swapchain: xr::Swapchain) {
        let mut state = self.lock();
        state.calls.push(Call::DestroySwapchain(swapchain));
        state.swapchains.remove(&swapchain.into_raw());
    }

    fn acquire_image(&self, swapchain: xr::Swapchain) -> Result<u32> {
        let mut state = self.enter(Call::Acquire(swapchain))?;
        let mut violation = false;
        let index = match state.swapchains.get_mut(&swapchain.into_raw()) {
            Some(sc) => {
                violation = sc.held;
                sc.held = true;
                sc.waited = false;
                let index = sc.next;
                sc.next = (sc.next + 1) % sc.images.len() as u32;
                index
            }
            None => 0,
        };
        if violation {
            state.order_violations += 1;
        }
        Ok(index)
    }

    fn wait_image(&self, swapchain: xr::Swapchain, _timeout: Duration) -> Result<()> {
        let mut state = self.enter(Call::WaitImage(swapchain))?;
        let held = match state.swapchains.get_mut(&swapchain.into_raw()) {
            Some(sc) if sc.held => {
                sc.waited = true;
                true
            }
            _ => false,
        };
        if !held {
            state.order_violations += 1;
        }
        Ok(())
    }

    fn release_image(&self, swapchain: xr::Swapchain) -> Result<()> {
        let mut state = self.enter(Call::Release(swapchain))?;
        let ready = state
            .swapchains
            .get_mut(&swapchain.into_raw())
            .map(|sc| {
                let ready = sc.held && sc.waited;
                sc.held = false;
                sc.waited = false;
                ready
            })
            .unwrap_or(false);
        if !ready {
            state.order_violations += 1;
        }
        Ok(())
    }

    fn wait_frame(&self) -> Result<FrameTiming> {
        let mut state = self.enter(Call::WaitFrame)?;
        state.display_time += PERIOD_NS;
        Ok(FrameTiming {
            predicted_display_time: xr::Time::from_nanos(state.display_time),
            predicted_display_period: xr::Duration::from_nanos(PERIOD_NS),
            should_render: true,
        })
    }

    fn begin_frame(&self) -> Result<()> {
        self.enter(Call::BeginFrame).map(drop)
    }

    fn locate_views(&self, _display_time: xr::Time) -> Result<ViewPair> {
        Ok(self.enter(Call::LocateViews)?.located)
    }

    fn end_frame(&self, display_time: xr::Time, views: &[ProjectionView]) -> Result<()> {
        let mut state = self.enter(Call::EndFrame(views.len()))?;
        state.submissions.push(Submission {
            display_time,
            views: views.to_vec(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecordedCopy {
    pub src: vk::Image,
    pub dst: vk::Image,
    pub region: CopyRegion,
}

/// Copier that only records what it was asked to do.
#[derive(Default, Clone)]
pub struct RecordingCopier {
    copies: Arc<Mutex<Vec<RecordedCopy>>>,
    fail: bool,
}

impl RecordingCopier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn copies(&self) -> Vec<RecordedCopy> {
        self.copies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ImageCopier for RecordingCopier {
    fn copy_image(
        &mut self,
        _device: &DeviceContext,
        src: &SourceTexture,
        dst: vk::Image,
        region: CopyRegion,
    ) -> Result<()> {
        if self.fail {
            return Err(BridgeError::Vk(vk::Result::ERROR_DEVICE_LOST));
        }
        self.copies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCopy {
                src: src.image,
                dst,
                region,
            });
        Ok(())
    }
}

pub fn source_texture(width: u32, height: u32) -> SourceTexture {
    SourceTexture {
        image: vk::Image::from_raw(0x2000),
        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        width,
        height,
        format: vk::Format::B8G8R8A8_UNORM,
    }
}
