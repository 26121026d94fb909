//! The compositor calls the engine makes, behind one trait so the pacing
//! and transfer logic does not depend on a live OpenXR runtime.

pub mod openxr;

use crate::error::Result;
use crate::pose::{EyeView, ViewPair};
use crate::timing::FrameTiming;
use ::openxr::sys as xr;
use ash::vk;
use std::time::Duration;

pub use self::openxr::{OpenXrCompositor, SessionHandles};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendedView {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// One eye of the projection layer handed to the compositor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionView {
    pub view: EyeView,
    pub swapchain: xr::Swapchain,
    pub image_rect: ImageRect,
}

impl Default for ProjectionView {
    fn default() -> Self {
        Self {
            view: EyeView::default(),
            swapchain: xr::Swapchain::from_raw(0),
            image_rect: ImageRect::default(),
        }
    }
}

pub trait Compositor: Send + Sync {
    fn swapchain_formats(&self) -> Result<Vec<vk::Format>>;

    fn view_configurations(&self) -> Result<Vec<xr::ViewConfigurationType>>;

    /// Recommended image sizes of the primary stereo configuration.
    fn stereo_views(&self) -> Result<Vec<RecommendedView>>;

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<xr::Swapchain>;

    fn swapchain_images(&self, swapchain: xr::Swapchain) -> Result<Vec<vk::Image>>;

    fn destroy_swapchain(&self, swapchain: xr::Swapchain);

    fn acquire_image(&self, swapchain: xr::Swapchain) -> Result<u32>;

    /// Fails when the image is not available within `timeout`.
    fn wait_image(&self, swapchain: xr::Swapchain, timeout: Duration) -> Result<()>;

    fn release_image(&self, swapchain: xr::Swapchain) -> Result<()>;

    /// Blocks until the compositor wants the next frame.
    fn wait_frame(&self) -> Result<FrameTiming>;

    fn begin_frame(&self) -> Result<()>;

    fn locate_views(&self, display_time: xr::Time) -> Result<ViewPair>;

    /// Ends the open frame. An empty `views` slice submits no layers.
    fn end_frame(&self, display_time: xr::Time, views: &[ProjectionView]) -> Result<()>;
}
