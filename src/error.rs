use openxr::sys as xr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Vulkan error: {0}")]
    Vk(#[from] ash::vk::Result),
    #[error("{call} failed: {result:?}")]
    Xr {
        call: &'static str,
        result: xr::Result,
    },
    #[error("required entry point missing: {0}")]
    MissingEntryPoint(&'static str),
    #[error("no session is active")]
    NotInitialized,
    #[error("compositor reported no swapchain formats")]
    NoSwapchainFormats,
    #[error("stereo view configuration not supported")]
    StereoUnsupported,
    #[error("expected 2 stereo views, compositor reported {0}")]
    ViewCount(usize),
    #[error("end of frame requested without a started frame")]
    NoFrameStarted,
    #[error("no shared textures have been stored")]
    NoSourceTextures,
    #[error("no Vulkan device has been provided with a shared texture")]
    MissingDevice,
    #[error("compositor handed out image index {0} outside the swapchain")]
    ImageIndex(u32),
    #[error("poses did not become fresh within {0:?}")]
    PoseTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Maps a raw OpenXR result onto `Result`, keeping the name of the call.
pub fn check(call: &'static str, result: xr::Result) -> Result<()> {
    if result.into_raw() < 0 {
        Err(BridgeError::Xr { call, result })
    } else {
        Ok(())
    }
}
