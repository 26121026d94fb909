//! Copying the legacy renderer's output into the eye surfaces.

pub mod vulkan;

use crate::compositor::{Compositor, ImageRect, ProjectionView};
use crate::error::{BridgeError, Result};
use crate::ingest::{DeviceContext, SourceTexture, TextureSet};
use crate::pose::{EYE_COUNT, ViewPair};
use crate::surface::{EyeSurface, HeldImage};
use ash::vk;
use std::time::Duration;

pub use self::vulkan::VulkanCopier;

/// Source rectangle of a copy. The destination offset is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRegion {
    pub src_x: i32,
    pub src_y: i32,
    pub width: u32,
    pub height: u32,
}

/// Records and submits a raw image copy on the shared device, returning
/// once the GPU has finished it.
pub trait ImageCopier: Send {
    fn copy_image(
        &mut self,
        device: &DeviceContext,
        src: &SourceTexture,
        dst: vk::Image,
        region: CopyRegion,
    ) -> Result<()>;
}

/// Part of `src` that lands in `surface`.
///
/// A texture shared by both eyes and at least twice as wide as the surface
/// is split side by side. Otherwise the whole texture is copied, clamped to
/// the surface extent.
pub fn copy_region(
    eye: usize,
    shared: bool,
    src: &SourceTexture,
    surface: &EyeSurface,
) -> CopyRegion {
    let height = src.height.min(surface.height);
    if shared && src.width >= surface.width.saturating_mul(2) {
        CopyRegion {
            src_x: (eye as u32 * surface.width) as i32,
            src_y: 0,
            width: surface.width,
            height,
        }
    } else {
        CopyRegion {
            src_x: 0,
            src_y: 0,
            width: src.width.min(surface.width),
            height,
        }
    }
}

/// Moves every eye that has a source texture into its surface and fills
/// that eye's projection view. Returns the number of eyes transferred.
///
/// An image left acquired by an earlier failure is reused instead of
/// acquiring another one; it is waited on again if its wait never succeeded.
#[allow(clippy::too_many_arguments)]
pub fn transfer_eyes(
    compositor: &dyn Compositor,
    copier: &mut dyn ImageCopier,
    device: &DeviceContext,
    textures: &TextureSet,
    surfaces: &mut [EyeSurface],
    views: &ViewPair,
    projection: &mut [ProjectionView; EYE_COUNT],
    image_wait_timeout: Duration,
) -> Result<usize> {
    if textures.is_empty() {
        return Err(BridgeError::NoSourceTextures);
    }
    let shared = textures.count() == 1 && surfaces.len() == EYE_COUNT;

    let mut transferred = 0;
    for (eye, surface) in surfaces.iter_mut().enumerate().take(EYE_COUNT) {
        let Some(src) = textures.source_for_eye(eye) else {
            log::debug!("Transfer: no source for eye {eye}");
            continue;
        };

        let index = match surface.held {
            Some(held) => {
                log::warn!("Transfer: eye {eye} still holds image {}, reusing it", held.index);
                held.index
            }
            None => {
                let index = compositor.acquire_image(surface.swapchain)?;
                surface.held = Some(HeldImage {
                    index,
                    waited: false,
                });
                index
            }
        };
        if let Some(held) = surface.held.as_mut().filter(|h| !h.waited) {
            compositor.wait_image(surface.swapchain, image_wait_timeout)?;
            held.waited = true;
        }

        let dst = *surface
            .images
            .get(index as usize)
            .ok_or(BridgeError::ImageIndex(index))?;
        let region = copy_region(eye, shared, src, surface);
        copier.copy_image(device, src, dst, region)?;

        compositor.release_image(surface.swapchain)?;
        surface.held = None;

        projection[eye] = ProjectionView {
            view: views.views[eye],
            swapchain: surface.swapchain,
            image_rect: ImageRect {
                x: 0,
                y: 0,
                width: surface.width as i32,
                height: surface.height as i32,
            },
        };
        transferred += 1;
    }
    Ok(transferred)
}
