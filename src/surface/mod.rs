//! Per-eye compositor swapchains.

use crate::compositor::{Compositor, RecommendedView, SwapchainDesc};
use crate::error::Result;
use crate::format::{self, FormatDecision};
use crate::ingest::TextureSet;
use crate::pose::EYE_COUNT;
use ::openxr::sys as xr;
use ash::vk;

#[derive(Debug, Clone)]
pub struct EyeSurface {
    pub swapchain: xr::Swapchain,
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub images: Vec<vk::Image>,
    /// Image acquired but not yet released.
    pub held: Option<HeldImage>,
}

/// A swapchain image still acquired from an interrupted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeldImage {
    pub index: u32,
    /// Whether the wait on it succeeded. Only waited images may be released.
    pub waited: bool,
}

/// Surface extents, one per compositor view.
///
/// A single source texture shared by two views is split side by side; with
/// a texture per eye each surface takes its own texture's size. Anything
/// else falls back to the compositor's recommendation.
pub fn eye_extents(textures: &TextureSet, views: &[RecommendedView]) -> Vec<(u32, u32)> {
    match (textures.count(), textures.primary()) {
        (1, Some(tex)) if views.len() == EYE_COUNT => {
            vec![(tex.width / 2, tex.height); EYE_COUNT]
        }
        (n, _) if n >= EYE_COUNT => (0..views.len())
            .map(|eye| match textures.get(eye) {
                Some(tex) => (tex.width, tex.height),
                None => (views[eye].width, views[eye].height),
            })
            .collect(),
        _ => views.iter().map(|v| (v.width, v.height)).collect(),
    }
}

pub struct Provisioned {
    pub surfaces: Vec<EyeSurface>,
    pub decision: FormatDecision,
}

/// Creates one swapchain per view, sized from the stored textures.
///
/// The format is negotiated again against the primary texture's format.
/// Nothing is left behind on failure.
pub fn provision(
    compositor: &dyn Compositor,
    textures: &TextureSet,
    force_linear: bool,
) -> Result<Provisioned> {
    let supported = compositor.swapchain_formats()?;
    let decision = format::negotiate(
        &supported,
        textures.primary().map(|t| t.format),
        force_linear,
    )?;
    let views = compositor.stereo_views()?;
    let extents = eye_extents(textures, &views);

    let mut surfaces: Vec<EyeSurface> = Vec::with_capacity(extents.len());
    for (eye, &(width, height)) in extents.iter().enumerate() {
        match create_surface(compositor, width, height, decision.surface_format) {
            Ok(surface) => {
                log::info!(
                    "Surfaces: eye {eye} {width}x{height} {} with {} images",
                    format::format_name(surface.format),
                    surface.images.len()
                );
                surfaces.push(surface);
            }
            Err(e) => {
                log::error!("Surfaces: eye {eye} swapchain creation failed: {e}");
                destroy_all(compositor, &mut surfaces);
                return Err(e);
            }
        }
    }

    if decision.needs_gamma_correction {
        log::warn!(
            "Surfaces: source {:?} copied raw into {:?}, gamma will be off",
            decision.source_format,
            decision.surface_format
        );
    }
    Ok(Provisioned { surfaces, decision })
}

fn create_surface(
    compositor: &dyn Compositor,
    width: u32,
    height: u32,
    format: vk::Format,
) -> Result<EyeSurface> {
    let swapchain = compositor.create_swapchain(&SwapchainDesc {
        width,
        height,
        format,
    })?;
    let images = match compositor.swapchain_images(swapchain) {
        Ok(images) => images,
        Err(e) => {
            compositor.destroy_swapchain(swapchain);
            return Err(e);
        }
    };
    Ok(EyeSurface {
        swapchain,
        width,
        height,
        format,
        images,
        held: None,
    })
}

pub fn destroy_all(compositor: &dyn Compositor, surfaces: &mut Vec<EyeSurface>) {
    for surface in surfaces.drain(..) {
        compositor.destroy_swapchain(surface.swapchain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SharedTextures, TextureDescriptor};
    use crate::testing::{Call, MockCompositor};
    use ash::vk::Handle;

    const RECOMMENDED: [RecommendedView; 2] = [RecommendedView {
        width: 1440,
        height: 1600,
    }; 2];

    fn shared_with(sizes: &[(i32, u32, u32)]) -> TextureSet {
        let mut shared = SharedTextures::default();
        for &(index, width, height) in sizes {
            let desc = TextureDescriptor {
                instance: vk::Instance::null(),
                device: vk::Device::null(),
                image: vk::Image::from_raw(0x100 + index as u64),
                format: vk::Format::B8G8R8A8_UNORM,
                sample_count: vk::SampleCountFlags::TYPE_1,
                width,
                height,
                physical_device: vk::PhysicalDevice::null(),
                queue: vk::Queue::null(),
                queue_family_index: 0,
                get_device_proc_addr: None,
            };
            shared.ingest(
                index,
                Some(&desc),
                (1440, 1600),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }
        shared.textures
    }

    #[test]
    fn single_wide_texture_splits_in_half() {
        let textures = shared_with(&[(0, 2880, 1600)]);
        assert_eq!(
            eye_extents(&textures, &RECOMMENDED),
            vec![(1440, 1600), (1440, 1600)]
        );
    }

    #[test]
    fn per_eye_textures_keep_their_sizes() {
        let textures = shared_with(&[(0, 1440, 1600), (1, 1500, 1700)]);
        assert_eq!(
            eye_extents(&textures, &RECOMMENDED),
            vec![(1440, 1600), (1500, 1700)]
        );
    }

    #[test]
    fn no_textures_use_recommendation() {
        let textures = TextureSet::default();
        assert_eq!(
            eye_extents(&textures, &RECOMMENDED),
            vec![(1440, 1600), (1440, 1600)]
        );
    }

    #[test]
    fn provision_creates_one_swapchain_per_eye() {
        let mock = MockCompositor::stereo();
        let textures = shared_with(&[(0, 2880, 1600)]);

        let p = provision(&mock, &textures, true).unwrap();
        assert_eq!(p.surfaces.len(), 2);
        assert_eq!(p.decision.surface_format, vk::Format::B8G8R8A8_UNORM);
        assert!(!p.decision.needs_gamma_correction);
        for s in &p.surfaces {
            assert_eq!((s.width, s.height), (1440, 1600));
            assert!(!s.images.is_empty());
            assert!(s.held.is_none());
        }
        assert_eq!(mock.live_swapchains(), 2);
    }

    #[test]
    fn failed_second_eye_destroys_the_first() {
        let mock = MockCompositor::stereo();
        let textures = shared_with(&[(0, 2880, 1600)]);
        mock.fail_after(Call::CreateSwapchain, 1);

        assert!(provision(&mock, &textures, true).is_err());
        assert_eq!(mock.live_swapchains(), 0);
    }
}
