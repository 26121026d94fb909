use crate::error::{BridgeError, Result};
use ash::vk;

/// Source format assumed before the legacy renderer has shared any texture.
pub const ASSUMED_SOURCE_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// Outcome of matching the compositor's formats against the source texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDecision {
    pub surface_format: vk::Format,
    pub source_format: vk::Format,
    /// The surface interprets the bytes differently than the source encodes
    /// them (linear vs sRGB). Copies stay raw; this is informational.
    pub needs_gamma_correction: bool,
}

/// Picks the surface format for all eyes.
///
/// `source` is the eye-0 texture format, `None` while nothing has been
/// ingested.
pub fn negotiate(
    supported: &[vk::Format],
    source: Option<vk::Format>,
    force_linear: bool,
) -> Result<FormatDecision> {
    let first = *supported.first().ok_or(BridgeError::NoSwapchainFormats)?;

    let Some(source) = source else {
        return Ok(FormatDecision {
            surface_format: first,
            source_format: ASSUMED_SOURCE_FORMAT,
            needs_gamma_correction: first != ASSUMED_SOURCE_FORMAT,
        });
    };

    let decision = |surface_format, needs_gamma_correction| FormatDecision {
        surface_format,
        source_format: source,
        needs_gamma_correction,
    };

    if supported.contains(&source) {
        return Ok(decision(source, false));
    }

    if source == vk::Format::B8G8R8A8_UNORM && force_linear {
        log::info!("Format: forcing B8G8R8A8_UNORM although the compositor does not list it");
        return Ok(decision(source, false));
    }

    if let Some(srgb) = srgb_counterpart(source).filter(|f| supported.contains(f)) {
        return Ok(decision(srgb, true));
    }

    log::info!(
        "Format: no compatible format for {:?}, falling back to {:?}",
        source,
        first
    );
    Ok(decision(first, true))
}

/// sRGB format with the same channel order as a linear 8-bit format.
pub fn srgb_counterpart(fmt: vk::Format) -> Option<vk::Format> {
    match fmt {
        vk::Format::B8G8R8A8_UNORM => Some(vk::Format::B8G8R8A8_SRGB),
        vk::Format::R8G8B8A8_UNORM => Some(vk::Format::R8G8B8A8_SRGB),
        vk::Format::A8B8G8R8_UNORM_PACK32 => Some(vk::Format::A8B8G8R8_SRGB_PACK32),
        _ => None,
    }
}

/// Short name for the formats compositors commonly offer.
pub fn format_name(fmt: vk::Format) -> &'static str {
    match fmt {
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::R16G16B16A16_SFLOAT => "R16G16B16A16_SFLOAT",
        vk::Format::A2B10G10R10_UNORM_PACK32 => "A2B10G10R10_UNORM",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BGRA: vk::Format = vk::Format::B8G8R8A8_UNORM;
    const BGRA_SRGB: vk::Format = vk::Format::B8G8R8A8_SRGB;
    const RGBA: vk::Format = vk::Format::R8G8B8A8_UNORM;
    const RGBA_SRGB: vk::Format = vk::Format::R8G8B8A8_SRGB;
    const HALF: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

    #[test]
    fn exact_match_wins() {
        let d = negotiate(&[BGRA_SRGB, BGRA], Some(BGRA), false).unwrap();
        assert_eq!(d.surface_format, BGRA);
        assert!(!d.needs_gamma_correction);
    }

    #[test]
    fn srgb_counterpart_needs_correction() {
        let d = negotiate(&[BGRA_SRGB], Some(BGRA), false).unwrap();
        assert_eq!(d.surface_format, BGRA_SRGB);
        assert!(d.needs_gamma_correction);

        let d = negotiate(&[RGBA_SRGB], Some(RGBA), true).unwrap();
        assert_eq!(d.surface_format, RGBA_SRGB);
        assert!(d.needs_gamma_correction);
    }

    #[test]
    fn unrelated_format_falls_back_to_first() {
        let d = negotiate(&[HALF, RGBA_SRGB], Some(BGRA), false).unwrap();
        assert_eq!(d.surface_format, HALF);
        assert!(d.needs_gamma_correction);
    }

    #[test]
    fn force_linear_overrides_missing_format() {
        let d = negotiate(&[BGRA_SRGB], Some(BGRA), true).unwrap();
        assert_eq!(d.surface_format, BGRA);
        assert!(!d.needs_gamma_correction);
    }

    #[test]
    fn force_linear_only_applies_to_bgra() {
        let d = negotiate(&[HALF], Some(RGBA), true).unwrap();
        assert_eq!(d.surface_format, HALF);
        assert!(d.needs_gamma_correction);
    }

    #[test]
    fn placeholder_before_any_texture() {
        let d = negotiate(&[BGRA_SRGB, BGRA], None, true).unwrap();
        assert_eq!(d.surface_format, BGRA_SRGB);
        assert_eq!(d.source_format, ASSUMED_SOURCE_FORMAT);
        assert!(d.needs_gamma_correction);

        let d = negotiate(&[BGRA], None, true).unwrap();
        assert!(!d.needs_gamma_correction);
    }

    #[test]
    fn empty_list_is_an_error() {
        assert!(matches!(
            negotiate(&[], Some(BGRA), true),
            Err(BridgeError::NoSwapchainFormats)
        ));
    }
}
