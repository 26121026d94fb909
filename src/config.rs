use ash::vk;
use once_cell::sync::Lazy;
use std::time::Duration;

pub const DEFAULT_RENDER_WIDTH: u32 = 1440;
pub const DEFAULT_RENDER_HEIGHT: u32 = 1600;

static ENV_CONFIG: Lazy<BridgeConfig> = Lazy::new(|| {
    BridgeConfig::from_lookup(|key| std::env::var(key).ok())
});

/// Tunables for the engine. `Default` gives the behaviour of a stock build,
/// `from_env` applies the `XR_BRIDGE_*` overrides on top of it.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Use `B8G8R8A8_UNORM` surfaces for `B8G8R8A8_UNORM` sources even when
    /// the compositor does not list the format.
    pub force_linear_formats: bool,
    /// Upper bound on how long the submission role waits for fresh poses.
    pub pose_wait_timeout: Duration,
    /// Timeout handed to the compositor's swapchain image wait.
    pub image_wait_timeout: Duration,
    /// Layout the legacy renderer leaves its color targets in.
    pub source_layout: vk::ImageLayout,
    pub default_render_size: (u32, u32),
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            force_linear_formats: true,
            pose_wait_timeout: Duration::from_millis(2000),
            image_wait_timeout: Duration::from_secs(1),
            source_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            default_render_size: (DEFAULT_RENDER_WIDTH, DEFAULT_RENDER_HEIGHT),
        }
    }
}

impl BridgeConfig {
    /// Process environment, read once.
    pub fn from_env() -> Self {
        ENV_CONFIG.clone()
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("XR_BRIDGE_FORCE_LINEAR") {
            cfg.force_linear_formats = parse_flag(&v).unwrap_or(cfg.force_linear_formats);
        }
        if let Some(ms) = lookup("XR_BRIDGE_POSE_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            cfg.pose_wait_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = lookup("XR_BRIDGE_IMAGE_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            cfg.image_wait_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("XR_BRIDGE_SOURCE_LAYOUT") {
            match parse_layout(&v) {
                Some(layout) => cfg.source_layout = layout,
                None => log::warn!("XR Bridge: ignoring unknown XR_BRIDGE_SOURCE_LAYOUT={v}"),
            }
        }

        cfg
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_layout(v: &str) -> Option<vk::ImageLayout> {
    match v.trim().to_ascii_lowercase().as_str() {
        "shader_read" => Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        "transfer_src" => Some(vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
        "general" => Some(vk::ImageLayout::GENERAL),
        _ => None,
    }
}
