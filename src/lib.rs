pub mod compositor;
pub mod config;
pub mod dispatch;
pub mod engine;
mod error;
pub mod format;
pub mod ingest;
pub mod pacer;
pub mod pose;
pub mod surface;
mod timing;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use compositor::{Compositor, OpenXrCompositor, SessionHandles};
pub use config::BridgeConfig;
pub use engine::{Engine, PresentHooks};
pub use error::{BridgeError, Result};
pub use ingest::TextureDescriptor;
pub use pose::{EyeView, Fov, Pose, ViewFlags, ViewPair};
pub use timing::FrameTiming;
pub use transfer::{ImageCopier, VulkanCopier};

// ── Lifetime ─────────────────────────────────────────────────────────────────

/// Attaches to the host's OpenXR session. Returns null on failure.
///
/// # Safety
/// `handles` must point to a valid [`SessionHandles`] whose session outlives
/// the returned engine.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn xr_bridge_init(handles: *const SessionHandles) -> *mut Engine {
    let _ = env_logger::try_init();

    let Some(handles) = (unsafe { handles.as_ref() }) else {
        log::error!("XR Bridge: init called without session handles");
        return std::ptr::null_mut();
    };

    let engine = match unsafe { Engine::from_session(handles, BridgeConfig::from_env()) } {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("XR Bridge: attaching to session failed: {e}");
            return std::ptr::null_mut();
        }
    };
    if let Err(e) = engine.init() {
        log::error!("XR Bridge: init failed: {e}");
        return std::ptr::null_mut();
    }
    Box::into_raw(Box::new(engine))
}

/// # Safety
/// `engine` must come from [`xr_bridge_init`] and not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn xr_bridge_shutdown(engine: *mut Engine) {
    if engine.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(engine) });
    log::info!("XR Bridge: shut down");
}

// ── Render target size ───────────────────────────────────────────────────────

/// # Safety
/// `engine` must be null or live; `width` and `height` must be writable.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn xr_bridge_get_recommended_render_target_size(
    engine: *const Engine,
    width: *mut u32,
    height: *mut u32,
) -> bool {
    let Some(engine) = (unsafe { engine.as_ref() }) else {
        return false;
    };
    if width.is_null() || height.is_null() {
        return false;
    }
    let (w, h) = engine.recommended_render_target_size();
    unsafe {
        *width = w;
        *height = h;
    }
    true
}

/// # Safety
/// `engine` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn xr_bridge_set_render_target_size(
    engine: *const Engine,
    width: u32,
    height: u32,
) {
    if let Some(engine) = unsafe { engine.as_ref() } {
        engine.set_render_target_size(width, height);
    }
}

// ── Present cycle ────────────────────────────────────────────────────────────

/// # Safety
/// `engine` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn xr_bridge_pre_present(engine: *const Engine) {
    if let Some(engine) = unsafe { engine.as_ref() } {
        engine.notify_pre_present();
    }
}

/// # Safety
/// `engine` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn xr_bridge_post_present(engine: *const Engine) {
    if let Some(engine) = unsafe { engine.as_ref() } {
        engine.notify_post_present();
    }
}

// ── Compositor cycle ─────────────────────────────────────────────────────────

/// # Safety
/// `engine` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn xr_bridge_begin_frame(engine: *const Engine) -> bool {
    let Some(engine) = (unsafe { engine.as_ref() }) else {
        return false;
    };
    match engine.begin_frame() {
        Ok(()) => true,
        Err(e) => {
            log::warn!("XR Bridge: begin frame failed: {e}");
            false
        }
    }
}

/// # Safety
/// `engine` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn xr_bridge_end_frame(engine: *const Engine) -> bool {
    let Some(engine) = (unsafe { engine.as_ref() }) else {
        return false;
    };
    match engine.end_frame() {
        Ok(()) => true,
        Err(BridgeError::NoFrameStarted) => {
            log::debug!("XR Bridge: end frame without a started frame");
            false
        }
        Err(e) => {
            log::error!("XR Bridge: end frame failed: {e}");
            false
        }
    }
}

/// Nanoseconds, 0 before the first refresh.
///
/// # Safety
/// `engine` must be null or live.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn xr_bridge_get_predicted_display_time(engine: *const Engine) -> i64 {
    unsafe { engine.as_ref() }
        .map(|e| e.predicted_display_time().as_nanos())
        .unwrap_or(0)
}

/// Waits for fresh poses and writes up to `capacity` eye views to `views`.
/// `count` receives the number of views available, `flags` the
/// [`ViewFlags`] bits.
///
/// # Safety
/// `engine` must be null or live; `views` must be writable for `capacity`
/// elements; `count` and `flags` must be null or writable.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn xr_bridge_get_views(
    engine: *const Engine,
    views: *mut EyeView,
    capacity: u32,
    count: *mut u32,
    flags: *mut u32,
) -> bool {
    let Some(engine) = (unsafe { engine.as_ref() }) else {
        return false;
    };
    let pair = match engine.fetch_views() {
        Ok(pair) => pair,
        Err(e) => {
            log::warn!("XR Bridge: no views: {e}");
            return false;
        }
    };

    if !count.is_null() {
        unsafe { *count = pair.views.len() as u32 };
    }
    if !flags.is_null() {
        unsafe { *flags = pair.flags.bits() };
    }
    if !views.is_null() {
        let n = pair.views.len().min(capacity as usize);
        unsafe { std::ptr::copy_nonoverlapping(pair.views.as_ptr(), views, n) };
    }
    true
}

// ── Texture sharing ──────────────────────────────────────────────────────────

/// # Safety
/// `engine` must be null or live; `desc` must be null or valid for reads.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn xr_bridge_store_shared_texture(
    engine: *const Engine,
    index: i32,
    desc: *const TextureDescriptor,
) {
    if let Some(engine) = unsafe { engine.as_ref() } {
        engine.ingest_shared_texture(index, unsafe { desc.as_ref() });
    }
}
