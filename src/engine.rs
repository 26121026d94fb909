use crate::compositor::{Compositor, OpenXrCompositor, ProjectionView, SessionHandles};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::format::{self, FormatDecision};
use crate::ingest::{SharedTextures, TextureDescriptor};
use crate::pacer::FramePacer;
use crate::pose::{EYE_COUNT, FrameSnapshot, PoseProvider, ViewPair};
use crate::surface::{self, EyeSurface};
use crate::transfer::{self, ImageCopier, VulkanCopier};
use ::openxr::sys as xr;
use ash::vk;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callbacks for whatever owns the legacy present cycle.
pub trait PresentHooks: Send + Sync {
    /// Right before the legacy renderer presents.
    fn pre_present(&self);
    /// Right after the legacy present returned.
    fn post_present(&self);
}

/// Submission-side state: what has been shared and what has been created.
struct Stage {
    render_size: (u32, u32),
    decision: Option<FormatDecision>,
    shared: SharedTextures,
    surfaces: Vec<EyeSurface>,
    projection: [ProjectionView; EYE_COUNT],
    copier: Box<dyn ImageCopier>,
}

pub struct Engine {
    config: BridgeConfig,
    compositor: Arc<dyn Compositor>,
    poses: PoseProvider,
    pacer: FramePacer,
    initialized: AtomicBool,
    stage: Mutex<Stage>,
}

impl Engine {
    /// Engine driving the OpenXR session behind `handles`, copying with the
    /// legacy renderer's own Vulkan device.
    ///
    /// # Safety
    /// See [`OpenXrCompositor::new`].
    pub unsafe fn from_session(handles: &SessionHandles, config: BridgeConfig) -> Result<Self> {
        let compositor = unsafe { OpenXrCompositor::new(handles)? };
        Ok(Self::with_parts(
            Arc::new(compositor),
            Box::new(VulkanCopier::new()),
            config,
        ))
    }

    pub fn with_parts(
        compositor: Arc<dyn Compositor>,
        copier: Box<dyn ImageCopier>,
        config: BridgeConfig,
    ) -> Self {
        let pacer = FramePacer::new(config.pose_wait_timeout);
        Self {
            poses: PoseProvider::new(Arc::clone(&compositor)),
            pacer,
            initialized: AtomicBool::new(false),
            stage: Mutex::new(Stage {
                render_size: config.default_render_size,
                decision: None,
                shared: SharedTextures::default(),
                surfaces: Vec::new(),
                projection: [ProjectionView::default(); EYE_COUNT],
                copier,
            }),
            compositor,
            config,
        }
    }

    /// Checks the compositor offers stereo, picks a placeholder format and
    /// records the recommended render size.
    pub fn init(&self) -> Result<()> {
        let formats = self.compositor.swapchain_formats()?;
        let decision = format::negotiate(&formats, None, self.config.force_linear_formats)?;
        log::info!(
            "XR Bridge: {} swapchain formats, placeholder {}",
            formats.len(),
            format::format_name(decision.surface_format)
        );

        let configurations = self.compositor.view_configurations()?;
        if !configurations.contains(&xr::ViewConfigurationType::PRIMARY_STEREO) {
            return Err(BridgeError::StereoUnsupported);
        }
        let views = self.compositor.stereo_views()?;
        if views.len() != EYE_COUNT {
            return Err(BridgeError::ViewCount(views.len()));
        }

        let render_size = (views[0].width, views[0].height);
        {
            let mut stage = self.stage();
            stage.decision = Some(decision);
            stage.render_size = render_size;
        }
        self.initialized.store(true, Ordering::SeqCst);
        log::info!(
            "XR Bridge: initialized, recommended {}x{} per eye",
            render_size.0,
            render_size.1
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn recommended_render_target_size(&self) -> (u32, u32) {
        self.stage().render_size
    }

    /// Overrides the minimum size a shared texture needs to be stored.
    pub fn set_render_target_size(&self, width: u32, height: u32) {
        log::info!("XR Bridge: render target size set to {width}x{height}");
        self.stage().render_size = (width, height);
    }

    pub fn notify_pre_present(&self) {
        if self.is_initialized() {
            self.pacer.notify_pre_present();
        }
    }

    pub fn notify_post_present(&self) {
        if self.is_initialized() {
            self.pacer.notify_post_present(&self.poses);
        }
    }

    /// Blocks until poses are fresh, without consuming them.
    pub fn begin_frame(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(BridgeError::NotInitialized);
        }
        self.pacer.await_fresh_poses().map(drop)
    }

    /// Waits for fresh poses and hands them out; the next call waits for
    /// another refresh.
    pub fn fetch_views(&self) -> Result<ViewPair> {
        if !self.is_initialized() {
            return Err(BridgeError::NotInitialized);
        }
        Ok(self.pacer.consume_fresh_poses()?.views)
    }

    /// Transfers the shared textures and submits the frame opened by the last
    /// refresh.
    ///
    /// The frame stays open until the compositor has been told it ended, so a
    /// refresh racing this call reuses it instead of beginning the next one.
    /// It is closed whatever the outcome.
    pub fn end_frame(&self) -> Result<()> {
        let Some(frame) = self.poses.open_frame() else {
            return Err(BridgeError::NoFrameStarted);
        };
        let result = self.submit(&frame);
        self.poses.close_frame(frame.frame_index);
        result
    }

    fn submit(&self, frame: &FrameSnapshot) -> Result<()> {
        let mut guard = self.stage();
        let stage = &mut *guard;
        let display_time = frame.timing.predicted_display_time;

        if stage.surfaces.is_empty() && !stage.shared.textures.is_empty() {
            let provisioned = surface::provision(
                self.compositor.as_ref(),
                &stage.shared.textures,
                self.config.force_linear_formats,
            )?;
            stage.surfaces = provisioned.surfaces;
            stage.decision = Some(provisioned.decision);
        }

        if stage.surfaces.is_empty() {
            log::debug!(
                "XR Bridge: nothing shared yet, frame {} submitted without layers",
                frame.frame_index
            );
            return self.compositor.end_frame(display_time, &[]);
        }

        let transferred = transfer::transfer_eyes(
            self.compositor.as_ref(),
            stage.copier.as_mut(),
            &stage.shared.device,
            &stage.shared.textures,
            &mut stage.surfaces,
            &frame.views,
            &mut stage.projection,
            self.config.image_wait_timeout,
        )?;

        let complete = transferred > 0 && transferred == stage.surfaces.len();
        if frame.views.flags.is_tracked() && complete {
            self.compositor
                .end_frame(display_time, &stage.projection[..transferred])
        } else {
            log::debug!(
                "XR Bridge: frame {} submitted without layers",
                frame.frame_index
            );
            self.compositor.end_frame(display_time, &[])
        }
    }

    pub fn predicted_display_time(&self) -> xr::Time {
        self.poses.last_timing().predicted_display_time
    }

    pub fn ingest_shared_texture(&self, index: i32, desc: Option<&TextureDescriptor>) {
        let mut stage = self.stage();
        let min_size = stage.render_size;
        stage
            .shared
            .ingest(index, desc, min_size, self.config.source_layout);
    }

    pub fn frame_count(&self) -> u64 {
        self.poses.frame_count()
    }

    pub fn poses_stale(&self) -> bool {
        self.pacer.poses_stale()
    }

    pub fn needs_gamma_correction(&self) -> bool {
        self.stage()
            .decision
            .is_some_and(|d| d.needs_gamma_correction)
    }

    pub fn surface_format(&self) -> Option<vk::Format> {
        self.stage().decision.map(|d| d.surface_format)
    }

    fn stage(&self) -> MutexGuard<'_, Stage> {
        self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PresentHooks for Engine {
    fn pre_present(&self) {
        self.notify_pre_present();
    }

    fn post_present(&self) {
        self.notify_post_present();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let stage = self.stage.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !stage.surfaces.is_empty() {
            log::info!("XR Bridge: destroying {} swapchains", stage.surfaces.len());
            surface::destroy_all(self.compositor.as_ref(), &mut stage.surfaces);
        }
    }
}
