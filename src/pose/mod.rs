use crate::compositor::Compositor;
use crate::error::Result;
use crate::timing::FrameTiming;
use std::sync::{Arc, Mutex, PoisonError};

pub const EYE_COUNT: usize = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Quaternion, `[x, y, z, w]`.
    pub orientation: [f32; 4],
    pub position: [f32; 3],
}

impl Pose {
    pub const IDENTITY: Self = Self {
        orientation: [0.0, 0.0, 0.0, 1.0],
        position: [0.0; 3],
    };
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Field of view, angles in radians.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EyeView {
    pub pose: Pose,
    pub fov: Fov,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewFlags {
    pub position_valid: bool,
    pub orientation_valid: bool,
}

impl ViewFlags {
    pub const TRACKED: Self = Self {
        position_valid: true,
        orientation_valid: true,
    };

    pub const POSITION_VALID_BIT: u32 = 1 << 0;
    pub const ORIENTATION_VALID_BIT: u32 = 1 << 1;

    pub fn is_tracked(&self) -> bool {
        self.position_valid && self.orientation_valid
    }

    /// C-facing bit mask of the two validity flags.
    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.position_valid {
            bits |= Self::POSITION_VALID_BIT;
        }
        if self.orientation_valid {
            bits |= Self::ORIENTATION_VALID_BIT;
        }
        bits
    }
}

/// Left and right eye views located for one predicted display time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewPair {
    pub views: [EyeView; EYE_COUNT],
    pub flags: ViewFlags,
}

/// Everything a refresh produces, handed from the present role to the
/// submission role in one piece.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSnapshot {
    pub frame_index: u64,
    pub timing: FrameTiming,
    pub views: ViewPair,
}

#[derive(Default)]
struct ProviderState {
    /// Set between a successful refresh and the matching end of frame.
    open: Option<FrameSnapshot>,
    last_timing: FrameTiming,
    frame_counter: u64,
}

/// Waits on the compositor's frame clock, opens frames and locates views.
pub struct PoseProvider {
    compositor: Arc<dyn Compositor>,
    state: Mutex<ProviderState>,
}

impl PoseProvider {
    pub fn new(compositor: Arc<dyn Compositor>) -> Self {
        Self {
            compositor,
            state: Mutex::new(ProviderState::default()),
        }
    }

    /// Opens the next compositor frame and locates both eyes.
    ///
    /// If a frame is already open and not yet ended, no new frame is opened
    /// and the open frame's snapshot is returned.
    pub fn refresh(&self) -> Result<FrameSnapshot> {
        if let Some(open) = self.lock().open {
            log::warn!(
                "Poses: refresh requested while frame {} is still open",
                open.frame_index
            );
            return Ok(open);
        }

        let timing = self.compositor.wait_frame()?;
        self.compositor.begin_frame()?;
        let views = match self.compositor.locate_views(timing.predicted_display_time) {
            Ok(views) => views,
            Err(e) => {
                log::warn!(
                    "Poses: locating views failed after the compositor frame began; \
                     it stays begun and the next refresh discards it"
                );
                return Err(e);
            }
        };

        let mut state = self.lock();
        state.frame_counter += 1;
        let snapshot = FrameSnapshot {
            frame_index: state.frame_counter,
            timing,
            views,
        };
        state.open = Some(snapshot);
        state.last_timing = timing;

        if snapshot.frame_index == 1 {
            if let Some(hz) = timing.refresh_rate_hz() {
                log::info!("Poses: compositor running at {hz:.1} Hz");
            }
        }
        log::debug!("Poses: frame {} started", snapshot.frame_index);
        Ok(snapshot)
    }

    /// Snapshot of the frame begun by the last refresh and not yet ended.
    pub fn open_frame(&self) -> Option<FrameSnapshot> {
        self.lock().open
    }

    /// Marks frame `frame_index` as ended, allowing the next refresh to open
    /// another one.
    pub fn close_frame(&self, frame_index: u64) {
        let mut state = self.lock();
        if state.open.is_some_and(|open| open.frame_index == frame_index) {
            state.open = None;
        }
    }

    /// Timing of the most recent successful refresh.
    pub fn last_timing(&self) -> FrameTiming {
        self.lock().last_timing
    }

    pub fn frame_count(&self) -> u64 {
        self.lock().frame_counter
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
