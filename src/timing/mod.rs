use openxr::sys as xr;

/// Compositor frame timing captured by the last successful pose refresh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Time at which the compositor expects the frame to reach the display.
    pub predicted_display_time: xr::Time,
    /// Interval between two consecutive predicted display times.
    pub predicted_display_period: xr::Duration,
    /// False when the compositor will not show the frame (e.g. headset idle).
    pub should_render: bool,
}

impl FrameTiming {
    /// Display refresh rate implied by the predicted period, if known.
    pub fn refresh_rate_hz(&self) -> Option<f64> {
        let period_ns = self.predicted_display_period.as_nanos();
        (period_ns > 0).then(|| 1_000_000_000.0 / period_ns as f64)
    }
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self {
            predicted_display_time: xr::Time::from_nanos(0),
            predicted_display_period: xr::Duration::from_nanos(0),
            should_render: false,
        }
    }
}
