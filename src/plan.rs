//! Frame Planner: sample timestamps and display delays for one job.

use serde::{Deserialize, Serialize};

use crate::{
    foundation::{
        config::{MAX_REGULAR_SAMPLES, RenderConfig},
        error::{Svg2GifError, Svg2GifResult},
    },
    timing::analyze::AnimationSpec,
};

/// Tolerance applied before rounding `fps * duration` up, so that products such as
/// `30 * 0.1 = 3.0000000000000004` do not gain a spurious extra sample.
///
/// This deliberately departs from a literal `ceil(fps * duration)`, which yields 4 intervals for
/// 30 fps over 0.1 s where this yields 3.
const CEIL_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplePhase {
    /// Evenly spaced samples across `[0, duration]`.
    Sampling,
    /// The trailing hold frame.
    Holding,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSample {
    pub timestamp_s: f64,
    pub delay_ms: u32,
    pub phase: SamplePhase,
}

/// Ordered capture schedule. Always `regular_count + 2` samples long.
#[derive(Clone, Debug, PartialEq)]
pub struct FramePlan {
    samples: Vec<FrameSample>,
    regular_count: u32,
    duration_s: f64,
}

impl FramePlan {
    pub fn samples(&self) -> &[FrameSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `ceil(fps * duration)`, at least 1.
    pub fn regular_count(&self) -> u32 {
        self.regular_count
    }

    pub fn duration_s(&self) -> f64 {
        self.duration_s
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameSample> {
        self.samples.iter()
    }
}

impl<'a> IntoIterator for &'a FramePlan {
    type Item = &'a FrameSample;
    type IntoIter = std::slice::Iter<'a, FrameSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

pub fn regular_sample_count(fps: u32, duration_s: f64) -> u32 {
    let raw = (f64::from(fps) * duration_s - CEIL_EPSILON).ceil();
    if raw.is_finite() && raw >= 1.0 {
        raw.min(f64::from(u32::MAX - 2)) as u32
    } else {
        1
    }
}

/// [`plan`], refusing schedules with more than [`MAX_REGULAR_SAMPLES`] regular samples.
pub fn checked_plan(spec: &AnimationSpec, cfg: &RenderConfig) -> Svg2GifResult<FramePlan> {
    let n = regular_sample_count(cfg.fps, clamp_duration(spec.duration_s));
    if n > MAX_REGULAR_SAMPLES {
        return Err(Svg2GifError::invalid_input(format!(
            "animation needs {n} frames at {} fps, limit is {MAX_REGULAR_SAMPLES}",
            cfg.fps
        )));
    }
    Ok(plan(spec, cfg))
}

fn clamp_duration(duration_s: f64) -> f64 {
    if duration_s.is_finite() && duration_s > 0.0 {
        duration_s
    } else {
        0.0
    }
}

/// Build the capture schedule.
///
/// Sample `i` of `0..=n` sits at `i / n * duration`, so the first and last regular samples land
/// exactly on `0` and `duration`. A final hold sample repeats `duration` with the hold delay.
pub fn plan(spec: &AnimationSpec, cfg: &RenderConfig) -> FramePlan {
    let duration_s = clamp_duration(spec.duration_s);
    let n = regular_sample_count(cfg.fps, duration_s);
    let frame_delay = cfg.frame_delay_ms();

    let mut samples = Vec::with_capacity(n.min(MAX_REGULAR_SAMPLES) as usize + 2);
    for i in 0..=n {
        samples.push(FrameSample {
            timestamp_s: (f64::from(i) / f64::from(n)) * duration_s,
            delay_ms: frame_delay,
            phase: SamplePhase::Sampling,
        });
    }
    samples.push(FrameSample {
        timestamp_s: duration_s,
        delay_ms: cfg.hold_delay_ms(),
        phase: SamplePhase::Holding,
    });

    FramePlan {
        samples,
        regular_count: n,
        duration_s,
    }
}
