use std::{fs::File, io::BufReader, path::Path};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::{
    color::{Rgba8, parse_color},
    error::{Svg2GifError, Svg2GifResult},
};

pub const MAX_FPS: u32 = 100;
pub const MAX_WIDTH: u32 = 8192;
pub const MAX_SCALE: f64 = 8.0;
pub const QUALITY_RANGE: std::ops::RangeInclusive<u8> = 1..=30;
pub const MAX_HOLD_S: f64 = 600.0;
/// Upper bound on regular samples per job: ten minutes of animation at [`MAX_FPS`].
pub const MAX_REGULAR_SAMPLES: u32 = 60_000;

/// Per-job render settings.
///
/// Immutable once a job starts. Unknown keys are rejected when loading from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Sampling rate of the animation clock.
    pub fps: u32,
    /// Canvas width in CSS pixels; height follows the SVG aspect ratio.
    pub width: u32,
    /// Device pixel scale applied to the canvas when capturing.
    pub scale: f64,
    /// 1 (best) ..= 30 (fastest).
    pub quality: u8,
    /// How long the final frame is shown before the loop restarts.
    pub hold_s: f64,
    pub background: String,
    /// Skip duration detection and use this many seconds instead.
    pub duration_override: Option<f64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 24,
            width: 800,
            scale: 2.0,
            quality: 1,
            hold_s: 2.0,
            background: "white".to_owned(),
            duration_override: None,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Svg2GifResult<()> {
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(Svg2GifError::invalid_input(format!(
                "fps must be within 1..={MAX_FPS}, got {}",
                self.fps
            )));
        }
        if self.width == 0 || self.width > MAX_WIDTH {
            return Err(Svg2GifError::invalid_input(format!(
                "width must be within 1..={MAX_WIDTH}, got {}",
                self.width
            )));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 || self.scale > MAX_SCALE {
            return Err(Svg2GifError::invalid_input(format!(
                "scale must be finite and within (0, {MAX_SCALE}], got {}",
                self.scale
            )));
        }
        if (f64::from(self.width) * self.scale).round() > f64::from(u16::MAX) {
            return Err(Svg2GifError::invalid_input(format!(
                "scaled width {}x{} exceeds the GIF limit of {} px",
                self.width,
                self.scale,
                u16::MAX
            )));
        }
        if !QUALITY_RANGE.contains(&self.quality) {
            return Err(Svg2GifError::invalid_input(format!(
                "quality must be within {}..={}, got {}",
                QUALITY_RANGE.start(),
                QUALITY_RANGE.end(),
                self.quality
            )));
        }
        if !self.hold_s.is_finite() || self.hold_s < 0.0 || self.hold_s > MAX_HOLD_S {
            return Err(Svg2GifError::invalid_input(format!(
                "hold must be finite and within [0, {MAX_HOLD_S}] seconds, got {}",
                self.hold_s
            )));
        }
        if let Some(d) = self.duration_override
            && (!d.is_finite() || d <= 0.0)
        {
            return Err(Svg2GifError::invalid_input(format!(
                "duration override must be finite and > 0, got {d}"
            )));
        }
        self.background_rgba()?;
        Ok(())
    }

    pub fn background_rgba(&self) -> Svg2GifResult<Rgba8> {
        parse_color(&self.background)
    }

    /// Per-frame delay of regular samples.
    pub fn frame_delay_ms(&self) -> u32 {
        (1000.0 / f64::from(self.fps.max(1))).round() as u32
    }

    pub fn hold_delay_ms(&self) -> u32 {
        (self.hold_s.max(0.0) * 1000.0).round() as u32
    }

    pub fn from_json_file(path: &Path) -> Svg2GifResult<Self> {
        let f = File::open(path)
            .with_context(|| format!("open render config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse render config '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Optional per-submission overrides layered over an orchestrator's base config.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderOverrides {
    pub fps: Option<u32>,
    pub width: Option<u32>,
    pub scale: Option<f64>,
    pub quality: Option<u8>,
    pub hold_s: Option<f64>,
    pub background: Option<String>,
    /// Name the artifact is offered under; see [`artifact_filename`].
    pub output_name: Option<String>,
}

impl RenderOverrides {
    pub fn apply(&self, base: &RenderConfig) -> RenderConfig {
        RenderConfig {
            fps: self.fps.unwrap_or(base.fps),
            width: self.width.unwrap_or(base.width),
            scale: self.scale.unwrap_or(base.scale),
            quality: self.quality.unwrap_or(base.quality),
            hold_s: self.hold_s.unwrap_or(base.hold_s),
            background: self
                .background
                .clone()
                .unwrap_or_else(|| base.background.clone()),
            duration_override: base.duration_override,
        }
    }
}

/// Derive the attachment filename for a job's artifact.
///
/// A trailing `.svg` is dropped, characters unsafe in a header or path become `_`, and `.gif` is
/// appended once.
pub fn artifact_filename(requested: Option<&str>) -> String {
    let raw = requested.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("output");

    let stem = strip_suffix_ignore_case(raw, ".svg");
    let stem = strip_suffix_ignore_case(stem, ".gif");

    let mut out: String = stem
        .chars()
        .map(|c| match c {
            '/' | '\\' | '"' | '\r' | '\n' | '\0' => '_',
            c => c,
        })
        .collect();
    if out.is_empty() {
        out.push_str("output");
    }
    out.push_str(".gif");
    out
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> &'a str {
    let n = suffix.len();
    if s.len() >= n
        && s.is_char_boundary(s.len() - n)
        && s[s.len() - n..].eq_ignore_ascii_case(suffix)
    {
        &s[..s.len() - n]
    } else {
        s
    }
}
