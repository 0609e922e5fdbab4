use serde::Serialize;

use crate::timing::markup::{TagKind, tags};

/// Shortest animation the analyzer reports, so that a static document still yields real frames.
pub const MIN_DURATION_S: f64 = 1.0;

/// Timing metadata derived once from source markup.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AnimationSpec {
    pub duration_s: f64,
    /// `viewBox` height / width, when both are present and positive.
    pub aspect_ratio: Option<f64>,
}

impl AnimationSpec {
    /// Canvas height for a canvas `width` CSS pixels wide. Square when the aspect is unknown.
    pub fn canvas_height(&self, width: u32) -> u32 {
        match self.aspect_ratio {
            Some(ratio) => ((f64::from(width) * ratio).round() as u32).max(1),
            None => width,
        }
    }
}

/// Inspect markup for timing and geometry. Never fails: missing data degrades to defaults.
pub fn analyze(markup: &str) -> AnimationSpec {
    AnimationSpec {
        duration_s: detect_animation_end(markup),
        aspect_ratio: detect_aspect_ratio(markup),
    }
}

pub(crate) fn is_animation_element(local_name: &str) -> bool {
    local_name.starts_with("animate") || local_name == "set"
}

/// Latest `begin + dur` over all animation elements, floored at [`MIN_DURATION_S`].
pub fn detect_animation_end(markup: &str) -> f64 {
    tags(markup)
        .filter(|t| t.kind != TagKind::End && is_animation_element(t.local_name()))
        .map(|t| {
            let begin = t.attr("begin").and_then(parse_clock_value).unwrap_or(0.0);
            let dur = t.attr("dur").and_then(parse_clock_value).unwrap_or(0.0);
            begin + dur
        })
        .fold(MIN_DURATION_S, f64::max)
}

/// Height / width from the root element's `viewBox`.
pub fn detect_aspect_ratio(markup: &str) -> Option<f64> {
    let root = tags(markup).find(|t| t.kind != TagKind::End && t.local_name() == "svg")?;
    let vb = root.attr("viewBox")?;

    let parts: Vec<f64> = vb
        .split(|c: char| c.is_ascii_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().ok())
        .collect::<Option<_>>()?;
    let [_, _, w, h] = parts.as_slice() else {
        return None;
    };
    if !(w.is_finite() && h.is_finite()) || *w <= 0.0 || *h <= 0.0 {
        return None;
    }
    Some(h / w)
}

/// Parse a SMIL clock value into seconds.
///
/// Accepts plain numbers (`2`), timecount values (`2s`, `500ms`, `1.5min`, `0.5h`) and clock
/// values (`00:01.5`, `01:00:02`). Only the first entry of a `;` list is considered. Event and
/// sync-base values such as `click` or `a.end` yield `None`.
pub fn parse_clock_value(raw: &str) -> Option<f64> {
    let s = raw.split(';').next()?.trim();
    if s.is_empty() {
        return None;
    }

    let secs = if s.contains(':') {
        let mut total = 0.0;
        for part in s.split(':') {
            let v: f64 = part.trim().parse().ok()?;
            total = total * 60.0 + v;
        }
        if s.split(':').count() > 3 {
            return None;
        }
        total
    } else if let Some(n) = s.strip_suffix("ms") {
        n.trim().parse::<f64>().ok()? / 1000.0
    } else if let Some(n) = s.strip_suffix("min") {
        n.trim().parse::<f64>().ok()? * 60.0
    } else if let Some(n) = s.strip_suffix('h') {
        n.trim().parse::<f64>().ok()? * 3600.0
    } else if let Some(n) = s.strip_suffix('s') {
        n.trim().parse::<f64>().ok()?
    } else {
        s.parse::<f64>().ok()?
    };

    secs.is_finite().then_some(secs)
}
