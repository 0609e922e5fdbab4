//! The Analyzer → Planner → Capture Driver → Encoder Adapter chain as one async operation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    capture::{CaptureDriver, CaptureOpts, PageDocument, RasterSession, Rasterizer, Viewport},
    encode::{EncodeSettings, EncodeStream, EncoderFactory, adapter::DEFAULT_QUEUE_DEPTH},
    foundation::{
        config::RenderConfig,
        error::{Svg2GifError, Svg2GifResult},
    },
    plan::{FramePlan, SamplePhase, checked_plan},
    timing::analyze::{AnimationSpec, analyze},
};

/// Emitted once per captured frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// 1-based index of the frame just captured.
    pub current_index: usize,
    pub total_count: usize,
    pub phase: SamplePhase,
}

/// Timing analysis with the config's duration override applied.
pub fn analyze_with(markup: &str, cfg: &RenderConfig) -> AnimationSpec {
    let mut spec = analyze(markup);
    if let Some(d) = cfg.duration_override {
        spec.duration_s = d;
    }
    spec
}

pub fn viewport_for(spec: &AnimationSpec, cfg: &RenderConfig) -> Svg2GifResult<Viewport> {
    let viewport = Viewport {
        width: cfg.width,
        height: spec.canvas_height(cfg.width),
        scale: cfg.scale,
    };
    let (pw, ph) = viewport.pixel_size();
    if pw > u32::from(u16::MAX) || ph > u32::from(u16::MAX) {
        return Err(Svg2GifError::invalid_input(format!(
            "canvas {pw}x{ph} px exceeds the GIF limit of {} px",
            u16::MAX
        )));
    }
    Ok(viewport)
}

/// Run one conversion from markup to encoded bytes.
///
/// `on_progress` is called after every captured frame, in plan order. The rasterizer session is
/// closed whether or not capturing succeeds.
#[tracing::instrument(skip_all, fields(fps = cfg.fps, width = cfg.width, scale = cfg.scale))]
pub async fn generate<R, E>(
    markup: &str,
    cfg: &RenderConfig,
    rasterizer: &R,
    encoders: Arc<E>,
    capture: &CaptureOpts,
    mut on_progress: impl FnMut(ProgressEvent) + Send,
) -> Svg2GifResult<Vec<u8>>
where
    R: Rasterizer,
    E: EncoderFactory,
{
    cfg.validate()?;
    let background = cfg.background_rgba()?;

    let spec = analyze_with(markup, cfg);
    let frames = checked_plan(&spec, cfg)?;
    let viewport = viewport_for(&spec, cfg)?;
    info!(
        duration_s = spec.duration_s,
        frames = frames.len(),
        canvas_width = viewport.width,
        canvas_height = viewport.height,
        "planned capture"
    );

    let page = PageDocument::new(markup, &viewport, background);
    let mut driver = CaptureDriver::start(rasterizer, viewport, &page, capture).await?;
    let mut stream = EncodeStream::spawn(
        encoders,
        EncodeSettings::with_quality(cfg.quality),
        DEFAULT_QUEUE_DEPTH,
    );

    let captured = capture_all(&mut driver, &mut stream, &frames, &mut on_progress).await;
    if let Err(e) = driver.close().await {
        warn!(error = %e, "failed to close rasterizer session");
    }
    captured?;

    let bytes = stream.finish().await?;
    info!(bytes = bytes.len(), "encoded animation");
    Ok(bytes)
}

async fn capture_all<S: RasterSession>(
    driver: &mut CaptureDriver<S>,
    stream: &mut EncodeStream,
    frames: &FramePlan,
    on_progress: &mut (impl FnMut(ProgressEvent) + Send),
) -> Svg2GifResult<()> {
    let total_count = frames.len();
    for (i, sample) in frames.iter().enumerate() {
        let bitmap = driver.capture(sample.timestamp_s).await?;
        stream.append(bitmap, sample.delay_ms).await?;
        on_progress(ProgressEvent {
            current_index: i + 1,
            total_count,
            phase: sample.phase,
        });
    }
    Ok(())
}
