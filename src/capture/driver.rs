use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    capture::{FrameRGBA, PageDocument, RasterSession, Rasterizer, Viewport},
    foundation::error::{Svg2GifError, Svg2GifResult},
};

#[derive(Clone, Debug)]
pub struct CaptureOpts {
    /// Pause after each seek so the rasterizer can apply the new animation state.
    pub settle: Duration,
}

impl Default for CaptureOpts {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(40),
        }
    }
}

/// Drives one rasterizer session through a forward-only sequence of captures.
pub struct CaptureDriver<S: RasterSession> {
    session: S,
    settle: Duration,
    clock_s: Option<f64>,
    captured: usize,
}

impl<S: RasterSession> CaptureDriver<S> {
    /// Open a session sized to `viewport`, load `page` and pause its clock.
    #[tracing::instrument(skip_all, fields(width = viewport.width, height = viewport.height))]
    pub async fn start<R>(
        rasterizer: &R,
        viewport: Viewport,
        page: &PageDocument,
        opts: &CaptureOpts,
    ) -> Svg2GifResult<Self>
    where
        R: Rasterizer<Session = S>,
    {
        let mut session = rasterizer
            .open(viewport)
            .await
            .map_err(|e| e.into_rasterizer("open session"))?;

        if let Err(e) = prepare(&mut session, page).await {
            if let Err(close_err) = session.close().await {
                warn!(error = %close_err, "closing rasterizer session after failed load");
            }
            return Err(e);
        }

        Ok(Self {
            session,
            settle: opts.settle,
            clock_s: None,
            captured: 0,
        })
    }

    /// Seek the animation clock to `timestamp_s`, let it settle, and snapshot the viewport.
    ///
    /// Timestamps must not decrease between calls.
    pub async fn capture(&mut self, timestamp_s: f64) -> Svg2GifResult<FrameRGBA> {
        if !timestamp_s.is_finite() || timestamp_s < 0.0 {
            return Err(Svg2GifError::rasterizer(format!(
                "invalid capture timestamp {timestamp_s}"
            )));
        }
        if let Some(prev) = self.clock_s
            && timestamp_s < prev
        {
            return Err(Svg2GifError::rasterizer(format!(
                "capture at {timestamp_s:.3}s would seek backwards from {prev:.3}s"
            )));
        }

        self.session
            .seek(timestamp_s)
            .await
            .map_err(|e| e.into_rasterizer(&format!("seek to {timestamp_s:.3}s")))?;
        self.clock_s = Some(timestamp_s);

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let frame = self
            .session
            .capture_bitmap()
            .await
            .map_err(|e| e.into_rasterizer(&format!("capture at {timestamp_s:.3}s")))?;
        if frame.width == 0 || frame.height == 0 || frame.data.len() != frame.expected_len() {
            return Err(Svg2GifError::rasterizer(format!(
                "capture at {timestamp_s:.3}s returned {} bytes for {}x{}",
                frame.data.len(),
                frame.width,
                frame.height
            )));
        }

        self.captured += 1;
        debug!(
            index = self.captured,
            t = timestamp_s,
            width = frame.width,
            height = frame.height,
            "captured frame"
        );
        Ok(frame)
    }

    pub fn captured(&self) -> usize {
        self.captured
    }

    pub async fn close(self) -> Svg2GifResult<()> {
        self.session
            .close()
            .await
            .map_err(|e| e.into_rasterizer("close session"))
    }
}

async fn prepare<S: RasterSession>(session: &mut S, page: &PageDocument) -> Svg2GifResult<()> {
    session
        .load(page)
        .await
        .map_err(|e| e.into_rasterizer("load document"))?;
    session
        .pause()
        .await
        .map_err(|e| e.into_rasterizer("pause animations"))
}
