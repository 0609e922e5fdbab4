//! Built-in rasterizer backed by `usvg`/`resvg`.

use std::{sync::Arc, time::Instant};

use crate::{
    capture::{FrameRGBA, PageDocument, RasterSession, Rasterizer, Viewport, smil},
    foundation::error::{Svg2GifError, Svg2GifResult},
};

/// Largest bitmap edge the built-in rasterizer will allocate.
const MAX_DIM: u32 = 16_384;

/// Renders pages with resvg, evaluating SMIL animations itself.
///
/// System fonts are loaded once and shared read-only by every session.
#[derive(Clone)]
pub struct ResvgRasterizer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl ResvgRasterizer {
    pub fn new() -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        Self::with_fontdb(Arc::new(db))
    }

    pub fn with_fontdb(fontdb: Arc<usvg::fontdb::Database>) -> Self {
        Self { fontdb }
    }
}

impl Default for ResvgRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ResvgSession {
    viewport: Viewport,
    fontdb: Arc<usvg::fontdb::Database>,
    page: Option<PageDocument>,
    clock_s: f64,
    /// Set while the clock runs freely (between load and pause).
    running_since: Option<Instant>,
}

impl ResvgSession {
    fn clock(&self) -> f64 {
        match self.running_since {
            Some(since) => self.clock_s + since.elapsed().as_secs_f64(),
            None => self.clock_s,
        }
    }
}

impl Rasterizer for ResvgRasterizer {
    type Session = ResvgSession;

    async fn open(&self, viewport: Viewport) -> Svg2GifResult<ResvgSession> {
        let (w, h) = viewport.pixel_size();
        if w > MAX_DIM || h > MAX_DIM {
            return Err(Svg2GifError::rasterizer(format!(
                "viewport too large: {w}x{h} (max {MAX_DIM}x{MAX_DIM})"
            )));
        }
        Ok(ResvgSession {
            viewport,
            fontdb: self.fontdb.clone(),
            page: None,
            clock_s: 0.0,
            running_since: None,
        })
    }
}

impl RasterSession for ResvgSession {
    async fn load(&mut self, page: &PageDocument) -> Svg2GifResult<()> {
        let svg = page.svg.clone();
        let fontdb = self.fontdb.clone();
        tokio::task::spawn_blocking(move || parse_tree(&smil::apply_at(&svg, 0.0), fontdb))
            .await
            .map_err(|e| Svg2GifError::rasterizer(format!("svg parse task failed: {e}")))??;

        self.page = Some(page.clone());
        self.clock_s = 0.0;
        self.running_since = Some(Instant::now());
        Ok(())
    }

    async fn pause(&mut self) -> Svg2GifResult<()> {
        self.clock_s = self.clock();
        self.running_since = None;
        Ok(())
    }

    async fn seek(&mut self, time_s: f64) -> Svg2GifResult<()> {
        if !time_s.is_finite() || time_s < 0.0 {
            return Err(Svg2GifError::rasterizer(format!("invalid seek time {time_s}")));
        }
        self.clock_s = time_s;
        if self.running_since.is_some() {
            self.running_since = Some(Instant::now());
        }
        Ok(())
    }

    async fn capture_bitmap(&mut self) -> Svg2GifResult<FrameRGBA> {
        let page = self
            .page
            .clone()
            .ok_or_else(|| Svg2GifError::rasterizer("no document loaded"))?;
        let viewport = self.viewport;
        let t = self.clock();
        let fontdb = self.fontdb.clone();

        tokio::task::spawn_blocking(move || render_page(&page, viewport, t, fontdb))
            .await
            .map_err(|e| Svg2GifError::rasterizer(format!("render task failed: {e}")))?
    }

    async fn close(self) -> Svg2GifResult<()> {
        Ok(())
    }
}

fn parse_tree(svg: &str, fontdb: Arc<usvg::fontdb::Database>) -> Svg2GifResult<usvg::Tree> {
    let opts = usvg::Options {
        fontdb,
        ..Default::default()
    };
    usvg::Tree::from_str(svg, &opts)
        .map_err(|e| Svg2GifError::rasterizer(format!("parse svg: {e}")))
}

/// Rasterize the page at animation time `t`.
pub(crate) fn render_page(
    page: &PageDocument,
    viewport: Viewport,
    t: f64,
    fontdb: Arc<usvg::fontdb::Database>,
) -> Svg2GifResult<FrameRGBA> {
    let tree = parse_tree(&smil::apply_at(&page.svg, t), fontdb)?;

    let (pw, ph) = viewport.pixel_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(pw, ph)
        .ok_or_else(|| Svg2GifError::rasterizer("failed to allocate pixmap"))?;
    let bg = page.background;
    pixmap.fill(resvg::tiny_skia::Color::from_rgba8(bg.r, bg.g, bg.b, bg.a));

    let size = tree.size();
    let content_w = page.content_width as f32;
    let k = content_w / size.width();
    let content_h = size.height() * k;
    let x = (viewport.width as f32 - content_w) / 2.0;
    let y = (viewport.height as f32 - content_h) / 2.0;
    let s = viewport.scale as f32;
    let xform = resvg::tiny_skia::Transform::from_row(s * k, 0.0, 0.0, s * k, s * x, s * y);

    resvg::render(&tree, xform, &mut pixmap.as_mut());

    Ok(FrameRGBA {
        width: pw,
        height: ph,
        data: pixmap.take(),
        premultiplied: true,
    })
}
