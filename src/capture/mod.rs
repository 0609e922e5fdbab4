//! Capture Driver and the rasterizer collaborator contract.
//!
//! A [`Rasterizer`] opens one [`RasterSession`] per job. Sessions own an animation clock that is
//! paused after load and only moves on explicit `seek`, so a session must never be shared between
//! jobs.

use std::sync::Arc;

use crate::foundation::{color::Rgba8, error::Svg2GifResult};

pub mod driver;
pub mod resvg;
pub mod smil;

pub use driver::{CaptureDriver, CaptureOpts};
pub use self::resvg::{ResvgRasterizer, ResvgSession};

/// Share of the canvas width the SVG is displayed at; the rest is background margin.
pub const CONTENT_WIDTH_FRACTION: f64 = 0.85;

/// A captured frame as RGBA8 pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Straight-alpha copy of the pixels.
    pub fn to_straight_rgba(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        if self.premultiplied {
            for px in out.chunks_exact_mut(4) {
                let a = u16::from(px[3]);
                if a == 0 || a == 255 {
                    continue;
                }
                for c in &mut px[..3] {
                    *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
                }
            }
        }
        out
    }
}

/// Canvas size in CSS pixels plus the device pixel scale applied at capture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

impl Viewport {
    /// Size of captured bitmaps in device pixels.
    pub fn pixel_size(&self) -> (u32, u32) {
        let px = |v: u32| ((f64::from(v) * self.scale).round() as u32).max(1);
        (px(self.width), px(self.height))
    }
}

/// The page a session loads: the source SVG centered on a solid background.
#[derive(Clone, Debug)]
pub struct PageDocument {
    pub svg: Arc<str>,
    pub background: Rgba8,
    /// Display width of the SVG in CSS pixels. Height follows the SVG's own aspect.
    pub content_width: u32,
}

impl PageDocument {
    pub fn new(svg: impl Into<Arc<str>>, viewport: &Viewport, background: Rgba8) -> Self {
        Self {
            svg: svg.into(),
            background,
            content_width: ((f64::from(viewport.width) * CONTENT_WIDTH_FRACTION).round() as u32)
                .max(1),
        }
    }
}

/// Factory for rasterizer sessions.
pub trait Rasterizer: Send + Sync + 'static {
    type Session: RasterSession;

    fn open(&self, viewport: Viewport)
    -> impl Future<Output = Svg2GifResult<Self::Session>> + Send;
}

/// One isolated rendering context with its own animation clock.
pub trait RasterSession: Send + 'static {
    fn load(&mut self, page: &PageDocument) -> impl Future<Output = Svg2GifResult<()>> + Send;

    /// Stop the native animation clock; afterwards time only advances through `seek`.
    fn pause(&mut self) -> impl Future<Output = Svg2GifResult<()>> + Send;

    fn seek(&mut self, time_s: f64) -> impl Future<Output = Svg2GifResult<()>> + Send;

    fn capture_bitmap(&mut self) -> impl Future<Output = Svg2GifResult<FrameRGBA>> + Send;

    fn close(self) -> impl Future<Output = Svg2GifResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_size_applies_scale() {
        let vp = Viewport {
            width: 800,
            height: 450,
            scale: 2.0,
        };
        assert_eq!(vp.pixel_size(), (1600, 900));
        let vp = Viewport {
            width: 3,
            height: 3,
            scale: 0.1,
        };
        assert_eq!(vp.pixel_size(), (1, 1));
    }

    #[test]
    fn page_content_is_85_percent_of_canvas() {
        let vp = Viewport {
            width: 800,
            height: 800,
            scale: 1.0,
        };
        let page = PageDocument::new("<svg/>", &vp, Rgba8::rgb(255, 255, 255));
        assert_eq!(page.content_width, 680);
    }

    #[test]
    fn unpremultiply_restores_straight_color() {
        let frame = FrameRGBA {
            width: 2,
            height: 1,
            data: vec![128, 0, 0, 128, 10, 20, 30, 255],
            premultiplied: true,
        };
        assert_eq!(frame.to_straight_rgba(), vec![255, 0, 0, 128, 10, 20, 30, 255]);
    }
}
