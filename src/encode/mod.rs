//! Encoder collaborator contract and the Encoder Adapter.

use std::sync::{Arc, Mutex};

use crate::{capture::FrameRGBA, foundation::error::Svg2GifResult};

pub mod adapter;
pub mod gif;

pub use adapter::EncodeStream;
pub use self::gif::GifEncoderFactory;

/// Color reduction strategy for palette-based output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PaletteMode {
    /// Per-frame NeuQuant palette.
    #[default]
    NeuQuant,
}

/// Settings fixed before the first frame and never changed mid-stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeSettings {
    /// 1 (best) ..= 30 (fastest).
    pub quality: u8,
    pub palette: PaletteMode,
    pub loop_forever: bool,
}

impl EncodeSettings {
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality,
            palette: PaletteMode::NeuQuant,
            loop_forever: true,
        }
    }
}

pub trait EncoderFactory: Send + Sync + 'static {
    fn create(
        &self,
        width: u32,
        height: u32,
        palette: PaletteMode,
        loop_forever: bool,
    ) -> Svg2GifResult<Box<dyn FrameEncoder>>;
}

/// A streaming animated-image encoder. Frames are appended in display order.
pub trait FrameEncoder: Send {
    fn set_quality(&mut self, quality: u8);

    fn append_frame(&mut self, frame: &FrameRGBA, delay_ms: u32) -> Svg2GifResult<()>;

    fn finish(self: Box<Self>) -> Svg2GifResult<Vec<u8>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedFrame {
    pub width: u32,
    pub height: u32,
    pub delay_ms: u32,
    /// Quality in effect when the frame was appended.
    pub quality: u8,
}

/// Encoder that keeps frame metadata instead of pixels.
///
/// `finish` yields `b"SVG2GIF "` followed by one `width x height @ delay` line per frame.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEncoderFactory {
    frames: Arc<Mutex<Vec<RecordedFrame>>>,
    created: Arc<Mutex<Vec<(u32, u32, PaletteMode, bool)>>>,
}

impl InMemoryEncoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// `(width, height, palette, loop_forever)` for every encoder created so far.
    pub fn created(&self) -> Vec<(u32, u32, PaletteMode, bool)> {
        self.created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EncoderFactory for InMemoryEncoderFactory {
    fn create(
        &self,
        width: u32,
        height: u32,
        palette: PaletteMode,
        loop_forever: bool,
    ) -> Svg2GifResult<Box<dyn FrameEncoder>> {
        self.created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((width, height, palette, loop_forever));
        Ok(Box::new(InMemoryEncoder {
            quality: 1,
            frames: Vec::new(),
            sink: self.frames.clone(),
        }))
    }
}

struct InMemoryEncoder {
    quality: u8,
    frames: Vec<RecordedFrame>,
    sink: Arc<Mutex<Vec<RecordedFrame>>>,
}

impl FrameEncoder for InMemoryEncoder {
    fn set_quality(&mut self, quality: u8) {
        self.quality = quality;
    }

    fn append_frame(&mut self, frame: &FrameRGBA, delay_ms: u32) -> Svg2GifResult<()> {
        let rec = RecordedFrame {
            width: frame.width,
            height: frame.height,
            delay_ms,
            quality: self.quality,
        };
        self.sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(rec.clone());
        self.frames.push(rec);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Svg2GifResult<Vec<u8>> {
        let mut out = b"SVG2GIF ".to_vec();
        for f in &self.frames {
            out.extend_from_slice(format!("{}x{}@{}\n", f.width, f.height, f.delay_ms).as_bytes());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(w: u32, h: u32) -> FrameRGBA {
        FrameRGBA {
            width: w,
            height: h,
            data: vec![0; (w * h * 4) as usize],
            premultiplied: false,
        }
    }

    #[test]
    fn in_memory_encoder_records_in_order() {
        let factory = InMemoryEncoderFactory::new();
        let mut enc = factory.create(2, 1, PaletteMode::NeuQuant, true).unwrap();
        enc.set_quality(7);
        enc.append_frame(&frame(2, 1), 42).unwrap();
        enc.append_frame(&frame(2, 1), 2000).unwrap();
        let bytes = enc.finish().unwrap();

        assert_eq!(bytes, b"SVG2GIF 2x1@42\n2x1@2000\n".to_vec());
        assert_eq!(factory.created(), vec![(2, 1, PaletteMode::NeuQuant, true)]);
        let frames = factory.frames();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.quality == 7));
    }
}
