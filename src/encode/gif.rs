use gif::{Encoder, Frame, Repeat};

use crate::{
    capture::FrameRGBA,
    encode::{EncoderFactory, FrameEncoder, PaletteMode},
    foundation::error::{Svg2GifError, Svg2GifResult},
};

/// Animated GIF output through the `gif` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct GifEncoderFactory;

impl EncoderFactory for GifEncoderFactory {
    fn create(
        &self,
        width: u32,
        height: u32,
        palette: PaletteMode,
        loop_forever: bool,
    ) -> Svg2GifResult<Box<dyn FrameEncoder>> {
        let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => {
                return Err(Svg2GifError::encoder(format!(
                    "gif dimensions must be within 1..={}, got {width}x{height}",
                    u16::MAX
                )));
            }
        };

        let mut encoder = Encoder::new(Vec::new(), w, h, &[])?;
        if loop_forever {
            encoder.set_repeat(Repeat::Infinite)?;
        }

        Ok(Box::new(GifFrameEncoder {
            encoder,
            width: w,
            height: h,
            palette,
            speed: 1,
        }))
    }
}

struct GifFrameEncoder {
    encoder: Encoder<Vec<u8>>,
    width: u16,
    height: u16,
    palette: PaletteMode,
    speed: i32,
}

impl FrameEncoder for GifFrameEncoder {
    fn set_quality(&mut self, quality: u8) {
        self.speed = i32::from(quality.clamp(1, 30));
    }

    fn append_frame(&mut self, frame: &FrameRGBA, delay_ms: u32) -> Svg2GifResult<()> {
        if frame.width != u32::from(self.width) || frame.height != u32::from(self.height) {
            return Err(Svg2GifError::encoder(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        if frame.data.len() != frame.expected_len() {
            return Err(Svg2GifError::encoder(
                "frame.data size mismatch with width*height*4",
            ));
        }

        let mut rgba = frame.to_straight_rgba();
        let mut out = match self.palette {
            PaletteMode::NeuQuant => {
                Frame::from_rgba_speed(self.width, self.height, &mut rgba, self.speed)
            }
        };
        out.delay = delay_centiseconds(delay_ms);
        self.encoder.write_frame(&out)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Svg2GifResult<Vec<u8>> {
        self.encoder
            .into_inner()
            .map_err(|e| Svg2GifError::encoder(format!("failed to flush gif stream: {e}")))
    }
}

/// GIF delays are stored in hundredths of a second.
pub(crate) fn delay_centiseconds(delay_ms: u32) -> u16 {
    let cs = (u64::from(delay_ms) + 5) / 10;
    u16::try_from(cs).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> FrameRGBA {
        FrameRGBA {
            width: w,
            height: h,
            data: px.repeat((w * h) as usize),
            premultiplied: false,
        }
    }

    #[test]
    fn delays_round_to_centiseconds() {
        assert_eq!(delay_centiseconds(42), 4);
        assert_eq!(delay_centiseconds(45), 5);
        assert_eq!(delay_centiseconds(2000), 200);
        assert_eq!(delay_centiseconds(0), 0);
        assert_eq!(delay_centiseconds(u32::MAX), u16::MAX);
    }

    #[test]
    fn rejects_oversized_canvas() {
        assert!(
            GifEncoderFactory
                .create(70_000, 10, PaletteMode::NeuQuant, true)
                .is_err()
        );
    }

    #[test]
    fn encoded_stream_decodes_with_delays() {
        let mut enc = GifEncoderFactory
            .create(4, 3, PaletteMode::NeuQuant, true)
            .unwrap();
        enc.set_quality(10);
        enc.append_frame(&solid(4, 3, [255, 0, 0, 255]), 42).unwrap();
        enc.append_frame(&solid(4, 3, [0, 0, 255, 255]), 2000).unwrap();
        let bytes = enc.finish().unwrap();
        assert_eq!(&bytes[..6], b"GIF89a");

        let mut opts = gif::DecodeOptions::new();
        opts.set_color_output(gif::ColorOutput::RGBA);
        let mut dec = opts.read_info(bytes.as_slice()).unwrap();
        assert_eq!((dec.width(), dec.height()), (4, 3));

        let mut delays = Vec::new();
        let mut first_px = Vec::new();
        while let Some(f) = dec.read_next_frame().unwrap() {
            delays.push(f.delay);
            first_px.push(f.buffer[..4].to_vec());
        }
        assert_eq!(delays, vec![4, 200]);
        assert!(first_px[0][0] > 200 && first_px[0][2] < 50);
        assert!(first_px[1][2] > 200 && first_px[1][0] < 50);
    }

    #[test]
    fn size_mismatch_is_an_encoder_failure() {
        let mut enc = GifEncoderFactory
            .create(4, 3, PaletteMode::NeuQuant, true)
            .unwrap();
        let err = enc
            .append_frame(&solid(3, 3, [0, 0, 0, 255]), 10)
            .unwrap_err();
        assert!(err.to_string().starts_with("encoder failure: frame size mismatch"));
    }
}
