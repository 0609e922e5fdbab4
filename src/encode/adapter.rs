use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

use crate::{
    capture::FrameRGBA,
    encode::{EncodeSettings, EncoderFactory},
    foundation::error::{Svg2GifError, Svg2GifResult},
};

/// Frames buffered between the capture loop and the encoder thread.
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

struct EncodeItem {
    frame: FrameRGBA,
    delay_ms: u32,
}

/// Streams frames into an encoder running on Tokio's blocking pool.
///
/// The encoder is created from the first frame's dimensions with `settings` applied once; every
/// later frame must have the same size. Dropping the stream without calling [`finish`] discards
/// the output.
///
/// [`finish`]: EncodeStream::finish
pub struct EncodeStream {
    tx: Option<mpsc::Sender<EncodeItem>>,
    worker: Option<JoinHandle<Svg2GifResult<Vec<u8>>>>,
    sent: usize,
}

impl EncodeStream {
    pub fn spawn<E: EncoderFactory>(
        factory: Arc<E>,
        settings: EncodeSettings,
        queue_depth: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let worker = tokio::task::spawn_blocking(move || encode_worker(&*factory, settings, rx));
        Self {
            tx: Some(tx),
            worker: Some(worker),
            sent: 0,
        }
    }

    /// Hand one frame to the encoder. Waits only while the queue is full.
    pub async fn append(&mut self, frame: FrameRGBA, delay_ms: u32) -> Svg2GifResult<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(Svg2GifError::encoder("encode stream is already closed"));
        };
        if tx.send(EncodeItem { frame, delay_ms }).await.is_err() {
            // The worker only hangs up early when it failed.
            self.tx = None;
            return Err(self.join().await.err().unwrap_or_else(|| {
                Svg2GifError::encoder("encoder stopped before all frames were appended")
            }));
        }
        self.sent += 1;
        Ok(())
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Close the stream and wait for the finished artifact.
    pub async fn finish(mut self) -> Svg2GifResult<Vec<u8>> {
        self.tx = None;
        self.join().await
    }

    async fn join(&mut self) -> Svg2GifResult<Vec<u8>> {
        let Some(worker) = self.worker.take() else {
            return Err(Svg2GifError::encoder("encoder already finished"));
        };
        worker
            .await
            .map_err(|e| Svg2GifError::encoder(format!("encoder task failed: {e}")))?
    }
}

fn encode_worker<E: EncoderFactory>(
    factory: &E,
    settings: EncodeSettings,
    mut rx: mpsc::Receiver<EncodeItem>,
) -> Svg2GifResult<Vec<u8>> {
    let Some(mut item) = rx.blocking_recv() else {
        return Err(Svg2GifError::encoder("no frames to encode"));
    };

    let (width, height) = (item.frame.width, item.frame.height);
    let mut encoder = factory
        .create(width, height, settings.palette, settings.loop_forever)
        .map_err(|e| e.into_encoder("create encoder"))?;
    encoder.set_quality(settings.quality);

    let mut appended = 0usize;
    loop {
        if item.frame.width != width || item.frame.height != height {
            return Err(Svg2GifError::encoder(format!(
                "frame {} size mismatch: got {}x{}, expected {width}x{height}",
                appended + 1,
                item.frame.width,
                item.frame.height
            )));
        }
        encoder
            .append_frame(&item.frame, item.delay_ms)
            .map_err(|e| e.into_encoder(&format!("append frame {}", appended + 1)))?;
        appended += 1;

        match rx.blocking_recv() {
            Some(next) => item = next,
            None => break,
        }
    }

    let bytes = encoder
        .finish()
        .map_err(|e| e.into_encoder("finish"))?;
    debug!(frames = appended, bytes = bytes.len(), "encoder finished");
    Ok(bytes)
}
