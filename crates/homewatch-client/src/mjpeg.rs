//! MJPEG frame source.
//!
//! The backend relays the camera as `multipart/x-mixed-replace`. Rather than
//! parse part headers, frames are cut on JPEG start/end markers, which also
//! copes with servers that omit `Content-Length`. Only the newest complete
//! frame matters, so decoding skips anything already superseded.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::StreamExt;
use image::RgbaImage;
use thiserror::Error;
use tokio::sync::watch;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Buffer cap; a stream that never closes a frame within this is dropped.
const MAX_BUFFER: usize = 8 * 1024 * 1024;

pub type FrameRx = watch::Receiver<Option<Arc<RgbaImage>>>;
pub type FrameTx = watch::Sender<Option<Arc<RgbaImage>>>;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("stream returned HTTP {0}")]
    Status(u16),
    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Incremental JPEG splitter.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    buf: BytesMut,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it, oldest first.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            let Some(start) = find(&self.buf, &SOI, 0) else {
                // Keep a trailing 0xFF in case the marker straddles chunks.
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                let drop = self.buf.len() - keep;
                self.buf.advance(drop);
                break;
            };
            self.buf.advance(start);
            match find(&self.buf, &EOI, SOI.len()) {
                Some(end) => frames.push(self.buf.split_to(end + EOI.len()).freeze()),
                None => {
                    if self.buf.len() > MAX_BUFFER {
                        tracing::warn!(bytes = self.buf.len(), "mjpeg frame too large, resyncing");
                        self.buf.clear();
                    }
                    break;
                }
            }
        }
        frames
    }
}

fn find(hay: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    hay.get(from..)?
        .windows(2)
        .position(|w| w == needle)
        .map(|p| p + from)
}

pub fn decode_jpeg(data: &[u8]) -> Result<RgbaImage, image::ImageError> {
    Ok(image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8())
}

pub fn frame_channel() -> (FrameTx, FrameRx) {
    watch::channel(None)
}

/// Read the stream until it ends, publishing each newest decodable frame.
pub async fn read_stream(http: reqwest::Client, url: reqwest::Url, frames: FrameTx) -> Result<(), StreamError> {
    let resp = http.get(url.clone()).send().await?;
    if !resp.status().is_success() {
        return Err(StreamError::Status(resp.status().as_u16()));
    }
    tracing::info!(%url, "mjpeg stream open");

    let mut splitter = FrameSplitter::new();
    let mut body = resp.bytes_stream();
    let mut decoded: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        let Some(latest) = splitter.push(&chunk).pop() else {
            continue;
        };
        match decode_jpeg(&latest) {
            Ok(img) => {
                decoded += 1;
                frames.send_replace(Some(Arc::new(img)));
            }
            Err(err) => tracing::debug!(error = %err, "skipping undecodable frame"),
        }
    }
    tracing::info!(frames = decoded, "mjpeg stream ended");
    Ok(())
}
