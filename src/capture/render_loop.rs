//! Render-loop capturer: pulls the current framebuffer each loop iteration
//! and dispatches CPU-converted frames. No staging pool and no hardware
//! encoder on this path; cadence is owned by the render loop itself.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, instrument, warn};

use super::convert;
use super::frame::{epoch_nanos, FrameBuffer, PixelFormat, Rotation, VideoFrame};
use super::sink::{FrameSink, SinkId, SinkSet};
use super::{Capturer, FrameSource};
use crate::device::{DeviceError, NtpClock};

/// Back-buffer read access for the render-loop path.
pub trait FramebufferSource: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> PixelFormat;

    /// Read the current back buffer as tightly packed pixels.
    fn read_back(&mut self) -> Result<Bytes, DeviceError>;
}

pub struct RenderLoopCapturer {
    source: Box<dyn FramebufferSource>,
    sinks: SinkSet,
    clock: Option<Arc<dyn NtpClock>>,
    running: bool,
}

impl RenderLoopCapturer {
    pub fn new(source: Box<dyn FramebufferSource>) -> Self {
        Self {
            source,
            sinks: SinkSet::new(),
            clock: None,
            running: false,
        }
    }

    pub fn set_clock(&mut self, clock: Arc<dyn NtpClock>) {
        self.clock = Some(clock);
    }

    pub fn add_sink(&mut self, id: SinkId, sink: Arc<dyn FrameSink>) {
        self.sinks.add(id, sink);
    }

    pub fn remove_sink(&mut self, id: SinkId) -> bool {
        self.sinks.remove(id)
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Read the back buffer and dispatch one converted frame per sink.
    /// Called once per render-loop iteration.
    #[instrument(skip(self))]
    pub fn capture_frame(&mut self) {
        if !self.running || self.sinks.is_empty() {
            return;
        }

        let width = self.source.width();
        let height = self.source.height();
        let format = self.source.format();

        let pixels = match self.source.read_back() {
            Ok(pixels) => pixels,
            Err(e) => {
                warn!("framebuffer read failed, skipping frame: {e}");
                metrics::counter!("capture_frames_dropped").increment(1);
                return;
            }
        };

        let stride = width as usize * format.bytes_per_pixel();
        for sink in self.sinks.iter() {
            let i420 = convert::packed_to_i420(&pixels, stride, format, width, height);
            sink.on_frame(VideoFrame {
                buffer: FrameBuffer::I420(i420),
                width,
                height,
                rotation: Rotation::None,
                timestamp_ns: epoch_nanos(),
                ntp_time_ms: self.clock.as_deref().map(|clock| clock.current_ntp_ms()),
            });
            metrics::counter!("capture_frames_delivered").increment(1);
        }
    }
}

impl Capturer for RenderLoopCapturer {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        info!(
            width = self.source.width(),
            height = self.source.height(),
            "render-loop capture ready"
        );
        Ok(())
    }

    fn send_frame(&mut self, source: FrameSource<'_>) {
        match source {
            FrameSource::BackBuffer => self.capture_frame(),
            // This capturer reads its own framebuffer; pushed textures have
            // nowhere to go.
            FrameSource::Texture(_) => {}
        }
    }
}
