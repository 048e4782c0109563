//! GPU-direct capturer: the render thread pushes live swapchain textures,
//! frames are copied into pooled staging buffers and dispatched to sinks.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use super::convert;
use super::frame::{epoch_nanos, FrameBuffer, I420Buffer, Rotation, VideoFrame};
use super::pool::StagingPool;
use super::sink::{FrameSink, SinkId, SinkSet};
use super::{Capturer, FrameSource};
use crate::device::{CaptureDevice, DeviceError, EncoderMode, HardwareEncoder, NtpClock, SourceTexture};
use crate::CaptureConfig;

/// Captures pushed render-target textures through a staging pool.
pub struct GpuCapturer {
    device: Arc<dyn CaptureDevice>,
    pool: StagingPool,
    sinks: SinkSet,
    mode: EncoderMode,
    encoder: Option<Arc<dyn HardwareEncoder>>,
    clock: Option<Arc<dyn NtpClock>>,
    running: bool,
}

impl GpuCapturer {
    pub fn new(device: Arc<dyn CaptureDevice>, config: CaptureConfig) -> Self {
        let pool = StagingPool::new(Arc::clone(&device), config.staging_slots);
        Self {
            device,
            pool,
            sinks: SinkSet::new(),
            mode: config.encoder,
            encoder: None,
            clock: None,
            running: false,
        }
    }

    /// Wire the hardware encoder collaborator. It receives the capture device
    /// during `initialize` so it can consume staging textures directly.
    pub fn set_hardware_encoder(&mut self, encoder: Arc<dyn HardwareEncoder>) {
        self.encoder = Some(encoder);
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

    /// Halt capture. `send_frame` becomes a no-op; nothing pending to cancel.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pool_stats(&self) -> (usize, usize, usize) {
        self.pool.stats()
    }

    /// Copy the live texture into a staging slot and dispatch one frame per
    /// registered sink, in registration order.
    #[instrument(skip(self, frame_buffer))]
    pub fn send_texture(&mut self, frame_buffer: &dyn SourceTexture) {
        if !self.running || self.sinks.is_empty() {
            return;
        }

        let width = frame_buffer.width();
        let height = frame_buffer.height();
        let format = frame_buffer.format();

        // Backpressure: no free slot means this frame is skipped, not queued.
        let Some(staging) = self.pool.acquire(width, height, format) else {
            metrics::counter!("capture_frames_dropped").increment(1);
            return;
        };

        let copy_start = Instant::now();
        if let Err(e) = self.device.copy_to_staging(frame_buffer, staging.as_ref()) {
            warn!("staging copy failed, skipping frame: {e}");
            metrics::counter!("capture_frames_dropped").increment(1);
            return;
        }
        metrics::histogram!("capture_copy_us").record(copy_start.elapsed().as_micros() as f64);

        for sink in self.sinks.iter() {
            let buffer = match self.mode {
                EncoderMode::Software => {
                    match map_and_convert(self.device.as_ref(), staging.as_ref(), width, height) {
                        Ok(i420) => FrameBuffer::I420(i420),
                        Err(e) => {
                            warn!("staging map failed, skipping delivery: {e}");
                            continue;
                        }
                    }
                }
                // Ownership handoff: the clone keeps the slot in flight until
                // the hardware path releases the frame.
                EncoderMode::Hardware => FrameBuffer::Texture(Arc::clone(&staging)),
            };

            sink.on_frame(VideoFrame {
                buffer,
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

fn map_and_convert(
    device: &dyn CaptureDevice,
    staging: &dyn crate::device::StagingTexture,
    width: u32,
    height: u32,
) -> Result<I420Buffer, DeviceError> {
    let format = staging.format();
    let mut converted = None;
    device.with_mapped(staging, &mut |data, stride| {
        converted = Some(convert::packed_to_i420(data, stride, format, width, height));
    })?;
    converted.ok_or_else(|| DeviceError::Map("mapping produced no data".into()))
}

impl Capturer for GpuCapturer {
    fn initialize(&mut self) -> Result<(), DeviceError> {
        #[cfg(feature = "multithread-protection")]
        self.device.set_multithread_protected(true);

        if let Some(encoder) = &self.encoder {
            info!("binding hardware encoder to capture device");
            encoder.bind_device(Arc::clone(&self.device));
        }
        Ok(())
    }

    fn send_frame(&mut self, source: FrameSource<'_>) {
        match source {
            FrameSource::Texture(texture) => self.send_texture(texture),
            // This capturer is push-driven; it owns no back buffer.
            FrameSource::BackBuffer => {}
        }
    }
}
