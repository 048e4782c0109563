pub mod capture;
pub mod device;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub use capture::frame::{FrameBuffer, I420Buffer, PixelFormat, Rotation, VideoFrame};
pub use capture::gpu::GpuCapturer;
pub use capture::pool::StagingPool;
pub use capture::render_loop::RenderLoopCapturer;
pub use capture::sink::{FrameSink, SinkId};
pub use capture::{Capturer, FrameSource};
pub use device::{
    CaptureDevice, DeviceError, EncoderMode, HardwareEncoder, NtpClock, SourceTexture,
    StagingTexture,
};

/// Upper bound on staging buffers held per capturer; the pool never grows past it.
pub const MAX_STAGING_SLOTS: usize = 10;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Fixed staging pool capacity; acquisition fails rather than growing past it.
    pub staging_slots: usize,
    /// Which delivery path sinks receive: CPU-converted I420 or raw GPU textures.
    pub encoder: EncoderMode,
    /// Packed format of the swapchain textures pushed into the capturer.
    pub format: PixelFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            staging_slots: MAX_STAGING_SLOTS,
            encoder: EncoderMode::Software,
            format: PixelFormat::Bgra8,
        }
    }
}
