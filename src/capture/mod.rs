pub mod convert;
pub mod frame;
pub mod gpu;
pub mod pool;
pub mod render_loop;
pub mod sink;

pub use frame::{PixelFormat, VideoFrame};
pub use gpu::GpuCapturer;
pub use pool::StagingPool;
pub use render_loop::RenderLoopCapturer;

use crate::device::{DeviceError, SourceTexture};

/// Where the next frame's pixels come from.
pub enum FrameSource<'a> {
    /// A live texture pushed by the render thread (GPU-direct path).
    Texture(&'a dyn SourceTexture),
    /// The capturer's own back buffer, read during its render loop.
    BackBuffer,
}

/// Common capture contract. Each concrete capturer serves one `FrameSource`
/// variant and ignores the other.
pub trait Capturer {
    /// Bind device-side collaborators. Called once before capture starts.
    fn initialize(&mut self) -> Result<(), DeviceError>;

    /// Produce and dispatch one frame. Best-effort: expected degraded states
    /// (not running, no sinks, no free slot) and per-frame device failures
    /// drop the frame silently rather than surfacing an error.
    fn send_frame(&mut self, source: FrameSource<'_>);
}
