//! Opaque device and collaborator interfaces consumed by the capture core.
//!
//! Device/context creation, encoder internals and clock synchronization all
//! live outside this crate; the capturers only see the narrow traits below.

#[cfg(feature = "wgpu-device")]
pub mod wgpu;

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::frame::PixelFormat;

/// Failures surfaced by a capture device. All of them are contained within a
/// single frame: the capturers log, drop the frame and stay live.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("staging buffer allocation failed: {0}")]
    Allocation(String),

    #[error("copy to staging buffer failed: {0}")]
    Copy(String),

    #[error("staging buffer map failed: {0}")]
    Map(String),

    #[error("incompatible texture handle: {0}")]
    ForeignHandle(&'static str),
}

/// A live render-target texture pushed in by the render thread.
///
/// The core never reads pixels through this handle; concrete devices recover
/// their native texture via `as_any`.
pub trait SourceTexture: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> PixelFormat;
    fn as_any(&self) -> &dyn Any;
}

/// A CPU-mappable staging buffer owned by the pool.
///
/// Consumers on the hardware path hold this via `Arc`; the pool reclaims a
/// slot once its clone count drops back to one.
pub trait StagingTexture: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> PixelFormat;
    fn as_any(&self) -> &dyn Any;
}

/// Device/context pair behind the capture core.
pub trait CaptureDevice: Send + Sync {
    /// Allocate a staging buffer sized exactly to the request.
    fn create_staging(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Arc<dyn StagingTexture>, DeviceError>;

    /// GPU-side blit from the live render target into a staging buffer.
    fn copy_to_staging(
        &self,
        source: &dyn SourceTexture,
        staging: &dyn StagingTexture,
    ) -> Result<(), DeviceError>;

    /// Scoped CPU mapping of a staging buffer.
    ///
    /// `read` receives the mapped bytes and the row stride. The buffer is
    /// unmapped before this returns, on every exit path.
    fn with_mapped(
        &self,
        staging: &dyn StagingTexture,
        read: &mut dyn FnMut(&[u8], usize),
    ) -> Result<(), DeviceError>;

    /// Request driver-level serialization of concurrent device access.
    fn set_multithread_protected(&self, _enabled: bool) {}
}

/// Hardware encoder collaborator. Bound to the capture device during
/// `Capturer::initialize` so it can consume staging textures without a CPU
/// round-trip.
pub trait HardwareEncoder: Send + Sync {
    fn bind_device(&self, device: Arc<dyn CaptureDevice>);
}

/// Network-synchronized clock. Absence is tolerated; frames simply carry no
/// ntp timestamp.
pub trait NtpClock: Send + Sync {
    /// Monotonically non-decreasing milliseconds.
    fn current_ntp_ms(&self) -> i64;
}

/// Delivery path selection for dispatched frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderMode {
    /// Map the staging buffer and convert to planar I420 on the CPU.
    Software,
    /// Hand the raw staging texture to the sink, keeping it referenced.
    Hardware,
}
