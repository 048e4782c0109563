use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::device::StagingTexture;

/// Packed swapchain pixel formats accepted by the capture core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Bgra8,
    Rgba8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }
}

/// Frame rotation. Captured swapchain frames are never rotated in this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    None,
}

/// Planar 4:2:0 buffer: one contiguous allocation, Y plane then U then V.
#[derive(Debug, Clone)]
pub struct I420Buffer {
    width: u32,
    height: u32,
    /// Immutable plane data - can be shared across threads without copying
    data: Bytes,
}

impl I420Buffer {
    pub(crate) fn from_planes(width: u32, height: u32, data: Bytes) -> Self {
        debug_assert_eq!(data.len(), Self::required_len(width, height));
        Self {
            width,
            height,
            data,
        }
    }

    pub(crate) fn required_len(width: u32, height: u32) -> usize {
        let (cw, ch) = (width.div_ceil(2) as usize, height.div_ceil(2) as usize);
        width as usize * height as usize + 2 * cw * ch
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride_y(&self) -> usize {
        self.width as usize
    }

    pub fn stride_u(&self) -> usize {
        self.width.div_ceil(2) as usize
    }

    pub fn stride_v(&self) -> usize {
        self.stride_u()
    }

    pub fn data_y(&self) -> &[u8] {
        &self.data[..self.stride_y() * self.height as usize]
    }

    pub fn data_u(&self) -> &[u8] {
        let y_len = self.stride_y() * self.height as usize;
        let c_len = self.stride_u() * self.height.div_ceil(2) as usize;
        &self.data[y_len..y_len + c_len]
    }

    pub fn data_v(&self) -> &[u8] {
        let y_len = self.stride_y() * self.height as usize;
        let c_len = self.stride_u() * self.height.div_ceil(2) as usize;
        &self.data[y_len + c_len..y_len + 2 * c_len]
    }
}

/// Pixel payload of a dispatched frame.
#[derive(Clone)]
pub enum FrameBuffer {
    /// CPU-converted planar data for software encoders.
    I420(I420Buffer),
    /// Raw staging texture handed off to a hardware encoder. The clone held
    /// here keeps the pool slot in-flight until every holder drops the frame.
    Texture(Arc<dyn StagingTexture>),
}

/// Immutable descriptor for one captured frame, dispatched to each sink.
#[derive(Clone)]
pub struct VideoFrame {
    pub buffer: FrameBuffer,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    /// Capture wall-clock timestamp, nanoseconds since the Unix epoch.
    pub timestamp_ns: i64,
    /// Network-synchronized milliseconds, when a clock service is wired.
    pub ntp_time_ms: Option<i64>,
}

/// Wall-clock capture timestamp.
pub(crate) fn epoch_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i420_plane_layout() {
        let buf = I420Buffer::from_planes(4, 2, Bytes::from(vec![0u8; 4 * 2 + 2 * 2]));
        assert_eq!(buf.data_y().len(), 8);
        assert_eq!(buf.data_u().len(), 2);
        assert_eq!(buf.data_v().len(), 2);
        assert_eq!(buf.stride_y(), 4);
        assert_eq!(buf.stride_u(), 2);
    }

    #[test]
    fn i420_odd_dimensions_round_up_chroma() {
        let len = I420Buffer::required_len(5, 3);
        assert_eq!(len, 15 + 2 * 3 * 2);
        let buf = I420Buffer::from_planes(5, 3, Bytes::from(vec![0u8; len]));
        assert_eq!(buf.data_u().len(), 6);
        assert_eq!(buf.data_v().len(), 6);
    }

    #[test]
    fn epoch_timestamp_is_positive() {
        assert!(epoch_nanos() > 0);
    }
}
