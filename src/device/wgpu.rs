//! wgpu-backed capture device: staging readback over a `Device`/`Queue` pair.
//!
//! Staging slots are MAP_READ buffers; the blit is `copy_texture_to_buffer`
//! with 256-byte row alignment, and mapping blocks on `map_async` completion.

use std::any::Any;
use std::sync::Arc;

use tracing::info;
use wgpu::{
    Buffer, BufferDescriptor, BufferUsages, CommandEncoderDescriptor, Device, Extent3d,
    ImageCopyBuffer, ImageDataLayout, Maintain, MapMode, Queue, COPY_BYTES_PER_ROW_ALIGNMENT,
};

use super::{CaptureDevice, DeviceError, SourceTexture, StagingTexture};
use crate::capture::frame::PixelFormat;

/// Buffer copy rows must be 256-byte aligned.
fn padded_bytes_per_row(width: u32) -> u32 {
    (width * 4).div_ceil(COPY_BYTES_PER_ROW_ALIGNMENT) * COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Live render-target wrapper for pushed swapchain textures.
///
/// The texture must carry `TextureUsages::COPY_SRC`; that is the caller's
/// contract, this device only uses the handle.
pub struct WgpuSourceTexture {
    pub texture: wgpu::Texture,
    pub format: PixelFormat,
}

impl SourceTexture for WgpuSourceTexture {
    fn width(&self) -> u32 {
        self.texture.width()
    }

    fn height(&self) -> u32 {
        self.texture.height()
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct WgpuStagingBuffer {
    buffer: Buffer,
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: u32,
}

impl StagingTexture for WgpuStagingBuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Capture device over an existing wgpu device/queue pair. Device and window
/// system creation stay with the caller.
pub struct WgpuCaptureDevice {
    device: Device,
    queue: Queue,
}

impl WgpuCaptureDevice {
    pub fn new(device: Device, queue: Queue) -> Self {
        info!("wgpu capture device ready");
        Self { device, queue }
    }

    fn downcast_staging<'a>(
        staging: &'a dyn StagingTexture,
    ) -> Result<&'a WgpuStagingBuffer, DeviceError> {
        staging
            .as_any()
            .downcast_ref::<WgpuStagingBuffer>()
            .ok_or(DeviceError::ForeignHandle(
                "staging buffer was not allocated by this device",
            ))
    }
}

impl CaptureDevice for WgpuCaptureDevice {
    fn create_staging(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Arc<dyn StagingTexture>, DeviceError> {
        let stride = padded_bytes_per_row(width);
        let buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some("capture staging buffer"),
            size: stride as u64 * height as u64,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Ok(Arc::new(WgpuStagingBuffer {
            buffer,
            width,
            height,
            format,
            stride,
        }))
    }

    fn copy_to_staging(
        &self,
        source: &dyn SourceTexture,
        staging: &dyn StagingTexture,
    ) -> Result<(), DeviceError> {
        let source = source
            .as_any()
            .downcast_ref::<WgpuSourceTexture>()
            .ok_or(DeviceError::ForeignHandle(
                "source texture is not a wgpu texture",
            ))?;
        let staging = Self::downcast_staging(staging)?;

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("capture staging copy"),
            });
        encoder.copy_texture_to_buffer(
            source.texture.as_image_copy(),
            ImageCopyBuffer {
                buffer: &staging.buffer,
                layout: ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(staging.stride),
                    rows_per_image: Some(staging.height),
                },
            },
            Extent3d {
                width: staging.width,
                height: staging.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn with_mapped(
        &self,
        staging: &dyn StagingTexture,
        read: &mut dyn FnMut(&[u8], usize),
    ) -> Result<(), DeviceError> {
        let staging = Self::downcast_staging(staging)?;

        let slice = staging.buffer.slice(..);
        let (tx, rx) = flume::bounded(1);
        slice.map_async(MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(Maintain::Wait);

        let mapped = rx
            .recv()
            .map_err(|e| DeviceError::Map(e.to_string()))
            .and_then(|result| result.map_err(|e| DeviceError::Map(e.to_string())));
        if let Err(e) = mapped {
            // Nothing was mapped; no cleanup required.
            return Err(e);
        }

        {
            let view = slice.get_mapped_range();
            read(&view, staging.stride as usize);
        }
        staging.buffer.unmap();
        Ok(())
    }

    fn set_multithread_protected(&self, enabled: bool) {
        // wgpu serializes device access internally; the request is satisfied
        // by construction.
        info!(enabled, "multithread protection requested");
    }
}
