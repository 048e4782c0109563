//! Packed 32-bit to planar 4:2:0 conversion for the software encoder path.
//!
//! Fixed-point BT.601 studio-range transform, matching the libyuv constants.
//! Chroma is averaged over 2x2 blocks; odd edges replicate the last row/column.

use bytes::BytesMut;

use super::frame::{I420Buffer, PixelFormat};

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline]
fn y_from_rgb(r: i32, g: i32, b: i32) -> u8 {
    clamp_u8(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16)
}

#[inline]
fn u_from_rgb(r: i32, g: i32, b: i32) -> u8 {
    clamp_u8(((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128)
}

#[inline]
fn v_from_rgb(r: i32, g: i32, b: i32) -> u8 {
    clamp_u8(((112 * r - 94 * g - 18 * b + 128) >> 8) + 128)
}

#[inline]
fn rgb_at(src: &[u8], stride: usize, format: PixelFormat, x: usize, y: usize) -> (i32, i32, i32) {
    let px = &src[y * stride + x * 4..y * stride + x * 4 + 4];
    match format {
        PixelFormat::Bgra8 => (px[2] as i32, px[1] as i32, px[0] as i32),
        PixelFormat::Rgba8 => (px[0] as i32, px[1] as i32, px[2] as i32),
    }
}

/// Convert a packed source image into an owned planar I420 buffer.
///
/// `src_stride` is in bytes and may exceed `width * 4` when the source carries
/// GPU copy-padding; the padding bytes are never read.
pub fn packed_to_i420(
    src: &[u8],
    src_stride: usize,
    format: PixelFormat,
    width: u32,
    height: u32,
) -> I420Buffer {
    let (w, h) = (width as usize, height as usize);
    debug_assert!(src_stride >= w * format.bytes_per_pixel());
    debug_assert!(src.len() >= src_stride * h.saturating_sub(1) + w * 4);

    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let mut data = BytesMut::zeroed(I420Buffer::required_len(width, height));
    let (y_plane, chroma) = data.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);

    for row in 0..h {
        for col in 0..w {
            let (r, g, b) = rgb_at(src, src_stride, format, col, row);
            y_plane[row * w + col] = y_from_rgb(r, g, b);
        }
    }

    for crow in 0..ch {
        for ccol in 0..cw {
            // 2x2 average, replicating the edge pixel on odd dimensions.
            let (mut r_sum, mut g_sum, mut b_sum) = (0, 0, 0);
            for dy in 0..2 {
                for dx in 0..2 {
                    let row = (crow * 2 + dy).min(h - 1);
                    let col = (ccol * 2 + dx).min(w - 1);
                    let (r, g, b) = rgb_at(src, src_stride, format, col, row);
                    r_sum += r;
                    g_sum += g;
                    b_sum += b;
                }
            }
            let (r, g, b) = (r_sum / 4, g_sum / 4, b_sum / 4);
            u_plane[crow * cw + ccol] = u_from_rgb(r, g, b);
            v_plane[crow * cw + ccol] = v_from_rgb(r, g, b);
        }
    }

    I420Buffer::from_planes(width, height, data.freeze())
}
