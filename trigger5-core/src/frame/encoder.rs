//! Full-frame encoder: XRGB8888 surface → header + RGB888 payload.
//!
//! The header format offers offsets for partial updates, but the
//! hardware only displays full-surface updates reliably, so every
//! encode covers the entire surface.

use crate::error::Trigger5Error;
use crate::frame::header::{FrameHeader, PAYLOAD_LENGTH_MASK, payload_len};
use crate::frame::types::FrameSurface;

// ── EncodedFrame ─────────────────────────────────────────────────

/// A frame ready for bulk transfer.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub header: FrameHeader,
    /// RGB888 pixels, row-major, no row padding.
    pub payload: Vec<u8>,
}

impl EncodedFrame {
    /// Header and payload in one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FrameHeader::SIZE + self.payload.len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Total transfer length for a surface: header plus payload.
pub fn encoded_len(surface: &FrameSurface) -> usize {
    FrameHeader::SIZE + payload_len(surface.width, surface.height)
}

/// Encode `surface` as frame number `counter`.
pub fn encode(surface: &FrameSurface, counter: u32) -> Result<EncodedFrame, Trigger5Error> {
    let mut buf = vec![0u8; encoded_len(surface)];
    let header = encode_into(surface, counter, &mut buf)?;
    buf.drain(..FrameHeader::SIZE);
    Ok(EncodedFrame {
        header,
        payload: buf,
    })
}

/// Encode `surface` into `out`, which must be exactly
/// [`encoded_len`] bytes long.
pub fn encode_into(
    surface: &FrameSurface,
    counter: u32,
    out: &mut [u8],
) -> Result<FrameHeader, Trigger5Error> {
    surface.validate()?;
    let payload = payload_len(surface.width, surface.height);
    if payload > PAYLOAD_LENGTH_MASK as usize {
        return Err(Trigger5Error::InvalidHeader("payload length exceeds 28 bits"));
    }
    if out.len() != FrameHeader::SIZE + payload {
        return Err(Trigger5Error::AllocationFailure { len: out.len() });
    }

    let header = FrameHeader::full_frame(counter, surface.width, surface.height);
    let (head, body) = out.split_at_mut(FrameHeader::SIZE);
    head.copy_from_slice(&header.encode());
    xrgb8888_to_rgb888(surface, body);
    Ok(header)
}

/// Drop the padding byte of every pixel, keeping channel order.
fn xrgb8888_to_rgb888(surface: &FrameSurface, dst: &mut [u8]) {
    let src_row_len = surface.row_len();
    let dst_row_len = usize::from(surface.width) * 3;
    if dst_row_len == 0 {
        return;
    }

    for (y, dst_row) in dst
        .chunks_exact_mut(dst_row_len)
        .take(usize::from(surface.height))
        .enumerate()
    {
        let start = y * surface.stride;
        let src_row = &surface.data[start..start + src_row_len];
        for (s, d) in src_row.chunks_exact(4).zip(dst_row.chunks_exact_mut(3)) {
            d.copy_from_slice(&s[..3]);
        }
    }
}

// ── FrameEncoder ─────────────────────────────────────────────────

/// Stateful encoder owning the device frame counter.
///
/// The counter embedded in each header equals the number of frames
/// encoded before it, modulo 4096.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    frames_encoded: u64,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode the next frame into `out`. The counter only advances when
    /// the encode succeeds.
    pub fn encode_next(
        &mut self,
        surface: &FrameSurface,
        out: &mut [u8],
    ) -> Result<FrameHeader, Trigger5Error> {
        let header = encode_into(surface, (self.frames_encoded % 4096) as u32, out)?;
        self.frames_encoded += 1;
        Ok(header)
    }

    /// Number of frames encoded so far.
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::header::checksum;
    use crate::frame::types::PixelFormat;

    #[test]
    fn payload_is_three_bytes_per_pixel() {
        let surface = FrameSurface::xrgb8888(64, 48);
        let frame = encode(&surface, 0).unwrap();
        assert_eq!(frame.payload.len(), 3 * 64 * 48);
        assert_eq!(frame.header.payload_length as usize, 3 * 64 * 48);
        assert_eq!(frame.to_bytes().len(), 20 + 3 * 64 * 48);
    }

    #[test]
    fn pixels_keep_channel_order() {
        let mut surface = FrameSurface::xrgb8888(2, 1);
        surface.put_pixel(0, 0, 0x00AA_BBCC);
        surface.put_pixel(1, 0, 0x0011_2233);
        // Padding byte is ignored even when set.
        surface.data[3] = 0xEE;

        let frame = encode(&surface, 0).unwrap();
        assert_eq!(frame.payload, vec![0xCC, 0xBB, 0xAA, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn row_padding_is_dropped() {
        let mut surface = FrameSurface {
            width: 2,
            height: 2,
            stride: 12,
            format: PixelFormat::Xrgb8888,
            data: vec![0x77; 12 + 8],
        };
        surface.put_pixel(0, 1, 0x0001_0203);
        let frame = encode(&surface, 0).unwrap();
        assert_eq!(frame.payload.len(), 12);
        assert_eq!(&frame.payload[0..6], &[0x77; 6]);
        assert_eq!(&frame.payload[6..9], &[0x03, 0x02, 0x01]);
    }

    #[test]
    fn header_checksum_closes_sum() {
        let frame = encode(&FrameSurface::xrgb8888(3, 3), 9).unwrap();
        let bytes = frame.header.encode();
        assert_eq!(checksum(&bytes[..19]), bytes[19]);
        assert_eq!(bytes.iter().fold(0u8, |a, b| a.wrapping_add(*b)), 0);
    }

    #[test]
    fn wrong_output_length_is_rejected() {
        let surface = FrameSurface::xrgb8888(4, 4);
        let mut out = vec![0u8; encoded_len(&surface) - 1];
        assert!(encode_into(&surface, 0, &mut out).is_err());
    }

    #[test]
    fn counter_advances_only_on_success() {
        let mut enc = FrameEncoder::new();
        let surface = FrameSurface::xrgb8888(2, 2);
        let mut out = vec![0u8; encoded_len(&surface)];

        assert_eq!(enc.encode_next(&surface, &mut out).unwrap().counter, 0);
        assert_eq!(enc.encode_next(&surface, &mut out).unwrap().counter, 1);

        let mut bad = surface.clone();
        bad.format = PixelFormat::Rgb888;
        assert!(enc.encode_next(&bad, &mut out).is_err());
        assert_eq!(enc.frames_encoded(), 2);
    }

    #[test]
    fn counter_repeats_after_4096_frames() {
        let mut enc = FrameEncoder::new();
        let surface = FrameSurface::xrgb8888(1, 1);
        let mut out = vec![0u8; encoded_len(&surface)];
        let first = enc.encode_next(&surface, &mut out).unwrap().counter;
        for _ in 1..4096 {
            enc.encode_next(&surface, &mut out).unwrap();
        }
        assert_eq!(enc.encode_next(&surface, &mut out).unwrap().counter, first);
    }

    #[test]
    fn empty_surface_encodes_header_only() {
        let frame = encode(&FrameSurface::xrgb8888(0, 0), 0).unwrap();
        assert!(frame.payload.is_empty());
        assert_eq!(frame.header.payload_length, 0);
    }
}
