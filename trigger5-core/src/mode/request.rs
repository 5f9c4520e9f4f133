//! SET_MODE configuration packet.
//!
//! ## Wire format (35 bytes, multi-byte fields big-endian)
//!
//! ```text
//! off  field                 value
//!  0   height                vdisplay
//!  2   width                 hdisplay
//!  4   line_total            htotal - 1
//!  6   line_sync             hsync_end - hsync_start - 1
//!  8   line_back_porch       htotal - hsync_end - 1
//! 10   reserved × 2          0xffff
//! 14   width_minus_one       hdisplay - 1
//! 16   frame_total           vtotal - 1
//! 18   frame_sync            vsync_end - vsync_start - 1
//! 20   frame_back_porch      vtotal - vsync_end - 1
//! 22   reserved × 2          0xffff
//! 26   height_minus_one      vdisplay - 1
//! 28   clock                 prediv mul1 mul2 div1 div2 (u8 each)
//! 33   hsync_polarity        0 = positive, 1 = negative
//! 34   vsync_polarity        0 = positive, 1 = negative
//! ```
//!
//! Timing arithmetic is modulo 2^16, as on the wire.

use bytes::{Buf, BufMut};

use crate::clock::ClockParameters;
use crate::error::Trigger5Error;
use crate::mode::timing::DisplayTiming;

/// Fill value of the reserved words. The device rejects zeros.
pub const RESERVED_FILL: u16 = 0xFFFF;

/// A fully derived SET_MODE payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRequest {
    pub height: u16,
    pub width: u16,
    pub line_total: u16,
    pub line_sync: u16,
    pub line_back_porch: u16,
    pub width_minus_one: u16,
    pub frame_total: u16,
    pub frame_sync: u16,
    pub frame_back_porch: u16,
    pub height_minus_one: u16,
    pub reserved: [u16; 4],
    pub clock: ClockParameters,
    pub hsync_polarity: u8,
    pub vsync_polarity: u8,
}

impl ModeRequest {
    /// Encoded size on the wire.
    pub const SIZE: usize = 35;

    /// Derive the request for `timing` driven by `clock`.
    pub fn new(timing: &DisplayTiming, clock: ClockParameters) -> Self {
        let t = timing;
        Self {
            height: t.vdisplay,
            width: t.hdisplay,
            line_total: t.htotal.wrapping_sub(1),
            line_sync: t.hsync_end.wrapping_sub(t.hsync_start).wrapping_sub(1),
            line_back_porch: t.htotal.wrapping_sub(t.hsync_end).wrapping_sub(1),
            width_minus_one: t.hdisplay.wrapping_sub(1),
            frame_total: t.vtotal.wrapping_sub(1),
            frame_sync: t.vsync_end.wrapping_sub(t.vsync_start).wrapping_sub(1),
            frame_back_porch: t.vtotal.wrapping_sub(t.vsync_end).wrapping_sub(1),
            height_minus_one: t.vdisplay.wrapping_sub(1),
            reserved: [RESERVED_FILL; 4],
            clock,
            hsync_polarity: polarity_bit(t.positive_hsync()),
            vsync_polarity: polarity_bit(t.positive_vsync()),
        }
    }

    /// Serialize to the SET_MODE payload.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut w = &mut out[..];
        w.put_u16(self.height);
        w.put_u16(self.width);
        w.put_u16(self.line_total);
        w.put_u16(self.line_sync);
        w.put_u16(self.line_back_porch);
        w.put_u16(self.reserved[0]);
        w.put_u16(self.reserved[1]);
        w.put_u16(self.width_minus_one);
        w.put_u16(self.frame_total);
        w.put_u16(self.frame_sync);
        w.put_u16(self.frame_back_porch);
        w.put_u16(self.reserved[2]);
        w.put_u16(self.reserved[3]);
        w.put_u16(self.height_minus_one);
        w.put_slice(&self.clock.to_bytes());
        w.put_u8(self.hsync_polarity);
        w.put_u8(self.vsync_polarity);
        out
    }

    /// Deserialize a SET_MODE payload.
    pub fn decode(data: &[u8]) -> Result<Self, Trigger5Error> {
        if data.len() < Self::SIZE {
            return Err(Trigger5Error::ShortResponse {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut r = &data[..Self::SIZE];
        let height = r.get_u16();
        let width = r.get_u16();
        let line_total = r.get_u16();
        let line_sync = r.get_u16();
        let line_back_porch = r.get_u16();
        let reserved0 = r.get_u16();
        let reserved1 = r.get_u16();
        let width_minus_one = r.get_u16();
        let frame_total = r.get_u16();
        let frame_sync = r.get_u16();
        let frame_back_porch = r.get_u16();
        let reserved2 = r.get_u16();
        let reserved3 = r.get_u16();
        let height_minus_one = r.get_u16();
        let mut clock = [0u8; ClockParameters::SIZE];
        r.copy_to_slice(&mut clock);
        Ok(Self {
            height,
            width,
            line_total,
            line_sync,
            line_back_porch,
            width_minus_one,
            frame_total,
            frame_sync,
            frame_back_porch,
            height_minus_one,
            reserved: [reserved0, reserved1, reserved2, reserved3],
            clock: ClockParameters::from_bytes(clock),
            hsync_polarity: r.get_u8(),
            vsync_polarity: r.get_u8(),
        })
    }
}

/// The wire bit is the negation of "positive sync".
fn polarity_bit(positive: bool) -> u8 {
    if positive { 0 } else { 1 }
}

// ── Tests ────────────────────────────────────────────────────────
