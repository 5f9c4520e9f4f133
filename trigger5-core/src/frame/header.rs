//! Bulk frame header.
//!
//! ## Wire format (20 bytes, multi-byte fields little-endian)
//!
//! ```text
//! magic:           u8   0xfb
//! length:          u8   0x14 (header size)
//! counter:         u16  frame counter, low 12 bits significant
//! h_offset:        u16
//! v_offset:        u16
//! width:           u16
//! height:          u16
//! payload_length:  u32  low 28 bits = byte length, high 4 bits = tag
//! flags:           u8
//! reserved:        [u8; 2]
//! checksum:        u8   (256 - sum of bytes 0..19) mod 256
//! ```

use crate::error::Trigger5Error;

/// First byte of every frame header.
pub const MAGIC: u8 = 0xFB;

/// Frame counter modulus.
pub const COUNTER_MODULUS: u16 = 0x1000;

/// Bits of the payload-length word that carry the length.
pub const PAYLOAD_LENGTH_MASK: u32 = 0x0FFF_FFFF;

/// Flag byte of a full-surface update.
pub const FLAG_UPDATE: u8 = 0x01;

/// Per-frame metadata preceding the pixel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// 12-bit wrapping frame counter.
    pub counter: u16,
    pub h_offset: u16,
    pub v_offset: u16,
    pub width: u16,
    pub height: u16,
    /// Payload size in bytes.
    pub payload_length: u32,
    /// Upper nibble of the payload-length word. Zero on transmit.
    pub tag: u8,
    pub flags: u8,
}

impl FrameHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 20;

    /// Header for a full-surface update of `width × height` RGB888 pixels.
    ///
    /// A payload too large for the 28-bit length field saturates at
    /// [`PAYLOAD_LENGTH_MASK`]; the encoder refuses such surfaces.
    pub fn full_frame(counter: u32, width: u16, height: u16) -> Self {
        Self {
            counter: (counter % u32::from(COUNTER_MODULUS)) as u16,
            h_offset: 0,
            v_offset: 0,
            width,
            height,
            payload_length: u32::try_from(payload_len(width, height))
                .map_or(PAYLOAD_LENGTH_MASK, |n| n.min(PAYLOAD_LENGTH_MASK)),
            tag: 0,
            flags: FLAG_UPDATE,
        }
    }

    /// Serialize to bytes, computing the checksum.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = MAGIC;
        buf[1] = Self::SIZE as u8;
        buf[2..4].copy_from_slice(&(self.counter % COUNTER_MODULUS).to_le_bytes());
        buf[4..6].copy_from_slice(&self.h_offset.to_le_bytes());
        buf[6..8].copy_from_slice(&self.v_offset.to_le_bytes());
        buf[8..10].copy_from_slice(&self.width.to_le_bytes());
        buf[10..12].copy_from_slice(&self.height.to_le_bytes());
        let word = (self.payload_length & PAYLOAD_LENGTH_MASK) | (u32::from(self.tag & 0x0F) << 28);
        buf[12..16].copy_from_slice(&word.to_le_bytes());
        buf[16] = self.flags;
        // 17..19 reserved, zero.
        buf[19] = checksum(&buf[..19]);
        buf
    }

    /// Deserialize from bytes.
    ///
    /// Checks the magic and length bytes only; the checksum is left to
    /// the device.
    pub fn decode(data: &[u8]) -> Result<Self, Trigger5Error> {
        if data.len() < Self::SIZE {
            return Err(Trigger5Error::InvalidHeader("frame header too short"));
        }
        if data[0] != MAGIC {
            return Err(Trigger5Error::InvalidHeader("bad magic"));
        }
        if usize::from(data[1]) != Self::SIZE {
            return Err(Trigger5Error::InvalidHeader("bad header length"));
        }
        let u16_at = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);
        let word = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
        Ok(Self {
            counter: u16_at(2),
            h_offset: u16_at(4),
            v_offset: u16_at(6),
            width: u16_at(8),
            height: u16_at(10),
            payload_length: word & PAYLOAD_LENGTH_MASK,
            tag: (word >> 28) as u8,
            flags: data[16],
        })
    }
}

/// Bytes of RGB888 payload for a `width × height` update.
pub fn payload_len(width: u16, height: u16) -> usize {
    usize::from(width) * usize::from(height) * 3
}

/// Two's-complement byte checksum: the value that makes `bytes`
/// plus the checksum sum to zero mod 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0u8.wrapping_sub(sum)
}

// ── Tests ────────────────────────────────────────────────────────
