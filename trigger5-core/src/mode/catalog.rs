//! Device-advertised mode catalog.
//!
//! ## Wire format (GET_MODE reply)
//!
//! ```text
//! count:    u16 BE   (2)
//! padding:  [u8; 2]  (2)
//! modes:    52 × entry
//!
//! entry (8 bytes):
//!   hz:          u8
//!   clock_mhz:   u8
//!   bpp:         u8
//!   mode_number: u8
//!   height:      u16 LE
//!   width:       u16 LE
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Trigger5Error;
use crate::mode::timing::DisplayTiming;

/// Maximum number of entries the device can report.
pub const MAX_MODES: usize = 52;

/// Size of the catalog header preceding the entries.
pub const CATALOG_HEADER_LEN: usize = 4;

/// Size of one catalog entry.
pub const MODE_ENTRY_LEN: usize = 8;

/// Length of a full GET_MODE reply.
pub const CATALOG_LEN: usize = CATALOG_HEADER_LEN + MAX_MODES * MODE_ENTRY_LEN;

// ── DeviceMode ───────────────────────────────────────────────────

/// One native timing preset reported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMode {
    /// Refresh rate in Hz.
    pub hz: u8,
    /// Pixel clock in MHz.
    pub clock_mhz: u8,
    /// Colour depth.
    pub bpp: u8,
    /// Device-assigned mode identifier.
    pub mode_number: u8,
    pub height: u16,
    pub width: u16,
}

impl DeviceMode {
    /// The catalog entry a device would report for `timing`.
    pub fn from_timing(mode_number: u8, timing: &DisplayTiming) -> Self {
        Self {
            hz: timing.refresh_hz().min(u32::from(u8::MAX)) as u8,
            clock_mhz: (timing.clock_khz / 1000).min(u32::from(u8::MAX)) as u8,
            bpp: 32,
            mode_number,
            height: timing.vdisplay,
            width: timing.hdisplay,
        }
    }

    /// Serialize to the 8-byte catalog entry.
    pub fn encode(&self) -> [u8; MODE_ENTRY_LEN] {
        let mut buf = [0u8; MODE_ENTRY_LEN];
        buf[0] = self.hz;
        buf[1] = self.clock_mhz;
        buf[2] = self.bpp;
        buf[3] = self.mode_number;
        buf[4..6].copy_from_slice(&self.height.to_le_bytes());
        buf[6..8].copy_from_slice(&self.width.to_le_bytes());
        buf
    }

    /// Deserialize from an 8-byte catalog entry.
    pub fn decode(data: &[u8; MODE_ENTRY_LEN]) -> Self {
        Self {
            hz: data[0],
            clock_mhz: data[1],
            bpp: data[2],
            mode_number: data[3],
            height: u16::from_le_bytes([data[4], data[5]]),
            width: u16::from_le_bytes([data[6], data[7]]),
        }
    }

    fn matches(&self, width: u16, height: u16, refresh_hz: u32) -> bool {
        self.width == width && self.height == height && u32::from(self.hz) == refresh_hz
    }
}

// ── MatchPolicy ──────────────────────────────────────────────────

/// What [`ModeCatalog::find`] does when no entry matches exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Reject the request with [`Trigger5Error::NoMatchingMode`].
    #[default]
    Exact,
    /// Use the last catalog entry. The adapter accepts any timing once a
    /// base mode is selected because the real timing travels in the
    /// mode request.
    FallbackToLast,
}

// ── SizeBounds ───────────────────────────────────────────────────

/// Smallest and largest dimensions across the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeBounds {
    pub min_width: u16,
    pub min_height: u16,
    pub max_width: u16,
    pub max_height: u16,
}

// ── ModeCatalog ──────────────────────────────────────────────────

/// The ordered list of modes the device reported at attach.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeCatalog {
    modes: Vec<DeviceMode>,
}

impl ModeCatalog {
    /// Build a catalog from known entries, keeping at most [`MAX_MODES`].
    pub fn from_modes(modes: impl IntoIterator<Item = DeviceMode>) -> Self {
        Self {
            modes: modes.into_iter().take(MAX_MODES).collect(),
        }
    }

    /// Parse a GET_MODE reply.
    ///
    /// The reported count is clamped to [`MAX_MODES`] and to the entries
    /// actually present in `data`; anything past the count is ignored.
    pub fn decode(data: &[u8]) -> Result<Self, Trigger5Error> {
        if data.len() < CATALOG_HEADER_LEN {
            return Err(Trigger5Error::ShortResponse {
                expected: CATALOG_HEADER_LEN,
                actual: data.len(),
            });
        }

        let reported = usize::from(u16::from_be_bytes([data[0], data[1]]));
        let present = (data.len() - CATALOG_HEADER_LEN) / MODE_ENTRY_LEN;
        let count = reported.min(MAX_MODES).min(present);

        let modes = data[CATALOG_HEADER_LEN..]
            .chunks_exact(MODE_ENTRY_LEN)
            .take(count)
            .map(|chunk| {
                let mut entry = [0u8; MODE_ENTRY_LEN];
                entry.copy_from_slice(chunk);
                DeviceMode::decode(&entry)
            })
            .collect();

        Ok(Self { modes })
    }

    /// Serialize to a full-length GET_MODE reply.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; CATALOG_LEN];
        buf[0..2].copy_from_slice(&(self.modes.len() as u16).to_be_bytes());
        for (i, mode) in self.modes.iter().enumerate() {
            let start = CATALOG_HEADER_LEN + i * MODE_ENTRY_LEN;
            buf[start..start + MODE_ENTRY_LEN].copy_from_slice(&mode.encode());
        }
        buf
    }

    /// Resolve a requested timing to a device mode identifier.
    ///
    /// Returns the first entry, in catalog order, matching width, height
    /// and refresh rate exactly. Otherwise `policy` decides.
    pub fn find(
        &self,
        width: u16,
        height: u16,
        refresh_hz: u32,
        policy: MatchPolicy,
    ) -> Result<u8, Trigger5Error> {
        let last = self.modes.last().ok_or(Trigger5Error::NoModesAvailable)?;

        if let Some(mode) = self
            .modes
            .iter()
            .find(|m| m.matches(width, height, refresh_hz))
        {
            return Ok(mode.mode_number);
        }

        match policy {
            MatchPolicy::Exact => Err(Trigger5Error::NoMatchingMode {
                width,
                height,
                refresh_hz,
            }),
            MatchPolicy::FallbackToLast => Ok(last.mode_number),
        }
    }

    /// Smallest and largest dimensions, or `None` for an empty catalog.
    pub fn size_bounds(&self) -> Option<SizeBounds> {
        let first = self.modes.first()?;
        let init = SizeBounds {
            min_width: first.width,
            min_height: first.height,
            max_width: first.width,
            max_height: first.height,
        };
        Some(self.modes.iter().fold(init, |b, m| SizeBounds {
            min_width: b.min_width.min(m.width),
            min_height: b.min_height.min(m.height),
            max_width: b.max_width.max(m.width),
            max_height: b.max_height.max(m.height),
        }))
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceMode> {
        self.modes.iter()
    }

    pub fn modes(&self) -> &[DeviceMode] {
        &self.modes
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(mode_number: u8, width: u16, height: u16, hz: u8) -> DeviceMode {
        DeviceMode {
            hz,
            clock_mhz: 0,
            bpp: 32,
            mode_number,
            height,
            width,
        }
    }

    fn sample() -> ModeCatalog {
        ModeCatalog::from_modes([
            mode(1, 640, 480, 60),
            mode(2, 800, 600, 60),
            mode(3, 1024, 768, 60),
            mode(7, 1920, 1080, 60),
        ])
    }

    #[test]
    fn exact_match_returns_identifier() {
        let cat = sample();
        assert_eq!(cat.find(640, 480, 60, MatchPolicy::Exact).unwrap(), 1);
        assert_eq!(cat.find(1024, 768, 60, MatchPolicy::FallbackToLast).unwrap(), 3);
    }

    #[test]
    fn first_match_wins() {
        let cat = ModeCatalog::from_modes([mode(4, 640, 480, 60), mode(9, 640, 480, 60)]);
        assert_eq!(cat.find(640, 480, 60, MatchPolicy::Exact).unwrap(), 4);
    }

    #[test]
    fn strict_policy_rejects_unknown_refresh() {
        let err = sample().find(640, 480, 75, MatchPolicy::Exact).unwrap_err();
        assert!(matches!(
            err,
            Trigger5Error::NoMatchingMode {
                width: 640,
                height: 480,
                refresh_hz: 75
            }
        ));
    }

    #[test]
    fn fallback_policy_returns_last_entry() {
        let id = sample()
            .find(640, 480, 75, MatchPolicy::FallbackToLast)
            .unwrap();
        assert_eq!(id, 7);
    }

    #[test]
    fn empty_catalog_fails_under_both_policies() {
        let cat = ModeCatalog::default();
        for policy in [MatchPolicy::Exact, MatchPolicy::FallbackToLast] {
            assert!(matches!(
                cat.find(640, 480, 60, policy),
                Err(Trigger5Error::NoModesAvailable)
            ));
        }
    }

    #[test]
    fn decode_wire_reply() {
        let wire = sample().encode();
        assert_eq!(wire.len(), CATALOG_LEN);
        assert_eq!(&wire[0..2], &[0x00, 0x04]);
        // 800x600 entry, width/height little-endian.
        assert_eq!(&wire[12..20], &[60, 0, 32, 2, 0x58, 0x02, 0x20, 0x03]);

        let cat = ModeCatalog::decode(&wire).unwrap();
        assert_eq!(cat, sample());
    }

    #[test]
    fn decode_ignores_entries_past_count() {
        let mut wire = sample().encode();
        wire[1] = 2;
        let cat = ModeCatalog::decode(&wire).unwrap();
        assert_eq!(cat.len(), 2);
        assert_eq!(cat.find(1920, 1080, 60, MatchPolicy::FallbackToLast).unwrap(), 2);
    }

    #[test]
    fn decode_clamps_oversized_count() {
        let mut wire = sample().encode();
        wire[0] = 0xFF;
        wire[1] = 0xFF;
        let cat = ModeCatalog::decode(&wire).unwrap();
        assert_eq!(cat.len(), MAX_MODES);

        // A truncated reply only yields the entries present.
        let cat = ModeCatalog::decode(&wire[..CATALOG_HEADER_LEN + 3 * MODE_ENTRY_LEN]).unwrap();
        assert_eq!(cat.len(), 3);
    }

    #[test]
    fn decode_short_reply() {
        assert!(matches!(
            ModeCatalog::decode(&[0x00]),
            Err(Trigger5Error::ShortResponse {
                expected: 4,
                actual: 1
            })
        ));
    }

    #[test]
    fn size_bounds_span_catalog() {
        let b = sample().size_bounds().unwrap();
        assert_eq!((b.min_width, b.min_height), (640, 480));
        assert_eq!((b.max_width, b.max_height), (1920, 1080));
        assert!(ModeCatalog::default().size_bounds().is_none());
    }
}
