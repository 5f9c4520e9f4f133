//! Display timings requested by the display framework.

use bitflags::bitflags;

bitflags! {
    /// Sync polarity and scan flags of a display timing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SyncFlags: u32 {
        const POSITIVE_HSYNC = 1 << 0;
        const NEGATIVE_HSYNC = 1 << 1;
        const POSITIVE_VSYNC = 1 << 2;
        const NEGATIVE_VSYNC = 1 << 3;
        const INTERLACE = 1 << 4;
        const DOUBLE_SCAN = 1 << 5;
    }
}

/// A complete display timing: geometry, blanking and pixel clock.
///
/// Horizontal values are in pixels, vertical values in lines, all
/// measured from the start of the active area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayTiming {
    /// Pixel clock in kHz.
    pub clock_khz: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub flags: SyncFlags,
}

impl DisplayTiming {
    /// Vertical refresh rate in Hz, rounded to the nearest integer.
    ///
    /// Returns 0 for a timing with no blanking totals.
    pub fn refresh_hz(&self) -> u32 {
        if self.htotal == 0 || self.vtotal == 0 {
            return 0;
        }
        let mut num = u64::from(self.clock_khz) * 1000;
        let mut den = u64::from(self.htotal) * u64::from(self.vtotal);
        if self.flags.contains(SyncFlags::INTERLACE) {
            num *= 2;
        }
        if self.flags.contains(SyncFlags::DOUBLE_SCAN) {
            den *= 2;
        }
        ((num + den / 2) / den) as u32
    }

    /// Pixel clock in Hz.
    pub fn clock_hz(&self) -> u64 {
        u64::from(self.clock_khz) * 1000
    }

    pub fn positive_hsync(&self) -> bool {
        self.flags.contains(SyncFlags::POSITIVE_HSYNC)
    }

    pub fn positive_vsync(&self) -> bool {
        self.flags.contains(SyncFlags::POSITIVE_VSYNC)
    }

    /// Look up a standard timing by name, e.g. `"1920x1080@60"`.
    pub fn preset(name: &str) -> Option<Self> {
        PRESETS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, t)| *t)
    }
}

impl std::fmt::Display for DisplayTiming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}@{} ({} kHz, {}x{} total)",
            self.hdisplay,
            self.vdisplay,
            self.refresh_hz(),
            self.clock_khz,
            self.htotal,
            self.vtotal
        )
    }
}

const fn timing(
    clock_khz: u32,
    h: [u16; 4],
    v: [u16; 4],
    flags: SyncFlags,
) -> DisplayTiming {
    DisplayTiming {
        clock_khz,
        hdisplay: h[0],
        hsync_start: h[1],
        hsync_end: h[2],
        htotal: h[3],
        vdisplay: v[0],
        vsync_start: v[1],
        vsync_end: v[2],
        vtotal: v[3],
        flags,
    }
}

const PP: SyncFlags = SyncFlags::POSITIVE_HSYNC.union(SyncFlags::POSITIVE_VSYNC);
const NN: SyncFlags = SyncFlags::NEGATIVE_HSYNC.union(SyncFlags::NEGATIVE_VSYNC);
const PN: SyncFlags = SyncFlags::POSITIVE_HSYNC.union(SyncFlags::NEGATIVE_VSYNC);

/// Standard VESA DMT / CEA-861 timings.
pub const PRESETS: &[(&str, DisplayTiming)] = &[
    ("640x480@60", timing(25_175, [640, 656, 752, 800], [480, 490, 492, 525], NN)),
    ("800x600@60", timing(40_000, [800, 840, 968, 1056], [600, 601, 605, 628], PP)),
    ("1024x768@60", timing(65_000, [1024, 1048, 1184, 1344], [768, 771, 777, 806], NN)),
    ("1280x720@60", timing(74_250, [1280, 1390, 1430, 1650], [720, 725, 730, 750], PP)),
    ("1280x1024@60", timing(108_000, [1280, 1328, 1440, 1688], [1024, 1025, 1028, 1066], PP)),
    ("1680x1050@60", timing(119_000, [1680, 1728, 1760, 1840], [1050, 1053, 1059, 1080], PN)),
    ("1600x1200@60", timing(162_000, [1600, 1664, 1856, 2160], [1200, 1201, 1204, 1250], PP)),
    ("1920x1080@60", timing(148_500, [1920, 2008, 2052, 2200], [1080, 1084, 1089, 1125], PP)),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_refresh_at_60() {
        for (name, t) in PRESETS {
            assert_eq!(t.refresh_hz(), 60, "{name}");
            assert!(name.starts_with(&format!("{}x{}", t.hdisplay, t.vdisplay)));
        }
    }

    #[test]
    fn refresh_rounds_to_nearest() {
        // 25.175 MHz / (800 * 525) = 59.94 Hz
        let t = DisplayTiming::preset("640x480@60").unwrap();
        assert_eq!(t.refresh_hz(), 60);

        let mut t = t;
        t.clock_khz = 31_500;
        assert_eq!(t.refresh_hz(), 75);
    }

    #[test]
    fn interlace_and_double_scan() {
        let mut t = DisplayTiming::preset("1920x1080@60").unwrap();
        t.flags |= SyncFlags::INTERLACE;
        assert_eq!(t.refresh_hz(), 120);
        t.flags |= SyncFlags::DOUBLE_SCAN;
        assert_eq!(t.refresh_hz(), 60);
    }

    #[test]
    fn zero_totals() {
        let mut t = DisplayTiming::preset("800x600@60").unwrap();
        t.vtotal = 0;
        assert_eq!(t.refresh_hz(), 0);
    }

    #[test]
    fn preset_lookup() {
        assert!(DisplayTiming::preset("1280X720@60").is_some());
        assert!(DisplayTiming::preset("123x45@6").is_none());
    }
}
