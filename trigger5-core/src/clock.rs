//! Pixel clock synthesizer.
//!
//! The adapter derives its pixel clock from a 10 MHz reference through a
//! pre-divider and two multiplier/divider stages:
//!
//! ```text
//! f = 10 MHz × mul1 × mul2 / prediv / div1 / div2
//! ```
//!
//! Each division truncates, in that order. [`ClockSearchSpace::synthesize`]
//! walks the whole parameter lattice and keeps the tuple closest to the
//! requested clock. The walk is pure and deterministic: candidates are
//! visited prediv-major, then mul1, mul2, div1 and div2, and a later
//! candidate replaces the best only if its error is strictly smaller.

use serde::{Deserialize, Serialize};

/// Reference oscillator frequency in Hz.
pub const REFERENCE_HZ: u64 = 10_000_000;

/// Largest clock error, in parts per million, a timing may carry.
pub const MAX_ERROR_PPM: u64 = 10_000;

// ── ClockParameters ──────────────────────────────────────────────

/// Synthesizer register values, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClockParameters {
    pub prediv: u8,
    pub mul1: u8,
    pub mul2: u8,
    pub div1: u8,
    pub div2: u8,
}

impl ClockParameters {
    /// Encoded size on the wire.
    pub const SIZE: usize = 5;

    /// Output frequency in Hz, using the device's truncating arithmetic.
    pub fn output_hz(&self) -> u64 {
        REFERENCE_HZ * u64::from(self.mul1) * u64::from(self.mul2)
            / u64::from(self.prediv.max(1))
            / u64::from(self.div1.max(1))
            / u64::from(self.div2.max(1))
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [self.prediv, self.mul1, self.mul2, self.div1, self.div2]
    }

    pub fn from_bytes(b: [u8; Self::SIZE]) -> Self {
        Self {
            prediv: b[0],
            mul1: b[1],
            mul2: b[2],
            div1: b[3],
            div2: b[4],
        }
    }
}

impl std::fmt::Display for ClockParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02x} {:02x} {:02x} {:02x} {:02x}",
            self.prediv, self.mul1, self.mul2, self.div1, self.div2
        )
    }
}

// ── ClockFit ─────────────────────────────────────────────────────

/// Result of a synthesizer search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockFit {
    pub params: ClockParameters,
    pub target_hz: u64,
    pub achieved_hz: u64,
    pub error_hz: u64,
}

impl ClockFit {
    fn of(params: ClockParameters, target_hz: u64) -> Self {
        let achieved_hz = params.output_hz();
        Self {
            params,
            target_hz,
            achieved_hz,
            error_hz: achieved_hz.abs_diff(target_hz),
        }
    }

    pub fn achieved_khz(&self) -> u64 {
        self.achieved_hz / 1000
    }

    pub fn error_khz(&self) -> u64 {
        self.error_hz / 1000
    }

    /// Relative error in parts per million of the target.
    pub fn error_ppm(&self) -> u64 {
        if self.target_hz == 0 {
            return if self.error_hz == 0 { 0 } else { u64::MAX };
        }
        self.error_hz.saturating_mul(1_000_000) / self.target_hz
    }

    /// Whether the fit is within `max_ppm` of the target.
    pub fn is_within(&self, max_ppm: u64) -> bool {
        self.error_ppm() <= max_ppm
    }
}

// ── ClockSearchSpace ─────────────────────────────────────────────

/// Bounds of the synthesizer parameter lattice.
///
/// `prediv` and `div2` step through powers of two; `mul1`, `mul2` and
/// `div1` step linearly from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockSearchSpace {
    prediv_max: u8,
    mul_max: u8,
    div1_max: u8,
    div2_min: u8,
    div2_max: u8,
}

impl Default for ClockSearchSpace {
    /// The ranges observed in vendor driver captures.
    fn default() -> Self {
        Self {
            prediv_max: 0x10,
            mul_max: 0x32,
            div1_max: 0x32,
            div2_min: 0x02,
            div2_max: 0x10,
        }
    }
}

impl ClockSearchSpace {
    /// Build a search space. Bounds are raised as needed so that every
    /// range holds at least one value. The second divider range is
    /// snapped to powers of two: `div2_min` rounds up, `div2_max` down.
    pub fn new(prediv_max: u8, mul_max: u8, div1_max: u8, div2_min: u8, div2_max: u8) -> Self {
        let div2_min = div2_min.max(1).checked_next_power_of_two().unwrap_or(0x80);
        Self {
            prediv_max: prediv_max.max(1),
            mul_max: mul_max.max(1),
            div1_max: div1_max.max(1),
            div2_min,
            div2_max: floor_power_of_two(div2_max).max(div2_min),
        }
    }

    /// Number of candidates visited by a full search.
    pub fn size(&self) -> usize {
        powers_of_two(1, self.prediv_max).count()
            * usize::from(self.mul_max).pow(2)
            * usize::from(self.div1_max)
            * powers_of_two(self.div2_min, self.div2_max).count()
    }

    /// Every candidate tuple, in search order.
    pub fn candidates(&self) -> impl Iterator<Item = ClockParameters> + '_ {
        powers_of_two(1, self.prediv_max).flat_map(move |prediv| {
            (1..=self.mul_max).flat_map(move |mul1| {
                (1..=self.mul_max).flat_map(move |mul2| {
                    (1..=self.div1_max).flat_map(move |div1| {
                        powers_of_two(self.div2_min, self.div2_max).map(move |div2| {
                            ClockParameters {
                                prediv,
                                mul1,
                                mul2,
                                div1,
                                div2,
                            }
                        })
                    })
                })
            })
        })
    }

    /// Find the tuple whose output is closest to `target_khz`.
    ///
    /// Never fails: targets outside the reachable range get the nearest
    /// reachable clock. The search stops early on an exact hit since no
    /// later candidate could replace it.
    pub fn synthesize(&self, target_khz: u32) -> ClockFit {
        let target_hz = u64::from(target_khz) * 1000;
        let first = ClockParameters {
            prediv: 1,
            mul1: 1,
            mul2: 1,
            div1: 1,
            div2: self.div2_min,
        };
        let mut best = ClockFit {
            error_hz: u64::MAX,
            ..ClockFit::of(first, target_hz)
        };

        for params in self.candidates() {
            let fit = ClockFit::of(params, target_hz);
            if fit.error_hz < best.error_hz {
                best = fit;
                if best.error_hz == 0 {
                    break;
                }
            }
        }
        best
    }
}

fn floor_power_of_two(v: u8) -> u8 {
    match v {
        0 => 1,
        v => 1 << (u8::BITS - 1 - v.leading_zeros()),
    }
}

/// Powers of two in `start..=max`, where `start` is itself a power of two.
fn powers_of_two(start: u8, max: u8) -> impl Iterator<Item = u8> + Clone {
    std::iter::successors(Some(start), |p| p.checked_mul(2)).take_while(move |p| *p <= max)
}

/// Search the default lattice for `target_khz`.
pub fn synthesize(target_khz: u32) -> ClockFit {
    ClockSearchSpace::default().synthesize(target_khz)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::timing::PRESETS;

    fn params(b: [u8; 5]) -> ClockParameters {
        ClockParameters::from_bytes(b)
    }

    #[test]
    fn captured_register_values() {
        // Tuples captured from the vendor driver and the clocks they drove.
        let captures = [
            ([0x01, 0x28, 0x0a, 0x19, 0x04], 40_000_000),
            ([0x01, 0x29, 0x1a, 0x29, 0x04], 65_000_000),
            ([0x01, 0x27, 0x0a, 0x1e, 0x02], 65_000_000),
            ([0x01, 0x2d, 0x21, 0x32, 0x04], 74_250_000),
            ([0x01, 0x2d, 0x18, 0x32, 0x02], 108_000_000),
            ([0x01, 0x31, 0x11, 0x23, 0x02], 119_000_000),
            ([0x01, 0x2d, 0x24, 0x32, 0x02], 162_000_000),
            ([0x01, 0x2c, 0x1b, 0x28, 0x02], 148_500_000),
        ];
        for (bytes, hz) in captures {
            assert_eq!(params(bytes).output_hz(), hz, "{}", params(bytes));
        }
    }

    #[test]
    fn candidate_order_is_prediv_major() {
        let space = ClockSearchSpace::default();
        let first: Vec<[u8; 5]> = space.candidates().take(5).map(|p| p.to_bytes()).collect();
        assert_eq!(
            first,
            vec![
                [1, 1, 1, 1, 2],
                [1, 1, 1, 1, 4],
                [1, 1, 1, 1, 8],
                [1, 1, 1, 1, 16],
                [1, 1, 1, 2, 2],
            ]
        );
        assert_eq!(space.candidates().count(), space.size());
        assert_eq!(space.size(), 5 * 50 * 50 * 50 * 4);
    }

    #[test]
    fn exact_clock_is_found() {
        let fit = synthesize(148_500);
        assert_eq!(fit.error_hz, 0);
        assert_eq!(fit.achieved_hz, 148_500_000);
        assert_eq!(fit.achieved_khz(), 148_500);
        assert_eq!(fit.params.output_hz(), fit.achieved_hz);
    }

    #[test]
    fn first_best_wins() {
        let space = ClockSearchSpace::default();
        let target_hz = 65_000_000;
        let expected = space
            .candidates()
            .find(|p| p.output_hz() == target_hz)
            .unwrap();
        assert_eq!(space.synthesize(65_000).params, expected);
    }

    #[test]
    fn search_is_deterministic() {
        let a = synthesize(25_175);
        let b = synthesize(25_175);
        assert_eq!(a, b);
        assert_eq!(a.params.output_hz(), a.achieved_hz);
        assert_eq!(a.error_hz, a.achieved_hz.abs_diff(25_175_000));
    }

    #[test]
    fn presets_are_within_tolerance() {
        for (name, t) in PRESETS {
            let fit = synthesize(t.clock_khz);
            assert!(fit.is_within(MAX_ERROR_PPM), "{name}: {} ppm", fit.error_ppm());
        }
    }

    #[test]
    fn unreachable_target_gets_nearest() {
        // Above the lattice: the largest product over the smallest divisors.
        let fit = synthesize(20_000_000);
        assert_eq!(fit.params.to_bytes(), [1, 50, 50, 1, 2]);
        assert_eq!(fit.achieved_hz, 12_500_000_000);
        assert!(!fit.is_within(MAX_ERROR_PPM));

        // Below it: still a valid tuple, error bounded by the target.
        let fit = ClockSearchSpace::new(1, 2, 1, 2, 2).synthesize(1);
        assert_eq!(fit.params.to_bytes(), [1, 1, 1, 1, 2]);
        assert_eq!(fit.achieved_hz, 5_000_000);
    }

    #[test]
    fn zero_target() {
        let fit = ClockSearchSpace::new(1, 1, 1, 2, 2).synthesize(0);
        assert_eq!(fit.error_ppm(), u64::MAX);
    }

    #[test]
    fn degenerate_bounds_are_raised() {
        let space = ClockSearchSpace::new(0, 0, 0, 8, 4);
        assert_eq!(space.size(), 1);
        assert_eq!(space.synthesize(1_250).params.to_bytes(), [1, 1, 1, 1, 8]);
    }

    #[test]
    fn second_divider_snaps_to_powers_of_two() {
        let space = ClockSearchSpace::new(16, 50, 50, 3, 20);
        let div2: Vec<u8> = powers_of_two(space.div2_min, space.div2_max).collect();
        assert_eq!(div2, [4, 8, 16]);
        assert!(space.candidates().all(|p| p.div2.is_power_of_two()));

        let space = ClockSearchSpace::new(1, 1, 1, 200, 255);
        assert_eq!((space.div2_min, space.div2_max), (0x80, 0x80));
        assert_eq!(space.size(), 1);
    }

    #[test]
    fn ppm_is_relative_to_target() {
        let fit = ClockFit {
            params: params([1, 1, 1, 1, 2]),
            target_hz: 100_000_000,
            achieved_hz: 101_000_000,
            error_hz: 1_000_000,
        };
        assert_eq!(fit.error_ppm(), 10_000);
        assert!(fit.is_within(MAX_ERROR_PPM));
        assert_eq!(fit.error_khz(), 1_000);
    }
}
