//! Region / timing profile selection.
//!
//! The master clock rates are kept in their exact rational form so the
//! scheduler can scale wall time with integer arithmetic only: the NTSC
//! master crystal is 236.25 MHz / 11 and the PAL/Dendy crystal is
//! 53.203425 MHz / 2. Each component divides the post-divisor master clock
//! further (CPU, PPU, APU columns below).

use core::fmt;

use crate::cartridge::header::TimingHint;

/// Concrete timing profile used by the CPU/PPU/APU and the scheduler.
///
/// Unlike the ROM header's timing hint this never carries "unknown" or
/// "dual"; resolution always lands on a real console profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub enum Region {
    /// North American / Japanese NTSC timing.
    #[default]
    Ntsc,
    /// European PAL timing.
    Pal,
    /// Famiclone hybrid timing (PAL clock, NTSC-style CPU divider).
    Dendy,
}

/// Integer clock constants for one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockRates {
    /// Master crystal numerator in Hz.
    pub master_hz: u64,
    /// Master crystal divisor.
    pub master_div: u64,
    /// Master ticks per CPU cycle.
    pub cpu_div: u64,
    /// Master ticks per PPU dot.
    pub ppu_div: u64,
    /// Master ticks per APU cycle.
    pub apu_div: u64,
}

impl ClockRates {
    /// Effective CPU frequency in Hz, rounded down.
    pub const fn cpu_hz(&self) -> u64 {
        self.master_hz / self.master_div / self.cpu_div
    }

    /// Effective APU sample rate in Hz, rounded down.
    pub const fn apu_hz(&self) -> u64 {
        self.master_hz / self.master_div / self.apu_div
    }
}

/// NTSC: 236.25 MHz / 11 = 21.477272... MHz master.
const NTSC_RATES: ClockRates = ClockRates {
    master_hz: 236_250_000,
    master_div: 11,
    cpu_div: 12,
    ppu_div: 4,
    apu_div: 24,
};

/// PAL: 53.203425 MHz / 2 = 26.6017125 MHz master.
const PAL_RATES: ClockRates = ClockRates {
    master_hz: 53_203_425,
    master_div: 2,
    cpu_div: 16,
    ppu_div: 5,
    apu_div: 32,
};

/// Dendy shares the PAL crystal but divides the CPU by 15.
const DENDY_RATES: ClockRates = ClockRates {
    master_hz: 53_203_425,
    master_div: 2,
    cpu_div: 15,
    ppu_div: 5,
    apu_div: 30,
};

impl Region {
    /// Clock constants for this region.
    pub const fn rates(self) -> ClockRates {
        match self {
            Region::Ntsc => NTSC_RATES,
            Region::Pal => PAL_RATES,
            Region::Dendy => DENDY_RATES,
        }
    }

    /// Resolves the effective region from an optional user request and the
    /// ROM header's timing hint. A user request always wins; a mismatch with
    /// the header is reported but honored.
    pub fn resolve(requested: Option<Region>, hint: TimingHint) -> Region {
        let from_header = match hint {
            TimingHint::Ntsc | TimingHint::MultiRegion | TimingHint::Unknown => Region::Ntsc,
            TimingHint::Pal => Region::Pal,
            TimingHint::Dendy => Region::Dendy,
        };
        match requested {
            None => from_header,
            Some(region) => {
                if region != from_header && hint != TimingHint::MultiRegion {
                    tracing::warn!(
                        requested = %region,
                        header = %from_header,
                        "requested region does not match the ROM timing hint"
                    );
                }
                region
            }
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Region::Ntsc => "ntsc",
            Region::Pal => "pal",
            Region::Dendy => "dendy",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntsc_cpu_rate_matches_hardware() {
        assert_eq!(Region::Ntsc.rates().cpu_hz(), 1_789_772);
    }

    #[test]
    fn requested_region_wins_over_header() {
        assert_eq!(
            Region::resolve(Some(Region::Pal), TimingHint::Ntsc),
            Region::Pal
        );
        assert_eq!(Region::resolve(None, TimingHint::Dendy), Region::Dendy);
    }
}
