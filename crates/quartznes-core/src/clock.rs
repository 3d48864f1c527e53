//! Master-clock scheduler.
//!
//! All pacing is integer arithmetic: wall time accumulates in microseconds
//! from whatever monotonic source the host reads, and the master counter is
//! `accum_us * master_hz / (1_000_000 * master_div)`. Each component owns a
//! counter in master-clock units; a component is due when its counter is at
//! or below the master counter, and ties run CPU first, then PPU, then APU,
//! which fixes the interrupt-sampling order within a tick.

use crate::region::{ClockRates, Region};

/// Microseconds per second: the wall-clock resolution used for scaling.
const WALL_RESOLUTION: u64 = 1_000_000;

/// Which component the scheduler wants ticked next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSlot {
    Cpu,
    Ppu,
    Apu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterClock {
    rates: ClockRates,
    master_counter: u64,
    cpu_counter: u64,
    ppu_counter: u64,
    apu_counter: u64,
    accum_micros: u64,
    last_micros: Option<u64>,
}

impl MasterClock {
    pub fn new(region: Region) -> Self {
        Self {
            rates: region.rates(),
            master_counter: 0,
            cpu_counter: 0,
            ppu_counter: 0,
            apu_counter: 0,
            accum_micros: 0,
            last_micros: None,
        }
    }

    pub fn rates(&self) -> &ClockRates {
        &self.rates
    }

    pub fn master_counter(&self) -> u64 {
        self.master_counter
    }

    /// Folds a new monotonic wall-clock sample (microseconds) into the
    /// master counter. The first sample only establishes the baseline.
    pub fn advance_wall(&mut self, now_micros: u64) {
        if let Some(last) = self.last_micros {
            self.accum_micros = self
                .accum_micros
                .wrapping_add(now_micros.saturating_sub(last));
        }
        self.last_micros = Some(now_micros);
        self.master_counter =
            self.accum_micros * self.rates.master_hz / (WALL_RESOLUTION * self.rates.master_div);
    }

    /// Deterministic stepping for tests and hosts that pace themselves.
    pub fn advance_master(&mut self, ticks: u64) {
        self.master_counter = self.master_counter.wrapping_add(ticks);
    }

    /// Picks the next due component and advances its counter, or `None`
    /// when everything has caught up to the master counter.
    pub fn next_due(&mut self) -> Option<ClockSlot> {
        let mut slot = None;
        let mut low = u64::MAX;
        // Tie order: CPU, PPU, APU.
        if self.cpu_counter <= self.master_counter && self.cpu_counter < low {
            slot = Some(ClockSlot::Cpu);
            low = self.cpu_counter;
        }
        if self.ppu_counter <= self.master_counter && self.ppu_counter < low {
            slot = Some(ClockSlot::Ppu);
            low = self.ppu_counter;
        }
        if self.apu_counter <= self.master_counter && self.apu_counter < low {
            slot = Some(ClockSlot::Apu);
        }
        match slot {
            Some(ClockSlot::Cpu) => self.cpu_counter += self.rates.cpu_div,
            Some(ClockSlot::Ppu) => self.ppu_counter += self.rates.ppu_div,
            Some(ClockSlot::Apu) => self.apu_counter += self.rates.apu_div,
            None => {}
        }
        slot
    }

    pub fn reset(&mut self) {
        self.master_counter = 0;
        self.cpu_counter = 0;
        self.ppu_counter = 0;
        self.apu_counter = 0;
        self.accum_micros = 0;
        self.last_micros = None;
    }

    #[cfg(feature = "savestate")]
    pub(crate) fn save_state(&self) -> ClockState {
        ClockState {
            master_counter: self.master_counter,
            cpu_counter: self.cpu_counter,
            ppu_counter: self.ppu_counter,
            apu_counter: self.apu_counter,
        }
    }

    #[cfg(feature = "savestate")]
    pub(crate) fn load_state(&mut self, state: &ClockState) {
        self.master_counter = state.master_counter;
        self.cpu_counter = state.cpu_counter;
        self.ppu_counter = state.ppu_counter;
        self.apu_counter = state.apu_counter;
        // Wall time restarts from the next sample after a load.
        self.accum_micros = 0;
        self.last_micros = None;
    }
}

/// Serializable scheduler counters.
#[cfg(feature = "savestate")]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClockState {
    pub master_counter: u64,
    pub cpu_counter: u64,
    pub ppu_counter: u64,
    pub apu_counter: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(clock: &mut MasterClock) -> (u64, u64, u64) {
        let (mut cpu, mut ppu, mut apu) = (0, 0, 0);
        while let Some(slot) = clock.next_due() {
            match slot {
                ClockSlot::Cpu => cpu += 1,
                ClockSlot::Ppu => ppu += 1,
                ClockSlot::Apu => apu += 1,
            }
        }
        (cpu, ppu, apu)
    }

    #[test]
    fn component_ratios_match_the_dividers() {
        let mut clock = MasterClock::new(Region::Ntsc);
        // 1200 master ticks: 100 CPU, 300 PPU, 50 APU.
        clock.advance_master(1200);
        let (cpu, ppu, apu) = drain(&mut clock);
        assert_eq!(cpu, 101); // counters start due at zero
        assert_eq!(ppu, 301);
        assert_eq!(apu, 51);
    }

    #[test]
    fn ties_run_cpu_then_ppu_then_apu() {
        let mut clock = MasterClock::new(Region::Ntsc);
        clock.advance_master(0);
        assert_eq!(clock.next_due(), Some(ClockSlot::Cpu));
        assert_eq!(clock.next_due(), Some(ClockSlot::Ppu));
        assert_eq!(clock.next_due(), Some(ClockSlot::Apu));
        assert_eq!(clock.next_due(), None);
    }

    #[test]
    fn wall_scaling_is_integer_exact() {
        let mut clock = MasterClock::new(Region::Ntsc);
        clock.advance_wall(0);
        clock.advance_wall(1_000_000);
        // One second of NTSC: 236_250_000 / 11 master ticks.
        assert_eq!(clock.master_counter(), 236_250_000 / 11);
    }

    #[test]
    fn first_wall_sample_is_only_a_baseline() {
        let mut clock = MasterClock::new(Region::Ntsc);
        clock.advance_wall(500_000);
        assert_eq!(clock.master_counter(), 0);
    }
}
