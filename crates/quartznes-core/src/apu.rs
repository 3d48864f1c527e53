//! Audio processing unit.
//!
//! One [`Apu::tick`] is one APU cycle (two CPU cycles); the frame sequencer
//! and the triangle/noise/DMC timers run in the CPU-cycle domain internally,
//! so each tick advances them twice. Every tick produces exactly one mixed
//! `f32` sample - the host resamples from the raw APU rate.
//!
//! Interrupts: the frame counter raises the frame IRQ in 4-step mode (read
//! `$4015` or set the inhibit bit to acknowledge), and the DMC raises its
//! own on sample completion. Both surface as separate level lines that the
//! machine folds into the CPU's IRQ source mask.

mod dmc;
mod envelope;
mod frame_counter;
mod length_counter;
mod mixer;
mod noise;
mod pulse;
mod sweep;
mod tables;
mod triangle;

use crate::region::Region;

use self::{
    dmc::Dmc, frame_counter::FrameCounter, noise::Noise, pulse::Pulse, triangle::Triangle,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Apu {
    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,
    frame_counter: FrameCounter,
    frame_irq: bool,
    region: Region,
    /// CPU-cycle counter mirrored from the bus (for `$4017` write parity).
    cpu_cycle: u64,
    sample: f32,
}

impl Apu {
    pub fn new(region: Region) -> Self {
        Self {
            pulse1: Pulse::new(true),
            pulse2: Pulse::new(false),
            triangle: Triangle::default(),
            noise: Noise::new(region),
            dmc: Dmc::new(region),
            frame_counter: FrameCounter::new(region),
            frame_irq: false,
            region,
            cpu_cycle: 0,
            sample: 0.0,
        }
    }

    pub fn reset(&mut self) {
        let region = self.region;
        *self = Self::new(region);
        // Reset behaves like a delayed $4017 write of the previous value.
        self.frame_counter.reset(0);
    }

    /// Frame IRQ line level.
    pub fn frame_irq(&self) -> bool {
        self.frame_irq
    }

    /// DMC IRQ line level.
    pub fn dmc_irq(&self) -> bool {
        self.dmc.irq
    }

    /// Most recent mixed sample.
    pub fn sample(&self) -> f32 {
        self.sample
    }

    /// Pending DMC sample fetch; the machine converts this into a DMA.
    pub(crate) fn take_dmc_fetch(&mut self) -> Option<u16> {
        self.dmc.take_fetch_request()
    }

    /// Byte delivered by the DMC DMA.
    pub(crate) fn dmc_sample_fetched(&mut self, value: u8) {
        self.dmc.sample_fetched(value);
    }

    /// Register write; `reg` is `addr & 0x1F` for `$4000-$4017`.
    pub(crate) fn cpu_write(&mut self, reg: u8, value: u8, cpu_cycle: u64) {
        match reg {
            0x00 => self.pulse1.write_control(value),
            0x01 => self.pulse1.write_sweep(value),
            0x02 => self.pulse1.write_timer_lo(value),
            0x03 => self.pulse1.write_timer_hi(value),
            0x04 => self.pulse2.write_control(value),
            0x05 => self.pulse2.write_sweep(value),
            0x06 => self.pulse2.write_timer_lo(value),
            0x07 => self.pulse2.write_timer_hi(value),
            0x08 => self.triangle.write_control(value),
            0x0A => self.triangle.write_timer_lo(value),
            0x0B => self.triangle.write_timer_hi(value),
            0x0C => self.noise.write_control(value),
            0x0E => self.noise.write_mode(value),
            0x0F => self.noise.write_length(value),
            0x10 => self.dmc.write_control(value),
            0x11 => self.dmc.write_direct_load(value),
            0x12 => self.dmc.write_sample_address(value),
            0x13 => self.dmc.write_sample_length(value),
            0x15 => {
                self.pulse1.set_enabled(value & 0x01 != 0);
                self.pulse2.set_enabled(value & 0x02 != 0);
                self.triangle.set_enabled(value & 0x04 != 0);
                self.noise.set_enabled(value & 0x08 != 0);
                self.dmc.set_enabled(value & 0x10 != 0);
            }
            0x17 => {
                self.frame_counter.write(value, cpu_cycle);
                if self.frame_counter.irq_inhibit {
                    self.frame_irq = false;
                }
            }
            _ => {}
        }
    }

    /// `$4015` read: channel length status plus the two IRQ flags. Reading
    /// acknowledges the frame IRQ.
    pub(crate) fn read_status(&mut self) -> u8 {
        let value = self.peek_status();
        self.frame_irq = false;
        value
    }

    /// `$4015` without the read side effect.
    pub(crate) fn peek_status(&self) -> u8 {
        let mut value = 0u8;
        value |= u8::from(self.pulse1.length_active());
        value |= u8::from(self.pulse2.length_active()) << 1;
        value |= u8::from(self.triangle.length_active()) << 2;
        value |= u8::from(self.noise.length_active()) << 3;
        value |= u8::from(self.dmc.active()) << 4;
        value |= u8::from(self.frame_irq) << 6;
        value |= u8::from(self.dmc.irq) << 7;
        value
    }

    /// One APU cycle: two CPU-cycle substeps, then the mix.
    pub(crate) fn tick(&mut self) {
        for _ in 0..2 {
            self.cpu_cycle = self.cpu_cycle.wrapping_add(1);
            let frame = self.frame_counter.step();
            if frame.quarter {
                self.pulse1.clock_quarter();
                self.pulse2.clock_quarter();
                self.triangle.clock_quarter();
                self.noise.clock_quarter();
            }
            if frame.half {
                self.pulse1.clock_half();
                self.pulse2.clock_half();
                self.triangle.clock_half();
                self.noise.clock_half();
            }
            if frame.irq {
                self.frame_irq = true;
            }
            self.triangle.clock_timer();
            self.noise.clock_timer();
            self.dmc.clock_timer();
        }
        self.pulse1.clock_timer();
        self.pulse2.clock_timer();

        self.sample = mixer::mix(
            self.pulse1.output(),
            self.pulse2.output(),
            self.triangle.output(),
            self.noise.output(),
            self.dmc.output(),
        );
    }
}

#[cfg(feature = "savestate")]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApuState {
    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,
    frame_counter: FrameCounter,
    frame_irq: bool,
    cpu_cycle: u64,
}

#[cfg(feature = "savestate")]
impl Apu {
    pub(crate) fn save_state(&self) -> ApuState {
        ApuState {
            pulse1: self.pulse1,
            pulse2: self.pulse2,
            triangle: self.triangle,
            noise: self.noise,
            dmc: self.dmc,
            frame_counter: self.frame_counter,
            frame_irq: self.frame_irq,
            cpu_cycle: self.cpu_cycle,
        }
    }

    pub(crate) fn load_state(&mut self, state: &ApuState) {
        self.pulse1 = state.pulse1;
        self.pulse2 = state.pulse2;
        self.triangle = state.triangle;
        self.noise = state.noise;
        self.dmc = state.dmc;
        self.frame_counter = state.frame_counter;
        self.frame_irq = state.frame_irq;
        self.cpu_cycle = state.cpu_cycle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reflects_length_counters() {
        let mut apu = Apu::new(Region::Ntsc);
        apu.cpu_write(0x15, 0x01, 0); // enable pulse 1
        apu.cpu_write(0x03, 0x08, 0); // load a length
        assert_eq!(apu.read_status() & 0x01, 0x01);
        apu.cpu_write(0x15, 0x00, 0); // disable clears the counter
        assert_eq!(apu.read_status() & 0x01, 0x00);
    }

    #[test]
    fn frame_irq_sets_and_clears_on_status_read() {
        let mut apu = Apu::new(Region::Ntsc);
        // Run one full 4-step sequence (29830 CPU cycles = 14915 APU ticks).
        for _ in 0..14915 {
            apu.tick();
        }
        assert!(apu.frame_irq());
        let status = apu.read_status();
        assert_eq!(status & 0x40, 0x40);
        assert!(!apu.frame_irq());
    }

    #[test]
    fn irq_inhibit_suppresses_and_acknowledges() {
        let mut apu = Apu::new(Region::Ntsc);
        for _ in 0..14915 {
            apu.tick();
        }
        assert!(apu.frame_irq());
        apu.cpu_write(0x17, 0x40, 0);
        assert!(!apu.frame_irq());
    }

    #[test]
    fn dmc_requests_a_fetch_when_started() {
        let mut apu = Apu::new(Region::Ntsc);
        apu.cpu_write(0x12, 0x00, 0); // address $C000
        apu.cpu_write(0x13, 0x01, 0); // 17 bytes
        apu.cpu_write(0x15, 0x10, 0); // enable DMC
        apu.tick();
        assert_eq!(apu.take_dmc_fetch(), Some(0xC000));
        apu.dmc_sample_fetched(0xAA);
        assert!(apu.take_dmc_fetch().is_none());
    }
}
