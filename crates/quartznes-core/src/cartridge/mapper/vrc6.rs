//! Mappers 24/26 (Konami VRC6).
//!
//! 16 KiB + 8 KiB switchable PRG, eight 1 KiB CHR windows, the VRC IRQ
//! (cycle mode or the 341/3 scanline prescaler), and the three expansion
//! audio channels (two pulses with duty control and the 6-bit sawtooth).
//! Mapper 26 is the same chip with the two register address lines swapped.

use std::borrow::Cow;

use crate::{
    bus::cpu::CpuFabric,
    bus::ppu::{bind_mirroring, PpuFabric},
    cartridge::header::{Header, Mirroring},
    cartridge::mapper::{
        bind_chr, bind_prg_ram, bind_prg_rom, bind_registers, Banking, Mapper, MapperBus, Window,
    },
    memory::cpu as cpu_mem,
    reset_kind::ResetKind,
};

#[cfg(feature = "savestate")]
use crate::{cartridge::mapper::BankingState, error::Error};

/// VRC6 pulse channel: 4-bit volume, 3-bit duty (or digitized mode).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
struct Vrc6Pulse {
    volume: u8,
    duty: u8,
    digitized: bool,
    period: u16,
    enabled: bool,
    timer: u16,
    step: u8,
}

impl Vrc6Pulse {
    fn write_control(&mut self, value: u8) {
        self.volume = value & 0x0F;
        self.duty = (value >> 4) & 0x07;
        self.digitized = value & 0x80 != 0;
    }

    fn write_period_lo(&mut self, value: u8) {
        self.period = (self.period & 0x0F00) | u16::from(value);
    }

    fn write_period_hi(&mut self, value: u8) {
        self.period = (self.period & 0x00FF) | (u16::from(value & 0x0F) << 8);
        self.enabled = value & 0x80 != 0;
        if !self.enabled {
            self.step = 0;
        }
    }

    fn clock(&mut self) {
        if !self.enabled {
            return;
        }
        if self.timer == 0 {
            self.timer = self.period;
            self.step = (self.step + 1) & 0x0F;
        } else {
            self.timer -= 1;
        }
    }

    fn output(&self) -> u8 {
        if !self.enabled {
            return 0;
        }
        if self.digitized || self.step <= self.duty {
            self.volume
        } else {
            0
        }
    }
}

/// VRC6 sawtooth: 6-bit accumulator stepped every other timer expiry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
struct Vrc6Saw {
    rate: u8,
    period: u16,
    enabled: bool,
    timer: u16,
    accumulator: u8,
    step: u8,
}

impl Vrc6Saw {
    fn clock(&mut self) {
        if !self.enabled {
            return;
        }
        if self.timer == 0 {
            self.timer = self.period;
            self.step += 1;
            if self.step & 1 == 0 {
                self.accumulator = self.accumulator.wrapping_add(self.rate);
            }
            if self.step == 14 {
                self.step = 0;
                self.accumulator = 0;
            }
        } else {
            self.timer -= 1;
        }
    }

    fn output(&self) -> u8 {
        if self.enabled {
            self.accumulator >> 3
        } else {
            0
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vrc6 {
    banking: Banking,
    mirroring: Mirroring,
    swapped_lines: bool,

    irq_latch: u8,
    irq_counter: u8,
    irq_enabled: bool,
    irq_enable_after_ack: bool,
    irq_cycle_mode: bool,
    irq_pending: bool,
    irq_prescaler: i16,

    pulse1: Vrc6Pulse,
    pulse2: Vrc6Pulse,
    saw: Vrc6Saw,
}

#[cfg(feature = "savestate")]
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Vrc6State {
    banking: BankingState,
    mirroring_bits: u8,
    irq_latch: u8,
    irq_counter: u8,
    irq_enabled: bool,
    irq_enable_after_ack: bool,
    irq_cycle_mode: bool,
    irq_pending: bool,
    irq_prescaler: i16,
    pulse1: Vrc6Pulse,
    pulse2: Vrc6Pulse,
    saw: Vrc6Saw,
}

impl Vrc6 {
    pub fn new(header: Header, mut banking: Banking) -> Self {
        banking.prg_windows = vec![
            Window::new(0x8000, 14),
            Window::new(0xC000, 13),
            Window::new(0xE000, 13),
        ];
        banking.ram_windows = vec![Window::new(cpu_mem::PRG_RAM_START, 13)];
        banking.chr_windows = (0..8u16)
            .map(|slot| Window::new(slot * 0x400, 10))
            .collect();
        let last = banking.last_prg_bank(13);
        banking.prg_windows[2].bank = last;
        Self {
            banking,
            mirroring: header.mirroring,
            swapped_lines: header.mapper == 26,
            irq_latch: 0,
            irq_counter: 0,
            irq_enabled: false,
            irq_enable_after_ack: false,
            irq_cycle_mode: false,
            irq_pending: false,
            irq_prescaler: 341,
            pulse1: Vrc6Pulse::default(),
            pulse2: Vrc6Pulse::default(),
            saw: Vrc6Saw::default(),
        }
    }

    fn clock_irq(&mut self) {
        if self.irq_counter == 0xFF {
            self.irq_counter = self.irq_latch;
            self.irq_pending = true;
        } else {
            self.irq_counter += 1;
        }
    }
}

impl Mapper for Vrc6 {
    fn banking(&self) -> &Banking {
        &self.banking
    }

    fn banking_mut(&mut self) -> &mut Banking {
        &mut self.banking
    }

    fn attach(&mut self, cpu: &mut CpuFabric, ppu: &mut PpuFabric) {
        if !self.banking.prg_ram.is_empty() {
            bind_prg_ram(cpu, cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END, 0);
        }
        bind_prg_rom(cpu, 0x8000..=0xBFFF, 0);
        bind_prg_rom(cpu, 0xC000..=0xDFFF, 1);
        bind_prg_rom(cpu, 0xE000..=cpu_mem::ADDR_END, 2);
        bind_registers(cpu, 0x8000..=cpu_mem::ADDR_END);
        let writable = self.banking.chr.is_ram();
        for slot in 0..8u8 {
            let base = u16::from(slot) * 0x400;
            bind_chr(ppu, base..=base + 0x3FF, slot, writable);
        }
        bind_mirroring(ppu, self.mirroring);
    }

    fn register_write(&mut self, addr: u16, value: u8, _cpu_cycle: u64, bus: &mut MapperBus<'_>) {
        // Mapper 26 swaps A0/A1.
        let low = if self.swapped_lines {
            ((addr & 1) << 1) | ((addr >> 1) & 1)
        } else {
            addr & 0x03
        };
        match (addr & 0xF000, low) {
            (0x8000, _) => self.banking.set_prg_bank(0, u32::from(value & 0x0F)),
            (0xC000, _) => self.banking.set_prg_bank(1, u32::from(value & 0x1F)),
            (0x9000, 0) => self.pulse1.write_control(value),
            (0x9000, 1) => self.pulse1.write_period_lo(value),
            (0x9000, 2) => self.pulse1.write_period_hi(value),
            (0xA000, 0) => self.pulse2.write_control(value),
            (0xA000, 1) => self.pulse2.write_period_lo(value),
            (0xA000, 2) => self.pulse2.write_period_hi(value),
            (0xB000, 0) => self.saw.rate = value & 0x3F,
            (0xB000, 1) => {
                self.saw.period = (self.saw.period & 0x0F00) | u16::from(value);
            }
            (0xB000, 2) => {
                self.saw.period = (self.saw.period & 0x00FF) | (u16::from(value & 0x0F) << 8);
                self.saw.enabled = value & 0x80 != 0;
                if !self.saw.enabled {
                    self.saw.accumulator = 0;
                    self.saw.step = 0;
                }
            }
            (0xB000, 3) => {
                self.mirroring = match (value >> 2) & 0x03 {
                    0 => Mirroring::Vertical,
                    1 => Mirroring::Horizontal,
                    2 => Mirroring::SingleScreenA,
                    _ => Mirroring::SingleScreenB,
                };
                bind_mirroring(bus.ppu, self.mirroring);
            }
            (0xD000, n) => self.banking.set_chr_bank(n as usize, u32::from(value)),
            (0xE000, n) => self.banking.set_chr_bank(4 + n as usize, u32::from(value)),
            (0xF000, 0) => self.irq_latch = value,
            (0xF000, 1) => {
                self.irq_pending = false;
                self.irq_enable_after_ack = value & 0x01 != 0;
                self.irq_cycle_mode = value & 0x04 != 0;
                self.irq_enabled = value & 0x02 != 0;
                if self.irq_enabled {
                    self.irq_counter = self.irq_latch;
                    self.irq_prescaler = 341;
                }
            }
            (0xF000, 2) => {
                self.irq_pending = false;
                self.irq_enabled = self.irq_enable_after_ack;
            }
            _ => {}
        }
    }

    fn tick(&mut self, _cpu_cycle: u64) {
        self.pulse1.clock();
        self.pulse2.clock();
        self.saw.clock();

        if !self.irq_enabled {
            return;
        }
        if self.irq_cycle_mode {
            self.clock_irq();
        } else {
            // Scanline mode: one clock every 341/3 CPU cycles.
            self.irq_prescaler -= 3;
            if self.irq_prescaler <= 0 {
                self.irq_prescaler += 341;
                self.clock_irq();
            }
        }
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn ext_audio_sample(&mut self, apu_sample: f32) -> f32 {
        // Channels output 0-15 (pulses) and 0-31 (saw); the common scaling
        // puts the VRC6 mix a little under the APU's own full scale.
        let ext = f32::from(self.pulse1.output())
            + f32::from(self.pulse2.output())
            + f32::from(self.saw.output());
        apu_sample + ext / 61.0 * 0.4
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn reset(&mut self, _kind: ResetKind) {
        self.irq_latch = 0;
        self.irq_counter = 0;
        self.irq_enabled = false;
        self.irq_enable_after_ack = false;
        self.irq_cycle_mode = false;
        self.irq_pending = false;
        self.irq_prescaler = 341;
        self.pulse1 = Vrc6Pulse::default();
        self.pulse2 = Vrc6Pulse::default();
        self.saw = Vrc6Saw::default();
    }

    fn mapper_id(&self) -> u16 {
        if self.swapped_lines {
            26
        } else {
            24
        }
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("VRC6")
    }

    #[cfg(feature = "savestate")]
    fn save_state(&self) -> Vec<u8> {
        let mirroring_bits = match self.mirroring {
            Mirroring::Vertical => 0,
            Mirroring::Horizontal => 1,
            Mirroring::SingleScreenA => 2,
            _ => 3,
        };
        let state = Vrc6State {
            banking: self.banking.save_state(),
            mirroring_bits,
            irq_latch: self.irq_latch,
            irq_counter: self.irq_counter,
            irq_enabled: self.irq_enabled,
            irq_enable_after_ack: self.irq_enable_after_ack,
            irq_cycle_mode: self.irq_cycle_mode,
            irq_pending: self.irq_pending,
            irq_prescaler: self.irq_prescaler,
            pulse1: self.pulse1,
            pulse2: self.pulse2,
            saw: self.saw,
        };
        postcard::to_stdvec(&state).unwrap_or_default()
    }

    #[cfg(feature = "savestate")]
    fn load_state(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let state: Vrc6State = postcard::from_bytes(bytes)?;
        self.banking.load_state(&state.banking);
        self.mirroring = match state.mirroring_bits {
            0 => Mirroring::Vertical,
            1 => Mirroring::Horizontal,
            2 => Mirroring::SingleScreenA,
            _ => Mirroring::SingleScreenB,
        };
        self.irq_latch = state.irq_latch;
        self.irq_counter = state.irq_counter;
        self.irq_enabled = state.irq_enabled;
        self.irq_enable_after_ack = state.irq_enable_after_ack;
        self.irq_cycle_mode = state.irq_cycle_mode;
        self.irq_pending = state.irq_pending;
        self.irq_prescaler = state.irq_prescaler;
        self.pulse1 = state.pulse1;
        self.pulse2 = state.pulse2;
        self.saw = state.saw;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::{RomFormat, TimingHint};

    fn vrc6() -> Vrc6 {
        let header = Header {
            format: RomFormat::INes,
            mapper: 24,
            submapper: 0,
            mirroring: Mirroring::Vertical,
            battery_backed: false,
            trainer_present: false,
            prg_rom_size: 0x40000,
            chr_rom_size: 0x40000,
            prg_ram_size: 0x2000,
            prg_nvram_size: 0,
            chr_ram_size: 0,
            chr_nvram_size: 0,
            timing: TimingHint::Ntsc,
        };
        let prg = vec![0u8; header.prg_rom_size];
        let chr = vec![0u8; header.chr_rom_size];
        Vrc6::new(header, Banking::from_header(&header, prg.into(), chr.into()))
    }

    fn write(mapper: &mut Vrc6, addr: u16, value: u8) {
        let mut cpu = crate::bus::cpu::power_on_fabric();
        let mut ppu = crate::bus::ppu::power_on_fabric();
        let mut bus = MapperBus {
            cpu: &mut cpu,
            ppu: &mut ppu,
        };
        mapper.register_write(addr, value, 0, &mut bus);
    }

    #[test]
    fn cycle_mode_irq_counts_up_from_the_latch() {
        let mut mapper = vrc6();
        write(&mut mapper, 0xF000, 0xFD);
        write(&mut mapper, 0xF001, 0x06); // enable, cycle mode
        mapper.tick(0); // FD -> FE
        mapper.tick(1); // FE -> FF
        assert!(!mapper.irq_pending());
        mapper.tick(2); // FF wraps: IRQ + reload
        assert!(mapper.irq_pending());
        write(&mut mapper, 0xF002, 0); // acknowledge
        assert!(!mapper.irq_pending());
    }

    #[test]
    fn pulse_produces_its_volume_within_the_duty_window() {
        let mut mapper = vrc6();
        write(&mut mapper, 0x9000, 0x7A); // duty 7, volume 10
        write(&mut mapper, 0x9001, 0x00);
        write(&mut mapper, 0x9002, 0x80); // enable, period 0
        let base = mapper.ext_audio_sample(0.0);
        assert!(base > 0.0);
    }
}
