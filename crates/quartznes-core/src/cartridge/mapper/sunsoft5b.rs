//! Mapper 69 (Sunsoft FME-7 / 5B).
//!
//! Everything funnels through a command port at `$8000` and a parameter
//! port at `$A000`: eight 1 KiB CHR banks, four 8 KiB PRG windows (the
//! `$6000` window can select ROM, RAM, or nothing), mirroring, and a 16-bit
//! down-counting IRQ timer. The 5B variant adds the YM2149-derived sound
//! generator behind `$C000/$E000`: three tone channels with 4-bit volumes
//! and a shared envelope. The chip's output stage compresses loud passages;
//! that shaping is applied per sample in `post_process_sample`.

use std::borrow::Cow;

use crate::{
    bus::cpu::{CpuFabric, CpuRead, CpuWrite},
    bus::ppu::{bind_mirroring, PpuFabric},
    cartridge::header::{Header, Mirroring},
    cartridge::mapper::{
        bind_chr, bind_prg_rom, bind_registers, Banking, Mapper, MapperBus, Window,
    },
    memory::cpu as cpu_mem,
    reset_kind::ResetKind,
};

#[cfg(feature = "savestate")]
use crate::{cartridge::mapper::BankingState, error::Error};

/// How the `$6000-$7FFF` window is routed by command 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
enum WorkWindow {
    Rom,
    Ram,
    /// RAM selected but disabled: reads float, writes drop.
    Open,
}

/// One 5B tone channel (square wave, 12-bit period).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
struct ToneChannel {
    period: u16,
    counter: u16,
    output_high: bool,
    disabled: bool,
    volume: u8,
    use_envelope: bool,
}

impl ToneChannel {
    /// Clocked at CPU/16 like the YM2149 tone prescaler.
    fn clock(&mut self) {
        if self.counter == 0 {
            self.counter = self.period.max(1);
            self.output_high = !self.output_high;
        } else {
            self.counter -= 1;
        }
    }

    fn amplitude(&self, envelope_level: u8) -> u8 {
        if self.disabled || !self.output_high {
            return 0;
        }
        if self.use_envelope {
            envelope_level
        } else {
            self.volume
        }
    }
}

/// The 5B envelope generator (32-step, continue/attack/alternate/hold).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
struct EnvelopeUnit {
    period: u16,
    counter: u16,
    step: u8,
    shape: u8,
    holding: bool,
}

impl EnvelopeUnit {
    fn restart(&mut self, shape: u8) {
        self.shape = shape & 0x0F;
        self.step = 0;
        self.holding = false;
        self.counter = 0;
    }

    fn clock(&mut self) {
        if self.holding {
            return;
        }
        if self.counter < self.period {
            self.counter += 1;
            return;
        }
        self.counter = 0;
        self.step += 1;
        if self.step == 32 {
            self.step = 0;
            if self.shape & 0x08 == 0 || self.shape & 0x01 != 0 {
                // One-shot shapes park at their final level.
                self.holding = true;
                self.step = 31;
            } else if self.shape & 0x02 != 0 {
                // Alternating shapes flip direction each pass.
                self.shape ^= 0x04;
            }
        }
    }

    fn level(&self) -> u8 {
        let step = if self.shape & 0x04 != 0 {
            self.step
        } else {
            31 - self.step
        };
        step >> 1
    }
}

#[derive(Debug, Clone)]
pub struct Sunsoft5b {
    banking: Banking,
    command: u8,
    work_window: WorkWindow,
    work_rom_bank: u32,
    mirroring: Mirroring,

    irq_enabled: bool,
    irq_counter_enabled: bool,
    irq_counter: u16,
    irq_pending: bool,

    audio_register: u8,
    tones: [ToneChannel; 3],
    envelope: EnvelopeUnit,
    audio_prescaler: u8,
    /// Peak follower driving the output volume crunch.
    crunch_peak: f32,
}

#[cfg(feature = "savestate")]
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Sunsoft5bState {
    banking: BankingState,
    command: u8,
    work_window: WorkWindow,
    work_rom_bank: u32,
    mirroring_bits: u8,
    irq_enabled: bool,
    irq_counter_enabled: bool,
    irq_counter: u16,
    irq_pending: bool,
    audio_register: u8,
    tones: [ToneChannel; 3],
    envelope: EnvelopeUnit,
}

impl Sunsoft5b {
    pub fn new(header: Header, mut banking: Banking) -> Self {
        banking.prg_windows = vec![
            Window::new(cpu_mem::PRG_RAM_START, 13), // $6000 when ROM-routed
            Window::new(0x8000, 13),
            Window::new(0xA000, 13),
            Window::new(0xC000, 13),
            Window::new(0xE000, 13),
        ];
        banking.ram_windows = vec![Window::new(cpu_mem::PRG_RAM_START, 13)];
        banking.chr_windows = (0..8u16)
            .map(|slot| Window::new(slot * 0x400, 10))
            .collect();
        let last = banking.last_prg_bank(13);
        banking.prg_windows[4].bank = last;
        Self {
            banking,
            command: 0,
            work_window: WorkWindow::Rom,
            work_rom_bank: 0,
            mirroring: header.mirroring,
            irq_enabled: false,
            irq_counter_enabled: false,
            irq_counter: 0,
            irq_pending: false,
            audio_register: 0,
            tones: [ToneChannel::default(); 3],
            envelope: EnvelopeUnit::default(),
            audio_prescaler: 0,
            crunch_peak: 0.0,
        }
    }

    /// Re-routes the `$6000` window after command 8.
    fn bind_work_window(&self, cpu: &mut CpuFabric) {
        let range = cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END;
        match self.work_window {
            WorkWindow::Rom => {
                cpu.set_read_range(range.clone(), CpuRead::PrgRom { slot: 0 });
                cpu.set_write_range(range, CpuWrite::Ignore);
            }
            WorkWindow::Ram => {
                cpu.set_read_range(range.clone(), CpuRead::PrgRam { slot: 0 });
                cpu.set_write_range(range, CpuWrite::PrgRam { slot: 0 });
            }
            WorkWindow::Open => {
                cpu.set_read_range(range.clone(), CpuRead::Open);
                cpu.set_write_range(range, CpuWrite::Ignore);
            }
        }
    }

    fn write_parameter(&mut self, value: u8, bus: &mut MapperBus<'_>) {
        match self.command {
            0x0..=0x7 => self.banking.set_chr_bank(self.command as usize, u32::from(value)),
            0x8 => {
                self.work_window = if value & 0x40 == 0 {
                    WorkWindow::Rom
                } else if value & 0x80 != 0 {
                    WorkWindow::Ram
                } else {
                    WorkWindow::Open
                };
                self.work_rom_bank = u32::from(value & 0x3F);
                self.banking.set_prg_bank(0, self.work_rom_bank);
                self.bind_work_window(bus.cpu);
            }
            0x9..=0xB => {
                let slot = (self.command - 0x9 + 1) as usize;
                self.banking.set_prg_bank(slot, u32::from(value & 0x3F));
            }
            0xC => {
                self.mirroring = match value & 0x03 {
                    0 => Mirroring::Vertical,
                    1 => Mirroring::Horizontal,
                    2 => Mirroring::SingleScreenA,
                    _ => Mirroring::SingleScreenB,
                };
                bind_mirroring(bus.ppu, self.mirroring);
            }
            0xD => {
                self.irq_enabled = value & 0x01 != 0;
                self.irq_counter_enabled = value & 0x80 != 0;
                // Writing the control register acknowledges the IRQ.
                self.irq_pending = false;
            }
            0xE => self.irq_counter = (self.irq_counter & 0xFF00) | u16::from(value),
            _ => self.irq_counter = (self.irq_counter & 0x00FF) | (u16::from(value) << 8),
        }
    }

    fn write_audio(&mut self, value: u8) {
        match self.audio_register {
            0x0 | 0x2 | 0x4 => {
                let tone = &mut self.tones[(self.audio_register >> 1) as usize];
                tone.period = (tone.period & 0x0F00) | u16::from(value);
            }
            0x1 | 0x3 | 0x5 => {
                let tone = &mut self.tones[(self.audio_register >> 1) as usize];
                tone.period = (tone.period & 0x00FF) | (u16::from(value & 0x0F) << 8);
            }
            0x7 => {
                for (i, tone) in self.tones.iter_mut().enumerate() {
                    tone.disabled = value & (1 << i) != 0;
                }
            }
            0x8 | 0x9 | 0xA => {
                let tone = &mut self.tones[(self.audio_register - 0x8) as usize];
                tone.volume = value & 0x0F;
                tone.use_envelope = value & 0x10 != 0;
            }
            0xB => self.envelope.period = (self.envelope.period & 0xFF00) | u16::from(value),
            0xC => {
                self.envelope.period =
                    (self.envelope.period & 0x00FF) | (u16::from(value) << 8);
            }
            0xD => self.envelope.restart(value),
            _ => {}
        }
    }
}

impl Mapper for Sunsoft5b {
    fn banking(&self) -> &Banking {
        &self.banking
    }

    fn banking_mut(&mut self) -> &mut Banking {
        &mut self.banking
    }

    fn attach(&mut self, cpu: &mut CpuFabric, ppu: &mut PpuFabric) {
        self.bind_work_window(cpu);
        bind_prg_rom(cpu, 0x8000..=0x9FFF, 1);
        bind_prg_rom(cpu, 0xA000..=0xBFFF, 2);
        bind_prg_rom(cpu, 0xC000..=0xDFFF, 3);
        bind_prg_rom(cpu, 0xE000..=cpu_mem::ADDR_END, 4);
        bind_registers(cpu, 0x8000..=cpu_mem::ADDR_END);
        let writable = self.banking.chr.is_ram();
        for slot in 0..8u8 {
            let base = u16::from(slot) * 0x400;
            bind_chr(ppu, base..=base + 0x3FF, slot, writable);
        }
        bind_mirroring(ppu, self.mirroring);
    }

    fn register_write(&mut self, addr: u16, value: u8, _cpu_cycle: u64, bus: &mut MapperBus<'_>) {
        match addr & 0xE000 {
            0x8000 => self.command = value & 0x0F,
            0xA000 => self.write_parameter(value, bus),
            0xC000 => self.audio_register = value & 0x0F,
            _ => self.write_audio(value),
        }
    }

    fn tick(&mut self, _cpu_cycle: u64) {
        // IRQ timer: decrements every CPU cycle, asserts on underflow.
        if self.irq_counter_enabled {
            let (next, underflow) = self.irq_counter.overflowing_sub(1);
            self.irq_counter = next;
            if underflow && self.irq_enabled {
                self.irq_pending = true;
            }
        }

        // Audio prescaler: tone and envelope units run at CPU/16.
        self.audio_prescaler = (self.audio_prescaler + 1) & 0x0F;
        if self.audio_prescaler == 0 {
            for tone in &mut self.tones {
                tone.clock();
            }
            self.envelope.clock();
        }
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn ext_audio_sample(&mut self, apu_sample: f32) -> f32 {
        let level = self.envelope.level();
        let sum: f32 = self
            .tones
            .iter()
            .map(|tone| f32::from(tone.amplitude(level)))
            .sum();
        apu_sample + sum / 45.0 * 0.6
    }

    fn post_process_sample(&mut self, sample: f32, out_hz: u32) -> f32 {
        // The 5B's output stage compresses peaks. Follow the absolute level
        // with a fast attack and a slow, rate-dependent release, then scale
        // loud passages down toward the follower.
        let magnitude = sample.abs();
        if magnitude > self.crunch_peak {
            self.crunch_peak = magnitude;
        } else {
            let release = 1.0 / out_hz.max(1) as f32;
            self.crunch_peak = (self.crunch_peak - release).max(0.0);
        }
        if self.crunch_peak > 1.0 {
            sample / self.crunch_peak
        } else {
            sample
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn reset(&mut self, _kind: ResetKind) {
        self.command = 0;
        self.work_window = WorkWindow::Rom;
        self.work_rom_bank = 0;
        self.irq_enabled = false;
        self.irq_counter_enabled = false;
        self.irq_counter = 0;
        self.irq_pending = false;
        self.audio_register = 0;
        self.tones = [ToneChannel::default(); 3];
        self.envelope = EnvelopeUnit::default();
        self.audio_prescaler = 0;
        self.crunch_peak = 0.0;
        self.banking.set_prg_bank(0, 0);
    }

    fn mapper_id(&self) -> u16 {
        69
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("Sunsoft FME-7/5B")
    }

    #[cfg(feature = "savestate")]
    fn save_state(&self) -> Vec<u8> {
        let mirroring_bits = match self.mirroring {
            Mirroring::Vertical => 0,
            Mirroring::Horizontal => 1,
            Mirroring::SingleScreenA => 2,
            _ => 3,
        };
        let state = Sunsoft5bState {
            banking: self.banking.save_state(),
            command: self.command,
            work_window: self.work_window,
            work_rom_bank: self.work_rom_bank,
            mirroring_bits,
            irq_enabled: self.irq_enabled,
            irq_counter_enabled: self.irq_counter_enabled,
            irq_counter: self.irq_counter,
            irq_pending: self.irq_pending,
            audio_register: self.audio_register,
            tones: self.tones,
            envelope: self.envelope,
        };
        postcard::to_stdvec(&state).unwrap_or_default()
    }

    #[cfg(feature = "savestate")]
    fn load_state(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let state: Sunsoft5bState = postcard::from_bytes(bytes)?;
        self.banking.load_state(&state.banking);
        self.command = state.command;
        self.work_window = state.work_window;
        self.work_rom_bank = state.work_rom_bank;
        self.mirroring = match state.mirroring_bits {
            0 => Mirroring::Vertical,
            1 => Mirroring::Horizontal,
            2 => Mirroring::SingleScreenA,
            _ => Mirroring::SingleScreenB,
        };
        self.irq_enabled = state.irq_enabled;
        self.irq_counter_enabled = state.irq_counter_enabled;
        self.irq_counter = state.irq_counter;
        self.irq_pending = state.irq_pending;
        self.audio_register = state.audio_register;
        self.tones = state.tones;
        self.envelope = state.envelope;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::{RomFormat, TimingHint};

    fn fme7() -> Sunsoft5b {
        let header = Header {
            format: RomFormat::INes,
            mapper: 69,
            submapper: 0,
            mirroring: Mirroring::Vertical,
            battery_backed: false,
            trainer_present: false,
            prg_rom_size: 0x40000,
            chr_rom_size: 0x20000,
            prg_ram_size: 0x2000,
            prg_nvram_size: 0,
            chr_ram_size: 0,
            chr_nvram_size: 0,
            timing: TimingHint::Ntsc,
        };
        let prg: Vec<u8> = (0..header.prg_rom_size)
            .map(|i| (i / 0x2000) as u8)
            .collect();
        let chr = vec![0u8; header.chr_rom_size];
        Sunsoft5b::new(header, Banking::from_header(&header, prg.into(), chr.into()))
    }

    fn write(mapper: &mut Sunsoft5b, addr: u16, value: u8) {
        let mut cpu = crate::bus::cpu::power_on_fabric();
        let mut ppu = crate::bus::ppu::power_on_fabric();
        let mut bus = MapperBus {
            cpu: &mut cpu,
            ppu: &mut ppu,
        };
        mapper.register_write(addr, value, 0, &mut bus);
    }

    #[test]
    fn command_port_selects_prg_banks() {
        let mut mapper = fme7();
        write(&mut mapper, 0x8000, 0x9);
        write(&mut mapper, 0xA000, 12);
        assert_eq!(mapper.banking.prg_read(1, 0x8000), 12);
        // $E000 stays fixed at the last bank.
        assert_eq!(mapper.banking.prg_read(4, 0xE000), 31);
    }

    #[test]
    fn irq_timer_fires_on_underflow() {
        let mut mapper = fme7();
        write(&mut mapper, 0x8000, 0xE);
        write(&mut mapper, 0xA000, 2); // counter low
        write(&mut mapper, 0x8000, 0xF);
        write(&mut mapper, 0xA000, 0); // counter high
        write(&mut mapper, 0x8000, 0xD);
        write(&mut mapper, 0xA000, 0x81); // enable counter + IRQ
        mapper.tick(0); // 2 -> 1
        mapper.tick(1); // 1 -> 0
        assert!(!mapper.irq_pending());
        mapper.tick(2); // underflow
        assert!(mapper.irq_pending());
        write(&mut mapper, 0x8000, 0xD);
        write(&mut mapper, 0xA000, 0x81); // control write acknowledges
        assert!(!mapper.irq_pending());
    }

    #[test]
    fn tone_channel_oscillates_and_mixes() {
        let mut mapper = fme7();
        write(&mut mapper, 0xC000, 0x8);
        write(&mut mapper, 0xE000, 0x0F); // tone 0 volume 15
        write(&mut mapper, 0xC000, 0x0);
        write(&mut mapper, 0xE000, 0x01); // short period
        let mut saw_sound = false;
        for cycle in 0..256 {
            mapper.tick(cycle);
            if mapper.ext_audio_sample(0.0) > 0.0 {
                saw_sound = true;
            }
        }
        assert!(saw_sound);
    }
}
