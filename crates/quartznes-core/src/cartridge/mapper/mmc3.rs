//! Mapper 4 (MMC3 / TxROM).
//!
//! Eight bank registers behind a select port, two PRG arrangements, CHR in
//! 2 KiB + 1 KiB pages with A12 inversion, and the scanline IRQ counter
//! clocked by PPU A12 rising edges. The A12 snoop is installed as read
//! trampolines over the `$1000-$1FFF` pattern half; an edge only counts
//! when A12 stayed low for at least three CPU cycles, which filters the
//! 8x8-sprite fetch jitter the same way the real edge detector does.

use std::borrow::Cow;

use crate::{
    bus::cpu::CpuFabric,
    bus::ppu::{bind_mirroring, PpuFabric, PpuRead},
    cartridge::header::{Header, Mirroring},
    cartridge::mapper::{
        bind_chr, bind_prg_ram, bind_prg_rom, bind_registers, Banking, Mapper, MapperBus, Window,
    },
    memory::cpu as cpu_mem,
    reset_kind::ResetKind,
};

#[cfg(feature = "savestate")]
use crate::{cartridge::mapper::BankingState, error::Error};

/// Minimum A12 low time (in CPU cycles) for a rising edge to count.
const A12_FILTER_CYCLES: u64 = 3;

#[derive(Debug, Clone)]
pub struct Mmc3 {
    banking: Banking,
    bank_select: u8,
    bank_regs: [u8; 8],
    mirroring: Mirroring,
    four_screen: bool,

    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
    last_a12_cycle: u64,
}

#[cfg(feature = "savestate")]
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Mmc3State {
    banking: BankingState,
    bank_select: u8,
    bank_regs: [u8; 8],
    horizontal: bool,
    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
}

impl Mmc3 {
    pub fn new(header: Header, mut banking: Banking) -> Self {
        banking.prg_windows = vec![
            Window::new(0x8000, 13),
            Window::new(0xA000, 13),
            Window::new(0xC000, 13),
            Window::new(0xE000, 13),
        ];
        banking.ram_windows = vec![Window::new(cpu_mem::PRG_RAM_START, 13)];
        banking.chr_windows = (0..8)
            .map(|slot| Window::new(slot * 0x400, 10))
            .collect();
        let mut mapper = Self {
            banking,
            bank_select: 0,
            bank_regs: [0; 8],
            mirroring: header.mirroring,
            four_screen: header.mirroring == Mirroring::FourScreen,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
            last_a12_cycle: 0,
        };
        mapper.apply_banks();
        mapper
    }

    fn apply_banks(&mut self) {
        let last = self.banking.last_prg_bank(13);
        let r6 = u32::from(self.bank_regs[6]);
        let r7 = u32::from(self.bank_regs[7]);
        if self.bank_select & 0x40 == 0 {
            self.banking.set_prg_bank(0, r6);
            self.banking.set_prg_bank(1, r7);
            self.banking.set_prg_bank(2, last.saturating_sub(1));
        } else {
            self.banking.set_prg_bank(0, last.saturating_sub(1));
            self.banking.set_prg_bank(1, r7);
            self.banking.set_prg_bank(2, r6);
        }
        self.banking.set_prg_bank(3, last);

        // CHR: two 2 KiB pages and four 1 KiB pages, with the halves swapped
        // when A12 inversion is on.
        let invert = usize::from((self.bank_select & 0x80) >> 5); // 0 or 4
        let r = &self.bank_regs;
        let pairs = [u32::from(r[0] & 0xFE), u32::from(r[1] & 0xFE)];
        self.banking.set_chr_bank(invert, pairs[0]);
        self.banking.set_chr_bank(invert + 1, pairs[0] + 1);
        self.banking.set_chr_bank(invert + 2, pairs[1]);
        self.banking.set_chr_bank(invert + 3, pairs[1] + 1);
        let fine = invert ^ 4;
        for (i, &reg) in r[2..6].iter().enumerate() {
            self.banking.set_chr_bank(fine + i, u32::from(reg));
        }
    }
}

impl Mapper for Mmc3 {
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
        bind_prg_rom(cpu, 0x8000..=0x9FFF, 0);
        bind_prg_rom(cpu, 0xA000..=0xBFFF, 1);
        bind_prg_rom(cpu, 0xC000..=0xDFFF, 2);
        bind_prg_rom(cpu, 0xE000..=cpu_mem::ADDR_END, 3);
        bind_registers(cpu, 0x8000..=cpu_mem::ADDR_END);
        let writable = self.banking.chr.is_ram();
        for slot in 0..8u8 {
            let base = u16::from(slot) * 0x400;
            bind_chr(ppu, base..=base + 0x3FF, slot, writable);
        }
        bind_mirroring(ppu, self.mirroring);

        // A12 rising-edge snoop over the high pattern half.
        for addr in 0x1000..=0x1FFF {
            ppu.install_read_trampoline(addr, |id| PpuRead::A12 { id });
        }
    }

    fn register_write(&mut self, addr: u16, value: u8, _cpu_cycle: u64, bus: &mut MapperBus<'_>) {
        match (addr & 0xE000, addr & 1) {
            (0x8000, 0) => {
                self.bank_select = value;
                self.apply_banks();
            }
            (0x8000, _) => {
                self.bank_regs[(self.bank_select & 0x07) as usize] = value;
                self.apply_banks();
            }
            (0xA000, 0) => {
                // Hardwired four-screen boards ignore the mirroring port.
                if !self.four_screen {
                    self.mirroring = if value & 0x01 != 0 {
                        Mirroring::Horizontal
                    } else {
                        Mirroring::Vertical
                    };
                    bind_mirroring(bus.ppu, self.mirroring);
                }
            }
            (0xA000, _) => {
                // PRG-RAM protect; battery saves work fine without
                // enforcing it, and some titles misprogram the bits.
            }
            (0xC000, 0) => self.irq_latch = value,
            (0xC000, _) => self.irq_reload = true,
            (0xE000, 0) => {
                self.irq_enabled = false;
                self.irq_pending = false;
            }
            _ => self.irq_enabled = true,
        }
    }

    fn ppu_a12_high(&mut self, cpu_cycle: u64) {
        let low_time = cpu_cycle.wrapping_sub(self.last_a12_cycle);
        self.last_a12_cycle = cpu_cycle;
        if low_time < A12_FILTER_CYCLES {
            return;
        }
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }
        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn reset(&mut self, _kind: ResetKind) {
        self.bank_select = 0;
        self.bank_regs = [0; 8];
        self.irq_latch = 0;
        self.irq_counter = 0;
        self.irq_reload = false;
        self.irq_enabled = false;
        self.irq_pending = false;
        self.apply_banks();
    }

    fn mapper_id(&self) -> u16 {
        4
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("MMC3")
    }

    #[cfg(feature = "savestate")]
    fn save_state(&self) -> Vec<u8> {
        let state = Mmc3State {
            banking: self.banking.save_state(),
            bank_select: self.bank_select,
            bank_regs: self.bank_regs,
            horizontal: self.mirroring == Mirroring::Horizontal,
            irq_latch: self.irq_latch,
            irq_counter: self.irq_counter,
            irq_reload: self.irq_reload,
            irq_enabled: self.irq_enabled,
            irq_pending: self.irq_pending,
        };
        postcard::to_stdvec(&state).unwrap_or_default()
    }

    #[cfg(feature = "savestate")]
    fn load_state(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let state: Mmc3State = postcard::from_bytes(bytes)?;
        self.banking.load_state(&state.banking);
        self.bank_select = state.bank_select;
        self.bank_regs = state.bank_regs;
        if !self.four_screen {
            self.mirroring = if state.horizontal {
                Mirroring::Horizontal
            } else {
                Mirroring::Vertical
            };
        }
        self.irq_latch = state.irq_latch;
        self.irq_counter = state.irq_counter;
        self.irq_reload = state.irq_reload;
        self.irq_enabled = state.irq_enabled;
        self.irq_pending = state.irq_pending;
        self.apply_banks();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::{RomFormat, TimingHint};

    fn mmc3() -> Mmc3 {
        let header = Header {
            format: RomFormat::INes,
            mapper: 4,
            submapper: 0,
            mirroring: Mirroring::Vertical,
            battery_backed: false,
            trainer_present: false,
            prg_rom_size: 0x20000,
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
        Mmc3::new(header, Banking::from_header(&header, prg.into(), chr.into()))
    }

    fn write(mapper: &mut Mmc3, addr: u16, value: u8) {
        let mut cpu = crate::bus::cpu::power_on_fabric();
        let mut ppu = crate::bus::ppu::power_on_fabric();
        let mut bus = MapperBus {
            cpu: &mut cpu,
            ppu: &mut ppu,
        };
        mapper.register_write(addr, value, 0, &mut bus);
    }

    #[test]
    fn prg_mode_swaps_the_switchable_windows() {
        let mut mapper = mmc3();
        write(&mut mapper, 0x8000, 6);
        write(&mut mapper, 0x8001, 4); // R6 = 4
        assert_eq!(mapper.banking.prg_read(0, 0x8000), 4);
        assert_eq!(mapper.banking.prg_read(2, 0xC000), 14); // last - 1
        write(&mut mapper, 0x8000, 0x46);
        assert_eq!(mapper.banking.prg_read(0, 0x8000), 14);
        assert_eq!(mapper.banking.prg_read(2, 0xC000), 4);
        // $E000 stays fixed to the last bank in both modes.
        assert_eq!(mapper.banking.prg_read(3, 0xE000), 15);
    }

    #[test]
    fn irq_counter_reloads_then_fires_on_filtered_edges() {
        let mut mapper = mmc3();
        write(&mut mapper, 0xC000, 2); // latch
        write(&mut mapper, 0xC001, 0); // reload
        write(&mut mapper, 0xE001, 0); // enable
        let mut cycle = 100;
        // Edge 1: reload to 2; edges 2-3 count down to 0 and assert.
        for _ in 0..3 {
            mapper.ppu_a12_high(cycle);
            cycle += 114;
        }
        assert!(mapper.irq_pending());
        // Acknowledge and disable.
        write(&mut mapper, 0xE000, 0);
        assert!(!mapper.irq_pending());
    }

    #[test]
    fn fast_toggles_are_filtered_out() {
        let mut mapper = mmc3();
        write(&mut mapper, 0xC000, 1);
        write(&mut mapper, 0xC001, 0);
        write(&mut mapper, 0xE001, 0);
        mapper.ppu_a12_high(100); // reload
        mapper.ppu_a12_high(101); // too soon: ignored
        assert!(!mapper.irq_pending());
        mapper.ppu_a12_high(150); // counts: 1 -> 0, fires
        assert!(mapper.irq_pending());
    }
}
