//! Mapper 9 (MMC2, Punch-Out!!).
//!
//! Each 4 KiB CHR half has two bank registers selected by a latch, and the
//! latch flips when the PPU *fetches* specific pattern addresses ($xFD8 /
//! $xFE8 regions). That snooping is exactly what the bus fabric's read
//! trampolines are for: at attach time the board wraps the trigger slots
//! with `ChrLatch` tags; the fetch completes through the saved handler and
//! the latch applies to the next one.

use std::borrow::Cow;

use crate::{
    bus::cpu::CpuFabric,
    bus::ppu::{bind_mirroring, PpuFabric, PpuRead},
    cartridge::header::{Header, Mirroring},
    cartridge::mapper::{
        bind_chr, bind_prg_rom, bind_registers, Banking, Mapper, MapperBus, Window,
    },
    memory::cpu as cpu_mem,
    reset_kind::ResetKind,
};

#[cfg(feature = "savestate")]
use crate::{cartridge::mapper::BankingState, error::Error};

/// Latch trigger keys: bit 0 = FD/FE, bit 1 = which pattern half.
const KEY_FD_LOW: u8 = 0b00;
const KEY_FE_LOW: u8 = 0b01;
const KEY_FD_HIGH: u8 = 0b10;
const KEY_FE_HIGH: u8 = 0b11;

#[derive(Debug, Clone)]
pub struct Mmc2 {
    banking: Banking,
    /// CHR bank registers: [low FD, low FE, high FD, high FE].
    chr_regs: [u8; 4],
    latch_low_fe: bool,
    latch_high_fe: bool,
    mirroring: Mirroring,
}

#[cfg(feature = "savestate")]
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Mmc2State {
    banking: BankingState,
    chr_regs: [u8; 4],
    latch_low_fe: bool,
    latch_high_fe: bool,
    horizontal: bool,
}

impl Mmc2 {
    pub fn new(header: Header, mut banking: Banking) -> Self {
        // One switchable 8 KiB PRG bank, then the last three fixed.
        banking.prg_windows = vec![
            Window::new(0x8000, 13),
            Window::new(0xA000, 13),
            Window::new(0xC000, 13),
            Window::new(0xE000, 13),
        ];
        let last = banking.last_prg_bank(13);
        banking.prg_windows[1].bank = last.saturating_sub(2);
        banking.prg_windows[2].bank = last.saturating_sub(1);
        banking.prg_windows[3].bank = last;
        banking.chr_windows = vec![Window::new(0x0000, 12), Window::new(0x1000, 12)];
        Self {
            banking,
            chr_regs: [0; 4],
            latch_low_fe: true,
            latch_high_fe: true,
            mirroring: header.mirroring,
        }
    }

    fn apply_chr_banks(&mut self) {
        let low = self.chr_regs[usize::from(self.latch_low_fe)];
        let high = self.chr_regs[2 + usize::from(self.latch_high_fe)];
        self.banking.set_chr_bank(0, u32::from(low));
        self.banking.set_chr_bank(1, u32::from(high));
    }
}

impl Mapper for Mmc2 {
    fn banking(&self) -> &Banking {
        &self.banking
    }

    fn banking_mut(&mut self) -> &mut Banking {
        &mut self.banking
    }

    fn attach(&mut self, cpu: &mut CpuFabric, ppu: &mut PpuFabric) {
        bind_prg_rom(cpu, 0x8000..=0x9FFF, 0);
        bind_prg_rom(cpu, 0xA000..=0xBFFF, 1);
        bind_prg_rom(cpu, 0xC000..=0xDFFF, 2);
        bind_prg_rom(cpu, 0xE000..=cpu_mem::ADDR_END, 3);
        bind_registers(cpu, 0xA000..=cpu_mem::ADDR_END);
        bind_chr(ppu, 0x0000..=0x0FFF, 0, false);
        bind_chr(ppu, 0x1000..=0x1FFF, 1, false);
        bind_mirroring(ppu, self.mirroring);

        // Latch triggers. The low half flips on single addresses, the high
        // half on whole 8-byte rows.
        ppu.install_read_trampoline(0x0FD8, |id| PpuRead::ChrLatch { id, key: KEY_FD_LOW });
        ppu.install_read_trampoline(0x0FE8, |id| PpuRead::ChrLatch { id, key: KEY_FE_LOW });
        for addr in 0x1FD8..=0x1FDF {
            ppu.install_read_trampoline(addr, |id| PpuRead::ChrLatch {
                id,
                key: KEY_FD_HIGH,
            });
        }
        for addr in 0x1FE8..=0x1FEF {
            ppu.install_read_trampoline(addr, |id| PpuRead::ChrLatch {
                id,
                key: KEY_FE_HIGH,
            });
        }
    }

    fn register_write(&mut self, addr: u16, value: u8, _cpu_cycle: u64, bus: &mut MapperBus<'_>) {
        match addr & 0xF000 {
            0xA000 => {
                let last = self.banking.last_prg_bank(13);
                let bank = u32::from(value & 0x0F).min(last);
                self.banking.set_prg_bank(0, bank);
            }
            0xB000 => self.chr_regs[0] = value & 0x1F,
            0xC000 => self.chr_regs[1] = value & 0x1F,
            0xD000 => self.chr_regs[2] = value & 0x1F,
            0xE000 => self.chr_regs[3] = value & 0x1F,
            _ => {
                self.mirroring = if value & 0x01 != 0 {
                    Mirroring::Horizontal
                } else {
                    Mirroring::Vertical
                };
                bind_mirroring(bus.ppu, self.mirroring);
            }
        }
        self.apply_chr_banks();
    }

    fn chr_latch(&mut self, key: u8) {
        match key {
            KEY_FD_LOW => self.latch_low_fe = false,
            KEY_FE_LOW => self.latch_low_fe = true,
            KEY_FD_HIGH => self.latch_high_fe = false,
            _ => self.latch_high_fe = true,
        }
        self.apply_chr_banks();
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn reset(&mut self, _kind: ResetKind) {
        self.chr_regs = [0; 4];
        self.latch_low_fe = true;
        self.latch_high_fe = true;
        self.apply_chr_banks();
        self.banking.set_prg_bank(0, 0);
    }

    fn mapper_id(&self) -> u16 {
        9
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("MMC2")
    }

    #[cfg(feature = "savestate")]
    fn save_state(&self) -> Vec<u8> {
        let state = Mmc2State {
            banking: self.banking.save_state(),
            chr_regs: self.chr_regs,
            latch_low_fe: self.latch_low_fe,
            latch_high_fe: self.latch_high_fe,
            horizontal: self.mirroring == Mirroring::Horizontal,
        };
        postcard::to_stdvec(&state).unwrap_or_default()
    }

    #[cfg(feature = "savestate")]
    fn load_state(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let state: Mmc2State = postcard::from_bytes(bytes)?;
        self.banking.load_state(&state.banking);
        self.chr_regs = state.chr_regs;
        self.latch_low_fe = state.latch_low_fe;
        self.latch_high_fe = state.latch_high_fe;
        self.mirroring = if state.horizontal {
            Mirroring::Horizontal
        } else {
            Mirroring::Vertical
        };
        self.apply_chr_banks();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ppu::{power_on_fabric, PpuBusView};
    use crate::cartridge::header::{RomFormat, TimingHint};
    use crate::cartridge::Cartridge;

    fn cartridge() -> Cartridge {
        let header = Header {
            format: RomFormat::INes,
            mapper: 9,
            submapper: 0,
            mirroring: Mirroring::Vertical,
            battery_backed: false,
            trainer_present: false,
            prg_rom_size: 0x20000,
            chr_rom_size: 0x8000,
            prg_ram_size: 0,
            prg_nvram_size: 0,
            chr_ram_size: 0,
            chr_nvram_size: 0,
            timing: TimingHint::Ntsc,
        };
        // CHR banks are filled with their own 4 KiB bank number.
        let chr: Vec<u8> = (0..header.chr_rom_size).map(|i| (i / 0x1000) as u8).collect();
        let prg = vec![0u8; header.prg_rom_size];
        let mut image = vec![
            b'N', b'E', b'S', 0x1A, 8, 4, 0x91, 0x00, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        image.extend(prg);
        image.extend(chr);
        crate::cartridge::load_cartridge(&image).expect("mmc2 image")
    }

    #[test]
    fn pattern_fetch_at_fd8_flips_the_latch() {
        let mut cart = cartridge();
        let mut cpu_fab = crate::bus::cpu::power_on_fabric();
        let mut ppu_fab = power_on_fabric();
        cart.attach(&mut cpu_fab, &mut ppu_fab);
        {
            let mut bus = MapperBus {
                cpu: &mut cpu_fab,
                ppu: &mut ppu_fab,
            };
            // FD register = bank 1, FE register = bank 2 for the low half.
            cart.register_write(0xB000, 1, &mut bus);
            cart.register_write(0xC000, 2, &mut bus);
        }
        let mut view = PpuBusView {
            fab: &mut ppu_fab,
            cart: Some(&mut cart),
            cpu_cycle: 0,
        };
        // Latch starts at FE: bank 2.
        assert_eq!(view.read(0x0000), 2);
        // Fetching $0FD8 returns the pre-switch bank, then flips to FD.
        assert_eq!(view.read(0x0FD8), 2);
        assert_eq!(view.read(0x0000), 1);
        // $0FE8 flips back.
        view.read(0x0FE8);
        assert_eq!(view.read(0x0000), 2);
    }
}
