//! Mapper 0 (NROM): no banking at all.
//!
//! 16 KiB images mirror their single PRG bank into both halves of
//! `$8000-$FFFF` (the window resolver's modulo handles that); CHR is a flat
//! 8 KiB of ROM or RAM. Mirroring is hardwired by the header.

use std::borrow::Cow;

use crate::{
    bus::cpu::CpuFabric,
    bus::ppu::{bind_mirroring, PpuFabric},
    cartridge::header::{Header, Mirroring},
    cartridge::mapper::{
        bind_chr, bind_prg_ram, bind_prg_rom, Banking, Mapper, MapperBus, Window,
    },
    memory::cpu as cpu_mem,
    reset_kind::ResetKind,
};

#[derive(Debug, Clone)]
pub struct Nrom {
    banking: Banking,
    mirroring: Mirroring,
}

impl Nrom {
    pub fn new(header: Header, mut banking: Banking) -> Self {
        banking.prg_windows = vec![Window::new(cpu_mem::PRG_ROM_START, 15)];
        banking.ram_windows = vec![Window::new(cpu_mem::PRG_RAM_START, 13)];
        banking.chr_windows = vec![Window::new(0x0000, 13)];
        Self {
            banking,
            mirroring: header.mirroring,
        }
    }
}

impl Mapper for Nrom {
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
        bind_prg_rom(cpu, cpu_mem::PRG_ROM_START..=cpu_mem::ADDR_END, 0);
        bind_chr(ppu, 0x0000..=0x1FFF, 0, self.banking.chr.is_ram());
        bind_mirroring(ppu, self.mirroring);
    }

    fn register_write(&mut self, _addr: u16, _value: u8, _cpu_cycle: u64, _bus: &mut MapperBus<'_>) {
        // No registers.
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn reset(&mut self, _kind: ResetKind) {}

    fn mapper_id(&self) -> u16 {
        0
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("NROM")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::{RomFormat, TimingHint};

    fn header(prg: usize) -> Header {
        Header {
            format: RomFormat::INes,
            mapper: 0,
            submapper: 0,
            mirroring: Mirroring::Horizontal,
            battery_backed: false,
            trainer_present: false,
            prg_rom_size: prg,
            chr_rom_size: 0,
            prg_ram_size: 0x2000,
            prg_nvram_size: 0,
            chr_ram_size: 0x2000,
            chr_nvram_size: 0,
            timing: TimingHint::Ntsc,
        }
    }

    #[test]
    fn sixteen_k_images_mirror_into_the_upper_half() {
        let h = header(0x4000);
        let prg: Vec<u8> = (0..0x4000u32).map(|i| i as u8).collect();
        let nrom = Nrom::new(h, Banking::from_header(&h, prg.into(), Box::default()));
        assert_eq!(
            nrom.banking().prg_read(0, 0x8123),
            nrom.banking().prg_read(0, 0xC123)
        );
    }
}
