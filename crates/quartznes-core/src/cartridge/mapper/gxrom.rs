//! Mapper 66 (GxROM): 32 KiB PRG and 8 KiB CHR banks in one register.

use std::borrow::Cow;

use crate::{
    bus::cpu::CpuFabric,
    bus::ppu::{bind_mirroring, PpuFabric},
    cartridge::header::{Header, Mirroring},
    cartridge::mapper::{
        bind_chr, bind_prg_rom, bind_registers, Banking, Mapper, MapperBus, Window,
    },
    memory::cpu as cpu_mem,
    reset_kind::ResetKind,
};

#[derive(Debug, Clone)]
pub struct GxRom {
    banking: Banking,
    mirroring: Mirroring,
}

impl GxRom {
    pub fn new(header: Header, mut banking: Banking) -> Self {
        banking.prg_windows = vec![Window::new(cpu_mem::PRG_ROM_START, 15)];
        banking.chr_windows = vec![Window::new(0x0000, 13)];
        Self {
            banking,
            mirroring: header.mirroring,
        }
    }
}

impl Mapper for GxRom {
    fn banking(&self) -> &Banking {
        &self.banking
    }

    fn banking_mut(&mut self) -> &mut Banking {
        &mut self.banking
    }

    fn attach(&mut self, cpu: &mut CpuFabric, ppu: &mut PpuFabric) {
        bind_prg_rom(cpu, cpu_mem::PRG_ROM_START..=cpu_mem::ADDR_END, 0);
        bind_registers(cpu, cpu_mem::PRG_ROM_START..=cpu_mem::ADDR_END);
        bind_chr(ppu, 0x0000..=0x1FFF, 0, self.banking.chr.is_ram());
        bind_mirroring(ppu, self.mirroring);
    }

    fn register_write(&mut self, _addr: u16, value: u8, _cpu_cycle: u64, _bus: &mut MapperBus<'_>) {
        self.banking.set_prg_bank(0, u32::from((value >> 4) & 0x03));
        self.banking.set_chr_bank(0, u32::from(value & 0x03));
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn reset(&mut self, _kind: ResetKind) {
        self.banking.set_prg_bank(0, 0);
        self.banking.set_chr_bank(0, 0);
    }

    fn mapper_id(&self) -> u16 {
        66
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("GxROM")
    }
}
