//! Mapper 1 (MMC1 / SxROM).
//!
//! All control flows through a 5-bit serial shift register: five writes to
//! `$8000-$FFFF` deliver one value, with bits 13-14 of the *last* write
//! selecting the internal register. Bit 7 resets the shifter and forces PRG
//! mode 3. Writes on consecutive CPU cycles are ignored (RMW instructions
//! only count once).

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

#[derive(Debug, Clone)]
pub struct Mmc1 {
    banking: Banking,
    shift: u8,
    shift_count: u8,
    control: u8,
    chr0: u8,
    chr1: u8,
    prg: u8,
    mirroring: Mirroring,
    last_write_cycle: u64,
}

#[cfg(feature = "savestate")]
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Mmc1State {
    banking: BankingState,
    shift: u8,
    shift_count: u8,
    control: u8,
    chr0: u8,
    chr1: u8,
    prg: u8,
}

impl Mmc1 {
    pub fn new(_header: Header, mut banking: Banking) -> Self {
        banking.prg_windows = vec![
            Window::new(cpu_mem::PRG_ROM_START, 14),
            Window::new(0xC000, 14),
        ];
        banking.ram_windows = vec![Window::new(cpu_mem::PRG_RAM_START, 13)];
        banking.chr_windows = vec![Window::new(0x0000, 12), Window::new(0x1000, 12)];
        let mut mapper = Self {
            banking,
            shift: 0,
            shift_count: 0,
            // Power-on: PRG mode 3 (fix last bank at $C000).
            control: 0x0C,
            chr0: 0,
            chr1: 0,
            prg: 0,
            mirroring: Mirroring::SingleScreenA,
            last_write_cycle: u64::MAX,
        };
        mapper.apply_banks();
        mapper
    }

    fn clear_shift(&mut self) {
        self.shift = 0;
        self.shift_count = 0;
    }

    fn apply_banks(&mut self) {
        // PRG modes: 0/1 = 32 KiB, 2 = fix first at $8000, 3 = fix last at
        // $C000.
        let prg = u32::from(self.prg & 0x0F);
        match (self.control >> 2) & 0x03 {
            0 | 1 => {
                self.banking.set_prg_bank(0, prg & !1);
                self.banking.set_prg_bank(1, (prg & !1) | 1);
            }
            2 => {
                self.banking.set_prg_bank(0, 0);
                self.banking.set_prg_bank(1, prg);
            }
            _ => {
                self.banking.set_prg_bank(0, prg);
                let last = self.banking.last_prg_bank(14);
                self.banking.set_prg_bank(1, last);
            }
        }
        // CHR mode: 0 = one 8 KiB bank, 1 = two 4 KiB banks.
        if self.control & 0x10 == 0 {
            let bank = u32::from(self.chr0 & !1);
            self.banking.set_chr_bank(0, bank);
            self.banking.set_chr_bank(1, bank | 1);
        } else {
            self.banking.set_chr_bank(0, u32::from(self.chr0));
            self.banking.set_chr_bank(1, u32::from(self.chr1));
        }
        self.mirroring = match self.control & 0x03 {
            0 => Mirroring::SingleScreenA,
            1 => Mirroring::SingleScreenB,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        };
    }
}

impl Mapper for Mmc1 {
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
        bind_prg_rom(cpu, cpu_mem::PRG_ROM_START..=0xBFFF, 0);
        bind_prg_rom(cpu, 0xC000..=cpu_mem::ADDR_END, 1);
        bind_registers(cpu, cpu_mem::PRG_ROM_START..=cpu_mem::ADDR_END);
        bind_chr(ppu, 0x0000..=0x0FFF, 0, self.banking.chr.is_ram());
        bind_chr(ppu, 0x1000..=0x1FFF, 1, self.banking.chr.is_ram());
        bind_mirroring(ppu, self.mirroring);
    }

    fn register_write(&mut self, addr: u16, value: u8, cpu_cycle: u64, bus: &mut MapperBus<'_>) {
        // Back-to-back writes (RMW second write) are ignored by the shifter.
        let back_to_back =
            self.last_write_cycle != u64::MAX && cpu_cycle.wrapping_sub(self.last_write_cycle) <= 1;
        self.last_write_cycle = cpu_cycle;
        if back_to_back {
            return;
        }

        if value & 0x80 != 0 {
            self.clear_shift();
            self.control |= 0x0C;
            self.apply_banks();
            bind_mirroring(bus.ppu, self.mirroring);
            return;
        }

        self.shift >>= 1;
        self.shift |= (value & 0x01) << 4;
        self.shift_count += 1;
        if self.shift_count < 5 {
            return;
        }

        let loaded = self.shift;
        self.clear_shift();
        match (addr >> 13) & 0x03 {
            0 => self.control = loaded,
            1 => self.chr0 = loaded,
            2 => self.chr1 = loaded,
            _ => self.prg = loaded,
        }
        self.apply_banks();
        bind_mirroring(bus.ppu, self.mirroring);
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn reset(&mut self, _kind: ResetKind) {
        self.clear_shift();
        self.control = 0x0C;
        self.chr0 = 0;
        self.chr1 = 0;
        self.prg = 0;
        self.last_write_cycle = u64::MAX;
        self.apply_banks();
    }

    fn mapper_id(&self) -> u16 {
        1
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("MMC1")
    }

    #[cfg(feature = "savestate")]
    fn save_state(&self) -> Vec<u8> {
        let state = Mmc1State {
            banking: self.banking.save_state(),
            shift: self.shift,
            shift_count: self.shift_count,
            control: self.control,
            chr0: self.chr0,
            chr1: self.chr1,
            prg: self.prg,
        };
        postcard::to_stdvec(&state).unwrap_or_default()
    }

    #[cfg(feature = "savestate")]
    fn load_state(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let state: Mmc1State = postcard::from_bytes(bytes)?;
        self.banking.load_state(&state.banking);
        self.shift = state.shift;
        self.shift_count = state.shift_count;
        self.control = state.control;
        self.chr0 = state.chr0;
        self.chr1 = state.chr1;
        self.prg = state.prg;
        self.apply_banks();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{cpu as cpu_bus, ppu as ppu_bus};
    use crate::cartridge::header::{RomFormat, TimingHint};

    fn mmc1(prg_banks: usize) -> Mmc1 {
        let header = Header {
            format: RomFormat::INes,
            mapper: 1,
            submapper: 0,
            mirroring: Mirroring::Horizontal,
            battery_backed: false,
            trainer_present: false,
            prg_rom_size: prg_banks * 0x4000,
            chr_rom_size: 0,
            prg_ram_size: 0x2000,
            prg_nvram_size: 0,
            chr_ram_size: 0x2000,
            chr_nvram_size: 0,
            timing: TimingHint::Ntsc,
        };
        let prg: Vec<u8> = (0..header.prg_rom_size)
            .map(|i| (i / 0x4000) as u8)
            .collect();
        Mmc1::new(header, Banking::from_header(&header, prg.into(), Box::default()))
    }

    fn serial_write(mapper: &mut Mmc1, addr: u16, value: u8, cycle: &mut u64) {
        for bit in 0..5 {
            let mut cpu = cpu_bus::power_on_fabric();
            let mut ppu = ppu_bus::power_on_fabric();
            let mut bus = MapperBus {
                cpu: &mut cpu,
                ppu: &mut ppu,
            };
            mapper.register_write(addr, (value >> bit) & 1, *cycle, &mut bus);
            *cycle += 4;
        }
    }

    #[test]
    fn five_serial_writes_load_a_register() {
        let mut mapper = mmc1(8);
        let mut cycle = 100;
        // PRG mode 3 is the power-on default; select bank 5 at $8000.
        serial_write(&mut mapper, 0xE000, 5, &mut cycle);
        assert_eq!(mapper.banking.prg_read(0, 0x8000), 5);
        // $C000 stays fixed to the last bank.
        assert_eq!(mapper.banking.prg_read(1, 0xC000), 7);
    }

    #[test]
    fn consecutive_cycle_writes_are_ignored() {
        let mut mapper = mmc1(8);
        let mut cycle = 100;
        serial_write(&mut mapper, 0xE000, 5, &mut cycle);
        let mut cpu = cpu_bus::power_on_fabric();
        let mut ppu = ppu_bus::power_on_fabric();
        let mut bus = MapperBus {
            cpu: &mut cpu,
            ppu: &mut ppu,
        };
        // Two writes one cycle apart: the second must not shift.
        mapper.register_write(0xE000, 1, 1000, &mut bus);
        mapper.register_write(0xE000, 1, 1001, &mut bus);
        assert_eq!(mapper.shift_count, 1);
    }

    #[test]
    fn control_register_switches_mirroring() {
        let mut mapper = mmc1(8);
        let mut cycle = 100;
        serial_write(&mut mapper, 0x8000, 0x0E, &mut cycle); // vertical
        assert_eq!(mapper.mirroring(), Mirroring::Vertical);
    }
}
