//! Cartridge loading and the board wrapper the buses talk to.
//!
//! A ROM image is validated, sliced into its sections, and matched against
//! the board registry; the resulting [`Cartridge`] owns the `Box<dyn Mapper>`
//! and presents the narrow surface the bus dispatchers need.

pub mod header;
pub mod mapper;

use std::{fs, path::Path};

use crate::{
    bus::cpu::CpuFabric,
    bus::ppu::PpuFabric,
    cartridge::header::{Header, NES_HEADER_LEN},
    cartridge::mapper::{
        axrom::AxRom, cnrom::CnRom, gxrom::GxRom, mmc1::Mmc1, mmc2::Mmc2, mmc3::Mmc3, nrom::Nrom,
        sunsoft5b::Sunsoft5b, uxrom::UxRom, vrc6::Vrc6, Mapper, MapperBus,
    },
    error::Error,
    reset_kind::ResetKind,
};

pub use header::{Mirroring, TimingHint};
pub use mapper::{Banking, ChrStorage, Window};

pub const TRAINER_SIZE: usize = 512;

#[derive(Debug, Clone)]
pub struct Cartridge {
    header: Header,
    mapper: Box<dyn Mapper>,
    /// CPU cycle cached at the board tick, so register writes arriving via
    /// the bus dispatcher can see write spacing without widening every call
    /// signature.
    last_cpu_cycle: u64,
}

impl Cartridge {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn mapper(&self) -> &dyn Mapper {
        self.mapper.as_ref()
    }

    pub fn mapper_mut(&mut self) -> &mut dyn Mapper {
        self.mapper.as_mut()
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mapper.mirroring()
    }

    /// Programs the bus fabrics; called at insertion and after a fabric
    /// reset.
    pub(crate) fn attach(&mut self, cpu: &mut CpuFabric, ppu: &mut PpuFabric) {
        self.mapper.attach(cpu, ppu);
    }

    // --- Bus dispatch surface ---

    pub(crate) fn prg_read(&self, slot: u8, addr: u16) -> u8 {
        self.mapper.banking().prg_read(slot, addr)
    }

    pub(crate) fn prg_ram_read(&self, slot: u8, addr: u16) -> u8 {
        self.mapper.banking().prg_ram_read(slot, addr)
    }

    pub(crate) fn prg_ram_write(&mut self, slot: u8, addr: u16, value: u8) {
        self.mapper.banking_mut().prg_ram_write(slot, addr, value);
    }

    pub(crate) fn register_read(&mut self, addr: u16) -> Option<u8> {
        self.mapper.register_read(addr)
    }

    pub(crate) fn register_write(&mut self, addr: u16, value: u8, bus: &mut MapperBus<'_>) {
        // The cycle cached at the board tick; boards that care about write
        // spacing receive it here.
        let cycle = self.last_cpu_cycle;
        self.mapper.register_write(addr, value, cycle, bus);
    }

    pub(crate) fn chr_read(&self, slot: u8, addr: u16) -> u8 {
        self.mapper.banking().chr_read(slot, addr)
    }

    pub(crate) fn chr_write(&mut self, slot: u8, addr: u16, value: u8) {
        self.mapper.banking_mut().chr_write(slot, addr, value);
    }

    pub(crate) fn nt_read(&self, bank: u8, offset: u16) -> u8 {
        self.mapper.nt_read(bank, offset)
    }

    pub(crate) fn nt_write(&mut self, bank: u8, offset: u16, value: u8) {
        self.mapper.nt_write(bank, offset, value);
    }

    pub(crate) fn chr_latch(&mut self, key: u8) {
        self.mapper.chr_latch(key);
    }

    pub(crate) fn ppu_a12_high(&mut self, cpu_cycle: u64) {
        self.mapper.ppu_a12_high(cpu_cycle);
    }

    /// Per-CPU-cycle board clock (IRQ counters, expansion audio).
    pub(crate) fn tick(&mut self, cpu_cycle: u64) {
        self.last_cpu_cycle = cpu_cycle;
        self.mapper.tick(cpu_cycle);
    }

    pub fn irq_pending(&self) -> bool {
        self.mapper.irq_pending()
    }

    pub(crate) fn ext_audio_sample(&mut self, apu_sample: f32) -> f32 {
        self.mapper.ext_audio_sample(apu_sample)
    }

    pub(crate) fn post_process_sample(&mut self, sample: f32, out_hz: u32) -> f32 {
        self.mapper.post_process_sample(sample, out_hz)
    }

    pub fn reset(&mut self, kind: ResetKind) {
        self.mapper.reset(kind);
    }

    #[cfg(feature = "savestate")]
    pub(crate) fn save_state(&self) -> Vec<u8> {
        self.mapper.save_state()
    }

    #[cfg(feature = "savestate")]
    pub(crate) fn load_state(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.mapper.load_state(bytes)
    }
}

/// Loads a cartridge from raw image bytes.
pub fn load_cartridge(bytes: &[u8]) -> Result<Cartridge, Error> {
    let header = Header::parse(bytes)?;
    let mut cursor = NES_HEADER_LEN;

    let trainer = if header.trainer_present {
        let end = cursor + TRAINER_SIZE;
        let slice = bytes.get(cursor..end).ok_or(Error::SectionTooShort {
            section: "trainer",
            expected: TRAINER_SIZE,
            actual: bytes.len().saturating_sub(cursor),
        })?;
        cursor = end;
        Some(slice)
    } else {
        None
    };

    let prg_rom = slice_section(bytes, &mut cursor, header.prg_rom_size, "PRG ROM")?;
    let chr_rom = slice_section(bytes, &mut cursor, header.chr_rom_size, "CHR ROM")?;

    let mut banking = Banking::from_header(&header, prg_rom.into(), chr_rom.into());
    if let Some(trainer) = trainer {
        banking.load_trainer(trainer);
    }

    let mut mapper: Box<dyn Mapper> = match header.mapper {
        0 => Box::new(Nrom::new(header, banking)),
        1 => Box::new(Mmc1::new(header, banking)),
        2 => Box::new(UxRom::new(header, banking)),
        3 => Box::new(CnRom::new(header, banking)),
        4 => Box::new(Mmc3::new(header, banking)),
        7 => Box::new(AxRom::new(header, banking)),
        9 => Box::new(Mmc2::new(header, banking)),
        24 | 26 => Box::new(Vrc6::new(header, banking)),
        66 => Box::new(GxRom::new(header, banking)),
        69 => Box::new(Sunsoft5b::new(header, banking)),
        other => return Err(Error::UnsupportedMapper(other)),
    };
    mapper.reset(ResetKind::PowerOn);

    Ok(Cartridge {
        header,
        mapper,
        last_cpu_cycle: 0,
    })
}

/// Loads a cartridge straight from disk.
pub fn load_cartridge_from_file<P: AsRef<Path>>(path: P) -> Result<Cartridge, Error> {
    let bytes = fs::read(path)?;
    load_cartridge(&bytes)
}

fn slice_section<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
    name: &'static str,
) -> Result<&'a [u8], Error> {
    if len == 0 {
        return Ok(&bytes[0..0]);
    }
    let end = cursor.checked_add(len).ok_or(Error::SectionTooShort {
        section: name,
        expected: len,
        actual: bytes.len().saturating_sub(*cursor),
    })?;
    let slice = bytes.get(*cursor..end).ok_or(Error::SectionTooShort {
        section: name,
        expected: len,
        actual: bytes.len().saturating_sub(*cursor),
    })?;
    *cursor = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom(prg_banks: u8, chr_banks: u8, flags6: u8) -> Vec<u8> {
        let mut bytes = vec![
            b'N', b'E', b'S', 0x1A, prg_banks, chr_banks, flags6, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        bytes.extend(vec![0xAA; usize::from(prg_banks) * 16 * 1024]);
        bytes.extend(vec![0x55; usize::from(chr_banks) * 8 * 1024]);
        bytes
    }

    #[test]
    fn loads_a_basic_nrom_image() {
        let cart = load_cartridge(&rom(1, 1, 0)).expect("load");
        assert_eq!(cart.header().prg_rom_size, 16 * 1024);
        assert_eq!(cart.mapper().mapper_id(), 0);
        assert_eq!(cart.mirroring(), Mirroring::Horizontal);
    }

    #[test]
    fn short_prg_section_fails() {
        let mut bytes = rom(2, 0, 0);
        bytes.truncate(16 + 1024);
        let err = load_cartridge(&bytes).expect_err("short image");
        assert!(matches!(
            err,
            Error::SectionTooShort {
                section: "PRG ROM",
                ..
            }
        ));
    }

    #[test]
    fn unknown_mapper_is_rejected() {
        // Mapper 12 via the flags6 high nibble.
        let err = load_cartridge(&rom(1, 1, 0xC0)).expect_err("unsupported");
        assert!(matches!(err, Error::UnsupportedMapper(12)));
    }

    #[test]
    fn trainer_lands_in_prg_ram() {
        let mut bytes = vec![
            b'N', b'E', b'S', 0x1A, 1, 0, 0b0000_0100, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        bytes.extend(vec![0xFE; TRAINER_SIZE]);
        bytes.extend(vec![0xAA; 16 * 1024]);
        let cart = load_cartridge(&bytes).expect("load");
        assert_eq!(cart.mapper().banking().prg_ram[0x1000], 0xFE);
    }
}
