//! Mapper trait, the shared bank-window machinery, and the fabric-binding
//! helpers every board uses.
//!
//! Banking never rebinds bus slots: a slot's tag carries a window index, and
//! the window resolves `bank * size + (addr - base)` at access time. A bank
//! switch is one register store; the sanitizing modulo happens when the
//! register is written, so a wild index can never escape the ROM.

pub mod axrom;
pub mod cnrom;
pub mod gxrom;
pub mod mmc1;
pub mod mmc2;
pub mod mmc3;
pub mod nrom;
pub mod sunsoft5b;
pub mod uxrom;
pub mod vrc6;

use core::ops::RangeInclusive;
use std::borrow::Cow;
use std::fmt::Debug;

use dyn_clone::DynClone;

use crate::{
    bus::cpu::{CpuFabric, CpuRead, CpuWrite},
    bus::ppu::{PpuFabric, PpuRead, PpuWrite},
    cartridge::header::{Header, Mirroring},
    cartridge::TRAINER_SIZE,
    reset_kind::ResetKind,
};

#[cfg(feature = "savestate")]
use crate::error::Error;

/// One bank window: a span of the address space bound to a moving offset in
/// ROM or RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub struct Window {
    pub base: u16,
    pub size_log2: u8,
    pub bank: u32,
}

impl Window {
    pub const fn new(base: u16, size_log2: u8) -> Self {
        Self {
            base,
            size_log2,
            bank: 0,
        }
    }

    /// Byte offset into the backing array for an address in this window.
    #[inline]
    fn offset(&self, addr: u16) -> usize {
        ((self.bank as usize) << self.size_log2) + usize::from(addr - self.base)
    }

    /// Number of banks this window can select from `len` bytes of storage.
    fn bank_count(&self, len: usize) -> u32 {
        ((len >> self.size_log2) as u32).max(1)
    }
}

/// CHR backing: ROM is read-only, RAM accepts `$2007` stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChrStorage {
    Rom(Box<[u8]>),
    Ram(Box<[u8]>),
}

impl ChrStorage {
    pub fn from_header(header: &Header, chr_rom: Box<[u8]>) -> Self {
        if chr_rom.is_empty() {
            ChrStorage::Ram(vec![0; header.chr_ram_total().max(8 * 1024)].into_boxed_slice())
        } else {
            ChrStorage::Rom(chr_rom)
        }
    }

    pub fn is_ram(&self) -> bool {
        matches!(self, ChrStorage::Ram(_))
    }

    fn bytes(&self) -> &[u8] {
        match self {
            ChrStorage::Rom(bytes) | ChrStorage::Ram(bytes) => bytes,
        }
    }
}

/// The banked storage shared by every board: PRG ROM, work RAM, CHR, the
/// window registers, and (for four-screen boards) extra nametable RAM.
#[derive(Debug, Clone)]
pub struct Banking {
    pub prg_rom: Box<[u8]>,
    pub prg_ram: Box<[u8]>,
    pub chr: ChrStorage,
    pub prg_windows: Vec<Window>,
    pub ram_windows: Vec<Window>,
    pub chr_windows: Vec<Window>,
    pub nt_ram: Box<[u8]>,
}

impl Banking {
    pub fn from_header(header: &Header, prg_rom: Box<[u8]>, chr_rom: Box<[u8]>) -> Self {
        let nt_ram = if header.mirroring == Mirroring::FourScreen {
            vec![0u8; 0x800].into_boxed_slice()
        } else {
            Box::default()
        };
        Self {
            prg_rom,
            prg_ram: vec![0u8; header.work_ram_size()].into_boxed_slice(),
            chr: ChrStorage::from_header(header, chr_rom),
            prg_windows: Vec::new(),
            ram_windows: Vec::new(),
            chr_windows: Vec::new(),
            nt_ram,
        }
    }

    /// Copies the 512-byte trainer into the conventional `$7000` slot.
    pub fn load_trainer(&mut self, trainer: &[u8]) {
        let offset = 0x1000;
        if self.prg_ram.len() >= offset + TRAINER_SIZE && trainer.len() == TRAINER_SIZE {
            self.prg_ram[offset..offset + TRAINER_SIZE].copy_from_slice(trainer);
        }
    }

    // --- Access-time resolution ---

    pub fn prg_read(&self, slot: u8, addr: u16) -> u8 {
        if self.prg_rom.is_empty() {
            return 0;
        }
        let window = &self.prg_windows[slot as usize];
        self.prg_rom[window.offset(addr) % self.prg_rom.len()]
    }

    pub fn prg_ram_read(&self, slot: u8, addr: u16) -> u8 {
        if self.prg_ram.is_empty() {
            return 0;
        }
        let window = &self.ram_windows[slot as usize];
        self.prg_ram[window.offset(addr) % self.prg_ram.len()]
    }

    pub fn prg_ram_write(&mut self, slot: u8, addr: u16, value: u8) {
        if self.prg_ram.is_empty() {
            return;
        }
        let len = self.prg_ram.len();
        let window = &self.ram_windows[slot as usize];
        self.prg_ram[window.offset(addr) % len] = value;
    }

    pub fn chr_read(&self, slot: u8, addr: u16) -> u8 {
        let bytes = self.chr.bytes();
        if bytes.is_empty() {
            return 0;
        }
        let window = &self.chr_windows[slot as usize];
        bytes[window.offset(addr) % bytes.len()]
    }

    pub fn chr_write(&mut self, slot: u8, addr: u16, value: u8) {
        let window = self.chr_windows[slot as usize];
        if let ChrStorage::Ram(bytes) = &mut self.chr {
            if !bytes.is_empty() {
                let len = bytes.len();
                bytes[window.offset(addr) % len] = value;
            }
        }
    }

    // --- Bank register stores (sanitized on write) ---

    pub fn set_prg_bank(&mut self, slot: usize, bank: u32) {
        let count = self.prg_windows[slot].bank_count(self.prg_rom.len());
        self.prg_windows[slot].bank = bank % count;
    }

    pub fn set_chr_bank(&mut self, slot: usize, bank: u32) {
        let count = self.chr_windows[slot].bank_count(self.chr.bytes().len());
        self.chr_windows[slot].bank = bank % count;
    }

    /// Index of the last PRG bank for a window size (fixed-bank windows).
    pub fn last_prg_bank(&self, size_log2: u8) -> u32 {
        ((self.prg_rom.len() >> size_log2) as u32).saturating_sub(1)
    }
}

/// Serializable mapper-independent banking state (RAM contents and window
/// registers; ROMs are reloaded from the image).
#[cfg(feature = "savestate")]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BankingState {
    pub prg_ram: Vec<u8>,
    pub chr_ram: Option<Vec<u8>>,
    pub prg_banks: Vec<u32>,
    pub ram_banks: Vec<u32>,
    pub chr_banks: Vec<u32>,
    pub nt_ram: Vec<u8>,
}

#[cfg(feature = "savestate")]
impl Banking {
    pub fn save_state(&self) -> BankingState {
        BankingState {
            prg_ram: self.prg_ram.to_vec(),
            chr_ram: match &self.chr {
                ChrStorage::Ram(bytes) => Some(bytes.to_vec()),
                ChrStorage::Rom(_) => None,
            },
            prg_banks: self.prg_windows.iter().map(|w| w.bank).collect(),
            ram_banks: self.ram_windows.iter().map(|w| w.bank).collect(),
            chr_banks: self.chr_windows.iter().map(|w| w.bank).collect(),
            nt_ram: self.nt_ram.to_vec(),
        }
    }

    pub fn load_state(&mut self, state: &BankingState) {
        let len = state.prg_ram.len().min(self.prg_ram.len());
        self.prg_ram[..len].copy_from_slice(&state.prg_ram[..len]);
        if let (ChrStorage::Ram(bytes), Some(saved)) = (&mut self.chr, &state.chr_ram) {
            let len = saved.len().min(bytes.len());
            bytes[..len].copy_from_slice(&saved[..len]);
        }
        for (window, &bank) in self.prg_windows.iter_mut().zip(&state.prg_banks) {
            window.bank = bank;
        }
        for (window, &bank) in self.ram_windows.iter_mut().zip(&state.ram_banks) {
            window.bank = bank;
        }
        for (window, &bank) in self.chr_windows.iter_mut().zip(&state.chr_banks) {
            window.bank = bank;
        }
        let len = state.nt_ram.len().min(self.nt_ram.len());
        self.nt_ram[..len].copy_from_slice(&state.nt_ram[..len]);
    }
}

/// Both bus fabrics, handed to a board when one of its registers is
/// written. Most boards only re-route the nametable slots; a few (FME-7's
/// RAM/ROM window select) also retag CPU slots.
pub struct MapperBus<'a> {
    pub cpu: &'a mut CpuFabric,
    pub ppu: &'a mut PpuFabric,
}

/// Core board interface.
///
/// Boards program the bus fabrics in [`Mapper::attach`] and afterwards only
/// touch their bank registers (plus the nametable routing when their
/// mirroring control changes). The default data-path methods resolve through
/// [`Banking`], so most boards implement only construction, `attach`, and
/// `register_write`.
pub trait Mapper: Debug + DynClone + Send {
    fn banking(&self) -> &Banking;

    fn banking_mut(&mut self) -> &mut Banking;

    /// Programs CPU and PPU fabric slots for this board.
    fn attach(&mut self, cpu: &mut CpuFabric, ppu: &mut PpuFabric);

    /// A CPU write into the board's register space.
    fn register_write(&mut self, addr: u16, value: u8, cpu_cycle: u64, bus: &mut MapperBus<'_>);

    /// A CPU read of mapper-visible registers, when the board has any.
    fn register_read(&mut self, _addr: u16) -> Option<u8> {
        None
    }

    fn mirroring(&self) -> Mirroring;

    /// Called once per CPU cycle to advance IRQ counters and expansion audio.
    fn tick(&mut self, _cpu_cycle: u64) {}

    /// Level of the board's IRQ output.
    fn irq_pending(&self) -> bool {
        false
    }

    /// PPU address-line snoop installed by boards with fetch counters.
    fn ppu_a12_high(&mut self, _cpu_cycle: u64) {}

    /// CHR latch trigger installed by MMC2-style boards.
    fn chr_latch(&mut self, _key: u8) {}

    /// Cartridge-provided nametable access (four-screen boards).
    fn nt_read(&self, bank: u8, offset: u16) -> u8 {
        let banking = self.banking();
        if banking.nt_ram.is_empty() {
            0
        } else {
            banking.nt_ram[(usize::from(bank & 1) << 10) | usize::from(offset & 0x3FF)]
        }
    }

    fn nt_write(&mut self, bank: u8, offset: u16, value: u8) {
        let banking = self.banking_mut();
        if !banking.nt_ram.is_empty() {
            banking.nt_ram[(usize::from(bank & 1) << 10) | usize::from(offset & 0x3FF)] = value;
        }
    }

    fn reset(&mut self, kind: ResetKind);

    fn mapper_id(&self) -> u16;

    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("Mapper {}", self.mapper_id()))
    }

    /// Folds expansion audio into the mixed APU sample.
    fn ext_audio_sample(&mut self, apu_sample: f32) -> f32 {
        apu_sample
    }

    /// Per-sample shaping applied after mixing (e.g. the 5B volume crunch).
    fn post_process_sample(&mut self, sample: f32, _out_hz: u32) -> f32 {
        sample
    }

    /// Opaque serialized board state.
    #[cfg(feature = "savestate")]
    fn save_state(&self) -> Vec<u8> {
        postcard::to_stdvec(&self.banking().save_state()).unwrap_or_default()
    }

    #[cfg(feature = "savestate")]
    fn load_state(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let state: BankingState = postcard::from_bytes(bytes)?;
        self.banking_mut().load_state(&state);
        Ok(())
    }
}

dyn_clone::clone_trait_object!(Mapper);

// --- Fabric binding helpers ---

/// Binds a PRG-ROM read window; writes in the range are left untouched.
pub(crate) fn bind_prg_rom(cpu: &mut CpuFabric, range: RangeInclusive<u16>, slot: u8) {
    cpu.set_read_range(range, CpuRead::PrgRom { slot });
}

/// Binds a PRG-RAM window for both reads and writes.
pub(crate) fn bind_prg_ram(cpu: &mut CpuFabric, range: RangeInclusive<u16>, slot: u8) {
    cpu.set_read_range(range.clone(), CpuRead::PrgRam { slot });
    cpu.set_write_range(range, CpuWrite::PrgRam { slot });
}

/// Routes writes in a range to the board's register handler.
pub(crate) fn bind_registers(cpu: &mut CpuFabric, range: RangeInclusive<u16>) {
    cpu.set_write_range(range, CpuWrite::CartReg);
}

/// Binds a CHR window; `writable` boards also take `$2007` stores.
pub(crate) fn bind_chr(ppu: &mut PpuFabric, range: RangeInclusive<u16>, slot: u8, writable: bool) {
    ppu.set_read_range(range.clone(), PpuRead::Chr { slot });
    let write_tag = if writable {
        PpuWrite::ChrRam { slot }
    } else {
        PpuWrite::Ignore
    };
    ppu.set_write_range(range, write_tag);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::{RomFormat, TimingHint};

    fn header(prg: usize, chr: usize) -> Header {
        Header {
            format: RomFormat::INes,
            mapper: 0,
            submapper: 0,
            mirroring: Mirroring::Horizontal,
            battery_backed: false,
            trainer_present: false,
            prg_rom_size: prg,
            chr_rom_size: chr,
            prg_ram_size: 0x2000,
            prg_nvram_size: 0,
            chr_ram_size: 0,
            chr_nvram_size: 0,
            timing: TimingHint::Ntsc,
        }
    }

    #[test]
    fn window_offsets_move_with_the_bank_register() {
        let header = header(0x8000, 0x2000);
        let prg: Vec<u8> = (0..0x8000).map(|i| (i / 0x2000) as u8).collect();
        let mut banking =
            Banking::from_header(&header, prg.into_boxed_slice(), vec![0; 0x2000].into());
        banking.prg_windows.push(Window::new(0x8000, 13));
        assert_eq!(banking.prg_read(0, 0x8000), 0);
        banking.set_prg_bank(0, 3);
        assert_eq!(banking.prg_read(0, 0x8000), 3);
    }

    #[test]
    fn bank_registers_sanitize_modulo_bank_count() {
        let header = header(0x8000, 0x2000);
        let mut banking = Banking::from_header(
            &header,
            vec![0; 0x8000].into_boxed_slice(),
            vec![0; 0x2000].into(),
        );
        banking.prg_windows.push(Window::new(0x8000, 13));
        banking.set_prg_bank(0, 7); // 4 banks of 8 KiB
        assert_eq!(banking.prg_windows[0].bank, 3);
    }

    #[test]
    fn missing_chr_rom_allocates_chr_ram() {
        let header = header(0x4000, 0);
        let banking =
            Banking::from_header(&header, vec![0; 0x4000].into_boxed_slice(), Box::default());
        assert!(banking.chr.is_ram());
    }
}
