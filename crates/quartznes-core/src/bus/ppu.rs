//! PPU bus fabric: slot tags and their dispatcher.
//!
//! The 16 KiB PPU space splits into the cartridge pattern area (`$0000-$1FFF`,
//! bank windows plus optional snooping trampolines) and the nametable area
//! (`$2000-$3EFF`), which the mapper routes per its mirroring mode into the
//! console's internal CIRAM (living in the fabric backing store) or into
//! cartridge-provided tables. Palette RAM is internal to the PPU and never
//! crosses this bus; the `$3F00-$3FFF` slots alias the nametable space
//! underneath so buffered `$2007` reads see what the address pins select.

use crate::{
    bus::{Fabric, TrampolineId},
    cartridge::{Cartridge, Mirroring},
    memory::ppu as ppu_mem,
};

/// Read handler tags for the 16 KiB PPU space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpuRead {
    /// Cartridge CHR window; the mapper resolves the bank index.
    Chr { slot: u8 },
    /// Backing-store read (CIRAM) at the stored pre-mirrored index.
    Ram { index: u16 },
    /// Cartridge-owned nametable (four-screen boards, mapper VRAM).
    CartNt { bank: u8 },
    /// Undriven address.
    Open,
    /// Trampoline: latch trigger for boards that switch CHR banks on
    /// specific pattern fetches (MMC2/MMC4), then chain to the original.
    ChrLatch { id: TrampolineId, key: u8 },
    /// Trampoline: PPU address-line snoop for scanline IRQ counters (MMC3),
    /// then chain to the original.
    A12 { id: TrampolineId },
}

/// Write handler tags for the 16 KiB PPU space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpuWrite {
    /// Cartridge CHR-RAM window.
    ChrRam { slot: u8 },
    /// Backing-store write (CIRAM) at the stored pre-mirrored index.
    Ram { index: u16 },
    /// Cartridge-owned nametable.
    CartNt { bank: u8 },
    /// CHR ROM or unmapped space; the write falls off the bus.
    Ignore,
}

/// The PPU bus fabric: tags, 16 KiB backing store (CIRAM lives at
/// `$2000-$27FF`), and the PPU-side floating latch.
pub type PpuFabric = Fabric<PpuRead, PpuWrite, { ppu_mem::ADDRESS_SPACE }>;

/// Builds the power-on PPU fabric with horizontal mirroring and open pattern
/// space (a cartridge rebinds both at attach time).
pub fn power_on_fabric() -> PpuFabric {
    let mut fab = PpuFabric::new(PpuRead::Open, PpuWrite::Ignore);
    bind_mirroring(&mut fab, Mirroring::Horizontal);
    fab
}

/// Physical table selected for each of the four logical nametables.
///
/// 0/1 are the console's CIRAM halves; 2/3 are cartridge-provided.
fn nametable_layout(mode: Mirroring) -> [u8; 4] {
    match mode {
        Mirroring::Horizontal => [0, 0, 1, 1],
        Mirroring::Vertical => [0, 1, 0, 1],
        Mirroring::SingleScreenA => [0, 0, 0, 0],
        Mirroring::SingleScreenB => [1, 1, 1, 1],
        Mirroring::FourScreen => [0, 1, 2, 3],
    }
}

/// Routes the nametable slots (`$2000-$3EFF` plus the `$3F00-$3FFF` alias
/// region) according to the mirroring mode.
///
/// Mirror-masking is folded into each slot's stored index, so a rebind costs
/// one pass over the region and accesses stay O(1).
pub fn bind_mirroring(fab: &mut PpuFabric, mode: Mirroring) {
    let layout = nametable_layout(mode);
    for addr in ppu_mem::NAMETABLE_START..=0x3FFF {
        // $3000-$3FFF aliases $2000-$2FFF on the address pins.
        let logical = (addr & 0x0FFF) / ppu_mem::NAMETABLE_SIZE;
        let offset = addr & (ppu_mem::NAMETABLE_SIZE - 1);
        match layout[logical as usize] {
            phys @ (0 | 1) => {
                let index =
                    ppu_mem::CIRAM_BACKING_BASE + u16::from(phys) * ppu_mem::NAMETABLE_SIZE + offset;
                fab.set_read(addr, PpuRead::Ram { index });
                fab.set_write(addr, PpuWrite::Ram { index });
            }
            phys => {
                let bank = phys - 2;
                fab.set_read(addr, PpuRead::CartNt { bank });
                fab.set_write(addr, PpuWrite::CartNt { bank });
            }
        }
    }
}

/// Mutable view of the PPU bus plus the cartridge hanging off it.
pub struct PpuBusView<'a> {
    pub fab: &'a mut PpuFabric,
    pub cart: Option<&'a mut Cartridge>,
    /// CPU cycle counter used by mapper IRQ edge filters.
    pub cpu_cycle: u64,
}

impl PpuBusView<'_> {
    /// One PPU bus read (rendering fetches and buffered `$2007` reads).
    pub fn read(&mut self, addr: u16) -> u8 {
        let addr = addr & ppu_mem::ADDR_MASK;
        let mut tag = self.fab.read_tag(addr);
        let value = loop {
            match tag {
                PpuRead::Chr { slot } => {
                    break match self.cart.as_deref() {
                        Some(cart) => cart.chr_read(slot, addr),
                        None => self.fab.float(),
                    };
                }
                PpuRead::Ram { index } => break self.fab.backing(index),
                PpuRead::CartNt { bank } => {
                    break match self.cart.as_deref() {
                        Some(cart) => cart.nt_read(bank, addr & (ppu_mem::NAMETABLE_SIZE - 1)),
                        None => self.fab.float(),
                    };
                }
                PpuRead::Open => break self.fab.float(),
                PpuRead::ChrLatch { id, key } => {
                    // The fetch completes with the pre-switch bank; the latch
                    // affects the next one.
                    let saved = self.fab.saved_read(id);
                    let value = match saved {
                        PpuRead::Chr { slot } => match self.cart.as_deref() {
                            Some(cart) => cart.chr_read(slot, addr),
                            None => self.fab.float(),
                        },
                        _ => self.fab.float(),
                    };
                    if let Some(cart) = self.cart.as_deref_mut() {
                        cart.chr_latch(key);
                    }
                    break value;
                }
                PpuRead::A12 { id } => {
                    if let Some(cart) = self.cart.as_deref_mut() {
                        cart.ppu_a12_high(self.cpu_cycle);
                    }
                    tag = self.fab.saved_read(id);
                }
            }
        };
        self.fab.set_float(value);
        value
    }

    /// One PPU bus write (`$2007` stores).
    pub fn write(&mut self, addr: u16, value: u8) {
        let addr = addr & ppu_mem::ADDR_MASK;
        self.fab.set_float(value);
        match self.fab.write_tag(addr) {
            PpuWrite::ChrRam { slot } => {
                if let Some(cart) = self.cart.as_deref_mut() {
                    cart.chr_write(slot, addr, value);
                }
            }
            PpuWrite::Ram { index } => self.fab.backing_set(index, value),
            PpuWrite::CartNt { bank } => {
                if let Some(cart) = self.cart.as_deref_mut() {
                    cart.nt_write(bank, addr & (ppu_mem::NAMETABLE_SIZE - 1), value);
                }
            }
            PpuWrite::Ignore => {}
        }
    }

    /// Side-effect-free read (no latches, no mapper snoops).
    pub fn peek(&self, addr: u16) -> u8 {
        let addr = addr & ppu_mem::ADDR_MASK;
        let mut tag = self.fab.read_tag(addr);
        loop {
            match tag {
                PpuRead::Chr { slot } => {
                    break match self.cart.as_deref() {
                        Some(cart) => cart.chr_read(slot, addr),
                        None => 0,
                    };
                }
                PpuRead::Ram { index } => break self.fab.backing(index),
                PpuRead::CartNt { bank } => {
                    break match self.cart.as_deref() {
                        Some(cart) => cart.nt_read(bank, addr & (ppu_mem::NAMETABLE_SIZE - 1)),
                        None => 0,
                    };
                }
                PpuRead::Open => break self.fab.float(),
                PpuRead::ChrLatch { id, .. } | PpuRead::A12 { id } => {
                    tag = self.fab.saved_read(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizontal_mirroring_pairs_tables() {
        let mut fab = power_on_fabric();
        bind_mirroring(&mut fab, Mirroring::Horizontal);
        assert_eq!(fab.read_tag(0x2000), fab.read_tag(0x2400));
        assert_ne!(fab.read_tag(0x2000), fab.read_tag(0x2800));
        assert_eq!(fab.read_tag(0x2800), fab.read_tag(0x2C00));
    }

    #[test]
    fn vertical_mirroring_pairs_tables() {
        let mut fab = power_on_fabric();
        bind_mirroring(&mut fab, Mirroring::Vertical);
        assert_eq!(fab.read_tag(0x2000), fab.read_tag(0x2800));
        assert_eq!(fab.read_tag(0x2400), fab.read_tag(0x2C00));
        assert_ne!(fab.read_tag(0x2000), fab.read_tag(0x2400));
    }

    #[test]
    fn mirror_region_aliases_nametables() {
        let mut fab = power_on_fabric();
        bind_mirroring(&mut fab, Mirroring::Vertical);
        assert_eq!(fab.read_tag(0x2005), fab.read_tag(0x3005));
        assert_eq!(fab.read_tag(0x2EFF), fab.read_tag(0x3EFF));
    }

    #[test]
    fn nametable_writes_land_in_ciram() {
        let mut fab = power_on_fabric();
        bind_mirroring(&mut fab, Mirroring::Vertical);
        let mut view = PpuBusView {
            fab: &mut fab,
            cart: None,
            cpu_cycle: 0,
        };
        view.write(0x2041, 0x7E);
        assert_eq!(view.read(0x2041), 0x7E);
        // Vertical: $2800 mirrors $2000.
        assert_eq!(view.read(0x2841), 0x7E);
    }
}
