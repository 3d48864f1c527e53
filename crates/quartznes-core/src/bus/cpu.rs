//! CPU bus fabric: slot tags and their dispatcher.
//!
//! The tags cover every kind of device the 2A03 can see. `Ram` is the default
//! handler pair (backing store with the mirror mask folded into the stored
//! index); everything else routes into the borrowed hardware. Dispatch is a
//! single `match` per access.

use crate::{
    apu::Apu,
    bus::{Fabric, TrampolineId},
    bus::ppu::{PpuBusView, PpuFabric},
    cartridge::{mapper::MapperBus, Cartridge},
    controller::ControllerPorts,
    memory::{cpu as cpu_mem, ppu as ppu_mem},
    ppu::Ppu,
};

/// Read handler tags for the 64 KiB CPU space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuRead {
    /// Backing-store read at the stored (pre-masked) index.
    Ram { index: u16 },
    /// Undriven address: returns the floating latch.
    Open,
    /// PPU register mirror, `reg` = `addr & 7`.
    PpuReg { reg: u8 },
    /// APU status register (`$4015`).
    ApuStatus,
    /// Controller serial read, `port` = 0 or 1.
    Controller { port: u8 },
    /// Cartridge PRG-ROM window; the mapper resolves the bank index.
    PrgRom { slot: u8 },
    /// Cartridge PRG-RAM window.
    PrgRam { slot: u8 },
    /// Mapper-visible readable register space.
    CartReg,
}

/// Write handler tags for the 64 KiB CPU space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuWrite {
    /// Backing-store write at the stored (pre-masked) index.
    Ram { index: u16 },
    /// Writes fall off the bus (ROM without registers, unmapped space).
    Ignore,
    /// PPU register mirror, `reg` = `addr & 7`.
    PpuReg { reg: u8 },
    /// APU channel/status/frame-counter register, `reg` = `addr & 0x1F`.
    ApuReg { reg: u8 },
    /// OAM DMA trigger (`$4014`).
    OamDma,
    /// Controller strobe line (`$4016`).
    Strobe,
    /// Cartridge PRG-RAM window.
    PrgRam { slot: u8 },
    /// Mapper bank-select / control register space.
    CartReg,
    /// Trampoline: runs the saved handler after notifying the mapper of the
    /// write (used by boards that snoop writes into otherwise plain windows).
    CartTap { id: TrampolineId },
}

/// The CPU bus fabric: one read and one write tag per address, 64 KiB of
/// backing store, and the floating-data latch.
pub type CpuFabric = Fabric<CpuRead, CpuWrite, { cpu_mem::ADDRESS_SPACE }>;

/// Builds the power-on CPU fabric: RAM mirrors, device registers, and open
/// bus everywhere the cartridge has not claimed yet.
pub fn power_on_fabric() -> CpuFabric {
    let mut fab = CpuFabric::new(CpuRead::Open, CpuWrite::Ignore);
    bind_fixed_slots(&mut fab);
    fab
}

/// Binds the console-owned slots (everything below `$4020`).
pub fn bind_fixed_slots(fab: &mut CpuFabric) {
    for addr in cpu_mem::RAM_START..=cpu_mem::RAM_MIRROR_END {
        let index = addr & cpu_mem::RAM_MASK;
        fab.set_read(addr, CpuRead::Ram { index });
        fab.set_write(addr, CpuWrite::Ram { index });
    }
    for addr in cpu_mem::PPU_REG_START..=cpu_mem::PPU_REG_END {
        let reg = (addr & cpu_mem::PPU_REG_MASK) as u8;
        fab.set_read(addr, CpuRead::PpuReg { reg });
        fab.set_write(addr, CpuWrite::PpuReg { reg });
    }
    for addr in cpu_mem::APU_REG_START..=cpu_mem::APU_REG_END {
        // Channel registers are write-only; reads stay on the open bus.
        fab.set_write(addr, CpuWrite::ApuReg {
            reg: (addr & 0x1F) as u8,
        });
    }
    fab.set_write(cpu_mem::OAM_DMA, CpuWrite::OamDma);
    fab.set_read(cpu_mem::APU_STATUS, CpuRead::ApuStatus);
    fab.set_write(cpu_mem::APU_STATUS, CpuWrite::ApuReg { reg: 0x15 });
    fab.set_read(cpu_mem::CONTROLLER_1, CpuRead::Controller { port: 0 });
    fab.set_write(cpu_mem::CONTROLLER_1, CpuWrite::Strobe);
    fab.set_read(cpu_mem::CONTROLLER_2, CpuRead::Controller { port: 1 });
    fab.set_write(cpu_mem::FRAME_COUNTER, CpuWrite::ApuReg { reg: 0x17 });
    // $4018-$401F (test mode) stays open-bus / ignored.
}

/// Pending side effects raised by bus writes and consumed by the CPU after
/// the current bus cycle completes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CpuSignals {
    /// Page written to `$4014`; the CPU turns this into an OAM DMA halt.
    pub oam_dma_page: Option<u8>,
}

impl CpuSignals {
    pub fn take_oam_dma(&mut self) -> Option<u8> {
        self.oam_dma_page.take()
    }
}

/// Mutable view of everything the CPU can reach through its bus.
///
/// Built by the machine for each CPU tick; the borrow ends before any other
/// component runs, so there is exactly one owner of mutable state at any
/// moment.
pub struct CpuBusView<'a> {
    pub fab: &'a mut CpuFabric,
    pub ppu_fab: &'a mut PpuFabric,
    pub ppu: &'a mut Ppu,
    pub apu: &'a mut Apu,
    pub cart: Option<&'a mut Cartridge>,
    pub controllers: &'a mut ControllerPorts,
    pub signals: &'a mut CpuSignals,
    /// CPU cycle count at the start of this tick (for mapper/APU timing).
    pub cycles: u64,
    /// NMI line level sampled at the start of this tick.
    pub nmi_line: bool,
    /// IRQ line level (any source asserted) sampled at the start of this tick.
    pub irq_line: bool,
}

impl CpuBusView<'_> {
    /// One CPU bus read. Invokes the slot's handler, refreshes the floating
    /// latch with the returned byte, and hands the byte back.
    pub fn read(&mut self, addr: u16) -> u8 {
        let tag = self.fab.read_tag(addr);
        let value = self.dispatch_read(addr, tag);
        self.fab.set_float(value);
        value
    }

    /// One CPU bus write. The written byte also drives the data bus.
    pub fn write(&mut self, addr: u16, value: u8) {
        self.fab.set_float(value);
        let tag = self.fab.write_tag(addr);
        self.dispatch_write(addr, value, tag);
    }

    fn dispatch_read(&mut self, addr: u16, tag: CpuRead) -> u8 {
        match tag {
            CpuRead::Ram { index } => self.fab.backing(index),
            CpuRead::Open => self.fab.float(),
            CpuRead::PpuReg { reg } => {
                let reg = ppu_mem::Register::from_index(reg);
                let mut ppu_bus = PpuBusView {
                    fab: &mut *self.ppu_fab,
                    cart: self.cart.as_deref_mut(),
                    cpu_cycle: self.cycles,
                };
                self.ppu.reg_read(reg, &mut ppu_bus)
            }
            CpuRead::ApuStatus => {
                // Bit 5 of $4015 is never driven and floats.
                self.apu.read_status() | (self.fab.float() & 0x20)
            }
            CpuRead::Controller { port } => {
                // Only D0-D4 are driven by the port; D5-D7 float.
                (self.controllers.read(port) & 0x1F) | (self.fab.float() & 0xE0)
            }
            CpuRead::PrgRom { slot } => match self.cart.as_deref() {
                Some(cart) => cart.prg_read(slot, addr),
                None => self.fab.float(),
            },
            CpuRead::PrgRam { slot } => match self.cart.as_deref() {
                Some(cart) => cart.prg_ram_read(slot, addr),
                None => self.fab.float(),
            },
            CpuRead::CartReg => match self.cart.as_deref_mut() {
                Some(cart) => cart.register_read(addr).unwrap_or(self.fab.float()),
                None => self.fab.float(),
            },
        }
    }

    fn dispatch_write(&mut self, addr: u16, value: u8, tag: CpuWrite) {
        let mut tag = tag;
        loop {
            match tag {
                CpuWrite::Ram { index } => self.fab.backing_set(index, value),
                CpuWrite::Ignore => {}
                CpuWrite::PpuReg { reg } => {
                    let reg = ppu_mem::Register::from_index(reg);
                    let mut ppu_bus = PpuBusView {
                        fab: &mut *self.ppu_fab,
                        cart: self.cart.as_deref_mut(),
                        cpu_cycle: self.cycles,
                    };
                    self.ppu.reg_write(reg, value, &mut ppu_bus);
                }
                CpuWrite::ApuReg { reg } => self.apu.cpu_write(reg, value, self.cycles),
                CpuWrite::OamDma => self.signals.oam_dma_page = Some(value),
                CpuWrite::Strobe => self.controllers.write_strobe(value),
                CpuWrite::PrgRam { slot } => {
                    if let Some(cart) = self.cart.as_deref_mut() {
                        cart.prg_ram_write(slot, addr, value);
                    }
                }
                CpuWrite::CartReg => {
                    if let Some(cart) = self.cart.as_deref_mut() {
                        let mut mapper_bus = MapperBus {
                            cpu: &mut *self.fab,
                            ppu: &mut *self.ppu_fab,
                        };
                        cart.register_write(addr, value, &mut mapper_bus);
                    }
                }
                CpuWrite::CartTap { id } => {
                    if let Some(cart) = self.cart.as_deref_mut() {
                        let mut mapper_bus = MapperBus {
                            cpu: &mut *self.fab,
                            ppu: &mut *self.ppu_fab,
                        };
                        cart.register_write(addr, value, &mut mapper_bus);
                    }
                    tag = self.fab.saved_write(id);
                    continue;
                }
            }
            break;
        }
    }

    /// Side-effect-free read used by debuggers and the trace tooling.
    pub fn peek(&self, addr: u16) -> u8 {
        match self.fab.read_tag(addr) {
            CpuRead::Ram { index } => self.fab.backing(index),
            CpuRead::Open | CpuRead::CartReg => self.fab.float(),
            CpuRead::PpuReg { reg } => self.ppu.reg_peek(ppu_mem::Register::from_index(reg)),
            CpuRead::ApuStatus => self.apu.peek_status() | (self.fab.float() & 0x20),
            CpuRead::Controller { port } => {
                (self.controllers.peek(port) & 0x1F) | (self.fab.float() & 0xE0)
            }
            CpuRead::PrgRom { slot } => match self.cart.as_deref() {
                Some(cart) => cart.prg_read(slot, addr),
                None => self.fab.float(),
            },
            CpuRead::PrgRam { slot } => match self.cart.as_deref() {
                Some(cart) => cart.prg_ram_read(slot, addr),
                None => self.fab.float(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ppu as ppu_bus;
    use crate::cartridge::load_cartridge;
    use crate::controller::ControllerPorts;
    use crate::ppu::frame::PixelFormat;
    use crate::region::Region;

    fn nrom() -> Cartridge {
        let mut image = vec![
            b'N', b'E', b'S', 0x1A, 1, 1, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        image.extend(vec![0u8; 16 * 1024]);
        image.extend(vec![0u8; 8 * 1024]);
        load_cartridge(&image).expect("nrom image")
    }

    #[test]
    fn write_trampoline_chains_to_the_displaced_handler() {
        let mut fab = power_on_fabric();
        let mut ppu_fab = ppu_bus::power_on_fabric();
        let mut ppu = crate::ppu::Ppu::new(Region::Ntsc, PixelFormat::Indexed);
        let mut apu = crate::apu::Apu::new(Region::Ntsc);
        let mut cart = nrom();
        cart.attach(&mut fab, &mut ppu_fab);
        let mut controllers = ControllerPorts::new();
        let mut signals = CpuSignals::default();

        // Wrap the APU status write with a cartridge tap.
        fab.install_write_trampoline(cpu_mem::APU_STATUS, |id| CpuWrite::CartTap { id });

        let mut view = CpuBusView {
            fab: &mut fab,
            ppu_fab: &mut ppu_fab,
            ppu: &mut ppu,
            apu: &mut apu,
            cart: Some(&mut cart),
            controllers: &mut controllers,
            signals: &mut signals,
            cycles: 0,
            nmi_line: false,
            irq_line: false,
        };
        // Enable pulse 1 through the wrapped slot, then load its length.
        view.write(cpu_mem::APU_STATUS, 0x01);
        view.write(0x4003, 0x08);
        // The chained APU handler must have seen the enable.
        assert_eq!(view.read(cpu_mem::APU_STATUS) & 0x01, 0x01);
    }

    #[test]
    fn reads_refresh_the_floating_latch() {
        let mut fab = power_on_fabric();
        let mut ppu_fab = ppu_bus::power_on_fabric();
        let mut ppu = crate::ppu::Ppu::new(Region::Ntsc, PixelFormat::Indexed);
        let mut apu = crate::apu::Apu::new(Region::Ntsc);
        let mut controllers = ControllerPorts::new();
        let mut signals = CpuSignals::default();
        let mut view = CpuBusView {
            fab: &mut fab,
            ppu_fab: &mut ppu_fab,
            ppu: &mut ppu,
            apu: &mut apu,
            cart: None,
            controllers: &mut controllers,
            signals: &mut signals,
            cycles: 0,
            nmi_line: false,
            irq_line: false,
        };
        view.write(0x0040, 0x5C);
        assert_eq!(view.read(0x0040), 0x5C);
        assert_eq!(view.fab.float(), 0x5C);
        // Undriven test-mode space returns the latch.
        assert_eq!(view.read(0x4018), 0x5C);
    }
}
