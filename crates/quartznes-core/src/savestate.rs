//! Versioned machine snapshots.
//!
//! The record is encoded with `postcard` (little-endian, compact varints)
//! and carries a version number plus a cartridge fingerprint; loads refuse
//! blobs from other versions or other cartridges. Mapper state travels as
//! an opaque byte blob owned by the board implementation.

use crate::{
    apu::ApuState,
    clock::ClockState,
    controller::ControllerPorts,
    cpu::CpuState,
    error::Error,
    machine::{IrqLines, Machine},
    memory::{cpu as cpu_mem, ppu as ppu_mem},
    ppu::PpuState,
    region::Region,
};

/// Bump when any component's state layout changes.
pub const SAVE_STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SaveState {
    pub version: u32,
    pub region: Region,
    /// Mapper id and PRG size, used to reject foreign snapshots.
    pub mapper_id: u16,
    pub prg_rom_size: u64,
    pub cpu: CpuState,
    pub cpu_ram: Vec<u8>,
    pub cpu_float: u8,
    pub ppu: PpuState,
    pub ciram: Vec<u8>,
    pub ppu_float: u8,
    pub apu: ApuState,
    pub mapper: Vec<u8>,
    pub clock: ClockState,
    pub controllers: ControllerPorts,
    pub irq: IrqLines,
}

impl Machine {
    /// Captures a complete snapshot as a portable byte blob.
    pub fn save_state(&self) -> Result<Vec<u8>, Error> {
        let (mapper_id, prg_rom_size, mapper) = match self.cart.as_ref() {
            Some(cart) => (
                cart.mapper().mapper_id(),
                cart.header().prg_rom_size as u64,
                cart.save_state(),
            ),
            None => (u16::MAX, 0, Vec::new()),
        };
        let state = SaveState {
            version: SAVE_STATE_VERSION,
            region: self.region,
            mapper_id,
            prg_rom_size,
            cpu: self.cpu.save_state(),
            cpu_ram: self.cpu_fab.backing_slice()[..cpu_mem::RAM_SIZE].to_vec(),
            cpu_float: self.cpu_fab.float(),
            ppu: self.ppu.save_state(),
            ciram: {
                let base = usize::from(ppu_mem::CIRAM_BACKING_BASE);
                self.ppu_fab.backing_slice()[base..base + ppu_mem::CIRAM_SIZE].to_vec()
            },
            ppu_float: self.ppu_fab.float(),
            apu: self.apu.save_state(),
            mapper,
            clock: self.clock.save_state(),
            controllers: self.controllers,
            irq: self.irq,
        };
        Ok(postcard::to_stdvec(&state)?)
    }

    /// Restores a snapshot captured by the same core version with the same
    /// cartridge inserted.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let state: SaveState = postcard::from_bytes(bytes)?;
        if state.version != SAVE_STATE_VERSION {
            return Err(Error::SaveStateVersion {
                found: state.version,
                supported: SAVE_STATE_VERSION,
            });
        }
        let (mapper_id, prg_rom_size) = match self.cart.as_ref() {
            Some(cart) => (
                cart.mapper().mapper_id(),
                cart.header().prg_rom_size as u64,
            ),
            None => (u16::MAX, 0),
        };
        if state.mapper_id != mapper_id || state.prg_rom_size != prg_rom_size {
            return Err(Error::SaveStateMismatch);
        }

        self.cpu.load_state(&state.cpu);
        self.ppu.load_state(&state.ppu);
        self.apu.load_state(&state.apu);

        // Slot tables are rebuilt from scratch (stale trampolines must not
        // survive), then the board reprograms its windows and mirroring.
        self.cpu_fab = crate::bus::cpu::power_on_fabric();
        self.ppu_fab = crate::bus::ppu::power_on_fabric();
        if let Some(cart) = self.cart.as_mut() {
            cart.load_state(&state.mapper)?;
            cart.attach(&mut self.cpu_fab, &mut self.ppu_fab);
        }

        let ram_len = state.cpu_ram.len().min(cpu_mem::RAM_SIZE);
        self.cpu_fab.backing_slice_mut()[..ram_len].copy_from_slice(&state.cpu_ram[..ram_len]);
        self.cpu_fab.set_float(state.cpu_float);
        let base = usize::from(ppu_mem::CIRAM_BACKING_BASE);
        let ciram_len = state.ciram.len().min(ppu_mem::CIRAM_SIZE);
        self.ppu_fab.backing_slice_mut()[base..base + ciram_len]
            .copy_from_slice(&state.ciram[..ciram_len]);
        self.ppu_fab.set_float(state.ppu_float);

        self.clock.load_state(&state.clock);
        self.controllers = state.controllers;
        self.irq = state.irq;
        self.frame_ready = false;
        Ok(())
    }
}
