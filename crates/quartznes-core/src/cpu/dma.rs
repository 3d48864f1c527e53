//! Sprite (OAM) and DMC DMA bus-steal bookkeeping.
//!
//! The 2A03 stalls the CPU by pulling RDY low; the CPU finishes any write
//! cycles, halts on its next read, and this unit then owns the bus: an
//! optional alignment cycle, then 256 get/put pairs for OAM DMA or a single
//! get for a DMC sample fetch. The cycle-stepping itself lives in
//! `Cpu::dma_cycle`, which is the alternate tick path while `engaged`.

/// What the stolen bus cycles are used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub(crate) enum DmaKind {
    /// 256-byte copy from `page << 8` into OAMDATA.
    Oam { page: u8 },
    /// Single sample fetch for the delta modulation channel.
    Dmc { addr: u16 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct DmaUnit {
    pub(crate) kind: Option<DmaKind>,
    /// DMC fetch requested while an OAM transfer holds the bus.
    pub(crate) pending_dmc: Option<u16>,
    /// True once the CPU has halted and the DMA owns the bus.
    pub(crate) engaged: bool,
    /// Get/put phase within the OAM copy loop.
    pub(crate) write_phase: bool,
    pub(crate) offset: u16,
    pub(crate) value: u8,
    /// Address of the read the CPU halted on; replayed as dummy reads while
    /// the bus waits for alignment, and re-executed for real once DMA ends.
    pub(crate) halted_addr: u16,
}

impl DmaUnit {
    pub(crate) fn begin_oam(&mut self, page: u8) {
        // A DMC fetch that lost the race runs right after the OAM copy.
        if let Some(DmaKind::Dmc { addr }) = self.kind {
            self.pending_dmc = Some(addr);
        }
        self.kind = Some(DmaKind::Oam { page });
        self.engaged = false;
        self.write_phase = false;
        self.offset = 0;
    }

    pub(crate) fn begin_dmc(&mut self, addr: u16) {
        if self.kind.is_some() {
            self.pending_dmc = Some(addr);
        } else {
            self.kind = Some(DmaKind::Dmc { addr });
            self.engaged = false;
            self.write_phase = false;
        }
    }

    /// Called at the halting read; the DMA owns the bus from here on.
    pub(crate) fn engage(&mut self, halted_addr: u16) {
        self.halted_addr = halted_addr;
        self.engaged = true;
    }

    pub(crate) fn requested(&self) -> bool {
        self.kind.is_some()
    }

    pub(crate) fn engaged(&self) -> bool {
        self.engaged
    }

    /// Ends the current transfer; a queued DMC fetch keeps the bus.
    pub(crate) fn finish(&mut self) -> bool {
        self.kind = self.pending_dmc.take().map(|addr| DmaKind::Dmc { addr });
        self.write_phase = false;
        self.offset = 0;
        if self.kind.is_some() {
            true
        } else {
            self.engaged = false;
            false
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
