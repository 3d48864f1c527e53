//! 6502 (2A03) core as a per-cycle state machine.
//!
//! One call to [`Cpu::tick`] is one bus cycle. The two half-cycles are
//! explicit in the ordering inside `tick`: the PHI1 bookkeeping (shifting the
//! IRQ sample taken at the end of the previous cycle) happens first, the
//! micro-op's single bus access is the PHI2 body, and the NMI edge detector
//! and IRQ level sampler run at the end. Opcodes are table-driven: the fetch
//! cycle selects a static [`Instruction`], and a cursor walks its micro-op
//! list one cycle at a time.
//!
//! RDY-halt semantics: when RDY is low the CPU completes write cycles
//! normally but halts on the first read, after which the DMA unit owns the
//! bus (see `cpu::dma`). The halted read's micro-op cursor is left in place,
//! so when the transfer ends the read simply re-executes - the "replay the
//! halted read" resolution of the two hardware-equivalent designs.

use crate::bus::cpu::CpuBusView;
use crate::cpu::dma::{DmaKind, DmaUnit};
use crate::cpu::instruction::{Instruction, Mnemonic};
use crate::cpu::lookup::LOOKUP_TABLE;
use crate::cpu::micro_op::Ctl;
use crate::cpu::status::Status;
use crate::memory::cpu as cpu_mem;

pub mod dma;
pub mod instruction;
pub(crate) mod lookup;
pub(crate) mod micro_op;
pub mod status;

/// Build-independent behavior knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "savestate", derive(serde::Serialize, serde::Deserialize))]
pub struct CpuTuning {
    /// Magic constant feeding the unstable ANE/LXA opcodes. `0xFF` matches
    /// most front-loader consoles; single-step verification suites expect
    /// `0xEE`.
    pub lxa_magic: u8,
}

impl Default for CpuTuning {
    fn default() -> Self {
        Self { lxa_magic: 0xFF }
    }
}

#[derive(Debug)]
pub struct Cpu {
    // Architectural registers.
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub p: Status,
    pub pc: u16,

    // Dispatch state.
    pub(crate) opcode: u8,
    pub(crate) instruction: Option<&'static Instruction>,
    pub(crate) op_index: usize,

    // Latched operands.
    pub(crate) operand: u8,
    pub(crate) address: u16,
    pub(crate) target: u16,
    pub(crate) pointer: u8,
    /// High byte of the pre-index base address (unstable SH* stores).
    pub(crate) base_high: u8,
    pub(crate) crossed: bool,

    // Interrupt lines and latches; the polling order is described in the
    // module docs.
    pub(crate) last_nmi_line: bool,
    pub(crate) detected_nmi: bool,
    pub(crate) handle_nmi: bool,
    pub(crate) irq_seen_low_phi2: bool,
    pub(crate) irq_status_phi1: bool,
    pub(crate) handle_irq: bool,
    /// Current BRK-shaped sequence was injected (IRQ/NMI), not fetched.
    pub(crate) servicing_interrupt: bool,
    pub(crate) vector: u16,
    pub(crate) reset_pending: bool,
    pub(crate) jammed: bool,

    // RDY / DMA.
    pub(crate) rdy_low: bool,
    pub(crate) dma: DmaUnit,

    pub(crate) cycles: u64,
    pub(crate) tuning: CpuTuning,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            s: 0,
            p: Status::power_on(),
            pc: 0,
            opcode: 0,
            instruction: None,
            op_index: 0,
            operand: 0,
            address: 0,
            target: 0,
            pointer: 0,
            base_high: 0,
            crossed: false,
            last_nmi_line: false,
            detected_nmi: false,
            handle_nmi: false,
            irq_seen_low_phi2: false,
            irq_status_phi1: false,
            handle_irq: false,
            servicing_interrupt: false,
            vector: cpu_mem::RESET_VECTOR,
            reset_pending: true,
            jammed: false,
            rdy_low: false,
            dma: DmaUnit::default(),
            cycles: 0,
            tuning: CpuTuning::default(),
        }
    }

    /// Power-on reset: registers to known values, then the reset
    /// micro-sequence (whose stack pushes are reads) runs from the first
    /// cycle.
    pub fn reset_to_known(&mut self) {
        *self = Self {
            tuning: self.tuning,
            ..Self::new()
        };
    }

    /// Soft reset: keeps registers and flags, re-arms the reset sequence.
    pub fn reset_analog(&mut self) {
        self.instruction = None;
        self.op_index = 0;
        self.crossed = false;
        self.jammed = false;
        self.rdy_low = false;
        self.dma.reset();
        self.reset_pending = true;
        self.detected_nmi = false;
        self.handle_nmi = false;
        self.handle_irq = false;
        self.servicing_interrupt = false;
    }

    pub fn tuning_mut(&mut self) -> &mut CpuTuning {
        &mut self.tuning
    }

    /// Total bus cycles executed since power-on.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// True once a JAM opcode has locked the core (only reset recovers).
    pub fn jammed(&self) -> bool {
        self.jammed
    }

    /// True while the CPU sits between instructions (used by trace hooks).
    pub fn at_instruction_boundary(&self) -> bool {
        self.instruction.is_none()
    }

    pub(crate) fn instruction_mnemonic(&self) -> Mnemonic {
        match self.instruction {
            Some(ins) => ins.mnemonic,
            None => Mnemonic::NOP,
        }
    }

    /// Queues a DMC sample fetch; the bus steal starts at the CPU's next
    /// read cycle.
    pub(crate) fn request_dmc_fetch(&mut self, addr: u16) {
        self.dma.begin_dmc(addr);
        self.rdy_low = true;
    }

    /// Runs exactly one bus cycle.
    pub(crate) fn tick(&mut self, bus: &mut CpuBusView) {
        // PHI1: the IRQ level seen during the previous PHI2 becomes this
        // cycle's poll input.
        self.irq_status_phi1 = self.irq_seen_low_phi2;
        self.irq_seen_low_phi2 = false;

        if self.jammed {
            self.cycles = self.cycles.wrapping_add(1);
            return;
        }

        if self.dma.engaged() {
            self.dma_cycle(bus);
        } else {
            self.exec_cycle(bus);
        }

        // End of PHI2: NMI is edge-detected, IRQ is level-sampled.
        if bus.nmi_line && !self.last_nmi_line {
            self.detected_nmi = true;
        }
        self.last_nmi_line = bus.nmi_line;
        if bus.irq_line {
            self.irq_seen_low_phi2 = true;
        }

        // A write to $4014 this cycle arms the OAM transfer.
        if let Some(page) = bus.signals.take_oam_dma() {
            self.dma.begin_oam(page);
            self.rdy_low = true;
        }

        self.cycles = self.cycles.wrapping_add(1);
    }

    fn exec_cycle(&mut self, bus: &mut CpuBusView) {
        match self.instruction {
            None => {
                if self.rdy_low && self.dma.requested() {
                    self.halt_for_dma(self.pc, bus);
                    return;
                }
                let interrupt = self.reset_pending || self.handle_nmi || self.handle_irq;
                let fetched = bus.read(self.pc);
                if interrupt {
                    // The fetched opcode is discarded in favor of the
                    // BRK-shaped sequence; PC does not advance.
                    self.opcode = 0x00;
                    self.servicing_interrupt = true;
                } else {
                    self.opcode = fetched;
                    self.servicing_interrupt = false;
                    self.pc = self.pc.wrapping_add(1);
                }
                self.instruction = Some(&LOOKUP_TABLE[self.opcode as usize]);
                self.op_index = 0;
            }
            Some(ins) => {
                let op = ins.ops[self.op_index];
                if self.rdy_low && self.dma.requested() {
                    if let Some(addr) = op.halt_read_addr(self) {
                        self.halt_for_dma(addr, bus);
                        return;
                    }
                }
                if op.polls() {
                    self.poll_interrupt_boundary();
                }
                match op.exec(self, bus) {
                    Ctl::Done => self.finish_instruction(),
                    Ctl::Next => {
                        self.op_index += 1;
                        if self.op_index >= ins.ops.len() {
                            self.finish_instruction();
                        }
                    }
                }
            }
        }
    }

    fn finish_instruction(&mut self) {
        self.instruction = None;
        self.op_index = 0;
        self.crossed = false;
    }

    /// The instruction-boundary interrupt check. Runs at the start of every
    /// potentially-final cycle using the IRQ level sampled one cycle ago, so
    /// flag changes made *during* the final cycle cannot affect it.
    fn poll_interrupt_boundary(&mut self) {
        self.handle_irq = !self.p.contains(Status::INTERRUPT) && self.irq_status_phi1;
        if self.detected_nmi {
            self.handle_nmi = true;
            self.detected_nmi = false;
        }
    }

    /// First stolen cycle: the read the CPU halted on becomes a dummy read.
    fn halt_for_dma(&mut self, addr: u16, bus: &mut CpuBusView) {
        bus.read(addr);
        self.dma.engage(addr);
    }

    /// Alternate tick body while the DMA unit owns the bus.
    fn dma_cycle(&mut self, bus: &mut CpuBusView) {
        let Some(kind) = self.dma.kind else {
            // Nothing left to transfer; give the bus back.
            self.dma.engaged = false;
            self.rdy_low = false;
            return;
        };
        if self.dma.write_phase {
            // Put cycle of the OAM copy loop.
            bus.write(0x2004, self.dma.value);
            self.dma.write_phase = false;
            self.dma.offset += 1;
            if self.dma.offset == 256 {
                self.end_dma_transfer();
            }
            return;
        }
        // Get cycles only happen on even CPU cycles; odd cycles repeat the
        // halted read until the bus aligns.
        if self.cycles & 1 != 0 {
            bus.read(self.dma.halted_addr);
            return;
        }
        match kind {
            DmaKind::Oam { page } => {
                let src = (u16::from(page) << 8) | self.dma.offset;
                self.dma.value = bus.read(src);
                self.dma.write_phase = true;
            }
            DmaKind::Dmc { addr } => {
                let value = bus.read(addr);
                bus.apu.dmc_sample_fetched(value);
                self.end_dma_transfer();
            }
        }
    }

    fn end_dma_transfer(&mut self) {
        if !self.dma.finish() {
            self.rdy_low = false;
        }
    }

    // --- ALU helpers shared by the micro-ops ---

    /// Splits an indexed absolute address into the uncarried (`address`) and
    /// carried (`target`) forms; `crossed` records whether they differ.
    pub(crate) fn index_address(&mut self, hi: u8, index: u8) {
        let base = (u16::from(hi) << 8) | (self.address & 0x00FF);
        self.base_high = hi;
        self.target = base.wrapping_add(u16::from(index));
        self.address = (base & 0xFF00) | (self.target & 0x00FF);
        self.crossed = self.address != self.target;
    }

    pub(crate) fn push(&mut self, bus: &mut CpuBusView, value: u8) {
        bus.write(cpu_mem::STACK_PAGE + u16::from(self.s), value);
        self.s = self.s.wrapping_sub(1);
    }

    pub(crate) fn pull(&mut self, bus: &mut CpuBusView) -> u8 {
        self.s = self.s.wrapping_add(1);
        bus.read(cpu_mem::STACK_PAGE + u16::from(self.s))
    }

    /// Interrupt-sequence push; RESET holds R/W high, so the "push" reads
    /// the stack slot instead and only the pointer moves.
    pub(crate) fn push_or_read(&mut self, bus: &mut CpuBusView, value: u8) {
        let addr = cpu_mem::STACK_PAGE + u16::from(self.s);
        if self.reset_pending {
            bus.read(addr);
        } else {
            bus.write(addr, value);
        }
        self.s = self.s.wrapping_sub(1);
    }

    /// Chooses the interrupt vector. An NMI edge seen by this point hijacks
    /// a BRK or IRQ sequence already in flight.
    pub(crate) fn select_vector(&mut self) {
        if self.reset_pending {
            self.vector = cpu_mem::RESET_VECTOR;
        } else if self.handle_nmi || self.detected_nmi {
            self.vector = cpu_mem::NMI_VECTOR;
            self.handle_nmi = false;
            self.detected_nmi = false;
        } else {
            self.vector = cpu_mem::IRQ_VECTOR;
        }
    }

    pub(crate) fn adc(&mut self, value: u8) {
        let carry = u16::from(self.p.contains(Status::CARRY));
        let sum = u16::from(self.a) + u16::from(value) + carry;
        let result = sum as u8;
        self.p.set(Status::CARRY, sum > 0xFF);
        self.p.set(
            Status::OVERFLOW,
            (!(self.a ^ value) & (self.a ^ result) & 0x80) != 0,
        );
        self.a = result;
        self.p.set_zn(result);
    }

    pub(crate) fn compare(&mut self, register: u8, value: u8) {
        self.p.set(Status::CARRY, register >= value);
        self.p.set_zn(register.wrapping_sub(value));
    }

    pub(crate) fn shift_left(&mut self, value: u8, carry_in: bool) -> u8 {
        self.p.set(Status::CARRY, value & 0x80 != 0);
        let result = (value << 1) | u8::from(carry_in);
        self.p.set_zn(result);
        result
    }

    pub(crate) fn shift_right(&mut self, value: u8, carry_in: bool) -> u8 {
        self.p.set(Status::CARRY, value & 0x01 != 0);
        let result = (value >> 1) | (u8::from(carry_in) << 7);
        self.p.set_zn(result);
        result
    }
}

/// Serializable image of the CPU, including the dispatch cursor.
#[cfg(feature = "savestate")]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CpuState {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub p: u8,
    pub pc: u16,
    pub opcode: u8,
    pub mid_instruction: bool,
    pub op_index: u32,
    pub operand: u8,
    pub address: u16,
    pub target: u16,
    pub pointer: u8,
    pub base_high: u8,
    pub crossed: bool,
    pub last_nmi_line: bool,
    pub detected_nmi: bool,
    pub handle_nmi: bool,
    pub irq_seen_low_phi2: bool,
    pub irq_status_phi1: bool,
    pub handle_irq: bool,
    pub servicing_interrupt: bool,
    pub vector: u16,
    pub reset_pending: bool,
    pub jammed: bool,
    pub rdy_low: bool,
    pub dma: DmaUnit,
    pub cycles: u64,
    pub tuning: CpuTuning,
}

#[cfg(feature = "savestate")]
impl Cpu {
    pub(crate) fn save_state(&self) -> CpuState {
        CpuState {
            a: self.a,
            x: self.x,
            y: self.y,
            s: self.s,
            p: self.p.bits(),
            pc: self.pc,
            opcode: self.opcode,
            mid_instruction: self.instruction.is_some(),
            op_index: self.op_index as u32,
            operand: self.operand,
            address: self.address,
            target: self.target,
            pointer: self.pointer,
            base_high: self.base_high,
            crossed: self.crossed,
            last_nmi_line: self.last_nmi_line,
            detected_nmi: self.detected_nmi,
            handle_nmi: self.handle_nmi,
            irq_seen_low_phi2: self.irq_seen_low_phi2,
            irq_status_phi1: self.irq_status_phi1,
            handle_irq: self.handle_irq,
            servicing_interrupt: self.servicing_interrupt,
            vector: self.vector,
            reset_pending: self.reset_pending,
            jammed: self.jammed,
            rdy_low: self.rdy_low,
            dma: self.dma,
            cycles: self.cycles,
            tuning: self.tuning,
        }
    }

    pub(crate) fn load_state(&mut self, state: &CpuState) {
        self.a = state.a;
        self.x = state.x;
        self.y = state.y;
        self.s = state.s;
        self.p = Status::from_bits_truncate(state.p);
        self.pc = state.pc;
        self.opcode = state.opcode;
        // The micro-op list is static per opcode; rebind instead of storing.
        self.instruction = state
            .mid_instruction
            .then(|| &LOOKUP_TABLE[state.opcode as usize]);
        self.op_index = (state.op_index as usize)
            .min(LOOKUP_TABLE[state.opcode as usize].ops.len().saturating_sub(1));
        self.operand = state.operand;
        self.address = state.address;
        self.target = state.target;
        self.pointer = state.pointer;
        self.base_high = state.base_high;
        self.crossed = state.crossed;
        self.last_nmi_line = state.last_nmi_line;
        self.detected_nmi = state.detected_nmi;
        self.handle_nmi = state.handle_nmi;
        self.irq_seen_low_phi2 = state.irq_seen_low_phi2;
        self.irq_status_phi1 = state.irq_status_phi1;
        self.handle_irq = state.handle_irq;
        self.servicing_interrupt = state.servicing_interrupt;
        self.vector = state.vector;
        self.reset_pending = state.reset_pending;
        self.jammed = state.jammed;
        self.rdy_low = state.rdy_low;
        self.dma = state.dma;
        self.cycles = state.cycles;
        self.tuning = state.tuning;
    }
}
