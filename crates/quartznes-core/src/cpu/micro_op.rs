//! The per-cycle micro-operations that make up every instruction.
//!
//! Each variant is one full bus cycle: at most one read or one write, plus
//! whatever internal state it moves. The engine in `cpu` walks an opcode's
//! `&'static [MicroOp]` with a cursor; an op may end the instruction early
//! (skipping the page-cross penalty) by returning [`Ctl::Done`].
//!
//! Interrupt polling is positional: [`MicroOp::polls`] marks every op that
//! can be an instruction's final cycle, and the engine runs the boundary
//! check at the start of such a cycle, before the op executes. That
//! reproduces the documented quirks without per-instruction special cases:
//! flag-change instructions (SEI/CLI/PLP) are polled with the old I value,
//! and a taken branch without a page cross skips the extra poll.

use crate::bus::cpu::CpuBusView;
use crate::cpu::instruction::Mnemonic;
use crate::cpu::status::Status;
use crate::cpu::Cpu;
use crate::memory::cpu as cpu_mem;

/// Cursor control returned by each executed micro-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ctl {
    /// Advance to the next op (or finish if this was the last).
    Next,
    /// The instruction ends on this cycle.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MicroOp {
    // --- Operand and address plumbing ---
    /// `address` low byte from `PC`; `PC += 1`.
    FetchAddrLo,
    /// `address` high byte from `PC`; `PC += 1`.
    FetchAddrHi,
    /// High byte from `PC`, then add X to the low byte without carry; the
    /// carried address lands in `target`, the uncarried one in `address`.
    FetchAddrHiAddX,
    /// As above with Y.
    FetchAddrHiAddY,
    /// Zero-page pointer byte from `PC`; `PC += 1`.
    FetchPointer,
    /// Dummy read of the pointer, then `pointer += X` within the page.
    ZpDummyAddX,
    /// `address` low byte from the zero-page pointer.
    ZpPointerToAddrLo,
    /// `address` high byte from `pointer + 1` (page-wrapped).
    ZpPointerToAddrHi,
    /// High byte from `pointer + 1`, then add Y to the low address byte
    /// without carry (split into `address`/`target` like the absolute forms).
    ZpPointerToAddrHiAddY,
    /// Dummy read of the zero-page address, then `address += X` in page.
    ZpAddrDummyAddX,
    /// As above with Y.
    ZpAddrDummyAddY,
    /// Page-cross resolution for reads: without a cross this cycle performs
    /// the data read and ends the instruction; with one it dummy-reads the
    /// uncarried address and fixes the high byte.
    ReadMaybeFix,
    /// The always-taken penalty cycle of stores and RMW: dummy read of the
    /// uncarried address, high byte fixed afterward.
    ReadFixAlways,

    // --- Data cycles ---
    /// Read the effective address and execute the read-class operation.
    ReadEffExec,
    /// Read the immediate operand at `PC` and execute.
    ReadImmExec,
    /// Plain operand read (first RMW data cycle).
    ReadEff,
    /// RMW double-write, first half: write the unmodified operand back while
    /// the ALU runs.
    DummyWriteExec,
    /// RMW final write of the modified operand.
    WriteResult,
    /// Store the register selected by the mnemonic.
    WriteRegEff,
    /// Unstable high-byte stores (SHA/SHX/SHY/SHS).
    WriteShEff,

    // --- Single-cycle executes ---
    /// Dummy read of `PC`, execute an implied operation.
    ExecImplied,
    /// Dummy read of `PC`, run the RMW operation on the accumulator.
    ExecAccumulator,

    // --- Stack ---
    /// Dummy read of `PC` (pre-cycle of stack instructions).
    DummyReadPc,
    /// Dummy read of the current stack slot.
    DummyReadStack,
    PushA,
    PushP,
    PullA,
    PullP,
    PullPcl,
    PullPch,
    PullPchDone,
    /// RTS tail: dummy read at the pulled `PC`, then `PC += 1`.
    IncPcDone,

    // --- Jumps and subroutines ---
    JmpAbsDone,
    JmpIndLo,
    JmpIndDone,
    JsrStackPeek,
    PushPch,
    PushPcl,
    JsrDone,

    // --- Branches ---
    /// Fetch the relative offset; a failed condition ends the instruction.
    FetchRelExec,
    /// Apply the offset to `PCL`; no page cross ends the instruction.
    BranchAdd,
    /// Fix `PCH` after a crossed branch.
    BranchFixDone,

    // --- Interrupt sequence (BRK-shaped) ---
    /// Padding fetch; `PC` increments only for a software BRK.
    BrkPad,
    /// Select the vector, then push `PCH` (a read during RESET).
    IntPushPch,
    IntPushPcl,
    IntPushP,
    IntVecLo,
    IntVecHiDone,

    /// Unofficial halt opcodes: lock the core and drive the bus high.
    Jam,
}

impl MicroOp {
    /// True when this op may be the final cycle of its instruction; the
    /// engine runs the interrupt boundary check at the start of such cycles.
    pub(crate) fn polls(self) -> bool {
        matches!(
            self,
            MicroOp::ReadMaybeFix
                | MicroOp::ReadEffExec
                | MicroOp::ReadImmExec
                | MicroOp::WriteResult
                | MicroOp::WriteRegEff
                | MicroOp::WriteShEff
                | MicroOp::ExecImplied
                | MicroOp::ExecAccumulator
                | MicroOp::PushA
                | MicroOp::PushP
                | MicroOp::PullA
                | MicroOp::PullP
                | MicroOp::PullPchDone
                | MicroOp::IncPcDone
                | MicroOp::JmpAbsDone
                | MicroOp::JmpIndDone
                | MicroOp::JsrDone
                | MicroOp::FetchRelExec
                | MicroOp::BranchFixDone
                | MicroOp::IntVecHiDone
        )
    }

    /// Address this op would read this cycle, if it reads at all. Used by
    /// the RDY-halt logic: a low RDY only stops the CPU on read cycles.
    pub(crate) fn halt_read_addr(self, cpu: &Cpu) -> Option<u16> {
        use MicroOp::*;
        match self {
            FetchAddrLo | FetchAddrHi | FetchAddrHiAddX | FetchAddrHiAddY | FetchPointer
            | ReadImmExec | FetchRelExec | ExecImplied | ExecAccumulator | DummyReadPc
            | BranchAdd | BranchFixDone | JmpAbsDone | JsrDone | IncPcDone | BrkPad => {
                Some(cpu.pc)
            }
            ZpDummyAddX => Some(u16::from(cpu.pointer)),
            ZpPointerToAddrLo => Some(u16::from(cpu.pointer)),
            ZpPointerToAddrHi | ZpPointerToAddrHiAddY => {
                Some(u16::from(cpu.pointer.wrapping_add(1)))
            }
            ZpAddrDummyAddX | ZpAddrDummyAddY | ReadMaybeFix | ReadFixAlways | ReadEffExec
            | ReadEff | JmpIndLo => Some(cpu.address),
            JmpIndDone => Some((cpu.address & 0xFF00) | (cpu.address.wrapping_add(1) & 0x00FF)),
            DummyReadStack | JsrStackPeek => Some(cpu_mem::STACK_PAGE + u16::from(cpu.s)),
            PullA | PullP | PullPcl | PullPch | PullPchDone => {
                Some(cpu_mem::STACK_PAGE + u16::from(cpu.s.wrapping_add(1)))
            }
            IntVecLo => Some(cpu.vector),
            IntVecHiDone => Some(cpu.vector.wrapping_add(1)),
            // Write cycles are never aborted by RDY. The interrupt pushes
            // are writes except during RESET, where halting is moot.
            DummyWriteExec | WriteResult | WriteRegEff | WriteShEff | PushA | PushP | PushPch
            | PushPcl | IntPushPch | IntPushPcl | IntPushP | Jam => None,
        }
    }

    pub(crate) fn exec(self, cpu: &mut Cpu, bus: &mut CpuBusView) -> Ctl {
        use MicroOp::*;
        match self {
            FetchAddrLo => {
                cpu.address = u16::from(bus.read(cpu.pc));
                cpu.pc = cpu.pc.wrapping_add(1);
            }
            FetchAddrHi => {
                cpu.address |= u16::from(bus.read(cpu.pc)) << 8;
                cpu.pc = cpu.pc.wrapping_add(1);
            }
            FetchAddrHiAddX => {
                let hi = bus.read(cpu.pc);
                cpu.pc = cpu.pc.wrapping_add(1);
                cpu.index_address(hi, cpu.x);
            }
            FetchAddrHiAddY => {
                let hi = bus.read(cpu.pc);
                cpu.pc = cpu.pc.wrapping_add(1);
                cpu.index_address(hi, cpu.y);
            }
            FetchPointer => {
                cpu.pointer = bus.read(cpu.pc);
                cpu.pc = cpu.pc.wrapping_add(1);
            }
            ZpDummyAddX => {
                bus.read(u16::from(cpu.pointer));
                cpu.pointer = cpu.pointer.wrapping_add(cpu.x);
            }
            ZpPointerToAddrLo => {
                cpu.address = u16::from(bus.read(u16::from(cpu.pointer)));
            }
            ZpPointerToAddrHi => {
                let hi = bus.read(u16::from(cpu.pointer.wrapping_add(1)));
                cpu.address |= u16::from(hi) << 8;
            }
            ZpPointerToAddrHiAddY => {
                let hi = bus.read(u16::from(cpu.pointer.wrapping_add(1)));
                cpu.index_address(hi, cpu.y);
            }
            ZpAddrDummyAddX => {
                bus.read(cpu.address);
                cpu.address = u16::from((cpu.address as u8).wrapping_add(cpu.x));
            }
            ZpAddrDummyAddY => {
                bus.read(cpu.address);
                cpu.address = u16::from((cpu.address as u8).wrapping_add(cpu.y));
            }
            ReadMaybeFix => {
                let value = bus.read(cpu.address);
                if cpu.crossed {
                    cpu.address = cpu.target;
                } else {
                    let mnemonic = cpu.instruction_mnemonic();
                    exec_read(cpu, mnemonic, value);
                    return Ctl::Done;
                }
            }
            ReadFixAlways => {
                bus.read(cpu.address);
                cpu.address = cpu.target;
            }

            ReadEffExec => {
                let value = bus.read(cpu.address);
                let mnemonic = cpu.instruction_mnemonic();
                exec_read(cpu, mnemonic, value);
            }
            ReadImmExec => {
                let value = bus.read(cpu.pc);
                cpu.pc = cpu.pc.wrapping_add(1);
                let mnemonic = cpu.instruction_mnemonic();
                exec_read(cpu, mnemonic, value);
            }
            ReadEff => {
                cpu.operand = bus.read(cpu.address);
            }
            DummyWriteExec => {
                bus.write(cpu.address, cpu.operand);
                let mnemonic = cpu.instruction_mnemonic();
                cpu.operand = exec_rmw(cpu, mnemonic, cpu.operand);
            }
            WriteResult => {
                bus.write(cpu.address, cpu.operand);
            }
            WriteRegEff => {
                let value = store_value(cpu, cpu.instruction_mnemonic());
                bus.write(cpu.address, value);
            }
            WriteShEff => {
                let mnemonic = cpu.instruction_mnemonic();
                let value = store_high_value(cpu, mnemonic);
                // On a page cross the corrupted high byte is also driven onto
                // the address lines.
                let addr = if cpu.crossed {
                    (u16::from(value) << 8) | (cpu.address & 0x00FF)
                } else {
                    cpu.address
                };
                bus.write(addr, value);
            }

            ExecImplied => {
                bus.read(cpu.pc);
                let mnemonic = cpu.instruction_mnemonic();
                exec_implied(cpu, mnemonic);
            }
            ExecAccumulator => {
                bus.read(cpu.pc);
                let mnemonic = cpu.instruction_mnemonic();
                cpu.a = exec_rmw(cpu, mnemonic, cpu.a);
            }

            DummyReadPc => {
                bus.read(cpu.pc);
            }
            DummyReadStack => {
                bus.read(cpu_mem::STACK_PAGE + u16::from(cpu.s));
            }
            PushA => {
                cpu.push(bus, cpu.a);
            }
            PushP => {
                let image = cpu.p.to_pushed(true);
                cpu.push(bus, image);
            }
            PullA => {
                cpu.a = cpu.pull(bus);
                cpu.p.set_zn(cpu.a);
            }
            PullP => {
                let image = cpu.pull(bus);
                cpu.p = Status::from_pulled(image);
            }
            PullPcl => {
                let lo = cpu.pull(bus);
                cpu.pc = (cpu.pc & 0xFF00) | u16::from(lo);
            }
            PullPch | PullPchDone => {
                let hi = cpu.pull(bus);
                cpu.pc = (cpu.pc & 0x00FF) | (u16::from(hi) << 8);
            }
            IncPcDone => {
                bus.read(cpu.pc);
                cpu.pc = cpu.pc.wrapping_add(1);
            }

            JmpAbsDone => {
                let hi = bus.read(cpu.pc);
                cpu.pc = (u16::from(hi) << 8) | (cpu.address & 0x00FF);
            }
            JmpIndLo => {
                cpu.target = u16::from(bus.read(cpu.address));
            }
            JmpIndDone => {
                // 6502 quirk: the pointer's high byte comes from the same
                // page, so $xxFF wraps to $xx00.
                let hi_addr = (cpu.address & 0xFF00) | (cpu.address.wrapping_add(1) & 0x00FF);
                let hi = bus.read(hi_addr);
                cpu.pc = (u16::from(hi) << 8) | cpu.target;
            }
            JsrStackPeek => {
                bus.read(cpu_mem::STACK_PAGE + u16::from(cpu.s));
            }
            PushPch => {
                let hi = (cpu.pc >> 8) as u8;
                cpu.push(bus, hi);
            }
            PushPcl => {
                let lo = (cpu.pc & 0xFF) as u8;
                cpu.push(bus, lo);
            }
            JsrDone => {
                let hi = bus.read(cpu.pc);
                cpu.pc = (u16::from(hi) << 8) | (cpu.address & 0x00FF);
            }

            FetchRelExec => {
                cpu.operand = bus.read(cpu.pc);
                cpu.pc = cpu.pc.wrapping_add(1);
                if !branch_taken(cpu, cpu.instruction_mnemonic()) {
                    return Ctl::Done;
                }
            }
            BranchAdd => {
                bus.read(cpu.pc);
                let offset = cpu.operand as i8;
                cpu.target = cpu.pc.wrapping_add(offset as u16);
                cpu.pc = (cpu.pc & 0xFF00) | (cpu.target & 0x00FF);
                if cpu.pc == cpu.target {
                    return Ctl::Done;
                }
            }
            BranchFixDone => {
                bus.read(cpu.pc);
                cpu.pc = cpu.target;
            }

            BrkPad => {
                bus.read(cpu.pc);
                if !cpu.servicing_interrupt && !cpu.reset_pending {
                    cpu.pc = cpu.pc.wrapping_add(1);
                }
            }
            IntPushPch => {
                // Vector selection happens here, which is also the end of
                // the NMI hijack window for BRK/IRQ sequences.
                cpu.select_vector();
                let hi = (cpu.pc >> 8) as u8;
                cpu.push_or_read(bus, hi);
            }
            IntPushPcl => {
                let lo = (cpu.pc & 0xFF) as u8;
                cpu.push_or_read(bus, lo);
            }
            IntPushP => {
                let brk = !cpu.servicing_interrupt && !cpu.reset_pending;
                let image = cpu.p.to_pushed(brk);
                cpu.push_or_read(bus, image);
            }
            IntVecLo => {
                let lo = bus.read(cpu.vector);
                cpu.pc = (cpu.pc & 0xFF00) | u16::from(lo);
                cpu.p.insert(Status::INTERRUPT);
            }
            IntVecHiDone => {
                let hi = bus.read(cpu.vector.wrapping_add(1));
                cpu.pc = (cpu.pc & 0x00FF) | (u16::from(hi) << 8);
                cpu.handle_irq = false;
                cpu.reset_pending = false;
                cpu.servicing_interrupt = false;
            }

            Jam => {
                bus.read(cpu.pc);
                bus.fab.set_float(0xFF);
                cpu.jammed = true;
            }
        }
        Ctl::Next
    }
}

fn branch_taken(cpu: &Cpu, mnemonic: Mnemonic) -> bool {
    use Mnemonic::*;
    let p = cpu.p;
    match mnemonic {
        BPL => !p.contains(Status::NEGATIVE),
        BMI => p.contains(Status::NEGATIVE),
        BVC => !p.contains(Status::OVERFLOW),
        BVS => p.contains(Status::OVERFLOW),
        BCC => !p.contains(Status::CARRY),
        BCS => p.contains(Status::CARRY),
        BNE => !p.contains(Status::ZERO),
        _ => p.contains(Status::ZERO),
    }
}

/// Read-class execution: consume the operand byte.
fn exec_read(cpu: &mut Cpu, mnemonic: Mnemonic, value: u8) {
    use Mnemonic::*;
    match mnemonic {
        LDA => {
            cpu.a = value;
            cpu.p.set_zn(cpu.a);
        }
        LDX => {
            cpu.x = value;
            cpu.p.set_zn(cpu.x);
        }
        LDY => {
            cpu.y = value;
            cpu.p.set_zn(cpu.y);
        }
        LAX => {
            cpu.a = value;
            cpu.x = value;
            cpu.p.set_zn(value);
        }
        LAS => {
            let result = cpu.s & value;
            cpu.a = result;
            cpu.x = result;
            cpu.s = result;
            cpu.p.set_zn(result);
        }
        ADC => cpu.adc(value),
        SBC => cpu.adc(value ^ 0xFF),
        AND => {
            cpu.a &= value;
            cpu.p.set_zn(cpu.a);
        }
        ORA => {
            cpu.a |= value;
            cpu.p.set_zn(cpu.a);
        }
        EOR => {
            cpu.a ^= value;
            cpu.p.set_zn(cpu.a);
        }
        CMP => cpu.compare(cpu.a, value),
        CPX => cpu.compare(cpu.x, value),
        CPY => cpu.compare(cpu.y, value),
        BIT => {
            cpu.p.set_zero(cpu.a & value);
            cpu.p.set(Status::NEGATIVE, value & 0x80 != 0);
            cpu.p.set(Status::OVERFLOW, value & 0x40 != 0);
        }
        ANC => {
            cpu.a &= value;
            cpu.p.set_zn(cpu.a);
            let negative = cpu.p.contains(Status::NEGATIVE);
            cpu.p.set(Status::CARRY, negative);
        }
        ASR => {
            let and = cpu.a & value;
            cpu.p.set(Status::CARRY, and & 0x01 != 0);
            cpu.a = and >> 1;
            cpu.p.set_zn(cpu.a);
        }
        ARR => {
            let and = cpu.a & value;
            let carry_in = u8::from(cpu.p.contains(Status::CARRY));
            cpu.a = (and >> 1) | (carry_in << 7);
            cpu.p.set_zn(cpu.a);
            let bit6 = cpu.a & 0x40 != 0;
            let bit5 = cpu.a & 0x20 != 0;
            cpu.p.set(Status::CARRY, bit6);
            cpu.p.set(Status::OVERFLOW, bit6 ^ bit5);
        }
        XAA => {
            cpu.a = (cpu.a | cpu.tuning.lxa_magic) & cpu.x & value;
            cpu.p.set_zn(cpu.a);
        }
        LXA => {
            let result = (cpu.a | cpu.tuning.lxa_magic) & value;
            cpu.a = result;
            cpu.x = result;
            cpu.p.set_zn(result);
        }
        SBX => {
            let and = cpu.a & cpu.x;
            cpu.p.set(Status::CARRY, and >= value);
            cpu.x = and.wrapping_sub(value);
            cpu.p.set_zn(cpu.x);
        }
        // NOP variants still perform the read.
        _ => {}
    }
}

/// RMW-class execution: transform the operand and return the result.
fn exec_rmw(cpu: &mut Cpu, mnemonic: Mnemonic, value: u8) -> u8 {
    use Mnemonic::*;
    match mnemonic {
        ASL => cpu.shift_left(value, false),
        ROL => {
            let carry = cpu.p.contains(Status::CARRY);
            cpu.shift_left(value, carry)
        }
        LSR => cpu.shift_right(value, false),
        ROR => {
            let carry = cpu.p.contains(Status::CARRY);
            cpu.shift_right(value, carry)
        }
        INC => {
            let result = value.wrapping_add(1);
            cpu.p.set_zn(result);
            result
        }
        DEC => {
            let result = value.wrapping_sub(1);
            cpu.p.set_zn(result);
            result
        }
        SLO => {
            let result = cpu.shift_left(value, false);
            cpu.a |= result;
            cpu.p.set_zn(cpu.a);
            result
        }
        RLA => {
            let carry = cpu.p.contains(Status::CARRY);
            let result = cpu.shift_left(value, carry);
            cpu.a &= result;
            cpu.p.set_zn(cpu.a);
            result
        }
        SRE => {
            let result = cpu.shift_right(value, false);
            cpu.a ^= result;
            cpu.p.set_zn(cpu.a);
            result
        }
        RRA => {
            let carry = cpu.p.contains(Status::CARRY);
            let result = cpu.shift_right(value, carry);
            cpu.adc(result);
            result
        }
        DCP => {
            let result = value.wrapping_sub(1);
            cpu.compare(cpu.a, result);
            result
        }
        _ => {
            // ISC.
            let result = value.wrapping_add(1);
            cpu.adc(result ^ 0xFF);
            result
        }
    }
}

/// Store-class value selection.
fn store_value(cpu: &Cpu, mnemonic: Mnemonic) -> u8 {
    use Mnemonic::*;
    match mnemonic {
        STA => cpu.a,
        STX => cpu.x,
        STY => cpu.y,
        _ => cpu.a & cpu.x, // SAX
    }
}

/// Unstable store value: register AND (high byte of the base address + 1).
fn store_high_value(cpu: &mut Cpu, mnemonic: Mnemonic) -> u8 {
    use Mnemonic::*;
    let high_plus_one = cpu.base_high.wrapping_add(1);
    match mnemonic {
        SHX => cpu.x & high_plus_one,
        SHY => cpu.y & high_plus_one,
        SHS => {
            cpu.s = cpu.a & cpu.x;
            cpu.s & high_plus_one
        }
        _ => cpu.a & cpu.x & high_plus_one, // SHA
    }
}

/// Implied single-cycle operations.
fn exec_implied(cpu: &mut Cpu, mnemonic: Mnemonic) {
    use Mnemonic::*;
    match mnemonic {
        CLC => cpu.p.remove(Status::CARRY),
        SEC => cpu.p.insert(Status::CARRY),
        CLI => cpu.p.remove(Status::INTERRUPT),
        SEI => cpu.p.insert(Status::INTERRUPT),
        CLD => cpu.p.remove(Status::DECIMAL),
        SED => cpu.p.insert(Status::DECIMAL),
        CLV => cpu.p.remove(Status::OVERFLOW),
        TAX => {
            cpu.x = cpu.a;
            cpu.p.set_zn(cpu.x);
        }
        TAY => {
            cpu.y = cpu.a;
            cpu.p.set_zn(cpu.y);
        }
        TXA => {
            cpu.a = cpu.x;
            cpu.p.set_zn(cpu.a);
        }
        TYA => {
            cpu.a = cpu.y;
            cpu.p.set_zn(cpu.a);
        }
        TSX => {
            cpu.x = cpu.s;
            cpu.p.set_zn(cpu.x);
        }
        TXS => cpu.s = cpu.x,
        INX => {
            cpu.x = cpu.x.wrapping_add(1);
            cpu.p.set_zn(cpu.x);
        }
        INY => {
            cpu.y = cpu.y.wrapping_add(1);
            cpu.p.set_zn(cpu.y);
        }
        DEX => {
            cpu.x = cpu.x.wrapping_sub(1);
            cpu.p.set_zn(cpu.x);
        }
        DEY => {
            cpu.y = cpu.y.wrapping_sub(1);
            cpu.p.set_zn(cpu.y);
        }
        _ => {} // NOP and implied-NOP unofficials
    }
}
