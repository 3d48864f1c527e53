//! Board behavior through a running machine: bank switching seen by the
//! CPU, and the MMC3 scanline counter clocked by real rendering fetches.

mod common;

use common::run_cpu_cycles;
use quartznes_core::{load_cartridge, Machine, PixelFormat, Region};

/// Builds a UxROM (mapper 2) image whose banks are tagged with their own
/// index at a known offset.
fn uxrom_machine(program: &[u8]) -> Machine {
    let banks = 8usize;
    let mut image = vec![
        b'N', b'E', b'S', 0x1A, banks as u8, 0, 0x21, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ];
    let mut prg = vec![0u8; banks * 0x4000];
    for bank in 0..banks {
        prg[bank * 0x4000] = bank as u8; // tag at $8000 of each bank
    }
    // Program and vectors live in the fixed last bank ($C000-$FFFF).
    let fixed = (banks - 1) * 0x4000;
    prg[fixed..fixed + program.len()].copy_from_slice(program);
    prg[banks * 0x4000 - 4] = 0x00; // reset -> $C000
    prg[banks * 0x4000 - 3] = 0xC0;
    image.extend(prg);
    let cart = load_cartridge(&image).expect("uxrom image");
    Machine::with_cartridge(cart, Some(Region::Ntsc), PixelFormat::Indexed)
}

#[test]
fn uxrom_bank_select_moves_the_switchable_window() {
    // Select bank 5, copy the tag at $8000 into $0040, loop.
    let program = [
        0xA9, 0x05, // LDA #$05
        0x8D, 0x00, 0xC0, // STA $C000 (bank select, fixed-bank address)
        0xAD, 0x00, 0x80, // LDA $8000
        0x85, 0x40, // STA $40
        0x4C, 0x0A, 0xC0, // JMP self
    ];
    let mut machine = uxrom_machine(&program);
    run_cpu_cycles(&mut machine, 60);
    assert_eq!(machine.cpu_peek(0x0040), 5);
}

/// MMC3 image: 32 KiB PRG, 8 KiB CHR, program in the fixed upper bank.
fn mmc3_machine(program: &[u8], irq_handler: &[u8]) -> Machine {
    let mut image = vec![
        b'N', b'E', b'S', 0x1A, 2, 1, 0x40, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ];
    let mut prg = vec![0u8; 0x8000];
    // Program at $8000 (bank 0 is mapped there at power-on).
    prg[..program.len()].copy_from_slice(program);
    // IRQ handler at $E000 (fixed last bank).
    prg[0x6000..0x6000 + irq_handler.len()].copy_from_slice(irq_handler);
    prg[0x7FFC] = 0x00; // reset -> $8000
    prg[0x7FFD] = 0x80;
    prg[0x7FFE] = 0x00; // IRQ -> $E000
    prg[0x7FFF] = 0xE0;
    image.extend(prg);
    // Opaque tile 0 in the $1000 pattern table so background fetches pull
    // A12 high every tile.
    let mut chr = vec![0u8; 0x2000];
    for row in 0..8 {
        chr[0x1000 + row] = 0xFF;
    }
    image.extend(chr);
    let cart = load_cartridge(&image).expect("mmc3 image");
    Machine::with_cartridge(cart, Some(Region::Ntsc), PixelFormat::Indexed)
}

#[test]
fn mmc3_scanline_irq_fires_during_rendering() {
    let program = [
        0xA9, 0x10, // LDA #$10 (background table at $1000)
        0x8D, 0x00, 0x20, // STA $2000
        0xA9, 0x0A, // LDA #$0A (background on, left column on)
        0x8D, 0x01, 0x20, // STA $2001
        0xA9, 0x30, // LDA #$30 (IRQ latch: 48 scanlines)
        0x8D, 0x00, 0xC0, // STA $C000
        0x8D, 0x01, 0xC0, // STA $C001 (reload)
        0x8D, 0x01, 0xE0, // STA $E001 (enable)
        0x58, // CLI
        0x4C, 0x16, 0x80, // JMP self
    ];
    let handler = [
        0xEE, 0x70, 0x00, // INC $0070
        0x8D, 0x00, 0xE0, // STA $E000 (acknowledge + disable)
        0x8D, 0x01, 0xE0, // STA $E001 (re-enable)
        0x40, // RTI
    ];
    let mut machine = mmc3_machine(&program, &handler);
    // Two full frames of rendering.
    machine.run_to_vblank();
    machine.run_to_vblank();
    machine.run_to_vblank();
    let count = machine.cpu_peek(0x0070);
    assert!(count >= 2, "scanline IRQs seen: {count}");
}

#[test]
fn mmc3_counter_stays_idle_without_rendering() {
    let program = [
        0xA9, 0x30, // LDA #$30
        0x8D, 0x00, 0xC0, // STA $C000
        0x8D, 0x01, 0xC0, // STA $C001
        0x8D, 0x01, 0xE0, // STA $E001
        0x58, // CLI
        0x4C, 0x0C, 0x80, // JMP self
    ];
    let handler = [0xEE, 0x70, 0x00, 0x40];
    let mut machine = mmc3_machine(&program, &handler);
    machine.run_to_vblank();
    machine.run_to_vblank();
    assert_eq!(machine.cpu_peek(0x0070), 0);
}
