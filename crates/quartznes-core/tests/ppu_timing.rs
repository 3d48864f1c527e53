//! Frame timing, VBlank/NMI delivery, and sprite-0 behavior through the
//! scheduler.

mod common;

use common::{machine_with_image, machine_with_program, run_cpu_cycles, solid_tile_chr};

/// NTSC frame length in dots with rendering disabled or on even frames.
const FULL_FRAME_DOTS: u64 = 341 * 262;

#[test]
fn frames_are_89342_dots_with_rendering_disabled() {
    let mut machine = machine_with_program(&[0x4C, 0x00, 0x80]); // JMP self
    machine.run_to_vblank();
    let mut lengths = Vec::new();
    for _ in 0..4 {
        let start = machine.ppu().total_dots();
        machine.run_to_vblank();
        lengths.push(machine.ppu().total_dots() - start);
    }
    assert!(lengths.iter().all(|&len| len == FULL_FRAME_DOTS));
}

#[test]
fn odd_frames_drop_one_dot_while_rendering() {
    // Enable background rendering, then idle.
    let program = [
        0xA9, 0x0A, // LDA #$0A (bg on, left column on)
        0x8D, 0x01, 0x20, // STA $2001
        0x4C, 0x05, 0x80, // JMP self
    ];
    let mut machine = machine_with_program(&program);
    machine.run_to_vblank();
    machine.run_to_vblank();
    let mut lengths = Vec::new();
    for _ in 0..6 {
        let start = machine.ppu().total_dots();
        machine.run_to_vblank();
        lengths.push(machine.ppu().total_dots() - start);
    }
    let short = lengths.iter().filter(|&&len| len == FULL_FRAME_DOTS - 1).count();
    let full = lengths.iter().filter(|&&len| len == FULL_FRAME_DOTS).count();
    assert_eq!(short + full, lengths.len(), "unexpected length in {lengths:?}");
    assert_eq!(short, 3, "{lengths:?}");
    assert_eq!(full, 3, "{lengths:?}");
}

#[test]
fn vblank_flag_rises_at_scanline_241_dot_1() {
    let mut machine = machine_with_program(&[0x4C, 0x00, 0x80]);
    machine.run_to_vblank(); // hand-off happens at (240, 0)
    // The flag is not set yet at the hand-off point.
    assert_eq!(machine.cpu_peek(0x2002) & 0x80, 0x00);
    // One scanline later it must be set.
    machine.run_master(4 * 350);
    assert!(machine.ppu().scanline() >= 241);
    assert_eq!(machine.cpu_peek(0x2002) & 0x80, 0x80);
}

#[test]
fn vblank_flag_clears_on_the_prerender_line() {
    let mut machine = machine_with_program(&[0x4C, 0x00, 0x80]);
    machine.run_to_vblank();
    machine.run_master(4 * 350);
    assert_eq!(machine.cpu_peek(0x2002) & 0x80, 0x80);
    // Run across the prerender line; the flag must have dropped.
    while machine.ppu().scanline() != 0 {
        machine.run_master(4);
    }
    assert_eq!(machine.cpu_peek(0x2002) & 0x80, 0x00);
}

#[test]
fn nmi_fires_once_per_frame_when_enabled() {
    // NMI handler increments $0040. Main program enables NMI and idles.
    let mut handler_at_9000 = vec![0u8; 0x1100];
    let program = [
        0xA9, 0x80, // LDA #$80
        0x8D, 0x00, 0x20, // STA $2000 (NMI enable)
        0x4C, 0x05, 0x80, // JMP self
    ];
    handler_at_9000[..program.len()].copy_from_slice(&program);
    // Handler at $9000: INC $0040; RTI.
    let handler = [0xEE, 0x40, 0x00, 0x40];
    handler_at_9000[0x1000..0x1000 + handler.len()].copy_from_slice(&handler);

    let mut machine = machine_with_image(&handler_at_9000, &[], Some(&[(0xFFFA, 0x9000)]));
    machine.run_to_vblank();
    let before = machine.cpu_peek(0x0040);
    machine.run_to_vblank();
    machine.run_to_vblank();
    let after = machine.cpu_peek(0x0040);
    assert_eq!(u16::from(after), u16::from(before) + 2);
}

#[test]
fn sprite_zero_hit_sets_and_clears_with_the_frame() {
    // Solid tile 0 everywhere (nametables are zero-filled), sprite 0 at
    // (10, 20) over an opaque background, full rendering enabled.
    let program = [
        0xA9, 0x1E, // LDA #$1E (bg + sprites, no left masking)
        0x8D, 0x01, 0x20, // STA $2001
        0x4C, 0x05, 0x80, // JMP self
    ];
    let mut machine = machine_with_image(&program, &solid_tile_chr(), None);
    // Sprite 0: y=20 (appears from scanline 21), tile 0, attrs 0, x=10.
    machine.cpu_poke(0x2003, 0x00);
    for byte in [20u8, 0, 0, 10] {
        machine.cpu_poke(0x2004, byte);
    }

    machine.run_to_vblank();
    machine.run_to_vblank();
    // During VBlank of a rendered frame the hit flag is set.
    assert_eq!(machine.cpu_peek(0x2002) & 0x40, 0x40);

    // It drops at the prerender line and is set again by scanline 30.
    while machine.ppu().scanline() != 0 {
        machine.run_master(4);
    }
    assert_eq!(machine.cpu_peek(0x2002) & 0x40, 0x00);
    while machine.ppu().scanline() < 40 {
        machine.run_master(4);
    }
    assert_eq!(machine.cpu_peek(0x2002) & 0x40, 0x40);
}

#[test]
fn ppudata_reads_are_buffered() {
    let mut machine = machine_with_program(&[0x4C, 0x00, 0x80]);
    run_cpu_cycles(&mut machine, 10);
    // Write two bytes into the nametable at $2000.
    machine.cpu_poke(0x2006, 0x20);
    machine.cpu_poke(0x2006, 0x00);
    machine.cpu_poke(0x2007, 0xAB);
    machine.cpu_poke(0x2007, 0xCD);
    // Read back: the first read returns the stale internal buffer, the
    // following ones lag by one access.
    machine.cpu_poke(0x2006, 0x20);
    machine.cpu_poke(0x2006, 0x00);
    let first = machine.cpu_read(0x2007);
    let second = machine.cpu_read(0x2007);
    let third = machine.cpu_read(0x2007);
    assert_ne!(first, 0xAB);
    assert_eq!(second, 0xAB);
    assert_eq!(third, 0xCD);
}
