//! CPU-bus level behavior through a whole machine: RAM mirrors, open bus,
//! controller serial reads, and PRG-RAM.

mod common;

use common::{machine_with_program, run_cpu_cycles};
use quartznes_core::controller::Button;

#[test]
fn ram_mirrors_every_two_kib() {
    // Write $42 to $0001 and read it back through the $0801 mirror.
    let mut machine = machine_with_program(&[]);
    machine.cpu_poke(0x0001, 0x42);
    assert_eq!(machine.cpu_peek(0x0801), 0x42);
    assert_eq!(machine.cpu_peek(0x1001), 0x42);
    assert_eq!(machine.cpu_peek(0x1801), 0x42);
}

#[test]
fn open_bus_returns_the_last_driven_byte() {
    // LDA $0010 (drives $5A onto the bus), then LDA $4018 (undriven).
    let program = [
        0xAD, 0x10, 0x00, // LDA $0010
        0xAD, 0x18, 0x40, // LDA $4018 (open bus)
        0x85, 0x20, // STA $20
        0x4C, 0x08, 0x80, // JMP self
    ];
    let mut machine = machine_with_program(&program);
    machine.load_ram(&[0x5A], 0x0010);
    run_cpu_cycles(&mut machine, 40);
    assert_eq!(machine.cpu_peek(0x0020), 0x5A);
}

#[test]
fn controller_shift_register_reads_buttons_serially() {
    // Strobe, then shift out eight bits into $10-$17.
    let mut program = vec![
        0xA9, 0x01, // LDA #$01
        0x8D, 0x16, 0x40, // STA $4016
        0xA9, 0x00, // LDA #$00
        0x8D, 0x16, 0x40, // STA $4016
    ];
    for i in 0..8u8 {
        program.extend_from_slice(&[
            0xAD, 0x16, 0x40, // LDA $4016
            0x29, 0x01, // AND #$01
            0x85, 0x10 + i, // STA $10+i
        ]);
    }
    program.extend_from_slice(&[0x4C, 0x00, 0x80]);

    let mut machine = machine_with_program(&program);
    machine.controllers_mut().set_button(0, Button::A, true);
    machine.controllers_mut().set_button(0, Button::Start, true);
    machine.controllers_mut().set_button(0, Button::Right, true);
    run_cpu_cycles(&mut machine, 400);

    let bits: Vec<u8> = (0..8u16).map(|i| machine.cpu_peek(0x10 + i)).collect();
    assert_eq!(bits, vec![1, 0, 0, 1, 0, 0, 0, 1]);
}

#[test]
fn prg_ram_round_trips_through_the_cartridge_window() {
    let program = [
        0xA9, 0x7B, // LDA #$7B
        0x8D, 0x00, 0x60, // STA $6000
        0xAD, 0x00, 0x60, // LDA $6000
        0x85, 0x30, // STA $30
        0x4C, 0x0A, 0x80, // JMP self
    ];
    let mut machine = machine_with_program(&program);
    run_cpu_cycles(&mut machine, 60);
    assert_eq!(machine.cpu_peek(0x0030), 0x7B);
    assert_eq!(machine.cpu_peek(0x6000), 0x7B);
}

#[test]
fn reset_vector_starts_execution_at_8000() {
    // INC $0040 as the first instruction proves the vector was followed.
    let program = [0xEE, 0x40, 0x00, 0x4C, 0x03, 0x80];
    let mut machine = machine_with_program(&program);
    run_cpu_cycles(&mut machine, 30);
    assert_eq!(machine.cpu_peek(0x0040), 1);
}

#[test]
fn ram_round_trips_arbitrary_bytes() {
    use rand::Rng;
    let mut rng = rand::rng();
    let mut machine = machine_with_program(&[]);
    for _ in 0..512 {
        let addr: u16 = rng.random_range(0x0000..0x2000);
        let value: u8 = rng.random();
        machine.cpu_poke(addr, value);
        assert_eq!(machine.cpu_peek(addr), value, "addr {addr:#06X}");
    }
}
