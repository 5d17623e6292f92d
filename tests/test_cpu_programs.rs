mod common;

use common::{gameboy_with, run_until_serial, serial_print, RomBuilder, SPIN};
use gameboy_core::Error;

/// `body` must leave Z set on success. Appends the Passed/Failed reporting and returns the image.
fn self_checking(body: &[u8]) -> RomBuilder {
    let passed = [serial_print(b"Passed"), SPIN.to_vec()].concat();
    let failed = [serial_print(b"Failed"), SPIN.to_vec()].concat();

    let mut program = body.to_vec();
    // JR NZ,failed
    program.extend_from_slice(&[0x20, passed.len() as u8]);
    program.extend_from_slice(&passed);
    program.extend_from_slice(&failed);
    RomBuilder::new().program(&program)
}

#[test]
fn test_counting_loop() {
    // sum 10 + 9 + ... + 1 into A, then CP 55
    let body = [
        0xaf, // XOR A
        0x06, 0x0a, // LD B,10
        0x80, // loop: ADD A,B
        0x05, // DEC B
        0x20, 0xfc, // JR NZ,loop
        0xfe, 55, // CP 55
    ];
    let mut gameboy = gameboy_with(self_checking(&body));
    run_until_serial(&mut gameboy, b"Passed", 5);
}

#[test]
fn test_call_and_stack() {
    let body = [
        0x31, 0xf0, 0xdf, // LD SP,0xdff0
        0x01, 0x34, 0x12, // LD BC,0x1234
        0xc5, // PUSH BC
        0xcd, 0x00, 0x02, // CALL 0x0200
        0xd1, // POP DE
        0x7a, // LD A,D
        0xfe, 0x12, // CP 0x12
    ];
    // 0x0200: RET
    let mut gameboy = gameboy_with(self_checking(&body).code_at(0x200, &[0xc9]));
    run_until_serial(&mut gameboy, b"Passed", 5);
    assert_eq!(0xdff0, gameboy.cpu().sp);
}

#[test]
fn test_bcd_arithmetic() {
    // 0x19 + 0x28 = 0x47 in BCD
    let body = [
        0x3e, 0x19, // LD A,0x19
        0xc6, 0x28, // ADD A,0x28
        0x27, // DAA
        0xfe, 0x47, // CP 0x47
    ];
    let mut gameboy = gameboy_with(self_checking(&body));
    run_until_serial(&mut gameboy, b"Passed", 5);
}

#[test]
fn test_failure_is_reported() {
    let body = [
        0x3e, 0x01, // LD A,1
        0xfe, 0x02, // CP 2
    ];
    let mut gameboy = gameboy_with(self_checking(&body));
    run_until_serial(&mut gameboy, b"Failed", 5);
}

#[test]
fn test_timer_interrupt_program() {
    let program = [
        0x3e, 0x04, // LD A,0x04
        0xe0, 0xff, // LDH (IE),A
        0xaf, // XOR A
        0xe0, 0x0f, // LDH (IF),A
        0xe0, 0x06, // LDH (TMA),A
        0xe0, 0x05, // LDH (TIMA),A
        0x3e, 0x04, // LD A,0x04    enabled, 4096 Hz
        0xe0, 0x07, // LDH (TAC),A
        0xfb, // EI
        0x76, // loop: HALT
        0x18, 0xfd, // JR loop
    ];
    let handler = [
        0x21, 0x00, 0xc0, // LD HL,0xc000
        0x34, // INC (HL)
        0xd9, // RETI
    ];
    let mut gameboy = gameboy_with(RomBuilder::new().program(&program).code_at(0x50, &handler));

    // 256 ticks of 1024 cycles between overflows
    for _ in 0..8 {
        gameboy.run_one_frame().unwrap();
    }
    let overflows = gameboy.memory_bus().read_byte(0xc000);
    assert!((1..=3).contains(&overflows), "{} overflows", overflows);
}

#[test]
fn test_halt_bug_program() {
    // IE and IF both have the timer bit with IME off: HALT doesn't halt and INC A runs twice
    let program = [
        0x3e, 0x04, // LD A,0x04
        0xe0, 0xff, // LDH (IE),A
        0xe0, 0x0f, // LDH (IF),A
        0xaf, // XOR A
        0x76, // HALT
        0x3c, // INC A
        0xea, 0x00, 0xc0, // LD (0xc000),A
    ];
    let mut gameboy = gameboy_with(RomBuilder::new().program(&[&program[..], &SPIN].concat()));
    gameboy.run_one_frame().unwrap();
    assert_eq!(2, gameboy.memory_bus().read_byte(0xc000));
}

#[test]
fn test_illegal_opcode_stops_frame() {
    let mut gameboy = gameboy_with(RomBuilder::new().program(&[0x00, 0x00, 0xed]));
    assert!(matches!(
        gameboy.run_one_frame(),
        Err(Error::IllegalOpcode { opcode: 0xed, pc: 0x102 })
    ));
    assert!(matches!(gameboy.tick(), Err(Error::Halted(_))));
}
