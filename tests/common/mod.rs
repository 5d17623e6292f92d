#![allow(dead_code)]

use gameboy_core::cartridge::Cartridge;
use gameboy_core::{EmulatorConfig, GameBoy};

pub const ENTRY_POINT: usize = 0x100;

/// Builds cartridge images with a valid header and code at chosen addresses.
pub struct RomBuilder {
    rom: Vec<u8>,
}

impl Default for RomBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RomBuilder {
    pub fn new() -> Self {
        let mut rom = vec![0; 0x8000];
        rom[0x134..0x138].copy_from_slice(b"TEST");
        Self { rom }
    }

    pub fn cartridge_type(mut self, type_byte: u8) -> Self {
        self.rom[0x147] = type_byte;
        self
    }

    /// Resizes the image to `0x8000 << code` bytes.
    pub fn rom_size(mut self, code: u8) -> Self {
        self.rom.resize(0x8000 << code, 0);
        self.rom[0x148] = code;
        self
    }

    pub fn ram_size(mut self, code: u8) -> Self {
        self.rom[0x149] = code;
        self
    }

    pub fn cgb(mut self) -> Self {
        self.rom[0x143] = 0x80;
        self
    }

    pub fn program(self, code: &[u8]) -> Self {
        self.code_at(ENTRY_POINT, code)
    }

    pub fn code_at(mut self, address: usize, code: &[u8]) -> Self {
        self.rom[address..address + code.len()].copy_from_slice(code);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.rom
    }

    pub fn cartridge(self) -> Cartridge {
        Cartridge::from_data(&self.rom).expect("failed to build cartridge")
    }
}

pub fn gameboy_with(builder: RomBuilder) -> GameBoy {
    let mut gameboy = GameBoy::new(EmulatorConfig::default());
    gameboy.load_cartridge(builder.cartridge(), "test.gb");
    gameboy
}

/// Code that sends `message` over the serial port one byte at a time.
pub fn serial_print(message: &[u8]) -> Vec<u8> {
    let mut code = Vec::new();
    for byte in message {
        // LD A,byte; LDH (SB),A; LD A,0x81; LDH (SC),A
        code.extend_from_slice(&[0x3e, *byte, 0xe0, 0x01, 0x3e, 0x81, 0xe0, 0x02]);
    }
    code
}

/// JR -2: spin forever.
pub const SPIN: [u8; 2] = [0x18, 0xfe];

/// Runs frames until the serial output ends with `target_serial_data`, the way test ROMs report.
pub fn run_until_serial(gameboy: &mut GameBoy, target_serial_data: &[u8], max_frames: u32) {
    let mut serial_port_output = Vec::new();
    for _ in 0..max_frames {
        gameboy.run_one_frame().expect("emulation failed");
        serial_port_output.extend(gameboy.take_serial_data());
        if serial_port_output.ends_with(target_serial_data) {
            return;
        }
    }
    panic!(
        "expected serial output ending with {:?}, got {:?}",
        String::from_utf8_lossy(target_serial_data),
        String::from_utf8_lossy(&serial_port_output)
    );
}
