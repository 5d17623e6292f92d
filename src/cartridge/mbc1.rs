use log::debug;

use crate::bit_field::BitField;
use crate::component::Address;

use super::{ram_offset, rom_offset, REGISTER_LEN};

/// What the 2-bit register at 0x4000 ..= 0x5fff drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankingMode {
    /// Upper two bits of the ROM bank number. External RAM is fixed to bank 0.
    Rom,
    /// External RAM bank number.
    Ram,
}

#[derive(Debug, Clone)]
pub struct Mbc1 {
    rom: Vec<u8>,
    ram: Vec<u8>,
    ram_enabled: bool,
    /// Bits 0-4 come from writes to 0x2000 ..= 0x3fff, bits 5-6 from 0x4000 ..= 0x5fff in ROM
    /// banking mode.
    rom_bank: BitField<u8>,
    ram_bank: u8,
    mode: BankingMode,
}

impl Mbc1 {
    pub fn new(rom: Vec<u8>, ram: Vec<u8>) -> Self {
        Self {
            rom,
            ram,
            ram_enabled: false,
            rom_bank: BitField::from(1),
            ram_bank: 0,
            mode: BankingMode::Rom,
        }
    }

    /// Bank currently mapped at 0x4000 ..= 0x7fff, before wrapping to the ROM size.
    pub fn rom_bank(&self) -> usize {
        self.rom_bank.as_value().into()
    }

    /// Bank currently mapped at 0xa000 ..= 0xbfff.
    pub fn ram_bank(&self) -> usize {
        match self.mode {
            BankingMode::Rom => 0,
            BankingMode::Ram => self.ram_bank.into(),
        }
    }

    pub fn mode(&self) -> BankingMode {
        self.mode
    }

    pub(super) fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub(super) fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub(super) fn read(&self, address: Address) -> u8 {
        match address {
            0x0000..=0x3fff => self.rom[usize::from(address)],
            0x4000..=0x7fff => self.rom[rom_offset(&self.rom, self.rom_bank(), address)],
            0xa000..=0xbfff => {
                if !self.ram_enabled || self.ram.is_empty() {
                    return 0xff;
                }
                self.ram[ram_offset(&self.ram, self.ram_bank(), address)]
            }
            _ => 0xff,
        }
    }

    pub(super) fn write(&mut self, address: Address, value: u8) {
        match address {
            0x0000..=0x1fff => self.ram_enabled = value & 0xf == 0xa,
            0x2000..=0x3fff => {
                // Bank 0 can't be selected through the low bits
                let low = match value & 0x1f {
                    0 => 1,
                    low => low,
                };
                self.rom_bank.set_range_value(0..=4, low);
                debug!("switched to rom bank {}", self.rom_bank());
            }
            0x4000..=0x5fff => match self.mode {
                BankingMode::Rom => self.rom_bank.set_range_value(5..=6, value & 0x3),
                BankingMode::Ram => self.ram_bank = value & 0x3,
            },
            0x6000..=0x7fff => {
                self.mode = if value & 1 == 0 {
                    BankingMode::Rom
                } else {
                    BankingMode::Ram
                };
            }
            0xa000..=0xbfff => {
                if self.ram_enabled && !self.ram.is_empty() {
                    let offset = ram_offset(&self.ram, self.ram_bank(), address);
                    self.ram[offset] = value;
                }
            }
            _ => (),
        }
    }

    pub(super) fn save_registers(&self) -> [u8; REGISTER_LEN] {
        let mut registers = [0; REGISTER_LEN];
        registers[0] = self.ram_enabled.into();
        registers[1] = self.rom_bank.as_value();
        registers[2] = self.ram_bank;
        registers[3] = (self.mode == BankingMode::Ram).into();
        registers
    }

    pub(super) fn load_registers(&mut self, registers: &[u8]) {
        self.ram_enabled = registers[0] != 0;
        self.rom_bank = BitField::from(registers[1] & 0x7f);
        self.ram_bank = registers[2] & 0x3;
        self.mode = if registers[3] == 0 {
            BankingMode::Rom
        } else {
            BankingMode::Ram
        };
    }
}
