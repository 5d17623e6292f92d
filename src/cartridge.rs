/*!
 * Cartridges and their memory bank controllers. The controller set is closed, so each kind of
 * controller is a variant of `Mbc` and dispatch happens by matching on it.
 */

pub mod mbc1;
pub mod mbc3;

use std::fmt::Display;

use log::*;

use crate::component::{check_state_len, Address, SaveState, StateReader};
use crate::error::{Error, Result};

use self::{mbc1::Mbc1, mbc3::Mbc3};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
/// Largest external RAM any supported controller can address (4 banks).
pub const MAX_RAM_SIZE: usize = 4 * RAM_BANK_SIZE;
/// Bytes of controller registers in a save state, shared by every controller kind.
pub const REGISTER_LEN: usize = 11;

const HEADER_END: usize = 0x150;

/// Offset into a banked ROM image. Bank numbers past the end of the image wrap around, the way
/// unconnected upper bank lines behave on real carts.
pub(crate) fn rom_offset(rom: &[u8], bank: usize, address: Address) -> usize {
    let banks = (rom.len() / ROM_BANK_SIZE).max(1);
    (bank % banks) * ROM_BANK_SIZE + (usize::from(address) & 0x3fff)
}

/// Offset into external RAM, wrapping within the RAM that is actually present.
pub(crate) fn ram_offset(ram: &[u8], bank: usize, address: Address) -> usize {
    (bank * RAM_BANK_SIZE + (usize::from(address) & 0x1fff)) % ram.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    RomOnly,
    Mbc1,
    Mbc3,
}

impl MbcType {
    fn tag(self) -> u8 {
        match self {
            MbcType::RomOnly => 0,
            MbcType::Mbc1 => 1,
            MbcType::Mbc3 => 3,
        }
    }
}

/// A cartridge with no banking: 32KB of ROM mapped directly and 8KB of RAM at 0xa000.
#[derive(Debug, Clone)]
pub struct NoMbc {
    rom: Vec<u8>,
    ram: Vec<u8>,
}

impl NoMbc {
    pub fn new(rom: Vec<u8>) -> Self {
        Self {
            rom,
            ram: vec![0; RAM_BANK_SIZE],
        }
    }

    fn read(&self, address: Address) -> u8 {
        match address {
            0x0000..=0x7fff => self.rom.get(usize::from(address)).copied().unwrap_or(0xff),
            0xa000..=0xbfff => self.ram[usize::from(address - 0xa000)],
            _ => 0xff,
        }
    }

    fn write(&mut self, address: Address, value: u8) {
        // ROM writes have no effect without a controller
        if let 0xa000..=0xbfff = address {
            self.ram[usize::from(address - 0xa000)] = value;
        }
    }
}

#[derive(Debug, Clone)]
pub enum Mbc {
    None(NoMbc),
    Type1(Mbc1),
    Type3(Mbc3),
}

impl Mbc {
    pub fn read_byte(&self, address: Address) -> u8 {
        match self {
            Mbc::None(mbc) => mbc.read(address),
            Mbc::Type1(mbc) => mbc.read(address),
            Mbc::Type3(mbc) => mbc.read(address),
        }
    }

    pub fn write_byte(&mut self, address: Address, data: u8) {
        match self {
            Mbc::None(mbc) => mbc.write(address, data),
            Mbc::Type1(mbc) => mbc.write(address, data),
            Mbc::Type3(mbc) => mbc.write(address, data),
        }
    }

    pub fn get_type(&self) -> MbcType {
        match self {
            Mbc::None(_) => MbcType::RomOnly,
            Mbc::Type1(_) => MbcType::Mbc1,
            Mbc::Type3(_) => MbcType::Mbc3,
        }
    }

    fn ram(&self) -> &[u8] {
        match self {
            Mbc::None(mbc) => &mbc.ram,
            Mbc::Type1(mbc) => mbc.ram(),
            Mbc::Type3(mbc) => mbc.ram(),
        }
    }

    fn ram_mut(&mut self) -> &mut [u8] {
        match self {
            Mbc::None(mbc) => &mut mbc.ram,
            Mbc::Type1(mbc) => mbc.ram_mut(),
            Mbc::Type3(mbc) => mbc.ram_mut(),
        }
    }

    fn save_registers(&self) -> [u8; REGISTER_LEN] {
        match self {
            Mbc::None(_) => [0; REGISTER_LEN],
            Mbc::Type1(mbc) => mbc.save_registers(),
            Mbc::Type3(mbc) => mbc.save_registers(),
        }
    }

    fn load_registers(&mut self, registers: &[u8]) {
        match self {
            Mbc::None(_) => (),
            Mbc::Type1(mbc) => mbc.load_registers(registers),
            Mbc::Type3(mbc) => mbc.load_registers(registers),
        }
    }
}

/// Layout: controller tag, controller registers, then external RAM padded to `MAX_RAM_SIZE`.
/// ROM is never part of the state; it is reloaded from the cartridge file.
impl SaveState for Mbc {
    const STATE_LEN: usize = 1 + REGISTER_LEN + MAX_RAM_SIZE;

    fn save_state(&self, out: &mut Vec<u8>) {
        out.push(self.get_type().tag());
        out.extend_from_slice(&self.save_registers());
        let ram = self.ram();
        out.extend_from_slice(ram);
        out.resize(out.len() + (MAX_RAM_SIZE - ram.len()), 0);
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        check_state_len(data, Self::STATE_LEN)?;
        let mut reader = StateReader::new(data);

        let tag = reader.u8();
        if tag != self.get_type().tag() {
            return Err(Error::SaveStateMismatch(format!(
                "state was saved with controller tag {} but the cartridge uses {:?}",
                tag,
                self.get_type()
            )));
        }
        let registers = reader.bytes(REGISTER_LEN);
        self.load_registers(registers);

        let ram = reader.bytes(MAX_RAM_SIZE);
        let own_ram = self.ram_mut();
        let len = own_ram.len();
        own_ram.copy_from_slice(&ram[..len]);
        Ok(())
    }
}

/// Examines the header to get the size of the rom declared by the cartridge. Unknown codes fall
/// back to the size of the image itself.
fn get_rom_size(data: &[u8]) -> usize {
    match data[0x148] {
        code @ 0..=8 => 32 * 1024 * (1 << code),
        code => {
            warn!("unknown rom size code {:#04x}, using image size", code);
            data.len()
        }
    }
}

/// Examines the header to get the size of the external ram on the cartridge.
fn get_ram_size(data: &[u8]) -> Result<usize> {
    match data[0x149] {
        0 => Ok(0),
        1 => Ok(2 * 1024),
        2 => Ok(8 * 1024),
        3 => Ok(32 * 1024),
        code => Err(Error::UnsupportedRamSize { code }),
    }
}

/// Reads bytes 0x134 ..= 0x143 into a string
fn get_title(data: &[u8]) -> String {
    let title: Vec<u8> = data[0x134..=0x143]
        .iter()
        .copied()
        .take_while(|byte| *byte != 0)
        .collect();
    String::from_utf8(title).unwrap_or_else(|_| "Unknown".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    pub title: String,
    pub type_byte: u8,
    pub mbc_type: MbcType,
    pub has_ram: bool,
    pub has_battery: bool,
    pub has_timer: bool,
    pub rom_size: usize,
    pub ram_size: usize,
    /// Whether the cartridge asks for color mode (header byte 0x143, bit 7).
    pub cgb: bool,
}

impl CartridgeHeader {
    pub fn from_data(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_END {
            return Err(Error::RomTooSmall { len: data.len() });
        }

        let type_byte = data[0x147];
        debug!("cartridge type byte: {:#x}", type_byte);
        let (mbc_type, has_ram, has_battery, has_timer) = match type_byte {
            0x00 => (MbcType::RomOnly, false, false, false),
            0x01 => (MbcType::Mbc1, false, false, false),
            0x02 => (MbcType::Mbc1, true, false, false),
            0x03 => (MbcType::Mbc1, true, true, false),
            0x0f => (MbcType::Mbc3, false, true, true),
            0x10 => (MbcType::Mbc3, true, true, true),
            0x11 => (MbcType::Mbc3, false, false, false),
            0x12 => (MbcType::Mbc3, true, false, false),
            0x13 => (MbcType::Mbc3, true, true, false),
            mbc_type => {
                error!("cartridge type {:#x} is not supported", mbc_type);
                return Err(Error::UnsupportedCartridge { mbc_type });
            }
        };

        Ok(CartridgeHeader {
            title: get_title(data),
            type_byte,
            mbc_type,
            has_ram,
            has_battery,
            has_timer,
            rom_size: get_rom_size(data),
            ram_size: get_ram_size(data)?,
            cgb: data[0x143] & 0x80 != 0,
        })
    }
}

#[derive(Clone)]
pub struct Cartridge {
    header: CartridgeHeader,
    mbc: Mbc,
}

impl Cartridge {
    pub fn from_data(data: &[u8]) -> Result<Cartridge> {
        let header = CartridgeHeader::from_data(data)?;
        info!(
            "cartridge \"{}\": {:?}, rom {:#x} bytes, ram {:#x} bytes{}",
            header.title,
            header.mbc_type,
            header.rom_size,
            header.ram_size,
            if header.cgb { ", color" } else { "" }
        );

        let mut rom = data.to_vec();
        let rom_len = rom.len().max(header.rom_size).max(2 * ROM_BANK_SIZE);
        rom.resize(rom_len, 0);
        let ram = vec![0; header.ram_size];

        if header.has_battery {
            warn!("cartridge has a battery; ram is only persisted through save states");
        }
        if header.has_timer {
            warn!("cartridge has a real time clock which is only partially supported");
        }

        let mbc = match header.mbc_type {
            MbcType::RomOnly => Mbc::None(NoMbc::new(rom)),
            MbcType::Mbc1 => Mbc::Type1(Mbc1::new(rom, ram)),
            MbcType::Mbc3 => Mbc::Type3(Mbc3::new(rom, ram)),
        };

        Ok(Cartridge { header, mbc })
    }

    pub fn read(&self, address: Address) -> u8 {
        self.mbc.read_byte(address)
    }

    pub fn write(&mut self, address: Address, value: u8) {
        self.mbc.write_byte(address, value)
    }

    pub fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    pub fn is_cgb(&self) -> bool {
        self.header.cgb
    }

    pub fn mbc(&self) -> &Mbc {
        &self.mbc
    }

    pub fn mbc_mut(&mut self) -> &mut Mbc {
        &mut self.mbc
    }
}

impl std::fmt::Debug for Cartridge {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(fmt, "{:?} \"{}\"", self.mbc.get_type(), self.header.title)
    }
}

impl Display for Cartridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "title: {}", self.header.title)?;
        writeln!(f, "controller: {:?}", self.header.mbc_type)?;
        writeln!(f, "rom size: {}", self.header.rom_size)?;
        writeln!(f, "ram size: {}", self.header.ram_size)
    }
}
