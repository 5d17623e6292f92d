/*!
 * The memory bus owns every RAM region of the console along with the inserted cartridge.
 * The CPU, PPU and timer borrow it for each step, and all cross-component signalling
 * (interrupt requests, LY, STAT) goes through the I/O registers it holds.
 */

use log::{debug, trace};

use crate::cartridge::{Cartridge, Mbc};
use crate::component::{check_state_len, Address, SaveState, StateReader};
use crate::error::{Error, Result};
use crate::interrupt::Interrupt;

pub const VRAM_BANK_SIZE: usize = 0x2000;
pub const WRAM_BANK_SIZE: usize = 0x1000;
pub const OAM_SIZE: usize = 0xa0;
pub const PALETTE_RAM_SIZE: usize = 0x40;
const IO_SIZE: usize = 0x80;
const HRAM_SIZE: usize = 0x7f;

pub const JOYP: Address = 0xff00;
pub const SB: Address = 0xff01;
pub const SC: Address = 0xff02;
pub const DIV: Address = 0xff04;
pub const TIMA: Address = 0xff05;
pub const TMA: Address = 0xff06;
pub const TAC: Address = 0xff07;
pub const IF: Address = 0xff0f;
pub const LCDC: Address = 0xff40;
pub const STAT: Address = 0xff41;
pub const SCY: Address = 0xff42;
pub const SCX: Address = 0xff43;
pub const LY: Address = 0xff44;
pub const LYC: Address = 0xff45;
pub const DMA: Address = 0xff46;
pub const BGP: Address = 0xff47;
pub const OBP0: Address = 0xff48;
pub const OBP1: Address = 0xff49;
pub const WY: Address = 0xff4a;
pub const WX: Address = 0xff4b;
pub const VBK: Address = 0xff4f;
pub const HDMA1: Address = 0xff51;
pub const HDMA2: Address = 0xff52;
pub const HDMA3: Address = 0xff53;
pub const HDMA4: Address = 0xff54;
pub const HDMA5: Address = 0xff55;
pub const BCPS: Address = 0xff68;
pub const BCPD: Address = 0xff69;
pub const OCPS: Address = 0xff6a;
pub const OCPD: Address = 0xff6b;
pub const SVBK: Address = 0xff70;
pub const IE: Address = 0xffff;

const HDMA_BLOCK_LEN: u16 = 0x10;

fn io_index(address: Address) -> usize {
    usize::from(address & 0x7f)
}

/// Progress of a color-mode VRAM transfer started through HDMA5.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Hdma {
    source: u16,
    destination: u16,
    /// 16-byte blocks left to copy.
    remaining: u8,
    /// Set while an H-Blank transfer is waiting for more H-Blank periods.
    hblank_active: bool,
}

impl Hdma {
    /// Most blocks a single transfer can queue.
    const MAX_BLOCKS: u8 = 0x80;

    fn from_state(data: &[u8]) -> Result<Self> {
        let mut reader = StateReader::new(data);
        let hdma = Hdma {
            source: reader.u16(),
            destination: reader.u16(),
            remaining: reader.u8().min(Self::MAX_BLOCKS),
            hblank_active: reader.bool(),
        };
        if hdma.hblank_active && hdma.remaining == 0 {
            return Err(Error::SaveStateMismatch(
                "h-blank dma armed with no blocks left".to_string(),
            ));
        }
        Ok(hdma)
    }
}

pub struct MemoryBus {
    cartridge: Option<Cartridge>,
    vram: Vec<u8>,
    vram_bank: u8,
    wram: Vec<u8>,
    wram_bank: u8,
    oam: [u8; OAM_SIZE],
    io: [u8; IO_SIZE],
    hram: [u8; HRAM_SIZE],
    interrupt_enable: u8,
    bg_palette_ram: [u8; PALETTE_RAM_SIZE],
    obj_palette_ram: [u8; PALETTE_RAM_SIZE],
    hdma: Hdma,
    /// Active-low key state: bits 0-3 Right, Left, Up, Down and bits 4-7 A, B, Select, Start.
    joypad_state: u8,
    cgb: bool,
    serial_port_data: Vec<u8>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            cartridge: None,
            vram: vec![0; 2 * VRAM_BANK_SIZE],
            vram_bank: 0,
            wram: vec![0; 8 * WRAM_BANK_SIZE],
            wram_bank: 1,
            oam: [0; OAM_SIZE],
            io: [0; IO_SIZE],
            hram: [0; HRAM_SIZE],
            interrupt_enable: 0,
            bg_palette_ram: [0; PALETTE_RAM_SIZE],
            obj_palette_ram: [0; PALETTE_RAM_SIZE],
            hdma: Hdma::default(),
            joypad_state: 0xff,
            cgb: false,
            serial_port_data: Vec::new(),
        }
    }

    /// A bus with `cartridge` inserted and the I/O registers set to the values the boot ROM
    /// leaves behind.
    pub fn with_cartridge(cartridge: Cartridge) -> Self {
        let mut bus = Self::new();
        bus.insert_cartridge(cartridge);
        bus.apply_post_boot_state();
        bus
    }

    fn apply_post_boot_state(&mut self) {
        let registers = [
            (JOYP, 0xcf),
            (DIV, 0xab),
            (TAC, 0xf8),
            (IF, 0xe1),
            (LCDC, 0x91),
            // OAM scan, LY == LYC
            (STAT, 0x06),
            (BGP, 0xfc),
            (OBP0, 0xff),
            (OBP1, 0xff),
        ];
        for (address, value) in registers {
            self.io[io_index(address)] = value;
        }
    }

    pub fn insert_cartridge(&mut self, cartridge: Cartridge) {
        self.cgb = cartridge.is_cgb();
        self.cartridge = Some(cartridge);
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn read_byte(&self, address: Address) -> u8 {
        match address {
            0x0000..=0x7fff | 0xa000..=0xbfff => match &self.cartridge {
                Some(cartridge) => cartridge.read(address),
                None => 0xff,
            },
            0x8000..=0x9fff => self.vram[self.vram_offset(address)],
            0xc000..=0xdfff => self.wram[self.wram_offset(address)],
            // echo of 0xc000 ..= 0xddff
            0xe000..=0xfdff => self.wram[self.wram_offset(address - 0x2000)],
            0xfe00..=0xfe9f => self.oam[usize::from(address - 0xfe00)],
            0xfea0..=0xfeff => 0xff,
            0xff00..=0xff7f => self.read_io(address),
            0xff80..=0xfffe => self.hram[usize::from(address - 0xff80)],
            0xffff => self.interrupt_enable,
        }
    }

    pub fn write_byte(&mut self, address: Address, value: u8) {
        match address {
            0x0000..=0x7fff | 0xa000..=0xbfff => {
                if let Some(cartridge) = &mut self.cartridge {
                    cartridge.write(address, value);
                }
            }
            0x8000..=0x9fff => {
                let offset = self.vram_offset(address);
                self.vram[offset] = value;
            }
            0xc000..=0xdfff => {
                let offset = self.wram_offset(address);
                self.wram[offset] = value;
            }
            0xe000..=0xfdff => {
                let offset = self.wram_offset(address - 0x2000);
                self.wram[offset] = value;
            }
            0xfe00..=0xfe9f => self.oam[usize::from(address - 0xfe00)] = value,
            0xfea0..=0xfeff => (),
            0xff00..=0xff7f => self.write_io(address, value),
            0xff80..=0xfffe => self.hram[usize::from(address - 0xff80)] = value,
            0xffff => self.interrupt_enable = value,
        }
    }

    pub fn read_word(&self, address: Address) -> u16 {
        u16::from_le_bytes([
            self.read_byte(address),
            self.read_byte(address.wrapping_add(1)),
        ])
    }

    pub fn write_word(&mut self, address: Address, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write_byte(address, low);
        self.write_byte(address.wrapping_add(1), high);
    }

    fn vram_offset(&self, address: Address) -> usize {
        usize::from(self.vram_bank) * VRAM_BANK_SIZE + usize::from(address - 0x8000)
    }

    fn wram_offset(&self, address: Address) -> usize {
        match address {
            0xc000..=0xcfff => usize::from(address - 0xc000),
            _ => usize::from(self.wram_bank) * WRAM_BANK_SIZE + usize::from(address - 0xd000),
        }
    }

    fn read_io(&self, address: Address) -> u8 {
        let value = self.io[io_index(address)];
        match address {
            JOYP => {
                let select = value & 0x30;
                if select & 0x10 == 0 {
                    0xc0 | select | (self.joypad_state & 0x0f)
                } else if select & 0x20 == 0 {
                    0xc0 | select | (self.joypad_state >> 4)
                } else {
                    0xff
                }
            }
            // IF register always has top 3 bits high
            IF => value | 0xe0,
            STAT => value | 0x80,
            VBK if self.cgb => 0xfe | self.vram_bank,
            SVBK if self.cgb => 0xf8 | self.wram_bank,
            HDMA5 if self.cgb => {
                if self.hdma.hblank_active {
                    self.hdma.remaining.wrapping_sub(1) & 0x7f
                } else {
                    0xff
                }
            }
            BCPD if self.cgb => self.bg_palette_ram[usize::from(self.io[io_index(BCPS)] & 0x3f)],
            OCPD if self.cgb => self.obj_palette_ram[usize::from(self.io[io_index(OCPS)] & 0x3f)],
            BCPS | OCPS if self.cgb => value | 0x40,
            VBK | SVBK | HDMA1..=HDMA5 | BCPS..=OCPD => 0xff,
            _ => value,
        }
    }

    fn write_io(&mut self, address: Address, value: u8) {
        let index = io_index(address);
        match address {
            JOYP => self.io[index] = 0xc0 | (value & 0x30),
            SC => {
                self.io[index] = value;
                if value == 0x81 {
                    let data = self.io[io_index(SB)];
                    trace!("serial out {:#04x}", data);
                    self.serial_port_data.push(data);
                    // transfer completes immediately
                    self.io[index] = value & 0x7f;
                    self.request_interrupt(Interrupt::Serial);
                }
            }
            DIV | LY => self.io[index] = 0,
            IF => self.io[index] = value & 0x1f,
            // the mode and coincidence bits belong to the PPU
            STAT => self.io[index] = (value & 0x78) | (self.io[index] & 0x07),
            DMA => {
                self.io[index] = value;
                self.oam_transfer(value);
            }
            VBK if self.cgb => self.vram_bank = value & 0x1,
            SVBK if self.cgb => self.wram_bank = (value & 0x7).max(1),
            HDMA1..=HDMA4 if self.cgb => self.io[index] = value,
            HDMA5 if self.cgb => self.start_hdma(value),
            BCPS | OCPS if self.cgb => self.io[index] = value & 0xbf,
            BCPD if self.cgb => {
                let slot = Self::palette_write(&mut self.io[io_index(BCPS)]);
                self.bg_palette_ram[slot] = value;
            }
            OCPD if self.cgb => {
                let slot = Self::palette_write(&mut self.io[io_index(OCPS)]);
                self.obj_palette_ram[slot] = value;
            }
            VBK | SVBK | HDMA1..=HDMA5 | BCPS..=OCPD => (),
            _ => self.io[index] = value,
        }
    }

    /// Returns the palette RAM slot addressed by a palette index register and applies its
    /// auto-increment (bit 7).
    fn palette_write(index_register: &mut u8) -> usize {
        let slot = *index_register & 0x3f;
        if *index_register & 0x80 != 0 {
            *index_register = 0x80 | ((slot + 1) & 0x3f);
        }
        usize::from(slot)
    }

    /// Copies 160 bytes from `value * 0x100` into OAM through the normal read path.
    fn oam_transfer(&mut self, value: u8) {
        let base = u16::from(value) << 8;
        trace!("oam dma from {:#06x}", base);
        let mut data = [0; OAM_SIZE];
        for (offset, byte) in (0u16..).zip(data.iter_mut()) {
            *byte = self.read_byte(base + offset);
        }
        self.oam = data;
    }

    fn start_hdma(&mut self, value: u8) {
        if self.hdma.hblank_active && value & 0x80 == 0 {
            debug!("h-blank dma cancelled with {} blocks left", self.hdma.remaining);
            self.hdma.hblank_active = false;
            return;
        }

        let source = u16::from_be_bytes([self.io[io_index(HDMA1)], self.io[io_index(HDMA2)]]);
        let destination =
            u16::from_be_bytes([self.io[io_index(HDMA3)], self.io[io_index(HDMA4)]]);
        self.hdma = Hdma {
            source: source & 0xfff0,
            destination: 0x8000 | (destination & 0x1ff0),
            remaining: (value & 0x7f) + 1,
            hblank_active: false,
        };
        debug!(
            "vram dma {:#06x} -> {:#06x}, {} blocks{}",
            self.hdma.source,
            self.hdma.destination,
            self.hdma.remaining,
            if value & 0x80 != 0 { " during h-blank" } else { "" }
        );

        if value & 0x80 == 0 {
            while self.hdma.remaining > 0 {
                self.copy_hdma_block();
            }
        } else {
            self.hdma.hblank_active = true;
        }
    }

    fn copy_hdma_block(&mut self) {
        for offset in 0..HDMA_BLOCK_LEN {
            let byte = self.read_byte(self.hdma.source.wrapping_add(offset));
            let destination = 0x8000 | (self.hdma.destination.wrapping_add(offset) & 0x1fff);
            self.write_byte(destination, byte);
        }
        self.hdma.source = self.hdma.source.wrapping_add(HDMA_BLOCK_LEN);
        self.hdma.destination =
            0x8000 | (self.hdma.destination.wrapping_add(HDMA_BLOCK_LEN) & 0x1fff);
        self.hdma.remaining -= 1;
    }

    /// Called by the PPU on every H-Blank entry. Copies one block of an armed H-Blank transfer.
    pub fn hblank_dma_step(&mut self) {
        if !self.hdma.hblank_active {
            return;
        }
        self.copy_hdma_block();
        if self.hdma.remaining == 0 {
            self.hdma.hblank_active = false;
        }
    }

    pub fn request_interrupt(&mut self, interrupt: Interrupt) {
        trace!("requesting {} interrupt", interrupt.as_ref());
        self.io[io_index(IF)] |= interrupt.mask();
    }

    pub fn clear_interrupt(&mut self, interrupt: Interrupt) {
        self.io[io_index(IF)] &= !interrupt.mask();
    }

    /// Interrupts that are both requested and enabled.
    pub fn pending_interrupts(&self) -> u8 {
        self.io[io_index(IF)] & self.interrupt_enable & 0x1f
    }

    /// Raw value of an I/O register, bypassing read side effects and masking.
    pub fn io_register(&self, address: Address) -> u8 {
        self.io[io_index(address)]
    }

    pub fn get_scanline(&self) -> u8 {
        self.io[io_index(LY)]
    }

    /// Sets LY directly. CPU writes to LY always reset it; only the PPU may store other values.
    pub fn set_scanline(&mut self, value: u8) {
        self.io[io_index(LY)] = value;
    }

    pub fn inc_scanline(&mut self) -> u8 {
        let index = io_index(LY);
        self.io[index] = self.io[index].wrapping_add(1);
        self.io[index]
    }

    pub fn set_lcd_coincidence_bit(&mut self, coincident: bool) {
        let index = io_index(STAT);
        if coincident {
            self.io[index] |= 0x04;
        } else {
            self.io[index] &= !0x04;
        }
    }

    /// Stores the PPU mode in the low two bits of STAT.
    pub fn set_lcd_mode_bits(&mut self, mode: u8) {
        let index = io_index(STAT);
        self.io[index] = (self.io[index] & !0x03) | (mode & 0x03);
    }

    pub fn increment_divider(&mut self) {
        let index = io_index(DIV);
        self.io[index] = self.io[index].wrapping_add(1);
    }

    /// Increments TIMA. On overflow TIMA is reloaded from TMA and true is returned.
    pub fn increment_and_maybe_reset_timer(&mut self) -> bool {
        let index = io_index(TIMA);
        let (value, overflow) = self.io[index].overflowing_add(1);
        self.io[index] = if overflow {
            self.io[io_index(TMA)]
        } else {
            value
        };
        overflow
    }

    pub fn get_joypad_state(&self) -> u8 {
        self.joypad_state
    }

    pub fn set_joypad_state(&mut self, state: u8) {
        self.joypad_state = state;
    }

    pub fn vram_bank(&self, bank: usize) -> &[u8] {
        &self.vram[bank * VRAM_BANK_SIZE..(bank + 1) * VRAM_BANK_SIZE]
    }

    pub fn oam(&self) -> &[u8; OAM_SIZE] {
        &self.oam
    }

    pub fn bg_palette_ram(&self) -> &[u8; PALETTE_RAM_SIZE] {
        &self.bg_palette_ram
    }

    pub fn obj_palette_ram(&self) -> &[u8; PALETTE_RAM_SIZE] {
        &self.obj_palette_ram
    }

    /// Bytes written to the serial port since the last call.
    pub fn take_serial_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.serial_port_data)
    }
}

const BUS_RAM_LEN: usize = 2 * VRAM_BANK_SIZE
    + 1
    + 8 * WRAM_BANK_SIZE
    + 1
    + OAM_SIZE
    + IO_SIZE
    + HRAM_SIZE
    + 1
    + 2 * PALETTE_RAM_SIZE
    + 6
    + 1;

/// Every RAM region and bank register, followed by the cartridge controller state. Color mode is
/// not stored since it comes from the cartridge header.
impl SaveState for MemoryBus {
    const STATE_LEN: usize = BUS_RAM_LEN + Mbc::STATE_LEN;

    fn save_state(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.vram);
        out.push(self.vram_bank);
        out.extend_from_slice(&self.wram);
        out.push(self.wram_bank);
        out.extend_from_slice(&self.oam);
        out.extend_from_slice(&self.io);
        out.extend_from_slice(&self.hram);
        out.push(self.interrupt_enable);
        out.extend_from_slice(&self.bg_palette_ram);
        out.extend_from_slice(&self.obj_palette_ram);
        out.extend_from_slice(&self.hdma.source.to_le_bytes());
        out.extend_from_slice(&self.hdma.destination.to_le_bytes());
        out.push(self.hdma.remaining);
        out.push(self.hdma.hblank_active.into());
        out.push(self.joypad_state);
        match &self.cartridge {
            Some(cartridge) => cartridge.mbc().save_state(out),
            None => out.resize(out.len() + Mbc::STATE_LEN, 0),
        }
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        check_state_len(data, Self::STATE_LEN)?;
        let hdma = Hdma::from_state(&data[BUS_RAM_LEN - 7..BUS_RAM_LEN - 1])?;
        let cartridge = self.cartridge.as_mut().ok_or(Error::NoCartridge)?;
        cartridge.mbc_mut().load_state(&data[BUS_RAM_LEN..])?;

        let mut reader = StateReader::new(&data[..BUS_RAM_LEN]);
        reader.fill(&mut self.vram);
        self.vram_bank = reader.u8() & 0x1;
        reader.fill(&mut self.wram);
        self.wram_bank = (reader.u8() & 0x7).max(1);
        reader.fill(&mut self.oam);
        reader.fill(&mut self.io);
        reader.fill(&mut self.hram);
        self.interrupt_enable = reader.u8();
        reader.fill(&mut self.bg_palette_ram);
        reader.fill(&mut self.obj_palette_ram);
        // hdma block, already validated
        reader.bytes(6);
        self.hdma = hdma;
        self.joypad_state = reader.u8();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cartridge(type_byte: u8, cgb: bool) -> Cartridge {
        let mut rom = vec![0; 0x8000];
        rom[0x147] = type_byte;
        rom[0x149] = 0x02;
        if cgb {
            rom[0x143] = 0x80;
        }
        for (i, byte) in rom.iter_mut().enumerate().skip(0x4000) {
            *byte = (i & 0xff) as u8;
        }
        Cartridge::from_data(&rom).unwrap()
    }

    fn dmg_bus() -> MemoryBus {
        MemoryBus::with_cartridge(cartridge(0x00, false))
    }

    fn cgb_bus() -> MemoryBus {
        MemoryBus::with_cartridge(cartridge(0x00, true))
    }

    #[test]
    fn every_address_routes() {
        let mut bus = dmg_bus();
        for address in 0..=0xffffu16 {
            let value = bus.read_byte(address);
            // skip the registers with side effects on write
            if !matches!(address, SC | DMA | 0x0000..=0x7fff) {
                bus.write_byte(address, value);
            }
        }
        let empty = MemoryBus::new();
        assert_eq!(0xff, empty.read_byte(0x0100));
        assert_eq!(0xff, empty.read_byte(0xa000));
    }

    #[test]
    fn div_and_ly_reset_on_write() {
        let mut bus = dmg_bus();
        for value in [0x00, 0x01, 0x7f, 0xff] {
            bus.increment_divider();
            bus.write_byte(DIV, value);
            assert_eq!(0, bus.read_byte(DIV));

            bus.set_scanline(0x45);
            bus.write_byte(LY, value);
            assert_eq!(0, bus.read_byte(LY));
        }
    }

    #[test]
    fn dma_copies_through_read_path() {
        let mut bus = dmg_bus();
        for page in [0x40u8, 0x80, 0xc0, 0xd0] {
            let base = u16::from(page) << 8;
            for i in 0..0xa0u16 {
                bus.write_byte(base + i, (i as u8).wrapping_mul(3) ^ page);
            }
            let expected: Vec<u8> = (0..0xa0u16).map(|i| bus.read_byte(base + i)).collect();
            bus.write_byte(DMA, page);
            assert_eq!(&expected[..], &bus.oam()[..]);
            for (i, value) in expected.iter().enumerate() {
                assert_eq!(*value, bus.read_byte(0xfe00 + i as u16));
            }
        }
    }

    #[test]
    fn joypad_nibble_follows_select_lines() {
        let mut bus = dmg_bus();
        // Down and A pressed
        bus.set_joypad_state(0b1110_0111);

        bus.write_byte(JOYP, 0x20);
        assert_eq!(0b0111, bus.read_byte(JOYP) & 0x0f);

        bus.write_byte(JOYP, 0x10);
        assert_eq!(0b1110, bus.read_byte(JOYP) & 0x0f);

        bus.write_byte(JOYP, 0x30);
        assert_eq!(0xff, bus.read_byte(JOYP));
    }

    #[test]
    fn echo_ram_mirrors_work_ram() {
        let mut bus = dmg_bus();
        bus.write_byte(0xc123, 0x5a);
        assert_eq!(0x5a, bus.read_byte(0xe123));
        bus.write_byte(0xfdff, 0xa5);
        assert_eq!(0xa5, bus.read_byte(0xddff));
    }

    #[test]
    fn unusable_region_reads_ff() {
        let mut bus = dmg_bus();
        bus.write_byte(0xfea0, 0x00);
        assert_eq!(0xff, bus.read_byte(0xfea0));
        assert_eq!(0xff, bus.read_byte(0xfeff));
    }

    #[test]
    fn rom_writes_only_reach_controller() {
        let mut bus = dmg_bus();
        let before = bus.read_byte(0x4010);
        bus.write_byte(0x4010, before.wrapping_add(1));
        assert_eq!(before, bus.read_byte(0x4010));
    }

    #[test]
    fn stat_write_keeps_ppu_bits() {
        let mut bus = dmg_bus();
        bus.set_lcd_mode_bits(3);
        bus.set_lcd_coincidence_bit(true);
        bus.write_byte(STAT, 0xff);
        assert_eq!(0xff, bus.read_byte(STAT));
        bus.write_byte(STAT, 0x00);
        assert_eq!(0x80 | 0x04 | 0x03, bus.read_byte(STAT));
    }

    #[test]
    fn serial_transfer_is_captured() {
        let mut bus = dmg_bus();
        bus.write_byte(IF, 0);
        for byte in b"ok" {
            bus.write_byte(SB, *byte);
            bus.write_byte(SC, 0x81);
        }
        assert_eq!(b"ok".to_vec(), bus.take_serial_data());
        assert!(bus.take_serial_data().is_empty());
        assert_eq!(Interrupt::Serial.mask(), bus.read_byte(IF) & 0x1f);
    }

    #[test]
    fn timer_overflow_reloads_from_tma() {
        let mut bus = dmg_bus();
        bus.write_byte(TMA, 0xf0);
        bus.write_byte(TIMA, 0xfe);
        assert!(!bus.increment_and_maybe_reset_timer());
        assert_eq!(0xff, bus.read_byte(TIMA));
        assert!(bus.increment_and_maybe_reset_timer());
        assert_eq!(0xf0, bus.read_byte(TIMA));
    }

    #[test]
    fn vram_and_wram_banks_in_color_mode() {
        let mut bus = cgb_bus();
        bus.write_byte(0x8000, 0x11);
        bus.write_byte(VBK, 1);
        assert_eq!(0xff, bus.read_byte(VBK));
        assert_eq!(0x00, bus.read_byte(0x8000));
        bus.write_byte(0x8000, 0x22);
        bus.write_byte(VBK, 0);
        assert_eq!(0x11, bus.read_byte(0x8000));
        assert_eq!(0x22, bus.vram_bank(1)[0]);

        bus.write_byte(0xd000, 0x01);
        bus.write_byte(SVBK, 3);
        assert_eq!(0x00, bus.read_byte(0xd000));
        bus.write_byte(0xd000, 0x03);
        bus.write_byte(SVBK, 0);
        assert_eq!(0xf9, bus.read_byte(SVBK));
        assert_eq!(0x01, bus.read_byte(0xd000));
    }

    #[test]
    fn monochrome_ignores_bank_registers() {
        let mut bus = dmg_bus();
        bus.write_byte(0x8000, 0x11);
        bus.write_byte(VBK, 1);
        assert_eq!(0x11, bus.read_byte(0x8000));
        assert_eq!(0xff, bus.read_byte(VBK));
    }

    #[test]
    fn palette_index_auto_increments() {
        let mut bus = cgb_bus();
        bus.write_byte(BCPS, 0x80 | 0x3e);
        for value in [0x1f, 0x00, 0xff] {
            bus.write_byte(BCPD, value);
        }
        assert_eq!(0x1f, bus.bg_palette_ram()[0x3e]);
        assert_eq!(0x00, bus.bg_palette_ram()[0x3f]);
        // wraps around to the first entry
        assert_eq!(0xff, bus.bg_palette_ram()[0x00]);
        assert_eq!(0x81, bus.read_byte(BCPS) & 0xbf);

        bus.write_byte(OCPS, 0x05);
        bus.write_byte(OCPD, 0x12);
        bus.write_byte(OCPD, 0x34);
        assert_eq!(0x34, bus.obj_palette_ram()[0x05]);
        assert_eq!(0x34, bus.read_byte(OCPD));
    }

    fn arm_hdma(bus: &mut MemoryBus, source: u16, destination: u16) {
        for i in 0..0x40u16 {
            bus.write_byte(source + i, i as u8 + 1);
        }
        let [source_high, source_low] = source.to_be_bytes();
        let [destination_high, destination_low] = destination.to_be_bytes();
        bus.write_byte(HDMA1, source_high);
        bus.write_byte(HDMA2, source_low);
        bus.write_byte(HDMA3, destination_high);
        bus.write_byte(HDMA4, destination_low);
    }

    #[test]
    fn general_purpose_hdma_copies_immediately() {
        let mut bus = cgb_bus();
        arm_hdma(&mut bus, 0xc000, 0x8800);
        bus.write_byte(HDMA5, 0x01);
        for i in 0..0x20u16 {
            assert_eq!(i as u8 + 1, bus.read_byte(0x8800 + i));
        }
        assert_eq!(0x00, bus.read_byte(0x8820));
        assert_eq!(0xff, bus.read_byte(HDMA5));
    }

    #[test]
    fn hblank_hdma_copies_one_block_per_step() {
        let mut bus = cgb_bus();
        arm_hdma(&mut bus, 0xc000, 0x9000);
        bus.write_byte(HDMA5, 0x80 | 0x02);
        assert_eq!(0x02, bus.read_byte(HDMA5));
        assert_eq!(0x00, bus.read_byte(0x9000));

        bus.hblank_dma_step();
        assert_eq!(0x01, bus.read_byte(0x9000));
        assert_eq!(0x00, bus.read_byte(0x9010));
        assert_eq!(0x01, bus.read_byte(HDMA5));

        bus.hblank_dma_step();
        bus.hblank_dma_step();
        assert_eq!(0x30, bus.read_byte(0x902f));
        assert_eq!(0xff, bus.read_byte(HDMA5));

        // nothing armed any more
        bus.hblank_dma_step();
        assert_eq!(0x00, bus.read_byte(0x9030));
    }

    #[test]
    fn pending_interrupts_need_enable_and_flag() {
        let mut bus = dmg_bus();
        bus.write_byte(IF, 0);
        bus.request_interrupt(Interrupt::Timer);
        assert_eq!(0, bus.pending_interrupts());
        bus.write_byte(IE, 0xff);
        assert_eq!(Interrupt::Timer.mask(), bus.pending_interrupts());
        bus.clear_interrupt(Interrupt::Timer);
        assert_eq!(0, bus.pending_interrupts());
    }

    #[test]
    fn state_round_trip() {
        let mut bus = cgb_bus();
        bus.write_byte(0x8123, 0x12);
        bus.write_byte(VBK, 1);
        bus.write_byte(0x9fff, 0x34);
        bus.write_byte(SVBK, 5);
        bus.write_byte(0xd456, 0x56);
        bus.write_byte(0xff90, 0x78);
        bus.write_byte(IE, 0x1d);
        bus.write_byte(OCPS, 0x82);
        bus.write_byte(OCPD, 0x9a);
        bus.write_byte(0x0000, 0x0a);
        bus.write_byte(0xa010, 0xbc);
        bus.set_joypad_state(0xfe);

        let mut state = Vec::new();
        bus.save_state(&mut state);
        assert_eq!(MemoryBus::STATE_LEN, state.len());

        let mut restored = MemoryBus::with_cartridge(cartridge(0x00, true));
        restored.load_state(&state).unwrap();
        for address in 0..=0xffffu16 {
            assert_eq!(
                bus.read_byte(address),
                restored.read_byte(address),
                "address {:#06x}",
                address
            );
        }
        assert_eq!(bus.obj_palette_ram(), restored.obj_palette_ram());
        assert_eq!(0xfe, restored.get_joypad_state());
    }

    #[test]
    fn load_needs_cartridge_and_exact_length() {
        let bus = dmg_bus();
        let mut state = Vec::new();
        bus.save_state(&mut state);

        let mut empty = MemoryBus::new();
        assert!(matches!(empty.load_state(&state), Err(Error::NoCartridge)));

        let mut other = dmg_bus();
        assert!(matches!(
            other.load_state(&state[1..]),
            Err(Error::InvalidSaveState { .. })
        ));
    }

    #[test]
    fn load_rejects_armed_hdma_without_blocks() {
        let mut bus = cgb_bus();
        arm_hdma(&mut bus, 0xc000, 0x9000);
        bus.write_byte(HDMA5, 0x80 | 0x02);
        let mut state = Vec::new();
        bus.save_state(&mut state);
        let remaining = BUS_RAM_LEN - 3;
        assert_eq!(3, state[remaining]);
        assert_eq!(1, state[remaining + 1]);

        let mut empty_transfer = state.clone();
        empty_transfer[remaining] = 0;
        let mut restored = cgb_bus();
        restored.write_byte(0xc100, 0x42);
        assert!(matches!(
            restored.load_state(&empty_transfer),
            Err(Error::SaveStateMismatch(_))
        ));
        assert_eq!(0x42, restored.read_byte(0xc100));

        // more blocks than one transfer can hold are cut down
        let mut oversized = state;
        oversized[remaining] = 0xff;
        restored.load_state(&oversized).unwrap();
        assert_eq!(0x7f, restored.read_byte(HDMA5));
        for _ in 0..0x80 {
            restored.hblank_dma_step();
        }
        assert_eq!(0xff, restored.read_byte(HDMA5));
        restored.hblank_dma_step();
    }
}
