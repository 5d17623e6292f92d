use strum_macros::EnumIter;

use crate::memory::PALETTE_RAM_SIZE;

/// The four monochrome shades, lightest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum TileColor {
    White,
    LightGrey,
    DarkGrey,
    Black,
}

impl TileColor {
    pub fn from_u8(color: u8) -> TileColor {
        match color & 0b11 {
            0 => TileColor::White,
            1 => TileColor::LightGrey,
            2 => TileColor::DarkGrey,
            _ => TileColor::Black,
        }
    }

    /// 0x00RRGGBB
    pub fn rgb(self) -> u32 {
        match self {
            TileColor::White => 0xffffff,
            TileColor::LightGrey => 0xaaaaaa,
            TileColor::DarkGrey => 0x555555,
            TileColor::Black => 0x000000,
        }
    }
}

/// One of BGP, OBP0 or OBP1: four 2-bit shades indexed by color id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteRegister(pub u8);

impl PaletteRegister {
    pub fn map_index(self, index: u8) -> TileColor {
        TileColor::from_u8(self.0 >> ((index & 0b11) * 2))
    }
}

/// Looks up color `index` of `palette` (0-7) in color-mode palette RAM and expands the
/// little-endian BGR555 entry to 0x00RRGGBB.
pub fn cgb_color(palette_ram: &[u8; PALETTE_RAM_SIZE], palette: u8, index: u8) -> u32 {
    let offset = usize::from(palette & 0x7) * 8 + usize::from(index & 0x3) * 2;
    let bgr555 = u16::from_le_bytes([palette_ram[offset], palette_ram[offset + 1]]);

    let expand = |channel: u16| {
        let channel = u32::from(channel & 0x1f);
        (channel << 3) | (channel >> 2)
    };
    let red = expand(bgr555);
    let green = expand(bgr555 >> 5);
    let blue = expand(bgr555 >> 10);
    (red << 16) | (green << 8) | blue
}
