use crate::memory::{MemoryBus, BGP, OBP0, OBP1, SCX, SCY, WX, WY};

use super::lcd::LcdControl;
use super::palette::{cgb_color, PaletteRegister, TileColor};
use super::{Framebuffer, OamData, SCREEN_WIDTH};

const MAX_SPRITES_PER_LINE: usize = 10;

#[derive(Debug, Clone, Copy)]
pub enum TileDataAddressingMethod {
    /// Unsigned tile numbers from 0x8000.
    Method8000,
    /// Signed tile numbers around 0x9000.
    Method8800,
}

impl TileDataAddressingMethod {
    /// Offset of tile `index` from the start of VRAM.
    fn tile_offset(self, index: u8) -> usize {
        match self {
            TileDataAddressingMethod::Method8000 => usize::from(index) * 16,
            TileDataAddressingMethod::Method8800 => {
                (0x1000 + i32::from(index as i8) * 16) as usize
            }
        }
    }
}

/// Color id of pixel `x` in the tile row stored as two bit planes at `offset`.
fn tile_pixel(vram: &[u8], offset: usize, x: u8) -> u8 {
    let bit = 7 - (x & 0x7);
    let low = (vram[offset] >> bit) & 1;
    let high = (vram[offset + 1] >> bit) & 1;
    (high << 1) | low
}

/// Background or window pixel as drawn before sprites are mixed in.
#[derive(Debug, Clone, Copy, Default)]
struct BgPixel {
    color_id: u8,
    /// Color-mode tile attribute bit 7.
    priority: bool,
}

/// Draws one scanline at a time from VRAM, OAM and the palette registers.
pub struct Renderer {
    line: [BgPixel; SCREEN_WIDTH],
    line_sprites: Vec<OamData>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            line: [BgPixel::default(); SCREEN_WIDTH],
            line_sprites: Vec::with_capacity(MAX_SPRITES_PER_LINE),
        }
    }

    /// Renders line `ly` into the framebuffer. Returns true if any window pixel was drawn, which
    /// advances the window's own line counter.
    pub fn render_scanline(
        &mut self,
        bus: &MemoryBus,
        lcdc: LcdControl,
        ly: u8,
        window_line: u8,
        framebuffer: &mut Framebuffer,
    ) -> bool {
        if usize::from(ly) >= super::SCREEN_HEIGHT {
            return false;
        }
        let window_drawn = self.draw_background(bus, lcdc, ly, window_line, framebuffer);
        if lcdc.obj_enable {
            self.select_sprites(bus, lcdc, ly);
            self.draw_sprites(bus, lcdc, ly, framebuffer);
        }
        window_drawn
    }

    fn draw_background(
        &mut self,
        bus: &MemoryBus,
        lcdc: LcdControl,
        ly: u8,
        window_line: u8,
        framebuffer: &mut Framebuffer,
    ) -> bool {
        let cgb = bus.is_cgb();
        // in color mode LCDC bit 0 only affects priority
        if !cgb && !lcdc.bg_window_enable {
            self.line = [BgPixel::default(); SCREEN_WIDTH];
            for x in 0..SCREEN_WIDTH {
                framebuffer.set(x, usize::from(ly), TileColor::White.rgb());
            }
            return false;
        }

        let scx = bus.io_register(SCX);
        let scy = bus.io_register(SCY);
        let wx = bus.io_register(WX);
        let wy = bus.io_register(WY);
        let bgp = PaletteRegister(bus.io_register(BGP));
        let method = if lcdc.bg_window_tile_data_area {
            TileDataAddressingMethod::Method8000
        } else {
            TileDataAddressingMethod::Method8800
        };

        let window_on_line = lcdc.window_enable && ly >= wy && wx <= 166;
        let mut window_drawn = false;

        for x in 0..SCREEN_WIDTH as u8 {
            let in_window = window_on_line && u16::from(x) + 7 >= u16::from(wx);
            let (map_x, map_y, map_base) = if in_window {
                window_drawn = true;
                let area = if lcdc.window_tile_map_area { 0x1c00 } else { 0x1800 };
                (x + 7 - wx, window_line, area)
            } else {
                let area = if lcdc.bg_tile_map_area { 0x1c00 } else { 0x1800 };
                (scx.wrapping_add(x), scy.wrapping_add(ly), area)
            };

            let map_offset = map_base + usize::from(map_y / 8) * 32 + usize::from(map_x / 8);
            let tile_index = bus.vram_bank(0)[map_offset];
            let attributes = if cgb { bus.vram_bank(1)[map_offset] } else { 0 };

            let mut sub_x = map_x % 8;
            let mut sub_y = map_y % 8;
            if attributes & 0x20 != 0 {
                sub_x = 7 - sub_x;
            }
            if attributes & 0x40 != 0 {
                sub_y = 7 - sub_y;
            }
            let bank = usize::from(attributes >> 3 & 1);
            let row = method.tile_offset(tile_index) + usize::from(sub_y) * 2;
            let color_id = tile_pixel(bus.vram_bank(bank), row, sub_x);

            let color = if cgb {
                cgb_color(bus.bg_palette_ram(), attributes & 0x7, color_id)
            } else {
                bgp.map_index(color_id).rgb()
            };
            self.line[usize::from(x)] = BgPixel {
                color_id,
                priority: attributes & 0x80 != 0,
            };
            framebuffer.set(usize::from(x), usize::from(ly), color);
        }

        window_drawn
    }

    /// Picks the first ten sprites in OAM order that cover `ly`, ordered by drawing priority.
    fn select_sprites(&mut self, bus: &MemoryBus, lcdc: LcdControl, ly: u8) {
        let height = i16::from(lcdc.sprite_height());
        let line = i16::from(ly);

        self.line_sprites.clear();
        for entry in bus.oam().chunks_exact(4) {
            let sprite = OamData::new(entry);
            let top = i16::from(sprite.y_pos()) - 16;
            if top <= line && line < top + height {
                self.line_sprites.push(sprite);
                if self.line_sprites.len() == MAX_SPRITES_PER_LINE {
                    break;
                }
            }
        }

        // monochrome hardware prefers smaller x, the sort is stable so OAM order breaks ties
        if !bus.is_cgb() {
            self.line_sprites.sort_by_key(|sprite| sprite.x_pos());
        }
    }

    fn draw_sprites(
        &self,
        bus: &MemoryBus,
        lcdc: LcdControl,
        ly: u8,
        framebuffer: &mut Framebuffer,
    ) {
        let cgb = bus.is_cgb();
        let height = lcdc.sprite_height();

        for x in 0..SCREEN_WIDTH {
            let screen_x = x as i16;
            let sprite_pixel = self.line_sprites.iter().find_map(|sprite| {
                let left = i16::from(sprite.x_pos()) - 8;
                if screen_x < left || screen_x >= left + 8 {
                    return None;
                }
                let mut sub_x = (screen_x - left) as u8;
                if sprite.x_flip() {
                    sub_x = 7 - sub_x;
                }
                let mut sub_y = ly.wrapping_sub(sprite.y_pos().wrapping_sub(16));
                if sprite.y_flip() {
                    sub_y = height - 1 - sub_y;
                }
                let tile = if height == 16 {
                    sprite.tile_index() & 0xfe
                } else {
                    sprite.tile_index()
                };
                let bank = if cgb { sprite.vram_bank() } else { 0 };
                let row = usize::from(tile) * 16 + usize::from(sub_y) * 2;
                match tile_pixel(bus.vram_bank(bank), row, sub_x) {
                    0 => None,
                    color_id => Some((*sprite, color_id)),
                }
            });

            let (sprite, color_id) = match sprite_pixel {
                Some(found) => found,
                None => continue,
            };

            let background = self.line[x];
            let bg_wins = if cgb && !lcdc.bg_window_enable {
                false
            } else {
                background.color_id != 0
                    && (sprite.bg_window_over_obj() || (cgb && background.priority))
            };
            if bg_wins {
                continue;
            }

            let color = if cgb {
                cgb_color(bus.obj_palette_ram(), sprite.cgb_palette(), color_id)
            } else {
                let register = if sprite.palette_number() == 0 {
                    OBP0
                } else {
                    OBP1
                };
                PaletteRegister(bus.io_register(register))
                    .map_index(color_id)
                    .rgb()
            };
            framebuffer.set(x, usize::from(ly), color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;
    use crate::memory::{BCPD, BCPS, LCDC, VBK};

    fn bus(cgb: bool) -> MemoryBus {
        let mut rom = vec![0; 0x8000];
        if cgb {
            rom[0x143] = 0x80;
        }
        MemoryBus::with_cartridge(Cartridge::from_data(&rom).unwrap())
    }

    /// Fills tile `index` (unsigned addressing) with a solid color id.
    fn solid_tile(bus: &mut MemoryBus, index: u16, color_id: u8) {
        let low = if color_id & 1 != 0 { 0xff } else { 0x00 };
        let high = if color_id & 2 != 0 { 0xff } else { 0x00 };
        for row in 0..8 {
            bus.write_byte(0x8000 + index * 16 + row * 2, low);
            bus.write_byte(0x8000 + index * 16 + row * 2 + 1, high);
        }
    }

    fn render(bus: &MemoryBus, ly: u8, window_line: u8) -> (Framebuffer, bool) {
        let mut renderer = Renderer::new();
        let mut framebuffer = Framebuffer::new();
        let lcdc = LcdControl::from(bus.read_byte(LCDC));
        let drawn = renderer.render_scanline(bus, lcdc, ly, window_line, &mut framebuffer);
        (framebuffer, drawn)
    }

    #[test]
    fn tile_addressing_methods() {
        assert_eq!(0x0000, TileDataAddressingMethod::Method8000.tile_offset(0));
        assert_eq!(0x0ff0, TileDataAddressingMethod::Method8000.tile_offset(0xff));
        assert_eq!(0x1000, TileDataAddressingMethod::Method8800.tile_offset(0));
        assert_eq!(0x0800, TileDataAddressingMethod::Method8800.tile_offset(0x80));
        assert_eq!(0x17f0, TileDataAddressingMethod::Method8800.tile_offset(0x7f));
    }

    #[test]
    fn tile_pixel_reads_bit_planes() {
        let vram = [0b1010_0000, 0b1100_0000];
        let ids: Vec<u8> = (0..4).map(|x| tile_pixel(&vram, 0, x)).collect();
        assert_eq!(vec![3, 2, 1, 0], ids);
    }

    #[test]
    fn background_scrolls_and_uses_bgp() {
        let mut bus = bus(false);
        bus.write_byte(BGP, 0b11_10_01_00);
        solid_tile(&mut bus, 1, 3);
        // second tile of the first map row
        bus.write_byte(0x9801, 1);
        let (framebuffer, _) = render(&bus, 0, 0);
        assert_eq!(0xffffff, framebuffer.get(7, 0));
        assert_eq!(0x000000, framebuffer.get(8, 0));
        assert_eq!(0xffffff, framebuffer.get(16, 0));

        bus.write_byte(SCX, 4);
        let (framebuffer, _) = render(&bus, 0, 0);
        assert_eq!(0x000000, framebuffer.get(4, 0));
        assert_eq!(0xffffff, framebuffer.get(12, 0));
    }

    #[test]
    fn signed_addressing_reads_from_9000() {
        let mut bus = bus(false);
        bus.write_byte(BGP, 0b11_10_01_00);
        // LCD on, BG on, signed tile data
        bus.write_byte(LCDC, 0x81);
        for row in 0..8 {
            bus.write_byte(0x9000 + row * 2, 0xff);
        }
        let (framebuffer, _) = render(&bus, 3, 0);
        assert_eq!(TileColor::LightGrey.rgb(), framebuffer.get(0, 3));
    }

    #[test]
    fn disabled_background_is_white() {
        let mut bus = bus(false);
        solid_tile(&mut bus, 0, 3);
        bus.write_byte(LCDC, 0x90);
        let (framebuffer, _) = render(&bus, 0, 0);
        assert!((0..SCREEN_WIDTH).all(|x| framebuffer.get(x, 0) == 0xffffff));
    }

    #[test]
    fn window_uses_its_own_line_counter() {
        let mut bus = bus(false);
        bus.write_byte(BGP, 0b11_10_01_00);
        solid_tile(&mut bus, 1, 2);
        // window map at 0x9c00, second row of tiles
        bus.write_byte(0x9c00 + 32, 1);
        bus.write_byte(LCDC, 0x91 | 0x20 | 0x40);
        bus.write_byte(WY, 10);
        bus.write_byte(WX, 7 + 80);

        let (_, drawn) = render(&bus, 9, 0);
        assert!(!drawn);

        let (framebuffer, drawn) = render(&bus, 50, 8);
        assert!(drawn);
        assert_eq!(0xffffff, framebuffer.get(79, 50));
        assert_eq!(TileColor::DarkGrey.rgb(), framebuffer.get(80, 50));
        assert_eq!(0xffffff, framebuffer.get(88, 50));
    }

    fn put_sprite(bus: &mut MemoryBus, slot: u16, y: u8, x: u8, tile: u8, flags: u8) {
        let base = 0xfe00 + slot * 4;
        for (offset, value) in [y, x, tile, flags].into_iter().enumerate() {
            bus.write_byte(base + offset as u16, value);
        }
    }

    #[test]
    fn sprites_draw_over_background() {
        let mut bus = bus(false);
        bus.write_byte(BGP, 0b11_10_01_00);
        bus.write_byte(OBP0, 0b11_10_01_00);
        bus.write_byte(OBP1, 0b01_01_01_00);
        bus.write_byte(LCDC, 0x93);
        solid_tile(&mut bus, 2, 3);
        put_sprite(&mut bus, 0, 16, 8, 2, 0x00);
        put_sprite(&mut bus, 1, 16, 20, 2, 0x10);

        let (framebuffer, _) = render(&bus, 0, 0);
        assert_eq!(0x000000, framebuffer.get(0, 0));
        assert_eq!(0x000000, framebuffer.get(7, 0));
        assert_eq!(0xffffff, framebuffer.get(8, 0));
        assert_eq!(TileColor::LightGrey.rgb(), framebuffer.get(12, 0));
    }

    #[test]
    fn behind_background_sprite_only_shows_on_color_zero() {
        let mut bus = bus(false);
        bus.write_byte(BGP, 0b11_10_01_00);
        bus.write_byte(OBP0, 0b11_11_11_00);
        bus.write_byte(LCDC, 0x93);
        solid_tile(&mut bus, 1, 1);
        solid_tile(&mut bus, 2, 3);
        bus.write_byte(0x9800, 1);
        put_sprite(&mut bus, 0, 16, 12, 2, 0x80);

        let (framebuffer, _) = render(&bus, 0, 0);
        // tile 0 of the map row is color 1, so the sprite hides there
        assert_eq!(TileColor::LightGrey.rgb(), framebuffer.get(4, 0));
        // map entry 1 is tile 0, color 0
        assert_eq!(0x000000, framebuffer.get(8, 0));
    }

    #[test]
    fn ten_sprite_limit_and_x_priority() {
        let mut bus = bus(false);
        bus.write_byte(OBP0, 0b11_10_01_00);
        bus.write_byte(OBP1, 0b10_10_10_00);
        bus.write_byte(LCDC, 0x93);
        solid_tile(&mut bus, 1, 3);
        for slot in 0..10 {
            put_sprite(&mut bus, slot, 16, 100, 0, 0);
        }
        // the eleventh sprite on the line is dropped
        put_sprite(&mut bus, 10, 16, 50, 1, 0);
        let (framebuffer, _) = render(&bus, 0, 0);
        assert_eq!(0xffffff, framebuffer.get(45, 0));

        let mut bus2 = self::bus(false);
        bus2.write_byte(OBP0, 0b11_10_01_00);
        bus2.write_byte(OBP1, 0b10_10_10_00);
        bus2.write_byte(LCDC, 0x93);
        solid_tile(&mut bus2, 1, 3);
        // later in OAM but further left, so it wins where they overlap
        put_sprite(&mut bus2, 0, 16, 12, 1, 0x10);
        put_sprite(&mut bus2, 1, 16, 10, 1, 0x00);
        let (framebuffer, _) = render(&bus2, 0, 0);
        assert_eq!(0x000000, framebuffer.get(4, 0));
        assert_eq!(0x000000, framebuffer.get(9, 0));
        assert_eq!(TileColor::DarkGrey.rgb(), framebuffer.get(10, 0));
    }

    #[test]
    fn tall_sprites_and_flips() {
        let mut bus = bus(false);
        bus.write_byte(OBP0, 0b11_10_01_00);
        bus.write_byte(LCDC, 0x97);
        solid_tile(&mut bus, 4, 1);
        solid_tile(&mut bus, 5, 3);
        // tile 5 uses the pair 4 and 5
        put_sprite(&mut bus, 0, 16, 8, 5, 0x00);
        put_sprite(&mut bus, 1, 16, 16, 5, 0x40);

        let (framebuffer, _) = render(&bus, 2, 0);
        assert_eq!(TileColor::LightGrey.rgb(), framebuffer.get(0, 2));
        assert_eq!(0x000000, framebuffer.get(8, 2));
        let (framebuffer, _) = render(&bus, 12, 0);
        assert_eq!(0x000000, framebuffer.get(0, 12));
        assert_eq!(TileColor::LightGrey.rgb(), framebuffer.get(8, 12));
    }

    #[test]
    fn color_mode_uses_attributes_and_palette_ram() {
        let mut bus = bus(true);
        solid_tile(&mut bus, 0, 1);
        // palette 3, color 1 = pure blue
        bus.write_byte(BCPS, 0x80 | (3 * 8 + 2));
        bus.write_byte(BCPD, 0x00);
        bus.write_byte(BCPD, 0x7c);
        // attribute for the first map entry: palette 3
        bus.write_byte(VBK, 1);
        bus.write_byte(0x9800, 0x03);
        bus.write_byte(VBK, 0);

        let (framebuffer, _) = render(&bus, 0, 0);
        assert_eq!(0x0000ff, framebuffer.get(0, 0));
        // palette 0 color 1 is black in cleared palette ram
        assert_eq!(0x000000, framebuffer.get(8, 0));
    }
}
