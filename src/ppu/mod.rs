/*!
 * The PPU serves as an implementation for all the gameboy's graphics. Its mode machine is driven
 * by the cycles the CPU reports, and each line is drawn into an off-screen framebuffer as pixel
 * transfer ends. A frame is complete once V-Blank begins.
 */

mod lcd;
mod palette;
mod renderer;

pub use lcd::{LcdControl, PpuMode};
pub use palette::{PaletteRegister, TileColor};

use crate::component::{ElapsedTime, SaveState, Steppable};
use crate::error::Result;
use crate::memory::MemoryBus;

use lcd::Lcd;
use renderer::Renderer;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

/// One 4-byte OAM entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OamData([u8; 4]);

impl OamData {
    pub fn new(data: &[u8]) -> OamData {
        let mut entry = [0; 4];
        entry.copy_from_slice(&data[..4]);
        OamData(entry)
    }

    pub fn y_pos(&self) -> u8 {
        self.0[0]
    }

    pub fn x_pos(&self) -> u8 {
        self.0[1]
    }

    pub fn tile_index(&self) -> u8 {
        self.0[2]
    }

    /// Monochrome palette: 0 = OBP0, 1 = OBP1
    pub fn palette_number(&self) -> u8 {
        self.0[3] >> 4 & 1
    }

    pub fn cgb_palette(&self) -> u8 {
        self.0[3] & 0x7
    }

    pub fn vram_bank(&self) -> usize {
        usize::from(self.0[3] >> 3 & 1)
    }

    /// true iff horizontally mirrored
    pub fn x_flip(&self) -> bool {
        self.0[3] >> 5 & 1 == 1
    }

    /// true iff vertically mirrored
    pub fn y_flip(&self) -> bool {
        self.0[3] >> 6 & 1 == 1
    }

    /// false=No, true=BG and Window colors 1-3 over the OBJ
    pub fn bg_window_over_obj(&self) -> bool {
        self.0[3] >> 7 & 1 == 1
    }
}

/// 160x144 pixels in 0x00RRGGBB, row major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    pixels: Vec<u32>,
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framebuffer {
    pub fn new() -> Self {
        Self {
            pixels: vec![TileColor::White.rgb(); SCREEN_WIDTH * SCREEN_HEIGHT],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * SCREEN_WIDTH + x]
    }

    pub fn set(&mut self, x: usize, y: usize, color: u32) {
        self.pixels[y * SCREEN_WIDTH + x] = color;
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn rows(&self) -> std::slice::ChunksExact<'_, u32> {
        self.pixels.chunks_exact(SCREEN_WIDTH)
    }
}

pub struct Ppu {
    lcd: Lcd,
    renderer: Renderer,
    framebuffer: Framebuffer,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    /// A PPU at the start of OAM scan on line 0 with the LCD on.
    pub fn new() -> Self {
        Self {
            lcd: Lcd::new(),
            renderer: Renderer::new(),
            framebuffer: Framebuffer::new(),
        }
    }

    pub fn update(&mut self, bus: &mut MemoryBus, cycles: ElapsedTime) {
        self.lcd
            .update(bus, cycles, &mut self.renderer, &mut self.framebuffer);
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn mode(&self) -> PpuMode {
        self.lcd.mode()
    }

    pub fn mode_clock(&self) -> u32 {
        self.lcd.mode_clock()
    }

    pub fn window_line_counter(&self) -> u8 {
        self.lcd.window_line_counter()
    }

    /// Frames completed, counted on each V-Blank entry.
    pub fn frame_count(&self) -> u64 {
        self.lcd.frame_count()
    }
}

impl Steppable for Ppu {
    type Context = MemoryBus;

    fn step(&mut self, bus: &mut MemoryBus, elapsed: ElapsedTime) -> Result<ElapsedTime> {
        self.update(bus, elapsed);
        Ok(elapsed)
    }
}

/// Only the mode machine is saved. The framebuffer is redrawn by the next frame.
impl SaveState for Ppu {
    const STATE_LEN: usize = Lcd::STATE_LEN;

    fn save_state(&self, out: &mut Vec<u8>) {
        self.lcd.save_state(out);
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        self.lcd.load_state(data)
    }
}
