use log::{debug, trace};
use strum_macros::AsRefStr;

use crate::component::{check_state_len, SaveState, StateReader};
use crate::error::{Error, Result};
use crate::interrupt::Interrupt;
use crate::memory::{MemoryBus, LCDC, LYC, STAT};

use super::renderer::Renderer;
use super::Framebuffer;

pub const SCANLINE_CYCLES: u32 = 456;
const OAM_SCAN_CYCLES: u32 = 80;
const PIXEL_TRANSFER_CYCLES: u32 = 172;
const HBLANK_CYCLES: u32 = SCANLINE_CYCLES - OAM_SCAN_CYCLES - PIXEL_TRANSFER_CYCLES;
pub const VBLANK_START_LINE: u8 = 144;
const LAST_LINE: u8 = 153;

/// Represents the LCD Control register at 0xff40
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LcdControl {
    /// In color mode this is the BG/window master priority instead.
    pub bg_window_enable: bool,
    pub obj_enable: bool,
    /// false = 8x8, true = 8x16
    pub obj_size: bool,
    /// false = 0x9800, true = 0x9c00
    pub bg_tile_map_area: bool,
    /// false = signed indexing from 0x9000, true = unsigned from 0x8000
    pub bg_window_tile_data_area: bool,
    pub window_enable: bool,
    pub window_tile_map_area: bool,
    pub lcd_ppu_enable: bool,
}

impl From<u8> for LcdControl {
    fn from(value: u8) -> Self {
        let bit = |n: u8| value & (1 << n) != 0;
        Self {
            bg_window_enable: bit(0),
            obj_enable: bit(1),
            obj_size: bit(2),
            bg_tile_map_area: bit(3),
            bg_window_tile_data_area: bit(4),
            window_enable: bit(5),
            window_tile_map_area: bit(6),
            lcd_ppu_enable: bit(7),
        }
    }
}

impl LcdControl {
    pub fn sprite_height(&self) -> u8 {
        if self.obj_size {
            16
        } else {
            8
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum PpuMode {
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    PixelTransfer = 3,
}

impl PpuMode {
    fn from_bits(bits: u8) -> Result<PpuMode> {
        match bits {
            0 => Ok(PpuMode::HBlank),
            1 => Ok(PpuMode::VBlank),
            2 => Ok(PpuMode::OamScan),
            3 => Ok(PpuMode::PixelTransfer),
            _ => Err(Error::SaveStateMismatch(format!("unknown ppu mode {}", bits))),
        }
    }

    /// STAT bit that enables an interrupt on entering this mode.
    fn stat_enable_bit(self) -> Option<u8> {
        match self {
            PpuMode::HBlank => Some(3),
            PpuMode::VBlank => Some(4),
            PpuMode::OamScan => Some(5),
            PpuMode::PixelTransfer => None,
        }
    }
}

/// The mode state machine. LY itself lives on the bus; this tracks where in the line we are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lcd {
    mode: PpuMode,
    mode_clock: u32,
    lcd_enabled: bool,
    /// Set during the shortened H-Blank that follows switching the LCD back on.
    first_line_after_enable: bool,
    window_line_counter: u8,
    /// Count of number of elapsed frames since initialization
    frame_count: u64,
}

impl Default for Lcd {
    fn default() -> Self {
        Self::new()
    }
}

impl Lcd {
    pub fn new() -> Lcd {
        Lcd {
            mode: PpuMode::OamScan,
            mode_clock: 0,
            lcd_enabled: true,
            first_line_after_enable: false,
            window_line_counter: 0,
            frame_count: 0,
        }
    }

    pub fn mode(&self) -> PpuMode {
        self.mode
    }

    pub fn mode_clock(&self) -> u32 {
        self.mode_clock
    }

    pub fn window_line_counter(&self) -> u8 {
        self.window_line_counter
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn mode_length(&self) -> u32 {
        match self.mode {
            PpuMode::OamScan => OAM_SCAN_CYCLES,
            PpuMode::PixelTransfer => PIXEL_TRANSFER_CYCLES,
            PpuMode::HBlank if self.first_line_after_enable => OAM_SCAN_CYCLES,
            PpuMode::HBlank => HBLANK_CYCLES,
            PpuMode::VBlank => SCANLINE_CYCLES,
        }
    }

    /// Advances the mode clock by `cycles`, rendering each line as it leaves pixel transfer.
    pub fn update(
        &mut self,
        bus: &mut MemoryBus,
        cycles: u32,
        renderer: &mut Renderer,
        framebuffer: &mut Framebuffer,
    ) {
        let lcdc = LcdControl::from(bus.io_register(LCDC));
        if !lcdc.lcd_ppu_enable {
            if self.lcd_enabled {
                debug!("lcd switched off on line {}", bus.get_scanline());
                self.lcd_enabled = false;
                self.mode_clock = 0;
                bus.set_scanline(0);
                // no stat interrupts while the lcd is off
                let coincident = bus.io_register(LYC) == 0;
                bus.set_lcd_coincidence_bit(coincident);
                self.set_mode(bus, PpuMode::VBlank);
            }
            return;
        }
        if !self.lcd_enabled {
            debug!("lcd switched on");
            self.lcd_enabled = true;
            self.first_line_after_enable = true;
            self.mode_clock = 0;
            self.window_line_counter = 0;
            bus.set_scanline(0);
            self.compare_ly(bus);
            self.set_mode(bus, PpuMode::HBlank);
        }

        self.mode_clock += cycles;
        while self.mode_clock >= self.mode_length() {
            self.mode_clock -= self.mode_length();
            self.advance_mode(bus, renderer, framebuffer);
        }
    }

    fn advance_mode(
        &mut self,
        bus: &mut MemoryBus,
        renderer: &mut Renderer,
        framebuffer: &mut Framebuffer,
    ) {
        match self.mode {
            PpuMode::OamScan => self.change_mode(bus, PpuMode::PixelTransfer),
            PpuMode::PixelTransfer => {
                let lcdc = LcdControl::from(bus.io_register(LCDC));
                let line = bus.get_scanline();
                if renderer.render_scanline(bus, lcdc, line, self.window_line_counter, framebuffer)
                {
                    self.window_line_counter = self.window_line_counter.wrapping_add(1);
                }
                self.change_mode(bus, PpuMode::HBlank);
                bus.hblank_dma_step();
            }
            PpuMode::HBlank if self.first_line_after_enable => {
                self.first_line_after_enable = false;
                self.change_mode(bus, PpuMode::PixelTransfer);
            }
            PpuMode::HBlank => {
                let line = bus.inc_scanline();
                self.compare_ly(bus);
                if line == VBLANK_START_LINE {
                    self.frame_count += 1;
                    self.window_line_counter = 0;
                    trace!("frame {} complete", self.frame_count);
                    bus.request_interrupt(Interrupt::VBlank);
                    self.change_mode(bus, PpuMode::VBlank);
                } else {
                    self.change_mode(bus, PpuMode::OamScan);
                }
            }
            PpuMode::VBlank => {
                if bus.get_scanline() >= LAST_LINE {
                    bus.set_scanline(0);
                    self.compare_ly(bus);
                    self.change_mode(bus, PpuMode::OamScan);
                } else {
                    bus.inc_scanline();
                    self.compare_ly(bus);
                }
            }
        }
    }

    fn set_mode(&mut self, bus: &mut MemoryBus, mode: PpuMode) {
        self.mode = mode;
        bus.set_lcd_mode_bits(mode as u8);
    }

    fn change_mode(&mut self, bus: &mut MemoryBus, mode: PpuMode) {
        self.set_mode(bus, mode);
        if let Some(bit) = mode.stat_enable_bit() {
            if bus.io_register(STAT) & (1 << bit) != 0 {
                trace!("stat interrupt on entering {}", mode.as_ref());
                bus.request_interrupt(Interrupt::Stat);
            }
        }
    }

    /// Updates the coincidence flag after LY changed.
    fn compare_ly(&mut self, bus: &mut MemoryBus) {
        let coincident = bus.get_scanline() == bus.io_register(LYC);
        bus.set_lcd_coincidence_bit(coincident);
        if coincident && bus.io_register(STAT) & 0x40 != 0 {
            bus.request_interrupt(Interrupt::Stat);
        }
    }
}

impl SaveState for Lcd {
    const STATE_LEN: usize = 1 + 4 + 1 + 1 + 1 + 8;

    fn save_state(&self, out: &mut Vec<u8>) {
        out.push(self.mode as u8);
        out.extend_from_slice(&self.mode_clock.to_le_bytes());
        out.push(self.lcd_enabled.into());
        out.push(self.first_line_after_enable.into());
        out.push(self.window_line_counter);
        out.extend_from_slice(&self.frame_count.to_le_bytes());
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        check_state_len(data, Self::STATE_LEN)?;
        let mut reader = StateReader::new(data);
        let mode = PpuMode::from_bits(reader.u8())?;
        let lcd = Lcd {
            mode,
            mode_clock: reader.u32(),
            lcd_enabled: reader.bool(),
            first_line_after_enable: reader.bool(),
            window_line_counter: reader.u8(),
            frame_count: reader.u64(),
        };
        if lcd.mode_clock >= lcd.mode_length() {
            return Err(Error::SaveStateMismatch(format!(
                "mode clock {} past the end of {}",
                lcd.mode_clock,
                mode.as_ref()
            )));
        }
        *self = lcd;
        Ok(())
    }
}
