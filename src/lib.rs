mod component;
mod error;

mod bit_field;
pub mod cartridge;
pub mod cpu;
pub mod gameboy;
pub mod interrupt;
pub mod joypad;
pub mod memory;
pub mod ppu;
pub mod timer;

pub use component::{Address, ElapsedTime, SaveState, Steppable};
pub use error::{Error, Result};
pub use gameboy::{EmulatorConfig, GameBoy, CYCLES_PER_FRAME};
pub use joypad::JoypadInput;
pub use memory::MemoryBus;
pub use ppu::{Framebuffer, Ppu, SCREEN_HEIGHT, SCREEN_WIDTH};
