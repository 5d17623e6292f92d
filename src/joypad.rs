use log::trace;
use strum_macros::{AsRefStr, EnumIter};

use crate::error::{Error, Result};
use crate::interrupt::Interrupt;
use crate::memory::MemoryBus;

/// The eight keys, in the bit order of the bus's joypad state byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
pub enum JoypadInput {
    Right = 0,
    Left = 1,
    Up = 2,
    Down = 3,
    A = 4,
    B = 5,
    Select = 6,
    Start = 7,
}

impl JoypadInput {
    pub fn from_index(index: u8) -> Result<JoypadInput> {
        use JoypadInput::*;
        match index {
            0 => Ok(Right),
            1 => Ok(Left),
            2 => Ok(Up),
            3 => Ok(Down),
            4 => Ok(A),
            5 => Ok(B),
            6 => Ok(Select),
            7 => Ok(Start),
            _ => Err(Error::InvalidKey(index)),
        }
    }

    fn mask(self) -> u8 {
        1 << self as u8
    }

    pub fn is_direction(self) -> bool {
        (self as u8) < 4
    }
}

/// Notify the joypad that an input was pressed. Returns true iff the input
/// was previously pressed.
///
/// Every press requests the joypad interrupt, whichever key group JOYP currently selects.
pub fn key_pressed(bus: &mut MemoryBus, input: JoypadInput) -> bool {
    trace!("pressed {}", input.as_ref());
    let state = bus.get_joypad_state();
    // active low
    bus.set_joypad_state(state & !input.mask());
    bus.request_interrupt(Interrupt::Joypad);
    state & input.mask() == 0
}

/// Notify the joypad that an input was released. Returns true iff the input
/// was previously pressed.
pub fn key_released(bus: &mut MemoryBus, input: JoypadInput) -> bool {
    trace!("released {}", input.as_ref());
    let state = bus.get_joypad_state();
    bus.set_joypad_state(state | input.mask());
    state & input.mask() == 0
}
