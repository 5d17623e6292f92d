use strum_macros::{AsRefStr, EnumIter};

use crate::error::{Error, Result};

/// Interrupt sources, in priority order. The discriminant is the bit in IE/IF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
pub enum Interrupt {
    VBlank = 0,
    Stat = 1,
    Timer = 2,
    Serial = 3,
    Joypad = 4,
}

impl Interrupt {
    pub fn from_index(index: u8) -> Result<Interrupt> {
        match index {
            0 => Ok(Interrupt::VBlank),
            1 => Ok(Interrupt::Stat),
            2 => Ok(Interrupt::Timer),
            3 => Ok(Interrupt::Serial),
            4 => Ok(Interrupt::Joypad),
            _ => Err(Error::InvalidInterrupt(index)),
        }
    }

    pub fn bit(self) -> u8 {
        self as u8
    }

    pub fn mask(self) -> u8 {
        1 << self.bit()
    }

    /// Address the CPU jumps to when servicing this interrupt.
    pub fn vector(self) -> u16 {
        0x40 + 8 * u16::from(self.bit())
    }

    /// Highest priority interrupt among the set bits of `pending`.
    pub fn highest_priority(pending: u8) -> Option<Interrupt> {
        (0..5)
            .find(|bit| pending & (1 << bit) != 0)
            .and_then(|bit| Interrupt::from_index(bit).ok())
    }
}
