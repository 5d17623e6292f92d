use std::error::Error as StdError;

#[derive(Debug)]
pub enum Error {
    UnsupportedCartridge {
        mbc_type: u8,
    },
    UnsupportedRamSize {
        code: u8,
    },
    RomTooSmall {
        len: usize,
    },
    IllegalOpcode {
        opcode: u8,
        pc: u16,
    },
    InvalidInterrupt(u8),
    InvalidKey(u8),
    InvalidSaveState {
        expected: usize,
        actual: usize,
    },
    SaveStateMismatch(String),
    NoCartridge,
    Halted(String),
    Io(std::io::Error),
    Message(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::UnsupportedCartridge { mbc_type } => {
                write!(f, "cartridge type {:#04x} is not supported", mbc_type)
            }
            Error::UnsupportedRamSize { code } => {
                write!(f, "ram size indicated by {:#04x} is not supported", code)
            }
            Error::RomTooSmall { len } => {
                write!(f, "rom image of {:#x} bytes is too small to hold a header", len)
            }
            Error::IllegalOpcode { opcode, pc } => {
                write!(f, "illegal opcode {:#04x} at {:#06x}", opcode, pc)
            }
            Error::InvalidInterrupt(index) => write!(f, "no interrupt with index {}", index),
            Error::InvalidKey(index) => write!(f, "no joypad key with index {}", index),
            Error::InvalidSaveState { expected, actual } => write!(
                f,
                "save state has the wrong length: expected {} bytes, got {}",
                expected, actual
            ),
            Error::SaveStateMismatch(msg) => write!(f, "save state mismatch: {}", msg),
            Error::NoCartridge => write!(f, "no cartridge inserted"),
            Error::Halted(msg) => write!(f, "emulation halted after fatal error: {}", msg),
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Message(msg) => write!(f, "{}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn from_message(msg: String) -> Self {
        Error::Message(msg)
    }

    /// Errors after which the running session can't continue.
    pub fn is_fatal_emulation_error(&self) -> bool {
        matches!(self, Error::IllegalOpcode { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<String> for Error {
    fn from(str: String) -> Self {
        Error::from_message(str)
    }
}
