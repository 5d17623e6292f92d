use strum_macros::{AsRefStr, EnumIter};

/// Every register the register file exposes, both the eight 8-bit registers and the four 16-bit
/// pairs built from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
pub enum Register {
    A,
    B,
    C,
    D,
    E,
    F,
    H,
    L,
    AF,
    BC,
    DE,
    HL,
}

impl Register {
    pub fn is_pair(&self) -> bool {
        matches!(self, Self::AF | Self::BC | Self::DE | Self::HL)
    }
}

/// The eight 8-bit CPU registers. Does not include the 16-bit SP and PC registers.
/// Some registers can be paired up and treated as 16-bit registers.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: FlagRegister,
    pub h: u8,
    pub l: u8,
}

/// Generates the getter and setter for a joint register.
macro_rules! joint_register {
    ($get:ident, $set:ident, $first:ident, $second:ident) => {
        #[doc = concat!("Gets the joint register ", stringify!($first), stringify!($second), ".")]
        pub fn $get(&self) -> u16 {
            (u8::from(self.$first) as u16) << 8 | (u8::from(self.$second) as u16)
        }

        #[doc = concat!("Sets the joint register ", stringify!($first), stringify!($second), ".")]
        pub fn $set(&mut self, value: u16) {
            let [high, low] = value.to_be_bytes();
            self.$first = high.into();
            self.$second = low.into();
        }
    };
}

impl Registers {
    joint_register!(get_af, set_af, a, f);
    joint_register!(get_bc, set_bc, b, c);
    joint_register!(get_de, set_de, d, e);
    joint_register!(get_hl, set_hl, h, l);

    /// Reads any register. 8-bit registers are zero-extended.
    pub fn get(&self, reg: Register) -> u16 {
        match reg {
            Register::A => self.a.into(),
            Register::B => self.b.into(),
            Register::C => self.c.into(),
            Register::D => self.d.into(),
            Register::E => self.e.into(),
            Register::F => u8::from(self.f).into(),
            Register::H => self.h.into(),
            Register::L => self.l.into(),
            Register::AF => self.get_af(),
            Register::BC => self.get_bc(),
            Register::DE => self.get_de(),
            Register::HL => self.get_hl(),
        }
    }

    /// Writes any register, masking `value` to the register's width. F keeps its low nibble
    /// clear.
    pub fn set(&mut self, reg: Register, value: u16) {
        let byte = (value & 0xff) as u8;
        match reg {
            Register::A => self.a = byte,
            Register::B => self.b = byte,
            Register::C => self.c = byte,
            Register::D => self.d = byte,
            Register::E => self.e = byte,
            Register::F => self.f = byte.into(),
            Register::H => self.h = byte,
            Register::L => self.l = byte,
            Register::AF => self.set_af(value),
            Register::BC => self.set_bc(value),
            Register::DE => self.set_de(value),
            Register::HL => self.set_hl(value),
        }
    }
}

/// The flag register has meanings assigned to its bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlagRegister {
    /// This bit is set when the result of a math op is zero or two values match when using the CP
    /// instruction.
    pub zero: bool,

    /// This bit is set if a subtraction was performed in the last math operation.
    pub subtract: bool,

    /// This bit is set if a carry occurred from the lower nibble in the last math operation.
    pub half_carry: bool,

    /// This bit is set if a carry occurred from the last math operation or if register A is the
    /// smaller value when executing the CP instruction.
    pub carry: bool,
}

const ZERO_FLAG_BYTE_POSITION: u8 = 7;
const SUBTRACT_FLAG_BYTE_POSITION: u8 = 6;
const HALF_CARRY_FLAG_BYTE_POSITION: u8 = 5;
const CARRY_FLAG_BYTE_POSITION: u8 = 4;

impl From<FlagRegister> for u8 {
    fn from(flag: FlagRegister) -> u8 {
        u8::from(flag.zero) << ZERO_FLAG_BYTE_POSITION
            | u8::from(flag.subtract) << SUBTRACT_FLAG_BYTE_POSITION
            | u8::from(flag.half_carry) << HALF_CARRY_FLAG_BYTE_POSITION
            | u8::from(flag.carry) << CARRY_FLAG_BYTE_POSITION
    }
}

impl From<u8> for FlagRegister {
    fn from(byte: u8) -> Self {
        let bit = |position: u8| (byte >> position) & 0b1 == 1;
        Self {
            zero: bit(ZERO_FLAG_BYTE_POSITION),
            subtract: bit(SUBTRACT_FLAG_BYTE_POSITION),
            half_carry: bit(HALF_CARRY_FLAG_BYTE_POSITION),
            carry: bit(CARRY_FLAG_BYTE_POSITION),
        }
    }
}
