use log::{debug, trace};
use strum_macros::AsRefStr;

use crate::cpu::register::Register;
use crate::cpu::Cpu;
use crate::error::Result;
use crate::memory::{MemoryBus, DIV};

/// 16-bit operands: the register pairs plus the stack pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WReg {
    AF,
    BC,
    DE,
    HL,
    SP,
}

impl WReg {
    fn get(self, cpu: &Cpu) -> u16 {
        match self {
            Self::AF => cpu.registers.get_af(),
            Self::BC => cpu.registers.get_bc(),
            Self::DE => cpu.registers.get_de(),
            Self::HL => cpu.registers.get_hl(),
            Self::SP => cpu.sp,
        }
    }

    fn set(self, cpu: &mut Cpu, value: u16) {
        match self {
            Self::AF => cpu.registers.set_af(value),
            Self::BC => cpu.registers.set_bc(value),
            Self::DE => cpu.registers.set_de(value),
            Self::HL => cpu.registers.set_hl(value),
            Self::SP => cpu.sp = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrArgByte {
    ImmediateByte(u8),
    AddressDirect(u16),
    AddressRegister(WReg),
    Register(Register),
    /// The byte at 0xff00 plus the register's value.
    Offset(Register),
}

impl InstrArgByte {
    fn get_u8(self, cpu: &Cpu, memory_bus: &MemoryBus) -> u8 {
        match self {
            Self::ImmediateByte(byte) => byte,
            Self::AddressDirect(address) => memory_bus.read_byte(address),
            Self::AddressRegister(wreg) => memory_bus.read_byte(wreg.get(cpu)),
            Self::Register(reg) => cpu.registers.get(reg) as u8,
            Self::Offset(reg) => memory_bus.read_byte(0xff00 | cpu.registers.get(reg)),
        }
    }

    fn set_u8(self, cpu: &mut Cpu, memory_bus: &mut MemoryBus, value: u8) {
        match self {
            Self::ImmediateByte(_) => unreachable!("immediate operands are never written"),
            Self::AddressDirect(address) => memory_bus.write_byte(address, value),
            Self::AddressRegister(wreg) => memory_bus.write_byte(wreg.get(cpu), value),
            Self::Register(reg) => cpu.registers.set(reg, value.into()),
            Self::Offset(reg) => memory_bus.write_byte(0xff00 | cpu.registers.get(reg), value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrArgWord {
    ImmediateWord(u16),
    AddressDirect(u16),
    WordRegister(WReg),
}

impl InstrArgWord {
    fn get_u16(self, cpu: &Cpu, memory_bus: &MemoryBus) -> u16 {
        match self {
            Self::ImmediateWord(word) => word,
            Self::AddressDirect(address) => memory_bus.read_word(address),
            Self::WordRegister(wreg) => wreg.get(cpu),
        }
    }

    fn set_u16(self, cpu: &mut Cpu, memory_bus: &mut MemoryBus, value: u16) {
        match self {
            Self::ImmediateWord(_) => unreachable!("immediate operands are never written"),
            Self::AddressDirect(address) => memory_bus.write_word(address, value),
            Self::WordRegister(wreg) => wreg.set(cpu, value),
        }
    }
}

type Bit = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    NZ,
    Z,
    NC,
    C,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum Instruction {
    /* LD */
    LD(InstrArgByte, InstrArgByte),
    LD_16(InstrArgWord, InstrArgWord),
    LDD_A_FROM_HL,
    LDD_A_INTO_HL,
    LDI_A_FROM_HL,
    LDI_A_INTO_HL,
    LDHL_SP(i8),

    PUSH(WReg),
    POP(WReg),

    /* 8-bit arithmetic */
    ADD(InstrArgByte),
    ADC(InstrArgByte),
    SUB(InstrArgByte),
    SBC(InstrArgByte),
    AND(InstrArgByte),
    OR(InstrArgByte),
    XOR(InstrArgByte),
    CP(InstrArgByte),
    INC(InstrArgByte),
    DEC(InstrArgByte),

    /* 16-bit arithmetic */
    ADD_HL(WReg),
    ADD_SP(i8),
    INC_WORD(WReg),
    DEC_WORD(WReg),

    /* Miscellaneous */
    SWAP(InstrArgByte),
    DAA,
    CPL,
    CCF,
    SCF,
    NOP,
    HALT,
    STOP,
    DI,
    EI,

    /* Rotates & shifts */
    RLCA,
    RLA,
    RRCA,
    RRA,
    RLC(InstrArgByte),
    RL(InstrArgByte),
    RRC(InstrArgByte),
    RR(InstrArgByte),
    SLA(InstrArgByte),
    SRA(InstrArgByte),
    SRL(InstrArgByte),

    /* Bit operations */
    BIT(Bit, InstrArgByte),
    SET(Bit, InstrArgByte),
    RES(Bit, InstrArgByte),

    /* Jumps, calls and returns */
    JP(u16),
    JP_CONDITION(Flag, u16),
    JP_HL,
    JR(i8),
    JR_CONDITION(Flag, i8),
    CALL(u16),
    CALL_CONDITION(Flag, u16),
    RST(u16),
    RET,
    RET_CONDITION(Flag),
    RETI,
}

pub enum BranchStatus {
    Branch,
    NoBranch,
}

/// Operands selected by the three register bits of an opcode.
const R_TABLE: [InstrArgByte; 8] = [
    InstrArgByte::Register(Register::B),
    InstrArgByte::Register(Register::C),
    InstrArgByte::Register(Register::D),
    InstrArgByte::Register(Register::E),
    InstrArgByte::Register(Register::H),
    InstrArgByte::Register(Register::L),
    InstrArgByte::AddressRegister(WReg::HL),
    InstrArgByte::Register(Register::A),
];
const RP_TABLE: [WReg; 4] = [WReg::BC, WReg::DE, WReg::HL, WReg::SP];
/// Register pairs used by PUSH and POP.
const RP2_TABLE: [WReg; 4] = [WReg::BC, WReg::DE, WReg::HL, WReg::AF];
const CONDITIONS: [Flag; 4] = [Flag::NZ, Flag::Z, Flag::NC, Flag::C];

fn r(index: u8) -> InstrArgByte {
    R_TABLE[usize::from(index & 0x7)]
}

/// M-cycles per opcode when no conditional branch is taken. Illegal opcodes and the CB prefix
/// are 0.
#[rustfmt::skip]
const OPCODE_CYCLES: [u8; 256] = [
//  0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f
    1, 3, 2, 2, 1, 1, 2, 1, 5, 2, 2, 2, 1, 1, 2, 1, // 0x00
    1, 3, 2, 2, 1, 1, 2, 1, 3, 2, 2, 2, 1, 1, 2, 1, // 0x10
    2, 3, 2, 2, 1, 1, 2, 1, 2, 2, 2, 2, 1, 1, 2, 1, // 0x20
    2, 3, 2, 2, 3, 3, 3, 1, 2, 2, 2, 2, 1, 1, 2, 1, // 0x30
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0x40
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0x50
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0x60
    2, 2, 2, 2, 2, 2, 1, 2, 1, 1, 1, 1, 1, 1, 2, 1, // 0x70
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0x80
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0x90
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0xa0
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 0xb0
    2, 3, 3, 4, 3, 4, 2, 4, 2, 4, 3, 0, 3, 6, 2, 4, // 0xc0
    2, 3, 3, 0, 3, 4, 2, 4, 2, 4, 3, 0, 3, 0, 2, 4, // 0xd0
    3, 3, 2, 0, 0, 4, 2, 4, 4, 1, 4, 0, 0, 0, 2, 4, // 0xe0
    3, 3, 2, 1, 0, 4, 2, 4, 3, 2, 4, 1, 0, 0, 2, 4, // 0xf0
];

/// M-cycles for conditional jumps, calls and returns when the condition holds.
fn get_branched_opcode_delay(opcode: u8) -> u8 {
    match opcode {
        0x20 | 0x28 | 0x30 | 0x38 => 3,
        0xc0 | 0xc8 | 0xd0 | 0xd8 => 5,
        0xc2 | 0xca | 0xd2 | 0xda => 4,
        0xc4 | 0xcc | 0xd4 | 0xdc => 6,
        _ => OPCODE_CYCLES[usize::from(opcode)],
    }
}

/// M-cycles for a CB-prefixed opcode, including the prefix.
fn get_cb_opcode_delay(opcode: u8) -> u8 {
    match (opcode >> 6, opcode & 0x7) {
        (1, 6) => 3,
        (_, 6) => 4,
        _ => 2,
    }
}

fn alu(operation: u8, operand: InstrArgByte) -> Instruction {
    match operation {
        0 => Instruction::ADD(operand),
        1 => Instruction::ADC(operand),
        2 => Instruction::SUB(operand),
        3 => Instruction::SBC(operand),
        4 => Instruction::AND(operand),
        5 => Instruction::XOR(operand),
        6 => Instruction::OR(operand),
        _ => Instruction::CP(operand),
    }
}

impl Cpu {
    fn test_flag(&self, flag: Flag) -> bool {
        match flag {
            Flag::NZ => !self.registers.f.zero,
            Flag::Z => self.registers.f.zero,
            Flag::NC => !self.registers.f.carry,
            Flag::C => self.registers.f.carry,
        }
    }

    /// Reads the operands of `opcode` from PC and builds the instruction.
    pub fn decode_regular_opcode(
        &mut self,
        memory_bus: &mut MemoryBus,
        opcode: u8,
    ) -> Result<Instruction> {
        use InstrArgByte::{AddressDirect, AddressRegister, ImmediateByte, Offset};
        use InstrArgWord::{ImmediateWord, WordRegister};
        use Instruction::*;

        let x = opcode >> 6;
        let y = (opcode >> 3) & 0x7;
        let z = opcode & 0x7;
        let p = usize::from(y >> 1);
        let q = y & 1;
        let a = InstrArgByte::Register(Register::A);

        let instruction = match (x, z) {
            (0, 0) => match y {
                0 => NOP,
                1 => LD_16(
                    InstrArgWord::AddressDirect(self.get_word_from_pc(memory_bus)),
                    WordRegister(WReg::SP),
                ),
                2 => {
                    // STOP is followed by a padding byte
                    self.get_byte_from_pc(memory_bus);
                    STOP
                }
                3 => JR(self.get_signed_byte_from_pc(memory_bus)),
                _ => JR_CONDITION(
                    CONDITIONS[usize::from(y - 4)],
                    self.get_signed_byte_from_pc(memory_bus),
                ),
            },
            (0, 1) if q == 0 => LD_16(
                WordRegister(RP_TABLE[p]),
                ImmediateWord(self.get_word_from_pc(memory_bus)),
            ),
            (0, 1) => ADD_HL(RP_TABLE[p]),
            (0, 2) => match (q, p) {
                (0, 0) => LD(AddressRegister(WReg::BC), a),
                (0, 1) => LD(AddressRegister(WReg::DE), a),
                (0, 2) => LDI_A_INTO_HL,
                (0, _) => LDD_A_INTO_HL,
                (_, 0) => LD(a, AddressRegister(WReg::BC)),
                (_, 1) => LD(a, AddressRegister(WReg::DE)),
                (_, 2) => LDI_A_FROM_HL,
                _ => LDD_A_FROM_HL,
            },
            (0, 3) if q == 0 => INC_WORD(RP_TABLE[p]),
            (0, 3) => DEC_WORD(RP_TABLE[p]),
            (0, 4) => INC(r(y)),
            (0, 5) => DEC(r(y)),
            (0, 6) => LD(r(y), ImmediateByte(self.get_byte_from_pc(memory_bus))),
            (0, _) => match y {
                0 => RLCA,
                1 => RRCA,
                2 => RLA,
                3 => RRA,
                4 => DAA,
                5 => CPL,
                6 => SCF,
                _ => CCF,
            },
            (1, 6) if y == 6 => HALT,
            (1, _) => LD(r(y), r(z)),
            (2, _) => alu(y, r(z)),
            (3, 0) => match y {
                0..=3 => RET_CONDITION(CONDITIONS[usize::from(y)]),
                4 => LD(
                    AddressDirect(0xff00 | u16::from(self.get_byte_from_pc(memory_bus))),
                    a,
                ),
                5 => ADD_SP(self.get_signed_byte_from_pc(memory_bus)),
                6 => LD(
                    a,
                    AddressDirect(0xff00 | u16::from(self.get_byte_from_pc(memory_bus))),
                ),
                _ => LDHL_SP(self.get_signed_byte_from_pc(memory_bus)),
            },
            (3, 1) => match (q, p) {
                (0, _) => POP(RP2_TABLE[p]),
                (_, 0) => RET,
                (_, 1) => RETI,
                (_, 2) => JP_HL,
                _ => LD_16(WordRegister(WReg::SP), WordRegister(WReg::HL)),
            },
            (3, 2) => match y {
                0..=3 => JP_CONDITION(
                    CONDITIONS[usize::from(y)],
                    self.get_word_from_pc(memory_bus),
                ),
                4 => LD(Offset(Register::C), a),
                5 => LD(AddressDirect(self.get_word_from_pc(memory_bus)), a),
                6 => LD(a, Offset(Register::C)),
                _ => LD(a, AddressDirect(self.get_word_from_pc(memory_bus))),
            },
            (3, 3) if y == 0 => JP(self.get_word_from_pc(memory_bus)),
            (3, 3) if y == 6 => DI,
            (3, 3) if y == 7 => EI,
            (3, 4) if y < 4 => CALL_CONDITION(
                CONDITIONS[usize::from(y)],
                self.get_word_from_pc(memory_bus),
            ),
            (3, 5) if q == 0 => PUSH(RP2_TABLE[p]),
            (3, 5) if p == 0 => CALL(self.get_word_from_pc(memory_bus)),
            (3, 6) => alu(y, ImmediateByte(self.get_byte_from_pc(memory_bus))),
            (3, 7) => RST(u16::from(y) * 8),
            _ => return Err(self.illegal_opcode(opcode)),
        };

        Ok(instruction)
    }

    pub fn decode_cb_opcode(opcode: u8) -> Instruction {
        let y = (opcode >> 3) & 0x7;
        let target = r(opcode);
        match opcode >> 6 {
            0 => match y {
                0 => Instruction::RLC(target),
                1 => Instruction::RRC(target),
                2 => Instruction::RL(target),
                3 => Instruction::RR(target),
                4 => Instruction::SLA(target),
                5 => Instruction::SRA(target),
                6 => Instruction::SWAP(target),
                _ => Instruction::SRL(target),
            },
            1 => Instruction::BIT(y, target),
            2 => Instruction::RES(y, target),
            _ => Instruction::SET(y, target),
        }
    }

    /// Executes an opcode other than the CB prefix and returns the M-cycles it took.
    pub fn execute_regular_opcode(&mut self, memory_bus: &mut MemoryBus, opcode: u8) -> Result<u8> {
        let instruction = self.decode_regular_opcode(memory_bus, opcode)?;
        trace!("{:#04x} {}", opcode, instruction.as_ref());

        let cycles = match self.execute_instruction(memory_bus, instruction) {
            BranchStatus::Branch => get_branched_opcode_delay(opcode),
            BranchStatus::NoBranch => OPCODE_CYCLES[usize::from(opcode)],
        };
        Ok(cycles)
    }

    /// Executes the opcode following a CB prefix and returns the M-cycles both bytes took.
    pub fn execute_cb_opcode(&mut self, memory_bus: &mut MemoryBus, opcode: u8) -> u8 {
        let instruction = Self::decode_cb_opcode(opcode);
        trace!("0xcb {:#04x} {}", opcode, instruction.as_ref());
        self.execute_instruction(memory_bus, instruction);
        get_cb_opcode_delay(opcode)
    }

    /// A + value (+ carry) into A.
    fn add_to_a(&mut self, value: u8, carry_in: bool) {
        let a = self.registers.a;
        let carry = u8::from(carry_in);
        let sum = u16::from(a) + u16::from(value) + u16::from(carry);
        let result = sum as u8;
        self.registers.a = result;

        self.registers.f.zero = result == 0;
        self.registers.f.subtract = false;
        self.registers.f.half_carry = (a & 0xf) + (value & 0xf) + carry > 0xf;
        self.registers.f.carry = sum > 0xff;
    }

    /// A - value (- carry). Sets the flags but leaves storing the result to the caller so CP
    /// can share it.
    fn subtract_from_a(&mut self, value: u8, carry_in: bool) -> u8 {
        let a = self.registers.a;
        let carry = u8::from(carry_in);
        let result = a.wrapping_sub(value).wrapping_sub(carry);

        self.registers.f.zero = result == 0;
        self.registers.f.subtract = true;
        self.registers.f.half_carry = (a & 0xf) < (value & 0xf) + carry;
        self.registers.f.carry = u16::from(a) < u16::from(value) + u16::from(carry);
        result
    }

    fn set_logic_flags(&mut self, half_carry: bool) {
        self.registers.f.zero = self.registers.a == 0;
        self.registers.f.subtract = false;
        self.registers.f.half_carry = half_carry;
        self.registers.f.carry = false;
    }

    /// SP plus a signed offset, with the flags of ADD SP,e and LD HL,SP+e. The carries come
    /// from the low byte as an unsigned addition.
    fn offset_sp(&mut self, offset: i8) -> u16 {
        let sp = self.sp;
        let operand = offset as u8;

        self.registers.f.zero = false;
        self.registers.f.subtract = false;
        self.registers.f.half_carry = (sp & 0xf) + u16::from(operand & 0xf) > 0xf;
        self.registers.f.carry = (sp & 0xff) + u16::from(operand) > 0xff;
        sp.wrapping_add(offset as i16 as u16)
    }

    /// Applies a rotate or shift to `target`. `operation` gets the value and the carry flag
    /// and returns the result and the new carry.
    fn shift_op<F>(&mut self, memory_bus: &mut MemoryBus, target: InstrArgByte, operation: F)
    where
        F: Fn(u8, bool) -> (u8, bool),
    {
        let value = target.get_u8(self, memory_bus);
        let (result, carry) = operation(value, self.registers.f.carry);
        target.set_u8(self, memory_bus, result);

        self.registers.f.zero = result == 0;
        self.registers.f.subtract = false;
        self.registers.f.half_carry = false;
        self.registers.f.carry = carry;
    }

    fn jump_relative(&mut self, offset: i8) {
        self.pc = self.pc.wrapping_add(offset as i16 as u16);
    }

    fn call(&mut self, memory_bus: &mut MemoryBus, address: u16) {
        self.push_word(memory_bus, self.pc);
        self.pc = address;
    }

    pub fn execute_instruction(
        &mut self,
        memory_bus: &mut MemoryBus,
        instruction: Instruction,
    ) -> BranchStatus {
        match instruction {
            /* LD */
            Instruction::LD(target, source) => {
                let value = source.get_u8(self, memory_bus);
                target.set_u8(self, memory_bus, value);
            }
            Instruction::LD_16(target, source) => {
                let value = source.get_u16(self, memory_bus);
                target.set_u16(self, memory_bus, value);
            }
            Instruction::LDD_A_FROM_HL => {
                let hl = self.registers.get_hl();
                self.registers.a = memory_bus.read_byte(hl);
                self.registers.set_hl(hl.wrapping_sub(1));
            }
            Instruction::LDD_A_INTO_HL => {
                let hl = self.registers.get_hl();
                memory_bus.write_byte(hl, self.registers.a);
                self.registers.set_hl(hl.wrapping_sub(1));
            }
            Instruction::LDI_A_FROM_HL => {
                let hl = self.registers.get_hl();
                self.registers.a = memory_bus.read_byte(hl);
                self.registers.set_hl(hl.wrapping_add(1));
            }
            Instruction::LDI_A_INTO_HL => {
                let hl = self.registers.get_hl();
                memory_bus.write_byte(hl, self.registers.a);
                self.registers.set_hl(hl.wrapping_add(1));
            }
            Instruction::LDHL_SP(offset) => {
                let value = self.offset_sp(offset);
                self.registers.set_hl(value);
            }
            Instruction::PUSH(wreg) => {
                let value = wreg.get(self);
                self.push_word(memory_bus, value);
            }
            Instruction::POP(wreg) => {
                let value = self.pop_word(memory_bus);
                wreg.set(self, value);
            }

            /* 8-bit arithmetic */
            Instruction::ADD(source) => {
                let value = source.get_u8(self, memory_bus);
                self.add_to_a(value, false);
            }
            Instruction::ADC(source) => {
                let value = source.get_u8(self, memory_bus);
                self.add_to_a(value, self.registers.f.carry);
            }
            Instruction::SUB(source) => {
                let value = source.get_u8(self, memory_bus);
                self.registers.a = self.subtract_from_a(value, false);
            }
            Instruction::SBC(source) => {
                let value = source.get_u8(self, memory_bus);
                self.registers.a = self.subtract_from_a(value, self.registers.f.carry);
            }
            Instruction::AND(source) => {
                let value = source.get_u8(self, memory_bus);
                self.registers.a &= value;
                self.set_logic_flags(true);
            }
            Instruction::OR(source) => {
                let value = source.get_u8(self, memory_bus);
                self.registers.a |= value;
                self.set_logic_flags(false);
            }
            Instruction::XOR(source) => {
                let value = source.get_u8(self, memory_bus);
                self.registers.a ^= value;
                self.set_logic_flags(false);
            }
            Instruction::CP(source) => {
                let value = source.get_u8(self, memory_bus);
                self.subtract_from_a(value, false);
            }
            Instruction::INC(target) => {
                let value = target.get_u8(self, memory_bus);
                let incremented_value = value.wrapping_add(1);
                target.set_u8(self, memory_bus, incremented_value);

                self.registers.f.zero = incremented_value == 0;
                self.registers.f.subtract = false;
                self.registers.f.half_carry = value & 0xf == 0xf;
            }
            Instruction::DEC(target) => {
                let value = target.get_u8(self, memory_bus);
                let decremented_value = value.wrapping_sub(1);
                target.set_u8(self, memory_bus, decremented_value);

                self.registers.f.zero = decremented_value == 0;
                self.registers.f.subtract = true;
                self.registers.f.half_carry = value & 0xf == 0;
            }

            /* 16-bit arithmetic */
            Instruction::ADD_HL(source) => {
                let hl = self.registers.get_hl();
                let value = source.get(self);
                let (result, carry) = hl.overflowing_add(value);
                self.registers.set_hl(result);

                self.registers.f.subtract = false;
                self.registers.f.half_carry = (hl & 0xfff) + (value & 0xfff) > 0xfff;
                self.registers.f.carry = carry;
            }
            Instruction::ADD_SP(offset) => self.sp = self.offset_sp(offset),
            Instruction::INC_WORD(wreg) => {
                let value = wreg.get(self).wrapping_add(1);
                wreg.set(self, value);
            }
            Instruction::DEC_WORD(wreg) => {
                let value = wreg.get(self).wrapping_sub(1);
                wreg.set(self, value);
            }

            /* Miscellaneous */
            Instruction::SWAP(target) => {
                self.shift_op(memory_bus, target, |value, _| (value.rotate_left(4), false))
            }
            Instruction::DAA => {
                if !self.registers.f.subtract {
                    // After an addition, adjust if (half-)carry occured or result is out of
                    // bounds.
                    if self.registers.f.carry || self.registers.a > 0x99 {
                        self.registers.a = self.registers.a.wrapping_add(0x60);
                        self.registers.f.carry = true;
                    }
                    if self.registers.f.half_carry || (self.registers.a & 0x0f) > 0x09 {
                        self.registers.a = self.registers.a.wrapping_add(0x06);
                    }
                } else {
                    // After a subtraction, only adjust if (half-)carry occured.
                    if self.registers.f.carry {
                        self.registers.a = self.registers.a.wrapping_sub(0x60);
                    }
                    if self.registers.f.half_carry {
                        self.registers.a = self.registers.a.wrapping_sub(0x06);
                    }
                }

                self.registers.f.zero = self.registers.a == 0;
                self.registers.f.half_carry = false;
            }
            Instruction::CPL => {
                self.registers.a = !self.registers.a;

                self.registers.f.subtract = true;
                self.registers.f.half_carry = true;
            }
            Instruction::CCF => {
                self.registers.f.subtract = false;
                self.registers.f.half_carry = false;
                self.registers.f.carry = !self.registers.f.carry;
            }
            Instruction::SCF => {
                self.registers.f.subtract = false;
                self.registers.f.half_carry = false;
                self.registers.f.carry = true;
            }
            Instruction::NOP => {}
            Instruction::HALT => {
                if !self.interrupt_enabled && memory_bus.pending_interrupts() != 0 {
                    // The CPU doesn't halt, and fails to advance PC past the next byte
                    debug!("halt bug at {:#06x}", self.pc);
                    self.halt_bug_on_next_opcode = true;
                } else {
                    debug!("halting");
                    self.halted = true;
                }
            }
            Instruction::STOP => {
                debug!("stopping until a button is pressed");
                self.stopped = true;
                memory_bus.write_byte(DIV, 0);
            }
            Instruction::DI => {
                self.interrupt_enabled = false;
                self.ei_pending = false;
            }
            Instruction::EI => self.ei_pending = true,

            /* Rotates & shifts */
            Instruction::RLCA => {
                self.shift_op(memory_bus, R_TABLE[7], |value, _| {
                    (value.rotate_left(1), value & 0x80 != 0)
                });
                self.registers.f.zero = false;
            }
            Instruction::RLA => {
                self.shift_op(memory_bus, R_TABLE[7], |value, carry| {
                    (value << 1 | u8::from(carry), value & 0x80 != 0)
                });
                self.registers.f.zero = false;
            }
            Instruction::RRCA => {
                self.shift_op(memory_bus, R_TABLE[7], |value, _| {
                    (value.rotate_right(1), value & 1 != 0)
                });
                self.registers.f.zero = false;
            }
            Instruction::RRA => {
                self.shift_op(memory_bus, R_TABLE[7], |value, carry| {
                    (value >> 1 | u8::from(carry) << 7, value & 1 != 0)
                });
                self.registers.f.zero = false;
            }
            Instruction::RLC(target) => self.shift_op(memory_bus, target, |value, _| {
                (value.rotate_left(1), value & 0x80 != 0)
            }),
            Instruction::RL(target) => self.shift_op(memory_bus, target, |value, carry| {
                (value << 1 | u8::from(carry), value & 0x80 != 0)
            }),
            Instruction::RRC(target) => self.shift_op(memory_bus, target, |value, _| {
                (value.rotate_right(1), value & 1 != 0)
            }),
            Instruction::RR(target) => self.shift_op(memory_bus, target, |value, carry| {
                (value >> 1 | u8::from(carry) << 7, value & 1 != 0)
            }),
            Instruction::SLA(target) => self.shift_op(memory_bus, target, |value, _| {
                (value << 1, value & 0x80 != 0)
            }),
            // bit 7 keeps its value
            Instruction::SRA(target) => self.shift_op(memory_bus, target, |value, _| {
                (value >> 1 | value & 0x80, value & 1 != 0)
            }),
            Instruction::SRL(target) => {
                self.shift_op(memory_bus, target, |value, _| (value >> 1, value & 1 != 0))
            }

            /* Bit operations */
            Instruction::BIT(bit, target) => {
                let value = target.get_u8(self, memory_bus);
                self.registers.f.zero = value & (1 << bit) == 0;
                self.registers.f.subtract = false;
                self.registers.f.half_carry = true;
            }
            Instruction::SET(bit, target) => {
                let value = target.get_u8(self, memory_bus);
                target.set_u8(self, memory_bus, value | (1 << bit));
            }
            Instruction::RES(bit, target) => {
                let value = target.get_u8(self, memory_bus);
                target.set_u8(self, memory_bus, value & !(1 << bit));
            }

            /* Jumps, calls and returns */
            Instruction::JP(address) => self.pc = address,
            Instruction::JP_CONDITION(flag, address) => {
                if self.test_flag(flag) {
                    self.pc = address;
                    return BranchStatus::Branch;
                }
            }
            Instruction::JP_HL => self.pc = self.registers.get_hl(),
            Instruction::JR(offset) => self.jump_relative(offset),
            Instruction::JR_CONDITION(flag, offset) => {
                if self.test_flag(flag) {
                    self.jump_relative(offset);
                    return BranchStatus::Branch;
                }
            }
            Instruction::CALL(address) => self.call(memory_bus, address),
            Instruction::CALL_CONDITION(flag, address) => {
                if self.test_flag(flag) {
                    self.call(memory_bus, address);
                    return BranchStatus::Branch;
                }
            }
            Instruction::RST(address) => self.call(memory_bus, address),
            Instruction::RET => self.pc = self.pop_word(memory_bus),
            Instruction::RET_CONDITION(flag) => {
                if self.test_flag(flag) {
                    self.pc = self.pop_word(memory_bus);
                    return BranchStatus::Branch;
                }
            }
            Instruction::RETI => {
                self.pc = self.pop_word(memory_bus);
                self.interrupt_enabled = true;
            }
        }

        BranchStatus::NoBranch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_legal_opcode_has_a_cycle_count() {
        const ILLEGAL: [u8; 11] = [
            0xd3, 0xdb, 0xdd, 0xe3, 0xe4, 0xeb, 0xec, 0xed, 0xf4, 0xfc, 0xfd,
        ];
        for opcode in 0..=0xffu8 {
            let cycles = OPCODE_CYCLES[usize::from(opcode)];
            if ILLEGAL.contains(&opcode) || opcode == 0xcb {
                assert_eq!(0, cycles, "opcode {:#04x}", opcode);
            } else {
                assert!((1..=6).contains(&cycles), "opcode {:#04x}", opcode);
            }
        }
    }

    #[test]
    fn branches_cost_more_when_taken() {
        for opcode in [0x20, 0x28, 0x30, 0x38, 0xc0, 0xc2, 0xc4, 0xd8, 0xda, 0xdc] {
            assert!(get_branched_opcode_delay(opcode) > OPCODE_CYCLES[usize::from(opcode)]);
        }
    }

    #[test]
    fn cb_decode_covers_targets() {
        assert_eq!(
            Instruction::RLC(InstrArgByte::Register(Register::B)),
            Cpu::decode_cb_opcode(0x00)
        );
        assert_eq!(
            Instruction::SWAP(InstrArgByte::Register(Register::A)),
            Cpu::decode_cb_opcode(0x37)
        );
        assert_eq!(
            Instruction::BIT(7, InstrArgByte::AddressRegister(WReg::HL)),
            Cpu::decode_cb_opcode(0x7e)
        );
        assert_eq!(
            Instruction::SET(0, InstrArgByte::Register(Register::C)),
            Cpu::decode_cb_opcode(0xc1)
        );
        assert_eq!(4, get_cb_opcode_delay(0x06));
        assert_eq!(3, get_cb_opcode_delay(0x46));
        assert_eq!(2, get_cb_opcode_delay(0xff));
    }

    #[test]
    fn register_operands_round_trip_through_the_table() {
        let mut cpu = Cpu::new();
        let mut bus = MemoryBus::new();
        for reg in Register::iter().filter(|reg| !reg.is_pair() && *reg != Register::F) {
            let operand = InstrArgByte::Register(reg);
            operand.set_u8(&mut cpu, &mut bus, 0x5a);
            assert_eq!(0x5a, operand.get_u8(&cpu, &bus));
        }
        cpu.registers.set_hl(0xc000);
        r(6).set_u8(&mut cpu, &mut bus, 0x77);
        assert_eq!(0x77, bus.read_byte(0xc000));
    }

    #[test]
    fn alu_flags() {
        let mut cpu = Cpu::new();

        cpu.registers.a = 0x3a;
        cpu.add_to_a(0xc6, false);
        assert_eq!(0x00, cpu.registers.a);
        assert_eq!(0b1011_0000, u8::from(cpu.registers.f));

        cpu.registers.a = 0x3e;
        let result = cpu.subtract_from_a(0x0f, false);
        assert_eq!(0x2f, result);
        assert_eq!(0b0110_0000, u8::from(cpu.registers.f));

        cpu.registers.a = 0x3b;
        cpu.registers.f.carry = true;
        let result = cpu.subtract_from_a(0x4f, true);
        assert_eq!(0xeb, result);
        assert_eq!(0b0111_0000, u8::from(cpu.registers.f));
    }

    #[test]
    fn sp_offset_flags_use_low_byte() {
        let mut cpu = Cpu::new();
        cpu.sp = 0xfff8;
        assert_eq!(0xfffa, cpu.offset_sp(2));
        assert!(!cpu.registers.f.half_carry && !cpu.registers.f.carry);

        cpu.sp = 0x00ff;
        assert_eq!(0x00fe, cpu.offset_sp(-1));
        assert!(cpu.registers.f.half_carry && cpu.registers.f.carry);
    }
}
