use std::collections::VecDeque;

use log::{debug, error};

use crate::component::{check_state_len, ElapsedTime, SaveState, StateReader, Steppable};
use crate::cpu::register::*;
use crate::error::{Error, Result};
use crate::interrupt::Interrupt;
use crate::memory::{MemoryBus, IF};

/// T-cycles spent dispatching an interrupt (5 M-cycles).
const INTERRUPT_SERVICE_CYCLES: ElapsedTime = 20;
/// T-cycles reported while halted or stopped.
const IDLE_CYCLES: ElapsedTime = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cpu {
    pub registers: Registers,
    pub sp: u16,
    pub pc: u16,
    /// IME
    pub(crate) interrupt_enabled: bool,
    /// Set by EI. IME turns on once the instruction after EI completes.
    pub(crate) ei_pending: bool,
    pub(crate) halted: bool,
    pub(crate) stopped: bool,
    pub(crate) halt_bug_on_next_opcode: bool,
    pub(crate) opcode_queue: VecDeque<u8>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Cpu {
        Self::post_boot(false)
    }

    /// A CPU in the state the boot ROM leaves it in. Color hardware reports itself through A.
    pub fn post_boot(cgb: bool) -> Cpu {
        let mut cpu = Cpu {
            registers: Registers::default(),
            sp: 0,
            pc: 0,
            interrupt_enabled: false,
            ei_pending: false,
            halted: false,
            stopped: false,
            halt_bug_on_next_opcode: false,
            opcode_queue: VecDeque::new(),
        };
        cpu.emulate_bootrom(cgb);
        cpu
    }

    /// Initialize the CPU's registers to post-bootrom values
    fn emulate_bootrom(&mut self, cgb: bool) {
        self.pc = 0x100;
        self.registers.set_af(if cgb { 0x1180 } else { 0x01b0 });
        self.registers.set_bc(0x0013);
        self.registers.set_de(0x00d8);
        self.registers.set_hl(0x014d);
        self.sp = 0xfffe;
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupt_enabled
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Requests interrupt `interrupt_index` (0 = V-Blank ..= 4 = Joypad) by setting its IF bit.
    pub fn request_interrupt(
        &mut self,
        memory_bus: &mut MemoryBus,
        interrupt_index: u8,
    ) -> Result<()> {
        let interrupt = Interrupt::from_index(interrupt_index)?;
        memory_bus.request_interrupt(interrupt);
        Ok(())
    }

    fn service_interrupt(
        &mut self,
        memory_bus: &mut MemoryBus,
        interrupt: Interrupt,
    ) -> ElapsedTime {
        debug!("handling interrupt: {}", interrupt.as_ref());
        memory_bus.clear_interrupt(interrupt);
        self.interrupt_enabled = false;
        self.ei_pending = false;
        self.push_word(memory_bus, self.pc);
        self.pc = interrupt.vector();
        INTERRUPT_SERVICE_CYCLES
    }

    pub(crate) fn illegal_opcode(&self, opcode: u8) -> Error {
        let pc = self.pc.wrapping_sub(1);
        error!("illegal opcode {:#04x} at {:#06x}", opcode, pc);
        Error::IllegalOpcode { opcode, pc }
    }

    /// Services a pending interrupt or runs one instruction, returning the T-cycles taken.
    pub fn execute_next(&mut self, memory_bus: &mut MemoryBus) -> Result<ElapsedTime> {
        if self.stopped {
            if memory_bus.read_byte(IF) & Interrupt::Joypad.mask() == 0 {
                return Ok(IDLE_CYCLES);
            }
            debug!("leaving stop mode");
            self.stopped = false;
        }

        let pending = memory_bus.pending_interrupts();
        if pending != 0 {
            if self.halted {
                debug!("unhalting");
                self.halted = false;
            }
            if self.interrupt_enabled {
                if let Some(interrupt) = Interrupt::highest_priority(pending) {
                    return Ok(self.service_interrupt(memory_bus, interrupt));
                }
            }
        }

        if self.halted {
            return Ok(IDLE_CYCLES);
        }

        let enable_interrupts = self.ei_pending;
        let opcode = self.get_byte_from_pc(memory_bus);
        let cycles = if opcode == 0xcb {
            let opcode = self.get_byte_from_pc(memory_bus);
            self.execute_cb_opcode(memory_bus, opcode)
        } else {
            self.execute_regular_opcode(memory_bus, opcode)?
        };

        // DI in between cancels the pending enable
        if enable_interrupts && self.ei_pending {
            self.ei_pending = false;
            self.interrupt_enabled = true;
        }

        // convert from M-cycles to T-cycles
        Ok(ElapsedTime::from(cycles) * 4)
    }

    pub fn get_byte_from_pc(&mut self, memory_bus: &MemoryBus) -> u8 {
        match self.opcode_queue.pop_front() {
            Some(opcode) => opcode,
            None => {
                let byte = memory_bus.read_byte(self.pc);
                if self.halt_bug_on_next_opcode {
                    self.opcode_queue.push_back(byte);
                    self.halt_bug_on_next_opcode = false;
                }
                self.pc = self.pc.wrapping_add(1);
                byte
            }
        }
    }

    pub fn get_signed_byte_from_pc(&mut self, memory_bus: &MemoryBus) -> i8 {
        self.get_byte_from_pc(memory_bus) as i8
    }

    pub fn get_word_from_pc(&mut self, memory_bus: &MemoryBus) -> u16 {
        let bytes = [
            self.get_byte_from_pc(memory_bus),
            self.get_byte_from_pc(memory_bus),
        ];
        u16::from_le_bytes(bytes)
    }

    pub fn push(&mut self, memory_bus: &mut MemoryBus, value: u8) {
        self.sp = self.sp.wrapping_sub(1);
        memory_bus.write_byte(self.sp, value);
    }

    pub fn pop(&mut self, memory_bus: &MemoryBus) -> u8 {
        let value = memory_bus.read_byte(self.sp);
        self.sp = self.sp.wrapping_add(1);
        value
    }

    pub fn push_word(&mut self, memory_bus: &mut MemoryBus, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.push(memory_bus, high);
        self.push(memory_bus, low);
    }

    pub fn pop_word(&mut self, memory_bus: &MemoryBus) -> u16 {
        let low = self.pop(memory_bus);
        let high = self.pop(memory_bus);
        u16::from_le_bytes([low, high])
    }
}

impl Steppable for Cpu {
    type Context = MemoryBus;

    fn step(&mut self, context: &mut Self::Context, _elapsed: ElapsedTime) -> Result<ElapsedTime> {
        self.execute_next(context)
    }
}

/// Registers in A F B C D E H L order, SP, PC, then the interrupt and halt state.
impl SaveState for Cpu {
    const STATE_LEN: usize = 8 + 2 + 2 + 5 + 2;

    fn save_state(&self, out: &mut Vec<u8>) {
        let registers = &self.registers;
        out.extend_from_slice(&[
            registers.a,
            registers.f.into(),
            registers.b,
            registers.c,
            registers.d,
            registers.e,
            registers.h,
            registers.l,
        ]);
        out.extend_from_slice(&self.sp.to_le_bytes());
        out.extend_from_slice(&self.pc.to_le_bytes());
        out.extend_from_slice(&[
            self.interrupt_enabled.into(),
            self.ei_pending.into(),
            self.halted.into(),
            self.stopped.into(),
            self.halt_bug_on_next_opcode.into(),
        ]);
        match self.opcode_queue.front() {
            Some(byte) => out.extend_from_slice(&[1, *byte]),
            None => out.extend_from_slice(&[0, 0]),
        }
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        check_state_len(data, Self::STATE_LEN)?;
        let mut reader = StateReader::new(data);
        self.registers = Registers {
            a: reader.u8(),
            f: reader.u8().into(),
            b: reader.u8(),
            c: reader.u8(),
            d: reader.u8(),
            e: reader.u8(),
            h: reader.u8(),
            l: reader.u8(),
        };
        self.sp = reader.u16();
        self.pc = reader.u16();
        self.interrupt_enabled = reader.bool();
        self.ei_pending = reader.bool();
        self.halted = reader.bool();
        self.stopped = reader.bool();
        self.halt_bug_on_next_opcode = reader.bool();
        self.opcode_queue.clear();
        let queued = reader.bool();
        let byte = reader.u8();
        if queued {
            self.opcode_queue.push_back(byte);
        }
        Ok(())
    }
}
