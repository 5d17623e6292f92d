use core::fmt;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info};

use crate::cartridge::Cartridge;
use crate::component::{ElapsedTime, SaveState, Steppable};
use crate::cpu::Cpu;
use crate::error::{Error, Result};
use crate::joypad::{self, JoypadInput};
use crate::memory::MemoryBus;
use crate::ppu::{Framebuffer, Ppu};
use crate::timer::Timer;

/// Master-clock cycles in one video frame (154 lines of 456 cycles).
pub const CYCLES_PER_FRAME: ElapsedTime = 70224;

/// Where cartridges and save-state slots live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// Directory a save state's cartridge filename is resolved against.
    pub rom_dir: PathBuf,
    /// Directory holding `<rom-stem>.state<n>` slot files.
    pub save_dir: PathBuf,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            rom_dir: PathBuf::from("."),
            save_dir: PathBuf::from("."),
        }
    }
}

const STATE_SECTIONS: usize = 4;

/// Fixed sections of a save state, in order. The cartridge filename follows the last one.
const STATE_SCHEMA: [(&str, usize); STATE_SECTIONS] = [
    ("cpu", Cpu::STATE_LEN),
    ("memory bus", MemoryBus::STATE_LEN),
    ("timer", Timer::STATE_LEN),
    ("ppu", Ppu::STATE_LEN),
];

const fn fixed_state_len() -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < STATE_SCHEMA.len() {
        total += STATE_SCHEMA[i].1;
        i += 1;
    }
    total
}

const FIXED_STATE_LEN: usize = fixed_state_len();

/// Cuts a save state into its fixed sections and the trailing filename.
fn split_state(data: &[u8]) -> Result<([&[u8]; STATE_SECTIONS], &str)> {
    if data.len() <= FIXED_STATE_LEN {
        return Err(Error::InvalidSaveState {
            expected: FIXED_STATE_LEN + 1,
            actual: data.len(),
        });
    }

    let mut sections: [&[u8]; STATE_SECTIONS] = [&[]; STATE_SECTIONS];
    let mut offset = 0;
    for (section, (name, len)) in sections.iter_mut().zip(STATE_SCHEMA) {
        debug!("{} state at {:#x}, {:#x} bytes", name, offset, len);
        *section = &data[offset..offset + len];
        offset += len;
    }

    let filename = std::str::from_utf8(&data[offset..])
        .map_err(|_| Error::SaveStateMismatch("cartridge filename is not utf-8".to_string()))?;
    // the cartridge is looked up inside rom_dir, so only a bare file name is accepted
    if Path::new(filename).file_name() != Some(OsStr::new(filename)) {
        return Err(Error::SaveStateMismatch(format!(
            "cartridge filename {:?} is not a plain file name",
            filename
        )));
    }
    Ok((sections, filename))
}

#[derive(Debug, Clone)]
pub struct GameboyDebugInfo {
    pub pc: u16,
    pub opcode: u8, // opcode at pc
    pub sp: u16,
    pub register_a: u8,
    pub register_f: [bool; 4],
    pub register_bc: u16,
    pub register_de: u16,
    pub register_hl: u16,
    pub ly: u8,
    pub interrupt_enabled: bool,
}

impl fmt::Display for GameboyDebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pc: {:04x} ({:02x}), sp: {:04x}, A: {:02x}, F: {}{}{}{}, BC: {:04x}, DE: {:04x}, HL: {:04x}, LY: {}, IME: {}",
            self.pc,
            self.opcode,
            self.sp,
            self.register_a,
            if self.register_f[0] { 'Z' } else { '-' },
            if self.register_f[1] { 'N' } else { '-' },
            if self.register_f[2] { 'H' } else { '-' },
            if self.register_f[3] { 'C' } else { '-' },
            self.register_bc,
            self.register_de,
            self.register_hl,
            self.ly,
            self.interrupt_enabled as u8,
        )
    }
}

/// The frame driver. Owns every component and steps them in lockstep: one CPU instruction, then
/// the timer and PPU for the cycles it took.
pub struct GameBoy {
    config: EmulatorConfig,
    cpu: Cpu,
    memory_bus: MemoryBus,
    timer: Timer,
    ppu: Ppu,
    rom_filename: Option<String>,
    /// Cycles the last frame ran past its budget, taken off the next one.
    frame_overshoot: ElapsedTime,
    total_cycles: u64,
    /// Set once a fatal emulation error stops the session.
    halted: Option<String>,
}

impl GameBoy {
    pub fn new(config: EmulatorConfig) -> Self {
        Self {
            config,
            cpu: Cpu::new(),
            memory_bus: MemoryBus::new(),
            timer: Timer::new(),
            ppu: Ppu::new(),
            rom_filename: None,
            frame_overshoot: 0,
            total_cycles: 0,
            halted: None,
        }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Reads a cartridge image from `path` and powers on with it.
    pub fn load_rom_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let cartridge = Cartridge::from_data(&bytes)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::from_message(format!("{} is not a file", path.display())))?;
        self.load_cartridge(cartridge, filename);
        Ok(())
    }

    /// Powers on with `cartridge`. `filename` is what save states record to find the ROM again,
    /// so it should be a bare file name inside `rom_dir`.
    pub fn load_cartridge(&mut self, cartridge: Cartridge, filename: impl Into<String>) {
        let filename = filename.into();
        info!("loaded {} from {}", cartridge.header().title, filename);
        self.cpu = Cpu::post_boot(cartridge.is_cgb());
        self.memory_bus = MemoryBus::with_cartridge(cartridge);
        self.timer = Timer::new();
        self.ppu = Ppu::new();
        self.rom_filename = Some(filename);
        self.frame_overshoot = 0;
        self.total_cycles = 0;
        self.halted = None;
    }

    fn check_running(&self) -> Result<()> {
        if let Some(message) = &self.halted {
            return Err(Error::Halted(message.clone()));
        }
        if self.memory_bus.cartridge().is_none() {
            return Err(Error::NoCartridge);
        }
        Ok(())
    }

    /// Runs one CPU step and feeds its cycles to the timer and PPU.
    pub fn tick(&mut self) -> Result<ElapsedTime> {
        self.check_running()?;

        let elapsed = match self.cpu.step(&mut self.memory_bus, 0) {
            Ok(elapsed) => elapsed,
            Err(err) => {
                if err.is_fatal_emulation_error() {
                    error!("stopping emulation: {}", err);
                    self.halted = Some(err.to_string());
                }
                return Err(err);
            }
        };
        self.timer.step(&mut self.memory_bus, elapsed)?;
        self.ppu.step(&mut self.memory_bus, elapsed)?;

        self.total_cycles += u64::from(elapsed);
        Ok(elapsed)
    }

    /// Runs until a frame's worth of cycles has elapsed and returns the framebuffer.
    pub fn run_one_frame(&mut self) -> Result<&Framebuffer> {
        self.check_running()?;

        let budget = CYCLES_PER_FRAME.saturating_sub(self.frame_overshoot);
        let mut elapsed = 0;
        while elapsed < budget {
            elapsed += self.tick()?;
        }
        self.frame_overshoot = elapsed - budget;

        Ok(self.ppu.framebuffer())
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        self.ppu.framebuffer()
    }

    pub fn key_pressed(&mut self, key_index: u8) -> Result<()> {
        let input = JoypadInput::from_index(key_index)?;
        joypad::key_pressed(&mut self.memory_bus, input);
        Ok(())
    }

    pub fn key_released(&mut self, key_index: u8) -> Result<()> {
        let input = JoypadInput::from_index(key_index)?;
        joypad::key_released(&mut self.memory_bus, input);
        Ok(())
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn memory_bus(&self) -> &MemoryBus {
        &self.memory_bus
    }

    pub fn memory_bus_mut(&mut self) -> &mut MemoryBus {
        &mut self.memory_bus
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn rom_filename(&self) -> Option<&str> {
        self.rom_filename.as_deref()
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Bytes the program sent over the serial port since the last call.
    pub fn take_serial_data(&mut self) -> Vec<u8> {
        self.memory_bus.take_serial_data()
    }

    pub fn debug_info(&self) -> GameboyDebugInfo {
        let cpu = &self.cpu;
        let register_f = [
            cpu.registers.f.zero,
            cpu.registers.f.subtract,
            cpu.registers.f.half_carry,
            cpu.registers.f.carry,
        ];

        GameboyDebugInfo {
            pc: cpu.pc,
            opcode: self.memory_bus.read_byte(cpu.pc),
            sp: cpu.sp,
            register_a: cpu.registers.a,
            register_f,
            register_bc: cpu.registers.get_bc(),
            register_de: cpu.registers.get_de(),
            register_hl: cpu.registers.get_hl(),
            ly: self.memory_bus.get_scanline(),
            interrupt_enabled: cpu.interrupts_enabled(),
        }
    }

    /// Serializes the whole machine: CPU, memory bus with the cartridge controller, timer and
    /// PPU, then the cartridge filename.
    pub fn save_state(&self) -> Result<Vec<u8>> {
        let filename = self.rom_filename.as_deref().ok_or(Error::NoCartridge)?;
        if self.memory_bus.cartridge().is_none() {
            return Err(Error::NoCartridge);
        }

        let mut state = Vec::with_capacity(FIXED_STATE_LEN + filename.len());
        self.cpu.save_state(&mut state);
        self.memory_bus.save_state(&mut state);
        self.timer.save_state(&mut state);
        self.ppu.save_state(&mut state);
        state.extend_from_slice(filename.as_bytes());
        Ok(state)
    }

    /// Restores a save state. The cartridge is re-read from `rom_dir` unless it is the one
    /// already inserted. Nothing changes unless every section loads.
    pub fn load_state(&mut self, data: &[u8]) -> Result<()> {
        let ([cpu_state, bus_state, timer_state, ppu_state], filename) = split_state(data)?;

        let cartridge = match (self.rom_filename.as_deref(), self.memory_bus.cartridge()) {
            (Some(current), Some(cartridge)) if current == filename => cartridge.clone(),
            _ => {
                let path = self.config.rom_dir.join(filename);
                info!("reloading cartridge from {}", path.display());
                Cartridge::from_data(&fs::read(path)?)?
            }
        };

        let mut cpu = Cpu::post_boot(cartridge.is_cgb());
        let mut memory_bus = MemoryBus::with_cartridge(cartridge);
        let mut timer = Timer::new();
        let mut ppu = Ppu::new();
        cpu.load_state(cpu_state)?;
        memory_bus.load_state(bus_state)?;
        timer.load_state(timer_state)?;
        ppu.load_state(ppu_state)?;

        self.cpu = cpu;
        self.memory_bus = memory_bus;
        self.timer = timer;
        self.ppu = ppu;
        self.rom_filename = Some(filename.to_string());
        self.frame_overshoot = 0;
        self.halted = None;
        info!("restored save state for {}", filename);
        Ok(())
    }

    /// Path of save slot `slot` for the inserted cartridge.
    pub fn slot_path(&self, slot: u8) -> Result<PathBuf> {
        let filename = self.rom_filename.as_deref().ok_or(Error::NoCartridge)?;
        let stem = Path::new(filename)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        Ok(self.config.save_dir.join(format!("{}.state{}", stem, slot)))
    }

    pub fn save_state_to_slot(&self, slot: u8) -> Result<PathBuf> {
        let path = self.slot_path(slot)?;
        fs::write(&path, self.save_state()?)?;
        info!("saved state to {}", path.display());
        Ok(path)
    }

    pub fn load_state_from_slot(&mut self, slot: u8) -> Result<()> {
        let path = self.slot_path(slot)?;
        self.load_state_file(path)
    }

    /// Loads a save state file. Works without a cartridge inserted, since the state names it.
    pub fn load_state_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let data = fs::read(path.as_ref())?;
        self.load_state(&data)
    }
}
