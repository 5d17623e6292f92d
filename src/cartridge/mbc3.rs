use chrono::{Datelike, Local, Timelike};
use log::{debug, trace};

use crate::component::Address;

use super::{ram_offset, rom_offset, REGISTER_LEN};

/// Latched real time clock registers. Latching records the wall clock time; the registers
/// themselves are not yet readable and read as 0xff through the cartridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClockCounter {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day_low: u8,
    /// Bit 0 is bit 8 of the day counter.
    pub day_high: u8,
}

impl ClockCounter {
    fn latch(&mut self) {
        let now = Local::now();
        let day = now.num_days_from_ce() as u32 % 512;
        self.seconds = now.second() as u8;
        self.minutes = now.minute() as u8;
        self.hours = now.hour() as u8;
        self.day_low = (day & 0xff) as u8;
        self.day_high = (day >> 8) as u8;
        debug!("latched rtc {:?}", self);
    }

    fn read(&self, select: u8) -> u8 {
        trace!("rtc register {:#x} read", select);
        0xff
    }

    fn write(&mut self, select: u8, value: u8) {
        trace!("rtc register {:#x} write {:#x} ignored", select, value);
    }
}

#[derive(Debug, Clone)]
pub struct Mbc3 {
    rom: Vec<u8>,
    ram: Vec<u8>,
    ram_timer_enabled: bool,
    rom_bank: u8,
    /// Selects a RAM bank (0-3) or an RTC register (0x08-0x0c).
    ram_rtc_select: u8,
    latch_clock_data: u8,
    clock: ClockCounter,
}

impl Mbc3 {
    pub fn new(rom: Vec<u8>, ram: Vec<u8>) -> Self {
        Self {
            rom,
            ram,
            ram_timer_enabled: false,
            rom_bank: 1,
            ram_rtc_select: 0,
            latch_clock_data: 0xff,
            clock: ClockCounter::default(),
        }
    }

    pub fn rom_bank(&self) -> usize {
        self.rom_bank.into()
    }

    pub fn latched_clock(&self) -> &ClockCounter {
        &self.clock
    }

    pub(super) fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub(super) fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub(super) fn read(&self, address: Address) -> u8 {
        match address {
            0x0000..=0x3fff => self.rom[usize::from(address)],
            0x4000..=0x7fff => self.rom[rom_offset(&self.rom, self.rom_bank(), address)],
            0xa000..=0xbfff if self.ram_timer_enabled => match self.ram_rtc_select {
                0x0..=0x3 if !self.ram.is_empty() => {
                    self.ram[ram_offset(&self.ram, self.ram_rtc_select.into(), address)]
                }
                select @ 0x8..=0xc => self.clock.read(select),
                _ => 0xff,
            },
            _ => 0xff,
        }
    }

    pub(super) fn write(&mut self, address: Address, value: u8) {
        match address {
            0x0000..=0x1fff => self.ram_timer_enabled = value & 0xf == 0xa,
            0x2000..=0x3fff => {
                self.rom_bank = match value & 0x7f {
                    0 => 1,
                    bank => bank,
                };
                debug!("switched to rom bank {}", self.rom_bank);
            }
            0x4000..=0x5fff => self.ram_rtc_select = value,
            0x6000..=0x7fff => {
                if self.latch_clock_data == 0 && value == 1 {
                    self.clock.latch();
                }
                self.latch_clock_data = value;
            }
            0xa000..=0xbfff if self.ram_timer_enabled => match self.ram_rtc_select {
                0x0..=0x3 if !self.ram.is_empty() => {
                    let offset = ram_offset(&self.ram, self.ram_rtc_select.into(), address);
                    self.ram[offset] = value;
                }
                select @ 0x8..=0xc => self.clock.write(select, value),
                _ => (),
            },
            _ => (),
        }
    }

    pub(super) fn save_registers(&self) -> [u8; REGISTER_LEN] {
        [
            self.ram_timer_enabled.into(),
            self.rom_bank,
            self.ram_rtc_select,
            self.latch_clock_data,
            self.clock.seconds,
            self.clock.minutes,
            self.clock.hours,
            self.clock.day_low,
            self.clock.day_high,
            0,
            0,
        ]
    }

    pub(super) fn load_registers(&mut self, registers: &[u8]) {
        self.ram_timer_enabled = registers[0] != 0;
        self.rom_bank = (registers[1] & 0x7f).max(1);
        self.ram_rtc_select = registers[2];
        self.latch_clock_data = registers[3];
        self.clock = ClockCounter {
            seconds: registers[4],
            minutes: registers[5],
            hours: registers[6],
            day_low: registers[7],
            day_high: registers[8],
        };
    }
}
