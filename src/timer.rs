use log::debug;

use crate::component::{check_state_len, ElapsedTime, SaveState, StateReader, Steppable};
use crate::error::Result;
use crate::interrupt::Interrupt;
use crate::memory::{MemoryBus, TAC};

/// Master clock speed in cycles per second.
pub const CLOCK_SPEED: u32 = 1024 * 4096;

/// DIV increments every 256 cycles.
const DIV_PERIOD: u32 = 256;

/// Drives DIV and TIMA. The registers themselves live on the memory bus; the timer only keeps
/// the cycles accumulated towards the next increment of each.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Timer {
    div_clocksum: u32,
    timer_clocksum: u32,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_enabled(tac: u8) -> bool {
        tac & 0b100 != 0
    }

    fn get_frequency(tac: u8) -> u32 {
        match tac & 0b11 {
            0b00 => 4_096,
            0b01 => 262_144,
            0b10 => 65_536,
            _ => 16_384,
        }
    }

    /// Cycles between TIMA increments for the rate selected in TAC.
    pub fn timer_period(tac: u8) -> u32 {
        CLOCK_SPEED / Self::get_frequency(tac)
    }
}

impl Steppable for Timer {
    type Context = MemoryBus;

    fn step(&mut self, bus: &mut MemoryBus, elapsed: ElapsedTime) -> Result<ElapsedTime> {
        self.div_clocksum += elapsed;
        while self.div_clocksum >= DIV_PERIOD {
            self.div_clocksum -= DIV_PERIOD;
            bus.increment_divider();
        }

        let tac = bus.io_register(TAC);
        if Self::is_enabled(tac) {
            self.timer_clocksum += elapsed;
            let period = Self::timer_period(tac);
            while self.timer_clocksum >= period {
                self.timer_clocksum -= period;
                // When TIMA overflows it is reloaded from TMA and an interrupt is sent
                if bus.increment_and_maybe_reset_timer() {
                    debug!("sending timer interrupt");
                    bus.request_interrupt(Interrupt::Timer);
                }
            }
        }

        Ok(elapsed)
    }
}

impl SaveState for Timer {
    const STATE_LEN: usize = 8;

    fn save_state(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.div_clocksum.to_le_bytes());
        out.extend_from_slice(&self.timer_clocksum.to_le_bytes());
    }

    fn load_state(&mut self, data: &[u8]) -> Result<()> {
        check_state_len(data, Self::STATE_LEN)?;
        let mut reader = StateReader::new(data);
        self.div_clocksum = reader.u32();
        self.timer_clocksum = reader.u32();
        Ok(())
    }
}
