use crate::error::{Error, Result};

pub type Address = u16;

/// Master-clock cycles (4,194,304 Hz).
pub type ElapsedTime = u32;

pub trait Steppable {
    type Context;

    fn step(&mut self, context: &mut Self::Context, elapsed: ElapsedTime) -> Result<ElapsedTime>;
}

/// A component whose state serializes into a fixed number of bytes.
pub trait SaveState {
    const STATE_LEN: usize;

    fn save_state(&self, out: &mut Vec<u8>);

    fn load_state(&mut self, data: &[u8]) -> Result<()>;
}

pub(crate) fn check_state_len(data: &[u8], expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(Error::InvalidSaveState {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Sequential little-endian reader over a save state section. Callers check the section length
/// with `check_state_len` first, so reads never run past the end.
pub(crate) struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StateReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn bytes(&mut self, len: usize) -> &'a [u8] {
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        slice
    }

    pub fn fill(&mut self, dest: &mut [u8]) {
        let len = dest.len();
        dest.copy_from_slice(self.bytes(len));
    }

    pub fn u8(&mut self) -> u8 {
        self.bytes(1)[0]
    }

    pub fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    pub fn u16(&mut self) -> u16 {
        let bytes = self.bytes(2);
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    pub fn u32(&mut self) -> u32 {
        let bytes = self.bytes(4);
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn u64(&mut self) -> u64 {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(self.bytes(8));
        u64::from_le_bytes(bytes)
    }
}
