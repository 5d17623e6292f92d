mod cpu;
pub mod instruction;
pub mod register;

pub use cpu::Cpu;
