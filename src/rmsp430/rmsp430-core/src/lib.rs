#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod constants;
pub mod cpu;
pub mod cycles;
pub mod decoder;
pub mod error;
pub mod instructions;
pub mod interrupts;
pub mod memory;
pub mod operands;
pub mod registers;
pub mod utils;

pub use cpu::{Cpu, RunSummary, Stage, Step, StepEvent, StopReason};
pub use error::{Access, AccessFault, AttachError, DecodeError, Fault};
pub use interrupts::InterruptRequest;
pub use memory::{periph::Peripheral, MemoryMap};
pub use registers::{Half, RegisterFile, Status};
