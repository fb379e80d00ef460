//! Cycle-accurate core of a DCPU-16 emulator.
//!
//! This crate is the hard part of a DCPU-16 machine: decoding, the ALU and
//! control flow, the fourteen addressing modes, and the CPU/device
//! interrupt handshake. Everything outside that — rendering a monitor's
//! framebuffer, capturing OS keyboard events, parsing command lines — lives
//! elsewhere and only ever talks to this crate through [`Device`] and
//! [`Memory`].

mod addressing;
mod computer;
mod decode;
mod error;
mod interrupt;
mod memory;
mod registers;

pub mod devices;

pub use computer::Computer;
pub use decode::{decode, AddressingMode, Instruction, Opcode, SpecialOpcode};
pub use error::{Error, MemoryOperation};
pub use interrupt::{Cpu, Device, DeviceContext, DeviceInfo, InterruptChannel};
pub use memory::{ByteOrder, Memory, MEMORY_SIZE};
pub use registers::{Register, Registers, SpecialRegister};

/// A 16-bit machine word, the DCPU-16's native data size.
pub type Word = u16;

/// A 32-bit value used for intermediate arithmetic that may overflow a [`Word`].
pub type DoubleWord = u32;

/// A [`Word`] reinterpreted as two's-complement signed.
pub type SignedWord = i16;
