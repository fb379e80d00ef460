//! Loading and storing through the fourteen [`AddressingMode`]s.
//!
//! `PUSH`/`POP` bound-check against `SP == 0` / `SP` at the top of the
//! declared memory, the way the original implementation's address-resolution
//! code does — on a full 64K memory this basically never fires (a program
//! would need to nest 65536 unmatched pushes), but it's reachable against
//! the smaller memories test harnesses build with [`Memory::with_size`].

use crate::decode::AddressingMode;
use crate::error::Error;
use crate::interrupt::Cpu;
use crate::memory::MEMORY_SIZE;
use crate::registers::{Register, SpecialRegister};
use crate::Word;

/// Read the value named by `mode`, caching any next-word it consumes.
pub fn load(cpu: &Cpu, mode: &mut AddressingMode) -> Result<Word, Error> {
    match mode {
        AddressingMode::RegisterDirect(reg) => Ok(cpu.with_registers(|r| r.get(*reg))),
        AddressingMode::RegisterIndirect(reg) => {
            let addr = cpu.with_registers(|r| r.get(*reg));
            cpu.memory.read(addr)
        }
        AddressingMode::RegisterIndirectOffset(reg, cache) => {
            let offset = next_word(cpu, cache)?;
            let addr = cpu
                .with_registers(|r| r.get(*reg))
                .wrapping_add(offset);
            cpu.memory.read(addr)
        }
        AddressingMode::Pop => pop(cpu),
        AddressingMode::Push => {
            // POP-only in spec, but nothing stops a malformed decode from
            // trying to load a Push; treated as reading the not-yet-written
            // slot one below SP, matching what a direct memory peek would see.
            let sp = cpu.with_registers(|r| r.sp);
            cpu.memory.read(sp.wrapping_sub(1))
        }
        AddressingMode::Peek => {
            let sp = cpu.with_registers(|r| r.sp);
            cpu.memory.read(sp)
        }
        AddressingMode::Pick(cache) => {
            let offset = next_word(cpu, cache)?;
            let sp = cpu.with_registers(|r| r.sp);
            cpu.memory.read(sp.wrapping_add(offset))
        }
        AddressingMode::Sp => Ok(cpu.with_registers(|r| r.sp)),
        AddressingMode::Pc => Ok(cpu.with_registers(|r| r.pc)),
        AddressingMode::Ex => Ok(cpu.with_registers(|r| r.ex)),
        AddressingMode::Indirect(cache) => {
            let addr = next_word(cpu, cache)?;
            cpu.memory.read(addr)
        }
        AddressingMode::Direct(cache) => next_word(cpu, cache),
        AddressingMode::FastDirect(value) => Ok(*value),
    }
}

/// Store `value` through `mode`. Storing to a literal operand
/// ([`AddressingMode::Direct`], [`AddressingMode::FastDirect`]) is silently
/// discarded.
pub fn store(cpu: &Cpu, mode: &mut AddressingMode, value: Word) -> Result<(), Error> {
    match mode {
        AddressingMode::RegisterDirect(reg) => {
            cpu.with_registers(|r| r.set(*reg, value));
            Ok(())
        }
        AddressingMode::RegisterIndirect(reg) => {
            let addr = cpu.with_registers(|r| r.get(*reg));
            cpu.memory.write(addr, value)
        }
        AddressingMode::RegisterIndirectOffset(reg, cache) => {
            let offset = next_word(cpu, cache)?;
            let addr = cpu
                .with_registers(|r| r.get(*reg))
                .wrapping_add(offset);
            cpu.memory.write(addr, value)
        }
        AddressingMode::Push => push(cpu, value),
        AddressingMode::Pop => {
            let sp = cpu.with_registers(|r| r.sp);
            cpu.memory.write(sp, value)
        }
        AddressingMode::Peek => {
            let sp = cpu.with_registers(|r| r.sp);
            cpu.memory.write(sp, value)
        }
        AddressingMode::Pick(cache) => {
            let offset = next_word(cpu, cache)?;
            let sp = cpu.with_registers(|r| r.sp);
            cpu.memory.write(sp.wrapping_add(offset), value)
        }
        AddressingMode::Sp => {
            cpu.with_registers(|r| r.sp = value);
            Ok(())
        }
        AddressingMode::Pc => {
            cpu.with_registers(|r| r.pc = value);
            Ok(())
        }
        AddressingMode::Ex => {
            cpu.with_registers(|r| r.ex = value);
            Ok(())
        }
        AddressingMode::Indirect(cache) => {
            let addr = next_word(cpu, cache)?;
            cpu.memory.write(addr, value)
        }
        AddressingMode::Direct(_) | AddressingMode::FastDirect(_) => Ok(()),
    }
}

/// Helper for addressing modes that read/write a [`SpecialRegister`]
/// directly rather than through the general [`Register`] set.
pub fn load_special(cpu: &Cpu, reg: SpecialRegister) -> Word {
    cpu.with_registers(|r| r.get_special(reg))
}

pub fn store_special(cpu: &Cpu, reg: SpecialRegister, value: Word) {
    cpu.with_registers(|r| r.set_special(reg, value));
}

pub fn load_register(cpu: &Cpu, reg: Register) -> Word {
    cpu.with_registers(|r| r.get(reg))
}

pub fn store_register(cpu: &Cpu, reg: Register, value: Word) {
    cpu.with_registers(|r| r.set(reg, value));
}

fn next_word(cpu: &Cpu, cache: &mut Option<Word>) -> Result<Word, Error> {
    if let Some(word) = *cache {
        return Ok(word);
    }
    let word = cpu.fetch_next_word()?;
    *cache = Some(word);
    Ok(word)
}

// On a full 64K address space SP has nowhere to run out of room — it just
// wraps, which is how `JSR` from a pristine boot state (SP == 0) is able to
// write its return address to 0xFFFF. The bounds check below only has
// anywhere to bite on the deliberately undersized memories a test harness
// builds with `Memory::with_size`, the same carve-out `Memory::read`/`write`
// make for `InvalidMemoryLocation`.

pub(crate) fn push(cpu: &Cpu, value: Word) -> Result<(), Error> {
    let sp = cpu.with_registers(|r| r.sp);
    if cpu.memory.size() < MEMORY_SIZE && sp == 0 {
        return Err(Error::StackOverflow);
    }
    let new_sp = sp.wrapping_sub(1);
    cpu.memory.write(new_sp, value)?;
    cpu.with_registers(|r| r.sp = new_sp);
    Ok(())
}

pub(crate) fn pop(cpu: &Cpu) -> Result<Word, Error> {
    let sp = cpu.with_registers(|r| r.sp);
    if cpu.memory.size() < MEMORY_SIZE && sp as usize >= cpu.memory.size() - 1 {
        return Err(Error::StackUnderflow);
    }
    let value = cpu.memory.read(sp)?;
    cpu.with_registers(|r| r.sp = sp.wrapping_add(1));
    Ok(value)
}
