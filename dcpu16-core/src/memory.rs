//! The shared 16-bit-word address space.
//!
//! A single mutex serializes every access. Each read/write additionally
//! waits a configurable duration after acquiring the lock — zero by default,
//! so tests run at full speed, but a runner can set a small non-zero delay
//! for timing realism the way the original implementation did.

use std::io::{self, Read, Write};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::error::{Error, MemoryOperation};
use crate::Word;

/// Full DCPU-16 address space: `0x10000` sixteen-bit words.
pub const MEMORY_SIZE: usize = 0x10000;

/// Byte order used by a memory image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// The DCPU-16's shared, mutex-protected word array.
///
/// `size` defaults to [`MEMORY_SIZE`] but can be smaller, which is what lets
/// [`Error::InvalidMemoryLocation`] actually be reachable in tests — a real
/// 16-bit address can never exceed a full-size array.
#[derive(Debug)]
pub struct Memory {
    words: Mutex<Vec<Word>>,
    size: usize,
    read_delay: Duration,
    write_delay: Duration,
}

impl Memory {
    /// A full-size, zero-initialized address space with no artificial delay.
    #[must_use]
    pub fn new() -> Self {
        Self::with_size(MEMORY_SIZE)
    }

    /// A zero-initialized address space of the given size, for test harnesses
    /// that want to exercise [`Error::InvalidMemoryLocation`].
    #[must_use]
    pub fn with_size(size: usize) -> Self {
        Self {
            words: Mutex::new(vec![0; size]),
            size,
            read_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
        }
    }

    /// Attach a simulated access latency, for timing realism rather than
    /// correctness.
    #[must_use]
    pub fn with_delays(mut self, read_delay: Duration, write_delay: Duration) -> Self {
        self.read_delay = read_delay;
        self.write_delay = write_delay;
        self
    }

    /// Declared capacity, in words.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Read the word at `addr`.
    pub fn read(&self, addr: Word) -> Result<Word, Error> {
        if addr as usize >= self.size {
            return Err(Error::InvalidMemoryLocation {
                op: MemoryOperation::Read,
                addr,
            });
        }

        let words = self.words.lock().unwrap_or_else(|poison| poison.into_inner());
        if !self.read_delay.is_zero() {
            thread::sleep(self.read_delay);
        }
        Ok(words[addr as usize])
    }

    /// Store `value` at `addr`.
    pub fn write(&self, addr: Word, value: Word) -> Result<(), Error> {
        if addr as usize >= self.size {
            return Err(Error::InvalidMemoryLocation {
                op: MemoryOperation::Write,
                addr,
            });
        }

        let mut words = self.words.lock().unwrap_or_else(|poison| poison.into_inner());
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        words[addr as usize] = value;
        Ok(())
    }

    /// Write every word as two bytes in `order`, unabridged.
    pub fn dump<W: Write>(&self, sink: &mut W, order: ByteOrder) -> io::Result<()> {
        let words = self.words.lock().unwrap_or_else(|poison| poison.into_inner());
        let mut buf = Vec::with_capacity(words.len() * 2);
        for &word in words.iter() {
            let bytes = match order {
                ByteOrder::Big => word.to_be_bytes(),
                ByteOrder::Little => word.to_le_bytes(),
            };
            buf.extend_from_slice(&bytes);
        }
        sink.write_all(&buf)
    }

    /// Build a fresh [`Memory`] of `size` words from a byte stream, reading
    /// bytes pairwise. Fails if the image doesn't fit, or doesn't contain a
    /// whole number of words. The unfilled tail is left zero.
    pub fn load<R: Read>(source: &mut R, size: usize, order: ByteOrder) -> Result<Self, Error> {
        let mut bytes = Vec::new();
        source
            .read_to_end(&mut bytes)
            .map_err(|_| Error::BadMemoryFile)?;

        if bytes.len() % 2 != 0 {
            return Err(Error::BadMemoryFile);
        }

        let word_count = bytes.len() / 2;
        if word_count > size {
            return Err(Error::MemoryFileTooBig { limit: size });
        }

        let mut words = vec![0u16; size];
        for (i, chunk) in bytes.chunks_exact(2).enumerate() {
            let pair = [chunk[0], chunk[1]];
            words[i] = match order {
                ByteOrder::Big => Word::from_be_bytes(pair),
                ByteOrder::Little => Word::from_le_bytes(pair),
            };
        }

        Ok(Self {
            words: Mutex::new(words),
            size,
            read_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
        })
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_write_round_trip() {
        let mem = Memory::new();
        mem.write(0x1234, 0xBEEF).unwrap();
        assert_eq!(mem.read(0x1234).unwrap(), 0xBEEF);
    }

    #[test]
    fn out_of_range_access_fails_on_a_small_memory() {
        let mem = Memory::with_size(4);
        assert_eq!(
            mem.read(4),
            Err(Error::InvalidMemoryLocation {
                op: MemoryOperation::Read,
                addr: 4
            })
        );
        assert!(mem.write(0, 1).is_ok());
        assert!(mem.write(4, 1).is_err());
    }

    #[test]
    fn dump_then_load_round_trips() {
        let mem = Memory::with_size(8);
        for i in 0..8 {
            mem.write(i, i * 111).unwrap();
        }

        for order in [ByteOrder::Big, ByteOrder::Little] {
            let mut buf = Vec::new();
            mem.dump(&mut buf, order).unwrap();

            let loaded = Memory::load(&mut Cursor::new(buf), 8, order).unwrap();
            for i in 0..8 {
                assert_eq!(loaded.read(i).unwrap(), mem.read(i).unwrap());
            }
        }
    }

    #[test]
    fn load_rejects_an_oversized_image() {
        let bytes = vec![0u8; 10];
        let err = Memory::load(&mut Cursor::new(bytes), 2, ByteOrder::Big).unwrap_err();
        assert_eq!(err, Error::MemoryFileTooBig { limit: 2 });
    }

    #[test]
    fn load_zero_fills_the_unfilled_tail() {
        let bytes = vec![0xAB, 0xCD];
        let mem = Memory::load(&mut Cursor::new(bytes), 4, ByteOrder::Big).unwrap();
        assert_eq!(mem.read(0).unwrap(), 0xABCD);
        assert_eq!(mem.read(1).unwrap(), 0);
    }
}
