//! Failure modes for the core: bad instructions, stack abuse, and the
//! handful of ways a memory image file can be unusable.

use std::fmt;

use crate::Word;

/// Which operation an out-of-range memory access was attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOperation {
    Read,
    Write,
}

impl fmt::Display for MemoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Everything that can go wrong while decoding or executing, or while
/// loading/dumping a memory image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `addr` is outside the declared size of memory.
    InvalidMemoryLocation { op: MemoryOperation, addr: Word },
    /// `PUSH` attempted with `SP == 0`.
    StackOverflow,
    /// `POP`/`PEEK` attempted with `SP` already at the top of memory.
    StackUnderflow,
    /// `word`'s opcode bits (or operand fields) don't name a real instruction.
    MalformedInstruction { word: Word },
    /// A memory image's bytes didn't parse as a whole number of words.
    BadMemoryFile,
    /// The memory image file couldn't be opened for reading.
    MissingMemoryFile(String),
    /// The memory image file couldn't be opened for writing.
    UnwritableMemoryFile(String),
    /// The memory image is larger than the addressable memory it's loaded into.
    MemoryFileTooBig { limit: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMemoryLocation { op, addr } => {
                write!(f, "invalid memory location for {op}: {addr:#06x}")
            }
            Self::StackOverflow => write!(f, "stack overflow: push with SP at 0"),
            Self::StackUnderflow => write!(f, "stack underflow: pop with SP at top of memory"),
            Self::MalformedInstruction { word } => {
                write!(f, "malformed instruction word: {word:#06x}")
            }
            Self::BadMemoryFile => write!(f, "memory image is not a whole number of words"),
            Self::MissingMemoryFile(path) => write!(f, "cannot open memory image '{path}'"),
            Self::UnwritableMemoryFile(path) => {
                write!(f, "cannot write memory image '{path}'")
            }
            Self::MemoryFileTooBig { limit } => {
                write!(f, "memory image exceeds {limit} words")
            }
        }
    }
}

impl std::error::Error for Error {}
