//! A custom error and result type used across every pipeline stage.

use core::fmt;
use core::result;
use std::error;
use std::io;

#[derive(Debug)]
/// A custom syslift error
pub enum Error {
    /// The input buffer ended before the structure being parsed could be read
    BufferTooShort(usize, &'static str),
    /// A magic value, signature, or machine type did not match any accepted value
    BadMagic(u64),
    /// An entity is malformed in some way: an out-of-bounds RVA, a table walk
    /// that blew past its sanity cap, a missing mandatory header
    Malformed(String),
    /// The instruction stream ended in the middle of an instruction.
    /// Distinct from clean end-of-input, which decoders report as `None`.
    TruncatedInstruction {
        /// Byte offset of the start of the truncated instruction
        offset: usize,
    },
    /// An error emanating from reading bytes via scroll
    Scroll(scroll::Error),
    /// An IO-based error
    IO(io::Error),
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IO(ref io) => Some(io),
            Error::Scroll(ref scroll) => Some(scroll),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IO(err)
    }
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Error {
        Error::Scroll(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IO(ref err) => write!(fmt, "{}", err),
            Error::Scroll(ref err) => write!(fmt, "{}", err),
            Error::BufferTooShort(n, item) => write!(fmt, "buffer is too short for {} {}", n, item),
            Error::BadMagic(magic) => write!(fmt, "invalid magic number: 0x{:x}", magic),
            Error::Malformed(ref msg) => write!(fmt, "malformed entity: {}", msg),
            Error::TruncatedInstruction { offset } => {
                write!(fmt, "truncated instruction at offset {:#x}", offset)
            }
        }
    }
}

/// The result type used across the pipeline
pub type Result<T> = result::Result<T, Error>;
