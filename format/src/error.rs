//! Error type.
//!
//! This is the shared error type for the format registry.

use std::{error, fmt};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Lookup of `(base, type)` or a sized internal format failed: the pair is not part of
    /// the registered capture-domain table.
    UnsupportedFormat { base: u32, ty: u32 },
    /// `decompress` was asked for a codec it does not (yet) implement.
    UnsupportedCompressedFormat(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnsupportedFormat { base, ty } => write!(
                f,
                "unsupported (base,type) pair: base=0x{:04X} type=0x{:04X}",
                base, ty
            ),
            Error::UnsupportedCompressedFormat(name) => {
                write!(f, "unsupported compressed format: {}", name)
            }
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = ::std::result::Result<T, Error>;
