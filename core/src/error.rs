//! Error type.
//!
//! Domain error kinds for the state store, command mutation, and dependency graph. One
//! hand-rolled enum per crate, following the teacher's `render/src/error.rs` convention rather
//! than a workspace-wide error type.

use std::{error, fmt};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reason {
    FramebufferUnavailable,
    NoTextureData,
    InvalidAttachment,
    DeviceMemoryMappingFailed,
    MessageString(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// A command's mutate returned a fail during analysis mode; downgraded to the dependency
    /// graph's `aborted` flag by the caller rather than propagated past it.
    AbortedCommand,
    DataUnavailable(Reason),
    Cancelled,
    InvalidRequest(&'static str),
    /// A failed invariant check. Fatal for the current stream; must never cross a stream
    /// boundary (see the teacher's `render/src/error.rs` header note on error granularity).
    InternalInvariant(&'static str),
    /// §6 resource presentation: `set_data` is only implemented for `Shader`; every other kind
    /// reports this rather than silently doing nothing.
    Unsupported(&'static str),
    Format(replay_format::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::AbortedCommand => write!(f, "command aborted during analysis"),
            Error::DataUnavailable(reason) => write!(f, "data unavailable: {:?}", reason),
            Error::Cancelled => write!(f, "cancelled"),
            Error::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            Error::InternalInvariant(msg) => write!(f, "internal invariant violated: {}", msg),
            Error::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            Error::Format(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for Error {}

impl From<replay_format::Error> for Error {
    fn from(e: replay_format::Error) -> Error {
        Error::Format(e)
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
