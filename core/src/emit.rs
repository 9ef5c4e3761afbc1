//! The narrow seam between a command's replay-mode mutation and the Replay Emitter (§4.8).
//!
//! `core` only needs to know the shape of this seam, not its implementation — `replay-emitter`
//! implements `Emitter` for its concrete `ReplayEmitter` type. Kept as a trait object exactly
//! the way the teacher's `render::traits` module defines backend-facing traits that `render-gl`
//! implements.

use crate::pool::Pool;

/// A sequential reader over postback bytes, handed to a [`PostCallback`] once the replay device
/// acknowledges completion (§4.8).
pub trait ByteReader {
    fn read_exact(&mut self, len: usize) -> crate::error::Result<Vec<u8>>;
}

pub type PostCallback = Box<dyn FnOnce(&mut dyn ByteReader, Option<crate::error::Error>)>;

/// Build-time operations a command's replay-mode mutation may issue. Returning `Err` here means
/// an invalid argument was given at build time; runtime device errors are surfaced later,
/// asynchronously, through a [`PostCallback`]'s error argument (§4.8 failure model).
pub trait Emitter {
    /// Reserves `len` bytes of replay-side scratch, returning the pool it was minted from.
    fn reserve_memory(&mut self, len: usize) -> crate::error::Result<Pool>;

    /// Schedules `callback` to run once the opcodes emitted so far have been acknowledged,
    /// reading exactly `len` bytes back from the device.
    fn post(&mut self, len: usize, callback: PostCallback) -> crate::error::Result<()>;

    /// Maps `pool` for host-side writes ahead of replay (e.g. staging buffer uploads).
    fn map_memory(&mut self, pool: Pool) -> crate::error::Result<()>;
}
