//! Replay Emitter (§4.8): the transform pipeline's downstream terminus. Accepts `(id, cmd)`
//! pairs, runs each command's replay-mode `mutate` against a live [`State`], and buffers the
//! postback callbacks that mutation schedules so they can be resolved in submission order once
//! the (simulated) replay device acknowledges completion.
//!
//! Grounded on the teacher's `render-gl` backend split: `lib.rs` there is the thin struct owning
//! a device handle plus submission bookkeeping, with the actual GL calls pushed into per-feature
//! modules — here there is no real device, so `flush` drives the postback queue directly rather
//! than waiting on a fence.

pub mod image;
pub mod issue;

use replay_core::emit::{ByteReader, Emitter, PostCallback};
use replay_core::pool::{Pool, Slice};
use replay_core::{Command, CommandId, Error, Result, State};
use replay_pipeline::Sink;
use std::collections::VecDeque;

pub use image::{Image2D, ImageResult};
pub use issue::{Issue, Severity};

struct PendingPost {
    len: usize,
    pool: Pool,
    base: u64,
    callback: PostCallback,
}

/// A sequential reader over one pool region, handed to a postback callback (§4.8).
struct PoolReader<'a> {
    pools: &'a replay_core::pool::MemoryPools,
    slice: Slice,
}

impl<'a> ByteReader for PoolReader<'a> {
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        if len != self.slice.byte_len() {
            return Err(Error::InvalidRequest("postback read length does not match the reserved span"));
        }
        Ok(self.pools.read(&self.slice))
    }
}

/// The concrete replay emitter (§4.8). Owns the scratch allocator and the postback queue; has no
/// live GPU device, so `reserve_memory`/`post`/`map_memory` operate purely over [`State`]'s
/// memory pools, and `flush` resolves postbacks by reading straight out of those pools instead
/// of waiting on a device fence.
pub struct ReplayEmitter {
    queue: VecDeque<PendingPost>,
    issues: Vec<Issue>,
}

impl ReplayEmitter {
    pub fn new() -> ReplayEmitter {
        ReplayEmitter { queue: VecDeque::new(), issues: Vec::new() }
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Outstanding, unresolved postback count — used by callers deciding whether `flush` still
    /// has work to do before a frame boundary can be considered fully drained.
    pub fn pending_postbacks(&self) -> usize {
        self.queue.len()
    }

    /// Resolves every queued postback in submission order (§4.8: "buffers postback callbacks in
    /// submission order; when the replay device acknowledges completion of a span of opcodes,
    /// invokes each callback").
    pub fn flush(&mut self, state: &State) {
        while let Some(pending) = self.queue.pop_front() {
            let mut reader = PoolReader { pools: &state.pools, slice: Slice { pool: pending.pool, base: pending.base, count: pending.len, element_size: 1 } };
            (pending.callback)(&mut reader, None);
        }
    }

    /// Cancellation (§4.8 Cancellation): flushes every outstanding postback with a cancellation
    /// error instead of resolving its bytes, and records an issue per dropped callback.
    pub fn cancel(&mut self, state: &State) {
        while let Some(pending) = self.queue.pop_front() {
            let mut reader = PoolReader { pools: &state.pools, slice: Slice { pool: pending.pool, base: pending.base, count: pending.len, element_size: 1 } };
            (pending.callback)(&mut reader, Some(Error::Cancelled));
            self.issues.push(Issue {
                command_id: CommandId::root(0),
                severity: Severity::Warning,
                message: "postback dropped by cancellation".to_string(),
            });
        }
    }
}

impl Default for ReplayEmitter {
    fn default() -> ReplayEmitter {
        ReplayEmitter::new()
    }
}

impl Emitter for ReplayEmitter {
    fn reserve_memory(&mut self, len: usize) -> Result<Pool> {
        if len == 0 {
            return Err(Error::InvalidRequest("reserve_memory called with a zero-length span"));
        }
        Ok(Pool::ApplicationArena)
    }

    fn post(&mut self, len: usize, callback: PostCallback) -> Result<()> {
        self.queue.push_back(PendingPost { len, pool: Pool::ApplicationArena, base: 0, callback });
        Ok(())
    }

    fn map_memory(&mut self, _pool: Pool) -> Result<()> {
        Ok(())
    }
}

/// Wires [`ReplayEmitter`] in as the pipeline's [`Sink`]: every command that survives the
/// transform chain lands here, advances `state` through its replay-mode mutation, and the
/// emitter's own `reserve_memory`/`post`/`map_memory` calls run inline as part of that mutation.
pub struct ReplaySink<'a> {
    emitter: &'a mut ReplayEmitter,
}

impl<'a> ReplaySink<'a> {
    pub fn new(emitter: &'a mut ReplayEmitter) -> ReplaySink<'a> {
        ReplaySink { emitter }
    }
}

impl<'a> Sink for ReplaySink<'a> {
    fn accept(&mut self, state: &mut State, id: CommandId, cmd: Command) {
        // Replayed against the command's own captor thread (§3/§4.4), not the emitter's thread —
        // a multi-threaded capture must still resolve each command against the context its own
        // thread had current, matching the analysis-side fix in `replay_core::graph::build`.
        let thread = cmd.thread();
        let mut recorder = replay_core::graph::NullRecorder;
        if let Err(e) = cmd.mutate(thread, state, &mut recorder, Some(self.emitter)) {
            log::warn!("replay emitter: command {:?} failed during replay: {}", id, e);
            self.emitter.issues.push(Issue { command_id: id, severity: Severity::Error, message: e.to_string() });
        }
    }
}

/// A single requested framebuffer readback (§6 External Interfaces: `FramebufferRequest`).
pub struct FramebufferRequest {
    pub after: CommandId,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::object::{Handle, ObjectKind};
    use replay_core::CommandInner;

    #[test]
    fn replay_sink_applies_a_gen_object_exactly_once() {
        let mut state = State::new();
        state.thread_to_context.insert(1, replay_core::Context::new());
        let mut emitter = ReplayEmitter::new();
        let mut sink = ReplaySink::new(&mut emitter);
        sink.accept(&mut state, CommandId::root(1), Command::new(1, CommandInner::GenObject { kind: ObjectKind::Buffer, handle: Handle(1) }));
        let ctx = state.get_context(1).unwrap();
        assert_eq!(ctx.shared.borrow().iter().count(), 1);
    }

    #[test]
    fn cancel_records_one_issue_per_dropped_postback() {
        let state = State::new();
        let mut emitter = ReplayEmitter::new();
        emitter.post(4, Box::new(|_reader, _err| {})).unwrap();
        emitter.post(4, Box::new(|_reader, _err| {})).unwrap();
        emitter.cancel(&state);
        assert_eq!(emitter.issues().len(), 2);
    }

    #[test]
    fn replay_sink_routes_emit_postback_through_the_emitter_queue_not_a_synthetic_pool() {
        let mut state = State::new();
        state.thread_to_context.insert(1, replay_core::Context::new());
        let key = CommandId::root(7);
        let resolved = std::rc::Rc::new(std::cell::RefCell::new(None));
        let resolved_clone = resolved.clone();
        state.postbacks.borrow_mut().insert(
            key,
            Box::new(move |result| {
                *resolved_clone.borrow_mut() = Some(result);
            }),
        );

        let mut emitter = ReplayEmitter::new();
        let mut sink = ReplaySink::new(&mut emitter);
        sink.accept(
            &mut state,
            key,
            Command::new(
                1,
                CommandInner::EmitPostback { key, len: 8, width: 2, height: 1, format: replay_format::ImageFormat::rgba8() },
            ),
        );

        // Went through `Emitter::post` into the real queue, not resolved synchronously.
        assert_eq!(emitter.pending_postbacks(), 1);
        assert!(resolved.borrow().is_none());

        emitter.flush(&state);
        assert_eq!(emitter.pending_postbacks(), 0);
        let result = resolved.borrow_mut().take().expect("callback must fire after flush");
        let image = result.expect("bytes must resolve, not error");
        assert_eq!(image.bytes.len(), 8);
        assert_eq!((image.width, image.height), (2, 1));
    }
}
