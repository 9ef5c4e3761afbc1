//! **4.7.4 UndefinedFramebufferFill** — after a `SwapBuffers` that invalidated the default
//! framebuffer (§4.3 `default_framebuffer_invalidated`), content read back before anything draws
//! into it again is driver-undefined. This transformer injects a deterministic checker-pattern
//! clear right after the swap so replay produces the same bytes on every target, rather than
//! whatever garbage the driver happened to leave behind.

use crate::chain::{Downstream, Transformer};
use replay_core::command::{CheckerPattern, ClearMask, CommandId};
use replay_core::object::Handle;
use replay_core::{Command, CommandInner, State, ThreadId};

pub struct UndefinedFramebufferFill {
    thread: ThreadId,
}

impl UndefinedFramebufferFill {
    pub fn new(thread: ThreadId) -> UndefinedFramebufferFill {
        UndefinedFramebufferFill { thread }
    }
}

impl Transformer for UndefinedFramebufferFill {
    fn on_command(&mut self, id: CommandId, cmd: Command, downstream: &mut dyn Downstream) {
        let is_swap = matches!(cmd.inner, CommandInner::SwapBuffers);
        downstream.dispatch(id, cmd);
        if !is_swap {
            return;
        }
        // `dispatch` above recursed synchronously through the rest of the chain and the terminal
        // sink, so `downstream.state()` now reflects this SwapBuffers' own mutation — in
        // particular `default_framebuffer_invalidated`, set exactly when `preserve_buffers_on_swap`
        // is false (§4.3). Only inject the fill when it's actually needed: a target that
        // preserves buffers across swap must not have its preserved color content clobbered.
        if !needs_fill(downstream.state(), self.thread) {
            return;
        }
        downstream.dispatch(
            id.derive(1),
            Command::new(
                self.thread,
                CommandInner::BindFramebuffer { read: false, draw: true, framebuffer: Handle::NONE },
            ),
        );
        downstream.dispatch(
            id.derive(2),
            Command::new(
                self.thread,
                CommandInner::Clear {
                    mask: ClearMask { color: true, depth: true, stencil: true },
                    scissor: None,
                    pattern: Some(CheckerPattern::magenta_black()),
                },
            ),
        );
    }
}

/// True when `state`'s current context for `thread` has an invalidated default framebuffer —
/// exposed so a `Sink`/emitter wired with state access can skip the fill when it's provably
/// unnecessary, without requiring every transformer to carry a `&State`.
pub fn needs_fill(state: &State, thread: ThreadId) -> bool {
    state.get_context(thread).map_or(false, |ctx| ctx.default_framebuffer_invalidated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Pipeline, Sink};
    use replay_core::CommandId;

    struct MutatingSink;

    impl Sink for MutatingSink {
        fn accept(&mut self, state: &mut State, _id: CommandId, cmd: Command) {
            let mut recorder = replay_core::graph::NullRecorder;
            cmd.mutate(1, state, &mut recorder, None).unwrap();
        }
    }

    fn run_swap(preserve_buffers_on_swap: bool) -> Vec<(CommandId, Command)> {
        let mut state = State::new();
        let mut ctx = replay_core::Context::new();
        ctx.info.preserve_buffers_on_swap = preserve_buffers_on_swap;
        state.thread_to_context.insert(1, ctx);

        let mut pipeline = Pipeline::new();
        pipeline.push(Box::new(UndefinedFramebufferFill::new(1)));

        struct Capture(Vec<(CommandId, Command)>);
        struct CaptureSink<'a>(&'a mut Capture);
        impl<'a> Sink for CaptureSink<'a> {
            fn accept(&mut self, state: &mut State, id: CommandId, cmd: Command) {
                let mut recorder = replay_core::graph::NullRecorder;
                cmd.mutate(1, state, &mut recorder, None).unwrap();
                self.0 .0.push((id, cmd));
            }
        }
        let mut capture = Capture(Vec::new());
        let mut sink = CaptureSink(&mut capture);
        pipeline.run(&mut state, 1, vec![(CommandId::root(1), Command::new(1, CommandInner::SwapBuffers))], &mut sink);
        capture.0
    }

    #[test]
    fn fill_is_injected_after_a_swap_that_invalidates_the_default_framebuffer() {
        let dispatched = run_swap(false);
        assert!(dispatched.iter().any(|(_, cmd)| matches!(cmd.inner, CommandInner::Clear { .. })));
    }

    #[test]
    fn fill_is_skipped_when_buffers_are_preserved_across_swap() {
        let dispatched = run_swap(true);
        assert!(!dispatched.iter().any(|(_, cmd)| matches!(cmd.inner, CommandInner::Clear { .. })));
    }
}
