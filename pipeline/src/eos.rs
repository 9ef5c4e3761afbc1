//! **4.7.5 DestroyResourcesAtEOS** — end of a capture often has no matching deletes for
//! short-lived resources, or for whatever was still alive when the trace stopped. Tracks every
//! live object by observing `GenObject`/`DeleteObject` as they pass through, and at `flush`
//! emits a synthetic `DeleteObject` for everything still outstanding, so a replay target never
//! leaks resources the original capture device would have cleaned up at process exit.

use crate::chain::{Downstream, Transformer};
use fxhash::FxHashSet;
use replay_core::command::CommandId;
use replay_core::object::{Handle, ObjectKind};
use replay_core::{Command, CommandInner, ThreadId};

pub struct DestroyResourcesAtEOS {
    thread: ThreadId,
    live: FxHashSet<(ObjectKind, Handle)>,
    next_atom: u64,
}

impl DestroyResourcesAtEOS {
    pub fn new(thread: ThreadId, next_atom: u64) -> DestroyResourcesAtEOS {
        DestroyResourcesAtEOS { thread, live: FxHashSet::default(), next_atom }
    }
}

impl Transformer for DestroyResourcesAtEOS {
    fn on_command(&mut self, id: CommandId, cmd: Command, downstream: &mut dyn Downstream) {
        match &cmd.inner {
            CommandInner::GenObject { kind, handle } if !handle.is_none() && !handle.is_reserved() => {
                self.live.insert((*kind, *handle));
            }
            CommandInner::DeleteObject { kind, handle } => {
                self.live.remove(&(*kind, *handle));
            }
            _ => {}
        }
        downstream.dispatch(id, cmd);
    }

    fn flush(&mut self, downstream: &mut dyn Downstream) {
        if self.live.is_empty() {
            return;
        }
        log::debug!("DestroyResourcesAtEOS: closing {} object(s) left open at end of stream", self.live.len());
        // Reserved/virtual handles (the default framebuffer/renderbuffer, `Handle::NONE`, any
        // top-bit-set sentinel) are never owned by the application and must never be targeted by
        // a synthetic delete (§4.7.5).
        let mut remaining: Vec<(ObjectKind, Handle)> =
            self.live.drain().filter(|(_, h)| !h.is_none() && !h.is_reserved()).collect();
        remaining.sort_by_key(|(_, h)| h.0);
        for (kind, handle) in remaining {
            let id = CommandId::root(self.next_atom);
            self.next_atom += 1;
            downstream.dispatch(id, Command::new(self.thread, CommandInner::DeleteObject { kind, handle }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Pipeline, Sink};
    use replay_core::State;

    struct CollectSink(Vec<(CommandId, Command)>);

    impl Sink for CollectSink {
        fn accept(&mut self, state: &mut State, id: CommandId, cmd: Command) {
            let mut recorder = replay_core::graph::NullRecorder;
            cmd.mutate(1, state, &mut recorder, None).unwrap();
            self.0.push((id, cmd));
        }
    }

    #[test]
    fn an_object_never_deleted_gets_a_synthetic_delete_at_flush() {
        let mut state = State::new();
        state.thread_to_context.insert(1, replay_core::Context::new());
        let mut pipeline = Pipeline::new();
        pipeline.push(Box::new(DestroyResourcesAtEOS::new(1, 100)));
        let mut sink = CollectSink(Vec::new());
        let commands = vec![(
            CommandId::root(1),
            Command::new(1, CommandInner::GenObject { kind: ObjectKind::Buffer, handle: Handle(7) }),
        )];
        pipeline.run(&mut state, 1, commands, &mut sink);
        let deletes: Vec<_> = sink
            .0
            .iter()
            .filter(|(_, cmd)| matches!(cmd.inner, CommandInner::DeleteObject { handle, .. } if handle == Handle(7)))
            .collect();
        assert_eq!(deletes.len(), 1);
    }

    #[test]
    fn reserved_handles_are_never_targeted_by_a_synthetic_delete() {
        let mut state = State::new();
        state.thread_to_context.insert(1, replay_core::Context::new());
        let mut pipeline = Pipeline::new();
        pipeline.push(Box::new(DestroyResourcesAtEOS::new(1, 100)));
        let mut sink = CollectSink(Vec::new());
        let reserved = Handle::reserved(0);
        let commands = vec![(
            CommandId::root(1),
            Command::new(1, CommandInner::GenObject { kind: ObjectKind::Renderbuffer, handle: reserved }),
        )];
        pipeline.run(&mut state, 1, commands, &mut sink);
        assert!(!sink.0.iter().any(|(_, cmd)| matches!(cmd.inner, CommandInner::DeleteObject { .. })));
    }
}
