//! The transformer chain plumbing (§4.7): a `Transformer` trait with `on_command`/`flush`, and
//! a `Pipeline` that threads `(CommandId, Command)` pairs through `Vec<Box<dyn Transformer>>`
//! (§9 design note: "Transformer -> trait with on_command and flush; the pipeline is a
//! Vec<Box<dyn Transformer>>").

use replay_core::{Command, CommandId, State, ThreadId};

/// What a transformer (or the final sink) is handed to forward a command downstream.
pub trait Downstream {
    fn dispatch(&mut self, id: CommandId, cmd: Command);

    /// Read-only access to the state `dispatch` mutates. A transformer calling this before its
    /// own `dispatch(id, cmd)` sees state as of the *previous* command; calling it after sees
    /// this command's own mutation already applied, since `dispatch` recurses synchronously all
    /// the way to the terminal sink before returning. `UndefinedFramebufferFill` (§4.7.4) and
    /// `ReadFramebuffer` (§4.7.2) both rely on the latter to make a state-dependent decision
    /// without carrying their own shadow copy of `State`.
    fn state(&self) -> &State;
}

pub trait Transformer {
    fn on_command(&mut self, id: CommandId, cmd: Command, downstream: &mut dyn Downstream);

    /// Called once at end of stream, after every command has been dispatched. The default does
    /// nothing; `DestroyResourcesAtEOS` is the only transformer with non-trivial flush work in
    /// this port of the spec (§4.7.5).
    fn flush(&mut self, _downstream: &mut dyn Downstream) {}
}

/// The terminus of the chain: usually the replay emitter, or (for analysis-only runs, and in
/// tests) a plain collector.
pub trait Sink {
    fn accept(&mut self, state: &mut State, id: CommandId, cmd: Command);
}

/// One link of the recursive chain: owns the remaining transformers, the shared state, and the
/// final sink. `dispatch` either hands the command to the next transformer (with itself as that
/// transformer's downstream) or, once transformers are exhausted, mutates `state` and forwards
/// to `sink`.
pub struct Chain<'a> {
    transformers: &'a mut [Box<dyn Transformer>],
    state: &'a mut State,
    thread: ThreadId,
    sink: &'a mut dyn Sink,
}

impl<'a> Downstream for Chain<'a> {
    fn dispatch(&mut self, id: CommandId, cmd: Command) {
        match self.transformers.split_first_mut() {
            Some((first, rest)) => {
                let mut sub = Chain { transformers: rest, state: self.state, thread: self.thread, sink: self.sink };
                first.on_command(id, cmd, &mut sub);
            }
            None => {
                // The terminal sink owns whatever `mutate` call actually matters here (with an
                // emitter during real replay, or a bare `NullRecorder`/no-emitter call for a
                // collector used in tests) — dispatching must not also mutate `state` itself, or
                // every command downstream of the last transformer would run its state
                // transition twice.
                self.sink.accept(self.state, id, cmd);
            }
        }
    }

    fn state(&self) -> &State {
        self.state
    }
}

impl<'a> Chain<'a> {
    fn flush_rest(&mut self) {
        match self.transformers.split_first_mut() {
            Some((first, rest)) => {
                let mut sub = Chain { transformers: rest, state: self.state, thread: self.thread, sink: self.sink };
                first.flush(&mut sub);
                sub.flush_rest();
            }
            None => {}
        }
    }
}

pub struct Pipeline {
    transformers: Vec<Box<dyn Transformer>>,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline { transformers: Vec::new() }
    }

    pub fn push(&mut self, transformer: Box<dyn Transformer>) {
        self.transformers.push(transformer);
    }

    /// Runs `commands` through the whole chain in order, then flushes every transformer
    /// front-to-back (§4.7: "flush(downstream) called at end of stream").
    pub fn run(
        &mut self,
        state: &mut State,
        thread: ThreadId,
        commands: Vec<(CommandId, Command)>,
        sink: &mut dyn Sink,
    ) {
        let mut chain = Chain { transformers: &mut self.transformers, state, thread, sink };
        for (id, cmd) in commands {
            chain.dispatch(id, cmd);
        }
        chain.flush_rest();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::object::{Handle, ObjectKind};
    use replay_core::CommandInner;

    /// Mutates `state` exactly once per command, the way `ReplaySink` does.
    struct MutatingSink;

    impl Sink for MutatingSink {
        fn accept(&mut self, state: &mut State, _id: CommandId, cmd: Command) {
            let mut recorder = replay_core::graph::NullRecorder;
            cmd.mutate(1, state, &mut recorder, None).unwrap();
        }
    }

    /// Regression test for a prior bug where `Chain::dispatch`'s terminal branch mutated `state`
    /// itself *and then* handed off to the sink (which mutates again): a buffer's `GenObject`
    /// would land in the shared-objects slotmap twice (one orphaned by the second insert
    /// overwriting `by_handle`), even though lookups by handle only ever show one.
    #[test]
    fn terminal_dispatch_mutates_state_exactly_once() {
        let mut state = State::new();
        state.thread_to_context.insert(1, replay_core::Context::new());
        let mut pipeline = Pipeline::new();
        let mut sink = MutatingSink;
        let commands = vec![(
            CommandId::root(1),
            Command::new(1, CommandInner::GenObject { kind: ObjectKind::Buffer, handle: Handle(1) }),
        )];
        pipeline.run(&mut state, 1, commands, &mut sink);
        let ctx = state.get_context(1).unwrap();
        let count = ctx.shared.borrow().iter().count();
        assert_eq!(count, 1, "GenObject must be applied exactly once per command");
    }
}
