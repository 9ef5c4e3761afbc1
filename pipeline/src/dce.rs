//! **4.7.1 DeadCodeEliminator** — front of chain. Buffers the whole stream, accepts requested
//! output ids via [`DeadCodeEliminator::request`], and at `flush` runs §4.6 over a private
//! analysis-mode state snapshot before forwarding only the retained commands downstream.

use crate::chain::{Downstream, Transformer};
use fxhash::FxHashSet;
use replay_core::command::CommandId;
use replay_core::{dce, graph, Command, State};

pub struct DeadCodeEliminator {
    buffered: Vec<(CommandId, Command)>,
    requested: FxHashSet<CommandId>,
}

impl DeadCodeEliminator {
    /// Each buffered command keeps its own captor thread (§3/§4.4); the eliminator itself does
    /// not need to be told which thread is "current" the way synthesizing transformers do.
    pub fn new() -> DeadCodeEliminator {
        DeadCodeEliminator { buffered: Vec::new(), requested: FxHashSet::default() }
    }

    /// Installs `id` as a live output point (§4.6: "given a set of requested command indices").
    pub fn request(&mut self, id: CommandId) {
        self.requested.insert(id);
    }
}

impl Default for DeadCodeEliminator {
    fn default() -> DeadCodeEliminator {
        DeadCodeEliminator::new()
    }
}

impl Transformer for DeadCodeEliminator {
    fn on_command(&mut self, id: CommandId, cmd: Command, _downstream: &mut dyn Downstream) {
        // The whole stream must be seen before liveness can be decided, so every command is
        // buffered here rather than forwarded immediately.
        self.buffered.push((id, cmd));
    }

    fn flush(&mut self, downstream: &mut dyn Downstream) {
        let mut analysis_state = State::new();
        let built = graph::build(&mut analysis_state, &self.buffered);

        let requested_indices: Vec<usize> = self
            .buffered
            .iter()
            .enumerate()
            .filter_map(|(i, (id, _))| if self.requested.contains(id) { Some(i) } else { None })
            .collect();

        let retained = dce::eliminate(&built, &requested_indices);
        log::debug!(
            "DeadCodeEliminator: retaining {} of {} buffered commands",
            retained.len(),
            self.buffered.len()
        );

        let mut buffered = std::mem::take(&mut self.buffered);
        let retained_set: FxHashSet<usize> = retained.into_iter().collect();
        for (i, (id, cmd)) in buffered.drain(..).enumerate() {
            if retained_set.contains(&i) {
                downstream.dispatch(id, cmd);
            }
        }
    }
}
