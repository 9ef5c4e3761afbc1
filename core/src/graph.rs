//! Dependency-Graph Builder (§4.5).
//!
//! Walks the command stream once, invoking each command's `mutate` in analysis mode (no
//! emitter), and records the per-command abstract reads/writes/modifies this produces. The
//! per-command analysis invariant (§4.5): a failing analysis mutation flags the entry
//! `aborted` rather than propagating the error up through the walk.

use crate::command::{Command, CommandId};
use crate::key::StateKey;
use crate::state::State;
use fxhash::FxHashSet;

/// Sink a command's `mutate` records its abstract state accesses into. The dependency-graph
/// builder passes a live recorder bound to the command's [`CommandEntry`]; the replay path
/// passes [`NullRecorder`] since no graph is being built.
pub trait Recorder {
    /// Records a read of `key`; automatically also records every ancestor (§9: reading a child
    /// implies reading all its ancestors).
    fn read(&mut self, key: StateKey);
    /// Records a pure write of `key` (dominates prior writes; does not imply a read).
    fn write(&mut self, key: StateKey);
    /// Records a read-then-write of `key` (§3 DependencyGraph: `modifies`).
    fn modify(&mut self, key: StateKey);
    /// Forces retention of the command regardless of graph reachability (§4.5: "any command not
    /// handled explicitly: keep_alive = true").
    fn keep_alive(&mut self);
}

pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn read(&mut self, _key: StateKey) {}
    fn write(&mut self, _key: StateKey) {}
    fn modify(&mut self, _key: StateKey) {}
    fn keep_alive(&mut self) {}
}

#[derive(Clone, Debug, Default)]
pub struct CommandEntry {
    pub reads: FxHashSet<StateKey>,
    pub writes: FxHashSet<StateKey>,
    pub modifies: FxHashSet<StateKey>,
    pub keep_alive: bool,
    pub aborted: bool,
}

struct EntryRecorder<'a> {
    entry: &'a mut CommandEntry,
}

impl<'a> Recorder for EntryRecorder<'a> {
    fn read(&mut self, key: StateKey) {
        for k in key.ancestors() {
            self.entry.reads.insert(k);
        }
    }

    fn write(&mut self, key: StateKey) {
        self.entry.writes.insert(key);
    }

    fn modify(&mut self, key: StateKey) {
        self.entry.writes.insert(key);
        self.entry.modifies.insert(key);
    }

    fn keep_alive(&mut self) {
        self.entry.keep_alive = true;
    }
}

/// For each command index: its reads/writes/modifies, a keep-alive flag, an aborted flag. Also
/// the set of "root" keys that must never be pruned — any key targeted by a readback request is
/// installed here even if nothing in the stream reads it (§4.5).
#[derive(Default)]
pub struct DependencyGraph {
    pub entries: Vec<CommandEntry>,
    pub roots: FxHashSet<StateKey>,
}

impl DependencyGraph {
    pub fn add_root(&mut self, key: StateKey) {
        self.roots.insert(key);
    }
}

/// Runs every command's analysis-mode mutation against `state` and records the resulting graph.
/// `state` is consumed destructively with respect to the ordinary meaning of "analysis" — the
/// same `mutate` routine is used for both analysis and replay (§4.4), so the state store really
/// does advance; callers that need both a graph and an untouched initial state should clone (or
/// rebuild) the state before building the graph over it, the way `DeadCodeEliminator` does.
///
/// Each command is analyzed against its own captor thread (`cmd.thread()`, §3/§4.4), not a
/// single pipeline-wide thread — a stream captured from several application threads keeps each
/// command's state reads/writes scoped to the context that thread actually had current.
pub fn build(state: &mut State, commands: &[(CommandId, Command)]) -> DependencyGraph {
    let mut graph = DependencyGraph::default();
    for (id, cmd) in commands {
        let mut entry = CommandEntry::default();
        let flags = cmd.flags();
        if flags.contains(crate::command::CommandFlags::KEEP_ALIVE_HINT) {
            entry.keep_alive = true;
        }
        let result = {
            let mut recorder = EntryRecorder { entry: &mut entry };
            cmd.mutate(cmd.thread(), state, &mut recorder, None)
        };
        if let Err(e) = result {
            log::warn!("command {:?} aborted during analysis: {}", id, e);
            entry.aborted = true;
        }
        graph.entries.push(entry);
    }
    graph
}
