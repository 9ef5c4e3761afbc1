//! Dead-Code Eliminator (§4.6).
//!
//! Given a set of requested output command indices, computes the minimal subset of prior
//! commands whose removal cannot change the observable content of any requested output. Walks
//! the dependency graph (§4.5) backward exactly once.

use crate::graph::DependencyGraph;
use crate::key::StateKey;
use fxhash::FxHashSet;

/// Runs the backward liveness walk described in §4.6 and returns the indices to retain, in
/// ascending order.
pub fn eliminate(graph: &DependencyGraph, requested: &[usize]) -> Vec<usize> {
    let mut live_keys: FxHashSet<StateKey> = graph.roots.iter().copied().collect();
    let mut live_commands: FxHashSet<usize> = FxHashSet::default();

    for (i, entry) in graph.entries.iter().enumerate() {
        if entry.keep_alive || entry.aborted {
            live_commands.insert(i);
        }
    }

    let requested: FxHashSet<usize> = requested.iter().copied().collect();
    let last = graph.entries.len();

    for i in (0..last).rev() {
        let entry = &graph.entries[i];
        let is_requested = requested.contains(&i);
        let writes_intersect_live = entry.writes.iter().any(|k| live_keys.contains(k));

        if is_requested {
            live_commands.insert(i);
            for k in &entry.reads {
                live_keys.insert(*k);
            }
        } else if live_commands.contains(&i) || writes_intersect_live {
            live_commands.insert(i);
            for k in &entry.reads {
                live_keys.insert(*k);
            }
            // Pure writes (not also modifies) are dominated by this command and no longer need
            // to stay live further back in the walk.
            for k in &entry.writes {
                if !entry.modifies.contains(k) {
                    live_keys.remove(k);
                }
            }
        }
    }

    let mut retained: Vec<usize> = live_commands.into_iter().collect();
    retained.sort_unstable();
    log::debug!("DCE retained {} of {} commands", retained.len(), last);
    retained
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CommandEntry;

    fn entry(reads: &[StateKey], writes: &[StateKey], modifies: &[StateKey], keep_alive: bool) -> CommandEntry {
        CommandEntry {
            reads: reads.iter().copied().collect(),
            writes: writes.iter().copied().collect(),
            modifies: modifies.iter().copied().collect(),
            keep_alive,
            aborted: false,
        }
    }

    #[test]
    fn empty_graph_yields_empty_retained_set() {
        let graph = DependencyGraph::default();
        assert!(eliminate(&graph, &[]).is_empty());
    }

    #[test]
    fn a_write_with_no_downstream_reader_is_dropped() {
        use crate::object::Handle;
        let mut graph = DependencyGraph::default();
        // command 0 writes TextureData(1,0), nothing ever reads it, nothing requested.
        graph.entries.push(entry(&[], &[StateKey::TextureData(Handle(1), 0)], &[], false));
        assert!(eliminate(&graph, &[]).is_empty());
    }

    #[test]
    fn a_requested_command_retains_its_read_dependencies() {
        use crate::object::Handle;
        let mut graph = DependencyGraph::default();
        let tex_key = StateKey::TextureData(Handle(1), 0);
        // command 0: TexImage2D writes tex data. command 1: Draw reads tex data, requested.
        graph.entries.push(entry(&[], &[tex_key], &[tex_key], false));
        graph.entries.push(entry(&[tex_key], &[], &[], false));
        let retained = eliminate(&graph, &[1]);
        assert_eq!(retained, vec![0, 1]);
    }

    #[test]
    fn dce_is_idempotent() {
        use crate::object::Handle;
        let mut graph = DependencyGraph::default();
        let tex_key = StateKey::TextureData(Handle(1), 0);
        graph.entries.push(entry(&[], &[tex_key], &[tex_key], false));
        graph.entries.push(entry(&[tex_key], &[], &[], false));
        graph.entries.push(entry(&[], &[], &[], true)); // unrelated, keep_alive
        let first = eliminate(&graph, &[1]);
        let second = eliminate(&graph, &[1]);
        assert_eq!(first, second);
    }
}
