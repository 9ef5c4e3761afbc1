//! **Tweaker** — not a transformer itself; a utility used inside transformers that need to
//! temporarily change state (§4.7). `do_and_undo` only pushes an undo step when the target
//! value actually differs from the current one, so unnecessary state thrash is elided — the
//! same "only emit if it changed" shape as the teacher's `render-gl::command::state` state
//! cache.

use crate::chain::Downstream;
use replay_core::command::CommandId;
use replay_core::Command;

pub struct Tweaker {
    undo_stack: Vec<(CommandId, Command)>,
    next_derivation: u32,
    anchor: CommandId,
}

impl Tweaker {
    pub fn new(anchor: CommandId) -> Tweaker {
        Tweaker { undo_stack: Vec::new(), next_derivation: 1, anchor }
    }

    fn derive_id(&mut self) -> CommandId {
        let id = self.anchor.derive(self.next_derivation);
        self.next_derivation += 1;
        id
    }

    /// Emits `do_cmd` downstream now, and pushes `undo_cmd` onto the undo stack, only if
    /// `changed` is true (i.e. the caller already determined the target value differs from
    /// what State currently holds).
    pub fn do_and_undo(&mut self, downstream: &mut dyn Downstream, changed: bool, do_cmd: Command, undo_cmd: Command) {
        if !changed {
            return;
        }
        let id = self.derive_id();
        downstream.dispatch(id, do_cmd);
        self.undo_stack.push((self.derive_id(), undo_cmd));
    }

    /// Pops every pending undo in reverse (LIFO) order, emitting each downstream.
    pub fn revert(&mut self, downstream: &mut dyn Downstream) {
        while let Some((id, cmd)) = self.undo_stack.pop() {
            downstream.dispatch(id, cmd);
        }
    }
}
