//! Transform Pipeline (§4.7): a fixed chain of [`chain::Transformer`]s a captured command stream
//! passes through on its way to replay. See `chain::Pipeline` for the plumbing and each module
//! for one named stage.

pub mod chain;
pub mod compat;
pub mod dce;
pub mod eos;
pub mod fill;
pub mod readback;
pub mod tweaker;

pub use chain::{Downstream, Pipeline, Sink, Transformer};
pub use compat::{CompatibilityRewrite, DeviceCaps};
pub use dce::DeadCodeEliminator;
pub use eos::DestroyResourcesAtEOS;
pub use fill::UndefinedFramebufferFill;
pub use readback::ReadFramebuffer;
pub use tweaker::Tweaker;

use replay_core::{CommandId, IssueSink, ThreadId};

/// Builds the stock pipeline (§4.7) in the dispatch order this port actually requires.
///
/// The spec's own section numbering lists `ReadFramebuffer` (§4.7.2) ahead of
/// `UndefinedFramebufferFill` (§4.7.4), but that is a listing order, not a wire order: a
/// readback anchored right after an invalidating `SwapBuffers` must see the fill pattern that
/// `UndefinedFramebufferFill` injects, or it captures undefined driver bytes instead of the
/// deterministic checker pattern. This builder therefore places `UndefinedFramebufferFill`
/// directly after `DeadCodeEliminator` and before `ReadFramebuffer` — see `DESIGN.md` for the
/// full reasoning.
pub fn stock_pipeline(
    thread: ThreadId,
    requested_outputs: &[CommandId],
    next_synthetic_atom: u64,
    caps: DeviceCaps,
    issues: IssueSink,
) -> Pipeline {
    let mut dce = DeadCodeEliminator::new();
    for id in requested_outputs {
        dce.request(*id);
    }

    let mut pipeline = Pipeline::new();
    pipeline.push(Box::new(dce));
    pipeline.push(Box::new(UndefinedFramebufferFill::new(thread)));
    pipeline.push(Box::new(ReadFramebuffer::new(thread)));
    pipeline.push(Box::new(CompatibilityRewrite::with_issue_sink(caps, issues)));
    pipeline.push(Box::new(DestroyResourcesAtEOS::new(thread, next_synthetic_atom)));
    pipeline
}
