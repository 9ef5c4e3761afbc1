//! Result types handed back to a framebuffer-readback requester (§6 External Interfaces).
//!
//! Re-exported from `replay-core` rather than redefined here: `EmitPostback`'s `mutate` builds
//! the `Image2D` directly, so the emitter, the pipeline's `ReadFramebuffer`, and core's own
//! opcode all have to agree on one shape, not three.

pub use replay_core::image::{Image2D, ImageResult};
