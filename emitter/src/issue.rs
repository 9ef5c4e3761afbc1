//! Re-exports the shared diagnostic type (§11 supplement) — see `replay_core::issue` for the
//! definition. Kept as its own module here, matching the teacher's pattern of one file per
//! concern, even though the type itself lives in `core` so `replay-pipeline`'s transformers can
//! append to the same sink without this crate depending back on `pipeline` for it.

pub use replay_core::issue::{Issue, IssueSink, Severity};
