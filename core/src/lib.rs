//! State Store, Command Model, and Dependency-Graph core (§4.2-§4.6).
//!
//! Consumed by `replay-pipeline`'s transformers and by `replay-emitter`'s replay-mode mutation
//! of the same [`Command`] values this crate defines.

pub mod command;
pub mod config;
pub mod dce;
pub mod emit;
pub mod error;
pub mod external;
pub mod graph;
pub mod image;
pub mod issue;
pub mod key;
pub mod object;
pub mod pool;
pub mod recreate;
pub mod state;

pub use command::{Command, CommandFlags, CommandId, CommandInner, Extra};
pub use config::ReplayConfig;
pub use error::{Error, Reason, Result};
pub use external::{CaptureSource, Device, Resource, ResourceData};
pub use image::{new_postback_table, Image2D, ImageResult, PostCallback, PostbackTable};
pub use issue::{Issue, IssueSink, Severity};
pub use key::StateKey;
pub use object::{Handle, Object, ObjectKind};
pub use pool::{ContentId, MemoryPools, Observation, Pool, Slice};
pub use state::{Attachment, Context, State, ThreadId};
