//! Postback delivery (§4.7.2, §4.8): the result shape handed back to a framebuffer-readback
//! requester, and the side table that lets a `CommandInner::EmitPostback` opcode find the
//! closure a transformer registered for it.
//!
//! Commands must stay `Clone` (§3), so the postback closure itself is never carried on the
//! command value — it lives here, keyed by the `CommandId` the emitting opcode names, shared
//! between `replay-pipeline` (which registers callbacks on [`State::postbacks`](crate::state::State))
//! and `EmitPostback`'s own `mutate`, which is the sole place that removes and resolves them.

use crate::command::CommandId;
use crate::error::Reason;
use fxhash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// `Image2D { width, height, format, bytes }` (§6).
#[derive(Clone, Debug)]
pub struct Image2D {
    pub width: u32,
    pub height: u32,
    pub format: replay_format::ImageFormat,
    pub bytes: Vec<u8>,
}

impl Image2D {
    pub fn new(width: u32, height: u32, format: replay_format::ImageFormat, bytes: Vec<u8>) -> Image2D {
        Image2D { width, height, format, bytes }
    }
}

/// `ImageResult = ok(Image2D) | err(DataUnavailable{reason_code})` (§6).
pub type ImageResult = Result<Image2D, Reason>;

pub type PostCallback = Box<dyn FnOnce(ImageResult)>;

/// Shared between every transformer that schedules a readback and the `EmitPostback` opcode that
/// resolves it; `Rc<RefCell<_>>` so a transformer holding only `&State` can still register a
/// callback through the interior-mutable table (§4.7.2).
pub type PostbackTable = Rc<RefCell<FxHashMap<CommandId, PostCallback>>>;

pub fn new_postback_table() -> PostbackTable {
    Rc::new(RefCell::new(FxHashMap::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image2d_carries_the_bytes_it_was_built_with() {
        let img = Image2D::new(2, 2, replay_format::ImageFormat::rgba8(), vec![0u8; 16]);
        assert_eq!(img.bytes.len(), 16);
    }

    #[test]
    fn postback_table_round_trips_a_registered_callback() {
        let table = new_postback_table();
        table.borrow_mut().insert(CommandId::root(1), Box::new(|_result| {}));
        assert!(table.borrow_mut().remove(&CommandId::root(1)).is_some());
    }
}
