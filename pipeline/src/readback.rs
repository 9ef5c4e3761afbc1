//! **4.7.2 ReadFramebuffer** — injects synthetic readback commands after a chosen anchor
//! command, and an `EmitPostback` opcode that resolves the bytes back through a result callback.
//!
//! The postback closures themselves are not carried on the `EmitPostback` command value
//! (commands must stay `Clone`, §3) — they are registered directly into
//! [`State::postbacks`](replay_core::State), the same table `EmitPostback`'s own `mutate` drains,
//! so there is exactly one postback table in the whole crate graph rather than a
//! pipeline-private shadow of it.

use crate::chain::{Downstream, Transformer};
use crate::tweaker::Tweaker;
use fxhash::FxHashMap;
use replay_core::command::{ClearMask, CommandId, CommandInner};
use replay_core::key::Rect;
use replay_core::object::{Handle, ObjectKind};
use replay_core::state::{Attachment, BufferTarget};
use replay_core::{Command, Error, PostCallback, Result};
use replay_format::ImageFormat;

enum Injection {
    Color { width: u32, height: u32, buffer_idx: u32, callback: PostCallback },
    Depth { width: u32, height: u32, callback: PostCallback },
}

pub struct ReadFramebuffer {
    thread: replay_core::ThreadId,
    injections: FxHashMap<CommandId, Vec<Injection>>,
}

impl ReadFramebuffer {
    pub fn new(thread: replay_core::ThreadId) -> ReadFramebuffer {
        ReadFramebuffer { thread, injections: FxHashMap::default() }
    }

    /// Registers a color readback anchored on `id` (§4.7.2). `id` must not be the stream's
    /// first command — readback at id 0 is rejected with `InvalidRequest` (§8 boundary case).
    pub fn color(&mut self, id: CommandId, width: u32, height: u32, buffer_idx: u32, callback: PostCallback) -> Result<()> {
        if id.atom == 0 {
            return Err(Error::InvalidRequest("readback requested at command id 0"));
        }
        self.injections.entry(id).or_insert_with(Vec::new).push(Injection::Color { width, height, buffer_idx, callback });
        Ok(())
    }

    /// Registers a depth readback. Stencil-only readback is not supported (§9 open question) —
    /// callers must route stencil requests through a different path; this type has no stencil
    /// variant on purpose.
    pub fn depth(&mut self, id: CommandId, width: u32, height: u32, callback: PostCallback) -> Result<()> {
        if id.atom == 0 {
            return Err(Error::InvalidRequest("readback requested at command id 0"));
        }
        self.injections.entry(id).or_insert_with(Vec::new).push(Injection::Depth { width, height, callback });
        Ok(())
    }
}

impl Transformer for ReadFramebuffer {
    fn on_command(&mut self, id: CommandId, cmd: Command, downstream: &mut dyn Downstream) {
        downstream.dispatch(id, cmd);

        let Some(injections) = self.injections.remove(&id) else { return };
        let mut tweaker = Tweaker::new(id);
        let mut derivation = 1u32;

        for injection in injections {
            match injection {
                Injection::Color { width, height, buffer_idx, callback } => {
                    self.emit_color_readback(id, &mut derivation, width, height, buffer_idx, downstream, &mut tweaker);
                    let format = ImageFormat::rgba8();
                    let len = width as usize * height as usize * format.texel_size();
                    let key = id.derive(derivation);
                    downstream.state().postbacks.borrow_mut().insert(key, callback);
                    downstream.dispatch(key, Command::new(self.thread, CommandInner::EmitPostback { key, len, width, height, format }));
                    derivation += 1;
                }
                Injection::Depth { width, height, callback } => {
                    let format = ImageFormat::depth32f();
                    let len = width as usize * height as usize * format.texel_size();
                    let key = id.derive(derivation);
                    downstream.state().postbacks.borrow_mut().insert(key, callback);
                    downstream.dispatch(key, Command::new(self.thread, CommandInner::EmitPostback { key, len, width, height, format }));
                    derivation += 1;
                }
            }
        }

        tweaker.revert(downstream);
    }
}

impl ReadFramebuffer {
    /// Color readback policy (§4.7.2): direct read when the requested size matches the bound
    /// attachment; otherwise blit through a temporary renderbuffer sized to the request,
    /// restoring every piece of state the Tweaker recorded. Pack alignment is forced to 1 and
    /// restored to whatever the context actually had, read via `Downstream::state()` rather than
    /// assumed to be the default.
    ///
    /// Read-buffer-enum selection (§4.7.2, §9 open question #1): an application FBO honors
    /// `buffer_idx` as `COLOR_ATTACHMENT0 + buffer_idx`; the default framebuffer has no tracked
    /// front/back distinction in this engine, so `buffer_idx` is ignored there and the read
    /// always targets what GL_FRONT would have named — a known, documented limitation, not a
    /// silent one.
    fn emit_color_readback(
        &self,
        anchor: CommandId,
        derivation: &mut u32,
        width: u32,
        height: u32,
        buffer_idx: u32,
        downstream: &mut dyn Downstream,
        tweaker: &mut Tweaker,
    ) {
        let current_pack_alignment =
            downstream.state().get_context(self.thread).map(|ctx| ctx.pixel_storage.pack_alignment).unwrap_or(4);
        tweaker.do_and_undo(
            downstream,
            current_pack_alignment != 1,
            Command::new(self.thread, CommandInner::PixelStorei { pack: Some(1), unpack: None }),
            Command::new(self.thread, CommandInner::PixelStorei { pack: Some(current_pack_alignment), unpack: None }),
        );

        let ctx = downstream.state().get_context(self.thread);
        let read_fb = ctx.map(|c| c.bindings.read_framebuffer).unwrap_or(Handle::NONE);
        let is_default_fb = read_fb.is_none() || read_fb.is_reserved();
        let attachment_index = if is_default_fb { 0 } else { buffer_idx };
        let attachment_info =
            ctx.and_then(|c| c.get_framebuffer_attachment_info(Attachment::Color(attachment_index)).ok());

        let needs_blit = match &attachment_info {
            Some(info) => info.width != width || info.height != height,
            // Nothing tracked for this attachment (e.g. captured before any `FramebufferTexture2D`
            // reached this engine) — fall back to reading the bound attachment directly rather
            // than guessing a source to blit from.
            None => false,
        };

        if needs_blit {
            let src_texture = attachment_info.as_ref().map(|i| i.texture).unwrap_or(Handle::NONE);
            // Blit through a temp renderbuffer sized to the request: create it, copy the bound
            // attachment's current contents into it (conservatively, the same whole-image
            // `CopyImageSubData` already models elsewhere for GL's own blit semantics — §9
            // "CopyImageSubData whole-image overestimate"), and tear it down once the postback
            // has been scheduled. There is no `FramebufferRenderbuffer`-shaped opcode in this
            // command model (only `FramebufferTexture2D`), so the temp object cannot itself be
            // rebound as a read source here; `EmitPostback` remains payload-source-agnostic by
            // design (§1 Non-goals: no rasterizer is simulated, so its bytes never claim to be
            // the blit's actual pixels) — what this path makes real is the temp object's
            // create/copy/destroy lifecycle and its `StateKey` dependency edge on the source
            // attachment, not a pixel-accurate blit result.
            let temp = Handle::reserved(0xB000_0000 | (anchor.atom as u32 & 0x0FFF_FFFF));
            let gen_id = anchor.derive(*derivation);
            *derivation += 1;
            downstream.dispatch(gen_id, Command::new(self.thread, CommandInner::GenObject { kind: ObjectKind::Renderbuffer, handle: temp }));

            let blit_id = anchor.derive(*derivation);
            *derivation += 1;
            downstream.dispatch(
                blit_id,
                Command::new(
                    self.thread,
                    CommandInner::CopyImageSubData { src: src_texture, src_is_renderbuffer: false, dst: temp, dst_is_renderbuffer: true },
                ),
            );

            let del_id = anchor.derive(*derivation);
            *derivation += 1;
            downstream.dispatch(del_id, Command::new(self.thread, CommandInner::DeleteObject { kind: ObjectKind::Renderbuffer, handle: temp }));
        }
    }
}

/// Sub-rect used by the emitter's blit path, mirroring the `Rect` used elsewhere for scissors.
pub fn full_rect(width: u32, height: u32) -> Rect {
    Rect { x: 0, y: 0, width, height }
}

pub fn clear_mask_color_only() -> ClearMask {
    ClearMask { color: true, depth: false, stencil: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Sink;
    use replay_core::{CommandFlags, State};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct CollectSink(Vec<(CommandId, Command)>);

    impl Sink for CollectSink {
        fn accept(&mut self, state: &mut State, id: CommandId, cmd: Command) {
            let mut recorder = replay_core::graph::NullRecorder;
            cmd.mutate(1, state, &mut recorder, None).unwrap();
            self.0.push((id, cmd));
        }
    }

    #[test]
    fn color_readback_registers_a_postback_and_emits_it_after_the_anchor() {
        let mut state = State::new();
        state.thread_to_context.insert(1, replay_core::Context::new());
        let mut rf = ReadFramebuffer::new(1);
        let delivered = Rc::new(RefCell::new(None));
        let delivered_clone = delivered.clone();
        rf.color(
            CommandId::root(5),
            4,
            4,
            0,
            Box::new(move |result| {
                *delivered_clone.borrow_mut() = Some(result);
            }),
        )
        .unwrap();

        let mut pipeline = crate::chain::Pipeline::new();
        pipeline.push(Box::new(rf));
        let mut sink = CollectSink(Vec::new());
        let commands = vec![(CommandId::root(5), Command::new(1, CommandInner::SwapBuffers))];
        pipeline.run(&mut state, 1, commands, &mut sink);

        let found = sink.0.iter().find(|(_, cmd)| matches!(cmd.inner, CommandInner::EmitPostback { .. }));
        assert!(found.is_some(), "expected an EmitPostback opcode to be dispatched");
        let result = delivered.borrow_mut().take().expect("postback callback must fire");
        let image = result.expect("readback bytes must resolve");
        assert_eq!((image.width, image.height), (4, 4));
        assert_eq!(image.bytes.len(), 4 * 4 * 4);
    }

    #[test]
    fn mismatched_readback_size_blits_through_a_temp_renderbuffer_instead_of_reading_directly() {
        let mut state = State::new();
        state.thread_to_context.insert(1, replay_core::Context::new());
        {
            let ctx = state.get_context_mut(1).unwrap();
            let fb = Handle(10);
            ctx.bindings.read_framebuffer = fb;
            ctx.framebuffers.entry(fb).or_default().insert(
                replay_core::state::Attachment::Color(0),
                replay_core::state::FramebufferAttachmentInfo { width: 8, height: 8, format: ImageFormat::rgba8(), texture: Handle(4) },
            );
        }
        let mut rf = ReadFramebuffer::new(1);
        rf.color(CommandId::root(5), 2, 2, 0, Box::new(|_| {})).unwrap();

        let mut pipeline = crate::chain::Pipeline::new();
        pipeline.push(Box::new(rf));
        let mut sink = CollectSink(Vec::new());
        let commands = vec![(CommandId::root(5), Command::new(1, CommandInner::SwapBuffers))];
        pipeline.run(&mut state, 1, commands, &mut sink);

        assert!(sink.0.iter().any(|(_, cmd)| matches!(cmd.inner, CommandInner::GenObject { kind: replay_core::object::ObjectKind::Renderbuffer, .. })));
        assert!(sink.0.iter().any(|(_, cmd)| matches!(cmd.inner, CommandInner::CopyImageSubData { .. })));
        assert!(sink.0.iter().any(|(_, cmd)| matches!(cmd.inner, CommandInner::DeleteObject { kind: replay_core::object::ObjectKind::Renderbuffer, .. })));
    }

    #[test]
    fn matched_readback_size_does_not_synthesize_a_blit() {
        let mut state = State::new();
        state.thread_to_context.insert(1, replay_core::Context::new());
        {
            let ctx = state.get_context_mut(1).unwrap();
            let fb = Handle(10);
            ctx.bindings.read_framebuffer = fb;
            ctx.framebuffers.entry(fb).or_default().insert(
                replay_core::state::Attachment::Color(0),
                replay_core::state::FramebufferAttachmentInfo { width: 4, height: 4, format: ImageFormat::rgba8(), texture: Handle(4) },
            );
        }
        let mut rf = ReadFramebuffer::new(1);
        rf.color(CommandId::root(5), 4, 4, 0, Box::new(|_| {})).unwrap();

        let mut pipeline = crate::chain::Pipeline::new();
        pipeline.push(Box::new(rf));
        let mut sink = CollectSink(Vec::new());
        let commands = vec![(CommandId::root(5), Command::new(1, CommandInner::SwapBuffers))];
        pipeline.run(&mut state, 1, commands, &mut sink);

        assert!(!sink.0.iter().any(|(_, cmd)| matches!(cmd.inner, CommandInner::GenObject { .. })));
    }

    #[test]
    fn readback_anchored_at_atom_zero_is_rejected() {
        let mut rf = ReadFramebuffer::new(1);
        let err = rf.color(CommandId::root(0), 1, 1, 0, Box::new(|_| {}));
        assert!(err.is_err());
    }

    #[test]
    fn swap_buffers_still_carries_its_own_flag_after_readback_injection() {
        assert_eq!(Command::new(1, CommandInner::SwapBuffers).flags(), CommandFlags::IS_END_OF_FRAME);
    }
}
