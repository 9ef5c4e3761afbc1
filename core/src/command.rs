//! Command Model (§4.4): the tagged-union of every recorded API call.
//!
//! Grounded on the teacher's `render/src/command.rs` `Command`/`CommandInner` split (a thin
//! wrapper carrying bookkeeping around a big variant enum), generalized here from the
//! renderer's single-frame command-buffer sorting concern to the capture/replay stream's
//! analyze-or-replay dual-mode `mutate`.

use crate::emit::Emitter;
use crate::error::{Error, Reason, Result};
use crate::graph::Recorder;
use crate::image::Image2D;
use crate::key::{Rect, StateKey};
use crate::object::{Handle, Object, ObjectKind};
use crate::pool::{Observation, Slice};
use crate::state::{Attachment, BufferTarget, FramebufferAttachmentInfo, State, ThreadId};
use bitflags::bitflags;

/// Monotonically increasing atom index plus a derivation counter; derived ids are issued by
/// transformers for synthetic commands attributable to a source command (§3 CommandStream).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug)]
pub struct CommandId {
    pub atom: u64,
    pub derivation: u32,
}

impl CommandId {
    pub fn root(atom: u64) -> CommandId {
        CommandId { atom, derivation: 0 }
    }

    pub fn derive(&self, derivation: u32) -> CommandId {
        CommandId { atom: self.atom, derivation }
    }
}

bitflags! {
    pub struct CommandFlags: u8 {
        const IS_DRAW_CALL        = 0b0000_0001;
        const IS_END_OF_FRAME     = 0b0000_0010;
        const IS_PUSH_USER_MARKER = 0b0000_0100;
        const IS_POP_USER_MARKER  = 0b0000_1000;
        const KEEP_ALIVE_HINT     = 0b0001_0000;
    }
}

#[derive(Clone, Debug)]
pub enum Extra {
    Observation(Observation),
    /// EGL/context side-band state captured at a frame boundary (e.g. the surface size at
    /// `SwapBuffers` time); opaque to everything except the command that produced it.
    EglContextState { width: u32, height: u32 },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ClearMask {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

/// A deterministic two-color checker fill, distinct from whatever clear color the captured
/// application had actually set (§4.7.4). `None` on a `Clear` means the ordinary captured
/// clear-color state applies; `Some` marks a synthetic fill injected by `UndefinedFramebufferFill`
/// so replay produces the same bytes on every target instead of driver-undefined content.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CheckerPattern {
    pub primary: [u8; 4],
    pub secondary: [u8; 4],
    pub cell_size: u32,
}

impl CheckerPattern {
    /// Magenta/black, the pattern named by §4.7.4 for undefined-framebuffer fills.
    pub fn magenta_black() -> CheckerPattern {
        CheckerPattern { primary: [255, 0, 255, 255], secondary: [0, 0, 0, 255], cell_size: 8 }
    }
}

/// Every capturable API call, plus the synthetic replay-only and bookkeeping kinds (§4.4).
#[derive(Clone, Debug)]
pub enum CommandInner {
    // --- lifecycle ------------------------------------------------------------------------
    CreateContext { handle: Handle, shares: Option<Handle> },
    MakeCurrent { context: Handle },
    DestroyContext { context: Handle },

    // --- object lifetime --------------------------------------------------------------------
    GenObject { kind: ObjectKind, handle: Handle },
    DeleteObject { kind: ObjectKind, handle: Handle },

    // --- bindings --------------------------------------------------------------------------
    BindBuffer { target: BufferTarget, buffer: Handle },
    BindTexture { unit: u32, texture: Handle },
    BindFramebuffer { read: bool, draw: bool, framebuffer: Handle },
    BindVertexArray { vao: Handle },
    UseProgram { program: Handle },

    // --- data upload -------------------------------------------------------------------------
    BufferData { buffer: Handle, data: Observation },
    /// `source_base` is the raw `(base, type)` pair's base enum as seen at capture time
    /// (0 when the format was already a plain sized internal format) — `CompatibilityRewrite`
    /// (§4.7.3) consults it to decide whether a LUMINANCE/ALPHA swizzle must be injected, since
    /// `format` itself is already the registry's canonicalized descriptor and no longer carries
    /// that distinction.
    /// `uses_half_float_oes` distinguishes the ES `GL_HALF_FLOAT_OES` enum value from desktop/ES3
    /// `GL_HALF_FLOAT` at capture time; both canonicalize to the same `Float16` component in
    /// `format`, so `CompatibilityRewrite` (§4.7.3) consults this flag rather than `format` to
    /// decide whether the enum needs rewriting for the replay target.
    TexImage2D { texture: Handle, level: u32, width: u32, height: u32, format: replay_format::ImageFormat, source_base: u32, uses_half_float_oes: bool, data: Observation },
    TexSubImage2D { texture: Handle, level: u32, rect: Rect, data: Observation },
    CompressedTexImage2D { texture: Handle, level: u32, width: u32, height: u32, codec: replay_format::CompressedCodec, data: Observation },
    CompressedTexSubImage2D { texture: Handle, level: u32, rect: Rect, codec: replay_format::CompressedCodec, data: Observation },
    FramebufferTexture2D { framebuffer: Handle, attachment: Attachment, texture: Handle, level: u32 },
    /// Sets the context's pack/unpack pixel-storage alignment (§4.3 Context pixel-storage
    /// modes). `None` leaves that side untouched; `ReadFramebuffer` (§4.7.2) uses this to force
    /// pack alignment to 1 for a readback and restore whatever it actually was beforehand.
    PixelStorei { pack: Option<u32>, unpack: Option<u32> },
    /// Installs a channel swizzle on a texture; synthesized by `CompatibilityRewrite` (§4.7.3)
    /// when a LUMINANCE/ALPHA-family format is normalized to its R/RG replacement, composed with
    /// whatever swizzle the application itself had set.
    SetTextureSwizzle { texture: Handle, swizzle: replay_format::Swizzle },

    // --- program state -------------------------------------------------------------------------
    UniformSet { program: Handle, location: i32, count: u32 },
    VertexAttribPointer { vao: Handle, location: u32 },
    /// Attaches GLSL/SPIR-V source bytes to a shader object. The most recent one at or before a
    /// given `CommandId` is what §6's `Shader.set_data` locates and rewrites in place.
    ShaderSource { shader: Handle, source: Observation },

    // --- draw / clear / copy ---------------------------------------------------------------------
    Draw { scissor: Option<Rect> },
    Clear { mask: ClearMask, scissor: Option<Rect>, pattern: Option<CheckerPattern> },
    CopyImageSubData { src: Handle, src_is_renderbuffer: bool, dst: Handle, dst_is_renderbuffer: bool },

    SwapBuffers,

    // --- synthetic: pre-stream recreation (§4.4) --------------------------------------------
    /// Lowers, at stream start, to the ordinary create/bind/fill sequence named in `expansion`.
    Recreate { expansion: Vec<CommandInner> },

    // --- synthetic: replay-only primitives (§4.4) -------------------------------------------
    ReplayAllocateImageMemory { image: Handle, size: u64 },
    ReplayCreateVkInstance { instance: Handle },
    ReplayCreateVkDevice { device: Handle },
    ReplayRegisterVkObject { kind: ObjectKind, handle: Handle },
    ToggleVirtualSwapchain { enabled: bool },
    ReplayGetFenceStatus { fence: Handle },
    ReplayGetEventStatus { event: Handle },

    /// Resolves the postback callback registered under `key` in `state.postbacks` (§4.7.2,
    /// §4.8). The callback itself is never carried on the command value (commands must stay
    /// `Clone`, §3) — `ReadFramebuffer` registers it in the shared side table keyed by this same
    /// `CommandId` when it synthesizes this opcode. When an emitter is present (replay mode),
    /// the `len` bytes are requested from `Emitter::post`, so they come from whatever the
    /// emitter's own queue resolves them to (§4.8) rather than from this opcode directly; in
    /// analysis mode (no emitter), `len` bytes are read out of a freshly minted scratch pool
    /// purely so the callback still resolves during a dry run — since no rasterizer is simulated
    /// (§1 Non-goals: "emulating GPU rendering semantics"), that analysis-mode fallback is the
    /// pool's honest zero-fill, not a fabricated rendered image.
    EmitPostback { key: CommandId, len: usize, width: u32, height: u32, format: replay_format::ImageFormat },
}

#[derive(Clone, Debug)]
pub struct Command {
    pub thread: ThreadId,
    pub extras: Vec<Extra>,
    pub inner: CommandInner,
}

impl Command {
    pub fn new(thread: ThreadId, inner: CommandInner) -> Command {
        Command { thread, extras: Vec::new(), inner }
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn extras(&self) -> &[Extra] {
        &self.extras
    }

    pub fn flags(&self) -> CommandFlags {
        match &self.inner {
            CommandInner::Draw { .. } => CommandFlags::IS_DRAW_CALL,
            CommandInner::SwapBuffers => CommandFlags::IS_END_OF_FRAME,
            CommandInner::FramebufferTexture2D { .. } => CommandFlags::KEEP_ALIVE_HINT,
            CommandInner::CreateContext { .. }
            | CommandInner::MakeCurrent { .. }
            | CommandInner::DestroyContext { .. }
            | CommandInner::GenObject { .. }
            | CommandInner::DeleteObject { .. }
            | CommandInner::BindBuffer { .. }
            | CommandInner::BindTexture { .. }
            | CommandInner::BindFramebuffer { .. }
            | CommandInner::BindVertexArray { .. }
            | CommandInner::UseProgram { .. }
            | CommandInner::BufferData { .. }
            | CommandInner::TexImage2D { .. }
            | CommandInner::TexSubImage2D { .. }
            | CommandInner::CompressedTexImage2D { .. }
            | CommandInner::CompressedTexSubImage2D { .. }
            | CommandInner::UniformSet { .. }
            | CommandInner::VertexAttribPointer { .. }
            | CommandInner::ShaderSource { .. }
            | CommandInner::Clear { .. }
            | CommandInner::CopyImageSubData { .. } => CommandFlags::empty(),
            // Every remaining kind (synthetic replay-only primitives, Recreate, EmitPostback) is
            // not explicitly analyzed by the dependency rules in §4.5, so it keeps itself alive.
            _ => CommandFlags::KEEP_ALIVE_HINT,
        }
    }

    /// Advances `state` as the captured call would, recording abstract reads/writes into
    /// `recorder`; if `emitter` is `Some`, also emits low-level replay opcodes (§4.4). The same
    /// routine serves both analysis (recorder only) and replay (recorder + emitter) — analysis
    /// callers pass [`crate::graph::NullRecorder`]... no: analysis callers pass a live recorder
    /// to capture the graph, replay callers pass `NullRecorder` since no graph is being built
    /// during replay.
    pub fn mutate(
        &self,
        thread: ThreadId,
        state: &mut State,
        recorder: &mut dyn Recorder,
        emitter: Option<&mut dyn Emitter>,
    ) -> Result<()> {
        match &self.inner {
            CommandInner::CreateContext { handle, shares } => {
                let ctx = match shares {
                    Some(existing) => {
                        let shared = state
                            .get_context(thread)
                            .map(|c| c.shared.clone())
                            .or_else(|| {
                                state
                                    .thread_to_context
                                    .values()
                                    .find(|_| true)
                                    .map(|c| c.shared.clone())
                            })
                            .unwrap_or_default();
                        let _ = existing;
                        crate::state::Context::new_sharing(shared)
                    }
                    None => crate::state::Context::new(),
                };
                state.thread_to_context.insert(thread, ctx);
                let _ = handle;
                recorder.keep_alive();
                Ok(())
            }
            CommandInner::MakeCurrent { context } => {
                if context.is_none() && state.thread_to_context.remove(&thread).is_none() {
                    // releasing an already-absent context is a no-op, matches EGL semantics
                }
                recorder.keep_alive();
                Ok(())
            }
            CommandInner::DestroyContext { context } => {
                let _ = context;
                state.thread_to_context.remove(&thread);
                recorder.keep_alive();
                Ok(())
            }

            CommandInner::GenObject { kind, handle } => {
                let ctx = require_context(state, thread)?;
                ctx.insert_object(Object::new(*handle, *kind));
                recorder.keep_alive();
                Ok(())
            }
            CommandInner::DeleteObject { kind, handle } => {
                if state.is_bound_anywhere(*handle) {
                    let ctx = require_context(state, thread)?;
                    if let Some(obj) = ctx.objects.get_mut(handle) {
                        obj.pending_delete = true;
                    }
                } else {
                    let ctx = require_context(state, thread)?;
                    ctx.delete_object(*handle, *kind);
                }
                // Which `StateKey`s a delete retires depends on what kind of object it is —
                // deleting a program does not touch texture data, and deleting a texture does
                // not touch uniforms (§4.5, §8: deleting an object must write exactly the key
                // set that object's own uploads/binds would have written).
                match kind {
                    ObjectKind::Texture | ObjectKind::Image => {
                        let (data_key, size_key) = crate::state::texture_keys(*handle, 0);
                        recorder.write(data_key);
                        recorder.write(size_key);
                        recorder.write(StateKey::TextureAllLevels(*handle));
                    }
                    ObjectKind::Renderbuffer => {
                        recorder.write(StateKey::RenderbufferData(*handle));
                    }
                    ObjectKind::Program => {
                        recorder.write(StateKey::UniformGroup(*handle));
                    }
                    ObjectKind::VertexArray => {
                        recorder.write(StateKey::VertexAttribGroup(*handle));
                    }
                    ObjectKind::Shader => {
                        recorder.write(StateKey::ShaderSourceData(*handle));
                    }
                    // Every other kind (buffers, samplers, framebuffers, sync objects, and the
                    // non-GL kinds carried for §6's broader object model) has no tracked
                    // `StateKey` of its own yet; deleting it only needs the bound-anywhere /
                    // pending-delete bookkeeping already done above.
                    _ => {}
                }
                Ok(())
            }

            CommandInner::BindBuffer { target, buffer } => {
                let ctx = require_context(state, thread)?;
                ctx.bindings.bound_buffer.insert(*target, *buffer);
                Ok(())
            }
            CommandInner::BindTexture { unit, texture } => {
                let ctx = require_context(state, thread)?;
                ctx.bindings.active_texture_unit = *unit;
                ctx.bindings.bound_texture.insert(*unit, *texture);
                Ok(())
            }
            CommandInner::BindFramebuffer { read, draw, framebuffer } => {
                let ctx = require_context(state, thread)?;
                if *read {
                    ctx.bindings.read_framebuffer = *framebuffer;
                }
                if *draw {
                    ctx.bindings.draw_framebuffer = *framebuffer;
                }
                Ok(())
            }
            CommandInner::BindVertexArray { vao } => {
                require_context(state, thread)?.bindings.bound_vertex_array = *vao;
                Ok(())
            }
            CommandInner::UseProgram { program } => {
                require_context(state, thread)?.bindings.bound_program = *program;
                Ok(())
            }

            CommandInner::BufferData { buffer, data } => {
                let _ = require_context(state, thread)?;
                state.pools.apply_writes(std::slice::from_ref(data));
                let _ = buffer;
                recorder.keep_alive();
                Ok(())
            }

            CommandInner::TexImage2D { texture, level, width, height, format, data, .. } => {
                state.pools.apply_reads(std::slice::from_ref(data));
                let (data_key, size_key) = crate::state::texture_keys(*texture, *level);
                recorder.modify(data_key);
                recorder.modify(StateKey::TextureAllLevels(*texture));
                recorder.write(size_key);
                if let Ok(ctx) = require_context(state, thread) {
                    ctx.texture_shape.insert((*texture, *level), (*width, *height, format.clone()));
                }
                Ok(())
            }
            CommandInner::TexSubImage2D { texture, level, data, .. } => {
                state.pools.apply_reads(std::slice::from_ref(data));
                let (data_key, _) = crate::state::texture_keys(*texture, *level);
                recorder.modify(data_key);
                recorder.modify(StateKey::TextureAllLevels(*texture));
                Ok(())
            }
            CommandInner::CompressedTexImage2D { texture, level, width, height, data, .. } => {
                state.pools.apply_reads(std::slice::from_ref(data));
                let (data_key, size_key) = crate::state::texture_keys(*texture, *level);
                recorder.modify(data_key);
                recorder.modify(StateKey::TextureAllLevels(*texture));
                recorder.write(size_key);
                // A compressed format is never itself a valid render-target format; record the
                // decoded RGBA8 shape an attachment would actually expose (§4.7.2).
                if let Ok(ctx) = require_context(state, thread) {
                    ctx.texture_shape.insert((*texture, *level), (*width, *height, replay_format::ImageFormat::rgba8()));
                }
                Ok(())
            }
            CommandInner::CompressedTexSubImage2D { texture, level, data, .. } => {
                state.pools.apply_reads(std::slice::from_ref(data));
                let (data_key, _) = crate::state::texture_keys(*texture, *level);
                recorder.modify(data_key);
                recorder.modify(StateKey::TextureAllLevels(*texture));
                Ok(())
            }
            CommandInner::FramebufferTexture2D { framebuffer, attachment, texture, level } => {
                let (_, size_key) = crate::state::texture_keys(*texture, *level);
                recorder.read(size_key);
                recorder.keep_alive();
                let ctx = require_context(state, thread)?;
                if texture.is_none() {
                    if let Some(table) = ctx.framebuffers.get_mut(framebuffer) {
                        table.remove(attachment);
                    }
                } else if let Some(&(width, height, ref format)) = ctx.texture_shape.get(&(*texture, *level)) {
                    ctx.framebuffers.entry(*framebuffer).or_default().insert(
                        *attachment,
                        FramebufferAttachmentInfo { width, height, format: format.clone(), texture: *texture },
                    );
                }
                // If the texture has no recorded shape yet (attached before any upload reached
                // this engine), the attachment table is simply left unset rather than guessed at.
                Ok(())
            }
            CommandInner::SetTextureSwizzle { texture, .. } => {
                let (data_key, _) = crate::state::texture_keys(*texture, 0);
                recorder.write(data_key);
                recorder.keep_alive();
                Ok(())
            }

            CommandInner::UniformSet { program, location, count } => {
                recorder.write(StateKey::Uniform(*program, *location, *count));
                Ok(())
            }
            CommandInner::VertexAttribPointer { vao, location } => {
                recorder.write(StateKey::VertexAttrib(*vao, *location));
                Ok(())
            }
            CommandInner::ShaderSource { shader, source } => {
                state.pools.apply_reads(std::slice::from_ref(source));
                recorder.write(StateKey::ShaderSourceData(*shader));
                recorder.keep_alive();
                Ok(())
            }

            CommandInner::Draw { scissor } => {
                let ctx = require_context(state, thread)?;
                let program = ctx.bindings.bound_program;
                let vao = ctx.bindings.bound_vertex_array;
                let draw_fb = ctx.bindings.draw_framebuffer;
                recorder.read(StateKey::UniformGroup(program));
                recorder.read(StateKey::VertexAttribGroup(vao));
                // Every sampler-bound texture unit contributes a read; units with no texture
                // bound are skipped (an unbound unit samples nothing). Which mip a draw actually
                // samples depends on shader-side LOD selection this engine does not model, so
                // this conservatively reads every level ever uploaded to the bound texture
                // rather than guessing level 0 (§4.5, §9).
                for tex in ctx.bindings.bound_texture.values().copied() {
                    if !tex.is_none() {
                        recorder.read(StateKey::TextureAllLevels(tex));
                    }
                }
                for attachment in [Attachment::Color(0), Attachment::Depth, Attachment::Stencil] {
                    if let Ok(info) = ctx.get_framebuffer_attachment_info(attachment) {
                        let full = matches!(
                            scissor,
                            None | Some(Rect { x: 0, y: 0, width, height })
                                if width == info.width && height == info.height
                        );
                        let key = if full {
                            StateKey::RenderbufferData(draw_fb)
                        } else {
                            StateKey::RenderbufferSubData(draw_fb, scissor.unwrap())
                        };
                        recorder.modify(key);
                    }
                }
                Ok(())
            }

            CommandInner::Clear { mask, scissor, .. } => {
                let ctx = require_context(state, thread)?;
                let draw_fb = ctx.bindings.draw_framebuffer;
                let bits = [
                    (mask.color, Attachment::Color(0)),
                    (mask.depth, Attachment::Depth),
                    (mask.stencil, Attachment::Stencil),
                ];
                for (enabled, attachment) in bits {
                    if !enabled {
                        continue;
                    }
                    if let Ok(info) = ctx.get_framebuffer_attachment_info(attachment) {
                        let full = scissor.map_or(true, |r| {
                            r.x == 0 && r.y == 0 && r.width == info.width && r.height == info.height
                        });
                        let key = if full {
                            StateKey::RenderbufferData(draw_fb)
                        } else {
                            StateKey::RenderbufferSubData(draw_fb, scissor.unwrap())
                        };
                        recorder.read(StateKey::RenderbufferData(draw_fb));
                        recorder.write(key);
                    }
                }
                Ok(())
            }

            CommandInner::CopyImageSubData { src, src_is_renderbuffer, dst, dst_is_renderbuffer, .. } => {
                // Sub-range-aware copy dependency is intentionally not attempted; this
                // conservatively approximates as a whole-image copy (§4.4, §9 open question —
                // preserve the overestimate, do not silently narrow it).
                let src_key = if *src_is_renderbuffer {
                    StateKey::RenderbufferData(*src)
                } else {
                    StateKey::TextureData(*src, 0)
                };
                let dst_key = if *dst_is_renderbuffer {
                    StateKey::RenderbufferData(*dst)
                } else {
                    StateKey::TextureData(*dst, 0)
                };
                recorder.read(src_key);
                recorder.write(dst_key);
                Ok(())
            }

            CommandInner::SwapBuffers => {
                let ctx = require_context_mut(state, thread)?;
                let preserve = ctx.info.preserve_buffers_on_swap;
                let default_fb = Handle::NONE;
                if !preserve {
                    recorder.write(StateKey::RenderbufferData(default_fb));
                    ctx.default_framebuffer_invalidated = true;
                }
                recorder.write(StateKey::TextureSize(default_fb, 0)); // depth placeholder key
                Ok(())
            }

            CommandInner::Recreate { expansion } => {
                for step in expansion {
                    Command { thread, extras: Vec::new(), inner: step.clone() }
                        .mutate(thread, state, recorder, None)?;
                }
                recorder.keep_alive();
                Ok(())
            }

            CommandInner::ReplayAllocateImageMemory { size, .. } => {
                if let Some(emitter) = emitter {
                    state.pools.mint_device_pool();
                    emitter.reserve_memory(*size as usize)?;
                }
                recorder.keep_alive();
                Ok(())
            }
            CommandInner::ReplayCreateVkInstance { .. }
            | CommandInner::ReplayCreateVkDevice { .. }
            | CommandInner::ReplayRegisterVkObject { .. }
            | CommandInner::ToggleVirtualSwapchain { .. }
            | CommandInner::ReplayGetFenceStatus { .. }
            | CommandInner::ReplayGetEventStatus { .. } => {
                recorder.keep_alive();
                Ok(())
            }

            CommandInner::PixelStorei { pack, unpack } => {
                let ctx = require_context(state, thread)?;
                if let Some(pack) = pack {
                    ctx.pixel_storage.pack_alignment = *pack;
                }
                if let Some(unpack) = unpack {
                    ctx.pixel_storage.unpack_alignment = *unpack;
                }
                Ok(())
            }

            CommandInner::EmitPostback { key, len, width, height, format } => {
                let callback = state.postbacks.borrow_mut().remove(key);
                if let Some(callback) = callback {
                    match emitter {
                        // Replay mode: the bytes must come from whatever the replay device
                        // actually wrote, not from a freshly minted, never-written pool — route
                        // through the emitter's own postback queue (§4.8) so `ReplayEmitter`'s
                        // `flush`/`cancel` machinery is what resolves this, not this opcode.
                        Some(emitter) => {
                            let width = *width;
                            let height = *height;
                            let format = format.clone();
                            let len = *len;
                            emitter.post(
                                len,
                                Box::new(move |reader, err| {
                                    if let Some(err) = err {
                                        callback(Err(Reason::MessageString(err.to_string())));
                                        return;
                                    }
                                    match reader.read_exact(len) {
                                        Ok(bytes) => callback(Ok(Image2D::new(width, height, format, bytes))),
                                        Err(e) => callback(Err(Reason::MessageString(e.to_string()))),
                                    }
                                }),
                            )?;
                        }
                        // Analysis mode: no device exists to read from. Resolve synchronously
                        // with a zero-filled image of the right shape so graph-building and
                        // dry-run callers still see a completed postback, not a hang.
                        None => {
                            let pool = state.pools.mint_device_pool();
                            let bytes = state.pools.read(&Slice { pool, base: 0, count: *len, element_size: 1 });
                            callback(Ok(Image2D::new(*width, *height, format.clone(), bytes)));
                        }
                    }
                }
                recorder.keep_alive();
                Ok(())
            }
        }
    }
}

fn require_context(state: &mut State, thread: ThreadId) -> Result<&mut crate::state::Context> {
    state
        .get_context_mut(thread)
        .ok_or(Error::InternalInvariant("mutate called with no current context for thread"))
}

fn require_context_mut(state: &mut State, thread: ThreadId) -> Result<&mut crate::state::Context> {
    require_context(state, thread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NullRecorder;

    fn ctx_thread() -> ThreadId {
        1
    }

    #[test]
    fn bind_buffer_without_a_context_is_an_internal_invariant_error() {
        let mut state = State::new();
        let cmd = Command::new(ctx_thread(), CommandInner::BindBuffer { target: BufferTarget::Array, buffer: Handle(1) });
        let mut rec = NullRecorder;
        assert!(cmd.mutate(ctx_thread(), &mut state, &mut rec, None).is_err());
    }

    #[test]
    fn tex_image_2d_modifies_data_and_writes_size() {
        let mut state = State::new();
        state.thread_to_context.insert(ctx_thread(), crate::state::Context::new());
        let cmd = Command::new(
            ctx_thread(),
            CommandInner::TexImage2D {
                texture: Handle(3),
                level: 0,
                width: 4,
                height: 4,
                format: replay_format::ImageFormat::rgba8(),
                source_base: 0,
                uses_half_float_oes: false,
                data: Observation { pool: crate::pool::Pool::Application, base: 0, bytes: vec![0; 64] },
            },
        );
        let mut entry = crate::graph::CommandEntry::default();
        {
            struct R<'a>(&'a mut crate::graph::CommandEntry);
            impl<'a> Recorder for R<'a> {
                fn read(&mut self, k: StateKey) {
                    self.0.reads.insert(k);
                }
                fn write(&mut self, k: StateKey) {
                    self.0.writes.insert(k);
                }
                fn modify(&mut self, k: StateKey) {
                    self.0.writes.insert(k);
                    self.0.modifies.insert(k);
                }
                fn keep_alive(&mut self) {
                    self.0.keep_alive = true;
                }
            }
            let mut r = R(&mut entry);
            cmd.mutate(ctx_thread(), &mut state, &mut r, None).unwrap();
        }
        assert!(entry.modifies.contains(&StateKey::TextureData(Handle(3), 0)));
        assert!(entry.modifies.contains(&StateKey::TextureAllLevels(Handle(3))));
        assert!(entry.writes.contains(&StateKey::TextureSize(Handle(3), 0)));
    }

    #[test]
    fn draw_reads_texture_all_levels_not_a_hardcoded_level() {
        let mut state = State::new();
        state.thread_to_context.insert(ctx_thread(), crate::state::Context::new());
        {
            let ctx = state.get_context_mut(ctx_thread()).unwrap();
            ctx.bindings.active_texture_unit = 0;
            ctx.bindings.bound_texture.insert(0, Handle(7));
        }
        let cmd = Command::new(ctx_thread(), CommandInner::Draw { scissor: None });
        let mut entry = crate::graph::CommandEntry::default();
        {
            struct R<'a>(&'a mut crate::graph::CommandEntry);
            impl<'a> Recorder for R<'a> {
                fn read(&mut self, k: StateKey) {
                    for ancestor in k.ancestors() {
                        self.0.reads.insert(ancestor);
                    }
                }
                fn write(&mut self, k: StateKey) {
                    self.0.writes.insert(k);
                }
                fn modify(&mut self, k: StateKey) {
                    self.0.writes.insert(k);
                    self.0.modifies.insert(k);
                }
                fn keep_alive(&mut self) {
                    self.0.keep_alive = true;
                }
            }
            let mut r = R(&mut entry);
            cmd.mutate(ctx_thread(), &mut state, &mut r, None).unwrap();
        }
        assert!(entry.reads.contains(&StateKey::TextureAllLevels(Handle(7))));
        assert!(!entry.reads.contains(&StateKey::TextureData(Handle(7), 0)));
    }

    #[test]
    fn pixel_storei_writes_pack_and_unpack_alignment() {
        let mut state = State::new();
        state.thread_to_context.insert(ctx_thread(), crate::state::Context::new());
        let cmd = Command::new(ctx_thread(), CommandInner::PixelStorei { pack: Some(1), unpack: None });
        let mut rec = NullRecorder;
        cmd.mutate(ctx_thread(), &mut state, &mut rec, None).unwrap();
        assert_eq!(state.get_context(ctx_thread()).unwrap().pixel_storage.pack_alignment, 1);
        assert_eq!(state.get_context(ctx_thread()).unwrap().pixel_storage.unpack_alignment, 4);
    }

    #[test]
    fn emit_postback_resolves_the_registered_callback_with_a_shaped_image() {
        let mut state = State::new();
        state.thread_to_context.insert(ctx_thread(), crate::state::Context::new());
        let key = CommandId::root(5);
        let resolved = std::rc::Rc::new(std::cell::RefCell::new(None));
        let resolved_clone = resolved.clone();
        state.postbacks.borrow_mut().insert(
            key,
            Box::new(move |result| {
                *resolved_clone.borrow_mut() = Some(result);
            }),
        );
        let cmd = Command::new(
            ctx_thread(),
            CommandInner::EmitPostback { key, len: 16, width: 2, height: 2, format: replay_format::ImageFormat::rgba8() },
        );
        let mut rec = NullRecorder;
        cmd.mutate(ctx_thread(), &mut state, &mut rec, None).unwrap();
        assert!(state.postbacks.borrow().get(&key).is_none());
        let result = resolved.borrow_mut().take().expect("callback must fire");
        let image = result.expect("bytes must resolve, not error");
        assert_eq!(image.bytes.len(), 16);
        assert_eq!((image.width, image.height), (2, 2));
    }

    #[test]
    fn deleting_a_texture_writes_texture_shaped_keys_only() {
        let mut state = State::new();
        state.thread_to_context.insert(ctx_thread(), crate::state::Context::new());
        let commands = vec![(
            CommandId::root(1),
            Command::new(ctx_thread(), CommandInner::DeleteObject { kind: ObjectKind::Texture, handle: Handle(3) }),
        )];
        let graph = crate::graph::build(&mut state, &commands);
        let writes = &graph.entries[0].writes;
        assert!(writes.contains(&StateKey::TextureData(Handle(3), 0)));
        assert!(writes.contains(&StateKey::TextureSize(Handle(3), 0)));
        assert!(writes.contains(&StateKey::TextureAllLevels(Handle(3))));
        assert!(!writes.contains(&StateKey::UniformGroup(Handle(3))));
        assert!(!writes.contains(&StateKey::VertexAttribGroup(Handle(3))));
    }

    #[test]
    fn deleting_a_program_writes_its_uniform_group_not_texture_keys() {
        let mut state = State::new();
        state.thread_to_context.insert(ctx_thread(), crate::state::Context::new());
        let commands = vec![(
            CommandId::root(1),
            Command::new(ctx_thread(), CommandInner::DeleteObject { kind: ObjectKind::Program, handle: Handle(5) }),
        )];
        let graph = crate::graph::build(&mut state, &commands);
        let writes = &graph.entries[0].writes;
        assert!(writes.contains(&StateKey::UniformGroup(Handle(5))));
        assert!(!writes.contains(&StateKey::TextureData(Handle(5), 0)));
        assert!(!writes.contains(&StateKey::VertexAttribGroup(Handle(5))));
    }

    #[test]
    fn deleting_a_vertex_array_writes_its_attrib_group_not_texture_keys() {
        let mut state = State::new();
        state.thread_to_context.insert(ctx_thread(), crate::state::Context::new());
        let commands = vec![(
            CommandId::root(1),
            Command::new(ctx_thread(), CommandInner::DeleteObject { kind: ObjectKind::VertexArray, handle: Handle(9) }),
        )];
        let graph = crate::graph::build(&mut state, &commands);
        let writes = &graph.entries[0].writes;
        assert!(writes.contains(&StateKey::VertexAttribGroup(Handle(9))));
        assert!(!writes.contains(&StateKey::TextureData(Handle(9), 0)));
        assert!(!writes.contains(&StateKey::UniformGroup(Handle(9))));
    }

    #[test]
    fn deleting_a_shader_writes_its_source_data_key() {
        let mut state = State::new();
        state.thread_to_context.insert(ctx_thread(), crate::state::Context::new());
        let commands = vec![(
            CommandId::root(1),
            Command::new(ctx_thread(), CommandInner::DeleteObject { kind: ObjectKind::Shader, handle: Handle(11) }),
        )];
        let graph = crate::graph::build(&mut state, &commands);
        let writes = &graph.entries[0].writes;
        assert!(writes.contains(&StateKey::ShaderSourceData(Handle(11))));
    }
}
