//! State Store (§4.3): the API-level state tree. Contexts own bindings and a pointer to their
//! shared-objects table; `State` is the process-global root holding the thread-to-context map,
//! the allocator, and per-pool memory.
//!
//! Grounded on the teacher's `src/context.rs` (per-thread current-context bookkeeping) and
//! `backend_gl::pool::Pool` (the slotmap-keyed shared table, generalized here from GPU-object
//! aliasing to the handle-indexed object tables this spec needs).

use crate::key::{Rect, StateKey};
use crate::object::{Handle, Object, ObjectKind};
use crate::pool::MemoryPools;
use fxhash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use std::cell::RefCell;
use std::rc::Rc;

new_key_type! { pub struct ObjectKey; }

/// Table of objects shareable across every context that points at it (§3: shareable objects
/// live in a per-device table). Indexed by the slotmap key internally, with a side map from the
/// application-minted `Handle` so lookups stay O(1) either way.
#[derive(Default)]
pub struct SharedObjects {
    objects: SlotMap<ObjectKey, Object>,
    by_handle: FxHashMap<Handle, ObjectKey>,
}

impl SharedObjects {
    pub fn new() -> SharedObjects {
        SharedObjects::default()
    }

    pub fn insert(&mut self, object: Object) {
        let handle = object.handle;
        let key = self.objects.insert(object);
        self.by_handle.insert(handle, key);
    }

    pub fn get(&self, handle: Handle) -> Option<&Object> {
        self.by_handle.get(&handle).and_then(|k| self.objects.get(*k))
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Object> {
        let key = *self.by_handle.get(&handle)?;
        self.objects.get_mut(key)
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Object> {
        let key = self.by_handle.remove(&handle)?;
        self.objects.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
    Uniform,
    PixelUnpack,
    PixelPack,
    CopyRead,
    CopyWrite,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Attachment {
    Color(u32),
    Depth,
    Stencil,
}

#[derive(Clone, Debug)]
pub struct FramebufferAttachmentInfo {
    pub width: u32,
    pub height: u32,
    pub format: replay_format::ImageFormat,
    /// The backing texture this attachment currently points at (§4.7.2: needed to source a
    /// temp-renderbuffer blit when a readback request's requested size doesn't match it).
    pub texture: Handle,
}

#[derive(Clone, Debug, Default)]
pub struct Bindings {
    pub bound_buffer: FxHashMap<BufferTarget, Handle>,
    pub bound_vertex_array: Handle,
    pub bound_program: Handle,
    pub active_texture_unit: u32,
    pub bound_texture: FxHashMap<u32, Handle>,
    pub read_framebuffer: Handle,
    pub draw_framebuffer: Handle,
    pub bound_renderbuffer: Handle,
}

#[derive(Clone, Debug)]
pub struct PixelStorage {
    pub pack_alignment: u32,
    pub unpack_alignment: u32,
}

impl Default for PixelStorage {
    fn default() -> PixelStorage {
        PixelStorage { pack_alignment: 4, unpack_alignment: 4 }
    }
}

/// Rasterizer state (§3 Context: "rasterizer state"): the fixed-function settings that decide
/// which fragments a draw generates, as opposed to what those fragments do to the framebuffer
/// (that part is [`PixelOpState`]).
#[derive(Copy, Clone, Debug)]
pub struct RasterizerState {
    pub viewport: Rect,
    pub cull_face_enabled: bool,
    pub front_face_ccw: bool,
}

impl Default for RasterizerState {
    fn default() -> RasterizerState {
        RasterizerState { viewport: Rect { x: 0, y: 0, width: 0, height: 0 }, cull_face_enabled: false, front_face_ccw: true }
    }
}

/// Per-fragment test/blend state (§3 Context: "pixel-op state"): what happens to a generated
/// fragment on its way into the framebuffer.
#[derive(Copy, Clone, Debug, Default)]
pub struct PixelOpState {
    pub depth_test_enabled: bool,
    pub blend_enabled: bool,
    pub scissor_test_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct ContextInfo {
    pub version: (u32, u32),
    pub preserve_buffers_on_swap: bool,
    pub initialized: bool,
}

impl Default for ContextInfo {
    fn default() -> ContextInfo {
        ContextInfo { version: (3, 0), preserve_buffers_on_swap: false, initialized: false }
    }
}

pub struct Context {
    pub bindings: Bindings,
    pub pixel_storage: PixelStorage,
    pub rasterizer: RasterizerState,
    pub pixel_op: PixelOpState,
    pub info: ContextInfo,
    pub shared: Rc<RefCell<SharedObjects>>,
    /// Per-context (non-shareable) objects: vertex arrays, queries, syncs.
    pub objects: FxHashMap<Handle, Object>,
    /// Framebuffer attachment table, keyed by the framebuffer handle (`Handle::NONE` for the
    /// default framebuffer established at context creation).
    pub framebuffers: FxHashMap<Handle, FxHashMap<Attachment, FramebufferAttachmentInfo>>,
    /// Last-uploaded `(width, height, format)` per `(texture, level)`, populated by
    /// `TexImage2D`/`CompressedTexImage2D` (the latter approximated as `ImageFormat::rgba8()`,
    /// since a compressed format is never itself a valid render-target format). Lets
    /// `FramebufferTexture2D` resolve the attachment's actual size without this engine
    /// simulating texel storage (§4.7.2).
    pub texture_shape: FxHashMap<(Handle, u32), (u32, u32, replay_format::ImageFormat)>,
    /// Set once `SwapBuffers` has run without `preserve_buffers_on_swap`; consulted by the
    /// UndefinedFramebufferFill transformer (§4.7.4).
    pub default_framebuffer_invalidated: bool,
}

impl Context {
    pub fn new_sharing(shared: Rc<RefCell<SharedObjects>>) -> Context {
        Context {
            bindings: Bindings::default(),
            pixel_storage: PixelStorage::default(),
            rasterizer: RasterizerState::default(),
            pixel_op: PixelOpState::default(),
            info: ContextInfo::default(),
            shared,
            objects: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            texture_shape: FxHashMap::default(),
            default_framebuffer_invalidated: false,
        }
    }

    pub fn new() -> Context {
        Context::new_sharing(Rc::new(RefCell::new(SharedObjects::new())))
    }

    pub fn object(&self, handle: Handle) -> Option<Object> {
        if let Some(o) = self.objects.get(&handle) {
            return Some(o.clone());
        }
        self.shared.borrow().get(handle).cloned()
    }

    pub fn insert_object(&mut self, object: Object) {
        if object.shareable {
            self.shared.borrow_mut().insert(object);
        } else {
            self.objects.insert(object.handle, object);
        }
    }

    pub fn delete_object(&mut self, handle: Handle, kind: ObjectKind) {
        if kind.is_shareable() {
            self.shared.borrow_mut().remove(handle);
        } else {
            self.objects.remove(&handle);
        }
    }

    /// §4.3 `get_framebuffer_attachment_info`. Resolves the *read* framebuffer's attachment.
    pub fn get_framebuffer_attachment_info(
        &self,
        attachment: Attachment,
    ) -> crate::error::Result<FramebufferAttachmentInfo> {
        let fb = self.bindings.read_framebuffer;
        let table = self
            .framebuffers
            .get(&fb)
            .ok_or(crate::error::Error::DataUnavailable(crate::error::Reason::InvalidAttachment))?;
        table
            .get(&attachment)
            .cloned()
            .ok_or(crate::error::Error::DataUnavailable(crate::error::Reason::InvalidAttachment))
    }
}

pub type ThreadId = u64;

/// The process-global root (§3).
pub struct State {
    pub thread_to_context: FxHashMap<ThreadId, Context>,
    pub pools: MemoryPools,
    /// Replay-side scratch allocator; mints a fresh pool per allocation (§9).
    pub arena: typed_arena::Arena<u8>,
    /// Postback callbacks registered by readback transformers, resolved by `EmitPostback`'s
    /// `mutate` (§4.7.2, §4.8). `Rc<RefCell<_>>` so transformers holding only `&State` (via
    /// `Downstream::state`) can still register through it.
    pub postbacks: crate::image::PostbackTable,
}

impl State {
    pub fn new() -> State {
        State {
            thread_to_context: FxHashMap::default(),
            pools: MemoryPools::new(),
            arena: typed_arena::Arena::new(),
            postbacks: crate::image::new_postback_table(),
        }
    }

    /// §4.3 `get_context(thread)`.
    pub fn get_context(&self, thread: ThreadId) -> Option<&Context> {
        self.thread_to_context.get(&thread)
    }

    pub fn get_context_mut(&mut self, thread: ThreadId) -> Option<&mut Context> {
        self.thread_to_context.get_mut(&thread)
    }

    /// True if a shareable object's delete must be deferred because it is still bound in some
    /// other context sharing the same table (§3 Lifecycle).
    pub fn is_bound_anywhere(&self, handle: Handle) -> bool {
        self.thread_to_context.values().any(|ctx| {
            ctx.bindings.bound_buffer.values().any(|h| *h == handle)
                || ctx.bindings.bound_vertex_array == handle
                || ctx.bindings.bound_program == handle
                || ctx.bindings.bound_texture.values().any(|h| *h == handle)
                || ctx.bindings.read_framebuffer == handle
                || ctx.bindings.draw_framebuffer == handle
                || ctx.bindings.bound_renderbuffer == handle
        })
    }
}

/// Full per-object key expansion for a texture's data/size keys at a given mip level, used by
/// the dependency-graph builder (§4.5).
pub fn texture_keys(handle: Handle, level: u32) -> (StateKey, StateKey) {
    (StateKey::TextureData(handle, level), StateKey::TextureSize(handle, level))
}

/// The renderbuffer data key, optionally narrowed to a sub-rect (§4.5 scissor rule).
pub fn renderbuffer_key(handle: Handle, sub_rect: Option<Rect>) -> StateKey {
    match sub_rect {
        Some(rect) => StateKey::RenderbufferSubData(handle, rect),
        None => StateKey::RenderbufferData(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;

    #[test]
    fn shared_objects_round_trip_by_handle() {
        let mut shared = SharedObjects::new();
        shared.insert(Object::new(Handle(5), ObjectKind::Buffer));
        assert!(shared.get(Handle(5)).is_some());
        shared.remove(Handle(5));
        assert!(shared.get(Handle(5)).is_none());
    }

    #[test]
    fn contexts_sharing_the_same_table_see_each_others_objects() {
        let shared = Rc::new(RefCell::new(SharedObjects::new()));
        let mut ctx_a = Context::new_sharing(shared.clone());
        let ctx_b = Context::new_sharing(shared);
        ctx_a.insert_object(Object::new(Handle(9), ObjectKind::Texture));
        assert!(ctx_b.object(Handle(9)).is_some());
    }

    #[test]
    fn non_shareable_objects_stay_local_to_their_context() {
        let mut ctx_a = Context::new();
        let ctx_b = Context::new();
        ctx_a.insert_object(Object::new(Handle(3), ObjectKind::VertexArray));
        assert!(ctx_a.object(Handle(3)).is_some());
        assert!(ctx_b.object(Handle(3)).is_none());
    }

    #[test]
    fn missing_read_framebuffer_is_data_unavailable() {
        let ctx = Context::new();
        assert!(ctx.get_framebuffer_attachment_info(Attachment::Color(0)).is_err());
    }
}
