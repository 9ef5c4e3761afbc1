//! `StateKey` (§3, §4.5): opaque hashable labels naming fine-grained slices of state, used by
//! the dependency graph. Keys form a tree via `parent()`; reading a child implies reading all
//! of its ancestors (§9 design note — a capability relation, reachability computed lazily by
//! the DCE backward walk rather than materialized up front).

use crate::object::Handle;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StateKey {
    UniformGroup(Handle),
    Uniform(Handle, i32, u32),
    VertexAttribGroup(Handle),
    VertexAttrib(Handle, u32),
    RenderbufferData(Handle),
    RenderbufferSubData(Handle, Rect),
    TextureData(Handle, u32),
    TextureSize(Handle, u32),
    /// Parent of every `TextureData(handle, _)` level on this texture. A draw samples a texture
    /// without pinning down which mip the sampler actually walked, so `Draw` reads this instead
    /// of guessing a level; an upload to any level `modify`s it, keeping it live across uploads
    /// to other levels of the same texture (§4.5, §9 — replaces the old "assume level 0" guess).
    TextureAllLevels(Handle),
    EglImageData(Handle),
    EglImageSize(Handle),
    ShaderSourceData(Handle),
}

impl StateKey {
    /// The key's immediate parent, if any. Reading `self` implies reading `parent()` too.
    pub fn parent(&self) -> Option<StateKey> {
        match *self {
            StateKey::Uniform(program, _, _) => Some(StateKey::UniformGroup(program)),
            StateKey::VertexAttrib(vao, _) => Some(StateKey::VertexAttribGroup(vao)),
            StateKey::RenderbufferSubData(rb, _) => Some(StateKey::RenderbufferData(rb)),
            StateKey::TextureData(handle, _) => Some(StateKey::TextureAllLevels(handle)),
            StateKey::UniformGroup(_)
            | StateKey::VertexAttribGroup(_)
            | StateKey::RenderbufferData(_)
            | StateKey::TextureSize(_, _)
            | StateKey::TextureAllLevels(_)
            | StateKey::EglImageData(_)
            | StateKey::EglImageSize(_)
            | StateKey::ShaderSourceData(_) => None,
        }
    }

    /// `self` and every ancestor, nearest first. Used by the DCE backward walk to expand a
    /// single read into the full chain of keys it implies (§9).
    pub fn ancestors(&self) -> Vec<StateKey> {
        let mut chain = vec![*self];
        let mut cur = *self;
        while let Some(p) = cur.parent() {
            chain.push(p);
            cur = p;
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_ancestors_include_its_group() {
        let h = Handle(1);
        let key = StateKey::Uniform(h, 3, 1);
        let ancestors = key.ancestors();
        assert_eq!(ancestors, vec![StateKey::Uniform(h, 3, 1), StateKey::UniformGroup(h)]);
    }

    #[test]
    fn top_level_key_has_no_parent() {
        assert_eq!(StateKey::TextureData(Handle(2), 0).parent(), None);
    }
}
