//! Recreate-family lowering (§4.4, §11 supplement).
//!
//! §4.4 names the `Recreate*` synthetic command kind, emitted at stream start to re-establish
//! objects that existed before capture began, but does not specify its lowering beyond "each
//! lowers to a sequence of normal create/bind/fill commands." This module is that table: a
//! fixed `ObjectKind -> Vec<CommandInner>` expansion, rather than leaving `Recreate` a stub that
//! only `CommandInner::Recreate{expansion}`'s caller can fill in by hand.

use crate::command::CommandInner;
use crate::object::{Handle, ObjectKind};

/// The ordered sequence of ordinary commands that re-establishes an object of `kind` at
/// `handle`. Every kind lowers to at least a `GenObject`; kinds with a capture-time binding
/// convention also get the matching bind so later commands in the (recreated-prefix) stream find
/// it current, mirroring how the real application would have called `glGenX` + `glBindX` before
/// any other call could reference the handle.
pub fn expand(kind: ObjectKind, handle: Handle) -> Vec<CommandInner> {
    let gen = CommandInner::GenObject { kind, handle };
    match kind {
        ObjectKind::Buffer => vec![
            gen,
            CommandInner::BindBuffer { target: crate::state::BufferTarget::Array, buffer: handle },
        ],
        ObjectKind::Texture => vec![
            gen,
            CommandInner::BindTexture { unit: 0, texture: handle },
        ],
        ObjectKind::VertexArray => vec![gen, CommandInner::BindVertexArray { vao: handle }],
        ObjectKind::Program => vec![gen, CommandInner::UseProgram { program: handle }],
        ObjectKind::Framebuffer => vec![
            gen,
            CommandInner::BindFramebuffer { read: true, draw: true, framebuffer: handle },
        ],
        // Every other kind (shaders, samplers, queries, syncs, the Vulkan-family objects) has no
        // implicit capture-time binding convention; recreating it is just the Gen/Create call.
        _ => vec![gen],
    }
}

/// Builds the synthetic `Recreate` command value for `kind`/`handle` via the expansion table
/// above.
pub fn build(kind: ObjectKind, handle: Handle) -> CommandInner {
    CommandInner::Recreate { expansion: expand(kind, handle) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_recreation_binds_to_array_target() {
        let expansion = expand(ObjectKind::Buffer, Handle(7));
        assert!(matches!(expansion[0], CommandInner::GenObject { .. }));
        assert!(matches!(expansion[1], CommandInner::BindBuffer { .. }));
    }

    #[test]
    fn shader_recreation_is_just_a_gen() {
        let expansion = expand(ObjectKind::Shader, Handle(1));
        assert_eq!(expansion.len(), 1);
    }
}
