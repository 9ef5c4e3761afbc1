//! **4.7.3 CompatibilityRewrite** — normalizes API calls the source device accepted but a
//! differently-capable replay target might not. Four rewrites (§4.7.3 "Required rewrites"):
//! LUMINANCE/ALPHA textures get an explicit swizzle to keep sampling equivalent to the R/RG form
//! the format registry canonicalizes them to (§4.1 `luminance_swizzle`); other unsized internal
//! formats (plain `GL_RGB`/`GL_RGBA`) are replaced with their sized equivalents; the ES-only
//! `HALF_FLOAT_OES` enum is rewritten to/from core `HALF_FLOAT` depending on what the target
//! declares it needs; and compressed textures in a codec the target doesn't declare support for
//! are decompressed to plain RGBA8 up front, temporarily unbinding any pixel-unpack buffer so the
//! decompressed bytes are supplied from host memory.

use crate::chain::{Downstream, Transformer};
use fxhash::{FxHashMap, FxHashSet};
use replay_core::command::CommandId;
use replay_core::object::Handle;
use replay_core::state::BufferTarget;
use replay_core::{Command, CommandInner, Issue, IssueSink, Severity};
use replay_format::{CompressedCodec, DataType, ImageFormat};

/// What the replay target declares it can sample/accept natively; anything outside these sets
/// is rewritten by this transformer instead of replayed as the source device sent it.
pub struct DeviceCaps {
    pub compressed_formats: FxHashSet<CompressedCodec>,
    /// Whether the target needs `GL_HALF_FLOAT_OES` in place of core `GL_HALF_FLOAT` for
    /// half-float uploads (§4.7.3 "rewrite half-float enum between ES/core GL").
    pub requires_half_float_oes: bool,
}

impl DeviceCaps {
    pub fn none() -> DeviceCaps {
        DeviceCaps { compressed_formats: FxHashSet::default(), requires_half_float_oes: false }
    }
}

pub struct CompatibilityRewrite {
    caps: DeviceCaps,
    /// Swizzle already composed onto each texture, so repeated luminance-family uploads to the
    /// same texture don't stack the remap twice (§4.7.3 composition rule).
    applied_swizzle: FxHashMap<Handle, replay_format::Swizzle>,
    /// Shared diagnostic sink (§11 supplement): an unsupported compressed format silently
    /// decompressed (or, failing that, stubbed through unchanged) is exactly the kind of soft
    /// problem `IssuesRequest` exists to surface.
    issues: Option<IssueSink>,
}

impl CompatibilityRewrite {
    pub fn new(caps: DeviceCaps) -> CompatibilityRewrite {
        CompatibilityRewrite { caps, applied_swizzle: FxHashMap::default(), issues: None }
    }

    pub fn with_issue_sink(caps: DeviceCaps, issues: IssueSink) -> CompatibilityRewrite {
        CompatibilityRewrite { caps, applied_swizzle: FxHashMap::default(), issues: Some(issues) }
    }

    fn luminance_swizzle_for(base: u32, format: &replay_format::ImageFormat) -> Option<replay_format::Swizzle> {
        let is_luminance_family =
            base == replay_format::gl::LUMINANCE || base == replay_format::gl::LUMINANCE_ALPHA || base == replay_format::gl::ALPHA;
        if !is_luminance_family {
            return None;
        }
        let sized = replay_format::sized_internal(base, replay_format::gl::UNSIGNED_BYTE).ok()?;
        let _ = format;
        replay_format::luminance_swizzle(sized)
    }

    /// True if `format` carries any 16-bit float component — what a half-float upload's
    /// canonicalized descriptor looks like regardless of which literal enum the source used.
    fn uses_float16(format: &ImageFormat) -> bool {
        match format {
            ImageFormat::Uncompressed { components } => components.iter().any(|c| c.data_type == DataType::Float16),
            ImageFormat::Compressed { .. } => false,
        }
    }

    fn report_unsupported_codec(&self, id: CommandId, codec: &CompressedCodec, err: replay_format::Error) {
        log::warn!("CompatibilityRewrite: decompress failed for {:?}, forwarding compressed upload as-is: {}", codec, err);
        if let Some(issues) = &self.issues {
            issues.borrow_mut().push(Issue::new(
                id,
                Severity::Warning,
                format!("unsupported compressed format {:?} could not be decompressed, replayed as-is: {}", codec, err),
            ));
        }
    }

    /// The pixel-unpack buffer currently bound on `cmd`'s thread, if any (§4.7.3 fourth rewrite).
    fn bound_pixel_unpack_buffer(downstream: &dyn Downstream, thread: replay_core::ThreadId) -> Handle {
        downstream
            .state()
            .get_context(thread)
            .and_then(|ctx| ctx.bindings.bound_buffer.get(&BufferTarget::PixelUnpack).copied())
            .unwrap_or(Handle::NONE)
    }
}

impl Transformer for CompatibilityRewrite {
    fn on_command(&mut self, id: CommandId, cmd: Command, downstream: &mut dyn Downstream) {
        match &cmd.inner {
            CommandInner::TexImage2D { texture, format, source_base, uses_half_float_oes, .. } => {
                if let Some(swizzle) = Self::luminance_swizzle_for(*source_base, format) {
                    let composed = match self.applied_swizzle.get(texture) {
                        Some(existing) => existing.compose(&swizzle),
                        None => swizzle,
                    };
                    self.applied_swizzle.insert(*texture, composed);
                    let rewritten = self.rewrite_half_float(cmd.clone());
                    downstream.dispatch(id, rewritten);
                    downstream.dispatch(
                        id.derive(1),
                        Command::new(cmd.thread(), CommandInner::SetTextureSwizzle { texture: *texture, swizzle: composed }),
                    );
                    return;
                }

                // Second rewrite: plain unsized internal formats (`GL_RGB`/`GL_RGBA`) replaced
                // with their sized equivalents. Luminance-family sources never reach here (they
                // returned above), so this only fires for the remaining unsized bases.
                let mut rewritten = cmd.clone();
                if let CommandInner::TexImage2D { source_base, .. } = &mut rewritten.inner {
                    if *source_base != 0 && replay_format::is_unsized_internal_format(*source_base) {
                        if replay_format::unsized_to_sized(*source_base).is_ok() {
                            *source_base = 0;
                        }
                    }
                }
                let _ = uses_half_float_oes;
                let rewritten = self.rewrite_half_float(rewritten);
                downstream.dispatch(id, rewritten);
            }

            CommandInner::CompressedTexImage2D { texture, level, width, height, codec, data } => {
                if self.caps.compressed_formats.contains(codec) {
                    downstream.dispatch(id, cmd);
                    return;
                }
                match replay_format::compressed::decompress(codec, *width, *height, &data.bytes) {
                    Ok((image_format, rgba)) => {
                        log::debug!("CompatibilityRewrite: decompressing {:?} for texture {:?} (target lacks native support)", codec, texture);
                        let mut decompressed = data.clone();
                        decompressed.bytes = rgba;
                        let unpack = Self::bound_pixel_unpack_buffer(downstream, cmd.thread());
                        if !unpack.is_none() {
                            downstream.dispatch(
                                id.derive(1),
                                Command::new(cmd.thread(), CommandInner::BindBuffer { target: BufferTarget::PixelUnpack, buffer: Handle::NONE }),
                            );
                        }
                        downstream.dispatch(
                            id,
                            Command::new(
                                cmd.thread(),
                                CommandInner::TexImage2D {
                                    texture: *texture,
                                    level: *level,
                                    width: *width,
                                    height: *height,
                                    format: image_format,
                                    source_base: 0,
                                    uses_half_float_oes: false,
                                    data: decompressed,
                                },
                            ),
                        );
                        if !unpack.is_none() {
                            downstream.dispatch(
                                id.derive(2),
                                Command::new(cmd.thread(), CommandInner::BindBuffer { target: BufferTarget::PixelUnpack, buffer: unpack }),
                            );
                        }
                    }
                    Err(e) => {
                        self.report_unsupported_codec(id, codec, e);
                        downstream.dispatch(id, cmd);
                    }
                }
            }

            CommandInner::CompressedTexSubImage2D { texture, level, rect, codec, data } => {
                if self.caps.compressed_formats.contains(codec) {
                    downstream.dispatch(id, cmd);
                    return;
                }
                match replay_format::compressed::decompress(codec, rect.width, rect.height, &data.bytes) {
                    Ok((_image_format, rgba)) => {
                        log::debug!("CompatibilityRewrite: decompressing {:?} sub-upload for texture {:?} (target lacks native support)", codec, texture);
                        let mut decompressed = data.clone();
                        decompressed.bytes = rgba;
                        let unpack = Self::bound_pixel_unpack_buffer(downstream, cmd.thread());
                        if !unpack.is_none() {
                            downstream.dispatch(
                                id.derive(1),
                                Command::new(cmd.thread(), CommandInner::BindBuffer { target: BufferTarget::PixelUnpack, buffer: Handle::NONE }),
                            );
                        }
                        downstream.dispatch(
                            id,
                            Command::new(
                                cmd.thread(),
                                CommandInner::TexSubImage2D { texture: *texture, level: *level, rect: *rect, data: decompressed },
                            ),
                        );
                        if !unpack.is_none() {
                            downstream.dispatch(
                                id.derive(2),
                                Command::new(cmd.thread(), CommandInner::BindBuffer { target: BufferTarget::PixelUnpack, buffer: unpack }),
                            );
                        }
                    }
                    Err(e) => {
                        self.report_unsupported_codec(id, codec, e);
                        downstream.dispatch(id, cmd);
                    }
                }
            }

            _ => downstream.dispatch(id, cmd),
        }
    }
}

impl CompatibilityRewrite {
    /// Third rewrite: flips `uses_half_float_oes` to match what the target declares it needs,
    /// but only for uploads whose canonical format actually carries a 16-bit float component —
    /// an 8-bit upload that happens to share the flag's default has nothing to rewrite.
    fn rewrite_half_float(&self, mut cmd: Command) -> Command {
        if let CommandInner::TexImage2D { format, uses_half_float_oes, .. } = &mut cmd.inner {
            if Self::uses_float16(format) {
                *uses_half_float_oes = self.caps.requires_half_float_oes;
            }
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::pool::{Observation, Pool};

    struct Collector(Vec<Command>, replay_core::State);

    impl Downstream for Collector {
        fn dispatch(&mut self, _id: CommandId, cmd: Command) {
            self.0.push(cmd);
        }

        fn state(&self) -> &replay_core::State {
            &self.1
        }
    }

    #[test]
    fn decompress_failure_reports_an_issue_and_forwards_the_original_command() {
        let issues = replay_core::issue::new_issue_sink();
        let mut rewrite = CompatibilityRewrite::with_issue_sink(DeviceCaps::none(), issues.clone());
        let mut collector = Collector(Vec::new(), replay_core::State::new());
        let cmd = Command::new(
            1,
            CommandInner::CompressedTexImage2D {
                texture: Handle(1),
                level: 0,
                width: 4,
                height: 4,
                codec: CompressedCodec::S3tcDxt1 { alpha: false },
                data: Observation { pool: Pool::Application, base: 0, bytes: vec![0u8; 4] }, // truncated
            },
        );
        rewrite.on_command(CommandId::root(1), cmd, &mut collector);

        assert_eq!(issues.borrow().len(), 1);
        assert_eq!(issues.borrow()[0].severity, Severity::Warning);
        assert!(matches!(collector.0[0].inner, CommandInner::CompressedTexImage2D { .. }));
    }

    #[test]
    fn a_declared_native_codec_passes_through_untouched() {
        let mut caps = DeviceCaps::none();
        caps.compressed_formats.insert(CompressedCodec::S3tcDxt1 { alpha: false });
        let mut rewrite = CompatibilityRewrite::new(caps);
        let mut collector = Collector(Vec::new(), replay_core::State::new());
        let cmd = Command::new(
            1,
            CommandInner::CompressedTexImage2D {
                texture: Handle(1),
                level: 0,
                width: 4,
                height: 4,
                codec: CompressedCodec::S3tcDxt1 { alpha: false },
                data: Observation { pool: Pool::Application, base: 0, bytes: vec![0u8; 8] },
            },
        );
        rewrite.on_command(CommandId::root(1), cmd, &mut collector);
        assert!(matches!(collector.0[0].inner, CommandInner::CompressedTexImage2D { .. }));
    }

    fn tex_image_2d(source_base: u32, format: ImageFormat, uses_half_float_oes: bool) -> Command {
        Command::new(
            1,
            CommandInner::TexImage2D {
                texture: Handle(9),
                level: 0,
                width: 4,
                height: 4,
                format,
                source_base,
                uses_half_float_oes,
                data: Observation { pool: Pool::Application, base: 0, bytes: vec![0u8; 64] },
            },
        )
    }

    #[test]
    fn unsized_rgb_internal_format_is_rewritten_to_zero_source_base() {
        let mut rewrite = CompatibilityRewrite::new(DeviceCaps::none());
        let mut collector = Collector(Vec::new(), replay_core::State::new());
        let cmd = tex_image_2d(replay_format::gl::RGB_UNSIZED, ImageFormat::rgba8(), false);
        rewrite.on_command(CommandId::root(1), cmd, &mut collector);
        match &collector.0[0].inner {
            CommandInner::TexImage2D { source_base, .. } => assert_eq!(*source_base, 0),
            _ => panic!("expected TexImage2D"),
        }
    }

    #[test]
    fn half_float_upload_is_rewritten_when_target_requires_the_oes_enum() {
        let mut caps = DeviceCaps::none();
        caps.requires_half_float_oes = true;
        let mut rewrite = CompatibilityRewrite::new(caps);
        let mut collector = Collector(Vec::new(), replay_core::State::new());
        let float16_format = ImageFormat::Uncompressed {
            components: vec![replay_format::Component { channel: replay_format::Channel::R, data_type: DataType::Float16 }],
        };
        let cmd = tex_image_2d(0, float16_format, false);
        rewrite.on_command(CommandId::root(1), cmd, &mut collector);
        match &collector.0[0].inner {
            CommandInner::TexImage2D { uses_half_float_oes, .. } => assert!(*uses_half_float_oes),
            _ => panic!("expected TexImage2D"),
        }
    }

    #[test]
    fn non_float_upload_is_left_untouched_by_the_half_float_rewrite() {
        let mut caps = DeviceCaps::none();
        caps.requires_half_float_oes = true;
        let mut rewrite = CompatibilityRewrite::new(caps);
        let mut collector = Collector(Vec::new(), replay_core::State::new());
        let cmd = tex_image_2d(0, ImageFormat::rgba8(), false);
        rewrite.on_command(CommandId::root(1), cmd, &mut collector);
        match &collector.0[0].inner {
            CommandInner::TexImage2D { uses_half_float_oes, .. } => assert!(!*uses_half_float_oes),
            _ => panic!("expected TexImage2D"),
        }
    }
}
