//! Translation between `(base, type)` pairs, sized internal format enums, and [`ImageFormat`].
//!
//! Grounded on the table-driven style of `render-gl`'s `ImplementationParameters` and the
//! `gl::` constant usage throughout the teacher's backend: GL enums are interpreted as plain
//! `u32` values, matched against a hand-built table, never passed to a real driver.

use crate::descriptor::{Channel, Component, DataType, ImageFormat};
use crate::error::{Error, Result};
use crate::gl::{self, GLenum};
use fxhash::FxHashMap;
use lazy_static::lazy_static;

/// A single-enum sized internal format, as stored on a texture/renderbuffer object.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SizedInternalFormat(pub GLenum);

/// A table row: `(base, type) <-> sized internal format`, plus the neutral descriptor and
/// whether this row is one of the LUMINANCE/ALPHA family rows that need a swizzle on replay.
struct Row {
    base: GLenum,
    ty: GLenum,
    sized: GLenum,
    image: fn() -> ImageFormat,
    luminance_like: bool,
}

fn img_r8() -> ImageFormat {
    ImageFormat::Uncompressed { components: vec![Component { channel: Channel::R, data_type: DataType::UNorm8 }] }
}
fn img_rg8() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::R, data_type: DataType::UNorm8 },
            Component { channel: Channel::G, data_type: DataType::UNorm8 },
        ],
    }
}
fn img_rgb8() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::R, data_type: DataType::UNorm8 },
            Component { channel: Channel::G, data_type: DataType::UNorm8 },
            Component { channel: Channel::B, data_type: DataType::UNorm8 },
        ],
    }
}
fn img_rgba8() -> ImageFormat {
    ImageFormat::rgba8()
}
fn img_r16f() -> ImageFormat {
    ImageFormat::Uncompressed { components: vec![Component { channel: Channel::R, data_type: DataType::Float16 }] }
}
fn img_rg16f() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::R, data_type: DataType::Float16 },
            Component { channel: Channel::G, data_type: DataType::Float16 },
        ],
    }
}
fn img_rgb16f() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::R, data_type: DataType::Float16 },
            Component { channel: Channel::G, data_type: DataType::Float16 },
            Component { channel: Channel::B, data_type: DataType::Float16 },
        ],
    }
}
fn img_rgba16f() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::R, data_type: DataType::Float16 },
            Component { channel: Channel::G, data_type: DataType::Float16 },
            Component { channel: Channel::B, data_type: DataType::Float16 },
            Component { channel: Channel::A, data_type: DataType::Float16 },
        ],
    }
}
fn img_r32f() -> ImageFormat {
    ImageFormat::Uncompressed { components: vec![Component { channel: Channel::R, data_type: DataType::Float32 }] }
}
fn img_rg32f() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::R, data_type: DataType::Float32 },
            Component { channel: Channel::G, data_type: DataType::Float32 },
        ],
    }
}
fn img_rgb32f() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::R, data_type: DataType::Float32 },
            Component { channel: Channel::G, data_type: DataType::Float32 },
            Component { channel: Channel::B, data_type: DataType::Float32 },
        ],
    }
}
fn img_rgba32f() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::R, data_type: DataType::Float32 },
            Component { channel: Channel::G, data_type: DataType::Float32 },
            Component { channel: Channel::B, data_type: DataType::Float32 },
            Component { channel: Channel::A, data_type: DataType::Float32 },
        ],
    }
}
fn img_rgb565() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::B, data_type: DataType::UNormPacked(5) },
            Component { channel: Channel::G, data_type: DataType::UNormPacked(6) },
            Component { channel: Channel::R, data_type: DataType::UNormPacked(5) },
        ],
    }
}
fn img_rgba4() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::A, data_type: DataType::UNormPacked(4) },
            Component { channel: Channel::B, data_type: DataType::UNormPacked(4) },
            Component { channel: Channel::G, data_type: DataType::UNormPacked(4) },
            Component { channel: Channel::R, data_type: DataType::UNormPacked(4) },
        ],
    }
}
fn img_rgb5a1() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::A, data_type: DataType::UNormPacked(1) },
            Component { channel: Channel::B, data_type: DataType::UNormPacked(5) },
            Component { channel: Channel::G, data_type: DataType::UNormPacked(5) },
            Component { channel: Channel::R, data_type: DataType::UNormPacked(5) },
        ],
    }
}
fn img_rgb10a2() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::A, data_type: DataType::UNormPacked(2) },
            Component { channel: Channel::B, data_type: DataType::UNormPacked(10) },
            Component { channel: Channel::G, data_type: DataType::UNormPacked(10) },
            Component { channel: Channel::R, data_type: DataType::UNormPacked(10) },
        ],
    }
}
fn img_r11g11b10f() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::B, data_type: DataType::UNormPacked(10) },
            Component { channel: Channel::G, data_type: DataType::UNormPacked(11) },
            Component { channel: Channel::R, data_type: DataType::UNormPacked(11) },
        ],
    }
}
fn img_depth16() -> ImageFormat {
    ImageFormat::Uncompressed { components: vec![Component { channel: Channel::Depth, data_type: DataType::UNorm16 }] }
}
fn img_depth24() -> ImageFormat {
    ImageFormat::Uncompressed { components: vec![Component { channel: Channel::Depth, data_type: DataType::UNormPacked(24) }] }
}
fn img_depth24_stencil8() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::Stencil, data_type: DataType::UInt8 },
            Component { channel: Channel::Depth, data_type: DataType::UNormPacked(24) },
        ],
    }
}
fn img_depth32f_stencil8() -> ImageFormat {
    ImageFormat::Uncompressed {
        components: vec![
            Component { channel: Channel::Stencil, data_type: DataType::UInt8 },
            Component { channel: Channel::Depth, data_type: DataType::Float32 },
        ],
    }
}

// Table of every (base,type) pair recognized by the capture domain. Floating-point RGB rows
// where ES and desktop disagree pick the form valid on both (e.g. RGB16F rather than a
// 3-component-only desktop variant).
lazy_static! {
    static ref ROWS: Vec<Row> = vec![
        Row { base: gl::RED, ty: gl::UNSIGNED_BYTE, sized: gl::R8, image: img_r8, luminance_like: false },
        Row { base: gl::RG, ty: gl::UNSIGNED_BYTE, sized: gl::RG8, image: img_rg8, luminance_like: false },
        Row { base: gl::RGB, ty: gl::UNSIGNED_BYTE, sized: gl::RGB8, image: img_rgb8, luminance_like: false },
        Row { base: gl::RGBA, ty: gl::UNSIGNED_BYTE, sized: gl::RGBA8, image: img_rgba8, luminance_like: false },
        Row { base: gl::RED, ty: gl::HALF_FLOAT, sized: gl::R16F, image: img_r16f, luminance_like: false },
        Row { base: gl::RG, ty: gl::HALF_FLOAT, sized: gl::RG16F, image: img_rg16f, luminance_like: false },
        Row { base: gl::RGB, ty: gl::HALF_FLOAT, sized: gl::RGB16F, image: img_rgb16f, luminance_like: false },
        Row { base: gl::RGBA, ty: gl::HALF_FLOAT, sized: gl::RGBA16F, image: img_rgba16f, luminance_like: false },
        Row { base: gl::RED, ty: gl::FLOAT, sized: gl::R32F, image: img_r32f, luminance_like: false },
        Row { base: gl::RG, ty: gl::FLOAT, sized: gl::RG32F, image: img_rg32f, luminance_like: false },
        Row { base: gl::RGB, ty: gl::FLOAT, sized: gl::RGB32F, image: img_rgb32f, luminance_like: false },
        Row { base: gl::RGBA, ty: gl::FLOAT, sized: gl::RGBA32F, image: img_rgba32f, luminance_like: false },
        Row { base: gl::RGB, ty: gl::UNSIGNED_SHORT_5_6_5, sized: gl::RGB565, image: img_rgb565, luminance_like: false },
        Row { base: gl::RGBA, ty: gl::UNSIGNED_SHORT_4_4_4_4, sized: gl::RGBA4, image: img_rgba4, luminance_like: false },
        Row { base: gl::RGBA, ty: gl::UNSIGNED_SHORT_5_5_5_1, sized: gl::RGB5_A1, image: img_rgb5a1, luminance_like: false },
        Row { base: gl::RGBA, ty: gl::UNSIGNED_INT_2_10_10_10_REV, sized: gl::RGB10_A2, image: img_rgb10a2, luminance_like: false },
        Row { base: gl::RGB, ty: gl::UNSIGNED_INT_10F_11F_11F_REV, sized: gl::R11F_G11F_B10F, image: img_r11g11b10f, luminance_like: false },
        Row { base: gl::DEPTH_COMPONENT, ty: gl::UNSIGNED_SHORT, sized: gl::DEPTH_COMPONENT16, image: img_depth16, luminance_like: false },
        Row { base: gl::DEPTH_COMPONENT, ty: gl::UNSIGNED_INT, sized: gl::DEPTH_COMPONENT24, image: img_depth24, luminance_like: false },
        Row { base: gl::DEPTH_STENCIL, ty: gl::UNSIGNED_INT_24_8, sized: gl::DEPTH24_STENCIL8, image: img_depth24_stencil8, luminance_like: false },
        Row { base: gl::DEPTH_STENCIL, ty: gl::FLOAT_32_UNSIGNED_INT_24_8_REV, sized: gl::DEPTH32F_STENCIL8, image: img_depth32f_stencil8, luminance_like: false },
        // LUMINANCE/ALPHA family: maps onto R/RG plus a swizzle (luminance_swizzle below).
        Row { base: gl::LUMINANCE, ty: gl::UNSIGNED_BYTE, sized: gl::R8, image: img_r8, luminance_like: true },
        Row { base: gl::LUMINANCE_ALPHA, ty: gl::UNSIGNED_BYTE, sized: gl::RG8, image: img_rg8, luminance_like: true },
        Row { base: gl::ALPHA, ty: gl::UNSIGNED_BYTE, sized: gl::R8, image: img_r8, luminance_like: true },
    ];

    static ref BY_PAIR: FxHashMap<(GLenum, GLenum), usize> = {
        let mut m = FxHashMap::default();
        for (i, row) in ROWS.iter().enumerate() {
            m.entry((row.base, row.ty)).or_insert(i);
        }
        m
    };

    static ref BY_SIZED: FxHashMap<GLenum, usize> = {
        let mut m = FxHashMap::default();
        for (i, row) in ROWS.iter().enumerate() {
            // Prefer the non-luminance row as the canonical inverse, matching the invariant
            // that LUMINANCE always normalizes to its R/RG form rather than the reverse.
            m.entry(row.sized).or_insert(i);
        }
        m
    };
}

/// Total function over the GL enum pairs recognized by the capture domain (§4.1).
pub fn sized_internal(base: GLenum, ty: GLenum) -> Result<SizedInternalFormat> {
    BY_PAIR
        .get(&(base, ty))
        .map(|&i| SizedInternalFormat(ROWS[i].sized))
        .ok_or(Error::UnsupportedFormat { base, ty })
}

/// Inverse of `sized_internal`; totality guaranteed for the registered set.
pub fn extract_sized(sif: SizedInternalFormat) -> Result<(GLenum, GLenum)> {
    BY_SIZED
        .get(&sif.0)
        .map(|&i| (ROWS[i].base, ROWS[i].ty))
        .ok_or(Error::UnsupportedFormat { base: 0, ty: sif.0 })
}

/// Full table mapping `(base,type)` to a neutral descriptor.
pub fn as_image(base: GLenum, ty: GLenum) -> Result<ImageFormat> {
    BY_PAIR
        .get(&(base, ty))
        .map(|&i| (ROWS[i].image)())
        .ok_or(Error::UnsupportedFormat { base, ty })
}

/// `get_sized_internal_format_from_type_count(type, n)`: driven by a 4-entry table per type
/// family plus the special-case packed rows. `n` is the component count (1..=4).
pub fn get_sized_internal_format_from_type_count(ty: GLenum, n: u32) -> Result<SizedInternalFormat> {
    let base = match (ty, n) {
        (gl::UNSIGNED_BYTE, 1) => gl::RED,
        (gl::UNSIGNED_BYTE, 2) => gl::RG,
        (gl::UNSIGNED_BYTE, 3) => gl::RGB,
        (gl::UNSIGNED_BYTE, 4) => gl::RGBA,
        (gl::HALF_FLOAT, 1) => gl::RED,
        (gl::HALF_FLOAT, 2) => gl::RG,
        (gl::HALF_FLOAT, 3) => gl::RGB,
        (gl::HALF_FLOAT, 4) => gl::RGBA,
        (gl::FLOAT, 1) => gl::RED,
        (gl::FLOAT, 2) => gl::RG,
        (gl::FLOAT, 3) => gl::RGB,
        (gl::FLOAT, 4) => gl::RGBA,
        (gl::UNSIGNED_SHORT_5_6_5, 3) => gl::RGB,
        (gl::UNSIGNED_INT_2_10_10_10_REV, 4) => gl::RGBA,
        _ => return Err(Error::UnsupportedFormat { base: 0, ty }),
    };
    sized_internal(base, ty)
}

/// Emits the per-channel remap that makes a desktop R/RG format behave like ES
/// LUMINANCE/ALPHA: `R,G,B,A -> R,G,B,A,0,1` per channel as documented in §4.1.
pub fn luminance_swizzle(internal: SizedInternalFormat) -> Option<crate::descriptor::Swizzle> {
    use crate::descriptor::{Channel, Swizzle};
    let row = BY_SIZED.get(&internal.0).map(|&i| &ROWS[i])?;
    if !row.luminance_like {
        return None;
    }
    Some(match row.base {
        x if x == gl::LUMINANCE => Swizzle { r: Channel::R, g: Channel::R, b: Channel::R, a: Channel::One },
        x if x == gl::LUMINANCE_ALPHA => Swizzle { r: Channel::R, g: Channel::R, b: Channel::R, a: Channel::G },
        x if x == gl::ALPHA => Swizzle { r: Channel::Zero, g: Channel::Zero, b: Channel::Zero, a: Channel::R },
        _ => Swizzle::identity(),
    })
}

/// True if `sized` is one of the unsized internal formats the compatibility rewrite must
/// replace (§4.7.3): plain `RGB`/`RGBA`/`LUMINANCE*` used directly as an internal format.
pub fn is_unsized_internal_format(sized: GLenum) -> bool {
    sized == gl::RGB_UNSIZED
        || sized == gl::RGBA_UNSIZED
        || sized == gl::LUMINANCE
        || sized == gl::LUMINANCE_ALPHA
        || sized == gl::ALPHA
}

/// Maps an unsized internal format to its sized equivalent, choosing 8-bit unorm components.
pub fn unsized_to_sized(unsized_format: GLenum) -> Result<SizedInternalFormat> {
    match unsized_format {
        x if x == gl::RGB => Ok(SizedInternalFormat(gl::RGB8)),
        x if x == gl::RGBA => Ok(SizedInternalFormat(gl::RGBA8)),
        x if x == gl::LUMINANCE => Ok(SizedInternalFormat(gl::R8)),
        x if x == gl::LUMINANCE_ALPHA => Ok(SizedInternalFormat(gl::RG8)),
        x if x == gl::ALPHA => Ok(SizedInternalFormat(gl::R8)),
        _ => Err(Error::UnsupportedFormat { base: unsized_format, ty: 0 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_internal_is_total_over_registered_pairs() {
        for row in ROWS.iter() {
            let sif = sized_internal(row.base, row.ty).expect("registered pair must resolve");
            assert_eq!(sif.0, row.sized);
        }
    }

    #[test]
    fn extract_sized_round_trips_to_a_canonical_equivalent() {
        // RGBA8 is not part of the luminance family, so the round trip is exact.
        let sif = sized_internal(gl::RGBA, gl::UNSIGNED_BYTE).unwrap();
        let (base, ty) = extract_sized(sif).unwrap();
        assert_eq!((base, ty), (gl::RGBA, gl::UNSIGNED_BYTE));
    }

    #[test]
    fn luminance_normalizes_to_r_with_swizzle() {
        let sif = sized_internal(gl::LUMINANCE, gl::UNSIGNED_BYTE).unwrap();
        assert_eq!(sif.0, gl::R8);
        let sw = luminance_swizzle(sif).expect("luminance must carry a swizzle");
        assert_eq!(sw.r, Channel::R);
        assert_eq!(sw.g, Channel::R);
        assert_eq!(sw.b, Channel::R);
        assert_eq!(sw.a, Channel::One);
    }

    #[test]
    fn unsupported_pair_is_an_error() {
        assert!(as_image(0xDEAD, 0xBEEF).is_err());
    }

    #[test]
    fn get_sized_internal_format_from_type_count_matches_table() {
        let sif = get_sized_internal_format_from_type_count(gl::UNSIGNED_BYTE, 4).unwrap();
        assert_eq!(sif.0, gl::RGBA8);
    }
}
