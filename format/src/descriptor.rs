//! Neutral pixel/texel format descriptor.
//!
//! `ImageFormat` is the third representation alongside `(base,type)` pairs and sized internal
//! format enums (see [`crate::registry`]). It is the representation the dependency graph and
//! the replay emitter actually reason about, since it carries no API-specific baggage.

use std::fmt;

/// How a single channel's bits should be interpreted.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DataType {
    UNorm8,
    SNorm8,
    UInt8,
    SInt8,
    UNorm16,
    UInt16,
    SInt16,
    UInt32,
    SInt32,
    Float16,
    Float32,
    /// Packed component, width given in bits (e.g. the 5 in `UNSIGNED_SHORT_5_6_5`'s "5").
    UNormPacked(u8),
}

/// A named channel slot in an uncompressed format.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Channel {
    R,
    G,
    B,
    A,
    Depth,
    Stencil,
    /// Channel is not physically present; its sampled value is a constant (used by the
    /// LUMINANCE/ALPHA swizzle: the GB channels of the swizzled form read back as 0 and 1).
    Zero,
    One,
}

/// One component of an uncompressed `ImageFormat`, in little-endian memory order (the first
/// entry is the component at the lowest address).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Component {
    pub channel: Channel,
    pub data_type: DataType,
}

/// Block-compressed codec identifiers covered by the format registry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CompressedCodec {
    S3tcDxt1 { alpha: bool },
    S3tcDxt3,
    S3tcDxt5,
    Etc1,
    Etc2Rgb,
    Etc2Rgba,
    Etc2RgbA1,
    AtcRgb,
    AtcRgbaExplicit,
    AtcRgbaInterpolated,
    Astc { block_w: u8, block_h: u8 },
}

impl CompressedCodec {
    pub fn block_dimensions(&self) -> (u8, u8) {
        match *self {
            CompressedCodec::Astc { block_w, block_h } => (block_w, block_h),
            _ => (4, 4),
        }
    }

    /// Size, in bytes, of one compressed block.
    pub fn block_bytes(&self) -> usize {
        match self {
            CompressedCodec::S3tcDxt1 { .. } => 8,
            CompressedCodec::S3tcDxt3 => 16,
            CompressedCodec::S3tcDxt5 => 16,
            CompressedCodec::Etc1 => 8,
            CompressedCodec::Etc2Rgb => 8,
            CompressedCodec::Etc2Rgba => 16,
            CompressedCodec::Etc2RgbA1 => 8,
            CompressedCodec::AtcRgb => 8,
            CompressedCodec::AtcRgbaExplicit => 16,
            CompressedCodec::AtcRgbaInterpolated => 16,
            // ASTC always packs a block (regardless of its footprint) into 128 bits.
            CompressedCodec::Astc { .. } => 16,
        }
    }
}

/// A neutral descriptor of pixel layout.
///
/// Invariant (§3): formats are value-equal and canonicalized. In particular
/// `GL_LUMINANCE`-family formats always normalize to the R-swizzled single/dual-channel form;
/// see [`crate::registry::luminance_swizzle`].
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ImageFormat {
    Uncompressed { components: Vec<Component> },
    Compressed { codec: CompressedCodec, srgb: bool },
}

impl ImageFormat {
    pub fn is_compressed(&self) -> bool {
        matches!(self, ImageFormat::Compressed { .. })
    }

    /// Size, in bytes, of a single uncompressed texel. Panics for compressed formats (callers
    /// should use `CompressedCodec::block_bytes` instead, over the format's block dimensions).
    pub fn texel_size(&self) -> usize {
        match self {
            ImageFormat::Uncompressed { components } => components
                .iter()
                .map(|c| data_type_size(c.data_type))
                .sum(),
            ImageFormat::Compressed { .. } => {
                panic!("texel_size is not defined for compressed formats")
            }
        }
    }

    /// The canonical "plain" RGBA8 format produced by [`crate::compressed::decompress`].
    pub fn rgba8() -> ImageFormat {
        ImageFormat::Uncompressed {
            components: vec![
                Component { channel: Channel::R, data_type: DataType::UNorm8 },
                Component { channel: Channel::G, data_type: DataType::UNorm8 },
                Component { channel: Channel::B, data_type: DataType::UNorm8 },
                Component { channel: Channel::A, data_type: DataType::UNorm8 },
            ],
        }
    }

    /// The canonical depth format produced by a depth-attachment readback (§4.7.2).
    pub fn depth32f() -> ImageFormat {
        ImageFormat::Uncompressed { components: vec![Component { channel: Channel::Depth, data_type: DataType::Float32 }] }
    }
}

fn data_type_size(dt: DataType) -> usize {
    match dt {
        DataType::UNorm8 | DataType::SNorm8 | DataType::UInt8 | DataType::SInt8 => 1,
        DataType::UNorm16 | DataType::UInt16 | DataType::SInt16 | DataType::Float16 => 2,
        DataType::UInt32 | DataType::SInt32 | DataType::Float32 => 4,
        // packed components are measured as part of the whole packed word elsewhere; treat
        // their individual contribution as zero so callers summing `components` don't
        // double-count a packed format's shared word size.
        DataType::UNormPacked(_) => 0,
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImageFormat::Uncompressed { components } => {
                write!(f, "Uncompressed(")?;
                for (i, c) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{:?}:{:?}", c.channel, c.data_type)?;
                }
                write!(f, ")")
            }
            ImageFormat::Compressed { codec, srgb } => {
                write!(f, "Compressed({:?}, srgb={})", codec, srgb)
            }
        }
    }
}

/// The effective per-channel remap applied to a texture to make a desktop R/RG format sample
/// like an ES LUMINANCE/ALPHA format. See [`crate::registry::luminance_swizzle`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Swizzle {
    pub r: Channel,
    pub g: Channel,
    pub b: Channel,
    pub a: Channel,
}

impl Swizzle {
    pub fn identity() -> Swizzle {
        Swizzle { r: Channel::R, g: Channel::G, b: Channel::B, a: Channel::A }
    }

    /// Compose `self` (applied first) with `outer` (applied to the result). Used by the
    /// compatibility rewrite to combine a user-set swizzle with the one it injects.
    pub fn compose(&self, outer: &Swizzle) -> Swizzle {
        let pick = |c: Channel| match c {
            Channel::R => self.r,
            Channel::G => self.g,
            Channel::B => self.b,
            Channel::A => self.a,
            other => other,
        };
        Swizzle { r: pick(outer.r), g: pick(outer.g), b: pick(outer.b), a: pick(outer.a) }
    }
}
