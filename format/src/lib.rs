//! Format registry (§4.1): translation between the three ways a pixel format shows up in a
//! captured API stream — a GL `(base, type)` pair, a sized internal format enum, and the
//! neutral [`descriptor::ImageFormat`] the rest of the pipeline reasons about — plus
//! decompression of block-compressed codecs into a canonical RGBA8 form.

pub mod compressed;
pub mod descriptor;
pub mod error;
pub mod gl;
pub mod registry;

pub use descriptor::{Channel, CompressedCodec, Component, DataType, ImageFormat, Swizzle};
pub use error::{Error, Result};
pub use registry::{
    as_image, extract_sized, get_sized_internal_format_from_type_count, is_unsized_internal_format,
    luminance_swizzle, sized_internal, unsized_to_sized, SizedInternalFormat,
};
