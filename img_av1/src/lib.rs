//! img-av1: still image pipeline
//!
//! AVIF via ImageMagick with a WebP fallback, plus optional reconstruction of
//! Apple gain-map HDR photos into PQ AVIF.

pub mod conversion_api;
pub mod hdr;

pub use conversion_api::{convert_image, AVIF_EXTENSION, WEBP_EXTENSION};
pub use hdr::{AppleGainMap, HdrBundle, HdrReconstructor, NoHdr};
