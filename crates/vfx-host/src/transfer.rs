//! Format-converting image transfer.
//!
//! Converts between any combination of pixel format, component type and
//! layout in a single pass through logical RGBA.  Values read from the source
//! are multiplied by the transfer scale; alpha synthesized for sources
//! without an alpha channel is written as [`OPAQUE_ALPHA`] unscaled.

use vfx_core::error::Status;
use vfx_core::types::PixelFormat;
use vfx_core::GpuImage;

use crate::image::{HostImage, OPAQUE_ALPHA};

/// Convert `src` into `dst`.  Both images must have the same dimensions.
pub fn transfer(src: &HostImage, dst: &mut HostImage, scale: f32) -> Status {
    if src.dimensions() != dst.dimensions() {
        return Status::ERR_MISMATCH;
    }
    if !scale.is_finite() {
        return Status::ERR_PARAMETER;
    }

    let dims = src.dimensions();
    let has_alpha = src.desc().pixel_format == PixelFormat::Rgba;
    for y in 0..dims.height {
        for x in 0..dims.width {
            let [r, g, b, a] = src.read_rgba(x, y);
            let a = if has_alpha { a * scale } else { OPAQUE_ALPHA };
            dst.write_rgba(x, y, [r * scale, g * scale, b * scale, a]);
        }
    }
    Status::SUCCESS
}
