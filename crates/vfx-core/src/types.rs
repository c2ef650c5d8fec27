//! Image geometry and pixel format contracts.
//!
//! # Layout vocabulary
//!
//! An image is described by four independent attributes:
//!
//! - [`PixelFormat`]: channel set and order (`Rgba`, `Bgr`).
//! - [`ComponentType`]: per-channel storage (`U8`, `F32`).
//! - [`ComponentLayout`]: `Interleaved` (`RGBARGBA…`) or `Planar`
//!   (`RRR…GGG…BBB…`).
//! - [`MemoryLocation`]: where the backing store lives.
//!
//! Buffer allocation is driven entirely by [`ImageDesc`], so every buffer the
//! adapters own is fully described by one value that can be compared, logged
//! and serialized.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Dimensions ──────────────────────────────────────────────────────────────

/// Width × height in pixels.
///
/// Adapters only ever construct positive dimensions; zero-sized requests are
/// rejected at the negotiation boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `true` when either axis is zero.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels (`width × height`).
    #[inline]
    pub const fn pixel_count(self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// `true` when both axes are at least as large as `other`'s.
    #[inline]
    pub const fn covers(self, other: Dimensions) -> bool {
        self.width >= other.width && self.height >= other.height
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ─── Pixel attributes ────────────────────────────────────────────────────────

/// Channel set and channel order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Red, green, blue, alpha.
    Rgba,
    /// Blue, green, red. No alpha; this is the order the inference engine
    /// consumes.
    Bgr,
}

impl PixelFormat {
    /// Number of channels.
    #[inline]
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgba => 4,
            Self::Bgr => 3,
        }
    }
}

/// Per-channel storage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    U8,
    F32,
}

impl ComponentType {
    /// Bytes per channel element.
    #[inline]
    pub const fn element_bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::F32 => 4,
        }
    }
}

/// How channels are arranged in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentLayout {
    /// One value per channel per pixel, pixels contiguous.
    Interleaved,
    /// One contiguous plane per channel.
    Planar,
}

/// Where the image storage lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLocation {
    /// Device memory; the only location the adapters allocate in.
    #[default]
    Gpu,
}

// ─── Image descriptor ────────────────────────────────────────────────────────

/// Complete allocation descriptor for one image buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDesc {
    pub dimensions: Dimensions,
    pub pixel_format: PixelFormat,
    pub component_type: ComponentType,
    pub layout: ComponentLayout,
    pub location: MemoryLocation,
    pub batch: u32,
}

impl ImageDesc {
    /// GPU-resident, batch 1 descriptor.
    pub const fn gpu(
        dimensions: Dimensions,
        pixel_format: PixelFormat,
        component_type: ComponentType,
        layout: ComponentLayout,
    ) -> Self {
        Self {
            dimensions,
            pixel_format,
            component_type,
            layout,
            location: MemoryLocation::Gpu,
            batch: 1,
        }
    }

    /// Descriptor matching a texture: RGBA, u8, interleaved.
    pub const fn texture(dimensions: Dimensions) -> Self {
        Self::gpu(
            dimensions,
            PixelFormat::Rgba,
            ComponentType::U8,
            ComponentLayout::Interleaved,
        )
    }

    /// Same format, different size.
    #[inline]
    pub const fn with_dimensions(self, dimensions: Dimensions) -> Self {
        Self { dimensions, ..self }
    }

    /// Number of channel elements for the whole batch.
    #[inline]
    pub const fn element_count(&self) -> usize {
        self.dimensions.pixel_count() * self.pixel_format.channels() * (self.batch as usize)
    }

    /// Dense allocation size in bytes.
    #[inline]
    pub const fn byte_size(&self) -> usize {
        self.element_count() * self.component_type.element_bytes()
    }
}
