//! Host-memory images and textures.
//!
//! Storage is dense: no row padding, one allocation per image.  Values are
//! kept in the component type's native domain: `u8` images hold `0..=255`,
//! `f32` images hold whatever the last transfer wrote (with a transfer scale
//! of `1.0` that is the same `0.0..=255.0` range).

use std::cell::Cell;
use std::rc::Rc;

use vfx_core::error::{EngineError, Result};
use vfx_core::types::{ComponentLayout, ComponentType, Dimensions, ImageDesc, PixelFormat};
use vfx_core::{GpuImage, GpuTexture};

/// Alpha written when the source format carries none.
pub const OPAQUE_ALPHA: f32 = 255.0;

#[derive(Clone, Debug)]
enum Storage {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

impl Storage {
    fn zeroed(desc: &ImageDesc) -> Self {
        let count = desc.element_count();
        match desc.component_type {
            ComponentType::U8 => Self::U8(vec![0; count]),
            ComponentType::F32 => Self::F32(vec![0.0; count]),
        }
    }
}

/// One-shot resize failure shared between a backend and its buffers.
#[derive(Debug, Default)]
pub(crate) struct ResizeFault {
    remaining: Cell<Option<u64>>,
}

impl ResizeFault {
    pub(crate) fn arm(&self, n: u64) {
        self.remaining.set(Some(n));
    }

    fn trip(&self) -> bool {
        match self.remaining.get() {
            Some(0) => {
                self.remaining.set(None);
                true
            }
            Some(n) => {
                self.remaining.set(Some(n - 1));
                false
            }
            None => false,
        }
    }
}

/// A host-resident image honoring an [`ImageDesc`].
#[derive(Clone, Debug)]
pub struct HostImage {
    desc: ImageDesc,
    storage: Storage,
    fault: Option<Rc<ResizeFault>>,
}

impl HostImage {
    pub fn new(desc: ImageDesc) -> Result<Self> {
        validate_desc(&desc)?;
        Ok(Self {
            storage: Storage::zeroed(&desc),
            desc,
            fault: None,
        })
    }

    pub(crate) fn with_resize_fault(mut self, fault: Rc<ResizeFault>) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Raw `u8` elements, if this is a `u8` image.
    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.storage {
            Storage::U8(data) => Some(data),
            Storage::F32(_) => None,
        }
    }

    /// Raw `f32` elements, if this is an `f32` image.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.storage {
            Storage::F32(data) => Some(data),
            Storage::U8(_) => None,
        }
    }

    #[inline]
    fn index(&self, x: u32, y: u32, channel: usize) -> usize {
        let w = self.desc.dimensions.width as usize;
        let (x, y) = (x as usize, y as usize);
        match self.desc.layout {
            ComponentLayout::Interleaved => {
                (y * w + x) * self.desc.pixel_format.channels() + channel
            }
            ComponentLayout::Planar => {
                channel * self.desc.dimensions.pixel_count() + y * w + x
            }
        }
    }

    /// Read one storage channel.
    #[inline]
    pub fn channel(&self, x: u32, y: u32, channel: usize) -> f32 {
        let i = self.index(x, y, channel);
        match &self.storage {
            Storage::U8(data) => data[i] as f32,
            Storage::F32(data) => data[i],
        }
    }

    /// Write one storage channel; `u8` images round and saturate.
    #[inline]
    pub fn set_channel(&mut self, x: u32, y: u32, channel: usize, value: f32) {
        let i = self.index(x, y, channel);
        match &mut self.storage {
            Storage::U8(data) => data[i] = value.round().clamp(0.0, 255.0) as u8,
            Storage::F32(data) => data[i] = value,
        }
    }

    /// Read a pixel as logical `[r, g, b, a]`.
    pub fn read_rgba(&self, x: u32, y: u32) -> [f32; 4] {
        match self.desc.pixel_format {
            PixelFormat::Rgba => [
                self.channel(x, y, 0),
                self.channel(x, y, 1),
                self.channel(x, y, 2),
                self.channel(x, y, 3),
            ],
            PixelFormat::Bgr => [
                self.channel(x, y, 2),
                self.channel(x, y, 1),
                self.channel(x, y, 0),
                OPAQUE_ALPHA,
            ],
        }
    }

    /// Write a logical `[r, g, b, a]` pixel; alpha is dropped for BGR.
    pub fn write_rgba(&mut self, x: u32, y: u32, [r, g, b, a]: [f32; 4]) {
        match self.desc.pixel_format {
            PixelFormat::Rgba => {
                self.set_channel(x, y, 0, r);
                self.set_channel(x, y, 1, g);
                self.set_channel(x, y, 2, b);
                self.set_channel(x, y, 3, a);
            }
            PixelFormat::Bgr => {
                self.set_channel(x, y, 0, b);
                self.set_channel(x, y, 1, g);
                self.set_channel(x, y, 2, r);
            }
        }
    }
}

impl GpuImage for HostImage {
    fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    fn resize(&mut self, dimensions: Dimensions) -> Result<()> {
        let desc = self.desc.with_dimensions(dimensions);
        validate_desc(&desc)?;
        if self.fault.as_ref().is_some_and(|fault| fault.trip()) {
            return Err(EngineError::Allocation {
                desc,
                reason: "injected resize failure".into(),
            });
        }
        self.storage = Storage::zeroed(&desc);
        self.desc = desc;
        Ok(())
    }
}

fn validate_desc(desc: &ImageDesc) -> Result<()> {
    if desc.dimensions.is_empty() || desc.batch == 0 {
        return Err(EngineError::Allocation {
            desc: *desc,
            reason: "zero-sized image".into(),
        });
    }
    Ok(())
}

// ─── Texture ─────────────────────────────────────────────────────────────────

/// RGBA u8 interleaved texture with its image view.
#[derive(Clone, Debug)]
pub struct HostTexture {
    image: HostImage,
}

impl HostTexture {
    pub fn new(dimensions: Dimensions) -> Result<Self> {
        Ok(Self {
            image: HostImage::new(ImageDesc::texture(dimensions))?,
        })
    }

    /// Wrap tightly packed RGBA8 pixels.
    pub fn from_rgba8(dimensions: Dimensions, pixels: Vec<u8>) -> Result<Self> {
        let desc = ImageDesc::texture(dimensions);
        validate_desc(&desc)?;
        if pixels.len() != desc.byte_size() {
            return Err(EngineError::DimensionMismatch(format!(
                "{dimensions} RGBA8 texture needs {} bytes, got {}",
                desc.byte_size(),
                pixels.len()
            )));
        }
        Ok(Self {
            image: HostImage {
                desc,
                storage: Storage::U8(pixels),
                fault: None,
            },
        })
    }

    pub(crate) fn with_resize_fault(self, fault: Rc<ResizeFault>) -> Self {
        Self {
            image: self.image.with_resize_fault(fault),
        }
    }

    /// Tightly packed RGBA8 pixels.
    pub fn rgba8(&self) -> &[u8] {
        match &self.image.storage {
            Storage::U8(data) => data,
            Storage::F32(_) => unreachable!("texture storage is always u8"),
        }
    }

    pub(crate) fn copy_from(&mut self, src: &HostTexture) {
        self.image.storage.clone_from(&src.image.storage);
    }
}

impl GpuImage for HostTexture {
    fn desc(&self) -> &ImageDesc {
        self.image.desc()
    }

    fn resize(&mut self, dimensions: Dimensions) -> Result<()> {
        self.image.resize(dimensions)
    }
}

impl GpuTexture for HostTexture {
    type Image = HostImage;

    fn image(&self) -> &HostImage {
        &self.image
    }

    fn image_mut(&mut self) -> &mut HostImage {
        &mut self.image
    }
}
