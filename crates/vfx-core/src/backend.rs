//! Collaborator traits: the contract an effect adapter requires from the
//! GPU runtime and from the vendor inference engine.
//!
//! Nothing here knows how images are stored or how inference is performed.
//! Adapters own every buffer they create; engines only ever see borrowed
//! references.

use crate::context::ScopedContext;
use crate::error::{Result, Status};
use crate::types::{Dimensions, ImageDesc};

/// A device image with a fixed format and a mutable size.
pub trait GpuImage {
    /// Current allocation descriptor.
    fn desc(&self) -> &ImageDesc;

    /// Reallocate to `dimensions`, keeping pixel format, component type and
    /// layout.  Contents are undefined afterwards.
    fn resize(&mut self, dimensions: Dimensions) -> Result<()>;

    #[inline]
    fn dimensions(&self) -> Dimensions {
        self.desc().dimensions
    }
}

/// A compositor texture with an image view mapped onto the same storage.
///
/// Texture copies operate on the texture; format transfers operate on the
/// image view.
pub trait GpuTexture: GpuImage {
    type Image: GpuImage;

    fn image(&self) -> &Self::Image;
    fn image_mut(&mut self) -> &mut Self::Image;
}

/// GPU runtime: scoped contexts, allocation, texture copy and format transfer.
pub trait Backend {
    type Image: GpuImage;
    type Texture: GpuTexture<Image = Self::Image>;

    /// Enter the graphics-device context.
    fn enter_graphics(&self) -> Result<ScopedContext<'_>>;

    /// Enter the compute-engine context and make its stream current.
    fn enter_compute(&self) -> Result<ScopedContext<'_>>;

    /// Allocate an image matching `desc`.
    fn create_image(&self, desc: ImageDesc) -> Result<Self::Image>;

    /// Allocate an RGBA u8 texture.
    fn create_texture(&self, dimensions: Dimensions) -> Result<Self::Texture>;

    /// Direct same-format, same-size texture copy.
    fn copy_texture(&self, dst: &mut Self::Texture, src: &Self::Texture) -> Result<()>;

    /// Convert `src` into `dst`'s format, multiplying values by `scale`.
    /// `scratch` is staging storage the runtime may use for multi-step
    /// conversions.  Work is enqueued on the current compute stream.
    fn transfer(
        &self,
        src: &Self::Image,
        dst: &mut Self::Image,
        scale: f32,
        scratch: &mut Self::Image,
    ) -> Status;

    /// Human-readable description of a status code.
    fn error_string(&self, status: Status) -> String;
}

impl<T: Backend + ?Sized> Backend for &T {
    type Image = T::Image;
    type Texture = T::Texture;

    fn enter_graphics(&self) -> Result<ScopedContext<'_>> {
        (**self).enter_graphics()
    }

    fn enter_compute(&self) -> Result<ScopedContext<'_>> {
        (**self).enter_compute()
    }

    fn create_image(&self, desc: ImageDesc) -> Result<Self::Image> {
        (**self).create_image(desc)
    }

    fn create_texture(&self, dimensions: Dimensions) -> Result<Self::Texture> {
        (**self).create_texture(dimensions)
    }

    fn copy_texture(&self, dst: &mut Self::Texture, src: &Self::Texture) -> Result<()> {
        (**self).copy_texture(dst, src)
    }

    fn transfer(
        &self,
        src: &Self::Image,
        dst: &mut Self::Image,
        scale: f32,
        scratch: &mut Self::Image,
    ) -> Status {
        (**self).transfer(src, dst, scale, scratch)
    }

    fn error_string(&self, status: Status) -> String {
        (**self).error_string(status)
    }
}

/// Named engine parameter slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// `u32`, 0 or 1.
    Strength,
    /// Image bound as the engine's first input.
    InputImage0,
    /// Image bound as the engine's first output.
    OutputImage0,
    /// Directory the engine loads its model files from.
    ModelDirectory,
}

impl Parameter {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strength => "Strength",
            Self::InputImage0 => "SrcImage0",
            Self::OutputImage0 => "DstImage0",
            Self::ModelDirectory => "ModelDir",
        }
    }
}

/// Opaque vendor inference effect.
///
/// Image parameters are bound by descriptor: the engine learns shape and
/// format from `set_image` and receives the actual buffers, borrowed, only
/// for the duration of [`run`](Self::run).
pub trait InferenceEffect<I: GpuImage> {
    /// (Re)initialize the effect from the currently bound parameters.
    fn load(&mut self) -> Status;

    /// Run the fixed transform from `source` to `destination`.
    fn run(&mut self, source: &I, destination: &mut I) -> Status;

    fn set_u32(&mut self, parameter: Parameter, value: u32) -> Status;

    fn set_image(&mut self, parameter: Parameter, image: &I) -> Status;

    fn set_string(&mut self, parameter: Parameter, value: &str) -> Status;
}
