//! Buffer lifecycle for the super-resolution chain.
//!
//! ```text
//! input (texture, RGBA u8)
//!   └─► convert_to_fp32 (RGBA f32 planar)
//!         └─► source (BGR f32 planar) ──run──► destination (BGR f32 planar)
//!                                                 └─► convert_to_u8 (RGBA u8)
//!                                                       └─► output (texture)
//! ```
//!
//! The first three buffers follow the negotiated input size, the next three
//! the negotiated output size.  `scratch` backs every transfer and is
//! allocated once at the output size of the first negotiation; it is never
//! resized afterwards.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use vfx_core::error::{EngineError, Result};
use vfx_core::types::{ComponentLayout, ComponentType, Dimensions, ImageDesc, PixelFormat};
use vfx_core::{Backend, GpuImage};

use crate::negotiate::NegotiatedSizing;

/// Which negotiated size a buffer follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Input,
    Output,
    /// Sized once, then left alone.
    Fixed,
}

/// The seven buffers the pipeline owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferRole {
    Input,
    ConvertToFp32,
    Source,
    Destination,
    ConvertToU8,
    Output,
    Scratch,
}

impl BufferRole {
    pub const ALL: [BufferRole; 7] = [
        Self::Input,
        Self::ConvertToFp32,
        Self::Source,
        Self::Destination,
        Self::ConvertToU8,
        Self::Output,
        Self::Scratch,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::ConvertToFp32 => "convert_to_fp32",
            Self::Source => "source",
            Self::Destination => "destination",
            Self::ConvertToU8 => "convert_to_u8",
            Self::Output => "output",
            Self::Scratch => "scratch",
        }
    }

    pub const fn size_class(self) -> SizeClass {
        match self {
            Self::Input | Self::ConvertToFp32 | Self::Source => SizeClass::Input,
            Self::Destination | Self::ConvertToU8 | Self::Output => SizeClass::Output,
            Self::Scratch => SizeClass::Fixed,
        }
    }

    /// Compositor textures rather than plain images.
    pub const fn is_texture(self) -> bool {
        matches!(self, Self::Input | Self::Output)
    }

    /// Fixed format of this role at the size `sizing` calls for.
    ///
    /// For [`BufferRole::Scratch`] this is the size of a first allocation.
    pub fn desc(self, sizing: &NegotiatedSizing) -> ImageDesc {
        use ComponentLayout::{Interleaved, Planar};
        use ComponentType::{F32, U8};
        use PixelFormat::{Bgr, Rgba};

        let dims = match self.size_class() {
            SizeClass::Input => sizing.input,
            SizeClass::Output | SizeClass::Fixed => sizing.output,
        };
        match self {
            Self::Input | Self::Output => ImageDesc::texture(dims),
            Self::ConvertToFp32 => ImageDesc::gpu(dims, Rgba, F32, Planar),
            Self::Source | Self::Destination => ImageDesc::gpu(dims, Bgr, F32, Planar),
            Self::ConvertToU8 => ImageDesc::gpu(dims, Rgba, U8, Interleaved),
            Self::Scratch => ImageDesc::gpu(dims, Rgba, U8, Planar),
        }
    }
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a buffer plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlannedBuffer {
    pub role: BufferRole,
    pub size_class: SizeClass,
    pub texture: bool,
    pub desc: ImageDesc,
}

/// The buffers a fresh pipeline would allocate for `sizing`.
pub fn plan(sizing: &NegotiatedSizing) -> Vec<PlannedBuffer> {
    BufferRole::ALL
        .into_iter()
        .map(|role| PlannedBuffer {
            role,
            size_class: role.size_class(),
            texture: role.is_texture(),
            desc: role.desc(sizing),
        })
        .collect()
}

// ─── Ensure ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotChange {
    Unchanged,
    Allocated,
    Resized,
}

impl SlotChange {
    fn changed(self) -> bool {
        self != Self::Unchanged
    }
}

fn ensure_slot<T: GpuImage>(
    slot: &mut Option<T>,
    role: BufferRole,
    dims: Dimensions,
    allocate: impl FnOnce() -> Result<T>,
) -> Result<SlotChange> {
    if let Some(buffer) = slot.as_mut() {
        let from = buffer.dimensions();
        if from == dims {
            return Ok(SlotChange::Unchanged);
        }
        buffer.resize(dims)?;
        debug!(%role, %from, to = %dims, "buffer resized");
        return Ok(SlotChange::Resized);
    }
    *slot = Some(allocate()?);
    debug!(%role, %dims, "buffer allocated");
    Ok(SlotChange::Allocated)
}

/// What one [`BufferSet::ensure`] pass changed, up to the first failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnsureReport {
    pub allocated: u32,
    pub resized: u32,
    /// `source` was allocated or resized and must be re-bound.
    pub source_changed: bool,
    /// `destination` was allocated or resized and must be re-bound.
    pub destination_changed: bool,
    /// The negotiated output no longer fits inside `scratch`.
    pub scratch_outgrown: bool,
}

impl EnsureReport {
    fn record(&mut self, change: SlotChange) {
        match change {
            SlotChange::Unchanged => {}
            SlotChange::Allocated => self.allocated += 1,
            SlotChange::Resized => self.resized += 1,
        }
    }
}

/// Mutable borrows of every live buffer, for one frame.
pub struct LiveBuffers<'a, B: Backend> {
    pub input: &'a mut B::Texture,
    pub convert_to_fp32: &'a mut B::Image,
    pub source: &'a mut B::Image,
    pub destination: &'a mut B::Image,
    pub convert_to_u8: &'a mut B::Image,
    pub output: &'a mut B::Texture,
    pub scratch: &'a mut B::Image,
}

/// Single-owner storage for the seven pipeline buffers.
pub struct BufferSet<B: Backend> {
    input: Option<B::Texture>,
    convert_to_fp32: Option<B::Image>,
    source: Option<B::Image>,
    destination: Option<B::Image>,
    convert_to_u8: Option<B::Image>,
    output: Option<B::Texture>,
    scratch: Option<B::Image>,
}

impl<B: Backend> Default for BufferSet<B> {
    fn default() -> Self {
        Self {
            input: None,
            convert_to_fp32: None,
            source: None,
            destination: None,
            convert_to_u8: None,
            output: None,
            scratch: None,
        }
    }
}

impl<B: Backend> BufferSet<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate missing buffers and resize mismatched ones to `sizing`.
    ///
    /// Every slot that changes is recorded in `report` before the next slot
    /// is touched, so a failure part-way through still reports the buffers
    /// that were already reallocated.
    pub fn ensure(
        &mut self,
        backend: &B,
        sizing: &NegotiatedSizing,
        report: &mut EnsureReport,
    ) -> Result<()> {
        if self.scratch.is_none() {
            let desc = BufferRole::Scratch.desc(sizing);
            self.scratch = Some(backend.create_image(desc)?);
            report.allocated += 1;
            debug!(dims = %desc.dimensions, "scratch buffer allocated");
        }
        if let Some(scratch) = &self.scratch {
            report.scratch_outgrown = !scratch.dimensions().covers(sizing.output);
        }

        let (input, output) = (sizing.input, sizing.output);

        let change = ensure_slot(&mut self.input, BufferRole::Input, input, || {
            backend.create_texture(input)
        })?;
        report.record(change);

        let change = ensure_slot(
            &mut self.convert_to_fp32,
            BufferRole::ConvertToFp32,
            input,
            || backend.create_image(BufferRole::ConvertToFp32.desc(sizing)),
        )?;
        report.record(change);

        let change = ensure_slot(&mut self.source, BufferRole::Source, input, || {
            backend.create_image(BufferRole::Source.desc(sizing))
        })?;
        report.record(change);
        report.source_changed |= change.changed();

        let change = ensure_slot(
            &mut self.destination,
            BufferRole::Destination,
            output,
            || backend.create_image(BufferRole::Destination.desc(sizing)),
        )?;
        report.record(change);
        report.destination_changed |= change.changed();

        let change = ensure_slot(
            &mut self.convert_to_u8,
            BufferRole::ConvertToU8,
            output,
            || backend.create_image(BufferRole::ConvertToU8.desc(sizing)),
        )?;
        report.record(change);

        let change = ensure_slot(&mut self.output, BufferRole::Output, output, || {
            backend.create_texture(output)
        })?;
        report.record(change);

        Ok(())
    }

    pub fn source(&self) -> Option<&B::Image> {
        self.source.as_ref()
    }

    pub fn destination(&self) -> Option<&B::Image> {
        self.destination.as_ref()
    }

    pub fn output(&self) -> Option<&B::Texture> {
        self.output.as_ref()
    }

    /// Current descriptor of `role`, if allocated.
    pub fn desc(&self, role: BufferRole) -> Option<ImageDesc> {
        match role {
            BufferRole::Input => self.input.as_ref().map(|t| *t.desc()),
            BufferRole::ConvertToFp32 => self.convert_to_fp32.as_ref().map(|i| *i.desc()),
            BufferRole::Source => self.source.as_ref().map(|i| *i.desc()),
            BufferRole::Destination => self.destination.as_ref().map(|i| *i.desc()),
            BufferRole::ConvertToU8 => self.convert_to_u8.as_ref().map(|i| *i.desc()),
            BufferRole::Output => self.output.as_ref().map(|t| *t.desc()),
            BufferRole::Scratch => self.scratch.as_ref().map(|i| *i.desc()),
        }
    }

    /// Borrow every buffer for one frame; fails if any is missing.
    pub fn live(&mut self) -> Result<LiveBuffers<'_, B>> {
        fn missing(role: BufferRole) -> EngineError {
            EngineError::InvariantViolation(format!("{role} buffer is not allocated"))
        }
        Ok(LiveBuffers {
            input: self.input.as_mut().ok_or_else(|| missing(BufferRole::Input))?,
            convert_to_fp32: self
                .convert_to_fp32
                .as_mut()
                .ok_or_else(|| missing(BufferRole::ConvertToFp32))?,
            source: self.source.as_mut().ok_or_else(|| missing(BufferRole::Source))?,
            destination: self
                .destination
                .as_mut()
                .ok_or_else(|| missing(BufferRole::Destination))?,
            convert_to_u8: self
                .convert_to_u8
                .as_mut()
                .ok_or_else(|| missing(BufferRole::ConvertToU8))?,
            output: self.output.as_mut().ok_or_else(|| missing(BufferRole::Output))?,
            scratch: self.scratch.as_mut().ok_or_else(|| missing(BufferRole::Scratch))?,
        })
    }

    /// Drop every buffer.  Callers hold the graphics and compute contexts.
    pub fn release(&mut self) {
        self.input = None;
        self.convert_to_fp32 = None;
        self.source = None;
        self.destination = None;
        self.convert_to_u8 = None;
        self.output = None;
        self.scratch = None;
    }
}
