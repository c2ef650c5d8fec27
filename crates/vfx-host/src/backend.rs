//! Host reference runtime implementing [`Backend`].
//!
//! Contexts are accounted rather than entered: the backend tracks how many
//! graphics and compute guards are live.  Entering compute outside a graphics
//! context is refused with [`EngineError::Context`]; leaving a graphics
//! context while compute is still active is recorded as an ordering
//! violation.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, trace};

use vfx_core::context::{ContextKind, ScopedContext};
use vfx_core::error::{EngineError, Result, Status};
use vfx_core::types::{Dimensions, ImageDesc};
use vfx_core::{Backend, GpuImage};

use crate::image::{HostImage, HostTexture, ResizeFault};
use crate::transfer;

/// Point-in-time copy of the backend counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostCounters {
    pub graphics_entered: u64,
    pub graphics_left: u64,
    pub compute_entered: u64,
    pub compute_left: u64,
    pub ordering_violations: u64,
    pub images_allocated: u64,
    pub textures_allocated: u64,
    pub texture_copies: u64,
    pub transfers: u64,
}

impl HostCounters {
    /// No guard is currently live.
    pub fn balanced(&self) -> bool {
        self.graphics_entered == self.graphics_left && self.compute_entered == self.compute_left
    }
}

#[derive(Default)]
pub struct HostBackend {
    counters: Cell<HostCounters>,
    graphics_active: Cell<u32>,
    compute_active: Cell<u32>,
    fail_transfer_in: Cell<Option<(u64, Status)>>,
    resize_fault: Rc<ResizeFault>,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> HostCounters {
        self.counters.get()
    }

    /// Make the `n`-th transfer from now (0 = the next one) report `status`.
    pub fn fail_transfer_after(&self, n: u64, status: Status) {
        self.fail_transfer_in.set(Some((n, status)));
    }

    /// Make the `n`-th image or texture resize from now (0 = the next one)
    /// fail with [`EngineError::Allocation`].  Only buffers created by this
    /// backend are affected.
    pub fn fail_resize_after(&self, n: u64) {
        self.resize_fault.arm(n);
    }

    fn bump(&self, f: impl FnOnce(&mut HostCounters)) {
        let mut c = self.counters.get();
        f(&mut c);
        self.counters.set(c);
    }

    fn injected_transfer_failure(&self) -> Option<Status> {
        match self.fail_transfer_in.get() {
            Some((0, status)) => {
                self.fail_transfer_in.set(None);
                Some(status)
            }
            Some((n, status)) => {
                self.fail_transfer_in.set(Some((n - 1, status)));
                None
            }
            None => None,
        }
    }
}

impl Backend for HostBackend {
    type Image = HostImage;
    type Texture = HostTexture;

    fn enter_graphics(&self) -> Result<ScopedContext<'_>> {
        self.graphics_active.set(self.graphics_active.get() + 1);
        self.bump(|c| c.graphics_entered += 1);
        Ok(ScopedContext::new(ContextKind::Graphics, move || {
            if self.compute_active.get() > 0 {
                self.bump(|c| c.ordering_violations += 1);
            }
            self.graphics_active.set(self.graphics_active.get() - 1);
            self.bump(|c| c.graphics_left += 1);
        }))
    }

    fn enter_compute(&self) -> Result<ScopedContext<'_>> {
        if self.graphics_active.get() == 0 {
            return Err(EngineError::Context(
                "compute context entered without a graphics context".into(),
            ));
        }
        self.compute_active.set(self.compute_active.get() + 1);
        self.bump(|c| c.compute_entered += 1);
        Ok(ScopedContext::new(ContextKind::Compute, move || {
            self.compute_active.set(self.compute_active.get() - 1);
            self.bump(|c| c.compute_left += 1);
        }))
    }

    fn create_image(&self, desc: ImageDesc) -> Result<HostImage> {
        let image = HostImage::new(desc)?.with_resize_fault(Rc::clone(&self.resize_fault));
        self.bump(|c| c.images_allocated += 1);
        debug!(?desc, bytes = desc.byte_size(), "host image allocated");
        Ok(image)
    }

    fn create_texture(&self, dimensions: Dimensions) -> Result<HostTexture> {
        let texture =
            HostTexture::new(dimensions)?.with_resize_fault(Rc::clone(&self.resize_fault));
        self.bump(|c| c.textures_allocated += 1);
        debug!(%dimensions, "host texture allocated");
        Ok(texture)
    }

    fn copy_texture(&self, dst: &mut HostTexture, src: &HostTexture) -> Result<()> {
        if dst.desc() != src.desc() {
            return Err(EngineError::DimensionMismatch(format!(
                "texture copy {} -> {} requires identical textures",
                src.dimensions(),
                dst.dimensions()
            )));
        }
        dst.copy_from(src);
        self.bump(|c| c.texture_copies += 1);
        Ok(())
    }

    fn transfer(
        &self,
        src: &HostImage,
        dst: &mut HostImage,
        scale: f32,
        _scratch: &mut HostImage,
    ) -> Status {
        self.bump(|c| c.transfers += 1);
        if let Some(status) = self.injected_transfer_failure() {
            return status;
        }
        let status = transfer::transfer(src, dst, scale);
        trace!(
            src = ?src.desc(),
            dst = ?dst.desc(),
            status = status.code(),
            "host transfer"
        );
        status
    }

    fn error_string(&self, status: Status) -> String {
        error_string(status).to_string()
    }
}

/// Static description for every status the host runtime and effect report.
pub fn error_string(status: Status) -> &'static str {
    match status {
        Status::SUCCESS => "The procedure returned successfully.",
        Status::ERR_GENERAL => "An otherwise unspecified error has occurred.",
        Status::ERR_UNIMPLEMENTED => "The requested feature is not yet implemented.",
        Status::ERR_MEMORY => "There is not enough memory for the requested operation.",
        Status::ERR_EFFECT => "An invalid effect handle has been supplied.",
        Status::ERR_PARAMETER => "An invalid parameter value has been supplied.",
        Status::ERR_MISMATCH => "Images of different sizes or formats were supplied.",
        Status::ERR_PIXELFORMAT => "The pixel format is not supported.",
        Status::ERR_INITIALIZATION => "The effect has not been properly initialized.",
        Status::ERR_MISSINGINPUT => "A required parameter was not set.",
        _ => "Unknown status code.",
    }
}
