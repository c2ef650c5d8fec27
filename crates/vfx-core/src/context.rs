//! Scoped graphics and compute context guards.
//!
//! Every public adapter entry point enters the graphics-device context and
//! the compute-stream context before touching any buffer, and leaves both on
//! every exit path.  Leaving is tied to `Drop`, so an early `?` return or a
//! panic unwinds through the same exit hook as a normal return.
//!
//! [`ContextScope`] holds both guards.  Fields drop in declaration order, so
//! the compute context is always left before the graphics context it was
//! entered under.

use std::fmt;

use crate::backend::Backend;
use crate::error::Result;

/// Which context a guard holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Graphics,
    Compute,
}

/// RAII guard for one entered context.
///
/// The exit hook runs exactly once, when the guard is dropped.
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ScopedContext<'a> {
    kind: ContextKind,
    exit: Option<Box<dyn FnOnce() + 'a>>,
}

impl<'a> ScopedContext<'a> {
    /// Wrap an already-entered context together with the hook that leaves it.
    pub fn new(kind: ContextKind, exit: impl FnOnce() + 'a) -> Self {
        Self {
            kind,
            exit: Some(Box::new(exit)),
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }
}

impl Drop for ScopedContext<'_> {
    fn drop(&mut self) {
        if let Some(exit) = self.exit.take() {
            exit();
        }
    }
}

impl fmt::Debug for ScopedContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedContext")
            .field("kind", &self.kind)
            .field("armed", &self.exit.is_some())
            .finish()
    }
}

/// Graphics + compute guards held for the duration of one adapter call.
#[must_use = "both contexts are left as soon as the scope is dropped"]
#[derive(Debug)]
pub struct ContextScope<'a> {
    // Declaration order is drop order: compute leaves first.
    _compute: ScopedContext<'a>,
    _graphics: ScopedContext<'a>,
}

impl<'a> ContextScope<'a> {
    /// Enter the graphics context, then the compute context.
    ///
    /// If entering the compute context fails, the graphics guard is dropped
    /// before the error is returned.
    pub fn enter<B: Backend + ?Sized>(backend: &'a B) -> Result<Self> {
        let graphics = backend.enter_graphics()?;
        let compute = backend.enter_compute()?;
        Ok(Self {
            _compute: compute,
            _graphics: graphics,
        })
    }
}
