//! Typed error hierarchy shared by every effect adapter.
//!
//! Uses `thiserror` for library-grade errors.  Engine calls report a raw
//! [`Status`]; adapters log the engine's own error string and then convert a
//! non-success status into [`EngineError::EffectCall`].
//!
//! # Error codes
//!
//! Each variant maps to a stable integer code via [`EngineError::error_code`]
//! for structured logging without string parsing.

use std::fmt;

use crate::types::{Dimensions, ImageDesc};

// ─── Engine status ───────────────────────────────────────────────────────────

/// Raw status code returned by engine and image-transfer calls.
///
/// Zero is success; every other value is a failure whose human-readable
/// description comes from the backend's error-string lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const SUCCESS: Status = Status(0);
    pub const ERR_GENERAL: Status = Status(-1);
    pub const ERR_UNIMPLEMENTED: Status = Status(-2);
    pub const ERR_MEMORY: Status = Status(-3);
    pub const ERR_EFFECT: Status = Status(-4);
    pub const ERR_PARAMETER: Status = Status(-7);
    pub const ERR_MISMATCH: Status = Status(-8);
    pub const ERR_PIXELFORMAT: Status = Status(-9);
    pub const ERR_INITIALIZATION: Status = Status(-12);
    pub const ERR_MISSINGINPUT: Status = Status(-15);

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }

    #[inline]
    pub const fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Taxonomy ────────────────────────────────────────────────────────────────

/// Coarse failure category used by callers to decide what to abort.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration or negotiation input.  Fail fast.
    Configuration,
    /// An engine, transfer or parameter call reported a non-success status.
    EffectCall,
    /// Buffer construction or resize failed.
    Allocation,
    /// Scoped context acquisition or an internal contract violation.
    Internal,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// All errors originating from the effect adapters.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("No valid scale factor for {requested} at scale {scale}: supported list exhausted")]
    NoValidScale { requested: Dimensions, scale: f32 },

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Effect calls ─────────────────────────────────────────────────
    #[error("Effect call `{call}` failed with status {code}: {detail}")]
    EffectCall {
        call: &'static str,
        code: i32,
        detail: String,
    },

    // ── Allocation ───────────────────────────────────────────────────
    #[error("Allocation failed for {desc:?}: {reason}")]
    Allocation { desc: ImageDesc, reason: String },

    // ── Contracts ────────────────────────────────────────────────────
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Context error: {0}")]
    Context(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Stable integer error code for structured logging.
    ///
    /// Codes are grouped by category:
    /// - 1xx: configuration
    /// - 2xx: effect calls
    /// - 3xx: allocation
    /// - 4xx: contracts and I/O
    pub fn error_code(&self) -> u32 {
        match self {
            Self::NoValidScale { .. } => 100,
            Self::InvalidDimensions(_) => 101,
            Self::InvalidConfig(_) => 102,
            Self::EffectCall { .. } => 200,
            Self::Allocation { .. } => 300,
            Self::DimensionMismatch(_) => 400,
            Self::Context(_) => 401,
            Self::InvariantViolation(_) => 402,
            Self::Io(_) => 403,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoValidScale { .. } | Self::InvalidDimensions(_) | Self::InvalidConfig(_) => {
                ErrorKind::Configuration
            }
            Self::EffectCall { .. } => ErrorKind::EffectCall,
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::DimensionMismatch(_)
            | Self::Context(_)
            | Self::InvariantViolation(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether the failure only invalidates the current frame.
    ///
    /// Effect-call failures and frame-shape mismatches abort one `process`
    /// call; the adapter keeps its buffers and the next frame may succeed.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            Self::EffectCall { .. } | Self::DimensionMismatch(_)
        )
    }
}

/// Convenience alias used throughout the adapter crates.
pub type Result<T> = std::result::Result<T, EngineError>;
