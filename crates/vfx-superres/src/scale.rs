//! Supported super-resolution scale factors.

use std::fmt;

use serde::{Deserialize, Serialize};

use vfx_core::types::Dimensions;

/// Smallest input the effect accepts, for every factor.
pub const MIN_INPUT: Dimensions = Dimensions::new(160, 90);

/// One of the fixed scale factors the effect supports, in canonical order.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ScaleFactor {
    X4Over3,
    #[default]
    X1_5,
    X2,
    X3,
    X4,
}

impl ScaleFactor {
    /// Canonical order; nearest-match ties resolve toward earlier entries.
    pub const ALL: [ScaleFactor; 5] = [Self::X4Over3, Self::X1_5, Self::X2, Self::X3, Self::X4];

    pub const fn value(self) -> f32 {
        match self {
            Self::X4Over3 => 4.0 / 3.0,
            Self::X1_5 => 1.5,
            Self::X2 => 2.0,
            Self::X3 => 3.0,
            Self::X4 => 4.0,
        }
    }

    /// Position in [`ALL`](Self::ALL).
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Nearest supported factor; the first minimal distance wins.
    ///
    /// NaN has no distance to anything and maps to the first entry.
    pub fn closest(factor: f32) -> Self {
        let mut best = (Self::ALL[0], f32::MAX);
        for candidate in Self::ALL {
            let distance = (candidate.value() - factor).abs();
            if distance < best.1 {
                best = (candidate, distance);
            }
        }
        best.0
    }

    /// Clamp a requested factor to `[1, 4]` and snap it to the nearest
    /// supported one.  `None` for NaN.
    pub fn snap(requested: f32) -> Option<Self> {
        if requested.is_nan() {
            return None;
        }
        Some(Self::closest(requested.clamp(1.0, 4.0)))
    }

    /// Next larger factor in canonical order.
    pub fn next_larger(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Largest input the effect accepts at this factor.
    pub fn max_input(self) -> Dimensions {
        let value = self.value();
        if value > 3.0 {
            Dimensions::new(960, 540)
        } else if value > 2.0 {
            Dimensions::new(1280, 720)
        } else {
            Dimensions::new(1920, 1080)
        }
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}x", self.value())
    }
}

/// `|a - b| <= epsilon`.
#[inline]
pub fn is_close(a: f32, b: f32, epsilon: f32) -> bool {
    (a - b).abs() <= epsilon
}
