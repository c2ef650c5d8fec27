//! Resolution negotiation.
//!
//! Maps an arbitrary frame size and a desired scale onto a sizing the effect
//! accepts:
//!
//! ```text
//! requested ──clamp (aspect-preserving)──► input ──× scale, round──► output
//!                     ▲                                     │
//!                     └──── next larger factor ◄── ratio off by > 1e-5
//! ```
//!
//! The dominant axis (width when strictly wider, height otherwise) is clamped
//! into `[MIN_INPUT, scale.max_input()]`; the other axis follows the original
//! aspect ratio and is then clamped into its own bounds.  That second clamp can
//! distort the ratio for extreme shapes and is accepted as-is.
//!
//! Retries walk the canonical factor list upward.  4× always divides evenly,
//! so exhausting the list is unreachable with the current table, but it still
//! surfaces as [`EngineError::NoValidScale`] rather than an out-of-range read.

use serde::Serialize;
use tracing::debug;

use vfx_core::error::{EngineError, Result};
use vfx_core::types::Dimensions;

use crate::scale::{MIN_INPUT, ScaleFactor, is_close};

/// Tolerance on `output / input` against the scale factor, per axis.
pub const RATIO_TOLERANCE: f32 = 1e-5;

/// Resolved (input, output, scale) triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NegotiatedSizing {
    pub input: Dimensions,
    pub output: Dimensions,
    pub scale: ScaleFactor,
}

#[derive(Clone, Copy, Debug)]
struct MemoEntry {
    requested: Dimensions,
    desired_bits: u32,
    sizing: NegotiatedSizing,
}

/// Negotiator with a single-entry equality memo.
#[derive(Debug, Default)]
pub struct Negotiator {
    memo: Option<MemoEntry>,
    computations: u64,
}

impl Negotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiate a sizing for `requested` at `desired_scale`.
    ///
    /// An exact repeat of the previous `(requested, desired_scale)` returns
    /// the memoized result without recomputation.
    pub fn negotiate(
        &mut self,
        requested: Dimensions,
        desired_scale: f32,
    ) -> Result<NegotiatedSizing> {
        if let Some(memo) = &self.memo
            && memo.requested == requested
            && memo.desired_bits == desired_scale.to_bits()
        {
            return Ok(memo.sizing);
        }

        let sizing = compute(requested, desired_scale)?;
        self.computations += 1;
        self.memo = Some(MemoEntry {
            requested,
            desired_bits: desired_scale.to_bits(),
            sizing,
        });
        Ok(sizing)
    }

    /// Last negotiated sizing, if any.
    pub fn last(&self) -> Option<&NegotiatedSizing> {
        self.memo.as_ref().map(|m| &m.sizing)
    }

    /// Number of negotiations that missed the memo.
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

/// Memo-free negotiation.
pub fn compute(requested: Dimensions, desired_scale: f32) -> Result<NegotiatedSizing> {
    if requested.is_empty() {
        return Err(EngineError::InvalidDimensions(format!(
            "cannot negotiate a sizing for {requested}"
        )));
    }

    let first = ScaleFactor::closest(desired_scale);
    let mut candidate = Some(first);
    while let Some(scale) = candidate {
        let input = clamp_input(requested, scale.max_input());
        let output = scale_dimensions(input, scale);
        if ratio_holds(input, output, scale) {
            if scale != first {
                debug!(
                    %requested,
                    desired = %first,
                    negotiated = %scale,
                    "scale factor advanced to satisfy output ratio"
                );
            }
            return Ok(NegotiatedSizing {
                input,
                output,
                scale,
            });
        }
        candidate = scale.next_larger();
    }

    Err(EngineError::NoValidScale {
        requested,
        scale: first.value(),
    })
}

fn clamp_input(requested: Dimensions, max: Dimensions) -> Dimensions {
    let (w, h) = (requested.width, requested.height);
    if w > h {
        let ar = h as f64 / w as f64;
        let width = w.clamp(MIN_INPUT.width, max.width);
        let height = round_u32(width as f64 * ar).clamp(MIN_INPUT.height, max.height);
        Dimensions::new(width, height)
    } else {
        let ar = w as f64 / h as f64;
        let height = h.clamp(MIN_INPUT.height, max.height);
        let width = round_u32(height as f64 * ar).clamp(MIN_INPUT.width, max.width);
        Dimensions::new(width, height)
    }
}

fn scale_dimensions(input: Dimensions, scale: ScaleFactor) -> Dimensions {
    let s = scale.value();
    Dimensions::new(
        round_u32((input.width as f32 * s) as f64),
        round_u32((input.height as f32 * s) as f64),
    )
}

fn ratio_holds(input: Dimensions, output: Dimensions, scale: ScaleFactor) -> bool {
    let s = scale.value();
    let width_mul = output.width as f32 / input.width as f32;
    let height_mul = output.height as f32 / input.height as f32;
    is_close(width_mul, s, RATIO_TOLERANCE) && is_close(height_mul, s, RATIO_TOLERANCE)
}

/// Round half away from zero, saturating into `u32`.
#[inline]
fn round_u32(value: f64) -> u32 {
    value.round().clamp(0.0, u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_in_bounds(sizing: &NegotiatedSizing) {
        let max = sizing.scale.max_input();
        let input = sizing.input;
        assert!(
            input.covers(MIN_INPUT) && max.covers(input),
            "{input} outside [{MIN_INPUT}, {max}] at {}",
            sizing.scale
        );
    }

    fn assert_ratio(sizing: &NegotiatedSizing) {
        assert!(
            ratio_holds(sizing.input, sizing.output, sizing.scale),
            "{} -> {} is not {}",
            sizing.input,
            sizing.output,
            sizing.scale
        );
    }

    #[test]
    fn full_hd_at_one_and_a_half_keeps_input() {
        let sizing = compute(Dimensions::new(1920, 1080), 1.5).expect("negotiate");
        assert_eq!(sizing.scale, ScaleFactor::X1_5);
        assert_eq!(sizing.input, Dimensions::new(1920, 1080));
        assert_eq!(sizing.output, Dimensions::new(2880, 1620));
    }

    #[test]
    fn oversized_input_is_clamped_per_scale_bound() {
        let sizing = compute(Dimensions::new(3840, 2160), 4.0).expect("negotiate");
        assert_eq!(sizing.input, Dimensions::new(960, 540));
        assert_eq!(sizing.output, Dimensions::new(3840, 2160));

        let sizing = compute(Dimensions::new(3840, 2160), 3.0).expect("negotiate");
        assert_eq!(sizing.input, Dimensions::new(1280, 720));
        assert_eq!(sizing.output, Dimensions::new(3840, 2160));
    }

    #[test]
    fn portrait_input_uses_height_as_dominant_axis() {
        let sizing = compute(Dimensions::new(1080, 1920), 2.0).expect("negotiate");
        // Height clamps to 1080, width follows the 9:16 ratio.
        assert_eq!(sizing.input, Dimensions::new(608, 1080));
        assert_eq!(sizing.output, Dimensions::new(1216, 2160));
    }

    #[test]
    fn square_input_takes_the_height_branch() {
        let sizing = compute(Dimensions::new(2000, 2000), 2.0).expect("negotiate");
        // Height clamps to 1080; width = 1080, inside the 1920 bound.
        assert_eq!(sizing.input, Dimensions::new(1080, 1080));
    }

    #[test]
    fn odd_width_at_one_and_a_half_advances_to_two() {
        // 161 * 1.5 = 241.5 -> 242, and 242 / 161 != 1.5.
        let sizing = compute(Dimensions::new(161, 90), 1.5).expect("negotiate");
        assert_eq!(sizing.scale, ScaleFactor::X2);
        assert_eq!(sizing.input, Dimensions::new(161, 90));
        assert_eq!(sizing.output, Dimensions::new(322, 180));
    }

    #[test]
    fn four_thirds_needs_dimensions_divisible_by_three() {
        let sizing = compute(Dimensions::new(1920, 1080), 4.0 / 3.0).expect("negotiate");
        assert_eq!(sizing.scale, ScaleFactor::X4Over3);
        assert_eq!(sizing.output, Dimensions::new(2560, 1440));

        // 1280 is not divisible by 3, so the retry moves up to 1.5.
        let sizing = compute(Dimensions::new(1280, 720), 4.0 / 3.0).expect("negotiate");
        assert_eq!(sizing.scale, ScaleFactor::X1_5);
        assert_eq!(sizing.output, Dimensions::new(1920, 1080));
    }

    #[test]
    fn extreme_shapes_stay_within_bounds() {
        for requested in [
            Dimensions::new(10_000, 1),
            Dimensions::new(1, 10_000),
            Dimensions::new(1, 1),
            Dimensions::new(u32::MAX, u32::MAX - 1),
            Dimensions::new(7, 3),
        ] {
            for desired in [1.0, 4.0 / 3.0, 1.5, 2.0, 2.5, 3.0, 4.0] {
                let sizing = compute(requested, desired).expect("negotiate");
                assert_in_bounds(&sizing);
                assert_ratio(&sizing);
            }
        }
    }

    #[test]
    fn negotiated_ratio_always_holds() {
        for w in (100..2200).step_by(37) {
            for h in (50..1300).step_by(41) {
                for factor in ScaleFactor::ALL {
                    let sizing = compute(Dimensions::new(w, h), factor.value()).expect("negotiate");
                    assert_ratio(&sizing);
                    assert_in_bounds(&sizing);
                    assert!(sizing.scale >= factor, "retries only move upward");
                }
            }
        }
    }

    #[test]
    fn first_pass_picks_the_nearest_member() {
        // 960x540 divides evenly by every factor, so no retry happens.
        for desired in [1.0, 1.4, 1.42, 1.75, 2.5, 2.6, 3.5, 3.9] {
            let sizing = compute(Dimensions::new(960, 540), desired).expect("negotiate");
            assert_eq!(sizing.scale, ScaleFactor::closest(desired), "desired {desired}");
        }
    }

    #[test]
    fn zero_sized_request_is_a_configuration_error() {
        let err = compute(Dimensions::new(0, 1080), 2.0).expect_err("zero width");
        assert!(matches!(err, EngineError::InvalidDimensions(_)));
    }

    #[test]
    fn memo_returns_identical_result_without_recomputing() {
        let mut negotiator = Negotiator::new();
        let first = negotiator
            .negotiate(Dimensions::new(1366, 768), 2.0)
            .expect("negotiate");
        let second = negotiator
            .negotiate(Dimensions::new(1366, 768), 2.0)
            .expect("negotiate");
        assert_eq!(first, second);
        assert_eq!(negotiator.computations(), 1);
        assert_eq!(negotiator.last(), Some(&first));

        negotiator
            .negotiate(Dimensions::new(1366, 768), 3.0)
            .expect("negotiate");
        assert_eq!(negotiator.computations(), 2);
        negotiator
            .negotiate(Dimensions::new(1366, 768), 2.0)
            .expect("negotiate");
        assert_eq!(negotiator.computations(), 3, "memo holds one entry only");
    }
}
