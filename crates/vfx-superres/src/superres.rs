//! Super-resolution effect adapter.
//!
//! # Per-frame sequence
//!
//! ```text
//! resize ─► (reload if dirty) ─► copy in ─► input→fp32 ─► fp32→source
//!        ─► run ─► destination→u8 ─► u8→output ─► &output
//! ```
//!
//! Every step is issued synchronously on the backend's single compute stream
//! and relies on stream ordering; there is no host-side synchronization
//! between steps.  The first non-success status aborts the frame.  Buffers are
//! left in place, so the next `process` call can succeed without
//! reallocation.
//!
//! # Effect state
//!
//! ```text
//!          strength / scale change, source or destination rebound
//!   Clean ──────────────────────────────────────────────────────► Dirty
//!     ▲                                                             │
//!     └─────────────── load() (start of process, or explicit) ─────┘
//! ```
//!
//! # Contexts
//!
//! Construction, both setters, `resize`, `load`, `process` and drop hold the
//! graphics and compute contexts for their whole duration.  `size` touches no
//! device state and takes no context.
//!
//! The adapter is not reentrant.  All mutation goes through `&mut self`, so
//! one instance cannot be driven from two call sites at once.

use std::time::Instant;

use tracing::{debug, debug_span, error, info, warn};

use vfx_core::context::ContextScope;
use vfx_core::error::{EngineError, Result, Status};
use vfx_core::types::{Dimensions, ImageDesc};
use vfx_core::{Backend, GpuImage, GpuTexture, InferenceEffect, Parameter};

use crate::buffers::{BufferRole, BufferSet, EnsureReport};
use crate::config::SuperResolutionConfig;
use crate::metrics::{PipelineMetrics, PipelineMetricsSnapshot};
use crate::negotiate::{NegotiatedSizing, Negotiator};
use crate::scale::{ScaleFactor, is_close};

/// Changes smaller than this do not invalidate the loaded effect.
pub const CHANGE_TOLERANCE: f32 = 0.01;

/// Value scale passed to every format transfer.
const TRANSFER_SCALE: f32 = 1.0;

/// Whether the effect must be reloaded before the next run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectState {
    Clean,
    Dirty,
}

/// Log a failed engine call with the engine's own description and convert it.
fn check<B: Backend>(backend: &B, call: &'static str, status: Status) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let detail = backend.error_string(status);
    error!(call, code = status.code(), detail = %detail, "effect call failed");
    Err(EngineError::EffectCall {
        call,
        code: status.code(),
        detail,
    })
}

/// Source/destination bindings still owed to the effect.
#[derive(Clone, Copy, Debug, Default)]
struct PendingBinds {
    source: bool,
    destination: bool,
}

struct PipelineState<B: Backend, E: InferenceEffect<B::Image>> {
    effect: E,
    state: EffectState,
    strength: f32,
    scale: ScaleFactor,
    negotiator: Negotiator,
    sizing: Option<NegotiatedSizing>,
    buffers: BufferSet<B>,
    pending: PendingBinds,
    metrics: PipelineMetrics,
}

impl<B: Backend, E: InferenceEffect<B::Image>> PipelineState<B, E> {
    fn new(effect: E) -> Self {
        Self {
            effect,
            state: EffectState::Dirty,
            strength: 1.0,
            scale: ScaleFactor::default(),
            negotiator: Negotiator::new(),
            sizing: None,
            buffers: BufferSet::new(),
            pending: PendingBinds::default(),
            metrics: PipelineMetrics::default(),
        }
    }

    fn initialize(&mut self, backend: &B, config: &SuperResolutionConfig) -> Result<()> {
        if let Some(dir) = &config.model_dir {
            let status = self
                .effect
                .set_string(Parameter::ModelDirectory, &dir.to_string_lossy());
            check(backend, "set_parameter(model directory)", status)?;
        }
        self.set_strength(backend, config.strength)?;
        self.set_scale(config.scale);
        self.resize(backend, config.placeholder)?;
        self.load(backend)
    }

    fn mark_dirty(&mut self, reason: &'static str) {
        if self.state == EffectState::Clean {
            debug!(reason, "effect marked dirty");
        }
        self.state = EffectState::Dirty;
    }

    fn set_strength(&mut self, backend: &B, strength: f32) -> Result<()> {
        let strength = if strength >= 0.5 { 1.0 } else { 0.0 };
        let previous = std::mem::replace(&mut self.strength, strength);
        if !is_close(previous, strength, CHANGE_TOLERANCE) {
            self.mark_dirty("strength changed");
        }

        let value = u32::from(strength >= 0.5);
        let status = self.effect.set_u32(Parameter::Strength, value);
        check(backend, "set_parameter(strength)", status)
    }

    fn set_scale(&mut self, scale: f32) {
        let Some(factor) = ScaleFactor::snap(scale) else {
            warn!("ignoring NaN scale factor");
            return;
        };
        if !is_close(self.scale.value(), factor.value(), CHANGE_TOLERANCE) {
            self.mark_dirty("scale changed");
        }
        self.scale = factor;
    }

    fn size(&mut self, requested: Dimensions) -> Result<NegotiatedSizing> {
        self.negotiator.negotiate(requested, self.scale.value())
    }

    fn resize(&mut self, backend: &B, requested: Dimensions) -> Result<NegotiatedSizing> {
        let sizing = self.size(requested)?;
        self.ensure_buffers(backend, &sizing)?;
        if self.sizing != Some(sizing) {
            info!(
                %requested,
                input = %sizing.input,
                output = %sizing.output,
                scale = %sizing.scale,
                "super-resolution sizing changed"
            );
            self.sizing = Some(sizing);
        }
        Ok(sizing)
    }

    fn ensure_buffers(&mut self, backend: &B, sizing: &NegotiatedSizing) -> Result<()> {
        let mut report = EnsureReport::default();
        let ensured = self.buffers.ensure(backend, sizing, &mut report);
        // Slots reallocated before a failure still owe their rebind.
        self.metrics
            .record_reallocations(report.allocated + report.resized);
        self.pending.source |= report.source_changed;
        self.pending.destination |= report.destination_changed;
        ensured?;

        if report.scratch_outgrown && report.destination_changed {
            warn!(
                output = %sizing.output,
                scratch = ?self.buffers.desc(BufferRole::Scratch).map(|d| d.dimensions),
                "output exceeds the scratch buffer allocated at first use"
            );
        }

        if self.pending.source {
            let source = self.buffers.source().ok_or_else(|| unallocated(BufferRole::Source))?;
            let dims = source.dimensions();
            let status = self.effect.set_image(Parameter::InputImage0, source);
            check(backend, "set_parameter(input image 0)", status)?;
            debug!(parameter = Parameter::InputImage0.as_str(), %dims, "image bound");
            self.pending.source = false;
            self.mark_dirty("source rebound");
        }
        if self.pending.destination {
            let destination = self
                .buffers
                .destination()
                .ok_or_else(|| unallocated(BufferRole::Destination))?;
            let dims = destination.dimensions();
            let status = self.effect.set_image(Parameter::OutputImage0, destination);
            check(backend, "set_parameter(output image 0)", status)?;
            debug!(parameter = Parameter::OutputImage0.as_str(), %dims, "image bound");
            self.pending.destination = false;
            self.mark_dirty("destination rebound");
        }
        Ok(())
    }

    fn load(&mut self, backend: &B) -> Result<()> {
        check(backend, "load", self.effect.load())?;
        self.state = EffectState::Clean;
        self.metrics.record_reload();
        debug!(sizing = ?self.sizing, strength = self.strength, "effect loaded");
        Ok(())
    }

    fn process(&mut self, backend: &B, input: &B::Texture) -> Result<&B::Texture> {
        let started = Instant::now();
        if let Err(err) = self.run_frame(backend, input) {
            self.metrics.record_failure();
            return Err(err);
        }
        self.metrics.record_frame(started.elapsed());
        self.buffers
            .output()
            .ok_or_else(|| unallocated(BufferRole::Output))
    }

    fn run_frame(&mut self, backend: &B, input: &B::Texture) -> Result<()> {
        let sizing = self.resize(backend, input.dimensions())?;
        if self.state == EffectState::Dirty {
            self.load(backend)?;
        }
        if input.dimensions() != sizing.input {
            return Err(EngineError::DimensionMismatch(format!(
                "input frame is {}, negotiated input is {}; render the source at the negotiated size",
                input.dimensions(),
                sizing.input
            )));
        }

        let bufs = self.buffers.live()?;
        {
            let _span = debug_span!("copy_in").entered();
            backend.copy_texture(bufs.input, input)?;
        }
        {
            let _span = debug_span!("convert_input").entered();
            let status = backend.transfer(
                bufs.input.image(),
                bufs.convert_to_fp32,
                TRANSFER_SCALE,
                bufs.scratch,
            );
            check(backend, "transfer(input, convert_to_fp32)", status)?;
        }
        {
            let _span = debug_span!("copy_to_source").entered();
            let status = backend.transfer(
                bufs.convert_to_fp32,
                bufs.source,
                TRANSFER_SCALE,
                bufs.scratch,
            );
            check(backend, "transfer(convert_to_fp32, source)", status)?;
        }
        {
            let _span = debug_span!("run").entered();
            let status = self.effect.run(bufs.source, bufs.destination);
            check(backend, "run", status)?;
        }
        {
            let _span = debug_span!("convert_output").entered();
            let status = backend.transfer(
                bufs.destination,
                bufs.convert_to_u8,
                TRANSFER_SCALE,
                bufs.scratch,
            );
            check(backend, "transfer(destination, convert_to_u8)", status)?;
        }
        {
            let _span = debug_span!("copy_to_output").entered();
            let status = backend.transfer(
                bufs.convert_to_u8,
                bufs.output.image_mut(),
                TRANSFER_SCALE,
                bufs.scratch,
            );
            check(backend, "transfer(convert_to_u8, output)", status)?;
        }
        Ok(())
    }
}

fn unallocated(role: BufferRole) -> EngineError {
    EngineError::InvariantViolation(format!("{role} buffer is not allocated"))
}

// ─── Public adapter ──────────────────────────────────────────────────────────

/// AI super-resolution adapter over a GPU backend `B` and effect `E`.
///
/// Owns all seven pipeline buffers.  The texture returned by
/// [`process`](Self::process) stays owned by the adapter and is reused (and
/// possibly resized) on the next call.
pub struct SuperResolution<B: Backend, E: InferenceEffect<B::Image>> {
    backend: B,
    inner: PipelineState<B, E>,
}

impl<B: Backend, E: InferenceEffect<B::Image>> SuperResolution<B, E> {
    /// Create with strength 1, scale 1.5 and a 160×90 placeholder size.
    pub fn new(backend: B, effect: E) -> Result<Self> {
        Self::with_config(backend, effect, &SuperResolutionConfig::default())
    }

    pub fn with_config(backend: B, effect: E, config: &SuperResolutionConfig) -> Result<Self> {
        config.validate()?;
        let inner = {
            let _scope = ContextScope::enter(&backend)?;
            let mut inner = PipelineState::new(effect);
            // On error `inner` drops here, before `_scope`.
            inner.initialize(&backend, config)?;
            inner
        };
        Ok(Self { backend, inner })
    }

    /// Set the effect strength; values `>= 0.5` mean 1, anything else 0.
    ///
    /// The value is pushed to the effect immediately even when it did not
    /// change.
    pub fn set_strength(&mut self, strength: f32) -> Result<()> {
        let _scope = ContextScope::enter(&self.backend)?;
        self.inner.set_strength(&self.backend, strength)
    }

    pub fn strength(&self) -> f32 {
        self.inner.strength
    }

    /// Clamp to `[1, 4]` and snap to the nearest supported factor.
    ///
    /// Buffers follow on the next [`process`](Self::process) or
    /// [`resize`](Self::resize).
    pub fn set_scale(&mut self, scale: f32) -> Result<()> {
        let _scope = ContextScope::enter(&self.backend)?;
        self.inner.set_scale(scale);
        Ok(())
    }

    /// Configured scale factor.  The negotiated factor can be larger; see
    /// [`sizing`](Self::sizing).
    pub fn scale(&self) -> f32 {
        self.inner.scale.value()
    }

    /// Negotiate the sizing for a frame of `requested` size without touching
    /// any buffer.  Hosts use `input` to decide what size to render at.
    pub fn size(&mut self, requested: Dimensions) -> Result<NegotiatedSizing> {
        self.inner.size(requested)
    }

    /// Negotiate for `requested` and bring every buffer to the result.
    pub fn resize(&mut self, requested: Dimensions) -> Result<NegotiatedSizing> {
        let _scope = ContextScope::enter(&self.backend)?;
        self.inner.resize(&self.backend, requested)
    }

    /// Reload the effect now and mark it clean.
    pub fn load(&mut self) -> Result<()> {
        let _scope = ContextScope::enter(&self.backend)?;
        self.inner.load(&self.backend)
    }

    /// Run one frame.  `input` must already be at the negotiated input size.
    pub fn process(&mut self, input: &B::Texture) -> Result<&B::Texture> {
        let _scope = ContextScope::enter(&self.backend)?;
        self.inner.process(&self.backend, input)
    }

    /// Sizing the buffers currently follow.
    pub fn sizing(&self) -> Option<&NegotiatedSizing> {
        self.inner.sizing.as_ref()
    }

    pub fn effect_state(&self) -> EffectState {
        self.inner.state
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state == EffectState::Dirty
    }

    /// Descriptor of one owned buffer, if allocated.
    pub fn buffer_desc(&self, role: BufferRole) -> Option<ImageDesc> {
        self.inner.buffers.desc(role)
    }

    pub fn metrics(&self) -> PipelineMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn effect(&self) -> &E {
        &self.inner.effect
    }

    /// Direct effect access.  Changing bindings behind the adapter's back
    /// is not tracked.
    pub fn effect_mut(&mut self) -> &mut E {
        &mut self.inner.effect
    }
}

impl<B: Backend, E: InferenceEffect<B::Image>> Drop for SuperResolution<B, E> {
    fn drop(&mut self) {
        match ContextScope::enter(&self.backend) {
            Ok(_scope) => self.inner.buffers.release(),
            Err(err) => {
                warn!(error = %err, "releasing super-resolution buffers without contexts");
                self.inner.buffers.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use vfx_core::ErrorKind;
    use vfx_host::{HostBackend, HostImage, HostTexture, HostUpscaleEffect};

    use super::*;

    type HostSr<'a, E = HostUpscaleEffect> = SuperResolution<&'a HostBackend, E>;

    /// Host effect with one-shot failures for the calls the host effect
    /// cannot fail on its own, plus a call log.
    #[derive(Default)]
    struct ScriptedEffect {
        inner: HostUpscaleEffect,
        fail_set_image: Option<Status>,
        fail_load: Option<Status>,
        fail_set_u32: Option<Status>,
        calls: Vec<&'static str>,
    }

    impl InferenceEffect<HostImage> for ScriptedEffect {
        fn load(&mut self) -> Status {
            self.calls.push("load");
            self.fail_load.take().unwrap_or_else(|| self.inner.load())
        }

        fn run(&mut self, source: &HostImage, destination: &mut HostImage) -> Status {
            self.calls.push("run");
            self.inner.run(source, destination)
        }

        fn set_u32(&mut self, parameter: Parameter, value: u32) -> Status {
            self.calls.push("set_u32");
            self.fail_set_u32
                .take()
                .unwrap_or_else(|| self.inner.set_u32(parameter, value))
        }

        fn set_image(&mut self, parameter: Parameter, image: &HostImage) -> Status {
            self.calls.push("set_image");
            self.fail_set_image
                .take()
                .unwrap_or_else(|| self.inner.set_image(parameter, image))
        }

        fn set_string(&mut self, parameter: Parameter, value: &str) -> Status {
            self.calls.push("set_string");
            self.inner.set_string(parameter, value)
        }
    }

    fn solid_frame(dims: Dimensions, rgba: [u8; 4]) -> HostTexture {
        let pixels = rgba.repeat(dims.pixel_count());
        HostTexture::from_rgba8(dims, pixels).expect("frame")
    }

    fn expected_output(input: Dimensions, scale: ScaleFactor) -> Dimensions {
        let s = scale.value();
        Dimensions::new(
            (input.width as f32 * s).round() as u32,
            (input.height as f32 * s).round() as u32,
        )
    }

    #[test]
    fn construction_binds_loads_and_uses_placeholder() {
        let backend = HostBackend::new();
        let sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");

        assert_eq!(sr.strength(), 1.0);
        assert_eq!(sr.scale(), 1.5);
        assert_eq!(sr.effect_state(), EffectState::Clean);
        let sizing = sr.sizing().expect("sized");
        assert_eq!(sizing.input, Dimensions::new(160, 90));
        assert_eq!(sizing.output, Dimensions::new(240, 135));

        let fx = sr.effect();
        assert!(fx.is_loaded());
        assert_eq!(fx.loads(), 1);
        assert_eq!(fx.strength(), 1);
        assert_eq!(fx.bound_input(), sr.buffer_desc(BufferRole::Source).as_ref());
        assert_eq!(
            fx.bound_output(),
            sr.buffer_desc(BufferRole::Destination).as_ref()
        );

        let c = backend.counters();
        assert!(c.balanced());
        assert_eq!(c.ordering_violations, 0);
        assert_eq!(c.images_allocated + c.textures_allocated, 7);
    }

    #[test]
    fn construction_call_order() {
        let backend = HostBackend::new();
        let sr = HostSr::new(&backend, ScriptedEffect::default()).expect("create");
        assert_eq!(
            sr.effect().calls,
            vec!["set_u32", "set_image", "set_image", "load"]
        );
    }

    #[test]
    fn model_dir_is_pushed_at_construction() {
        let backend = HostBackend::new();
        let config = SuperResolutionConfig {
            model_dir: Some("/opt/models".into()),
            ..SuperResolutionConfig::default()
        };
        let sr = HostSr::with_config(&backend, HostUpscaleEffect::new(), &config).expect("create");
        assert_eq!(sr.effect().model_dir(), Some("/opt/models"));
    }

    #[test]
    fn failed_load_at_construction_releases_inside_contexts() {
        let backend = HostBackend::new();
        let effect = ScriptedEffect {
            fail_load: Some(Status::ERR_INITIALIZATION),
            ..ScriptedEffect::default()
        };
        let err = HostSr::new(&backend, effect).err().expect("load fails");
        match err {
            EngineError::EffectCall { call, code, detail } => {
                assert_eq!(call, "load");
                assert_eq!(code, Status::ERR_INITIALIZATION.code());
                assert!(detail.contains("not been properly initialized"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let c = backend.counters();
        assert!(c.balanced());
        assert_eq!(c.ordering_violations, 0);
    }

    #[test]
    fn repeated_strength_does_not_dirty_the_effect() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");

        sr.set_strength(0.3).expect("strength");
        assert_eq!(sr.strength(), 0.0);
        assert!(sr.is_dirty());
        assert_eq!(sr.effect().strength(), 0);

        sr.load().expect("load");
        assert!(!sr.is_dirty());

        sr.set_strength(0.3).expect("strength");
        assert_eq!(sr.strength(), 0.0);
        assert!(!sr.is_dirty(), "no reload for an unchanged value");

        sr.set_strength(0.5).expect("strength");
        assert_eq!(sr.strength(), 1.0);
        assert_eq!(sr.effect().strength(), 1);
        assert!(sr.is_dirty());
    }

    #[test]
    fn strength_push_failure_is_reported() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, ScriptedEffect::default()).expect("create");
        sr.effect_mut().fail_set_u32 = Some(Status::ERR_PARAMETER);
        let err = sr.set_strength(0.0).expect_err("push fails");
        assert!(matches!(
            err,
            EngineError::EffectCall {
                call: "set_parameter(strength)",
                ..
            }
        ));
        assert_eq!(sr.strength(), 0.0);
        assert!(backend.counters().balanced());
    }

    #[test]
    fn scale_ties_snap_to_the_earlier_factor() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");

        sr.set_scale(2.5).expect("scale");
        assert_eq!(sr.scale(), 2.0);
        assert!(sr.is_dirty());

        sr.load().expect("load");
        sr.set_scale(2.2).expect("scale");
        assert_eq!(sr.scale(), 2.0);
        assert!(!sr.is_dirty());
    }

    #[test]
    fn scale_is_clamped_and_nan_ignored() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");
        sr.set_scale(0.25).expect("scale");
        assert_eq!(sr.scale(), 4.0 / 3.0);
        sr.set_scale(9.0).expect("scale");
        assert_eq!(sr.scale(), 4.0);
        sr.set_scale(f32::NAN).expect("scale");
        assert_eq!(sr.scale(), 4.0);
    }

    #[test]
    fn set_scale_resizes_lazily() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");
        let before = *sr.sizing().expect("sized");

        sr.set_scale(3.0).expect("scale");
        assert_eq!(sr.sizing(), Some(&before));

        let frame = solid_frame(Dimensions::new(640, 360), [0, 0, 0, 255]);
        let out = sr.process(&frame).expect("process").dimensions();
        assert_eq!(out, Dimensions::new(1920, 1080));
        assert_eq!(sr.sizing().map(|s| s.scale), Some(ScaleFactor::X3));
    }

    #[test]
    fn full_hd_frame_at_one_and_a_half() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");

        let input = Dimensions::new(1920, 1080);
        let sizing = sr.size(input).expect("size");
        assert_eq!(sizing.input, input, "1920x1080 is already at the upper bound");

        let frame = solid_frame(input, [10, 200, 30, 255]);
        let out = sr.process(&frame).expect("process");
        assert_eq!(out.dimensions(), expected_output(input, sizing.scale));
        assert!(out.rgba8().chunks_exact(4).all(|px| px == [10, 200, 30, 255]));

        let m = sr.metrics();
        assert_eq!(m.frames_processed, 1);
        assert_eq!(m.reloads, 2, "construction + rebind after resize");
        assert_eq!(sr.effect().runs(), 1);
        assert!(backend.counters().balanced());
    }

    #[test]
    fn negotiated_scale_may_exceed_configured_scale() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");
        let frame = solid_frame(Dimensions::new(161, 90), [1, 2, 3, 255]);
        let out = sr.process(&frame).expect("process").dimensions();
        assert_eq!(out, Dimensions::new(322, 180));
        assert_eq!(sr.sizing().map(|s| s.scale), Some(ScaleFactor::X2));
        assert_eq!(sr.scale(), 1.5);
    }

    #[test]
    fn steady_state_frames_do_not_reallocate_or_reload() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");
        let frame = solid_frame(Dimensions::new(640, 360), [5, 5, 5, 255]);
        sr.process(&frame).expect("first");
        let allocs = backend.counters();
        let reloads = sr.metrics().reloads;

        for _ in 0..3 {
            sr.process(&frame).expect("steady");
        }
        let now = backend.counters();
        assert_eq!(now.images_allocated, allocs.images_allocated);
        assert_eq!(now.textures_allocated, allocs.textures_allocated);
        assert_eq!(sr.metrics().reloads, reloads);
        assert_eq!(sr.metrics().frames_processed, 4);
    }

    #[test]
    fn resolution_change_resizes_and_reloads() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");
        sr.process(&solid_frame(Dimensions::new(640, 360), [0, 0, 0, 255]))
            .expect("640");
        let reloads = sr.metrics().reloads;
        let allocs = backend.counters().images_allocated;

        let out = sr
            .process(&solid_frame(Dimensions::new(1280, 720), [0, 0, 0, 255]))
            .expect("1280")
            .dimensions();
        assert_eq!(out, Dimensions::new(1920, 1080));
        assert_eq!(sr.metrics().reloads, reloads + 1);
        assert_eq!(
            backend.counters().images_allocated,
            allocs,
            "existing buffers are resized in place"
        );
        assert_eq!(
            sr.effect().bound_output().map(|d| d.dimensions),
            Some(Dimensions::new(1920, 1080))
        );
    }

    #[test]
    fn run_failure_aborts_frame_and_keeps_buffers() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");
        let frame = solid_frame(Dimensions::new(640, 360), [9, 9, 9, 255]);
        sr.process(&frame).expect("warm-up");
        let before = backend.counters();

        sr.effect_mut().fail_next_run(Status::ERR_EFFECT);
        let err = sr.process(&frame).err().expect("run fails");
        assert!(err.is_frame_local());
        match &err {
            EngineError::EffectCall { call, code, .. } => {
                assert_eq!(*call, "run");
                assert_eq!(*code, Status::ERR_EFFECT.code());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sr.metrics().frames_failed, 1);

        let out = sr.process(&frame).expect("recovers");
        assert_eq!(out.dimensions(), Dimensions::new(960, 540));
        let after = backend.counters();
        assert_eq!(after.images_allocated, before.images_allocated);
        assert_eq!(after.textures_allocated, before.textures_allocated);
        assert!(after.balanced());
        assert_eq!(after.ordering_violations, 0);
    }

    #[test]
    fn transfer_failure_names_the_failing_step() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");
        let frame = solid_frame(Dimensions::new(640, 360), [9, 9, 9, 255]);

        // Third transfer of the frame: destination -> convert_to_u8.
        backend.fail_transfer_after(2, Status::ERR_MEMORY);
        let err = sr.process(&frame).err().expect("transfer fails");
        assert!(matches!(
            err,
            EngineError::EffectCall {
                call: "transfer(destination, convert_to_u8)",
                ..
            }
        ));
        assert!(sr.process(&frame).is_ok());
    }

    #[test]
    fn frame_at_wrong_size_is_rejected() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");
        // 3000x200 is wider than 1.5x allows and negotiates to 1920x128.
        let frame = solid_frame(Dimensions::new(3000, 200), [0, 0, 0, 255]);
        let err = sr.process(&frame).err().expect("size mismatch");
        assert!(matches!(err, EngineError::DimensionMismatch(_)));
        assert_eq!(
            sr.sizing().map(|s| s.input),
            Some(Dimensions::new(1920, 128))
        );

        let fitted = solid_frame(Dimensions::new(1920, 128), [0, 0, 0, 255]);
        assert!(sr.process(&fitted).is_ok());
    }

    #[test]
    fn failed_rebind_is_retried_on_the_next_frame() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, ScriptedEffect::default()).expect("create");
        sr.effect_mut().fail_set_image = Some(Status::ERR_MEMORY);

        let frame = solid_frame(Dimensions::new(640, 360), [0, 0, 0, 255]);
        let err = sr.process(&frame).err().expect("rebind fails");
        assert!(matches!(
            err,
            EngineError::EffectCall {
                call: "set_parameter(input image 0)",
                ..
            }
        ));

        sr.process(&frame).expect("rebind retried");
        assert_eq!(
            sr.effect().inner.bound_input(),
            sr.buffer_desc(BufferRole::Source).as_ref()
        );
        assert_eq!(
            sr.effect().inner.bound_output(),
            sr.buffer_desc(BufferRole::Destination).as_ref()
        );
    }

    #[test]
    fn failed_resize_rebinds_already_resized_buffers_next_frame() {
        let backend = HostBackend::new();
        let mut sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");
        assert_eq!(sr.metrics().reallocations, 7);
        let frame = solid_frame(Dimensions::new(640, 360), [30, 60, 90, 255]);

        // input, convert_to_fp32 and source resize; destination fails.
        backend.fail_resize_after(3);
        let err = sr.process(&frame).err().expect("destination resize fails");
        assert_eq!(err.kind(), ErrorKind::Allocation);
        assert!(!err.is_frame_local());
        assert_eq!(
            sr.buffer_desc(BufferRole::Source).map(|d| d.dimensions),
            Some(Dimensions::new(640, 360))
        );
        assert_eq!(
            sr.buffer_desc(BufferRole::Destination).map(|d| d.dimensions),
            Some(Dimensions::new(240, 135))
        );
        assert_eq!(sr.metrics().reallocations, 10);
        assert_eq!(sr.metrics().frames_failed, 1);

        let out = sr.process(&frame).expect("recovers");
        assert_eq!(out.dimensions(), Dimensions::new(960, 540));
        assert!(out.rgba8().chunks_exact(4).all(|px| px == [30, 60, 90, 255]));

        let fx = sr.effect();
        assert!(fx.is_loaded());
        assert_eq!(fx.runs(), 1);
        assert_eq!(fx.bound_input(), sr.buffer_desc(BufferRole::Source).as_ref());
        assert_eq!(
            fx.bound_output(),
            sr.buffer_desc(BufferRole::Destination).as_ref()
        );
        assert_eq!(sr.metrics().reallocations, 13);
        assert!(backend.counters().balanced());
    }

    #[test]
    fn drop_enters_contexts_to_release_buffers() {
        let backend = HostBackend::new();
        let sr = HostSr::new(&backend, HostUpscaleEffect::new()).expect("create");
        let entered = backend.counters().graphics_entered;
        drop(sr);
        let c = backend.counters();
        assert_eq!(c.graphics_entered, entered + 1);
        assert!(c.balanced());
        assert_eq!(c.ordering_violations, 0);
    }
}
