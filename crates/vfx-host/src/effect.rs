//! Host stand-in for the vendor super-resolution effect.
//!
//! Honors the engine contract the adapters rely on: images are bound by
//! descriptor, rebinding an image invalidates the loaded state, and `run`
//! refuses buffers that differ from what was bound at load time.  The
//! transform itself is a plain resample: bilinear at strength 1, nearest
//! neighbour at strength 0.

use tracing::debug;

use vfx_core::error::Status;
use vfx_core::types::{ComponentLayout, ComponentType, ImageDesc, PixelFormat};
use vfx_core::{GpuImage, InferenceEffect, Parameter};

use crate::image::HostImage;

#[derive(Debug, Default)]
pub struct HostUpscaleEffect {
    strength: u32,
    input: Option<ImageDesc>,
    output: Option<ImageDesc>,
    model_dir: Option<String>,
    loaded: bool,
    loads: u64,
    runs: u64,
    fail_next_run: Option<Status>,
}

impl HostUpscaleEffect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strength(&self) -> u32 {
        self.strength
    }

    pub fn bound_input(&self) -> Option<&ImageDesc> {
        self.input.as_ref()
    }

    pub fn bound_output(&self) -> Option<&ImageDesc> {
        self.output.as_ref()
    }

    pub fn model_dir(&self) -> Option<&str> {
        self.model_dir.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn loads(&self) -> u64 {
        self.loads
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Make the next `run` report `status` without touching the output.
    pub fn fail_next_run(&mut self, status: Status) {
        self.fail_next_run = Some(status);
    }
}

fn is_engine_format(desc: &ImageDesc) -> bool {
    desc.pixel_format == PixelFormat::Bgr
        && desc.component_type == ComponentType::F32
        && desc.layout == ComponentLayout::Planar
}

impl InferenceEffect<HostImage> for HostUpscaleEffect {
    fn load(&mut self) -> Status {
        let (Some(input), Some(output)) = (self.input, self.output) else {
            return Status::ERR_MISSINGINPUT;
        };
        if !is_engine_format(&input) || !is_engine_format(&output) {
            return Status::ERR_PIXELFORMAT;
        }
        if !output.dimensions.covers(input.dimensions) {
            return Status::ERR_MISMATCH;
        }
        self.loaded = true;
        self.loads += 1;
        debug!(
            input = %input.dimensions,
            output = %output.dimensions,
            strength = self.strength,
            "host effect loaded"
        );
        Status::SUCCESS
    }

    fn run(&mut self, source: &HostImage, destination: &mut HostImage) -> Status {
        if let Some(status) = self.fail_next_run.take() {
            return status;
        }
        if !self.loaded {
            return Status::ERR_INITIALIZATION;
        }
        if self.input.as_ref() != Some(source.desc())
            || self.output.as_ref() != Some(destination.desc())
        {
            return Status::ERR_MISMATCH;
        }
        resample(source, destination, self.strength != 0);
        self.runs += 1;
        Status::SUCCESS
    }

    fn set_u32(&mut self, parameter: Parameter, value: u32) -> Status {
        match parameter {
            Parameter::Strength if value <= 1 => {
                self.strength = value;
                Status::SUCCESS
            }
            _ => Status::ERR_PARAMETER,
        }
    }

    fn set_image(&mut self, parameter: Parameter, image: &HostImage) -> Status {
        let slot = match parameter {
            Parameter::InputImage0 => &mut self.input,
            Parameter::OutputImage0 => &mut self.output,
            _ => return Status::ERR_PARAMETER,
        };
        *slot = Some(*image.desc());
        self.loaded = false;
        Status::SUCCESS
    }

    fn set_string(&mut self, parameter: Parameter, value: &str) -> Status {
        match parameter {
            Parameter::ModelDirectory => {
                self.model_dir = Some(value.to_string());
                Status::SUCCESS
            }
            _ => Status::ERR_PARAMETER,
        }
    }
}

/// Resample every storage channel of `src` into `dst`.
fn resample(src: &HostImage, dst: &mut HostImage, bilinear: bool) {
    let s = src.dimensions();
    let d = dst.dimensions();
    let channels = src.desc().pixel_format.channels();
    let fx = s.width as f32 / d.width as f32;
    let fy = s.height as f32 / d.height as f32;
    let max_x = (s.width - 1) as f32;
    let max_y = (s.height - 1) as f32;

    for y in 0..d.height {
        let sy = ((y as f32 + 0.5) * fy - 0.5).clamp(0.0, max_y);
        for x in 0..d.width {
            let sx = ((x as f32 + 0.5) * fx - 0.5).clamp(0.0, max_x);
            for c in 0..channels {
                let v = if bilinear {
                    let (x0, y0) = (sx.floor() as u32, sy.floor() as u32);
                    let (x1, y1) = ((x0 + 1).min(s.width - 1), (y0 + 1).min(s.height - 1));
                    let (tx, ty) = (sx - x0 as f32, sy - y0 as f32);
                    let top = src.channel(x0, y0, c) * (1.0 - tx) + src.channel(x1, y0, c) * tx;
                    let bottom = src.channel(x0, y1, c) * (1.0 - tx) + src.channel(x1, y1, c) * tx;
                    top * (1.0 - ty) + bottom * ty
                } else {
                    src.channel(sx.round() as u32, sy.round() as u32, c)
                };
                dst.set_channel(x, y, c, v);
            }
        }
    }
}
