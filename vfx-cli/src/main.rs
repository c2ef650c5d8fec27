//! vfx CLI entrypoint.
//!
//! ```bash
//! vfx negotiate --width 1280 --height 720 --scale 2 --json
//! vfx upscale --input frame.png --output frame_2x.png --scale 2
//! vfx upscale --input frame.png --output out.png --config superres.json --json
//! ```

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use image::imageops::{self, FilterType};
use serde_json::json;

use vfx_core::error::{EngineError, Result};
use vfx_core::types::Dimensions;
use vfx_core::GpuImage;
use vfx_host::{HostBackend, HostTexture, HostUpscaleEffect};
use vfx_superres::negotiate::compute;
use vfx_superres::{NegotiatedSizing, ScaleFactor, SuperResolution, SuperResolutionConfig, plan};

const JSON_SCHEMA_VERSION: u32 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "vfx",
    version,
    about = "Super-resolution effect adapter driver",
    arg_required_else_help = true,
    after_help = "Examples:\n  vfx negotiate --width 1920 --height 1080 --json\n  vfx upscale --input in.png --output out.png --scale 2"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the negotiated input/output sizes and the buffer plan.
    Negotiate(NegotiateArgs),
    /// Upscale a PNG frame through the host reference pipeline.
    Upscale(UpscaleArgs),
}

#[derive(Args, Debug, Clone)]
struct NegotiateArgs {
    /// Requested frame width in pixels.
    #[arg(long = "width")]
    width: u32,

    /// Requested frame height in pixels.
    #[arg(long = "height")]
    height: u32,

    /// Desired scale factor; snapped to 4/3, 1.5, 2, 3 or 4.
    #[arg(short = 's', long = "scale", default_value_t = 1.5)]
    scale: f32,

    /// Emit a single JSON object on stdout.
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug, Clone)]
struct UpscaleArgs {
    /// Input PNG.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output PNG.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// JSON construction config.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Overrides the config's scale.
    #[arg(short = 's', long = "scale")]
    scale: Option<f32>,

    /// Overrides the config's strength (0 or 1 after binarization).
    #[arg(long = "strength")]
    strength: Option<f32>,

    /// Emit a single JSON object on stdout.
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let json_error_command = match &cli.command {
        Commands::Negotiate(args) if args.json => Some("negotiate"),
        Commands::Upscale(args) if args.json => Some("upscale"),
        _ => None,
    };

    let result = match cli.command {
        Commands::Negotiate(args) => run_negotiate(args),
        Commands::Upscale(args) => run_upscale(args),
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            if let Some(command) = json_error_command {
                println!("{}", command_error_json(command, &err));
            } else {
                tracing::error!(error = %err, code = err.error_code(), "Command failed");
            }
            std::process::exit(exit_code(&err));
        }
    }
}

fn init_tracing() {
    let ansi_enabled = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(ansi_enabled)
        .init();
}

/// Process exit status: the error's category digit (1 to 4).
fn exit_code(err: &EngineError) -> i32 {
    (err.error_code() / 100) as i32
}

fn command_error_json(command: &str, err: &EngineError) -> String {
    json!({
        "schema_version": JSON_SCHEMA_VERSION,
        "command": command,
        "ok": false,
        "code": err.error_code(),
        "error": err.to_string(),
    })
    .to_string()
}

fn snap_scale(requested: f32) -> Result<ScaleFactor> {
    ScaleFactor::snap(requested)
        .ok_or_else(|| EngineError::InvalidConfig(format!("scale must be a number, got {requested}")))
}

fn image_error(path: &Path, err: image::ImageError) -> EngineError {
    match err {
        image::ImageError::IoError(io) => EngineError::Io(io),
        other => EngineError::Io(std::io::Error::other(format!(
            "{}: {other}",
            path.display()
        ))),
    }
}

// ─── negotiate ───────────────────────────────────────────────────────────────

fn run_negotiate(args: NegotiateArgs) -> Result<()> {
    let requested = Dimensions::new(args.width, args.height);
    let desired = snap_scale(args.scale)?;
    let sizing = compute(requested, desired.value())?;

    if args.json {
        println!("{}", negotiate_json(requested, desired, &sizing));
        return Ok(());
    }

    println!("negotiate: requested={requested} desired={desired}");
    println!(
        "input={} output={} scale={}",
        sizing.input, sizing.output, sizing.scale
    );
    for buffer in plan(&sizing) {
        let desc = buffer.desc;
        println!(
            "  {:<16} {:<7} {:>10} {:?} {:?} {:?}{}",
            buffer.role.as_str(),
            format!("{:?}", buffer.size_class).to_lowercase(),
            desc.dimensions.to_string(),
            desc.pixel_format,
            desc.component_type,
            desc.layout,
            if buffer.texture { " texture" } else { "" }
        );
    }
    Ok(())
}

fn negotiate_json(requested: Dimensions, desired: ScaleFactor, sizing: &NegotiatedSizing) -> String {
    json!({
        "schema_version": JSON_SCHEMA_VERSION,
        "command": "negotiate",
        "ok": true,
        "requested": requested,
        "desired_scale": desired.value(),
        "input": sizing.input,
        "output": sizing.output,
        "scale": sizing.scale.value(),
        "buffers": plan(sizing),
    })
    .to_string()
}

// ─── upscale ─────────────────────────────────────────────────────────────────

fn load_config(args: &UpscaleArgs) -> Result<SuperResolutionConfig> {
    let mut config = match &args.config {
        Some(path) => SuperResolutionConfig::from_json_file(path)?,
        None => SuperResolutionConfig::default(),
    };
    if let Some(scale) = args.scale {
        config.scale = snap_scale(scale)?.value();
    }
    if let Some(strength) = args.strength {
        config.strength = strength;
    }
    config.validate()?;
    Ok(config)
}

fn run_upscale(args: UpscaleArgs) -> Result<()> {
    let config = load_config(&args)?;

    let source = image::open(&args.input)
        .map_err(|err| image_error(&args.input, err))?
        .to_rgba8();
    let requested = Dimensions::new(source.width(), source.height());

    let mut sr = SuperResolution::with_config(
        HostBackend::new(),
        HostUpscaleEffect::new(),
        &config,
    )?;
    let sizing = sr.size(requested)?;

    let frame = if sizing.input == requested {
        source
    } else {
        tracing::info!(
            %requested,
            input = %sizing.input,
            "Resampling source to the negotiated input size"
        );
        imageops::resize(
            &source,
            sizing.input.width,
            sizing.input.height,
            FilterType::Triangle,
        )
    };
    let texture = HostTexture::from_rgba8(sizing.input, frame.into_raw())?;

    let started = Instant::now();
    let output = sr.process(&texture)?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    let output_dims = output.dimensions();
    let pixels = output.rgba8().to_vec();

    let encoded = image::RgbaImage::from_raw(output_dims.width, output_dims.height, pixels)
        .ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "output pixels do not fill a {output_dims} image"
            ))
        })?;
    encoded
        .save(&args.output)
        .map_err(|err| image_error(&args.output, err))?;

    let metrics = sr.metrics();
    if args.json {
        println!(
            "{}",
            json!({
                "schema_version": JSON_SCHEMA_VERSION,
                "command": "upscale",
                "ok": true,
                "requested": requested,
                "input": sizing.input,
                "output": output_dims,
                "scale": sizing.scale.value(),
                "strength": sr.strength(),
                "elapsed_ms": elapsed_ms,
                "metrics": metrics,
            })
        );
    } else {
        println!(
            "upscale: {} -> {} ({requested} requested, scale={}) elapsed_ms={elapsed_ms:.3}",
            sizing.input, output_dims, sizing.scale
        );
        println!("output={}", args.output.display());
    }
    Ok(())
}
