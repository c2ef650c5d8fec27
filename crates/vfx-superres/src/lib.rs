#![doc = include_str!("../README.md")]

pub mod buffers;
pub mod config;
pub mod metrics;
pub mod negotiate;
pub mod scale;
pub mod superres;

pub use buffers::{BufferRole, PlannedBuffer, SizeClass, plan};
pub use config::{CONFIG_SCHEMA_VERSION, SuperResolutionConfig};
pub use metrics::PipelineMetricsSnapshot;
pub use negotiate::{NegotiatedSizing, Negotiator};
pub use scale::ScaleFactor;
pub use superres::{EffectState, SuperResolution};
