#![doc = include_str!("../README.md")]

pub mod backend;
pub mod effect;
pub mod image;
pub mod transfer;

pub use backend::{HostBackend, HostCounters};
pub use effect::HostUpscaleEffect;
pub use image::{HostImage, HostTexture};
