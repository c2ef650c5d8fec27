#![doc = include_str!("../README.md")]

pub mod backend;
pub mod context;
pub mod error;
pub mod types;

pub use backend::{Backend, GpuImage, GpuTexture, InferenceEffect, Parameter};
pub use context::{ContextKind, ContextScope, ScopedContext};
pub use error::{EngineError, ErrorKind, Result, Status};
pub use types::{ComponentLayout, ComponentType, Dimensions, ImageDesc, MemoryLocation, PixelFormat};
