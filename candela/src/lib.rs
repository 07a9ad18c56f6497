//! Real-time global illumination: screen-space irradiance probes fed by a
//! world-space radiance cache, glossy reflections and a temporal denoiser.
//!
//! Everything runs on a [`Device`], which dispatches [`gpu`] kernels in wide
//! parallel batches; a frame is rendered by [`GiPipeline::render()`].

mod buffers;
mod camera;
mod config;
mod device;
mod dump;
mod error;
mod gbuffer;
mod passes;
mod pipeline;
mod utils;

pub use candela_gpu as gpu;

pub use self::buffers::*;
pub use self::camera::*;
pub use self::config::*;
pub use self::device::*;
pub use self::dump::*;
pub use self::error::*;
pub use self::gbuffer::*;
pub use self::passes::*;
pub use self::pipeline::*;
pub use self::utils::*;
