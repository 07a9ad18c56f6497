//! Common structs, algorithms and kernels used by Candela's passes.
//!
//! Everything in here operates on borrowed views of device memory
//! ([`Storage`], [`Tex`]) and on a single work item at a time, so that the
//! host can dispatch kernels in wide parallel batches.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::manual_range_contains)]
#![allow(clippy::too_many_arguments)]

mod camera;
mod gbuffer;
mod hash_grid;
mod kernels;
mod noise;
mod passes;
mod probe;
mod ray;
mod reprojection;
mod reservoir;
mod sh;
mod storage;
mod utils;

pub use self::camera::*;
pub use self::gbuffer::*;
pub use self::hash_grid::*;
pub use self::kernels::*;
pub use self::noise::*;
pub use self::passes::*;
pub use self::probe::*;
pub use self::ray::*;
pub use self::reprojection::*;
pub use self::reservoir::*;
pub use self::sh::*;
pub use self::storage::*;
pub use self::utils::*;

pub mod prelude {
    pub use core::f32::consts::PI;

    pub use glam::*;

    pub use crate::*;
}

/// Edge of a probe tile, in pixels; each probe stores one radiance texel per
/// pixel of its tile.
pub const PROBE_SIZE: u32 = 8;

/// Number of rays (and radiance texels) per probe.
pub const PROBE_TEXELS: u32 = PROBE_SIZE * PROBE_SIZE;

/// Edge of a spawn tile, in pixels; at most one probe is spawned per spawn
/// tile each frame (quarter-rate sampling).
pub const PROBE_SPAWN_TILE_SIZE: u32 = 2 * PROBE_SIZE;

/// Number of mip levels of a hash grid tile.
pub const HASH_GRID_MIPS: usize = 4;

/// Fixed-point scale used when accumulating radiance with integer atomics.
pub const RADIANCE_FIXED_POINT: f32 = 256.0;

/// Offset applied to secondary rays' origins, so that they don't intersect the
/// surface they start from.
pub const RAY_EPSILON: f32 = 1e-3;
