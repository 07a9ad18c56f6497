mod debug;
mod gi_denoiser;
mod glossy_reflections;
mod hash_grid_cache;
mod reservoir_cache;
mod resolve;
mod screen_probes;

pub use self::debug::*;
pub use self::gi_denoiser::*;
pub use self::glossy_reflections::*;
pub use self::hash_grid_cache::*;
pub use self::reservoir_cache::*;
pub use self::resolve::*;
pub use self::screen_probes::*;

/// Distance at which rays that miss everything are assumed to hit the sky.
pub const SKY_DISTANCE: f32 = 1.0e4;
