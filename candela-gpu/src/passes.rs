use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec3};

use crate::{Hit, RayFlags};

/// Albedo used instead of the surfaces' own one when albedo textures are
/// disabled.
pub const UNTEXTURED_ALBEDO: f32 = 0.7;

/// Marks a missing index in buffers of indices.
pub const INVALID_ID: u32 = u32::MAX;

/// Parameters shared by every kernel that shades hits.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ShadingParams {
    pub seed: u32,
    pub frame: u32,
    pub use_direct_lighting: u32,
    pub use_alpha_testing: u32,
    pub disable_albedo_textures: u32,
}

impl ShadingParams {
    pub fn ray_flags(&self) -> RayFlags {
        RayFlags {
            alpha_test: self.use_alpha_testing != 0,
        }
    }

    pub fn albedo(&self, albedo: Vec3) -> Vec3 {
        if self.disable_albedo_textures != 0 {
            Vec3::splat(UNTEXTURED_ALBEDO)
        } else {
            albedo
        }
    }

    /// Returns radiance a hit emits on its own (plus direct lighting, if
    /// enabled) and the albedo that scales whatever it receives indirectly.
    pub fn shade(
        &self,
        scene: &dyn crate::SceneQuery,
        hit: &Hit,
    ) -> (Vec3, Vec3) {
        let mut emitted = hit.material.emissive;

        if self.use_direct_lighting != 0 {
            emitted += scene.direct_lighting(hit);
        }

        (emitted, self.albedo(hit.material.albedo))
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ScreenProbesParams {
    pub probe_count_x: u32,
    pub probe_count_y: u32,
    pub probe_mask_mip_count: u32,
    pub max_probe_count: u32,
    pub max_probe_spawn_count: u32,
    pub max_ray_count: u32,
    pub spawn_tile_count_x: u32,
    pub spawn_tile_count_y: u32,
}

impl ScreenProbesParams {
    pub fn probe_count(&self) -> UVec2 {
        UVec2::new(self.probe_count_x, self.probe_count_y)
    }

    pub fn spawn_tile_count(&self) -> UVec2 {
        UVec2::new(self.spawn_tile_count_x, self.spawn_tile_count_y)
    }

    pub fn tile_to_idx(&self, tile: UVec2) -> u32 {
        tile.y * self.probe_count_x + tile.x
    }

    pub fn idx_to_tile(&self, idx: u32) -> UVec2 {
        UVec2::new(idx % self.probe_count_x, idx / self.probe_count_x)
    }

    pub fn contains(&self, tile: glam::IVec2) -> bool {
        tile.x >= 0
            && tile.y >= 0
            && (tile.x as u32) < self.probe_count_x
            && (tile.y as u32) < self.probe_count_y
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ReservoirCacheParams {
    /// Tangent of the angle covered by one cell, see
    /// [`crate::HashGridParams::cell_size`].
    pub cell_size: f32,
    pub min_cell_size: f32,
    pub num_cells: u32,
    pub num_entries_per_cell: u32,
    pub use_resampling: u32,
}

impl ReservoirCacheParams {
    pub fn num_entries(&self) -> u32 {
        self.num_cells * self.num_entries_per_cell
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GlossyReflectionsParams {
    pub trace_width: u32,
    pub trace_height: u32,

    /// Ratio between the screen and the traced image (`1` or `2`).
    pub trace_scale: u32,
    pub denoiser_radius: i32,
    pub mark_fireflies_radius: i32,
    pub mark_fireflies_low_threshold: f32,
    pub mark_fireflies_high_threshold: f32,
    pub cleanup_fireflies_radius: i32,
    pub low_roughness_threshold: f32,
    pub high_roughness_threshold: f32,
}

impl GlossyReflectionsParams {
    pub fn trace_size(&self) -> UVec2 {
        UVec2::new(self.trace_width, self.trace_height)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GiDenoiserParams {
    pub max_blur_radius: u32,
    pub max_history: f32,
}

/// Pending ray that brings radiance into a hash grid cell.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VisibilityRay {
    pub origin: Vec3,
    pub tile: u32,
    pub normal: Vec3,
    pub cell: u32,
    pub direction: Vec3,
    pub query: u32,
}

impl VisibilityRay {
    pub fn pack_cell(cell: UVec2) -> u32 {
        cell.x | (cell.y << 16)
    }

    pub fn unpack_cell(cell: u32) -> UVec2 {
        UVec2::new(cell & 0xffff, cell >> 16)
    }
}
