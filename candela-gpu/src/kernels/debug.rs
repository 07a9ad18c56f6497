use glam::{vec3, UVec2, Vec3, Vec4, Vec4Swizzles};

use crate::{
    Camera, GBufferMap, HashGrid, Storage, Tex, HASH_GRID_MIPS, PROBE_SIZE,
};

/// Intermediate buffer that can be shown instead of the final image.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DebugView {
    #[default]
    None = 0,
    RadianceCache,
    RadianceCachePerDirection,
    HashGridCacheRadiance,
    HashGridCacheRadianceSampleCount,
    HashGridCacheFilteredRadiance,
    HashGridCacheFilteredSampleCount,
    HashGridCacheFilteredMipLevel,
    HashGridCacheOccupancy,
    GlossyReflections,
}

impl DebugView {
    pub const ALL: [Self; 10] = [
        Self::None,
        Self::RadianceCache,
        Self::RadianceCachePerDirection,
        Self::HashGridCacheRadiance,
        Self::HashGridCacheRadianceSampleCount,
        Self::HashGridCacheFilteredRadiance,
        Self::HashGridCacheFilteredSampleCount,
        Self::HashGridCacheFilteredMipLevel,
        Self::HashGridCacheOccupancy,
        Self::GlossyReflections,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::RadianceCache => "RadianceCache",
            Self::RadianceCachePerDirection => "RadianceCachePerDirection",
            Self::HashGridCacheRadiance => "HashGridCache_Radiance",
            Self::HashGridCacheRadianceSampleCount => {
                "HashGridCache_RadianceSampleCount"
            }
            Self::HashGridCacheFilteredRadiance => {
                "HashGridCache_FilteredRadiance"
            }
            Self::HashGridCacheFilteredSampleCount => {
                "HashGridCache_FilteredSampleCount"
            }
            Self::HashGridCacheFilteredMipLevel => {
                "HashGridCache_FilteredMipLevel"
            }
            Self::HashGridCacheOccupancy => "HashGridCache_Occupancy",
            Self::GlossyReflections => "GlossyReflections",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|view| view.name() == name)
    }

    /// Returns whether this view inspects the hash grid directly; those
    /// views need cell tracking compiled into the kernels.
    pub fn is_hash_grid(&self) -> bool {
        matches!(
            self,
            Self::HashGridCacheRadiance
                | Self::HashGridCacheRadianceSampleCount
                | Self::HashGridCacheFilteredRadiance
                | Self::HashGridCacheFilteredSampleCount
                | Self::HashGridCacheFilteredMipLevel
                | Self::HashGridCacheOccupancy
        )
    }

    /// Returns whether this view shows values that are forced to come
    /// straight from mip 0.
    pub fn is_filtered(&self) -> bool {
        matches!(
            self,
            Self::HashGridCacheFilteredRadiance
                | Self::HashGridCacheFilteredSampleCount
                | Self::HashGridCacheFilteredMipLevel
        )
    }
}

/// Maps `<0.0, 1.0>` into a blue-green-red gradient.
pub fn heatmap(value: f32) -> Vec3 {
    let value = value.clamp(0.0, 1.0);

    if value < 0.5 {
        vec3(0.0, value * 2.0, 1.0 - value * 2.0)
    } else {
        vec3(value * 2.0 - 1.0, 2.0 - value * 2.0, 0.0)
    }
}

pub struct DebugViewPass<'a> {
    pub view: DebugView,
    pub camera: &'a Camera,
    pub grid: HashGrid<'a>,
    pub debug_max_cell_decay: u32,
    pub gbuffer: GBufferMap<'a>,
    pub bucket_occupancy: Storage<'a>,
    pub irradiance: Tex<'a>,
    pub probe_radiance: Tex<'a>,
    pub reflections: Tex<'a>,
    pub output: Tex<'a>,
}

impl<'a> DebugViewPass<'a> {
    pub fn run(self, pixel: UVec2) {
        let out = match self.view {
            DebugView::None => Vec3::ZERO,
            DebugView::RadianceCache => self.irradiance.read(pixel).xyz(),

            DebugView::RadianceCachePerDirection => {
                let tile = pixel / PROBE_SIZE;
                let texel = pixel % PROBE_SIZE;

                self.probe_radiance.read(tile * PROBE_SIZE + texel).xyz()
            }

            DebugView::GlossyReflections => self.reflections.read(pixel).xyz(),
            _ => self.hash_grid(pixel).unwrap_or_default(),
        };

        self.output.write(pixel, out.extend(1.0));
    }

    fn hash_grid(&self, pixel: UVec2) -> Option<Vec3> {
        let surface = self.gbuffer.get(pixel);

        if !surface.is_some() {
            return None;
        }

        let params = self.grid.params;

        let location = params.locate(
            surface.position,
            surface.normal,
            self.camera.position(),
        );

        let tile = self.grid.find(location.key)?;

        if self.view == DebugView::HashGridCacheOccupancy {
            let bucket = params.bucket_of(location.key);

            let occupancy = self.bucket_occupancy.load(bucket as usize) as f32
                / params.num_tiles_per_bucket as f32;

            return Some(heatmap(occupancy));
        }

        if self.view.is_filtered() {
            let sample = self.grid.resolve(tile, location.cell);

            return Some(match self.view {
                DebugView::HashGridCacheFilteredRadiance => sample.radiance,

                DebugView::HashGridCacheFilteredSampleCount => {
                    heatmap(sample.sample_count / params.max_sample_count)
                }

                _ => heatmap(
                    sample.mip as f32 / (HASH_GRID_MIPS - 1) as f32,
                ),
            });
        }

        let idx = params.cell_index(tile, params.first_mip(), location.cell);

        if self.debug_max_cell_decay > 0 {
            let touched = self
                .grid
                .debug_cells
                .map(|cells| cells.load(idx as usize))
                .unwrap_or_default();

            if params.frame.saturating_sub(touched) > self.debug_max_cell_decay
            {
                return None;
            }
        }

        let value: Vec4 = self.grid.read_cell(idx);

        Some(match self.view {
            DebugView::HashGridCacheRadianceSampleCount => {
                heatmap(value.w / params.max_sample_count)
            }
            _ => value.xyz(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        for view in DebugView::ALL {
            assert_eq!(Some(view), DebugView::from_name(view.name()));
        }

        assert_eq!(None, DebugView::from_name("HashGridCache_Nope"));

        assert!(DebugView::HashGridCacheOccupancy.is_hash_grid());
        assert!(!DebugView::GlossyReflections.is_hash_grid());
        assert!(DebugView::HashGridCacheFilteredMipLevel.is_filtered());
        assert!(!DebugView::HashGridCacheRadiance.is_filtered());
    }

    #[test]
    fn heatmap_ends() {
        assert_eq!(vec3(0.0, 0.0, 1.0), heatmap(0.0));
        assert_eq!(vec3(0.0, 1.0, 0.0), heatmap(0.5));
        assert_eq!(vec3(1.0, 0.0, 0.0), heatmap(1.0));
    }
}
