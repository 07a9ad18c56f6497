use glam::{ivec2, UVec2};
use log::debug;

use crate::gpu::{self, PROBE_SIZE, PROBE_SPAWN_TILE_SIZE, PROBE_TEXELS};
use crate::{
    Buffer, BufferIndex, Camera, Device, DoubleBuffered, FrameContext,
    GiConfig, KernelSet, Result, StorageBuffer, Texture,
};

/// Words of [`gpu::Sh9`] stored per probe.
const SH_WORDS: usize = 4 * gpu::SH_COEFFS;

/// Image-space irradiance probes, one per 8x8 tile, with a LRU cache of
/// probes that went off-screen.
#[derive(Debug)]
pub struct ScreenProbesPass {
    params: gpu::ScreenProbesParams,
    probes: DoubleBuffered<StorageBuffer>,
    radiance: DoubleBuffered<Texture>,
    mask: DoubleBuffered<Texture>,
    cached_probes: StorageBuffer,
    cached_radiance: Texture,
    lru: DoubleBuffered<StorageBuffer>,
    lru_flags: StorageBuffer,
    lru_ordered_flags: StorageBuffer,
    lru_offsets: StorageBuffer,
    tile_counts: StorageBuffer,
    tile_offsets: StorageBuffer,
    tile_slots: StorageBuffer,
    slot_targets: StorageBuffer,
    empty_tiles: StorageBuffer,
    empty_count: StorageBuffer,
    spawn_tiles: StorageBuffer,
    spawn_count: StorageBuffer,
    patch_count: StorageBuffer,
    overrides: StorageBuffer,
    override_count: StorageBuffer,
    override_cursor: StorageBuffer,
    ray_count: StorageBuffer,
    rays: StorageBuffer,
    hits: StorageBuffer,
    ray_radiance: StorageBuffer,
    scratch: Texture,
    filtered: Texture,
    sh: DoubleBuffered<StorageBuffer>,
    irradiance: Texture,
}

impl ScreenProbesPass {
    pub fn new(
        device: &Device,
        _: &GiConfig,
        _: &KernelSet,
        camera: &Camera,
    ) -> Result<Self> {
        let params = Self::params(camera.viewport_size);

        debug!(
            "Allocating screen probes; probes={}x{}, spawn_tiles={}x{}, rays={}",
            params.probe_count_x,
            params.probe_count_y,
            params.spawn_tile_count_x,
            params.spawn_tile_count_y,
            params.max_ray_count,
        );

        let probes = params.max_probe_count as usize;
        let spawns = params.max_probe_spawn_count as usize;
        let rays = params.max_ray_count as usize;
        let texels = params.probe_count() * PROBE_SIZE;

        let lru = DoubleBuffered::<StorageBuffer>::new(
            device,
            "candela_probe_lru",
            probes,
        )?;

        for buffer in lru.both() {
            for slot in 0..probes {
                buffer.view().store(slot, slot as u32);
            }
        }

        Ok(Self {
            params,
            probes: DoubleBuffered::from_fn(|suffix| {
                StorageBuffer::new_of::<gpu::ProbeData>(
                    device,
                    format!("candela_probes_{suffix}"),
                    probes,
                )
            })?,
            radiance: DoubleBuffered::<Texture>::new(
                device,
                "candela_probe_radiance",
                texels,
                1,
            )?,
            mask: DoubleBuffered::<Texture>::new(
                device,
                "candela_probe_mask",
                params.probe_count(),
                params.probe_mask_mip_count,
            )?,
            cached_probes: StorageBuffer::new_of::<gpu::ProbeData>(
                device,
                "candela_cached_probes",
                probes,
            )?,
            cached_radiance: Texture::new(
                device,
                "candela_cached_probe_radiance",
                texels,
            )?,
            lru,
            lru_flags: StorageBuffer::new(device, "candela_probe_lru_flags", probes)?,
            lru_ordered_flags: StorageBuffer::new(
                device,
                "candela_probe_lru_ordered_flags",
                probes,
            )?,
            lru_offsets: StorageBuffer::new(
                device,
                "candela_probe_lru_offsets",
                probes,
            )?,
            tile_counts: StorageBuffer::new(
                device,
                "candela_probe_tile_counts",
                probes,
            )?,
            tile_offsets: StorageBuffer::new(
                device,
                "candela_probe_tile_offsets",
                probes,
            )?,
            tile_slots: StorageBuffer::new(
                device,
                "candela_probe_tile_slots",
                probes,
            )?,
            slot_targets: StorageBuffer::new(
                device,
                "candela_probe_slot_targets",
                2 * probes,
            )?,
            empty_tiles: StorageBuffer::new(
                device,
                "candela_probe_empty_tiles",
                probes,
            )?,
            empty_count: StorageBuffer::new(device, "candela_probe_empty_count", 1)?,
            spawn_tiles: StorageBuffer::new(
                device,
                "candela_probe_spawn_tiles",
                spawns,
            )?,
            spawn_count: StorageBuffer::new(device, "candela_probe_spawn_count", 1)?,
            patch_count: StorageBuffer::new(device, "candela_probe_patch_count", 1)?,
            overrides: StorageBuffer::new(device, "candela_probe_overrides", spawns)?,
            override_count: StorageBuffer::new(
                device,
                "candela_probe_override_count",
                1,
            )?,
            override_cursor: StorageBuffer::new(
                device,
                "candela_probe_override_cursor",
                1,
            )?,
            ray_count: StorageBuffer::new(device, "candela_probe_ray_count", 1)?,
            rays: StorageBuffer::new_of::<gpu::ProbeRay>(
                device,
                "candela_probe_rays",
                rays,
            )?,
            hits: StorageBuffer::new_of::<gpu::ProbeRayHit>(
                device,
                "candela_probe_ray_hits",
                rays,
            )?,
            ray_radiance: StorageBuffer::new(
                device,
                "candela_probe_ray_radiance",
                4 * rays,
            )?,
            scratch: Texture::new(device, "candela_probe_scratch", texels)?,
            filtered: Texture::new(device, "candela_probe_filtered", texels)?,
            sh: DoubleBuffered::<StorageBuffer>::new(
                device,
                "candela_probe_sh",
                SH_WORDS * probes,
            )?,
            irradiance: Texture::new(
                device,
                "candela_probe_irradiance",
                camera.viewport_size,
            )?,
        })
    }

    pub fn params(viewport_size: UVec2) -> gpu::ScreenProbesParams {
        let probe_count = (viewport_size + PROBE_SIZE - 1) / PROBE_SIZE;
        let spawn_tile_count =
            (viewport_size + PROBE_SPAWN_TILE_SIZE - 1) / PROBE_SPAWN_TILE_SIZE;

        let max_probe_spawn_count = spawn_tile_count.x * spawn_tile_count.y;
        let longest = probe_count.max_element();

        gpu::ScreenProbesParams {
            probe_count_x: probe_count.x,
            probe_count_y: probe_count.y,
            probe_mask_mip_count: 32 - (longest - 1).leading_zeros() + 1,
            max_probe_count: probe_count.x * probe_count.y,
            max_probe_spawn_count,
            max_ray_count: max_probe_spawn_count * PROBE_TEXELS,
            spawn_tile_count_x: spawn_tile_count.x,
            spawn_tile_count_y: spawn_tile_count.y,
        }
    }

    pub fn begin_frame(&self, device: &Device) {
        for counter in [
            &self.lru_flags,
            &self.tile_counts,
            &self.empty_count,
            &self.spawn_count,
            &self.patch_count,
            &self.override_count,
            &self.override_cursor,
            &self.ray_count,
        ] {
            device.clear(counter);
        }
    }

    pub fn reproject(&self, ctxt: &FrameContext) {
        let index = ctxt.index;
        let seed = ctxt.seed(2);

        ctxt.device.dispatch_2d(
            "screen_probes_reproject",
            self.params.probe_count(),
            |tile| {
                gpu::ScreenProbesReproject {
                    camera: ctxt.camera,
                    params: &self.params,
                    seed,
                    gbuffer: ctxt.gbuffer,
                    probes: self.probes.curr(index).view(),
                    prev_probes: self.probes.prev(index).view(),
                    radiance: self.radiance.curr(index).view(),
                    prev_radiance: self.radiance.prev(index).view(),
                    mask: self.mask.curr(index).view(),
                    prev_mask: self.mask.prev(index).view(),
                    lru_flags: self.lru_flags.view(),
                }
                .run(tile)
            },
        );
    }

    /// Lets tiles that couldn't be reprojected adopt probes from the cache.
    pub fn lookup(&self, ctxt: &FrameContext) {
        let device = ctxt.device;
        let index = ctxt.index;

        device.dispatch(
            "screen_probes_lookup_count",
            self.params.max_probe_count,
            |slot| {
                gpu::ScreenProbesLookupCount {
                    camera: ctxt.camera,
                    params: &self.params,
                    probes: self.probes.curr(index).view(),
                    cached_probes: self.cached_probes.view(),
                    tile_counts: self.tile_counts.view(),
                    slot_targets: self.slot_targets.view(),
                }
                .run(slot)
            },
        );

        device.scan(
            &self.tile_counts,
            &self.tile_offsets,
            self.params.max_probe_count as usize,
        );

        device.dispatch(
            "screen_probes_lookup_scatter",
            self.params.max_probe_count,
            |slot| {
                gpu::ScreenProbesLookupScatter {
                    tile_offsets: self.tile_offsets.view(),
                    slot_targets: self.slot_targets.view(),
                    tile_slots: self.tile_slots.view(),
                }
                .run(slot)
            },
        );

        device.dispatch_2d(
            "screen_probes_lookup_resolve",
            self.params.probe_count(),
            |tile| {
                gpu::ScreenProbesLookupResolve {
                    params: &self.params,
                    probes: self.probes.curr(index).view(),
                    cached_probes: self.cached_probes.view(),
                    cached_radiance: self.cached_radiance.view(),
                    radiance: self.radiance.curr(index).view(),
                    mask: self.mask.curr(index).view(),
                    tile_counts: self.tile_counts.view(),
                    tile_offsets: self.tile_offsets.view(),
                    tile_slots: self.tile_slots.view(),
                    lru_flags: self.lru_flags.view(),
                    empty_tiles: self.empty_tiles.view(),
                    empty_count: self.empty_count.view(),
                }
                .run(tile)
            },
        );
    }

    /// Picks probes that get traced this frame: one per spawn tile, plus
    /// empty tiles patched in using spare capacity.
    pub fn spawn(&self, ctxt: &FrameContext) {
        let device = ctxt.device;
        let index = ctxt.index;

        device.dispatch_2d(
            "screen_probes_spawn",
            self.params.spawn_tile_count(),
            |spawn_tile| {
                gpu::ScreenProbesSpawn {
                    params: &self.params,
                    frame: ctxt.frame,
                    probes: self.probes.curr(index).view(),
                    spawn_tiles: self.spawn_tiles.view(),
                    spawn_count: self.spawn_count.view(),
                    overrides: self.overrides.view(),
                    override_count: self.override_count.view(),
                }
                .run(spawn_tile)
            },
        );

        let seed = ctxt.seed(3);

        device.dispatch_indirect(
            "screen_probes_patch",
            &self.empty_count,
            self.params.max_probe_count,
            |empty_idx| {
                gpu::ScreenProbesPatch {
                    params: &self.params,
                    seed,
                    probes: self.probes.curr(index).view(),
                    empty_tiles: self.empty_tiles.view(),
                    empty_count: self.empty_count.view(),
                    spawn_tiles: self.spawn_tiles.view(),
                    spawn_count: self.spawn_count.view(),
                    patch_count: self.patch_count.view(),
                    overrides: self.overrides.view(),
                    override_count: self.override_count.view(),
                    override_cursor: self.override_cursor.view(),
                }
                .run(empty_idx)
            },
        );

        device.dispatch("screen_probes_finalize_spawn", 1, |idx| {
            gpu::ScreenProbesFinalizeSpawn {
                params: &self.params,
                spawn_count: self.spawn_count.view(),
                patch_count: self.patch_count.view(),
                ray_count: self.ray_count.view(),
            }
            .run(idx)
        });
    }

    pub fn sample(&self, ctxt: &FrameContext) {
        let index = ctxt.index;
        let seed = ctxt.seed(4);

        ctxt.device.dispatch_indirect(
            "screen_probes_sample",
            &self.ray_count,
            self.params.max_ray_count,
            |ray_idx| {
                gpu::ScreenProbesSample {
                    seed,
                    probes: self.probes.curr(index).view(),
                    spawn_tiles: self.spawn_tiles.view(),
                    rays: self.rays.view(),
                }
                .run(ray_idx)
            },
        );
    }

    /// Traces probe rays, producing hits to resolve and visibility rays that
    /// bring radiance into the hash grid.
    pub fn populate(
        &self,
        ctxt: &FrameContext,
        grid: gpu::HashGrid,
        visibility_rays: &StorageBuffer,
        visibility_count: &StorageBuffer,
    ) {
        let index = ctxt.index;

        ctxt.device.dispatch_indirect(
            "screen_probes_populate",
            &self.ray_count,
            self.params.max_ray_count,
            |ray_idx| {
                gpu::ScreenProbesPopulate {
                    camera: ctxt.camera,
                    scene: ctxt.scene,
                    shading: ctxt.shading,
                    grid,
                    probes: self.probes.curr(index).view(),
                    spawn_tiles: self.spawn_tiles.view(),
                    rays: self.rays.view(),
                    hits: self.hits.view(),
                    visibility_rays: visibility_rays.view(),
                    visibility_count: visibility_count.view(),
                }
                .run(ray_idx)
            },
        );
    }

    /// Blends resolved radiance into the probes and their cache slots, then
    /// moves the slots used this frame to the front of the LRU list.
    pub fn blend(&self, ctxt: &FrameContext) {
        let device = ctxt.device;
        let index = ctxt.index;

        device.dispatch_indirect(
            "screen_probes_blend",
            &self.ray_count,
            self.params.max_ray_count,
            |ray_idx| {
                gpu::ScreenProbesBlend {
                    params: &self.params,
                    probes: self.probes.curr(index).view(),
                    spawn_tiles: self.spawn_tiles.view(),
                    rays: self.rays.view(),
                    ray_radiance: self.ray_radiance.view(),
                    radiance: self.radiance.curr(index).view(),
                    mask: self.mask.curr(index).view(),
                    cached_probes: self.cached_probes.view(),
                    cached_radiance: self.cached_radiance.view(),
                    lru: self.lru.prev(index).view(),
                    lru_flags: self.lru_flags.view(),
                }
                .run(ray_idx)
            },
        );

        self.reorder(device, index);
    }

    fn reorder(&self, device: &Device, index: BufferIndex) {
        device.dispatch(
            "screen_probes_gather_lru_flags",
            self.params.max_probe_count,
            |idx| {
                gpu::ScreenProbesGatherLruFlags {
                    lru: self.lru.prev(index).view(),
                    lru_flags: self.lru_flags.view(),
                    ordered_flags: self.lru_ordered_flags.view(),
                }
                .run(idx)
            },
        );

        device.scan(
            &self.lru_ordered_flags,
            &self.lru_offsets,
            self.params.max_probe_count as usize,
        );

        device.dispatch(
            "screen_probes_reorder_lru",
            self.params.max_probe_count,
            |idx| {
                gpu::ScreenProbesReorderLru {
                    params: &self.params,
                    lru: self.lru.prev(index).view(),
                    ordered_flags: self.lru_ordered_flags.view(),
                    offsets: self.lru_offsets.view(),
                    next_lru: self.lru.curr(index).view(),
                }
                .run(idx)
            },
        );
    }

    /// Builds the mask's mip chain and smooths probes across their
    /// neighbours.
    pub fn filter(&self, ctxt: &FrameContext) {
        let device = ctxt.device;
        let index = ctxt.index;
        let mask = self.mask.curr(index);

        for mip in 1..mask.mip_count() {
            device.dispatch_2d(
                "screen_probes_filter_mask",
                mask.mip_size(mip),
                |pos| {
                    gpu::ScreenProbesFilterMask {
                        src: mask.mip(mip - 1),
                        dst: mask.mip(mip),
                    }
                    .run(pos)
                },
            );
        }

        for (src, dst, axis) in [
            (self.radiance.curr(index), &self.scratch, ivec2(1, 0)),
            (&self.scratch, &self.filtered, ivec2(0, 1)),
        ] {
            device.dispatch_2d("screen_probes_filter", src.size(), |pos| {
                gpu::ScreenProbesFilter {
                    params: &self.params,
                    probes: self.probes.curr(index).view(),
                    mask: mask.view(),
                    src: src.view(),
                    dst: dst.view(),
                    axis,
                }
                .run(pos)
            });
        }
    }

    /// Projects probes onto spherical harmonics and interpolates them into
    /// per-pixel irradiance.
    pub fn resolve(&self, ctxt: &FrameContext) {
        let device = ctxt.device;
        let index = ctxt.index;

        device.dispatch_2d(
            "screen_probes_project",
            self.params.probe_count(),
            |tile| {
                gpu::ScreenProbesProject {
                    params: &self.params,
                    mask: self.mask.curr(index).view(),
                    radiance: self.filtered.view(),
                    sh: self.sh.curr(index).view(),
                }
                .run(tile)
            },
        );

        device.dispatch_2d(
            "screen_probes_interpolate",
            self.irradiance.size(),
            |pixel| {
                gpu::ScreenProbesInterpolate {
                    params: &self.params,
                    gbuffer: ctxt.gbuffer,
                    probes: self.probes.curr(index).view(),
                    mask: self.mask.curr(index).view(),
                    sh: self.sh.curr(index).view(),
                    output: self.irradiance.view(),
                }
                .run(pixel)
            },
        );
    }

    pub fn screen_params(&self) -> &gpu::ScreenProbesParams {
        &self.params
    }

    pub fn ray_count(&self) -> &StorageBuffer {
        &self.ray_count
    }

    pub fn hits(&self) -> &StorageBuffer {
        &self.hits
    }

    pub fn ray_radiance(&self) -> &StorageBuffer {
        &self.ray_radiance
    }

    /// Returns the LRU list of cache slots, as ordered by the last frame
    /// rendered with given index.
    pub fn lru(&self, index: BufferIndex) -> &StorageBuffer {
        self.lru.curr(index)
    }

    pub fn probes(&self, index: BufferIndex) -> &StorageBuffer {
        self.probes.curr(index)
    }

    pub fn radiance(&self, index: BufferIndex) -> &Texture {
        self.radiance.curr(index)
    }

    pub fn filtered_radiance(&self) -> &Texture {
        &self.filtered
    }

    pub fn irradiance(&self) -> &Texture {
        &self.irradiance
    }

    pub fn bytes(&self) -> usize {
        let buffers = [
            &self.cached_probes,
            &self.lru_flags,
            &self.lru_ordered_flags,
            &self.lru_offsets,
            &self.tile_counts,
            &self.tile_offsets,
            &self.tile_slots,
            &self.slot_targets,
            &self.empty_tiles,
            &self.empty_count,
            &self.spawn_tiles,
            &self.spawn_count,
            &self.patch_count,
            &self.overrides,
            &self.override_count,
            &self.override_cursor,
            &self.ray_count,
            &self.rays,
            &self.hits,
            &self.ray_radiance,
        ];

        let double_buffers = [&self.probes, &self.lru, &self.sh];
        let double_textures = [&self.radiance, &self.mask];

        let textures = [
            &self.cached_radiance,
            &self.scratch,
            &self.filtered,
            &self.irradiance,
        ];

        buffers.iter().map(|b| b.bytes()).sum::<usize>()
            + double_buffers
                .iter()
                .flat_map(|b| b.both())
                .map(|b| b.bytes())
                .sum::<usize>()
            + double_textures
                .iter()
                .flat_map(|t| t.both())
                .map(|t| t.bytes())
                .sum::<usize>()
            + textures.iter().map(|t| t.bytes()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params() {
        // ---
        // Case 1: viewport divisible by the spawn tile

        let params = ScreenProbesPass::params(UVec2::new(64, 32));

        assert_eq!(UVec2::new(8, 4), params.probe_count());
        assert_eq!(UVec2::new(4, 2), params.spawn_tile_count());
        assert_eq!(32, params.max_probe_count);
        assert_eq!(8, params.max_probe_spawn_count);
        assert_eq!(8 * 64, params.max_ray_count);
        assert_eq!(4, params.probe_mask_mip_count);

        // ---
        // Case 2: partial tiles round up

        let params = ScreenProbesPass::params(UVec2::new(70, 9));

        assert_eq!(UVec2::new(9, 2), params.probe_count());
        assert_eq!(UVec2::new(5, 1), params.spawn_tile_count());
        assert_eq!(5, params.probe_mask_mip_count);

        // ---
        // Case 3: single probe

        let params = ScreenProbesPass::params(UVec2::new(8, 8));

        assert_eq!(UVec2::new(1, 1), params.probe_count());
        assert_eq!(1, params.probe_mask_mip_count);
    }
}
