use log::debug;

use crate::gpu::{self, Storage};
use crate::{
    Buffer, BufferIndex, Camera, Device, DoubleBuffered, FrameContext,
    GiConfig, KernelSet, Result, StorageBuffer,
};

/// Number of entries each cell of the reservoir hash can hold.
pub const RESERVOIR_ENTRIES_PER_CELL: u32 = 4;

/// Words of an [`gpu::IndirectReservoir`], as stored on the device.
const RESERVOIR_WORDS: usize = 16;

/// Traces visibility rays and, when resampling is enabled, shares their
/// samples between rays that start close to each other.
#[derive(Debug)]
pub struct ReservoirCachePass {
    params: gpu::ReservoirCacheParams,
    max_ray_count: u32,
    visibility_rays: StorageBuffer,
    visibility_count: StorageBuffer,
    radiance: StorageBuffer,
    reservoirs: DoubleBuffered<StorageBuffer>,
    ray_entries: StorageBuffer,
    cache: Option<ReservoirCacheBuffers>,
}

#[derive(Debug)]
struct ReservoirCacheBuffers {
    hash: DoubleBuffered<StorageBuffer>,
    counts: DoubleBuffered<StorageBuffer>,
    offsets: DoubleBuffered<StorageBuffer>,
    indices: DoubleBuffered<StorageBuffer>,
    resampled: StorageBuffer,
}

impl ReservoirCachePass {
    pub fn new(
        device: &Device,
        config: &GiConfig,
        kernels: &KernelSet,
        camera: &Camera,
    ) -> Result<Self> {
        let max_ray_count = max_ray_count(camera);

        let params = gpu::ReservoirCacheParams {
            num_cells: 1 << config.reservoir_cache_num_cells,
            num_entries_per_cell: RESERVOIR_ENTRIES_PER_CELL,
            use_resampling: kernels.use_resampling as u32,
            ..Default::default()
        };

        debug!(
            "Allocating reservoir cache; rays={max_ray_count}, entries={}, resampling={}",
            params.num_entries(),
            kernels.use_resampling,
        );

        let rays = max_ray_count as usize;
        let entries = params.num_entries() as usize;

        let cache = if kernels.use_resampling {
            Some(ReservoirCacheBuffers {
                hash: DoubleBuffered::<StorageBuffer>::new(
                    device,
                    "candela_reservoir_cache_hash",
                    entries,
                )?,
                counts: DoubleBuffered::<StorageBuffer>::new(
                    device,
                    "candela_reservoir_cache_counts",
                    entries,
                )?,
                offsets: DoubleBuffered::<StorageBuffer>::new(
                    device,
                    "candela_reservoir_cache_offsets",
                    entries,
                )?,
                indices: DoubleBuffered::<StorageBuffer>::new(
                    device,
                    "candela_reservoir_cache_indices",
                    rays,
                )?,
                resampled: StorageBuffer::new(
                    device,
                    "candela_reservoir_cache_resampled",
                    4 * rays,
                )?,
            })
        } else {
            None
        };

        Ok(Self {
            params,
            max_ray_count,
            visibility_rays: StorageBuffer::new_of::<gpu::VisibilityRay>(
                device,
                "candela_visibility_rays",
                rays,
            )?,
            visibility_count: StorageBuffer::new(
                device,
                "candela_visibility_count",
                1,
            )?,
            radiance: StorageBuffer::new(
                device,
                "candela_visibility_radiance",
                4 * rays,
            )?,
            reservoirs: DoubleBuffered::<StorageBuffer>::new(
                device,
                "candela_reservoirs",
                RESERVOIR_WORDS * rays,
            )?,
            ray_entries: StorageBuffer::new(
                device,
                "candela_reservoir_ray_entries",
                2 * rays,
            )?,
            cache,
        })
    }

    pub fn prepare(&mut self, config: &GiConfig, camera: &gpu::Camera) {
        self.params.cell_size = camera.angular_size(config.reservoir_cache_cell_size);
        self.params.min_cell_size = config.hash_grid_cache_min_cell_size;
    }

    pub fn visibility_rays(&self) -> &StorageBuffer {
        &self.visibility_rays
    }

    pub fn visibility_count(&self) -> &StorageBuffer {
        &self.visibility_count
    }

    pub fn max_ray_count(&self) -> u32 {
        self.max_ray_count
    }

    pub fn begin_frame(&self, device: &Device) {
        device.clear(&self.visibility_count);
    }

    /// Returns radiance brought by each visibility ray, resampled if enabled.
    pub fn output(&self) -> &StorageBuffer {
        self.cache
            .as_ref()
            .map(|cache| &cache.resampled)
            .unwrap_or(&self.radiance)
    }

    fn cache(&self, index: BufferIndex, prev: bool) -> gpu::ReservoirCache<'_> {
        let Some(cache) = &self.cache else {
            return gpu::ReservoirCache {
                params: &self.params,
                hash: Storage::new(&[]),
                counts: Storage::new(&[]),
                offsets: Storage::new(&[]),
                indices: Storage::new(&[]),
            };
        };

        fn pick(
            buffers: &DoubleBuffered<StorageBuffer>,
            index: BufferIndex,
            prev: bool,
        ) -> Storage<'_> {
            if prev {
                buffers.prev(index).view()
            } else {
                buffers.curr(index).view()
            }
        }

        gpu::ReservoirCache {
            params: &self.params,
            hash: pick(&cache.hash, index, prev),
            counts: pick(&cache.counts, index, prev),
            offsets: pick(&cache.offsets, index, prev),
            indices: pick(&cache.indices, index, prev),
        }
    }

    pub fn run(&self, ctxt: &FrameContext, grid: gpu::HashGrid) {
        let device = ctxt.device;
        let index = ctxt.index;

        if self.cache.is_some() {
            device.dispatch(
                "reservoir_cache_clear",
                self.params.num_entries(),
                |entry| {
                    gpu::ReservoirCacheClear {
                        cache: self.cache(index, false),
                    }
                    .run(entry)
                },
            );
        }

        device.dispatch_indirect(
            "reservoir_cache_generate",
            &self.visibility_count,
            self.max_ray_count,
            |idx| {
                gpu::ReservoirCacheGenerate {
                    camera: ctxt.camera,
                    scene: ctxt.scene,
                    shading: ctxt.shading,
                    grid,
                    cache: self.cache(index, false),
                    rays: self.visibility_rays.view(),
                    radiance: self.radiance.view(),
                    reservoirs: self.reservoirs.curr(index).view(),
                    ray_entries: self.ray_entries.view(),
                }
                .run(idx)
            },
        );

        let Some(cache) = &self.cache else {
            return;
        };

        device.scan(
            cache.counts.curr(index),
            cache.offsets.curr(index),
            self.params.num_entries() as usize,
        );

        device.dispatch_indirect(
            "reservoir_cache_compact",
            &self.visibility_count,
            self.max_ray_count,
            |idx| {
                gpu::ReservoirCacheCompact {
                    cache: self.cache(index, false),
                    ray_entries: self.ray_entries.view(),
                }
                .run(idx)
            },
        );

        let seed = ctxt.seed(1);

        device.dispatch_indirect(
            "reservoir_cache_resample",
            &self.visibility_count,
            self.max_ray_count,
            |idx| {
                gpu::ReservoirCacheResample {
                    camera: ctxt.camera,
                    seed,
                    cache: self.cache(index, false),
                    prev_cache: self.cache(index, true),
                    rays: self.visibility_rays.view(),
                    reservoirs: self.reservoirs.curr(index).view(),
                    prev_reservoirs: self.reservoirs.prev(index).view(),
                    ray_entries: self.ray_entries.view(),
                    resampled: cache.resampled.view(),
                }
                .run(idx)
            },
        );
    }

    pub fn bytes(&self) -> usize {
        let mut bytes = self.visibility_rays.bytes()
            + self.visibility_count.bytes()
            + self.radiance.bytes()
            + self.ray_entries.bytes()
            + self.reservoirs.both().iter().map(|b| b.bytes()).sum::<usize>();

        if let Some(cache) = &self.cache {
            bytes += [&cache.hash, &cache.counts, &cache.offsets, &cache.indices]
                .iter()
                .flat_map(|buffers| buffers.both())
                .map(|buffer| buffer.bytes())
                .sum::<usize>();

            bytes += cache.resampled.bytes();
        }

        bytes
    }
}

/// Returns how many rays probes can shoot during a single frame, which is
/// also the number of visibility rays they can produce.
pub fn max_ray_count(camera: &Camera) -> u32 {
    let spawn_tiles =
        (camera.viewport_size + gpu::PROBE_SPAWN_TILE_SIZE - 1) / gpu::PROBE_SPAWN_TILE_SIZE;

    spawn_tiles.x * spawn_tiles.y * gpu::PROBE_TEXELS
}
