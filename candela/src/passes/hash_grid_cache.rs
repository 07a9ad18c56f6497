use log::debug;

use crate::gpu::{self, HashGridStatsLayout};
use crate::{
    Buffer, BufferIndex, Device, DoubleBuffered, Error, GiConfig, KernelSet,
    Readback, Result, StorageBuffer,
};

/// World-space radiance cache: tiles of cells, keyed by a spatial hash and
/// kept in fixed-size buckets.
#[derive(Debug)]
pub struct HashGridCachePass {
    params: gpu::HashGridParams,
    hash: StorageBuffer,
    decay: StorageBuffer,
    values: StorageBuffer,
    accumulators: StorageBuffer,
    packed_tiles: DoubleBuffered<StorageBuffer>,
    packed_count: DoubleBuffered<StorageBuffer>,
    update_cells: StorageBuffer,
    update_count: StorageBuffer,
    overflow: StorageBuffer,
    debug_cells: Option<StorageBuffer>,
    bucket_occupancy: StorageBuffer,
    counters: StorageBuffer,
    stats: StorageBuffer,
    readback: Readback,
    latest: Option<HashGridStats>,
}

impl HashGridCachePass {
    pub fn new(
        device: &Device,
        config: &GiConfig,
        kernels: &KernelSet,
    ) -> Result<Self> {
        let params = Self::params(config)?;

        debug!(
            "Allocating hash grid cache; buckets={}, tiles={}, cells={}",
            params.num_buckets,
            params.num_tiles,
            params.num_cells(),
        );

        let num_tiles = params.num_tiles as usize;
        let num_cells = params.num_cells() as usize;
        let num_buckets = params.num_buckets as usize;
        let stats_len = HashGridStatsLayout::new(&params).len();

        let debug_cells = if kernels.debug_hash_grid {
            Some(StorageBuffer::new(
                device,
                "candela_hash_grid_debug_cells",
                num_cells,
            )?)
        } else {
            None
        };

        Ok(Self {
            params,
            hash: StorageBuffer::new(device, "candela_hash_grid_hash", num_tiles)?,
            decay: StorageBuffer::new(
                device,
                "candela_hash_grid_decay",
                num_tiles,
            )?,
            values: StorageBuffer::new(
                device,
                "candela_hash_grid_values",
                4 * num_cells,
            )?,
            accumulators: StorageBuffer::new(
                device,
                "candela_hash_grid_accumulators",
                4 * num_cells,
            )?,
            packed_tiles: DoubleBuffered::<StorageBuffer>::new(
                device,
                "candela_hash_grid_packed_tiles",
                num_tiles,
            )?,
            packed_count: DoubleBuffered::<StorageBuffer>::new(
                device,
                "candela_hash_grid_packed_count",
                1,
            )?,
            update_cells: StorageBuffer::new(
                device,
                "candela_hash_grid_update_cells",
                num_cells,
            )?,
            update_count: StorageBuffer::new(
                device,
                "candela_hash_grid_update_count",
                1,
            )?,
            overflow: StorageBuffer::new(
                device,
                "candela_hash_grid_overflow",
                num_buckets,
            )?,
            debug_cells,
            bucket_occupancy: StorageBuffer::new(
                device,
                "candela_hash_grid_bucket_occupancy",
                num_buckets,
            )?,
            counters: StorageBuffer::new(
                device,
                "candela_hash_grid_counters",
                stats_len,
            )?,
            stats: StorageBuffer::new(
                device,
                "candela_hash_grid_stats",
                stats_len,
            )?,
            readback: Readback::new(device, "candela_hash_grid_stats", stats_len)?,
            latest: None,
        })
    }

    /// Works out the layout of the cache; per-frame fields are filled in by
    /// [`Self::prepare()`].
    pub fn params(config: &GiConfig) -> Result<gpu::HashGridParams> {
        let (size_tile_mip, first_cell_offset_tile_mip, num_cells_per_tile) =
            gpu::HashGridParams::layout(config.hash_grid_cache_tile_cell_ratio)
                .ok_or_else(|| {
                    Error::invalid(format!(
                        "tile cell ratio {} doesn't fit {} mips",
                        config.hash_grid_cache_tile_cell_ratio,
                        gpu::HASH_GRID_MIPS,
                    ))
                })?;

        if config.hash_grid_cache_words().is_none() {
            return Err(Error::invalid(
                "hash grid cache has too many cells to be addressed",
            ));
        }

        let num_buckets = 1 << config.hash_grid_cache_num_buckets;
        let num_tiles_per_bucket = 1 << config.hash_grid_cache_num_tiles_per_bucket;

        Ok(gpu::HashGridParams {
            num_buckets,
            num_tiles_per_bucket,
            num_tiles: num_buckets * num_tiles_per_bucket,
            num_cells_per_tile,
            size_tile_mip,
            first_cell_offset_tile_mip,
            ..Default::default()
        })
    }

    pub fn prepare(
        &mut self,
        config: &GiConfig,
        camera: &gpu::Camera,
        frame: u32,
    ) {
        self.params.cell_size = camera.angular_size(config.hash_grid_cache_cell_size);
        self.params.min_cell_size = config.hash_grid_cache_min_cell_size;
        self.params.max_sample_count = config.hash_grid_cache_max_sample_count;
        self.params.max_tile_decay = config.hash_grid_cache_max_tile_decay;
        self.params.debug_mip_level = config.effective_debug_mip_level();
        self.params.debug_propagate = config.effective_debug_propagate() as u32;
        self.params.frame = frame;
    }

    pub fn grid(&self, index: BufferIndex) -> gpu::HashGrid<'_> {
        gpu::HashGrid {
            params: &self.params,
            hash: self.hash.view(),
            decay: self.decay.view(),
            values: self.values.view(),
            accumulators: self.accumulators.view(),
            packed_tiles: self.packed_tiles.curr(index).view(),
            packed_count: self.packed_count.curr(index).view(),
            update_cells: self.update_cells.view(),
            update_count: self.update_count.view(),
            overflow: self.overflow.view(),
            debug_cells: self.debug_cells.as_ref().map(|cells| cells.view()),
        }
    }

    pub fn num_tiles(&self) -> u32 {
        self.params.num_tiles
    }

    pub fn num_cells(&self) -> u32 {
        self.params.num_cells()
    }

    /// Forgets everything the cache has gathered so far.
    pub fn clear(&mut self, device: &Device) {
        debug!("Clearing hash grid cache");

        device.clear(&self.hash);
        device.clear(&self.decay);
        device.clear(&self.values);
        device.clear(&self.accumulators);

        for buffer in self.packed_tiles.both() {
            device.clear(buffer);
        }

        for buffer in self.packed_count.both() {
            device.clear(buffer);
        }

        device.clear(&self.update_count);
        device.clear(&self.overflow);
        device.clear(&self.bucket_occupancy);

        if let Some(debug_cells) = &self.debug_cells {
            device.clear(debug_cells);
        }

        self.readback.reset();
        self.latest = None;
    }

    /// Ages tiles allocated so far, freeing the stale ones; starts the
    /// current packed list with the survivors.
    pub fn purge(&self, device: &Device, index: BufferIndex) {
        device.clear(self.packed_count.curr(index));
        device.clear(&self.update_count);

        device.dispatch_indirect(
            "hash_grid_purge_tiles",
            self.packed_count.prev(index),
            self.params.num_tiles,
            |idx| {
                gpu::HashGridPurgeTiles {
                    grid: self.grid(index),
                    prev_packed_tiles: self.packed_tiles.prev(index).view(),
                }
                .run(idx)
            },
        );
    }

    /// Accumulates radiance of `count` visibility rays into their cells.
    pub fn populate(
        &self,
        device: &Device,
        index: BufferIndex,
        rays: &StorageBuffer,
        radiance: &StorageBuffer,
        count: &StorageBuffer,
        max_count: u32,
    ) {
        device.dispatch_indirect(
            "hash_grid_populate_cells",
            count,
            max_count,
            |idx| {
                gpu::HashGridPopulateCells {
                    grid: self.grid(index),
                    rays: rays.view(),
                    radiance: radiance.view(),
                }
                .run(idx)
            },
        );
    }

    pub fn update(&self, device: &Device, index: BufferIndex) {
        device.dispatch_indirect(
            "hash_grid_update_tiles",
            &self.update_count,
            self.params.num_cells(),
            |idx| gpu::HashGridUpdateTiles { grid: self.grid(index) }.run(idx),
        );
    }

    /// Turns `count` probe ray hits into radiance.
    pub fn resolve(
        &self,
        device: &Device,
        index: BufferIndex,
        hits: &StorageBuffer,
        radiance: &StorageBuffer,
        count: &StorageBuffer,
        max_count: u32,
    ) {
        device.dispatch_indirect(
            "hash_grid_resolve_cells",
            count,
            max_count,
            |idx| {
                gpu::HashGridResolveCells {
                    grid: self.grid(index),
                    hits: hits.view(),
                    radiance: radiance.view(),
                }
                .run(idx)
            },
        );
    }

    /// Computes statistics of the current frame and picks up whatever the
    /// readback ring has got ready.
    pub fn collect_stats(&mut self, device: &Device, frame: u32) {
        device.clear(&self.counters);

        device.dispatch(
            "hash_grid_count_buckets",
            self.params.num_buckets,
            |bucket| {
                gpu::HashGridCountBuckets {
                    params: &self.params,
                    hash: self.hash.view(),
                    overflow: self.overflow.view(),
                    bucket_occupancy: self.bucket_occupancy.view(),
                    counters: self.counters.view(),
                }
                .run(bucket)
            },
        );

        device.dispatch("hash_grid_format_stats", 1, |idx| {
            gpu::HashGridFormatStats {
                params: &self.params,
                counters: self.counters.view(),
                stats: self.stats.view(),
            }
            .run(idx)
        });

        let layout = HashGridStatsLayout::new(&self.params);
        let memory = self.bytes();

        if let Some(words) = self.readback.push(device, frame, &self.stats) {
            self.latest = Some(HashGridStats::parse(&layout, words, memory));
        }
    }

    /// Returns the most recent statistics that made it through the readback
    /// ring.
    pub fn stats(&self) -> Option<&HashGridStats> {
        self.latest.as_ref()
    }

    pub fn bucket_occupancy(&self) -> &StorageBuffer {
        &self.bucket_occupancy
    }

    pub fn bytes(&self) -> usize {
        let buffers = [
            &self.hash,
            &self.decay,
            &self.values,
            &self.accumulators,
            &self.update_cells,
            &self.update_count,
            &self.overflow,
            &self.bucket_occupancy,
            &self.counters,
            &self.stats,
        ];

        buffers.iter().map(|buffer| buffer.bytes()).sum::<usize>()
            + self
                .packed_tiles
                .both()
                .iter()
                .chain(self.packed_count.both().iter())
                .map(|buffer| buffer.bytes())
                .sum::<usize>()
            + self.debug_cells.as_ref().map_or(0, |cells| cells.bytes())
            + self.readback.bytes()
    }
}

/// Diagnostics of the hash grid cache, as read back from the device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HashGridStats {
    pub free_buckets: u32,
    pub used_buckets: u32,
    pub used_tiles: u32,

    /// Insertions rejected because their bucket was full.
    pub overflow: u32,

    /// Number of buckets with `n` occupied tiles, for each `n`.
    pub occupancy_histogram: Vec<u32>,

    /// Number of buckets that have overflowed `n` times, for each `n`; the
    /// last bin collects the rest.
    pub overflow_histogram: Vec<u32>,

    /// Memory taken by the cache, in bytes.
    pub memory: usize,
}

impl HashGridStats {
    fn parse(layout: &HashGridStatsLayout, words: &[u32], memory: usize) -> Self {
        let occupancy = layout.occupancy_bin(0);
        let overflow = layout.overflow_bin(0);

        Self {
            free_buckets: words[HashGridStatsLayout::FREE_BUCKETS],
            used_buckets: words[HashGridStatsLayout::USED_BUCKETS],
            used_tiles: words[HashGridStatsLayout::USED_TILES],
            overflow: words[HashGridStatsLayout::OVERFLOW],
            occupancy_histogram: words
                [occupancy..occupancy + layout.occupancy_bins()]
                .to_vec(),
            overflow_histogram: words[overflow..layout.len()].to_vec(),
            memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceDescriptor;

    #[test]
    fn default_layout() {
        let params = HashGridCachePass::params(&GiConfig::default()).unwrap();

        assert_eq!(4096, params.num_buckets);
        assert_eq!(16, params.num_tiles_per_bucket);
        assert_eq!(65536, params.num_tiles);
        assert_eq!(params.num_buckets * params.num_tiles_per_bucket, params.num_tiles);
        assert_eq!(8 * 8 + 4 * 4 + 2 * 2 + 1, params.num_cells_per_tile);
        assert_eq!([8, 4, 2, 1], params.size_tile_mip);
        assert_eq!([0, 64, 80, 84], params.first_cell_offset_tile_mip);
    }

    #[test]
    fn stats_parsing() {
        let device = Device::new(DeviceDescriptor::default()).unwrap();

        let config = GiConfig {
            hash_grid_cache_num_buckets: 2,
            hash_grid_cache_num_tiles_per_bucket: 1,
            ..Default::default()
        };

        let mut pass =
            HashGridCachePass::new(&device, &config, &KernelSet::new(&config, 0))
                .unwrap();

        // Two tiles in bucket 0, nothing elsewhere; bucket 3 has overflowed
        // twice
        pass.hash.view().store(0, 123);
        pass.hash.view().store(1, 456);
        pass.overflow.view().store(3, 2);

        for frame in 1..=4 {
            pass.collect_stats(&device, frame);
        }

        let stats = pass.stats().unwrap();

        assert_eq!(3, stats.free_buckets);
        assert_eq!(1, stats.used_buckets);
        assert_eq!(2, stats.used_tiles);
        assert_eq!(2, stats.overflow);
        assert_eq!(vec![3, 0, 1], stats.occupancy_histogram);
        assert_eq!(gpu::HASH_GRID_OVERFLOW_BINS as usize, stats.overflow_histogram.len());
        assert_eq!(3, stats.overflow_histogram[0]);
        assert_eq!(1, stats.overflow_histogram[2]);
        assert_eq!(pass.bytes(), stats.memory);
        assert_eq!(vec![2, 0, 0, 0], pass.bucket_occupancy().to_vec());

        // ---

        pass.clear(&device);

        assert!(pass.stats().is_none());
        assert!(pass.hash.to_vec().iter().all(|&key| key == 0));
    }
}
