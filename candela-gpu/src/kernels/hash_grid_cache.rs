use glam::{Vec4, Vec4Swizzles};

use crate::{
    HashGrid, HashGridParams, ProbeRayHit, Storage, VisibilityRay, INVALID_ID,
};

/// Number of bins of the overflow histogram; the last one collects every
/// bucket that has overflowed at least that many times.
pub const HASH_GRID_OVERFLOW_BINS: u32 = 16;

/// Ages tiles that were alive during the previous frame: the ones nobody
/// has touched for more than `max_tile_decay` frames get freed, the rest get
/// re-packed into the current list.
pub struct HashGridPurgeTiles<'a> {
    pub grid: HashGrid<'a>,
    pub prev_packed_tiles: Storage<'a>,
}

impl<'a> HashGridPurgeTiles<'a> {
    pub fn run(self, idx: u32) {
        let tile = self.prev_packed_tiles.load(idx as usize);

        if self.grid.hash.load(tile as usize) == 0 {
            return;
        }

        let decay = self.grid.decay.load(tile as usize) + 1;

        if decay > self.grid.params.max_tile_decay {
            self.grid.free(tile);
        } else {
            self.grid.decay.store(tile as usize, decay);

            let slot = self.grid.packed_count.atomic_add(0, 1);

            self.grid.packed_tiles.store(slot as usize, tile);
        }
    }
}

/// Accumulates radiance brought by visibility rays into their cells.
pub struct HashGridPopulateCells<'a> {
    pub grid: HashGrid<'a>,
    pub rays: Storage<'a>,

    /// Radiance of each ray, either straight from the trace or resampled.
    pub radiance: Storage<'a>,
}

impl<'a> HashGridPopulateCells<'a> {
    pub fn run(self, idx: u32) {
        let ray: VisibilityRay = self.rays.read(idx as usize);

        if ray.tile == INVALID_ID {
            return;
        }

        self.grid.accumulate(
            ray.tile,
            VisibilityRay::unpack_cell(ray.cell),
            self.radiance.read::<Vec4>(idx as usize).xyz(),
        );
    }
}

pub struct HashGridUpdateTiles<'a> {
    pub grid: HashGrid<'a>,
}

impl<'a> HashGridUpdateTiles<'a> {
    pub fn run(self, idx: u32) {
        self.grid.update(self.grid.update_cells.load(idx as usize));
    }
}

/// Turns probe ray hits into radiance: whatever the hit emits plus the
/// cached radiance arriving at it, scaled by its albedo.
pub struct HashGridResolveCells<'a> {
    pub grid: HashGrid<'a>,
    pub hits: Storage<'a>,
    pub radiance: Storage<'a>,
}

impl<'a> HashGridResolveCells<'a> {
    pub fn run(self, idx: u32) {
        let hit: ProbeRayHit = self.hits.read(idx as usize);
        let mut radiance = hit.emitted;

        if hit.tile != INVALID_ID {
            radiance += hit.albedo
                * self
                    .grid
                    .resolve(hit.tile, VisibilityRay::unpack_cell(hit.cell))
                    .radiance;
        }

        self.radiance.write(idx as usize, radiance.extend(1.0));
    }
}

/// Word offsets of the hash grid's statistics record.
#[derive(Clone, Copy, Debug)]
pub struct HashGridStatsLayout {
    pub num_tiles_per_bucket: u32,
}

impl HashGridStatsLayout {
    pub const FREE_BUCKETS: usize = 0;
    pub const USED_BUCKETS: usize = 1;
    pub const USED_TILES: usize = 2;
    pub const OVERFLOW: usize = 3;

    const HEADER: usize = 4;

    pub fn new(params: &HashGridParams) -> Self {
        Self {
            num_tiles_per_bucket: params.num_tiles_per_bucket,
        }
    }

    pub fn occupancy_bins(&self) -> usize {
        self.num_tiles_per_bucket as usize + 1
    }

    pub fn occupancy_bin(&self, occupancy: u32) -> usize {
        Self::HEADER + occupancy as usize
    }

    pub fn overflow_bin(&self, overflow: u32) -> usize {
        Self::HEADER
            + self.occupancy_bins()
            + overflow.min(HASH_GRID_OVERFLOW_BINS - 1) as usize
    }

    /// Returns the length of the record, in words.
    pub fn len(&self) -> usize {
        Self::HEADER + self.occupancy_bins() + HASH_GRID_OVERFLOW_BINS as usize
    }
}

/// Counts occupied tiles of each bucket, building the histograms.
pub struct HashGridCountBuckets<'a> {
    pub params: &'a HashGridParams,
    pub hash: Storage<'a>,
    pub overflow: Storage<'a>,
    pub bucket_occupancy: Storage<'a>,
    pub counters: Storage<'a>,
}

impl<'a> HashGridCountBuckets<'a> {
    pub fn run(self, bucket: u32) {
        let layout = HashGridStatsLayout::new(self.params);
        let base = bucket * self.params.num_tiles_per_bucket;

        let occupancy = (base..base + self.params.num_tiles_per_bucket)
            .filter(|&tile| self.hash.load(tile as usize) != 0)
            .count() as u32;

        let overflow = self.overflow.load(bucket as usize);

        self.bucket_occupancy.store(bucket as usize, occupancy);

        if occupancy == 0 {
            self.counters.atomic_add(HashGridStatsLayout::FREE_BUCKETS, 1);
        } else {
            self.counters.atomic_add(HashGridStatsLayout::USED_BUCKETS, 1);
        }

        self.counters.atomic_add(HashGridStatsLayout::OVERFLOW, overflow);
        self.counters.atomic_add(layout.occupancy_bin(occupancy), 1);
        self.counters.atomic_add(layout.overflow_bin(overflow), 1);
    }
}

/// Produces the final statistics record out of the counters; runs as a
/// single work item.
pub struct HashGridFormatStats<'a> {
    pub params: &'a HashGridParams,
    pub counters: Storage<'a>,
    pub stats: Storage<'a>,
}

impl<'a> HashGridFormatStats<'a> {
    pub fn run(self, _: u32) {
        let layout = HashGridStatsLayout::new(self.params);

        for idx in 0..layout.len() {
            self.stats.store(idx, self.counters.load(idx));
        }

        let used_tiles = (0..=self.params.num_tiles_per_bucket)
            .map(|occupancy| {
                occupancy * self.counters.load(layout.occupancy_bin(occupancy))
            })
            .sum::<u32>();

        self.stats.store(HashGridStatsLayout::USED_TILES, used_tiles);
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::AtomicU32;

    use super::*;

    fn words(len: usize) -> Vec<AtomicU32> {
        (0..len).map(|_| AtomicU32::new(0)).collect()
    }

    #[test]
    fn stats() {
        let params = HashGridParams {
            num_buckets: 4,
            num_tiles_per_bucket: 2,
            num_tiles: 8,
            ..Default::default()
        };

        let layout = HashGridStatsLayout::new(&params);
        let hash = words(8);
        let overflow = words(4);
        let bucket_occupancy = words(4);
        let counters = words(layout.len());
        let stats = words(layout.len());

        // Bucket 0 is empty, bucket 1 is half-full, buckets 2 and 3 are full
        // and bucket 3 has overflowed a lot
        for tile in [2, 4, 5, 6, 7] {
            hash[tile].store(123, core::sync::atomic::Ordering::Relaxed);
        }

        overflow[3].store(100, core::sync::atomic::Ordering::Relaxed);

        for bucket in 0..4 {
            HashGridCountBuckets {
                params: &params,
                hash: Storage::new(&hash),
                overflow: Storage::new(&overflow),
                bucket_occupancy: Storage::new(&bucket_occupancy),
                counters: Storage::new(&counters),
            }
            .run(bucket);
        }

        HashGridFormatStats {
            params: &params,
            counters: Storage::new(&counters),
            stats: Storage::new(&stats),
        }
        .run(0);

        let stats = Storage::new(&stats);
        let occupancy = Storage::new(&bucket_occupancy);

        assert_eq!(1, stats.load(HashGridStatsLayout::FREE_BUCKETS));
        assert_eq!(3, stats.load(HashGridStatsLayout::USED_BUCKETS));
        assert_eq!(5, stats.load(HashGridStatsLayout::USED_TILES));
        assert_eq!(100, stats.load(HashGridStatsLayout::OVERFLOW));

        assert_eq!(1, stats.load(layout.occupancy_bin(0)));
        assert_eq!(1, stats.load(layout.occupancy_bin(1)));
        assert_eq!(2, stats.load(layout.occupancy_bin(2)));

        assert_eq!(3, stats.load(layout.overflow_bin(0)));
        assert_eq!(1, stats.load(layout.overflow_bin(HASH_GRID_OVERFLOW_BINS - 1)));

        assert_eq!([0, 1, 2, 2], [0, 1, 2, 3].map(|b| occupancy.load(b)));
    }
}
