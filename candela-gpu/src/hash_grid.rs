use bytemuck::{Pod, Zeroable};
use glam::{vec3, IVec3, UVec2, Vec3, Vec4, Vec4Swizzles};

use crate::{
    lerp, Storage, U32Ext, Vec3Ext, HASH_GRID_MIPS, RADIANCE_FIXED_POINT,
};

/// Largest radiance component accumulated by a single sample; keeps the
/// fixed-point accumulators from wrapping around.
pub const HASH_GRID_MAX_SAMPLE_RADIANCE: f32 = 4096.0;

/// Number of distinct scale levels a tile key can encode.
pub const HASH_GRID_LEVELS: u32 = 4;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct HashGridParams {
    /// Tangent of the angle covered by one cell; multiplied by the distance
    /// to camera gives the world-space size of a cell.
    pub cell_size: f32,
    pub min_cell_size: f32,
    pub max_sample_count: f32,
    pub num_buckets: u32,
    pub num_tiles_per_bucket: u32,
    pub num_tiles: u32,
    pub num_cells_per_tile: u32,
    pub max_tile_decay: u32,
    pub debug_mip_level: u32,
    pub debug_propagate: u32,
    pub frame: u32,
    pub size_tile_mip: [u32; HASH_GRID_MIPS],
    pub first_cell_offset_tile_mip: [u32; HASH_GRID_MIPS],
}

impl HashGridParams {
    /// Computes the per-mip layout of a tile with given edge (in cells at mip
    /// 0), returning `(size_tile_mip, first_cell_offset_tile_mip,
    /// num_cells_per_tile)`.
    ///
    /// Each mip halves the edge of the previous one; returns `None` if the
    /// last mip would shrink below one cell or if there would be room for a
    /// fifth mip.
    pub fn layout(
        tile_cell_ratio: u32,
    ) -> Option<([u32; HASH_GRID_MIPS], [u32; HASH_GRID_MIPS], u32)> {
        let mut size = [0; HASH_GRID_MIPS];
        let mut offset = [0; HASH_GRID_MIPS];
        let mut cells = 0;

        for mip in 0..HASH_GRID_MIPS {
            size[mip] = tile_cell_ratio >> mip;
            offset[mip] = cells;
            cells += size[mip] * size[mip];
        }

        let size_tile_mip4 = tile_cell_ratio >> HASH_GRID_MIPS;

        if size[HASH_GRID_MIPS - 1] == 0 || size_tile_mip4 != 0 {
            None
        } else {
            Some((size, offset, cells))
        }
    }

    pub fn num_cells(&self) -> u32 {
        self.num_tiles * self.num_cells_per_tile
    }

    pub fn tile_cell_ratio(&self) -> u32 {
        self.size_tile_mip[0]
    }

    /// Returns the mip level resolves start at.
    pub fn first_mip(&self) -> usize {
        (self.debug_mip_level as usize).min(HASH_GRID_MIPS - 1)
    }

    /// Finds where given surface point lives in the grid.
    pub fn locate(
        &self,
        position: Vec3,
        normal: Vec3,
        eye: Vec3,
    ) -> HashGridLocation {
        let (level, cell_size) = scale_level(
            self.cell_size,
            self.min_cell_size,
            position.distance(eye),
        );

        let tile_size = cell_size * (self.tile_cell_ratio() as f32);
        let scaled = position / tile_size;
        let tile = scaled.floor();
        let local = scaled - tile;

        let direction = normal.dominant_axis();

        let plane = match direction / 2 {
            0 => (local.y, local.z),
            1 => (local.z, local.x),
            _ => (local.x, local.y),
        };

        let max_cell = self.tile_cell_ratio() - 1;

        let cell = UVec2::new(
            ((plane.0 * self.tile_cell_ratio() as f32) as u32).min(max_cell),
            ((plane.1 * self.tile_cell_ratio() as f32) as u32).min(max_cell),
        );

        HashGridLocation {
            key: HashGridKey::pack(tile.as_ivec3(), direction, level),
            cell,
        }
    }

    pub fn bucket_of(&self, key: HashGridKey) -> u32 {
        key.0.hash() & (self.num_buckets - 1)
    }

    /// Returns index of given cell (expressed in mip 0 coordinates) at given
    /// mip of given tile.
    pub fn cell_index(&self, tile: u32, mip: usize, cell: UVec2) -> u32 {
        let size = self.size_tile_mip[mip];
        let cell = cell * size / self.size_tile_mip[0];

        tile * self.num_cells_per_tile
            + self.first_cell_offset_tile_mip[mip]
            + cell.y * size
            + cell.x
    }

    /// Inverse of [`Self::cell_index()`]: returns the tile, mip and the
    /// in-mip coordinates of a cell.
    pub fn decode_cell_index(&self, idx: u32) -> (u32, usize, UVec2) {
        let tile = idx / self.num_cells_per_tile;
        let local = idx % self.num_cells_per_tile;
        let mut mip = HASH_GRID_MIPS - 1;

        while local < self.first_cell_offset_tile_mip[mip] {
            mip -= 1;
        }

        let local = local - self.first_cell_offset_tile_mip[mip];
        let size = self.size_tile_mip[mip];

        (tile, mip, UVec2::new(local % size, local / size))
    }
}

/// Returns the scale level of a surface `distance` units away from the camera
/// together with the world-space size of cells at that level.
///
/// Each level doubles the cell size of the previous one, starting from
/// `min_cell_size`.
pub fn scale_level(
    cell_size: f32,
    min_cell_size: f32,
    distance: f32,
) -> (u32, f32) {
    let size = (cell_size * distance).max(min_cell_size);

    let level = (size / min_cell_size)
        .log2()
        .floor()
        .clamp(0.0, (HASH_GRID_LEVELS - 1) as f32) as u32;

    (level, min_cell_size * (1 << level) as f32)
}

/// Packed identifier of a tile: its coordinates, the dominant direction of
/// surfaces it covers and its scale level; zero marks an empty slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct HashGridKey(pub u32);

impl HashGridKey {
    const COORD_BITS: u32 = 9;
    const COORD_MASK: u32 = (1 << Self::COORD_BITS) - 1;

    pub fn pack(tile: IVec3, direction: u32, level: u32) -> Self {
        let x = (tile.x as u32) & Self::COORD_MASK;
        let y = (tile.y as u32) & Self::COORD_MASK;
        let z = (tile.z as u32) & Self::COORD_MASK;

        Self(
            x | (y << 9)
                | (z << 18)
                | ((direction + 1) << 27)
                | ((level & 0b11) << 30),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns dominant axis of surfaces this tile covers, in `0..6`.
    pub fn direction(&self) -> u32 {
        ((self.0 >> 27) & 0b111) - 1
    }

    pub fn level(&self) -> u32 {
        self.0 >> 30
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HashGridLocation {
    pub key: HashGridKey,

    /// Cell within the tile, at mip 0.
    pub cell: UVec2,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HashGridSample {
    pub radiance: Vec3,
    pub sample_count: f32,
    pub mip: u32,
}

/// Device-side view of the radiance cache.
#[derive(Clone, Copy)]
pub struct HashGrid<'a> {
    pub params: &'a HashGridParams,

    /// Key of each tile slot (`num_tiles`).
    pub hash: Storage<'a>,

    /// Frames since each tile was last touched (`num_tiles`).
    pub decay: Storage<'a>,

    /// `rgb + sample_count` per cell (`num_cells * 4`).
    pub values: Storage<'a>,

    /// Fixed-point `rgb + count` accumulated this frame (`num_cells * 4`).
    pub accumulators: Storage<'a>,

    /// Tiles allocated this frame, appended to the current packed list.
    pub packed_tiles: Storage<'a>,
    pub packed_count: Storage<'a>,

    /// Cells that got samples this frame.
    pub update_cells: Storage<'a>,
    pub update_count: Storage<'a>,

    /// Rejected insertions per bucket (`num_buckets`).
    pub overflow: Storage<'a>,

    /// Frame each cell was last written at; present only when a hash grid
    /// debug view is active.
    pub debug_cells: Option<Storage<'a>>,
}

impl<'a> HashGrid<'a> {
    /// Returns the tile holding given key, if it's been allocated.
    pub fn find(&self, key: HashGridKey) -> Option<u32> {
        let base = self.params.bucket_of(key) * self.params.num_tiles_per_bucket;

        (base..base + self.params.num_tiles_per_bucket)
            .find(|&tile| self.hash.load(tile as usize) == key.0)
    }

    /// Returns the tile holding given key, allocating it if absent.
    ///
    /// When the bucket is full, the insertion gets rejected: the bucket's
    /// overflow counter is bumped and no tile is touched.
    pub fn find_or_insert(&self, key: HashGridKey) -> Option<u32> {
        if let Some(tile) = self.find(key) {
            self.touch(tile);
            return Some(tile);
        }

        let bucket = self.params.bucket_of(key);
        let base = bucket * self.params.num_tiles_per_bucket;

        for tile in base..base + self.params.num_tiles_per_bucket {
            let prev = self.hash.atomic_cas(tile as usize, 0, key.0);

            if prev == 0 {
                let slot = self.packed_count.atomic_add(0, 1);

                self.packed_tiles.store(slot as usize, tile);
                self.touch(tile);

                return Some(tile);
            }

            if prev == key.0 {
                self.touch(tile);
                return Some(tile);
            }
        }

        self.overflow.atomic_add(bucket as usize, 1);

        None
    }

    pub fn touch(&self, tile: u32) {
        self.decay.store(tile as usize, 0);
    }

    /// Releases given tile, clearing all of its cells.
    pub fn free(&self, tile: u32) {
        self.hash.store(tile as usize, 0);
        self.decay.store(tile as usize, 0);

        let first = tile * self.params.num_cells_per_tile;

        for cell in first..first + self.params.num_cells_per_tile {
            self.values.write(cell as usize, Vec4::ZERO);
            self.accumulators.write(cell as usize, [0u32; 4]);
        }
    }

    /// Adds a radiance sample to given cell, at every mip starting from the
    /// one resolves begin at.
    pub fn accumulate(&self, tile: u32, cell: UVec2, radiance: Vec3) {
        let radiance = radiance
            .clamp(Vec3::ZERO, Vec3::splat(HASH_GRID_MAX_SAMPLE_RADIANCE))
            * RADIANCE_FIXED_POINT;

        let radiance = if radiance.is_finite() {
            radiance.round().as_uvec3()
        } else {
            Default::default()
        };

        for mip in self.params.first_mip()..HASH_GRID_MIPS {
            let idx = self.params.cell_index(tile, mip, cell);
            let base = 4 * idx as usize;

            self.accumulators.atomic_add(base, radiance.x);
            self.accumulators.atomic_add(base + 1, radiance.y);
            self.accumulators.atomic_add(base + 2, radiance.z);

            if self.accumulators.atomic_add(base + 3, 1) == 0 {
                let slot = self.update_count.atomic_add(0, 1);

                self.update_cells.store(slot as usize, idx);
            }

            if let Some(debug_cells) = &self.debug_cells {
                debug_cells.store(idx as usize, self.params.frame);
            }
        }
    }

    /// Folds this frame's samples of given cell into its moving average.
    pub fn update(&self, idx: u32) {
        let [r, g, b, n] = self.accumulators.read::<[u32; 4]>(idx as usize);

        self.accumulators.write(idx as usize, [0u32; 4]);

        if n == 0 {
            return;
        }

        let mean = vec3(r as f32, g as f32, b as f32)
            / (RADIANCE_FIXED_POINT * n as f32);

        let old = self.values.read::<Vec4>(idx as usize);
        let count = (old.w + 1.0).min(self.params.max_sample_count);
        let value = lerp(old.xyz(), mean, 1.0 / count);

        self.values.write(idx as usize, value.extend(count));

        if self.params.debug_propagate != 0 {
            self.propagate(idx, value.extend(count));
        }
    }

    /// Copies value of given cell into the cells it covers at finer mips.
    fn propagate(&self, idx: u32, value: Vec4) {
        let (tile, mip, cell) = self.params.decode_cell_index(idx);

        for finer in 0..mip {
            let scale = self.params.size_tile_mip[finer]
                / self.params.size_tile_mip[mip].max(1);

            for dy in 0..scale {
                for dx in 0..scale {
                    let finer_cell = cell * scale + UVec2::new(dx, dy);
                    let size = self.params.size_tile_mip[finer];

                    if finer_cell.x >= size || finer_cell.y >= size {
                        continue;
                    }

                    let finer_idx = tile * self.params.num_cells_per_tile
                        + self.params.first_cell_offset_tile_mip[finer]
                        + finer_cell.y * size
                        + finer_cell.x;

                    self.values.write(finer_idx as usize, value);
                }
            }
        }
    }

    /// Returns cached radiance of given cell, reading from the finest mip
    /// that has got enough samples.
    pub fn resolve(&self, tile: u32, cell: UVec2) -> HashGridSample {
        let threshold = (self.params.max_sample_count / 4.0).max(1.0);
        let mut best = HashGridSample::default();

        for mip in self.params.first_mip()..HASH_GRID_MIPS {
            let value = self.read_cell(self.params.cell_index(tile, mip, cell));

            let sample = HashGridSample {
                radiance: value.xyz(),
                sample_count: value.w,
                mip: mip as u32,
            };

            if sample.sample_count >= threshold {
                return sample;
            }

            if sample.sample_count > best.sample_count {
                best = sample;
            }
        }

        best
    }

    /// Looks up radiance at given surface point without allocating anything.
    pub fn lookup(
        &self,
        position: Vec3,
        normal: Vec3,
        eye: Vec3,
    ) -> Option<HashGridSample> {
        let location = self.params.locate(position, normal, eye);
        let tile = self.find(location.key)?;

        Some(self.resolve(tile, location.cell))
    }

    pub fn read_cell(&self, idx: u32) -> Vec4 {
        self.values.read(idx as usize)
    }
}
