use core::f32::consts::PI;

use glam::{Vec3, Vec4};

use crate::{
    scale_level, Camera, F32Ext, HashGrid, HashGridKey, IndirectReservoir,
    IndirectSample, Noise, Ray, ReservoirCacheParams, SceneQuery,
    ShadingParams, Storage, U32Ext, Vec3Ext, VisibilityRay, INVALID_ID,
    SKY_DISTANCE,
};

const MAX_OWN_CANDIDATES: u32 = 8;
const MAX_NEIGHBOUR_CANDIDATES: u32 = 4;
const MAX_TEMPORAL_CANDIDATES: u32 = 4;

/// Device-side view of the reservoir hash: entries keyed the same way as the
/// hash grid's tiles, each owning a dense range of ray indices.
#[derive(Clone, Copy)]
pub struct ReservoirCache<'a> {
    pub params: &'a ReservoirCacheParams,

    /// Key of each entry.
    pub hash: Storage<'a>,

    /// Rays registered in each entry this frame.
    pub counts: Storage<'a>,

    /// Exclusive prefix sum of `counts`.
    pub offsets: Storage<'a>,

    /// Ray indices, grouped by entry.
    pub indices: Storage<'a>,
}

impl<'a> ReservoirCache<'a> {
    pub fn key(&self, position: Vec3, normal: Vec3, eye: Vec3) -> HashGridKey {
        let (level, cell_size) = scale_level(
            self.params.cell_size,
            self.params.min_cell_size,
            position.distance(eye),
        );

        HashGridKey::pack(
            (position / cell_size).floor().as_ivec3(),
            normal.dominant_axis(),
            level,
        )
    }

    pub fn find(&self, key: HashGridKey) -> Option<u32> {
        let base = self.bucket_of(key);

        (base..base + self.params.num_entries_per_cell)
            .find(|&entry| self.hash.load(entry as usize) == key.0)
    }

    /// Returns the entry holding given key, claiming a free one if absent;
    /// returns `None` when the cell's entries are all taken.
    pub fn find_or_insert(&self, key: HashGridKey) -> Option<u32> {
        let base = self.bucket_of(key);

        for entry in base..base + self.params.num_entries_per_cell {
            let prev = self.hash.atomic_cas(entry as usize, 0, key.0);

            if prev == 0 || prev == key.0 {
                return Some(entry);
            }
        }

        None
    }

    /// Returns `(first, count)` of the ray indices registered in given entry.
    pub fn candidates(&self, entry: u32) -> (u32, u32) {
        (
            self.offsets.load(entry as usize),
            self.counts.load(entry as usize),
        )
    }

    fn bucket_of(&self, key: HashGridKey) -> u32 {
        (key.0.hash() & (self.params.num_cells - 1))
            * self.params.num_entries_per_cell
    }
}

pub struct ReservoirCacheClear<'a> {
    pub cache: ReservoirCache<'a>,
}

impl<'a> ReservoirCacheClear<'a> {
    pub fn run(self, entry: u32) {
        self.cache.hash.store(entry as usize, 0);
        self.cache.counts.store(entry as usize, 0);
    }
}

/// Traces visibility rays, producing one indirect sample per ray.
pub struct ReservoirCacheGenerate<'a> {
    pub camera: &'a Camera,
    pub scene: &'a dyn SceneQuery,
    pub shading: &'a ShadingParams,
    pub grid: HashGrid<'a>,
    pub cache: ReservoirCache<'a>,
    pub rays: Storage<'a>,
    pub radiance: Storage<'a>,
    pub reservoirs: Storage<'a>,

    /// `[entry, index within entry]` of each ray.
    pub ray_entries: Storage<'a>,
}

impl<'a> ReservoirCacheGenerate<'a> {
    pub fn run(self, idx: u32) {
        let ray: VisibilityRay = self.rays.read(idx as usize);
        let eye = self.camera.position();

        let hit = self.scene.intersect(
            Ray::new(ray.origin, ray.direction),
            self.shading.ray_flags(),
        );

        let (radiance, position, normal) = if let Some(hit) = hit {
            let (emitted, albedo) = self.shading.shade(self.scene, &hit);
            let normal = hit.facing_normal(ray.direction);

            let cached = self
                .grid
                .lookup(hit.position, normal, eye)
                .map(|sample| sample.radiance)
                .unwrap_or_default();

            (emitted + albedo * cached, hit.position, normal)
        } else {
            (
                self.scene.sky(ray.direction),
                ray.origin + ray.direction * SKY_DISTANCE,
                -ray.direction,
            )
        };

        self.radiance.write(idx as usize, radiance.extend(1.0));

        let sample = IndirectSample {
            position,
            normal,
            radiance,
            source_pdf: ray.normal.dot(ray.direction).max(0.0) / PI,
        };

        let mut reservoir = IndirectReservoir {
            sample,
            count: 1.0,
            ..Default::default()
        };

        let target_pdf = sample.target_pdf(ray.origin, ray.normal);

        reservoir.weight_sum = (target_pdf / sample.source_pdf).as_weight();
        reservoir.finalize(target_pdf);
        reservoir.write(self.reservoirs, idx as usize);

        let mut entry = [INVALID_ID, 0];

        if self.cache.params.use_resampling != 0 {
            let key = self.cache.key(ray.origin, ray.normal, eye);

            if let Some(id) = self.cache.find_or_insert(key) {
                entry = [id, self.cache.counts.atomic_add(id as usize, 1)];
            }
        }

        self.ray_entries.write(idx as usize, entry);
    }
}

/// Scatters ray indices into the dense ranges of their entries.
pub struct ReservoirCacheCompact<'a> {
    pub cache: ReservoirCache<'a>,
    pub ray_entries: Storage<'a>,
}

impl<'a> ReservoirCacheCompact<'a> {
    pub fn run(self, idx: u32) {
        let [entry, local] = self.ray_entries.read::<[u32; 2]>(idx as usize);

        if entry == INVALID_ID {
            return;
        }

        let (first, _) = self.cache.candidates(entry);

        self.cache.indices.store((first + local) as usize, idx);
    }
}

/// Resamples each ray's radiance out of candidates gathered by rays that
/// started nearby: in the same cell, in a neighbouring cell and in the same
/// cell during the previous frame.
pub struct ReservoirCacheResample<'a> {
    pub camera: &'a Camera,
    pub seed: u32,
    pub cache: ReservoirCache<'a>,
    pub prev_cache: ReservoirCache<'a>,
    pub rays: Storage<'a>,
    pub reservoirs: Storage<'a>,
    pub prev_reservoirs: Storage<'a>,
    pub ray_entries: Storage<'a>,
    pub resampled: Storage<'a>,
}

impl<'a> ReservoirCacheResample<'a> {
    pub fn run(self, idx: u32) {
        let ray: VisibilityRay = self.rays.read(idx as usize);
        let eye = self.camera.position();
        let mut noise = Noise::from_index(self.seed, idx);

        // Each candidate gets re-weighted by the target function as seen
        // from this ray's origin, so all of the partial reservoirs below can
        // be combined into one
        let merge = |reservoir: &mut IndirectReservoir,
                     noise: &mut Noise,
                     candidate: IndirectReservoir| {
            let pdf = candidate.sample.target_pdf(ray.origin, ray.normal);

            reservoir.merge(noise, &candidate, pdf);
        };

        let mut reservoir = IndirectReservoir::default();

        merge(
            &mut reservoir,
            &mut noise,
            IndirectReservoir::read(self.reservoirs, idx as usize),
        );

        // ---

        let [entry, _] = self.ray_entries.read::<[u32; 2]>(idx as usize);

        if entry != INVALID_ID {
            for candidate in self.candidates(
                &mut noise,
                self.cache,
                self.reservoirs,
                entry,
                MAX_OWN_CANDIDATES,
            ) {
                merge(&mut reservoir, &mut noise, candidate);
            }
        }

        // ---

        let mut spatial = IndirectReservoir::default();

        let neighbour = {
            let (t, b) = ray.normal.orthonormal_basis();
            let offset = noise.sample_disk();

            let (_, cell_size) = scale_level(
                self.cache.params.cell_size,
                self.cache.params.min_cell_size,
                ray.origin.distance(eye),
            );

            ray.origin + (t * offset.x + b * offset.y) * cell_size
        };

        if let Some(neighbour) = self
            .cache
            .find(self.cache.key(neighbour, ray.normal, eye))
            .filter(|&neighbour| neighbour != entry)
        {
            for candidate in self.candidates(
                &mut noise,
                self.cache,
                self.reservoirs,
                neighbour,
                MAX_NEIGHBOUR_CANDIDATES,
            ) {
                merge(&mut spatial, &mut noise, candidate);
            }
        }

        reservoir.combine(&mut noise, &spatial);

        // ---

        let mut temporal = IndirectReservoir::default();

        if let Some(prev) = self
            .prev_cache
            .find(self.prev_cache.key(ray.origin, ray.normal, eye))
        {
            for candidate in self.candidates(
                &mut noise,
                self.prev_cache,
                self.prev_reservoirs,
                prev,
                MAX_TEMPORAL_CANDIDATES,
            ) {
                merge(&mut temporal, &mut noise, candidate);
            }
        }

        // Previous frame's samples might have gone stale, so they can't
        // outweigh what this frame has found
        temporal.clamp_count(reservoir.count.max(1.0));
        reservoir.combine(&mut noise, &temporal);

        // ---

        if reservoir.is_empty() {
            self.resampled.write(idx as usize, Vec4::W);
            return;
        }

        let sample = reservoir.sample;

        reservoir.finalize(sample.target_pdf(ray.origin, ray.normal));

        let radiance =
            sample.contribution(ray.origin, ray.normal) * reservoir.weight;

        self.resampled.write(idx as usize, radiance.extend(1.0));
    }

    /// Picks (with replacement) up to `max` samples registered in given
    /// entry.
    fn candidates(
        &self,
        noise: &mut Noise,
        cache: ReservoirCache<'a>,
        reservoirs: Storage<'a>,
        entry: u32,
        max: u32,
    ) -> impl Iterator<Item = IndirectReservoir> + 'a {
        let (first, count) = cache.candidates(entry);

        let picks: [u32; 8] = core::array::from_fn(|_| noise.sample_range(count));

        picks
            .into_iter()
            .take(count.min(max) as usize)
            .map(move |pick| {
                let ray = cache.indices.load((first + pick) as usize);

                IndirectReservoir::read(reservoirs, ray as usize)
            })
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::AtomicU32;

    use approx::assert_relative_eq;
    use glam::{vec3, vec4};

    use super::*;

    fn words(len: usize) -> Vec<AtomicU32> {
        (0..len).map(|_| AtomicU32::new(0)).collect()
    }

    #[test]
    fn entries() {
        let params = ReservoirCacheParams {
            cell_size: 0.01,
            min_cell_size: 0.1,
            num_cells: 4,
            num_entries_per_cell: 2,
            use_resampling: 1,
        };

        let hash = words(8);
        let counts = words(8);
        let offsets = words(8);
        let indices = words(8);

        let cache = ReservoirCache {
            params: &params,
            hash: Storage::new(&hash),
            counts: Storage::new(&counts),
            offsets: Storage::new(&offsets),
            indices: Storage::new(&indices),
        };

        let eye = vec3(0.0, 5.0, 0.0);
        let a = cache.key(vec3(1.0, 0.0, 1.0), Vec3::Y, eye);
        let b = cache.key(vec3(1.01, 0.0, 1.0), Vec3::Y, eye);
        let c = cache.key(vec3(1.0, 0.0, 1.0), Vec3::X, eye);

        assert_eq!(a, b);
        assert_ne!(a, c);

        // ---
        // Case 1: insertion is idempotent

        let entry = cache.find_or_insert(a).unwrap();

        assert_eq!(Some(entry), cache.find_or_insert(a));
        assert_eq!(Some(entry), cache.find(a));
        assert_eq!(None, cache.find(c));

        // ---
        // Case 2: clearing forgets the entry

        for entry in 0..8 {
            ReservoirCacheClear { cache }.run(entry);
        }

        assert_eq!(None, cache.find(a));
    }

    #[test]
    fn resample() {
        let params = ReservoirCacheParams {
            cell_size: 0.01,
            min_cell_size: 0.1,
            num_cells: 4,
            num_entries_per_cell: 2,
            use_resampling: 1,
        };

        let camera = Camera {
            origin: vec4(0.0, 5.0, 0.0, 1.0),
            ..Default::default()
        };

        let buffers: Vec<Vec<AtomicU32>> = (0..8).map(|_| words(64)).collect();
        let prev_buffers: Vec<Vec<AtomicU32>> = (0..4).map(|_| words(8)).collect();

        fn view<'a>(
            params: &'a ReservoirCacheParams,
            buffers: &'a [Vec<AtomicU32>],
        ) -> ReservoirCache<'a> {
            ReservoirCache {
                params,
                hash: Storage::new(&buffers[0]),
                counts: Storage::new(&buffers[1]),
                offsets: Storage::new(&buffers[2]),
                indices: Storage::new(&buffers[3]),
            }
        }

        let cache = view(&params, &buffers);
        let prev_cache = view(&params, &prev_buffers);
        let rays = Storage::new(&buffers[4]);
        let reservoirs = Storage::new(&buffers[5]);
        let ray_entries = Storage::new(&buffers[6]);
        let resampled = Storage::new(&buffers[7]);
        let prev_reservoirs_words = words(16);
        let prev_reservoirs = Storage::new(&prev_reservoirs_words);

        let origin = vec3(1.0, 0.0, 1.0);
        let eye = camera.position();

        // Ray 0 has found a bright sample right above its origin, rays 1 and
        // 2 have found nothing; ray 2 lies far away from the others
        for (idx, radiance, origin) in [
            (0, Vec3::ONE, origin),
            (1, Vec3::ZERO, origin),
            (2, Vec3::ZERO, vec3(50.0, 0.0, 50.0)),
        ] {
            rays.write(
                idx,
                VisibilityRay {
                    origin,
                    normal: Vec3::Y,
                    direction: Vec3::Y,
                    ..Default::default()
                },
            );

            let sample = IndirectSample {
                position: origin + Vec3::Y,
                normal: -Vec3::Y,
                radiance,
                source_pdf: 1.0 / PI,
            };

            let target_pdf = sample.target_pdf(origin, Vec3::Y);

            let mut reservoir = IndirectReservoir {
                sample,
                count: 1.0,
                weight_sum: target_pdf / sample.source_pdf,
                ..Default::default()
            };

            reservoir.finalize(target_pdf);
            reservoir.write(reservoirs, idx);
        }

        // Rays 0 and 1 share an entry that lists ray 0 twice; ray 2 hasn't
        // got any entry
        let entry = cache.find_or_insert(cache.key(origin, Vec3::Y, eye)).unwrap();

        cache.counts.store(entry as usize, 2);
        cache.indices.store(0, 0);
        cache.indices.store(1, 0);
        ray_entries.write(0, [entry, 0]);
        ray_entries.write(1, [entry, 1]);
        ray_entries.write(2, [INVALID_ID, 0]);

        let run = |idx| {
            ReservoirCacheResample {
                camera: &camera,
                seed: 123,
                cache,
                prev_cache,
                rays,
                reservoirs,
                prev_reservoirs,
                ray_entries,
                resampled,
            }
            .run(idx);

            resampled.read::<Vec4>(idx as usize)
        };

        // ---
        // Case 1: ray picks up its neighbour's sample; out of three
        // candidates two are bright

        let radiance = run(1);

        assert_relative_eq!(2.0 / 3.0, radiance.x, epsilon = 1e-5);
        assert_relative_eq!(2.0 / 3.0, radiance.y, epsilon = 1e-5);
        assert_eq!(1.0, radiance.w);

        // ---
        // Case 2: ray without any candidates stays black

        assert_eq!(Vec4::W, run(2));

        // ---
        // Case 3: ray with three bright candidates keeps its radiance

        let radiance = run(0);

        assert_relative_eq!(1.0, radiance.z, epsilon = 1e-5);
    }
}
