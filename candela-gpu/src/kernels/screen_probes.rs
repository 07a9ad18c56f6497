use glam::{ivec2, uvec2, vec2, IVec2, UVec2, Vec3, Vec4, Vec4Swizzles};

use crate::{
    lerp, Camera, GBufferMap, HashGrid, Noise, Octahedral, ProbeData,
    ProbeRay, ProbeRayHit, ProbeState, Ray, SceneQuery, ScreenProbesParams,
    ShadingParams, Sh9, Storage, Tex, VisibilityRay, INVALID_ID, PROBE_SIZE,
    PROBE_TEXELS, RAY_EPSILON,
};

/// Number of frames a probe texel keeps averaging samples over.
pub const PROBE_MAX_HISTORY: f32 = 4.0;

/// Minimum similarity for one probe to stand in for another.
const PROBE_SIMILARITY_THRESHOLD: f32 = 0.5;

fn texel_pos(tile: UVec2, texel: u32) -> UVec2 {
    tile * PROBE_SIZE + uvec2(texel % PROBE_SIZE, texel / PROBE_SIZE)
}

fn copy_texels(src: Tex, src_tile: UVec2, dst: Tex, dst_tile: UVec2) {
    for texel in 0..PROBE_TEXELS {
        dst.write(
            texel_pos(dst_tile, texel),
            src.read(texel_pos(src_tile, texel)),
        );
    }
}

/// Places each tile's probe on the surface seen through (a jittered pixel
/// of) the tile and tries to carry over last frame's probe.
pub struct ScreenProbesReproject<'a> {
    pub camera: &'a Camera,
    pub params: &'a ScreenProbesParams,
    pub seed: u32,
    pub gbuffer: GBufferMap<'a>,
    pub probes: Storage<'a>,
    pub prev_probes: Storage<'a>,
    pub radiance: Tex<'a>,
    pub prev_radiance: Tex<'a>,
    pub mask: Tex<'a>,
    pub prev_mask: Tex<'a>,
    pub lru_flags: Storage<'a>,
}

impl<'a> ScreenProbesReproject<'a> {
    pub fn run(self, tile: UVec2) {
        let idx = self.params.tile_to_idx(tile);
        let jitter = Noise::new(self.seed, tile).sample_range(PROBE_TEXELS);
        let screen_size = self.camera.screen_size();

        // Prefer the jittered pixel, but fall back to any other pixel of the
        // tile that sees a surface
        let surface = (0..PROBE_TEXELS)
            .map(|offset| texel_pos(tile, (jitter + offset) % PROBE_TEXELS))
            .filter(|pixel| pixel.x < screen_size.x && pixel.y < screen_size.y)
            .map(|pixel| self.gbuffer.get(pixel))
            .find(|surface| surface.is_some());

        let Some(surface) = surface else {
            let probe = ProbeData {
                slot: INVALID_ID,
                ..Default::default()
            };

            self.clear(idx, tile, probe);
            return;
        };

        let mut probe = ProbeData::from_surface(&surface);

        let prev_tile = (self.camera.prev_world_to_screen(surface.position)
            / (PROBE_SIZE as f32))
            .floor()
            .as_ivec2();

        if self.params.contains(prev_tile) {
            let prev_tile = prev_tile.as_uvec2();

            let prev_probe = ProbeData::read(
                self.prev_probes,
                self.params.tile_to_idx(prev_tile),
            );

            let is_valid = self.prev_mask.read(prev_tile).x > 0.0
                && prev_probe.similarity_to(&probe) > PROBE_SIMILARITY_THRESHOLD;

            if is_valid {
                copy_texels(self.prev_radiance, prev_tile, self.radiance, tile);

                probe.state = ProbeState::Reprojected as u32;
                probe.slot = prev_probe.slot;
                probe.write(self.probes, idx);

                self.mask.write(tile, Vec4::ONE);

                if probe.has_slot() {
                    self.lru_flags.store(probe.slot as usize, 1);
                }

                return;
            }
        }

        self.clear(idx, tile, probe);
    }

    fn clear(&self, idx: u32, tile: UVec2, probe: ProbeData) {
        probe.write(self.probes, idx);

        self.mask.write(tile, Vec4::ZERO);

        for texel in 0..PROBE_TEXELS {
            self.radiance.write(texel_pos(tile, texel), Vec4::ZERO);
        }
    }
}

/// Counts, for each screen tile, the cached probes that project into it.
pub struct ScreenProbesLookupCount<'a> {
    pub camera: &'a Camera,
    pub params: &'a ScreenProbesParams,
    pub probes: Storage<'a>,
    pub cached_probes: Storage<'a>,
    pub tile_counts: Storage<'a>,

    /// `[tile, index within tile]` of each cache slot.
    pub slot_targets: Storage<'a>,
}

impl<'a> ScreenProbesLookupCount<'a> {
    pub fn run(self, slot: u32) {
        let target = self.target(slot).map(|tile| {
            [tile, self.tile_counts.atomic_add(tile as usize, 1)]
        });

        self.slot_targets
            .write(slot as usize, target.unwrap_or([INVALID_ID, 0]));
    }

    fn target(&self, slot: u32) -> Option<u32> {
        let cached = ProbeData::read(self.cached_probes, slot);

        if cached.state() != ProbeState::Cached {
            return None;
        }

        let tile = (self.camera.world_to_screen(cached.position)
            / (PROBE_SIZE as f32))
            .floor()
            .as_ivec2();

        if !self.params.contains(tile) {
            return None;
        }

        let idx = self.params.tile_to_idx(tile.as_uvec2());
        let probe = ProbeData::read(self.probes, idx);

        let is_wanted = probe.is_some()
            && probe.state() == ProbeState::Empty
            && cached.similarity_to(&probe) > PROBE_SIMILARITY_THRESHOLD;

        if is_wanted {
            Some(idx)
        } else {
            None
        }
    }
}

pub struct ScreenProbesLookupScatter<'a> {
    pub tile_offsets: Storage<'a>,
    pub slot_targets: Storage<'a>,
    pub tile_slots: Storage<'a>,
}

impl<'a> ScreenProbesLookupScatter<'a> {
    pub fn run(self, slot: u32) {
        let [tile, local] = self.slot_targets.read::<[u32; 2]>(slot as usize);

        if tile != INVALID_ID {
            let first = self.tile_offsets.load(tile as usize);

            self.tile_slots.store((first + local) as usize, slot);
        }
    }
}

/// Lets empty tiles adopt the best matching cached probe; tiles that find
/// none land on the empty list.
pub struct ScreenProbesLookupResolve<'a> {
    pub params: &'a ScreenProbesParams,
    pub probes: Storage<'a>,
    pub cached_probes: Storage<'a>,
    pub cached_radiance: Tex<'a>,
    pub radiance: Tex<'a>,
    pub mask: Tex<'a>,
    pub tile_counts: Storage<'a>,
    pub tile_offsets: Storage<'a>,
    pub tile_slots: Storage<'a>,
    pub lru_flags: Storage<'a>,
    pub empty_tiles: Storage<'a>,
    pub empty_count: Storage<'a>,
}

impl<'a> ScreenProbesLookupResolve<'a> {
    pub fn run(self, tile: UVec2) {
        let idx = self.params.tile_to_idx(tile);
        let mut probe = ProbeData::read(self.probes, idx);

        if !probe.is_some() || probe.state() != ProbeState::Empty {
            return;
        }

        let first = self.tile_offsets.load(idx as usize);
        let count = self.tile_counts.load(idx as usize);
        let mut best: Option<(u32, f32)> = None;

        for slot in (first..first + count)
            .map(|slot_idx| self.tile_slots.load(slot_idx as usize))
        {
            let score = ProbeData::read(self.cached_probes, slot)
                .similarity_to(&probe);

            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((slot, score));
            }
        }

        if let Some((slot, _)) = best {
            copy_texels(
                self.cached_radiance,
                self.params.idx_to_tile(slot),
                self.radiance,
                tile,
            );

            probe.state = ProbeState::Reprojected as u32;
            probe.slot = slot;
            probe.write(self.probes, idx);

            self.mask.write(tile, Vec4::ONE);
            self.lru_flags.store(slot as usize, 1);
        } else {
            let empty = self.empty_count.atomic_add(0, 1);

            self.empty_tiles.store(empty as usize, idx);
        }
    }
}

/// Spawns one probe per spawn tile, rotating through its four probe tiles
/// frame by frame.
pub struct ScreenProbesSpawn<'a> {
    pub params: &'a ScreenProbesParams,
    pub frame: u32,
    pub probes: Storage<'a>,
    pub spawn_tiles: Storage<'a>,
    pub spawn_count: Storage<'a>,

    /// Spawns that only refresh an already valid probe; patching can take
    /// them over.
    pub overrides: Storage<'a>,
    pub override_count: Storage<'a>,
}

impl<'a> ScreenProbesSpawn<'a> {
    pub fn run(self, spawn_tile: UVec2) {
        let rotation = self.frame % 4;
        let tile = spawn_tile * 2 + uvec2(rotation & 1, rotation >> 1);

        if !self.params.contains(tile.as_ivec2()) {
            return;
        }

        let idx = self.params.tile_to_idx(tile);
        let probe = ProbeData::read(self.probes, idx);

        if !probe.is_some() {
            return;
        }

        let spawn = self.spawn_count.atomic_add(0, 1);

        self.spawn_tiles.store(spawn as usize, idx);

        if probe.state() != ProbeState::Empty {
            let slot = self.override_count.atomic_add(0, 1);

            self.overrides.store(slot as usize, spawn);
        }

        ProbeData::store_state(self.probes, idx, ProbeState::Spawned);
    }
}

/// Spawns probes for tiles that are still empty, using whatever spawn
/// capacity is left and, once that runs out, taking over refresh spawns.
pub struct ScreenProbesPatch<'a> {
    pub params: &'a ScreenProbesParams,
    pub seed: u32,
    pub probes: Storage<'a>,
    pub empty_tiles: Storage<'a>,
    pub empty_count: Storage<'a>,
    pub spawn_tiles: Storage<'a>,
    pub spawn_count: Storage<'a>,
    pub patch_count: Storage<'a>,
    pub overrides: Storage<'a>,
    pub override_count: Storage<'a>,
    pub override_cursor: Storage<'a>,
}

impl<'a> ScreenProbesPatch<'a> {
    pub fn run(self, empty_idx: u32) {
        let idx = self.empty_tiles.load(empty_idx as usize);
        let probe = ProbeData::read(self.probes, idx);

        if probe.state() != ProbeState::Empty {
            return;
        }

        let mut noise = Noise::from_index(self.seed, empty_idx);
        let spawned = self.spawn_count.load(0);
        let spare = self.params.max_probe_spawn_count.saturating_sub(spawned);
        let empty = self.empty_count.load(0).max(1);

        if spare > 0 && noise.sample() * (empty as f32) < spare as f32 {
            let claim = self.patch_count.atomic_add(0, 1);

            if claim < spare {
                self.spawn_tiles.store((spawned + claim) as usize, idx);

                ProbeData::store_state(self.probes, idx, ProbeState::Spawned);

                return;
            }
        }

        let cursor = self.override_cursor.atomic_add(0, 1);

        if cursor < self.override_count.load(0) {
            let spawn = self.overrides.load(cursor as usize);
            let prev_idx = self.spawn_tiles.load(spawn as usize);

            self.spawn_tiles.store(spawn as usize, idx);

            ProbeData::store_state(
                self.probes,
                prev_idx,
                ProbeState::Reprojected,
            );

            ProbeData::store_state(self.probes, idx, ProbeState::Spawned);
        }
    }
}

/// Folds patched probes into the spawn count and sizes the ray batch; runs
/// as a single work item.
pub struct ScreenProbesFinalizeSpawn<'a> {
    pub params: &'a ScreenProbesParams,
    pub spawn_count: Storage<'a>,
    pub patch_count: Storage<'a>,
    pub ray_count: Storage<'a>,
}

impl<'a> ScreenProbesFinalizeSpawn<'a> {
    pub fn run(self, _: u32) {
        let spawned = self.spawn_count.load(0);
        let spare = self.params.max_probe_spawn_count.saturating_sub(spawned);
        let total = spawned + self.patch_count.load(0).min(spare);

        self.spawn_count.store(0, total);
        self.ray_count.store(0, total * PROBE_TEXELS);
    }
}

/// Generates one ray per octahedral texel of each spawned probe.
pub struct ScreenProbesSample<'a> {
    pub seed: u32,
    pub probes: Storage<'a>,
    pub spawn_tiles: Storage<'a>,
    pub rays: Storage<'a>,
}

impl<'a> ScreenProbesSample<'a> {
    pub fn run(self, ray_idx: u32) {
        let spawn = ray_idx / PROBE_TEXELS;
        let texel = ray_idx % PROBE_TEXELS;
        let idx = self.spawn_tiles.load(spawn as usize);
        let probe = ProbeData::read(self.probes, idx);
        let mut noise = Noise::from_index(self.seed, ray_idx);

        let direction = Octahedral::texel_direction_at(
            uvec2(texel % PROBE_SIZE, texel / PROBE_SIZE),
            vec2(noise.sample(), noise.sample()),
            PROBE_SIZE,
        );

        self.rays.write(
            ray_idx as usize,
            ProbeRay {
                direction,
                active: (probe.normal.dot(direction) > 0.0) as u32,
            },
        );

        if texel == 0 {
            ProbeData::store_state(self.probes, idx, ProbeState::Sampled);
        }
    }
}

/// Traces probe rays; hits get a hash grid cell (allocated if needed) whose
/// radiance will be resolved later, plus a visibility ray that brings new
/// radiance into that cell.
pub struct ScreenProbesPopulate<'a> {
    pub camera: &'a Camera,
    pub scene: &'a dyn SceneQuery,
    pub shading: &'a ShadingParams,
    pub grid: HashGrid<'a>,
    pub probes: Storage<'a>,
    pub spawn_tiles: Storage<'a>,
    pub rays: Storage<'a>,
    pub hits: Storage<'a>,
    pub visibility_rays: Storage<'a>,
    pub visibility_count: Storage<'a>,
}

impl<'a> ScreenProbesPopulate<'a> {
    pub fn run(self, ray_idx: u32) {
        let spawn = ray_idx / PROBE_TEXELS;
        let idx = self.spawn_tiles.load(spawn as usize);

        if ray_idx % PROBE_TEXELS == 0 {
            ProbeData::store_state(self.probes, idx, ProbeState::Populated);
        }

        let ray: ProbeRay = self.rays.read(ray_idx as usize);

        if ray.active == 0 {
            self.hits.write(ray_idx as usize, ProbeRayHit::default());
            return;
        }

        let probe = ProbeData::read(self.probes, idx);

        let hit = self.scene.intersect(
            Ray::from_surface(probe.position, probe.normal, ray.direction),
            self.shading.ray_flags(),
        );

        let Some(hit) = hit else {
            self.hits.write(
                ray_idx as usize,
                ProbeRayHit {
                    emitted: self.scene.sky(ray.direction),
                    ..Default::default()
                },
            );

            return;
        };

        let (emitted, albedo) = self.shading.shade(self.scene, &hit);
        let normal = hit.facing_normal(ray.direction);

        let location = self.grid.params.locate(
            hit.position,
            normal,
            self.camera.position(),
        );

        let cell = VisibilityRay::pack_cell(location.cell);
        let tile = self.grid.find_or_insert(location.key);

        if let Some(tile) = tile {
            let mut noise = Noise::from_index(self.shading.seed, ray_idx);
            let slot = self.visibility_count.atomic_add(0, 1);

            self.visibility_rays.write(
                slot as usize,
                VisibilityRay {
                    origin: hit.position + normal * RAY_EPSILON,
                    tile,
                    normal,
                    cell,
                    direction: noise.sample_cosine_hemisphere(normal),
                    query: ray_idx,
                },
            );
        }

        self.hits.write(
            ray_idx as usize,
            ProbeRayHit {
                emitted,
                tile: tile.unwrap_or(INVALID_ID),
                albedo,
                cell,
            },
        );
    }
}

/// Blends resolved radiance into probes and stores the probes into the cache
/// slots at the tail of the LRU list.
pub struct ScreenProbesBlend<'a> {
    pub params: &'a ScreenProbesParams,
    pub probes: Storage<'a>,
    pub spawn_tiles: Storage<'a>,
    pub rays: Storage<'a>,
    pub ray_radiance: Storage<'a>,
    pub radiance: Tex<'a>,
    pub mask: Tex<'a>,
    pub cached_probes: Storage<'a>,
    pub cached_radiance: Tex<'a>,
    pub lru: Storage<'a>,
    pub lru_flags: Storage<'a>,
}

impl<'a> ScreenProbesBlend<'a> {
    pub fn run(self, ray_idx: u32) {
        let spawn = ray_idx / PROBE_TEXELS;
        let texel = ray_idx % PROBE_TEXELS;
        let idx = self.spawn_tiles.load(spawn as usize);
        let tile = self.params.idx_to_tile(idx);
        let pos = texel_pos(tile, texel);

        let slot = self
            .lru
            .load((self.params.max_probe_count - 1 - spawn) as usize);

        let ray: ProbeRay = self.rays.read(ray_idx as usize);
        let mut value = self.radiance.read(pos);

        if ray.active != 0 {
            let sample = self
                .ray_radiance
                .read::<Vec4>(ray_idx as usize)
                .xyz();

            let count = (value.w + 1.0).min(PROBE_MAX_HISTORY);

            value = lerp(value.xyz(), sample, 1.0 / count).extend(count);

            self.radiance.write(pos, value);
        }

        self.cached_radiance
            .write(texel_pos(self.params.idx_to_tile(slot), texel), value);

        if texel == 0 {
            let mut probe = ProbeData::read(self.probes, idx);

            probe.slot = slot;
            probe.state = ProbeState::Blended as u32;
            probe.write(self.probes, idx);

            ProbeData {
                state: ProbeState::Cached as u32,
                ..probe
            }
            .write(self.cached_probes, slot);

            self.mask.write(tile, Vec4::ONE);
            self.lru_flags.store(slot as usize, 1);
        }
    }
}

/// Gathers the used-flags of cache slots in the order of the LRU list.
pub struct ScreenProbesGatherLruFlags<'a> {
    pub lru: Storage<'a>,
    pub lru_flags: Storage<'a>,
    pub ordered_flags: Storage<'a>,
}

impl<'a> ScreenProbesGatherLruFlags<'a> {
    pub fn run(self, idx: u32) {
        let slot = self.lru.load(idx as usize);
        let flag = self.lru_flags.load(slot as usize).min(1);

        self.ordered_flags.store(idx as usize, flag);
    }
}

/// Stable partition of the LRU list, slots used this frame first; `offsets`
/// is the exclusive prefix sum of `ordered_flags`.
pub struct ScreenProbesReorderLru<'a> {
    pub params: &'a ScreenProbesParams,
    pub lru: Storage<'a>,
    pub ordered_flags: Storage<'a>,
    pub offsets: Storage<'a>,
    pub next_lru: Storage<'a>,
}

impl<'a> ScreenProbesReorderLru<'a> {
    pub fn run(self, idx: u32) {
        let last = (self.params.max_probe_count - 1) as usize;
        let used = self.offsets.load(last) + self.ordered_flags.load(last);
        let offset = self.offsets.load(idx as usize);

        let dst = if self.ordered_flags.load(idx as usize) != 0 {
            offset
        } else {
            used + idx - offset
        };

        self.next_lru
            .store(dst as usize, self.lru.load(idx as usize));
    }
}

/// Builds one mip of the probe mask out of the previous one.
pub struct ScreenProbesFilterMask<'a> {
    pub src: Tex<'a>,
    pub dst: Tex<'a>,
}

impl<'a> ScreenProbesFilterMask<'a> {
    pub fn run(self, pos: UVec2) {
        let mut sum = 0.0;
        let mut count = 0.0;

        for offset in [uvec2(0, 0), uvec2(1, 0), uvec2(0, 1), uvec2(1, 1)] {
            let child = pos * 2 + offset;

            if self.src.contains(child) {
                sum += self.src.read(child).x;
                count += 1.0;
            }
        }

        let value = if count > 0.0 { sum / count } else { 0.0 };

        self.dst.write(pos, Vec4::splat(value));
    }
}

/// One axis of the separable filter that averages each texel with the same
/// texel of neighbouring, similar probes.
pub struct ScreenProbesFilter<'a> {
    pub params: &'a ScreenProbesParams,
    pub probes: Storage<'a>,
    pub mask: Tex<'a>,
    pub src: Tex<'a>,
    pub dst: Tex<'a>,
    pub axis: IVec2,
}

impl<'a> ScreenProbesFilter<'a> {
    pub fn run(self, pos: UVec2) {
        let tile = pos / PROBE_SIZE;
        let texel = pos % PROBE_SIZE;
        let center = self.src.read(pos);

        if self.mask.read(tile).x <= 0.0 {
            self.dst.write(pos, center);
            return;
        }

        let probe =
            ProbeData::read(self.probes, self.params.tile_to_idx(tile));

        let mut sum = center.xyz();
        let mut weights = 1.0;

        for step in [-1, 1] {
            let neighbour = tile.as_ivec2() + self.axis * step;

            if !self.params.contains(neighbour) {
                continue;
            }

            let neighbour = neighbour.as_uvec2();

            if self.mask.read(neighbour).x <= 0.0 {
                continue;
            }

            let weight = 0.5
                * ProbeData::read(
                    self.probes,
                    self.params.tile_to_idx(neighbour),
                )
                .similarity_to(&probe);

            if weight > 0.0 {
                sum += weight
                    * self.src.read(neighbour * PROBE_SIZE + texel).xyz();

                weights += weight;
            }
        }

        self.dst.write(pos, (sum / weights).extend(center.w));
    }
}

/// Projects each valid probe's radiance onto spherical harmonics.
pub struct ScreenProbesProject<'a> {
    pub params: &'a ScreenProbesParams,
    pub mask: Tex<'a>,
    pub radiance: Tex<'a>,
    pub sh: Storage<'a>,
}

impl<'a> ScreenProbesProject<'a> {
    pub fn run(self, tile: UVec2) {
        let idx = self.params.tile_to_idx(tile);
        let mut sh = Sh9::default();

        if self.mask.read(tile).x > 0.0 {
            for texel in 0..PROBE_TEXELS {
                let texel = uvec2(texel % PROBE_SIZE, texel / PROBE_SIZE);

                sh.add(
                    Octahedral::texel_direction(texel, PROBE_SIZE),
                    self.radiance.read(tile * PROBE_SIZE + texel).xyz(),
                    Octahedral::texel_solid_angle(texel, PROBE_SIZE),
                );
            }
        }

        sh.write(self.sh, idx);
    }
}

/// Interpolates irradiance of nearby probes at each pixel.
pub struct ScreenProbesInterpolate<'a> {
    pub params: &'a ScreenProbesParams,
    pub gbuffer: GBufferMap<'a>,
    pub probes: Storage<'a>,
    pub mask: Tex<'a>,
    pub sh: Storage<'a>,
    pub output: Tex<'a>,
}

impl<'a> ScreenProbesInterpolate<'a> {
    pub fn run(self, pixel: UVec2) {
        let surface = self.gbuffer.get(pixel);

        if !surface.is_some() {
            self.output.write(pixel, Vec4::ZERO);
            return;
        }

        let target = ProbeData::from_surface(&surface);

        let pos = (pixel.as_vec2() + 0.5) / (PROBE_SIZE as f32) - 0.5;
        let base = pos.floor().as_ivec2();
        let frac = pos - pos.floor();

        let mut sum = Vec3::ZERO;
        let mut weights = 0.0;

        for (offset, bilinear) in [
            (ivec2(0, 0), (1.0 - frac.x) * (1.0 - frac.y)),
            (ivec2(1, 0), frac.x * (1.0 - frac.y)),
            (ivec2(0, 1), (1.0 - frac.x) * frac.y),
            (ivec2(1, 1), frac.x * frac.y),
        ] {
            if let Some((irradiance, weight)) =
                self.sample(base + offset, &target, surface.normal)
            {
                sum += irradiance * weight * bilinear;
                weights += weight * bilinear;
            }
        }

        if weights <= 0.0 {
            for dy in -1..=2 {
                for dx in -1..=2 {
                    if let Some((irradiance, weight)) =
                        self.sample(base + ivec2(dx, dy), &target, surface.normal)
                    {
                        sum += irradiance * weight;
                        weights += weight;
                    }
                }
            }
        }

        let out = if weights > 0.0 {
            (sum / weights).extend(1.0)
        } else {
            Vec4::ZERO
        };

        self.output.write(pixel, out);
    }

    fn sample(
        &self,
        tile: IVec2,
        target: &ProbeData,
        normal: Vec3,
    ) -> Option<(Vec3, f32)> {
        if !self.params.contains(tile) {
            return None;
        }

        let tile = tile.as_uvec2();

        if self.mask.read(tile).x <= 0.0 {
            return None;
        }

        let idx = self.params.tile_to_idx(tile);
        let weight = ProbeData::read(self.probes, idx).similarity_to(target);

        if weight <= 0.0 {
            return None;
        }

        Some((Sh9::read(self.sh, idx).irradiance(normal), weight))
    }
}
