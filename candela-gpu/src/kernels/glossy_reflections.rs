use core::f32::consts::FRAC_PI_2;

use glam::{ivec2, IVec2, UVec2, Vec3, Vec4, Vec4Swizzles};

use crate::{
    lerp, BilinearFilter, Camera, F32Ext, GBufferEntry, GBufferMap,
    GlossyReflectionsParams, HashGrid, Noise, Ray, Reprojection, SceneQuery,
    ShadingParams, Tex, Vec3Ext,
};

/// Number of frames reflections keep averaging samples over.
pub const REFLECTION_MAX_HISTORY: f32 = 16.0;

const ATROUS_KERNEL: [f32; 5] =
    [1.0 / 16.0, 1.0 / 4.0, 3.0 / 8.0, 1.0 / 4.0, 1.0 / 16.0];

fn surface_at(
    gbuffer: GBufferMap,
    params: &GlossyReflectionsParams,
    pos: UVec2,
) -> GBufferEntry {
    gbuffer.get((pos * params.trace_scale).min(gbuffer.size() - 1))
}

fn read_clamped(tex: Tex, pos: IVec2) -> Option<(UVec2, Vec4)> {
    if pos.x < 0 || pos.y < 0 {
        return None;
    }

    let pos = pos.as_uvec2();

    if tex.contains(pos) {
        Some((pos, tex.read(pos)))
    } else {
        None
    }
}

/// Returns how much a sample from `other` can contribute to `center`.
fn edge_weight(center: &GBufferEntry, other: &GBufferEntry) -> f32 {
    if !other.is_some() {
        return 0.0;
    }

    let normal = center.normal.dot(other.normal).max(0.0).powi(8);

    let plane = {
        let distance = center.normal.dot(other.position - center.position).abs();

        (1.0 - distance / (0.05 * center.depth)).max(0.0)
    };

    let roughness =
        (1.0 - (center.roughness - other.roughness).abs() * 4.0).max(0.0);

    normal * plane * roughness
}

/// Traces one glossy reflection ray per pixel (per 2x2 block of pixels at
/// half resolution).
pub struct GlossyReflectionsTrace<'a> {
    pub camera: &'a Camera,
    pub scene: &'a dyn SceneQuery,
    pub shading: &'a ShadingParams,
    pub params: &'a GlossyReflectionsParams,
    pub grid: HashGrid<'a>,
    pub gbuffer: GBufferMap<'a>,
    pub specular: Tex<'a>,
    pub direction: Tex<'a>,
}

impl<'a> GlossyReflectionsTrace<'a> {
    pub fn run(self, pos: UVec2) {
        let surface = surface_at(self.gbuffer, self.params, pos);

        if !surface.is_some()
            || surface.roughness > self.params.high_roughness_threshold
        {
            self.specular.write(pos, Vec4::ZERO);
            self.direction.write(pos, Vec4::ZERO);
            return;
        }

        let view = (surface.position - self.camera.position()).normalize();
        let mirror = view.reflect(surface.normal);

        let direction = if surface.roughness
            <= self.params.low_roughness_threshold
        {
            mirror
        } else {
            let mut noise = Noise::new(self.shading.seed, pos);

            let direction = noise.sample_cone(
                mirror,
                surface.roughness.sqr() * FRAC_PI_2,
            );

            if direction.dot(surface.normal) > 0.0 {
                direction
            } else {
                mirror
            }
        };

        let hit = self.scene.intersect(
            Ray::from_surface(surface.position, surface.normal, direction),
            self.shading.ray_flags(),
        );

        let (radiance, distance) = if let Some(hit) = hit {
            let (emitted, albedo) = self.shading.shade(self.scene, &hit);

            let cached = self
                .grid
                .lookup(
                    hit.position,
                    hit.facing_normal(direction),
                    self.camera.position(),
                )
                .map(|sample| sample.radiance)
                .unwrap_or_default();

            (emitted + albedo * cached, hit.distance)
        } else {
            (self.scene.sky(direction), -1.0)
        };

        self.specular.write(pos, radiance.extend(1.0));
        self.direction.write(pos, direction.extend(distance));
    }
}

/// Flags pixels whose luminance sticks out of their neighbourhood.
pub struct GlossyReflectionsMarkFireflies<'a> {
    pub params: &'a GlossyReflectionsParams,
    pub specular: Tex<'a>,
    pub fireflies: Tex<'a>,
}

impl<'a> GlossyReflectionsMarkFireflies<'a> {
    pub fn run(self, pos: UVec2) {
        let center = self.specular.read(pos);
        let luma = center.xyz().luma();
        let radius = self.params.mark_fireflies_radius;

        let mut is_firefly = false;

        if center.w > 0.0 && luma > self.params.mark_fireflies_low_threshold {
            let mut sum = 0.0;
            let mut count = 0.0;

            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx == 0 && dy == 0 {
                        continue;
                    }

                    let Some((_, sample)) = read_clamped(
                        self.specular,
                        pos.as_ivec2() + ivec2(dx, dy),
                    ) else {
                        continue;
                    };

                    if sample.w > 0.0 {
                        sum += sample.xyz().luma();
                        count += 1.0;
                    }
                }
            }

            let mean = if count > 0.0 { sum / count } else { 0.0 };

            is_firefly =
                luma > self.params.mark_fireflies_high_threshold * mean;
        }

        self.fireflies
            .write(pos, Vec4::splat(if is_firefly { 1.0 } else { 0.0 }));
    }
}

/// Replaces fireflies with the mean of their unmarked neighbours.
pub struct GlossyReflectionsCleanupFireflies<'a> {
    pub params: &'a GlossyReflectionsParams,
    pub specular: Tex<'a>,
    pub fireflies: Tex<'a>,
    pub output: Tex<'a>,
}

impl<'a> GlossyReflectionsCleanupFireflies<'a> {
    pub fn run(self, pos: UVec2) {
        let center = self.specular.read(pos);

        if self.fireflies.read(pos).x <= 0.0 {
            self.output.write(pos, center);
            return;
        }

        let radius = self.params.cleanup_fireflies_radius;
        let mut sum = Vec3::ZERO;
        let mut count = 0.0;

        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let Some((pos, sample)) =
                    read_clamped(self.specular, pos.as_ivec2() + ivec2(dx, dy))
                else {
                    continue;
                };

                if sample.w > 0.0 && self.fireflies.read(pos).x <= 0.0 {
                    sum += sample.xyz();
                    count += 1.0;
                }
            }
        }

        let out = if count > 0.0 { sum / count } else { Vec3::ZERO };

        self.output.write(pos, out.extend(center.w));
    }
}

/// One axis of the split ratio estimator: a roughness-scaled gaussian blur
/// that also tracks the second moment of luminance.
pub struct GlossyReflectionsSplitRatio<'a> {
    pub params: &'a GlossyReflectionsParams,
    pub gbuffer: GBufferMap<'a>,
    pub src: Tex<'a>,

    /// Second moments computed by the previous axis; `None` for the first
    /// axis, which starts from the squared luminance of `src`.
    pub src_average_squared: Option<Tex<'a>>,
    pub dst: Tex<'a>,
    pub dst_average_squared: Tex<'a>,
    pub axis: IVec2,
}

impl<'a> GlossyReflectionsSplitRatio<'a> {
    pub fn run(self, pos: UVec2) {
        let center = self.src.read(pos);

        if center.w <= 0.0 {
            self.dst.write(pos, center);
            self.dst_average_squared.write(pos, Vec4::ZERO);
            return;
        }

        let surface = surface_at(self.gbuffer, self.params, pos);

        let radius = ((self.params.denoiser_radius as f32)
            * (surface.roughness / self.params.high_roughness_threshold)
                .saturate()
                .sqrt())
        .ceil()
        .max(1.0) as i32;

        let sigma = radius as f32 * 0.5;
        let mut sum = Vec3::ZERO;
        let mut sum_squared = 0.0;
        let mut weights = 0.0;

        for step in -radius..=radius {
            let Some((pos, sample)) =
                read_clamped(self.src, pos.as_ivec2() + self.axis * step)
            else {
                continue;
            };

            if sample.w <= 0.0 {
                continue;
            }

            let weight = (-(step * step) as f32 / (2.0 * sigma * sigma)).exp()
                * if step == 0 {
                    1.0
                } else {
                    edge_weight(
                        &surface,
                        &surface_at(self.gbuffer, self.params, pos),
                    )
                };

            if weight <= 0.0 {
                continue;
            }

            let squared = match self.src_average_squared {
                Some(tex) => tex.read(pos).x,
                None => sample.xyz().luma().sqr(),
            };

            sum += sample.xyz() * weight;
            sum_squared += squared * weight;
            weights += weight;
        }

        self.dst.write(pos, (sum / weights).extend(1.0));

        self.dst_average_squared
            .write(pos, Vec4::splat(sum_squared / weights));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtrousPass {
    /// Estimates the per-pixel standard deviation used by later passes.
    First,
    Iteration(u32),

    /// Last iteration; drops the luminance edge-stopping term.
    Final(u32),
}

impl AtrousPass {
    pub fn new(pass_idx: u32, pass_count: u32) -> Self {
        if pass_idx == 0 {
            Self::First
        } else if pass_idx + 1 >= pass_count {
            Self::Final(pass_idx)
        } else {
            Self::Iteration(pass_idx)
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            Self::First => 0,
            Self::Iteration(idx) | Self::Final(idx) => *idx,
        }
    }

    pub fn step(&self) -> i32 {
        1 << self.index()
    }
}

/// One pass of the edge-avoiding à-trous wavelet filter.
///
/// See:
/// - https://jo.dreggn.org/home/2010_atrous.pdf
pub struct GlossyReflectionsAtrous<'a> {
    pub params: &'a GlossyReflectionsParams,
    pub gbuffer: GBufferMap<'a>,
    pub pass: AtrousPass,
    pub src: Tex<'a>,
    pub dst: Tex<'a>,
    pub standard_dev: Tex<'a>,
}

impl<'a> GlossyReflectionsAtrous<'a> {
    pub fn run(self, pos: UVec2) {
        let center = self.src.read(pos);

        if center.w <= 0.0 {
            self.dst.write(pos, center);

            if self.pass == AtrousPass::First {
                self.standard_dev.write(pos, Vec4::ZERO);
            }

            return;
        }

        let deviation = if self.pass == AtrousPass::First {
            let deviation = self.estimate_deviation(pos);

            self.standard_dev.write(pos, Vec4::splat(deviation));

            deviation
        } else {
            self.standard_dev.read(pos).x
        };

        let surface = surface_at(self.gbuffer, self.params, pos);
        let center_luma = center.xyz().luma();
        let step = self.pass.step();

        let mut sum = Vec3::ZERO;
        let mut weights = 0.0;

        for (ky, dy) in (-2..=2).enumerate() {
            for (kx, dx) in (-2..=2).enumerate() {
                let Some((pos, sample)) = read_clamped(
                    self.src,
                    pos.as_ivec2() + ivec2(dx, dy) * step,
                ) else {
                    continue;
                };

                if sample.w <= 0.0 {
                    continue;
                }

                let mut weight = ATROUS_KERNEL[kx] * ATROUS_KERNEL[ky];

                if dx != 0 || dy != 0 {
                    weight *= edge_weight(
                        &surface,
                        &surface_at(self.gbuffer, self.params, pos),
                    );

                    if !matches!(self.pass, AtrousPass::Final(_)) {
                        let luma_diff =
                            (sample.xyz().luma() - center_luma).abs();

                        weight *= (-luma_diff / (4.0 * deviation + 1e-3)).exp();
                    }
                }

                sum += sample.xyz() * weight;
                weights += weight;
            }
        }

        self.dst.write(pos, (sum / weights).extend(1.0));
    }

    fn estimate_deviation(&self, pos: UVec2) -> f32 {
        let mut sum = 0.0;
        let mut sum_squared = 0.0;
        let mut count = 0.0;

        for dy in -1..=1 {
            for dx in -1..=1 {
                let Some((_, sample)) =
                    read_clamped(self.src, pos.as_ivec2() + ivec2(dx, dy))
                else {
                    continue;
                };

                if sample.w > 0.0 {
                    let luma = sample.xyz().luma();

                    sum += luma;
                    sum_squared += luma * luma;
                    count += 1.0;
                }
            }
        }

        let mean = sum / count;

        (sum_squared / count - mean * mean).max(0.0).sqrt()
    }
}

/// Brings traced (and possibly denoised) reflections to full resolution,
/// picking for each pixel the traced pixel with the most similar surface.
pub struct GlossyReflectionsUpsample<'a> {
    pub params: &'a GlossyReflectionsParams,
    pub gbuffer: GBufferMap<'a>,
    pub src: Tex<'a>,
    pub dst: Tex<'a>,
}

impl<'a> GlossyReflectionsUpsample<'a> {
    pub fn run(self, pixel: UVec2) {
        let base = (pixel / self.params.trace_scale).min(self.src.size() - 1);

        if self.params.trace_scale == 1 {
            self.dst.write(pixel, self.src.read(base));
            return;
        }

        let surface = self.gbuffer.get(pixel);
        let mut best = (base, -1.0);

        for offset in [
            ivec2(0, 0),
            ivec2(-1, 0),
            ivec2(1, 0),
            ivec2(0, -1),
            ivec2(0, 1),
        ] {
            let Some((pos, _)) = read_clamped(self.src, base.as_ivec2() + offset)
            else {
                continue;
            };

            let score = surface_at(self.gbuffer, self.params, pos)
                .evaluate_similarity_to(&surface);

            if score > best.1 {
                best = (pos, score);
            }
        }

        self.dst.write(pixel, self.src.read(best.0));
    }
}

/// Per-pixel spread of denoised reflections, used to keep history from
/// drifting too far away from the current frame.
#[derive(Clone, Copy)]
pub enum GlossyMoments<'a> {
    None,
    AverageSquared {
        mean: Tex<'a>,
        average_squared: Tex<'a>,
    },
    StandardDev(Tex<'a>),
}

impl<'a> GlossyMoments<'a> {
    pub fn deviation(&self, pos: UVec2) -> Option<f32> {
        match self {
            Self::None => None,

            Self::AverageSquared {
                mean,
                average_squared,
            } => {
                let pos = pos.min(mean.size() - 1);
                let mean = mean.read(pos).xyz().luma();

                Some(
                    (average_squared.read(pos).x - mean * mean)
                        .max(0.0)
                        .sqrt(),
                )
            }

            Self::StandardDev(tex) => Some(tex.read(pos.min(tex.size() - 1)).x),
        }
    }
}

/// Blends current reflections with the reprojected history.
pub struct GlossyReflectionsTemporal<'a> {
    pub camera: &'a Camera,
    pub params: &'a GlossyReflectionsParams,
    pub gbuffer: GBufferMap<'a>,
    pub prev_gbuffer: GBufferMap<'a>,
    pub moments: GlossyMoments<'a>,
    pub reflection: Tex<'a>,
    pub history: Tex<'a>,
    pub prev_history: Tex<'a>,
}

impl<'a> GlossyReflectionsTemporal<'a> {
    pub fn run(self, pixel: UVec2) {
        let current = self.reflection.read(pixel);
        let surface = self.gbuffer.get(pixel);

        if current.w <= 0.0 || !surface.is_some() {
            self.history.write(pixel, Vec4::ZERO);
            return;
        }

        let reprojection =
            Reprojection::find(self.camera, self.prev_gbuffer, &surface);

        if reprojection.is_none() {
            self.history.write(pixel, current.xyz().extend(1.0));
            return;
        }

        let prev = BilinearFilter::reproject(reprojection, |pos| {
            (self.prev_history.read(pos), 1.0)
        });

        let mut history = prev.xyz();

        if let Some(deviation) = self
            .moments
            .deviation(pixel / self.params.trace_scale)
        {
            let luma = current.xyz().luma();
            let history_luma = history.luma();
            let min = (luma - 2.0 * deviation).max(0.0);
            let max = luma + 2.0 * deviation;

            if history_luma > 0.0 {
                history *= history_luma.clamp(min, max) / history_luma;
            }
        }

        let alpha = (1.0 / (prev.w + 1.0)).max(1.0 / REFLECTION_MAX_HISTORY);
        let out = lerp(history, current.xyz(), alpha);

        self.history.write(
            pixel,
            out.extend((prev.w + 1.0).min(REFLECTION_MAX_HISTORY)),
        );
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::AtomicU32;

    use glam::uvec2;

    use super::*;

    fn words(len: usize) -> Vec<AtomicU32> {
        (0..len).map(|_| AtomicU32::new(0)).collect()
    }

    fn params() -> GlossyReflectionsParams {
        GlossyReflectionsParams {
            trace_width: 8,
            trace_height: 8,
            trace_scale: 1,
            denoiser_radius: 3,
            mark_fireflies_radius: 1,
            mark_fireflies_low_threshold: 0.5,
            mark_fireflies_high_threshold: 4.0,
            cleanup_fireflies_radius: 1,
            low_roughness_threshold: 0.2,
            high_roughness_threshold: 0.6,
        }
    }

    #[test]
    fn atrous_passes() {
        assert_eq!(AtrousPass::First, AtrousPass::new(0, 4));
        assert_eq!(AtrousPass::Iteration(1), AtrousPass::new(1, 4));
        assert_eq!(AtrousPass::Iteration(2), AtrousPass::new(2, 4));
        assert_eq!(AtrousPass::Final(3), AtrousPass::new(3, 4));
        assert_eq!(AtrousPass::Final(1), AtrousPass::new(1, 2));

        assert_eq!(1, AtrousPass::First.step());
        assert_eq!(4, AtrousPass::Iteration(2).step());
        assert_eq!(8, AtrousPass::Final(3).step());
    }

    #[test]
    fn fireflies() {
        let params = params();
        let specular = words(4 * 64);
        let fireflies = words(4 * 64);
        let output = words(4 * 64);

        let specular_tex = Tex::new(&specular, uvec2(8, 8));
        let fireflies_tex = Tex::new(&fireflies, uvec2(8, 8));
        let output_tex = Tex::new(&output, uvec2(8, 8));

        for y in 0..8 {
            for x in 0..8 {
                specular_tex.write(uvec2(x, y), Vec4::new(1.0, 1.0, 1.0, 1.0));
            }
        }

        specular_tex.write(uvec2(3, 3), Vec4::new(50.0, 50.0, 50.0, 1.0));

        for y in 0..8 {
            for x in 0..8 {
                GlossyReflectionsMarkFireflies {
                    params: &params,
                    specular: specular_tex,
                    fireflies: fireflies_tex,
                }
                .run(uvec2(x, y));
            }
        }

        assert_eq!(1.0, fireflies_tex.read(uvec2(3, 3)).x);
        assert_eq!(0.0, fireflies_tex.read(uvec2(3, 4)).x);
        assert_eq!(0.0, fireflies_tex.read(uvec2(0, 0)).x);

        for y in 0..8 {
            for x in 0..8 {
                GlossyReflectionsCleanupFireflies {
                    params: &params,
                    specular: specular_tex,
                    fireflies: fireflies_tex,
                    output: output_tex,
                }
                .run(uvec2(x, y));
            }
        }

        assert_eq!(Vec4::ONE, output_tex.read(uvec2(3, 3)));
        assert_eq!(Vec4::ONE, output_tex.read(uvec2(5, 5)));
    }
}
