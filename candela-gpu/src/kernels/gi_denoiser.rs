use glam::{ivec2, IVec2, UVec2, Vec3, Vec4, Vec4Swizzles};

use crate::{
    lerp, BilinearFilter, Camera, GBufferMap, GiDenoiserParams, Reprojection,
    Tex,
};

/// Smallest weight the current frame gets when blended with history.
pub const GI_DENOISER_MIN_ALPHA: f32 = 0.05;

/// Blends this frame's irradiance with the reprojected history and works out
/// how much each pixel needs blurring: pixels whose history doesn't match
/// their surface (or that have no history at all) get blurred the most.
///
/// Thanks to:
///
/// - https://de45xmedrsdbp.cloudfront.net/Resources/files/TemporalAA_small-59732822.pdf
///   (High Quality Temporal Supersampling by Brian Karis)
pub struct GiDenoiserReproject<'a> {
    pub camera: &'a Camera,
    pub params: &'a GiDenoiserParams,
    pub gbuffer: GBufferMap<'a>,
    pub prev_gbuffer: GBufferMap<'a>,
    pub irradiance: Tex<'a>,
    pub color: Tex<'a>,
    pub prev_color: Tex<'a>,
    pub blur_mask: Tex<'a>,
}

impl<'a> GiDenoiserReproject<'a> {
    pub fn run(self, pixel: UVec2) {
        let surface = self.gbuffer.get(pixel);

        if !surface.is_some() {
            self.color.write(pixel, Vec4::ZERO);
            self.blur_mask.write(pixel, Vec4::ZERO);
            return;
        }

        let current = self.irradiance.read(pixel).xyz();

        let reprojection =
            Reprojection::find(self.camera, self.prev_gbuffer, &surface);

        if reprojection.is_none() {
            self.color.write(pixel, current.extend(1.0));
            self.blur_mask.write(pixel, Vec4::ONE);
            return;
        }

        let prev = BilinearFilter::reproject(reprojection, |pos| {
            (self.prev_color.read(pos), 1.0)
        });

        let history = prev.w.min(self.params.max_history);
        let alpha = (1.0 / (history + 1.0)).max(GI_DENOISER_MIN_ALPHA);
        let out = lerp(prev.xyz(), current, alpha);

        self.color.write(
            pixel,
            out.extend((history + 1.0).min(self.params.max_history)),
        );

        self.blur_mask
            .write(pixel, Vec4::splat(1.0 - reprojection.confidence));
    }
}

/// Dilates the blur mask, so that blurring reaches a bit past the edges of
/// disoccluded areas.
pub struct GiDenoiserFilterBlurMask<'a> {
    pub src: Tex<'a>,
    pub dst: Tex<'a>,
}

impl<'a> GiDenoiserFilterBlurMask<'a> {
    pub fn run(self, pixel: UVec2) {
        let mut mask = 0.0f32;

        for dy in -1..=1 {
            for dx in -1..=1 {
                let pos = pixel.as_ivec2() + ivec2(dx, dy);

                if pos.x < 0 || pos.y < 0 {
                    continue;
                }

                let pos = pos.as_uvec2();

                if self.src.contains(pos) {
                    mask = mask.max(self.src.read(pos).x);
                }
            }
        }

        self.dst.write(pixel, Vec4::splat(mask));
    }
}

/// One axis of the blur; its radius follows the blur mask.
pub struct GiDenoiserFilter<'a> {
    pub params: &'a GiDenoiserParams,
    pub gbuffer: GBufferMap<'a>,
    pub blur_mask: Tex<'a>,
    pub src: Tex<'a>,
    pub dst: Tex<'a>,
    pub axis: IVec2,
}

impl<'a> GiDenoiserFilter<'a> {
    pub fn run(self, pixel: UVec2) {
        let center = self.src.read(pixel);
        let mask = self.blur_mask.read(pixel).x;
        let radius = (mask * self.params.max_blur_radius as f32).ceil() as i32;

        if radius <= 0 {
            self.dst.write(pixel, center);
            return;
        }

        let surface = self.gbuffer.get(pixel);
        let sigma = radius as f32 * 0.5;
        let mut sum = center.xyz();
        let mut weights = 1.0;

        for step in -radius..=radius {
            if step == 0 {
                continue;
            }

            let pos = pixel.as_ivec2() + self.axis * step;

            if pos.x < 0 || pos.y < 0 {
                continue;
            }

            let pos = pos.as_uvec2();

            if !self.src.contains(pos) {
                continue;
            }

            let weight = (-((step * step) as f32) / (2.0 * sigma * sigma))
                .exp()
                * self.gbuffer.get(pos).evaluate_similarity_to(&surface);

            if weight > 0.0 {
                sum += self.src.read(pos).xyz() * weight;
                weights += weight;
            }
        }

        let out: Vec3 = sum / weights;

        self.dst.write(pixel, out.extend(center.w));
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

    #[test]
    fn blur_mask_dilation() {
        let src = words(4 * 25);
        let dst = words(4 * 25);
        let src_tex = Tex::new(&src, uvec2(5, 5));
        let dst_tex = Tex::new(&dst, uvec2(5, 5));

        src_tex.write(uvec2(2, 2), Vec4::splat(0.75));

        for y in 0..5 {
            for x in 0..5 {
                GiDenoiserFilterBlurMask {
                    src: src_tex,
                    dst: dst_tex,
                }
                .run(uvec2(x, y));
            }
        }

        assert_eq!(0.75, dst_tex.read(uvec2(1, 1)).x);
        assert_eq!(0.75, dst_tex.read(uvec2(3, 2)).x);
        assert_eq!(0.0, dst_tex.read(uvec2(0, 0)).x);
        assert_eq!(0.0, dst_tex.read(uvec2(4, 2)).x);
    }
}
