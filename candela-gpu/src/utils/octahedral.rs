//! Octahedral mapping between directions on the unit sphere and a square
//! texel grid; used for probe radiance maps.

use glam::{vec2, vec3, UVec2, Vec2, Vec3, Vec3Swizzles};

pub struct Octahedral;

impl Octahedral {
    /// Maps a direction into `<-1.0, 1.0>²`.
    pub fn encode(dir: Vec3) -> Vec2 {
        let n = dir / (dir.x.abs() + dir.y.abs() + dir.z.abs());

        if n.z >= 0.0 {
            n.xy()
        } else {
            (Vec2::ONE - n.yx().abs()) * sign_not_zero(n.xy())
        }
    }

    /// Inverse of [`Self::encode()`].
    pub fn decode(uv: Vec2) -> Vec3 {
        Self::unfold(uv).normalize()
    }

    /// Returns direction passing through the center of given texel.
    pub fn texel_direction(texel: UVec2, size: u32) -> Vec3 {
        Self::decode(
            (texel.as_vec2() + 0.5) / (size as f32) * 2.0 - Vec2::ONE,
        )
    }

    /// Returns direction passing through given point of a texel, where
    /// `offset` is in `<0.0, 1.0>²`.
    pub fn texel_direction_at(texel: UVec2, offset: Vec2, size: u32) -> Vec3 {
        Self::decode((texel.as_vec2() + offset) / (size as f32) * 2.0 - Vec2::ONE)
    }

    /// Returns texel containing given direction.
    pub fn direction_texel(dir: Vec3, size: u32) -> UVec2 {
        let uv = (Self::encode(dir) * 0.5 + 0.5) * (size as f32);

        uv.as_uvec2().min(UVec2::splat(size - 1))
    }

    /// Returns the solid angle covered by given texel.
    ///
    /// Mapping a point of the octahedron (`|x| + |y| + |z| = 1`) onto the
    /// sphere scales areas by `1 / |p|³`; we integrate that over a few
    /// sub-texel samples.
    pub fn texel_solid_angle(texel: UVec2, size: u32) -> f32 {
        const SUBDIV: u32 = 4;

        let texel_extent = 2.0 / (size as f32);
        let step = texel_extent / (SUBDIV as f32);
        let origin = texel.as_vec2() * texel_extent - Vec2::ONE;
        let mut sum = 0.0;

        for y in 0..SUBDIV {
            for x in 0..SUBDIV {
                let uv = origin + vec2(x as f32 + 0.5, y as f32 + 0.5) * step;

                sum += 1.0 / Self::unfold(uv).length().powi(3);
            }
        }

        sum * step * step
    }

    fn unfold(uv: Vec2) -> Vec3 {
        let mut n = vec3(uv.x, uv.y, 1.0 - uv.x.abs() - uv.y.abs());
        let t = (-n.z).max(0.0);

        n.x += if n.x >= 0.0 { -t } else { t };
        n.y += if n.y >= 0.0 { -t } else { t };
        n
    }
}

fn sign_not_zero(v: Vec2) -> Vec2 {
    vec2(
        if v.x >= 0.0 { 1.0 } else { -1.0 },
        if v.y >= 0.0 { 1.0 } else { -1.0 },
    )
}
