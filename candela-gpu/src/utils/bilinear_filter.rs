use glam::{ivec2, vec4, IVec2, UVec2, Vec2, Vec4};

use crate::Reprojection;

#[derive(Clone, Copy)]
pub struct BilinearFilter {
    /// Sample at `f(x=0, y=0)`
    pub s00: Vec4,

    /// Sample at `f(x=1, y=0)`
    pub s10: Vec4,

    /// Sample at `f(x=0, y=1)`
    pub s01: Vec4,

    /// Sample at `f(x=1, y=1)`
    pub s11: Vec4,

    /// Weights for each sample
    pub weights: Vec4,
}

impl BilinearFilter {
    pub fn reproject(
        reprojection: Reprojection,
        sample: impl Fn(UVec2) -> (Vec4, f32),
    ) -> Vec4 {
        Self::from_reprojection(reprojection, sample)
            .eval(reprojection.prev_pos().fract())
    }

    pub fn from_reprojection(
        reprojection: Reprojection,
        sample: impl Fn(UVec2) -> (Vec4, f32),
    ) -> Self {
        let mut samples = [Vec4::ZERO; 4];
        let mut weights = [0.0; 4];

        let coords =
            Self::reprojection_coords(reprojection.prev_x, reprojection.prev_y);

        for (idx, pos) in coords.into_iter().enumerate() {
            if reprojection.validity & (1 << idx) > 0 && pos.x >= 0 && pos.y >= 0
            {
                (samples[idx], weights[idx]) = sample(pos.as_uvec2());
            }
        }

        Self {
            s00: samples[0],
            s10: samples[1],
            s01: samples[2],
            s11: samples[3],
            weights: Vec4::from_array(weights),
        }
    }

    pub fn reprojection_coords(prev_x: f32, prev_y: f32) -> [IVec2; 4] {
        let x = prev_x.floor() as i32;
        let y = prev_y.floor() as i32;

        [ivec2(x, y), ivec2(x + 1, y), ivec2(x, y + 1), ivec2(x + 1, y + 1)]
    }

    pub fn eval(&self, uv: Vec2) -> Vec4 {
        let weights = self.weights
            * vec4(
                (1.0 - uv.x) * (1.0 - uv.y),
                uv.x * (1.0 - uv.y),
                (1.0 - uv.x) * uv.y,
                uv.x * uv.y,
            );

        let w_sum = weights.dot(Vec4::ONE);

        if w_sum == 0.0 {
            Default::default()
        } else {
            (self.s00 * weights.x
                + self.s10 * weights.y
                + self.s01 * weights.z
                + self.s11 * weights.w)
                / w_sum
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::vec2;

    use super::*;

    #[test]
    fn eval() {
        let filter = BilinearFilter {
            s00: Vec4::splat(1.0),
            s10: Vec4::splat(2.0),
            s01: Vec4::splat(3.0),
            s11: Vec4::splat(4.0),
            weights: Vec4::ONE,
        };

        // ---
        // Case 1: corners

        assert_eq!(Vec4::splat(1.0), filter.eval(vec2(0.0, 0.0)));
        assert_eq!(Vec4::splat(4.0), filter.eval(vec2(1.0, 1.0)));

        // ---
        // Case 2: center

        assert_eq!(Vec4::splat(2.5), filter.eval(vec2(0.5, 0.5)));

        // ---
        // Case 3: invalid samples get skipped

        let filter = BilinearFilter {
            weights: vec4(0.0, 1.0, 1.0, 0.0),
            ..filter
        };

        assert_eq!(Vec4::splat(2.5), filter.eval(vec2(0.5, 0.5)));
    }
}
