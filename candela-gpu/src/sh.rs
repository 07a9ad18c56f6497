use core::f32::consts::PI;

use glam::{Vec3, Vec4Swizzles};

use crate::Storage;

pub const SH_COEFFS: usize = 9;

/// Third-order (nine-coefficient) spherical harmonics of RGB radiance.
///
/// See:
/// - https://graphics.stanford.edu/papers/envmap/envmap.pdf
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sh9 {
    pub coeffs: [Vec3; SH_COEFFS],
}

impl Sh9 {
    pub fn basis(dir: Vec3) -> [f32; SH_COEFFS] {
        let Vec3 { x, y, z } = dir;

        [
            0.282095,
            0.488603 * y,
            0.488603 * z,
            0.488603 * x,
            1.092548 * x * y,
            1.092548 * y * z,
            0.315392 * (3.0 * z * z - 1.0),
            1.092548 * x * z,
            0.546274 * (x * x - y * y),
        ]
    }

    /// Projects a radiance sample covering `solid_angle` steradians.
    pub fn add(&mut self, dir: Vec3, radiance: Vec3, solid_angle: f32) {
        for (coeff, basis) in self.coeffs.iter_mut().zip(Self::basis(dir)) {
            *coeff += radiance * basis * solid_angle;
        }
    }

    /// Returns irradiance arriving at a surface with given normal, i.e. the
    /// projected radiance convolved with the clamped cosine lobe.
    pub fn irradiance(&self, normal: Vec3) -> Vec3 {
        const BAND_SCALE: [f32; SH_COEFFS] = [
            PI,
            2.0 * PI / 3.0,
            2.0 * PI / 3.0,
            2.0 * PI / 3.0,
            PI / 4.0,
            PI / 4.0,
            PI / 4.0,
            PI / 4.0,
            PI / 4.0,
        ];

        let basis = Self::basis(normal);
        let mut irradiance = Vec3::ZERO;

        for idx in 0..SH_COEFFS {
            irradiance += self.coeffs[idx] * BAND_SCALE[idx] * basis[idx];
        }

        irradiance.max(Vec3::ZERO)
    }

    pub fn read(buffer: Storage, probe: u32) -> Self {
        let mut coeffs = [Vec3::ZERO; SH_COEFFS];

        for (idx, coeff) in coeffs.iter_mut().enumerate() {
            *coeff = buffer
                .read::<glam::Vec4>(probe as usize * SH_COEFFS + idx)
                .xyz();
        }

        Self { coeffs }
    }

    pub fn write(&self, buffer: Storage, probe: u32) {
        for (idx, coeff) in self.coeffs.iter().enumerate() {
            buffer.write(probe as usize * SH_COEFFS + idx, coeff.extend(0.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{vec3, UVec2};

    use super::*;
    use crate::Octahedral;

    fn project(radiance: impl Fn(Vec3) -> Vec3) -> Sh9 {
        let mut sh = Sh9::default();

        for y in 0..8 {
            for x in 0..8 {
                let texel = UVec2::new(x, y);
                let dir = Octahedral::texel_direction(texel, 8);

                sh.add(
                    dir,
                    radiance(dir),
                    Octahedral::texel_solid_angle(texel, 8),
                );
            }
        }

        sh
    }

    #[test]
    fn constant_radiance() {
        let sh = project(|_| Vec3::ONE);

        for normal in [Vec3::X, Vec3::NEG_Y, vec3(0.3, 0.5, -0.8).normalize()] {
            let irradiance = sh.irradiance(normal);

            assert_relative_eq!(PI, irradiance.x, max_relative = 0.05);
            assert_relative_eq!(PI, irradiance.y, max_relative = 0.05);
            assert_relative_eq!(PI, irradiance.z, max_relative = 0.05);
        }
    }

    #[test]
    fn directional_radiance() {
        let sh = project(|dir| Vec3::splat(dir.z.max(0.0)));

        assert!(sh.irradiance(Vec3::Z).x > sh.irradiance(Vec3::X).x);
        assert!(sh.irradiance(Vec3::X).x > sh.irradiance(Vec3::NEG_Z).x);
    }

    #[test]
    fn serialization() {
        use core::sync::atomic::AtomicU32;

        let words: Vec<_> = (0..2 * SH_COEFFS * 4)
            .map(|_| AtomicU32::new(0))
            .collect();

        let buffer = Storage::new(&words);
        let sh = project(|dir| dir.abs());

        sh.write(buffer, 1);

        assert_eq!(sh, Sh9::read(buffer, 1));
    }
}
