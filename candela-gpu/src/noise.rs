use core::f32::consts::PI;

use glam::{vec2, vec3, UVec2, Vec2, Vec3};

use crate::{U32Ext, Vec3Ext};

/// PCG-based white noise; each work item creates its own generator, seeded
/// with the frame's seed and the item's id.
#[derive(Copy, Clone)]
pub struct Noise {
    state: u32,
}

impl Noise {
    pub fn new(seed: u32, id: UVec2) -> Self {
        Self {
            state: seed
                ^ 48619u32.wrapping_mul(id.x)
                ^ 95461u32.wrapping_mul(id.y),
        }
    }

    pub fn from_index(seed: u32, idx: u32) -> Self {
        Self {
            state: (seed ^ idx.wrapping_mul(0x9e3779b9)).hash(),
        }
    }

    /// Generates a uniform sample in range `<0.0, 1.0>`.
    pub fn sample(&mut self) -> f32 {
        (self.sample_int() as f32) / (u32::MAX as f32)
    }

    /// Generates a uniform sample in range `<0, u32::MAX>`.
    pub fn sample_int(&mut self) -> u32 {
        self.state = self.state.hash();
        self.state
    }

    /// Generates a uniform sample in range `<0, max)`.
    pub fn sample_range(&mut self, max: u32) -> u32 {
        if max == 0 {
            0
        } else {
            self.sample_int() % max
        }
    }

    /// Generates a uniform sample on a circle.
    pub fn sample_circle(&mut self) -> Vec2 {
        let angle = self.sample() * PI * 2.0;

        vec2(angle.cos(), angle.sin())
    }

    /// Generates a uniform sample inside of a disk.
    pub fn sample_disk(&mut self) -> Vec2 {
        let radius = self.sample().sqrt();

        self.sample_circle() * radius
    }

    /// Generates a cosine-weighted sample on a hemisphere around given normal.
    pub fn sample_cosine_hemisphere(&mut self, normal: Vec3) -> Vec3 {
        let disk = self.sample_disk();
        let height = (1.0 - disk.length_squared()).max(0.0).sqrt();
        let (t, b) = normal.orthonormal_basis();

        (t * disk.x + b * disk.y + normal * height).normalize()
    }

    /// Generates a uniform sample on a hemisphere around given normal.
    pub fn sample_hemisphere(&mut self, normal: Vec3) -> Vec3 {
        let cos_theta = self.sample();
        let radius = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let circle = self.sample_circle() * radius;
        let (t, b) = normal.orthonormal_basis();

        (t * circle.x + b * circle.y + normal * cos_theta).normalize()
    }

    /// Generates a direction inside a cone of given half-angle (in radians)
    /// around `axis`.
    pub fn sample_cone(&mut self, axis: Vec3, half_angle: f32) -> Vec3 {
        let cos_theta = 1.0 - self.sample() * (1.0 - half_angle.cos());
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let circle = self.sample_circle() * sin_theta;
        let (t, b) = axis.orthonormal_basis();

        (t * circle.x + b * circle.y + axis * cos_theta).normalize()
    }

    pub fn sample_vec3(&mut self) -> Vec3 {
        vec3(self.sample(), self.sample(), self.sample())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism() {
        let mut a = Noise::new(1234, UVec2::new(5, 6));
        let mut b = Noise::new(1234, UVec2::new(5, 6));
        let mut c = Noise::new(1234, UVec2::new(6, 5));

        let a: Vec<_> = (0..8).map(|_| a.sample_int()).collect();
        let b: Vec<_> = (0..8).map(|_| b.sample_int()).collect();
        let c: Vec<_> = (0..8).map(|_| c.sample_int()).collect();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hemispheres() {
        let mut noise = Noise::from_index(1, 2);
        let normal = vec3(0.3, 0.9, -0.1).normalize();

        for _ in 0..256 {
            assert!(noise.sample_cosine_hemisphere(normal).dot(normal) >= 0.0);
            assert!(noise.sample_hemisphere(normal).dot(normal) >= 0.0);
            assert!(
                noise.sample_cone(normal, 0.1).dot(normal)
                    >= 0.1f32.cos() - 1e-4
            );
        }
    }

    #[test]
    fn range() {
        let mut noise = Noise::from_index(1, 2);

        for _ in 0..256 {
            assert!(noise.sample() <= 1.0);
            assert!(noise.sample_range(7) < 7);
        }

        assert_eq!(0, noise.sample_range(0));
    }
}
