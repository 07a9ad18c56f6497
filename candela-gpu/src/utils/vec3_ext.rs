use glam::{vec3, Vec3};

pub trait Vec3Ext
where
    Self: Sized,
{
    /// Reflects this direction-vector around `other`.
    fn reflect(self, other: Self) -> Self;

    /// Returns luminance of this color-vector.
    fn luma(self) -> f32;

    /// Returns the axis this direction-vector is most aligned with, as an
    /// index in range `0..6` (`+x`, `-x`, `+y`, `-y`, `+z`, `-z`).
    fn dominant_axis(self) -> u32;

    /// Returns two vectors that, together with this one, form an orthonormal
    /// basis.
    fn orthonormal_basis(self) -> (Self, Self);
}

impl Vec3Ext for Vec3 {
    fn reflect(self, other: Self) -> Self {
        self - 2.0 * other.dot(self) * other
    }

    fn luma(self) -> f32 {
        self.dot(vec3(0.2126, 0.7152, 0.0722))
    }

    fn dominant_axis(self) -> u32 {
        let abs = self.abs();

        if abs.x >= abs.y && abs.x >= abs.z {
            if self.x >= 0.0 {
                0
            } else {
                1
            }
        } else if abs.y >= abs.z {
            if self.y >= 0.0 {
                2
            } else {
                3
            }
        } else if self.z >= 0.0 {
            4
        } else {
            5
        }
    }

    fn orthonormal_basis(self) -> (Self, Self) {
        // Building an Orthonormal Basis, Revisited (Duff et al.)
        let sign = 1.0f32.copysign(self.z);
        let a = -1.0 / (sign + self.z);
        let b = self.x * self.y * a;

        (
            vec3(1.0 + sign * self.x * self.x * a, sign * b, -sign * self.x),
            vec3(b, sign + self.y * self.y * a, -self.y),
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn dominant_axis() {
        assert_eq!(0, vec3(1.0, 0.5, -0.5).dominant_axis());
        assert_eq!(1, vec3(-1.0, 0.5, -0.5).dominant_axis());
        assert_eq!(2, vec3(0.1, 0.5, -0.2).dominant_axis());
        assert_eq!(3, vec3(0.1, -0.5, -0.2).dominant_axis());
        assert_eq!(4, vec3(0.1, 0.2, 0.3).dominant_axis());
        assert_eq!(5, vec3(0.1, 0.2, -0.3).dominant_axis());
    }

    #[test]
    fn orthonormal_basis() {
        for normal in [
            Vec3::X,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
            vec3(0.3, -0.4, 0.5).normalize(),
        ] {
            let (t, b) = normal.orthonormal_basis();

            assert_relative_eq!(0.0, t.dot(normal), epsilon = 1e-5);
            assert_relative_eq!(0.0, b.dot(normal), epsilon = 1e-5);
            assert_relative_eq!(0.0, t.dot(b), epsilon = 1e-5);
            assert_relative_eq!(1.0, t.length(), epsilon = 1e-5);
            assert_relative_eq!(1.0, b.length(), epsilon = 1e-5);
        }
    }
}
