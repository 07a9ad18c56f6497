use glam::{UVec2, Vec3, Vec4, Vec4Swizzles};

use crate::Tex;

/// Primary surface visible through a pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GBufferEntry {
    pub position: Vec3,

    /// Distance from the camera; zero for pixels that see the sky.
    pub depth: f32,
    pub normal: Vec3,
    pub roughness: f32,
    pub albedo: Vec3,
    pub metallic: f32,
}

impl GBufferEntry {
    pub fn unpack([d0, d1, d2]: [Vec4; 3]) -> Self {
        Self {
            position: d0.xyz(),
            depth: d0.w,
            normal: d1.xyz(),
            roughness: d1.w,
            albedo: d2.xyz(),
            metallic: d2.w,
        }
    }

    pub fn pack(self) -> [Vec4; 3] {
        [
            self.position.extend(self.depth),
            self.normal.extend(self.roughness),
            self.albedo.extend(self.metallic),
        ]
    }

    pub fn is_some(&self) -> bool {
        self.depth > 0.0
    }

    /// Returns a score `<0.0, 1.0>` that determines the similarity of two given
    /// surfaces.
    pub fn evaluate_similarity_to(&self, other: &Self) -> f32 {
        if !self.is_some() || !other.is_some() {
            return 0.0;
        }

        let normal_score = self.normal.dot(other.normal).max(0.0);

        let distance_score = {
            let tolerance = 0.05 * self.depth.max(other.depth);

            1.0 - (self.position.distance(other.position) / tolerance).min(1.0)
        };

        normal_score * distance_score
    }
}

#[derive(Clone, Copy)]
pub struct GBufferMap<'a> {
    pub d0: Tex<'a>,
    pub d1: Tex<'a>,
    pub d2: Tex<'a>,
}

impl<'a> GBufferMap<'a> {
    pub fn get(&self, screen_pos: UVec2) -> GBufferEntry {
        GBufferEntry::unpack([
            self.d0.read(screen_pos),
            self.d1.read(screen_pos),
            self.d2.read(screen_pos),
        ])
    }

    pub fn set(&self, screen_pos: UVec2, entry: GBufferEntry) {
        let [d0, d1, d2] = entry.pack();

        self.d0.write(screen_pos, d0);
        self.d1.write(screen_pos, d1);
        self.d2.write(screen_pos, d2);
    }

    pub fn size(&self) -> UVec2 {
        self.d0.size()
    }
}

#[cfg(test)]
mod tests {
    use glam::vec3;

    use super::*;

    fn entry(position: Vec3, normal: Vec3) -> GBufferEntry {
        GBufferEntry {
            position,
            depth: 10.0,
            normal,
            roughness: 0.5,
            albedo: Vec3::ONE,
            metallic: 0.0,
        }
    }

    #[test]
    fn serialization() {
        let target = entry(vec3(1.0, 2.0, 3.0), Vec3::Y);

        assert_eq!(target, GBufferEntry::unpack(target.pack()));
    }

    #[test]
    fn similarity() {
        let a = entry(vec3(0.0, 0.0, 0.0), Vec3::Y);

        // ---
        // Case 1: the same surface

        assert_eq!(1.0, a.evaluate_similarity_to(&a));

        // ---
        // Case 2: perpendicular surface

        let b = entry(vec3(0.0, 0.0, 0.0), Vec3::X);

        assert_eq!(0.0, a.evaluate_similarity_to(&b));

        // ---
        // Case 3: far-away surface

        let c = entry(vec3(5.0, 0.0, 0.0), Vec3::Y);

        assert_eq!(0.0, a.evaluate_similarity_to(&c));

        // ---
        // Case 4: sky

        assert_eq!(0.0, a.evaluate_similarity_to(&GBufferEntry::default()));
    }
}
