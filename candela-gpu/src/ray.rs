use glam::Vec3;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Ray {
    origin: Vec3,
    direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Creates a ray leaving given surface, offset along the surface's normal
    /// so that it doesn't hit the surface itself.
    pub fn from_surface(position: Vec3, normal: Vec3, direction: Vec3) -> Self {
        Self::new(position + normal * crate::RAY_EPSILON, direction)
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RayFlags {
    /// Whether alpha-tested geometry should let rays through its transparent
    /// parts.
    pub alpha_test: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct HitMaterial {
    pub albedo: Vec3,
    pub emissive: Vec3,
    pub roughness: f32,
    pub metallic: f32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Hit {
    pub position: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub material: HitMaterial,
}

impl Hit {
    /// Returns hit's normal, flipped if needed so that it faces the ray that
    /// produced the hit.
    pub fn facing_normal(&self, ray_direction: Vec3) -> Vec3 {
        if self.normal.dot(ray_direction) > 0.0 {
            -self.normal
        } else {
            self.normal
        }
    }
}

/// Scene, as seen by the kernels: an opaque ray-caster plus a couple of
/// lighting queries.
pub trait SceneQuery: Sync {
    /// Returns the nearest hit along given ray, if any.
    fn intersect(&self, ray: Ray, flags: RayFlags) -> Option<Hit>;

    /// Returns radiance coming from the environment along given direction.
    fn sky(&self, _direction: Vec3) -> Vec3 {
        Vec3::ZERO
    }

    /// Returns radiance reflected by given hit towards the ray's origin due
    /// to lights that rays can't hit (e.g. point lights); albedo included.
    fn direct_lighting(&self, _hit: &Hit) -> Vec3 {
        Vec3::ZERO
    }
}
