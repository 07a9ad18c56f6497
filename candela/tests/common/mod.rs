#![allow(dead_code)]

use candela::gpu::{Hit, HitMaterial, Ray, RayFlags, SceneQuery};
use candela::{Camera, Device, DeviceDescriptor, GBuffer, GiConfig, GiPipeline};
use glam::{vec3, UVec2, Vec3};

pub const SIZE: UVec2 = UVec2::new(64, 48);

#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub point: Vec3,
    pub normal: Vec3,
    pub material: HitMaterial,
}

/// Scene made of infinite planes.
#[derive(Clone, Debug, Default)]
pub struct Planes {
    pub planes: Vec<Plane>,
}

impl SceneQuery for Planes {
    fn intersect(&self, ray: Ray, _: RayFlags) -> Option<Hit> {
        self.planes
            .iter()
            .filter_map(|plane| {
                let denom = plane.normal.dot(ray.direction());

                if denom.abs() < 1e-6 {
                    return None;
                }

                let distance =
                    plane.normal.dot(plane.point - ray.origin()) / denom;

                (distance > 1e-4).then(|| Hit {
                    position: ray.at(distance),
                    normal: plane.normal,
                    distance,
                    material: plane.material,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// Returns a floor with a glowing wall behind it.
pub fn room(emissive: Vec3) -> Planes {
    Planes {
        planes: vec![
            Plane {
                point: Vec3::ZERO,
                normal: Vec3::Y,
                material: HitMaterial {
                    albedo: Vec3::splat(0.8),
                    roughness: 0.3,
                    ..Default::default()
                },
            },
            Plane {
                point: vec3(0.0, 0.0, -2.0),
                normal: Vec3::Z,
                material: HitMaterial {
                    albedo: Vec3::splat(0.5),
                    emissive,
                    roughness: 1.0,
                    ..Default::default()
                },
            },
        ],
    }
}

pub fn device() -> Device {
    Device::new(DeviceDescriptor::default()).unwrap()
}

/// Returns a configuration with a small hash grid and reservoir cache, so
/// that tests don't spend most of their time clearing memory.
pub fn config() -> GiConfig {
    GiConfig {
        hash_grid_cache_num_buckets: 8,
        hash_grid_cache_num_tiles_per_bucket: 2,
        reservoir_cache_num_cells: 8,
        ..Default::default()
    }
}

pub fn camera(size: UVec2) -> Camera {
    Camera::looking_at(vec3(0.0, 1.0, 3.0), vec3(0.0, 0.5, 0.0), size)
}

pub fn render(
    device: &Device,
    pipeline: &mut GiPipeline,
    scene: &Planes,
    camera: &Camera,
    frames: usize,
) {
    let gbuffer = GBuffer::new(device, "test_gbuffer", camera.viewport_size).unwrap();

    gbuffer.trace(device, scene, camera);

    for _ in 0..frames {
        pipeline.render(device, scene, camera, &gbuffer).unwrap();
    }
}
