use glam::UVec2;

use crate::gpu::{self, GBufferEntry, SceneQuery};
use crate::{Buffer, Camera, Device, Result, Texture};

/// Primary surfaces seen through each pixel, packed into three textures.
///
/// See: [`gpu::GBufferEntry`].
#[derive(Debug)]
pub struct GBuffer {
    d0: Texture,
    d1: Texture,
    d2: Texture,
}

impl GBuffer {
    pub fn new(
        device: &Device,
        label: impl AsRef<str>,
        size: UVec2,
    ) -> Result<Self> {
        let label = label.as_ref();

        Ok(Self {
            d0: Texture::new(device, format!("{label}_d0"), size)?,
            d1: Texture::new(device, format!("{label}_d1"), size)?,
            d2: Texture::new(device, format!("{label}_d2"), size)?,
        })
    }

    pub fn size(&self) -> UVec2 {
        self.d0.size()
    }

    pub fn map(&self) -> gpu::GBufferMap<'_> {
        gpu::GBufferMap {
            d0: self.d0.view(),
            d1: self.d1.view(),
            d2: self.d2.view(),
        }
    }

    pub fn get(&self, pos: UVec2) -> GBufferEntry {
        self.map().get(pos)
    }

    pub fn set(&self, pos: UVec2, entry: GBufferEntry) {
        self.map().set(pos, entry);
    }

    /// Fills the g-buffer by casting one primary ray through the center of
    /// each pixel.
    pub fn trace(&self, device: &Device, scene: &dyn SceneQuery, camera: &Camera) {
        let camera = camera.serialize(None);
        let map = self.map();

        device.dispatch_2d("gbuffer_trace", self.size(), |pixel| {
            let ray = camera.ray(pixel);

            let entry = scene
                .intersect(ray, Default::default())
                .map(|hit| GBufferEntry {
                    position: hit.position,
                    depth: hit.distance,
                    normal: hit.facing_normal(ray.direction()),
                    roughness: hit.material.roughness,
                    albedo: hit.material.albedo,
                    metallic: hit.material.metallic,
                })
                .unwrap_or_default();

            map.set(pixel, entry);
        });
    }

    pub(crate) fn copy_from(&self, device: &Device, other: &Self) {
        device.copy(&other.d0, &self.d0);
        device.copy(&other.d1, &self.d1);
        device.copy(&other.d2, &self.d2);
    }

    pub(crate) fn clear(&self, device: &Device) {
        device.clear(&self.d0);
        device.clear(&self.d1);
        device.clear(&self.d2);
    }

    pub fn bytes(&self) -> usize {
        self.d0.bytes() + self.d1.bytes() + self.d2.bytes()
    }
}
