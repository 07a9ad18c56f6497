use core::f32::consts::PI;

use glam::{UVec2, Vec3, Vec4, Vec4Swizzles};

use crate::{GBufferMap, GlossyReflectionsParams, ShadingParams, Tex};

/// Combines denoised irradiance and reflections into the final indirect
/// lighting of each pixel.
pub struct GiResolve<'a> {
    pub shading: &'a ShadingParams,
    pub glossy: &'a GlossyReflectionsParams,
    pub gbuffer: GBufferMap<'a>,
    pub irradiance: Tex<'a>,
    pub reflections: Tex<'a>,
    pub output: Tex<'a>,
}

impl<'a> GiResolve<'a> {
    pub fn run(self, pixel: UVec2) {
        let surface = self.gbuffer.get(pixel);

        if !surface.is_some() {
            self.output.write(pixel, Vec4::ZERO);
            return;
        }

        let albedo = self.shading.albedo(surface.albedo);
        let irradiance = self.irradiance.read(pixel).xyz();

        let diffuse = albedo / PI * irradiance * (1.0 - surface.metallic);

        let specular =
            if surface.roughness <= self.glossy.high_roughness_threshold {
                Vec3::splat(0.04).lerp(albedo, surface.metallic)
                    * self.reflections.read(pixel).xyz()
            } else {
                Vec3::ZERO
            };

        self.output.write(pixel, (diffuse + specular).extend(1.0));
    }
}
