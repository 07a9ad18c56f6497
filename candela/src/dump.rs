use std::path::Path;

use glam::{Vec3, Vec4Swizzles};
use image::{ImageBuffer, Rgb};
use log::debug;

use crate::{Buffer, Error, Result, Texture};

/// Writes top mip level of given texture as a tone-mapped PNG.
pub fn dump(texture: &Texture, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let size = texture.size();

    debug!("Dumping `{}` into {}", texture.label(), path.display());

    let mut image = ImageBuffer::<Rgb<u8>, _>::new(size.x, size.y);

    for (texel, pixel) in texture.texels().into_iter().zip(image.pixels_mut()) {
        *pixel = Rgb(encode(texel.xyz()));
    }

    image.save(path).map_err(|source| Error::Dump {
        label: texture.label().into(),
        source,
    })
}

/// Maps linear HDR color into 8-bit sRGB-ish values (Reinhard + gamma 2.2).
fn encode(color: Vec3) -> [u8; 3] {
    let color = if color.is_finite() {
        color.max(Vec3::ZERO)
    } else {
        Vec3::ZERO
    };

    let color = (color / (color + 1.0)).powf(1.0 / 2.2) * 255.0;

    [color.x as u8, color.y as u8, color.z as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode() {
        assert_eq!([0, 0, 0], super::encode(Vec3::ZERO));
        assert_eq!([0, 0, 0], super::encode(Vec3::splat(-1.0)));
        assert_eq!([0, 0, 0], super::encode(Vec3::splat(f32::NAN)));
        assert_eq!([186, 186, 186], super::encode(Vec3::ONE));
        assert_eq!([254, 0, 0], super::encode(Vec3::new(1.0e6, 0.0, 0.0)));
    }
}
