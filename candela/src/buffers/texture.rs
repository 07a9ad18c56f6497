use std::ops::Range;
use std::sync::atomic::AtomicU32;

use derivative::Derivative;
use glam::{UVec2, Vec4};
use log::debug;

use super::Buffer;
use crate::device::Allocation;
use crate::{gpu, Device, Result};

/// RGBA32F texture, optionally with a chain of mip levels.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Texture {
    label: String,
    mips: Vec<(UVec2, Range<usize>)>,

    #[derivative(Debug = "ignore")]
    words: Box<[AtomicU32]>,

    #[derivative(Debug = "ignore")]
    _allocation: Allocation,
}

impl Texture {
    pub fn new(
        device: &Device,
        label: impl AsRef<str>,
        size: UVec2,
    ) -> Result<Self> {
        Self::with_mips(device, label, size, 1)
    }

    /// Creates a texture with `mip_count` levels, each half the size
    /// (rounded up) of the previous one.
    pub fn with_mips(
        device: &Device,
        label: impl AsRef<str>,
        size: UVec2,
        mip_count: u32,
    ) -> Result<Self> {
        let label = label.as_ref();

        debug!(
            "Allocating texture `{label}`; size={}x{}, mips={mip_count}",
            size.x, size.y
        );

        assert!(size.x > 0);
        assert!(size.y > 0);
        assert!(mip_count > 0);

        let mut mips = Vec::new();
        let mut mip_size = size;
        let mut len = 0;

        for _ in 0..mip_count {
            let mip_len = (4 * mip_size.x * mip_size.y) as usize;

            mips.push((mip_size, len..len + mip_len));
            len += mip_len;
            mip_size = ((mip_size + 1) / 2).max(UVec2::ONE);
        }

        let (words, allocation) = device.allocate(label, len)?;

        Ok(Self {
            label: label.into(),
            mips,
            words,
            _allocation: allocation,
        })
    }

    pub fn size(&self) -> UVec2 {
        self.mips[0].0
    }

    pub fn mip_count(&self) -> u32 {
        self.mips.len() as u32
    }

    pub fn mip_size(&self, mip: u32) -> UVec2 {
        self.mips[mip as usize].0
    }

    pub fn view(&self) -> gpu::Tex<'_> {
        self.mip(0)
    }

    pub fn mip(&self, mip: u32) -> gpu::Tex<'_> {
        let (size, range) = &self.mips[mip as usize];

        gpu::Tex::new(&self.words[range.clone()], *size)
    }

    pub fn read(&self, pos: UVec2) -> Vec4 {
        self.view().read(pos)
    }

    pub fn write(&self, pos: UVec2, val: Vec4) {
        self.view().write(pos, val);
    }

    /// Returns texels of the top mip level, row by row.
    pub fn texels(&self) -> Vec<Vec4> {
        let size = self.size();
        let view = self.view();

        (0..size.y)
            .flat_map(|y| (0..size.x).map(move |x| UVec2::new(x, y)))
            .map(|pos| view.read(pos))
            .collect()
    }
}

impl Buffer for Texture {
    fn label(&self) -> &str {
        &self.label
    }

    fn words(&self) -> &[AtomicU32] {
        &self.words
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceDescriptor;

    #[test]
    fn mips() {
        let device = Device::new(DeviceDescriptor::default()).unwrap();

        let texture =
            Texture::with_mips(&device, "test", UVec2::new(5, 3), 4).unwrap();

        assert_eq!(UVec2::new(5, 3), texture.mip_size(0));
        assert_eq!(UVec2::new(3, 2), texture.mip_size(1));
        assert_eq!(UVec2::new(2, 1), texture.mip_size(2));
        assert_eq!(UVec2::new(1, 1), texture.mip_size(3));
        assert_eq!(4 * (15 + 6 + 2 + 1) * 4, texture.bytes());

        texture.mip(2).write(UVec2::new(1, 0), Vec4::ONE);

        assert_eq!(Vec4::ONE, texture.mip(2).read(UVec2::new(1, 0)));
        assert_eq!(Vec4::ZERO, texture.mip(1).read(UVec2::new(1, 0)));
        assert!(texture.texels().iter().all(|texel| *texel == Vec4::ZERO));
    }
}
