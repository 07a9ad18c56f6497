use glam::UVec2;

use crate::{Device, Result, StorageBuffer, Texture};

/// Index of the current half of every double-buffered resource; the other
/// half holds the previous frame's data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferIndex(bool);

impl BufferIndex {
    pub fn curr(&self) -> usize {
        self.0 as usize
    }

    pub fn prev(&self) -> usize {
        1 - self.curr()
    }

    pub fn flip(&mut self) {
        self.0 = !self.0;
    }
}

#[derive(Debug)]
pub struct DoubleBuffered<T> {
    a: T,
    b: T,
}

impl DoubleBuffered<Texture> {
    /// Creates a double-buffered texture.
    ///
    /// See: [`Texture::with_mips()`].
    pub fn new(
        device: &Device,
        label: impl AsRef<str>,
        size: UVec2,
        mip_count: u32,
    ) -> Result<Self> {
        let label = label.as_ref();

        Ok(Self {
            a: Texture::with_mips(device, format!("{label}_a"), size, mip_count)?,
            b: Texture::with_mips(device, format!("{label}_b"), size, mip_count)?,
        })
    }
}

impl DoubleBuffered<StorageBuffer> {
    /// Creates a double-buffered storage buffer.
    ///
    /// See: [`StorageBuffer::new()`].
    pub fn new(
        device: &Device,
        label: impl AsRef<str>,
        len: usize,
    ) -> Result<Self> {
        let label = label.as_ref();

        Ok(Self {
            a: StorageBuffer::new(device, format!("{label}_a"), len)?,
            b: StorageBuffer::new(device, format!("{label}_b"), len)?,
        })
    }
}

impl<T> DoubleBuffered<T> {
    pub fn from_fn(mut f: impl FnMut(&str) -> Result<T>) -> Result<Self> {
        Ok(Self {
            a: f("a")?,
            b: f("b")?,
        })
    }

    pub fn get(&self, alternate: bool) -> &T {
        if alternate {
            &self.b
        } else {
            &self.a
        }
    }

    pub fn curr(&self, index: BufferIndex) -> &T {
        self.get(index.curr() == 1)
    }

    pub fn prev(&self, index: BufferIndex) -> &T {
        self.get(index.prev() == 1)
    }

    pub fn both(&self) -> [&T; 2] {
        [&self.a, &self.b]
    }
}
