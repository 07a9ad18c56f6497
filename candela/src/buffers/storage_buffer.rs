use std::any;
use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::Pod;
use derivative::Derivative;
use log::debug;

use super::{words_of, Buffer};
use crate::device::Allocation;
use crate::{gpu, Device, Result};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct StorageBuffer {
    label: String,

    #[derivative(Debug = "ignore")]
    words: Box<[AtomicU32]>,

    #[derivative(Debug = "ignore")]
    _allocation: Allocation,
}

impl StorageBuffer {
    /// Allocates a zeroed buffer of `len` words.
    pub fn new(
        device: &Device,
        label: impl AsRef<str>,
        len: usize,
    ) -> Result<Self> {
        let label = label.as_ref();

        debug!("Allocating storage buffer `{label}`; len={len}");

        let (words, allocation) = device.allocate(label, len)?;

        Ok(Self {
            label: label.into(),
            words,
            _allocation: allocation,
        })
    }

    /// Allocates a zeroed buffer for `count` items of type `T`.
    pub fn new_of<T>(
        device: &Device,
        label: impl AsRef<str>,
        count: usize,
    ) -> Result<Self>
    where
        T: Pod,
    {
        let label = label.as_ref();

        debug!(
            "Allocating storage buffer `{label}`; ty={}, count={count}",
            any::type_name::<T>(),
        );

        let (words, allocation) =
            device.allocate(label, words_of::<T>(count))?;

        Ok(Self {
            label: label.into(),
            words,
            _allocation: allocation,
        })
    }

    pub fn view(&self) -> gpu::Storage<'_> {
        gpu::Storage::new(&self.words)
    }

    /// Returns the length of this buffer, in words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Reads `idx`-th item of type `T`.
    pub fn read<T>(&self, idx: usize) -> T
    where
        T: Pod,
    {
        self.view().read(idx)
    }

    pub fn write<T>(&self, idx: usize, val: T)
    where
        T: Pod,
    {
        self.view().write(idx, val);
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.words
            .iter()
            .map(|word| word.load(Ordering::Relaxed))
            .collect()
    }
}

impl Buffer for StorageBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn words(&self) -> &[AtomicU32] {
        &self.words
    }
}
