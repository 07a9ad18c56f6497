use core::mem;
use core::sync::atomic::{AtomicU32, Ordering};

use bytemuck::Pod;
use glam::{UVec2, Vec4};

/// Read-write view into a storage buffer.
///
/// Device memory is a sequence of 32-bit words and every access to it is
/// atomic, so kernels running concurrently within one dispatch can share a
/// buffer without locks. Plain loads and stores are relaxed; ordering between
/// dispatches is provided by the dispatcher's barrier.
#[derive(Clone, Copy)]
pub struct Storage<'a> {
    words: &'a [AtomicU32],
}

impl<'a> Storage<'a> {
    pub fn new(words: &'a [AtomicU32]) -> Self {
        Self { words }
    }

    /// Returns the length of this buffer, in words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn load(&self, idx: usize) -> u32 {
        self.words[idx].load(Ordering::Relaxed)
    }

    pub fn store(&self, idx: usize, val: u32) {
        self.words[idx].store(val, Ordering::Relaxed);
    }

    pub fn load_f32(&self, idx: usize) -> f32 {
        f32::from_bits(self.load(idx))
    }

    pub fn store_f32(&self, idx: usize, val: f32) {
        self.store(idx, val.to_bits());
    }

    /// Adds `val` to given word and returns the word's previous value.
    pub fn atomic_add(&self, idx: usize, val: u32) -> u32 {
        self.words[idx].fetch_add(val, Ordering::AcqRel)
    }

    pub fn atomic_max(&self, idx: usize, val: u32) -> u32 {
        self.words[idx].fetch_max(val, Ordering::AcqRel)
    }

    /// Stores `new` if the word is equal to `current`; returns the value that
    /// was there before, whether the exchange succeeded or not.
    pub fn atomic_cas(&self, idx: usize, current: u32, new: u32) -> u32 {
        match self.words[idx].compare_exchange(
            current,
            new,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(prev) | Err(prev) => prev,
        }
    }

    /// Reads `idx`-th item of type `T`, treating this buffer as `[T]`.
    pub fn read<T>(&self, idx: usize) -> T
    where
        T: Pod,
    {
        let base = idx * Self::words_of::<T>();
        let mut val = T::zeroed();

        for (offset, chunk) in bytemuck::bytes_of_mut(&mut val)
            .chunks_exact_mut(4)
            .enumerate()
        {
            chunk.copy_from_slice(&self.load(base + offset).to_ne_bytes());
        }

        val
    }

    /// Writes `idx`-th item of type `T`, treating this buffer as `[T]`.
    pub fn write<T>(&self, idx: usize, val: T)
    where
        T: Pod,
    {
        let base = idx * Self::words_of::<T>();

        for (offset, chunk) in
            bytemuck::bytes_of(&val).chunks_exact(4).enumerate()
        {
            let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);

            self.store(base + offset, word);
        }
    }

    fn words_of<T>() -> usize {
        debug_assert_eq!(0, mem::size_of::<T>() % 4);

        mem::size_of::<T>() / 4
    }
}

/// Read-write view into an RGBA32F texture (a single mip level of it).
#[derive(Clone, Copy)]
pub struct Tex<'a> {
    texels: Storage<'a>,
    size: UVec2,
}

impl<'a> Tex<'a> {
    pub fn new(words: &'a [AtomicU32], size: UVec2) -> Self {
        debug_assert_eq!(words.len(), (size.x * size.y * 4) as usize);

        Self {
            texels: Storage::new(words),
            size,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn contains(&self, pos: UVec2) -> bool {
        pos.x < self.size.x && pos.y < self.size.y
    }

    pub fn read(&self, pos: UVec2) -> Vec4 {
        self.texels.read(self.idx(pos))
    }

    pub fn write(&self, pos: UVec2, val: Vec4) {
        self.texels.write(self.idx(pos), val);
    }

    fn idx(&self, pos: UVec2) -> usize {
        (pos.y * self.size.x + pos.x) as usize
    }
}

#[cfg(test)]
mod tests {
    use glam::vec4;

    use super::*;

    fn words(len: usize) -> Vec<AtomicU32> {
        (0..len).map(|_| AtomicU32::new(0)).collect()
    }

    #[test]
    fn typed_access() {
        let words = words(16);
        let storage = Storage::new(&words);

        storage.write(1, vec4(1.0, 2.0, 3.0, 4.0));
        storage.write::<[u32; 2]>(1, [0xcafe, 0xbabe]);

        assert_eq!(vec4(1.0, 2.0, 3.0, 4.0), storage.read::<Vec4>(1));
        assert_eq!(0xcafe, storage.load(2));
        assert_eq!(0xbabe, storage.load(3));
    }

    #[test]
    fn atomics() {
        let words = words(2);
        let storage = Storage::new(&words);

        // ---
        // Case 1: successful exchange

        assert_eq!(0, storage.atomic_cas(0, 0, 123));
        assert_eq!(123, storage.load(0));

        // ---
        // Case 2: failed exchange

        assert_eq!(123, storage.atomic_cas(0, 0, 456));
        assert_eq!(123, storage.load(0));

        // ---
        // Case 3: counters

        assert_eq!(0, storage.atomic_add(1, 5));
        assert_eq!(5, storage.atomic_add(1, 5));
        assert_eq!(10, storage.atomic_max(1, 7));
        assert_eq!(10, storage.load(1));
    }

    #[test]
    fn texels() {
        let words = words(4 * 3 * 2);
        let tex = Tex::new(&words, UVec2::new(3, 2));

        tex.write(UVec2::new(2, 1), Vec4::ONE);

        assert_eq!(Vec4::ONE, tex.read(UVec2::new(2, 1)));
        assert_eq!(Vec4::ZERO, tex.read(UVec2::new(1, 1)));
        assert!(tex.contains(UVec2::new(2, 1)));
        assert!(!tex.contains(UVec2::new(3, 0)));
    }
}
