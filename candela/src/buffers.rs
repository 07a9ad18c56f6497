mod double_buffered;
mod readback;
mod storage_buffer;
mod texture;

use std::mem;
use std::sync::atomic::AtomicU32;

use bytemuck::Pod;

pub use self::double_buffered::*;
pub use self::readback::*;
pub use self::storage_buffer::*;
pub use self::texture::*;

/// Piece of device memory.
pub trait Buffer {
    fn label(&self) -> &str;
    fn words(&self) -> &[AtomicU32];

    /// Returns the size of this buffer, in bytes.
    fn bytes(&self) -> usize {
        self.words().len() * 4
    }
}

/// Returns how many words `count` items of type `T` take.
pub fn words_of<T>(count: usize) -> usize
where
    T: Pod,
{
    count * mem::size_of::<T>() / 4
}
