pub trait U32Ext
where
    Self: Sized,
{
    /// Returns PCG hash of this number.
    ///
    /// See:
    /// - https://www.reedbeta.com/blog/hash-functions-for-gpu-rendering/
    fn hash(self) -> Self;

    /// Returns `ceil(log2(self))`, with `0` and `1` both mapping to `0`.
    fn log2_ceil(self) -> Self;
}

impl U32Ext for u32 {
    fn hash(self) -> Self {
        let state = self.wrapping_mul(747796405).wrapping_add(2891336453);

        let word = ((state >> ((state >> 28) + 4)) ^ state)
            .wrapping_mul(277803737);

        (word >> 22) ^ word
    }

    fn log2_ceil(self) -> Self {
        if self <= 1 {
            0
        } else {
            32 - (self - 1).leading_zeros()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash() {
        assert_eq!(0u32.hash(), 0u32.hash());
        assert_ne!(1u32.hash(), 2u32.hash());
    }

    #[test]
    fn log2_ceil() {
        assert_eq!(0, 0u32.log2_ceil());
        assert_eq!(0, 1u32.log2_ceil());
        assert_eq!(1, 2u32.log2_ceil());
        assert_eq!(2, 3u32.log2_ceil());
        assert_eq!(2, 4u32.log2_ceil());
        assert_eq!(8, 240u32.log2_ceil());
    }
}
