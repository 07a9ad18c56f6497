pub trait F32Ext
where
    Self: Sized,
{
    fn sqr(self) -> Self;
    fn saturate(self) -> Self;

    /// Returns this value if it's finite and non-negative, zero otherwise;
    /// used to sanitize sampling weights.
    fn as_weight(self) -> Self;
}

impl F32Ext for f32 {
    fn sqr(self) -> Self {
        self * self
    }

    fn saturate(self) -> Self {
        self.clamp(0.0, 1.0)
    }

    fn as_weight(self) -> Self {
        if self.is_finite() && self > 0.0 {
            self
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_weight() {
        assert_eq!(1.5, 1.5f32.as_weight());
        assert_eq!(0.0, (-1.5f32).as_weight());
        assert_eq!(0.0, f32::NAN.as_weight());
        assert_eq!(0.0, f32::INFINITY.as_weight());
    }
}
