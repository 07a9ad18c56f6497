use core::f32::consts::PI;

use glam::{Vec3, Vec4, Vec4Swizzles};

use crate::{F32Ext, Noise, Storage, Vec3Ext};

/// Weighted reservoir, as used by resampled importance sampling.
///
/// See:
/// - https://research.nvidia.com/sites/default/files/pubs/2020-07_Spatiotemporal-reservoir-resampling/ReSTIR.pdf
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Reservoir<T> {
    pub sample: T,

    /// Unbiased contribution weight of `sample` (`W`); valid after
    /// [`Self::finalize()`].
    pub weight: f32,

    /// Sum of weights of all candidates seen so far.
    pub weight_sum: f32,

    /// Number of candidates seen so far (`M`).
    pub count: f32,
}

impl<T> Reservoir<T>
where
    T: Clone + Copy,
{
    /// Streams a candidate into this reservoir; returns whether the
    /// candidate got accepted.
    ///
    /// Weights that are negative or non-finite count as zero.
    pub fn update(&mut self, noise: &mut Noise, sample: T, weight: f32) -> bool {
        let weight = weight.as_weight();

        self.count += 1.0;
        self.weight_sum += weight;

        if weight > 0.0 && noise.sample() * self.weight_sum <= weight {
            self.sample = sample;
            true
        } else {
            false
        }
    }

    /// Merges another reservoir built for the same target function; the
    /// weight sums add up and `rhs`'s sample gets picked with probability
    /// proportional to its weight sum.
    pub fn combine(&mut self, noise: &mut Noise, rhs: &Self) -> bool {
        let rhs_weight_sum = rhs.weight_sum.as_weight();

        self.count += rhs.count;
        self.weight_sum += rhs_weight_sum;

        if rhs_weight_sum > 0.0
            && noise.sample() * self.weight_sum <= rhs_weight_sum
        {
            self.sample = rhs.sample;
            true
        } else {
            false
        }
    }

    /// Merges another, already finalized reservoir, re-weighting it by the
    /// target function evaluated at `rhs`'s sample from this reservoir's
    /// point of view.
    pub fn merge(&mut self, noise: &mut Noise, rhs: &Self, pdf: f32) -> bool {
        if rhs.count <= 0.0 {
            return false;
        }

        self.count += rhs.count - 1.0;
        self.update(noise, rhs.sample, rhs.weight * rhs.count * pdf)
    }

    /// Computes the contribution weight of the selected sample.
    pub fn finalize(&mut self, pdf: f32) {
        let t = self.count * pdf;

        self.weight = if t == 0.0 { 0.0 } else { self.weight_sum / t };
    }

    /// Limits the number of candidates this reservoir represents, scaling its
    /// weight sum accordingly.
    pub fn clamp_count(&mut self, max: f32) {
        if self.count > max {
            self.weight_sum *= max / self.count;
            self.count = max;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.weight_sum <= 0.0
    }
}

/// Candidate indirect lighting sample: radiance leaving `position` towards
/// the surface that traced it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IndirectSample {
    pub position: Vec3,
    pub normal: Vec3,
    pub radiance: Vec3,

    /// Solid-angle pdf this sample was generated with.
    pub source_pdf: f32,
}

impl IndirectSample {
    /// Returns the (unnormalized) target function of this sample as seen from
    /// given surface point: luminance times the cosine term.
    pub fn target_pdf(&self, origin: Vec3, normal: Vec3) -> f32 {
        let dir = (self.position - origin).normalize_or_zero();

        self.radiance.luma() * normal.dot(dir).max(0.0)
    }

    /// Returns the cosine-weighted radiance (`L cos / π`) of this sample as
    /// seen from given surface point.
    pub fn contribution(&self, origin: Vec3, normal: Vec3) -> Vec3 {
        let dir = (self.position - origin).normalize_or_zero();

        self.radiance * normal.dot(dir).max(0.0) / PI
    }
}

pub type IndirectReservoir = Reservoir<IndirectSample>;

impl IndirectReservoir {
    pub fn read(buffer: Storage, idx: usize) -> Self {
        let [d0, d1, d2, d3] = buffer.read::<[Vec4; 4]>(idx);

        Self {
            sample: IndirectSample {
                position: d0.xyz(),
                normal: d1.xyz(),
                radiance: d2.xyz(),
                source_pdf: d0.w,
            },
            weight: d1.w,
            weight_sum: d2.w,
            count: d3.x,
        }
    }

    pub fn write(&self, buffer: Storage, idx: usize) {
        buffer.write(
            idx,
            [
                self.sample.position.extend(self.sample.source_pdf),
                self.sample.normal.extend(self.weight),
                self.sample.radiance.extend(self.weight_sum),
                Vec4::new(self.count, 0.0, 0.0, 0.0),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::AtomicU32;

    use glam::{vec3, UVec2};

    use super::*;

    #[test]
    fn update() {
        let mut noise = Noise::new(0, UVec2::ZERO);
        let mut reservoir = Reservoir::<u32>::default();

        // ---
        // Case 1: the first candidate with a positive weight always wins

        assert!(reservoir.update(&mut noise, 1, 2.0));
        assert_eq!(1, reservoir.sample);

        // ---
        // Case 2: zero, negative and non-finite weights never win

        assert!(!reservoir.update(&mut noise, 2, 0.0));
        assert!(!reservoir.update(&mut noise, 3, -1.0));
        assert!(!reservoir.update(&mut noise, 4, f32::NAN));
        assert_eq!(1, reservoir.sample);
        assert_eq!(2.0, reservoir.weight_sum);
        assert_eq!(4.0, reservoir.count);

        // ---
        // Case 3: weight sum bounds every weight seen

        reservoir.update(&mut noise, 5, 10.0);

        assert!(reservoir.weight_sum >= 10.0);
    }

    #[test]
    fn combine() {
        let mut noise = Noise::new(0, UVec2::ZERO);
        let mut a = Reservoir::<u32>::default();
        let mut b = Reservoir::<u32>::default();

        a.update(&mut noise, 1, 1.5);
        a.update(&mut noise, 2, 2.25);
        b.update(&mut noise, 3, 0.5);
        b.update(&mut noise, 4, 4.0);

        let expected = a.weight_sum + b.weight_sum;

        a.combine(&mut noise, &b);

        assert_eq!(expected, a.weight_sum);
        assert_eq!(4.0, a.count);
    }

    #[test]
    fn acceptance_is_proportional_to_weights() {
        const TRIALS: usize = 40_000;

        let weights = [1.0, 2.0, 3.0, 4.0];
        let mut noise = Noise::new(1234, UVec2::new(1, 2));

        // ---
        // Case 1: streaming all candidates into one reservoir

        let mut hits = [0usize; 4];

        for _ in 0..TRIALS {
            let mut reservoir = Reservoir::default();

            for (idx, weight) in weights.iter().enumerate() {
                reservoir.update(&mut noise, idx, *weight);
            }

            hits[reservoir.sample] += 1;
        }

        for (idx, weight) in weights.iter().enumerate() {
            let actual = hits[idx] as f32 / TRIALS as f32;

            assert!((actual - weight / 10.0).abs() < 0.015);
        }

        // ---
        // Case 2: combining two partial reservoirs

        let mut hits = [0usize; 4];

        for _ in 0..TRIALS {
            let mut a = Reservoir::default();
            let mut b = Reservoir::default();

            a.update(&mut noise, 0, weights[0]);
            a.update(&mut noise, 1, weights[1]);
            b.update(&mut noise, 2, weights[2]);
            b.update(&mut noise, 3, weights[3]);
            a.combine(&mut noise, &b);

            hits[a.sample] += 1;
        }

        for (idx, weight) in weights.iter().enumerate() {
            let actual = hits[idx] as f32 / TRIALS as f32;

            assert!((actual - weight / 10.0).abs() < 0.015);
        }
    }

    #[test]
    fn merge() {
        let mut noise = Noise::new(0, UVec2::ZERO);

        // Finalized single-candidate reservoir: `W = w / p`
        let candidate = Reservoir {
            sample: 7u32,
            weight: 4.0,
            weight_sum: 2.0,
            count: 1.0,
        };

        let mut reservoir = Reservoir::default();

        // ---
        // Case 1: candidate gets re-weighted by the new target function

        assert!(reservoir.merge(&mut noise, &candidate, 0.25));
        assert_eq!(7, reservoir.sample);
        assert_eq!(1.0, reservoir.weight_sum);
        assert_eq!(1.0, reservoir.count);

        // ---
        // Case 2: empty reservoirs are skipped altogether

        assert!(!reservoir.merge(&mut noise, &Reservoir::default(), 1.0));
        assert_eq!(1.0, reservoir.count);

        // ---
        // Case 3: candidate invisible from the new point still counts

        assert!(!reservoir.merge(&mut noise, &candidate, 0.0));
        assert_eq!(1.0, reservoir.weight_sum);
        assert_eq!(2.0, reservoir.count);
        assert!(!reservoir.is_empty());
        assert!(Reservoir::<u32>::default().is_empty());
    }

    #[test]
    fn finalize_and_clamp() {
        let mut reservoir = Reservoir {
            sample: 0u32,
            weight: 0.0,
            weight_sum: 8.0,
            count: 4.0,
        };

        reservoir.finalize(0.5);

        assert_eq!(4.0, reservoir.weight);

        reservoir.clamp_count(2.0);

        assert_eq!(2.0, reservoir.count);
        assert_eq!(4.0, reservoir.weight_sum);

        reservoir.finalize(0.0);

        assert_eq!(0.0, reservoir.weight);
    }

    #[test]
    fn serialization() {
        let words: Vec<_> = (0..32).map(|_| AtomicU32::new(0)).collect();
        let buffer = Storage::new(&words);

        let target = IndirectReservoir {
            sample: IndirectSample {
                position: vec3(1.0, 2.0, 3.0),
                normal: vec3(0.0, 1.0, 0.0),
                radiance: vec3(4.0, 5.0, 6.0),
                source_pdf: 0.25,
            },
            weight: 1.5,
            weight_sum: 2.5,
            count: 3.0,
        };

        target.write(buffer, 1);

        assert_eq!(target, IndirectReservoir::read(buffer, 1));
        assert_eq!(IndirectReservoir::default(), IndirectReservoir::read(buffer, 0));
    }
}
