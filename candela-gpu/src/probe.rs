use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::{GBufferEntry, Storage, INVALID_ID};

/// Lifecycle of a screen probe within a frame.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeState {
    Empty = 0,
    Reprojected = 1,
    Spawned = 2,
    Sampled = 3,
    Populated = 4,
    Blended = 5,
    Cached = 6,
}

impl ProbeState {
    pub fn from_u32(val: u32) -> Self {
        match val {
            1 => Self::Reprojected,
            2 => Self::Spawned,
            3 => Self::Sampled,
            4 => Self::Populated,
            5 => Self::Blended,
            6 => Self::Cached,
            _ => Self::Empty,
        }
    }
}

/// Surface a probe (or a cached probe slot) is placed on.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ProbeData {
    pub position: Vec3,

    /// Distance from the camera; zero for tiles that see only the sky.
    pub depth: f32,
    pub normal: Vec3,
    pub state: u32,

    /// Cache slot this probe's radiance lives in, or [`INVALID_ID`].
    pub slot: u32,
}

impl ProbeData {
    const WORDS: usize = 9;
    const STATE_WORD: usize = 7;

    pub fn from_surface(surface: &GBufferEntry) -> Self {
        Self {
            position: surface.position,
            depth: surface.depth,
            normal: surface.normal,
            state: ProbeState::Empty as u32,
            slot: INVALID_ID,
        }
    }

    pub fn read(buffer: Storage, idx: u32) -> Self {
        buffer.read(idx as usize)
    }

    pub fn write(&self, buffer: Storage, idx: u32) {
        buffer.write(idx as usize, *self);
    }

    pub fn state(&self) -> ProbeState {
        ProbeState::from_u32(self.state)
    }

    /// Updates just the state of given probe, leaving the rest of its words
    /// alone, so that other work items can keep reading them.
    pub fn store_state(buffer: Storage, idx: u32, state: ProbeState) {
        buffer.store(idx as usize * Self::WORDS + Self::STATE_WORD, state as u32);
    }

    pub fn is_some(&self) -> bool {
        self.depth > 0.0
    }

    pub fn has_slot(&self) -> bool {
        self.slot != INVALID_ID
    }

    /// Returns a score `<0.0, 1.0>` telling whether radiance gathered at
    /// `self` can stand in for radiance at `other`.
    ///
    /// Unlike [`GBufferEntry::evaluate_similarity_to()`], this compares the
    /// distance from `other` to `self`'s plane, so that probes sitting a few
    /// pixels apart on the same wall are still considered similar.
    pub fn similarity_to(&self, other: &Self) -> f32 {
        if !self.is_some() || !other.is_some() {
            return 0.0;
        }

        let normal_score = self.normal.dot(other.normal).max(0.0);
        let tolerance = 0.05 * self.depth.max(other.depth);

        let plane_score = {
            let distance = self.normal.dot(other.position - self.position).abs();

            1.0 - (distance / tolerance).min(1.0)
        };

        let distance_score = {
            let distance = self.position.distance(other.position);

            1.0 - (distance / (8.0 * tolerance)).min(1.0)
        };

        normal_score * normal_score * plane_score * distance_score
    }
}

/// Ray cast from a probe through one of its octahedral texels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ProbeRay {
    pub direction: Vec3,

    /// Zero for rays pointing below the probe's surface; those are never
    /// traced and leave their texel unchanged.
    pub active: u32,
}

/// What a probe ray has hit, waiting for the hash grid to provide the
/// radiance arriving there.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ProbeRayHit {
    /// Radiance the hit emits on its own (or sky radiance on a miss).
    pub emitted: Vec3,

    /// Hash grid tile of the hit, or [`INVALID_ID`].
    pub tile: u32,
    pub albedo: Vec3,
    pub cell: u32,
}

impl Default for ProbeRayHit {
    fn default() -> Self {
        Self {
            emitted: Vec3::ZERO,
            tile: INVALID_ID,
            albedo: Vec3::ZERO,
            cell: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::AtomicU32;

    use glam::vec3;

    use super::*;

    fn probe(position: Vec3, normal: Vec3) -> ProbeData {
        ProbeData {
            position,
            depth: 10.0,
            normal,
            state: ProbeState::Reprojected as u32,
            slot: 3,
        }
    }

    #[test]
    fn state_word() {
        let words: Vec<_> = (0..18).map(|_| AtomicU32::new(0)).collect();
        let buffer = Storage::new(&words);
        let target = probe(vec3(1.0, 2.0, 3.0), Vec3::Y);

        target.write(buffer, 1);
        ProbeData::store_state(buffer, 1, ProbeState::Blended);

        let actual = ProbeData::read(buffer, 1);

        assert_eq!(ProbeState::Blended, actual.state());
        assert_eq!(target.position, actual.position);
        assert_eq!(target.slot, actual.slot);
        assert_eq!(ProbeData::default(), ProbeData::read(buffer, 0));
    }

    #[test]
    fn similarity() {
        let a = probe(vec3(0.0, 0.0, 0.0), Vec3::Y);

        // ---
        // Case 1: a bit further along the same plane

        let b = probe(vec3(1.0, 0.0, 0.0), Vec3::Y);

        assert!(a.similarity_to(&b) > 0.5);

        // ---
        // Case 2: above the plane

        let c = probe(vec3(0.0, 1.0, 0.0), Vec3::Y);

        assert_eq!(0.0, a.similarity_to(&c));

        // ---
        // Case 3: perpendicular

        let d = probe(vec3(0.0, 0.0, 0.0), Vec3::X);

        assert_eq!(0.0, a.similarity_to(&d));

        // ---
        // Case 4: sky

        assert_eq!(0.0, a.similarity_to(&ProbeData::default()));
    }
}
