use glam::{vec2, UVec2, Vec2};

use crate::{BilinearFilter, Camera, GBufferEntry, GBufferMap};

/// Location of a surface during the previous frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct Reprojection {
    pub prev_x: f32,
    pub prev_y: f32,
    pub confidence: f32,

    /// Bitmask telling which of the four texels surrounding the previous
    /// position (see [`BilinearFilter::reprojection_coords()`]) saw the same
    /// surface.
    pub validity: u32,
}

impl Reprojection {
    /// Finds where given surface was visible during the previous frame,
    /// using camera's motion.
    pub fn find(
        camera: &Camera,
        prev_gbuffer: GBufferMap,
        surface: &GBufferEntry,
    ) -> Self {
        if !surface.is_some() {
            return Default::default();
        }

        let prev_pos = camera.prev_world_to_screen(surface.position) - 0.5;
        let mut confidence = 0.0f32;
        let mut validity = 0;

        let coords = BilinearFilter::reprojection_coords(prev_pos.x, prev_pos.y);

        for (idx, pos) in coords.into_iter().enumerate() {
            if !camera.contains(pos) {
                continue;
            }

            let similarity = prev_gbuffer
                .get(pos.as_uvec2())
                .evaluate_similarity_to(surface);

            if similarity > 0.5 {
                confidence = confidence.max(similarity);
                validity |= 1 << idx;
            }
        }

        Self {
            prev_x: prev_pos.x,
            prev_y: prev_pos.y,
            confidence,
            validity,
        }
    }

    pub fn is_some(&self) -> bool {
        self.confidence > 0.0
    }

    pub fn is_none(&self) -> bool {
        !self.is_some()
    }

    pub fn prev_pos(&self) -> Vec2 {
        vec2(self.prev_x, self.prev_y)
    }

    pub fn prev_pos_round(&self) -> UVec2 {
        self.prev_pos().round().max(Vec2::ZERO).as_uvec2()
    }
}
