use bitflags::bitflags;

use crate::cmd::{CULL_CCW, CULL_CW};

bitflags! {
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct CullFace: u8 {
        const FRONT = 1 << 0;
        const BACK = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterizerState {
    /// Clip draws to the bound scissor rectangle.
    pub scissor: bool,
    pub cull_face: CullFace,
    pub front_ccw: bool,
    pub point_size: f32,
    pub line_width: f32,
    pub offset_scale: f32,
    pub offset_units: f32,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            scissor: false,
            cull_face: CullFace::empty(),
            front_ccw: false,
            point_size: 1.0,
            line_width: 1.0,
            offset_scale: 0.0,
            offset_units: 0.0,
        }
    }
}

impl RasterizerState {
    /// Winding-order cull bits of the PLBU primitive setup command.
    pub fn cull_bits(&self) -> u32 {
        let (front, back) = if self.front_ccw {
            (CULL_CCW, CULL_CW)
        } else {
            (CULL_CW, CULL_CCW)
        };
        let mut cull = 0;
        if self.cull_face.contains(CullFace::FRONT) {
            cull |= front;
        }
        if self.cull_face.contains(CullFace::BACK) {
            cull |= back;
        }
        cull
    }
}
