use crate::state::{FramebufferState, RasterizerState, ScissorState, Viewport};

/// Pixel rectangle, `min` inclusive and `max` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    pub minx: u32,
    pub maxx: u32,
    pub miny: u32,
    pub maxy: u32,
}

impl Rect {
    /// Identity for [`Rect::union`].
    pub const EMPTY: Rect = Rect {
        minx: 0xffff,
        maxx: 0,
        miny: 0xffff,
        maxy: 0,
    };

    pub fn new(minx: u32, maxx: u32, miny: u32, maxy: u32) -> Self {
        Self {
            minx,
            maxx,
            miny,
            maxy,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.minx >= self.maxx || self.miny >= self.maxy
    }

    pub fn union(&mut self, other: &Rect) {
        self.minx = self.minx.min(other.minx);
        self.miny = self.miny.min(other.miny);
        self.maxx = self.maxx.max(other.maxx);
        self.maxy = self.maxy.max(other.maxy);
    }

    pub fn contains(&self, other: &Rect) -> bool {
        self.minx <= other.minx
            && self.miny <= other.miny
            && self.maxx >= other.maxx
            && self.maxy >= other.maxy
    }
}

impl Default for Rect {
    fn default() -> Self {
        Rect::EMPTY
    }
}

/// Intersect the active scissor (or the whole framebuffer when scissoring is off) with the
/// viewport bounds. An empty intersection collapses to a zero-area rectangle.
pub fn clip_scissor_to_viewport(
    rast: &RasterizerState,
    scissor: &ScissorState,
    viewport: &Viewport,
    fb: &FramebufferState,
) -> Rect {
    let mut r = if rast.scissor {
        Rect::new(scissor.minx, scissor.maxx, scissor.miny, scissor.maxy)
    } else {
        Rect::new(0, fb.width, 0, fb.height)
    };

    let (left, right) = viewport_span(viewport.left, viewport.right, fb.width);
    r.minx = r.minx.max(left);
    r.maxx = r.maxx.min(right);
    if r.minx > r.maxx {
        r.minx = r.maxx;
    }

    let (bottom, top) = viewport_span(viewport.bottom, viewport.top, fb.height);
    r.miny = r.miny.max(bottom);
    r.maxy = r.maxy.min(top);
    if r.miny > r.maxy {
        r.miny = r.maxy;
    }
    r
}

/// Viewport edges truncated to whole pixels and clamped to `[0, limit]`.
fn viewport_span(lo: f32, hi: f32, limit: u32) -> (u32, u32) {
    let clamp = |v: f32| {
        if v.is_nan() || v <= 0.0 {
            0
        } else {
            (v as i64).min(i64::from(limit)) as u32
        }
    };
    (clamp(lo), clamp(hi))
}
