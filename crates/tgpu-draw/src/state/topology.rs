use tracing::warn;

/// Primitive topology, numbered as the PLBU draw commands expect.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimMode {
    Points = 0,
    Lines = 1,
    LineLoop = 2,
    LineStrip = 3,
    Triangles = 4,
    TriangleStrip = 5,
    TriangleFan = 6,
}

impl PrimMode {
    pub fn from_hw(value: u32) -> Option<Self> {
        Some(match value {
            0 => PrimMode::Points,
            1 => PrimMode::Lines,
            2 => PrimMode::LineLoop,
            3 => PrimMode::LineStrip,
            4 => PrimMode::Triangles,
            5 => PrimMode::TriangleStrip,
            6 => PrimMode::TriangleFan,
            _ => return None,
        })
    }

    pub fn is_points(self) -> bool {
        self == PrimMode::Points
    }

    pub fn is_lines(self) -> bool {
        matches!(
            self,
            PrimMode::Lines | PrimMode::LineLoop | PrimMode::LineStrip
        )
    }

    /// `(first, increment)`: vertices in the first primitive and per additional primitive.
    fn vertex_steps(self) -> (u32, u32) {
        match self {
            PrimMode::Points => (1, 1),
            PrimMode::Lines => (2, 2),
            PrimMode::LineLoop | PrimMode::LineStrip => (2, 1),
            PrimMode::Triangles => (3, 3),
            PrimMode::TriangleStrip | PrimMode::TriangleFan => (3, 1),
        }
    }

    /// Drop trailing vertices that do not complete a primitive.
    ///
    /// Returns `None` when `count` is below a single primitive.
    pub fn trim(self, count: u32) -> Option<u32> {
        let (first, incr) = self.vertex_steps();
        if count < first {
            return None;
        }
        Some(count - (count - first) % incr)
    }

    /// Size of the next sub-draw of a `count`-vertex draw and how far the following one
    /// starts after it. Draws that fit in `max` are not split.
    ///
    /// Strip and fan sub-draws overlap so that no primitive is lost; loops and fans lose
    /// their closing edge or shared vertex across the split.
    pub fn split(self, max: u32, count: u32) -> Split {
        if count <= max {
            return Split { count, step: count };
        }
        let (count, step) = match self {
            PrimMode::Points => (max, max),
            PrimMode::Lines => {
                let c = max - max % 2;
                (c, c)
            }
            PrimMode::LineStrip => (max, max.saturating_sub(1)),
            PrimMode::LineLoop => {
                warn!(max, "splitting line loop, the closing edge is drawn per sub-draw");
                (max, max.saturating_sub(1))
            }
            PrimMode::Triangles => {
                let c = max - max % 3;
                (c, c)
            }
            PrimMode::TriangleStrip => {
                let c = max - max % 2;
                (c, c.saturating_sub(2))
            }
            PrimMode::TriangleFan => {
                warn!(max, "splitting triangle fan, sub-draws do not share the centre vertex");
                (max, max.saturating_sub(2))
            }
        };
        Split { count, step }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Split {
    pub count: u32,
    pub step: u32,
}
