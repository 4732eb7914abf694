/// Viewport transform as supplied by the state tracker: `window = ndc * scale + translate`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportState {
    pub scale: [f32; 3],
    pub translate: [f32; 3],
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            scale: [1.0; 3],
            translate: [0.0; 3],
        }
    }
}

/// Viewport bounds and the transform the vertex shader reads from its uniforms.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
    pub transform: ViewportTransform,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewportTransform {
    pub scale: [f32; 4],
    pub translate: [f32; 4],
}

impl From<&ViewportState> for Viewport {
    fn from(vp: &ViewportState) -> Self {
        let [sx, sy, sz] = vp.scale;
        let [tx, ty, tz] = vp.translate;
        let near = tz - sz.abs();
        let far = tz + sz.abs();
        let half_depth = (far - near) / 2.0;

        Self {
            left: tx - sx.abs(),
            right: tx + sx.abs(),
            bottom: ty - sy.abs(),
            top: ty + sy.abs(),
            near,
            far,
            transform: ViewportTransform {
                scale: [sx, sy, half_depth, 1.0],
                translate: [tx, ty, half_depth + near, 0.0],
            },
        }
    }
}

impl ViewportTransform {
    /// Scale then translate, 32 bytes of little-endian floats.
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        let floats = self.scale.iter().chain(self.translate.iter());
        for (chunk, f) in out.chunks_exact_mut(4).zip(floats) {
            chunk.copy_from_slice(&f.to_le_bytes());
        }
        out
    }
}
