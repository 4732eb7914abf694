use crate::bo::BoRef;

/// One vertex shader output slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VaryingInfo {
    pub components: u32,
    /// Bytes per component, 2 or 4.
    pub component_size: u32,
}

/// A compiled vertex shader as bound by the state tracker.
#[derive(Clone, Debug)]
pub struct VsShader {
    pub bo: BoRef,
    pub shader_size: u32,
    pub prefetch: u32,
    /// Bytes of the constant buffer the shader reads.
    pub uniform_size: u32,
    /// Immediate constants appended after the viewport transform.
    pub constant: Vec<u8>,
    /// Every output, position and point size included.
    pub varyings: Vec<VaryingInfo>,
    pub gl_pos_idx: usize,
    pub point_size_idx: Option<usize>,
}

impl VsShader {
    pub fn num_outputs(&self) -> u32 {
        self.varyings.len() as u32
    }

    /// Outputs that are neither the position nor the point size.
    pub fn num_varyings(&self) -> u32 {
        (0..self.varyings.len())
            .filter(|&i| !self.is_builtin(i))
            .count() as u32
    }

    pub(crate) fn is_builtin(&self, idx: usize) -> bool {
        idx == self.gl_pos_idx || Some(idx) == self.point_size_idx
    }
}

/// A compiled fragment shader.
#[derive(Clone, Debug)]
pub struct FsShader {
    pub bo: BoRef,
    pub shader_size: u32,
    pub stack_size: u32,
    pub uses_discard: bool,
}
