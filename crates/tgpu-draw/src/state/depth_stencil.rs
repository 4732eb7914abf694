//! Depth/stencil state and the render-state words derived from it.

use super::RasterizerState;

/// Comparison function, numbered as the hardware encodes it.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never = 0,
    Less = 1,
    Equal = 2,
    LessEqual = 3,
    Greater = 4,
    NotEqual = 5,
    GreaterEqual = 6,
    #[default]
    Always = 7,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    Incr,
    Decr,
    IncrWrap,
    DecrWrap,
    Invert,
}

impl StencilOp {
    fn hw(self) -> u32 {
        match self {
            StencilOp::Keep => 0,
            StencilOp::Zero => 2,
            StencilOp::Replace => 1,
            StencilOp::Incr => 6,
            StencilOp::Decr => 7,
            StencilOp::IncrWrap => 4,
            StencilOp::DecrWrap => 5,
            StencilOp::Invert => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilState {
    pub enabled: bool,
    pub func: CompareFunc,
    pub fail_op: StencilOp,
    pub zfail_op: StencilOp,
    pub zpass_op: StencilOp,
    pub valuemask: u8,
    pub writemask: u8,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            func: CompareFunc::Always,
            fail_op: StencilOp::Keep,
            zfail_op: StencilOp::Keep,
            zpass_op: StencilOp::Keep,
            valuemask: 0xff,
            writemask: 0xff,
        }
    }
}

impl StencilState {
    /// ```text
    ///  bits  0..2   compare function     bits 16..23 reference value
    ///  bits  3..5   fail op              bits 24..31 value mask
    ///  bits  6..8   depth-fail op
    ///  bits  9..11  depth-pass op
    /// ```
    fn face_word(&self, ref_value: u8) -> u32 {
        self.func as u32
            | (self.fail_op.hw() << 3)
            | (self.zfail_op.hw() << 6)
            | (self.zpass_op.hw() << 9)
            | (u32::from(ref_value) << 16)
            | (u32::from(self.valuemask) << 24)
    }
}

/// Depth, stencil and alpha-test state. `stencil[1]` is the back face and only applies when
/// `stencil[0]` is enabled too.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DepthStencilAlphaState {
    pub depth_enabled: bool,
    pub depth_writemask: bool,
    pub depth_func: CompareFunc,
    pub stencil: [StencilState; 2],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StencilRef {
    pub ref_value: [u8; 2],
}

// Always-pass compare, value mask 0xff.
const STENCIL_DISABLED: u32 = 0xff00_0007;
const STENCIL_TEST_DISABLED: u32 = 0x0000_ffff;
// Fixed bits of the depth test word.
const DEPTH_TEST_FIXED: u32 = 0x30;

/// The `stencil_front`, `stencil_back` and `stencil_test` render-state words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilWords {
    pub front: u32,
    pub back: u32,
    pub test: u32,
}

impl DepthStencilAlphaState {
    pub fn stencil_enabled(&self) -> bool {
        self.stencil[0].enabled || self.stencil[1].enabled
    }

    /// ```text
    ///  bit   0      depth write
    ///  bits  1..3   compare function (ALWAYS when depth testing is off)
    ///  bits  4..5   always set
    ///  bits 16..23  polygon offset scale * 4, clamped, two's complement
    ///  bits 24..31  polygon offset units * 2, clamped, two's complement
    /// ```
    pub fn depth_test_word(&self, rast: &RasterizerState) -> u32 {
        let func = if self.depth_enabled {
            self.depth_func
        } else {
            CompareFunc::Always
        };
        let offset_scale = offset_byte(rast.offset_scale * 4.0);
        let offset_units = offset_byte(rast.offset_units * 2.0);

        u32::from(self.depth_enabled && self.depth_writemask)
            | ((func as u32) << 1)
            | (offset_scale << 16)
            | (offset_units << 24)
            | DEPTH_TEST_FIXED
    }

    pub fn stencil_words(&self, stencil_ref: &StencilRef) -> StencilWords {
        let [front, back] = &self.stencil;
        if !front.enabled {
            return StencilWords {
                front: STENCIL_DISABLED,
                back: STENCIL_DISABLED,
                test: STENCIL_TEST_DISABLED,
            };
        }

        let front_word = front.face_word(stencil_ref.ref_value[0]);
        if back.enabled {
            StencilWords {
                front: front_word,
                back: back.face_word(stencil_ref.ref_value[1]),
                test: u32::from(front.writemask) | (u32::from(back.writemask) << 8),
            }
        } else {
            StencilWords {
                front: front_word,
                back: front_word,
                test: u32::from(front.writemask) | (u32::from(front.writemask) << 8),
            }
        }
    }
}

/// Clamp to a signed byte and return its two's-complement bits.
fn offset_byte(v: f32) -> u32 {
    let clamped = v.clamp(-128.0, 127.0) as i32;
    (clamped as u32) & 0xff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_disabled_compares_always() {
        let zsa = DepthStencilAlphaState {
            depth_enabled: false,
            depth_writemask: true,
            depth_func: CompareFunc::Less,
            ..Default::default()
        };
        assert_eq!(zsa.depth_test_word(&RasterizerState::default()), 0x3e);
    }

    #[test]
    fn polygon_offset_is_clamped_twos_complement() {
        let zsa = DepthStencilAlphaState {
            depth_enabled: true,
            depth_writemask: true,
            depth_func: CompareFunc::LessEqual,
            ..Default::default()
        };
        let rast = RasterizerState {
            offset_scale: -1.0,
            offset_units: 500.0,
            ..RasterizerState::default()
        };
        // scale -4 -> 0xfc, units clamp to 127.
        assert_eq!(zsa.depth_test_word(&rast), 0x7ffc_0037);
    }

    #[test]
    fn one_sided_stencil_is_mirrored_to_the_back_face() {
        let zsa = DepthStencilAlphaState {
            stencil: [
                StencilState {
                    enabled: true,
                    func: CompareFunc::Equal,
                    fail_op: StencilOp::Zero,
                    zfail_op: StencilOp::Incr,
                    zpass_op: StencilOp::Replace,
                    valuemask: 0x0f,
                    writemask: 0x3c,
                },
                StencilState::default(),
            ],
            ..Default::default()
        };
        let words = zsa.stencil_words(&StencilRef { ref_value: [5, 9] });
        assert_eq!(words.front, 0x0f05_0392);
        assert_eq!(words.back, words.front);
        assert_eq!(words.test, 0x3c3c);
    }

    #[test]
    fn disabled_stencil_uses_pass_through_words() {
        let words = DepthStencilAlphaState::default().stencil_words(&StencilRef::default());
        assert_eq!(
            words,
            StencilWords {
                front: 0xff00_0007,
                back: 0xff00_0007,
                test: 0xffff,
            }
        );
    }
}
