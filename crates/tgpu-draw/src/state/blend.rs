//! Blend state and the render-state `alpha_blend` word.
//!
//! Each of the four factors is encoded as a 3-bit source selector, an invert bit and (for the
//! RGB factors only) a bit saying the factor reads alpha:
//!
//! ```text
//!  bits  0..2   rgb function          bits 14     rgb dst invert
//!  bits  3..5   alpha function        bit  15     rgb dst has-alpha
//!  bits  6..8   rgb src selector      bits 16..18 alpha src selector
//!  bit   9      rgb src invert        bit  19     alpha src invert
//!  bit  10      rgb src has-alpha     bits 20..22 alpha dst selector
//!  bits 11..13  rgb dst selector      bit  23     alpha dst invert
//!  bits 26..27  always set            bits 28..31 colour write mask
//! ```

use bitflags::bitflags;

use crate::error::DrawError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFunc {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

impl BlendFunc {
    fn hw(self) -> u32 {
        match self {
            BlendFunc::Add => 2,
            BlendFunc::Subtract => 0,
            BlendFunc::ReverseSubtract => 1,
            BlendFunc::Min => 4,
            BlendFunc::Max => 5,
        }
    }

    fn from_hw(v: u32) -> Option<Self> {
        Some(match v {
            2 => BlendFunc::Add,
            0 => BlendFunc::Subtract,
            1 => BlendFunc::ReverseSubtract,
            4 => BlendFunc::Min,
            5 => BlendFunc::Max,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    SrcAlpha,
    DstColor,
    DstAlpha,
    ConstColor,
    ConstAlpha,
    InvSrcColor,
    InvSrcAlpha,
    InvDstColor,
    InvDstAlpha,
    InvConstColor,
    InvConstAlpha,
    SrcAlphaSaturate,
    Src1Color,
    Src1Alpha,
    InvSrc1Color,
    InvSrc1Alpha,
}

/// Hardware form of one blend factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FactorBits {
    selector: u32,
    invert: bool,
    has_alpha: bool,
}

impl BlendFactor {
    fn bits(self) -> Result<FactorBits, DrawError> {
        use BlendFactor::*;
        let selector = match self {
            SrcColor | SrcAlpha | InvSrcColor | InvSrcAlpha => 0,
            DstColor | DstAlpha | InvDstColor | InvDstAlpha => 1,
            ConstColor | ConstAlpha | InvConstColor | InvConstAlpha => 2,
            Zero | One => 3,
            SrcAlphaSaturate => 4,
            Src1Color | Src1Alpha | InvSrc1Color | InvSrc1Alpha => {
                return Err(DrawError::UnsupportedBlendFactor(self))
            }
        };
        Ok(FactorBits {
            selector,
            invert: matches!(
                self,
                One | InvSrcColor | InvSrcAlpha | InvDstColor | InvDstAlpha | InvConstColor
                    | InvConstAlpha
            ),
            has_alpha: matches!(
                self,
                SrcAlpha | DstAlpha | ConstAlpha | InvSrcAlpha | InvDstAlpha | InvConstAlpha
            ),
        })
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ColorMask: u8 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
    }
}

impl Default for ColorMask {
    fn default() -> Self {
        ColorMask::all()
    }
}

/// Blend setup of the single colour target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RtBlendState {
    pub blend_enable: bool,
    pub rgb_func: BlendFunc,
    pub rgb_src_factor: BlendFactor,
    pub rgb_dst_factor: BlendFactor,
    pub alpha_func: BlendFunc,
    pub alpha_src_factor: BlendFactor,
    pub alpha_dst_factor: BlendFactor,
    pub colormask: ColorMask,
}

impl Default for RtBlendState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            rgb_func: BlendFunc::Add,
            rgb_src_factor: BlendFactor::One,
            rgb_dst_factor: BlendFactor::Zero,
            alpha_func: BlendFunc::Add,
            alpha_src_factor: BlendFactor::One,
            alpha_dst_factor: BlendFactor::Zero,
            colormask: ColorMask::all(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlendState {
    pub rt: RtBlendState,
    pub dither: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BlendColor {
    pub color: [f32; 4],
}

// Set on every blend word the hardware has been observed to accept.
const ALPHA_BLEND_FIXED: u32 = 0x0c00_0000;

/// Decoded form of an `alpha_blend` word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlphaBlendFields {
    pub rgb_func: BlendFunc,
    pub alpha_func: BlendFunc,
    pub rgb_src: (u32, bool, bool),
    pub rgb_dst: (u32, bool, bool),
    pub alpha_src: (u32, bool),
    pub alpha_dst: (u32, bool),
    pub colormask: ColorMask,
}

impl RtBlendState {
    /// The render-state `alpha_blend` word, colour mask included.
    pub fn alpha_blend_word(&self) -> Result<u32, DrawError> {
        let word = if self.blend_enable {
            equation_word(
                self.rgb_func,
                self.alpha_func,
                self.rgb_src_factor,
                self.rgb_dst_factor,
                self.alpha_src_factor,
                self.alpha_dst_factor,
            )?
        } else {
            // Disabled blending is programmed as the pass-through equation.
            equation_word(
                BlendFunc::Add,
                BlendFunc::Add,
                BlendFactor::One,
                BlendFactor::Zero,
                BlendFactor::One,
                BlendFactor::Zero,
            )?
        };
        Ok(word | (u32::from(self.colormask.bits()) << 28))
    }
}

fn equation_word(
    rgb_func: BlendFunc,
    alpha_func: BlendFunc,
    rgb_src: BlendFactor,
    rgb_dst: BlendFactor,
    alpha_src: BlendFactor,
    alpha_dst: BlendFactor,
) -> Result<u32, DrawError> {
    let alpha_src = match alpha_src {
        BlendFactor::SrcAlphaSaturate => BlendFactor::One,
        f => f,
    };
    let rgb_src = rgb_src.bits()?;
    let rgb_dst = rgb_dst.bits()?;
    let alpha_src = alpha_src.bits()?;
    let alpha_dst = alpha_dst.bits()?;

    Ok(rgb_func.hw()
        | (alpha_func.hw() << 3)
        | (rgb_src.selector << 6)
        | (u32::from(rgb_src.invert) << 9)
        | (u32::from(rgb_src.has_alpha) << 10)
        | (rgb_dst.selector << 11)
        | (u32::from(rgb_dst.invert) << 14)
        | (u32::from(rgb_dst.has_alpha) << 15)
        | (alpha_src.selector << 16)
        | (u32::from(alpha_src.invert) << 19)
        | (alpha_dst.selector << 20)
        | (u32::from(alpha_dst.invert) << 23)
        | ALPHA_BLEND_FIXED)
}

/// Split an `alpha_blend` word back into its fields.
pub fn decode_alpha_blend(word: u32) -> Option<AlphaBlendFields> {
    let bit = |n: u32| word & (1 << n) != 0;
    Some(AlphaBlendFields {
        rgb_func: BlendFunc::from_hw(word & 0x7)?,
        alpha_func: BlendFunc::from_hw((word >> 3) & 0x7)?,
        rgb_src: ((word >> 6) & 0x7, bit(9), bit(10)),
        rgb_dst: ((word >> 11) & 0x7, bit(14), bit(15)),
        alpha_src: ((word >> 16) & 0x7, bit(19)),
        alpha_dst: ((word >> 20) & 0x7, bit(23)),
        colormask: ColorMask::from_bits_truncate((word >> 28) as u8),
    })
}
