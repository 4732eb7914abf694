//! The 64-byte render state word block (RSW) the PP reads for every primitive.

use bytemuck::{Pod, Zeroable};

use crate::error::DrawError;
use crate::state::{
    BlendColor, BlendState, ColorMask, DepthStencilAlphaState, FsShader, PrimMode,
    RasterizerState, StencilRef, Viewport,
};
use crate::util::{float_to_ubyte, float_to_ushort, last_bit};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct RenderState {
    /// Blue in bits 0..7, green in bits 16..23.
    pub blend_color_bg: u32,
    /// Red in bits 0..7, alpha in bits 16..23.
    pub blend_color_ra: u32,
    pub alpha_blend: u32,
    pub depth_test: u32,
    /// Near in the low half-word, far in the high one, both 16-bit unorm.
    pub depth_range: u32,
    pub stencil_front: u32,
    pub stencil_back: u32,
    pub stencil_test: u32,
    pub multi_sample: u32,
    /// Shader address with the first instruction's length in the low 5 bits.
    pub shader_address: u32,
    pub varying_types: u32,
    /// Uniform array address with a 4-bit size code in the low bits.
    pub uniforms_address: u32,
    pub textures_address: u32,
    pub aux0: u32,
    pub aux1: u32,
    pub varyings_address: u32,
}

const MULTI_SAMPLE_POINTS: u32 = 0x0000_f007;
const MULTI_SAMPLE_LINES: u32 = 0x0000_f407;
const MULTI_SAMPLE_TRIANGLES: u32 = 0x0000_f807;
const MULTI_SAMPLE_ENABLE: u32 = 0x68;

const AUX0_EARLY_Z: u32 = 0x300;
const AUX0_PIXEL_KILL: u32 = 0x1000;
const AUX0_TEXTURES: u32 = 0x20;
const AUX0_UNIFORMS: u32 = 0x80;
const AUX1_BASE: u32 = 0x1000;
const AUX1_DITHER: u32 = 0x2000;
const AUX1_UNIFORMS: u32 = 0x1_0000;

/// Everything the render state is derived from for one draw.
#[derive(Clone, Copy, Debug)]
pub struct RenderStateInputs<'a> {
    pub mode: PrimMode,
    pub blend: &'a BlendState,
    pub blend_color: &'a BlendColor,
    pub zsa: &'a DepthStencilAlphaState,
    pub rasterizer: &'a RasterizerState,
    pub stencil_ref: &'a StencilRef,
    pub viewport: &'a Viewport,
    pub multisampled: bool,
    pub fs: &'a FsShader,
    pub varying_stride: u32,
    /// Texture list address and sampler count, when samplers are bound.
    pub textures: Option<(u32, u32)>,
    /// Uniform array address and uniform data size in bytes, when fragment uniforms exist.
    pub uniforms: Option<(u32, u32)>,
    /// Varyings region address, `varying_types` word and address bits, when the VS has
    /// varyings.
    pub varyings: Option<(u32, u32, u32)>,
}

impl RenderState {
    pub fn pack(inputs: &RenderStateInputs<'_>) -> Result<Self, DrawError> {
        let rt = &inputs.blend.rt;
        let [r, g, b, a] = inputs.blend_color.color;
        let stencil = inputs.zsa.stencil_words(inputs.stencil_ref);

        let mut rsw = RenderState {
            blend_color_bg: u32::from(float_to_ubyte(b)) | (u32::from(float_to_ubyte(g)) << 16),
            blend_color_ra: u32::from(float_to_ubyte(r)) | (u32::from(float_to_ubyte(a)) << 16),
            alpha_blend: rt.alpha_blend_word()?,
            depth_test: inputs.zsa.depth_test_word(inputs.rasterizer),
            depth_range: depth_range(inputs.viewport),
            stencil_front: stencil.front,
            stencil_back: stencil.back,
            stencil_test: stencil.test,
            multi_sample: if inputs.mode.is_points() {
                MULTI_SAMPLE_POINTS
            } else if inputs.mode.is_lines() {
                MULTI_SAMPLE_LINES
            } else {
                MULTI_SAMPLE_TRIANGLES
            },
            shader_address: inputs.fs.bo.va() | (inputs.fs.bo.read_u32(0) & 0x1f),
            aux0: inputs.varying_stride >> 3,
            aux1: AUX1_BASE,
            ..RenderState::default()
        };

        if inputs.multisampled {
            rsw.multi_sample |= MULTI_SAMPLE_ENABLE;
        }
        if inputs.blend.dither {
            rsw.aux1 |= AUX1_DITHER;
        }

        let early_z = !inputs.fs.uses_discard;
        let pixel_kill = early_z && !rt.blend_enable && rt.colormask == ColorMask::all();
        if early_z {
            rsw.aux0 |= AUX0_EARLY_Z;
        }
        if pixel_kill {
            rsw.aux0 |= AUX0_PIXEL_KILL;
        }

        if let Some((va, count)) = inputs.textures {
            rsw.textures_address = va;
            rsw.aux0 |= (count << 14) | AUX0_TEXTURES;
        }

        if let Some((va, size)) = inputs.uniforms {
            rsw.uniforms_address = va | uniform_size_code(size);
            rsw.aux0 |= AUX0_UNIFORMS;
            rsw.aux1 |= AUX1_UNIFORMS;
        }

        if let Some((va, types, address_bits)) = inputs.varyings {
            rsw.varying_types = types;
            rsw.varyings_address = va | address_bits;
        }

        Ok(rsw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Near and far as 16-bit unorm. Equal nonzero values get `near - 1` so the range stays
/// non-empty.
fn depth_range(viewport: &Viewport) -> u32 {
    let mut near = float_to_ushort(viewport.near);
    let far = float_to_ushort(viewport.far);
    if near == far && near != 0 {
        near -= 1;
    }
    u32::from(near) | (u32::from(far) << 16)
}

/// Log2 size class of the fragment uniform data, in units of 8 bytes, rounded up.
fn uniform_size_code(size: u32) -> u32 {
    let mut bits = 0;
    if size >= 8 {
        bits = last_bit(size >> 3) - 1;
        let low_mask = (1u32 << (bits + 3)) - 1;
        if size & low_mask != 0 {
            bits += 1;
        }
    }
    bits.min(0xf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bo::{BoAllocator, VaAllocator};
    use crate::state::{CompareFunc, StencilState, ViewportState};

    fn fs(uses_discard: bool) -> FsShader {
        let bo = VaAllocator::default().alloc(16).unwrap();
        bo.write(0, &0x0000_00e5u32.to_le_bytes());
        FsShader {
            bo,
            shader_size: 16,
            stack_size: 0,
            uses_discard,
        }
    }

    fn pack_with(
        mode: PrimMode,
        fs: &FsShader,
        blend: &BlendState,
        viewport: &Viewport,
    ) -> RenderState {
        let zsa = DepthStencilAlphaState::default();
        RenderState::pack(&RenderStateInputs {
            mode,
            blend,
            blend_color: &BlendColor {
                color: [1.0, 0.0, 0.5, 1.0],
            },
            zsa: &zsa,
            rasterizer: &RasterizerState::default(),
            stencil_ref: &StencilRef::default(),
            viewport,
            multisampled: false,
            fs,
            varying_stride: 32,
            textures: None,
            uniforms: None,
            varyings: None,
        })
        .unwrap()
    }

    #[test]
    fn record_is_sixteen_words() {
        assert_eq!(std::mem::size_of::<RenderState>(), 64);
    }

    #[test]
    fn opaque_triangles_enable_early_z_and_pixel_kill() {
        let shader = fs(false);
        let vp = Viewport::from(&ViewportState::default());
        let rsw = pack_with(PrimMode::Triangles, &shader, &BlendState::default(), &vp);
        assert_eq!(rsw.multi_sample, 0xf807);
        assert_eq!(rsw.aux0, (32 >> 3) | 0x300 | 0x1000);
        assert_eq!(rsw.aux1, 0x1000);
        assert_eq!(rsw.shader_address, shader.bo.va() | 0x05);
        assert_eq!(rsw.blend_color_bg, 128);
        assert_eq!(rsw.blend_color_ra, 255 | (255 << 16));
        assert_eq!(rsw.stencil_front, 0xff00_0007);
    }

    #[test]
    fn discard_disables_early_depth() {
        let shader = fs(true);
        let vp = Viewport::from(&ViewportState::default());
        let rsw = pack_with(PrimMode::Lines, &shader, &BlendState::default(), &vp);
        assert_eq!(rsw.multi_sample, 0xf407);
        assert_eq!(rsw.aux0 & (0x300 | 0x1000), 0);
    }

    #[test]
    fn equal_depth_range_keeps_near_below_far() {
        let vp = Viewport::from(&ViewportState {
            scale: [1.0, 1.0, 0.0],
            translate: [0.0, 0.0, 1.0],
        });
        assert_eq!(depth_range(&vp), 0xffff_fffe);
        let vp = Viewport::from(&ViewportState {
            scale: [1.0, 1.0, 0.0],
            translate: [0.0, 0.0, 0.0],
        });
        assert_eq!(depth_range(&vp), 0);
    }

    #[test]
    fn uniform_size_code_rounds_up() {
        assert_eq!(uniform_size_code(0), 0);
        assert_eq!(uniform_size_code(8), 0);
        assert_eq!(uniform_size_code(16), 1);
        assert_eq!(uniform_size_code(24), 2);
        assert_eq!(uniform_size_code(32), 2);
        assert_eq!(uniform_size_code(1 << 30), 0xf);
    }

    #[test]
    fn two_sided_stencil_uses_both_references() {
        let face = StencilState {
            enabled: true,
            func: CompareFunc::Less,
            ..StencilState::default()
        };
        let zsa = DepthStencilAlphaState {
            stencil: [face, face],
            ..Default::default()
        };
        let words = zsa.stencil_words(&StencilRef { ref_value: [1, 2] });
        assert_eq!(words.front, 0xff01_0001);
        assert_eq!(words.back, 0xff02_0001);
    }
}
