//! Layout of the GP output buffer and the varying descriptor table.
//!
//! The GP writes three regions per draw: positions (16 bytes per vertex, always present), the
//! interleaved varyings and, when the shader writes it, the point size (4 bytes per vertex).
//! Each of the first two regions starts on a 64-byte boundary.

use crate::state::VsShader;
use crate::util::align_up;

const POSITION_DESCRIPTOR: u32 = 0x8020;
const POINT_SIZE_DESCRIPTOR: u32 = 0x2021;
const HALF_COMPONENT_FLAG: u32 = 0x0c;
const REGION_ALIGNMENT: u32 = 0x40;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VaryingLayout {
    /// Byte offset of each output within a vertex's varying slot, `None` for position and
    /// point size.
    pub offsets: Vec<Option<u32>>,
    /// Bytes per vertex in the varyings region, a multiple of 16.
    pub stride: u32,
    pub varyings_offset: Option<u32>,
    pub point_size_offset: Option<u32>,
    pub output_size: u32,
}

impl VaryingLayout {
    /// Lay out `vs` outputs for `num_vertices` shaded vertices.
    pub fn new(vs: &VsShader, num_vertices: u32) -> Self {
        let mut offset = 0u32;
        let offsets: Vec<Option<u32>> = vs
            .varyings
            .iter()
            .enumerate()
            .map(|(i, v)| {
                if vs.is_builtin(i) {
                    return None;
                }
                // 16-bit components pack tightly.
                if v.component_size == 4 {
                    offset = align_up(offset, 16);
                }
                let at = offset;
                offset += v.component_size * 4;
                Some(at)
            })
            .collect();
        let stride = align_up(offset, 16);

        let mut output_size = align_up(16 * num_vertices, REGION_ALIGNMENT);
        let varyings_offset = (vs.num_varyings() > 0).then(|| {
            let at = output_size;
            output_size += align_up(stride * num_vertices, REGION_ALIGNMENT);
            at
        });
        let point_size_offset = vs.point_size_idx.map(|_| {
            let at = output_size;
            output_size += 4 * num_vertices;
            at
        });

        Self {
            offsets,
            stride,
            varyings_offset,
            point_size_offset,
            output_size,
        }
    }

    /// One `[address, descriptor]` pair per output, in output order.
    pub fn descriptors(&self, vs: &VsShader, output_va: u32) -> Vec<u32> {
        let mut table = Vec::with_capacity(vs.varyings.len() * 2);
        for (i, v) in vs.varyings.iter().enumerate() {
            if i == vs.gl_pos_idx {
                table.extend([output_va, POSITION_DESCRIPTOR]);
            } else if Some(i) == vs.point_size_idx {
                let offset = self.point_size_offset.unwrap_or(0);
                table.extend([output_va + offset, POINT_SIZE_DESCRIPTOR]);
            } else {
                let offset = self.varyings_offset.unwrap_or(0) + self.offsets[i].unwrap_or(0);
                let mut desc = (self.stride << 11) | v.components.saturating_sub(1);
                if v.component_size == 2 {
                    desc |= HALF_COMPONENT_FLAG;
                }
                table.extend([output_va + offset, desc]);
            }
        }
        table
    }
}

/// Varying type field of the render state: 3 bits per varying. The eleventh varying's type
/// straddles `varying_types` and the varyings address; the twelfth lives in the address.
///
/// Returns the `varying_types` word and the bits to OR into the varyings address.
pub fn varying_types(vs: &VsShader) -> (u32, u32) {
    let mut types = 0u32;
    let mut address_bits = 0u32;
    let varyings = vs
        .varyings
        .iter()
        .enumerate()
        .filter(|(i, _)| !vs.is_builtin(*i))
        .map(|(_, v)| v);
    for (index, v) in varyings.enumerate() {
        let val = match (v.component_size == 4, v.components > 2) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        match index {
            0..=9 => types |= val << (3 * index),
            10 => {
                types |= val << 30;
                address_bits |= val >> 2;
            }
            11 => address_bits |= val << 1,
            _ => {}
        }
    }
    (types, address_bits)
}
