//! GP (vertex shader front end) and PLBU (polygon list builder) command words.
//!
//! Both units consume a stream of 64-bit words stored as two little-endian dwords. The high
//! dword carries the command tag; the low dword and the remaining high bits carry operands.
//! Every command here encodes to exactly one [`CmdWord`] and decodes back from it.

use bytemuck::{Pod, Zeroable};

use crate::state::PrimMode;
use crate::util::align_up;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct CmdWord {
    pub lo: u32,
    pub hi: u32,
}

impl CmdWord {
    pub const fn new(lo: u32, hi: u32) -> Self {
        Self { lo, hi }
    }
}

/// Growable command buffer for one hardware unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CmdStream {
    words: Vec<CmdWord>,
}

impl CmdStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, word: impl Into<CmdWord>) {
        self.words.push(word.into());
    }

    pub fn words(&self) -> &[CmdWord] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Raw stream as uploaded to the hardware.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }
}

// Opaque words the hardware expects at fixed points in a draw. Their fields are undocumented.
const VS_ARRAYS_SEMAPHORE_BEGIN_1: CmdWord = CmdWord::new(0x0002_8000, 0x5000_0000);
const VS_ARRAYS_SEMAPHORE_BEGIN_2: CmdWord = CmdWord::new(0x0000_0001, 0x5000_0000);
const VS_UNKNOWN_1: CmdWord = CmdWord::new(0x0000_0003, 0x1000_0041);
const VS_UNKNOWN_2: CmdWord = CmdWord::new(0x0000_0000, 0x6000_0000);
const VS_INDEXED_SEMAPHORE_END: u32 = 0x0001_8000;

const VS_TAG_SEMAPHORE: u32 = 0x5000_0000;
const VS_TAG_UNIFORMS: u32 = 0x3000_0000;
const VS_TAG_SHADER: u32 = 0x4000_0000;
const VS_TAG_SHADER_INFO: u32 = 0x1000_0040;
const VS_TAG_VARYING_ATTRIBUTE_COUNT: u32 = 0x1000_0042;
const VS_TAG_ATTRIBUTES: u32 = 0x2000_0000;
const VS_TAG_VARYINGS: u32 = 0x2000_0008;

/// GP command words, in the order a draw emits them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VsCmd {
    ArraysSemaphoreBegin1,
    ArraysSemaphoreBegin2,
    /// `size` in bytes; encoded rounded up to 16.
    UniformsAddress { va: u32, size: u32 },
    ShaderAddress { va: u32, size: u32 },
    /// `size` in bytes, a multiple of 16 and at least 16.
    ShaderInfo { prefetch: u32, size: u32 },
    /// `attributes` is at least 1.
    VaryingAttributeCount { varyings: u32, attributes: u32 },
    Unknown1,
    AttributesAddress { va: u32, count: u32 },
    VaryingsAddress { va: u32, count: u32 },
    Draw { count: u32, indexed: bool },
    Unknown2,
    ArraysSemaphoreEnd { indexed: bool },
}

impl VsCmd {
    pub fn encode(self) -> CmdWord {
        match self {
            VsCmd::ArraysSemaphoreBegin1 => VS_ARRAYS_SEMAPHORE_BEGIN_1,
            VsCmd::ArraysSemaphoreBegin2 => VS_ARRAYS_SEMAPHORE_BEGIN_2,
            VsCmd::UniformsAddress { va, size } => {
                CmdWord::new(va, VS_TAG_UNIFORMS | (align_up(size, 16) << 12))
            }
            VsCmd::ShaderAddress { va, size } => CmdWord::new(va, VS_TAG_SHADER | (size << 12)),
            VsCmd::ShaderInfo { prefetch, size } => CmdWord::new(
                (prefetch << 20) | (((size >> 4).saturating_sub(1)) << 10),
                VS_TAG_SHADER_INFO,
            ),
            VsCmd::VaryingAttributeCount {
                varyings,
                attributes,
            } => CmdWord::new(
                (varyings << 8) | (attributes.saturating_sub(1) << 24),
                VS_TAG_VARYING_ATTRIBUTE_COUNT,
            ),
            VsCmd::Unknown1 => VS_UNKNOWN_1,
            VsCmd::AttributesAddress { va, count } => {
                CmdWord::new(va, VS_TAG_ATTRIBUTES | (count << 17))
            }
            VsCmd::VaryingsAddress { va, count } => {
                CmdWord::new(va, VS_TAG_VARYINGS | (count << 17))
            }
            VsCmd::Draw { count, indexed } => {
                CmdWord::new((count << 24) | u32::from(indexed), count >> 8)
            }
            VsCmd::Unknown2 => VS_UNKNOWN_2,
            VsCmd::ArraysSemaphoreEnd { indexed } => CmdWord::new(
                if indexed { VS_INDEXED_SEMAPHORE_END } else { 0 },
                VS_TAG_SEMAPHORE,
            ),
        }
    }

    pub fn decode(word: CmdWord) -> Option<Self> {
        let CmdWord { lo, hi } = word;
        if word == VS_ARRAYS_SEMAPHORE_BEGIN_1 {
            return Some(VsCmd::ArraysSemaphoreBegin1);
        }
        if word == VS_ARRAYS_SEMAPHORE_BEGIN_2 {
            return Some(VsCmd::ArraysSemaphoreBegin2);
        }
        if word == VS_UNKNOWN_1 {
            return Some(VsCmd::Unknown1);
        }
        if word == VS_UNKNOWN_2 {
            return Some(VsCmd::Unknown2);
        }
        let cmd = match hi {
            VS_TAG_SEMAPHORE => VsCmd::ArraysSemaphoreEnd {
                indexed: match lo {
                    VS_INDEXED_SEMAPHORE_END => true,
                    0 => false,
                    _ => return None,
                },
            },
            VS_TAG_SHADER_INFO => VsCmd::ShaderInfo {
                prefetch: lo >> 20,
                size: (((lo >> 10) & 0x3ff) + 1) << 4,
            },
            VS_TAG_VARYING_ATTRIBUTE_COUNT => VsCmd::VaryingAttributeCount {
                varyings: (lo >> 8) & 0xffff,
                attributes: (lo >> 24) + 1,
            },
            _ => match hi >> 28 {
                0x0 => VsCmd::Draw {
                    count: (hi << 8) | (lo >> 24),
                    indexed: lo & 1 != 0,
                },
                0x2 if hi & 0x8 != 0 => VsCmd::VaryingsAddress {
                    va: lo,
                    count: (hi & 0x0fff_ffff) >> 17,
                },
                0x2 => VsCmd::AttributesAddress {
                    va: lo,
                    count: (hi & 0x0fff_ffff) >> 17,
                },
                0x3 => VsCmd::UniformsAddress {
                    va: lo,
                    size: (hi & 0x0fff_ffff) >> 12,
                },
                0x4 => VsCmd::ShaderAddress {
                    va: lo,
                    size: (hi & 0x0fff_ffff) >> 12,
                },
                _ => return None,
            },
        };
        Some(cmd)
    }
}

impl From<VsCmd> for CmdWord {
    fn from(cmd: VsCmd) -> Self {
        cmd.encode()
    }
}

const PLBU_ARRAYS_SEMAPHORE_BEGIN: CmdWord = CmdWord::new(0x0001_0002, 0x6000_0000);
const PLBU_ARRAYS_SEMAPHORE_END: CmdWord = CmdWord::new(0x0001_0001, 0x6000_0000);
const PLBU_UNKNOWN_1: CmdWord = CmdWord::new(0x0000_0000, 0x1000_010a);
const PLBU_END: CmdWord = CmdWord::new(0x0000_0000, 0x5000_0000);

const PLBU_TAG_VIEWPORT_BOTTOM: u32 = 0x1000_0105;
const PLBU_TAG_VIEWPORT_TOP: u32 = 0x1000_0106;
const PLBU_TAG_VIEWPORT_LEFT: u32 = 0x1000_0107;
const PLBU_TAG_VIEWPORT_RIGHT: u32 = 0x1000_0108;
const PLBU_TAG_PRIMITIVE_SETUP: u32 = 0x1000_010b;
const PLBU_TAG_LOW_PRIM_SIZE: u32 = 0x1000_010d;
const PLBU_TAG_DEPTH_RANGE_NEAR: u32 = 0x1000_010e;
const PLBU_TAG_DEPTH_RANGE_FAR: u32 = 0x1000_010f;
const PLBU_TAG_INDEXED_DEST: u32 = 0x1000_0100;
const PLBU_TAG_INDICES: u32 = 0x1000_0101;
const PLBU_TAG_INDEXED_PT_SIZE: u32 = 0x1000_0102;
const PLBU_TAG_SCISSORS: u32 = 0x7000_0000;
const PLBU_TAG_RSW_VERTEX_ARRAY: u32 = 0x8000_0000;
const PLBU_DRAW_ELEMENTS: u32 = 0x0020_0000;

// Primitive setup operand bits.
const PRIMITIVE_SETUP_BASE: u32 = 0x2200;
const PRIMITIVE_SETUP_FORCE_POINT_SIZE: u32 = 0x1000;
const PRIMITIVE_SETUP_INDEX_U16: u32 = 0x400;
pub const CULL_CW: u32 = 0x0002_0000;
pub const CULL_CCW: u32 = 0x0004_0000;

/// PLBU command words, in the order a draw emits them.
///
/// Floating-point operands are carried as their IEEE-754 bit patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlbuCmd {
    ViewportLeft(u32),
    ViewportRight(u32),
    ViewportBottom(u32),
    ViewportTop(u32),
    ArraysSemaphoreBegin,
    /// `cull` is a combination of [`CULL_CW`] and [`CULL_CCW`].
    PrimitiveSetup {
        force_point_size: bool,
        cull: u32,
        index_u16: bool,
    },
    /// Both addresses are 64-byte aligned.
    RswVertexArray { rsw_va: u32, gl_pos_va: u32 },
    /// Half-open pixel rectangle, `min < max` on both axes.
    Scissors {
        minx: u32,
        maxx: u32,
        miny: u32,
        maxy: u32,
    },
    Unknown1,
    DepthRangeNear(u32),
    DepthRangeFar(u32),
    LowPrimSize(u32),
    IndexedDest(u32),
    IndexedPtSize(u32),
    Indices(u32),
    DrawArrays { mode: PrimMode, start: u32, count: u32 },
    ArraysSemaphoreEnd,
    DrawElements { mode: PrimMode, start: u32, count: u32 },
    End,
}

impl PlbuCmd {
    pub fn encode(self) -> CmdWord {
        match self {
            PlbuCmd::ViewportLeft(v) => CmdWord::new(v, PLBU_TAG_VIEWPORT_LEFT),
            PlbuCmd::ViewportRight(v) => CmdWord::new(v, PLBU_TAG_VIEWPORT_RIGHT),
            PlbuCmd::ViewportBottom(v) => CmdWord::new(v, PLBU_TAG_VIEWPORT_BOTTOM),
            PlbuCmd::ViewportTop(v) => CmdWord::new(v, PLBU_TAG_VIEWPORT_TOP),
            PlbuCmd::ArraysSemaphoreBegin => PLBU_ARRAYS_SEMAPHORE_BEGIN,
            PlbuCmd::PrimitiveSetup {
                force_point_size,
                cull,
                index_u16,
            } => {
                let mut lo = PRIMITIVE_SETUP_BASE | (cull & (CULL_CW | CULL_CCW));
                if force_point_size {
                    lo |= PRIMITIVE_SETUP_FORCE_POINT_SIZE;
                }
                if index_u16 {
                    lo |= PRIMITIVE_SETUP_INDEX_U16;
                }
                CmdWord::new(lo, PLBU_TAG_PRIMITIVE_SETUP)
            }
            PlbuCmd::RswVertexArray { rsw_va, gl_pos_va } => CmdWord::new(
                (rsw_va >> 6) | ((gl_pos_va >> 6) << 26),
                PLBU_TAG_RSW_VERTEX_ARRAY | (gl_pos_va >> 12),
            ),
            PlbuCmd::Scissors {
                minx,
                maxx,
                miny,
                maxy,
            } => CmdWord::new(
                (minx << 30) | (maxy.saturating_sub(1) << 15) | miny,
                PLBU_TAG_SCISSORS | (maxx.saturating_sub(1) << 13) | (minx >> 2),
            ),
            PlbuCmd::Unknown1 => PLBU_UNKNOWN_1,
            PlbuCmd::DepthRangeNear(v) => CmdWord::new(v, PLBU_TAG_DEPTH_RANGE_NEAR),
            PlbuCmd::DepthRangeFar(v) => CmdWord::new(v, PLBU_TAG_DEPTH_RANGE_FAR),
            PlbuCmd::LowPrimSize(v) => CmdWord::new(v, PLBU_TAG_LOW_PRIM_SIZE),
            PlbuCmd::IndexedDest(va) => CmdWord::new(va, PLBU_TAG_INDEXED_DEST),
            PlbuCmd::IndexedPtSize(va) => CmdWord::new(va, PLBU_TAG_INDEXED_PT_SIZE),
            PlbuCmd::Indices(va) => CmdWord::new(va, PLBU_TAG_INDICES),
            PlbuCmd::DrawArrays { mode, start, count } => draw_word(mode, start, count, 0),
            PlbuCmd::ArraysSemaphoreEnd => PLBU_ARRAYS_SEMAPHORE_END,
            PlbuCmd::DrawElements { mode, start, count } => {
                draw_word(mode, start, count, PLBU_DRAW_ELEMENTS)
            }
            PlbuCmd::End => PLBU_END,
        }
    }

    pub fn decode(word: CmdWord) -> Option<Self> {
        let CmdWord { lo, hi } = word;
        for (fixed, cmd) in [
            (PLBU_ARRAYS_SEMAPHORE_BEGIN, PlbuCmd::ArraysSemaphoreBegin),
            (PLBU_ARRAYS_SEMAPHORE_END, PlbuCmd::ArraysSemaphoreEnd),
            (PLBU_UNKNOWN_1, PlbuCmd::Unknown1),
            (PLBU_END, PlbuCmd::End),
        ] {
            if word == fixed {
                return Some(cmd);
            }
        }

        let cmd = match hi {
            PLBU_TAG_VIEWPORT_LEFT => PlbuCmd::ViewportLeft(lo),
            PLBU_TAG_VIEWPORT_RIGHT => PlbuCmd::ViewportRight(lo),
            PLBU_TAG_VIEWPORT_BOTTOM => PlbuCmd::ViewportBottom(lo),
            PLBU_TAG_VIEWPORT_TOP => PlbuCmd::ViewportTop(lo),
            PLBU_TAG_PRIMITIVE_SETUP => PlbuCmd::PrimitiveSetup {
                force_point_size: lo & PRIMITIVE_SETUP_FORCE_POINT_SIZE != 0,
                cull: lo & (CULL_CW | CULL_CCW),
                index_u16: lo & PRIMITIVE_SETUP_INDEX_U16 != 0,
            },
            PLBU_TAG_DEPTH_RANGE_NEAR => PlbuCmd::DepthRangeNear(lo),
            PLBU_TAG_DEPTH_RANGE_FAR => PlbuCmd::DepthRangeFar(lo),
            PLBU_TAG_LOW_PRIM_SIZE => PlbuCmd::LowPrimSize(lo),
            PLBU_TAG_INDEXED_DEST => PlbuCmd::IndexedDest(lo),
            PLBU_TAG_INDEXED_PT_SIZE => PlbuCmd::IndexedPtSize(lo),
            PLBU_TAG_INDICES => PlbuCmd::Indices(lo),
            _ => match hi >> 28 {
                0x7 => {
                    let minx = ((hi & 0x1fff) << 2) | (lo >> 30);
                    PlbuCmd::Scissors {
                        minx,
                        maxx: ((hi >> 13) & 0x7fff) + 1,
                        miny: lo & 0x7fff,
                        maxy: ((lo >> 15) & 0x7fff) + 1,
                    }
                }
                0x8 => PlbuCmd::RswVertexArray {
                    rsw_va: (lo & 0x03ff_ffff) << 6,
                    gl_pos_va: ((hi & 0x0fff_ffff) << 12) | ((lo >> 26) << 6),
                },
                0x0 => {
                    let mode = PrimMode::from_hw((hi >> 16) & 0x1f)?;
                    let start = lo & 0x00ff_ffff;
                    let count = ((hi & 0xffff) << 8) | (lo >> 24);
                    match hi & 0xffe0_0000 {
                        0 => PlbuCmd::DrawArrays { mode, start, count },
                        PLBU_DRAW_ELEMENTS => PlbuCmd::DrawElements { mode, start, count },
                        _ => return None,
                    }
                }
                _ => return None,
            },
        };
        Some(cmd)
    }
}

fn draw_word(mode: PrimMode, start: u32, count: u32, flags: u32) -> CmdWord {
    CmdWord::new(
        (count << 24) | (start & 0x00ff_ffff),
        flags | (((mode as u32) & 0x1f) << 16) | ((count >> 8) & 0xffff),
    )
}

impl From<PlbuCmd> for CmdWord {
    fn from(cmd: PlbuCmd) -> Self {
        cmd.encode()
    }
}

/// Decode a whole GP stream, `None` at the first unknown word.
pub fn decode_vs(stream: &CmdStream) -> Option<Vec<VsCmd>> {
    stream.words().iter().map(|w| VsCmd::decode(*w)).collect()
}

/// Decode a whole PLBU stream, `None` at the first unknown word.
pub fn decode_plbu(stream: &CmdStream) -> Option<Vec<PlbuCmd>> {
    stream.words().iter().map(|w| PlbuCmd::decode(*w)).collect()
}
