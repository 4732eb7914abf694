//! SSA shader IR consumed by the lowering passes.
//!
//! A [`Function`] is a list of basic blocks, each holding straight-line [`Inst`]s and a
//! [`Terminator`]. Every SSA value is typed through the function's [`ValueTable`]; ALU
//! operations are component-wise and broadcast scalar operands.

use bitflags::bitflags;
use hashbrown::HashMap;

use crate::intrinsic::Intrinsic;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Shape of an SSA value: component count and per-component bit width.
///
/// Booleans use a bit size of 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueType {
    pub components: u8,
    pub bit_size: u8,
}

impl ValueType {
    pub const BOOL: Self = Self::vec(1, 1);
    pub const U32: Self = Self::vec(1, 32);
    pub const U64: Self = Self::vec(1, 64);

    pub const fn vec(components: u8, bit_size: u8) -> Self {
        Self {
            components,
            bit_size,
        }
    }

    pub const fn with_bit_size(self, bit_size: u8) -> Self {
        Self::vec(self.components, bit_size)
    }

    pub const fn with_components(self, components: u8) -> Self {
        Self::vec(components, self.bit_size)
    }

    /// Size of one component in bytes. Booleans occupy a byte.
    pub fn byte_size(self) -> u32 {
        (u32::from(self.bit_size) / 8).max(1)
    }

    /// Mask selecting the valid bits of one component.
    pub fn mask(self) -> u64 {
        if self.bit_size >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bit_size) - 1
        }
    }
}

/// Type of every SSA value in a function, indexed by [`ValueId`].
#[derive(Clone, Debug, Default)]
pub struct ValueTable {
    types: Vec<ValueType>,
}

impl ValueTable {
    pub fn alloc(&mut self, ty: ValueType) -> ValueId {
        let id = ValueId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    /// Type of `id`. Ids are only ever handed out by [`ValueTable::alloc`].
    pub fn ty(&self, id: ValueId) -> ValueType {
        self.types[id.0 as usize]
    }

    pub fn get(&self, id: ValueId) -> Option<ValueType> {
        self.types.get(id.0 as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AluOp {
    Iadd,
    Isub,
    Imul,
    Udiv,
    Umod,
    Ishl,
    Ushr,
    Ishr,
    Iand,
    Ior,
    Ieq,
    Ine,
    /// `srcs[0] ? srcs[1] : srcs[2]`
    Bcsel,
    U2u32,
    U2u64,
    I2i64,
    I2b,
    /// `srcs[0] | (srcs[1] << 32)`
    Pack64_2x32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Const(Vec<u64>),
    Alu {
        op: AluOp,
        srcs: Vec<ValueId>,
    },
    /// Concatenate the components of every source.
    Vec(Vec<ValueId>),
    Swizzle {
        src: ValueId,
        comps: Vec<u8>,
    },
    Intrinsic {
        intrinsic: Intrinsic,
        srcs: Vec<ValueId>,
    },
    /// Load the destination type from a 64-bit address.
    LoadGlobal {
        addr: ValueId,
        align: u32,
    },
    /// Load an aligned 64-byte block as 16 dwords.
    LoadGlobalBlock {
        addr: ValueId,
    },
    StoreGlobal {
        addr: ValueId,
        value: ValueId,
        write_mask: u8,
        align: u32,
    },
    /// Reinterpret the concatenated bits of `srcs` and read the destination type starting at
    /// `bit_offset`.
    ExtractBits {
        srcs: Vec<ValueId>,
        bit_offset: u32,
    },
    /// Externally visible sink.
    Export {
        slot: u32,
        src: ValueId,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inst {
    pub dest: Option<ValueId>,
    pub op: Op,
}

impl Inst {
    pub fn intrinsic(&self) -> Option<Intrinsic> {
        match &self.op {
            Op::Intrinsic { intrinsic, .. } => Some(*intrinsic),
            _ => None,
        }
    }

    pub fn for_each_src_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match &mut self.op {
            Op::Const(_) => {}
            Op::Alu { srcs, .. }
            | Op::Vec(srcs)
            | Op::Intrinsic { srcs, .. }
            | Op::ExtractBits { srcs, .. } => srcs.iter_mut().for_each(&mut f),
            Op::Swizzle { src, .. } | Op::Export { src, .. } => f(src),
            Op::LoadGlobal { addr, .. } | Op::LoadGlobalBlock { addr } => f(addr),
            Op::StoreGlobal { addr, value, .. } => {
                f(addr);
                f(value);
            }
        }
    }

    pub fn for_each_src(&self, mut f: impl FnMut(ValueId)) {
        match &self.op {
            Op::Const(_) => {}
            Op::Alu { srcs, .. }
            | Op::Vec(srcs)
            | Op::Intrinsic { srcs, .. }
            | Op::ExtractBits { srcs, .. } => srcs.iter().copied().for_each(&mut f),
            Op::Swizzle { src, .. } | Op::Export { src, .. } => f(*src),
            Op::LoadGlobal { addr, .. } | Op::LoadGlobalBlock { addr } => f(*addr),
            Op::StoreGlobal { addr, value, .. } => {
                f(*addr);
                f(*value);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminator {
    Return,
    Jump(BlockId),
    Branch {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub insts: Vec<Inst>,
    pub terminator: Terminator,
}

impl Block {
    fn new() -> Self {
        Self {
            insts: Vec::new(),
            terminator: Terminator::Return,
        }
    }
}

bitflags! {
    /// Analyses that are still valid for a function.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Metadata: u32 {
        const BLOCK_INDEX = 1 << 0;
        const DOMINANCE = 1 << 1;
    }
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub blocks: Vec<Block>,
    pub values: ValueTable,
    pub valid_metadata: Metadata,
}

impl Function {
    /// Create a function with a single empty entry block.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: vec![Block::new()],
            values: ValueTable::default(),
            valid_metadata: Metadata::all(),
        }
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn add_block(&mut self) -> BlockId {
        self.blocks.push(Block::new());
        self.valid_metadata = Metadata::empty();
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn append(&mut self, block: BlockId, insts: impl IntoIterator<Item = Inst>) {
        self.block_mut(block).insts.extend(insts);
    }

    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        self.block_mut(block).terminator = terminator;
        self.valid_metadata = Metadata::empty();
    }

    /// Keep only the analyses in `preserved` marked valid.
    pub fn preserve_metadata(&mut self, preserved: Metadata) {
        self.valid_metadata &= preserved;
    }

    pub fn insts(&self) -> impl Iterator<Item = &Inst> {
        self.blocks.iter().flat_map(|b| b.insts.iter())
    }

    pub fn intrinsics(&self) -> impl Iterator<Item = Intrinsic> + '_ {
        self.insts().filter_map(Inst::intrinsic)
    }

    /// First component of every scalar constant, keyed by its value id.
    pub fn scalar_constants(&self) -> HashMap<ValueId, u64> {
        let mut out = HashMap::new();
        for inst in self.insts() {
            if let (Some(dest), Op::Const(values)) = (inst.dest, &inst.op) {
                if let [value] = values.as_slice() {
                    out.insert(dest, *value);
                }
            }
        }
        out
    }

    /// Replace every use of a key in `map` with its value, in one sweep over the function.
    pub fn rewrite_uses(&mut self, map: &HashMap<ValueId, ValueId>) {
        if map.is_empty() {
            return;
        }
        let resolve = |v: &mut ValueId| {
            if let Some(new) = map.get(v) {
                *v = *new;
            }
        };
        for block in &mut self.blocks {
            for inst in &mut block.insts {
                inst.for_each_src_mut(resolve);
            }
            if let Terminator::Branch { cond, .. } = &mut block.terminator {
                resolve(cond);
            }
        }
    }
}
