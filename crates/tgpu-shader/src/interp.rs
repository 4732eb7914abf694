//! Reference interpreter for the shader IR.
//!
//! Used to check lowered programs against a memory image: hardware intrinsics are answered by
//! a [`SystemValues`] implementation and global memory is any [`Memory`].

use std::collections::BTreeMap;

use hashbrown::HashMap;
use thiserror::Error;

use crate::intrinsic::Intrinsic;
use crate::ir::{AluOp, Function, Op, Terminator, ValueId, ValueType};

/// Upper bound on executed instructions, guards against looping control flow.
pub const STEP_LIMIT: usize = 1 << 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpError {
    #[error("value {0:?} used before definition")]
    Undefined(ValueId),
    #[error("no value provided for intrinsic {0}")]
    Unhandled(Intrinsic),
    #[error("division by zero")]
    DivisionByZero,
    #[error("bit extract at offset {offset} is not byte aligned")]
    UnalignedExtract { offset: u32 },
    #[error("bit extract reads past the end of its sources")]
    ExtractOutOfRange,
    #[error("instruction producing a value has no destination")]
    MissingDest,
    #[error("step limit of {STEP_LIMIT} exceeded")]
    StepLimit,
}

pub trait Memory {
    fn read(&self, addr: u64, out: &mut [u8]);
    fn write(&mut self, addr: u64, data: &[u8]);

    fn read_u32(&self, addr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read(addr, &mut buf);
        u32::from_le_bytes(buf)
    }

    fn read_u64(&self, addr: u64) -> u64 {
        let mut buf = [0u8; 8];
        self.read(addr, &mut buf);
        u64::from_le_bytes(buf)
    }

    fn write_u32(&mut self, addr: u64, value: u32) {
        self.write(addr, &value.to_le_bytes());
    }

    fn write_u64(&mut self, addr: u64, value: u64) {
        self.write(addr, &value.to_le_bytes());
    }
}

/// Byte-granular memory over the whole 64-bit address space. Unwritten bytes read as zero.
#[derive(Debug, Clone, Default)]
pub struct SparseMemory {
    bytes: HashMap<u64, u8>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Memory for SparseMemory {
    fn read(&self, addr: u64, out: &mut [u8]) {
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self
                .bytes
                .get(&addr.wrapping_add(i as u64))
                .copied()
                .unwrap_or(0);
        }
    }

    fn write(&mut self, addr: u64, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.bytes.insert(addr.wrapping_add(i as u64), *byte);
        }
    }
}

/// Values of the intrinsics left in a program after lowering.
pub trait SystemValues {
    /// Components of `intrinsic`'s result, or `None` if it is not provided.
    fn value(&self, intrinsic: Intrinsic, ty: ValueType) -> Option<Vec<u64>>;
}

pub type Exports = BTreeMap<u32, Vec<u64>>;

struct Frame<'a> {
    func: &'a Function,
    values: HashMap<ValueId, Vec<u64>>,
}

impl Frame<'_> {
    fn get(&self, id: ValueId) -> Result<&[u64], InterpError> {
        self.values
            .get(&id)
            .map(Vec::as_slice)
            .ok_or(InterpError::Undefined(id))
    }

    fn scalar(&self, id: ValueId) -> Result<u64, InterpError> {
        self.get(id)?
            .first()
            .copied()
            .ok_or(InterpError::Undefined(id))
    }
}

/// Run `func` from its entry block and return what it exported.
pub fn run(
    func: &Function,
    sys: &dyn SystemValues,
    mem: &mut dyn Memory,
) -> Result<Exports, InterpError> {
    let mut frame = Frame {
        func,
        values: HashMap::new(),
    };
    let mut exports = Exports::new();
    let mut block = func.entry();
    let mut steps = 0usize;

    loop {
        let current = func.block(block);
        for inst in &current.insts {
            steps += 1;
            if steps > STEP_LIMIT {
                return Err(InterpError::StepLimit);
            }

            let ty = inst.dest.map(|d| func.values.ty(d));
            let result = match &inst.op {
                Op::Export { slot, src } => {
                    exports.insert(*slot, frame.get(*src)?.to_vec());
                    None
                }
                Op::StoreGlobal {
                    addr,
                    value,
                    write_mask,
                    ..
                } => {
                    let addr = frame.scalar(*addr)?;
                    let value_ty = func.values.ty(*value);
                    let bytes = value_ty.byte_size() as usize;
                    for (i, comp) in frame.get(*value)?.iter().enumerate() {
                        if write_mask & (1 << i) != 0 {
                            let le = comp.to_le_bytes();
                            mem.write(addr.wrapping_add((i * bytes) as u64), &le[..bytes]);
                        }
                    }
                    None
                }
                op => {
                    let ty = ty.ok_or(InterpError::MissingDest)?;
                    Some(eval(&frame, op, ty, sys, mem)?)
                }
            };

            if let (Some(dest), Some(result)) = (inst.dest, result) {
                frame.values.insert(dest, result);
            }
        }

        block = match current.terminator {
            Terminator::Return => return Ok(exports),
            Terminator::Jump(target) => target,
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                if frame.scalar(cond)? != 0 {
                    then_block
                } else {
                    else_block
                }
            }
        };
    }
}

fn eval(
    frame: &Frame<'_>,
    op: &Op,
    ty: ValueType,
    sys: &dyn SystemValues,
    mem: &mut dyn Memory,
) -> Result<Vec<u64>, InterpError> {
    let mask = ty.mask();
    let out = match op {
        Op::Const(values) => values.iter().map(|v| v & mask).collect(),
        Op::Alu { op, srcs } => eval_alu(frame, *op, srcs, ty)?,
        Op::Vec(srcs) => {
            let mut out = Vec::with_capacity(usize::from(ty.components));
            for src in srcs {
                out.extend_from_slice(frame.get(*src)?);
            }
            out
        }
        Op::Swizzle { src, comps } => {
            let src_vals = frame.get(*src)?;
            comps
                .iter()
                .map(|c| src_vals.get(usize::from(*c)).copied().unwrap_or(0))
                .collect()
        }
        Op::Intrinsic { intrinsic, .. } => sys
            .value(*intrinsic, ty)
            .ok_or(InterpError::Unhandled(*intrinsic))?
            .into_iter()
            .map(|v| v & mask)
            .collect(),
        Op::LoadGlobal { addr, .. } => {
            let addr = frame.scalar(*addr)?;
            let bytes = ty.byte_size() as usize;
            (0..usize::from(ty.components))
                .map(|i| {
                    let mut buf = [0u8; 8];
                    mem.read(addr.wrapping_add((i * bytes) as u64), &mut buf[..bytes]);
                    u64::from_le_bytes(buf) & mask
                })
                .collect()
        }
        Op::LoadGlobalBlock { addr } => {
            let addr = frame.scalar(*addr)?;
            (0..16u64)
                .map(|i| u64::from(mem.read_u32(addr.wrapping_add(i * 4))))
                .collect()
        }
        Op::ExtractBits { srcs, bit_offset } => {
            if bit_offset % 8 != 0 {
                return Err(InterpError::UnalignedExtract {
                    offset: *bit_offset,
                });
            }
            let mut bytes = Vec::new();
            for src in srcs {
                let src_ty = frame.func.values.ty(*src);
                let width = src_ty.byte_size() as usize;
                for comp in frame.get(*src)? {
                    bytes.extend_from_slice(&comp.to_le_bytes()[..width]);
                }
            }
            let width = ty.byte_size() as usize;
            let start = (*bit_offset / 8) as usize;
            (0..usize::from(ty.components))
                .map(|i| {
                    let at = start + i * width;
                    let slice = bytes
                        .get(at..at + width)
                        .ok_or(InterpError::ExtractOutOfRange)?;
                    let mut buf = [0u8; 8];
                    buf[..width].copy_from_slice(slice);
                    Ok(u64::from_le_bytes(buf))
                })
                .collect::<Result<_, _>>()?
        }
        Op::StoreGlobal { .. } | Op::Export { .. } => Vec::new(),
    };
    Ok(out)
}

fn sign_extend(value: u64, bits: u8) -> i64 {
    if bits >= 64 {
        return value as i64;
    }
    let shift = 64 - u32::from(bits);
    ((value << shift) as i64) >> shift
}

fn eval_alu(
    frame: &Frame<'_>,
    op: AluOp,
    srcs: &[ValueId],
    ty: ValueType,
) -> Result<Vec<u64>, InterpError> {
    let operands = srcs
        .iter()
        .map(|s| frame.get(*s))
        .collect::<Result<Vec<_>, _>>()?;
    let src_bits: Vec<u8> = srcs
        .iter()
        .map(|s| frame.func.values.ty(*s).bit_size)
        .collect();
    let comp = |src: usize, i: usize| -> u64 {
        let vals = operands[src];
        if vals.len() == 1 {
            vals[0]
        } else {
            vals.get(i).copied().unwrap_or(0)
        }
    };

    let mask = ty.mask();
    let width = u32::from(ty.bit_size.max(1));
    let mut out = Vec::with_capacity(usize::from(ty.components));
    for i in 0..usize::from(ty.components) {
        let v = match op {
            AluOp::Iadd => comp(0, i).wrapping_add(comp(1, i)),
            AluOp::Isub => comp(0, i).wrapping_sub(comp(1, i)),
            AluOp::Imul => comp(0, i).wrapping_mul(comp(1, i)),
            AluOp::Udiv => comp(0, i)
                .checked_div(comp(1, i))
                .ok_or(InterpError::DivisionByZero)?,
            AluOp::Umod => comp(0, i)
                .checked_rem(comp(1, i))
                .ok_or(InterpError::DivisionByZero)?,
            AluOp::Ishl => comp(0, i) << (comp(1, i) as u32 % width),
            AluOp::Ushr => comp(0, i) >> (comp(1, i) as u32 % width),
            AluOp::Ishr => {
                (sign_extend(comp(0, i), src_bits[0]) >> (comp(1, i) as u32 % width)) as u64
            }
            AluOp::Iand => comp(0, i) & comp(1, i),
            AluOp::Ior => comp(0, i) | comp(1, i),
            AluOp::Ieq => u64::from(comp(0, i) == comp(1, i)),
            AluOp::Ine => u64::from(comp(0, i) != comp(1, i)),
            AluOp::Bcsel => {
                if comp(0, i) != 0 {
                    comp(1, i)
                } else {
                    comp(2, i)
                }
            }
            AluOp::U2u32 | AluOp::U2u64 => comp(0, i),
            AluOp::I2i64 => sign_extend(comp(0, i), src_bits[0]) as u64,
            AluOp::I2b => u64::from(comp(0, i) != 0),
            AluOp::Pack64_2x32 => (comp(0, i) & 0xffff_ffff) | (comp(1, i) << 32),
        };
        out.push(v & mask);
    }
    Ok(out)
}
