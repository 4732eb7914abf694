//! Instruction builder used by the lowering passes and tests.
//!
//! Instructions are buffered in emission order and handed back by [`Builder::finish`]; the
//! caller decides where they are spliced.

use crate::intrinsic::Intrinsic;
use crate::ir::{AluOp, Inst, Op, ValueId, ValueTable, ValueType};

pub struct Builder<'a> {
    values: &'a mut ValueTable,
    insts: Vec<Inst>,
}

impl<'a> Builder<'a> {
    pub fn new(values: &'a mut ValueTable) -> Self {
        Self {
            values,
            insts: Vec::new(),
        }
    }

    pub fn finish(self) -> Vec<Inst> {
        self.insts
    }

    pub fn ty(&self, id: ValueId) -> ValueType {
        self.values.ty(id)
    }

    pub fn emit(&mut self, ty: ValueType, op: Op) -> ValueId {
        let dest = self.values.alloc(ty);
        self.insts.push(Inst {
            dest: Some(dest),
            op,
        });
        dest
    }

    pub fn emit_void(&mut self, op: Op) {
        self.insts.push(Inst { dest: None, op });
    }

    pub fn imm(&mut self, ty: ValueType, value: u64) -> ValueId {
        self.emit(ty, Op::Const(vec![value & ty.mask()]))
    }

    pub fn imm32(&mut self, value: u32) -> ValueId {
        self.imm(ValueType::U32, u64::from(value))
    }

    pub fn imm64(&mut self, value: u64) -> ValueId {
        self.imm(ValueType::U64, value)
    }

    pub fn imm_bool(&mut self, value: bool) -> ValueId {
        self.imm(ValueType::BOOL, u64::from(value))
    }

    fn broadcast(&self, a: ValueId, b: ValueId) -> ValueType {
        let (ta, tb) = (self.ty(a), self.ty(b));
        ta.with_components(ta.components.max(tb.components))
    }

    pub fn alu(&mut self, op: AluOp, srcs: &[ValueId], ty: ValueType) -> ValueId {
        self.emit(
            ty,
            Op::Alu {
                op,
                srcs: srcs.to_vec(),
            },
        )
    }

    fn binop(&mut self, op: AluOp, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.broadcast(a, b);
        self.alu(op, &[a, b], ty)
    }

    /// Scalar immediate with the bit size of `like`.
    fn imm_like(&mut self, like: ValueId, value: u64) -> ValueId {
        let ty = self.ty(like).with_components(1);
        self.imm(ty, value)
    }

    pub fn iadd(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binop(AluOp::Iadd, a, b)
    }

    /// `a + imm`, with `imm` truncated to the bit size of `a`.
    pub fn iadd_imm(&mut self, a: ValueId, imm: i64) -> ValueId {
        let c = self.imm_like(a, imm as u64);
        self.iadd(a, c)
    }

    pub fn isub(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binop(AluOp::Isub, a, b)
    }

    pub fn imul(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binop(AluOp::Imul, a, b)
    }

    pub fn imul_imm(&mut self, a: ValueId, imm: u64) -> ValueId {
        let c = self.imm_like(a, imm);
        self.imul(a, c)
    }

    pub fn udiv(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binop(AluOp::Udiv, a, b)
    }

    pub fn umod(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binop(AluOp::Umod, a, b)
    }

    pub fn ishl(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binop(AluOp::Ishl, a, b)
    }

    pub fn ishl_imm(&mut self, a: ValueId, shift: u32) -> ValueId {
        let c = self.imm32(shift);
        self.ishl(a, c)
    }

    pub fn ushr(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binop(AluOp::Ushr, a, b)
    }

    pub fn ushr_imm(&mut self, a: ValueId, shift: u32) -> ValueId {
        let c = self.imm32(shift);
        self.ushr(a, c)
    }

    pub fn ishr(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binop(AluOp::Ishr, a, b)
    }

    pub fn ishr_imm(&mut self, a: ValueId, shift: u32) -> ValueId {
        let c = self.imm32(shift);
        self.ishr(a, c)
    }

    pub fn iand(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binop(AluOp::Iand, a, b)
    }

    pub fn iand_imm(&mut self, a: ValueId, mask: u64) -> ValueId {
        let c = self.imm_like(a, mask);
        self.iand(a, c)
    }

    pub fn ior(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binop(AluOp::Ior, a, b)
    }

    pub fn ieq(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.broadcast(a, b).with_bit_size(1);
        self.alu(AluOp::Ieq, &[a, b], ty)
    }

    pub fn ieq_imm(&mut self, a: ValueId, imm: u64) -> ValueId {
        let c = self.imm_like(a, imm);
        self.ieq(a, c)
    }

    pub fn ine(&mut self, a: ValueId, b: ValueId) -> ValueId {
        let ty = self.broadcast(a, b).with_bit_size(1);
        self.alu(AluOp::Ine, &[a, b], ty)
    }

    pub fn bcsel(&mut self, cond: ValueId, then: ValueId, otherwise: ValueId) -> ValueId {
        let ty = self.broadcast(then, otherwise);
        self.alu(AluOp::Bcsel, &[cond, then, otherwise], ty)
    }

    pub fn u2u32(&mut self, a: ValueId) -> ValueId {
        let ty = self.ty(a).with_bit_size(32);
        self.alu(AluOp::U2u32, &[a], ty)
    }

    pub fn u2u64(&mut self, a: ValueId) -> ValueId {
        let ty = self.ty(a).with_bit_size(64);
        self.alu(AluOp::U2u64, &[a], ty)
    }

    pub fn i2i64(&mut self, a: ValueId) -> ValueId {
        let ty = self.ty(a).with_bit_size(64);
        self.alu(AluOp::I2i64, &[a], ty)
    }

    pub fn i2b(&mut self, a: ValueId) -> ValueId {
        let ty = self.ty(a).with_bit_size(1);
        self.alu(AluOp::I2b, &[a], ty)
    }

    pub fn pack_64_2x32(&mut self, lo: ValueId, hi: ValueId) -> ValueId {
        self.alu(AluOp::Pack64_2x32, &[lo, hi], ValueType::U64)
    }

    /// Unsigned bitfield extract with constant offset and width.
    pub fn ubfe(&mut self, a: ValueId, offset: u32, bits: u32) -> ValueId {
        let shifted = self.ushr_imm(a, offset);
        self.iand_imm(shifted, (1u64 << bits) - 1)
    }

    pub fn channel(&mut self, src: ValueId, comp: u8) -> ValueId {
        self.swizzle(src, &[comp])
    }

    /// Components of `src` selected by the bits of `mask`, in ascending order.
    pub fn channels(&mut self, src: ValueId, mask: u32) -> ValueId {
        let comps: Vec<u8> = (0..32u8).filter(|c| mask & (1 << c) != 0).collect();
        self.swizzle(src, &comps)
    }

    pub fn swizzle(&mut self, src: ValueId, comps: &[u8]) -> ValueId {
        let ty = self.ty(src).with_components(comps.len() as u8);
        self.emit(
            ty,
            Op::Swizzle {
                src,
                comps: comps.to_vec(),
            },
        )
    }

    pub fn vec(&mut self, srcs: &[ValueId]) -> ValueId {
        let components = srcs.iter().map(|s| self.ty(*s).components).sum();
        let bit_size = srcs.first().map_or(32, |s| self.ty(*s).bit_size);
        self.emit(
            ValueType::vec(components, bit_size),
            Op::Vec(srcs.to_vec()),
        )
    }

    pub fn intrinsic(&mut self, intrinsic: Intrinsic, srcs: &[ValueId], ty: ValueType) -> ValueId {
        self.emit(
            ty,
            Op::Intrinsic {
                intrinsic,
                srcs: srcs.to_vec(),
            },
        )
    }

    pub fn load_global(&mut self, addr: ValueId, ty: ValueType, align: u32) -> ValueId {
        self.emit(ty, Op::LoadGlobal { addr, align })
    }

    pub fn load_global_block(&mut self, addr: ValueId) -> ValueId {
        self.emit(ValueType::vec(16, 32), Op::LoadGlobalBlock { addr })
    }

    pub fn store_global(&mut self, addr: ValueId, value: ValueId, write_mask: u8, align: u32) {
        self.emit_void(Op::StoreGlobal {
            addr,
            value,
            write_mask,
            align,
        });
    }

    pub fn extract_bits(&mut self, srcs: &[ValueId], bit_offset: u32, ty: ValueType) -> ValueId {
        self.emit(
            ty,
            Op::ExtractBits {
                srcs: srcs.to_vec(),
                bit_offset,
            },
        )
    }

    pub fn export(&mut self, slot: u32, src: ValueId) {
        self.emit_void(Op::Export { slot, src });
    }
}
