//! Compute system-value lowering.
//!
//! Derives the local invocation id/index and the subgroup count from the subgroup id, the lane
//! index and the workgroup size, and narrows 64-bit workgroup reads to 32 bits.

use tracing::debug;

use crate::builder::Builder;
use crate::error::LowerError;
use crate::intrinsic::Intrinsic;
use crate::ir::{Function, Metadata, Op, ValueId, ValueType};
use crate::pass::{apply_rewrites, check_replacement, Rewrite};
use crate::shader::{ComputeInfo, DerivativeGroup, Shader};

const VEC3_U32: ValueType = ValueType::vec(3, 32);

/// Returns whether anything changed.
pub fn lower_cs_intrinsics(shader: &mut Shader) -> Result<bool, LowerError> {
    if !shader.stage.is_compute() {
        return Err(LowerError::NotCompute(shader.stage));
    }
    check_derivative_group(&shader.compute)?;

    let mut progress = false;
    for func in &mut shader.functions {
        progress |= lower_function(func, &shader.compute)?;
    }
    Ok(progress)
}

/// Workgroup shape constraints for compute derivatives.
fn check_derivative_group(info: &ComputeInfo) -> Result<(), LowerError> {
    if info.local_size_variable {
        return Ok(());
    }
    let [x, y, _] = info.local_size;
    match info.derivative_group {
        DerivativeGroup::Quads if x % 2 != 0 || y % 2 != 0 => {
            Err(LowerError::QuadDerivativeOddSize { x, y })
        }
        DerivativeGroup::Linear if info.invocations() % 4 != 0 => {
            Err(LowerError::LinearDerivativeSize(info.invocations()))
        }
        _ => Ok(()),
    }
}

/// `(size.x, size.y)` as 32-bit values, constant unless the size is only known at dispatch.
fn size_xy(b: &mut Builder<'_>, info: &ComputeInfo) -> (ValueId, ValueId) {
    if info.local_size_variable {
        let size = b.intrinsic(Intrinsic::WorkgroupSize, &[], VEC3_U32);
        (b.channel(size, 0), b.channel(size, 1))
    } else {
        (b.imm32(info.local_size[0]), b.imm32(info.local_size[1]))
    }
}

/// `(local_index, local_id)` for the current invocation.
fn local_index_and_id(b: &mut Builder<'_>, info: &ComputeInfo) -> (ValueId, ValueId) {
    let subgroup_id = b.intrinsic(Intrinsic::SubgroupId, &[], ValueType::U32);
    let width = b.intrinsic(Intrinsic::SubgroupSize, &[], ValueType::U32);
    let thread_base = b.imul(subgroup_id, width);
    let lane = b.intrinsic(Intrinsic::SubgroupInvocation, &[], ValueType::U32);
    let linear = b.iadd(lane, thread_base);

    let (size_x, size_y) = size_xy(b, info);

    if info.derivative_group != DerivativeGroup::Quads {
        // The trailing `% size.z` is dropped: the index is in range by construction.
        let id_x = b.umod(linear, size_x);
        let rows = b.udiv(linear, size_x);
        let id_y = b.umod(rows, size_y);
        let plane = b.imul(size_x, size_y);
        let id_z = b.udiv(linear, plane);
        let id = b.vec(&[id_x, id_y, id_z]);
        return (linear, id);
    }

    // Work in pairs of rows where each group of four lanes is one 2x2 quad; extra z layers
    // are just more rows.
    let one = b.imm32(1);
    let double_x = b.ishl(size_x, one);
    let row_pair_id = b.umod(linear, double_x);
    let row_pairs = b.udiv(linear, double_x);

    let low = b.iand(row_pair_id, one);
    let half = b.ishr(row_pair_id, one);
    let high = b.iand_imm(half, 0xffff_fffe);
    let x = b.ior(low, high);

    let pair_base = b.ishl(row_pairs, one);
    let row_in_pair = b.iand(half, one);
    let y = b.ior(pair_base, row_in_pair);

    let id_y = b.umod(y, size_y);
    let id_z = b.udiv(y, size_y);
    let id = b.vec(&[x, id_y, id_z]);
    let row = b.imul(y, size_x);
    let index = b.iadd(x, row);
    (index, id)
}

fn num_subgroups(b: &mut Builder<'_>, info: &ComputeInfo) -> ValueId {
    let size = if info.local_size_variable {
        let size = b.intrinsic(Intrinsic::WorkgroupSize, &[], VEC3_U32);
        let x = b.channel(size, 0);
        let y = b.channel(size, 1);
        let z = b.channel(size, 2);
        let xy = b.imul(x, y);
        b.imul(xy, z)
    } else {
        b.imm32(info.invocations())
    };

    let width = b.intrinsic(Intrinsic::SubgroupSize, &[], ValueType::U32);
    let sum = b.iadd(size, width);
    let rounded = b.iadd_imm(sum, -1);
    b.udiv(rounded, width)
}

fn lower_function(func: &mut Function, info: &ComputeInfo) -> Result<bool, LowerError> {
    let Function { blocks, values, .. } = func;

    let mut rewrites = Vec::new();
    for (block_idx, block) in blocks.iter().enumerate() {
        // Reused by later reads within the same block only.
        let mut local: Option<(ValueId, ValueId)> = None;

        for (index, inst) in block.insts.iter().enumerate() {
            let Op::Intrinsic { intrinsic, srcs } = &inst.op else {
                continue;
            };
            let intrinsic = *intrinsic;
            let Some(dest) = inst.dest else {
                continue;
            };
            let dest_ty = values.ty(dest);
            let mut b = Builder::new(values);

            let sysval = match intrinsic {
                Intrinsic::WorkgroupSize | Intrinsic::WorkgroupId | Intrinsic::NumWorkgroups => {
                    if dest_ty.bit_size != 64 {
                        continue;
                    }
                    let narrow = b.intrinsic(intrinsic, srcs, dest_ty.with_bit_size(32));
                    b.u2u64(narrow)
                }
                Intrinsic::LocalInvocationIndex | Intrinsic::LocalInvocationId => {
                    let (index, id) = match local {
                        Some(pair) => pair,
                        None => {
                            let pair = local_index_and_id(&mut b, info);
                            local = Some(pair);
                            pair
                        }
                    };
                    let value = if intrinsic == Intrinsic::LocalInvocationId {
                        id
                    } else {
                        index
                    };
                    widen(&mut b, value, dest_ty)
                }
                Intrinsic::NumSubgroups => {
                    let value = num_subgroups(&mut b, info);
                    widen(&mut b, value, dest_ty)
                }
                _ => continue,
            };

            let insts = b.finish();
            check_replacement(values, intrinsic, dest, sysval)?;
            debug!(%intrinsic, emitted = insts.len(), "lowered compute system value");
            rewrites.push(Rewrite {
                block: block_idx,
                index,
                insts,
                replacement: Some((dest, sysval)),
            });
        }
    }

    let progress = !rewrites.is_empty();
    if progress {
        apply_rewrites(func, rewrites);
        func.preserve_metadata(Metadata::BLOCK_INDEX | Metadata::DOMINANCE);
    }
    Ok(progress)
}

fn widen(b: &mut Builder<'_>, value: ValueId, dest_ty: ValueType) -> ValueId {
    if dest_ty.bit_size == 64 {
        b.u2u64(value)
    } else {
        value
    }
}
