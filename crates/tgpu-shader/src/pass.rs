//! Two-phase rewriting shared by the lowering passes.
//!
//! A pass scans the function and records one [`Rewrite`] per matched instruction without
//! touching the instruction lists. [`apply_rewrites`] then splices every replacement in
//! back-to-front order, so recorded indices stay valid, and redirects all uses in one sweep.

use hashbrown::HashMap;

use crate::error::LowerError;
use crate::intrinsic::Intrinsic;
use crate::ir::{Function, Inst, ValueId, ValueTable};

#[derive(Debug)]
pub(crate) struct Rewrite {
    pub block: usize,
    pub index: usize,
    /// Instructions taking the place of the matched one. May be empty.
    pub insts: Vec<Inst>,
    /// Uses of the first value become uses of the second.
    pub replacement: Option<(ValueId, ValueId)>,
}

pub(crate) fn apply_rewrites(func: &mut Function, mut rewrites: Vec<Rewrite>) {
    rewrites.sort_by(|a, b| (b.block, b.index).cmp(&(a.block, a.index)));

    let mut uses = HashMap::with_capacity(rewrites.len());
    for rewrite in rewrites {
        let insts = &mut func.blocks[rewrite.block].insts;
        insts.splice(rewrite.index..=rewrite.index, rewrite.insts);
        if let Some((old, new)) = rewrite.replacement {
            uses.insert(old, new);
        }
    }
    func.rewrite_uses(&uses);
}

/// The replacement must have exactly the shape of the value it stands in for.
pub(crate) fn check_replacement(
    values: &ValueTable,
    intrinsic: Intrinsic,
    old: ValueId,
    new: ValueId,
) -> Result<(), LowerError> {
    let expected = values.ty(old);
    let found = values.ty(new);
    if expected != found {
        return Err(LowerError::TypeMismatch {
            intrinsic,
            expected,
            found,
        });
    }
    Ok(())
}
