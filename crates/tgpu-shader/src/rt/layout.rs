//! Memory layouts shared with the ray-tracing hardware, and the loads that read them.
//!
//! Nothing here owns storage: each `load_*` emits instructions computing field values from
//! a base address that is itself a loaded value.

use crate::builder::Builder;
use crate::device::{DeviceInfo, HOTZONE_SIZE};
use crate::intrinsic::Intrinsic;
use crate::ir::{ValueId, ValueType};

/// Byte offset of the push constants from the global argument pointer.
pub const PUSH_CONST_OFFSET: u64 = 128;

/// `leaf_type` of a procedural (AABB) primitive leaf.
pub const BVH_NODE_TYPE_PROCEDURAL: u64 = 3;

pub const HIT_KIND_FRONT_FACE: u32 = 0xfe;
pub const HIT_KIND_BACK_FACE: u32 = 0xff;

/// Bytes of one MemHit record. The committed hit comes first, the potential hit follows.
pub const MEM_HIT_SIZE: i64 = 32;
/// Bytes of one MemRay record; rays follow both hit records, one per BVH level.
pub const MEM_RAY_SIZE: i64 = 64;

/// Leaf pointers are stored in 64-byte units in the low 42 bits.
const LEAF_PTR_BITS: u32 = 42;
const LEAF_PTR_SHIFT: u32 = 6;

const VEC3_F32: ValueType = ValueType::vec(3, 32);
const VEC4_U32: ValueType = ValueType::vec(4, 32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BvhLevel {
    World = 0,
    Object = 1,
}

/// Fields of the RT dispatch globals, found at the global argument pointer.
#[derive(Clone, Copy, Debug)]
pub struct Globals {
    pub base_mem_addr: ValueId,
    pub call_stack_handler: ValueId,
    /// In 64-byte units.
    pub hw_stack_size: ValueId,
    pub num_dss_rt_stacks: ValueId,
    pub hit_sbt_addr: ValueId,
    pub hit_sbt_stride: ValueId,
    pub miss_sbt_addr: ValueId,
    pub miss_sbt_stride: ValueId,
    /// In 64-byte units.
    pub sw_stack_size: ValueId,
    pub launch_size: ValueId,
    pub call_sbt_addr: ValueId,
    pub call_sbt_stride: ValueId,
}

/// Low dword of an SBT address plus the dword holding its sign-extended high 16 bits and the
/// 16-bit stride.
fn sbt_addr_stride(b: &mut Builder<'_>, lo: ValueId, packed: ValueId) -> (ValueId, ValueId) {
    let shifted = b.ishl_imm(packed, 16);
    let hi = b.ishr_imm(shifted, 16);
    let addr = b.pack_64_2x32(lo, hi);
    let stride = b.ushr_imm(packed, 16);
    (addr, stride)
}

pub fn load_globals(b: &mut Builder<'_>, addr: ValueId) -> Globals {
    let data = b.load_global_block(addr);
    let dw = |b: &mut Builder<'_>, i: u8| b.channel(data, i);

    let (lo, hi) = (dw(b, 0), dw(b, 1));
    let base_mem_addr = b.pack_64_2x32(lo, hi);
    let (lo, hi) = (dw(b, 2), dw(b, 3));
    let call_stack_handler = b.pack_64_2x32(lo, hi);
    let hw_stack_size = dw(b, 4);
    let stacks = dw(b, 5);
    let num_dss_rt_stacks = b.iand_imm(stacks, 0xffff);
    let (lo, packed) = (dw(b, 8), dw(b, 9));
    let (hit_sbt_addr, hit_sbt_stride) = sbt_addr_stride(b, lo, packed);
    let (lo, packed) = (dw(b, 10), dw(b, 11));
    let (miss_sbt_addr, miss_sbt_stride) = sbt_addr_stride(b, lo, packed);
    let sw_stack_size = dw(b, 12);
    let launch_size = b.channels(data, 0x7 << 13);

    let tail_addr = b.iadd_imm(addr, 64);
    let tail = b.load_global_block(tail_addr);
    let lo = b.channel(tail, 0);
    let packed = b.channel(tail, 1);
    let (call_sbt_addr, call_sbt_stride) = sbt_addr_stride(b, lo, packed);

    Globals {
        base_mem_addr,
        call_stack_handler,
        hw_stack_size,
        num_dss_rt_stacks,
        hit_sbt_addr,
        hit_sbt_stride,
        miss_sbt_addr,
        miss_sbt_stride,
        sw_stack_size,
        launch_size,
        call_sbt_addr,
        call_sbt_stride,
    }
}

/// Per-invocation addresses derived from the globals and the async stack id.
#[derive(Clone, Copy, Debug)]
pub struct StackAddrs {
    pub hotzone: ValueId,
    /// Start of this invocation's hardware stack, where MemHit/MemRay live.
    pub hw_stack: ValueId,
    /// Start of this invocation's software stack.
    pub sw_stack: ValueId,
}

pub fn stack_addrs(b: &mut Builder<'_>, globals: &Globals, dev: &DeviceInfo) -> StackAddrs {
    let stack_id = b.intrinsic(Intrinsic::AsyncStackId, &[], ValueType::U32);
    let hw_stack_bytes = b.imul_imm(globals.hw_stack_size, 64);
    let sw_stack_bytes = b.imul_imm(globals.sw_stack_size, 64);

    // Hotzones sit just below the base address.
    let slot = b.imul_imm(stack_id, u64::from(HOTZONE_SIZE));
    let offset = b.iadd_imm(slot, -i64::from(dev.sw_hotzone_size()));
    let offset = b.i2i64(offset);
    let hotzone = b.iadd(globals.base_mem_addr, offset);

    let offset = b.imul(stack_id, hw_stack_bytes);
    let offset = b.u2u64(offset);
    let hw_stack = b.iadd(globals.base_mem_addr, offset);

    let all_hw = b.imul_imm(hw_stack_bytes, u64::from(dev.rt_stack_count()));
    let all_hw = b.u2u64(all_hw);
    let sw_base = b.iadd(globals.base_mem_addr, all_hw);
    let id64 = b.u2u64(stack_id);
    let size64 = b.u2u64(sw_stack_bytes);
    let offset = b.imul(id64, size64);
    let sw_stack = b.iadd(sw_base, offset);

    StackAddrs {
        hotzone,
        hw_stack,
        sw_stack,
    }
}

/// `vec4` hotzone: stack offset cursor followed by the launch id.
pub fn load_hotzone(b: &mut Builder<'_>, addr: ValueId) -> ValueId {
    b.load_global(addr, VEC4_U32, HOTZONE_SIZE)
}

#[derive(Clone, Copy, Debug)]
pub struct MemHit {
    pub t: ValueId,
    pub aabb_hit_kind: ValueId,
    pub tri_bary: ValueId,
    pub leaf_type: ValueId,
    pub prim_leaf_index: ValueId,
    pub front_face: ValueId,
    pub prim_leaf_ptr: ValueId,
    pub inst_leaf_ptr: ValueId,
}

fn unpack_leaf_ptr(b: &mut Builder<'_>, lo: ValueId, hi: ValueId) -> ValueId {
    let packed = b.pack_64_2x32(lo, hi);
    let ptr = b.iand_imm(packed, (1u64 << LEAF_PTR_BITS) - 1);
    b.ishl_imm(ptr, LEAF_PTR_SHIFT)
}

pub fn load_mem_hit(b: &mut Builder<'_>, hw_stack: ValueId, committed: bool) -> MemHit {
    let addr = b.iadd_imm(hw_stack, if committed { 0 } else { MEM_HIT_SIZE });
    let data = b.load_global(addr, VEC4_U32, 16);
    let t = b.channel(data, 0);
    let aabb_hit_kind = b.channel(data, 1);
    let tri_bary = b.channels(data, 0x6);
    let bitfield = b.channel(data, 3);
    let leaf_type = b.ubfe(bitfield, 17, 3);
    let prim_leaf_index = b.ubfe(bitfield, 20, 4);
    let face = b.iand_imm(bitfield, 1 << 27);
    let front_face = b.i2b(face);

    let ptr_addr = b.iadd_imm(addr, 16);
    let ptrs = b.load_global(ptr_addr, VEC4_U32, 16);
    let (lo, hi) = (b.channel(ptrs, 0), b.channel(ptrs, 1));
    let prim_leaf_ptr = unpack_leaf_ptr(b, lo, hi);
    let (lo, hi) = (b.channel(ptrs, 2), b.channel(ptrs, 3));
    let inst_leaf_ptr = unpack_leaf_ptr(b, lo, hi);

    MemHit {
        t,
        aabb_hit_kind,
        tri_bary,
        leaf_type,
        prim_leaf_index,
        front_face,
        prim_leaf_ptr,
        inst_leaf_ptr,
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MemRay {
    pub orig: ValueId,
    pub dir: ValueId,
    pub t_near: ValueId,
    pub t_far: ValueId,
    pub ray_flags: ValueId,
}

pub fn load_mem_ray(b: &mut Builder<'_>, hw_stack: ValueId, level: BvhLevel) -> MemRay {
    let addr = b.iadd_imm(hw_stack, 2 * MEM_HIT_SIZE + level as i64 * MEM_RAY_SIZE);
    let d0 = b.load_global(addr, VEC4_U32, 16);
    let addr1 = b.iadd_imm(addr, 16);
    let d1 = b.load_global(addr1, VEC4_U32, 16);
    let addr2 = b.iadd_imm(addr, 32);
    let d2 = b.load_global(addr2, VEC4_U32, 16);

    let orig = b.channels(d0, 0x7);
    let dir_x = b.channel(d0, 3);
    let dir_yz = b.channels(d1, 0x3);
    let dir = b.vec(&[dir_x, dir_yz]);
    let t_near = b.channel(d1, 2);
    let t_far = b.channel(d1, 3);
    let flags_dw = b.channel(d2, 1);
    let ray_flags = b.ushr_imm(flags_dw, 16);

    MemRay {
        orig,
        dir,
        t_near,
        t_far,
        ray_flags,
    }
}

/// A single field of a BVH instance leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceLeafField {
    WorldToObject(u8),
    ObjectToWorld(u8),
    InstanceId,
    InstanceIndex,
}

impl InstanceLeafField {
    /// Byte offset and type of the field. The fourth column of each matrix is stored with the
    /// other matrix.
    pub fn layout(self) -> (i64, ValueType) {
        match self {
            InstanceLeafField::WorldToObject(c @ 0..=2) => (16 + 12 * i64::from(c), VEC3_F32),
            InstanceLeafField::WorldToObject(_) => (100, VEC3_F32),
            InstanceLeafField::ObjectToWorld(c @ 0..=2) => (64 + 12 * i64::from(c), VEC3_F32),
            InstanceLeafField::ObjectToWorld(_) => (52, VEC3_F32),
            InstanceLeafField::InstanceId => (112, ValueType::U32),
            InstanceLeafField::InstanceIndex => (120, ValueType::U32),
        }
    }
}

pub fn load_instance_leaf_field(
    b: &mut Builder<'_>,
    leaf_addr: ValueId,
    field: InstanceLeafField,
) -> ValueId {
    let (offset, ty) = field.layout();
    let addr = b.iadd_imm(leaf_addr, offset);
    b.load_global(addr, ty, 4)
}
