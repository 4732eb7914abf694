use tracing::debug;

use crate::builder::Builder;
use crate::device::DeviceInfo;
use crate::error::LowerError;
use crate::intrinsic::{reloc, Intrinsic};
use crate::ir::{Function, Metadata, Op, ValueId, ValueType};
use crate::pass::{apply_rewrites, check_replacement, Rewrite};
use crate::rt::layout::{
    self, BvhLevel, Globals, InstanceLeafField, MemHit, MemRay, StackAddrs,
    BVH_NODE_TYPE_PROCEDURAL, HIT_KIND_BACK_FACE, HIT_KIND_FRONT_FACE, PUSH_CONST_OFFSET,
};
use crate::shader::{Shader, ShaderStage};

/// Lower ray-tracing system values and intrinsics to loads from the structures shared with
/// the ray-tracing hardware.
///
/// Afterwards only hardware intrinsics remain: the global and local argument pointers, the
/// async stack id and relocation constants. Returns whether anything changed.
pub fn lower_rt_intrinsics(shader: &mut Shader, dev: &DeviceInfo) -> Result<bool, LowerError> {
    let stage = shader.stage;
    let mut progress = false;
    for func in &mut shader.functions {
        progress |= lower_function(func, stage, dev)?;
    }
    Ok(progress)
}

fn handles(intrinsic: Intrinsic, stage: ShaderStage) -> bool {
    use Intrinsic::*;
    match intrinsic {
        // Push constants in the launch trampoline are lowered by the compute path.
        LoadUniform { .. } => stage != ShaderStage::Compute,
        ScratchBasePtr | StackPush { .. } | Resume { .. } | RayLaunchId | RayLaunchSize
        | RayWorldOrigin | RayWorldDirection | RayObjectOrigin | RayObjectDirection | RayTMin
        | RayTMax | PrimitiveId | InstanceId | InstanceCustomIndex | ObjectToWorld { .. }
        | WorldToObject { .. } | HitKind | RayFlags | GeometryIndex | ShaderRecordPtr
        | RayBaseMemAddr | HwStackSize | SwStackSize | NumDssRtStacks | HitSbtAddr
        | HitSbtStride | MissSbtAddr | MissSbtStride | CallableSbtAddr | CallableSbtStride
        | ResumeSbtAddr | LeafProcedural | LeafOpaque => true,
        GlobalArgAddr | LocalArgAddr | AsyncStackId | RelocConst { .. } | LocalInvocationId
        | LocalInvocationIndex | NumSubgroups | SubgroupId | SubgroupInvocation | SubgroupSize
        | WorkgroupSize | WorkgroupId | NumWorkgroups => false,
    }
}

/// Values loaded once at function entry.
struct Prologue {
    global_arg_addr: ValueId,
    globals: Globals,
    stack: StackAddrs,
    hotzone: ValueId,
    hit: Option<MemHit>,
    world_ray: Option<MemRay>,
    object_ray: Option<MemRay>,
}

fn build_prologue(b: &mut Builder<'_>, stage: ShaderStage, dev: &DeviceInfo) -> Prologue {
    let global_arg_addr = b.intrinsic(Intrinsic::GlobalArgAddr, &[], ValueType::U64);
    let globals = layout::load_globals(b, global_arg_addr);
    let stack = layout::stack_addrs(b, &globals, dev);
    let hotzone = layout::load_hotzone(b, stack.hotzone);

    let (hit, object_ray, world_ray) = match stage {
        ShaderStage::AnyHit | ShaderStage::ClosestHit | ShaderStage::Intersection => {
            let committed = stage == ShaderStage::ClosestHit;
            let hit = layout::load_mem_hit(b, stack.hw_stack, committed);
            let object = layout::load_mem_ray(b, stack.hw_stack, BvhLevel::Object);
            let world = layout::load_mem_ray(b, stack.hw_stack, BvhLevel::World);
            (Some(hit), Some(object), Some(world))
        }
        ShaderStage::Miss => {
            let world = layout::load_mem_ray(b, stack.hw_stack, BvhLevel::World);
            (None, None, Some(world))
        }
        ShaderStage::Vertex
        | ShaderStage::Fragment
        | ShaderStage::Compute
        | ShaderStage::Kernel
        | ShaderStage::RayGen
        | ShaderStage::Callable => (None, None, None),
    };

    Prologue {
        global_arg_addr,
        globals,
        stack,
        hotzone,
        hit,
        world_ray,
        object_ray,
    }
}

/// Running stack bookkeeping, updated by resume markers.
struct StackState {
    base_offset: ValueId,
    base_addr: ValueId,
    resumed: bool,
    seen_sysval: bool,
}

struct Lowering<'p> {
    stage: ShaderStage,
    function: &'p str,
    pro: &'p Prologue,
    stack: StackState,
}

impl Lowering<'_> {
    fn hit(&self, intrinsic: Intrinsic) -> Result<&MemHit, LowerError> {
        self.pro.hit.as_ref().ok_or(LowerError::RecordUnavailable {
            intrinsic,
            record: "MemHit",
            stage: self.stage,
        })
    }

    fn world_ray(&self, intrinsic: Intrinsic) -> Result<&MemRay, LowerError> {
        self.pro
            .world_ray
            .as_ref()
            .ok_or(LowerError::RecordUnavailable {
                intrinsic,
                record: "world MemRay",
                stage: self.stage,
            })
    }

    fn object_ray(&self, intrinsic: Intrinsic) -> Result<&MemRay, LowerError> {
        self.pro
            .object_ray
            .as_ref()
            .ok_or(LowerError::RecordUnavailable {
                intrinsic,
                record: "object MemRay",
                stage: self.stage,
            })
    }

    fn leaf_is_procedural(
        &self,
        b: &mut Builder<'_>,
        intrinsic: Intrinsic,
    ) -> Result<ValueId, LowerError> {
        Ok(match self.stage {
            // Any-hit shaders for procedural geometry are folded into intersection shaders.
            ShaderStage::AnyHit => b.imm_bool(false),
            ShaderStage::Intersection => b.imm_bool(true),
            _ => {
                let hit = self.hit(intrinsic)?;
                b.ieq_imm(hit.leaf_type, BVH_NODE_TYPE_PROCEDURAL)
            }
        })
    }

    fn instance_field(
        &self,
        b: &mut Builder<'_>,
        intrinsic: Intrinsic,
        field: InstanceLeafField,
    ) -> Result<ValueId, LowerError> {
        let leaf = self.hit(intrinsic)?.inst_leaf_ptr;
        Ok(layout::load_instance_leaf_field(b, leaf, field))
    }

    /// Dword at byte `offset` of the primitive leaf.
    fn prim_leaf_dword(
        &self,
        b: &mut Builder<'_>,
        intrinsic: Intrinsic,
        offset: i64,
    ) -> Result<ValueId, LowerError> {
        let ptr = self.hit(intrinsic)?.prim_leaf_ptr;
        let addr = b.iadd_imm(ptr, offset);
        Ok(b.load_global(addr, ValueType::U32, 4))
    }

    fn load_uniform(
        &self,
        b: &mut Builder<'_>,
        base: u32,
        src: ValueId,
        constant: Option<u64>,
        ty: ValueType,
    ) -> Result<ValueId, LowerError> {
        let byte_size = ty.byte_size();
        let base = PUSH_CONST_OFFSET + u64::from(base);
        match constant {
            Some(src_offset) => {
                let offset = base + src_offset;
                if offset % u64::from(byte_size) != 0 {
                    return Err(LowerError::MisalignedUniform { offset, byte_size });
                }
                // The block read is 64-byte aligned; read two so a straddling value is covered.
                let suboffset = offset % 64;
                let aligned = offset - suboffset;
                let mut blocks = [ValueId(0); 2];
                for (i, block) in blocks.iter_mut().enumerate() {
                    let offset = (aligned + i as u64 * 64) as i64;
                    let addr = b.iadd_imm(self.pro.global_arg_addr, offset);
                    *block = b.load_global_block(addr);
                }
                Ok(b.extract_bits(&blocks, (suboffset * 8) as u32, ty))
            }
            None => {
                let offset32 = b.iadd_imm(src, base as i64);
                let offset64 = b.u2u64(offset32);
                let addr = b.iadd(self.pro.global_arg_addr, offset64);
                Ok(b.load_global(addr, ty, byte_size))
            }
        }
    }

    /// Instructions replacing one handled intrinsic, and the value its uses now read.
    fn lower(
        &mut self,
        b: &mut Builder<'_>,
        intrinsic: Intrinsic,
        in_entry: bool,
        srcs: &[ValueId],
        dest_ty: Option<ValueType>,
        constant_src: Option<u64>,
    ) -> Result<Option<ValueId>, LowerError> {
        use Intrinsic::*;

        let pro = self.pro;
        let is_resume = matches!(intrinsic, Resume { .. });
        if is_resume && (!in_entry || self.stack.seen_sysval) {
            return Err(LowerError::ResumeNotFirst {
                function: self.function.to_owned(),
            });
        }
        self.stack.seen_sysval = true;

        let sysval = match intrinsic {
            ScratchBasePtr => self.stack.base_addr,
            StackPush { size } => {
                if size > 0 {
                    let child = b.iadd_imm(self.stack.base_offset, i64::from(size));
                    b.store_global(pro.stack.hotzone, child, 0x1, 16);
                }
                return Ok(None);
            }
            Resume { size } => {
                self.stack.resumed = true;
                if size > 0 {
                    let offset = b.iadd_imm(self.stack.base_offset, -i64::from(size));
                    b.store_global(pro.stack.hotzone, offset, 0x1, 16);
                    let offset64 = b.u2u64(offset);
                    self.stack.base_offset = offset;
                    self.stack.base_addr = b.iadd(pro.stack.sw_stack, offset64);
                }
                return Ok(None);
            }
            LoadUniform { base } => {
                let src = *srcs.first().ok_or(LowerError::MissingOperand(intrinsic))?;
                let ty = dest_ty.ok_or(LowerError::MissingDest(intrinsic))?;
                self.load_uniform(b, base, src, constant_src, ty)?
            }
            RayLaunchId => b.channels(pro.hotzone, 0xe),
            RayLaunchSize => pro.globals.launch_size,
            RayWorldOrigin => self.world_ray(intrinsic)?.orig,
            RayWorldDirection => self.world_ray(intrinsic)?.dir,
            RayObjectOrigin => self.object_ray(intrinsic)?.orig,
            RayObjectDirection => self.object_ray(intrinsic)?.dir,
            RayTMin => self.world_ray(intrinsic)?.t_near,
            RayTMax => {
                if self.stage == ShaderStage::Miss {
                    self.world_ray(intrinsic)?.t_far
                } else {
                    self.hit(intrinsic)?.t
                }
            }
            PrimitiveId => {
                // dw3 onwards (indexed) for procedural leaves, dw2 for triangles.
                let hit = *self.hit(intrinsic)?;
                let procedural = self.leaf_is_procedural(b, intrinsic)?;
                let proc_offset = b.iadd_imm(hit.prim_leaf_index, 12);
                let tri_offset = b.imm32(8);
                let offset = b.bcsel(procedural, proc_offset, tri_offset);
                let offset = b.u2u64(offset);
                let addr = b.iadd(hit.prim_leaf_ptr, offset);
                b.load_global(addr, ValueType::U32, 4)
            }
            InstanceId => self.instance_field(b, intrinsic, InstanceLeafField::InstanceIndex)?,
            InstanceCustomIndex => {
                self.instance_field(b, intrinsic, InstanceLeafField::InstanceId)?
            }
            ObjectToWorld { column } => {
                self.instance_field(b, intrinsic, InstanceLeafField::ObjectToWorld(column))?
            }
            WorldToObject { column } => {
                self.instance_field(b, intrinsic, InstanceLeafField::WorldToObject(column))?
            }
            HitKind => {
                let hit = *self.hit(intrinsic)?;
                let front = b.imm32(HIT_KIND_FRONT_FACE);
                let back = b.imm32(HIT_KIND_BACK_FACE);
                let tri = b.bcsel(hit.front_face, front, back);
                let procedural = self.leaf_is_procedural(b, intrinsic)?;
                b.bcsel(procedural, hit.aabb_hit_kind, tri)
            }
            RayFlags => self.world_ray(intrinsic)?.ray_flags,
            GeometryIndex => {
                let dw = self.prim_leaf_dword(b, intrinsic, 4)?;
                b.iand_imm(dw, (1 << 29) - 1)
            }
            ShaderRecordPtr => {
                // A resumed continuation no longer has the original SBT handle.
                if self.stack.resumed {
                    return Err(LowerError::ShaderRecordAfterResume {
                        function: self.function.to_owned(),
                    });
                }
                b.intrinsic(LocalArgAddr, &[], ValueType::U64)
            }
            RayBaseMemAddr => pro.globals.base_mem_addr,
            HwStackSize => b.imul_imm(pro.globals.hw_stack_size, 64),
            SwStackSize => b.imul_imm(pro.globals.sw_stack_size, 64),
            NumDssRtStacks => pro.globals.num_dss_rt_stacks,
            HitSbtAddr => pro.globals.hit_sbt_addr,
            HitSbtStride => pro.globals.hit_sbt_stride,
            MissSbtAddr => pro.globals.miss_sbt_addr,
            MissSbtStride => pro.globals.miss_sbt_stride,
            CallableSbtAddr => pro.globals.call_sbt_addr,
            CallableSbtStride => pro.globals.call_sbt_stride,
            ResumeSbtAddr => {
                let lo = b.intrinsic(
                    RelocConst {
                        id: reloc::RESUME_SBT_ADDR_LOW,
                    },
                    &[],
                    ValueType::U32,
                );
                let hi = b.intrinsic(
                    RelocConst {
                        id: reloc::RESUME_SBT_ADDR_HIGH,
                    },
                    &[],
                    ValueType::U32,
                );
                b.pack_64_2x32(lo, hi)
            }
            LeafProcedural => self.leaf_is_procedural(b, intrinsic)?,
            LeafOpaque => {
                if self.stage == ShaderStage::Intersection {
                    // Intersection shaders get the opaque bit in the front-face slot.
                    self.hit(intrinsic)?.front_face
                } else {
                    let dw = self.prim_leaf_dword(b, intrinsic, 4)?;
                    let bit = b.iand_imm(dw, 1 << 30);
                    b.i2b(bit)
                }
            }
            GlobalArgAddr | LocalArgAddr | AsyncStackId | RelocConst { .. }
            | LocalInvocationId | LocalInvocationIndex | NumSubgroups | SubgroupId
            | SubgroupInvocation | SubgroupSize | WorkgroupSize | WorkgroupId | NumWorkgroups => {
                unreachable!("{intrinsic} is not a ray-tracing system value")
            }
        };
        Ok(Some(sysval))
    }
}

fn lower_function(
    func: &mut Function,
    stage: ShaderStage,
    dev: &DeviceInfo,
) -> Result<bool, LowerError> {
    if !func.intrinsics().any(|i| handles(i, stage)) {
        return Ok(false);
    }

    let constants = func.scalar_constants();
    let Function {
        name,
        blocks,
        values,
        ..
    } = func;

    let mut b = Builder::new(values);
    let prologue = build_prologue(&mut b, stage, dev);
    let base_offset = b.channel(prologue.hotzone, 0);
    let offset64 = b.u2u64(base_offset);
    let base_addr = b.iadd(prologue.stack.sw_stack, offset64);
    let prologue_insts = b.finish();

    let mut lowering = Lowering {
        stage,
        function: name.as_str(),
        pro: &prologue,
        stack: StackState {
            base_offset,
            base_addr,
            resumed: false,
            seen_sysval: false,
        },
    };

    let mut rewrites = Vec::new();
    for (block_idx, block) in blocks.iter().enumerate() {
        for (index, inst) in block.insts.iter().enumerate() {
            let Op::Intrinsic { intrinsic, srcs } = &inst.op else {
                continue;
            };
            if !handles(*intrinsic, stage) {
                continue;
            }

            let dest_ty = inst.dest.map(|d| values.ty(d));
            let constant_src = srcs.first().and_then(|s| constants.get(s).copied());
            let mut b = Builder::new(values);
            let sysval = lowering.lower(
                &mut b,
                *intrinsic,
                block_idx == 0,
                srcs,
                dest_ty,
                constant_src,
            )?;
            let insts = b.finish();

            let replacement = match (inst.dest, sysval) {
                (Some(old), Some(new)) => {
                    check_replacement(values, *intrinsic, old, new)?;
                    Some((old, new))
                }
                (None, Some(_)) => return Err(LowerError::MissingDest(*intrinsic)),
                (_, None) => None,
            };
            debug!(
                function = %lowering.function,
                %intrinsic,
                emitted = insts.len(),
                "lowered ray-tracing system value"
            );
            rewrites.push(Rewrite {
                block: block_idx,
                index,
                insts,
                replacement,
            });
        }
    }

    apply_rewrites(func, rewrites);
    func.blocks[0].insts.splice(0..0, prologue_insts);
    func.preserve_metadata(Metadata::BLOCK_INDEX | Metadata::DOMINANCE);
    Ok(true)
}
