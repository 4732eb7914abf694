use std::fmt;

/// Relocation constants resolved by the backend at upload time.
pub mod reloc {
    pub const RESUME_SBT_ADDR_LOW: u32 = 0;
    pub const RESUME_SBT_ADDR_HIGH: u32 = 1;
}

/// Abstract system-value reads and hardware intrinsics.
///
/// The ray-tracing and compute groups are rewritten by the lowering passes; the hardware
/// group is what the lowered code reads instead and is left for the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    // Ray-tracing system values.
    ScratchBasePtr,
    /// Marks a call site; `size` bytes of the caller's stack belong to the callee.
    StackPush { size: i32 },
    /// Marks the start of a resumed continuation that gives back `size` bytes.
    Resume { size: i32 },
    /// Push-constant read; `srcs[0]` is the byte offset relative to `base`.
    LoadUniform { base: u32 },
    RayLaunchId,
    RayLaunchSize,
    RayWorldOrigin,
    RayWorldDirection,
    RayObjectOrigin,
    RayObjectDirection,
    RayTMin,
    RayTMax,
    PrimitiveId,
    InstanceId,
    InstanceCustomIndex,
    ObjectToWorld { column: u8 },
    WorldToObject { column: u8 },
    HitKind,
    RayFlags,
    GeometryIndex,
    ShaderRecordPtr,
    RayBaseMemAddr,
    HwStackSize,
    SwStackSize,
    NumDssRtStacks,
    HitSbtAddr,
    HitSbtStride,
    MissSbtAddr,
    MissSbtStride,
    CallableSbtAddr,
    CallableSbtStride,
    ResumeSbtAddr,
    LeafProcedural,
    LeafOpaque,

    // Hardware intrinsics.
    GlobalArgAddr,
    LocalArgAddr,
    AsyncStackId,
    RelocConst { id: u32 },

    // Compute system values.
    LocalInvocationId,
    LocalInvocationIndex,
    NumSubgroups,
    SubgroupId,
    SubgroupInvocation,
    SubgroupSize,
    WorkgroupSize,
    WorkgroupId,
    NumWorkgroups,
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
