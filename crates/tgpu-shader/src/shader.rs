use std::fmt;

use crate::ir::Function;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    Kernel,
    RayGen,
    AnyHit,
    ClosestHit,
    Miss,
    Intersection,
    Callable,
}

impl ShaderStage {
    pub fn is_compute(self) -> bool {
        matches!(self, ShaderStage::Compute | ShaderStage::Kernel)
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
            ShaderStage::Kernel => "kernel",
            ShaderStage::RayGen => "raygen",
            ShaderStage::AnyHit => "any-hit",
            ShaderStage::ClosestHit => "closest-hit",
            ShaderStage::Miss => "miss",
            ShaderStage::Intersection => "intersection",
            ShaderStage::Callable => "callable",
        };
        f.write_str(s)
    }
}

/// Invocation ordering requested for compute derivatives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DerivativeGroup {
    #[default]
    None,
    Linear,
    /// Each 2x2 block of invocations occupies four consecutive subgroup lanes.
    Quads,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComputeInfo {
    pub local_size: [u32; 3],
    /// Workgroup size is only known at dispatch time.
    pub local_size_variable: bool,
    pub derivative_group: DerivativeGroup,
}

impl Default for ComputeInfo {
    fn default() -> Self {
        Self {
            local_size: [1, 1, 1],
            local_size_variable: false,
            derivative_group: DerivativeGroup::None,
        }
    }
}

impl ComputeInfo {
    pub fn invocations(&self) -> u32 {
        self.local_size.iter().product()
    }
}

#[derive(Clone, Debug)]
pub struct Shader {
    pub stage: ShaderStage,
    pub compute: ComputeInfo,
    pub functions: Vec<Function>,
}

impl Shader {
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            compute: ComputeInfo::default(),
            functions: Vec::new(),
        }
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }
}
