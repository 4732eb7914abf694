use thiserror::Error;

use crate::intrinsic::Intrinsic;
use crate::ir::ValueType;
use crate::shader::ShaderStage;

/// Contract violations in the compiler input detected while lowering.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LowerError {
    /// A resume marker outside the entry block, or after another handled system-value
    /// intrinsic in it. Ordinary instructions ahead of the marker are not checked.
    #[error("resume marker in function `{function}` must be the first system-value access of the entry block")]
    ResumeNotFirst { function: String },
    #[error("shader record pointer read after a resume point in function `{function}`")]
    ShaderRecordAfterResume { function: String },
    #[error("{intrinsic} reads the {record} record, which is not loaded in {stage} shaders")]
    RecordUnavailable {
        intrinsic: Intrinsic,
        record: &'static str,
        stage: ShaderStage,
    },
    #[error("uniform offset {offset} is not aligned to its {byte_size}-byte components")]
    MisalignedUniform { offset: u64, byte_size: u32 },
    #[error("replacement for {intrinsic} has type {found:?}, expected {expected:?}")]
    TypeMismatch {
        intrinsic: Intrinsic,
        expected: ValueType,
        found: ValueType,
    },
    #[error("{0} has no destination value")]
    MissingDest(Intrinsic),
    #[error("{0} is missing its offset operand")]
    MissingOperand(Intrinsic),
    #[error("compute lowering requires a compute or kernel shader, got {0}")]
    NotCompute(ShaderStage),
    #[error("quad derivatives need an even workgroup width and height, got {x}x{y}")]
    QuadDerivativeOddSize { x: u32, y: u32 },
    #[error("linear derivatives need a workgroup size divisible by 4, got {0}")]
    LinearDerivativeSize(u32),
}
