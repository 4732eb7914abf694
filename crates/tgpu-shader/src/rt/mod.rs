//! Ray-tracing system-value lowering.

pub mod layout;
mod lower;

pub use lower::lower_rt_intrinsics;
