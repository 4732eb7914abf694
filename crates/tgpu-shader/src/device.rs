/// Device parameters the ray-tracing address model depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Number of enabled dual-subslices.
    pub subslice_total: u32,
    /// Hardware ray stacks per dual-subslice.
    pub rt_stacks_per_dss: u32,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            subslice_total: 6,
            rt_stacks_per_dss: 2048,
        }
    }
}

/// Size in bytes of one hotzone slot.
pub const HOTZONE_SIZE: u32 = 16;

impl DeviceInfo {
    /// Total number of asynchronous ray stacks across the device.
    pub fn rt_stack_count(&self) -> u32 {
        self.subslice_total * self.rt_stacks_per_dss
    }

    /// Bytes reserved below the RT base address for the per-stack hotzones, 64-byte aligned.
    pub fn sw_hotzone_size(&self) -> u32 {
        (self.rt_stack_count() * HOTZONE_SIZE).next_multiple_of(64)
    }
}
