/// Round `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be > 0. Saturates instead of overflowing.
pub(crate) fn align_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment > 0);
    match value.checked_add(alignment - 1) {
        Some(v) => v / alignment * alignment,
        None => u32::MAX / alignment * alignment,
    }
}

/// `[0, 1]` float to an unsigned normalized byte, rounding to nearest.
pub(crate) fn float_to_ubyte(f: f32) -> u8 {
    if f.is_nan() {
        return 0;
    }
    (f.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// `[0, 1]` float to an unsigned normalized 16-bit value, rounding to nearest.
pub(crate) fn float_to_ushort(f: f32) -> u16 {
    if f.is_nan() {
        return 0;
    }
    (f.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Depth in `[0, 1]` packed as 24-bit unorm, truncating like the depth clear path expects.
pub(crate) fn pack_z24(z: f64) -> u32 {
    if z.is_nan() || z <= 0.0 {
        0
    } else if z >= 1.0 {
        0x00ff_ffff
    } else {
        (z * f64::from(0x00ff_ffffu32)) as u32
    }
}

/// Number of significant bits in `v` (`0` for `0`).
pub(crate) fn last_bit(v: u32) -> u32 {
    u32::BITS - v.leading_zeros()
}
